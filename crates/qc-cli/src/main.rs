//! Command-line host for quality control task modules.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use qc_framework::config::{self, env_vars};
use qc_framework::discovery::{DiscoveryConfig, ServiceDiscovery};
use qc_framework::prelude::*;

/// QC Host - run a task module and announce it to the service registry.
#[derive(Parser, Debug)]
#[command(name = "qc-host")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Load a task and run its cycles until interrupted.
    Run(RunArgs),
    /// Load a module and list the classes it registers.
    Inspect {
        /// Module name or library path.
        #[arg(required = true)]
        module: String,
        /// Extra directories to search for module libraries.
        #[arg(long = "module-path")]
        module_paths: Vec<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Module providing the task, e.g. `QcSkeleton`.
    #[arg(long)]
    module: String,
    /// Fully-qualified class name of the task.
    #[arg(long)]
    class: String,
    /// Task name used for published object paths.
    #[arg(long, default_value = "Task")]
    task_name: String,
    /// Registry base URL; service discovery is off when unset.
    #[arg(long, env = env_vars::CONSUL_URL)]
    consul_url: Option<String>,
    /// Service name announced to the registry.
    #[arg(long, default_value = "qc-task")]
    service_name: String,
    /// Instance id announced to the registry (defaults to `<task>-<pid>`).
    #[arg(long)]
    instance_id: Option<String>,
    /// `host:port` the registry probes.
    #[arg(long, env = env_vars::HEALTH_ENDPOINT, default_value = "")]
    health_endpoint: String,
    /// Extra directories to search for module libraries.
    #[arg(long = "module-path")]
    module_paths: Vec<PathBuf>,
    /// Check class from the same module run after every cycle; may be repeated.
    #[arg(long = "check")]
    checks: Vec<String>,
    /// Custom task and check parameter as `key=value`; may be repeated.
    #[arg(long = "param", value_parser = parse_param)]
    params: Vec<(String, String)>,
    /// Seconds per cycle.
    #[arg(long, default_value_t = 10.0)]
    cycle_secs: f64,
    /// Run number of the activity.
    #[arg(long, default_value_t = 0)]
    run_number: u64,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Run(run) => run_task(run),
        Command::Inspect {
            module,
            module_paths,
        } => inspect(&module, module_paths),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "qc=debug" } else { "qc=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(default_level)
            .add_directive(tracing::Level::WARN.into())
    });

    if config::log_json() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .init();
    }
}

fn native_loader(extra: Vec<PathBuf>) -> NativeLoader {
    extra
        .into_iter()
        .chain(config::module_paths())
        .fold(NativeLoader::new(), |loader, dir| loader.with_search_path(dir))
}

fn inspect(module: &str, module_paths: Vec<PathBuf>) -> Result<()> {
    let factory = ClassFactory::native(native_loader(module_paths));
    factory
        .ensure_loaded(module)
        .with_context(|| format!("Cannot load module {}", module))?;

    for class in factory.class_names() {
        println!("{}", class);
    }
    Ok(())
}

fn cycle_duration(secs: f64) -> Result<Duration> {
    config::duration_from_secs_f64(secs)
        .with_context(|| format!("Invalid cycle duration: {} seconds", secs))
}

fn run_task(args: RunArgs) -> Result<()> {
    let cycle = cycle_duration(args.cycle_secs)?;
    let params: CustomParameters = args.params.into_iter().collect();

    let factory = ClassFactory::native(native_loader(args.module_paths));
    let mut task = factory
        .create::<dyn Task>(&args.module, &args.class)
        .with_context(|| format!("Cannot create {} from {}", args.class, args.module))?;

    let mut checks = Vec::with_capacity(args.checks.len());
    for class in args.checks {
        let mut check = factory
            .create::<dyn Check>(&args.module, &class)
            .with_context(|| format!("Cannot create {} from {}", class, args.module))?;
        check.configure(&params)?;
        checks.push((class, check));
    }

    let mut objects = ObjectsManager::new(&args.task_name);
    if let Some(url) = args.consul_url.or_else(config::consul_url) {
        let instance_id = args
            .instance_id
            .unwrap_or_else(|| format!("{}-{}", args.task_name, std::process::id()));
        let discovery = ServiceDiscovery::new(
            DiscoveryConfig::new(url, &args.service_name, instance_id)
                .with_health_endpoint(&args.health_endpoint),
        )?;
        objects = objects.with_discovery(discovery);
    } else {
        tracing::info!("No registry configured, service discovery disabled");
    }

    task.initialize(&mut objects, &params)?;
    objects.update_service_discovery();
    tracing::info!(
        task = %args.task_name,
        objects = objects.len(),
        "Task initialized"
    );

    let activity = Activity::new(args.run_number);
    task.start_of_activity(&activity)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    loop {
        task.start_of_cycle()?;
        let interrupted = runtime.block_on(wait_cycle(cycle));
        task.end_of_cycle()?;
        run_checks(&mut checks, &mut objects);
        if interrupted {
            break;
        }
    }

    task.end_of_activity(&activity)?;
    tracing::info!(task = %args.task_name, "Task stopped");
    Ok(())
}

/// Run every check on the published objects and annotate them.
fn run_checks(checks: &mut [(String, Box<dyn Check>)], objects: &mut ObjectsManager) {
    for (class, check) in checks.iter_mut() {
        let quality = check.check(objects.objects());
        tracing::info!(check = %class, %quality, "Check finished");
        for object in objects.objects_mut() {
            check.beautify(object, quality);
        }
    }
}

/// Sleep for one cycle; true if Ctrl-C arrived first.
async fn wait_cycle(cycle: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(cycle) => false,
        _ = tokio::signal::ctrl_c() => true,
    }
}
