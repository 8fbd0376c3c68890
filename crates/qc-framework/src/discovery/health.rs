//! TCP health listener answering the registry's reachability probe.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::net::TcpListener;

use crate::config::discovery::ACCEPT_WINDOW;

/// State shared between the listener thread and its owner.
#[derive(Debug, Default)]
struct Shared {
    stop: AtomicBool,
    running: AtomicBool,
    bound_port: AtomicU16,
}

/// Background accept loop bound to one port.
///
/// Accepted connections are dropped straight away; being able to connect is
/// all the probe checks. Dropping the listener stops and joins the thread.
#[derive(Debug)]
pub struct HealthListener {
    port: Option<u16>,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl HealthListener {
    /// Start listening on `port` on all IPv4 interfaces.
    pub fn spawn(port: u16) -> Self {
        Self::spawn_with_window(port, ACCEPT_WINDOW)
    }

    pub fn spawn_with_window(port: u16, window: Duration) -> Self {
        let shared = Arc::new(Shared::default());
        shared.running.store(true, Ordering::SeqCst);

        let thread_shared = shared.clone();
        let handle = thread::Builder::new()
            .name(format!("qc-health-{}", port))
            .spawn(move || {
                run(port, window, &thread_shared);
                thread_shared.running.store(false, Ordering::SeqCst);
            });

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(port, error = %e, "Failed to start health listener thread");
                shared.running.store(false, Ordering::SeqCst);
                None
            }
        };

        Self {
            port: Some(port),
            shared,
            handle,
        }
    }

    /// A listener that never started, e.g. because no port could be parsed.
    pub fn disabled() -> Self {
        Self {
            port: None,
            shared: Arc::new(Shared::default()),
            handle: None,
        }
    }

    /// Whether the accept loop is alive.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Port the listener was asked to use.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Port actually bound, once the socket is open.
    pub fn bound_port(&self) -> Option<u16> {
        match self.shared.bound_port.load(Ordering::SeqCst) {
            0 => None,
            port => Some(port),
        }
    }

    /// Ask the loop to exit and wait for it.
    pub fn stop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!(port = ?self.port, "Health listener thread panicked");
            }
        }
        self.shared.running.store(false, Ordering::SeqCst);
    }
}

impl Drop for HealthListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(port: u16, window: Duration, shared: &Shared) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::warn!(port, error = %e, "Health listener runtime failed to start");
            return;
        }
    };

    runtime.block_on(async {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::warn!(port, error = %e, "Health listener failed to bind");
                return;
            }
        };
        if let Ok(local) = listener.local_addr() {
            shared.bound_port.store(local.port(), Ordering::SeqCst);
        }
        tracing::debug!(port, "Health listener started");

        while !shared.stop.load(Ordering::SeqCst) {
            tokio::select! {
                _ = tokio::time::sleep(window) => {}
                accepted = listener.accept() => match accepted {
                    Ok((_socket, peer)) => {
                        tracing::trace!(%peer, "Health probe connected");
                    }
                    Err(e) => {
                        tracing::warn!(port, error = %e, "Health listener accept failed");
                        break;
                    }
                },
            }
        }

        tracing::debug!(port, "Health listener stopped");
    });
}
