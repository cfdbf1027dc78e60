//! Lifecycle control loop.
//!
//! # Responsibilities
//! - Own the listening socket and serve the router on it
//! - Receive shutdown signals over a channel and drive state transitions
//! - Bound the drain of connections and background tasks by the grace period
//!
//! # Design Decisions
//! - Single writer: only [`LifecycleManager::run`] advances the state
//! - Listener failures are fatal; drain failures still end in Stopped
//! - Forced stops report what was left outstanding

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::lifecycle::background::BackgroundTasks;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::{spawn_signal_watcher, ShutdownSignal};
use crate::lifecycle::state::LifecycleState;

/// Fatal lifecycle outcomes.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("listener failed: {0}")]
    Serve(#[source] io::Error),
    #[error("error while draining: {0}")]
    Drain(#[source] io::Error),
    #[error(
        "drain exceeded {grace:?} grace period (connections drained: {connections_drained}, \
         background tasks outstanding: {outstanding_tasks})"
    )]
    DrainTimeout {
        grace: Duration,
        /// False when an open connection held the drain past the deadline.
        connections_drained: bool,
        outstanding_tasks: usize,
    },
    #[error("shutdown forced by repeated {signal} signal with {outstanding_tasks} background task(s) outstanding")]
    Forced {
        signal: ShutdownSignal,
        outstanding_tasks: usize,
    },
}

enum DrainOutcome {
    Clean,
    Failed(io::Error),
    TimedOut,
    Forced(ShutdownSignal),
}

/// Owns the socket and the Starting → Serving → Draining → Stopped machine.
pub struct LifecycleManager {
    listener: TcpListener,
    local_addr: SocketAddr,
    grace_period: Duration,
    background: BackgroundTasks,
    state: watch::Sender<LifecycleState>,
    shutdown: Shutdown,
    signals: mpsc::Receiver<ShutdownSignal>,
    stopped: CancellationToken,
    watch_os_signals: bool,
}

impl LifecycleManager {
    /// Bind `address`. The manager stays in Starting until [`run`](Self::run).
    pub async fn bind(
        address: &str,
        grace_period: Duration,
        background: BackgroundTasks,
    ) -> Result<Self, LifecycleError> {
        let bind_err = |source| LifecycleError::Bind {
            address: address.to_string(),
            source,
        };
        let listener = TcpListener::bind(address).await.map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;
        let (shutdown, signals) = Shutdown::channel();
        let (state, _) = watch::channel(LifecycleState::Starting);

        tracing::debug!(address = %local_addr, "Listener bound");

        Ok(Self {
            listener,
            local_addr,
            grace_period,
            background,
            state,
            shutdown,
            signals,
            stopped: CancellationToken::new(),
            watch_os_signals: true,
        })
    }

    /// Skip installing OS signal handlers; shutdown then only comes from
    /// [`shutdown_handle`](Self::shutdown_handle).
    pub fn without_os_signals(mut self) -> Self {
        self.watch_os_signals = false;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Cancelled when the manager reaches Stopped. Periodic jobs (such as
    /// the limiter sweep) stop on it.
    pub fn stopped_token(&self) -> CancellationToken {
        self.stopped.clone()
    }

    fn advance(state: &watch::Sender<LifecycleState>, next: LifecycleState) {
        let current = *state.borrow();
        if current.can_transition_to(next) {
            state.send_replace(next);
            tracing::debug!(from = %current, to = %next, "Lifecycle transition");
        } else {
            tracing::error!(from = %current, to = %next, "Ignoring illegal lifecycle transition");
        }
    }

    /// Serve `app` until a shutdown signal arrives, then drain and stop.
    pub async fn run(self, app: Router) -> Result<(), LifecycleError> {
        let Self {
            listener,
            local_addr,
            grace_period,
            background,
            state,
            shutdown,
            mut signals,
            stopped,
            watch_os_signals,
        } = self;

        let watcher = watch_os_signals.then(|| spawn_signal_watcher(shutdown.clone()));

        let (stop_accepting, accept_stopped) = oneshot::channel::<()>();
        let service = app.into_make_service_with_connect_info::<SocketAddr>();
        let mut server: JoinHandle<io::Result<()>> = tokio::spawn(async move {
            axum::serve(listener, service)
                .with_graceful_shutdown(async {
                    let _ = accept_stopped.await;
                })
                .await
        });

        Self::advance(&state, LifecycleState::Serving);
        tracing::info!(address = %local_addr, "Server started");

        let signal = tokio::select! {
            joined = &mut server => {
                let err = match joined {
                    Ok(Ok(())) => io::Error::other("listener exited without a shutdown request"),
                    Ok(Err(e)) => e,
                    Err(e) => io::Error::other(e),
                };
                tracing::error!(address = %local_addr, error = %err, "Listener failed");
                Self::advance(&state, LifecycleState::Stopped);
                background.stop();
                stopped.cancel();
                if let Some(watcher) = watcher {
                    watcher.abort();
                }
                return Err(LifecycleError::Serve(err));
            }
            received = signals.recv() => received.unwrap_or(ShutdownSignal::Requested),
        };

        tracing::info!(signal = %signal, "Shutting down server");
        Self::advance(&state, LifecycleState::Draining);
        let _ = stop_accepting.send(());

        let mut connections_drained = false;
        let drain = async {
            let connections = match (&mut server).await {
                Ok(result) => result,
                Err(e) => Err(io::Error::other(e)),
            };
            connections_drained = true;
            tracing::info!(outstanding_tasks = background.outstanding(), "Connections drained");
            background.wait().await;
            connections
        };

        let outcome = tokio::select! {
            drained = tokio::time::timeout(grace_period, drain) => match drained {
                Ok(Ok(())) => DrainOutcome::Clean,
                Ok(Err(e)) => DrainOutcome::Failed(e),
                Err(_) => DrainOutcome::TimedOut,
            },
            Some(repeat) = signals.recv() => DrainOutcome::Forced(repeat),
        };

        let outstanding_tasks = background.outstanding();
        Self::advance(&state, LifecycleState::Stopped);
        background.stop();
        stopped.cancel();
        if let Some(watcher) = watcher {
            watcher.abort();
        }

        match outcome {
            DrainOutcome::Clean => {
                tracing::info!(address = %local_addr, status = "clean", "Server stopped");
                Ok(())
            }
            DrainOutcome::Failed(e) => {
                tracing::error!(address = %local_addr, status = "error", error = %e, "Server stopped");
                Err(LifecycleError::Drain(e))
            }
            DrainOutcome::TimedOut => {
                server.abort();
                tracing::warn!(
                    address = %local_addr,
                    status = "forced",
                    grace_secs = grace_period.as_secs_f64(),
                    connections_drained,
                    outstanding_tasks,
                    "Server stopped before drain completed"
                );
                Err(LifecycleError::DrainTimeout {
                    grace: grace_period,
                    connections_drained,
                    outstanding_tasks,
                })
            }
            DrainOutcome::Forced(repeat) => {
                server.abort();
                tracing::warn!(
                    address = %local_addr,
                    status = "forced",
                    signal = %repeat,
                    connections_drained,
                    outstanding_tasks,
                    "Server stopped by repeated signal"
                );
                Err(LifecycleError::Forced {
                    signal: repeat,
                    outstanding_tasks,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    async fn manager(grace: Duration, background: BackgroundTasks) -> LifecycleManager {
        LifecycleManager::bind("127.0.0.1:0", grace, background)
            .await
            .unwrap()
            .without_os_signals()
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = taken.local_addr().unwrap().to_string();
        let err = LifecycleManager::bind(&address, Duration::from_secs(1), BackgroundTasks::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, LifecycleError::Bind { .. }));
    }

    #[tokio::test]
    async fn clean_stop_walks_every_state() {
        let manager = manager(Duration::from_secs(2), BackgroundTasks::new()).await;
        let shutdown = manager.shutdown_handle();
        let mut states = manager.subscribe();
        let stopped = manager.stopped_token();

        let handle = tokio::spawn(manager.run(Router::new().route("/", get(|| async { "ok" }))));

        states.wait_for(|s| *s == LifecycleState::Serving).await.unwrap();
        shutdown.request();
        assert!(handle.await.unwrap().is_ok());
        assert_eq!(*states.borrow(), LifecycleState::Stopped);
        assert!(stopped.is_cancelled());
    }

    #[tokio::test]
    async fn in_flight_request_completes_during_drain() {
        let manager = manager(Duration::from_secs(5), BackgroundTasks::new()).await;
        let addr = manager.local_addr();
        let shutdown = manager.shutdown_handle();
        let app = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                "done"
            }),
        );
        let handle = tokio::spawn(manager.run(app));

        let request = tokio::spawn(async move {
            reqwest::get(format!("http://{}/slow", addr)).await.unwrap().text().await.unwrap()
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.request();

        assert_eq!(request.await.unwrap(), "done");
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn waits_for_background_tasks() {
        let background = BackgroundTasks::new();
        let manager = manager(Duration::from_secs(5), background.clone()).await;
        let shutdown = manager.shutdown_handle();
        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();

        background
            .spawn("slow-job", async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                flag.store(true, Ordering::SeqCst);
                Ok::<(), String>(())
            })
            .unwrap();

        let handle = tokio::spawn(manager.run(Router::new()));
        shutdown.request();

        assert!(handle.await.unwrap().is_ok());
        assert!(done.load(Ordering::SeqCst), "stopped before the task finished");
        assert!(background.is_stopped());
    }

    #[tokio::test]
    async fn grace_period_bounds_the_drain() {
        let background = BackgroundTasks::new();
        let manager = manager(Duration::from_millis(200), background.clone()).await;
        let shutdown = manager.shutdown_handle();

        background
            .spawn("stuck", async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<(), String>(())
            })
            .unwrap();

        let handle = tokio::spawn(manager.run(Router::new()));
        let start = Instant::now();
        shutdown.request();

        match handle.await.unwrap() {
            Err(LifecycleError::DrainTimeout {
                connections_drained,
                outstanding_tasks,
                ..
            }) => {
                assert!(connections_drained);
                assert_eq!(outstanding_tasks, 1);
            }
            other => panic!("expected drain timeout, got {:?}", other),
        }
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(background.spawn("late", async { Ok::<(), String>(()) }).is_err());
    }

    #[tokio::test]
    async fn open_connection_past_grace_is_reported() {
        let manager = manager(Duration::from_millis(200), BackgroundTasks::new()).await;
        let addr = manager.local_addr();
        let shutdown = manager.shutdown_handle();
        let started = Arc::new(tokio::sync::Notify::new());
        let entered = started.clone();
        let app = Router::new().route(
            "/slow",
            get(move || {
                let entered = entered.clone();
                async move {
                    entered.notify_one();
                    tokio::time::sleep(Duration::from_secs(3)).await;
                    "late"
                }
            }),
        );
        let handle = tokio::spawn(manager.run(app));

        let _request = tokio::spawn(async move {
            let _ = reqwest::get(format!("http://{}/slow", addr)).await;
        });
        started.notified().await;
        let start = Instant::now();
        shutdown.request();

        match handle.await.unwrap() {
            Err(LifecycleError::DrainTimeout {
                connections_drained,
                outstanding_tasks,
                ..
            }) => {
                assert!(!connections_drained);
                assert_eq!(outstanding_tasks, 0);
            }
            other => panic!("expected drain timeout, got {:?}", other),
        }
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn repeated_signal_forces_stop() {
        let background = BackgroundTasks::new();
        let manager = manager(Duration::from_secs(30), background.clone()).await;
        let shutdown = manager.shutdown_handle();

        background
            .spawn("stuck", async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<(), String>(())
            })
            .unwrap();

        let handle = tokio::spawn(manager.run(Router::new()));
        shutdown.trigger(ShutdownSignal::Terminate);
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.trigger(ShutdownSignal::Interrupt);

        match tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap() {
            Err(LifecycleError::Forced { signal, .. }) => assert_eq!(signal, ShutdownSignal::Interrupt),
            other => panic!("expected forced stop, got {:?}", other),
        }
    }
}
