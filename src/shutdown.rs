/*!
 # Graceful shutdown

 Termination requests only flip a [`ShutdownState`]; the render loop notices
 the change at its next tick boundary (or while sleeping) and performs the
 all-off write itself, outside of any signal context.

 Bounding the all-off write with a timeout is not enough on its own: a bus
 stuck inside a blocking thread would keep the runtime alive at exit. Run
 the daemon through [`block_on`] so the runtime gives up on such threads.
*/

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Builder;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, instrument, warn};

use crate::bus::Bus;
use crate::{Error, Result};

/// Upper bound for the all-off write during shutdown
pub const SHUTDOWN_WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Lifecycle of the render process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Stopping,
}

/// Tracks whether termination has been requested
#[derive(Debug)]
pub struct ShutdownController {
    state: watch::Sender<ShutdownState>,
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ShutdownState::Running);
        Self { state }
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    pub fn is_stopping(&self) -> bool {
        self.state() == ShutdownState::Stopping
    }

    /// Moves to [`ShutdownState::Stopping`].
    ///
    /// Returns `true` only for the call that performed the transition; any
    /// later request is a no-op.
    pub fn request_stop(&self) -> bool {
        let changed = self.state.send_if_modified(|state| match state {
            ShutdownState::Running => {
                *state = ShutdownState::Stopping;
                true
            }
            ShutdownState::Stopping => false,
        });

        if changed {
            info!("Shutdown requested");
        } else {
            debug!("Shutdown already in progress");
        }
        changed
    }

    /// Resolves once a stop has been requested
    pub async fn stopped(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|state| *state == ShutdownState::Stopping).await;
    }

    /// Turns SIGINT and SIGTERM into stop requests.
    ///
    /// The handlers are installed before this returns, so a failure to
    /// register them is reported here instead of leaving an unstoppable
    /// process. Must be called from within a tokio runtime.
    #[cfg(unix)]
    pub fn listen_for_signals(self: Arc<Self>) -> Result<JoinHandle<()>> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut interrupt = signal(SignalKind::interrupt()).map_err(Error::SignalSetup)?;
        let mut terminate = signal(SignalKind::terminate()).map_err(Error::SignalSetup)?;
        debug!("Signal handlers installed");

        Ok(tokio::spawn(async move {
            loop {
                let signal = tokio::select! {
                    Some(()) = interrupt.recv() => "SIGINT",
                    Some(()) = terminate.recv() => "SIGTERM",
                    else => return,
                };
                self.notice(signal);
            }
        }))
    }

    /// Turns Ctrl-C into stop requests.
    #[cfg(not(unix))]
    pub fn listen_for_signals(self: Arc<Self>) -> Result<JoinHandle<()>> {
        Ok(tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                self.notice("Ctrl-C");
            }
            error!("Stopped listening for Ctrl-C");
        }))
    }

    fn notice(&self, signal: &str) {
        if self.request_stop() {
            info!("Received {}, turning pixels off", signal);
        } else {
            warn!("Received {} while already stopping, ignoring", signal);
        }
    }

    /// Attempts the all-off write, giving up after [`SHUTDOWN_WRITE_TIMEOUT`].
    #[instrument(skip(bus))]
    pub async fn all_off_bounded<B: Bus>(bus: &mut B, pixel_count: usize) -> Result<()> {
        match time::timeout(SHUTDOWN_WRITE_TIMEOUT, bus.all_off(pixel_count)).await {
            Ok(Ok(())) => {
                info!("All {} pixels turned off", pixel_count);
                Ok(())
            }
            Ok(Err(e)) => {
                error!("All-off write failed: {}", e);
                Err(e)
            }
            Err(_) => {
                error!(
                    "All-off write did not finish within {:?}",
                    SHUTDOWN_WRITE_TIMEOUT
                );
                Err(Error::ShutdownTimeout(SHUTDOWN_WRITE_TIMEOUT))
            }
        }
    }
}

/// Runs `future` to completion on a new multi-threaded runtime.
///
/// Blocking work still running afterwards, such as a write stuck in the
/// device driver, gets [`SHUTDOWN_WRITE_TIMEOUT`] to finish before the
/// runtime is torn down without it.
pub fn block_on<F: Future>(future: F) -> std::io::Result<F::Output> {
    let runtime = Builder::new_multi_thread().enable_all().build()?;
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(SHUTDOWN_WRITE_TIMEOUT);
    Ok(output)
}
