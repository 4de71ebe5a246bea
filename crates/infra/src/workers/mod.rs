//! Background workers consuming the event bus.

pub mod notifier;

pub use notifier::{
    LocationRecorder, LogLocationRecorder, LogMailer, Mailer, Notifier, SideChannelError,
};

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::warn;

use bazaar_events::Subscription;

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Spawn a named thread that feeds every message of `sub` to `handler`
/// until shutdown is requested or the bus goes away.
///
/// Handler errors are logged and the loop moves on to the next message.
pub(crate) fn spawn_loop<M, H, E>(
    name: &'static str,
    sub: Subscription<M>,
    mut handler: H,
) -> std::io::Result<WorkerHandle>
where
    M: Send + 'static,
    H: FnMut(M) -> Result<(), E> + Send + 'static,
    E: core::fmt::Display + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

    let join = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let tick = Duration::from_millis(250);
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }
                match sub.recv_timeout(tick) {
                    Ok(msg) => {
                        if let Err(err) = handler(msg) {
                            warn!(worker = name, error = %err, "worker handler failed");
                        }
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => continue,
                    Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }
        })?;

    Ok(WorkerHandle {
        shutdown: shutdown_tx,
        join: Some(join),
    })
}
