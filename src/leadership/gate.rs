use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;

use crate::Result;

/// Atomic leadership flag fed by a supervised listener task.
///
/// The task lives until [`shutdown`](Self::shutdown), until the gate is
/// dropped, or until every sender of the channel is gone. In all three cases
/// the flag ends up `false`.
#[derive(Debug)]
pub struct LeadershipGate {
    flag: Arc<AtomicBool>,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl LeadershipGate {
    /// Spawns the listener on the current tokio runtime.
    pub fn spawn(rx: watch::Receiver<bool>) -> Self {
        let flag = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(listen(rx, flag.clone(), cancel.clone()));

        Self {
            flag,
            cancel,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn is_leader(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Stops the listener and waits for it to exit.
    pub async fn shutdown(&self) -> Result<()> {
        self.cancel.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            handle.await?;
        }
        Ok(())
    }
}

impl Drop for LeadershipGate {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn listen(
    mut rx: watch::Receiver<bool>,
    flag: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    // value published before we subscribed
    let initial = *rx.borrow_and_update();
    flag.store(initial, Ordering::Release);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("leadership listener cancelled");
                break;
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    debug!("leadership channel closed");
                    break;
                }
                let is_leader = *rx.borrow_and_update();
                let was_leader = flag.swap(is_leader, Ordering::AcqRel);
                if was_leader != is_leader {
                    info!(is_leader, "leadership changed");
                }
            }
        }
    }

    flag.store(false, Ordering::Release);
}
