use tokio::sync::watch;

/// Leadership-transition channel with latest-value semantics.
///
/// Holds an internal receiver so sends keep succeeding even when no gate is
/// subscribed yet.
#[derive(Debug)]
pub struct LeaderNotifier {
    tx: watch::Sender<bool>,
    _rx: watch::Receiver<bool>,
}

impl LeaderNotifier {
    /// Starts as "not leader".
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, _rx: rx }
    }

    /// Sender handed to the consensus engine.
    pub fn sender(&self) -> watch::Sender<bool> {
        self.tx.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for LeaderNotifier {
    fn default() -> Self {
        Self::new()
    }
}
