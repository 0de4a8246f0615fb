//! Online/offline signal shared by the network client and the list controller.

use tokio::sync::watch;

/// Read side of the connectivity signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Connectivity {
  rx: watch::Receiver<bool>,
}

/// Write side, held by whatever observes the platform's network state.
#[derive(Debug)]
pub struct ConnectivityHandle {
  tx: watch::Sender<bool>,
}

impl Connectivity {
  /// Create a linked signal starting at `online`.
  pub fn new(online: bool) -> (ConnectivityHandle, Connectivity) {
    let (tx, rx) = watch::channel(online);
    (ConnectivityHandle { tx }, Connectivity { rx })
  }

  /// Current state, without waiting.
  pub fn is_online(&self) -> bool {
    *self.rx.borrow()
  }

  /// A receiver that observes every subsequent change.
  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.rx.clone()
  }
}

impl ConnectivityHandle {
  /// Publish a new state. Fed by a platform network observer; the CLI only
  /// fixes the initial state.
  #[allow(dead_code)]
  pub fn set_online(&self, online: bool) {
    self.tx.send_replace(online);
  }
}
