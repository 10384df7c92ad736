//! Generic config store with change notification.
//!
//! `ConfigStore<T>` keeps the current value in a `watch` channel as an
//! `Arc<T>` snapshot. Readers clone the snapshot and never hold a lock
//! across an await; subscribers get a [`ConfigWatcher`] that resolves on
//! the next update.

use std::sync::Arc;
use tokio::sync::watch;

/// A shared configuration value with change notification.
pub struct ConfigStore<T> {
    tx: Arc<watch::Sender<Arc<T>>>,
}

/// Receives notifications when a [`ConfigStore`] is updated.
pub struct ConfigWatcher<T> {
    rx: watch::Receiver<Arc<T>>,
}

// -- ConfigStore --------------------------------------------------------

impl<T> ConfigStore<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(Arc::new(initial));
        Self { tx: Arc::new(tx) }
    }

    /// Replace the stored value and notify all watchers.
    pub fn update(&self, value: T) {
        self.tx.send_replace(Arc::new(value));
    }

    /// The current value.
    pub fn read(&self) -> Arc<T> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> ConfigWatcher<T> {
        ConfigWatcher {
            rx: self.tx.subscribe(),
        }
    }
}

impl<T> Clone for ConfigStore<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ConfigStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ConfigStore").field(&*self.read()).finish()
    }
}

// -- ConfigWatcher ------------------------------------------------------

impl<T> ConfigWatcher<T> {
    /// Wait for the next update and return the new value.
    ///
    /// Returns `Err` once every [`ConfigStore`] handle has been dropped.
    pub async fn changed(&mut self) -> Result<Arc<T>, watch::error::RecvError> {
        self.rx.changed().await?;
        Ok(self.rx.borrow_and_update().clone())
    }
}
