//! Quota-exceeded callback registry
//!
//! When a cache write fails because the store is full, every registered
//! callback runs once, in registration order, before the write error is
//! returned to the caller. Subsystems that can free space (for example
//! expiration with purge-on-quota-error) register here.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::Arc;

/// Callback invoked when a cache write exceeds the storage quota
pub type QuotaCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Shared, cloneable registry of quota callbacks
#[derive(Clone, Default)]
pub struct QuotaCallbacks {
    callbacks: Arc<Mutex<Vec<QuotaCallback>>>,
}

impl std::fmt::Debug for QuotaCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaCallbacks")
            .field("registered", &self.len())
            .finish()
    }
}

impl QuotaCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback
    pub fn register(&self, callback: QuotaCallback) {
        self.callbacks.lock().push(callback);
    }

    pub fn len(&self) -> usize {
        self.callbacks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every registered callback sequentially
    pub async fn execute(&self) {
        let callbacks: Vec<QuotaCallback> = self.callbacks.lock().clone();
        tracing::debug!("Running {} quota error callbacks", callbacks.len());
        for callback in callbacks {
            callback().await;
        }
    }
}
