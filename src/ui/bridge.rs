// UiBridge - marshals work between the tokio runtime and the Slint event loop
//
// Slint components live on the main thread; scan runs live on tokio workers.
// UI updates are queued onto the event loop with upgrade_in_event_loop, and
// callbacks start async work through the stored runtime handle.

use crate::metrics::Metrics;
use slint::{ComponentHandle, Weak};
use std::future::Future;
use std::sync::Arc;

/// Cloneable handle pairing a weak UI reference with a tokio runtime handle
///
/// # Example
/// ```ignore
/// let bridge = UiBridge::new(&ui, runtime.handle().clone(), metrics);
///
/// let task_bridge = bridge.clone();
/// bridge.spawn(async move {
///     let outcome = session.start_camera().await;
///     task_bridge.update_ui(move |ui| ui.set_status("success".into()));
/// });
/// ```
pub struct UiBridge<T: ComponentHandle> {
    ui_weak: Weak<T>,
    tokio_handle: tokio::runtime::Handle,
    metrics: Arc<Metrics>,
}

// Manual Clone implementation to avoid requiring T: Clone
impl<T: ComponentHandle> Clone for UiBridge<T> {
    fn clone(&self) -> Self {
        Self {
            ui_weak: self.ui_weak.clone(),
            tokio_handle: self.tokio_handle.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<T: ComponentHandle + 'static> UiBridge<T> {
    pub fn new(ui: &T, tokio_handle: tokio::runtime::Handle, metrics: Arc<Metrics>) -> Self {
        Self {
            ui_weak: ui.as_weak(),
            tokio_handle,
            metrics,
        }
    }

    /// Queue `update` to run on the Slint event loop.
    ///
    /// Safe to call from any thread. Returns `false` if the event loop has
    /// stopped; the update is then dropped and counted.
    pub fn update_ui<F>(&self, update: F) -> bool
    where
        F: FnOnce(&T) + Send + 'static,
    {
        match self.ui_weak.upgrade_in_event_loop(move |ui| update(&ui)) {
            Ok(()) => true,
            Err(e) => {
                self.metrics.record_ui_update_dropped();
                tracing::debug!("UI update dropped, event loop gone: {:?}", e);
                false
            }
        }
    }

    /// Run `future` on the tokio runtime, typically from a Slint callback
    pub fn spawn<Fut>(&self, future: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tokio_handle.spawn(future);
    }

    pub fn ui_weak(&self) -> &Weak<T> {
        &self.ui_weak
    }
}
