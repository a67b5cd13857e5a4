// EventLoopBridge - Coordinates between tokio async runtime and Slint event loop
//
// Sync work runs on tokio worker threads while every Slint call has to happen
// on the event loop thread. The bridge provides:
// - UI updates from tokio tasks via upgrade_in_event_loop
// - Spawning async tasks from Slint callbacks

use slint::{ComponentHandle, Weak};
use std::future::Future;
use tokio::sync::mpsc;

/// Boxed UI update, run on the Slint event loop thread.
type UiUpdate<T> = Box<dyn FnOnce(&T) + Send>;

/// Capacity of the update queue. Updates beyond it are dropped with a warning.
const UI_UPDATE_CAPACITY: usize = 100;

/// Queue an update without blocking. Returns false if it was dropped.
fn queue_update<T>(tx: &mpsc::Sender<UiUpdate<T>>, update: UiUpdate<T>) -> bool {
    match tx.try_send(update) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!("UI update channel full - skipping update to prevent backpressure");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::warn!("Failed to send UI update - handler thread has stopped");
            false
        }
    }
}

/// Coordinates between tokio async runtime and Slint event loop
///
/// # Example
/// ```ignore
/// let runtime = tokio::runtime::Runtime::new().unwrap();
/// let ui = MainWindow::new().unwrap();
/// let bridge = EventLoopBridge::new(&ui, runtime.handle().clone());
/// let handle = bridge.clone_handle();
///
/// bridge.spawn_async(move || async move {
///     let report = service.sync(&app_config, cancel_rx).await;
///     handle.update_ui(move |ui| ui.set_is_finished(true));
/// });
/// ```
pub struct EventLoopBridge<T: ComponentHandle> {
    handle: EventLoopBridgeHandle<T>,
}

impl<T: ComponentHandle + 'static> EventLoopBridge<T> {
    /// Create a new EventLoopBridge
    ///
    /// Starts a handler thread that forwards queued updates to the Slint event
    /// loop. The thread stops once the event loop can no longer accept them or
    /// every sender is dropped.
    pub fn new(ui: &T, tokio_handle: tokio::runtime::Handle) -> Self {
        let ui_weak = ui.as_weak();
        let (ui_update_tx, mut ui_update_rx) = mpsc::channel::<UiUpdate<T>>(UI_UPDATE_CAPACITY);

        let ui_weak_clone = ui_weak.clone();
        std::thread::spawn(move || {
            tracing::debug!("EventLoopBridge handler thread started");

            while let Some(update_fn) = ui_update_rx.blocking_recv() {
                let result = ui_weak_clone.upgrade_in_event_loop(move |ui| {
                    update_fn(&ui);
                });

                if let Err(e) = result {
                    tracing::warn!("Failed to queue UI update to event loop: {:?}", e);
                    break;
                }
            }

            tracing::debug!("EventLoopBridge handler thread terminated");
        });

        Self {
            handle: EventLoopBridgeHandle {
                ui_weak,
                tokio_handle,
                ui_update_tx,
            },
        }
    }

    /// Schedule a UI update from any thread (typically from tokio tasks)
    pub fn update_ui<F>(&self, update: F)
    where
        F: FnOnce(&T) + Send + 'static,
    {
        self.handle.update_ui(update);
    }

    /// Spawn an async task on the tokio runtime from a Slint callback
    pub fn spawn_async<F, Fut>(&self, future_factory: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn_async(future_factory);
    }

    /// Cloneable handle for moving into callbacks and tasks.
    pub fn clone_handle(&self) -> EventLoopBridgeHandle<T> {
        self.handle.clone()
    }
}

/// Lightweight handle that can be cloned and passed to callbacks
pub struct EventLoopBridgeHandle<T: ComponentHandle> {
    ui_weak: Weak<T>,
    tokio_handle: tokio::runtime::Handle,
    ui_update_tx: mpsc::Sender<UiUpdate<T>>,
}

// Manual Clone implementation to avoid requiring T: Clone
impl<T: ComponentHandle> Clone for EventLoopBridgeHandle<T> {
    fn clone(&self) -> Self {
        Self {
            ui_weak: self.ui_weak.clone(),
            tokio_handle: self.tokio_handle.clone(),
            ui_update_tx: self.ui_update_tx.clone(),
        }
    }
}

impl<T: ComponentHandle + 'static> EventLoopBridgeHandle<T> {
    /// Schedule a UI update from any thread
    ///
    /// Never blocks: if the queue is full the update is dropped. Callers that
    /// must not lose an update (e.g. the final summary) should send state, not deltas.
    pub fn update_ui<F>(&self, update: F)
    where
        F: FnOnce(&T) + Send + 'static,
    {
        queue_update(&self.ui_update_tx, Box::new(update));
    }

    /// Spawn an async task on the tokio runtime
    pub fn spawn_async<F, Fut>(&self, future_factory: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tokio_handle.spawn(async move {
            future_factory().await;
        });
    }

    /// Weak reference to the UI component. Only upgrade it on the event loop thread.
    pub fn ui_weak(&self) -> &Weak<T> {
        &self.ui_weak
    }
}
