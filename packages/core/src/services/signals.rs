//! Page Move Signals
//!
//! Synchronous observer hooks fired around a page move. Receivers run in
//! registration order on the caller's task, return nothing and cannot veto
//! the operation.
//!
//! # Examples
//!
//! ```rust
//! use canopy_core::services::PageSignals;
//!
//! let signals = PageSignals::default();
//! let handle = signals.post_page_move.connect(|event| {
//!     println!("{} -> {}", event.url_path_before, event.url_path_after);
//! });
//! signals.post_page_move.disconnect(handle);
//! ```

use std::sync::{Arc, RwLock};

use crate::models::Page;

/// Receiver callback type
pub type SignalReceiver<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Handle returned by [`Signal::connect`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReceiverHandle(u64);

struct Registry<E> {
    next_id: u64,
    receivers: Vec<(ReceiverHandle, SignalReceiver<E>)>,
}

/// A list of receivers for one kind of event
pub struct Signal<E> {
    registry: RwLock<Registry<E>>,
}

impl<E> Default for Signal<E> {
    fn default() -> Self {
        Self {
            registry: RwLock::new(Registry {
                next_id: 0,
                receivers: Vec::new(),
            }),
        }
    }
}

impl<E> std::fmt::Debug for Signal<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("receivers", &self.receiver_count())
            .finish()
    }
}

impl<E> Signal<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect<F>(&self, receiver: F) -> ReceiverHandle
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut registry = self.registry.write().unwrap_or_else(|p| p.into_inner());
        let handle = ReceiverHandle(registry.next_id);
        registry.next_id += 1;
        registry.receivers.push((handle, Arc::new(receiver)));
        handle
    }

    /// Remove a receiver; returns false if the handle was not connected
    pub fn disconnect(&self, handle: ReceiverHandle) -> bool {
        let mut registry = self.registry.write().unwrap_or_else(|p| p.into_inner());
        let before = registry.receivers.len();
        registry.receivers.retain(|(h, _)| *h != handle);
        registry.receivers.len() != before
    }

    pub fn receiver_count(&self) -> usize {
        self.registry
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .receivers
            .len()
    }

    /// Invoke every receiver in registration order
    ///
    /// The lock is released before receivers run, so a receiver may connect
    /// or disconnect without deadlocking.
    pub fn send(&self, event: &E) {
        let receivers: Vec<SignalReceiver<E>> = self
            .registry
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .receivers
            .iter()
            .map(|(_, r)| Arc::clone(r))
            .collect();
        for receiver in receivers {
            receiver(event);
        }
    }
}

/// Payload of the pre- and post-move signals
#[derive(Debug, Clone)]
pub struct PageMoveEvent {
    /// Pre-transaction state for `pre_page_move`, committed state for `post_page_move`
    pub page: Page,
    pub parent_before: Option<Page>,
    pub parent_after: Option<Page>,
    pub url_path_before: String,
    pub url_path_after: String,
}

impl PageMoveEvent {
    /// True when the page keeps its parent
    pub fn is_reorder(&self) -> bool {
        self.parent_before.as_ref().map(|p| p.id) == self.parent_after.as_ref().map(|p| p.id)
    }
}

#[derive(Debug, Default)]
pub struct PageSignals {
    pub pre_page_move: Signal<PageMoveEvent>,
    pub post_page_move: Signal<PageMoveEvent>,
}
