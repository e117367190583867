//! Change broadcasting
//!
//! Listeners are invoked synchronously from the thread that closes the
//! batch. A listener that panics is logged and does not abort the flush
//! or starve the remaining listeners.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, trace};

use crate::resource::Resource;

/// Receives the set of resources whose sync information changed. No
/// ordering between a folder and its descendants is promised.
pub trait SyncChangeListener: Send + Sync {
    fn sync_info_changed(&self, resources: &[Resource]);
}

#[derive(Default)]
pub struct ChangeBroadcaster {
    listeners: RwLock<Vec<Arc<dyn SyncChangeListener>>>,
}

impl ChangeBroadcaster {
    pub fn new() -> Self {
        ChangeBroadcaster::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn SyncChangeListener>) {
        self.listeners.write().push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn SyncChangeListener>) {
        self.listeners
            .write()
            .retain(|existing| !Arc::ptr_eq(existing, listener));
    }

    /// Fan the change set out to every registered listener.
    pub fn broadcast(&self, resources: &[Resource]) {
        if resources.is_empty() {
            return;
        }
        let listeners: Vec<_> = self.listeners.read().clone();
        trace!(resources = resources.len(), listeners = listeners.len(), "broadcasting sync changes");
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener.sync_info_changed(resources))).is_err() {
                error!("sync change listener panicked; continuing with remaining listeners");
            }
        }
    }
}
