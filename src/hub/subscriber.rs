//! Viewer handle with implicit leave on drop.

use std::sync::Arc;

use crate::hub::registry::{Hub, SubscriberId};

/// A viewer registered with the [`Hub`].
///
/// Dropping it removes the viewer from every namespace it joined.
pub struct Subscriber {
    id: SubscriberId,
    hub: Arc<Hub>,
}

impl Subscriber {
    pub(crate) fn new(id: SubscriberId, hub: Arc<Hub>) -> Self {
        Self { id, hub }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Join `namespace`. Returns false if this viewer was already evicted.
    pub fn join(&self, namespace: &str) -> bool {
        self.hub.join(self.id, namespace)
    }

    pub fn leave(&self, namespace: &str) -> bool {
        self.hub.leave(self.id, namespace)
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.hub.remove(self.id);
        tracing::trace!(viewer = %self.id, "Viewer left");
    }
}
