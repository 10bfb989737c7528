//! Move coordination between tree views.
//!
//! Views of different collections register here and receive a
//! [`MoveNotification`] whenever a node leaves or enters their collection,
//! so a view can clear drop indicators or scroll to the moved node without
//! listening on a process-wide channel.

use crate::drag::Operation;
use crate::tree::EntryPath;
use crate::types::{CollectionId, EntryId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::trace;

/// One end of a move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveEndpoint {
    pub collection_id: CollectionId,
    /// Path of the parent directory.
    pub parent_path: EntryPath,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveNotification {
    pub moved: EntryId,
    pub operation: Option<Operation>,
    pub from: MoveEndpoint,
    pub to: MoveEndpoint,
    pub at: DateTime<Utc>,
}

impl MoveNotification {
    pub fn concerns(&self, collection_id: &CollectionId) -> bool {
        &self.from.collection_id == collection_id || &self.to.collection_id == collection_id
    }
}

struct Registration {
    collection_id: CollectionId,
    sender: mpsc::UnboundedSender<MoveNotification>,
}

/// A registered view's inbox. Dropping it unregisters the view.
pub struct ViewHandle {
    collection_id: CollectionId,
    receiver: mpsc::UnboundedReceiver<MoveNotification>,
}

impl ViewHandle {
    pub fn collection_id(&self) -> &CollectionId {
        &self.collection_id
    }

    pub async fn recv(&mut self) -> Option<MoveNotification> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<MoveNotification> {
        self.receiver.try_recv().ok()
    }
}

#[derive(Default)]
pub struct MoveCoordinator {
    views: Mutex<Vec<Registration>>,
}

impl MoveCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, collection_id: CollectionId) -> ViewHandle {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.views.lock().push(Registration {
            collection_id: collection_id.clone(),
            sender,
        });
        ViewHandle {
            collection_id,
            receiver,
        }
    }

    /// Deliver to every view of the source or destination collection.
    /// Returns the number of views reached.
    pub fn publish(&self, notification: &MoveNotification) -> usize {
        let mut views = self.views.lock();
        views.retain(|view| !view.sender.is_closed());
        let mut delivered = 0;
        for view in views.iter() {
            if notification.concerns(&view.collection_id)
                && view.sender.send(notification.clone()).is_ok()
            {
                delivered += 1;
            }
        }
        trace!(moved = %notification.moved, delivered, "Published move");
        delivered
    }

    pub fn view_count(&self) -> usize {
        let mut views = self.views.lock();
        views.retain(|view| !view.sender.is_closed());
        views.len()
    }
}
