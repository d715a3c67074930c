//! Open requests visible to an online responder.

use std::collections::HashMap;

use tracing::debug;

use crate::model::{EmergencyRequest, RequestId, RequestStatus};

#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    request: EmergencyRequest,
}

/// Keyed by request id. Arrival order is kept only for display.
#[derive(Debug, Default)]
pub struct PendingRequestRegistry {
    entries: HashMap<RequestId, Entry>,
    next_seq: u64,
}

impl PendingRequestRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the registry with a fresh snapshot. Requests that are no longer open are skipped.
    pub fn replace_all(&mut self, list: impl IntoIterator<Item = EmergencyRequest>) {
        self.entries.clear();
        for request in list {
            self.append(request);
        }
        debug!(count = self.entries.len(), "pending snapshot applied");
    }

    /// Adds a new request, or refreshes one already listed in place.
    /// Returns `true` when the registry grew.
    pub fn append(&mut self, request: EmergencyRequest) -> bool {
        if request.status != RequestStatus::Pending {
            self.entries.remove(&request.id);
            return false;
        }
        if let Some(entry) = self.entries.get_mut(&request.id) {
            entry.request = request;
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(request.id.clone(), Entry { seq, request });
        true
    }

    pub fn remove(&mut self, id: &RequestId) -> Option<EmergencyRequest> {
        self.entries.remove(id).map(|entry| entry.request)
    }

    /// Applies a status change. Anything other than `pending` means the request is no
    /// longer open, so it leaves the registry and can no longer be accepted from here.
    pub fn update_status(&mut self, id: &RequestId, status: RequestStatus) -> Option<EmergencyRequest> {
        if status == RequestStatus::Pending {
            if let Some(entry) = self.entries.get_mut(id) {
                entry.request.status = RequestStatus::Pending;
                entry.request.assigned_vehicle_id = None;
            }
            return None;
        }
        self.remove(id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn get(&self, id: &RequestId) -> Option<&EmergencyRequest> {
        self.entries.get(id).map(|entry| &entry.request)
    }

    #[must_use]
    pub fn contains(&self, id: &RequestId) -> bool {
        self.entries.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Requests in arrival order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<EmergencyRequest> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by_key(|entry| entry.seq);
        entries.into_iter().map(|entry| entry.request.clone()).collect()
    }
}
