//! Ledger persistence boundary.
//!
//! The relational engine stays external; this trait is the contract the node needs
//! from it. The in-memory implementation serves standalone nodes and tests, and is
//! the single serialization point for concurrent status updates (writes go through
//! one lock, last writer wins on `status`).

use crate::ledger::message::{LedgerMessage, MessageStatus, MessageType};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use uuid::Uuid;

#[derive(Debug)]
pub enum LedgerStoreError {
    Storage(String),
}

impl fmt::Display for LedgerStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerStoreError::Storage(msg) => write!(f, "Ledger store error: {}", msg),
        }
    }
}

impl std::error::Error for LedgerStoreError {}

pub trait LedgerStore: Send + Sync {
    /// Insert a new row and return it with its assigned id. Always inserts,
    /// even for a message id already present.
    fn insert(&self, message: LedgerMessage) -> Result<LedgerMessage, LedgerStoreError>;

    /// Update the status of the row with the given message id. Unknown ids are a no-op.
    fn update_status(
        &self,
        message_id: Uuid,
        status: MessageStatus,
    ) -> Result<(), LedgerStoreError>;

    fn find_by_message_id(&self, message_id: Uuid) -> Option<LedgerMessage>;

    /// Page through all rows ordered by recorded time descending. `page` is 0-based.
    fn list(&self, page: usize, size: usize) -> Vec<LedgerMessage>;

    /// Page through rows whose status is in the given set, recorded time descending.
    fn list_by_status(
        &self,
        statuses: &[MessageStatus],
        page: usize,
        size: usize,
    ) -> Vec<LedgerMessage>;

    /// EVENT rows in status RECEIVED with recorded time strictly after the watermark,
    /// oldest first, bounded.
    fn received_events_after(&self, watermark: u64, limit: usize) -> Vec<LedgerMessage>;

    /// Rows of the given event type recorded strictly before the cutoff.
    fn find_of_type_before(&self, event_type: &str, cutoff: u64) -> Vec<LedgerMessage>;

    /// Delete rows of the given event type recorded strictly before the cutoff,
    /// returning how many went away.
    fn delete_of_type_before(&self, event_type: &str, cutoff: u64)
        -> Result<usize, LedgerStoreError>;
}

pub struct InMemoryLedgerStore {
    rows: RwLock<Vec<LedgerMessage>>,
    next_id: AtomicU64,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        InMemoryLedgerStore { rows: RwLock::new(Vec::new()), next_id: AtomicU64::new(1) }
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn insert(&self, mut message: LedgerMessage) -> Result<LedgerMessage, LedgerStoreError> {
        message.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.rows.write().unwrap();
        rows.push(message.clone());
        Ok(message)
    }

    fn update_status(
        &self,
        message_id: Uuid,
        status: MessageStatus,
    ) -> Result<(), LedgerStoreError> {
        let mut rows = self.rows.write().unwrap();
        if let Some(row) = rows.iter_mut().find(|r| r.message_id == message_id) {
            row.status = status;
        }
        Ok(())
    }

    fn find_by_message_id(&self, message_id: Uuid) -> Option<LedgerMessage> {
        self.rows.read().unwrap().iter().find(|r| r.message_id == message_id).cloned()
    }

    fn list(&self, page: usize, size: usize) -> Vec<LedgerMessage> {
        let rows = self.rows.read().unwrap();
        let mut ordered: Vec<LedgerMessage> = rows.clone();
        ordered.sort_by(|a, b| b.recorded_time.cmp(&a.recorded_time).then(b.id.cmp(&a.id)));
        ordered.into_iter().skip(page.saturating_mul(size)).take(size).collect()
    }

    fn list_by_status(
        &self,
        statuses: &[MessageStatus],
        page: usize,
        size: usize,
    ) -> Vec<LedgerMessage> {
        let rows = self.rows.read().unwrap();
        let mut ordered: Vec<LedgerMessage> =
            rows.iter().filter(|r| statuses.contains(&r.status)).cloned().collect();
        ordered.sort_by(|a, b| b.recorded_time.cmp(&a.recorded_time).then(b.id.cmp(&a.id)));
        ordered.into_iter().skip(page.saturating_mul(size)).take(size).collect()
    }

    fn received_events_after(&self, watermark: u64, limit: usize) -> Vec<LedgerMessage> {
        let rows = self.rows.read().unwrap();
        let mut selected: Vec<LedgerMessage> = rows
            .iter()
            .filter(|r| {
                r.message_type == MessageType::Event
                    && r.status == MessageStatus::Received
                    && r.recorded_time > watermark
            })
            .cloned()
            .collect();
        selected.sort_by(|a, b| a.recorded_time.cmp(&b.recorded_time).then(a.id.cmp(&b.id)));
        selected.truncate(limit);
        selected
    }

    fn find_of_type_before(&self, event_type: &str, cutoff: u64) -> Vec<LedgerMessage> {
        self.rows
            .read()
            .unwrap()
            .iter()
            .filter(|r| r.event_type.as_deref() == Some(event_type) && r.recorded_time < cutoff)
            .cloned()
            .collect()
    }

    fn delete_of_type_before(
        &self,
        event_type: &str,
        cutoff: u64,
    ) -> Result<usize, LedgerStoreError> {
        let mut rows = self.rows.write().unwrap();
        let before = rows.len();
        rows.retain(|r| !(r.event_type.as_deref() == Some(event_type) && r.recorded_time < cutoff));
        Ok(before - rows.len())
    }
}
