//! Polling loop that republishes newly-received events to local subscribers.
//!
//! The watermark starts at process-start time: events received during downtime
//! before the first poll are never retroactively published. Known limitation,
//! kept deliberately.

use crate::core::{epoch_secs, EventNotification};
use crate::ledger::message::MessagePayload;
use crate::ledger::store::LedgerStore;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

#[derive(Debug)]
pub enum ObserveError {
    /// A fetched row could not be turned into a notification; the cycle is abandoned
    /// and the watermark left where it was.
    Payload(String),
    /// The notification channel is gone (the notifier stopped).
    ChannelClosed,
}

impl fmt::Display for ObserveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObserveError::Payload(msg) => write!(f, "Unable to publish event: {}", msg),
            ObserveError::ChannelClosed => write!(f, "Notification channel closed"),
        }
    }
}

impl std::error::Error for ObserveError {}

pub struct EventPublicationObserver {
    store: Arc<dyn LedgerStore>,
    notifications: UnboundedSender<EventNotification>,
    page_size: usize,
    last_poll: u64,
}

impl EventPublicationObserver {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        notifications: UnboundedSender<EventNotification>,
        page_size: usize,
    ) -> Self {
        EventPublicationObserver { store, notifications, page_size, last_poll: epoch_secs() }
    }

    pub fn last_poll(&self) -> u64 {
        self.last_poll
    }

    /// One poll cycle: fetch received events after the watermark, publish one
    /// notification per row, advance the watermark to the batch's max recorded time
    /// (or to now when the batch is empty).
    pub fn poll_once(&mut self) -> Result<usize, ObserveError> {
        info!(last_poll = self.last_poll, "retrieving events for publication since last successful poll");
        let rows = self.store.received_events_after(self.last_poll, self.page_size);
        info!(count = rows.len(), "events retrieved from incoming history for publication");

        if rows.is_empty() {
            self.last_poll = epoch_secs();
            return Ok(0);
        }

        let mut notifications = Vec::with_capacity(rows.len());
        let mut max_recorded = self.last_poll;
        for row in &rows {
            let content = match row.decoded_payload() {
                Ok(MessagePayload::Event(content)) => content,
                Ok(MessagePayload::FullEventRequest(_)) => {
                    return Err(ObserveError::Payload("unexpected payload variant".to_string()))
                }
                Err(err) => return Err(ObserveError::Payload(err.to_string())),
            };
            let event_type = content
                .event_type
                .ok_or_else(|| ObserveError::Payload("event payload without type".to_string()))?;
            let event_rdf = content
                .event_rdf
                .ok_or_else(|| ObserveError::Payload("event payload without RDF".to_string()))?;
            notifications.push(EventNotification {
                event_type,
                event_rdf,
                event_uuid: content.event_uuid,
            });
            max_recorded = max_recorded.max(row.recorded_time);
        }

        let published = notifications.len();
        for notification in notifications {
            self.notifications.send(notification).map_err(|_| ObserveError::ChannelClosed)?;
        }
        self.last_poll = max_recorded;
        Ok(published)
    }

    /// Periodic task entry point. A failing cycle is logged, never fatal.
    pub async fn run(mut self, initial_delay: Duration, interval: Duration) {
        tokio::time::sleep(initial_delay).await;
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match self.poll_once() {
                Ok(published) if published > 0 => {
                    info!(published, "published events to local subscribers")
                }
                Ok(_) => {}
                Err(ObserveError::ChannelClosed) => {
                    warn!("notification channel closed, stopping publication observer");
                    return;
                }
                Err(err) => warn!(error = %err, "failed to fetch events for publication"),
            }
        }
    }
}
