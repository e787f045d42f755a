//! An in-memory event source driven by the test.

use async_trait::async_trait;
use dockwatch::core::{
    EventSource, RawEvent, StreamError, Subscription, SubscriptionError,
};
use dockwatch::filters::FilterQuery;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// The test's side of a subscription.
pub struct StreamFeed {
    pub events: mpsc::Sender<RawEvent>,
    pub errors: mpsc::Sender<StreamError>,
}

impl StreamFeed {
    pub async fn send(&self, event: RawEvent) {
        self.events.send(event).await.unwrap();
    }

    pub async fn end(&self) {
        self.errors.send(StreamError::EndOfStream).await.unwrap();
    }
}

/// Creates a connected subscription and feed.
pub fn subscription() -> (Subscription, StreamFeed) {
    let (events_tx, events) = mpsc::channel(64);
    let (errors_tx, errors) = mpsc::channel(1);
    (
        Subscription { events, errors },
        StreamFeed {
            events: events_tx,
            errors: errors_tx,
        },
    )
}

/// Hands out a single prepared subscription, or refuses if `refuse` is set.
pub struct MockEventSource {
    subscription: Mutex<Option<Subscription>>,
    pub last_filter: Mutex<Option<FilterQuery>>,
    refuse: bool,
}

impl MockEventSource {
    pub fn new() -> (Self, StreamFeed) {
        let (subscription, feed) = subscription();
        let source = Self {
            subscription: Mutex::new(Some(subscription)),
            last_filter: Mutex::new(None),
            refuse: false,
        };
        (source, feed)
    }

    pub fn refusing() -> Self {
        Self {
            subscription: Mutex::new(None),
            last_filter: Mutex::new(None),
            refuse: true,
        }
    }
}

#[async_trait]
impl EventSource for MockEventSource {
    async fn subscribe(&self, filter: &FilterQuery) -> Result<Subscription, SubscriptionError> {
        *self.last_filter.lock().unwrap() = Some(filter.clone());
        if self.refuse {
            return Err(SubscriptionError::Rejected {
                status: 500,
                message: "daemon unavailable".to_string(),
            });
        }
        self.subscription
            .lock()
            .unwrap()
            .take()
            .ok_or(SubscriptionError::Closed)
    }
}
