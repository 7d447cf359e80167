//! Change stream fan-out.
//!
//! Every storage instance owns one [`ChangeFeed`]. Bulk writes publish an
//! [`EventBulk`] to it; any number of [`ChangeStream`] subscribers receive
//! each batch. Publishing never waits: a subscriber that falls more than the
//! channel capacity behind skips the oldest batches and is told how many.

use futures::Stream;
use pgdoc_engine::EventBulk;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// Publishing side of a change stream.
#[derive(Debug)]
pub struct ChangeFeed {
    /// `None` once closed
    sender: Mutex<Option<broadcast::Sender<Arc<EventBulk>>>>,
}

impl ChangeFeed {
    /// Open a feed buffering up to `capacity` batches per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Mutex::new(Some(sender)),
        }
    }

    /// Send a batch to every current subscriber. Returns how many received it.
    pub fn publish(&self, bulk: EventBulk) -> usize {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(sender) => sender.send(Arc::new(bulk)).unwrap_or(0),
            None => 0,
        }
    }

    /// New subscriber, or `None` after [`close`](Self::close).
    pub fn subscribe(&self) -> Option<ChangeStream> {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map(|sender| ChangeStream {
            receiver: sender.subscribe(),
        })
    }

    pub fn subscriber_count(&self) -> usize {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map(|s| s.receiver_count()).unwrap_or(0)
    }

    /// Complete the feed. Subscribers drain what was already sent, then end.
    ///
    /// Returns `true` only for the call that actually closed it.
    pub fn close(&self) -> bool {
        let mut guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        guard.take().is_some()
    }

    pub fn is_closed(&self) -> bool {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        guard.is_none()
    }
}

/// Subscribing side of a change stream.
#[derive(Debug)]
pub struct ChangeStream {
    receiver: broadcast::Receiver<Arc<EventBulk>>,
}

impl ChangeStream {
    /// Wait for the next batch. `None` once the feed is closed and drained.
    pub async fn next(&mut self) -> Option<Arc<EventBulk>> {
        loop {
            match self.receiver.recv().await {
                Ok(bulk) => return Some(bulk),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Change stream subscriber lagged, batches dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next batch if one is ready, without waiting.
    pub fn try_next(&mut self) -> Option<Arc<EventBulk>> {
        loop {
            match self.receiver.try_recv() {
                Ok(bulk) => return Some(bulk),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Change stream subscriber lagged, batches dropped");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Adapt into a [`Stream`] that ends when the feed closes.
    pub fn into_stream(self) -> impl Stream<Item = Arc<EventBulk>> + Send + Unpin {
        Box::pin(futures::stream::unfold(self, |mut stream| async move {
            stream.next().await.map(|bulk| (bulk, stream))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn bulk(id: &str) -> EventBulk {
        EventBulk::new(id, Vec::new(), "test")
    }

    #[tokio::test]
    async fn every_subscriber_gets_each_batch() {
        let feed = ChangeFeed::new(8);
        let mut first = feed.subscribe().unwrap();
        let mut second = feed.subscribe().unwrap();

        assert_eq!(feed.publish(bulk("b1")), 2);
        assert_eq!(first.next().await.unwrap().id, "b1");
        assert_eq!(second.next().await.unwrap().id, "b1");
    }

    #[tokio::test]
    async fn close_completes_streams_once() {
        let feed = ChangeFeed::new(8);
        let stream = feed.subscribe().unwrap();
        feed.publish(bulk("b1"));

        assert!(feed.close());
        assert!(!feed.close());
        assert!(feed.is_closed());
        assert!(feed.subscribe().is_none());
        assert_eq!(feed.publish(bulk("b2")), 0);

        let ids: Vec<String> = stream.into_stream().map(|b| b.id.clone()).collect().await;
        assert_eq!(ids, vec!["b1"]);
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_oldest() {
        let feed = ChangeFeed::new(2);
        let mut stream = feed.subscribe().unwrap();
        for i in 0..5 {
            feed.publish(bulk(&format!("b{i}")));
        }

        assert_eq!(stream.next().await.unwrap().id, "b3");
        assert_eq!(stream.try_next().unwrap().id, "b4");
        assert!(stream.try_next().is_none());
    }

    #[test]
    fn publish_without_subscribers() {
        let feed = ChangeFeed::new(4);
        assert_eq!(feed.publish(bulk("b1")), 0);
        assert_eq!(feed.subscriber_count(), 0);

        let _stream = feed.subscribe().unwrap();
        assert_eq!(feed.subscriber_count(), 1);
    }
}
