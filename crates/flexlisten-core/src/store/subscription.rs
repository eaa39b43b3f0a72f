// ── Store subscriptions ──
//
// Handles over the store's published snapshots: radios, stations, and
// the two picker lists. A snapshot is only published after a store
// operation has been fully applied.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

type Snapshot<T> = Arc<Vec<Arc<T>>>;

/// A subscription to one of the store's collections.
///
/// Holds the snapshot taken at subscription time and wakes on every
/// publish after it. Use [`changed`](Self::changed) directly or
/// [`into_stream`](Self::into_stream) for `StreamExt` combinators.
pub struct EntityStream<T: Send + Sync + 'static> {
    current: Snapshot<T>,
    receiver: watch::Receiver<Snapshot<T>>,
}

impl<T: Send + Sync + 'static> EntityStream<T> {
    pub(crate) fn new(mut receiver: watch::Receiver<Snapshot<T>>) -> Self {
        let current = receiver.borrow_and_update().clone();
        Self { current, receiver }
    }

    /// The snapshot captured at creation (or at the last `changed()`).
    pub fn current(&self) -> &Snapshot<T> {
        &self.current
    }

    /// The most recently published snapshot.
    pub fn latest(&self) -> Snapshot<T> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next publish. `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<Snapshot<T>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = Arc::clone(&snap);
        Some(snap)
    }

    /// Wait for a snapshot matching `predicate`, starting with the
    /// current one. `None` once the store is gone.
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(&[Arc<T>]) -> bool + Send,
    ) -> Option<Snapshot<T>> {
        if predicate(self.current.as_slice()) {
            return Some(Arc::clone(&self.current));
        }
        loop {
            let snap = self.changed().await?;
            if predicate(snap.as_slice()) {
                return Some(snap);
            }
        }
    }

    pub fn into_stream(self) -> EntityWatchStream<T> {
        EntityWatchStream {
            inner: WatchStream::from_changes(self.receiver),
        }
    }
}

/// `Stream` of snapshots published after the subscription was taken.
pub struct EntityWatchStream<T: Send + Sync + 'static> {
    inner: WatchStream<Snapshot<T>>,
}

impl<T: Send + Sync + 'static> Stream for EntityWatchStream<T> {
    type Item = Snapshot<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
