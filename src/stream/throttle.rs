//! Latest-wins stream throttling

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior, interval};

/// Extension trait to add throttling to any Stream
pub trait ThrottleExt: Stream {
    /// Emit at most one item per `period`.
    ///
    /// Items that arrive faster are collapsed: only the most recent one is
    /// yielded at the next tick. The final item before the source ends is
    /// always delivered.
    fn throttle(self, period: Duration) -> Throttle<Self>
    where
        Self: Sized,
    {
        Throttle::new(self, period)
    }
}

impl<T: Stream> ThrottleExt for T {}

pin_project! {
    /// Stream returned by [`ThrottleExt::throttle`]
    pub struct Throttle<S: Stream> {
        #[pin]
        stream: S,
        interval: Interval,
        latest: Option<S::Item>,
        finished: bool,
    }
}

impl<S: Stream> Throttle<S> {
    pub fn new(stream: S, period: Duration) -> Self {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { stream, interval, latest: None, finished: false }
    }
}

impl<S: Stream> Stream for Throttle<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        while !*this.finished {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => *this.latest = Some(item),
                Poll::Ready(None) => *this.finished = true,
                Poll::Pending => break,
            }
        }

        if *this.finished {
            return Poll::Ready(this.latest.take());
        }
        if this.latest.is_none() {
            // The source registered the waker.
            return Poll::Pending;
        }

        ready!(this.interval.poll_tick(cx));
        Poll::Ready(this.latest.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;

    #[tokio::test(start_paused = true)]
    async fn bursts_collapse_to_latest() {
        let (tx, rx) = mpsc::channel(16);
        let mut throttled = ReceiverStream::new(rx).throttle(Duration::from_millis(100));

        tx.send(1).await.unwrap();
        assert_eq!(throttled.next().await, Some(1));

        for i in 2..=5 {
            tx.send(i).await.unwrap();
        }
        assert_eq!(throttled.next().await, Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_source_does_not_end_stream() {
        let (tx, rx) = mpsc::channel(4);
        let mut throttled = ReceiverStream::new(rx).throttle(Duration::from_millis(10));

        let pending = tokio::time::timeout(Duration::from_millis(50), throttled.next()).await;
        assert!(pending.is_err(), "stream must wait for the source");

        tx.send(7).await.unwrap();
        assert_eq!(throttled.next().await, Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn last_item_is_flushed_on_close() {
        let (tx, rx) = mpsc::channel(4);
        let mut throttled = ReceiverStream::new(rx).throttle(Duration::from_secs(60));

        tx.send(1).await.unwrap();
        assert_eq!(throttled.next().await, Some(1));
        tx.send(2).await.unwrap();
        tx.send(3).await.unwrap();
        drop(tx);
        assert_eq!(throttled.next().await, Some(3));
        assert_eq!(throttled.next().await, None);
    }
}
