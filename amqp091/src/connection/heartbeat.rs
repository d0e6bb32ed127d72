//! Implements an asynchronous heartbeat

use std::{task::Poll, time::Duration};

use futures_util::Stream;
use pin_project_lite::pin_project;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;

pin_project! {
    /// A wrapper over an `Option<IntervalStream>` which will never tick ready if the underlying
    /// `Interval` is `None`
    #[derive(Debug)]
    pub struct HeartBeat {
        #[pin]
        interval: Option<IntervalStream>,
        timeout: Option<Duration>,
    }
}

impl HeartBeat {
    /// A [`HeartBeat`] that will never yield `Poll::Ready(_)` with `StreamExt::next()`
    pub fn never() -> Self {
        Self {
            interval: None,
            timeout: None,
        }
    }

    /// A [`HeartBeat`] for the negotiated heartbeat interval in seconds
    ///
    /// Ticks every half interval. The peer is considered dead after two intervals of silence.
    pub fn new(heartbeat: u16) -> Self {
        if heartbeat == 0 {
            return Self::never();
        }
        let negotiated = Duration::from_secs(heartbeat as u64);
        let period = negotiated / 2;
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval: Some(IntervalStream::new(interval)),
            timeout: Some(negotiated * 2),
        }
    }

    /// Whether the heartbeat ever ticks
    pub fn is_enabled(&self) -> bool {
        self.interval.is_some()
    }

    /// Whether the peer has been silent for too long since `last_received`
    pub fn is_expired(&self, last_received: Instant) -> bool {
        match self.timeout {
            Some(timeout) => last_received.elapsed() > timeout,
            None => false,
        }
    }
}

impl Stream for HeartBeat {
    type Item = Instant;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        let this = self.project();
        match this.interval.as_pin_mut() {
            Some(stream) => stream.poll_next(cx),
            None => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::StreamExt;
    use tokio::time::Instant;

    use super::HeartBeat;

    #[tokio::test(start_paused = true)]
    async fn ticks_every_half_interval() {
        let mut heartbeat = HeartBeat::new(10);
        assert!(heartbeat.is_enabled());

        let start = Instant::now();
        heartbeat.next().await;
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        heartbeat.next().await;
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn expires_after_two_intervals() {
        let heartbeat = HeartBeat::new(10);
        let last_received = Instant::now();
        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(!heartbeat.is_expired(last_received));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(heartbeat.is_expired(last_received));
    }

    #[test]
    fn zero_disables_heartbeat() {
        let heartbeat = HeartBeat::new(0);
        assert!(!heartbeat.is_enabled());
        assert!(!heartbeat.is_expired(Instant::now()));
    }
}
