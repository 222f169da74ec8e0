//! Single process-wide monotonic ticker (§4.1). One `ClockTask` feeds a
//! `broadcast` channel; every sampler subscribes before the first tick, and
//! all components share one `watch<bool>` stop signal for cooperative
//! cancellation (SIGINT/SIGTERM or a detector-confirmed bottleneck).

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, Duration, MissedTickBehavior};

/// One tick of the clock: a monotone sequence number and wall-clock time.
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    pub seq: u64,
    pub at: DateTime<Utc>,
}

/// Process-wide stop signal shared by SIGINT/SIGTERM handling and a
/// detector-confirmed bottleneck (§5).
pub type StopSignal = watch::Receiver<bool>;

pub fn new_stop_channel() -> (watch::Sender<bool>, StopSignal) {
    watch::channel(false)
}

/// Drives the broadcast channel at `interval` until told to stop.
pub struct ClockTask {
    interval: Duration,
    tx: broadcast::Sender<Tick>,
}

impl ClockTask {
    /// `capacity` bounds the broadcast channel; it should comfortably
    /// exceed the sampler count so a briefly slow subscriber doesn't lag
    /// off the channel.
    pub fn new(tick_interval: Duration, capacity: usize) -> (Self, broadcast::Sender<Tick>) {
        let (tx, _rx) = broadcast::channel(capacity);
        (
            ClockTask {
                interval: tick_interval,
                tx: tx.clone(),
            },
            tx,
        )
    }

    /// Runs until `stop` fires. Every sampler must have subscribed to the
    /// sender returned from `new` before calling this — a late subscriber
    /// only sees ticks from the point it joined.
    pub async fn run(self, mut stop: StopSignal) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut seq: u64 = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let tick = Tick { seq, at: Utc::now() };
                    seq += 1;
                    // No subscribers is not an error; it just means nothing
                    // is sampling yet (e.g. during shutdown drain).
                    let _ = self.tx.send(tick);
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn ticks_fire_and_stop_signal_halts_loop() {
        let (clock, tx) = ClockTask::new(Duration::from_millis(10), 8);
        let mut rx = tx.subscribe();
        let (stop_tx, stop_rx) = new_stop_channel();

        let handle = tokio::spawn(clock.run(stop_rx));

        let t1 = rx.recv().await.unwrap();
        let t2 = rx.recv().await.unwrap();
        assert!(t2.seq > t1.seq);

        stop_tx.send(true).unwrap();
        tokio::time::timeout(StdDuration::from_millis(500), handle)
            .await
            .expect("clock task should stop promptly")
            .unwrap();
    }
}
