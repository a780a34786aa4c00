use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

/// Roughly one display refresh at 60 Hz.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Cancellable frame-cadence timer driving progress updates.
///
/// The timer is armed by [`start`](Self::start) and built on the first
/// [`next_frame`](Self::next_frame), so arming needs no runtime. While
/// cancelled, `next_frame` never resolves, which lets it sit in a
/// `tokio::select!` without firing.
#[derive(Debug)]
pub struct FrameTicker {
    period: Duration,
    armed: bool,
    interval: Option<Interval>,
}

impl FrameTicker {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            armed: false,
            interval: None,
        }
    }

    pub fn start(&mut self) {
        self.armed = true;
        self.interval = None;
    }

    pub fn cancel(&mut self) {
        self.armed = false;
        self.interval = None;
    }

    pub fn is_active(&self) -> bool {
        self.armed
    }

    pub async fn next_frame(&mut self) {
        if !self.armed {
            return std::future::pending().await;
        }
        let period = self.period;
        let interval = self.interval.get_or_insert_with(|| {
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });
        interval.tick().await;
    }
}

impl Default for FrameTicker {
    fn default() -> Self {
        Self::new(FRAME_INTERVAL)
    }
}
