use std::time::{Duration, Instant};

pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

pub struct FrameTiming {
    last_frame_time: Option<Instant>,
    last_fps_time: Instant,
    frame_count: u32,
    pub frame_dt: f32,
    render_ms: f32,
    frames_total: u64,
}

impl FrameTiming {
    pub fn new(now: Instant) -> Self {
        Self {
            last_frame_time: None,
            last_fps_time: now,
            frame_count: 0,
            frame_dt: 1.0 / 60.0,
            render_ms: 0.0,
            frames_total: 0,
        }
    }

    pub fn set_render_ms(&mut self, render_ms: f32) {
        self.render_ms = render_ms;
    }

    pub fn frames_total(&self) -> u64 {
        self.frames_total
    }

    pub fn update(&mut self, now: Instant) {
        let dt_duration = if let Some(last) = self.last_frame_time {
            now.saturating_duration_since(last)
        } else {
            FRAME_INTERVAL
        };
        self.last_frame_time = Some(now);
        self.frame_dt = dt_duration.as_secs_f32().max(0.0);
        self.frames_total += 1;

        self.frame_count = self.frame_count.saturating_add(1);
        let elapsed = now.saturating_duration_since(self.last_fps_time);
        if elapsed.as_secs_f32() >= 5.0 {
            let fps = self.frame_count as f32 / elapsed.as_secs_f32();
            log::debug!(
                "{:.1} fps (cadence {:.2} ms, render {:.2} ms)",
                fps,
                self.frame_dt * 1000.0,
                self.render_ms
            );
            self.frame_count = 0;
            self.last_fps_time = now;
        }
    }

    /// Time left until the next frame is due.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last_frame_time {
            Some(last) => FRAME_INTERVAL.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }
}

/// Coalesces bursts of updates: only the latest value is released, once `window` has
/// passed without another push.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    window: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    pub fn push(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now));
    }

    pub fn poll(&mut self, now: Instant) -> Option<T> {
        let (_, at) = self.pending.as_ref()?;
        if now.saturating_duration_since(*at) < self.window {
            return None;
        }
        self.pending.take().map(|(value, _)| value)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::{Debouncer, FrameTiming, FRAME_INTERVAL};
    use std::time::{Duration, Instant};

    #[test]
    fn debouncer_releases_only_latest_after_quiet_window() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(50));
        debouncer.push(1, start);
        debouncer.push(2, start + Duration::from_millis(30));
        assert_eq!(debouncer.poll(start + Duration::from_millis(60)), None);
        assert_eq!(debouncer.poll(start + Duration::from_millis(80)), Some(2));
        assert_eq!(debouncer.poll(start + Duration::from_millis(500)), None);
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn timing_counts_frames_and_paces() {
        let start = Instant::now();
        let mut timing = FrameTiming::new(start);
        assert_eq!(timing.remaining(start), Duration::ZERO);
        timing.update(start);
        timing.update(start + Duration::from_millis(20));
        assert_eq!(timing.frames_total(), 2);
        assert!((timing.frame_dt - 0.020).abs() < 1e-4);
        assert_eq!(
            timing.remaining(start + Duration::from_millis(24)),
            FRAME_INTERVAL - Duration::from_millis(4)
        );
    }
}
