//! SSR time-proportioning
//!
//! Turns a 0–100 % duty into on/off decisions over a fixed window. The
//! window restarts every period; on-times shorter than the minimum are
//! dropped to zero so the SSR does not chatter.

use crate::config::ChannelConfig;

#[derive(Debug, Clone)]
pub struct TimeProportioner {
    period_ms: u32,
    min_on_ms: u32,
    window_start_ms: Option<u64>,
}

impl TimeProportioner {
    pub fn new(config: &ChannelConfig) -> Self {
        Self {
            period_ms: config.ssr_period_ms.max(1),
            min_on_ms: config.ssr_min_on_ms,
            window_start_ms: None,
        }
    }

    /// On-time within one window for `duty_percent`.
    pub fn on_time_ms(&self, duty_percent: f32) -> u32 {
        let duty = if duty_percent.is_nan() {
            0.0
        } else {
            duty_percent.clamp(0.0, 100.0)
        };
        let on = (duty / 100.0 * self.period_ms as f32) as u32;
        if on < self.min_on_ms { 0 } else { on.min(self.period_ms) }
    }

    /// Whether the output should be on at `now_ms`.
    pub fn is_on(&mut self, duty_percent: f32, now_ms: u64) -> bool {
        let period = u64::from(self.period_ms);
        let start = match self.window_start_ms {
            Some(start) if now_ms.saturating_sub(start) < period => start,
            Some(start) => {
                // Skip whole windows if updates were late.
                let elapsed = now_ms.saturating_sub(start);
                start + elapsed - elapsed % period
            }
            None => now_ms,
        };
        self.window_start_ms = Some(start);
        now_ms - start < u64::from(self.on_time_ms(duty_percent))
    }

    /// Start a fresh window on the next call.
    pub fn restart(&mut self) {
        self.window_start_ms = None;
    }

    pub fn period_ms(&self) -> u32 {
        self.period_ms
    }
}
