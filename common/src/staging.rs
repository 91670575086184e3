use chrono::{DateTime, Duration, Utc};

/// Bounds a continuous heat or cool run and the mandatory rest after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTracker {
    stage_started_at: DateTime<Utc>,
    delay_until: DateTime<Utc>,
}

impl StageTracker {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            stage_started_at: now - Duration::minutes(1),
            delay_until: now,
        }
    }

    pub fn stage_started_at(&self) -> DateTime<Utc> {
        self.stage_started_at
    }

    pub fn delay_until(&self) -> DateTime<Utc> {
        self.delay_until
    }

    pub fn start(&mut self, now: DateTime<Utc>) {
        self.stage_started_at = now;
    }

    pub fn runtime(&self, now: DateTime<Utc>) -> Duration {
        (now - self.stage_started_at).max(Duration::zero())
    }

    pub fn limit_exceeded(&self, now: DateTime<Utc>, limit_minutes: u32) -> bool {
        now - self.stage_started_at > minutes(limit_minutes)
    }

    pub fn begin_cooldown(&mut self, now: DateTime<Utc>, cooldown_minutes: u32) {
        self.delay_until = now + minutes(cooldown_minutes);
    }

    pub fn in_delay(&self, now: DateTime<Utc>) -> bool {
        now < self.delay_until
    }

    pub fn delay_remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.delay_until - now).max(Duration::zero())
    }
}

pub(crate) fn minutes(value: u32) -> Duration {
    Duration::minutes(i64::from(value))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap() + Duration::minutes(minute)
    }

    #[test]
    fn fresh_tracker_has_no_delay() {
        let stage = StageTracker::new(at(0));
        assert!(!stage.in_delay(at(0)));
        assert_eq!(stage.stage_started_at(), at(-1));
    }

    #[test]
    fn limit_is_exceeded_only_past_boundary() {
        let mut stage = StageTracker::new(at(0));
        stage.start(at(0));

        assert!(!stage.limit_exceeded(at(15), 15));
        assert!(stage.limit_exceeded(at(15) + Duration::seconds(1), 15));
    }

    #[test]
    fn cooldown_window_is_half_open() {
        let mut stage = StageTracker::new(at(0));
        stage.begin_cooldown(at(20), 5);

        assert!(stage.in_delay(at(20)));
        assert!(stage.in_delay(at(24)));
        assert!(!stage.in_delay(at(25)));
        assert_eq!(stage.delay_remaining(at(22)), Duration::minutes(3));
        assert_eq!(stage.delay_remaining(at(30)), Duration::zero());
    }
}
