// Selected history range and the matching query resolution
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "u32")]
pub struct TimeRange {
    minutes: u32,
}

impl TimeRange {
    pub const DAY: TimeRange = TimeRange { minutes: 1440 };
    pub const WEEK: TimeRange = TimeRange { minutes: 10080 };
    pub const MONTH: TimeRange = TimeRange { minutes: 43200 };

    pub fn from_minutes(minutes: u32) -> Self {
        Self {
            minutes: minutes.max(1),
        }
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    pub fn as_secs(&self) -> i64 {
        i64::from(self.minutes) * 60
    }

    /// Query step the backend should aggregate to, coarser for longer ranges
    pub fn default_step(&self) -> &'static str {
        match self.minutes {
            m if m >= 10080 => "2h",
            m if m >= 1440 => "15m",
            m if m >= 720 => "8m",
            _ => "1m",
        }
    }
}

impl From<u32> for TimeRange {
    fn from(minutes: u32) -> Self {
        Self::from_minutes(minutes)
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::DAY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_step_thresholds() {
        assert_eq!(TimeRange::from_minutes(60).default_step(), "1m");
        assert_eq!(TimeRange::from_minutes(720).default_step(), "8m");
        assert_eq!(TimeRange::DAY.default_step(), "15m");
        assert_eq!(TimeRange::WEEK.default_step(), "2h");
        assert_eq!(TimeRange::MONTH.default_step(), "2h");
    }

    #[test]
    fn test_zero_minutes_is_clamped() {
        assert_eq!(TimeRange::from_minutes(0).minutes(), 1);
        assert_eq!(TimeRange::from_minutes(2).as_secs(), 120);
    }
}
