use std::{fmt, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Per-move time limit, chosen when the match is made.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Hash, Copy, Clone)]
pub enum TimeControl {
    #[serde(rename = "2m")]
    TwoMinutes,
    #[default]
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "24h")]
    TwentyFourHours,
}

impl TimeControl {
    pub fn limit(self) -> Duration {
        match self {
            TimeControl::TwoMinutes => Duration::minutes(2),
            TimeControl::FiveMinutes => Duration::minutes(5),
            TimeControl::TwelveHours => Duration::hours(12),
            TimeControl::TwentyFourHours => Duration::hours(24),
        }
    }

    pub fn is_fast(self) -> bool {
        matches!(self, TimeControl::TwoMinutes | TimeControl::FiveMinutes)
    }

    /// Time left for the player to move, never negative.
    pub fn remaining(self, last_move_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        let remaining = self.limit() - (now - last_move_at);
        remaining.max(Duration::zero())
    }

    pub fn is_expired(self, last_move_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - last_move_at > self.limit()
    }

    /// `MM:SS` for fast games, `HH:MM` for slow ones.
    pub fn format_remaining(self, remaining: Duration) -> String {
        let seconds = remaining.num_seconds().max(0);

        if self.is_fast() {
            format!("{:02}:{:02}", seconds / 60, seconds % 60)
        } else {
            format!("{:02}:{:02}", seconds / 3600, (seconds % 3600) / 60)
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeControl::TwoMinutes => "2m",
            TimeControl::FiveMinutes => "5m",
            TimeControl::TwelveHours => "12h",
            TimeControl::TwentyFourHours => "24h",
        }
    }
}

impl fmt::Display for TimeControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeControl {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "2m" => Ok(TimeControl::TwoMinutes),
            "5m" => Ok(TimeControl::FiveMinutes),
            "12h" => Ok(TimeControl::TwelveHours),
            "24h" => Ok(TimeControl::TwentyFourHours),
            other => Err(format!("unknown time control {:?}", other)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_remaining_and_expiry() {
        let start = Utc::now();
        let control = TimeControl::TwoMinutes;

        assert_eq!(
            control.remaining(start, start + Duration::seconds(30)),
            Duration::seconds(90)
        );
        assert!(!control.is_expired(start, start + Duration::minutes(2)));
        assert!(control.is_expired(start, start + Duration::seconds(121)));
        assert_eq!(
            control.remaining(start, start + Duration::minutes(10)),
            Duration::zero()
        );
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(
            TimeControl::FiveMinutes.format_remaining(Duration::seconds(4 * 60 + 7)),
            "04:07"
        );
        assert_eq!(
            TimeControl::TwelveHours.format_remaining(Duration::minutes(11 * 60 + 59)),
            "11:59"
        );
        assert_eq!(
            TimeControl::TwoMinutes.format_remaining(Duration::seconds(-3)),
            "00:00"
        );
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_value(TimeControl::TwelveHours).unwrap(), "12h");
        let parsed: TimeControl = serde_json::from_value("2m".into()).unwrap();
        assert_eq!(parsed, TimeControl::TwoMinutes);
        assert!("1h".parse::<TimeControl>().is_err());
        assert_eq!(TimeControl::default(), TimeControl::FiveMinutes);
    }
}
