//! Active-hours window in a configured IANA time zone.
//!
//! Heartbeats, cron firing, and proactive hints are all host-originated
//! noise; the active-hours window keeps them inside the operator's
//! waking hours. The window is half-open `[start, end)` in the given
//! zone, with overnight wrap supported (`22:00`-`06:00`).

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub tz: Tz,
}

impl ActiveHours {
    pub fn new(start: NaiveTime, end: NaiveTime, tz: Tz) -> Self {
        Self { start, end, tz }
    }

    /// Parse from `HH:MM`, `HH:MM`, and an IANA zone name.
    pub fn parse(start: &str, end: &str, tz: &str) -> Result<Self, SchedulerError> {
        let tz: Tz = tz
            .parse()
            .map_err(|_| SchedulerError::UnknownTimeZone(tz.to_string()))?;
        let parse_time = |s: &str| {
            NaiveTime::parse_from_str(s, "%H:%M").map_err(|_| SchedulerError::InvalidCron {
                expr: s.to_string(),
                reason: "expected HH:MM".into(),
            })
        };
        Ok(Self::new(parse_time(start)?, parse_time(end)?, tz))
    }

    /// A window that never closes (start == end).
    pub fn always(tz: Tz) -> Self {
        let midnight = NaiveTime::from_hms_opt(0, 0, 0).expect("midnight is valid");
        Self::new(midnight, midnight, tz)
    }

    /// Is the instant inside the window, evaluated in the configured
    /// zone?
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        if self.start == self.end {
            return true;
        }
        let local = at.with_timezone(&self.tz).time();
        if self.start < self.end {
            self.start <= local && local < self.end
        } else {
            // Overnight window: active until `end`, resuming at `start`.
            local >= self.start || local < self.end
        }
    }

    /// The zone this window is evaluated in.
    pub fn tz(&self) -> Tz {
        self.tz
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(tz: Tz, h: u32, m: u32) -> DateTime<Utc> {
        tz.with_ymd_and_hms(2026, 6, 15, h, m, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_daytime_window() {
        let hours = ActiveHours::parse("09:00", "22:00", "America/New_York").unwrap();
        let tz = hours.tz();
        assert!(hours.contains(at(tz, 9, 0)));
        assert!(hours.contains(at(tz, 15, 30)));
        assert!(!hours.contains(at(tz, 22, 0)));
        assert!(!hours.contains(at(tz, 3, 0)));
    }

    #[test]
    fn test_overnight_wrap() {
        let hours = ActiveHours::parse("22:00", "06:00", "UTC").unwrap();
        let tz = hours.tz();
        assert!(hours.contains(at(tz, 23, 0)));
        assert!(hours.contains(at(tz, 2, 0)));
        assert!(!hours.contains(at(tz, 12, 0)));
        assert!(!hours.contains(at(tz, 6, 0)));
    }

    #[test]
    fn test_always_open() {
        let hours = ActiveHours::always(chrono_tz::UTC);
        assert!(hours.contains(Utc::now()));
    }

    #[test]
    fn test_zone_conversion_matters() {
        // 13:00 UTC is 22:00 in Tokyo: inside a Tokyo evening window,
        // outside a UTC one.
        let tokyo = ActiveHours::parse("21:00", "23:00", "Asia/Tokyo").unwrap();
        let utc_evening = Utc.with_ymd_and_hms(2026, 6, 15, 13, 0, 0).unwrap();
        assert!(tokyo.contains(utc_evening));

        let utc = ActiveHours::parse("21:00", "23:00", "UTC").unwrap();
        assert!(!utc.contains(utc_evening));
    }

    #[test]
    fn test_bad_zone_rejected() {
        assert!(matches!(
            ActiveHours::parse("09:00", "17:00", "Mars/Olympus"),
            Err(SchedulerError::UnknownTimeZone(_))
        ));
    }
}
