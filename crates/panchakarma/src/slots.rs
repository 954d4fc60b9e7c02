//! Time slots and appointment windows.
//!
//! The clinic offers a fixed list of 12-hour slot labels such as `"1:30 PM"`.
//! Booking turns a date, one of those labels and a therapy duration into an
//! [`AppointmentWindow`]: the date as `yyyy-MM-dd` plus 24-hour `HH:MM` start
//! and end times.
//!
//! An end time past midnight wraps the hour-of-day but keeps the booking date.
//! The window reports this through [`AppointmentWindow::crosses_midnight`]
//! without changing the stored values.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{Duration, NaiveDate, NaiveTime, Timelike};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Slot labels offered when the configuration does not override them.
pub const OFFERED_SLOTS: &[&str] = &[
    "9:00 AM", "10:30 AM", "12:00 PM", "1:30 PM", "3:00 PM", "4:30 PM", "6:00 PM",
];

/// Date format used for `appointment_date`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Time format used for `start_time` and `end_time`.
pub const TIME_FORMAT: &str = "%H:%M";

fn slot_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{1,2}):(\d{2}) ([AaPp][Mm])$").expect("slot pattern is valid")
    })
}

/// AM or PM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Period {
    /// Before noon.
    Am,
    /// Noon and after.
    Pm,
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Am => write!(f, "AM"),
            Self::Pm => write!(f, "PM"),
        }
    }
}

/// A 12-hour clock label, `H:MM AM|PM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeSlot {
    hour: u32,
    minute: u32,
    period: Period,
}

impl TimeSlot {
    /// Build a slot from its parts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSlot`] if the hour is outside 1–12 or the
    /// minute outside 0–59.
    pub fn new(hour: u32, minute: u32, period: Period) -> Result<Self> {
        let slot = Self {
            hour,
            minute,
            period,
        };
        if !(1..=12).contains(&hour) {
            return Err(Error::InvalidSlot {
                label: slot.to_string(),
                reason: "hour must be between 1 and 12",
            });
        }
        if minute > 59 {
            return Err(Error::InvalidSlot {
                label: slot.to_string(),
                reason: "minute must be between 00 and 59",
            });
        }
        Ok(slot)
    }

    /// Hour on the 12-hour clock (1–12).
    #[must_use]
    pub fn hour(&self) -> u32 {
        self.hour
    }

    /// Minute (0–59).
    #[must_use]
    pub fn minute(&self) -> u32 {
        self.minute
    }

    /// AM or PM.
    #[must_use]
    pub fn period(&self) -> Period {
        self.period
    }

    /// Hour on the 24-hour clock.
    ///
    /// PM adds 12 except at 12 PM; 12 AM becomes 0.
    #[must_use]
    pub fn hour_24(&self) -> u32 {
        match (self.period, self.hour) {
            (Period::Am, 12) => 0,
            (Period::Am, h) | (Period::Pm, h @ 12) => h,
            (Period::Pm, h) => h + 12,
        }
    }

    /// The slot as a time of day.
    #[must_use]
    pub fn start_time(&self) -> NaiveTime {
        // hour_24 is 0..=23 and minute 0..=59 by construction
        NaiveTime::from_hms_opt(self.hour_24(), self.minute, 0).unwrap_or(NaiveTime::MIN)
    }

    /// Build the 12-hour label for a time of day.
    #[must_use]
    pub fn from_time(time: NaiveTime) -> Self {
        let (is_pm, hour) = time.hour12();
        Self {
            hour,
            minute: time.minute(),
            period: if is_pm { Period::Pm } else { Period::Am },
        }
    }

    /// Derive the appointment window for this slot.
    #[must_use]
    pub fn window(&self, date: NaiveDate, duration_minutes: u32) -> AppointmentWindow {
        AppointmentWindow::derive(date, *self, duration_minutes)
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02} {}", self.hour, self.minute, self.period)
    }
}

impl FromStr for TimeSlot {
    type Err = Error;

    fn from_str(label: &str) -> Result<Self> {
        let invalid = |reason| Error::InvalidSlot {
            label: label.to_string(),
            reason,
        };

        let caps = slot_pattern()
            .captures(label.trim())
            .ok_or_else(|| invalid("expected the form H:MM AM or H:MM PM"))?;

        let hour: u32 = caps[1].parse().map_err(|_| invalid("hour is not a number"))?;
        let minute: u32 = caps[2]
            .parse()
            .map_err(|_| invalid("minute is not a number"))?;
        let period = if caps[3].eq_ignore_ascii_case("pm") {
            Period::Pm
        } else {
            Period::Am
        };

        Self::new(hour, minute, period).map_err(|err| match err {
            Error::InvalidSlot { reason, .. } => invalid(reason),
            other => other,
        })
    }
}

impl Serialize for TimeSlot {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeSlot {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        label.parse().map_err(serde::de::Error::custom)
    }
}

/// The date and 24-hour start/end of a booked session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AppointmentWindow {
    /// Booking date.
    #[serde(serialize_with = "serialize_date")]
    pub date: NaiveDate,
    /// Start time of day.
    #[serde(serialize_with = "serialize_time")]
    pub start: NaiveTime,
    /// End time of day. Wraps past midnight without moving `date`.
    #[serde(serialize_with = "serialize_time")]
    pub end: NaiveTime,
    /// True when `end` fell on the following day and wrapped.
    pub crosses_midnight: bool,
}

impl AppointmentWindow {
    /// Derive a window from a date, a slot and a duration.
    #[must_use]
    pub fn derive(date: NaiveDate, slot: TimeSlot, duration_minutes: u32) -> Self {
        let start_at = date.and_time(slot.start_time());
        let end_at = start_at + Duration::minutes(i64::from(duration_minutes));

        Self {
            date,
            start: start_at.time(),
            end: end_at.time(),
            crosses_midnight: end_at.date() != date,
        }
    }

    /// The date as `yyyy-MM-dd`.
    #[must_use]
    pub fn date_string(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }

    /// The start as `HH:MM`.
    #[must_use]
    pub fn start_string(&self) -> String {
        self.start.format(TIME_FORMAT).to_string()
    }

    /// The end as `HH:MM`.
    #[must_use]
    pub fn end_string(&self) -> String {
        self.end.format(TIME_FORMAT).to_string()
    }
}

fn serialize_date<S: serde::Serializer>(
    date: &NaiveDate,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(&date.format(DATE_FORMAT))
}

fn serialize_time<S: serde::Serializer>(
    time: &NaiveTime,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(&time.format(TIME_FORMAT))
}

/// Parse every label, keeping only the valid ones.
#[must_use]
pub fn parse_slots<'a>(labels: impl IntoIterator<Item = &'a str>) -> Vec<TimeSlot> {
    labels.into_iter().filter_map(|l| l.parse().ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn start_of(label: &str) -> String {
        label
            .parse::<TimeSlot>()
            .unwrap()
            .start_time()
            .format(TIME_FORMAT)
            .to_string()
    }

    #[test]
    fn test_offered_slots_conversion_table() {
        let expected = [
            ("9:00 AM", "09:00"),
            ("10:30 AM", "10:30"),
            ("12:00 PM", "12:00"),
            ("1:30 PM", "13:30"),
            ("3:00 PM", "15:00"),
            ("4:30 PM", "16:30"),
            ("6:00 PM", "18:00"),
        ];
        assert_eq!(expected.len(), OFFERED_SLOTS.len());
        for (label, start) in expected {
            assert!(OFFERED_SLOTS.contains(&label));
            assert_eq!(start_of(label), start, "slot {label}");
        }
    }

    #[test]
    fn test_midnight_and_noon() {
        assert_eq!(start_of("12:00 AM"), "00:00");
        assert_eq!(start_of("12:30 AM"), "00:30");
        assert_eq!(start_of("12:00 PM"), "12:00");
        assert_eq!(start_of("12:45 PM"), "12:45");
        assert_eq!(start_of("11:59 PM"), "23:59");
        assert_eq!(start_of("1:00 AM"), "01:00");
    }

    #[test]
    fn test_end_time_carries_minutes_into_hours() {
        let slot: TimeSlot = "1:30 PM".parse().unwrap();
        let window = slot.window(date(2026, 11, 2), 90);

        assert_eq!(window.start_string(), "13:30");
        assert_eq!(window.end_string(), "15:00");
        assert!(!window.crosses_midnight);
    }

    #[test]
    fn test_end_time_for_each_therapy_duration() {
        let slot: TimeSlot = "10:30 AM".parse().unwrap();
        let d = date(2026, 11, 2);

        assert_eq!(slot.window(d, 30).end_string(), "11:00");
        assert_eq!(slot.window(d, 45).end_string(), "11:15");
        assert_eq!(slot.window(d, 60).end_string(), "11:30");
        assert_eq!(slot.window(d, 90).end_string(), "12:00");
        assert_eq!(slot.window(d, 0).end_string(), "10:30");
    }

    #[test]
    fn test_window_past_midnight_wraps_hour_and_keeps_date() {
        let slot: TimeSlot = "11:00 PM".parse().unwrap();
        let d = date(2026, 12, 31);
        let window = slot.window(d, 90);

        assert_eq!(window.start_string(), "23:00");
        assert_eq!(window.end_string(), "00:30");
        assert_eq!(window.date_string(), "2026-12-31");
        assert!(window.crosses_midnight);
    }

    #[test]
    fn test_date_string_is_zero_padded() {
        let slot: TimeSlot = "9:00 AM".parse().unwrap();
        let window = slot.window(date(2027, 1, 5), 60);
        assert_eq!(window.date_string(), "2027-01-05");
        assert_eq!(window.start_string(), "09:00");
        assert_eq!(window.end_string(), "10:00");
    }

    #[test]
    fn test_parse_rejects_malformed_labels() {
        for label in ["", "9 AM", "9:00", "9:0 AM", "09:00AM", "9:00 XM", "noon", "9:00 AM extra"] {
            let err = label.parse::<TimeSlot>().unwrap_err();
            assert!(matches!(err, Error::InvalidSlot { .. }), "label {label:?}");
        }
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        assert!("0:30 AM".parse::<TimeSlot>().is_err());
        assert!("13:00 PM".parse::<TimeSlot>().is_err());
        assert!("9:60 AM".parse::<TimeSlot>().is_err());
    }

    #[test]
    fn test_parse_is_case_insensitive_and_trims() {
        let slot: TimeSlot = " 4:30 pm ".parse().unwrap();
        assert_eq!(slot.period(), Period::Pm);
        assert_eq!(slot.to_string(), "4:30 PM");
    }

    #[test]
    fn test_display_matches_offered_labels() {
        for label in OFFERED_SLOTS {
            let slot: TimeSlot = label.parse().unwrap();
            assert_eq!(&slot.to_string(), label);
        }
    }

    #[test]
    fn test_from_time_inverts_start_time() {
        for label in OFFERED_SLOTS {
            let slot: TimeSlot = label.parse().unwrap();
            assert_eq!(TimeSlot::from_time(slot.start_time()), slot);
        }
        let midnight = TimeSlot::from_time(NaiveTime::MIN);
        assert_eq!(midnight.to_string(), "12:00 AM");
    }

    #[test]
    fn test_new_validates_parts() {
        assert!(TimeSlot::new(12, 0, Period::Am).is_ok());
        assert!(TimeSlot::new(0, 0, Period::Am).is_err());
        assert!(TimeSlot::new(5, 75, Period::Pm).is_err());
    }

    #[test]
    fn test_window_serializes_as_strings() {
        let slot: TimeSlot = "3:00 PM".parse().unwrap();
        let json = serde_json::to_value(slot.window(date(2026, 11, 3), 45)).unwrap();
        assert_eq!(json["date"], "2026-11-03");
        assert_eq!(json["start"], "15:00");
        assert_eq!(json["end"], "15:45");
        assert_eq!(json["crosses_midnight"], false);
    }

    #[test]
    fn test_slot_serde_uses_label() {
        let slot: TimeSlot = serde_json::from_str("\"6:00 PM\"").unwrap();
        assert_eq!(serde_json::to_string(&slot).unwrap(), "\"6:00 PM\"");
        assert!(serde_json::from_str::<TimeSlot>("\"18:00\"").is_err());
    }

    #[test]
    fn test_parse_slots_skips_invalid() {
        let slots = parse_slots(["9:00 AM", "bogus", "6:00 PM"]);
        assert_eq!(slots.len(), 2);
    }
}
