//! Clinic records.
//!
//! These mirror the collections owned by the backend. The crate constructs
//! and reads them as plain values; the backend enforces every constraint.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role attached to a profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Receives therapy.
    #[default]
    Patient,
    /// Delivers therapy.
    Practitioner,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Patient => write!(f, "patient"),
            Self::Practitioner => write!(f, "practitioner"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "patient" => Ok(Self::Patient),
            "practitioner" => Ok(Self::Practitioner),
            other => Err(crate::Error::invalid_field(
                "role",
                format!("unknown role '{other}'"),
            )),
        }
    }
}

/// A person known to the clinic, keyed by their identity id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Same as the identity id.
    pub id: Uuid,
    /// Display name.
    pub full_name: String,
    /// Contact email.
    pub email: String,
    /// Contact phone.
    #[serde(default)]
    pub phone: Option<String>,
    /// Patient or practitioner.
    pub role: Role,
}

/// Fields of a profile that may be changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    /// New display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    /// New phone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl ProfileUpdate {
    /// True if nothing would change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none() && self.phone.is_none()
    }
}

/// A bookable treatment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TherapyType {
    pub id: Uuid,
    pub name: String,
    pub duration_minutes: u32,
    pub price: f64,
    #[serde(default)]
    pub description: Option<String>,
}

/// A room therapies take place in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatmentRoom {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub room_type: String,
    pub is_active: bool,
}

/// A clinician, linked to a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Practitioner {
    pub id: Uuid,
    pub profile_id: Uuid,
    #[serde(default)]
    pub specialization: Option<String>,
}

/// Contact fields joined from the practitioner's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PractitionerContact {
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// A practitioner with their profile's contact fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PractitionerDetails {
    #[serde(flatten)]
    pub practitioner: Practitioner,
    #[serde(rename = "profiles", default)]
    pub contact: Option<PractitionerContact>,
}

impl PractitionerDetails {
    /// Display name, falling back to the id.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.contact
            .as_ref()
            .map_or_else(|| self.practitioner.id.to_string(), |c| c.full_name.clone())
    }
}

/// Lifecycle state of an appointment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    /// Booked, awaiting confirmation.
    #[default]
    Scheduled,
    /// Confirmed by the clinic.
    Confirmed,
    /// Waiting on the patient or the clinic.
    Pending,
    /// Session under way.
    InProgress,
    /// Session done.
    Completed,
    /// Called off.
    Cancelled,
    /// A value this client does not know.
    #[serde(other)]
    Unknown,
}

impl AppointmentStatus {
    /// Statuses that still lead to a session.
    #[must_use]
    pub fn is_upcoming(&self) -> bool {
        matches!(self, Self::Scheduled | Self::Confirmed | Self::Pending)
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Scheduled => "scheduled",
            Self::Confirmed => "confirmed",
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for AppointmentStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "scheduled" => Ok(Self::Scheduled),
            "confirmed" => Ok(Self::Confirmed),
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(crate::Error::invalid_field(
                "status",
                format!("unknown appointment status '{other}'"),
            )),
        }
    }
}

/// A booked therapy session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    #[serde(default)]
    pub practitioner_id: Option<Uuid>,
    pub therapy_type_id: Uuid,
    pub room_id: Uuid,
    pub appointment_date: NaiveDate,
    #[serde(with = "clock_time")]
    pub start_time: NaiveTime,
    #[serde(with = "clock_time")]
    pub end_time: NaiveTime,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Appointment {
    /// True if `time` on `date` falls inside this appointment.
    #[must_use]
    pub fn covers(&self, date: NaiveDate, time: NaiveTime) -> bool {
        self.appointment_date == date && self.start_time <= time && time < self.end_time
    }
}

/// Insert payload for an appointment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAppointment {
    pub patient_id: Uuid,
    pub practitioner_id: Option<Uuid>,
    pub therapy_type_id: Uuid,
    pub room_id: Uuid,
    pub appointment_date: NaiveDate,
    #[serde(with = "clock_time")]
    pub start_time: NaiveTime,
    #[serde(with = "clock_time")]
    pub end_time: NaiveTime,
    pub status: AppointmentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Therapy fields joined onto an appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TherapySummary {
    pub name: String,
    pub duration_minutes: u32,
}

/// Room fields joined onto an appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub name: String,
}

/// Profile name joined through a practitioner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileName {
    pub full_name: String,
}

/// Practitioner fields joined onto an appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PractitionerSummary {
    #[serde(default)]
    pub profiles: Option<ProfileName>,
}

/// An appointment with its therapy, room and practitioner names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentDetails {
    #[serde(flatten)]
    pub appointment: Appointment,
    #[serde(rename = "therapy_types", default)]
    pub therapy: Option<TherapySummary>,
    #[serde(rename = "treatment_rooms", default)]
    pub room: Option<RoomSummary>,
    #[serde(rename = "practitioners", default)]
    pub practitioner: Option<PractitionerSummary>,
}

impl AppointmentDetails {
    /// Therapy name, or an empty string if the join was empty.
    #[must_use]
    pub fn therapy_name(&self) -> &str {
        self.therapy.as_ref().map_or("", |t| t.name.as_str())
    }

    /// Room name, or an empty string if the join was empty.
    #[must_use]
    pub fn room_name(&self) -> &str {
        self.room.as_ref().map_or("", |r| r.name.as_str())
    }

    /// Practitioner name, if one is assigned.
    #[must_use]
    pub fn practitioner_name(&self) -> Option<&str> {
        self.practitioner
            .as_ref()
            .and_then(|p| p.profiles.as_ref())
            .map(|p| p.full_name.as_str())
    }
}

/// What a notification is about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    /// Created with a booking.
    Appointment,
    /// Preparation before a session.
    PreProcedure,
    /// Care after a session.
    PostProcedure,
    /// Anything else.
    #[default]
    #[serde(other)]
    General,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Appointment => "appointment",
            Self::PreProcedure => "pre-procedure",
            Self::PostProcedure => "post-procedure",
            Self::General => "general",
        };
        f.write_str(s)
    }
}

/// A message for a user, delivered by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub scheduled_for: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub scheduled_for: DateTime<Utc>,
}

/// Wellness scores recorded after a session, each out of 10.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub id: Uuid,
    pub patient_id: Uuid,
    #[serde(default)]
    pub appointment_id: Option<Uuid>,
    pub recorded_at: DateTime<Utc>,
    #[serde(default)]
    pub energy_level: Option<f32>,
    #[serde(default)]
    pub sleep_quality: Option<f32>,
    #[serde(default)]
    pub digestion: Option<f32>,
    #[serde(default)]
    pub stress_level: Option<f32>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ProgressRecord {
    /// Labelled scores that were recorded.
    #[must_use]
    pub fn vitals(&self) -> Vec<(&'static str, f32)> {
        [
            ("Energy Level", self.energy_level),
            ("Sleep Quality", self.sleep_quality),
            ("Digestion", self.digestion),
            ("Stress Level", self.stress_level),
        ]
        .into_iter()
        .filter_map(|(label, value)| value.map(|v| (label, v)))
        .collect()
    }
}

/// Insert payload for a progress record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewProgressRecord {
    pub patient_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_level: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sleep_quality: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digestion: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stress_level: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl NewProgressRecord {
    /// Check every score is within 0–10.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidField`] naming the first score out of range.
    pub fn validate(&self) -> crate::Result<()> {
        let scores = [
            ("energy_level", self.energy_level),
            ("sleep_quality", self.sleep_quality),
            ("digestion", self.digestion),
            ("stress_level", self.stress_level),
        ];
        for (field, value) in scores {
            if let Some(v) = value {
                if !(0.0..=10.0).contains(&v) {
                    return Err(crate::Error::invalid_field(
                        field,
                        format!("{v} is outside 0-10"),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Appointment fields joined onto a progress record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressAppointment {
    pub appointment_date: NaiveDate,
    #[serde(default)]
    pub therapy_types: Option<TherapyName>,
}

/// Therapy name joined through an appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TherapyName {
    pub name: String,
}

/// A progress record with the session it followed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecordDetails {
    #[serde(flatten)]
    pub record: ProgressRecord,
    #[serde(rename = "appointments", default)]
    pub appointment: Option<ProgressAppointment>,
}

/// `HH:MM` time-of-day columns. Reads also accept `HH:MM:SS`.
pub mod clock_time {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Parse `HH:MM` or `HH:MM:SS`.
    ///
    /// # Errors
    ///
    /// Returns the chrono parse error for the `HH:MM` form if neither matches.
    pub fn parse(s: &str) -> chrono::ParseResult<NaiveTime> {
        NaiveTime::parse_from_str(s, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
    }

    /// Serialize as `HH:MM`.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format(crate::slots::TIME_FORMAT))
    }

    /// Deserialize from `HH:MM` or `HH:MM:SS`.
    ///
    /// # Errors
    ///
    /// Fails on any other shape.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }
}
