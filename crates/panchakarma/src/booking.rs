//! Appointment booking.
//!
//! A [`BookingForm`] collects the patient's selections. [`Scheduler::book`]
//! checks them locally, derives the appointment window from the chosen slot
//! and therapy duration, then writes the appointment followed by its
//! companion notification.

use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::Backend;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    Appointment, AppointmentStatus, NewAppointment, NewNotification, Notification,
    NotificationKind, PractitionerDetails, TherapyType, TreatmentRoom,
};
use crate::notice::Notice;
use crate::slots::{AppointmentWindow, TimeSlot};

const NOT_SELECTED: &str = "Not selected";

/// Selections for one booking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingForm {
    date: Option<NaiveDate>,
    time: Option<TimeSlot>,
    therapy: Option<TherapyType>,
    room: Option<TreatmentRoom>,
    practitioner: Option<PractitionerDetails>,
    notes: Option<String>,
}

impl BookingForm {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select_date(&mut self, date: NaiveDate) {
        self.date = Some(date);
    }

    pub fn select_time(&mut self, slot: TimeSlot) {
        self.time = Some(slot);
    }

    /// Select a time by its label.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSlot`] if the label is malformed. The current
    /// selection is kept.
    pub fn select_time_label(&mut self, label: &str) -> Result<()> {
        self.time = Some(label.parse()?);
        Ok(())
    }

    pub fn select_therapy(&mut self, therapy: TherapyType) {
        self.therapy = Some(therapy);
    }

    pub fn select_room(&mut self, room: TreatmentRoom) {
        self.room = Some(room);
    }

    /// Assign a practitioner, or clear the assignment.
    pub fn select_practitioner(&mut self, practitioner: Option<PractitionerDetails>) {
        self.practitioner = practitioner;
    }

    pub fn set_notes(&mut self, notes: Option<String>) {
        self.notes = notes.filter(|n| !n.trim().is_empty());
    }

    #[must_use]
    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    #[must_use]
    pub fn time(&self) -> Option<TimeSlot> {
        self.time
    }

    #[must_use]
    pub fn therapy(&self) -> Option<&TherapyType> {
        self.therapy.as_ref()
    }

    #[must_use]
    pub fn room(&self) -> Option<&TreatmentRoom> {
        self.room.as_ref()
    }

    #[must_use]
    pub fn practitioner(&self) -> Option<&PractitionerDetails> {
        self.practitioner.as_ref()
    }

    /// Required selections that are still empty, in form order.
    #[must_use]
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.date.is_none() {
            missing.push("date");
        }
        if self.time.is_none() {
            missing.push("time");
        }
        if self.therapy.is_none() {
            missing.push("therapy");
        }
        if self.room.is_none() {
            missing.push("room");
        }
        missing
    }

    /// True once date, time, therapy and room are chosen.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    /// Clear every selection.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// What the form currently holds, for display.
    #[must_use]
    pub fn summary(&self) -> BookingSummary {
        fn or_unset(value: Option<String>) -> String {
            value.unwrap_or_else(|| NOT_SELECTED.to_string())
        }

        BookingSummary {
            therapy: or_unset(self.therapy.as_ref().map(|t| t.name.clone())),
            date: or_unset(self.date.map(|d| d.format("%B %-d, %Y").to_string())),
            time: or_unset(self.time.map(|t| t.to_string())),
            room: or_unset(self.room.as_ref().map(|r| r.name.clone())),
            practitioner: or_unset(self.practitioner.as_ref().map(PractitionerDetails::display_name)),
        }
    }
}

/// Display form of a [`BookingForm`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingSummary {
    pub therapy: String,
    pub date: String,
    pub time: String,
    pub room: String,
    pub practitioner: String,
}

impl fmt::Display for BookingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Therapy:      {}", self.therapy)?;
        writeln!(f, "Date:         {}", self.date)?;
        writeln!(f, "Time:         {}", self.time)?;
        writeln!(f, "Room:         {}", self.room)?;
        write!(f, "Practitioner: {}", self.practitioner)
    }
}

/// A completed booking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Booking {
    pub appointment: Appointment,
    pub notification: Notification,
    pub window: AppointmentWindow,
}

impl Booking {
    /// Notice confirming the booking.
    #[must_use]
    pub fn notice(&self) -> Notice {
        Notice::info(
            "Session booked",
            format!(
                "{} from {} to {}",
                self.window.date_string(),
                self.window.start_string(),
                self.window.end_string()
            ),
        )
    }
}

/// Notice for a failed booking.
#[must_use]
pub fn booking_failure_notice(err: &Error) -> Notice {
    Notice::from_error("Booking failed", err)
}

/// Everything a patient can choose from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Catalog {
    pub therapies: Vec<TherapyType>,
    pub rooms: Vec<TreatmentRoom>,
    pub practitioners: Vec<PractitionerDetails>,
    pub time_slots: Vec<TimeSlot>,
}

/// Books appointments against a backend.
#[derive(Debug, Clone)]
pub struct Scheduler {
    backend: Arc<dyn Backend>,
    offered: Vec<TimeSlot>,
}

impl Scheduler {
    /// Create a scheduler offering the given slots.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, offered: Vec<TimeSlot>) -> Self {
        Self { backend, offered }
    }

    /// Create a scheduler offering the configured slots.
    #[must_use]
    pub fn from_config(backend: Arc<dyn Backend>, config: &Config) -> Self {
        Self::new(backend, config.offered_slots())
    }

    /// Slots patients may pick.
    #[must_use]
    pub fn offered(&self) -> &[TimeSlot] {
        &self.offered
    }

    /// Check that a slot is on offer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SlotNotOffered`] otherwise.
    pub fn ensure_offered(&self, slot: TimeSlot) -> Result<()> {
        if self.offered.contains(&slot) {
            Ok(())
        } else {
            Err(Error::SlotNotOffered(slot.to_string()))
        }
    }

    /// The window each offered slot would occupy for `therapy` on `date`.
    #[must_use]
    pub fn windows(&self, date: NaiveDate, therapy: &TherapyType) -> Vec<(TimeSlot, AppointmentWindow)> {
        self.offered
            .iter()
            .map(|slot| (*slot, slot.window(date, therapy.duration_minutes)))
            .collect()
    }

    /// Load the therapies, rooms and practitioners to choose from.
    ///
    /// # Errors
    ///
    /// Returns the first backend error.
    pub async fn catalog(&self) -> Result<Catalog> {
        Ok(Catalog {
            therapies: self.backend.therapy_types().await?,
            rooms: self.backend.treatment_rooms().await?,
            practitioners: self.backend.practitioners().await?,
            time_slots: self.offered.clone(),
        })
    }

    /// Book the form's selections for `patient_id`.
    ///
    /// Nothing is sent unless the form is complete, the date is not before
    /// `today` and the slot is offered. On success the form is reset; on any
    /// failure it is left as it was.
    ///
    /// # Errors
    ///
    /// - [`Error::IncompleteBooking`], [`Error::DateInPast`] or
    ///   [`Error::SlotNotOffered`] before any backend call
    /// - the backend's error if the appointment cannot be written
    /// - [`Error::PartialBooking`] if the appointment was written but the
    ///   notification was not
    pub async fn book(
        &self,
        form: &mut BookingForm,
        patient_id: Uuid,
        today: NaiveDate,
    ) -> Result<Booking> {
        let (Some(date), Some(slot), Some(therapy), Some(room)) =
            (form.date, form.time, form.therapy.as_ref(), form.room.as_ref())
        else {
            return Err(Error::IncompleteBooking {
                missing: form.missing(),
            });
        };

        if date < today {
            return Err(Error::DateInPast { date });
        }
        self.ensure_offered(slot)?;

        let window = slot.window(date, therapy.duration_minutes);
        if window.crosses_midnight {
            warn!(
                "{} at {} runs past midnight; the end time {} is stored on {}",
                therapy.name,
                slot,
                window.end_string(),
                window.date_string()
            );
        }

        let request = NewAppointment {
            patient_id,
            practitioner_id: form.practitioner.as_ref().map(|p| p.practitioner.id),
            therapy_type_id: therapy.id,
            room_id: room.id,
            appointment_date: window.date,
            start_time: window.start,
            end_time: window.end,
            status: AppointmentStatus::Scheduled,
            notes: form.notes.clone(),
        };
        debug!("Booking {:?}", request);
        let appointment = self.backend.create_appointment(&request).await?;

        let reminder = NewNotification {
            user_id: patient_id,
            title: "Appointment Scheduled".to_string(),
            message: format!(
                "Your {} session is scheduled for {} at {}",
                therapy.name,
                window.date.format("%B %-d, %Y"),
                slot
            ),
            kind: NotificationKind::Appointment,
            scheduled_for: date.and_time(NaiveTime::MIN).and_utc(),
        };
        let notification = match self.backend.create_notification(&reminder).await {
            Ok(notification) => notification,
            Err(source) => {
                warn!(
                    "appointment {} created but its notification failed: {}",
                    appointment.id, source
                );
                return Err(Error::PartialBooking {
                    appointment_id: appointment.id,
                    source: Box::new(source),
                });
            }
        };

        info!(
            "Booked {} on {} {}-{}",
            therapy.name,
            window.date_string(),
            window.start_string(),
            window.end_string()
        );
        form.reset();
        Ok(Booking {
            appointment,
            notification,
            window,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::RecordingBackend;
    use crate::backend::{AppointmentFilter, IdentityAttributes};
    use crate::model::Role;
    use crate::slots::OFFERED_SLOTS;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn today() -> NaiveDate {
        day(2026, 10, 19)
    }

    fn offered() -> Vec<TimeSlot> {
        crate::slots::parse_slots(OFFERED_SLOTS.iter().copied())
    }

    async fn setup() -> (Arc<RecordingBackend>, Scheduler, Uuid, Catalog) {
        let backend = Arc::new(RecordingBackend::new());
        let patient = backend
            .inner()
            .sign_up(
                "asha@clinic.test",
                "triphala",
                &IdentityAttributes {
                    full_name: "Asha Rao".to_string(),
                    phone: None,
                    role: Role::Patient,
                },
            )
            .await
            .unwrap()
            .user
            .id;
        let scheduler = Scheduler::new(backend.clone(), offered());
        let catalog = scheduler.catalog().await.unwrap();
        backend.clear_calls();
        (backend, scheduler, patient, catalog)
    }

    fn therapy<'a>(catalog: &'a Catalog, prefix: &str) -> &'a TherapyType {
        catalog
            .therapies
            .iter()
            .find(|t| t.name.starts_with(prefix))
            .unwrap()
    }

    fn filled_form(catalog: &Catalog) -> BookingForm {
        let mut form = BookingForm::new();
        form.select_date(day(2026, 11, 2));
        form.select_time_label("1:30 PM").unwrap();
        form.select_therapy(therapy(catalog, "Abhyanga").clone());
        form.select_room(catalog.rooms[1].clone());
        form
    }

    #[test]
    fn test_missing_lists_required_selections() {
        let mut form = BookingForm::new();
        assert_eq!(form.missing(), vec!["date", "time", "therapy", "room"]);

        form.select_date(day(2026, 11, 2));
        form.select_time_label("9:00 AM").unwrap();
        assert_eq!(form.missing(), vec!["therapy", "room"]);
        assert!(!form.is_complete());
    }

    #[test]
    fn test_select_time_label_rejects_malformed() {
        let mut form = BookingForm::new();
        form.select_time_label("9:00 AM").unwrap();
        assert!(form.select_time_label("9 o'clock").is_err());
        assert_eq!(form.time().unwrap().to_string(), "9:00 AM");
    }

    #[test]
    fn test_summary_shows_unset_fields() {
        let mut form = BookingForm::new();
        form.select_date(day(2026, 11, 2));
        let summary = form.summary();
        assert_eq!(summary.date, "November 2, 2026");
        assert_eq!(summary.therapy, "Not selected");
        assert_eq!(summary.practitioner, "Not selected");
        assert!(summary.to_string().contains("Room:         Not selected"));
    }

    #[tokio::test]
    async fn test_book_writes_appointment_and_notification() {
        let (backend, scheduler, patient, catalog) = setup().await;
        let mut form = filled_form(&catalog);

        let booking = scheduler.book(&mut form, patient, today()).await.unwrap();

        assert_eq!(booking.window.start_string(), "13:30");
        assert_eq!(booking.window.end_string(), "15:00");
        assert_eq!(booking.appointment.status, AppointmentStatus::Scheduled);
        assert_eq!(booking.appointment.appointment_date, day(2026, 11, 2));
        assert_eq!(booking.notification.kind, NotificationKind::Appointment);
        assert_eq!(
            booking.notification.scheduled_for.to_rfc3339(),
            "2026-11-02T00:00:00+00:00"
        );
        assert_eq!(
            backend.calls(),
            vec!["create_appointment", "create_notification"]
        );
        assert_eq!(form, BookingForm::default());
        assert_eq!(booking.notice().description, "2026-11-02 from 13:30 to 15:00");
    }

    #[tokio::test]
    async fn test_incomplete_form_makes_no_backend_call() {
        let (backend, scheduler, patient, catalog) = setup().await;
        let mut form = filled_form(&catalog);
        form.room = None;
        let before = form.clone();

        let err = scheduler.book(&mut form, patient, today()).await.unwrap_err();

        assert!(matches!(err, Error::IncompleteBooking { ref missing } if missing == &vec!["room"]));
        assert!(err.is_validation());
        assert!(backend.calls().is_empty());
        assert_eq!(form, before);
    }

    #[tokio::test]
    async fn test_past_date_is_rejected_locally() {
        let (backend, scheduler, patient, catalog) = setup().await;
        let mut form = filled_form(&catalog);
        form.select_date(day(2026, 10, 18));

        let err = scheduler.book(&mut form, patient, today()).await.unwrap_err();
        assert!(matches!(err, Error::DateInPast { .. }));
        assert!(backend.calls().is_empty());

        form.select_date(today());
        scheduler.book(&mut form, patient, today()).await.unwrap();
    }

    #[tokio::test]
    async fn test_slot_must_be_offered() {
        let (backend, scheduler, patient, catalog) = setup().await;
        let mut form = filled_form(&catalog);
        form.select_time_label("2:00 PM").unwrap();

        let err = scheduler.book(&mut form, patient, today()).await.unwrap_err();
        assert_eq!(err.to_string(), "time slot '2:00 PM' is not offered");
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_appointment_keeps_selections() {
        let (backend, scheduler, patient, catalog) = setup().await;
        let mut form = filled_form(&catalog);
        let before = form.clone();
        backend.fail("create_appointment");

        let err = scheduler.book(&mut form, patient, today()).await.unwrap_err();

        assert_eq!(err.to_string(), "create_appointment unavailable");
        assert_eq!(form, before);
        assert_eq!(backend.count("create_notification"), 0);
        let notice = booking_failure_notice(&err);
        assert_eq!(notice.description, "create_appointment unavailable");

        backend.recover("create_appointment");
        let booking = scheduler.book(&mut form, patient, today()).await.unwrap();
        assert_eq!(booking.window.start_string(), "13:30");
        assert_eq!(form, BookingForm::default());
    }

    #[tokio::test]
    async fn test_failed_notification_reports_partial_booking() {
        let (backend, scheduler, patient, catalog) = setup().await;
        let mut form = filled_form(&catalog);
        let before = form.clone();
        backend.fail("create_notification");

        let err = scheduler.book(&mut form, patient, today()).await.unwrap_err();

        let Error::PartialBooking { appointment_id, .. } = err else {
            panic!("expected a partial booking, got {err:?}");
        };
        let stored = backend
            .inner()
            .appointments(AppointmentFilter::Patient(patient))
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].appointment.id, appointment_id);
        assert_eq!(form, before);
    }

    #[tokio::test]
    async fn test_late_slot_wraps_past_midnight() {
        let (_backend, scheduler, patient, catalog) = setup().await;
        let scheduler = Scheduler::new(
            scheduler.backend.clone(),
            vec!["11:30 PM".parse().unwrap()],
        );
        let mut form = filled_form(&catalog);
        form.select_time_label("11:30 PM").unwrap();

        let booking = scheduler.book(&mut form, patient, today()).await.unwrap();

        assert!(booking.window.crosses_midnight);
        assert_eq!(booking.appointment.appointment_date, day(2026, 11, 2));
        assert_eq!(booking.window.end_string(), "01:00");
    }

    #[tokio::test]
    async fn test_practitioner_is_optional_and_carried() {
        let (backend, scheduler, patient, catalog) = setup().await;
        let doctor = backend
            .inner()
            .sign_up(
                "meera@clinic.test",
                "triphala",
                &IdentityAttributes {
                    full_name: "Dr. Meera Nair".to_string(),
                    phone: None,
                    role: Role::Practitioner,
                },
            )
            .await
            .unwrap()
            .user;
        let practitioners = backend.inner().practitioners().await.unwrap();
        let mut form = filled_form(&catalog);
        form.select_practitioner(practitioners.into_iter().next());
        assert_eq!(form.summary().practitioner, "Dr. Meera Nair");

        let booking = scheduler.book(&mut form, patient, today()).await.unwrap();
        let linked = backend
            .inner()
            .practitioner_for_profile(doctor.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(booking.appointment.practitioner_id, Some(linked.id));
    }

    #[tokio::test]
    async fn test_windows_for_offered_slots() {
        let (_backend, scheduler, _patient, catalog) = setup().await;
        let nasya = therapy(&catalog, "Nasya");
        let windows = scheduler.windows(day(2026, 11, 2), nasya);

        assert_eq!(windows.len(), OFFERED_SLOTS.len());
        assert_eq!(windows[0].1.start_string(), "09:00");
        assert_eq!(windows[0].1.end_string(), "09:30");
        assert_eq!(windows[6].1.start_string(), "18:00");
    }

    #[tokio::test]
    async fn test_catalog_includes_configured_slots() {
        let (_backend, scheduler, _patient, catalog) = setup().await;
        assert_eq!(catalog.time_slots, scheduler.offered());
        assert_eq!(catalog.therapies.len(), 5);
        assert_eq!(catalog.rooms.len(), 4);
    }
}
