//! Call-recording backend for tests.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{AppointmentFilter, AuthEvent, Backend, IdentityAttributes, Session, SignUpOutcome, User};
use crate::error::{Error, Result};
use crate::model::{
    Appointment, AppointmentDetails, AppointmentStatus, NewAppointment, NewNotification,
    NewProgressRecord, Notification, Practitioner, PractitionerDetails, Profile, ProfileUpdate,
    ProgressRecord, ProgressRecordDetails, TherapyType, TreatmentRoom,
};
use crate::storage::Storage;

/// Wraps an in-memory [`Storage`], recording every call by name and failing
/// the operations named with [`RecordingBackend::fail`].
#[derive(Debug)]
pub struct RecordingBackend {
    inner: Storage,
    calls: Mutex<Vec<&'static str>>,
    failing: Mutex<HashSet<&'static str>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            inner: Storage::open_in_memory().expect("in-memory storage"),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }

    pub fn inner(&self) -> &Storage {
        &self.inner
    }

    /// Make `operation` fail with a 500 until [`RecordingBackend::recover`].
    pub fn fail(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    pub fn recover(&self, operation: &'static str) {
        self.failing.lock().unwrap().remove(operation);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| **c == operation)
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, operation: &'static str) -> Result<()> {
        self.calls.lock().unwrap().push(operation);
        if self.failing.lock().unwrap().contains(operation) {
            return Err(Error::backend(500, format!("{operation} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        attributes: &IdentityAttributes,
    ) -> Result<SignUpOutcome> {
        self.record("sign_up")?;
        self.inner.sign_up(email, password, attributes).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        self.record("sign_in")?;
        self.inner.sign_in(email, password).await
    }

    async fn sign_out(&self) -> Result<()> {
        self.record("sign_out")?;
        self.inner.sign_out().await
    }

    async fn current_user(&self) -> Result<Option<User>> {
        self.record("current_user")?;
        self.inner.current_user().await
    }

    fn restore_session(&self, session: Session) {
        self.inner.restore_session(session);
    }

    fn session(&self) -> Option<Session> {
        self.inner.session()
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.subscribe()
    }

    async fn profile(&self, id: Uuid) -> Result<Profile> {
        self.record("profile")?;
        self.inner.profile(id).await
    }

    async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> Result<()> {
        self.record("update_profile")?;
        self.inner.update_profile(id, update).await
    }

    async fn therapy_types(&self) -> Result<Vec<TherapyType>> {
        self.record("therapy_types")?;
        self.inner.therapy_types().await
    }

    async fn practitioners(&self) -> Result<Vec<PractitionerDetails>> {
        self.record("practitioners")?;
        self.inner.practitioners().await
    }

    async fn practitioner_for_profile(&self, profile_id: Uuid) -> Result<Option<Practitioner>> {
        self.record("practitioner_for_profile")?;
        self.inner.practitioner_for_profile(profile_id).await
    }

    async fn treatment_rooms(&self) -> Result<Vec<TreatmentRoom>> {
        self.record("treatment_rooms")?;
        self.inner.treatment_rooms().await
    }

    async fn create_appointment(&self, appointment: &NewAppointment) -> Result<Appointment> {
        self.record("create_appointment")?;
        self.inner.create_appointment(appointment).await
    }

    async fn appointments(&self, filter: AppointmentFilter) -> Result<Vec<AppointmentDetails>> {
        self.record("appointments")?;
        self.inner.appointments(filter).await
    }

    async fn update_appointment_status(&self, id: Uuid, status: AppointmentStatus) -> Result<()> {
        self.record("update_appointment_status")?;
        self.inner.update_appointment_status(id, status).await
    }

    async fn create_progress_record(&self, record: &NewProgressRecord) -> Result<ProgressRecord> {
        self.record("create_progress_record")?;
        self.inner.create_progress_record(record).await
    }

    async fn progress_records(&self, patient_id: Uuid) -> Result<Vec<ProgressRecordDetails>> {
        self.record("progress_records")?;
        self.inner.progress_records(patient_id).await
    }

    async fn create_notification(&self, notification: &NewNotification) -> Result<Notification> {
        self.record("create_notification")?;
        self.inner.create_notification(notification).await
    }

    async fn notifications(&self, user_id: Uuid) -> Result<Vec<Notification>> {
        self.record("notifications")?;
        self.inner.notifications(user_id).await
    }

    async fn mark_notification_read(&self, id: Uuid) -> Result<()> {
        self.record("mark_notification_read")?;
        self.inner.mark_notification_read(id).await
    }
}
