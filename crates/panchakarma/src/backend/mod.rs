//! Backend facade.
//!
//! Every record and identity operation goes through [`Backend`]. Two
//! implementations exist: [`HostedBackend`] forwards to the hosted
//! backend-as-a-service, and [`crate::storage::Storage`] is a local SQLite
//! sandbox serving the same API.

pub mod hosted;
pub mod query;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::config::{BackendKind, Config};
use crate::error::Result;
use crate::model::{
    Appointment, AppointmentDetails, AppointmentStatus, NewAppointment, NewNotification,
    NewProgressRecord, Notification, Practitioner, PractitionerDetails, Profile, ProfileUpdate,
    ProgressRecord, ProgressRecordDetails, Role, TherapyType, TreatmentRoom,
};

pub use hosted::HostedBackend;
pub use query::{Order, Query};

/// Capacity of the identity-change channel.
pub const AUTH_EVENT_CAPACITY: usize = 16;

/// An authenticated identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    /// Attributes given at sign-up (`full_name`, `phone`, `role`).
    #[serde(default)]
    pub user_metadata: HashMap<String, serde_json::Value>,
}

/// A signed-in session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub user: User,
}

impl Session {
    /// True if the session carries an expiry that has passed.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Attributes recorded with a new identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityAttributes {
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub role: Role,
}

/// Result of registering an identity.
#[derive(Debug, Clone, PartialEq)]
pub struct SignUpOutcome {
    pub user: User,
    /// Present when the backend signs the user in straight away; absent when
    /// the email must be confirmed first.
    pub session: Option<Session>,
}

/// Identity-change notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    /// A session started for this user.
    SignedIn(User),
    /// The user's identity attributes changed.
    UserUpdated(User),
    /// The session ended.
    SignedOut,
}

/// Which appointments to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentFilter {
    /// Appointments booked by this patient.
    Patient(Uuid),
    /// Appointments assigned to this practitioner row.
    Practitioner(Uuid),
}

/// The data-access facade.
#[async_trait]
pub trait Backend: Send + Sync + std::fmt::Debug {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    // === Identity ===

    /// Register an identity with attributes.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        attributes: &IdentityAttributes,
    ) -> Result<SignUpOutcome>;

    /// Authenticate with credentials and start a session.
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;

    /// End the current session.
    async fn sign_out(&self) -> Result<()>;

    /// The identity of the current session, if any.
    async fn current_user(&self) -> Result<Option<User>>;

    /// Adopt a session obtained earlier, e.g. one persisted by the CLI.
    fn restore_session(&self, session: Session);

    /// The current session, if any.
    fn session(&self) -> Option<Session>;

    /// Subscribe to identity changes.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;

    // === Records ===

    /// Profile by id.
    async fn profile(&self, id: Uuid) -> Result<Profile>;

    /// Change a profile.
    async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> Result<()>;

    /// Therapy catalog ordered by name.
    async fn therapy_types(&self) -> Result<Vec<TherapyType>>;

    /// Practitioners with their contact profile.
    async fn practitioners(&self) -> Result<Vec<PractitionerDetails>>;

    /// The practitioner row linked to a profile.
    async fn practitioner_for_profile(&self, profile_id: Uuid) -> Result<Option<Practitioner>>;

    /// Active rooms ordered by name.
    async fn treatment_rooms(&self) -> Result<Vec<TreatmentRoom>>;

    /// Insert an appointment.
    async fn create_appointment(&self, appointment: &NewAppointment) -> Result<Appointment>;

    /// Appointments matching `filter`, earliest date first.
    async fn appointments(&self, filter: AppointmentFilter) -> Result<Vec<AppointmentDetails>>;

    /// Set an appointment's status.
    async fn update_appointment_status(&self, id: Uuid, status: AppointmentStatus) -> Result<()>;

    /// Insert a progress record.
    async fn create_progress_record(&self, record: &NewProgressRecord) -> Result<ProgressRecord>;

    /// A patient's progress records, newest first.
    async fn progress_records(&self, patient_id: Uuid) -> Result<Vec<ProgressRecordDetails>>;

    /// Insert a notification.
    async fn create_notification(&self, notification: &NewNotification) -> Result<Notification>;

    /// A user's notifications, newest first.
    async fn notifications(&self, user_id: Uuid) -> Result<Vec<Notification>>;

    /// Mark a notification read.
    async fn mark_notification_read(&self, id: Uuid) -> Result<()>;
}

/// List the appointments visible to a user in the given role.
///
/// Practitioners are resolved to their practitioner row first. A profile with
/// no practitioner row sees nothing.
///
/// # Errors
///
/// Returns any backend error.
pub async fn appointments_for(
    backend: &dyn Backend,
    user_id: Uuid,
    role: Role,
) -> Result<Vec<AppointmentDetails>> {
    let filter = match role {
        Role::Patient => AppointmentFilter::Patient(user_id),
        Role::Practitioner => match backend.practitioner_for_profile(user_id).await? {
            Some(practitioner) => AppointmentFilter::Practitioner(practitioner.id),
            None => {
                debug!("profile {} has no practitioner row", user_id);
                return Ok(Vec::new());
            }
        },
    };
    backend.appointments(filter).await
}

/// Build the backend selected by the configuration.
///
/// # Errors
///
/// Returns an error if the hosted settings are missing or the sandbox
/// database cannot be opened.
pub fn connect(config: &Config) -> Result<Arc<dyn Backend>> {
    match config.backend.kind {
        BackendKind::Hosted => Ok(Arc::new(HostedBackend::from_config(config)?)),
        BackendKind::Local => Ok(Arc::new(crate::storage::Storage::open(
            config.database_path(),
        )?)),
    }
}
