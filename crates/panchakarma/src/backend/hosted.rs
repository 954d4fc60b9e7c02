//! Client for the hosted backend-as-a-service.
//!
//! Identity calls go to `/auth/v1`, records to `/rest/v1`. Every request
//! carries the public access key in `apikey`; the bearer token is the session's
//! access token when signed in and the access key otherwise.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use super::query::{join_base, Order, Query};
use super::{
    AppointmentFilter, AuthEvent, Backend, IdentityAttributes, Session, SignUpOutcome, User,
    AUTH_EVENT_CAPACITY,
};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    Appointment, AppointmentDetails, AppointmentStatus, NewAppointment, NewNotification,
    NewProgressRecord, Notification, Practitioner, PractitionerDetails, Profile, ProfileUpdate,
    ProgressRecord, ProgressRecordDetails, TherapyType, TreatmentRoom,
};

/// Media type asking the record API for exactly one object.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

const APPOINTMENT_SELECT: &str = "
    *,
    therapy_types (name, duration_minutes),
    treatment_rooms (name),
    practitioners (
        profiles:profile_id (full_name)
    )";

const PRACTITIONER_SELECT: &str = "
    *,
    profiles:profile_id (
        full_name,
        email,
        phone
    )";

const PROGRESS_SELECT: &str = "
    *,
    appointments (
        appointment_date,
        therapy_types (name)
    )";

/// Token endpoint payload.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: User,
}

impl From<TokenResponse> for Session {
    fn from(token: TokenResponse) -> Self {
        Self {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: token
                .expires_in
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
            user: token.user,
        }
    }
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

/// Backend that forwards every call to the hosted service.
pub struct HostedBackend {
    base: Url,
    anon_key: String,
    client: Client,
    session: RwLock<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
}

impl std::fmt::Debug for HostedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedBackend")
            .field("base", &self.base.as_str())
            .field("signed_in", &self.session().is_some())
            .finish_non_exhaustive()
    }
}

impl HostedBackend {
    /// Create a client for the service at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse or the HTTP client cannot be
    /// built.
    pub fn new(url: &str, anon_key: &str, timeout: std::time::Duration) -> Result<Self> {
        let base = Url::parse(url).map_err(|e| Error::ConfigValidation {
            message: format!("backend.url is not a valid URL: {e}"),
        })?;
        let client = Client::builder().timeout(timeout).build()?;
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);

        Ok(Self {
            base,
            anon_key: anon_key.to_string(),
            client,
            session: RwLock::new(None),
            events,
        })
    }

    /// Create a client from the loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingBackendSetting`] when the URL or access key is
    /// absent.
    pub fn from_config(config: &Config) -> Result<Self> {
        let url = config
            .backend
            .url
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(Error::MissingBackendSetting("backend.url"))?;
        let key = config
            .backend
            .anon_key
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(Error::MissingBackendSetting("backend.anon_key"))?;
        Self::new(url, key, config.request_timeout())
    }

    fn set_session(&self, session: Option<Session>) {
        *self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner) = session;
    }

    fn bearer(&self) -> String {
        self.session()
            .map_or_else(|| self.anon_key.clone(), |s| s.access_token)
    }

    fn auth_url(&self, path: &str) -> Result<Url> {
        join_base(&self.base, &format!("auth/v1/{path}"))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!("{} {}", method, url.path());
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header(AUTHORIZATION, format!("Bearer {}", self.bearer()))
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::backend(status.as_u16(), error_message(status, &body)));
        }
        Ok(response.json().await?)
    }

    async fn send_empty(request: RequestBuilder) -> Result<()> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::backend(status.as_u16(), error_message(status, &body)));
        }
        Ok(())
    }

    async fn read<T: DeserializeOwned>(&self, query: &Query) -> Result<Vec<T>> {
        let url = query.to_url(&self.base)?;
        Self::send(self.request(Method::GET, url)).await
    }

    async fn read_single<T: DeserializeOwned>(&self, query: &Query, id: Uuid) -> Result<T> {
        let url = query.to_url(&self.base)?;
        let request = self
            .request(Method::GET, url)
            .header(ACCEPT, HeaderValue::from_static(SINGLE_OBJECT));
        match Self::send(request).await {
            Err(Error::Backend { status: 406, .. }) => {
                Err(Error::not_found(query.collection(), id))
            }
            other => other,
        }
    }

    async fn insert<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        collection: &'static str,
        body: &B,
    ) -> Result<T> {
        let url = Query::from(collection).select("*").to_url(&self.base)?;
        let request = self
            .request(Method::POST, url)
            .header("Prefer", "return=representation")
            .json(body);
        let mut rows: Vec<T> = Self::send(request).await?;
        if rows.is_empty() {
            return Err(Error::internal(format!(
                "insert into {collection} returned no rows"
            )));
        }
        Ok(rows.swap_remove(0))
    }

    async fn update<B: Serialize + Sync>(&self, query: &Query, body: &B) -> Result<()> {
        let url = query.to_url(&self.base)?;
        Self::send_empty(self.request(Method::PATCH, url).json(body)).await
    }
}

/// Pull a readable message out of an error response body.
///
/// The identity and record APIs use different keys; whichever is present is
/// returned unchanged. A body that is not JSON is returned as-is, and an empty
/// one falls back to the status reason.
#[must_use]
pub fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["message", "msg", "error_description", "error"] {
            if let Some(text) = value.get(key).and_then(Value::as_str) {
                if !text.is_empty() {
                    return text.to_string();
                }
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl Backend for HostedBackend {
    fn name(&self) -> &'static str {
        "hosted"
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        attributes: &IdentityAttributes,
    ) -> Result<SignUpOutcome> {
        let url = self.auth_url("signup")?;
        let body = json!({
            "email": email,
            "password": password,
            "data": attributes,
        });
        let value: Value = Self::send(self.request(Method::POST, url).json(&body)).await?;

        // With email confirmation on, the service answers with the bare user
        if value.get("access_token").is_some() {
            let session: Session = serde_json::from_value::<TokenResponse>(value)?.into();
            self.set_session(Some(session.clone()));
            let _ = self.events.send(AuthEvent::SignedIn(session.user.clone()));
            Ok(SignUpOutcome {
                user: session.user.clone(),
                session: Some(session),
            })
        } else {
            let user: User = serde_json::from_value(value)?;
            Ok(SignUpOutcome {
                user,
                session: None,
            })
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let mut url = self.auth_url("token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");
        let token: TokenResponse = Self::send(
            self.request(Method::POST, url)
                .json(&Credentials { email, password }),
        )
        .await?;

        let session: Session = token.into();
        self.set_session(Some(session.clone()));
        let _ = self.events.send(AuthEvent::SignedIn(session.user.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        if self.session().is_none() {
            return Ok(());
        }
        let url = self.auth_url("logout")?;
        let result = Self::send_empty(self.request(Method::POST, url)).await;

        self.set_session(None);
        let _ = self.events.send(AuthEvent::SignedOut);
        result
    }

    async fn current_user(&self) -> Result<Option<User>> {
        if self.session().is_none() {
            return Ok(None);
        }
        let url = self.auth_url("user")?;
        match Self::send::<User>(self.request(Method::GET, url)).await {
            Ok(user) => Ok(Some(user)),
            Err(Error::Backend { status: 401 | 403, message }) => {
                warn!("stored session rejected: {}", message);
                self.set_session(None);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn restore_session(&self, session: Session) {
        self.set_session(Some(session));
    }

    fn session(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn profile(&self, id: Uuid) -> Result<Profile> {
        let query = Query::from("profiles").select("*").eq("id", id);
        self.read_single(&query, id).await
    }

    async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> Result<()> {
        self.update(&Query::from("profiles").eq("id", id), update)
            .await
    }

    async fn therapy_types(&self) -> Result<Vec<TherapyType>> {
        self.read(
            &Query::from("therapy_types")
                .select("*")
                .order("name", Order::Ascending),
        )
        .await
    }

    async fn practitioners(&self) -> Result<Vec<PractitionerDetails>> {
        self.read(&Query::from("practitioners").select(PRACTITIONER_SELECT))
            .await
    }

    async fn practitioner_for_profile(&self, profile_id: Uuid) -> Result<Option<Practitioner>> {
        let mut rows: Vec<Practitioner> = self
            .read(
                &Query::from("practitioners")
                    .select("*")
                    .eq("profile_id", profile_id),
            )
            .await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    async fn treatment_rooms(&self) -> Result<Vec<TreatmentRoom>> {
        self.read(
            &Query::from("treatment_rooms")
                .select("*")
                .eq("is_active", true)
                .order("name", Order::Ascending),
        )
        .await
    }

    async fn create_appointment(&self, appointment: &NewAppointment) -> Result<Appointment> {
        self.insert("appointments", appointment).await
    }

    async fn appointments(&self, filter: AppointmentFilter) -> Result<Vec<AppointmentDetails>> {
        let query = Query::from("appointments").select(APPOINTMENT_SELECT);
        let query = match filter {
            AppointmentFilter::Patient(id) => query.eq("patient_id", id),
            AppointmentFilter::Practitioner(id) => query.eq("practitioner_id", id),
        };
        self.read(
            &query
                .order("appointment_date", Order::Ascending)
                .order("start_time", Order::Ascending),
        )
        .await
    }

    async fn update_appointment_status(&self, id: Uuid, status: AppointmentStatus) -> Result<()> {
        self.update(
            &Query::from("appointments").eq("id", id),
            &json!({ "status": status }),
        )
        .await
    }

    async fn create_progress_record(&self, record: &NewProgressRecord) -> Result<ProgressRecord> {
        self.insert("progress_records", record).await
    }

    async fn progress_records(&self, patient_id: Uuid) -> Result<Vec<ProgressRecordDetails>> {
        self.read(
            &Query::from("progress_records")
                .select(PROGRESS_SELECT)
                .eq("patient_id", patient_id)
                .order("recorded_at", Order::Descending),
        )
        .await
    }

    async fn create_notification(&self, notification: &NewNotification) -> Result<Notification> {
        self.insert("notifications", notification).await
    }

    async fn notifications(&self, user_id: Uuid) -> Result<Vec<Notification>> {
        self.read(
            &Query::from("notifications")
                .select("*")
                .eq("user_id", user_id)
                .order("created_at", Order::Descending),
        )
        .await
    }

    async fn mark_notification_read(&self, id: Uuid) -> Result<()> {
        self.update(
            &Query::from("notifications").eq("id", id),
            &json!({ "is_read": true }),
        )
        .await
    }
}
