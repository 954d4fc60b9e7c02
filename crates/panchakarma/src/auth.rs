//! Sign-in and sign-up forms and the session context.
//!
//! [`SessionContext`] holds the signed-in identity and its profile for the
//! lifetime of a client. It is passed explicitly to whatever needs it and is
//! kept current from the backend's identity-change events.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, warn};

use crate::backend::{AuthEvent, Backend, IdentityAttributes, SignUpOutcome, User};
use crate::error::{Error, Result};
use crate::model::{Profile, ProfileUpdate, Role};
use crate::notice::Notice;

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid"))
}

fn require(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::invalid_field(field, "is required"));
    }
    Ok(())
}

fn check_email(email: &str) -> Result<()> {
    require("email", email)?;
    if !email_pattern().is_match(email.trim()) {
        return Err(Error::invalid_field("email", "is not a valid address"));
    }
    Ok(())
}

/// Credentials for an existing account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignInForm {
    pub email: String,
    pub password: String,
}

impl SignInForm {
    /// Check both fields are present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidField`] for the first empty or malformed field.
    pub fn validate(&self) -> Result<()> {
        check_email(&self.email)?;
        require("password", &self.password)
    }
}

/// Details for a new account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignUpForm {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub full_name: String,
    pub phone: String,
    pub role: Role,
}

impl SignUpForm {
    /// Check the form before anything is sent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PasswordMismatch`] when the confirmation differs, or
    /// [`Error::InvalidField`] for an empty or malformed field.
    pub fn validate(&self) -> Result<()> {
        if self.password != self.confirm_password {
            return Err(Error::PasswordMismatch);
        }
        check_email(&self.email)?;
        require("password", &self.password)?;
        require("full_name", &self.full_name)
    }

    /// Metadata stored with the new identity.
    #[must_use]
    pub fn attributes(&self) -> IdentityAttributes {
        let phone = self.phone.trim();
        IdentityAttributes {
            full_name: self.full_name.trim().to_string(),
            phone: (!phone.is_empty()).then(|| phone.to_string()),
            role: self.role,
        }
    }
}

/// Notice shown after a successful sign-in.
#[must_use]
pub fn signed_in_notice() -> Notice {
    Notice::info("Welcome back!", "You have been successfully signed in.")
}

/// Notice shown after a successful sign-up.
///
/// When the backend started a session straight away there is nothing to
/// verify, so the description says so.
#[must_use]
pub fn signed_up_notice(outcome: &SignUpOutcome) -> Notice {
    if outcome.session.is_some() {
        Notice::info("Account created!", "You are now signed in.")
    } else {
        Notice::info(
            "Account created!",
            "Please check your email to verify your account.",
        )
    }
}

/// Notice for a failed sign-in or sign-up.
#[must_use]
pub fn auth_failure_notice(err: &Error) -> Notice {
    match err {
        Error::PasswordMismatch => Notice::from_error("Password mismatch", err),
        _ => Notice::from_error("Authentication failed", err),
    }
}

/// The signed-in identity and profile.
#[derive(Debug)]
pub struct SessionContext {
    backend: Arc<dyn Backend>,
    events: broadcast::Receiver<AuthEvent>,
    user: Option<User>,
    profile: Option<Profile>,
    loading: bool,
}

impl SessionContext {
    /// Create a context in the loading state. Call [`SessionContext::initialize`] next.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let events = backend.subscribe();
        Self {
            backend,
            events,
            user: None,
            profile: None,
            loading: true,
        }
    }

    /// The backend this context talks to.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Signed-in identity.
    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Profile of the signed-in identity, once loaded.
    #[must_use]
    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    /// True until the first identity check finishes.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// The signed-in identity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSignedIn`] when nobody is signed in.
    pub fn require_user(&self) -> Result<&User> {
        self.user.as_ref().ok_or(Error::NotSignedIn)
    }

    /// The role to present: the profile's, or patient while it is unknown.
    #[must_use]
    pub fn role(&self) -> Role {
        self.profile.as_ref().map(|p| p.role).unwrap_or_default()
    }

    /// Fetch the current identity and, if there is one, its profile.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the identity check fails. Loading ends
    /// either way.
    pub async fn initialize(&mut self) -> Result<()> {
        let user = match self.backend.current_user().await {
            Ok(user) => user,
            Err(err) => {
                self.loading = false;
                return Err(err);
            }
        };

        self.user = user;
        match self.user.as_ref().map(|u| u.id) {
            Some(id) => self.load_profile(id).await,
            None => {
                self.profile = None;
                self.loading = false;
            }
        }
        Ok(())
    }

    /// Apply identity changes published since the last call.
    pub async fn refresh(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.apply(event).await,
                Err(TryRecvError::Lagged(skipped)) => {
                    debug!("skipped {} identity events", skipped);
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }

    async fn apply(&mut self, event: AuthEvent) {
        match event {
            AuthEvent::SignedIn(user) => {
                let id = user.id;
                let already_loaded = self.profile.as_ref().is_some_and(|p| p.id == id);
                self.user = Some(user);
                if !already_loaded {
                    self.load_profile(id).await;
                }
            }
            AuthEvent::UserUpdated(user) => {
                let id = user.id;
                self.user = Some(user);
                self.load_profile(id).await;
            }
            AuthEvent::SignedOut => {
                self.user = None;
                self.profile = None;
                self.loading = false;
            }
        }
    }

    /// A failed read clears the profile so a previous user's stays hidden.
    async fn load_profile(&mut self, id: uuid::Uuid) {
        match self.backend.profile(id).await {
            Ok(profile) => self.profile = Some(profile),
            Err(err) => {
                warn!("Error loading profile: {}", err);
                self.profile = None;
            }
        }
        self.loading = false;
    }

    /// Sign in. Returns once the identity and its profile are loaded.
    ///
    /// # Errors
    ///
    /// Returns a validation error without contacting the backend, or the
    /// backend's error.
    pub async fn sign_in(&mut self, form: &SignInForm) -> Result<()> {
        form.validate()?;

        let session = self.backend.sign_in(form.email.trim(), &form.password).await?;
        let id = session.user.id;
        self.user = Some(session.user);
        self.load_profile(id).await;

        info!("Signed in as {}", form.email.trim());
        Ok(())
    }

    /// Register a new identity.
    ///
    /// # Errors
    ///
    /// Returns a validation error without contacting the backend, or the
    /// backend's error.
    pub async fn sign_up(&mut self, form: &SignUpForm) -> Result<SignUpOutcome> {
        form.validate()?;

        let outcome = self
            .backend
            .sign_up(form.email.trim(), &form.password, &form.attributes())
            .await?;

        if let Some(session) = &outcome.session {
            let id = session.user.id;
            self.user = Some(session.user.clone());
            self.load_profile(id).await;
        }
        Ok(outcome)
    }

    /// End the session and forget the identity.
    ///
    /// # Errors
    ///
    /// Returns the backend's error. The local identity is cleared regardless.
    pub async fn sign_out(&mut self) -> Result<()> {
        let result = self.backend.sign_out().await;
        self.user = None;
        self.profile = None;
        if let Err(err) = &result {
            warn!("Error signing out: {}", err);
        }
        result
    }

    /// Write profile changes and reload the profile. Does nothing when
    /// nobody is signed in.
    ///
    /// # Errors
    ///
    /// Returns the backend's error.
    pub async fn update_profile(&mut self, update: &ProfileUpdate) -> Result<()> {
        let Some(id) = self.user.as_ref().map(|u| u.id) else {
            return Ok(());
        };
        if update.is_empty() {
            return Ok(());
        }

        self.backend.update_profile(id, update).await?;
        self.load_profile(id).await;
        Ok(())
    }
}
