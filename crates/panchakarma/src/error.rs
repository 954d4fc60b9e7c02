//! Error types for panchakarma.
//!
//! Every backend call and every local form check returns [`Result`]. Errors are
//! not retried; the caller turns them into a [`Notice`](crate::notice::Notice)
//! and the user decides whether to try again.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

/// The main error type for panchakarma operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Backend Errors ===
    /// The hosted backend answered with a non-success status.
    #[error("{message}")]
    Backend {
        /// HTTP status code returned by the backend.
        status: u16,
        /// Message reported by the backend, shown verbatim.
        message: String,
    },

    /// The request never produced a response.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// A requested record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Collection the record was looked up in.
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// An operation that needs an identity was attempted while signed out.
    #[error("not signed in")]
    NotSignedIn,

    /// Credentials were rejected.
    #[error("Invalid login credentials")]
    InvalidCredentials,

    // === Booking Errors ===
    /// Booking was submitted before every required selection was made.
    #[error("missing selection: {}", missing.join(", "))]
    IncompleteBooking {
        /// Names of the selections that are still empty.
        missing: Vec<&'static str>,
    },

    /// The chosen date is before today.
    #[error("cannot book a session on {date}, which is in the past")]
    DateInPast {
        /// The rejected date.
        date: chrono::NaiveDate,
    },

    /// A time label could not be parsed as `H:MM AM|PM`.
    #[error("invalid time slot '{label}': {reason}")]
    InvalidSlot {
        /// The label as given.
        label: String,
        /// What was wrong with it.
        reason: &'static str,
    },

    /// A well-formed time label that the clinic does not offer.
    #[error("time slot '{0}' is not offered")]
    SlotNotOffered(String),

    /// The appointment was written but its companion notification was not.
    #[error("appointment {appointment_id} was booked but its notification failed: {source}")]
    PartialBooking {
        /// The appointment that now exists.
        appointment_id: Uuid,
        /// Why the notification write failed.
        #[source]
        source: Box<Error>,
    },

    // === Form Errors ===
    /// Password and confirmation differ.
    #[error("Passwords do not match.")]
    PasswordMismatch,

    /// A required form field is empty or malformed.
    #[error("invalid {field}: {message}")]
    InvalidField {
        /// Name of the field.
        field: &'static str,
        /// Description of the problem.
        message: String,
    },

    // === Storage Errors ===
    /// Failed to open or create the sandbox database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A sandbox database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// A setting required to reach the hosted backend is absent.
    #[error("missing backend setting '{0}'; set it in the config file or the environment")]
    MissingBackendSetting(&'static str),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for panchakarma operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a backend error from a status and message.
    #[must_use]
    pub fn backend(status: u16, message: impl Into<String>) -> Self {
        Self::Backend {
            status,
            message: message.into(),
        }
    }

    /// Create a not-found error.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create an invalid field error.
    #[must_use]
    pub fn invalid_field(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            message: message.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error was raised locally, before any backend call.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::IncompleteBooking { .. }
                | Self::DateInPast { .. }
                | Self::InvalidSlot { .. }
                | Self::SlotNotOffered(_)
                | Self::PasswordMismatch
                | Self::InvalidField { .. }
        )
    }

    /// Check if this error means the caller has to sign in first.
    #[must_use]
    pub fn is_not_signed_in(&self) -> bool {
        matches!(self, Self::NotSignedIn)
    }

    /// Check if this error is fatal at startup.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigLoad(_) | Self::ConfigValidation { .. } | Self::MissingBackendSetting(_)
        )
    }
}
