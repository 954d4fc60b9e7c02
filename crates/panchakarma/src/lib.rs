//! `panchakarma` - Scheduling and dashboard client for a Panchakarma therapy clinic
//!
//! This library provides patient sign-up and sign-in, session booking with
//! derived appointment windows, and the patient and practitioner dashboards,
//! over either a hosted backend or a local SQLite sandbox.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod auth;
pub mod backend;
pub mod booking;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod logging;
pub mod model;
pub mod notice;
pub mod session;
pub mod slots;
pub mod storage;

pub use auth::{SessionContext, SignInForm, SignUpForm};
pub use backend::{Backend, HostedBackend};
pub use booking::{Booking, BookingForm, Scheduler};
pub use config::Config;
pub use dashboard::{DashboardView, PatientDashboard, PractitionerDashboard};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use notice::Notice;
pub use session::SessionStore;
pub use slots::{AppointmentWindow, TimeSlot};
pub use storage::Storage;
