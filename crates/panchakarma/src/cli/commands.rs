//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Subcommand, ValueEnum};
use uuid::Uuid;

use crate::model::{AppointmentStatus, Role};

/// Account commands.
#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Create an account
    SignUp {
        /// Email address
        #[arg(short, long)]
        email: String,

        /// Full name
        #[arg(short = 'n', long)]
        full_name: String,

        /// Phone number
        #[arg(long, default_value = "")]
        phone: String,

        /// Account role
        #[arg(short, long, value_enum, default_value = "patient")]
        role: RoleArg,

        /// Password
        #[arg(short, long, env = "PANCHAKARMA_PASSWORD", hide_env_values = true)]
        password: String,

        /// Password confirmation (defaults to the password)
        #[arg(long)]
        confirm_password: Option<String>,
    },

    /// Sign in to an existing account
    SignIn {
        /// Email address
        #[arg(short, long)]
        email: String,

        /// Password
        #[arg(short, long, env = "PANCHAKARMA_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Sign out and forget the stored session
    SignOut,

    /// Show the signed-in identity and profile
    Whoami {
        /// Output format
        #[arg(short, long, value_enum, default_value = "plain")]
        format: OutputFormat,
    },

    /// Change the signed-in profile
    UpdateProfile {
        /// New full name
        #[arg(short = 'n', long)]
        full_name: Option<String>,

        /// New phone number
        #[arg(long)]
        phone: Option<String>,
    },
}

/// Catalog commands.
#[derive(Debug, Subcommand)]
pub enum CatalogCommand {
    /// List therapy types
    Therapies {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// List active treatment rooms
    Rooms {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// List practitioners
    Practitioners {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

/// Slots command arguments.
#[derive(Debug, Args)]
pub struct SlotsCommand {
    /// Show the window each slot would occupy on this date (yyyy-MM-dd)
    #[arg(short, long)]
    pub date: Option<NaiveDate>,

    /// Therapy name or id, used for the session length
    #[arg(short, long)]
    pub therapy: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Book command arguments.
#[derive(Debug, Args)]
pub struct BookCommand {
    /// Session date (yyyy-MM-dd)
    #[arg(short, long)]
    pub date: Option<NaiveDate>,

    /// Time slot, e.g. "1:30 PM"
    #[arg(short = 'T', long)]
    pub time: Option<String>,

    /// Therapy name or id
    #[arg(short, long)]
    pub therapy: Option<String>,

    /// Room name or id
    #[arg(short, long)]
    pub room: Option<String>,

    /// Practitioner name or id
    #[arg(short, long)]
    pub practitioner: Option<String>,

    /// Notes for the clinic
    #[arg(long)]
    pub notes: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,
}

/// Appointment commands.
#[derive(Debug, Subcommand)]
pub enum AppointmentsCommand {
    /// List your appointments
    List {
        /// Only show appointments with this status
        #[arg(short, long, value_enum)]
        status: Option<StatusArg>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Change an appointment's status
    SetStatus {
        /// Appointment id
        id: Uuid,

        /// New status
        #[arg(value_enum)]
        status: StatusArg,
    },
}

/// Notification commands.
#[derive(Debug, Subcommand)]
pub enum NotificationsCommand {
    /// List your notifications, newest first
    List {
        /// Only show unread notifications
        #[arg(short, long)]
        unread: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Mark a notification read
    Read {
        /// Notification id
        id: Uuid,
    },
}

/// Progress commands.
#[derive(Debug, Subcommand)]
pub enum ProgressCommand {
    /// List your progress records, newest first
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Record how you feel, each score out of 10
    Record {
        /// Appointment the record follows
        #[arg(short, long)]
        appointment: Option<Uuid>,

        /// Energy level
        #[arg(long)]
        energy: Option<f32>,

        /// Sleep quality
        #[arg(long)]
        sleep: Option<f32>,

        /// Digestion
        #[arg(long)]
        digestion: Option<f32>,

        /// Stress level
        #[arg(long)]
        stress: Option<f32>,

        /// Free-text notes
        #[arg(long)]
        notes: Option<String>,
    },
}

/// Dashboard command arguments.
#[derive(Debug, Args)]
pub struct DashboardCommand {
    /// Which dashboard to show (defaults to the profile's role)
    #[arg(short, long, value_enum)]
    pub role: Option<RoleArg>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Role argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    /// Receives therapy
    Patient,
    /// Delivers therapy
    Practitioner,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Patient => Self::Patient,
            RoleArg::Practitioner => Self::Practitioner,
        }
    }
}

/// Appointment status argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    Scheduled,
    Confirmed,
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl From<StatusArg> for AppointmentStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Scheduled => Self::Scheduled,
            StatusArg::Confirmed => Self::Confirmed,
            StatusArg::Pending => Self::Pending,
            StatusArg::InProgress => Self::InProgress,
            StatusArg::Completed => Self::Completed,
            StatusArg::Cancelled => Self::Cancelled,
        }
    }
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Plain,
    /// Formatted table
    Table,
    /// JSON output
    Json,
}
