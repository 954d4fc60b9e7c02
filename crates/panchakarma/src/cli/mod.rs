//! Command-line interface for the clinic client.
//!
//! This module provides the CLI structure for the `panchakarma` binary and
//! the renderers its commands print through.

mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::logging::Verbosity;

pub use commands::{
    AppointmentsCommand, AuthCommand, BookCommand, CatalogCommand, ConfigCommand,
    DashboardCommand, NotificationsCommand, OutputFormat, ProgressCommand, RoleArg, SlotsCommand,
    StatusArg,
};

/// panchakarma - Book and follow Panchakarma therapy sessions
///
/// Sign in as a patient to book sessions, read notifications and track
/// progress, or as a practitioner to see the day's schedule and rooms.
#[derive(Debug, Parser)]
#[command(name = "panchakarma")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign up, sign in and manage your profile
    #[command(subcommand)]
    Auth(AuthCommand),

    /// Browse therapies, rooms and practitioners
    #[command(subcommand)]
    Catalog(CatalogCommand),

    /// Show the offered time slots
    Slots(SlotsCommand),

    /// Book a therapy session
    Book(BookCommand),

    /// List or update appointments
    #[command(subcommand)]
    Appointments(AppointmentsCommand),

    /// Read notifications
    #[command(subcommand)]
    Notifications(NotificationsCommand),

    /// Record or review wellness progress
    #[command(subcommand)]
    Progress(ProgressCommand),

    /// Show the dashboard for your role
    Dashboard(DashboardCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Command {
    /// True for commands that never talk to the backend.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

impl Cli {
    /// The verbosity asked for on the command line, falling back to
    /// `configured` when no `-q`/`-v` flag was given.
    #[must_use]
    pub fn verbosity_or(&self, configured: Verbosity) -> Verbosity {
        match (self.quiet, self.verbose) {
            (true, _) => Verbosity::Quiet,
            (false, 0) => configured,
            (false, 1) => Verbosity::Verbose,
            (false, _) => Verbosity::Trace,
        }
    }
}
