//! `panchakarma` - CLI for the clinic client
//!
//! This binary signs patients and practitioners in, books therapy sessions
//! and shows the dashboards, against the backend named in the configuration.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use tracing::{debug, warn};
use uuid::Uuid;

use panchakarma::auth::{auth_failure_notice, signed_in_notice, signed_up_notice};
use panchakarma::backend::{self, appointments_for, Backend};
use panchakarma::booking::booking_failure_notice;
use panchakarma::cli::{
    output, AppointmentsCommand, AuthCommand, BookCommand, CatalogCommand, Cli, Command,
    ConfigCommand, DashboardCommand, NotificationsCommand, ProgressCommand, SlotsCommand,
};
use panchakarma::logging::Verbosity;
use panchakarma::model::{AppointmentStatus, NewProgressRecord, ProfileUpdate, Role};
use panchakarma::{
    init_logging, BookingForm, Config, DashboardView, Error, Notice, PatientDashboard,
    PractitionerDashboard, Result, Scheduler, SessionContext, SessionStore, SignInForm,
    SignUpForm,
};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    if let Command::Config(cmd) = &cli.command {
        init_logging(cli.verbosity_or(Verbosity::default()));
        return handle_config(cli.config.clone(), cmd);
    }

    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;
    init_logging(cli.verbosity_or(config.logging.verbosity));
    let backend = backend::connect(&config).context("failed to set up the backend")?;
    let store = SessionStore::new(config.session_path());

    if let Some(session) = store.load(config.backend.kind)? {
        debug!("Restoring session for {}", session.user.id);
        backend.restore_session(session);
    }

    let mut ctx = SessionContext::new(Arc::clone(&backend));
    if let Err(err) = ctx.initialize().await {
        warn!("Could not check the current session: {}", err);
    }

    let mut app = App {
        config,
        store,
        backend,
        ctx,
    };

    match app.run(cli.command).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(notice) => {
            eprintln!("{notice}");
            Ok(ExitCode::FAILURE)
        }
    }
}

#[derive(Debug)]
struct App {
    config: Config,
    store: SessionStore,
    backend: Arc<dyn Backend>,
    ctx: SessionContext,
}

fn request_failure_notice(err: &Error) -> Notice {
    Notice::from_error("Request failed", err)
}

impl App {
    async fn run(&mut self, command: Command) -> std::result::Result<(), Notice> {
        match command {
            Command::Auth(cmd) => self.auth(cmd).await.map_err(|e| auth_failure_notice(&e)),
            Command::Catalog(cmd) => self.catalog(cmd).await.map_err(|e| request_failure_notice(&e)),
            Command::Slots(cmd) => self.slots(cmd).await.map_err(|e| request_failure_notice(&e)),
            Command::Book(cmd) => self.book(cmd).await.map_err(|e| booking_failure_notice(&e)),
            Command::Appointments(cmd) => self
                .appointments(cmd)
                .await
                .map_err(|e| request_failure_notice(&e)),
            Command::Notifications(cmd) => self
                .notifications(cmd)
                .await
                .map_err(|e| request_failure_notice(&e)),
            Command::Progress(cmd) => self
                .progress(cmd)
                .await
                .map_err(|e| request_failure_notice(&e)),
            Command::Dashboard(cmd) => self
                .dashboard(cmd)
                .await
                .map_err(|e| request_failure_notice(&e)),
            // Handled before the backend is built
            Command::Config(_) => Ok(()),
        }
    }

    fn save_session(&self) -> Result<()> {
        match self.backend.session() {
            Some(session) => self.store.save(self.config.backend.kind, &session),
            None => Ok(()),
        }
    }

    fn user_id(&self) -> Result<Uuid> {
        self.ctx.require_user().map(|u| u.id)
    }

    async fn auth(&mut self, cmd: AuthCommand) -> Result<()> {
        match cmd {
            AuthCommand::SignUp {
                email,
                full_name,
                phone,
                role,
                password,
                confirm_password,
            } => {
                let form = SignUpForm {
                    email,
                    confirm_password: confirm_password.unwrap_or_else(|| password.clone()),
                    password,
                    full_name,
                    phone,
                    role: role.into(),
                };
                let outcome = self.ctx.sign_up(&form).await?;
                self.save_session()?;
                println!("{}", signed_up_notice(&outcome));
            }
            AuthCommand::SignIn { email, password } => {
                self.ctx.sign_in(&SignInForm { email, password }).await?;
                self.save_session()?;
                println!("{}", signed_in_notice());
            }
            AuthCommand::SignOut => {
                let result = self.ctx.sign_out().await;
                self.store.clear()?;
                result?;
                println!("Signed out.");
            }
            AuthCommand::Whoami { format } => {
                let user = self.ctx.require_user()?;
                print!("{}", output::whoami(user, self.ctx.profile(), format)?);
            }
            AuthCommand::UpdateProfile { full_name, phone } => {
                self.ctx.require_user()?;
                let update = ProfileUpdate { full_name, phone };
                if update.is_empty() {
                    println!("Nothing to update.");
                    return Ok(());
                }
                self.ctx.update_profile(&update).await?;
                println!("Profile updated.");
            }
        }
        Ok(())
    }

    async fn catalog(&self, cmd: CatalogCommand) -> Result<()> {
        let rendered = match cmd {
            CatalogCommand::Therapies { format } => {
                output::therapies(&self.backend.therapy_types().await?, format)?
            }
            CatalogCommand::Rooms { format } => {
                output::rooms(&self.backend.treatment_rooms().await?, format)?
            }
            CatalogCommand::Practitioners { format } => {
                output::practitioners(&self.backend.practitioners().await?, format)?
            }
        };
        print!("{rendered}");
        Ok(())
    }

    async fn slots(&self, cmd: SlotsCommand) -> Result<()> {
        let scheduler = Scheduler::from_config(Arc::clone(&self.backend), &self.config);
        let windows = match &cmd.therapy {
            Some(key) => {
                let therapies = self.backend.therapy_types().await?;
                let therapy = find(therapies, key, "therapy type", |t| t.id, |t| t.name.as_str())?;
                let date = cmd.date.unwrap_or_else(|| Local::now().date_naive());
                scheduler.windows(date, &therapy)
            }
            None => Vec::new(),
        };
        print!("{}", output::slots(scheduler.offered(), &windows, cmd.format)?);
        Ok(())
    }

    async fn book(&self, cmd: BookCommand) -> Result<()> {
        let patient_id = self.user_id()?;
        let scheduler = Scheduler::from_config(Arc::clone(&self.backend), &self.config);
        let catalog = scheduler.catalog().await?;

        let mut form = BookingForm::new();
        if let Some(date) = cmd.date {
            form.select_date(date);
        }
        if let Some(label) = &cmd.time {
            form.select_time_label(label)?;
        }
        if let Some(key) = &cmd.therapy {
            form.select_therapy(find(catalog.therapies, key, "therapy type", |t| t.id, |t| t.name.as_str())?);
        }
        if let Some(key) = &cmd.room {
            form.select_room(find(catalog.rooms, key, "treatment room", |r| r.id, |r| r.name.as_str())?);
        }
        if let Some(key) = &cmd.practitioner {
            form.select_practitioner(Some(find(
                catalog.practitioners,
                key,
                "practitioner",
                |p| p.practitioner.id,
                |p| p.contact.as_ref().map_or("", |c| c.full_name.as_str()),
            )?));
        }
        form.set_notes(cmd.notes);
        debug!("Booking {}", form.summary());

        let booking = scheduler
            .book(&mut form, patient_id, Local::now().date_naive())
            .await?;
        print!("{}", output::booking(&booking, cmd.format)?);
        Ok(())
    }

    async fn appointments(&self, cmd: AppointmentsCommand) -> Result<()> {
        let user_id = self.user_id()?;
        match cmd {
            AppointmentsCommand::List { status, format } => {
                let mut items = appointments_for(&*self.backend, user_id, self.ctx.role()).await?;
                if let Some(status) = status {
                    let status: AppointmentStatus = status.into();
                    items.retain(|a| a.appointment.status == status);
                }
                print!("{}", output::appointments(&items, format)?);
            }
            AppointmentsCommand::SetStatus { id, status } => {
                let status: AppointmentStatus = status.into();
                self.backend.update_appointment_status(id, status).await?;
                println!("Appointment {id} is now {status}.");
            }
        }
        Ok(())
    }

    async fn notifications(&self, cmd: NotificationsCommand) -> Result<()> {
        let user_id = self.user_id()?;
        match cmd {
            NotificationsCommand::List { unread, format } => {
                let mut items = self.backend.notifications(user_id).await?;
                if unread {
                    items.retain(|n| !n.is_read);
                }
                print!("{}", output::notifications(&items, format)?);
            }
            NotificationsCommand::Read { id } => {
                self.backend.mark_notification_read(id).await?;
                println!("Notification marked read.");
            }
        }
        Ok(())
    }

    async fn progress(&self, cmd: ProgressCommand) -> Result<()> {
        let patient_id = self.user_id()?;
        match cmd {
            ProgressCommand::List { format } => {
                let items = self.backend.progress_records(patient_id).await?;
                print!("{}", output::progress(&items, format)?);
            }
            ProgressCommand::Record {
                appointment,
                energy,
                sleep,
                digestion,
                stress,
                notes,
            } => {
                let record = NewProgressRecord {
                    patient_id,
                    appointment_id: appointment,
                    energy_level: energy,
                    sleep_quality: sleep,
                    digestion,
                    stress_level: stress,
                    notes,
                };
                record.validate()?;
                let saved = self.backend.create_progress_record(&record).await?;
                println!("Progress recorded ({}).", saved.id);
            }
        }
        Ok(())
    }

    async fn dashboard(&self, cmd: DashboardCommand) -> Result<()> {
        let role = cmd.role.map_or_else(|| self.ctx.role(), Role::from);
        let rendered = match role {
            Role::Patient => {
                let view = PatientDashboard::load(&self.ctx, self.config.clinic.program_days).await;
                let dashboard = ready(view)?;
                report(dashboard.notice.as_ref());
                output::patient_dashboard(&dashboard, cmd.format)?
            }
            Role::Practitioner => {
                let view = PractitionerDashboard::load(&self.ctx, Local::now().naive_local()).await;
                let dashboard = ready(view)?;
                report(dashboard.notice.as_ref());
                output::practitioner_dashboard(&dashboard, cmd.format)?
            }
        };
        print!("{rendered}");
        Ok(())
    }
}

fn ready<T>(view: DashboardView<T>) -> Result<T> {
    view.ready().ok_or(Error::NotSignedIn)
}

fn report(notice: Option<&Notice>) {
    if let Some(notice) = notice {
        eprintln!("{notice}");
    }
}

/// Pick the entry whose id or (case-insensitive) name matches `key`.
fn find<T>(
    items: Vec<T>,
    key: &str,
    entity: &'static str,
    id: impl Fn(&T) -> Uuid,
    name: impl Fn(&T) -> &str,
) -> Result<T> {
    let key = key.trim();
    let by_id = key.parse::<Uuid>().ok();
    items
        .into_iter()
        .find(|item| by_id == Some(id(item)) || name(item).eq_ignore_ascii_case(key))
        .ok_or_else(|| Error::not_found(entity, key))
}

fn handle_config(
    path: Option<std::path::PathBuf>,
    cmd: &ConfigCommand,
) -> anyhow::Result<ExitCode> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = Config::load_from(path).context("failed to load configuration")?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&config.redacted())?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Backend]");
                println!("  Kind:               {}", config.backend.kind);
                println!(
                    "  URL:                {}",
                    config.backend.url.as_deref().unwrap_or("-")
                );
                println!(
                    "  Access key:         {}",
                    if config.backend.anon_key.is_some() { "set" } else { "not set" }
                );
                println!("  Timeout (secs):     {}", config.backend.timeout_secs);
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[Clinic]");
                println!("  Time slots:         {}", config.clinic.time_slots.join(", "));
                println!("  Program days:       {}", config.clinic.program_days);
                println!();
                println!("[Session]");
                println!("  Path:               {}", config.session_path().display());
                println!();
                println!("[Logging]");
                println!("  Verbosity:          {:?}", config.logging.verbosity);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.clone().or(path).unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => {
                    println!("Configuration error: {e}");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
