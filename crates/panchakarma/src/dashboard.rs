//! Patient and practitioner dashboards.
//!
//! Both are built from a [`SessionContext`]: while the identity check is
//! running the view is [`DashboardView::Loading`], with nobody signed in it is
//! [`DashboardView::SignInRequired`], and otherwise the dashboard's records
//! are loaded and summarised.

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use tracing::{debug, error};

use crate::auth::SessionContext;
use crate::backend::{appointments_for, AppointmentFilter};
use crate::error::Result;
use crate::model::{
    AppointmentDetails, AppointmentStatus, Notification, ProgressRecordDetails, Role,
    TreatmentRoom,
};
use crate::notice::Notice;

/// What a dashboard can show.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "dashboard", rename_all = "snake_case")]
pub enum DashboardView<T> {
    /// The identity check has not finished.
    Loading,
    /// Nobody is signed in.
    SignInRequired,
    /// Data loaded, possibly with a failure notice.
    Ready(T),
}

impl<T> DashboardView<T> {
    /// The dashboard, if ready.
    #[must_use]
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(dashboard) => Some(dashboard),
            Self::Loading | Self::SignInRequired => None,
        }
    }
}

fn load_failure_notice() -> Notice {
    Notice::failure("Error loading data", "Please try refreshing the page.")
}

/// Sessions completed out of the program length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgramProgress {
    pub completed: u32,
    pub total: u32,
    /// Rounded, capped at 100.
    pub percentage: u32,
}

impl ProgramProgress {
    #[must_use]
    pub fn new(completed: u32, total: u32) -> Self {
        let percentage = if total == 0 {
            0
        } else {
            ((completed.saturating_mul(100) + total / 2) / total).min(100)
        };
        Self {
            completed,
            total,
            percentage,
        }
    }
}

/// A patient's view of their program.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientDashboard {
    /// Display name, `"Patient"` if the profile is not loaded.
    pub name: String,
    pub appointments: Vec<AppointmentDetails>,
    pub notifications: Vec<Notification>,
    pub progress_records: Vec<ProgressRecordDetails>,
    pub program_days: u32,
    /// Set when any load failed.
    pub notice: Option<Notice>,
}

impl PatientDashboard {
    /// Load the signed-in patient's dashboard.
    pub async fn load(ctx: &SessionContext, program_days: u32) -> DashboardView<Self> {
        if ctx.is_loading() {
            return DashboardView::Loading;
        }
        let Some(user) = ctx.user() else {
            return DashboardView::SignInRequired;
        };

        let mut dashboard = Self {
            name: ctx
                .profile()
                .map_or_else(|| "Patient".to_string(), |p| p.full_name.clone()),
            appointments: Vec::new(),
            notifications: Vec::new(),
            progress_records: Vec::new(),
            program_days,
            notice: None,
        };

        if let Err(err) = dashboard.fill(ctx, user.id).await {
            error!("Error loading dashboard data: {}", err);
            dashboard.notice = Some(load_failure_notice());
        }
        DashboardView::Ready(dashboard)
    }

    async fn fill(&mut self, ctx: &SessionContext, user_id: uuid::Uuid) -> Result<()> {
        let backend = ctx.backend();
        self.appointments = backend
            .appointments(AppointmentFilter::Patient(user_id))
            .await?;
        self.notifications = backend.notifications(user_id).await?;
        self.progress_records = backend.progress_records(user_id).await?;
        debug!(
            "Loaded {} appointments, {} notifications, {} progress records",
            self.appointments.len(),
            self.notifications.len(),
            self.progress_records.len()
        );
        Ok(())
    }

    /// The first confirmed appointment.
    #[must_use]
    pub fn upcoming_session(&self) -> Option<&AppointmentDetails> {
        self.appointments
            .iter()
            .find(|a| a.appointment.status == AppointmentStatus::Confirmed)
    }

    /// Completed sessions out of the program length.
    #[must_use]
    pub fn progress(&self) -> ProgramProgress {
        let completed = self
            .appointments
            .iter()
            .filter(|a| a.appointment.status == AppointmentStatus::Completed)
            .count();
        ProgramProgress::new(
            u32::try_from(completed).unwrap_or(u32::MAX),
            self.program_days,
        )
    }

    /// Scores from the newest progress record.
    #[must_use]
    pub fn latest_vitals(&self) -> Vec<(&'static str, f32)> {
        self.progress_records
            .first()
            .map(|r| r.record.vitals())
            .unwrap_or_default()
    }

    /// Notifications not yet read.
    #[must_use]
    pub fn unread(&self) -> usize {
        self.notifications.iter().filter(|n| !n.is_read).count()
    }
}

/// Counts for today's sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TodayStats {
    /// Distinct patients booked today.
    pub patients: usize,
    pub completed: usize,
    /// Scheduled, confirmed or pending.
    pub upcoming: usize,
    pub cancellations: usize,
}

/// Whether a room is in use right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RoomState {
    /// A session is running.
    Occupied {
        therapy: String,
        #[serde(serialize_with = "serialize_clock")]
        ends_at: NaiveTime,
    },
    Available,
}

fn serialize_clock<S: serde::Serializer>(
    time: &NaiveTime,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(&time.format(crate::slots::TIME_FORMAT))
}

/// A room and its current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomStatus {
    pub room: TreatmentRoom,
    #[serde(flatten)]
    pub state: RoomState,
}

/// A practitioner's view of their day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PractitionerDashboard {
    pub name: String,
    pub date: NaiveDate,
    pub stats: TodayStats,
    /// Today's non-cancelled appointments by start time.
    pub schedule: Vec<AppointmentDetails>,
    pub rooms: Vec<RoomStatus>,
    pub notice: Option<Notice>,
}

impl PractitionerDashboard {
    /// Load the signed-in practitioner's dashboard as of `now`.
    pub async fn load(ctx: &SessionContext, now: NaiveDateTime) -> DashboardView<Self> {
        if ctx.is_loading() {
            return DashboardView::Loading;
        }
        let Some(user) = ctx.user() else {
            return DashboardView::SignInRequired;
        };

        let name = ctx
            .profile()
            .map_or_else(|| "Practitioner".to_string(), |p| p.full_name.clone());
        let backend = ctx.backend();

        let loaded = async {
            let appointments =
                appointments_for(&**backend, user.id, Role::Practitioner).await?;
            let rooms = backend.treatment_rooms().await?;
            Ok::<_, crate::Error>((appointments, rooms))
        }
        .await;

        let (appointments, rooms, notice) = match loaded {
            Ok((appointments, rooms)) => (appointments, rooms, None),
            Err(err) => {
                error!("Error loading dashboard data: {}", err);
                (Vec::new(), Vec::new(), Some(load_failure_notice()))
            }
        };

        DashboardView::Ready(Self::build(name, &appointments, rooms, now, notice))
    }

    /// Summarise `appointments` for the day of `now`.
    #[must_use]
    pub fn build(
        name: String,
        appointments: &[AppointmentDetails],
        rooms: Vec<TreatmentRoom>,
        now: NaiveDateTime,
        notice: Option<Notice>,
    ) -> Self {
        let date = now.date();
        let today: Vec<&AppointmentDetails> = appointments
            .iter()
            .filter(|a| a.appointment.appointment_date == date)
            .collect();

        let patients: HashSet<_> = today.iter().map(|a| a.appointment.patient_id).collect();
        let count = |status: fn(AppointmentStatus) -> bool| {
            today.iter().filter(|a| status(a.appointment.status)).count()
        };
        let stats = TodayStats {
            patients: patients.len(),
            completed: count(|s| s == AppointmentStatus::Completed),
            upcoming: count(|s| s.is_upcoming()),
            cancellations: count(|s| s == AppointmentStatus::Cancelled),
        };

        let mut schedule: Vec<AppointmentDetails> = today
            .iter()
            .filter(|a| a.appointment.status != AppointmentStatus::Cancelled)
            .map(|a| (*a).clone())
            .collect();
        schedule.sort_by_key(|a| a.appointment.start_time);

        let rooms = rooms
            .into_iter()
            .map(|room| {
                let running = schedule
                    .iter()
                    .find(|a| a.appointment.room_id == room.id && a.appointment.covers(date, now.time()));
                let state = match running {
                    Some(a) => RoomState::Occupied {
                        therapy: a.therapy_name().to_string(),
                        ends_at: a.appointment.end_time,
                    },
                    None => RoomState::Available,
                };
                RoomStatus { room, state }
            })
            .collect();

        Self {
            name,
            date,
            stats,
            schedule,
            rooms,
            notice,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::auth::SignUpForm;
    use crate::backend::testing::RecordingBackend;
    use crate::backend::Backend;
    use crate::model::{NewAppointment, NewNotification, NewProgressRecord, NotificationKind};
    use chrono::Utc;
    use uuid::Uuid;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn sign_up_form(email: &str, name: &str, role: Role) -> SignUpForm {
        SignUpForm {
            email: email.to_string(),
            password: "triphala".to_string(),
            confirm_password: "triphala".to_string(),
            full_name: name.to_string(),
            phone: String::new(),
            role,
        }
    }

    async fn signed_in(role: Role) -> (Arc<RecordingBackend>, SessionContext) {
        let backend = Arc::new(RecordingBackend::new());
        let mut ctx = SessionContext::new(backend.clone());
        ctx.initialize().await.unwrap();
        ctx.sign_up(&sign_up_form("user@clinic.test", "Asha Rao", role))
            .await
            .unwrap();
        (backend, ctx)
    }

    async fn book(
        backend: &dyn Backend,
        patient: Uuid,
        practitioner: Option<Uuid>,
        room: usize,
        start: NaiveTime,
        end: NaiveTime,
        status: AppointmentStatus,
    ) {
        let therapy = backend.therapy_types().await.unwrap().remove(0);
        let room = backend.treatment_rooms().await.unwrap().remove(room);
        backend
            .create_appointment(&NewAppointment {
                patient_id: patient,
                practitioner_id: practitioner,
                therapy_type_id: therapy.id,
                room_id: room.id,
                appointment_date: day(),
                start_time: start,
                end_time: end,
                status,
                notes: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_loading_and_sign_in_required() {
        let backend = Arc::new(RecordingBackend::new());
        let mut ctx = SessionContext::new(backend.clone());
        assert_eq!(
            PatientDashboard::load(&ctx, 21).await,
            DashboardView::Loading
        );

        ctx.initialize().await.unwrap();
        assert_eq!(
            PatientDashboard::load(&ctx, 21).await,
            DashboardView::SignInRequired
        );
        let now = day().and_time(at(10, 0));
        assert_eq!(
            PractitionerDashboard::load(&ctx, now).await,
            DashboardView::SignInRequired
        );
    }

    #[tokio::test]
    async fn test_patient_dashboard_aggregates() {
        let (backend, ctx) = signed_in(Role::Patient).await;
        let patient = ctx.user().unwrap().id;

        book(backend.inner(), patient, None, 0, at(9, 0), at(10, 30), AppointmentStatus::Completed).await;
        book(backend.inner(), patient, None, 1, at(12, 0), at(13, 0), AppointmentStatus::Scheduled).await;
        book(backend.inner(), patient, None, 2, at(15, 0), at(16, 0), AppointmentStatus::Confirmed).await;
        backend
            .inner()
            .create_notification(&NewNotification {
                user_id: patient,
                title: "Prepare".to_string(),
                message: "Fast for 2 hours before your Abhyanga session today".to_string(),
                kind: NotificationKind::PreProcedure,
                scheduled_for: Utc::now(),
            })
            .await
            .unwrap();
        backend
            .inner()
            .create_progress_record(&NewProgressRecord {
                patient_id: patient,
                energy_level: Some(7.2),
                digestion: Some(6.8),
                ..Default::default()
            })
            .await
            .unwrap();

        let dashboard = PatientDashboard::load(&ctx, 21).await.ready().unwrap();

        assert_eq!(dashboard.name, "Asha Rao");
        assert!(dashboard.notice.is_none());
        let upcoming = dashboard.upcoming_session().unwrap();
        assert_eq!(upcoming.appointment.start_time, at(15, 0));
        assert_eq!(dashboard.progress(), ProgramProgress::new(1, 21));
        assert_eq!(dashboard.progress().percentage, 5);
        assert_eq!(
            dashboard.latest_vitals(),
            vec![("Energy Level", 7.2), ("Digestion", 6.8)]
        );
        assert_eq!(dashboard.unread(), 1);
    }

    #[tokio::test]
    async fn test_patient_dashboard_load_failure_shows_notice() {
        let (backend, ctx) = signed_in(Role::Patient).await;
        backend.fail("notifications");

        let dashboard = PatientDashboard::load(&ctx, 21).await.ready().unwrap();

        let notice = dashboard.notice.unwrap();
        assert_eq!(notice.title, "Error loading data");
        assert_eq!(notice.description, "Please try refreshing the page.");
        assert!(notice.is_destructive());
        assert!(dashboard.progress_records.is_empty());
    }

    #[test]
    fn test_program_progress_rounding() {
        assert_eq!(ProgramProgress::new(8, 21).percentage, 38);
        assert_eq!(ProgramProgress::new(21, 21).percentage, 100);
        assert_eq!(ProgramProgress::new(30, 21).percentage, 100);
        assert_eq!(ProgramProgress::new(3, 0).percentage, 0);
    }

    #[tokio::test]
    async fn test_practitioner_dashboard() {
        let backend = Arc::new(RecordingBackend::new());
        let mut patients = Vec::new();
        for email in ["p1@clinic.test", "p2@clinic.test"] {
            let outcome = backend
                .inner()
                .sign_up(email, "triphala", &sign_up_form(email, "Patient", Role::Patient).attributes())
                .await
                .unwrap();
            patients.push(outcome.user.id);
        }
        backend.inner().sign_out().await.unwrap();

        let mut ctx = SessionContext::new(backend.clone());
        ctx.initialize().await.unwrap();
        ctx.sign_up(&sign_up_form("user@clinic.test", "Asha Rao", Role::Practitioner))
            .await
            .unwrap();
        let practitioner = backend
            .inner()
            .practitioner_for_profile(ctx.user().unwrap().id)
            .await
            .unwrap()
            .unwrap();

        let inner = backend.inner();
        let p = Some(practitioner.id);
        book(inner, patients[0], p, 1, at(13, 30), at(15, 0), AppointmentStatus::Confirmed).await;
        book(inner, patients[1], p, 0, at(9, 0), at(10, 30), AppointmentStatus::Completed).await;
        book(inner, patients[1], p, 2, at(16, 30), at(17, 30), AppointmentStatus::Cancelled).await;
        book(inner, patients[0], None, 3, at(14, 0), at(15, 0), AppointmentStatus::Confirmed).await;

        let now = day().and_time(at(14, 0));
        let dashboard = PractitionerDashboard::load(&ctx, now).await.ready().unwrap();

        assert_eq!(dashboard.name, "Asha Rao");
        assert_eq!(
            dashboard.stats,
            TodayStats {
                patients: 2,
                completed: 1,
                upcoming: 1,
                cancellations: 1,
            }
        );
        let starts: Vec<NaiveTime> = dashboard
            .schedule
            .iter()
            .map(|a| a.appointment.start_time)
            .collect();
        assert_eq!(starts, vec![at(9, 0), at(13, 30)]);

        let occupied: Vec<&RoomStatus> = dashboard
            .rooms
            .iter()
            .filter(|r| matches!(r.state, RoomState::Occupied { .. }))
            .collect();
        assert_eq!(occupied.len(), 1);
        assert_eq!(occupied[0].room.name, "Therapy Room 1");
        assert_eq!(
            occupied[0].state,
            RoomState::Occupied {
                therapy: "Abhyanga (Oil Massage)".to_string(),
                ends_at: at(15, 0),
            }
        );
    }

    #[tokio::test]
    async fn test_practitioner_without_row_sees_empty_schedule() {
        let (backend, ctx) = signed_in(Role::Patient).await;
        let now = day().and_time(at(10, 0));

        let dashboard = PractitionerDashboard::load(&ctx, now).await.ready().unwrap();

        assert!(dashboard.schedule.is_empty());
        assert_eq!(dashboard.stats, TodayStats::default());
        assert_eq!(dashboard.rooms.len(), 4);
        assert!(dashboard
            .rooms
            .iter()
            .all(|r| r.state == RoomState::Available));
        assert_eq!(backend.count("appointments"), 0);
    }

    #[test]
    fn test_room_status_serializes_flat() {
        let status = RoomStatus {
            room: TreatmentRoom {
                id: Uuid::nil(),
                name: "Steam Room".to_string(),
                room_type: "Specialized".to_string(),
                is_active: true,
            },
            state: RoomState::Occupied {
                therapy: "Steam Therapy".to_string(),
                ends_at: at(13, 45),
            },
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "occupied");
        assert_eq!(json["ends_at"], "13:45");
        assert_eq!(json["room"]["name"], "Steam Room");
    }
}
