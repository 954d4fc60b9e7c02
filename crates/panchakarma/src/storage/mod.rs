//! Local sandbox backend.
//!
//! [`Storage`] implements [`Backend`] over a single `SQLite` connection so the
//! client can run offline and the test suite can exercise every flow without
//! a network. It mirrors the hosted service's observable behavior: identity
//! sign-up creates the profile (and the practitioner row for practitioners),
//! reads return the same joined shapes, and error messages read the same.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::backend::{
    AppointmentFilter, AuthEvent, Backend, IdentityAttributes, Session, SignUpOutcome, User,
    AUTH_EVENT_CAPACITY,
};
use crate::error::{Error, Result};
use crate::model::{
    clock_time, Appointment, AppointmentDetails, AppointmentStatus, NewAppointment,
    NewNotification, NewProgressRecord, Notification, NotificationKind, Practitioner,
    PractitionerContact, PractitionerDetails, PractitionerSummary, Profile, ProfileName,
    ProfileUpdate, ProgressAppointment, ProgressRecord, ProgressRecordDetails, Role, RoomSummary,
    TherapyName, TherapySummary, TherapyType, TreatmentRoom,
};
use crate::slots::{DATE_FORMAT, TIME_FORMAT};

/// Columns selected for an appointment with its joins, in `row_to_appointment_details` order.
const APPOINTMENT_DETAILS_SELECT: &str = r"
    SELECT a.id, a.patient_id, a.practitioner_id, a.therapy_type_id, a.room_id,
           a.appointment_date, a.start_time, a.end_time, a.status, a.notes,
           t.name, t.duration_minutes, r.name, p.full_name
    FROM appointments a
    LEFT JOIN therapy_types t ON t.id = a.therapy_type_id
    LEFT JOIN treatment_rooms r ON r.id = a.room_id
    LEFT JOIN practitioners pr ON pr.id = a.practitioner_id
    LEFT JOIN profiles p ON p.id = pr.profile_id
";

/// `SQLite`-backed implementation of the clinic backend.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Mutex<Connection>,
    /// Session adopted by this handle.
    session: RwLock<Option<Session>>,
    /// Identity-change broadcaster.
    events: broadcast::Sender<AuthEvent>,
}

impl Storage {
    /// Open or create a sandbox database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema
    /// initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening sandbox database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;
        migrations::initialize_schema(&conn)?;

        info!("Sandbox database ready at {}", path.display());
        Ok(Self::with_connection(path, conn))
    }

    /// Create an in-memory sandbox, used by tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::initialize_schema(&conn)?;

        Ok(Self::with_connection(PathBuf::from(":memory:"), conn))
    }

    fn with_connection(path: PathBuf, conn: Connection) -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            path,
            conn: Mutex::new(conn),
            session: RwLock::new(None),
            events,
        }
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        f(&conn)
    }

    fn set_session(&self, session: Option<Session>) {
        *self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner) = session;
    }

    fn load_user(conn: &Connection, id: &str) -> Result<Option<User>> {
        let user = conn
            .query_row(
                "SELECT id, email, user_metadata FROM identities WHERE id = ?1",
                [id],
                |row| {
                    let metadata: String = row.get(2)?;
                    Ok(User {
                        id: uuid_at(row, 0)?,
                        email: row.get(1)?,
                        user_metadata: serde_json::from_str(&metadata).unwrap_or_default(),
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    fn start_session(conn: &Connection, user: User) -> Result<Session> {
        let now = Utc::now();
        let token = blake3::hash(format!("{}:{}:{}", user.id, Uuid::new_v4(), now).as_bytes())
            .to_hex()
            .to_string();
        conn.execute(
            "INSERT INTO sessions (token, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![token, user.id.to_string(), timestamp(now)],
        )?;
        Ok(Session {
            access_token: token,
            refresh_token: None,
            expires_at: None,
            user,
        })
    }

    fn appointment_details(
        conn: &Connection,
        clause: &str,
        id: &str,
    ) -> Result<Vec<AppointmentDetails>> {
        let sql = format!(
            "{APPOINTMENT_DETAILS_SELECT} WHERE {clause} = ?1 \
             ORDER BY a.appointment_date ASC, a.start_time ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([id], row_to_appointment_details)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn password_hash(salt: &str, password: &str) -> String {
    blake3::hash(format!("{salt}:{password}").as_bytes())
        .to_hex()
        .to_string()
}

/// Give a profile its practitioner row, keeping an existing one as is.
fn link_practitioner(
    conn: &Connection,
    profile_id: Uuid,
    specialization: Option<&str>,
) -> Result<Practitioner> {
    conn.execute(
        r"
        INSERT OR IGNORE INTO practitioners (id, profile_id, specialization)
        VALUES (?1, ?2, ?3)
        ",
        params![
            Uuid::new_v4().to_string(),
            profile_id.to_string(),
            specialization
        ],
    )?;
    let practitioner = conn.query_row(
        "SELECT id, profile_id, specialization FROM practitioners WHERE profile_id = ?1",
        [profile_id.to_string()],
        row_to_practitioner,
    )?;
    Ok(practitioner)
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

fn uuid_at(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text).map_err(|e| conversion_error(idx, e))
}

fn optional_uuid_at(row: &Row, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| Uuid::parse_str(&t).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn date_at(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    NaiveDate::parse_from_str(&text, DATE_FORMAT).map_err(|e| conversion_error(idx, e))
}

fn time_at(row: &Row, idx: usize) -> rusqlite::Result<chrono::NaiveTime> {
    let text: String = row.get(idx)?;
    clock_time::parse(&text).map_err(|e| conversion_error(idx, e))
}

fn timestamp_at(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn json_text<T: serde::Serialize>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value)?;
    Ok(value.as_str().map(ToString::to_string).unwrap_or_default())
}

fn parse_json_text<T: serde::de::DeserializeOwned>(idx: usize, text: &str) -> rusqlite::Result<T> {
    serde_json::from_value(serde_json::Value::String(text.to_string()))
        .map_err(|e| conversion_error(idx, e))
}

fn row_to_profile(row: &Row) -> rusqlite::Result<Profile> {
    let role: String = row.get(4)?;
    Ok(Profile {
        id: uuid_at(row, 0)?,
        full_name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        role: parse_json_text(4, &role)?,
    })
}

fn row_to_therapy(row: &Row) -> rusqlite::Result<TherapyType> {
    Ok(TherapyType {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
        duration_minutes: row.get(2)?,
        price: row.get(3)?,
        description: row.get(4)?,
    })
}

fn row_to_room(row: &Row) -> rusqlite::Result<TreatmentRoom> {
    Ok(TreatmentRoom {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
        room_type: row.get(2)?,
        is_active: row.get(3)?,
    })
}

fn row_to_practitioner(row: &Row) -> rusqlite::Result<Practitioner> {
    Ok(Practitioner {
        id: uuid_at(row, 0)?,
        profile_id: uuid_at(row, 1)?,
        specialization: row.get(2)?,
    })
}

fn row_to_appointment(row: &Row) -> rusqlite::Result<Appointment> {
    let status: String = row.get(8)?;
    Ok(Appointment {
        id: uuid_at(row, 0)?,
        patient_id: uuid_at(row, 1)?,
        practitioner_id: optional_uuid_at(row, 2)?,
        therapy_type_id: uuid_at(row, 3)?,
        room_id: uuid_at(row, 4)?,
        appointment_date: date_at(row, 5)?,
        start_time: time_at(row, 6)?,
        end_time: time_at(row, 7)?,
        status: parse_json_text(8, &status)?,
        notes: row.get(9)?,
    })
}

fn row_to_appointment_details(row: &Row) -> rusqlite::Result<AppointmentDetails> {
    let therapy_name: Option<String> = row.get(10)?;
    let therapy_minutes: Option<u32> = row.get(11)?;
    let room_name: Option<String> = row.get(12)?;
    let practitioner_name: Option<String> = row.get(13)?;
    let appointment = row_to_appointment(row)?;

    Ok(AppointmentDetails {
        therapy: therapy_name.map(|name| TherapySummary {
            name,
            duration_minutes: therapy_minutes.unwrap_or_default(),
        }),
        room: room_name.map(|name| RoomSummary { name }),
        practitioner: appointment.practitioner_id.map(|_| PractitionerSummary {
            profiles: practitioner_name.map(|full_name| ProfileName { full_name }),
        }),
        appointment,
    })
}

fn row_to_notification(row: &Row) -> rusqlite::Result<Notification> {
    let kind: String = row.get(4)?;
    Ok(Notification {
        id: uuid_at(row, 0)?,
        user_id: uuid_at(row, 1)?,
        title: row.get(2)?,
        message: row.get(3)?,
        kind: parse_json_text::<NotificationKind>(4, &kind)?,
        scheduled_for: timestamp_at(row, 5)?,
        is_read: row.get(6)?,
        created_at: timestamp_at(row, 7)?,
    })
}

fn row_to_progress(row: &Row) -> rusqlite::Result<ProgressRecord> {
    Ok(ProgressRecord {
        id: uuid_at(row, 0)?,
        patient_id: uuid_at(row, 1)?,
        appointment_id: optional_uuid_at(row, 2)?,
        recorded_at: timestamp_at(row, 3)?,
        energy_level: row.get(4)?,
        sleep_quality: row.get(5)?,
        digestion: row.get(6)?,
        stress_level: row.get(7)?,
        notes: row.get(8)?,
    })
}

#[async_trait]
impl Backend for Storage {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        attributes: &IdentityAttributes,
    ) -> Result<SignUpOutcome> {
        let session = self.with_conn(|conn| {
            let taken: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM identities WHERE email = ?1)",
                [email],
                |row| row.get(0),
            )?;
            if taken {
                return Err(Error::backend(422, "User already registered"));
            }

            let id = Uuid::new_v4();
            let salt = Uuid::new_v4().simple().to_string();
            let metadata = serde_json::to_string(attributes)?;
            let now = timestamp(Utc::now());

            conn.execute(
                r"
                INSERT INTO identities (id, email, password_hash, salt, user_metadata, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ",
                params![
                    id.to_string(),
                    email,
                    password_hash(&salt, password),
                    salt,
                    metadata,
                    now
                ],
            )?;
            conn.execute(
                "INSERT INTO profiles (id, full_name, email, phone, role) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id.to_string(),
                    attributes.full_name,
                    email,
                    attributes.phone,
                    attributes.role.to_string()
                ],
            )?;
            if attributes.role == Role::Practitioner {
                link_practitioner(conn, id, None)?;
            }

            let user = Self::load_user(conn, &id.to_string())?
                .ok_or_else(|| Error::internal("identity vanished after insert"))?;
            Self::start_session(conn, user)
        })?;

        info!("Registered {} as {}", email, attributes.role);
        self.set_session(Some(session.clone()));
        let _ = self.events.send(AuthEvent::SignedIn(session.user.clone()));
        Ok(SignUpOutcome {
            user: session.user.clone(),
            session: Some(session),
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let session = self.with_conn(|conn| {
            let found: Option<(String, String, String)> = conn
                .query_row(
                    "SELECT id, password_hash, salt FROM identities WHERE email = ?1",
                    [email],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            let Some((id, hash, salt)) = found else {
                return Err(Error::InvalidCredentials);
            };
            if password_hash(&salt, password) != hash {
                return Err(Error::InvalidCredentials);
            }

            let user = Self::load_user(conn, &id)?
                .ok_or_else(|| Error::internal("identity vanished during sign-in"))?;
            Self::start_session(conn, user)
        })?;

        self.set_session(Some(session.clone()));
        let _ = self.events.send(AuthEvent::SignedIn(session.user.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        let Some(session) = self.session() else {
            return Ok(());
        };
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM sessions WHERE token = ?1",
                [&session.access_token],
            )?;
            Ok(())
        })?;

        self.set_session(None);
        let _ = self.events.send(AuthEvent::SignedOut);
        Ok(())
    }

    async fn current_user(&self) -> Result<Option<User>> {
        let Some(session) = self.session() else {
            return Ok(None);
        };
        let user = self.with_conn(|conn| {
            let user_id: Option<String> = conn
                .query_row(
                    "SELECT user_id FROM sessions WHERE token = ?1",
                    [&session.access_token],
                    |row| row.get(0),
                )
                .optional()?;
            match user_id {
                Some(id) => Self::load_user(conn, &id),
                None => Ok(None),
            }
        })?;

        if user.is_none() {
            debug!("stored session is no longer valid");
            self.set_session(None);
        }
        Ok(user)
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
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, full_name, email, phone, role FROM profiles WHERE id = ?1",
                [id.to_string()],
                row_to_profile,
            )
            .optional()?
            .ok_or_else(|| Error::not_found("profiles", id))
        })
    }

    async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> Result<()> {
        let affected = self.with_conn(|conn| {
            Ok(conn.execute(
                r"
                UPDATE profiles
                SET full_name = COALESCE(?2, full_name), phone = COALESCE(?3, phone)
                WHERE id = ?1
                ",
                params![id.to_string(), update.full_name, update.phone],
            )?)
        })?;
        if affected == 0 {
            return Err(Error::not_found("profiles", id));
        }
        Ok(())
    }

    async fn therapy_types(&self) -> Result<Vec<TherapyType>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                r"
                SELECT id, name, duration_minutes, price, description
                FROM therapy_types ORDER BY name ASC
                ",
            )?;
            let rows = stmt
                .query_map([], row_to_therapy)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    async fn practitioners(&self) -> Result<Vec<PractitionerDetails>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                r"
                SELECT pr.id, pr.profile_id, pr.specialization, p.full_name, p.email, p.phone
                FROM practitioners pr
                LEFT JOIN profiles p ON p.id = pr.profile_id
                ORDER BY p.full_name ASC
                ",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    let full_name: Option<String> = row.get(3)?;
                    let email: Option<String> = row.get(4)?;
                    let phone: Option<String> = row.get(5)?;
                    Ok(PractitionerDetails {
                        practitioner: row_to_practitioner(row)?,
                        contact: full_name.map(|full_name| PractitionerContact {
                            full_name,
                            email: email.unwrap_or_default(),
                            phone,
                        }),
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    async fn practitioner_for_profile(&self, profile_id: Uuid) -> Result<Option<Practitioner>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, profile_id, specialization FROM practitioners WHERE profile_id = ?1",
                    [profile_id.to_string()],
                    row_to_practitioner,
                )
                .optional()?)
        })
    }

    async fn treatment_rooms(&self) -> Result<Vec<TreatmentRoom>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                r"
                SELECT id, name, type, is_active
                FROM treatment_rooms WHERE is_active = 1 ORDER BY name ASC
                ",
            )?;
            let rows = stmt
                .query_map([], row_to_room)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    async fn create_appointment(&self, appointment: &NewAppointment) -> Result<Appointment> {
        let id = Uuid::new_v4();
        let status = json_text(&appointment.status)?;
        let created = self.with_conn(|conn| {
            conn.execute(
                r"
                INSERT INTO appointments (
                    id, patient_id, practitioner_id, therapy_type_id, room_id,
                    appointment_date, start_time, end_time, status, notes, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ",
                params![
                    id.to_string(),
                    appointment.patient_id.to_string(),
                    appointment.practitioner_id.map(|p| p.to_string()),
                    appointment.therapy_type_id.to_string(),
                    appointment.room_id.to_string(),
                    appointment.appointment_date.format(DATE_FORMAT).to_string(),
                    appointment.start_time.format(TIME_FORMAT).to_string(),
                    appointment.end_time.format(TIME_FORMAT).to_string(),
                    status,
                    appointment.notes,
                    timestamp(Utc::now()),
                ],
            )?;
            let created = conn.query_row(
                r"
                SELECT id, patient_id, practitioner_id, therapy_type_id, room_id,
                       appointment_date, start_time, end_time, status, notes
                FROM appointments WHERE id = ?1
                ",
                [id.to_string()],
                row_to_appointment,
            )?;
            Ok(created)
        })?;

        debug!("Inserted appointment {}", created.id);
        Ok(created)
    }

    async fn appointments(&self, filter: AppointmentFilter) -> Result<Vec<AppointmentDetails>> {
        self.with_conn(|conn| match filter {
            AppointmentFilter::Patient(id) => {
                Self::appointment_details(conn, "a.patient_id", &id.to_string())
            }
            AppointmentFilter::Practitioner(id) => {
                Self::appointment_details(conn, "a.practitioner_id", &id.to_string())
            }
        })
    }

    async fn update_appointment_status(&self, id: Uuid, status: AppointmentStatus) -> Result<()> {
        let status = json_text(&status)?;
        let affected = self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE appointments SET status = ?2 WHERE id = ?1",
                params![id.to_string(), status],
            )?)
        })?;
        if affected == 0 {
            return Err(Error::not_found("appointments", id));
        }
        Ok(())
    }

    async fn create_progress_record(&self, record: &NewProgressRecord) -> Result<ProgressRecord> {
        let id = Uuid::new_v4();
        self.with_conn(|conn| {
            conn.execute(
                r"
                INSERT INTO progress_records (
                    id, patient_id, appointment_id, recorded_at,
                    energy_level, sleep_quality, digestion, stress_level, notes
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ",
                params![
                    id.to_string(),
                    record.patient_id.to_string(),
                    record.appointment_id.map(|a| a.to_string()),
                    timestamp(Utc::now()),
                    record.energy_level,
                    record.sleep_quality,
                    record.digestion,
                    record.stress_level,
                    record.notes,
                ],
            )?;
            Ok(conn.query_row(
                r"
                SELECT id, patient_id, appointment_id, recorded_at,
                       energy_level, sleep_quality, digestion, stress_level, notes
                FROM progress_records WHERE id = ?1
                ",
                [id.to_string()],
                row_to_progress,
            )?)
        })
    }

    async fn progress_records(&self, patient_id: Uuid) -> Result<Vec<ProgressRecordDetails>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                r"
                SELECT pr.id, pr.patient_id, pr.appointment_id, pr.recorded_at,
                       pr.energy_level, pr.sleep_quality, pr.digestion, pr.stress_level, pr.notes,
                       a.appointment_date, t.name
                FROM progress_records pr
                LEFT JOIN appointments a ON a.id = pr.appointment_id
                LEFT JOIN therapy_types t ON t.id = a.therapy_type_id
                WHERE pr.patient_id = ?1
                ORDER BY pr.recorded_at DESC, pr.rowid DESC
                ",
            )?;
            let rows = stmt
                .query_map([patient_id.to_string()], |row| {
                    let date: Option<String> = row.get(9)?;
                    let therapy: Option<String> = row.get(10)?;
                    let appointment = date
                        .map(|d| {
                            NaiveDate::parse_from_str(&d, DATE_FORMAT)
                                .map_err(|e| conversion_error(9, e))
                        })
                        .transpose()?
                        .map(|appointment_date| ProgressAppointment {
                            appointment_date,
                            therapy_types: therapy.map(|name| TherapyName { name }),
                        });
                    Ok(ProgressRecordDetails {
                        record: row_to_progress(row)?,
                        appointment,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    async fn create_notification(&self, notification: &NewNotification) -> Result<Notification> {
        let id = Uuid::new_v4();
        let kind = json_text(&notification.kind)?;
        self.with_conn(|conn| {
            conn.execute(
                r"
                INSERT INTO notifications (
                    id, user_id, title, message, type, scheduled_for, is_read, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)
                ",
                params![
                    id.to_string(),
                    notification.user_id.to_string(),
                    notification.title,
                    notification.message,
                    kind,
                    timestamp(notification.scheduled_for),
                    timestamp(Utc::now()),
                ],
            )?;
            Ok(conn.query_row(
                r"
                SELECT id, user_id, title, message, type, scheduled_for, is_read, created_at
                FROM notifications WHERE id = ?1
                ",
                [id.to_string()],
                row_to_notification,
            )?)
        })
    }

    async fn notifications(&self, user_id: Uuid) -> Result<Vec<Notification>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                r"
                SELECT id, user_id, title, message, type, scheduled_for, is_read, created_at
                FROM notifications WHERE user_id = ?1
                ORDER BY created_at DESC, rowid DESC
                ",
            )?;
            let rows = stmt
                .query_map([user_id.to_string()], row_to_notification)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    async fn mark_notification_read(&self, id: Uuid) -> Result<()> {
        let affected = self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1",
                [id.to_string()],
            )?)
        })?;
        if affected == 0 {
            return Err(Error::not_found("notifications", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn create_test_storage() -> Storage {
        Storage::open_in_memory().expect("failed to create test storage")
    }

    fn attributes(name: &str, role: Role) -> IdentityAttributes {
        IdentityAttributes {
            full_name: name.to_string(),
            phone: Some("+91 98450 12345".to_string()),
            role,
        }
    }

    async fn register(storage: &Storage, email: &str, role: Role) -> User {
        storage
            .sign_up(email, "ghee-and-sesame", &attributes("Asha Rao", role))
            .await
            .unwrap()
            .user
    }

    async fn book(storage: &Storage, patient: Uuid, practitioner: Option<Uuid>) -> Appointment {
        let therapy = storage.therapy_types().await.unwrap().remove(0);
        let room = storage.treatment_rooms().await.unwrap().remove(0);
        storage
            .create_appointment(&NewAppointment {
                patient_id: patient,
                practitioner_id: practitioner,
                therapy_type_id: therapy.id,
                room_id: room.id,
                appointment_date: NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(),
                start_time: NaiveTime::from_hms_opt(13, 30, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
                status: AppointmentStatus::Scheduled,
                notes: None,
            })
            .await
            .unwrap()
    }

    #[test]
    fn test_open_in_memory() {
        let storage = create_test_storage();
        assert_eq!(storage.path().to_string_lossy(), ":memory:");
        assert_eq!(storage.name(), "local");
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("clinic.db");
        let storage = Storage::open(&path).unwrap();
        assert_eq!(storage.path(), path.as_path());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_catalog_is_ordered() {
        let storage = create_test_storage();

        let therapies = storage.therapy_types().await.unwrap();
        let names: Vec<&str> = therapies.iter().map(|t| t.name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);

        let rooms = storage.treatment_rooms().await.unwrap();
        assert_eq!(rooms.len(), 4);
        assert!(rooms.iter().all(|r| r.is_active));
    }

    #[tokio::test]
    async fn test_inactive_rooms_are_hidden() {
        let storage = create_test_storage();
        storage
            .with_conn(|conn| {
                conn.execute(
                    "UPDATE treatment_rooms SET is_active = 0 WHERE name = 'Steam Room'",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        let rooms = storage.treatment_rooms().await.unwrap();
        assert_eq!(rooms.len(), 3);
        assert!(rooms.iter().all(|r| r.name != "Steam Room"));
    }

    #[tokio::test]
    async fn test_sign_up_creates_profile_and_session() {
        let storage = create_test_storage();
        let mut events = storage.subscribe();

        let user = register(&storage, "asha@clinic.test", Role::Patient).await;

        let profile = storage.profile(user.id).await.unwrap();
        assert_eq!(profile.full_name, "Asha Rao");
        assert_eq!(profile.role, Role::Patient);
        assert_eq!(user.user_metadata["role"], "patient");
        assert!(storage.session().is_some());
        assert!(matches!(events.try_recv(), Ok(AuthEvent::SignedIn(_))));
    }

    #[tokio::test]
    async fn test_duplicate_sign_up_is_rejected() {
        let storage = create_test_storage();
        register(&storage, "asha@clinic.test", Role::Patient).await;

        let err = storage
            .sign_up(
                "ASHA@clinic.test",
                "another",
                &attributes("Asha", Role::Patient),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "User already registered");
    }

    #[tokio::test]
    async fn test_practitioner_sign_up_creates_practitioner_row() {
        let storage = create_test_storage();
        let user = register(&storage, "meera@clinic.test", Role::Practitioner).await;

        let practitioner = storage.practitioner_for_profile(user.id).await.unwrap();
        assert!(practitioner.is_some());

        let listed = storage.practitioners().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].display_name(), "Asha Rao");
    }

    #[tokio::test]
    async fn test_sign_in_checks_password() {
        let storage = create_test_storage();
        register(&storage, "asha@clinic.test", Role::Patient).await;
        storage.sign_out().await.unwrap();

        let err = storage
            .sign_in("asha@clinic.test", "wrong")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));
        assert!(storage.session().is_none());

        let err = storage
            .sign_in("nobody@clinic.test", "ghee-and-sesame")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));

        let session = storage
            .sign_in("asha@clinic.test", "ghee-and-sesame")
            .await
            .unwrap();
        assert_eq!(session.user.email.as_deref(), Some("asha@clinic.test"));
    }

    #[tokio::test]
    async fn test_session_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clinic.db");

        let session = {
            let storage = Storage::open(&path).unwrap();
            register(&storage, "asha@clinic.test", Role::Patient).await;
            storage.session().unwrap()
        };

        let storage = Storage::open(&path).unwrap();
        assert!(storage.current_user().await.unwrap().is_none());

        storage.restore_session(session.clone());
        let user = storage.current_user().await.unwrap().unwrap();
        assert_eq!(user.id, session.user.id);
    }

    #[tokio::test]
    async fn test_sign_out_revokes_token() {
        let storage = create_test_storage();
        register(&storage, "asha@clinic.test", Role::Patient).await;
        let session = storage.session().unwrap();
        let mut events = storage.subscribe();

        storage.sign_out().await.unwrap();
        assert!(matches!(events.try_recv(), Ok(AuthEvent::SignedOut)));
        assert!(storage.current_user().await.unwrap().is_none());

        storage.restore_session(session);
        assert!(storage.current_user().await.unwrap().is_none());
        assert!(storage.session().is_none());
    }

    #[tokio::test]
    async fn test_update_profile() {
        let storage = create_test_storage();
        let user = register(&storage, "asha@clinic.test", Role::Patient).await;

        storage
            .update_profile(
                user.id,
                &ProfileUpdate {
                    full_name: Some("Asha R.".to_string()),
                    phone: None,
                },
            )
            .await
            .unwrap();

        let profile = storage.profile(user.id).await.unwrap();
        assert_eq!(profile.full_name, "Asha R.");
        assert_eq!(profile.phone.as_deref(), Some("+91 98450 12345"));
    }

    #[tokio::test]
    async fn test_missing_profile_is_not_found() {
        let storage = create_test_storage();
        let err = storage.profile(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "profiles", .. }));
    }

    #[tokio::test]
    async fn test_appointments_by_patient_with_joins() {
        let storage = create_test_storage();
        let patient = register(&storage, "asha@clinic.test", Role::Patient).await;
        let created = book(&storage, patient.id, None).await;

        assert_eq!(created.status, AppointmentStatus::Scheduled);
        assert_eq!(created.start_time, NaiveTime::from_hms_opt(13, 30, 0).unwrap());

        let list = storage
            .appointments(AppointmentFilter::Patient(patient.id))
            .await
            .unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].therapy_name(), "Abhyanga (Oil Massage)");
        assert_eq!(list[0].room_name(), "Steam Room");
        assert!(list[0].practitioner.is_none());

        let other = storage
            .appointments(AppointmentFilter::Patient(Uuid::new_v4()))
            .await
            .unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_appointments_by_practitioner() {
        let storage = create_test_storage();
        let doctor = register(&storage, "meera@clinic.test", Role::Practitioner).await;
        let practitioner = storage
            .practitioner_for_profile(doctor.id)
            .await
            .unwrap()
            .unwrap();
        let patient = register(&storage, "asha@clinic.test", Role::Patient).await;

        book(&storage, patient.id, Some(practitioner.id)).await;
        book(&storage, patient.id, None).await;

        let list = storage
            .appointments(AppointmentFilter::Practitioner(practitioner.id))
            .await
            .unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].practitioner_name(), Some("Asha Rao"));
    }

    #[tokio::test]
    async fn test_unknown_therapy_is_rejected() {
        let storage = create_test_storage();
        let patient = register(&storage, "asha@clinic.test", Role::Patient).await;
        let room = storage.treatment_rooms().await.unwrap().remove(0);

        let result = storage
            .create_appointment(&NewAppointment {
                patient_id: patient.id,
                practitioner_id: None,
                therapy_type_id: Uuid::new_v4(),
                room_id: room.id,
                appointment_date: NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(),
                start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                status: AppointmentStatus::Scheduled,
                notes: None,
            })
            .await;
        assert!(matches!(result, Err(Error::DatabaseQuery(_))));
    }

    #[tokio::test]
    async fn test_update_appointment_status() {
        let storage = create_test_storage();
        let patient = register(&storage, "asha@clinic.test", Role::Patient).await;
        let created = book(&storage, patient.id, None).await;

        storage
            .update_appointment_status(created.id, AppointmentStatus::Confirmed)
            .await
            .unwrap();
        let list = storage
            .appointments(AppointmentFilter::Patient(patient.id))
            .await
            .unwrap();
        assert_eq!(list[0].appointment.status, AppointmentStatus::Confirmed);

        let err = storage
            .update_appointment_status(Uuid::new_v4(), AppointmentStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_notifications_newest_first_and_mark_read() {
        let storage = create_test_storage();
        let user = register(&storage, "asha@clinic.test", Role::Patient).await;

        for title in ["First", "Second"] {
            storage
                .create_notification(&NewNotification {
                    user_id: user.id,
                    title: title.to_string(),
                    message: "Fast for 2 hours before your session".to_string(),
                    kind: NotificationKind::PreProcedure,
                    scheduled_for: Utc::now(),
                })
                .await
                .unwrap();
        }

        let list = storage.notifications(user.id).await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].title, "Second");
        assert_eq!(list[0].kind, NotificationKind::PreProcedure);
        assert!(!list[0].is_read);

        storage.mark_notification_read(list[0].id).await.unwrap();
        let list = storage.notifications(user.id).await.unwrap();
        assert!(list[0].is_read);
        assert!(!list[1].is_read);
    }

    #[tokio::test]
    async fn test_progress_records_join_appointment() {
        let storage = create_test_storage();
        let patient = register(&storage, "asha@clinic.test", Role::Patient).await;
        let appointment = book(&storage, patient.id, None).await;

        storage
            .create_progress_record(&NewProgressRecord {
                patient_id: patient.id,
                appointment_id: Some(appointment.id),
                energy_level: Some(7.5),
                stress_level: Some(4.0),
                ..Default::default()
            })
            .await
            .unwrap();
        storage
            .create_progress_record(&NewProgressRecord {
                patient_id: patient.id,
                notes: Some("Slept well".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let records = storage.progress_records(patient.id).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].record.notes.as_deref(), Some("Slept well"));
        assert!(records[0].appointment.is_none());

        let joined = records[1].appointment.as_ref().unwrap();
        assert_eq!(
            joined.appointment_date,
            NaiveDate::from_ymd_opt(2026, 11, 2).unwrap()
        );
        assert_eq!(
            joined.therapy_types.as_ref().unwrap().name,
            "Abhyanga (Oil Massage)"
        );
        assert_eq!(records[1].record.energy_level, Some(7.5));
    }

    #[tokio::test]
    async fn test_link_practitioner_is_idempotent() {
        let storage = create_test_storage();
        let user = register(&storage, "meera@clinic.test", Role::Practitioner).await;
        let linked = storage
            .practitioner_for_profile(user.id)
            .await
            .unwrap()
            .unwrap();

        let again = storage
            .with_conn(|conn| link_practitioner(conn, user.id, Some("Shirodhara")))
            .unwrap();
        assert_eq!(again.id, linked.id);
        assert!(again.specialization.is_none());
        assert_eq!(storage.practitioners().await.unwrap().len(), 1);
    }
}
