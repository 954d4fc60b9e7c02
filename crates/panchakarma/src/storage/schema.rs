//! `SQLite` schema for the sandbox backend.
//!
//! Identifiers are stored as hyphenated UUID text, dates as `yyyy-MM-dd`,
//! times of day as `HH:MM` and timestamps as RFC 3339 with microseconds so
//! they sort lexically.

/// Registered identities and their salted password hashes.
pub const CREATE_IDENTITIES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS identities (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE COLLATE NOCASE,
    password_hash TEXT NOT NULL,
    salt TEXT NOT NULL,
    user_metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
)
";

/// Issued session tokens.
pub const CREATE_SESSIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS sessions (
    token TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES identities(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL
)
";

pub const CREATE_PROFILES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS profiles (
    id TEXT PRIMARY KEY REFERENCES identities(id) ON DELETE CASCADE,
    full_name TEXT NOT NULL,
    email TEXT NOT NULL,
    phone TEXT,
    role TEXT NOT NULL CHECK (role IN ('patient', 'practitioner'))
)
";

pub const CREATE_THERAPY_TYPES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS therapy_types (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    duration_minutes INTEGER NOT NULL,
    price REAL NOT NULL,
    description TEXT
)
";

pub const CREATE_TREATMENT_ROOMS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS treatment_rooms (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    type TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1
)
";

pub const CREATE_PRACTITIONERS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS practitioners (
    id TEXT PRIMARY KEY,
    profile_id TEXT NOT NULL UNIQUE REFERENCES profiles(id) ON DELETE CASCADE,
    specialization TEXT
)
";

pub const CREATE_APPOINTMENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS appointments (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES profiles(id),
    practitioner_id TEXT REFERENCES practitioners(id),
    therapy_type_id TEXT NOT NULL REFERENCES therapy_types(id),
    room_id TEXT NOT NULL REFERENCES treatment_rooms(id),
    appointment_date TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    status TEXT NOT NULL,
    notes TEXT,
    created_at TEXT NOT NULL
)
";

pub const CREATE_NOTIFICATIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS notifications (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES identities(id),
    title TEXT NOT NULL,
    message TEXT NOT NULL,
    type TEXT NOT NULL,
    scheduled_for TEXT NOT NULL,
    is_read INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
)
";

pub const CREATE_PROGRESS_RECORDS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS progress_records (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES profiles(id),
    appointment_id TEXT REFERENCES appointments(id),
    recorded_at TEXT NOT NULL,
    energy_level REAL,
    sleep_quality REAL,
    digestion REAL,
    stress_level REAL,
    notes TEXT
)
";

pub const CREATE_APPOINTMENT_PATIENT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_appointments_patient ON appointments(patient_id, appointment_date)
";

pub const CREATE_APPOINTMENT_PRACTITIONER_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_appointments_practitioner ON appointments(practitioner_id, appointment_date)
";

pub const CREATE_NOTIFICATION_USER_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, created_at DESC)
";

pub const CREATE_PROGRESS_PATIENT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_progress_patient ON progress_records(patient_id, recorded_at DESC)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in dependency order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_IDENTITIES_TABLE,
    CREATE_SESSIONS_TABLE,
    CREATE_PROFILES_TABLE,
    CREATE_THERAPY_TYPES_TABLE,
    CREATE_TREATMENT_ROOMS_TABLE,
    CREATE_PRACTITIONERS_TABLE,
    CREATE_APPOINTMENTS_TABLE,
    CREATE_NOTIFICATIONS_TABLE,
    CREATE_PROGRESS_RECORDS_TABLE,
    CREATE_APPOINTMENT_PATIENT_INDEX,
    CREATE_APPOINTMENT_PRACTITIONER_INDEX,
    CREATE_NOTIFICATION_USER_INDEX,
    CREATE_PROGRESS_PATIENT_INDEX,
    CREATE_METADATA_TABLE,
];

/// Therapy catalog seeded into a fresh sandbox: name, minutes, price, description.
pub const SEED_THERAPIES: &[(&str, u32, f64, &str)] = &[
    ("Abhyanga (Oil Massage)", 90, 3500.0, "Full-body warm herbal oil massage"),
    ("Karna Purna (Ear Therapy)", 45, 1500.0, "Warm medicated oil held in the ears"),
    ("Nasya (Nasal Therapy)", 30, 1200.0, "Medicated oil administered through the nose"),
    ("Shirodhara (Oil Pouring)", 60, 3000.0, "Continuous stream of oil over the forehead"),
    ("Steam Therapy", 45, 1800.0, "Herbal steam (swedana) after oleation"),
];

/// Rooms seeded into a fresh sandbox: name, type.
pub const SEED_ROOMS: &[(&str, &str)] = &[
    ("Steam Room", "Specialized"),
    ("Therapy Room 1", "Standard"),
    ("Therapy Room 2", "Premium"),
    ("Therapy Room 3", "Deluxe"),
];
