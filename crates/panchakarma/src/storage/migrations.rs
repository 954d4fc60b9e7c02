//! Schema versioning for the sandbox database.
//!
//! Version 1 is the base schema. Version 2 seeds the therapy and room catalog
//! that the hosted service would otherwise provide.

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::error::{Error, Result};

use super::schema::{SCHEMA_STATEMENTS, SEED_ROOMS, SEED_THERAPIES};

/// The current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Key used to store the schema version in the metadata table.
const VERSION_KEY: &str = "schema_version";

/// Create all tables if needed and bring the schema up to date.
///
/// # Errors
///
/// Returns an error if schema creation or migration fails.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    for statement in SCHEMA_STATEMENTS {
        conn.execute(statement, [])?;
    }

    let version = get_schema_version(conn)?;
    if version < CURRENT_VERSION {
        run_migrations(conn, version)?;
    }

    Ok(())
}

/// Returns 0 for a fresh database.
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let result: std::result::Result<String, rusqlite::Error> = conn.query_row(
        "SELECT value FROM metadata WHERE key = ?1",
        [VERSION_KEY],
        |row| row.get(0),
    );

    match result {
        Ok(value) => value.parse().map_err(|_| Error::DatabaseMigration {
            message: format!("invalid schema version: {value}"),
        }),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
        Err(e) => Err(e.into()),
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        (VERSION_KEY, version.to_string()),
    )?;
    Ok(())
}

fn run_migrations(conn: &Connection, from_version: i32) -> Result<()> {
    let mut current = from_version;

    while current < CURRENT_VERSION {
        current += 1;
        run_migration(conn, current)?;
    }

    set_schema_version(conn, CURRENT_VERSION)?;
    Ok(())
}

fn run_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        2 => migrate_v2(conn),
        _ => Err(Error::DatabaseMigration {
            message: format!("unknown migration version: {version}"),
        }),
    }
}

/// The base schema is already created by `SCHEMA_STATEMENTS`.
fn migrate_v1(conn: &Connection) -> Result<()> {
    set_schema_version(conn, 1)
}

/// Seed the catalog.
fn migrate_v2(conn: &Connection) -> Result<()> {
    for (name, minutes, price, description) in SEED_THERAPIES {
        conn.execute(
            r"
            INSERT OR IGNORE INTO therapy_types (id, name, duration_minutes, price, description)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            params![
                Uuid::new_v4().to_string(),
                name,
                minutes,
                price,
                description
            ],
        )?;
    }
    for (name, room_type) in SEED_ROOMS {
        conn.execute(
            r"
            INSERT OR IGNORE INTO treatment_rooms (id, name, type, is_active)
            VALUES (?1, ?2, ?3, 1)
            ",
            params![Uuid::new_v4().to_string(), name, room_type],
        )?;
    }
    set_schema_version(conn, 2)
}
