//! Rendering of command results as plain text, tables or JSON.

use std::fmt::{self, Write as _};

use serde::Serialize;

use super::OutputFormat;
use crate::backend::User;
use crate::booking::Booking;
use crate::dashboard::{PatientDashboard, PractitionerDashboard, RoomState};
use crate::error::Result;
use crate::model::{
    AppointmentDetails, Notification, PractitionerDetails, Profile, ProgressRecordDetails,
    TherapyType, TreatmentRoom,
};
use crate::slots::{AppointmentWindow, TimeSlot, DATE_FORMAT, TIME_FORMAT};

/// Column-aligned text table.
#[derive(Debug, Clone, Default)]
pub struct Table {
    headers: Vec<&'static str>,
    rows: Vec<Vec<String>>,
}

impl Table {
    #[must_use]
    pub fn new(headers: &[&'static str]) -> Self {
        Self {
            headers: headers.to_vec(),
            rows: Vec::new(),
        }
    }

    pub fn row(&mut self, cells: Vec<String>) {
        self.rows.push(cells);
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                if let Some(w) = widths.get_mut(i) {
                    *w = (*w).max(cell.chars().count());
                }
            }
        }
        widths
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths = self.widths();
        let line = |cells: Vec<&str>| {
            cells
                .iter()
                .zip(&widths)
                .map(|(cell, &width)| format!("{cell:<width$}"))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        };

        writeln!(f, "{}", line(self.headers.clone()))?;
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        writeln!(f, "{}", line(rule.iter().map(String::as_str).collect()))?;
        for row in &self.rows {
            writeln!(f, "{}", line(row.iter().map(String::as_str).collect()))?;
        }
        Ok(())
    }
}

/// Pretty JSON for any serializable value.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut out = serde_json::to_string_pretty(value)?;
    out.push('\n');
    Ok(out)
}

fn or_dash(value: Option<&str>) -> String {
    value.map_or_else(|| "-".to_string(), ToString::to_string)
}

fn score(value: Option<f32>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.1}"))
}

/// Render the therapy catalog.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn therapies(items: &[TherapyType], format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return json(items);
    }
    if format == OutputFormat::Plain {
        return Ok(items
            .iter()
            .map(|t| format!("{} ({} min, {:.2})\n", t.name, t.duration_minutes, t.price))
            .collect());
    }
    let mut table = Table::new(&["NAME", "MINUTES", "PRICE", "ID"]);
    for t in items {
        table.row(vec![
            t.name.clone(),
            t.duration_minutes.to_string(),
            format!("{:.2}", t.price),
            t.id.to_string(),
        ]);
    }
    Ok(table.to_string())
}

/// Render the room list.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn rooms(items: &[TreatmentRoom], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => json(items),
        OutputFormat::Plain => Ok(items
            .iter()
            .map(|r| format!("{} ({})\n", r.name, r.room_type))
            .collect()),
        OutputFormat::Table => {
            let mut table = Table::new(&["NAME", "TYPE", "ID"]);
            for r in items {
                table.row(vec![r.name.clone(), r.room_type.clone(), r.id.to_string()]);
            }
            Ok(table.to_string())
        }
    }
}

/// Render the practitioner list.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn practitioners(items: &[PractitionerDetails], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => json(items),
        OutputFormat::Plain => Ok(items
            .iter()
            .map(|p| format!("{}\n", p.display_name()))
            .collect()),
        OutputFormat::Table => {
            let mut table = Table::new(&["NAME", "SPECIALIZATION", "EMAIL", "ID"]);
            for p in items {
                table.row(vec![
                    p.display_name(),
                    or_dash(p.practitioner.specialization.as_deref()),
                    or_dash(p.contact.as_ref().map(|c| c.email.as_str())),
                    p.practitioner.id.to_string(),
                ]);
            }
            Ok(table.to_string())
        }
    }
}

/// Render offered slots, with their windows when a therapy was given.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn slots(
    offered: &[TimeSlot],
    windows: &[(TimeSlot, AppointmentWindow)],
    format: OutputFormat,
) -> Result<String> {
    if windows.is_empty() {
        return match format {
            OutputFormat::Json => json(offered),
            OutputFormat::Plain | OutputFormat::Table => {
                Ok(offered.iter().map(|s| format!("{s}\n")).collect())
            }
        };
    }

    match format {
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct Row<'a> {
                slot: TimeSlot,
                #[serde(flatten)]
                window: &'a AppointmentWindow,
            }
            let rows: Vec<Row<'_>> = windows
                .iter()
                .map(|(slot, window)| Row {
                    slot: *slot,
                    window,
                })
                .collect();
            json(&rows)
        }
        OutputFormat::Plain => Ok(windows
            .iter()
            .map(|(slot, w)| {
                let note = if w.crosses_midnight { " (ends after midnight)" } else { "" };
                format!("{slot}: {}-{}{note}\n", w.start_string(), w.end_string())
            })
            .collect()),
        OutputFormat::Table => {
            let mut table = Table::new(&["SLOT", "DATE", "START", "END", "PAST MIDNIGHT"]);
            for (slot, w) in windows {
                table.row(vec![
                    slot.to_string(),
                    w.date_string(),
                    w.start_string(),
                    w.end_string(),
                    if w.crosses_midnight { "yes" } else { "no" }.to_string(),
                ]);
            }
            Ok(table.to_string())
        }
    }
}

/// Render appointments.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn appointments(items: &[AppointmentDetails], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => json(items),
        OutputFormat::Plain => Ok(items
            .iter()
            .map(|a| {
                format!(
                    "{} {}-{} {} in {} [{}]\n",
                    a.appointment.appointment_date.format(DATE_FORMAT),
                    a.appointment.start_time.format(TIME_FORMAT),
                    a.appointment.end_time.format(TIME_FORMAT),
                    a.therapy_name(),
                    a.room_name(),
                    a.appointment.status
                )
            })
            .collect()),
        OutputFormat::Table => {
            let mut table = Table::new(&[
                "DATE",
                "START",
                "END",
                "THERAPY",
                "ROOM",
                "PRACTITIONER",
                "STATUS",
                "ID",
            ]);
            for a in items {
                table.row(vec![
                    a.appointment.appointment_date.format(DATE_FORMAT).to_string(),
                    a.appointment.start_time.format(TIME_FORMAT).to_string(),
                    a.appointment.end_time.format(TIME_FORMAT).to_string(),
                    a.therapy_name().to_string(),
                    a.room_name().to_string(),
                    or_dash(a.practitioner_name()),
                    a.appointment.status.to_string(),
                    a.appointment.id.to_string(),
                ]);
            }
            Ok(table.to_string())
        }
    }
}

/// Render notifications.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn notifications(items: &[Notification], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => json(items),
        OutputFormat::Plain => Ok(items
            .iter()
            .map(|n| {
                let marker = if n.is_read { " " } else { "*" };
                format!("{marker} [{}] {}: {}\n", n.kind, n.title, n.message)
            })
            .collect()),
        OutputFormat::Table => {
            let mut table = Table::new(&["", "TYPE", "TITLE", "FOR", "ID"]);
            for n in items {
                table.row(vec![
                    if n.is_read { "" } else { "*" }.to_string(),
                    n.kind.to_string(),
                    n.title.clone(),
                    n.scheduled_for.format(DATE_FORMAT).to_string(),
                    n.id.to_string(),
                ]);
            }
            Ok(table.to_string())
        }
    }
}

/// Render progress records.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn progress(items: &[ProgressRecordDetails], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => json(items),
        OutputFormat::Plain => {
            let mut out = String::new();
            for item in items {
                let _ = writeln!(out, "{}", item.record.recorded_at.format("%Y-%m-%d %H:%M"));
                for (label, value) in item.record.vitals() {
                    let _ = writeln!(out, "  {label:<14} {value:.1}/10");
                }
                if let Some(notes) = &item.record.notes {
                    let _ = writeln!(out, "  {notes}");
                }
            }
            Ok(out)
        }
        OutputFormat::Table => {
            let mut table = Table::new(&[
                "RECORDED", "SESSION", "ENERGY", "SLEEP", "DIGESTION", "STRESS",
            ]);
            for item in items {
                let r = &item.record;
                table.row(vec![
                    r.recorded_at.format("%Y-%m-%d %H:%M").to_string(),
                    or_dash(
                        item.appointment
                            .as_ref()
                            .and_then(|a| a.therapy_types.as_ref())
                            .map(|t| t.name.as_str()),
                    ),
                    score(r.energy_level),
                    score(r.sleep_quality),
                    score(r.digestion),
                    score(r.stress_level),
                ]);
            }
            Ok(table.to_string())
        }
    }
}

/// Render a completed booking.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn booking(booking: &Booking, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return json(booking);
    }
    Ok(format!(
        "{}\n  Appointment: {}\n  Status:      {}\n",
        booking.notice(),
        booking.appointment.id,
        booking.appointment.status
    ))
}

/// Render the signed-in identity.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn whoami(user: &User, profile: Option<&Profile>, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return json(&serde_json::json!({ "user": user, "profile": profile }));
    }
    let mut out = String::new();
    let _ = writeln!(out, "User:  {}", user.id);
    let _ = writeln!(out, "Email: {}", or_dash(user.email.as_deref()));
    match profile {
        Some(p) => {
            let _ = writeln!(out, "Name:  {}", p.full_name);
            let _ = writeln!(out, "Role:  {}", p.role);
            let _ = writeln!(out, "Phone: {}", or_dash(p.phone.as_deref()));
        }
        None => {
            let _ = writeln!(out, "Profile not loaded");
        }
    }
    Ok(out)
}

/// Render the patient dashboard.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn patient_dashboard(dashboard: &PatientDashboard, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return json(&serde_json::json!({
            "dashboard": dashboard,
            "upcoming_session": dashboard.upcoming_session(),
            "progress": dashboard.progress(),
            "latest_vitals": dashboard.latest_vitals(),
            "unread": dashboard.unread(),
        }));
    }

    let mut out = String::new();
    let _ = writeln!(out, "Welcome back, {}.", dashboard.name);
    let _ = writeln!(out);
    let _ = writeln!(out, "Next Therapy Session");
    match dashboard.upcoming_session() {
        Some(a) => {
            let _ = writeln!(
                out,
                "  {} on {} at {} in {} ({})",
                a.therapy_name(),
                a.appointment.appointment_date.format(DATE_FORMAT),
                TimeSlot::from_time(a.appointment.start_time),
                a.room_name(),
                a.practitioner_name().unwrap_or("no practitioner assigned")
            );
        }
        None => {
            let _ = writeln!(out, "  No confirmed sessions");
        }
    }

    let progress = dashboard.progress();
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Therapy Progress: {} of {} sessions ({}%)",
        progress.completed, progress.total, progress.percentage
    );

    let vitals = dashboard.latest_vitals();
    if !vitals.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Latest Vitals");
        for (label, value) in vitals {
            let _ = writeln!(out, "  {label:<14} {value:.1}/10");
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Notifications: {} unread", dashboard.unread());
    for n in dashboard.notifications.iter().take(3) {
        let _ = writeln!(out, "  [{}] {}", n.kind, n.message);
    }
    Ok(out)
}

/// Render the practitioner dashboard.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn practitioner_dashboard(
    dashboard: &PractitionerDashboard,
    format: OutputFormat,
) -> Result<String> {
    if format == OutputFormat::Json {
        return json(dashboard);
    }

    let mut out = String::new();
    let s = &dashboard.stats;
    let _ = writeln!(out, "Welcome back, {}.", dashboard.name);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Today ({}): {} patients, {} completed, {} upcoming, {} cancelled",
        dashboard.date.format(DATE_FORMAT),
        s.patients,
        s.completed,
        s.upcoming,
        s.cancellations
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "Today's Schedule");
    if dashboard.schedule.is_empty() {
        let _ = writeln!(out, "  Nothing scheduled");
    }
    for a in &dashboard.schedule {
        let _ = writeln!(
            out,
            "  {}  {:<28} {:<16} {}",
            a.appointment.start_time.format(TIME_FORMAT),
            a.therapy_name(),
            a.room_name(),
            a.appointment.status
        );
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Room Status");
    for r in &dashboard.rooms {
        match &r.state {
            RoomState::Occupied { therapy, ends_at } => {
                let _ = writeln!(
                    out,
                    "  {:<16} occupied ({therapy} until {})",
                    r.room.name,
                    ends_at.format(TIME_FORMAT)
                );
            }
            RoomState::Available => {
                let _ = writeln!(out, "  {:<16} available", r.room.name);
            }
        }
    }
    Ok(out)
}
