use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;

use crate::db::DatabaseError;
use crate::models::*;

/// Dashboard counters for one role's departments.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub pending_count: i64,
    pub completed_count: i64,
    pub total_prescriptions: i64,
    pub total_labs: i64,
    pub daily_stats: Vec<DailyCount>,
    pub doctor_stats: Vec<LabelCount>,
    pub gender_stats: Vec<LabelCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyCount {
    pub date: NaiveDate,
    pub pending: i64,
    pub completed: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: i64,
}

const DAILY_WINDOW_DAYS: i64 = 7;

/// Aggregate counts over the given departments. `today` anchors the
/// seven-day window (inclusive), which always has one entry per day.
pub fn get_dashboard_stats(
    conn: &Connection,
    departments: &[Department],
    today: NaiveDate,
) -> Result<DashboardStats, DatabaseError> {
    let scope = department_scope(departments);
    let scope_sql = placeholders(1, scope.len());

    let mut pending_count = 0;
    let mut completed_count = 0;
    let by_status = grouped_counts(
        conn,
        &format!("SELECT status, COUNT(*) FROM patients WHERE department IN ({scope_sql}) GROUP BY status"),
        &scope,
    )?;
    for (status, count) in by_status {
        match status.parse::<AppointmentStatus>()? {
            AppointmentStatus::Pending => pending_count = count,
            AppointmentStatus::Completed => completed_count = count,
            AppointmentStatus::Cancelled => {}
        }
    }

    // Every department in scope is listed, even with no visits
    let mut per_department: BTreeMap<String, i64> = scope.iter().map(|d| (d.clone(), 0)).collect();
    per_department.extend(grouped_counts(
        conn,
        &format!("SELECT department, COUNT(*) FROM patients WHERE department IN ({scope_sql}) GROUP BY department"),
        &scope,
    )?);

    let per_sex: BTreeMap<String, i64> = grouped_counts(
        conn,
        &format!("SELECT sex, COUNT(*) FROM patients WHERE department IN ({scope_sql}) GROUP BY sex"),
        &scope,
    )?
    .into_iter()
    .collect();

    let window_start = today - Duration::days(DAILY_WINDOW_DAYS - 1);
    let mut daily: BTreeMap<NaiveDate, DailyCount> = (0..DAILY_WINDOW_DAYS)
        .map(|offset| {
            let date = window_start + Duration::days(offset);
            (date, DailyCount { date, pending: 0, completed: 0 })
        })
        .collect();
    let n = scope.len();
    let sql = format!(
        "SELECT date, status, COUNT(*) FROM patients
         WHERE department IN ({scope_sql}) AND date BETWEEN ?{} AND ?{}
         GROUP BY date, status",
        n + 1,
        n + 2
    );
    let mut values = scope.clone();
    values.push(window_start.to_string());
    values.push(today.to_string());
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
        Ok((row.get::<_, NaiveDate>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
    })?;
    for row in rows {
        let (date, status, count) = row?;
        if let Some(day) = daily.get_mut(&date) {
            match status.parse::<AppointmentStatus>()? {
                AppointmentStatus::Pending => day.pending = count,
                AppointmentStatus::Completed => day.completed = count,
                AppointmentStatus::Cancelled => {}
            }
        }
    }

    let mut total_prescriptions = 0;
    let mut total_labs = 0;
    let by_kind = grouped_counts(
        conn,
        &format!(
            "SELECT d.kind, COUNT(*) FROM documents d JOIN patients p ON p.mrn = d.mrn
             WHERE p.department IN ({scope_sql}) GROUP BY d.kind"
        ),
        &scope,
    )?;
    for (kind, count) in by_kind {
        match kind.parse::<DocumentKind>()? {
            DocumentKind::Prescription => total_prescriptions = count,
            DocumentKind::LabReport => total_labs = count,
        }
    }

    Ok(DashboardStats {
        pending_count,
        completed_count,
        total_prescriptions,
        total_labs,
        daily_stats: daily.into_values().collect(),
        doctor_stats: to_label_counts(per_department),
        gender_stats: to_label_counts(per_sex),
    })
}

fn department_scope(departments: &[Department]) -> Vec<String> {
    departments.iter().map(|d| d.as_str().to_string()).collect()
}

/// `?first, ?first+1, ...` for `count` bound values.
pub(crate) fn placeholders(first: usize, count: usize) -> String {
    (first..first + count).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}

/// Rows of `(label, count)` from a two-column `GROUP BY` query.
fn grouped_counts(conn: &Connection, sql: &str, values: &[String]) -> Result<Vec<(String, i64)>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    Ok(rows.collect::<Result<_, _>>()?)
}

fn to_label_counts(map: BTreeMap<String, i64>) -> Vec<LabelCount> {
    map.into_iter().map(|(label, count)| LabelCount { label, count }).collect()
}
