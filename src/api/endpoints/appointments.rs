//! Appointment endpoints: intake, work queues, lookup and field updates.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{AppState, Envelope};
use crate::db::repository;
use crate::db::DashboardStats;
use crate::lab_catalog;
use crate::models::{parse_clock, LabOrderUpdate, NewPatient, PatientRecord, Role, TimeUpdate};

#[derive(Debug, Deserialize)]
pub struct RoleQuery {
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
}

/// Missing role means reception, which sees every department.
fn parse_role(role: Option<&str>) -> Result<Role, ApiError> {
    match role.map(str::trim).filter(|r| !r.is_empty()) {
        None => Ok(Role::Reception),
        Some(r) => r.parse().map_err(|_| ApiError::BadRequest(format!("Unknown role: {r}"))),
    }
}

fn parse_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| ApiError::BadRequest(format!("Invalid appointment id: {id}")))
}

/// Store times as `HH:MM`. Blank means unset.
fn clock_field(name: &str, value: Option<String>) -> Result<Option<String>, ApiError> {
    match value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => parse_clock(raw)
            .map(|t| Some(t.format("%H:%M").to_string()))
            .ok_or_else(|| ApiError::BadRequest(format!("Invalid {name}: {raw} (expected HH:MM or h:MM AM/PM)"))),
    }
}

/// `POST /api/appointments/add`
pub async fn add(
    State(state): State<AppState>,
    Json(mut payload): Json<NewPatient>,
) -> Result<(StatusCode, Json<Envelope<PatientRecord>>), ApiError> {
    let blank = payload.blank_fields();
    if !blank.is_empty() {
        return Err(ApiError::BadRequest(format!("Missing required fields: {}", blank.join(", "))));
    }
    payload.time_in = clock_field("timeIn", payload.time_in.take())?;
    payload.time_out = clock_field("timeOut", payload.time_out.take())?;

    let conn = state.open_db()?;
    let record = repository::insert_patient(&conn, &payload)?;
    tracing::info!(mrn = %record.mrn, department = %record.doctor, "Appointment added");

    Ok((StatusCode::CREATED, Json(Envelope::ok(record).with_message("Appointment added successfully"))))
}

/// `GET /api/appointments/pending?role=`
pub async fn pending(
    State(state): State<AppState>,
    Query(query): Query<RoleQuery>,
) -> Result<Json<Envelope<Vec<PatientRecord>>>, ApiError> {
    let role = parse_role(query.role.as_deref())?;
    let conn = state.open_db()?;
    let records = repository::get_pending_patients(&conn, role.departments())?;
    Ok(Json(Envelope::list(records)))
}

/// `GET /api/appointments/history?date=YYYY-MM-DD`
pub async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Envelope<Vec<PatientRecord>>>, ApiError> {
    let raw = query
        .date
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Date is required".into()))?;
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("Invalid date: {raw}")))?;

    let conn = state.open_db()?;
    let records = repository::get_patients_by_date(&conn, date)?;
    Ok(Json(Envelope::list(records)))
}

/// `GET /api/appointments/search?query=`
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Envelope<Vec<PatientRecord>>>, ApiError> {
    let conn = state.open_db()?;
    let records = repository::search_patients(&conn, query.query.as_deref().unwrap_or_default())?;
    Ok(Json(Envelope::list(records)))
}

/// `GET /api/appointments/dashboardStats?role=`
pub async fn dashboard_stats(
    State(state): State<AppState>,
    Query(query): Query<RoleQuery>,
) -> Result<Json<Envelope<DashboardStats>>, ApiError> {
    let role = parse_role(query.role.as_deref())?;
    let conn = state.open_db()?;
    let today = chrono::Local::now().date_naive();
    let stats = repository::get_dashboard_stats(&conn, role.departments(), today)?;
    Ok(Json(Envelope::ok(stats)))
}

/// `GET /api/appointments/:id`
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<PatientRecord>>, ApiError> {
    let id = parse_id(&id)?;
    let conn = state.open_db()?;
    let record = repository::get_patient(&conn, &id)?
        .ok_or_else(|| ApiError::NotFound("Appointment not found".into()))?;
    Ok(Json(Envelope::ok(record)))
}

/// `PUT /api/appointments/:id/time`
pub async fn update_time(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<TimeUpdate>,
) -> Result<Json<Envelope<PatientRecord>>, ApiError> {
    let id = parse_id(&id)?;
    let update = TimeUpdate {
        time_in: clock_field("timeIn", update.time_in)?,
        time_out: clock_field("timeOut", update.time_out)?,
    };
    let conn = state.open_db()?;
    let record = repository::update_patient_times(&conn, &id, &update)?;
    Ok(Json(Envelope::ok(record).with_message("Time updated successfully")))
}

/// `PUT /api/appointments/:id/lab`
pub async fn update_lab(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<LabOrderUpdate>,
) -> Result<Json<Envelope<PatientRecord>>, ApiError> {
    let id = parse_id(&id)?;
    let tests = lab_catalog::validate_order(&update.labs)?;

    let conn = state.open_db()?;
    let record = repository::set_lab_order(&conn, &id, update.lab_location, &tests, update.lab_collection)?;
    tracing::info!(
        mrn = %record.mrn,
        location = %update.lab_location,
        tests = tests.len(),
        "Lab order updated"
    );
    Ok(Json(Envelope::ok(record).with_message("Lab order updated successfully")))
}
