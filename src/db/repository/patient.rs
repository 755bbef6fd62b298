use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{Local, NaiveDate, NaiveDateTime};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::*;

const PATIENT_COLUMNS: &str = "id, mrn, name, sex, age, phone, cnic, address, department,
    weight, height, bp, pulse, temperature, gestation, vco, status, date, time_in, time_out,
    template, lab_location, lab_tests, lab_collection, lab_report_date, created_at";

/// Insert a new intake record. Fails with `Duplicate` if the MRN is taken.
pub fn insert_patient(conn: &Connection, new: &NewPatient) -> Result<PatientRecord, DatabaseError> {
    if mrn_exists(conn, &new.mrn)? {
        return Err(DatabaseError::Duplicate {
            entity_type: "patient".into(),
            key: new.mrn.clone(),
        });
    }

    let now = Local::now().naive_local();
    let record = PatientRecord {
        id: Uuid::new_v4(),
        mrn: new.mrn.trim().to_string(),
        name: new.name.trim().to_string(),
        sex: new.sex,
        age: new.age.clone(),
        phone: new.phone.clone(),
        cnic: new.cnic.clone(),
        address: new.address.clone(),
        doctor: new.doctor,
        vitals: new.vitals.clone(),
        vco: new.vco,
        status: AppointmentStatus::Pending,
        date: new.date.unwrap_or_else(|| now.date()),
        time_in: new.time_in.clone(),
        time_out: new.time_out.clone(),
        template: String::new(),
        lab_order: None,
        created_at: now,
    };

    conn.execute(
        "INSERT INTO patients (id, mrn, name, sex, age, phone, cnic, address, department,
         weight, height, bp, pulse, temperature, gestation, vco, status, date, time_in, time_out,
         template, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18,
         ?19, ?20, ?21, ?22)",
        params![
            record.id.to_string(),
            record.mrn,
            record.name,
            record.sex.as_str(),
            record.age,
            record.phone,
            record.cnic,
            record.address,
            record.doctor.as_str(),
            record.vitals.weight,
            record.vitals.height,
            record.vitals.bp,
            record.vitals.pulse,
            record.vitals.temperature,
            record.vitals.gestation,
            record.vco as i32,
            record.status.as_str(),
            record.date.to_string(),
            record.time_in,
            record.time_out,
            record.template,
            record.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ],
    )?;

    Ok(record)
}

pub fn mrn_exists(conn: &Connection, mrn: &str) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM patients WHERE mrn = ?1",
        params![mrn.trim()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<PatientRecord>, DatabaseError> {
    let sql = format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1");
    let row = conn
        .query_row(&sql, params![id.to_string()], read_patient_row)
        .optional()?;
    row.map(patient_from_row).transpose()
}

pub fn get_patient_by_mrn(conn: &Connection, mrn: &str) -> Result<Option<PatientRecord>, DatabaseError> {
    let sql = format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE mrn = ?1");
    let row = conn
        .query_row(&sql, params![mrn.trim()], read_patient_row)
        .optional()?;
    row.map(patient_from_row).transpose()
}

/// Pending records for the given departments, ordered by date then time-in.
pub fn get_pending_patients(
    conn: &Connection,
    departments: &[Department],
) -> Result<Vec<PatientRecord>, DatabaseError> {
    let scope: Vec<&str> = departments.iter().map(|d| d.as_str()).collect();
    query_patients(
        conn,
        &format!(
            "WHERE status = 'Pending' AND department IN ({}) ORDER BY date ASC, time_in ASC, created_at ASC",
            super::stats::placeholders(1, scope.len())
        ),
        params_from_iter(scope),
    )
}

/// Every record scheduled on `date`, ordered by time-in.
pub fn get_patients_by_date(conn: &Connection, date: NaiveDate) -> Result<Vec<PatientRecord>, DatabaseError> {
    query_patients(
        conn,
        "WHERE date = ?1 ORDER BY time_in ASC, created_at ASC",
        params![date.to_string()],
    )
}

/// Exact MRN match first; otherwise a case-insensitive substring match on
/// name or phone. Blank queries match nothing.
pub fn search_patients(conn: &Connection, query: &str) -> Result<Vec<PatientRecord>, DatabaseError> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(Vec::new());
    }

    if let Some(exact) = get_patient_by_mrn(conn, query)? {
        return Ok(vec![exact]);
    }

    let pattern = format!("%{}%", escape_like(query));
    query_patients(
        conn,
        "WHERE name LIKE ?1 ESCAPE '\\' OR phone LIKE ?1 ESCAPE '\\'
         ORDER BY date DESC, time_in ASC",
        params![pattern],
    )
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

pub fn update_patient_times(
    conn: &Connection,
    id: &Uuid,
    update: &TimeUpdate,
) -> Result<PatientRecord, DatabaseError> {
    let changed = conn.execute(
        "UPDATE patients SET time_in = COALESCE(?2, time_in), time_out = COALESCE(?3, time_out)
         WHERE id = ?1",
        params![id.to_string(), update.time_in, update.time_out],
    )?;
    if changed == 0 {
        return Err(not_found(id));
    }
    get_patient(conn, id)?.ok_or_else(|| not_found(id))
}

/// Replace the lab order on a record. Test names must already be validated.
pub fn set_lab_order(
    conn: &Connection,
    id: &Uuid,
    location: LabLocation,
    tests: &BTreeSet<String>,
    collection: CollectionStatus,
) -> Result<PatientRecord, DatabaseError> {
    let tests_json = serde_json::to_string(tests)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;
    let changed = conn.execute(
        "UPDATE patients SET lab_location = ?2, lab_tests = ?3, lab_collection = ?4 WHERE id = ?1",
        params![id.to_string(), location.as_str(), tests_json, collection.as_str()],
    )?;
    if changed == 0 {
        return Err(not_found(id));
    }
    get_patient(conn, id)?.ok_or_else(|| not_found(id))
}

/// Terminal transition after a prescription is stored.
pub fn complete_with_template(
    conn: &Connection,
    mrn: &str,
    template_name: Option<&str>,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE patients SET status = 'Completed', template = COALESCE(?2, template) WHERE mrn = ?1",
        params![mrn, template_name],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "patient".into(),
            id: mrn.into(),
        });
    }
    Ok(())
}

pub fn set_lab_report_date(conn: &Connection, mrn: &str, date: NaiveDate) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE patients SET lab_report_date = ?2,
         lab_collection = CASE WHEN lab_location IS NULL THEN lab_collection ELSE 'Completed' END
         WHERE mrn = ?1",
        params![mrn, date.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "patient".into(),
            id: mrn.into(),
        });
    }
    Ok(())
}

/// Returns true if a row was removed.
pub fn delete_patient_by_mrn(conn: &Connection, mrn: &str) -> Result<bool, DatabaseError> {
    let changed = conn.execute("DELETE FROM patients WHERE mrn = ?1", params![mrn])?;
    Ok(changed > 0)
}

fn not_found(id: &Uuid) -> DatabaseError {
    DatabaseError::NotFound {
        entity_type: "patient".into(),
        id: id.to_string(),
    }
}

pub(crate) fn query_patients(
    conn: &Connection,
    clause: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<PatientRecord>, DatabaseError> {
    let sql = format!("SELECT {PATIENT_COLUMNS} FROM patients {clause}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params, read_patient_row)?;

    let mut patients = Vec::new();
    for row in rows {
        patients.push(patient_from_row(row?)?);
    }
    Ok(patients)
}

// Internal row type for PatientRecord mapping
struct PatientRow {
    id: String,
    mrn: String,
    name: String,
    sex: String,
    age: String,
    phone: String,
    cnic: String,
    address: Option<String>,
    department: String,
    weight: Option<String>,
    height: Option<String>,
    bp: Option<String>,
    pulse: Option<String>,
    temperature: Option<String>,
    gestation: Option<String>,
    vco: i32,
    status: String,
    date: String,
    time_in: Option<String>,
    time_out: Option<String>,
    template: String,
    lab_location: Option<String>,
    lab_tests: Option<String>,
    lab_collection: Option<String>,
    lab_report_date: Option<String>,
    created_at: String,
}

fn read_patient_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PatientRow> {
    Ok(PatientRow {
        id: row.get(0)?,
        mrn: row.get(1)?,
        name: row.get(2)?,
        sex: row.get(3)?,
        age: row.get(4)?,
        phone: row.get(5)?,
        cnic: row.get(6)?,
        address: row.get(7)?,
        department: row.get(8)?,
        weight: row.get(9)?,
        height: row.get(10)?,
        bp: row.get(11)?,
        pulse: row.get(12)?,
        temperature: row.get(13)?,
        gestation: row.get(14)?,
        vco: row.get(15)?,
        status: row.get(16)?,
        date: row.get(17)?,
        time_in: row.get(18)?,
        time_out: row.get(19)?,
        template: row.get(20)?,
        lab_location: row.get(21)?,
        lab_tests: row.get(22)?,
        lab_collection: row.get(23)?,
        lab_report_date: row.get(24)?,
        created_at: row.get(25)?,
    })
}

fn patient_from_row(row: PatientRow) -> Result<PatientRecord, DatabaseError> {
    let lab_order = match row.lab_location {
        Some(location) => {
            let tests: BTreeSet<String> = match row.lab_tests {
                Some(json) => serde_json::from_str(&json)
                    .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
                None => BTreeSet::new(),
            };
            Some(LabOrder {
                location: LabLocation::from_str(&location)?,
                tests,
                collection: match row.lab_collection {
                    Some(c) => CollectionStatus::from_str(&c)?,
                    None => CollectionStatus::Pending,
                },
                report_date: row.lab_report_date.as_deref().and_then(parse_date),
            })
        }
        None => None,
    };

    Ok(PatientRecord {
        id: Uuid::parse_str(&row.id).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        mrn: row.mrn,
        name: row.name,
        sex: Sex::from_str(&row.sex)?,
        age: row.age,
        phone: row.phone,
        cnic: row.cnic,
        address: row.address,
        doctor: Department::from_str(&row.department)?,
        vitals: Vitals {
            weight: row.weight,
            height: row.height,
            bp: row.bp,
            pulse: row.pulse,
            temperature: row.temperature,
            gestation: row.gestation,
        },
        vco: row.vco != 0,
        status: AppointmentStatus::from_str(&row.status)?,
        date: parse_date(&row.date).ok_or_else(|| DatabaseError::ConstraintViolation(
            format!("bad date '{}' for {}", row.date, row.id),
        ))?,
        time_in: row.time_in,
        time_out: row.time_out,
        template: row.template,
        lab_order,
        created_at: parse_datetime(&row.created_at),
    })
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

pub(crate) fn parse_datetime(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .unwrap_or_default()
}
