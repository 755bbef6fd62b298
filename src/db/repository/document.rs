use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};

use super::patient::parse_datetime;
use crate::db::DatabaseError;
use crate::models::*;

/// Insert or replace the pointer for `(mrn, kind)`.
/// Returns the pointer it displaced, whose content the caller still owns.
pub fn upsert_document(
    conn: &Connection,
    doc: &GeneratedDocument,
) -> Result<Option<GeneratedDocument>, DatabaseError> {
    let previous = get_document(conn, &doc.mrn, doc.kind)?;

    conn.execute(
        "INSERT INTO documents (mrn, kind, storage_id, url, template_name, uploaded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (mrn, kind) DO UPDATE SET
            storage_id = excluded.storage_id,
            url = excluded.url,
            template_name = excluded.template_name,
            uploaded_at = excluded.uploaded_at",
        params![
            doc.mrn,
            doc.kind.as_str(),
            doc.storage_id,
            doc.url,
            doc.template_name,
            doc.uploaded_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ],
    )?;

    Ok(previous.filter(|old| old.storage_id != doc.storage_id))
}

pub fn get_document(
    conn: &Connection,
    mrn: &str,
    kind: DocumentKind,
) -> Result<Option<GeneratedDocument>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT mrn, kind, storage_id, url, template_name, uploaded_at
             FROM documents WHERE mrn = ?1 AND kind = ?2",
            params![mrn, kind.as_str()],
            read_document_row,
        )
        .optional()?;
    row.map(document_from_row).transpose()
}

pub fn get_documents_for_mrn(conn: &Connection, mrn: &str) -> Result<Vec<GeneratedDocument>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT mrn, kind, storage_id, url, template_name, uploaded_at
         FROM documents WHERE mrn = ?1 ORDER BY kind",
    )?;
    let rows = stmt.query_map(params![mrn], read_document_row)?;

    let mut docs = Vec::new();
    for row in rows {
        docs.push(document_from_row(row?)?);
    }
    Ok(docs)
}

/// Returns true if a pointer was removed.
pub fn delete_document(conn: &Connection, mrn: &str, kind: DocumentKind) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM documents WHERE mrn = ?1 AND kind = ?2",
        params![mrn, kind.as_str()],
    )?;
    Ok(changed > 0)
}

pub fn count_documents(conn: &Connection, kind: DocumentKind) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM documents WHERE kind = ?1",
        params![kind.as_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}

struct DocumentRow {
    mrn: String,
    kind: String,
    storage_id: String,
    url: String,
    template_name: Option<String>,
    uploaded_at: String,
}

fn read_document_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok(DocumentRow {
        mrn: row.get(0)?,
        kind: row.get(1)?,
        storage_id: row.get(2)?,
        url: row.get(3)?,
        template_name: row.get(4)?,
        uploaded_at: row.get(5)?,
    })
}

fn document_from_row(row: DocumentRow) -> Result<GeneratedDocument, DatabaseError> {
    Ok(GeneratedDocument {
        mrn: row.mrn,
        kind: DocumentKind::from_str(&row.kind)?,
        storage_id: row.storage_id,
        url: row.url,
        template_name: row.template_name,
        uploaded_at: parse_datetime(&row.uploaded_at),
    })
}
