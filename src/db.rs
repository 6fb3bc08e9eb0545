use std::path::Path;

use anyhow::{ensure, Result};
use rusqlite::{Connection, OptionalExtension};

use crate::record::NormRecord;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS norms (
            id              INTEGER PRIMARY KEY,
            source          TEXT,
            name            TEXT UNIQUE NOT NULL,
            hierarchy       TEXT,
            description     TEXT,
            keywords        TEXT,
            public_url      TEXT NOT NULL,
            data_source_url TEXT,
            clean_text      TEXT,
            raw_payload     TEXT,
            expert_comments TEXT,
            error_reason    TEXT,
            status          TEXT NOT NULL CHECK(status IN ('ok','error')),
            embedding       TEXT,
            created_at      TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at      TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_norms_status ON norms(status);
        ",
    )?;
    Ok(())
}

// ── Dedup-aware persistence ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// New record had neither content nor an error; nothing worth storing.
    SkippedEmpty,
    /// A stored row exists and the new record is not successful; the prior
    /// data is kept.
    PreservedExisting,
}

/// Insert or update a record keyed by `name`, never replacing a prior
/// successful scrape with a failed or empty one.
pub fn upsert(conn: &Connection, record: &NormRecord) -> Result<UpsertOutcome> {
    let tx = conn.unchecked_transaction()?;

    let existing_id: Option<i64> = tx
        .query_row(
            "SELECT id FROM norms WHERE name = ?1",
            [&record.name],
            |row| row.get(0),
        )
        .optional()?;

    let successful = record.is_successful();
    let keywords = serde_json::to_string(&record.keywords)?;
    let raw_payload = record
        .raw_payload
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let outcome = match existing_id {
        None => {
            if !successful && record.error_reason.is_none() {
                UpsertOutcome::SkippedEmpty
            } else {
                tx.execute(
                    "INSERT INTO norms
                     (source, name, hierarchy, description, keywords, public_url,
                      data_source_url, clean_text, raw_payload, expert_comments,
                      error_reason, status)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
                    rusqlite::params![
                        record.source,
                        record.name,
                        record.hierarchy,
                        record.description,
                        keywords,
                        record.public_url,
                        record.data_source_url,
                        record.clean_text,
                        raw_payload,
                        record.expert_comments,
                        record.error_reason,
                        record.status.as_str(),
                    ],
                )?;
                UpsertOutcome::Inserted
            }
        }
        Some(id) => {
            if successful {
                tx.execute(
                    "UPDATE norms SET
                       source = ?1, hierarchy = ?2, description = ?3, keywords = ?4,
                       public_url = ?5, data_source_url = ?6, clean_text = ?7,
                       raw_payload = ?8, expert_comments = ?9, error_reason = NULL,
                       status = 'ok', updated_at = datetime('now')
                     WHERE id = ?10",
                    rusqlite::params![
                        record.source,
                        record.hierarchy,
                        record.description,
                        keywords,
                        record.public_url,
                        record.data_source_url,
                        record.clean_text,
                        raw_payload,
                        record.expert_comments,
                        id,
                    ],
                )?;
                UpsertOutcome::Updated
            } else {
                UpsertOutcome::PreservedExisting
            }
        }
    };

    tx.commit()?;
    Ok(outcome)
}

// ── Vectorization scans ──

pub struct PendingNorm {
    pub id: i64,
    pub clean_text: String,
}

/// Records with text but no embedding yet, in a bounded batch.
pub fn fetch_pending(conn: &Connection, limit: usize) -> Result<Vec<PendingNorm>> {
    let mut stmt = conn.prepare(
        "SELECT id, clean_text FROM norms
         WHERE clean_text IS NOT NULL AND clean_text != '' AND embedding IS NULL
         ORDER BY id LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit], |row| {
            Ok(PendingNorm {
                id: row.get(0)?,
                clean_text: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count_total(conn: &Connection) -> Result<usize> {
    Ok(conn.query_row("SELECT COUNT(*) FROM norms", [], |r| r.get(0))?)
}

pub fn count_pending(conn: &Connection) -> Result<usize> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM norms
         WHERE clean_text IS NOT NULL AND clean_text != '' AND embedding IS NULL",
        [],
        |r| r.get(0),
    )?)
}

/// Attach the averaged vector to a record. The vector must have exactly the
/// configured dimension.
pub fn update_embedding(
    conn: &Connection,
    id: i64,
    embedding: &[f32],
    expected_dim: usize,
) -> Result<()> {
    ensure!(
        embedding.len() == expected_dim,
        "embedding for id={} has {} dims, expected {}",
        id,
        embedding.len(),
        expected_dim
    );
    let json = serde_json::to_string(embedding)?;
    conn.execute(
        "UPDATE norms SET embedding = ?1, updated_at = datetime('now') WHERE id = ?2",
        rusqlite::params![json, id],
    )?;
    Ok(())
}

#[cfg(test)]
pub fn fetch_embedding(conn: &Connection, id: i64) -> Result<Option<Vec<f32>>> {
    let json: Option<String> =
        conn.query_row("SELECT embedding FROM norms WHERE id = ?1", [id], |r| r.get(0))?;
    Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
    pub embedded: usize,
    pub pending: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let total = count_total(conn)?;
    let ok: usize =
        conn.query_row("SELECT COUNT(*) FROM norms WHERE status = 'ok'", [], |r| r.get(0))?;
    let embedded: usize = conn.query_row(
        "SELECT COUNT(*) FROM norms WHERE embedding IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let pending = count_pending(conn)?;
    Ok(Stats {
        total,
        ok,
        errors: total - ok,
        embedded,
        pending,
    })
}
