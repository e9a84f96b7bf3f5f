//! Durable per-item, per-stage processing state.
//!
//! The ledger is a cache of what the artifact store already proves. It lets a
//! restarted run report progress and failures without re-deriving them, and
//! it keeps the feed metadata so reports can be rebuilt offline. When the
//! ledger and the store disagree the stage runner repairs the ledger.

use crate::error::{PodsiftError, Result};
use crate::feed::{Item, ItemId};
use crate::store::Stage;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS items (
    item_id TEXT PRIMARY KEY,
    guid TEXT NOT NULL,
    title TEXT NOT NULL,
    audio_url TEXT NOT NULL,
    ordinal INTEGER NOT NULL,
    episode_label TEXT,
    published_at TEXT,
    feed_position INTEGER NOT NULL,
    first_seen_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS stage_records (
    item_id TEXT NOT NULL,
    stage TEXT NOT NULL,
    status TEXT NOT NULL,
    location TEXT,
    error TEXT,
    attempts INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (item_id, stage)
);

CREATE INDEX IF NOT EXISTS idx_stage_records_status ON stage_records(status);
"#;

/// Processing status of one stage of one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Done,
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Done => "done",
            StageStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for StageStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StageStatus::Pending),
            "done" => Ok(StageStatus::Done),
            "failed" => Ok(StageStatus::Failed),
            _ => Err(format!("Unknown stage status: {}", s)),
        }
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger row for one item and stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub item_id: ItemId,
    pub stage: Stage,
    pub status: StageStatus,
    pub location: Option<PathBuf>,
    pub error: Option<String>,
    pub attempts: u32,
    pub updated_at: DateTime<Utc>,
}

/// Done/failed totals for one stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageCounts {
    pub done: usize,
    pub failed: usize,
}

/// SQLite-backed item ledger.
pub struct ItemLedger {
    conn: Mutex<Connection>,
}

impl ItemLedger {
    /// Open (or create) the ledger database at `path`.
    #[instrument(skip_all)]
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Opened ledger at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory ledger (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| PodsiftError::InvalidInput(format!("Failed to acquire ledger lock: {}", e)))
    }

    /// Current status; `Pending` when the stage has never been recorded.
    pub fn get_status(&self, item_id: &ItemId, stage: Stage) -> Result<StageStatus> {
        Ok(self
            .get_record(item_id, stage)?
            .map(|r| r.status)
            .unwrap_or(StageStatus::Pending))
    }

    pub fn get_record(&self, item_id: &ItemId, stage: Stage) -> Result<Option<StageRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                r#"
                SELECT item_id, stage, status, location, error, attempts, updated_at
                FROM stage_records
                WHERE item_id = ?1 AND stage = ?2
                "#,
                params![item_id.as_str(), stage.as_str()],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Record that the stage's artifact is durably at `location`.
    pub fn mark_done(&self, item_id: &ItemId, stage: Stage, location: &Path) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO stage_records (item_id, stage, status, location, error, attempts, updated_at)
            VALUES (?1, ?2, 'done', ?3, NULL, 0, ?4)
            ON CONFLICT(item_id, stage) DO UPDATE SET
                status = 'done',
                location = excluded.location,
                error = NULL,
                updated_at = excluded.updated_at
            "#,
            params![
                item_id.as_str(),
                stage.as_str(),
                location.to_string_lossy().to_string(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        debug!("Marked {} done for {}", stage, item_id);
        Ok(())
    }

    /// Record a failed attempt at the stage.
    pub fn mark_failed(&self, item_id: &ItemId, stage: Stage, error: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO stage_records (item_id, stage, status, location, error, attempts, updated_at)
            VALUES (?1, ?2, 'failed', NULL, ?3, 1, ?4)
            ON CONFLICT(item_id, stage) DO UPDATE SET
                status = 'failed',
                location = NULL,
                error = excluded.error,
                attempts = stage_records.attempts + 1,
                updated_at = excluded.updated_at
            "#,
            params![item_id.as_str(), stage.as_str(), error, Utc::now().to_rfc3339()],
        )?;
        debug!("Marked {} failed for {}", stage, item_id);
        Ok(())
    }

    /// Upsert feed metadata for the items of this run, remembering feed order.
    pub fn record_items(&self, items: &[Item]) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        let now = Utc::now().to_rfc3339();

        for (position, item) in items.iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO items
                (item_id, guid, title, audio_url, ordinal, episode_label, published_at, feed_position, first_seen_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(item_id) DO UPDATE SET
                    title = excluded.title,
                    audio_url = excluded.audio_url,
                    ordinal = excluded.ordinal,
                    episode_label = excluded.episode_label,
                    published_at = excluded.published_at,
                    feed_position = excluded.feed_position
                "#,
                params![
                    item.id.as_str(),
                    item.guid,
                    item.title,
                    item.audio_url,
                    item.ordinal,
                    item.episode_label,
                    item.published_at.map(|dt| dt.to_rfc3339()),
                    position as i64,
                    now,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// All known items, in the feed order of the most recent run that saw them.
    pub fn items(&self) -> Result<Vec<Item>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT item_id, guid, title, audio_url, ordinal, episode_label, published_at
            FROM items
            ORDER BY feed_position, ordinal
            "#,
        )?;

        let items = stmt
            .query_map([], |row| {
                let published: Option<String> = row.get(6)?;
                Ok(Item {
                    id: ItemId::from_raw(row.get::<_, String>(0)?),
                    guid: row.get(1)?,
                    title: row.get(2)?,
                    audio_url: row.get(3)?,
                    ordinal: row.get(4)?,
                    episode_label: row.get(5)?,
                    published_at: published.and_then(|s| {
                        DateTime::parse_from_rfc3339(&s)
                            .ok()
                            .map(|dt| dt.with_timezone(&Utc))
                    }),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(items)
    }

    /// Every stage currently marked failed.
    pub fn failed_records(&self) -> Result<Vec<StageRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT item_id, stage, status, location, error, attempts, updated_at
            FROM stage_records
            WHERE status = 'failed'
            ORDER BY updated_at
            "#,
        )?;
        let records = stmt
            .query_map([], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Done/failed totals for a stage.
    pub fn stage_counts(&self, stage: Stage) -> Result<StageCounts> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM stage_records WHERE stage = ?1 GROUP BY status",
        )?;
        let mut counts = StageCounts::default();
        let rows = stmt.query_map(params![stage.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, n) = row?;
            match status.as_str() {
                "done" => counts.done = n as usize,
                "failed" => counts.failed = n as usize,
                _ => {}
            }
        }
        Ok(counts)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<StageRecord> {
    let stage: String = row.get(1)?;
    let status: String = row.get(2)?;
    let location: Option<String> = row.get(3)?;
    let updated_at: String = row.get(6)?;

    let invalid = |idx: usize, msg: String| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            msg.into(),
        )
    };

    Ok(StageRecord {
        item_id: ItemId::from_raw(row.get::<_, String>(0)?),
        stage: stage.parse().map_err(|e| invalid(1, e))?,
        status: status.parse().map_err(|e| invalid(2, e))?,
        location: location.map(PathBuf::from),
        error: row.get(4)?,
        attempts: row.get(5)?,
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn id(guid: &str) -> ItemId {
        ItemId::from_guid(guid)
    }

    #[test]
    fn test_unknown_stage_is_pending() {
        let ledger = ItemLedger::in_memory().unwrap();
        assert_eq!(ledger.get_status(&id("a"), Stage::Download).unwrap(), StageStatus::Pending);
        assert!(ledger.get_record(&id("a"), Stage::Download).unwrap().is_none());
    }

    #[test]
    fn test_mark_done() {
        let ledger = ItemLedger::in_memory().unwrap();
        ledger
            .mark_done(&id("a"), Stage::Download, Path::new("/data/a.mp3"))
            .unwrap();

        let record = ledger.get_record(&id("a"), Stage::Download).unwrap().unwrap();
        assert_eq!(record.status, StageStatus::Done);
        assert_eq!(record.location, Some(PathBuf::from("/data/a.mp3")));
        assert_eq!(ledger.get_status(&id("a"), Stage::Transcribe).unwrap(), StageStatus::Pending);
    }

    #[test]
    fn test_failed_then_done_clears_error() {
        let ledger = ItemLedger::in_memory().unwrap();
        ledger.mark_failed(&id("a"), Stage::Analyze, "service 503").unwrap();
        ledger.mark_failed(&id("a"), Stage::Analyze, "service 502").unwrap();

        let record = ledger.get_record(&id("a"), Stage::Analyze).unwrap().unwrap();
        assert_eq!(record.status, StageStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("service 502"));
        assert_eq!(record.attempts, 2);
        assert_eq!(ledger.failed_records().unwrap().len(), 1);

        ledger
            .mark_done(&id("a"), Stage::Analyze, Path::new("/r/a.analysis.json"))
            .unwrap();
        let record = ledger.get_record(&id("a"), Stage::Analyze).unwrap().unwrap();
        assert_eq!(record.status, StageStatus::Done);
        assert!(record.error.is_none());
        assert!(ledger.failed_records().unwrap().is_empty());
    }

    #[test]
    fn test_failure_clears_previous_location() {
        let ledger = ItemLedger::in_memory().unwrap();
        ledger
            .mark_done(&id("a"), Stage::Transcribe, Path::new("/t/a.transcript.json"))
            .unwrap();
        ledger.mark_failed(&id("a"), Stage::Transcribe, "corrupt media").unwrap();

        let record = ledger.get_record(&id("a"), Stage::Transcribe).unwrap().unwrap();
        assert_eq!(record.status, StageStatus::Failed);
        assert!(record.location.is_none());
    }

    #[test]
    fn test_stage_counts() {
        let ledger = ItemLedger::in_memory().unwrap();
        ledger.mark_done(&id("a"), Stage::Download, Path::new("a")).unwrap();
        ledger.mark_done(&id("b"), Stage::Download, Path::new("b")).unwrap();
        ledger.mark_failed(&id("c"), Stage::Download, "404").unwrap();

        let counts = ledger.stage_counts(Stage::Download).unwrap();
        assert_eq!(counts, StageCounts { done: 2, failed: 1 });
        assert_eq!(ledger.stage_counts(Stage::Analyze).unwrap(), StageCounts::default());
    }

    #[test]
    fn test_items_roundtrip_in_feed_order() {
        let ledger = ItemLedger::in_memory().unwrap();
        let items = vec![
            Item::new("g3", "Episode 3", "https://x/3.mp3", 3),
            Item::new("g1", "Episode 1", "https://x/1.mp3", 1),
        ];
        ledger.record_items(&items).unwrap();
        ledger.record_items(&items).unwrap();

        let stored = ledger.items().unwrap();
        assert_eq!(stored, items);
    }

    #[test]
    fn test_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ledger.db");
        {
            let ledger = ItemLedger::open(&path).unwrap();
            ledger.mark_done(&id("a"), Stage::Transcribe, Path::new("t.json")).unwrap();
        }

        let ledger = ItemLedger::open(&path).unwrap();
        assert_eq!(ledger.get_status(&id("a"), Stage::Transcribe).unwrap(), StageStatus::Done);
    }
}
