use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context as _, Result};
use rusqlite::{Connection, OptionalExtension as _, Row, params};

use super::{ChannelCreationRecord, OrderSide, ReverseSwapRecord, SwapRecord, SwapStateStore};
use crate::rates::PairId;
use crate::status::SwapUpdateEvent;

#[derive(Debug)]
pub struct SqliteSwapStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteSwapStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create swap store dir {}", dir.display()))?;
        }

        let conn =
            Connection::open(&path).with_context(|| format!("open sqlite {}", path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("set sqlite busy_timeout")?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
            .context("configure sqlite pragmas")?;

        migrate(&conn).context("migrate sqlite schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("sqlite connection mutex poisoned")
    }

    pub fn insert_swap(&self, record: &SwapRecord) -> Result<()> {
        self.conn()
            .execute(
                r#"
INSERT INTO swaps (id, pair, order_side, status, failure_reason, transaction_id)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
"#,
                params![
                    &record.id,
                    record.pair.to_string(),
                    record.order_side.as_str(),
                    record.status.as_str(),
                    &record.failure_reason,
                    &record.transaction_id,
                ],
            )
            .with_context(|| format!("insert swap {}", record.id))?;
        Ok(())
    }

    pub fn insert_reverse_swap(&self, record: &ReverseSwapRecord) -> Result<()> {
        self.conn()
            .execute(
                r#"
INSERT INTO reverse_swaps (id, pair, order_side, status, failure_reason, transaction_id)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
"#,
                params![
                    &record.id,
                    record.pair.to_string(),
                    record.order_side.as_str(),
                    record.status.as_str(),
                    &record.failure_reason,
                    &record.transaction_id,
                ],
            )
            .with_context(|| format!("insert reverse swap {}", record.id))?;
        Ok(())
    }

    pub fn insert_channel_creation(&self, record: &ChannelCreationRecord) -> Result<()> {
        self.conn()
            .execute(
                r#"
INSERT INTO channel_creations (swap_id, funding_transaction_id, funding_transaction_vout)
VALUES (?1, ?2, ?3)
"#,
                params![
                    &record.swap_id,
                    &record.funding_transaction_id,
                    record.funding_transaction_vout,
                ],
            )
            .with_context(|| format!("insert channel creation {}", record.swap_id))?;
        Ok(())
    }

    pub fn update_swap_status(
        &self,
        id: &str,
        status: SwapUpdateEvent,
        failure_reason: Option<&str>,
    ) -> Result<()> {
        let rows = self
            .conn()
            .execute(
                "UPDATE swaps SET status = ?2, failure_reason = ?3 WHERE id = ?1",
                params![id, status.as_str(), failure_reason],
            )
            .with_context(|| format!("update swap status {id}"))?;
        anyhow::ensure!(rows == 1, "swap not found: {id}");
        Ok(())
    }

    pub fn update_reverse_swap_status(
        &self,
        id: &str,
        status: SwapUpdateEvent,
        transaction_id: Option<&str>,
    ) -> Result<()> {
        let rows = self
            .conn()
            .execute(
                r#"
UPDATE reverse_swaps
SET status = ?2, transaction_id = COALESCE(?3, transaction_id)
WHERE id = ?1
"#,
                params![id, status.as_str(), transaction_id],
            )
            .with_context(|| format!("update reverse swap status {id}"))?;
        anyhow::ensure!(rows == 1, "reverse swap not found: {id}");
        Ok(())
    }

    pub fn get_swap(&self, id: &str) -> Result<Option<SwapRecord>> {
        self.conn()
            .query_row(
                r#"
SELECT id, pair, order_side, status, failure_reason, transaction_id
FROM swaps
WHERE id = ?1
"#,
                params![id],
                swap_from_row,
            )
            .optional()
            .with_context(|| format!("get swap {id}"))
    }

    pub fn list_swaps(&self) -> Result<Vec<SwapRecord>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                r#"
SELECT id, pair, order_side, status, failure_reason, transaction_id
FROM swaps
ORDER BY id
"#,
            )
            .context("prepare list swaps")?;

        let rows = stmt
            .query_map([], swap_from_row)
            .context("query list swaps")?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("read swap row")?);
        }
        Ok(out)
    }

    pub fn list_reverse_swaps(&self) -> Result<Vec<ReverseSwapRecord>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                r#"
SELECT id, pair, order_side, status, failure_reason, transaction_id
FROM reverse_swaps
ORDER BY id
"#,
            )
            .context("prepare list reverse swaps")?;

        let rows = stmt
            .query_map([], |row| {
                Ok(ReverseSwapRecord {
                    id: row.get(0)?,
                    pair: pair_from_row(row, 1)?,
                    order_side: order_side_from_row(row, 2)?,
                    status: status_from_row(row, 3)?,
                    failure_reason: row.get(4)?,
                    transaction_id: row.get(5)?,
                })
            })
            .context("query list reverse swaps")?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("read reverse swap row")?);
        }
        Ok(out)
    }

    pub fn get_channel_creation(&self, swap_id: &str) -> Result<Option<ChannelCreationRecord>> {
        self.conn()
            .query_row(
                r#"
SELECT swap_id, funding_transaction_id, funding_transaction_vout
FROM channel_creations
WHERE swap_id = ?1
"#,
                params![swap_id],
                |row| {
                    let vout: i64 = row.get(2)?;
                    Ok(ChannelCreationRecord {
                        swap_id: row.get(0)?,
                        funding_transaction_id: row.get(1)?,
                        funding_transaction_vout: u32::try_from(vout).map_err(|_| {
                            rusqlite::Error::FromSqlConversionFailure(
                                2,
                                rusqlite::types::Type::Integer,
                                format!("invalid funding_transaction_vout {vout}").into(),
                            )
                        })?,
                    })
                },
            )
            .optional()
            .with_context(|| format!("get channel creation {swap_id}"))
    }
}

impl SwapStateStore for SqliteSwapStore {
    fn swaps(&self) -> Result<Vec<SwapRecord>> {
        self.list_swaps()
    }

    fn reverse_swaps(&self) -> Result<Vec<ReverseSwapRecord>> {
        self.list_reverse_swaps()
    }

    fn channel_creation(&self, swap_id: &str) -> Result<Option<ChannelCreationRecord>> {
        self.get_channel_creation(swap_id)
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS swaps (
  id TEXT PRIMARY KEY,
  pair TEXT NOT NULL,
  order_side TEXT NOT NULL,
  status TEXT NOT NULL,
  failure_reason TEXT,
  transaction_id TEXT
);
CREATE INDEX IF NOT EXISTS swaps_status_idx ON swaps(status);

CREATE TABLE IF NOT EXISTS reverse_swaps (
  id TEXT PRIMARY KEY,
  pair TEXT NOT NULL,
  order_side TEXT NOT NULL,
  status TEXT NOT NULL,
  failure_reason TEXT,
  transaction_id TEXT
);
CREATE INDEX IF NOT EXISTS reverse_swaps_status_idx ON reverse_swaps(status);

CREATE TABLE IF NOT EXISTS channel_creations (
  swap_id TEXT PRIMARY KEY REFERENCES swaps(id),
  funding_transaction_id TEXT NOT NULL,
  funding_transaction_vout INTEGER NOT NULL
);
"#,
    )
    .context("create tables")?;
    Ok(())
}

fn swap_from_row(row: &Row<'_>) -> rusqlite::Result<SwapRecord> {
    Ok(SwapRecord {
        id: row.get(0)?,
        pair: pair_from_row(row, 1)?,
        order_side: order_side_from_row(row, 2)?,
        status: status_from_row(row, 3)?,
        failure_reason: row.get(4)?,
        transaction_id: row.get(5)?,
    })
}

fn text_conversion_error(col: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, message.into())
}

fn pair_from_row(row: &Row<'_>, col: usize) -> rusqlite::Result<PairId> {
    let raw: String = row.get(col)?;
    raw.parse::<PairId>()
        .map_err(|e| text_conversion_error(col, format!("{e}")))
}

fn order_side_from_row(row: &Row<'_>, col: usize) -> rusqlite::Result<OrderSide> {
    let raw: String = row.get(col)?;
    raw.parse::<OrderSide>()
        .map_err(|e| text_conversion_error(col, format!("{e}")))
}

fn status_from_row(row: &Row<'_>, col: usize) -> rusqlite::Result<SwapUpdateEvent> {
    let raw: String = row.get(col)?;
    raw.parse::<SwapUpdateEvent>()
        .map_err(|e| text_conversion_error(col, format!("{e}")))
}
