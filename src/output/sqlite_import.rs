//! Loads an exported sales CSV into SQLite for ad-hoc querying.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
struct SaleRecord {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "setID")]
    set_id: String,
    #[serde(rename = "setName")]
    set_name: String,
    #[serde(rename = "playID")]
    play_id: String,
    #[serde(rename = "serialNumber")]
    serial_number: String,
    #[serde(rename = "playerName")]
    player_name: String,
    price: String,
}

struct SaleEntry<'a> {
    date: &'a str,
    time: &'a str,
    set_id: i64,
    play_id: i64,
    serial_number: i64,
    price: f64,
}

impl SaleRecord {
    /// `None` for placeholder rows and anything else without numeric columns.
    fn entry(&self) -> Option<SaleEntry<'_>> {
        Some(SaleEntry {
            date: self.date.get(0..10)?,
            time: self.date.get(11..19)?,
            set_id: self.set_id.parse().ok()?,
            play_id: self.play_id.parse().ok()?,
            serial_number: self.serial_number.parse().ok()?,
            price: self.price.parse().ok()?,
        })
    }
}

pub struct SalesDatabase {
    conn: Connection,
}

impl SalesDatabase {
    pub fn open(path: &Path) -> Result<Self, ImportError> {
        Self::init(Connection::open(path)?)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, ImportError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, ImportError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS item_purchase_data (
                id INTEGER PRIMARY KEY,
                date TEXT NOT NULL,
                time TEXT NOT NULL,
                set_id INTEGER NOT NULL,
                set_name TEXT NOT NULL,
                play_id INTEGER NOT NULL,
                serial_number INTEGER NOT NULL,
                player_name TEXT NOT NULL,
                price REAL NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_item_purchase_set ON item_purchase_data(set_id)",
            [],
        )?;
        Ok(Self { conn })
    }

    pub fn import_file(&mut self, path: &Path) -> Result<ImportSummary, ImportError> {
        self.import_csv(File::open(path)?)
    }

    /// Inserts every complete row of a sales export in a single transaction.
    pub fn import_csv<R: Read>(&mut self, input: R) -> Result<ImportSummary, ImportError> {
        let mut reader = csv::Reader::from_reader(input);
        let mut summary = ImportSummary::default();

        let tx = self.conn.transaction()?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO item_purchase_data
                 (date, time, set_id, set_name, play_id, serial_number, player_name, price)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;

            for (line, record) in reader.deserialize::<SaleRecord>().enumerate() {
                let record = record?;
                let Some(entry) = record.entry() else {
                    tracing::warn!(
                        "Skipping incomplete sale row {} dated {:?}",
                        line + 1,
                        record.date
                    );
                    summary.skipped += 1;
                    continue;
                };

                insert.execute(params![
                    entry.date,
                    entry.time,
                    entry.set_id,
                    record.set_name,
                    entry.play_id,
                    entry.serial_number,
                    record.player_name,
                    entry.price,
                ])?;
                summary.imported += 1;
            }
        }
        tx.commit()?;

        tracing::debug!(
            "Imported {} sale rows ({} skipped)",
            summary.imported,
            summary.skipped
        );
        Ok(summary)
    }

    /// Player on the earliest imported sale from `set_id`.
    pub fn player_name_for_set(&self, set_id: i64) -> Result<Option<String>, ImportError> {
        let name = self
            .conn
            .query_row(
                "SELECT player_name FROM item_purchase_data WHERE set_id = ?1 ORDER BY id LIMIT 1",
                params![set_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }

    #[cfg(test)]
    fn count(&self) -> i64 {
        self.conn
            .query_row("SELECT COUNT(*) FROM item_purchase_data", [], |row| row.get(0))
            .unwrap()
    }
}
