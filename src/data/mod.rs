use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::model::{PanelSnapshot, PlantSnapshot};

pub mod read;
mod tables;
mod write;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("couldn't open store {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("store {path} is missing table(s) {missing:?}, initialise it first")]
    MissingSchema {
        path: PathBuf,
        missing: Vec<&'static str>,
    },

    #[error("couldn't create schema: {0}")]
    Schema(#[source] rusqlite::Error),

    #[error("couldn't close store: {0}")]
    Close(#[source] rusqlite::Error),
}

#[derive(Debug, Error)]
#[error("couldn't write into table {table}: {source}")]
pub struct PersistenceError {
    pub table: &'static str,
    #[source]
    pub source: rusqlite::Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanelInsert {
    Stored,
    /// The inverter repeated a sample that is already stored.
    Duplicate,
}

/// Exclusive handle on the snapshot database.
///
/// Every insert runs in autocommit mode, so each record is durable as soon as
/// its call returns.
pub struct PlantStore {
    conn: Connection,
}

impl PlantStore {
    /// Opens an existing, initialised store. The file is never created here.
    #[instrument]
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(path, flags).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let missing = read::missing_tables(&conn, &tables::TABLE_NAMES).map_err(|source| {
            StoreError::Open {
                path: path.to_path_buf(),
                source,
            }
        })?;
        if !missing.is_empty() {
            return Err(StoreError::MissingSchema {
                path: path.to_path_buf(),
                missing,
            });
        }

        debug!("Opened store {}", path.display());

        Ok(PlantStore { conn })
    }

    /// Creates the file when needed and both snapshot tables.
    #[instrument]
    pub fn initialise(path: &Path) -> Result<(), StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        Self::create_schema(&conn)?;

        conn.close().map_err(|(_, err)| StoreError::Close(err))
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        Self::create_schema(&conn)?;

        Ok(PlantStore { conn })
    }

    fn create_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute(tables::SYSTEM_TABLE, [])
            .map_err(StoreError::Schema)?;
        debug!("Built system table");

        conn.execute(tables::PANELS_TABLE, [])
            .map_err(StoreError::Schema)?;
        debug!("Built panels table");

        Ok(())
    }

    /// A clash on the capture second is a plain error: the record is lost.
    pub fn insert_plant_snapshot(&mut self, snapshot: &PlantSnapshot) -> Result<(), PersistenceError> {
        write::insert_plant_snapshot(&self.conn, snapshot).map_err(|source| PersistenceError {
            table: "system",
            source,
        })
    }

    pub fn insert_panel_snapshot(
        &mut self,
        snapshot: &PanelSnapshot,
    ) -> Result<PanelInsert, PersistenceError> {
        match write::insert_panel_snapshot(&self.conn, snapshot) {
            Ok(()) => Ok(PanelInsert::Stored),
            Err(err) if write::is_primary_key_violation(&err) => Ok(PanelInsert::Duplicate),
            Err(source) => Err(PersistenceError {
                table: "panels",
                source,
            }),
        }
    }

    pub fn last_plant_snapshot(&self) -> rusqlite::Result<Option<PlantSnapshot>> {
        read::last_plant_snapshot(&self.conn)
    }

    pub fn plant_snapshot_count(&self) -> rusqlite::Result<u64> {
        read::plant_snapshot_count(&self.conn)
    }

    pub fn panel_snapshot_count(&self) -> rusqlite::Result<u64> {
        read::panel_snapshot_count(&self.conn)
    }

    #[cfg(test)]
    pub fn find_panel_snapshot(
        &self,
        device_timestamp: i64,
        device_id: &str,
    ) -> rusqlite::Result<Option<PanelSnapshot>> {
        read::find_panel_snapshot(&self.conn, device_timestamp, device_id)
    }

    pub fn close(self) -> Result<(), StoreError> {
        self.conn.close().map_err(|(_, err)| StoreError::Close(err))?;
        info!("Store closed");
        Ok(())
    }
}
