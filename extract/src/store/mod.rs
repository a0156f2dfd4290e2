//! Destinations for place and street records.

use std::path::PathBuf;

use thiserror::Error;

use crate::records::{PlaceRecord, StreetRecord};

mod csv;
mod sqlite;

pub use self::csv::CsvStore;
pub use self::sqlite::SqliteStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Places,
    Streets,
}

impl Collection {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Places => "places",
            Self::Streets => "streets",
        }
    }
}

/// Errors raised by a [`RecordStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Opening the SQLite database failed.
    #[error("failed to open SQLite database at {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    /// A statement against one collection failed.
    #[error("SQLite {operation} on {} failed", .collection.name())]
    Sqlite {
        collection: Collection,
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },
    /// Creating or writing a CSV file failed.
    #[error("failed to write {path:?}")]
    Csv {
        path: PathBuf,
        #[source]
        source: ::csv::Error,
    },
    #[error("failed to create output directory {path:?}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Records were written to a collection that was not dropped first.
    #[error("{} was written before being reset", .collection.name())]
    NotReset { collection: Collection },
}

/// Bulk-write interface of the record store.
///
/// A rebuild calls `drop_collection` for each collection, inserts batches,
/// then asks for the geo index.
pub trait RecordStore {
    /// Removes every record of `collection` and prepares it for inserts.
    fn drop_collection(&mut self, collection: Collection) -> Result<(), StoreError>;

    fn insert_places(&mut self, batch: &[PlaceRecord]) -> Result<(), StoreError>;

    fn insert_streets(&mut self, batch: &[StreetRecord]) -> Result<(), StoreError>;

    /// Builds or rebuilds the location index of `collection`.
    fn create_geo_index(&mut self, collection: Collection) -> Result<(), StoreError>;
}
