//! SQLite record store with R*Tree location indexes.

use std::path::Path;

use log::debug;
use rusqlite::{Connection, Transaction};

use super::{Collection, RecordStore, StoreError};
use crate::records::{PlaceRecord, StreetRecord};

const PLACES_SCHEMA: &str = "
    DROP TABLE IF EXISTS places_location;
    DROP TABLE IF EXISTS places;
    CREATE TABLE places (
        id INTEGER PRIMARY KEY,
        searchable_name TEXT NOT NULL,
        place_name TEXT NOT NULL,
        lat REAL NOT NULL,
        lon REAL NOT NULL
    );";

const STREETS_SCHEMA: &str = "
    DROP TABLE IF EXISTS streets_location;
    DROP TABLE IF EXISTS streets;
    CREATE TABLE streets (
        id INTEGER PRIMARY KEY,
        searchable_name TEXT NOT NULL,
        place_name TEXT NOT NULL,
        street_name TEXT NOT NULL,
        house_number TEXT NOT NULL DEFAULT '',
        lat REAL NOT NULL,
        lon REAL NOT NULL
    );";

pub struct SqliteStore {
    connection: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let connection = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { connection })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let connection = Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: ":memory:".into(),
            source,
        })?;
        Ok(Self { connection })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    fn begin(&mut self, collection: Collection) -> Result<Transaction<'_>, StoreError> {
        self.connection
            .transaction()
            .map_err(|source| StoreError::Sqlite {
                collection,
                operation: "begin",
                source,
            })
    }
}

fn insert_error(collection: Collection) -> impl FnOnce(rusqlite::Error) -> StoreError {
    move |source| StoreError::Sqlite {
        collection,
        operation: "insert",
        source,
    }
}

impl RecordStore for SqliteStore {
    fn drop_collection(&mut self, collection: Collection) -> Result<(), StoreError> {
        let schema = match collection {
            Collection::Places => PLACES_SCHEMA,
            Collection::Streets => STREETS_SCHEMA,
        };
        self.connection
            .execute_batch(schema)
            .map_err(|source| StoreError::Sqlite {
                collection,
                operation: "drop",
                source,
            })
    }

    fn insert_places(&mut self, batch: &[PlaceRecord]) -> Result<(), StoreError> {
        let collection = Collection::Places;
        let transaction = self.begin(collection)?;
        {
            let mut statement = transaction
                .prepare_cached(
                    "INSERT INTO places (searchable_name, place_name, lat, lon)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(insert_error(collection))?;
            for place in batch {
                statement
                    .execute((
                        &place.searchable_name,
                        &place.place_name,
                        place.location.lat,
                        place.location.lon,
                    ))
                    .map_err(insert_error(collection))?;
            }
        }
        transaction.commit().map_err(insert_error(collection))
    }

    fn insert_streets(&mut self, batch: &[StreetRecord]) -> Result<(), StoreError> {
        let collection = Collection::Streets;
        let transaction = self.begin(collection)?;
        {
            let mut statement = transaction
                .prepare_cached(
                    "INSERT INTO streets
                        (searchable_name, place_name, street_name, house_number, lat, lon)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .map_err(insert_error(collection))?;
            for street in batch {
                statement
                    .execute((
                        &street.searchable_name,
                        &street.place_name,
                        &street.street_name,
                        &street.house_number,
                        street.location.lat,
                        street.location.lon,
                    ))
                    .map_err(insert_error(collection))?;
            }
        }
        transaction.commit().map_err(insert_error(collection))
    }

    fn create_geo_index(&mut self, collection: Collection) -> Result<(), StoreError> {
        let table = collection.name();
        let sql = format!(
            "DROP TABLE IF EXISTS {table}_location;
             CREATE VIRTUAL TABLE {table}_location USING rtree(id, min_lat, max_lat, min_lon, max_lon);
             INSERT INTO {table}_location SELECT id, lat, lat, lon, lon FROM {table};
             CREATE INDEX IF NOT EXISTS {table}_searchable_name ON {table} (searchable_name);"
        );
        debug!("building location index for {table}");
        self.connection
            .execute_batch(&sql)
            .map_err(|source| StoreError::Sqlite {
                collection,
                operation: "index",
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Position;

    fn place(name: &str, lat: f64, lon: f64) -> PlaceRecord {
        PlaceRecord {
            searchable_name: name.to_lowercase(),
            place_name: name.to_string(),
            location: Position::new(lat, lon),
        }
    }

    fn count(store: &SqliteStore, table: &str) -> i64 {
        store
            .connection()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn drop_clears_previous_rows() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.drop_collection(Collection::Places).unwrap();
        store
            .insert_places(&[place("Lund", 55.7, 13.2), place("Malmö", 55.6, 13.0)])
            .unwrap();
        assert_eq!(count(&store, "places"), 2);

        store.drop_collection(Collection::Places).unwrap();
        assert_eq!(count(&store, "places"), 0);
    }

    #[test]
    fn geo_index_answers_bounding_box_queries() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.drop_collection(Collection::Places).unwrap();
        store
            .insert_places(&[place("Lund", 55.7, 13.2), place("Kiruna", 67.8, 20.2)])
            .unwrap();
        store.create_geo_index(Collection::Places).unwrap();

        let mut statement = store
            .connection()
            .prepare(
                "SELECT p.place_name FROM places p
                 JOIN places_location l ON l.id = p.id
                 WHERE l.min_lat >= 55.0 AND l.max_lat <= 56.0
                   AND l.min_lon >= 12.0 AND l.max_lon <= 14.0",
            )
            .unwrap();
        let names: Vec<String> = statement
            .query_map([], |row| row.get(0))
            .unwrap()
            .map(|row| row.unwrap())
            .collect();
        assert_eq!(names, vec!["Lund".to_string()]);
    }

    #[test]
    fn streets_keep_empty_house_number() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.drop_collection(Collection::Streets).unwrap();
        store
            .insert_streets(&[StreetRecord {
                searchable_name: "storgatan lund".to_string(),
                place_name: "Lund".to_string(),
                street_name: "Storgatan".to_string(),
                house_number: String::new(),
                location: Position::new(55.7, 13.2),
            }])
            .unwrap();
        store.create_geo_index(Collection::Streets).unwrap();

        let house_number: Option<String> = store
            .connection()
            .query_row("SELECT house_number FROM streets", [], |row| row.get(0))
            .unwrap();
        assert_eq!(house_number.as_deref(), Some(""));
    }
}
