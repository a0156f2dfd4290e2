//! Flat-file record store: one CSV file per collection.

use std::fs::File;
use std::path::{Path, PathBuf};

use csv::Writer;
use log::debug;

use super::{Collection, RecordStore, StoreError};
use crate::records::{PlaceRecord, StreetRecord};

const PLACE_HEADER: [&str; 4] = ["searchable_name", "place_name", "lat", "lon"];

const STREET_HEADER: [&str; 6] = [
    "searchable_name",
    "place_name",
    "street_name",
    "house_number",
    "lat",
    "lon",
];

pub struct CsvStore {
    dir: PathBuf,
    places: Option<Writer<File>>,
    streets: Option<Writer<File>>,
}

impl CsvStore {
    pub fn create(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir).map_err(|source| StoreError::CreateDirectory {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
            places: None,
            streets: None,
        })
    }

    pub fn path_of(&self, collection: Collection) -> PathBuf {
        self.dir.join(format!("{}.csv", collection.name()))
    }

    fn writer(&mut self, collection: Collection) -> Result<&mut Writer<File>, StoreError> {
        let writer = match collection {
            Collection::Places => self.places.as_mut(),
            Collection::Streets => self.streets.as_mut(),
        };
        writer.ok_or(StoreError::NotReset { collection })
    }

    fn csv_error(&self, collection: Collection) -> impl FnOnce(csv::Error) -> StoreError {
        let path = self.path_of(collection);
        move |source| StoreError::Csv { path, source }
    }
}

fn coordinate(value: f64) -> String {
    format!("{value:.7}")
}

impl RecordStore for CsvStore {
    fn drop_collection(&mut self, collection: Collection) -> Result<(), StoreError> {
        let path = self.path_of(collection);
        let mut writer = Writer::from_path(&path).map_err(self.csv_error(collection))?;
        let header: &[&str] = match collection {
            Collection::Places => &PLACE_HEADER,
            Collection::Streets => &STREET_HEADER,
        };
        writer
            .write_record(header)
            .map_err(self.csv_error(collection))?;
        match collection {
            Collection::Places => self.places = Some(writer),
            Collection::Streets => self.streets = Some(writer),
        }
        Ok(())
    }

    fn insert_places(&mut self, batch: &[PlaceRecord]) -> Result<(), StoreError> {
        let collection = Collection::Places;
        let on_error = self.csv_error(collection);
        let writer = self.writer(collection)?;
        let written: Result<(), csv::Error> = batch.iter().try_for_each(|place| {
            writer.write_record([
                place.searchable_name.as_str(),
                place.place_name.as_str(),
                coordinate(place.location.lat).as_str(),
                coordinate(place.location.lon).as_str(),
            ])
        });
        written.map_err(on_error)
    }

    fn insert_streets(&mut self, batch: &[StreetRecord]) -> Result<(), StoreError> {
        let collection = Collection::Streets;
        let on_error = self.csv_error(collection);
        let writer = self.writer(collection)?;
        let written: Result<(), csv::Error> = batch.iter().try_for_each(|street| {
            writer.write_record([
                street.searchable_name.as_str(),
                street.place_name.as_str(),
                street.street_name.as_str(),
                street.house_number.as_str(),
                coordinate(street.location.lat).as_str(),
                coordinate(street.location.lon).as_str(),
            ])
        });
        written.map_err(on_error)
    }

    /// CSV output carries no index; the file is flushed so it is complete
    /// once the collection has been written.
    fn create_geo_index(&mut self, collection: Collection) -> Result<(), StoreError> {
        let path = self.path_of(collection);
        let writer = self.writer(collection)?;
        debug!("flushing {}", path.display());
        writer.flush().map_err(|source| StoreError::Csv {
            path,
            source: source.into(),
        })
    }
}
