//! Persisted record shapes.
//!
//! `searchable_name` is always lowercase and `house_number` is always
//! present, empty for streets without a number.

use crate::assign::{ResolvedPlace, ResolvedStreet};
use crate::geometry::Position;
use crate::store::{Collection, RecordStore, StoreError};

pub fn make_searchable(name: &str) -> String {
    name.to_lowercase()
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaceRecord {
    pub searchable_name: String,
    pub place_name: String,
    pub location: Position,
}

impl From<&ResolvedPlace> for PlaceRecord {
    fn from(place: &ResolvedPlace) -> Self {
        Self {
            searchable_name: make_searchable(&place.name),
            place_name: place.name.clone(),
            location: place.position,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreetRecord {
    pub searchable_name: String,
    pub place_name: String,
    pub street_name: String,
    pub house_number: String,
    pub location: Position,
}

impl From<&ResolvedStreet> for StreetRecord {
    fn from(street: &ResolvedStreet) -> Self {
        let display = if street.house_number.is_empty() {
            format!("{} {}", street.street, street.place)
        } else {
            format!("{} {} {}", street.street, street.house_number, street.place)
        };
        Self {
            searchable_name: make_searchable(&display),
            place_name: street.place.clone(),
            street_name: street.street.clone(),
            house_number: street.house_number.clone(),
            location: street.position,
        }
    }
}

/// A record type with its own collection in a [`RecordStore`].
pub trait Record: Sized {
    const COLLECTION: Collection;

    fn insert_batch<S: RecordStore + ?Sized>(store: &mut S, batch: &[Self])
        -> Result<(), StoreError>;
}

impl Record for PlaceRecord {
    const COLLECTION: Collection = Collection::Places;

    fn insert_batch<S: RecordStore + ?Sized>(
        store: &mut S,
        batch: &[Self],
    ) -> Result<(), StoreError> {
        store.insert_places(batch)
    }
}

impl Record for StreetRecord {
    const COLLECTION: Collection = Collection::Streets;

    fn insert_batch<S: RecordStore + ?Sized>(
        store: &mut S,
        batch: &[Self],
    ) -> Result<(), StoreError> {
        store.insert_streets(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn street(place: &str, name: &str, no: &str) -> ResolvedStreet {
        ResolvedStreet {
            place: place.to_string(),
            street: name.to_string(),
            house_number: no.to_string(),
            position: Position::new(55.7, 13.2),
        }
    }

    #[test]
    fn place_record_lowercases_searchable_name() {
        let record = PlaceRecord::from(&ResolvedPlace {
            name: "Malmö".to_string(),
            position: Position::new(55.6, 13.0),
        });
        assert_eq!(record.searchable_name, "malmö");
        assert_eq!(record.place_name, "Malmö");
        assert_eq!(record.location, Position::new(55.6, 13.0));
    }

    #[test]
    fn street_record_without_number() {
        let record = StreetRecord::from(&street("Lund", "Stora Södergatan", ""));
        assert_eq!(record.searchable_name, "stora södergatan lund");
        assert_eq!(record.house_number, "");
        assert_eq!(record.street_name, "Stora Södergatan");
        assert_eq!(record.place_name, "Lund");
    }

    #[test]
    fn street_record_with_number() {
        let record = StreetRecord::from(&street("Lund", "Kyrkogatan", "12B"));
        assert_eq!(record.searchable_name, "kyrkogatan 12b lund");
        assert_eq!(record.house_number, "12B");
    }
}
