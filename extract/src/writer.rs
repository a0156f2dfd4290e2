use log::{debug, info};

use crate::records::Record;
use crate::store::{RecordStore, StoreError};

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Buffers records of one collection and hands them to the store in batches
/// of at most `batch_size`.
pub struct BatchWriter<'s, S: RecordStore + ?Sized, R: Record> {
    store: &'s mut S,
    buffer: Vec<R>,
    batch_size: usize,
    written: usize,
}

impl<'s, S: RecordStore + ?Sized, R: Record> BatchWriter<'s, S, R> {
    pub fn new(store: &'s mut S, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            store,
            buffer: Vec::with_capacity(batch_size),
            batch_size,
            written: 0,
        }
    }

    pub fn push(&mut self, record: R) -> Result<(), StoreError> {
        self.buffer.push(record);
        if self.buffer.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        R::insert_batch(&mut *self.store, &self.buffer)?;
        self.written += self.buffer.len();
        debug!("{}: {} records written", R::COLLECTION.name(), self.written);
        self.buffer.clear();
        Ok(())
    }

    /// Writes the remainder and builds the collection's location index.
    /// Returns the number of records written.
    pub fn finish(mut self) -> Result<usize, StoreError> {
        self.flush()?;
        self.store.create_geo_index(R::COLLECTION)?;
        info!(
            "{}: {} records written and indexed",
            R::COLLECTION.name(),
            self.written
        );
        Ok(self.written)
    }
}

/// Writes `records` into `R`'s collection, which the caller has already
/// dropped, then builds its location index.
pub fn write_collection<S, R, I>(
    store: &mut S,
    records: I,
    batch_size: usize,
) -> Result<usize, StoreError>
where
    S: RecordStore + ?Sized,
    R: Record,
    I: IntoIterator<Item = R>,
{
    let mut writer = BatchWriter::new(store, batch_size);
    for record in records {
        writer.push(record)?;
    }
    writer.finish()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::geometry::Position;
    use crate::records::{PlaceRecord, StreetRecord};
    use crate::store::Collection;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum StoreCall {
        Drop(Collection),
        Places(usize),
        Streets(usize),
        Index(Collection),
    }

    /// Records every call it receives and keeps the inserted records.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub(crate) calls: Vec<StoreCall>,
        pub(crate) places: Vec<PlaceRecord>,
        pub(crate) streets: Vec<StreetRecord>,
    }

    impl RecordStore for MemoryStore {
        fn drop_collection(&mut self, collection: Collection) -> Result<(), StoreError> {
            self.calls.push(StoreCall::Drop(collection));
            match collection {
                Collection::Places => self.places.clear(),
                Collection::Streets => self.streets.clear(),
            }
            Ok(())
        }

        fn insert_places(&mut self, batch: &[PlaceRecord]) -> Result<(), StoreError> {
            self.calls.push(StoreCall::Places(batch.len()));
            self.places.extend_from_slice(batch);
            Ok(())
        }

        fn insert_streets(&mut self, batch: &[StreetRecord]) -> Result<(), StoreError> {
            self.calls.push(StoreCall::Streets(batch.len()));
            self.streets.extend_from_slice(batch);
            Ok(())
        }

        fn create_geo_index(&mut self, collection: Collection) -> Result<(), StoreError> {
            self.calls.push(StoreCall::Index(collection));
            Ok(())
        }
    }

    fn places(count: usize) -> Vec<PlaceRecord> {
        (0..count)
            .map(|idx| PlaceRecord {
                searchable_name: format!("place {idx}"),
                place_name: format!("Place {idx}"),
                location: Position::new(0.0, 0.0),
            })
            .collect()
    }

    #[test]
    fn writes_full_batches_then_remainder_then_index() {
        let mut store = MemoryStore::default();
        let written = write_collection(&mut store, places(250), 100).unwrap();

        assert_eq!(written, 250);
        assert_eq!(
            store.calls,
            vec![
                StoreCall::Places(100),
                StoreCall::Places(100),
                StoreCall::Places(50),
                StoreCall::Index(Collection::Places),
            ]
        );
        assert_eq!(store.places.len(), 250);
    }

    #[test]
    fn exact_multiple_has_no_empty_flush() {
        let mut store = MemoryStore::default();
        write_collection(&mut store, places(200), 100).unwrap();
        let inserts = store
            .calls
            .iter()
            .filter(|call| matches!(call, StoreCall::Places(_)))
            .count();
        assert_eq!(inserts, 2);
    }

    #[test]
    fn empty_collection_is_still_indexed() {
        let mut store = MemoryStore::default();
        let written = write_collection(&mut store, Vec::<StreetRecord>::new(), 100).unwrap();
        assert_eq!(written, 0);
        assert_eq!(
            store.calls,
            vec![StoreCall::Index(Collection::Streets)]
        );
    }

    #[test]
    fn zero_batch_size_is_treated_as_one() {
        let mut store = MemoryStore::default();
        write_collection(&mut store, places(3), 0).unwrap();
        assert_eq!(
            store.calls[..3],
            [
                StoreCall::Places(1),
                StoreCall::Places(1),
                StoreCall::Places(1),
            ]
        );
    }
}
