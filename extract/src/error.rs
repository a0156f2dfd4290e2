use std::path::PathBuf;

use thiserror::Error;

use crate::store::StoreError;

/// Errors that abort an extraction run.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to open {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed XML at byte {position}")]
    Xml {
        position: usize,
        #[source]
        source: quick_xml::Error,
    },
    #[error("<{element}> at byte {position} has no `{attribute}` attribute")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
        position: usize,
    },
    #[error("<{element}> at byte {position} has invalid `{attribute}` value {value:?}")]
    InvalidAttribute {
        element: &'static str,
        attribute: &'static str,
        value: String,
        position: usize,
    },
    #[error("failed to decode OSM PBF data")]
    Pbf {
        #[source]
        source: osmpbfreader::Error,
    },
    #[error("node index operation failed: {operation}")]
    NodeIndex {
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },
    #[error("no .osm or .pbf file found in {folder:?}")]
    NoDefaultInput { folder: PathBuf },
    #[error("multiple extracts found in {folder:?}; pass --input explicitly")]
    AmbiguousDefaultInput { folder: PathBuf },
    #[error(transparent)]
    Store(#[from] StoreError),
}
