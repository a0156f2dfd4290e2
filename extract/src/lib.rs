//! Builds a searchable place and street index from an OpenStreetMap extract.
//!
//! The extract is streamed once to aggregate address-bearing features, node
//! coordinates are resolved for the ids those aggregates need, each aggregate
//! is reduced to one representative position, fallback features are attached
//! to their nearest place, and the result replaces the contents of a
//! [`store::RecordStore`].

pub mod assign;
pub mod config;
pub mod error;
pub mod extractor;
pub mod geometry;
pub mod pipeline;
pub mod records;
pub mod resolver;
pub mod sampler;
pub mod source;
pub mod store;
pub mod writer;

pub use config::{ExtractConfig, ResolverStrategy, SamplingConfig};
pub use error::ExtractError;
pub use pipeline::{run, RunSummary};
pub use source::SourceFormat;
