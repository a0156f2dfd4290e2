use std::path::{Path, PathBuf};

use crate::source::SourceFormat;
use crate::writer::DEFAULT_BATCH_SIZE;

/// Where node coordinates come from during resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverStrategy {
    /// Second streaming pass over the input.
    Rescan,
    /// Persistent node table; rebuilt from the input first when `refresh`.
    NodeIndex { path: PathBuf, refresh: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingConfig {
    pub enabled: bool,
    pub seed: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractConfig {
    pub input: PathBuf,
    pub format: SourceFormat,
    pub resolver: ResolverStrategy,
    pub sampling: SamplingConfig,
    pub batch_size: usize,
}

impl ExtractConfig {
    /// Defaults: format from the file extension, rescan resolution, seeded
    /// sampling and batches of [`DEFAULT_BATCH_SIZE`].
    pub fn new(input: &Path) -> Self {
        Self {
            input: input.to_path_buf(),
            format: SourceFormat::from_path(input),
            resolver: ResolverStrategy::Rescan,
            sampling: SamplingConfig::default(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_format(mut self, format: SourceFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_resolver(mut self, resolver: ResolverStrategy) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_input_extension() {
        let config = ExtractConfig::new(Path::new("sweden.osm.pbf"));
        assert_eq!(config.format, SourceFormat::Pbf);
        assert_eq!(config.resolver, ResolverStrategy::Rescan);
        assert_eq!(config.batch_size, 100);
        assert!(config.sampling.enabled);
    }

    #[test]
    fn batch_size_has_a_floor_of_one() {
        let config = ExtractConfig::new(Path::new("lund.osm")).with_batch_size(0);
        assert_eq!(config.batch_size, 1);
    }
}
