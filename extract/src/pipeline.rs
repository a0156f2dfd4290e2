//! One full-refresh run: extract, sample, resolve, assign, persist.
//!
//! Nothing is written until every aggregate has been resolved, so a
//! malformed extract leaves the destination untouched.

use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use log::{info, warn};

use crate::assign::{assign_to_nearest_place, ResolvedPlace, ResolvedStreet};
use crate::config::{ExtractConfig, ResolverStrategy};
use crate::error::ExtractError;
use crate::extractor::{extract_features, Aggregates, NodeSet, StreetKey, TimbukKey};
use crate::geometry::{pick_position, Position};
use crate::records::{PlaceRecord, StreetRecord};
use crate::resolver::{CoordinateLookup, NodePositions, SqliteNodeIndex};
use crate::sampler::{PositionSampler, SamplingStats};
use crate::source::NodeId;
use crate::store::{Collection, RecordStore, StoreError};
use crate::writer::write_collection;

/// An aggregate key with the node ids chosen to represent it.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate<K> {
    pub key: K,
    pub nodes: Vec<NodeId>,
}

#[derive(Debug, Default)]
pub struct Candidates {
    pub places: Vec<Candidate<String>>,
    pub streets: Vec<Candidate<StreetKey>>,
    pub timbuks: Vec<Candidate<TimbukKey>>,
}

impl Candidates {
    /// Samples every aggregate. Sampling happens before resolution so only
    /// the chosen ids need coordinates.
    pub fn sample(aggregates: Aggregates, sampler: &mut PositionSampler) -> Self {
        Self {
            places: sample_all(aggregates.places, sampler),
            streets: sample_all(aggregates.streets, sampler),
            timbuks: sample_all(aggregates.timbuks, sampler),
        }
    }

    pub fn wanted_nodes(&self) -> HashSet<NodeId> {
        let places = self.places.iter().flat_map(|c| &c.nodes);
        let streets = self.streets.iter().flat_map(|c| &c.nodes);
        let timbuks = self.timbuks.iter().flat_map(|c| &c.nodes);
        places.chain(streets).chain(timbuks).copied().collect()
    }
}

fn sample_all<K>(
    aggregates: BTreeMap<K, NodeSet>,
    sampler: &mut PositionSampler,
) -> Vec<Candidate<K>> {
    aggregates
        .into_iter()
        .map(|(key, nodes)| Candidate {
            key,
            nodes: sampler.sample(&nodes),
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub places: Vec<ResolvedPlace>,
    pub streets: Vec<ResolvedStreet>,
    pub dropped: usize,
}

fn resolve_position<L: CoordinateLookup + ?Sized>(
    nodes: &[NodeId],
    lookup: &L,
) -> Result<Option<Position>, ExtractError> {
    let mut positions = Vec::with_capacity(nodes.len());
    for id in nodes {
        if let Some(position) = lookup.lookup(*id)? {
            positions.push(position);
        }
    }
    Ok(pick_position(&positions))
}

/// Resolves places first, then streets, then assigns every timbuk to its
/// nearest resolved place. Unresolvable aggregates are logged and dropped.
pub fn resolve_candidates<L: CoordinateLookup + ?Sized>(
    candidates: &Candidates,
    lookup: &L,
) -> Result<Resolution, ExtractError> {
    let mut resolution = Resolution::default();

    for candidate in &candidates.places {
        match resolve_position(&candidate.nodes, lookup)? {
            Some(position) => resolution.places.push(ResolvedPlace {
                name: candidate.key.clone(),
                position,
            }),
            None => {
                warn!("no position for place {:?}", candidate.key);
                resolution.dropped += 1;
            }
        }
    }

    for candidate in &candidates.streets {
        let key = &candidate.key;
        match resolve_position(&candidate.nodes, lookup)? {
            Some(position) => resolution.streets.push(ResolvedStreet {
                place: key.place.clone(),
                street: key.street.clone(),
                house_number: key.house_number.clone(),
                position,
            }),
            None => {
                warn!(
                    "no position for street {:?} {:?} in {:?}",
                    key.street, key.house_number, key.place
                );
                resolution.dropped += 1;
            }
        }
    }

    for candidate in &candidates.timbuks {
        let key = &candidate.key;
        let Some(position) = resolve_position(&candidate.nodes, lookup)? else {
            warn!("no position for timbuk {:?} #{}", key.name, key.seq);
            resolution.dropped += 1;
            continue;
        };
        match assign_to_nearest_place(&key.name, &key.house_number, position, &resolution.places)
        {
            Some(street) => resolution.streets.push(street),
            None => {
                warn!("no place to assign timbuk {:?} #{} to", key.name, key.seq);
                resolution.dropped += 1;
            }
        }
    }

    Ok(resolution)
}

/// Replaces both collections of `store` with the resolved records.
/// Both are dropped before either is written, so a failed write never
/// leaves old streets next to new places.
/// Returns the number of places and streets written.
pub fn persist<S: RecordStore + ?Sized>(
    resolution: &Resolution,
    store: &mut S,
    batch_size: usize,
) -> Result<(usize, usize), StoreError> {
    store.drop_collection(Collection::Places)?;
    store.drop_collection(Collection::Streets)?;
    let places = write_collection(
        store,
        resolution.places.iter().map(PlaceRecord::from),
        batch_size,
    )?;
    let streets = write_collection(
        store,
        resolution.streets.iter().map(StreetRecord::from),
        batch_size,
    )?;
    Ok((places, streets))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub places_found: usize,
    pub streets_found: usize,
    pub timbuks_found: usize,
    pub referenced_nodes: usize,
    pub wanted_nodes: usize,
    pub dropped: usize,
    pub places_written: usize,
    pub streets_written: usize,
    pub sampling: SamplingStats,
}

pub fn run<S: RecordStore + ?Sized>(
    config: &ExtractConfig,
    store: &mut S,
) -> Result<RunSummary, ExtractError> {
    let mut summary = RunSummary::default();

    if let ResolverStrategy::NodeIndex {
        path,
        refresh: true,
    } = &config.resolver
    {
        info!("refreshing node index {}", path.display());
        let mark = Instant::now();
        let count = SqliteNodeIndex::open(path)?.refresh(&config.input, config.format, None)?;
        info!("  {count} nodes indexed in {:.3}s", mark.elapsed().as_secs_f64());
    }

    info!("parsing places and streets from {}", config.input.display());
    let mark = Instant::now();
    let aggregates = extract_features(&config.input, config.format)?;
    summary.places_found = aggregates.places.len();
    summary.streets_found = aggregates.streets.len();
    summary.timbuks_found = aggregates.timbuks.len();
    summary.referenced_nodes = aggregates.wanted_nodes().len();
    info!(
        "  {} places, {} streets, {} timbuks in {:.3}s",
        summary.places_found,
        summary.streets_found,
        summary.timbuks_found,
        mark.elapsed().as_secs_f64()
    );

    let mut sampler = PositionSampler::new(config.sampling.seed, config.sampling.enabled);
    let candidates = Candidates::sample(aggregates, &mut sampler);
    summary.sampling = sampler.into_stats();
    let wanted = candidates.wanted_nodes();
    summary.wanted_nodes = wanted.len();
    info!(
        "  {} of {} referenced nodes wanted after sampling {:?}",
        summary.wanted_nodes, summary.referenced_nodes, summary.sampling.by_percentage
    );

    let mark = Instant::now();
    let resolution = match &config.resolver {
        ResolverStrategy::Rescan => {
            let positions = NodePositions::scan(&config.input, config.format, &wanted)?;
            resolve_candidates(&candidates, &positions)?
        }
        ResolverStrategy::NodeIndex { path, .. } => {
            resolve_candidates(&candidates, &SqliteNodeIndex::open(path)?)?
        }
    };
    summary.dropped = resolution.dropped;
    info!(
        "resolved {} places and {} streets, dropped {} in {:.3}s",
        resolution.places.len(),
        resolution.streets.len(),
        resolution.dropped,
        mark.elapsed().as_secs_f64()
    );

    let (places_written, streets_written) = persist(&resolution, store, config.batch_size)?;
    summary.places_written = places_written;
    summary.streets_written = streets_written;
    Ok(summary)
}
