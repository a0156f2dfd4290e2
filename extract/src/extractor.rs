//! First pass: aggregate address-bearing features into canonical keys.
//!
//! [`FeatureExtractor`] is an [`ElementVisitor`] that keeps a
//! [`FeatureContext`] for the element currently open. The context is reset
//! whenever a `node` or `way` begins and is consumed when it ends, at which
//! point the feature is captured into places, streets or timbuks.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use log::debug;

use crate::error::ExtractError;
use crate::geometry::Position;
use crate::source::{visit_path, ElementVisitor, NodeId, SourceFormat};

pub const ALLOWED_PLACES: [&str; 3] = ["city", "town", "village"];

pub const ALLOWED_HIGHWAYS: [&str; 5] = [
    "secondary",
    "tertiary",
    "unclassified",
    "residential",
    "service",
];

pub type NodeSet = BTreeSet<NodeId>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreetKey {
    pub place: String,
    pub street: String,
    pub house_number: String,
}

/// Key of a fallback feature. `seq` makes every capture distinct, so two
/// features with the same name and number keep separate node sets.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimbukKey {
    pub name: String,
    pub house_number: String,
    pub seq: u64,
}

/// Everything captured by one extraction pass.
#[derive(Debug, Default)]
pub struct Aggregates {
    pub places: BTreeMap<String, NodeSet>,
    pub streets: BTreeMap<StreetKey, NodeSet>,
    pub timbuks: BTreeMap<TimbukKey, NodeSet>,
}

impl Aggregates {
    pub fn wanted_nodes(&self) -> HashSet<NodeId> {
        self.places
            .values()
            .chain(self.streets.values())
            .chain(self.timbuks.values())
            .flatten()
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.places.len() + self.streets.len() + self.timbuks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Widest range that is expanded into separate house numbers.
pub const MAX_HOUSE_NUMBER_RANGE: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HouseNumbers {
    Range { from: u32, to: u32 },
    Literal(String),
}

impl HouseNumbers {
    /// `"12-16"` is a range; anything else, including reversed ranges such as
    /// `"16-12"` and ranges spanning more than [`MAX_HOUSE_NUMBER_RANGE`]
    /// numbers, is a single literal value.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        let range = value.split_once('-').and_then(|(from, to)| {
            let from = parse_digits(from)?;
            let to = parse_digits(to)?;
            (from <= to && to - from < MAX_HOUSE_NUMBER_RANGE)
                .then_some(Self::Range { from, to })
        });
        range.unwrap_or_else(|| Self::Literal(value.to_string()))
    }

    pub fn values(&self) -> Vec<String> {
        match self {
            Self::Range { from, to } => (*from..=*to).map(|no| no.to_string()).collect(),
            Self::Literal(value) => vec![value.clone()],
        }
    }
}

fn parse_digits(text: &str) -> Option<u32> {
    if text.is_empty() || !text.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeatureKind {
    Node(NodeId),
    Way,
}

/// Per-element state between a feature's start and end events.
#[derive(Debug, Default)]
struct FeatureContext {
    kind: Option<FeatureKind>,
    nodes: Vec<NodeId>,
    house_number: String,
    street: String,
    city: String,
    name: String,
    highway: bool,
    place: bool,
}

impl FeatureContext {
    fn begin(&mut self, kind: FeatureKind) {
        *self = Self::default();
        self.kind = Some(kind);
        if let FeatureKind::Node(id) = kind {
            self.nodes.push(id);
        }
    }

    fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    fn apply_tag(&mut self, key: &str, value: &str) {
        let Some(kind) = self.kind else {
            return;
        };
        match key {
            "addr:street" => self.street = value.trim().to_string(),
            "addr:housenumber" => self.house_number = value.trim().to_string(),
            "addr:city" => self.city = value.trim().to_string(),
            "name" => self.name = value.trim().to_string(),
            "highway" if ALLOWED_HIGHWAYS.contains(&value) => self.highway = true,
            "place" if matches!(kind, FeatureKind::Node(_)) && ALLOWED_PLACES.contains(&value) => {
                self.place = true
            }
            _ => {}
        }
    }
}

/// Aggregates captured features while an extract is streamed through it.
#[derive(Debug, Default)]
pub struct FeatureExtractor {
    context: FeatureContext,
    aggregates: Aggregates,
    next_seq: u64,
}

impl FeatureExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> Aggregates {
        self.aggregates
    }

    fn end_feature(&mut self, expected: fn(FeatureKind) -> bool) {
        let feature = self.context.take();
        match feature.kind {
            Some(kind) if expected(kind) => {}
            _ => return,
        }
        if feature.nodes.is_empty() {
            return;
        }

        self.save_address(&feature);

        if let Some(FeatureKind::Node(id)) = feature.kind {
            if feature.place {
                if feature.name.is_empty() {
                    debug!("place node {id} has no name");
                } else {
                    capture(&mut self.aggregates.places, feature.name.clone(), &[id]);
                }
            }
        }
    }

    fn save_address(&mut self, feature: &FeatureContext) {
        if feature.highway && !feature.name.is_empty() {
            self.capture_timbuk(&feature.name, "", &feature.nodes);
        }

        if feature.street.is_empty() {
            return;
        }
        self.capture_address(feature, "");

        if !feature.house_number.is_empty() {
            for house_number in HouseNumbers::parse(&feature.house_number).values() {
                self.capture_address(feature, &house_number);
            }
        }
    }

    fn capture_address(&mut self, feature: &FeatureContext, house_number: &str) {
        if feature.city.is_empty() {
            self.capture_timbuk(&feature.street, house_number, &feature.nodes);
        } else {
            let key = StreetKey {
                place: feature.city.clone(),
                street: feature.street.clone(),
                house_number: house_number.to_string(),
            };
            capture(&mut self.aggregates.streets, key, &feature.nodes);
        }
    }

    fn capture_timbuk(&mut self, name: &str, house_number: &str, nodes: &[NodeId]) {
        let key = TimbukKey {
            name: name.to_string(),
            house_number: house_number.to_string(),
            seq: self.next_seq,
        };
        self.next_seq += 1;
        capture(&mut self.aggregates.timbuks, key, nodes);
    }
}

fn capture<K: Ord>(map: &mut BTreeMap<K, NodeSet>, key: K, nodes: &[NodeId]) {
    map.entry(key).or_default().extend(nodes.iter().copied());
}

impl ElementVisitor for FeatureExtractor {
    fn node_start(&mut self, id: NodeId, _position: Option<Position>) {
        self.context.begin(FeatureKind::Node(id));
    }

    fn node_end(&mut self) {
        self.end_feature(|kind| matches!(kind, FeatureKind::Node(_)));
    }

    fn way_start(&mut self) {
        self.context.begin(FeatureKind::Way);
    }

    fn way_end(&mut self) {
        self.end_feature(|kind| kind == FeatureKind::Way);
    }

    fn node_ref(&mut self, id: NodeId) {
        if self.context.kind == Some(FeatureKind::Way) {
            self.context.nodes.push(id);
        }
    }

    fn tag(&mut self, key: &str, value: &str) {
        self.context.apply_tag(key, value);
    }
}

pub fn extract_features(path: &Path, format: SourceFormat) -> Result<Aggregates, ExtractError> {
    let mut extractor = FeatureExtractor::new();
    visit_path(path, format, &mut extractor)?;
    Ok(extractor.finish())
}
