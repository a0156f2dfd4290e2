//! Streaming readers for OSM extracts.
//!
//! Both the XML and PBF readers drive an [`ElementVisitor`] with the same
//! sequence of callbacks: a start call for each `node` or `way`, the way's
//! node references and the element's tags, then the matching end call.
//! Nothing is retained between elements by the readers themselves.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::debug;
use osmpbfreader::{OsmObj, OsmPbfReader};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::ExtractError;
use crate::geometry::Position;

pub type NodeId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Xml,
    Pbf,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("pbf") => Self::Pbf,
            _ => Self::Xml,
        }
    }
}

/// Callbacks for a single pass over an extract.
///
/// Every method has an empty default so a visitor only implements the events
/// it cares about. Relations are never reported.
pub trait ElementVisitor {
    fn node_start(&mut self, _id: NodeId, _position: Option<Position>) {}
    fn node_end(&mut self) {}
    fn way_start(&mut self) {}
    fn way_end(&mut self) {}
    fn node_ref(&mut self, _id: NodeId) {}
    fn tag(&mut self, _key: &str, _value: &str) {}
}

pub fn visit_path<V: ElementVisitor>(
    path: &Path,
    format: SourceFormat,
    visitor: &mut V,
) -> Result<(), ExtractError> {
    let file = File::open(path).map_err(|source| ExtractError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("reading {} as {:?}", path.display(), format);
    match format {
        SourceFormat::Xml => visit_xml(BufReader::new(file), visitor),
        SourceFormat::Pbf => visit_pbf(file, visitor),
    }
}

pub fn visit_xml<R: BufRead, V: ElementVisitor>(
    input: R,
    visitor: &mut V,
) -> Result<(), ExtractError> {
    let mut reader = Reader::from_reader(input);
    reader.trim_text(true);
    let mut state = XmlState::default();
    let mut buf = Vec::new();

    loop {
        let position = reader.buffer_position();
        match reader.read_event_into(&mut buf) {
            Err(source) => return Err(ExtractError::Xml { position, source }),
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => state.start(&e, position, visitor)?,
            Ok(Event::Empty(e)) => {
                state.start(&e, position, visitor)?;
                state.end(e.name().as_ref(), visitor);
            }
            Ok(Event::End(e)) => state.end(e.name().as_ref(), visitor),
            Ok(_) => {}
        }
        buf.clear();
    }

    Ok(())
}

#[derive(Default)]
struct XmlState {
    in_node: bool,
    in_way: bool,
}

impl XmlState {
    fn start<V: ElementVisitor>(
        &mut self,
        e: &BytesStart<'_>,
        position: usize,
        visitor: &mut V,
    ) -> Result<(), ExtractError> {
        match e.name().as_ref() {
            b"node" => {
                let id = required_attr(e, "node", "id", position)?;
                let lat = coordinate_attr(e, "lat", 90.0, position)?;
                let lon = coordinate_attr(e, "lon", 180.0, position)?;
                let coord = match (lat, lon) {
                    (Some(lat), Some(lon)) => Some(Position::new(lat, lon)),
                    _ => None,
                };
                self.in_node = true;
                visitor.node_start(id, coord);
            }
            b"way" => {
                self.in_way = true;
                visitor.way_start();
            }
            b"nd" if self.in_way => {
                visitor.node_ref(required_attr(e, "nd", "ref", position)?);
            }
            b"tag" if self.in_node || self.in_way => {
                let key = get_attr_value(e, b"k", position)?;
                let value = get_attr_value(e, b"v", position)?;
                if let (Some(key), Some(value)) = (key, value) {
                    visitor.tag(&key, &value);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn end<V: ElementVisitor>(&mut self, name: &[u8], visitor: &mut V) {
        match name {
            b"node" if self.in_node => {
                self.in_node = false;
                visitor.node_end();
            }
            b"way" if self.in_way => {
                self.in_way = false;
                visitor.way_end();
            }
            _ => {}
        }
    }
}

fn get_attr_value(
    event: &BytesStart<'_>,
    key: &[u8],
    position: usize,
) -> Result<Option<String>, ExtractError> {
    for attr in event.attributes().with_checks(false) {
        let attr = attr.map_err(|source| ExtractError::Xml {
            position,
            source: source.into(),
        })?;
        if attr.key.as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|source| ExtractError::Xml { position, source })?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn optional_attr<T: FromStr>(
    event: &BytesStart<'_>,
    element: &'static str,
    attribute: &'static str,
    position: usize,
) -> Result<Option<T>, ExtractError> {
    let Some(value) = get_attr_value(event, attribute.as_bytes(), position)? else {
        return Ok(None);
    };
    value
        .trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| ExtractError::InvalidAttribute {
            element,
            attribute,
            value,
            position,
        })
}

/// A `lat` or `lon` value must be finite and within `-limit..=limit`.
fn coordinate_attr(
    event: &BytesStart<'_>,
    attribute: &'static str,
    limit: f64,
    position: usize,
) -> Result<Option<f64>, ExtractError> {
    match optional_attr::<f64>(event, "node", attribute, position)? {
        Some(value) if !value.is_finite() || value.abs() > limit => {
            Err(ExtractError::InvalidAttribute {
                element: "node",
                attribute,
                value: value.to_string(),
                position,
            })
        }
        value => Ok(value),
    }
}

fn required_attr<T: FromStr>(
    event: &BytesStart<'_>,
    element: &'static str,
    attribute: &'static str,
    position: usize,
) -> Result<T, ExtractError> {
    optional_attr(event, element, attribute, position)?.ok_or(ExtractError::MissingAttribute {
        element,
        attribute,
        position,
    })
}

pub fn visit_pbf<R: Read, V: ElementVisitor>(
    input: R,
    visitor: &mut V,
) -> Result<(), ExtractError> {
    let mut pbf = OsmPbfReader::new(input);
    for obj in pbf.iter() {
        match obj.map_err(|source| ExtractError::Pbf { source })? {
            OsmObj::Node(node) => {
                visitor.node_start(node.id.0, Some(Position::new(node.lat(), node.lon())));
                for (key, value) in node.tags.iter() {
                    visitor.tag(key.as_str(), value.as_str());
                }
                visitor.node_end();
            }
            OsmObj::Way(way) => {
                visitor.way_start();
                for node_id in &way.nodes {
                    visitor.node_ref(node_id.0);
                }
                for (key, value) in way.tags.iter() {
                    visitor.tag(key.as_str(), value.as_str());
                }
                visitor.way_end();
            }
            OsmObj::Relation(_) => {}
        }
    }
    Ok(())
}

/// Finds the single `.osm` or `.pbf` extract in `folder`.
pub fn find_default_extract(folder: &Path) -> Result<PathBuf, ExtractError> {
    let read_dir = folder.read_dir().map_err(|source| ExtractError::Open {
        path: folder.to_path_buf(),
        source,
    })?;
    let mut extracts = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|source| ExtractError::Open {
            path: folder.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("osm" | "pbf")
        ) {
            extracts.push(path);
        }
    }
    extracts.sort();

    match extracts.len() {
        0 => Err(ExtractError::NoDefaultInput {
            folder: folder.to_path_buf(),
        }),
        1 => Ok(extracts.remove(0)),
        _ => Err(ExtractError::AmbiguousDefaultInput {
            folder: folder.to_path_buf(),
        }),
    }
}
