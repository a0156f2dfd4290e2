//! Coordinates for the node ids that aggregates refer to.
//!
//! Two strategies implement [`CoordinateLookup`]:
//! - [`NodePositions`] rescans the extract and keeps only wanted nodes.
//! - [`SqliteNodeIndex`] answers from a node table built ahead of time.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use log::{debug, info};
use rusqlite::{Connection, OptionalExtension};

use crate::error::ExtractError;
use crate::geometry::Position;
use crate::source::{visit_path, ElementVisitor, NodeId, SourceFormat};

/// Rows buffered per insert batch when refreshing the node index.
pub const NODE_INSERT_BATCH: usize = 100;

pub trait CoordinateLookup {
    /// Returns `Ok(None)` for ids the lookup does not know.
    fn lookup(&self, id: NodeId) -> Result<Option<Position>, ExtractError>;
}

/// Coordinates of the wanted nodes, collected by a dedicated pass.
#[derive(Debug, Default)]
pub struct NodePositions {
    positions: HashMap<NodeId, Position>,
}

impl NodePositions {
    pub fn scan(
        path: &Path,
        format: SourceFormat,
        wanted: &HashSet<NodeId>,
    ) -> Result<Self, ExtractError> {
        let mut collector = WantedNodes::new(wanted);
        visit_path(path, format, &mut collector)?;
        debug!(
            "resolved {} of {} wanted nodes",
            collector.found.len(),
            wanted.len()
        );
        Ok(Self {
            positions: collector.found,
        })
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

impl From<HashMap<NodeId, Position>> for NodePositions {
    fn from(positions: HashMap<NodeId, Position>) -> Self {
        Self { positions }
    }
}

impl CoordinateLookup for NodePositions {
    fn lookup(&self, id: NodeId) -> Result<Option<Position>, ExtractError> {
        Ok(self.positions.get(&id).copied())
    }
}

struct WantedNodes<'a> {
    wanted: &'a HashSet<NodeId>,
    found: HashMap<NodeId, Position>,
}

impl<'a> WantedNodes<'a> {
    fn new(wanted: &'a HashSet<NodeId>) -> Self {
        Self {
            wanted,
            found: HashMap::with_capacity(wanted.len()),
        }
    }
}

impl ElementVisitor for WantedNodes<'_> {
    fn node_start(&mut self, id: NodeId, position: Option<Position>) {
        if let Some(position) = position {
            if self.wanted.contains(&id) {
                self.found.insert(id, position);
            }
        }
    }
}

/// Persistent `id -> (lat, lon)` table in its own SQLite database.
pub struct SqliteNodeIndex {
    connection: Connection,
}

impl SqliteNodeIndex {
    pub fn open(path: &Path) -> Result<Self, ExtractError> {
        let connection = Connection::open(path).map_err(|source| ExtractError::NodeIndex {
            operation: "open",
            source,
        })?;
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS nodes (
                    id INTEGER PRIMARY KEY,
                    lat REAL NOT NULL,
                    lon REAL NOT NULL
                )",
                [],
            )
            .map_err(|source| ExtractError::NodeIndex {
                operation: "create schema",
                source,
            })?;
        Ok(Self { connection })
    }

    /// Replaces the index content with the nodes of `path`.
    ///
    /// With `wanted` set only those ids are stored, otherwise every node.
    /// The clear and the load share one transaction, so a failed refresh
    /// leaves the previous content in place. Returns the number of stored
    /// nodes.
    pub fn refresh(
        &mut self,
        path: &Path,
        format: SourceFormat,
        wanted: Option<&HashSet<NodeId>>,
    ) -> Result<usize, ExtractError> {
        let transaction = self
            .connection
            .transaction()
            .map_err(|source| ExtractError::NodeIndex {
                operation: "begin",
                source,
            })?;
        transaction
            .execute("DELETE FROM nodes", [])
            .map_err(|source| ExtractError::NodeIndex {
                operation: "clear",
                source,
            })?;

        let mut loader = NodeLoader::new(&transaction, wanted);
        visit_path(path, format, &mut loader)?;
        loader.flush();
        if let Some(error) = loader.error {
            return Err(error);
        }
        let count = loader.count;
        transaction
            .commit()
            .map_err(|source| ExtractError::NodeIndex {
                operation: "commit",
                source,
            })?;
        info!("node index holds {count} nodes");
        Ok(count)
    }

    pub fn len(&self) -> Result<usize, ExtractError> {
        self.connection
            .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get::<_, i64>(0))
            .map(|count| usize::try_from(count).unwrap_or_default())
            .map_err(|source| ExtractError::NodeIndex {
                operation: "count",
                source,
            })
    }

    pub fn is_empty(&self) -> Result<bool, ExtractError> {
        self.len().map(|count| count == 0)
    }
}

impl CoordinateLookup for SqliteNodeIndex {
    fn lookup(&self, id: NodeId) -> Result<Option<Position>, ExtractError> {
        self.connection
            .prepare_cached("SELECT lat, lon FROM nodes WHERE id = ?1")
            .and_then(|mut statement| {
                statement
                    .query_row([id], |row| Ok(Position::new(row.get(0)?, row.get(1)?)))
                    .optional()
            })
            .map_err(|source| ExtractError::NodeIndex {
                operation: "lookup",
                source,
            })
    }
}

struct NodeLoader<'a> {
    connection: &'a Connection,
    wanted: Option<&'a HashSet<NodeId>>,
    buffer: Vec<(NodeId, Position)>,
    count: usize,
    error: Option<ExtractError>,
}

impl<'a> NodeLoader<'a> {
    fn new(connection: &'a Connection, wanted: Option<&'a HashSet<NodeId>>) -> Self {
        Self {
            connection,
            wanted,
            buffer: Vec::with_capacity(NODE_INSERT_BATCH),
            count: 0,
            error: None,
        }
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() || self.error.is_some() {
            return;
        }
        let result = insert_nodes(self.connection, &self.buffer);
        let inserted = self.buffer.len();
        self.buffer.clear();
        match result {
            Ok(()) => self.count += inserted,
            Err(source) => {
                self.error = Some(ExtractError::NodeIndex {
                    operation: "insert",
                    source,
                });
            }
        }
    }
}

impl ElementVisitor for NodeLoader<'_> {
    fn node_start(&mut self, id: NodeId, position: Option<Position>) {
        if self.error.is_some() {
            return;
        }
        let Some(position) = position else {
            return;
        };
        if self.wanted.is_some_and(|wanted| !wanted.contains(&id)) {
            return;
        }
        self.buffer.push((id, position));
        if self.buffer.len() >= NODE_INSERT_BATCH {
            self.flush();
        }
    }
}

fn insert_nodes(
    connection: &Connection,
    nodes: &[(NodeId, Position)],
) -> Result<(), rusqlite::Error> {
    let mut statement = connection
        .prepare_cached("INSERT OR REPLACE INTO nodes (id, lat, lon) VALUES (?1, ?2, ?3)")?;
    for (id, position) in nodes {
        statement.execute((id, position.lat, position.lon))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write as _;
    use tempfile::tempdir;

    const OSM_NODES: &str = r#"<?xml version='1.0' encoding='UTF-8'?>
<osm version="0.6" generator="test">
  <node id="1" lat="55.7" lon="13.2" />
  <node id="2" lat="55.8" lon="13.3" />
  <node id="3" lat="55.9" lon="13.4">
    <tag k="name" v="Tagged" />
  </node>
  <way id="10">
    <nd ref="1" />
    <nd ref="99" />
  </way>
</osm>
"#;

    fn write_sample(dir: &Path, contents: &str) -> std::path::PathBuf {
        let path = dir.join("sample.osm");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn rescan_keeps_only_wanted_nodes() {
        let dir = tempdir().unwrap();
        let path = write_sample(dir.path(), OSM_NODES);
        let wanted = HashSet::from([1, 3, 99]);

        let positions = NodePositions::scan(&path, SourceFormat::Xml, &wanted).unwrap();

        assert_eq!(positions.len(), 2);
        assert_eq!(positions.lookup(1).unwrap(), Some(Position::new(55.7, 13.2)));
        assert_eq!(positions.lookup(3).unwrap(), Some(Position::new(55.9, 13.4)));
        assert_eq!(positions.lookup(2).unwrap(), None);
        assert_eq!(positions.lookup(99).unwrap(), None);
    }

    #[test]
    fn node_index_refresh_and_lookup() {
        let dir = tempdir().unwrap();
        let path = write_sample(dir.path(), OSM_NODES);
        let mut index = SqliteNodeIndex::open(&dir.path().join("nodes.sqlite")).unwrap();

        assert_eq!(index.refresh(&path, SourceFormat::Xml, None).unwrap(), 3);
        assert_eq!(index.len().unwrap(), 3);
        assert_eq!(index.lookup(2).unwrap(), Some(Position::new(55.8, 13.3)));
        assert_eq!(index.lookup(99).unwrap(), None);

        let wanted = HashSet::from([3]);
        assert_eq!(index.refresh(&path, SourceFormat::Xml, Some(&wanted)).unwrap(), 1);
        assert_eq!(index.lookup(1).unwrap(), None);
        assert_eq!(index.lookup(3).unwrap(), Some(Position::new(55.9, 13.4)));
    }

    const REJECT_INSERTS: &str = "CREATE TRIGGER reject_nodes BEFORE INSERT ON nodes
         BEGIN SELECT RAISE(ABORT, 'read-only'); END;";

    #[test]
    fn failed_refresh_keeps_previous_index() {
        let dir = tempdir().unwrap();
        let good = write_sample(dir.path(), OSM_NODES);
        let mut index = SqliteNodeIndex::open(&dir.path().join("nodes.sqlite")).unwrap();
        index.refresh(&good, SourceFormat::Xml, None).unwrap();

        let broken = dir.path().join("broken.osm");
        std::fs::write(&broken, r#"<osm><node id="7" lat="1" lon="1"/><node id="x"/></osm>"#)
            .unwrap();
        let err = index.refresh(&broken, SourceFormat::Xml, None).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidAttribute { .. }), "got {err:?}");

        assert_eq!(index.len().unwrap(), 3);
        assert_eq!(index.lookup(7).unwrap(), None);
        assert_eq!(index.lookup(1).unwrap(), Some(Position::new(55.7, 13.2)));
    }

    #[test]
    fn failed_insert_stops_buffering_nodes() {
        let dir = tempdir().unwrap();
        let index = SqliteNodeIndex::open(&dir.path().join("nodes.sqlite")).unwrap();
        index.connection.execute_batch(REJECT_INSERTS).unwrap();

        let mut loader = NodeLoader::new(&index.connection, None);
        for id in 0..(3 * NODE_INSERT_BATCH as NodeId) {
            loader.node_start(id, Some(Position::new(1.0, 1.0)));
        }

        assert!(matches!(
            loader.error,
            Some(ExtractError::NodeIndex {
                operation: "insert",
                ..
            })
        ));
        assert!(loader.buffer.is_empty());
        assert_eq!(loader.count, 0);
    }

    #[test]
    fn refresh_reports_insert_failure() {
        let dir = tempdir().unwrap();
        let path = write_sample(dir.path(), OSM_NODES);
        let mut index = SqliteNodeIndex::open(&dir.path().join("nodes.sqlite")).unwrap();
        index.connection.execute_batch(REJECT_INSERTS).unwrap();

        let err = index.refresh(&path, SourceFormat::Xml, None).unwrap_err();
        assert!(
            matches!(err, ExtractError::NodeIndex { operation: "insert", .. }),
            "got {err:?}"
        );
        assert_eq!(index.len().unwrap(), 0);
    }

    #[test]
    fn node_index_refresh_spans_several_batches() {
        let dir = tempdir().unwrap();
        let mut doc = String::from("<osm>\n");
        for id in 1..=250 {
            writeln!(doc, r#"  <node id="{id}" lat="1.0" lon="{id}.0" />"#).unwrap();
        }
        doc.push_str("</osm>\n");
        let path = write_sample(dir.path(), &doc);
        let db_path = dir.path().join("nodes.sqlite");

        let mut index = SqliteNodeIndex::open(&db_path).unwrap();
        assert_eq!(index.refresh(&path, SourceFormat::Xml, None).unwrap(), 250);
        drop(index);

        let reopened = SqliteNodeIndex::open(&db_path).unwrap();
        assert_eq!(reopened.len().unwrap(), 250);
        assert_eq!(reopened.lookup(250).unwrap(), Some(Position::new(1.0, 250.0)));
    }
}
