//! Read-only snapshot of index, alias and data stream topology.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Serialized shape of a [`MetaGraph`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaGraphDocument {
    /// Changes whenever the topology changes.
    pub version: u64,
    pub indices: BTreeSet<String>,
    /// Alias name to member indices.
    pub aliases: BTreeMap<String, BTreeSet<String>>,
    /// Data stream name to backing indices.
    pub data_streams: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Parents {
    aliases: Vec<String>,
    data_streams: Vec<String>,
}

/// Cluster metadata as consumed by privilege evaluation.
///
/// Indices referenced only as alias members or data stream backing indices
/// are known indices as well.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "MetaGraphDocument", into = "MetaGraphDocument")]
pub struct MetaGraph {
    document: MetaGraphDocument,
    parents: BTreeMap<String, Parents>,
}

impl From<MetaGraphDocument> for MetaGraph {
    fn from(document: MetaGraphDocument) -> Self {
        let mut parents: BTreeMap<String, Parents> = document
            .indices
            .iter()
            .map(|index| (index.clone(), Parents::default()))
            .collect();

        for (alias, members) in &document.aliases {
            for member in members {
                parents
                    .entry(member.clone())
                    .or_default()
                    .aliases
                    .push(alias.clone());
            }
        }
        for (stream, backing) in &document.data_streams {
            for index in backing {
                parents
                    .entry(index.clone())
                    .or_default()
                    .data_streams
                    .push(stream.clone());
            }
        }

        Self { document, parents }
    }
}

impl From<MetaGraph> for MetaGraphDocument {
    fn from(graph: MetaGraph) -> Self {
        graph.document
    }
}

impl MetaGraph {
    pub fn builder() -> MetaGraphBuilder {
        MetaGraphBuilder::default()
    }

    pub fn version(&self) -> u64 {
        self.document.version
    }

    pub fn contains_index(&self, index: &str) -> bool {
        self.parents.contains_key(index)
    }

    /// Members of an alias or backing indices of a data stream.
    pub fn members_of(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.document
            .aliases
            .get(name)
            .or_else(|| self.document.data_streams.get(name))
    }

    /// Aliases containing `index`, sorted.
    pub fn aliases_of(&self, index: &str) -> &[String] {
        self.parents
            .get(index)
            .map_or(&[], |parents| parents.aliases.as_slice())
    }

    /// Data streams backed by `index`, sorted.
    pub fn data_streams_of(&self, index: &str) -> &[String] {
        self.parents
            .get(index)
            .map_or(&[], |parents| parents.data_streams.as_slice())
    }

    /// All known index names.
    pub fn indices(&self) -> impl Iterator<Item = &str> {
        self.parents.keys().map(String::as_str)
    }

    pub fn document(&self) -> &MetaGraphDocument {
        &self.document
    }
}

/// Builder for [`MetaGraph`], mostly for tests and tooling.
#[derive(Debug, Default)]
pub struct MetaGraphBuilder {
    document: MetaGraphDocument,
}

impl MetaGraphBuilder {
    pub fn version(mut self, version: u64) -> Self {
        self.document.version = version;
        self
    }

    pub fn index(mut self, name: impl Into<String>) -> Self {
        self.document.indices.insert(name.into());
        self
    }

    pub fn alias<I, S>(mut self, name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.document
            .aliases
            .entry(name.into())
            .or_default()
            .extend(members.into_iter().map(Into::into));
        self
    }

    pub fn data_stream<I, S>(mut self, name: impl Into<String>, backing: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.document
            .data_streams
            .entry(name.into())
            .or_default()
            .extend(backing.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> MetaGraph {
        MetaGraph::from(self.document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> MetaGraph {
        MetaGraph::builder()
            .version(7)
            .index("standalone")
            .alias("all_logs", ["logs-a", "logs-b"])
            .alias("recent", ["logs-b"])
            .data_stream("metrics", [".ds-metrics-000001"])
            .build()
    }

    #[test]
    fn test_membership() {
        let meta = graph();
        assert_eq!(meta.version(), 7);
        assert!(meta.contains_index("standalone"));
        assert!(meta.contains_index("logs-a"));
        assert!(meta.contains_index(".ds-metrics-000001"));
        assert!(!meta.contains_index("all_logs"));
        assert!(!meta.contains_index("missing"));

        assert_eq!(meta.aliases_of("logs-b"), ["all_logs", "recent"]);
        assert!(meta.aliases_of("standalone").is_empty());
        assert_eq!(meta.data_streams_of(".ds-metrics-000001"), ["metrics"]);
        assert_eq!(meta.members_of("all_logs").map(BTreeSet::len), Some(2));
        assert!(meta.members_of("metrics").is_some());
        assert!(meta.members_of("standalone").is_none());
    }

    #[test]
    fn test_deserialize_builds_reverse_index() {
        let meta: MetaGraph = serde_json::from_str(
            r#"{"version": 2, "aliases": {"a": ["i1"]}, "data_streams": {}}"#,
        )
        .unwrap();
        assert!(meta.contains_index("i1"));
        assert_eq!(meta.aliases_of("i1"), ["a"]);
        assert_eq!(meta.indices().collect::<Vec<_>>(), vec!["i1"]);

        let round_trip: MetaGraph =
            serde_json::from_str(&serde_json::to_string(&meta).unwrap()).unwrap();
        assert_eq!(round_trip, meta);
    }
}
