use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

use crate::types::Pose;

/// Paired source/target capture used as one training example
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub source: Pose,
    pub target: Pose,
}

impl Snapshot {
    pub fn new(source: Pose, target: Pose) -> Self {
        Snapshot { source, target }
    }
}

/// Snapshots keyed by name, iterated in insertion order
///
/// Re-inserting an existing name replaces the snapshot in place, so the
/// regression row order only changes on removal. Serializes as a JSON object
/// whose key order is the insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SnapshotSet {
    entries: Vec<(String, Snapshot)>,
    index: HashMap<String, usize>,
}

impl SnapshotSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite; returns the replaced snapshot, if any.
    pub fn insert(&mut self, name: impl Into<String>, snapshot: Snapshot) -> Option<Snapshot> {
        let name = name.into();
        match self.index.get(&name) {
            Some(&idx) => Some(std::mem::replace(&mut self.entries[idx].1, snapshot)),
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push((name, snapshot));
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Snapshot> {
        let idx = self.index.remove(name)?;
        let (_, snapshot) = self.entries.remove(idx);
        for (_, slot) in self.index.iter_mut() {
            if *slot > idx {
                *slot -= 1;
            }
        }
        Some(snapshot)
    }

    pub fn get(&self, name: &str) -> Option<&Snapshot> {
        self.index.get(name).map(|&idx| &self.entries[idx].1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Snapshot)> {
        self.entries.iter().map(|(name, s)| (name.as_str(), s))
    }

    /// Source and target vectors in matching row order.
    pub fn training_pairs(&self) -> (Vec<Pose>, Vec<Pose>) {
        self.entries
            .iter()
            .map(|(_, s)| (s.source.clone(), s.target.clone()))
            .unzip()
    }
}

impl Serialize for SnapshotSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, snapshot) in &self.entries {
            map.serialize_entry(name, snapshot)?;
        }
        map.end()
    }
}

struct SnapshotSetVisitor;

impl<'de> Visitor<'de> for SnapshotSetVisitor {
    type Value = SnapshotSet;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of snapshot name to {source, target}")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut set = SnapshotSet::new();
        while let Some((name, snapshot)) = access.next_entry::<String, Snapshot>()? {
            set.insert(name, snapshot);
        }
        Ok(set)
    }
}

impl<'de> Deserialize<'de> for SnapshotSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(SnapshotSetVisitor)
    }
}
