//! Virtual file names.
//!
//! A bidirectional index between normalized path names and object ids.
//! Each name points at one object; an object may carry any number of names.
//! Object buckets left empty by a mutation are swept before the mutation
//! returns.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use framevault_common::{Error, ObjectId, Result, VirtualName};

/// Version of the persisted index layout.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Name index of one vault session.
#[derive(Debug, Clone, Default)]
pub struct Vvfs {
    by_name: BTreeMap<VirtualName, ObjectId>,
    by_object: BTreeMap<ObjectId, BTreeSet<VirtualName>>,
}

impl Vvfs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of names.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Point `name` at `id`, replacing any previous association.
    ///
    /// Returns the object the name pointed at before, if it was a different one.
    pub fn link(&mut self, name: VirtualName, id: ObjectId) -> Option<ObjectId> {
        if self.by_name.get(&name) == Some(&id) {
            return None;
        }
        let previous = self.detach(&name);

        debug!(name = %name, object_id = id.short(), "Linking name");
        self.by_object.entry(id.clone()).or_default().insert(name.clone());
        self.by_name.insert(name, id);
        previous
    }

    /// Remove a name.
    ///
    /// # Errors
    /// - Returns `NotFound` if the name is not linked
    pub fn unlink(&mut self, name: &VirtualName) -> Result<ObjectId> {
        self.detach(name)
            .ok_or_else(|| Error::NotFound(format!("Virtual name not found: {}", name)))
    }

    /// Object a name points at.
    ///
    /// # Errors
    /// - Returns `NotFound` if the name is not linked
    pub fn resolve(&self, name: &VirtualName) -> Result<&ObjectId> {
        self.by_name
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("Virtual name not found: {}", name)))
    }

    /// Names pointing at an object.
    ///
    /// # Errors
    /// - Returns `NotFound` if the object has no names
    pub fn reverse(&self, id: &ObjectId) -> Result<&BTreeSet<VirtualName>> {
        self.by_object
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("No virtual names for object {}", id.short())))
    }

    /// All names with their objects, in name order.
    pub fn entries(&self) -> impl Iterator<Item = (&VirtualName, &ObjectId)> {
        self.by_name.iter()
    }

    /// Drop every name whose object fails `keep`. Returns the dropped names.
    pub fn retain_objects<F>(&mut self, mut keep: F) -> Vec<VirtualName>
    where
        F: FnMut(&ObjectId) -> bool,
    {
        let doomed: Vec<VirtualName> = self
            .by_name
            .iter()
            .filter(|(_, id)| !keep(id))
            .map(|(name, _)| name.clone())
            .collect();

        for name in &doomed {
            self.detach(name);
        }
        doomed
    }

    /// Remove object buckets that hold no names. Returns how many were removed.
    pub fn sweep_orphans(&mut self) -> usize {
        let orphans: Vec<ObjectId> = self
            .by_object
            .iter()
            .filter(|(_, names)| names.is_empty())
            .map(|(id, _)| id.clone())
            .collect();

        for id in &orphans {
            self.by_object.remove(id);
        }
        orphans.len()
    }

    fn detach(&mut self, name: &VirtualName) -> Option<ObjectId> {
        let id = self.by_name.remove(name)?;
        if let Some(names) = self.by_object.get_mut(&id) {
            names.remove(name);
        }
        self.sweep_orphans();
        Some(id)
    }

    /// Persistable copy of the index.
    pub fn snapshot(&self) -> VvfsSnapshot {
        VvfsSnapshot {
            version: SNAPSHOT_VERSION,
            names: self.by_name.clone(),
        }
    }

    /// Link every entry of a snapshot whose name is not linked yet.
    ///
    /// Returns the number of names added.
    pub fn merge(&mut self, snapshot: VvfsSnapshot) -> usize {
        let mut added = 0;
        for (name, id) in snapshot.names {
            if !self.by_name.contains_key(&name) {
                self.link(name, id);
                added += 1;
            }
        }
        added
    }
}

/// Serialized form of the index, stored in the bookkeeping object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VvfsSnapshot {
    pub version: u32,
    pub names: BTreeMap<VirtualName, ObjectId>,
}

impl VvfsSnapshot {
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// # Errors
    /// - Returns error on malformed JSON or an unsupported version
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::Serialization(format!(
                "Unsupported name index version {}",
                snapshot.version
            )));
        }
        Ok(snapshot)
    }
}
