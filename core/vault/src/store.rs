//! In-memory object store.
//!
//! Objects are keyed by owner and hold their segments bucketed by offset.
//! Exact duplicate segments (replicas of the same frame) are merged on
//! ingest, so loading a frame once or R times produces the same object.

use std::collections::BTreeMap;
use tracing::debug;

use crate::segment::{decrypt_object, Segment};
use framevault_common::{Error, ObjectId, ObjectRef, Result, SensitiveBytes};
use framevault_crypto::{object_fingerprint, VaultKeys};

/// A content-addressed object and the segments it is rebuilt from.
#[derive(Debug)]
pub struct VaultObject {
    owner: ObjectRef,
    segments: BTreeMap<u64, Vec<Segment>>,
    plaintext: Option<SensitiveBytes>,
}

impl VaultObject {
    /// Create an object with no segments and no plaintext.
    pub fn new(owner: ObjectRef) -> Self {
        Self {
            owner,
            segments: BTreeMap::new(),
            plaintext: None,
        }
    }

    /// Create an object whose plaintext is already known.
    pub fn with_plaintext(owner: ObjectRef, segments: Vec<Segment>, plaintext: &[u8]) -> Self {
        let mut object = Self::new(owner);
        for segment in segments {
            object.add_segment(segment);
        }
        object.plaintext = Some(SensitiveBytes::new(plaintext.to_vec()));
        object
    }

    pub fn owner(&self) -> &ObjectRef {
        &self.owner
    }

    /// Segments in offset order.
    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.values().flatten()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.values().map(Vec::len).sum()
    }

    /// Add a segment unless an identical one is already present.
    ///
    /// Returns `true` if the segment was new.
    pub fn add_segment(&mut self, segment: Segment) -> bool {
        let bucket = self.segments.entry(segment.offset).or_default();
        if bucket.contains(&segment) {
            return false;
        }
        bucket.push(segment);
        true
    }

    /// Reconstructed plaintext, once materialized.
    pub fn plaintext(&self) -> Option<&[u8]> {
        self.plaintext.as_ref().map(SensitiveBytes::as_bytes)
    }

    pub fn is_materialized(&self) -> bool {
        self.plaintext.is_some()
    }

    /// Rebuild the plaintext from the segments.
    ///
    /// Content objects are re-fingerprinted after reconstruction.
    ///
    /// # Errors
    /// - Any error of [`decrypt_object`]
    /// - `Reconstruction` if the plaintext does not hash to the object id
    pub fn materialize(&mut self, keys: &VaultKeys) -> Result<()> {
        let plaintext = SensitiveBytes::new(decrypt_object(self.segments(), keys)?);

        if let ObjectRef::Object(id) = &self.owner {
            let actual = object_fingerprint(keys.object_fingerprint_key(), plaintext.as_bytes())?;
            if &actual != id {
                return Err(Error::Reconstruction(format!(
                    "Object {} reconstructs to content {}",
                    id.short(),
                    actual.short()
                )));
            }
        }

        self.plaintext = Some(plaintext);
        Ok(())
    }
}

/// Outcome of a materialization pass.
#[derive(Debug, Default)]
pub struct Materialized {
    /// Objects rebuilt in this pass.
    pub restored: Vec<ObjectRef>,
    /// Objects removed because they could not be rebuilt.
    pub failed: Vec<(ObjectRef, Error)>,
}

/// All objects of one vault session.
#[derive(Debug, Default)]
pub struct ObjectStore {
    objects: BTreeMap<ObjectRef, VaultObject>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, owner: &ObjectRef) -> bool {
        self.objects.contains_key(owner)
    }

    pub fn get(&self, owner: &ObjectRef) -> Option<&VaultObject> {
        self.objects.get(owner)
    }

    /// Add a decoded segment to its owner, creating the owner on first sight.
    ///
    /// Objects that already hold plaintext take no further segments.
    /// Returns `true` if the segment was kept.
    pub fn ingest(&mut self, segment: Segment) -> bool {
        let owner = segment.owner.clone();
        let object = self
            .objects
            .entry(owner.clone())
            .or_insert_with(|| VaultObject::new(owner));
        if object.is_materialized() {
            return false;
        }
        object.add_segment(segment)
    }

    /// Insert a fully built object, replacing any previous one.
    pub fn insert(&mut self, object: VaultObject) {
        self.objects.insert(object.owner.clone(), object);
    }

    pub fn remove(&mut self, owner: &ObjectRef) -> Option<VaultObject> {
        self.objects.remove(owner)
    }

    /// Objects in owner order. Content objects sort before bookkeeping.
    pub fn objects(&self) -> impl Iterator<Item = &VaultObject> {
        self.objects.values()
    }

    /// Ids of all materialized content objects.
    pub fn object_ids(&self) -> Vec<ObjectId> {
        self.objects
            .values()
            .filter(|object| object.is_materialized())
            .filter_map(|object| object.owner.object_id())
            .cloned()
            .collect()
    }

    /// Consume the store, yielding every segment of every object.
    pub fn into_segments(self) -> impl Iterator<Item = Segment> {
        self.objects
            .into_values()
            .flat_map(|object| object.segments.into_values().flatten())
    }

    /// Rebuild every object that has no plaintext yet.
    ///
    /// Objects that fail are removed from the store and reported; the pass
    /// continues with the rest.
    pub fn materialize_pending(&mut self, keys: &VaultKeys) -> Materialized {
        let pending: Vec<ObjectRef> = self
            .objects
            .iter()
            .filter(|(_, object)| !object.is_materialized())
            .map(|(owner, _)| owner.clone())
            .collect();

        let mut outcome = Materialized::default();
        for owner in pending {
            let result = match self.objects.get_mut(&owner) {
                Some(object) => object.materialize(keys),
                None => continue,
            };
            match result {
                Ok(()) => {
                    debug!(object_id = owner.short(), "Object materialized");
                    outcome.restored.push(owner);
                }
                Err(e) => {
                    self.objects.remove(&owner);
                    outcome.failed.push((owner, e));
                }
            }
        }
        outcome
    }
}
