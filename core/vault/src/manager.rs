//! Vault manager: the open vault and its operations.
//!
//! The manager owns the session keys, the object store and the name index,
//! and is the only component that touches the filesystem.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, info_span, warn};

use crate::config::VaultConfig;
use crate::frame::FrameCodec;
use crate::report::{DroppedObject, ExtractReport, LoadReport, SaveReport};
use crate::segment::{encrypt_object, Segment};
use crate::session::{SessionHandle, VaultSession};
use crate::store::{ObjectStore, VaultObject};
use crate::vvfs::{Vvfs, VvfsSnapshot};
use framevault_common::{Error, ObjectId, ObjectRef, Result, VirtualName};
use framevault_crypto::{object_fingerprint, VaultKeys};
use framevault_storage::{ArchiveReader, ArchiveWriter};

/// An open vault.
pub struct VaultManager {
    config: VaultConfig,
    session: VaultSession,
    store: ObjectStore,
    vvfs: Vvfs,
}

impl VaultManager {
    /// Open a vault, optionally loading an existing archive into it.
    ///
    /// Load problems below the I/O level are logged and skipped. Callers that
    /// want the [`LoadReport`] open with `None` and call [`load`](Self::load).
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Archive file missing or unreadable
    /// - Empty passphrase or key derivation failure
    pub fn open(passphrase: &[u8], existing: Option<&Path>, config: VaultConfig) -> Result<Self> {
        config.validate()?;
        if let Some(path) = existing {
            // Fail on a missing archive before paying for key derivation.
            fs::metadata(path)?;
        }

        let session = VaultSession::unlock(passphrase, &config)?;
        let mut manager = Self::from_session(session, config);
        info!(session = %manager.session.handle(), "Vault opened");

        if let Some(path) = existing {
            let report = manager.load(path)?;
            if !report.is_clean() {
                warn!(
                    rejected_lines = report.rejected_lines.len(),
                    dropped_objects = report.dropped.len(),
                    pruned_names = report.names_pruned.len(),
                    "Archive loaded with losses"
                );
            }
        }
        Ok(manager)
    }

    /// Open a vault from an already-derived key bundle.
    pub fn with_keys(keys: VaultKeys, config: VaultConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_session(VaultSession::from_keys(keys), config))
    }

    fn from_session(session: VaultSession, config: VaultConfig) -> Self {
        Self {
            config,
            session,
            store: ObjectStore::new(),
            vvfs: Vvfs::new(),
        }
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn session_handle(&self) -> &SessionHandle {
        self.session.handle()
    }

    pub fn is_locked(&self) -> bool {
        !self.session.is_active()
    }

    fn ensure_unlocked(&self) -> Result<()> {
        self.session.keys().map(|_| ())
    }

    /// Erase keys, plaintexts and names. Every later operation fails.
    pub fn lock(&mut self) {
        self.session.lock();
        self.store = ObjectStore::new();
        self.vvfs = Vvfs::new();
        info!(session = %self.session.handle(), "Vault locked");
    }

    /// Load an archive file and merge it into the vault.
    ///
    /// # Errors
    /// - I/O failure opening or reading the file
    /// - `NotPermitted` if the vault is locked
    pub fn load(&mut self, path: &Path) -> Result<LoadReport> {
        let file = File::open(path)?;
        debug!(path = %path.display(), "Loading archive");
        self.load_from(BufReader::new(file))
    }

    /// Load an archive from any buffered reader.
    ///
    /// Lines are decoded independently; a rejected line never affects another.
    /// Objects that cannot be rebuilt are dropped. Names already linked in
    /// this session win over names from the archive.
    ///
    /// Segments are staged until the whole stream has been read, so a read
    /// error leaves the vault as it was before the call.
    pub fn load_from<R: BufRead>(&mut self, input: R) -> Result<LoadReport> {
        let _span = info_span!("load", session = %self.session.handle()).entered();
        let keys = self.session.keys()?;
        let codec = FrameCodec::new(self.config.frame_layout, keys.frame_authentication_key());
        let mut report = LoadReport::default();
        let mut staged = ObjectStore::new();

        let mut reader = ArchiveReader::new(input);
        while let Some(line) = reader.next() {
            report.lines_read += 1;
            let line = match line {
                Ok(line) => line,
                Err(Error::Format(message)) => {
                    warn!(line = reader.lines_read(), error = %message, "Skipping unreadable line");
                    report.rejected_lines.push(reader.lines_read());
                    continue;
                }
                Err(e) => {
                    warn!(line = reader.lines_read(), error = %e, "Archive read failed");
                    return Err(e);
                }
            };

            match codec.decode(&line.bytes) {
                Ok(frame) => {
                    report.frames_accepted += 1;
                    if frame.legacy {
                        report.legacy_frames += 1;
                    }
                    if !staged.ingest(frame.segment) {
                        report.duplicate_frames += 1;
                    }
                }
                Err(e) => {
                    warn!(line = line.number, error = %e, "Skipping invalid frame");
                    report.rejected_lines.push(line.number);
                }
            }
        }

        report.blank_lines = reader.blank_lines();

        for segment in staged.into_segments() {
            if !self.store.ingest(segment) {
                report.duplicate_frames += 1;
            }
        }

        let outcome = self.store.materialize_pending(keys);
        report.objects_restored = outcome.restored.iter().filter(|o| o.object_id().is_some()).count();
        for (owner, e) in outcome.failed {
            warn!(object_id = owner.short(), error = %e, "Dropping object");
            report.dropped.push(DroppedObject {
                owner,
                reason: e.to_string(),
            });
        }

        self.restore_bookkeeping(&mut report);

        let store = &self.store;
        report.names_pruned = self
            .vvfs
            .retain_objects(|id| store.contains(&ObjectRef::Object(id.clone())));
        for name in &report.names_pruned {
            warn!(name = %name, "Pruning name of missing object");
        }

        info!(
            lines = report.lines_read,
            frames = report.frames_accepted,
            rejected = report.rejected_lines.len(),
            restored = report.objects_restored,
            dropped = report.dropped.len(),
            names = report.names_restored,
            "Archive loaded"
        );
        Ok(report)
    }

    fn restore_bookkeeping(&mut self, report: &mut LoadReport) {
        let Some(bookkeeping) = self.store.remove(&ObjectRef::Bookkeeping) else {
            return;
        };
        let Some(index) = bookkeeping.plaintext() else {
            return;
        };

        match VvfsSnapshot::from_json(index) {
            Ok(snapshot) => {
                report.bookkeeping_restored = true;
                report.names_restored = self.vvfs.merge(snapshot);
            }
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable name index");
                report.dropped.push(DroppedObject {
                    owner: ObjectRef::Bookkeeping,
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Store a plaintext under a virtual name.
    ///
    /// Identical content is stored once; a second put of the same bytes only
    /// adds the name.
    ///
    /// # Errors
    /// - Invalid virtual name
    /// - `NotPermitted` if the vault is locked
    pub fn put(&mut self, plaintext: &[u8], name: &str) -> Result<ObjectId> {
        let name = VirtualName::parse(name)?;
        let keys = self.session.keys()?;
        let id = object_fingerprint(keys.object_fingerprint_key(), plaintext)?;
        let owner = ObjectRef::from(id.clone());

        if self.store.contains(&owner) {
            debug!(object_id = id.short(), "Content already stored");
        } else {
            let segments = encrypt_object(
                plaintext,
                &owner,
                self.config.chunk_size,
                self.config.cipher_mode,
                keys,
            )?;
            self.store
                .insert(VaultObject::with_plaintext(owner, segments, plaintext));
        }

        info!(name = %name, object_id = id.short(), size = plaintext.len(), "Object stored");
        self.vvfs.link(name, id.clone());
        Ok(id)
    }

    /// Write the whole vault to an archive file.
    ///
    /// The file is replaced, not appended to, and is only as atomic as the
    /// underlying writes.
    pub fn save(&self, path: &Path) -> Result<SaveReport> {
        let file = File::create(path)?;
        debug!(path = %path.display(), "Saving archive");
        self.save_to(BufWriter::new(file))
    }

    /// Write the whole vault to any writer.
    ///
    /// Every segment becomes one frame written `replicas` times; each object
    /// ends with a separator run and a flush. The name index follows the
    /// content objects as the bookkeeping object.
    pub fn save_to<W: Write>(&self, output: W) -> Result<SaveReport> {
        let _span = info_span!("save", session = %self.session.handle()).entered();
        let keys = self.session.keys()?;
        let codec = FrameCodec::new(self.config.frame_layout, keys.frame_authentication_key());
        let mut writer = ArchiveWriter::new(output, self.config.replicas, self.config.separator_lines)?;
        let mut report = SaveReport::default();

        // The name index is always written fresh from the vvfs below.
        for object in self.store.objects().filter(|o| o.owner().object_id().is_some()) {
            report.segments += write_object(&mut writer, &codec, object.segments())?;
            report.objects += 1;
        }

        if !self.vvfs.is_empty() {
            let index = self.vvfs.snapshot().to_json()?;
            let segments = encrypt_object(
                &index,
                &ObjectRef::Bookkeeping,
                self.config.chunk_size,
                self.config.cipher_mode,
                keys,
            )?;
            report.segments += write_object(&mut writer, &codec, segments.iter())?;
            report.bookkeeping = true;
        }

        report.lines_written = writer.lines_written();
        writer.finish()?;

        info!(
            objects = report.objects,
            segments = report.segments,
            lines = report.lines_written,
            "Archive saved"
        );
        Ok(report)
    }

    /// Write every object's plaintext below `dest`.
    ///
    /// Objects are written once per virtual name, or under their id when
    /// they have none. A failed write is reported and the rest continue.
    ///
    /// # Errors
    /// - `dest` cannot be created
    /// - `NotPermitted` if the vault is locked
    pub fn extract(&self, dest: &Path) -> Result<ExtractReport> {
        let _span = info_span!("extract", session = %self.session.handle()).entered();
        self.ensure_unlocked()?;
        fs::create_dir_all(dest)?;
        let mut report = ExtractReport::default();

        for object in self.store.objects() {
            let Some(id) = object.owner().object_id() else {
                continue;
            };
            let Some(plaintext) = object.plaintext() else {
                warn!(object_id = id.short(), "Skipping object without plaintext");
                report.skipped.push(id.clone());
                continue;
            };

            let targets: Vec<PathBuf> = match self.vvfs.reverse(id) {
                Ok(names) => names.iter().map(|name| dest.join(name.to_relative_path())).collect(),
                Err(_) => vec![dest.join(id.as_str())],
            };

            for target in targets {
                match write_file(&target, plaintext) {
                    Ok(()) => report.written.push(target),
                    Err(e) => {
                        warn!(path = %target.display(), error = %e, "Extraction failed");
                        report.failed.push((target, e.to_string()));
                    }
                }
            }
        }

        info!(
            written = report.written.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Vault extracted"
        );
        Ok(report)
    }

    /// Object a virtual name points at.
    ///
    /// # Errors
    /// - `NotFound` if the name is not linked
    pub fn resolve(&self, name: &str) -> Result<ObjectId> {
        self.ensure_unlocked()?;
        let name = VirtualName::parse(name)?;
        self.vvfs.resolve(&name).cloned()
    }

    /// Virtual names of an object, in name order.
    ///
    /// # Errors
    /// - `NotFound` if the object has no names
    pub fn reverse(&self, id: &ObjectId) -> Result<Vec<VirtualName>> {
        self.ensure_unlocked()?;
        Ok(self.vvfs.reverse(id)?.iter().cloned().collect())
    }

    /// Remove a virtual name. The object itself stays in the vault.
    pub fn unlink(&mut self, name: &str) -> Result<ObjectId> {
        self.ensure_unlocked()?;
        let name = VirtualName::parse(name)?;
        let id = self.vvfs.unlink(&name)?;
        info!(name = %name, object_id = id.short(), "Name unlinked");
        Ok(id)
    }

    /// Plaintext behind a virtual name.
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        let id = self.resolve(name)?;
        self.read_object(&id)
    }

    /// Plaintext of an object.
    ///
    /// # Errors
    /// - `NotFound` if the object is not in the vault
    pub fn read_object(&self, id: &ObjectId) -> Result<Vec<u8>> {
        self.ensure_unlocked()?;
        self.store
            .get(&ObjectRef::Object(id.clone()))
            .and_then(VaultObject::plaintext)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| Error::NotFound(format!("Object not found: {}", id.short())))
    }

    /// Ids of all content objects.
    pub fn object_ids(&self) -> Vec<ObjectId> {
        self.store.object_ids()
    }

    /// All virtual names, in name order.
    pub fn names(&self) -> Vec<VirtualName> {
        self.vvfs.entries().map(|(name, _)| name.clone()).collect()
    }
}

fn write_object<'s, W: Write>(
    writer: &mut ArchiveWriter<W>,
    codec: &FrameCodec<'_>,
    segments: impl Iterator<Item = &'s Segment>,
) -> Result<usize> {
    let mut count = 0;
    for segment in segments {
        writer.write_frame(&codec.encode(segment)?)?;
        count += 1;
    }
    writer.end_object()?;
    Ok(count)
}

fn write_file(target: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(target, contents)?;
    Ok(())
}
