//! Filesystem storage for rendered artifacts.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const RENDERS_DIR: &str = "renders";

/// Outcome of attempting to persist a new artifact.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum WriteOutcome {
    /// Our bytes were committed.
    Written(PathBuf),
    /// Another writer got there first; our bytes were discarded.
    AlreadyPresent(PathBuf),
}

impl WriteOutcome {
    pub(crate) fn rel_path(&self) -> &Path {
        match self {
            Self::Written(path) | Self::AlreadyPresent(path) => path,
        }
    }
}

/// On-disk store for rendered artifact bytes.
///
/// Artifacts are written to a temp file in the target directory and then
/// persisted with an atomic no-clobber rename. That gives two guarantees the
/// cache depends on:
///
/// - a reader never observes a partially-written artifact (rename is atomic
///   on the same filesystem);
/// - under concurrent renders of the same key, exactly one payload wins and
///   every later writer's bytes are discarded, not mixed in.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open (and create if necessary) an artifact store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let renders = root.join(RENDERS_DIR);
        std::fs::create_dir_all(&renders).or_raise(|| ErrorKind::Artifact(renders.clone()))?;
        Ok(Self { root })
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute(&self, rel_path: &Path) -> PathBuf {
        self.root.join(rel_path)
    }

    /// Persist artifact bytes under the given key digest, unless an artifact
    /// for that digest already exists.
    pub(crate) fn write_new(&self, digest: &str, bytes: &[u8]) -> Result<WriteOutcome> {
        let rel_path = PathBuf::from(RENDERS_DIR).join(format!("{digest}.png"));
        let target = self.absolute(&rel_path);
        // The temp file lives in the same directory as the target so the
        // final rename never crosses a filesystem boundary.
        let dir = self.root.join(RENDERS_DIR);
        let mut tmp = NamedTempFile::new_in(&dir).or_raise(|| ErrorKind::Artifact(dir.clone()))?;
        tmp.write_all(bytes).or_raise(|| ErrorKind::Artifact(target.clone()))?;
        match tmp.persist_noclobber(&target) {
            Ok(_) => Ok(WriteOutcome::Written(rel_path)),
            Err(err) if err.error.kind() == std::io::ErrorKind::AlreadyExists => {
                Ok(WriteOutcome::AlreadyPresent(rel_path))
            },
            Err(err) => Err(err.error).or_raise(|| ErrorKind::Artifact(target)),
        }
    }

    /// Read an artifact's bytes.
    pub fn read(&self, rel_path: &Path) -> Result<Vec<u8>> {
        let path = self.absolute(rel_path);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                exn::bail!(ErrorKind::ArtifactMissing(rel_path.to_path_buf()))
            },
            Err(err) => Err(err).or_raise(|| ErrorKind::Artifact(path)),
        }
    }

    /// Size on disk, for artifacts another writer persisted.
    pub(crate) fn size(&self, rel_path: &Path) -> Result<u64> {
        let path = self.absolute(rel_path);
        let meta = std::fs::metadata(&path).or_raise(|| ErrorKind::ArtifactMissing(rel_path.to_path_buf()))?;
        Ok(meta.len())
    }

    /// Returns `true` if the artifact exists on disk.
    pub fn exists(&self, rel_path: &Path) -> bool {
        self.absolute(rel_path).is_file()
    }

    /// Remove an artifact. Returns `false` if it was already gone, which is
    /// an expected race with concurrent eviction passes, not an error.
    pub fn remove(&self, rel_path: &Path) -> Result<bool> {
        let path = self.absolute(rel_path);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).or_raise(|| ErrorKind::Artifact(path)),
        }
    }
}
