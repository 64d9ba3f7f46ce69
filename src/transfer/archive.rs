//! The transfer artifact: an uncompressed tar of bundle files.
//!
//! Each unit is stored as `<path>.bundle` with `/` separators preserved; the
//! root unit is `..bundle`. Bundles are already compressed, so the tar is
//! not. A `manifest.yaml` entry describes the units but is optional on
//! read: the bundle entries alone are enough to apply an artifact.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::error::{Error, Result};
use crate::model::{CommitId, RepoPath, TransferKind, TransferUnit};

pub const MANIFEST_NAME: &str = "manifest.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: RepoPath,
    #[serde(flatten)]
    pub kind: TransferKind,
    pub target: CommitId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<CommitId>,
    pub target: CommitId,
    pub units: Vec<ManifestEntry>,
}

/// Units destined for one artifact, at most one per repository path.
#[derive(Debug, Clone, Default)]
pub struct TransferArtifact {
    units: Vec<TransferUnit>,
}

impl TransferArtifact {
    pub fn insert(&mut self, unit: TransferUnit) -> Result<()> {
        if self.units.iter().any(|u| u.path == unit.path) {
            return Err(Error::DuplicateUnit(unit.path));
        }
        self.units.push(unit);
        Ok(())
    }

    pub fn units(&self) -> &[TransferUnit] {
        &self.units
    }

    pub fn root_unit(&self) -> Option<&TransferUnit> {
        self.units.iter().find(|u| u.is_root())
    }

    pub fn manifest(&self, baseline: Option<&CommitId>) -> Option<ArtifactManifest> {
        let root = self.root_unit()?;
        Some(ArtifactManifest {
            created_at: Utc::now(),
            baseline: baseline.cloned(),
            target: root.target.clone(),
            units: self
                .ordered()
                .map(|u| ManifestEntry {
                    path: u.path.clone(),
                    kind: u.kind.clone(),
                    target: u.target.clone(),
                })
                .collect(),
        })
    }

    /// Root first, then the rest in insertion order.
    fn ordered(&self) -> impl Iterator<Item = &TransferUnit> {
        self.root_unit()
            .into_iter()
            .chain(self.units.iter().filter(|u| !u.is_root()))
    }

    /// Write the artifact as a tar stream.
    pub fn pack<W: Write>(&self, manifest: Option<&ArtifactManifest>, writer: W) -> Result<W> {
        let mut builder = tar::Builder::new(writer);
        for unit in self.ordered() {
            tracing::info!("packing {}", unit.path.bundle_name());
            let mut payload = File::open(&unit.payload)
                .map_err(|e| Error::malformed(&unit.payload, e.to_string()))?;
            builder.append_file(unit.path.bundle_name(), &mut payload)?;
        }
        if let Some(manifest) = manifest {
            let content = serde_yaml::to_string(manifest)?;
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(manifest.created_at.timestamp().max(0) as u64);
            header.set_cksum();
            builder.append_data(&mut header, MANIFEST_NAME, content.as_bytes())?;
        }
        Ok(builder.into_inner()?)
    }

    pub fn pack_to_file(&self, manifest: Option<&ArtifactManifest>, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = self.pack(manifest, BufWriter::new(file))?;
        writer.flush()?;
        Ok(())
    }
}

/// An artifact extracted into a temporary directory, removed on drop.
#[derive(Debug)]
pub struct UnpackedArtifact {
    dir: TempDir,
    units: BTreeMap<RepoPath, PathBuf>,
    manifest: Option<ArtifactManifest>,
}

impl UnpackedArtifact {
    /// Extract a tar stream into a fresh directory under `scratch` (or the
    /// system temp dir).
    pub fn unpack<R: Read>(reader: R, scratch: Option<&Path>) -> Result<Self> {
        let dir = match scratch {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                TempDir::new_in(parent)?
            }
            None => TempDir::new()?,
        };
        let mut units = BTreeMap::new();
        let mut manifest = None;

        let mut archive = tar::Archive::new(reader);
        for entry in archive.entries()? {
            let mut entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let name = entry.path()?.to_string_lossy().into_owned();
            let name = name.strip_prefix("./").map(str::to_string).unwrap_or(name);

            if name == MANIFEST_NAME {
                let mut content = String::new();
                entry.read_to_string(&mut content)?;
                match serde_yaml::from_str(&content) {
                    Ok(parsed) => manifest = Some(parsed),
                    Err(e) => tracing::warn!("ignoring unreadable {}: {}", MANIFEST_NAME, e),
                }
                continue;
            }
            let Some(path) = RepoPath::from_bundle_name(&name) else {
                tracing::warn!("ignoring unexpected artifact entry {}", name);
                continue;
            };
            if units.contains_key(&path) {
                return Err(Error::DuplicateUnit(path));
            }
            if !entry.unpack_in(dir.path())? {
                tracing::warn!("ignoring artifact entry {} outside the extraction dir", name);
                continue;
            }
            units.insert(path, dir.path().join(&name));
        }

        Ok(UnpackedArtifact {
            dir,
            units,
            manifest,
        })
    }

    pub fn unpack_file(path: &Path, scratch: Option<&Path>) -> Result<Self> {
        let file = File::open(path)?;
        Self::unpack(BufReader::new(file), scratch).map_err(|e| match e {
            Error::Io(io) => Error::malformed(path, io.to_string()),
            other => other,
        })
    }

    /// Bundle file for `path`, if the artifact carries one.
    pub fn unit(&self, path: &RepoPath) -> Option<&Path> {
        self.units.get(path).map(PathBuf::as_path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &RepoPath> {
        self.units.keys()
    }

    pub fn manifest(&self) -> Option<&ArtifactManifest> {
        self.manifest.as_ref()
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}
