//! Artifact store: durable key/blob storage for task outputs.
//!
//! Artifacts are how tasks exchange bulk data; the notification bus only
//! ever carries references to them. Artifacts are immutable once written:
//! a task that needs to re-produce one writes under a new key, never over
//! an old one. The store itself has no orchestration logic, and artifacts
//! outlive the team that produced them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use crate::core::task::TaskId;
use crate::core::team::TeamId;
use crate::error::{Error, Result};

/// Key identifying one immutable artifact.
///
/// Rendered as `{team-id}/{producer-task-id}/{logical-name}`, which is
/// also the relative filesystem path used by [`FsArtifactStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
    /// The team namespace the artifact belongs to.
    pub team: TeamId,
    /// The task that produced the artifact.
    pub producer: TaskId,
    /// Logical name including extension, e.g. `prices.json`.
    pub name: String,
}

impl ArtifactKey {
    /// Create a new artifact key.
    pub fn new(team: TeamId, producer: TaskId, name: &str) -> Self {
        Self {
            team,
            producer,
            name: name.to_string(),
        }
    }

    /// Relative path under a store root: `team/producer/name`.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(self.team.to_string())
            .join(self.producer.to_string())
            .join(&self.name)
    }
}

impl std::fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.team, self.producer, self.name)
    }
}

/// Metadata describing a stored artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub key: ArtifactKey,
    pub size: u64,
    pub content_type: String,
    pub generated_at: DateTime<Utc>,
}

/// Metadata block inside a structured JSON artifact payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub producer: TaskId,
    pub generated_at: DateTime<Utc>,
    pub record_count: usize,
}

/// JSON envelope for structured artifact payloads:
/// `{type, records, metadata: {producer, generated_at, record_count}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactDocument {
    #[serde(rename = "type")]
    pub doc_type: String,
    pub records: Vec<serde_json::Value>,
    pub metadata: DocumentMetadata,
}

impl ArtifactDocument {
    /// Create a new document; `record_count` is derived from the records.
    pub fn new(doc_type: &str, producer: TaskId, records: Vec<serde_json::Value>) -> Self {
        let record_count = records.len();
        Self {
            doc_type: doc_type.to_string(),
            records,
            metadata: DocumentMetadata {
                producer,
                generated_at: Utc::now(),
                record_count,
            },
        }
    }

    /// Serialize the document to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parse a document from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// The storage contract tasks and the coordinator rely on.
///
/// Writers never overwrite: `put` on an existing key fails with
/// `ArtifactExists`. Reads need no coordination because written blobs
/// never change.
pub trait ArtifactStore: Send + Sync {
    /// Store a payload under a key. Fails if the key already exists.
    fn put(&self, key: &ArtifactKey, content_type: &str, payload: &[u8]) -> Result<ArtifactMeta>;

    /// Fetch the payload stored under a key.
    fn get(&self, key: &ArtifactKey) -> Result<Vec<u8>>;

    /// Fetch the metadata stored under a key.
    fn meta(&self, key: &ArtifactKey) -> Result<ArtifactMeta>;

    /// Check whether a key exists.
    fn contains(&self, key: &ArtifactKey) -> bool;

    /// All keys in a team's namespace.
    fn list_team(&self, team: &TeamId) -> Vec<ArtifactKey>;
}

/// In-memory artifact store for tests and embedded use.
#[derive(Default)]
pub struct MemoryArtifactStore {
    blobs: Mutex<HashMap<ArtifactKey, (ArtifactMeta, Vec<u8>)>>,
}

impl MemoryArtifactStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored artifacts.
    pub fn len(&self) -> usize {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn put(&self, key: &ArtifactKey, content_type: &str, payload: &[u8]) -> Result<ArtifactMeta> {
        let mut blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        if blobs.contains_key(key) {
            return Err(Error::ArtifactExists(key.to_string()));
        }
        let meta = ArtifactMeta {
            key: key.clone(),
            size: payload.len() as u64,
            content_type: content_type.to_string(),
            generated_at: Utc::now(),
        };
        blobs.insert(key.clone(), (meta.clone(), payload.to_vec()));
        Ok(meta)
    }

    fn get(&self, key: &ArtifactKey) -> Result<Vec<u8>> {
        let blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        blobs
            .get(key)
            .map(|(_, payload)| payload.clone())
            .ok_or_else(|| Error::ArtifactNotFound(key.to_string()))
    }

    fn meta(&self, key: &ArtifactKey) -> Result<ArtifactMeta> {
        let blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        blobs
            .get(key)
            .map(|(meta, _)| meta.clone())
            .ok_or_else(|| Error::ArtifactNotFound(key.to_string()))
    }

    fn contains(&self, key: &ArtifactKey) -> bool {
        let blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        blobs.contains_key(key)
    }

    fn list_team(&self, team: &TeamId) -> Vec<ArtifactKey> {
        let blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<ArtifactKey> = blobs
            .keys()
            .filter(|key| key.team == *team)
            .cloned()
            .collect();
        keys.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
        keys
    }
}

/// Filesystem-backed artifact store.
///
/// Blobs live at `{root}/{team}/{producer}/{name}`; a `.meta.json`
/// sidecar next to each blob holds its [`ArtifactMeta`].
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Create a store rooted at the given directory, creating it if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    fn meta_path(&self, key: &ArtifactKey) -> PathBuf {
        let mut path = self.blob_path(key).into_os_string();
        path.push(".meta.json");
        PathBuf::from(path)
    }
}

impl ArtifactStore for FsArtifactStore {
    fn put(&self, key: &ArtifactKey, content_type: &str, payload: &[u8]) -> Result<ArtifactMeta> {
        let blob_path = self.blob_path(key);
        if blob_path.exists() {
            return Err(Error::ArtifactExists(key.to_string()));
        }
        if let Some(parent) = blob_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let meta = ArtifactMeta {
            key: key.clone(),
            size: payload.len() as u64,
            content_type: content_type.to_string(),
            generated_at: Utc::now(),
        };
        std::fs::write(&blob_path, payload)?;
        std::fs::write(self.meta_path(key), serde_json::to_vec_pretty(&meta)?)?;
        Ok(meta)
    }

    fn get(&self, key: &ArtifactKey) -> Result<Vec<u8>> {
        let path = self.blob_path(key);
        if !path.exists() {
            return Err(Error::ArtifactNotFound(key.to_string()));
        }
        Ok(std::fs::read(path)?)
    }

    fn meta(&self, key: &ArtifactKey) -> Result<ArtifactMeta> {
        let path = self.meta_path(key);
        if !path.exists() {
            return Err(Error::ArtifactNotFound(key.to_string()));
        }
        Ok(serde_json::from_slice(&std::fs::read(path)?)?)
    }

    fn contains(&self, key: &ArtifactKey) -> bool {
        self.blob_path(key).exists()
    }

    fn list_team(&self, team: &TeamId) -> Vec<ArtifactKey> {
        let team_dir = self.root.join(team.to_string());
        let mut keys = Vec::new();
        let producers = match std::fs::read_dir(&team_dir) {
            Ok(entries) => entries,
            Err(_) => return keys,
        };
        for producer_entry in producers.flatten() {
            let producer = match TaskId::from_str(&producer_entry.file_name().to_string_lossy()) {
                Ok(id) => id,
                Err(_) => continue,
            };
            let files = match std::fs::read_dir(producer_entry.path()) {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            for file_entry in files.flatten() {
                let name = file_entry.file_name().to_string_lossy().to_string();
                if name.ends_with(".meta.json") {
                    continue;
                }
                keys.push(ArtifactKey::new(*team, producer, &name));
            }
        }
        keys.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
        keys
    }
}
