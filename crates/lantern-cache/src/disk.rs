//! Directory-backed cache store.
//!
//! Each generation lives in `<root>/<urlencoded name>.json`. Writes go to a
//! temporary file first and are renamed into place, so a crash never leaves a
//! half-written generation behind. A file that no longer parses still counts
//! as a generation for `keys`, `has` and `delete`, so it can be collected.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::{check_quota, CacheEntry, CacheError, CacheStore, Generation, RequestKey};

const EXTENSION: &str = "json";

#[derive(Serialize, Deserialize)]
struct GenerationFile {
    name: String,
    created_at: u64,
    entries: Vec<CacheEntry>,
}

impl From<&Generation> for GenerationFile {
    fn from(generation: &Generation) -> Self {
        Self {
            name: generation.name.clone(),
            created_at: generation.created_at,
            entries: generation.entries().cloned().collect(),
        }
    }
}

impl From<GenerationFile> for Generation {
    fn from(file: GenerationFile) -> Self {
        let mut generation = Generation::new(&file.name);
        generation.created_at = file.created_at;
        for entry in file.entries {
            generation.put(entry);
        }
        generation
    }
}

/// Generations persisted as JSON files under a directory.
#[derive(Debug)]
pub struct DiskStore {
    root: PathBuf,
    quota_bytes: Option<u64>,
    // Serializes read-modify-write cycles on generation files.
    lock: Mutex<()>,
}

impl DiskStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl AsRef<Path>, quota_bytes: Option<u64>) -> Result<Self, CacheError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), "DiskStore opened");
        Ok(Self {
            root,
            quota_bytes,
            lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root
            .join(format!("{}.{EXTENSION}", urlencoding::encode(name)))
    }

    async fn read(&self, name: &str) -> Result<Option<Generation>, CacheError> {
        read_file(&self.path_for(name)).await
    }

    async fn write(&self, generation: &Generation) -> Result<(), CacheError> {
        let path = self.path_for(&generation.name);
        let tmp = path.with_extension("tmp");
        let json = serde_json::to_vec(&GenerationFile::from(generation))?;
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;
        trace!(generation = %generation.name, entries = generation.len(), "Generation written");
        Ok(())
    }

    /// Every generation file on disk with its contents, in creation order.
    ///
    /// Files that fail to parse are still listed, with no contents, ahead of
    /// the readable ones, so they can be deleted.
    async fn scan(&self) -> Result<Vec<(String, Option<Generation>)>, CacheError> {
        let mut found = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(name) = name_from_path(&path) else {
                warn!(path = %path.display(), "Skipping file with undecodable name");
                continue;
            };
            match read_file(&path).await {
                Ok(Some(generation)) => found.push((name, Some(generation))),
                Ok(None) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Generation file is unreadable");
                    found.push((name, None));
                }
            }
        }
        found.sort_by(|(a_name, a), (b_name, b)| {
            let created = |g: &Option<Generation>| g.as_ref().map_or(0, |g| g.created_at);
            created(a)
                .cmp(&created(b))
                .then_with(|| a_name.cmp(b_name))
        });
        Ok(found)
    }

    /// Every readable generation, in creation order.
    async fn load_all(&self) -> Result<Vec<Generation>, CacheError> {
        Ok(self
            .scan()
            .await?
            .into_iter()
            .filter_map(|(_, generation)| generation)
            .collect())
    }
}

fn name_from_path(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    urlencoding::decode(stem).ok().map(|name| name.into_owned())
}

async fn read_file(path: &Path) -> Result<Option<Generation>, CacheError> {
    match fs::read(path).await {
        Ok(bytes) => {
            let file: GenerationFile = serde_json::from_slice(&bytes)?;
            Ok(Some(file.into()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl CacheStore for DiskStore {
    async fn open(&self, name: &str) -> Result<(), CacheError> {
        let _guard = self.lock.lock().await;
        if self.read(name).await?.is_none() {
            self.write(&Generation::new(name)).await?;
        }
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool, CacheError> {
        Ok(fs::try_exists(self.path_for(name)).await?)
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.scan().await?.into_iter().map(|(name, _)| name).collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let _guard = self.lock.lock().await;
        match fs::remove_file(self.path_for(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn match_in(
        &self,
        name: &str,
        key: &RequestKey,
    ) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self
            .read(name)
            .await?
            .and_then(|g| g.match_request(key).cloned()))
    }

    async fn match_any(&self, key: &RequestKey) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self
            .load_all()
            .await?
            .iter()
            .find_map(|g| g.match_request(key).cloned()))
    }

    async fn put(&self, name: &str, entry: CacheEntry) -> Result<(), CacheError> {
        let _guard = self.lock.lock().await;

        if self.quota_bytes.is_some() {
            let key = entry.key();
            let all = self.load_all().await?;
            let used: u64 = all.iter().map(Generation::size).sum();
            let replaced = all
                .iter()
                .find(|g| g.name == name)
                .and_then(|g| g.match_request(&key))
                .map(CacheEntry::size)
                .unwrap_or(0);
            check_quota(self.quota_bytes, used - replaced, entry.size())?;
        }

        let mut generation = self
            .read(name)
            .await?
            .unwrap_or_else(|| Generation::new(name));
        generation.put(entry);
        self.write(&generation).await
    }

    async fn entries(&self, name: &str) -> Result<Vec<RequestKey>, CacheError> {
        Ok(self
            .read(name)
            .await?
            .map(|g| g.keys())
            .unwrap_or_default())
    }
}
