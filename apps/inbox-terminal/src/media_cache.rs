//! Disk-backed media cache with JSON metadata index and LRU eviction.

use std::{
    collections::HashMap,
    fs,
    hash::{Hash, Hasher},
    io,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use inbox_core::{ConversationId, MediaBlob};
use serde::{Deserialize, Serialize};
use tracing::debug;

const INDEX_FILE: &str = "index.json";
const FALLBACK_EXTENSION: &str = "bin";

#[derive(Debug, Clone)]
pub struct MediaCache {
    root: PathBuf,
    index_path: PathBuf,
    capacity_bytes: u64,
    index: CacheIndex,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CacheIndex {
    entries: HashMap<String, CacheEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    key: String,
    path: String,
    size: u64,
    last_access_ms: u64,
}

impl MediaCache {
    /// Open (or create) the cache rooted at `root`, trimming it to `capacity_bytes`.
    pub fn open(root: &Path, capacity_bytes: u64) -> io::Result<Self> {
        fs::create_dir_all(root)?;
        let index_path = root.join(INDEX_FILE);
        let index = load_index(&index_path).unwrap_or_default();

        let mut cache = Self {
            root: root.to_path_buf(),
            index_path,
            capacity_bytes: capacity_bytes.max(1),
            index,
        };
        cache.prune_missing_files();
        cache.evict_if_needed(None)?;
        cache.persist_index()?;
        Ok(cache)
    }

    /// Cached path for an attachment, refreshing its access time.
    pub fn get(&mut self, conversation_id: ConversationId, file_token: &str) -> Option<PathBuf> {
        let key = cache_key(conversation_id, file_token);
        let entry = self.index.entries.get_mut(&key)?;
        let path = self.root.join(&entry.path);
        if !path.exists() {
            self.index.entries.remove(&key);
            let _ = self.persist_index();
            return None;
        }
        entry.last_access_ms = now_millis();
        let _ = self.persist_index();
        Some(path)
    }

    /// Store a downloaded attachment and return its path on disk.
    pub fn insert(&mut self, media: &MediaBlob) -> io::Result<PathBuf> {
        let key = cache_key(media.conversation_id, &media.file_token);
        let ext = extension_from_token(&media.file_token)
            .or_else(|| extension_from_content_type(media.content_type.as_deref()))
            .unwrap_or(FALLBACK_EXTENSION);
        let file_name = format!("{:016x}.{ext}", stable_hash(&key));
        let absolute_path = self.root.join(&file_name);

        fs::write(&absolute_path, &media.bytes)?;
        self.index.entries.insert(
            key.clone(),
            CacheEntry {
                key: key.clone(),
                path: file_name,
                size: media.bytes.len() as u64,
                last_access_ms: now_millis(),
            },
        );

        self.evict_if_needed(Some(&key))?;
        self.persist_index()?;
        debug!(%key, size = media.bytes.len(), "media cached");
        Ok(absolute_path)
    }

    pub fn total_size_bytes(&self) -> u64 {
        self.index.entries.values().map(|entry| entry.size).sum()
    }

    fn evict_if_needed(&mut self, protected_key: Option<&str>) -> io::Result<()> {
        while self.total_size_bytes() > self.capacity_bytes {
            let Some(evict_key) = self
                .index
                .entries
                .values()
                .filter(|entry| Some(entry.key.as_str()) != protected_key)
                .min_by_key(|entry| entry.last_access_ms)
                .map(|entry| entry.key.clone())
            else {
                break;
            };

            if let Some(entry) = self.index.entries.remove(&evict_key) {
                debug!(key = %evict_key, size = entry.size, "media evicted");
                match fs::remove_file(self.root.join(entry.path)) {
                    Ok(()) => {}
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => return Err(err),
                }
            }
        }
        Ok(())
    }

    fn prune_missing_files(&mut self) {
        self.index
            .entries
            .retain(|_, entry| self.root.join(&entry.path).exists());
    }

    fn persist_index(&self) -> io::Result<()> {
        let encoded = serde_json::to_vec_pretty(&self.index)
            .map_err(|err| io::Error::other(err.to_string()))?;
        fs::write(&self.index_path, encoded)
    }
}

fn cache_key(conversation_id: ConversationId, file_token: &str) -> String {
    format!("{conversation_id}/{file_token}")
}

fn load_index(path: &Path) -> Option<CacheIndex> {
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice::<CacheIndex>(&bytes).ok()
}

fn extension_from_token(file_token: &str) -> Option<&'static str> {
    let (_, ext) = file_token.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("jpg"),
        "png" => Some("png"),
        "gif" => Some("gif"),
        "webp" => Some("webp"),
        "mp4" => Some("mp4"),
        "ogg" | "oga" => Some("ogg"),
        "mp3" => Some("mp3"),
        "pdf" => Some("pdf"),
        "txt" => Some("txt"),
        _ => None,
    }
}

fn extension_from_content_type(content_type: Option<&str>) -> Option<&'static str> {
    let essence = content_type?.split(';').next()?.trim().to_ascii_lowercase();
    match essence.as_str() {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "video/mp4" => Some("mp4"),
        "audio/ogg" => Some("ogg"),
        "audio/mpeg" => Some("mp3"),
        "application/pdf" => Some("pdf"),
        "text/plain" => Some("txt"),
        _ => None,
    }
}

fn stable_hash(key: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(conversation_id: ConversationId, token: &str, size: usize) -> MediaBlob {
        MediaBlob {
            conversation_id,
            file_token: token.to_owned(),
            content_type: None,
            bytes: vec![7; size],
        }
    }

    #[test]
    fn insert_then_get_returns_same_path() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut cache = MediaCache::open(dir.path(), 1_024).expect("cache should open");

        let stored = cache.insert(&blob(7, "42.jpg", 10)).expect("insert");
        assert_eq!(stored.extension().and_then(|e| e.to_str()), Some("jpg"));
        assert_eq!(cache.get(7, "42.jpg"), Some(stored));
        assert_eq!(cache.get(8, "42.jpg"), None);
    }

    #[test]
    fn content_type_decides_extension_for_opaque_tokens() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut cache = MediaCache::open(dir.path(), 1_024).expect("cache should open");

        let mut media = blob(7, "AgADBAAD", 4);
        media.content_type = Some("audio/ogg; codecs=opus".to_owned());
        let stored = cache.insert(&media).expect("insert");
        assert_eq!(stored.extension().and_then(|e| e.to_str()), Some("ogg"));

        let unknown = cache.insert(&blob(7, "blob", 4)).expect("insert");
        assert_eq!(unknown.extension().and_then(|e| e.to_str()), Some("bin"));
    }

    #[test]
    fn evicts_least_recently_used_when_over_capacity() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut cache = MediaCache::open(dir.path(), 25).expect("cache should open");

        let first = cache.insert(&blob(1, "a.png", 10)).expect("insert a");
        std::thread::sleep(std::time::Duration::from_millis(5));
        cache.insert(&blob(1, "b.png", 10)).expect("insert b");
        std::thread::sleep(std::time::Duration::from_millis(5));
        cache.get(1, "a.png").expect("a should still be cached");
        std::thread::sleep(std::time::Duration::from_millis(5));
        cache.insert(&blob(1, "c.png", 10)).expect("insert c");

        assert!(cache.get(1, "b.png").is_none());
        assert_eq!(cache.get(1, "a.png"), Some(first));
        assert!(cache.total_size_bytes() <= 25);
    }

    #[test]
    fn index_survives_reopen_and_drops_missing_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let kept;
        {
            let mut cache = MediaCache::open(dir.path(), 1_024).expect("cache should open");
            kept = cache.insert(&blob(2, "keep.pdf", 3)).expect("insert keep");
            let gone = cache.insert(&blob(2, "gone.pdf", 3)).expect("insert gone");
            fs::remove_file(gone).expect("remove cached file");
        }

        let mut reopened = MediaCache::open(dir.path(), 1_024).expect("cache should reopen");
        assert_eq!(reopened.get(2, "keep.pdf"), Some(kept));
        assert_eq!(reopened.get(2, "gone.pdf"), None);
        assert_eq!(reopened.total_size_bytes(), 3);
    }
}
