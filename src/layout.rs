//! Layout manager (spec §4.1): pure path arithmetic over the datastore root
//! plus shard enumeration. Grounded on `layoutmanager.py` — the two-char
//! shard scheme, the ASCII version file, and `find_all`/`is_empty` are all
//! carried over unchanged.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::constants::{
    CHECKSUMS_DIR_NAME, CLEAN_FLAG_FILE, DATA_FILE_NAME, INDEX_DIR_NAME, INDEX_UPDATED_FILE,
    METADATA_DIR_NAME, QUEUE_DIR_NAME, VERSION_FILE,
};
use crate::error::Result;

/// Resolves every on-disk path derived from an object id, and owns the root
/// directory, version marker, clean flag, checksum directory, and id
/// enumeration.
#[derive(Debug, Clone)]
pub struct LayoutManager {
    root: PathBuf,
}

impl LayoutManager {
    /// Open (creating if needed) the layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let manager = Self { root };
        manager.create_if_needed(&manager.root)?;
        manager.create_if_needed(&manager.get_checksums_dir())?;
        manager.create_if_needed(&manager.get_queue_path())?;
        Ok(manager)
    }

    fn create_if_needed(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        Ok(())
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// `root/<id[0:2]>/<id>`
    pub fn get_entry_path(&self, id: &str) -> PathBuf {
        self.root.join(&id[..2]).join(id)
    }

    /// `.../data`
    pub fn get_data_path(&self, id: &str) -> PathBuf {
        self.get_entry_path(id).join(DATA_FILE_NAME)
    }

    /// `.../metadata`
    pub fn get_metadata_path(&self, id: &str) -> PathBuf {
        self.get_entry_path(id).join(METADATA_DIR_NAME)
    }

    /// `root/index`
    pub fn get_index_path(&self) -> PathBuf {
        self.root.join(INDEX_DIR_NAME)
    }

    /// `root/checksums`
    pub fn get_checksums_dir(&self) -> PathBuf {
        self.root.join(CHECKSUMS_DIR_NAME)
    }

    /// `root/checksums/queue`
    pub fn get_queue_path(&self) -> PathBuf {
        self.get_checksums_dir().join(QUEUE_DIR_NAME)
    }

    /// `root/ds_clean`
    pub fn get_clean_flag_path(&self) -> PathBuf {
        self.root.join(CLEAN_FLAG_FILE)
    }

    /// `root/index_updated`
    pub fn get_index_updated_path(&self) -> PathBuf {
        self.root.join(INDEX_UPDATED_FILE)
    }

    /// Read `root/version` as an ASCII integer, defaulting to 0 when the
    /// file is missing or unreadable (and logging the latter case).
    pub fn get_version(&self) -> u32 {
        let version_path = self.root.join(VERSION_FILE);
        match fs::read_to_string(&version_path) {
            Ok(content) => content.trim().parse().unwrap_or_else(|_| {
                warn!("cannot parse layout version at {:?}, treating as 0", version_path);
                0
            }),
            Err(_) => 0,
        }
    }

    /// Write `root/version` as an ASCII integer.
    pub fn set_version(&self, version: u32) -> Result<()> {
        let version_path = self.root.join(VERSION_FILE);
        fs::write(version_path, version.to_string())?;
        Ok(())
    }

    /// Enumerate every 36-char id found inside a two-char shard directory.
    pub fn find_all(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let shard_name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) if name.len() == 2 => name.to_string(),
                _ => continue,
            };
            let _ = shard_name;

            for inner in fs::read_dir(&path)? {
                let inner = inner?;
                if let Some(name) = inner.file_name().to_str() {
                    if name.len() == 36 {
                        ids.push(name.to_string());
                    }
                }
            }
        }

        Ok(ids)
    }

    /// True when no entry can be found under any shard, and no legacy
    /// unmigrated-store marker directory exists.
    pub fn is_empty(&self) -> bool {
        if self.root.join("store").exists() {
            // unmigrated pre-layout-versioning data store
            return false;
        }

        match self.find_all() {
            Ok(ids) => ids.is_empty(),
            Err(_) => false, // err on the safe side
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_entry_paths() {
        let dir = tempdir().unwrap();
        let layout = LayoutManager::new(dir.path()).unwrap();
        let id = "0123456789abcdef0123456789abcdef0123";

        assert_eq!(
            layout.get_entry_path(id),
            dir.path().join("01").join(id)
        );
        assert_eq!(
            layout.get_data_path(id),
            dir.path().join("01").join(id).join("data")
        );
        assert_eq!(
            layout.get_metadata_path(id),
            dir.path().join("01").join(id).join("metadata")
        );
    }

    #[test]
    fn test_version_roundtrip() {
        let dir = tempdir().unwrap();
        let layout = LayoutManager::new(dir.path()).unwrap();
        assert_eq!(layout.get_version(), 0);

        layout.set_version(2).unwrap();
        assert_eq!(layout.get_version(), 2);
    }

    #[test]
    fn test_malformed_version_defaults_to_zero() {
        let dir = tempdir().unwrap();
        let layout = LayoutManager::new(dir.path()).unwrap();
        fs::write(dir.path().join("version"), "not-a-number").unwrap();
        assert_eq!(layout.get_version(), 0);
    }

    #[test]
    fn test_find_all_and_is_empty() {
        let dir = tempdir().unwrap();
        let layout = LayoutManager::new(dir.path()).unwrap();
        assert!(layout.is_empty());

        let id = "11111111-1111-1111-1111-111111111111";
        assert_eq!(id.len(), 36);
        fs::create_dir_all(layout.get_entry_path(id)).unwrap();

        let ids = layout.find_all().unwrap();
        assert_eq!(ids, vec![id.to_string()]);
        assert!(!layout.is_empty());
    }

    #[test]
    fn test_checksums_and_queue_created_eagerly() {
        let dir = tempdir().unwrap();
        let layout = LayoutManager::new(dir.path()).unwrap();
        assert!(layout.get_checksums_dir().exists());
        assert!(layout.get_queue_path().exists());
    }
}
