//! Optimizer (spec §4.5, component O): detects duplicate payloads across
//! entries and hard-links them together to save disk space. Grounded on
//! `optimizer.py` — the checksum directory scheme (`checksums/<md5>/<uid>`
//! touch-files), queue-at-a-time processing, and reuse-vs-create branching
//! are carried over unchanged. `subprocess.Popen(['md5sum', ...])` is
//! replaced with the streaming `md5` crate, the way a content-addressed
//! object store's own storage service hashes uploads.

use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::constants::{COPY_CHUNK_SIZE, PROP_CHECKSUM};
use crate::error::Result;
use crate::filestore::FileStore;
use crate::layout::LayoutManager;
use crate::metadata::MetadataStore;
use crate::property::PropertyValue;

/// Operates on `checksums/` (dedup directories) and `checksums/queue/`
/// (pending work), both rooted at a `LayoutManager`.
pub struct Optimizer<'a> {
    layout: &'a LayoutManager,
}

impl<'a> Optimizer<'a> {
    pub fn new(layout: &'a LayoutManager) -> Self {
        Self { layout }
    }

    /// Queue `uid` for duplicate detection. A no-op when the entry has no
    /// payload file yet (deferred to any future `optimize` call once it
    /// does). Processing itself happens via `process_one`, left to the
    /// caller's scheduling loop — mirrors `GLib.idle_add` deferring work to
    /// the next idle slot instead of running it inline.
    pub async fn optimize(&self, file_store: &FileStore<'_>, uid: &str) -> Result<()> {
        if !tokio::fs::try_exists(file_store.get_file_path(uid)).await? {
            return Ok(());
        }

        let queue_path = self.layout.get_queue_path();
        let marker = queue_path.join(uid);
        tokio::fs::File::create(&marker).await?;
        debug!("optimizer: queued {:?}", marker);
        Ok(())
    }

    /// How many entries are waiting for duplicate detection.
    pub async fn queue_len(&self) -> Result<usize> {
        let mut count = 0;
        let mut entries = tokio::fs::read_dir(self.layout.get_queue_path()).await?;
        while entries.next_entry().await?.is_some() {
            count += 1;
        }
        Ok(count)
    }

    /// Process a single queued entry: hash its payload, and either link it
    /// to an existing identical file or register it as the first copy with
    /// that checksum. Returns the processed uid, or `None` if the queue was
    /// empty.
    pub async fn process_one(
        &self,
        file_store: &FileStore<'_>,
        metadata_store: &MetadataStore<'_>,
    ) -> Result<Option<String>> {
        let queue_path = self.layout.get_queue_path();
        let mut entries = tokio::fs::read_dir(&queue_path).await?;
        let Some(entry) = entries.next_entry().await? else {
            return Ok(None);
        };
        let uid = entry.file_name().to_string_lossy().into_owned();
        debug!("optimizer: processing {}", uid);

        let file_path = file_store.get_file_path(&uid);
        if !tokio::fs::try_exists(&file_path).await? {
            tracing::info!("optimizer: non-existent entry in queue: {}", uid);
        } else {
            let checksum = calculate_md5(&file_path).await?;
            metadata_store.set_property(&uid, PROP_CHECKSUM, &PropertyValue::Text(checksum.clone()))?;

            if self.identical_file_already_exists(&checksum).await? {
                if !self.already_linked(&uid, &checksum).await? {
                    let existing_uid = self.uid_from_checksum(&checksum).await?;
                    file_store.hard_link_entry(&uid, &existing_uid).await?;
                    self.add_checksum_entry(&uid, &checksum).await?;
                }
            } else {
                self.create_checksum_dir(&checksum).await?;
                self.add_checksum_entry(&uid, &checksum).await?;
            }
        }

        tokio::fs::remove_file(queue_path.join(&uid)).await?;
        Ok(Some(uid))
    }

    /// Clean up any checksum-directory bookkeeping for `uid`, called when
    /// the entry itself is deleted.
    pub async fn remove(&self, metadata_store: &MetadataStore<'_>, uid: &str) -> Result<()> {
        let Some(checksum) = metadata_store.get_property(uid, PROP_CHECKSUM)? else {
            return Ok(());
        };
        let Some(checksum) = checksum.as_text().map(str::to_string) else {
            return Ok(());
        };

        let checksum_path = self.layout.get_checksums_dir().join(&checksum);
        let entry_path = checksum_path.join(uid);

        if tokio::fs::try_exists(&entry_path).await? {
            debug!("optimizer: remove {:?}", entry_path);
            tokio::fs::remove_file(&entry_path).await?;
        }

        if tokio::fs::try_exists(&checksum_path).await? {
            match tokio::fs::remove_dir(&checksum_path).await {
                Ok(()) => debug!("optimizer: removed {:?}", checksum_path),
                Err(e) if e.kind() == std::io::ErrorKind::DirectoryNotEmpty => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    async fn identical_file_already_exists(&self, checksum: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.layout.get_checksums_dir().join(checksum)).await?)
    }

    async fn already_linked(&self, uid: &str, checksum: &str) -> Result<bool> {
        let path = self.layout.get_checksums_dir().join(checksum).join(uid);
        Ok(tokio::fs::try_exists(path).await?)
    }

    async fn uid_from_checksum(&self, checksum: &str) -> Result<String> {
        let checksum_path = self.layout.get_checksums_dir().join(checksum);
        let mut entries = tokio::fs::read_dir(&checksum_path).await?;
        let first = entries.next_entry().await?.ok_or_else(|| {
            crate::error::StoreError::index_corrupt(format!(
                "checksum directory {:?} is empty",
                checksum_path
            ))
        })?;
        Ok(first.file_name().to_string_lossy().into_owned())
    }

    async fn create_checksum_dir(&self, checksum: &str) -> Result<()> {
        let path = self.layout.get_checksums_dir().join(checksum);
        debug!("optimizer: create dir {:?}", path);
        tokio::fs::create_dir(&path).await?;
        Ok(())
    }

    async fn add_checksum_entry(&self, uid: &str, checksum: &str) -> Result<()> {
        let path = self.layout.get_checksums_dir().join(checksum).join(uid);
        debug!("optimizer: touch {:?}", path);
        tokio::fs::File::create(&path).await?;
        Ok(())
    }
}

/// Stream a file through MD5 in fixed-size chunks rather than reading it
/// whole, matching the file store's own chunked-copy granularity.
async fn calculate_md5(path: &std::path::Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut context = md5::Context::new();
    let mut buf = vec![0u8; COPY_CHUNK_SIZE];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        context.consume(&buf[..n]);
    }

    Ok(format!("{:x}", context.compute()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const A: &str = "55555555-5555-5555-5555-555555555555";
    const B: &str = "66666666-6666-6666-6666-666666666666";

    async fn write_payload(file_store: &FileStore<'_>, uid: &str, content: &[u8]) {
        let dir = tempdir().unwrap();
        let src = dir.path().join("payload");
        tokio::fs::write(&src, content).await.unwrap();
        file_store.store(uid, Some(&src), false).await.unwrap();
    }

    #[tokio::test]
    async fn test_optimize_skips_entries_without_payload() {
        let root = tempdir().unwrap();
        let layout = LayoutManager::new(root.path()).unwrap();
        let file_store = FileStore::new(&layout);
        let optimizer = Optimizer::new(&layout);

        optimizer.optimize(&file_store, A).await.unwrap();
        assert_eq!(optimizer.queue_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_first_entry_creates_checksum_dir() {
        let root = tempdir().unwrap();
        let layout = LayoutManager::new(root.path()).unwrap();
        let file_store = FileStore::new(&layout);
        let metadata_store = MetadataStore::new(&layout);
        let optimizer = Optimizer::new(&layout);

        write_payload(&file_store, A, b"duplicate content").await;
        optimizer.optimize(&file_store, A).await.unwrap();
        assert_eq!(optimizer.queue_len().await.unwrap(), 1);

        let processed = optimizer.process_one(&file_store, &metadata_store).await.unwrap();
        assert_eq!(processed, Some(A.to_string()));
        assert_eq!(optimizer.queue_len().await.unwrap(), 0);

        let checksum = metadata_store.get_property(A, PROP_CHECKSUM).unwrap().unwrap();
        let checksum_text = checksum.as_text().unwrap();
        assert!(layout.get_checksums_dir().join(checksum_text).join(A).exists());
    }

    #[tokio::test]
    async fn test_duplicate_gets_hard_linked() {
        let root = tempdir().unwrap();
        let layout = LayoutManager::new(root.path()).unwrap();
        let file_store = FileStore::new(&layout);
        let metadata_store = MetadataStore::new(&layout);
        let optimizer = Optimizer::new(&layout);

        write_payload(&file_store, A, b"same bytes").await;
        write_payload(&file_store, B, b"same bytes").await;

        optimizer.optimize(&file_store, A).await.unwrap();
        optimizer.process_one(&file_store, &metadata_store).await.unwrap();

        optimizer.optimize(&file_store, B).await.unwrap();
        optimizer.process_one(&file_store, &metadata_store).await.unwrap();

        let checksum_a = metadata_store.get_property(A, PROP_CHECKSUM).unwrap().unwrap();
        let checksum_b = metadata_store.get_property(B, PROP_CHECKSUM).unwrap().unwrap();
        assert_eq!(checksum_a.as_text(), checksum_b.as_text());

        let checksum_dir = layout.get_checksums_dir().join(checksum_a.as_text().unwrap());
        assert!(checksum_dir.join(A).exists());
        assert!(checksum_dir.join(B).exists());
    }

    #[tokio::test]
    async fn test_remove_cleans_up_sole_checksum_dir() {
        let root = tempdir().unwrap();
        let layout = LayoutManager::new(root.path()).unwrap();
        let file_store = FileStore::new(&layout);
        let metadata_store = MetadataStore::new(&layout);
        let optimizer = Optimizer::new(&layout);

        write_payload(&file_store, A, b"solo content").await;
        optimizer.optimize(&file_store, A).await.unwrap();
        optimizer.process_one(&file_store, &metadata_store).await.unwrap();

        let checksum = metadata_store.get_property(A, PROP_CHECKSUM).unwrap().unwrap();
        let checksum_dir = layout.get_checksums_dir().join(checksum.as_text().unwrap());
        assert!(checksum_dir.exists());

        optimizer.remove(&metadata_store, A).await.unwrap();
        assert!(!checksum_dir.exists());
    }
}
