//! Orchestrator (spec §4.6, component D): wires layout, metadata, index,
//! file store, and optimizer together into the operations callers see.
//! Grounded on `datastore.py`'s `DataStore` class — the startup
//! version-check/rebuild dance, the `Created`/`Updated`/`Deleted`/`Stopped`
//! signal shape, and `find`'s index-unavailable fallback are all carried
//! over. D-Bus is dropped entirely (spec §9, REDESIGN FLAGS): signals are
//! a `tokio::sync::broadcast` channel instead of D-Bus signal emission, and
//! `mount`/`unmount`/`mounts` are not exposed at all.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::collaborators::{
    primary_extension, ExtensionMimeDetector, MimeDetector, NullTextExtractor, TextExtractor,
};
use crate::config::Config;
use crate::constants::{MAX_QUERY_LIMIT, PROP_CREATION_TIME, PROP_FILESIZE, PROP_MIME_TYPE, PROP_TIMESTAMP, PROP_UID};
use crate::error::{Result, StoreError};
use crate::filestore::{CallerIsolation, FileStore, NoIsolation};
use crate::index::{FindQuery, IndexStore};
use crate::layout::LayoutManager;
use crate::metadata::MetadataStore;
use crate::migration;
use crate::optimizer::Optimizer;
use crate::property::{PropertyBag, PropertyValue};

/// Signals emitted as entries are created, updated, deleted, or the store
/// is shut down (`Created`/`Updated`/`Deleted`/`Stopped` in `datastore.py`).
#[derive(Debug, Clone)]
pub enum StoreEvent {
    Created(String),
    Updated(String),
    Deleted(String),
    Stopped,
}

/// The whole per-user object store: one `LayoutManager` root plus its
/// metadata, index, file, and dedup subsystems.
pub struct ObjectStore {
    layout: LayoutManager,
    index: Mutex<IndexStore>,
    events: broadcast::Sender<StoreEvent>,
    config: Config,
    mime_detector: Box<dyn MimeDetector>,
    text_extractor: Box<dyn TextExtractor>,
}

impl ObjectStore {
    /// Open (creating and migrating as needed) the datastore described by
    /// `config`, rebuilding the index if the last shutdown was unclean or
    /// the index itself is missing/stale/corrupt.
    pub async fn open(config: Config) -> Result<Arc<Self>> {
        let root = config.resolve_root()?;
        let layout = LayoutManager::new(root)?;

        migration::migrate(&layout)?;

        let was_clean = layout.get_clean_flag_path().exists();
        if !was_clean {
            warn!("previous shutdown was not clean, forcing a full index rebuild");
        }
        clear_clean_flag(&layout)?;

        let mut index = Self::open_index_with_recovery(&layout, &config)?;

        let text_extractor: Box<dyn TextExtractor> = Box::new(NullTextExtractor);
        if !was_clean || !index.is_index_updated() {
            debug!("index is not up-to-date, rebuilding");
            Self::rebuild_index(&layout, &config, &mut index, text_extractor.as_ref())?;
        }

        mark_clean(&layout)?;

        let (events, _) = broadcast::channel(64);

        Ok(Arc::new(Self {
            layout,
            index: Mutex::new(index),
            events,
            config,
            mime_detector: Box::new(ExtensionMimeDetector),
            text_extractor,
        }))
    }

    fn open_index_with_recovery(layout: &LayoutManager, config: &Config) -> Result<IndexStore> {
        match IndexStore::open(layout, config.flush_write_threshold, config.flush_timeout) {
            Ok(index) => Ok(index),
            Err(e) => {
                error!("failed to open index ({}), removing and rebuilding", e);
                IndexStore::remove_index_files(&layout.get_index_path())?;
                IndexStore::open(layout, config.flush_write_threshold, config.flush_timeout)
            }
        }
    }

    /// Rebuild the index from scratch, scanning every entry via
    /// `LayoutManager::find_all` (spec §4.6). When the primary disk is
    /// below `config.min_free_bytes`, the fresh index is built on
    /// scratch/volatile storage instead; afterwards, if the primary disk
    /// has since regained enough headroom (`rebuild_headroom_ratio` times
    /// the scratch index's size, plus the same free-bytes floor), it is
    /// copied back into place. Otherwise this process keeps using the
    /// scratch copy and the primary `index_updated` marker is left stale,
    /// so the next cold start retries the decision.
    fn rebuild_index(
        layout: &LayoutManager,
        config: &Config,
        index: &mut IndexStore,
        text_extractor: &dyn TextExtractor,
    ) -> Result<()> {
        let primary_path = layout.get_index_path();
        let free = free_bytes(layout.root_path());

        if free < config.min_free_bytes {
            warn!(
                "only {} bytes free on the primary disk, rebuilding index on scratch storage",
                free
            );
            IndexStore::remove_index_files(&primary_path)?;
            let scratch_path = scratch_index_path(layout.root_path());
            *index = IndexStore::open_in_dir(
                &scratch_path,
                layout.get_index_updated_path(),
                config.flush_write_threshold,
                config.flush_timeout,
                true,
            )?;
        }

        let metadata_store = MetadataStore::new(layout);
        let uids = layout.find_all()?;
        debug!("rebuilding index for {} entries", uids.len());

        for uid in &uids {
            match index.contains(uid) {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    error!("error checking index membership for {}: {}", uid, e);
                    continue;
                }
            }

            let mut properties = match metadata_store.retrieve(uid) {
                Ok(properties) => properties,
                Err(e) => {
                    warn!("entry {} is corrupt ({}), removing it", uid, e);
                    if let Err(remove_err) = std::fs::remove_dir_all(layout.get_entry_path(uid)) {
                        error!("failed to remove corrupt entry {}: {}", uid, remove_err);
                    }
                    continue;
                }
            };

            fill_missing_defaults(layout, &metadata_store, uid, &mut properties)?;

            let extracted = extract_fulltext(layout, uid, &properties, text_extractor);
            if let Err(e) = index.store(uid, &properties, extracted.as_deref()) {
                error!("error indexing entry {}: {}", uid, e);
            }
        }

        index.flush()?;
        debug!("index rebuild finished");

        if index.is_scratch() {
            Self::maybe_relocate_scratch_index(layout, config, index)?;
        }

        Ok(())
    }

    /// After a scratch rebuild, check whether the primary disk now has
    /// enough headroom to take the index back; if so, copy it into place
    /// and reopen there, otherwise keep serving from scratch this session.
    fn maybe_relocate_scratch_index(layout: &LayoutManager, config: &Config, index: &mut IndexStore) -> Result<()> {
        let scratch_path = index.index_path().to_path_buf();
        let scratch_size = dir_size(&scratch_path)?;
        let free_now = free_bytes(layout.root_path());
        let required = ((scratch_size as f64) * config.rebuild_headroom_ratio) as u64;

        if free_now < required || free_now < config.min_free_bytes {
            warn!(
                "not enough headroom to relocate the scratch index ({} free, {} required); \
                 continuing to serve from scratch storage this session",
                free_now, required
            );
            return Ok(());
        }

        info!("primary disk has regained headroom, copying the scratch index back into place");

        let primary_path = layout.get_index_path();
        IndexStore::remove_index_files(&primary_path)?;
        copy_dir_recursive(&scratch_path, &primary_path)?;
        let _ = std::fs::remove_dir_all(&scratch_path);

        let mut relocated = IndexStore::open_in_dir(
            &primary_path,
            layout.get_index_updated_path(),
            config.flush_write_threshold,
            config.flush_timeout,
            false,
        )?;
        relocated.flush()?;
        *index = relocated;
        Ok(())
    }

    /// Root directory this instance is backed by.
    pub fn root_path(&self) -> &std::path::Path {
        self.layout.root_path()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Create a new entry, returning its freshly minted uid.
    pub async fn create(
        &self,
        mut properties: PropertyBag,
        source: Option<&std::path::Path>,
        transfer_ownership: bool,
    ) -> Result<String> {
        let uid = Uuid::new_v4().to_string();
        debug!("store.create {}", uid);

        clear_clean_flag(&self.layout)?;

        self.fill_defaults(&mut properties, source);

        let metadata_store = MetadataStore::new(&self.layout);
        metadata_store.store(&uid, &properties)?;

        let file_store = FileStore::new(&self.layout);
        file_store.store(&uid, source, transfer_ownership).await?;

        fill_missing_defaults(&self.layout, &metadata_store, &uid, &mut properties)?;

        let extracted = extract_fulltext(&self.layout, &uid, &properties, self.text_extractor.as_ref());
        {
            let mut index = self.index.lock().await;
            index.store(&uid, &properties, extracted.as_deref())?;
        }

        mark_clean(&self.layout)?;

        let optimizer = Optimizer::new(&self.layout);
        optimizer.optimize(&file_store, &uid).await?;

        let _ = self.events.send(StoreEvent::Created(uid.clone()));
        Ok(uid)
    }

    /// Replace an existing entry's properties and/or payload.
    pub async fn update(
        &self,
        uid: &str,
        mut properties: PropertyBag,
        source: Option<&std::path::Path>,
        transfer_ownership: bool,
    ) -> Result<()> {
        debug!("store.update {}", uid);
        if !self.layout.get_entry_path(uid).exists() {
            return Err(StoreError::not_found(uid));
        }

        clear_clean_flag(&self.layout)?;

        self.fill_defaults(&mut properties, source);

        let metadata_store = MetadataStore::new(&self.layout);
        metadata_store.store(uid, &properties)?;

        let file_store = FileStore::new(&self.layout);
        let optimizer = Optimizer::new(&self.layout);

        let replacing_file = tokio::fs::try_exists(file_store.get_file_path(uid)).await?
            && match source {
                Some(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
                None => true,
            };
        if replacing_file {
            optimizer.remove(&metadata_store, uid).await?;
        }

        file_store.store(uid, source, transfer_ownership).await?;

        fill_missing_defaults(&self.layout, &metadata_store, uid, &mut properties)?;

        let extracted = extract_fulltext(&self.layout, uid, &properties, self.text_extractor.as_ref());
        {
            let mut index = self.index.lock().await;
            index.store(uid, &properties, extracted.as_deref())?;
        }

        mark_clean(&self.layout)?;

        optimizer.optimize(&file_store, uid).await?;

        let _ = self.events.send(StoreEvent::Updated(uid.to_string()));
        Ok(())
    }

    /// Defaults decidable before the payload lands at its final path
    /// (`timestamp`, `mime_type` sniffed from `source`'s extension).
    /// `filesize`/`creation_time` are filled in separately, via
    /// `fill_missing_defaults`, once the payload is in place.
    fn fill_defaults(&self, properties: &mut PropertyBag, source: Option<&std::path::Path>) {
        if properties
            .get(PROP_TIMESTAMP)
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
            == 0
        {
            properties.insert(PROP_TIMESTAMP.to_string(), PropertyValue::Int(now_unix_timestamp()));
        }

        if !properties.contains_key(PROP_MIME_TYPE) {
            if let Some(source) = source {
                if let Some(mime) = self.mime_detector.detect(source) {
                    properties.insert(PROP_MIME_TYPE.to_string(), PropertyValue::Text(mime));
                }
            }
        }
    }

    /// Query matching entries, returning their property bags and an
    /// estimated total count. Falls back to an unordered full scan (via
    /// `LayoutManager::find_all`) when the index isn't known-current,
    /// matching `datastore.py`'s `find` degrade path.
    pub async fn find(&self, query: FindQuery, properties_wanted: Option<&[String]>) -> Result<(Vec<PropertyBag>, usize)> {
        let offset = query.offset;
        let limit = query.limit.min(MAX_QUERY_LIMIT);

        let (uids, count) = {
            let index = self.index.lock().await;
            if index.is_index_updated() {
                match index.find(&query) {
                    Ok(result) => result,
                    Err(e) => {
                        error!("index query failed ({}), falling back to full scan", e);
                        self.fallback_scan(offset, limit)?
                    }
                }
            } else {
                warn!("index updating, returning unordered entries");
                self.fallback_scan(offset, limit)?
            }
        };

        let (entries, torn_down) = self.materialize(&uids, properties_wanted)?;
        if !torn_down {
            return Ok((entries, count));
        }

        // The index pointed at an entry with no backing directory: it's
        // stale relative to the filesystem. Rebuild it and re-answer this
        // query from an unordered full scan, the same degrade path used
        // when the index is missing or a query itself errors.
        warn!("index references a torn-down entry, rebuilding and retrying via full scan");
        {
            let mut index = self.index.lock().await;
            Self::rebuild_index(&self.layout, &self.config, &mut index, self.text_extractor.as_ref())?;
        }
        let (uids, count) = self.fallback_scan(offset, limit)?;
        let (entries, _) = self.materialize(&uids, properties_wanted)?;
        Ok((entries, count))
    }

    /// Load property bags for `uids`, dropping (and flagging) any whose
    /// entry directory no longer exists on disk.
    fn materialize(&self, uids: &[String], properties_wanted: Option<&[String]>) -> Result<(Vec<PropertyBag>, bool)> {
        let metadata_store = MetadataStore::new(&self.layout);
        let mut entries = Vec::with_capacity(uids.len());
        let mut torn_down = false;

        for uid in uids {
            if !self.layout.get_entry_path(uid).exists() {
                debug!("skipping entry {} without an entry directory", uid);
                torn_down = true;
                continue;
            }
            let mut bag = metadata_store.retrieve(uid)?;
            if let Some(wanted) = properties_wanted {
                bag.retain(|k, _| wanted.iter().any(|w| w == k) || k == PROP_UID);
            }
            entries.push(bag);
        }

        Ok((entries, torn_down))
    }

    fn fallback_scan(&self, offset: usize, limit: usize) -> Result<(Vec<String>, usize)> {
        let all = self.layout.find_all()?;
        let count = all.len();
        let uids = all.into_iter().skip(offset).take(limit).collect();
        Ok((uids, count))
    }

    /// All properties for `uid`.
    pub fn get_properties(&self, uid: &str) -> Result<PropertyBag> {
        if !self.layout.get_entry_path(uid).exists() {
            return Err(StoreError::not_found(uid));
        }
        MetadataStore::new(&self.layout).retrieve(uid)
    }

    /// Place a caller-visible copy of `uid`'s payload, named with the
    /// extension its `mime_type` implies. Returns `None` for entries
    /// without a payload.
    pub async fn get_filename(&self, uid: &str) -> Result<Option<PathBuf>> {
        if !self.layout.get_entry_path(uid).exists() {
            return Err(StoreError::not_found(uid));
        }

        let metadata_store = MetadataStore::new(&self.layout);
        let extension = metadata_store
            .get_property(uid, PROP_MIME_TYPE)?
            .and_then(|v| v.as_text().map(str::to_string))
            .and_then(|mime| primary_extension(&mime).map(str::to_string));

        let file_store = FileStore::new(&self.layout);
        let scratch_dir = self.scratch_dir();
        let isolation = NoIsolation::new(scratch_dir);
        file_store.retrieve(uid, &isolation as &dyn CallerIsolation, extension.as_deref()).await
    }

    fn scratch_dir(&self) -> PathBuf {
        self.config
            .root_override
            .clone()
            .unwrap_or_else(|| self.layout.root_path().to_path_buf())
            .join("tmp")
    }

    /// Distinct values seen for a structured property (generalizes
    /// `get_uniquevaluesfor`, which only ever supported `activity`).
    pub async fn get_unique_values_for(&self, property_name: &str) -> Result<Vec<String>> {
        let index = self.index.lock().await;
        if !index.is_index_updated() {
            warn!("index updating, returning an empty list for get_unique_values_for");
            return Ok(Vec::new());
        }
        index.unique_values_for(property_name)
    }

    /// Drain the dedup-detection queue one entry at a time, the way
    /// `serve`'s event loop dispatches idle-priority work between ticks.
    /// Returns the number of entries processed.
    pub async fn process_optimizer_queue(&self) -> Result<usize> {
        let optimizer = Optimizer::new(&self.layout);
        let file_store = FileStore::new(&self.layout);
        let metadata_store = MetadataStore::new(&self.layout);

        let mut processed = 0;
        while optimizer.process_one(&file_store, &metadata_store).await?.is_some() {
            processed += 1;
        }
        Ok(processed)
    }

    /// Permanently remove an entry and all trace of it.
    pub async fn delete(&self, uid: &str) -> Result<()> {
        debug!("store.delete {}", uid);
        if !self.layout.get_entry_path(uid).exists() {
            return Err(StoreError::not_found(uid));
        }

        clear_clean_flag(&self.layout)?;

        let metadata_store = MetadataStore::new(&self.layout);
        let optimizer = Optimizer::new(&self.layout);
        optimizer.remove(&metadata_store, uid).await?;

        {
            let mut index = self.index.lock().await;
            index.delete(uid)?;
        }

        let file_store = FileStore::new(&self.layout);
        file_store.delete(uid).await?;
        metadata_store.delete(uid)?;

        let entry_path = self.layout.get_entry_path(uid);
        if entry_path.exists() {
            tokio::fs::remove_dir_all(&entry_path).await?;
        }
        remove_shard_if_empty(&entry_path)?;

        mark_clean(&self.layout)?;

        let _ = self.events.send(StoreEvent::Deleted(uid.to_string()));
        Ok(())
    }

    /// Flush the index and announce shutdown.
    pub async fn stop(&self) -> Result<()> {
        {
            let mut index = self.index.lock().await;
            index.flush()?;
        }
        mark_clean(&self.layout)?;
        let _ = self.events.send(StoreEvent::Stopped);
        Ok(())
    }
}

/// Run the text extractor over an entry's payload, if it has one, using its
/// `mime_type` property (falling back to an empty string, letting the
/// extractor decide whether it can still sniff the content).
fn extract_fulltext(
    layout: &LayoutManager,
    uid: &str,
    properties: &PropertyBag,
    text_extractor: &dyn TextExtractor,
) -> Option<String> {
    let data_path = layout.get_data_path(uid);
    if !data_path.exists() {
        return None;
    }
    let mime_type = properties.get(PROP_MIME_TYPE).and_then(|v| v.as_text()).unwrap_or("");
    text_extractor.extract_text(&data_path, mime_type)
}

/// Fill in `filesize`/`timestamp`/`creation_time` for an entry whose
/// metadata is missing them, writing the computed defaults back. Called
/// from `create`/`update` right after the payload lands at its final path
/// (spec §4.6, §8's round-trip property), and from the rebuild scan for
/// entries that predate these defaults. `creation_time` defaults to
/// `timestamp`, applied after `timestamp` itself has been defaulted.
fn fill_missing_defaults(
    layout: &LayoutManager,
    metadata_store: &MetadataStore<'_>,
    uid: &str,
    properties: &mut PropertyBag,
) -> Result<()> {
    if !properties.contains_key(PROP_FILESIZE) {
        if let Ok(meta) = std::fs::metadata(layout.get_data_path(uid)) {
            let value = PropertyValue::Int(meta.len() as i64);
            metadata_store.set_property(uid, PROP_FILESIZE, &value)?;
            properties.insert(PROP_FILESIZE.to_string(), value);
        }
    }

    if !properties.contains_key(PROP_TIMESTAMP) {
        let value = PropertyValue::Int(now_unix_timestamp());
        metadata_store.set_property(uid, PROP_TIMESTAMP, &value)?;
        properties.insert(PROP_TIMESTAMP.to_string(), value);
    }

    if !properties.contains_key(PROP_CREATION_TIME) {
        let timestamp = properties.get(PROP_TIMESTAMP).and_then(|v| v.as_i64()).unwrap_or_else(now_unix_timestamp);
        let value = PropertyValue::Int(timestamp);
        metadata_store.set_property(uid, PROP_CREATION_TIME, &value)?;
        properties.insert(PROP_CREATION_TIME.to_string(), value);
    }

    Ok(())
}

/// Free bytes available on the filesystem holding `path`, per spec §4.6's
/// "free space" check. Treated as unbounded if the query itself fails,
/// the way a missing stat shouldn't block startup.
fn free_bytes(path: &std::path::Path) -> u64 {
    fs2::available_space(path).unwrap_or(u64::MAX)
}

/// Total size in bytes of every file under `path`, recursively.
fn dir_size(path: &std::path::Path) -> Result<u64> {
    let mut total = 0u64;
    if !path.exists() {
        return Ok(0);
    }
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            total += dir_size(&entry.path())?;
        } else {
            total += metadata.len();
        }
    }
    Ok(total)
}

/// Copy a directory tree, creating `dest` and its subdirectories as needed.
fn copy_dir_recursive(src: &std::path::Path, dest: &std::path::Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let dest_path = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &dest_path)?;
        } else {
            std::fs::copy(entry.path(), dest_path)?;
        }
    }
    Ok(())
}

/// A scratch location for the index, keyed off the datastore root so
/// repeated rebuilds for the same store land in the same place.
fn scratch_index_path(root: &std::path::Path) -> PathBuf {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    root.hash(&mut hasher);
    std::env::temp_dir().join(format!("cubbystore-scratch-index-{:x}", hasher.finish()))
}

fn remove_shard_if_empty(entry_path: &std::path::Path) -> Result<()> {
    let Some(shard_dir) = entry_path.parent() else {
        return Ok(());
    };
    if shard_dir.read_dir().map(|mut it| it.next().is_none()).unwrap_or(false) {
        std::fs::remove_dir(shard_dir)?;
    }
    Ok(())
}

fn now_unix_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

fn clear_clean_flag(layout: &LayoutManager) -> Result<()> {
    let path = layout.get_clean_flag_path();
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

fn mark_clean(layout: &LayoutManager) -> Result<()> {
    let path = layout.get_clean_flag_path();
    let file = std::fs::File::create(path)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn bag(pairs: &[(&str, PropertyValue)]) -> PropertyBag {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn test_create_then_get_properties() {
        let dir = tempdir().unwrap();
        let store = ObjectStore::open(Config::with_root(dir.path())).await.unwrap();

        let uid = store
            .create(bag(&[("title", PropertyValue::Text("hello".to_string()))]), None, false)
            .await
            .unwrap();

        let props = store.get_properties(&uid).unwrap();
        assert_eq!(props.get("title").unwrap().as_text(), Some("hello"));
        assert!(props.get(PROP_TIMESTAMP).unwrap().as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_find_returns_created_entry() {
        let dir = tempdir().unwrap();
        let store = ObjectStore::open(Config::with_root(dir.path())).await.unwrap();

        store
            .create(bag(&[("title", PropertyValue::Text("findable".to_string()))]), None, false)
            .await
            .unwrap();

        let (entries, count) = store.find(FindQuery::default(), None).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_update_replaces_properties() {
        let dir = tempdir().unwrap();
        let store = ObjectStore::open(Config::with_root(dir.path())).await.unwrap();

        let uid = store
            .create(bag(&[("title", PropertyValue::Text("first".to_string()))]), None, false)
            .await
            .unwrap();

        store
            .update(&uid, bag(&[("title", PropertyValue::Text("second".to_string()))]), None, false)
            .await
            .unwrap();

        let props = store.get_properties(&uid).unwrap();
        assert_eq!(props.get("title").unwrap().as_text(), Some("second"));
    }

    #[tokio::test]
    async fn test_delete_removes_entry_entirely() {
        let dir = tempdir().unwrap();
        let store = ObjectStore::open(Config::with_root(dir.path())).await.unwrap();

        let uid = store.create(PropertyBag::new(), None, false).await.unwrap();
        store.delete(&uid).await.unwrap();

        assert!(store.get_properties(&uid).is_err());
        let (entries, count) = store.find(FindQuery::default(), None).await.unwrap();
        assert_eq!(count, 0);
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_reopen_after_unclean_shutdown_rebuilds_index() {
        let dir = tempdir().unwrap();
        let uid = {
            let store = ObjectStore::open(Config::with_root(dir.path())).await.unwrap();
            let uid = store
                .create(bag(&[("title", PropertyValue::Text("durable".to_string()))]), None, false)
                .await
                .unwrap();
            // simulate a crash: no stop(), so ds_clean is absent
            uid
        };

        let reopened = ObjectStore::open(Config::with_root(dir.path())).await.unwrap();
        let (entries, count) = reopened.find(FindQuery::default(), None).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(entries[0].get(PROP_UID).unwrap().as_text(), Some(uid.as_str()));
    }

    #[tokio::test]
    async fn test_create_fills_filesize_and_creation_time_immediately() {
        let dir = tempdir().unwrap();
        let store = ObjectStore::open(Config::with_root(dir.path())).await.unwrap();

        let payload = dir.path().join("payload.txt");
        std::fs::write(&payload, b"hello world").unwrap();

        let uid = store.create(PropertyBag::new(), Some(&payload), false).await.unwrap();

        let props = store.get_properties(&uid).unwrap();
        assert_eq!(props.get(PROP_FILESIZE).unwrap().as_i64(), Some(11));
        let timestamp = props.get(PROP_TIMESTAMP).unwrap().as_i64().unwrap();
        assert!(timestamp > 0);
        assert_eq!(props.get(PROP_CREATION_TIME).unwrap().as_i64(), Some(timestamp));
    }

    #[tokio::test]
    async fn test_find_rebuilds_when_index_references_torn_down_entry() {
        let dir = tempdir().unwrap();
        let layout = LayoutManager::new(dir.path()).unwrap();
        let store = ObjectStore::open(Config::with_root(dir.path())).await.unwrap();

        let uid = store
            .create(bag(&[("title", PropertyValue::Text("ephemeral".to_string()))]), None, false)
            .await
            .unwrap();

        // Tear down the entry directly on disk, bypassing `delete()`, so the
        // index still references a uid with no backing directory.
        std::fs::remove_dir_all(layout.get_entry_path(&uid)).unwrap();

        let (entries, count) = store.find(FindQuery::default(), None).await.unwrap();
        assert_eq!(count, 0);
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_rebuild_fills_missing_metadata_defaults() {
        let dir = tempdir().unwrap();
        let layout = LayoutManager::new(dir.path()).unwrap();

        let uid = "88888888-8888-8888-8888-888888888887";
        let metadata_store = MetadataStore::new(&layout);
        metadata_store
            .set_property(uid, "title", &PropertyValue::Text("no defaults yet".to_string()))
            .unwrap();
        tokio::fs::write(layout.get_data_path(uid), b"payload bytes").await.unwrap();

        // fresh root, never stopped: open() forces a rebuild on first open
        let store = ObjectStore::open(Config::with_root(dir.path())).await.unwrap();

        let props = store.get_properties(uid).unwrap();
        assert_eq!(props.get(PROP_FILESIZE).unwrap().as_i64(), Some(13));
        let timestamp = props.get(PROP_TIMESTAMP).unwrap().as_i64().unwrap();
        assert!(timestamp > 0);
        assert_eq!(props.get(PROP_CREATION_TIME).unwrap().as_i64(), Some(timestamp));
    }

    #[tokio::test]
    async fn test_rebuild_removes_entry_with_corrupt_metadata() {
        let dir = tempdir().unwrap();
        let layout = LayoutManager::new(dir.path()).unwrap();

        let uid = "99999999-9999-9999-9999-999999999999";
        let entry_path = layout.get_entry_path(uid);
        std::fs::create_dir_all(&entry_path).unwrap();
        // metadata is supposed to be a directory; a plain file in its place
        // makes property retrieval fail outright, simulating corruption.
        std::fs::write(layout.get_metadata_path(uid), b"not a directory").unwrap();

        let store = ObjectStore::open(Config::with_root(dir.path())).await.unwrap();

        assert!(!entry_path.exists());
        let (entries, count) = store.find(FindQuery::default(), None).await.unwrap();
        assert_eq!(count, 0);
        assert!(entries.is_empty());
    }
}
