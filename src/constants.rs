//! Central constants for cubbystore configuration
//!
//! All filenames and the numeric knobs spec.md fixes live here to avoid
//! duplication across `layout`, `index`, and `store`.

use std::time::Duration;

/// Name of the sub-profile directory under the user's home, default value.
pub const DEFAULT_PROFILE: &str = "default";

/// Name of the datastore root directory within a profile.
pub const DATASTORE_DIR_NAME: &str = "datastore";

/// Layout version marker file.
pub const VERSION_FILE: &str = "version";

/// Clean-shutdown marker file. Absence means the last shutdown was unclean.
pub const CLEAN_FLAG_FILE: &str = "ds_clean";

/// Index-valid marker file. Absence means the on-disk index is stale.
pub const INDEX_UPDATED_FILE: &str = "index_updated";

/// Directory name holding the Tantivy index database.
pub const INDEX_DIR_NAME: &str = "index";

/// Directory name holding dedup checksum records.
pub const CHECKSUMS_DIR_NAME: &str = "checksums";

/// Directory (within `checksums/`) holding the optimizer's pending-work queue.
pub const QUEUE_DIR_NAME: &str = "queue";

/// Directory name holding one file per property inside an entry.
pub const METADATA_DIR_NAME: &str = "metadata";

/// File name of the payload within an entry directory.
pub const DATA_FILE_NAME: &str = "data";

/// Reserved property names (spec.md §3).
pub const PROP_UID: &str = "uid";
pub const PROP_TIMESTAMP: &str = "timestamp";
pub const PROP_CREATION_TIME: &str = "creation_time";
pub const PROP_FILESIZE: &str = "filesize";
pub const PROP_CHECKSUM: &str = "checksum";
pub const PROP_TITLE: &str = "title";
pub const PROP_MIME_TYPE: &str = "mime_type";
pub const PROP_KEEP: &str = "keep";

/// Internal properties the metadata store never deletes implicitly even when
/// absent from a write's property bag (spec.md §4.2).
pub const INTERNAL_PROPERTIES: &[&str] = &[PROP_CHECKSUM];

/// Properties that contribute only to stored sort-values, never to the term
/// index (spec.md §4.4).
pub const PROPERTIES_NOT_TO_INDEX: &[&str] = &["timestamp", "preview", "launch-times"];

/// Structured fields that receive both a full-value term and tokenized
/// free-text terms (spec.md §4.4).
pub const STRUCTURED_FIELDS: &[&str] =
    &["activity", "activity_id", "mime_type", "keep", "project_id"];

/// Fields recognized by `order_by`.
pub const SORTABLE_FIELDS: &[&str] = &["timestamp", "title", "filesize", "creation_time"];

/// Force a flush every N pending writes (spec.md §4.4).
pub const FLUSH_WRITE_THRESHOLD: u32 = 20;

/// Force a flush after this many seconds since the last mutation if the
/// write-count threshold was not reached (spec.md §4.4).
pub const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Default / cap for `find`'s `limit` control key (spec.md §4.4).
pub const MAX_QUERY_LIMIT: usize = 40960;

/// Minimum free bytes on the primary filesystem before the orchestrator
/// treats it as "tight" and prefers scratch/volatile storage (spec.md §4.6).
pub const MIN_FREE_BYTES: u64 = 5 * 1024 * 1024;

/// Minimum free-bytes ratio (relative to the rebuilt index's size) required
/// before copying a scratch index back onto the primary disk (spec.md §4.6).
pub const REBUILD_HEADROOM_RATIO: f64 = 1.2;

/// Chunk size used by the file store's async copy loop (spec.md §4.3).
pub const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// Current on-disk layout version implemented by this crate (spec.md §9).
pub const CURRENT_LAYOUT_VERSION: u32 = 2;

/// Set by the CTRL-C handler to distinguish a first (graceful) press from a
/// second (force-exit) one in `serve`'s signal loop.
pub static SHUTDOWN_REQUESTED: std::sync::atomic::AtomicBool =
    std::sync::atomic::AtomicBool::new(false);
