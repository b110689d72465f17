//! Index store (spec §4.4, component I): an inverted index over structured
//! and free-text properties, backed by Tantivy. Grounded on `indexstore.py`
//! for semantics (term-map prefixes become per-field exact/tokenized pairs,
//! `_FLUSH_THRESHOLD`/`_FLUSH_TIMEOUT` become `pending_writes`/elapsed-time
//! tracking, `index_updated` is the same fsync'd marker file) and on the
//! writer-lifecycle plumbing in a full-text search engine's Tantivy wrapper
//! (lazy writer, `NoMergePolicy`, retry-with-backoff open/commit).

mod query;

pub use query::{FindQuery, QueryValue};

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tantivy::collector::{Count, TopDocs};
use tantivy::directory::MmapDirectory;
use tantivy::merge_policy::NoMergePolicy;
use tantivy::query::{AllQuery, BooleanQuery, Occur, Query as TantivyQuery, QueryParser, RangeQuery, TermQuery};
use tantivy::schema::{IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value, FAST, INDEXED, STORED, STRING, TEXT};
use tantivy::{Index, IndexReader, IndexSettings, IndexWriter, Order, ReloadPolicy, TantivyDocument, Term};
use tracing::{debug, warn};

use crate::constants::{
    PROPERTIES_NOT_TO_INDEX, PROP_CREATION_TIME, PROP_FILESIZE, PROP_TIMESTAMP, PROP_TITLE,
    PROP_UID, STRUCTURED_FIELDS,
};
use crate::error::{Result, StoreError};
use crate::layout::LayoutManager;
use crate::property::PropertyBag;

/// Fields carrying an exact-match sub-field plus a tokenized sub-field,
/// matching `_QUERY_TERM_MAP` in `indexstore.py`.
fn exact_field_name(base: &str) -> String {
    format!("{}_exact", base)
}

fn text_field_name(base: &str) -> String {
    format!("{}_text", base)
}

struct Fields {
    uid: tantivy::schema::Field,
    timestamp: tantivy::schema::Field,
    title_sort: tantivy::schema::Field,
    title_text: tantivy::schema::Field,
    filesize: tantivy::schema::Field,
    creation_time: tantivy::schema::Field,
    catchall_text: tantivy::schema::Field,
    fulltext: tantivy::schema::Field,
    structured_exact: BTreeMap<String, tantivy::schema::Field>,
    structured_text: BTreeMap<String, tantivy::schema::Field>,
}

fn build_schema() -> (Schema, Fields) {
    let mut builder = Schema::builder();

    let uid = builder.add_text_field(PROP_UID, STRING | STORED);
    let timestamp = builder.add_i64_field(PROP_TIMESTAMP, INDEXED | STORED | FAST);
    let title_sort = builder.add_text_field("title_sort", STRING | STORED);
    let title_text = builder.add_text_field("title_text", TEXT);
    let filesize = builder.add_i64_field(PROP_FILESIZE, INDEXED | STORED | FAST);
    let creation_time = builder.add_i64_field(PROP_CREATION_TIME, INDEXED | STORED | FAST);
    let catchall_text = builder.add_text_field("text", TEXT);
    let fulltext = builder.add_text_field("fulltext", TEXT);

    let tokenized = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer("default")
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );

    let mut structured_exact = BTreeMap::new();
    let mut structured_text = BTreeMap::new();
    for name in STRUCTURED_FIELDS {
        let exact = builder.add_text_field(&exact_field_name(name), STRING | STORED);
        let text = builder.add_text_field(&text_field_name(name), tokenized.clone());
        structured_exact.insert(name.to_string(), exact);
        structured_text.insert(name.to_string(), text);
    }

    let schema = builder.build();
    let fields = Fields {
        uid,
        timestamp,
        title_sort,
        title_text,
        filesize,
        creation_time,
        catchall_text,
        fulltext,
        structured_exact,
        structured_text,
    };
    (schema, fields)
}

/// Operates on the Tantivy index under `root/index`, plus the
/// `index_updated` staleness marker at the datastore root.
pub struct IndexStore {
    index: Index,
    reader: IndexReader,
    writer: Option<IndexWriter>,
    fields: Fields,
    index_path: PathBuf,
    index_updated_path: PathBuf,
    pending_writes: u32,
    last_write_at: Option<Instant>,
    flush_write_threshold: u32,
    flush_timeout: Duration,
    /// True when this index lives on scratch/volatile storage rather than
    /// the primary datastore root (spec §4.6's low-free-space rebuild
    /// path). A scratch instance never touches the primary
    /// `index_updated` marker, so a later cold start still finds it
    /// stale and retries the rebuild decision from scratch.
    scratch: bool,
}

impl IndexStore {
    /// Open (or create) the index at `layout.get_index_path()`.
    pub fn open(
        layout: &LayoutManager,
        flush_write_threshold: u32,
        flush_timeout: Duration,
    ) -> Result<Self> {
        Self::open_in_dir(
            &layout.get_index_path(),
            layout.get_index_updated_path(),
            flush_write_threshold,
            flush_timeout,
            false,
        )
    }

    /// Open (or create) an index at an explicit location. Used for the
    /// scratch-disk rebuild path (spec §4.6's "create a fresh empty index
    /// in a scratch directory... preferred under low-free-space").
    pub fn open_in_dir(
        index_path: &Path,
        index_updated_path: PathBuf,
        flush_write_threshold: u32,
        flush_timeout: Duration,
        scratch: bool,
    ) -> Result<Self> {
        std::fs::create_dir_all(index_path)?;

        let (schema, fields) = build_schema();
        let index = Self::open_or_create_with_retry(index_path, &schema)?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e: tantivy::TantivyError| StoreError::index(e.to_string()))?;

        Ok(Self {
            index,
            reader,
            writer: None,
            fields,
            index_path: index_path.to_path_buf(),
            index_updated_path,
            pending_writes: 0,
            last_write_at: None,
            flush_write_threshold,
            flush_timeout,
            scratch,
        })
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn is_scratch(&self) -> bool {
        self.scratch
    }

    fn open_or_create_with_retry(index_path: &Path, schema: &Schema) -> Result<Index> {
        let max_retries = 3;
        let mut last_error = None;

        for attempt in 0..max_retries {
            if attempt > 0 {
                std::thread::sleep(Duration::from_millis(100 * (1 << attempt)));
            }

            let result = if index_path.join("meta.json").exists() {
                Index::open_in_dir(index_path).map_err(|e| e.to_string())
            } else {
                MmapDirectory::open(index_path)
                    .map_err(|e| e.to_string())
                    .and_then(|dir| {
                        Index::create(dir, schema.clone(), IndexSettings::default())
                            .map_err(|e| e.to_string())
                    })
            };

            match result {
                Ok(index) => return Ok(index),
                Err(e) => last_error = Some(e),
            }
        }

        Err(StoreError::index_corrupt(format!(
            "failed to open index after {} attempts: {}",
            max_retries,
            last_error.unwrap_or_default()
        )))
    }

    fn ensure_writer(&mut self) -> Result<()> {
        if self.writer.is_some() {
            return Ok(());
        }
        let writer = self
            .index
            .writer(50_000_000)
            .map_err(|e| StoreError::index(e.to_string()))?;
        writer.set_merge_policy(Box::new(NoMergePolicy));
        self.writer = Some(writer);
        Ok(())
    }

    /// True when the entry already has a document in the index.
    pub fn contains(&self, uid: &str) -> Result<bool> {
        let searcher = self.reader.searcher();
        let term = Term::from_field_text(self.fields.uid, uid);
        let query = TermQuery::new(term, IndexRecordOption::Basic);
        let count = searcher
            .search(&query, &Count)
            .map_err(|e| StoreError::index(e.to_string()))?;
        Ok(count > 0)
    }

    /// Index (or reindex) `uid`'s properties. `extracted_text`, when given
    /// by the binary-to-text extractor collaborator, populates a dedicated
    /// `fulltext` field searched alongside the structured text fields.
    pub fn store(&mut self, uid: &str, properties: &PropertyBag, extracted_text: Option<&str>) -> Result<()> {
        self.ensure_writer()?;

        let mut doc = TantivyDocument::default();
        doc.add_text(self.fields.uid, uid);

        if let Some(text) = extracted_text {
            if !text.is_empty() {
                doc.add_text(self.fields.fulltext, text);
            }
        }

        let timestamp = properties
            .get(PROP_TIMESTAMP)
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        doc.add_i64(self.fields.timestamp, timestamp);

        let title = properties
            .get(PROP_TITLE)
            .and_then(|v| v.as_text())
            .unwrap_or("")
            .trim()
            .to_string();
        doc.add_text(self.fields.title_sort, &title);
        doc.add_text(self.fields.title_text, &title);

        if let Some(filesize) = properties.get(PROP_FILESIZE).and_then(|v| v.as_i64()) {
            doc.add_i64(self.fields.filesize, filesize);
        }
        if let Some(creation_time) = properties.get(PROP_CREATION_TIME).and_then(|v| v.as_i64()) {
            doc.add_i64(self.fields.creation_time, creation_time);
        }

        let mut handled: BTreeSet<&str> = BTreeSet::new();
        handled.insert(PROP_UID);
        handled.insert(PROP_TIMESTAMP);
        handled.insert(PROP_TITLE);
        handled.insert(PROP_FILESIZE);
        handled.insert(PROP_CREATION_TIME);

        for name in STRUCTURED_FIELDS {
            handled.insert(name);
            let Some(value) = properties.get(*name) else {
                continue;
            };
            let rendered = value.to_display_string();
            if rendered.is_empty() {
                continue;
            }
            let exact_field = self.fields.structured_exact[*name];
            let text_field = self.fields.structured_text[*name];
            doc.add_text(exact_field, &rendered);
            doc.add_text(text_field, &rendered);
        }

        for (name, value) in properties {
            if handled.contains(name.as_str()) || PROPERTIES_NOT_TO_INDEX.contains(&name.as_str()) {
                continue;
            }
            let rendered = value.to_display_string();
            if rendered.is_empty() {
                continue;
            }
            doc.add_text(self.fields.catchall_text, &rendered);
        }

        let existed = self.contains(uid)?;
        let writer = self.writer.as_mut().expect("writer ensured above");
        if existed {
            let term = Term::from_field_text(self.fields.uid, uid);
            writer.delete_term(term);
        }
        writer
            .add_document(doc)
            .map_err(|e| StoreError::index(e.to_string()))?;

        self.note_write();
        self.maybe_flush(false)
    }

    /// Remove `uid`'s document, if present.
    pub fn delete(&mut self, uid: &str) -> Result<()> {
        self.ensure_writer()?;
        let term = Term::from_field_text(self.fields.uid, uid);
        self.writer.as_mut().expect("writer ensured above").delete_term(term);
        self.note_write();
        self.maybe_flush(false)
    }

    fn note_write(&mut self) {
        self.pending_writes += 1;
        self.last_write_at = Some(Instant::now());
    }

    /// Flush if the pending-write threshold was crossed, the timeout has
    /// elapsed since the last write, or `force` is set. Mirrors
    /// `IndexStore._flush` in `indexstore.py`: the `index_updated` marker is
    /// cleared before the mutation and re-asserted (fsync'd) only once the
    /// commit lands.
    pub fn maybe_flush(&mut self, force: bool) -> Result<()> {
        let elapsed_past_timeout = self
            .last_write_at
            .map(|at| at.elapsed() >= self.flush_timeout)
            .unwrap_or(false);

        if !force && self.pending_writes < self.flush_write_threshold && !elapsed_past_timeout {
            return Ok(());
        }

        self.clear_index_updated()?;
        self.commit_with_retry()?;
        self.pending_writes = 0;
        self.last_write_at = None;
        self.set_index_updated()?;
        Ok(())
    }

    /// Force an immediate flush, used on graceful shutdown.
    pub fn flush(&mut self) -> Result<()> {
        self.maybe_flush(true)
    }

    fn commit_with_retry(&mut self) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };

        let max_retries = 5;
        let mut last_error = None;

        for attempt in 0..max_retries {
            if attempt > 0 {
                std::thread::sleep(Duration::from_millis(100 * (1 << attempt)));
            }

            match writer.commit() {
                Ok(_) => {
                    if let Err(e) = self.reader.reload() {
                        debug!("index reader reload warning: {}", e);
                    }
                    return Ok(());
                }
                Err(e) => {
                    let msg = e.to_string();
                    if msg.contains("writer was killed") {
                        warn!("index writer was killed during commit, recreating (pending writes since last commit are lost)");
                        self.writer = None;
                        self.ensure_writer()?;
                        if let Some(w) = self.writer.as_mut() {
                            w.commit().map_err(|e| StoreError::index(e.to_string()))?;
                        }
                        let _ = self.reader.reload();
                        return Ok(());
                    }
                    last_error = Some(msg);
                }
            }
        }

        // A flush failure after retries is fatal (spec §4.4): the process
        // must abort so the next startup runs a full index rebuild rather
        // than trust a half-written commit.
        Err(StoreError::fatal(format!(
            "index commit failed after {} attempts: {}",
            max_retries,
            last_error.unwrap_or_default()
        )))
    }

    fn clear_index_updated(&self) -> Result<()> {
        if self.scratch {
            return Ok(());
        }
        if self.index_updated_path.exists() {
            std::fs::remove_file(&self.index_updated_path)?;
        }
        Ok(())
    }

    fn set_index_updated(&self) -> Result<()> {
        if self.scratch {
            return Ok(());
        }
        let file = std::fs::File::create(&self.index_updated_path)?;
        file.sync_all()?;
        Ok(())
    }

    /// Whether this handle can be trusted for queries. A scratch instance
    /// is always considered current for the lifetime of this process, even
    /// though the primary `index_updated` marker is left untouched.
    pub fn is_index_updated(&self) -> bool {
        self.scratch || self.index_updated_path.exists()
    }

    /// Delete every file under the index directory, for a full rebuild.
    pub fn remove_index_files(index_path: &Path) -> Result<()> {
        if !index_path.exists() {
            return Ok(());
        }
        for entry in std::fs::read_dir(index_path)? {
            let entry = entry?;
            if entry.path().is_file() {
                std::fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    /// Distinct values seen for a structured field (`get_activities` in
    /// `indexstore.py`, generalized to any structured field name).
    pub fn unique_values_for(&self, field_name: &str) -> Result<Vec<String>> {
        let field = *self
            .fields
            .structured_exact
            .get(field_name)
            .ok_or_else(|| StoreError::invalid_argument(format!("not a structured field: {}", field_name)))?;

        let searcher = self.reader.searcher();
        let mut values = BTreeSet::new();
        for segment_reader in searcher.segment_readers() {
            let inverted_index = segment_reader
                .inverted_index(field)
                .map_err(|e| StoreError::index(e.to_string()))?;
            let term_dict = inverted_index.terms();
            let mut stream = term_dict
                .stream()
                .map_err(|e| StoreError::index(e.to_string()))?;
            while let Some((term_bytes, _)) = stream.next() {
                if let Ok(s) = std::str::from_utf8(term_bytes) {
                    values.insert(s.to_string());
                }
            }
        }
        Ok(values.into_iter().collect())
    }

    fn build_query(&self, fq: &FindQuery) -> Result<Box<dyn TantivyQuery>> {
        let mut clauses: Vec<(Occur, Box<dyn TantivyQuery>)> = Vec::new();

        for (name, value) in &fq.terms {
            if name == PROP_UID {
                clauses.push((Occur::Must, term_or_list_query(self.fields.uid, value)));
                continue;
            }
            if let Some(field) = self.fields.structured_exact.get(name.as_str()) {
                clauses.push((Occur::Must, term_or_list_query(*field, value)));
                continue;
            }
            if name == PROP_TIMESTAMP {
                clauses.push((Occur::Must, range_query(self.fields.timestamp, value)?));
                continue;
            }
            if name == PROP_FILESIZE {
                clauses.push((Occur::Must, range_query(self.fields.filesize, value)?));
                continue;
            }
            warn!("unknown query term: {}", name);
        }

        if let Some(query_string) = &fq.query_string {
            let default_fields: Vec<_> = std::iter::once(self.fields.catchall_text)
                .chain(std::iter::once(self.fields.title_text))
                .chain(std::iter::once(self.fields.fulltext))
                .chain(self.fields.structured_text.values().copied())
                .collect();
            let parser = QueryParser::for_index(&self.index, default_fields);
            let parsed = parser
                .parse_query_lenient(query_string)
                .0;
            clauses.push((Occur::Must, parsed));
        }

        if clauses.is_empty() {
            return Ok(Box::new(AllQuery));
        }
        Ok(Box::new(BooleanQuery::new(clauses)))
    }

    /// Run a query and return matching uids plus an estimated total count,
    /// windowed by `fq.offset`/`fq.limit` and ordered by `fq.order_by`
    /// (`"+timestamp"` by default, matching `indexstore.py`).
    pub fn find(&self, fq: &FindQuery) -> Result<(Vec<String>, usize)> {
        let query = self.build_query(fq)?;
        let searcher = self.reader.searcher();

        let total_count = searcher
            .search(&query, &Count)
            .map_err(|e| StoreError::index(e.to_string()))?;

        let order_by = fq.order_by.clone().unwrap_or_else(|| "+timestamp".to_string());
        let check_at_least = fq.offset + fq.limit + 1;

        let uids = match order_by.as_str() {
            "+timestamp" | "-timestamp" => {
                let order = if order_by.starts_with('+') { Order::Asc } else { Order::Desc };
                let collector =
                    TopDocs::with_limit(check_at_least).order_by_fast_field::<i64>("timestamp", order);
                let hits = searcher
                    .search(&query, &collector)
                    .map_err(|e| StoreError::index(e.to_string()))?;
                hits.into_iter()
                    .skip(fq.offset)
                    .take(fq.limit)
                    .filter_map(|(_, addr)| self.uid_at(&searcher, addr))
                    .collect()
            }
            "+title" | "-title" => {
                let descending = order_by.starts_with('-');
                let hits = searcher
                    .search(&query, &TopDocs::with_limit(total_count.max(1)))
                    .map_err(|e| StoreError::index(e.to_string()))?;
                let mut rows: Vec<(String, String)> = hits
                    .into_iter()
                    .filter_map(|(_, addr)| {
                        let doc: TantivyDocument = searcher.doc(addr).ok()?;
                        let uid = text_value(&doc, self.fields.uid)?;
                        let title = text_value(&doc, self.fields.title_sort).unwrap_or_default();
                        Some((uid, title))
                    })
                    .collect();
                rows.sort_by(|a, b| a.1.cmp(&b.1));
                if descending {
                    rows.reverse();
                }
                rows.into_iter().skip(fq.offset).take(fq.limit).map(|(uid, _)| uid).collect()
            }
            other => {
                warn!("unsupported sort field {}, falling back to +timestamp", other);
                let collector =
                    TopDocs::with_limit(check_at_least).order_by_fast_field::<i64>("timestamp", Order::Asc);
                let hits = searcher
                    .search(&query, &collector)
                    .map_err(|e| StoreError::index(e.to_string()))?;
                hits.into_iter()
                    .skip(fq.offset)
                    .take(fq.limit)
                    .filter_map(|(_, addr)| self.uid_at(&searcher, addr))
                    .collect()
            }
        };

        Ok((uids, total_count))
    }

    fn uid_at(&self, searcher: &tantivy::Searcher, addr: tantivy::DocAddress) -> Option<String> {
        let doc: TantivyDocument = searcher.doc(addr).ok()?;
        text_value(&doc, self.fields.uid)
    }
}

fn text_value(doc: &TantivyDocument, field: tantivy::schema::Field) -> Option<String> {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn term_or_list_query(field: tantivy::schema::Field, value: &QueryValue) -> Box<dyn TantivyQuery> {
    match value {
        QueryValue::Exact(v) => Box::new(TermQuery::new(
            Term::from_field_text(field, v),
            IndexRecordOption::Basic,
        )),
        QueryValue::List(items) => {
            let clauses = items
                .iter()
                .map(|v| {
                    let q: Box<dyn TantivyQuery> = Box::new(TermQuery::new(
                        Term::from_field_text(field, v),
                        IndexRecordOption::Basic,
                    ));
                    (Occur::Should, q)
                })
                .collect();
            Box::new(BooleanQuery::new(clauses))
        }
        QueryValue::Range(_, _) => Box::new(AllQuery),
    }
}

fn range_query(field: tantivy::schema::Field, value: &QueryValue) -> Result<Box<dyn TantivyQuery>> {
    match value {
        QueryValue::Exact(v) => {
            let parsed: i64 = v
                .parse()
                .map_err(|_| StoreError::invalid_argument(format!("not a number: {}", v)))?;
            Ok(Box::new(RangeQuery::new_i64(field, parsed..parsed + 1)))
        }
        QueryValue::Range(start, end) => {
            let lo: i64 = start
                .parse()
                .map_err(|_| StoreError::invalid_argument(format!("not a number: {}", start)))?;
            let hi: i64 = end
                .parse()
                .map_err(|_| StoreError::invalid_argument(format!("not a number: {}", end)))?;
            Ok(Box::new(RangeQuery::new_i64(field, lo..hi + 1)))
        }
        QueryValue::List(items) => {
            let clauses = items
                .iter()
                .map(|v| {
                    let q = range_query(field, &QueryValue::Exact(v.clone()))?;
                    Ok((Occur::Should, q))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Box::new(BooleanQuery::new(clauses)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyValue;
    use tempfile::tempdir;

    fn properties(pairs: &[(&str, PropertyValue)]) -> PropertyBag {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_store_contains_and_find() {
        let dir = tempdir().unwrap();
        let layout = LayoutManager::new(dir.path()).unwrap();
        let mut index = IndexStore::open(&layout, 20, Duration::from_secs(5)).unwrap();

        let id = "aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa";
        let props = properties(&[
            ("title", PropertyValue::Text("hello world".to_string())),
            ("timestamp", PropertyValue::Int(100)),
            ("mime_type", PropertyValue::Text("text/plain".to_string())),
        ]);
        index.store(id, &props, Some("searchable body text")).unwrap();
        index.flush().unwrap();

        assert!(index.contains(id).unwrap());

        let fq = FindQuery::default();
        let (uids, total) = index.find(&fq).unwrap();
        assert_eq!(total, 1);
        assert_eq!(uids, vec![id.to_string()]);
    }

    #[test]
    fn test_delete_removes_from_index() {
        let dir = tempdir().unwrap();
        let layout = LayoutManager::new(dir.path()).unwrap();
        let mut index = IndexStore::open(&layout, 20, Duration::from_secs(5)).unwrap();

        let id = "bbbbbbbb-bbbb-bbbb-bbbb-bbbbbbbbbbbb";
        index.store(id, &properties(&[("timestamp", PropertyValue::Int(1))]), None).unwrap();
        index.flush().unwrap();
        assert!(index.contains(id).unwrap());

        index.delete(id).unwrap();
        index.flush().unwrap();
        assert!(!index.contains(id).unwrap());
    }

    #[test]
    fn test_find_by_exact_term() {
        let dir = tempdir().unwrap();
        let layout = LayoutManager::new(dir.path()).unwrap();
        let mut index = IndexStore::open(&layout, 20, Duration::from_secs(5)).unwrap();

        let a = "cccccccc-cccc-cccc-cccc-cccccccccccc";
        let b = "dddddddd-dddd-dddd-dddd-dddddddddddd";
        index
            .store(a, &properties(&[("mime_type", PropertyValue::Text("text/plain".to_string())), ("timestamp", PropertyValue::Int(1))]), None)
            .unwrap();
        index
            .store(b, &properties(&[("mime_type", PropertyValue::Text("image/png".to_string())), ("timestamp", PropertyValue::Int(2))]), None)
            .unwrap();
        index.flush().unwrap();

        let mut fq = FindQuery::default();
        fq.terms.insert("mime_type".to_string(), QueryValue::Exact("text/plain".to_string()));
        let (uids, total) = index.find(&fq).unwrap();
        assert_eq!(total, 1);
        assert_eq!(uids, vec![a.to_string()]);
    }

    #[test]
    fn test_query_string_matches_extracted_fulltext() {
        let dir = tempdir().unwrap();
        let layout = LayoutManager::new(dir.path()).unwrap();
        let mut index = IndexStore::open(&layout, 20, Duration::from_secs(5)).unwrap();

        let id = "ffffffff-ffff-ffff-ffff-ffffffffffff";
        let props = properties(&[("timestamp", PropertyValue::Int(1))]);
        index.store(id, &props, Some("a passage about zebras and savannas")).unwrap();
        index.flush().unwrap();

        let mut fq = FindQuery::default();
        fq.query_string = Some("zebras".to_string());
        let (uids, total) = index.find(&fq).unwrap();
        assert_eq!(total, 1);
        assert_eq!(uids, vec![id.to_string()]);
    }

    #[test]
    fn test_unique_values_for_structured_field() {
        let dir = tempdir().unwrap();
        let layout = LayoutManager::new(dir.path()).unwrap();
        let mut index = IndexStore::open(&layout, 20, Duration::from_secs(5)).unwrap();

        index
            .store(
                "eeeeeeee-eeee-eeee-eeee-eeeeeeeeeeee",
                &properties(&[("activity", PropertyValue::Text("org.sugarlabs.Write".to_string())), ("timestamp", PropertyValue::Int(1))]),
                None,
            )
            .unwrap();
        index.flush().unwrap();

        let values = index.unique_values_for("activity").unwrap();
        assert_eq!(values, vec!["org.sugarlabs.Write".to_string()]);
    }
}
