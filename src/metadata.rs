//! Metadata store (spec §4.2, component M): one file per property inside
//! an entry's `metadata/` directory. Grounded on `metadatastore.py` —
//! `store()` replaces the whole bag and deletes anything stale,
//! `set_property()` writes a single property via atomic rename, and the
//! reserved `checksum` property is never implicitly deleted.

use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{INTERNAL_PROPERTIES, PROP_UID};
use crate::error::Result;
use crate::layout::LayoutManager;
use crate::property::{sanitize_key, PropertyBag, PropertyValue};

/// Operates on the `metadata/` directory of a single entry.
#[derive(Debug, Clone)]
pub struct MetadataStore<'a> {
    layout: &'a LayoutManager,
}

impl<'a> MetadataStore<'a> {
    pub fn new(layout: &'a LayoutManager) -> Self {
        Self { layout }
    }

    /// Replace the entire property bag for `id`. Any on-disk property not
    /// present in `properties` is deleted, except `INTERNAL_PROPERTIES`
    /// (currently just `checksum`), which survives a `store()` call that
    /// doesn't mention it — the optimizer may have set it out of band.
    pub fn store(&self, id: &str, properties: &PropertyBag) -> Result<()> {
        let metadata_dir = self.layout.get_metadata_path(id);
        fs::create_dir_all(&metadata_dir)?;

        let mut wanted: std::collections::BTreeSet<String> =
            properties.keys().map(|k| sanitize_key(k).to_string()).collect();
        wanted.insert(PROP_UID.to_string());

        for entry in fs::read_dir(&metadata_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n.to_string(),
                None => continue,
            };
            if name.starts_with('.') {
                continue;
            }
            if wanted.contains(&name) || INTERNAL_PROPERTIES.contains(&name.as_str()) {
                continue;
            }
            fs::remove_file(&path)?;
        }

        self.set_property(id, PROP_UID, &PropertyValue::Text(id.to_string()))?;
        for (name, value) in properties {
            self.set_property(id, name, value)?;
        }

        Ok(())
    }

    /// Read every property file for `id` into a bag.
    pub fn retrieve(&self, id: &str) -> Result<PropertyBag> {
        let metadata_dir = self.layout.get_metadata_path(id);
        let mut bag = PropertyBag::new();

        if !metadata_dir.exists() {
            return Ok(bag);
        }

        for entry in fs::read_dir(&metadata_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) if !n.starts_with('.') => n.to_string(),
                _ => continue,
            };
            let bytes = fs::read(&path)?;
            bag.insert(name.clone(), PropertyValue::decode(&name, bytes));
        }

        Ok(bag)
    }

    /// Read a single property, if present.
    pub fn get_property(&self, id: &str, name: &str) -> Result<Option<PropertyValue>> {
        let name = sanitize_key(name);
        let path = self.layout.get_metadata_path(id).join(name);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        Ok(Some(PropertyValue::decode(name, bytes)))
    }

    /// Write a single property via temp-file-then-rename, skipping the
    /// write entirely when the encoded bytes are unchanged — avoids
    /// bumping mtimes (and, transitively, the index's staleness tracking)
    /// for no-op writes.
    pub fn set_property(&self, id: &str, name: &str, value: &PropertyValue) -> Result<()> {
        let name = sanitize_key(name);
        let metadata_dir = self.layout.get_metadata_path(id);
        fs::create_dir_all(&metadata_dir)?;

        let final_path = metadata_dir.join(name);
        let encoded = value.encode();

        if let Ok(existing) = fs::read(&final_path) {
            if existing == encoded {
                return Ok(());
            }
        }

        let temp_path = temp_path_for(&metadata_dir, name);
        fs::write(&temp_path, &encoded)?;
        fs::rename(&temp_path, &final_path)?;
        Ok(())
    }

    /// Remove the property file for `name`, if present. No-op otherwise.
    pub fn delete_property(&self, id: &str, name: &str) -> Result<()> {
        let name = sanitize_key(name);
        let path = self.layout.get_metadata_path(id).join(name);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Remove the whole `metadata/` directory for `id`.
    pub fn delete(&self, id: &str) -> Result<()> {
        let metadata_dir = self.layout.get_metadata_path(id);
        if metadata_dir.exists() {
            fs::remove_dir_all(metadata_dir)?;
        }
        Ok(())
    }
}

fn temp_path_for(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!(".{}", name))
}
