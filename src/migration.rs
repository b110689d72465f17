//! Layout migration (spec §4.6, §9): transform an on-disk datastore from an
//! older layout version to the one this crate implements. Grounded on
//! `migration.py` for the 0→1 step (the pre-sharded `store/<uid>.metadata`
//! JSON layout becomes one file per property) and on this crate's own
//! decision to add a 1→2 step asserting every entry carries a `keep`
//! property, the way later versions of the original datastore introduced it.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::constants::{CURRENT_LAYOUT_VERSION, PROP_KEEP, PROP_MIME_TYPE, PROP_UID};
use crate::error::Result;
use crate::layout::LayoutManager;
use crate::metadata::MetadataStore;
use crate::property::PropertyValue;

/// Bring `layout`'s datastore up to `CURRENT_LAYOUT_VERSION`, running each
/// intermediate step in order and persisting the version marker as it goes
/// so an interrupted migration resumes from where it left off.
pub fn migrate(layout: &LayoutManager) -> Result<()> {
    let mut version = layout.get_version();

    if version == 0 {
        migrate_from_0(layout)?;
        version = 1;
        layout.set_version(version)?;
    }

    if version == 1 {
        migrate_1_to_2(layout)?;
        version = 2;
        layout.set_version(version)?;
    }

    if version != CURRENT_LAYOUT_VERSION {
        warn!(
            "layout version {} does not match the version this crate targets ({}); \
             proceeding without further migration",
            version, CURRENT_LAYOUT_VERSION
        );
    }

    Ok(())
}

/// Version 0 kept one `<uid>.metadata` JSON blob, one `<uid>` data file, and
/// a `preview/<uid>` file, all flat inside `root/store/`. Walk that
/// directory, reshape each entry into the sharded `root/<id[0:2]>/<id>/`
/// layout, then remove the legacy directory entirely.
/// Version 0 entries may predate `mime_type` normalization; any entry
/// missing the property gets it defaulted to an empty string here, before
/// the version bumps to 1.
fn migrate_from_0(layout: &LayoutManager) -> Result<()> {
    let old_root = layout.root_path().join("store");
    if !old_root.exists() {
        return Ok(());
    }

    info!("migrating datastore from version 0 to version 1");

    for entry in std::fs::read_dir(&old_root)? {
        let entry = entry?;
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(uid) = file_name.strip_suffix(".metadata") else {
            continue;
        };

        debug!("migrating entry {}", uid);
        if let Err(e) = migrate_entry_from_0(layout, &old_root, uid) {
            warn!("error migrating entry {}: {}", uid, e);
        }
    }

    std::fs::remove_dir_all(&old_root)?;
    info!("migration to version 1 finished");
    Ok(())
}

fn migrate_entry_from_0(layout: &LayoutManager, old_root: &std::path::Path, uid: &str) -> Result<()> {
    let metadata_dir = layout.get_metadata_path(uid);
    std::fs::create_dir_all(&metadata_dir)?;

    migrate_metadata_from_0(layout, old_root, uid)?;
    migrate_data_file_from_0(layout, old_root, uid)?;
    migrate_preview_from_0(layout, old_root, uid)?;
    Ok(())
}

fn migrate_metadata_from_0(layout: &LayoutManager, old_root: &std::path::Path, uid: &str) -> Result<()> {
    let old_metadata_path = old_root.join(format!("{}.metadata", uid));
    let raw = std::fs::read_to_string(&old_metadata_path)?;
    let parsed: BTreeMap<String, JsonValue> = serde_json::from_str(&raw)
        .map_err(|e| crate::error::StoreError::index_corrupt(format!("malformed legacy metadata for {}: {}", uid, e)))?;

    let metadata_store = MetadataStore::new(layout);

    if !parsed.contains_key(PROP_UID) {
        metadata_store.set_property(uid, PROP_UID, &PropertyValue::Text(uid.to_string()))?;
    }
    if !parsed.contains_key(PROP_MIME_TYPE) {
        metadata_store.set_property(uid, PROP_MIME_TYPE, &PropertyValue::Text(String::new()))?;
    }

    for (key, value) in &parsed {
        let property_value = json_to_property_value(value);
        metadata_store.set_property(uid, key, &property_value)?;
    }

    Ok(())
}

fn json_to_property_value(value: &JsonValue) -> PropertyValue {
    match value {
        JsonValue::String(s) => PropertyValue::Text(s.clone()),
        JsonValue::Number(n) if n.is_i64() => PropertyValue::Int(n.as_i64().unwrap()),
        JsonValue::Number(n) => PropertyValue::Float(n.as_f64().unwrap_or_default()),
        JsonValue::Bool(b) => PropertyValue::Text(b.to_string()),
        other => PropertyValue::Text(other.to_string()),
    }
}

fn migrate_data_file_from_0(layout: &LayoutManager, old_root: &std::path::Path, uid: &str) -> Result<()> {
    let old_data_path = old_root.join(uid);
    if old_data_path.exists() {
        std::fs::rename(old_data_path, layout.get_data_path(uid))?;
    }
    Ok(())
}

fn migrate_preview_from_0(layout: &LayoutManager, old_root: &std::path::Path, uid: &str) -> Result<()> {
    let old_preview_path = old_root.join("preview").join(uid);
    if old_preview_path.exists() {
        let new_path = layout.get_metadata_path(uid).join("preview");
        std::fs::rename(old_preview_path, new_path)?;
    }
    Ok(())
}

/// Every entry gets a `keep` property; entries that predate it default to
/// not-kept (`"0"`), matching the sense later versions of the original
/// datastore gave the property.
fn migrate_1_to_2(layout: &LayoutManager) -> Result<()> {
    info!("migrating datastore from version 1 to version 2");
    let metadata_store = MetadataStore::new(layout);

    for uid in layout.find_all()? {
        if metadata_store.get_property(&uid, PROP_KEEP)?.is_some() {
            continue;
        }
        metadata_store.set_property(&uid, PROP_KEEP, &PropertyValue::Text("0".to_string()))?;
    }

    info!("migration to version 2 finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_migrate_from_0_reshapes_legacy_entry() {
        let root = tempdir().unwrap();
        let layout = LayoutManager::new(root.path()).unwrap();

        let old_root = layout.root_path().join("store");
        std::fs::create_dir_all(&old_root).unwrap();
        std::fs::create_dir_all(old_root.join("preview")).unwrap();

        let uid = "77777777-7777-7777-7777-777777777777";
        std::fs::write(
            old_root.join(format!("{}.metadata", uid)),
            r#"{"title": "legacy entry", "timestamp": 123}"#,
        )
        .unwrap();
        std::fs::write(old_root.join(uid), b"legacy payload").unwrap();
        std::fs::write(old_root.join("preview").join(uid), b"thumb").unwrap();

        layout.set_version(0).unwrap();
        migrate(&layout).unwrap();

        assert_eq!(layout.get_version(), 2);
        assert!(!old_root.exists());

        let metadata_store = MetadataStore::new(&layout);
        let bag = metadata_store.retrieve(uid).unwrap();
        assert_eq!(bag.get("title").unwrap().as_text(), Some("legacy entry"));
        assert_eq!(bag.get(PROP_UID).unwrap().as_text(), Some(uid));
        assert_eq!(bag.get(PROP_KEEP).unwrap().as_text(), Some("0"));
        assert_eq!(bag.get(PROP_MIME_TYPE).unwrap().as_text(), Some(""));

        assert!(layout.get_data_path(uid).exists());
        assert!(layout.get_metadata_path(uid).join("preview").exists());
    }

    #[test]
    fn test_migrate_is_noop_when_already_current() {
        let root = tempdir().unwrap();
        let layout = LayoutManager::new(root.path()).unwrap();
        layout.set_version(CURRENT_LAYOUT_VERSION).unwrap();

        migrate(&layout).unwrap();
        assert_eq!(layout.get_version(), CURRENT_LAYOUT_VERSION);
    }

    #[test]
    fn test_migrate_1_to_2_defaults_missing_keep() {
        let root = tempdir().unwrap();
        let layout = LayoutManager::new(root.path()).unwrap();
        let metadata_store = MetadataStore::new(&layout);

        let uid = "88888888-8888-8888-8888-888888888888";
        metadata_store
            .set_property(uid, "title", &PropertyValue::Text("x".to_string()))
            .unwrap();

        layout.set_version(1).unwrap();
        migrate(&layout).unwrap();

        assert_eq!(layout.get_version(), 2);
        assert_eq!(
            metadata_store.get_property(uid, PROP_KEEP).unwrap().unwrap().as_text(),
            Some("0")
        );
    }
}
