use std::collections::BTreeMap;

/// Flat key/value metadata scoped to a single owner (API or policy).
pub type Metadata = BTreeMap<String, String>;

/// Free-form parameters carried by a policy application.
pub type Params = BTreeMap<String, String>;

/// Merge `entries` into `target`: existing keys are overwritten, new keys inserted.
pub fn merge_meta(target: &mut Metadata, entries: Metadata) {
    target.extend(entries);
}

/// Replace the whole map; nothing from before survives.
pub fn replace_meta(target: &mut Metadata, entries: Metadata) {
    *target = entries;
}

/// Remove one key, reporting whether it was present.
pub fn remove_meta(target: &mut Metadata, key: &str) -> bool {
    target.remove(key).is_some()
}
