//! Core frontmatter extraction and the tool-owned `metadata.sync` block.
//!
//! Both the fingerprint and the conflict normalizer go through
//! [`canonical_json`], so they always agree on what counts as equal.

use std::collections::BTreeMap;

use serde_yaml::{Mapping, Value};

use crate::skill::{Frontmatter, CORE_FIELDS, SYNC_VERSION};

const SYNC_KEY: &str = "sync";
const METADATA_KEY: &str = "metadata";

/// Parsed `metadata.sync` block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncMetadata {
    pub version: Option<u64>,
    pub hash: Option<String>,
    pub files: BTreeMap<String, String>,
}

impl SyncMetadata {
    /// Read `metadata.sync` from frontmatter. Missing or malformed parts are empty.
    pub fn read(frontmatter: &Frontmatter) -> Self {
        let Some(Value::Mapping(sync)) = frontmatter
            .get(METADATA_KEY)
            .and_then(|meta| meta.get(SYNC_KEY))
        else {
            return Self::default();
        };

        let version = sync.get("version").and_then(Value::as_u64);
        let hash = sync
            .get("hash")
            .and_then(Value::as_str)
            .map(str::to_string);
        let files = match sync.get("files") {
            Some(Value::Mapping(files)) => files
                .iter()
                .filter_map(|(path, hash)| {
                    Some((path.as_str()?.to_string(), hash.as_str()?.to_string()))
                })
                .collect(),
            _ => BTreeMap::new(),
        };

        Self {
            version,
            hash,
            files,
        }
    }

    /// Full block carried by canonical occurrences.
    pub fn canonical(hash: &str, files: &BTreeMap<String, String>) -> Value {
        let mut file_map = Mapping::new();
        for (path, file_hash) in files {
            file_map.insert(Value::from(path.as_str()), Value::from(file_hash.as_str()));
        }
        let mut sync = Mapping::new();
        sync.insert(Value::from("version"), Value::from(SYNC_VERSION));
        sync.insert(Value::from("hash"), Value::from(hash));
        sync.insert(Value::from("files"), Value::Mapping(file_map));
        Value::Mapping(sync)
    }

    /// Lightweight block carried by platform references.
    pub fn reference(hash: &str) -> Value {
        let mut sync = Mapping::new();
        sync.insert(Value::from("version"), Value::from(SYNC_VERSION));
        sync.insert(Value::from("hash"), Value::from(hash));
        Value::Mapping(sync)
    }
}

/// Hash recorded in `metadata.sync.hash`, if any.
pub fn stored_hash(frontmatter: &Frontmatter) -> Option<String> {
    SyncMetadata::read(frontmatter).hash
}

/// The synchronized subset of frontmatter, with `metadata.sync` removed.
pub fn core_frontmatter(frontmatter: &Frontmatter) -> Frontmatter {
    let mut core = Frontmatter::new();
    for field in CORE_FIELDS {
        let Some(value) = frontmatter.get(field) else {
            continue;
        };
        if field == METADATA_KEY {
            if let Value::Mapping(map) = value {
                let mut stripped = map.clone();
                stripped.remove(SYNC_KEY);
                if !stripped.is_empty() {
                    core.insert(field.to_string(), Value::Mapping(stripped));
                }
                continue;
            }
        }
        core.insert(field.to_string(), value.clone());
    }
    core
}

/// Frontmatter fields a platform keeps for itself (e.g. a model selector).
///
/// The legacy top-level `sync` stamp is dropped here so it disappears on the
/// next rewrite.
pub fn platform_fields(frontmatter: &Frontmatter) -> Frontmatter {
    frontmatter
        .iter()
        .filter(|(key, _)| !CORE_FIELDS.contains(&key.as_str()) && key.as_str() != SYNC_KEY)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Assemble frontmatter from core fields, platform-local fields and a sync block.
pub fn compose_frontmatter(core: &Frontmatter, local: &Frontmatter, sync: Value) -> Frontmatter {
    let mut frontmatter = local.clone();
    frontmatter.extend(core.iter().map(|(key, value)| (key.clone(), value.clone())));

    let mut metadata = match frontmatter.remove(METADATA_KEY) {
        Some(Value::Mapping(map)) => map,
        _ => Mapping::new(),
    };
    metadata.insert(Value::from(SYNC_KEY), sync);
    frontmatter.insert(METADATA_KEY.to_string(), Value::Mapping(metadata));
    frontmatter
}

/// Deterministic JSON encoding with mapping keys sorted at every depth.
pub fn canonical_json(frontmatter: &Frontmatter) -> String {
    let object: serde_json::Map<String, serde_json::Value> = frontmatter
        .iter()
        .map(|(key, value)| (key.clone(), to_sorted_json(value)))
        .collect();
    serialize_sorted(&serde_json::Value::Object(object))
}

fn to_sorted_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(num) => {
            if let Some(int) = num.as_i64() {
                serde_json::Value::from(int)
            } else if let Some(uint) = num.as_u64() {
                serde_json::Value::from(uint)
            } else {
                num.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(serde_json::Value::Number)
                    .unwrap_or_else(|| serde_json::Value::String(num.to_string()))
            }
        }
        Value::String(text) => serde_json::Value::String(text.clone()),
        Value::Sequence(items) => {
            serde_json::Value::Array(items.iter().map(to_sorted_json).collect())
        }
        Value::Mapping(map) => serde_json::Value::Object(
            map.iter()
                .map(|(key, val)| (mapping_key(key), to_sorted_json(val)))
                .collect(),
        ),
        Value::Tagged(tagged) => {
            let mut object = serde_json::Map::new();
            object.insert(tagged.tag.to_string(), to_sorted_json(&tagged.value));
            serde_json::Value::Object(object)
        }
    }
}

fn mapping_key(key: &Value) -> String {
    match key {
        Value::String(text) => text.clone(),
        other => serde_yaml::to_string(other)
            .map(|text| text.trim_end().to_string())
            .unwrap_or_default(),
    }
}

// serde_json's map ordering depends on the `preserve_order` feature, which
// any crate in the graph may switch on; emit objects with explicit sorting.
fn serialize_sorted(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<(&String, &serde_json::Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let body = entries
                .into_iter()
                .map(|(key, val)| {
                    format!(
                        "{}:{}",
                        serde_json::Value::String(key.clone()),
                        serialize_sorted(val)
                    )
                })
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{body}}}")
        }
        serde_json::Value::Array(items) => {
            let body = items
                .iter()
                .map(serialize_sorted)
                .collect::<Vec<_>>()
                .join(",");
            format!("[{body}]")
        }
        scalar => scalar.to_string(),
    }
}
