//! Argument normalizer
//!
//! Models often emit tool arguments in a near-miss shape: a lone entity
//! instead of a list, `file_path` instead of `path`, a string where an array
//! is required. Adapters registered per tool name reshape those payloads into
//! what the provider validates against. Every adapter leaves an already
//! canonical payload untouched.

use serde_json::{json, Map, Value};
use std::collections::HashMap;
use thiserror::Error;
use tracing::trace;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("ARGUMENTS FOR '{tool}' MUST BE AN OBJECT, GOT {found}")]
    NotAnObject { tool: String, found: String },
}

/// Rewrites one tool's argument object in place
pub type Adapter = fn(&mut Map<String, Value>);

/// Adapters keyed by lower-cased tool name
#[derive(Clone)]
pub struct ArgumentNormalizer {
    adapters: HashMap<String, Adapter>,
}

impl Default for ArgumentNormalizer {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl ArgumentNormalizer {
    /// No adapters; every payload passes through
    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Adapters for the filesystem and memory providers
    pub fn with_builtin() -> Self {
        let mut normalizer = Self::empty();

        for tool in [
            "read_file",
            "list_directory",
            "create_directory",
            "get_file_info",
            "directory_tree",
        ] {
            normalizer.register(tool, path_alias);
        }
        normalizer.register("write_file", write_file);
        normalizer.register("read_multiple_files", read_multiple_files);
        normalizer.register("move_file", move_file);
        normalizer.register("search_files", search_files);
        normalizer.register("create_entities", create_entities);
        normalizer.register("create_relations", create_relations);
        normalizer.register("add_observations", add_observations);
        normalizer.register("search_nodes", search_nodes);
        normalizer.register("open_nodes", names_list);
        normalizer.register("delete_entities", names_list);

        normalizer
    }

    /// Add or replace the adapter for `tool`
    pub fn register(&mut self, tool: &str, adapter: Adapter) {
        self.adapters.insert(tool.to_lowercase(), adapter);
    }

    pub fn has(&self, tool: &str) -> bool {
        self.adapters.contains_key(&tool.to_lowercase())
    }

    /// Reshape `payload` for `tool`. Tools without an adapter pass through unchanged.
    pub fn normalize(&self, tool: &str, payload: Value) -> Result<Value, NormalizeError> {
        let Some(adapter) = self.adapters.get(&tool.to_lowercase()) else {
            return Ok(payload);
        };

        let mut map = match payload {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(NormalizeError::NotAnObject {
                    tool: tool.to_string(),
                    found: kind_of(&other).to_string(),
                })
            }
        };

        adapter(&mut map);
        trace!("normalized {} arguments: {:?}", tool, map);
        Ok(Value::Object(map))
    }
}

impl std::fmt::Debug for ArgumentNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tools: Vec<_> = self.adapters.keys().collect();
        tools.sort();
        f.debug_struct("ArgumentNormalizer")
            .field("tools", &tools)
            .finish()
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Move the first present alias to `key` unless `key` is already set
fn rename(map: &mut Map<String, Value>, aliases: &[&str], key: &str) {
    if map.contains_key(key) {
        return;
    }
    for alias in aliases {
        if let Some(value) = map.remove(*alias) {
            map.insert(key.to_string(), value);
            return;
        }
    }
}

/// Fill `key` when missing or null
fn default(map: &mut Map<String, Value>, key: &str, value: Value) {
    match map.get(key) {
        Some(v) if !v.is_null() => {}
        _ => {
            map.insert(key.to_string(), value);
        }
    }
}

/// A lone value where a list is required becomes a one-element list
fn listify(map: &mut Map<String, Value>, key: &str) {
    if let Some(value) = map.get_mut(key) {
        if !value.is_array() && !value.is_null() {
            let item = value.take();
            *value = Value::Array(vec![item]);
        }
    }
}

/// `{key: [..]}` from either a proper list, a lone object under `key`, or the
/// item's fields spread at top level (detected by `marker`)
fn wrap_items(map: &mut Map<String, Value>, key: &str, marker: &str) {
    match map.get(key) {
        Some(Value::Array(_)) => {}
        Some(Value::Object(_)) => listify(map, key),
        _ if map.contains_key(marker) => {
            let item = std::mem::take(map);
            map.insert(key.to_string(), Value::Array(vec![Value::Object(item)]));
        }
        _ => default(map, key, json!([])),
    }
}

fn for_each_item(map: &mut Map<String, Value>, key: &str, f: fn(&mut Map<String, Value>)) {
    if let Some(Value::Array(items)) = map.get_mut(key) {
        for item in items.iter_mut() {
            if let Value::Object(obj) = item {
                f(obj);
            }
        }
    }
}

fn path_alias(map: &mut Map<String, Value>) {
    rename(
        map,
        &["file_path", "filepath", "filename", "dir", "directory"],
        "path",
    );
}

fn write_file(map: &mut Map<String, Value>) {
    path_alias(map);
    default(map, "content", json!(""));
}

fn read_multiple_files(map: &mut Map<String, Value>) {
    if !map.contains_key("paths") {
        if let Some(Value::String(_)) = map.get("path") {
            rename(map, &["path"], "paths");
        }
    }
    listify(map, "paths");
    default(map, "paths", json!([]));
}

fn move_file(map: &mut Map<String, Value>) {
    rename(map, &["from", "src"], "source");
    rename(map, &["to", "dest"], "destination");
}

fn search_files(map: &mut Map<String, Value>) {
    path_alias(map);
    rename(map, &["query"], "pattern");
    default(map, "path", json!("."));
    default(map, "excludePatterns", json!([]));
    listify(map, "excludePatterns");
}

fn create_entities(map: &mut Map<String, Value>) {
    wrap_items(map, "entities", "name");
    for_each_item(map, "entities", |entity| {
        default(entity, "entityType", json!("entity"));
        default(entity, "observations", json!([]));
        listify(entity, "observations");
    });
}

fn create_relations(map: &mut Map<String, Value>) {
    wrap_items(map, "relations", "from");
    for_each_item(map, "relations", |relation| {
        default(relation, "relationType", json!("related_to"));
    });
}

fn add_observations(map: &mut Map<String, Value>) {
    let listed = matches!(
        map.get("observations"),
        Some(Value::Array(_)) | Some(Value::Object(_))
    );
    if !listed && (map.contains_key("entityName") || map.contains_key("name")) {
        let item = std::mem::take(map);
        map.insert("observations".to_string(), json!([Value::Object(item)]));
    }
    wrap_items(map, "observations", "entityName");
    for_each_item(map, "observations", |entry| {
        rename(entry, &["name"], "entityName");
        default(entry, "contents", json!([]));
        listify(entry, "contents");
    });
}

fn search_nodes(map: &mut Map<String, Value>) {
    rename(map, &["q", "search"], "query");
    default(map, "query", json!(""));
}

fn names_list(map: &mut Map<String, Value>) {
    if !map.contains_key("names") {
        rename(map, &["name"], "names");
    }
    listify(map, "names");
    default(map, "names", json!([]));
}
