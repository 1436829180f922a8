//! Entity variant configuration: merge-patch JSON loading into typed structs.
//!
//! World geometry, asset loading, and the on-disk config file formats
//! themselves are out of scope -- this module only covers what §4.6 and
//! §10.3 name: a [`VariantConfig`] that merges a base JSON tree with
//! per-variant overrides (RFC 7386 merge-patch semantics, the same as the
//! `config` WASM host namespace queries against) and surfaces the merged
//! tree both as a raw `serde_json::Value` (for `config::query`) and as typed
//! structs via `serde::Deserialize`.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while loading or querying entity variant configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required key was missing from the merged tree when deserializing
    /// into a typed struct.
    #[error("missing required config key: {path}")]
    MissingKey {
        /// Dotted path of the missing key.
        path: String,
    },
    /// A key existed but deserialized to the wrong type.
    #[error("config value at {path} has the wrong type: {source}")]
    WrongType {
        /// Dotted path of the offending key.
        path: String,
        /// Underlying deserialization error.
        #[source]
        source: serde_json::Error,
    },
    /// The raw JSON tree itself failed to parse.
    #[error("config JSON is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Merge-patch
// ---------------------------------------------------------------------------

/// Apply an RFC 7386 JSON merge-patch: `patch` is merged into `base` in
/// place. Object keys present in `patch` with a `null` value remove the key
/// from `base`; other keys overwrite or recurse. Non-object `patch` values
/// replace `base` wholesale.
pub fn merge_patch(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                if patch_value.is_null() {
                    base_map.remove(key);
                    continue;
                }
                match base_map.get_mut(key) {
                    Some(existing) => merge_patch(existing, patch_value),
                    None => {
                        base_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (base_slot, patch_value) => {
            *base_slot = patch_value.clone();
        }
    }
}

// ---------------------------------------------------------------------------
// VariantConfig
// ---------------------------------------------------------------------------

/// A merged configuration tree for one entity variant: a base config with
/// zero or more per-variant override layers merge-patched on top, in order.
///
/// Construction never defers errors into the tick loop -- a malformed base
/// or override tree, or a typed `get::<T>` call against a tree `T` can't
/// deserialize from, fails immediately at the call site.
#[derive(Debug, Clone)]
pub struct VariantConfig {
    merged: Value,
}

impl VariantConfig {
    /// Build a merged config from a base tree and an ordered list of
    /// override layers (each merge-patched on top of the previous result).
    pub fn new(base: Value, overrides: impl IntoIterator<Item = Value>) -> Self {
        let mut merged = base;
        for patch in overrides {
            merge_patch(&mut merged, &patch);
        }
        Self { merged }
    }

    /// Build a merged config by parsing JSON text layers, base first.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Malformed`] if any layer fails to parse.
    pub fn from_json_layers<'a>(
        layers: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, ConfigError> {
        let mut iter = layers.into_iter();
        let base: Value = match iter.next() {
            Some(text) => serde_json::from_str(text)?,
            None => Value::Object(serde_json::Map::new()),
        };
        let overrides: Result<Vec<Value>, _> =
            iter.map(|text| serde_json::from_str::<Value>(text)).collect();
        Ok(Self::new(base, overrides?))
    }

    /// The fully merged JSON tree, e.g. for `config::query` to walk.
    pub fn tree(&self) -> &Value {
        &self.merged
    }

    /// Look up a dotted/slashed path in the merged tree without
    /// deserializing it into a typed struct.
    pub fn query(&self, path: &str) -> Option<&Value> {
        path.split(['.', '/'])
            .filter(|segment| !segment.is_empty())
            .try_fold(&self.merged, |node, segment| node.get(segment))
    }

    /// Deserialize the whole merged tree into a typed config struct.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::WrongType`] if the tree doesn't match `T`'s
    /// shape (including missing required fields, which `serde` reports as a
    /// type error rather than a separate "missing key" case).
    pub fn get<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        serde_json::from_value(self.merged.clone()).map_err(|source| ConfigError::WrongType {
            path: "<root>".to_owned(),
            source,
        })
    }

    /// Deserialize the subtree at `path` into a typed struct.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingKey`] if `path` is absent, or
    /// [`ConfigError::WrongType`] if present but shaped wrong for `T`.
    pub fn get_at<T: DeserializeOwned>(&self, path: &str) -> Result<T, ConfigError> {
        let node = self.query(path).ok_or_else(|| ConfigError::MissingKey {
            path: path.to_owned(),
        })?;
        serde_json::from_value(node.clone()).map_err(|source| ConfigError::WrongType {
            path: path.to_owned(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn merge_patch_overwrites_scalar_keys() {
        let mut base = json!({"a": 1, "b": 2});
        merge_patch(&mut base, &json!({"b": 3}));
        assert_eq!(base, json!({"a": 1, "b": 3}));
    }

    #[test]
    fn merge_patch_null_removes_key() {
        let mut base = json!({"a": 1, "b": 2});
        merge_patch(&mut base, &json!({"b": null}));
        assert_eq!(base, json!({"a": 1}));
    }

    #[test]
    fn merge_patch_recurses_into_nested_objects() {
        let mut base = json!({"movementSettings": {"speed": 1.0, "jump": 2.0}});
        merge_patch(
            &mut base,
            &json!({"movementSettings": {"speed": 5.0}}),
        );
        assert_eq!(
            base,
            json!({"movementSettings": {"speed": 5.0, "jump": 2.0}})
        );
    }

    #[test]
    fn merge_patch_replaces_arrays_wholesale_not_elementwise() {
        let mut base = json!({"tags": ["a", "b", "c"]});
        merge_patch(&mut base, &json!({"tags": ["x"]}));
        assert_eq!(base, json!({"tags": ["x"]}));
    }

    #[test]
    fn variant_config_applies_layers_in_order() {
        let config = VariantConfig::new(
            json!({"statusSettings": {"maxHealth": 100}}),
            vec![
                json!({"statusSettings": {"maxHealth": 150}}),
                json!({"statusSettings": {"maxEnergy": 50}}),
            ],
        );
        assert_eq!(
            config.query("statusSettings.maxHealth"),
            Some(&json!(150))
        );
        assert_eq!(config.query("statusSettings.maxEnergy"), Some(&json!(50)));
    }

    #[test]
    fn query_accepts_dot_or_slash_separators() {
        let config = VariantConfig::new(json!({"a": {"b": {"c": 7}}}), vec![]);
        assert_eq!(config.query("a.b.c"), Some(&json!(7)));
        assert_eq!(config.query("a/b/c"), Some(&json!(7)));
    }

    #[test]
    fn query_missing_path_returns_none() {
        let config = VariantConfig::new(json!({"a": 1}), vec![]);
        assert_eq!(config.query("nope"), None);
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct MovementSettings {
        speed: f32,
        jump: f32,
    }

    #[test]
    fn get_at_deserializes_typed_subtree() {
        let config = VariantConfig::new(
            json!({"movementSettings": {"speed": 3.5, "jump": 1.2}}),
            vec![],
        );
        let settings: MovementSettings = config.get_at("movementSettings").unwrap();
        assert_eq!(
            settings,
            MovementSettings {
                speed: 3.5,
                jump: 1.2
            }
        );
    }

    #[test]
    fn get_at_missing_path_is_missing_key_error() {
        let config = VariantConfig::new(json!({}), vec![]);
        let result: Result<MovementSettings, _> = config.get_at("movementSettings");
        assert!(matches!(result, Err(ConfigError::MissingKey { .. })));
    }

    #[test]
    fn get_at_wrong_shape_is_wrong_type_error() {
        let config = VariantConfig::new(json!({"movementSettings": {"speed": "fast"}}), vec![]);
        let result: Result<MovementSettings, _> = config.get_at("movementSettings");
        assert!(matches!(result, Err(ConfigError::WrongType { .. })));
    }

    #[test]
    fn from_json_layers_merges_in_order() {
        let config = VariantConfig::from_json_layers([
            r#"{"a": 1, "b": 2}"#,
            r#"{"b": 3}"#,
        ])
        .unwrap();
        assert_eq!(config.tree(), &json!({"a": 1, "b": 3}));
    }

    #[test]
    fn from_json_layers_malformed_is_malformed_error() {
        let result = VariantConfig::from_json_layers(["{not json"]);
        assert!(matches!(result, Err(ConfigError::Malformed(_))));
    }
}
