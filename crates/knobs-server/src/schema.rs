//! JSON description of the settings blocks a server exposes.
//!
//! ```json
//! { "blocks": [ {
//!     "namespace": "light", "path": "/light", "title": "Light",
//!     "fields": [
//!       { "key": "dayLength", "label": "Day length [h]", "kind": "integer",
//!         "default": 16, "min": 0, "max": 24 },
//!       { "key": "lvl", "label": "Levels", "kind": "integer",
//!         "default": 0, "values": [20, 60, 100] }
//!     ] } ] }
//! ```
//!
//! A field with `len` or `values` is an array. `min`/`max` clamp numeric
//! values after every submission.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use knobs_core::array::ArrayField;
use knobs_core::auth::AuthGate;
use knobs_core::block::{Entry, Registry, SettingsBlock};
use knobs_core::error::SettingsError;
use knobs_core::field::Field;
use knobs_core::value::{Value, ValueKind};
use knobs_storage::StorageBackend;

/// Blocks served when no schema file is configured.
pub const DEFAULT_SCHEMA: &str = r#"{
  "blocks": [
    {
      "namespace": "hydro",
      "path": "/hydro",
      "title": "Hydroponics",
      "fields": [
        { "key": "pumpA_relVol", "label": "Pump A relative volume", "kind": "float", "default": 1.0, "step": 0.01, "min": 0, "max": 10 },
        { "key": "mlPerDeltaEC", "label": "ml per delta EC", "kind": "float", "default": 5.0, "step": 0.1, "min": 0 },
        { "key": "targetEC", "label": "Target EC", "kind": "float", "default": 1.2, "step": 0.01, "min": 0, "max": 5 },
        { "key": "dryRun", "label": "Dry-run mode", "kind": "boolean", "default": true }
      ]
    },
    {
      "namespace": "light",
      "path": "/light",
      "title": "Light",
      "fields": [
        { "key": "dayLength", "label": "Day length [h]", "kind": "integer", "default": 16, "min": 0, "max": 24 },
        { "key": "dawnFade", "label": "Dawn fade [min]", "kind": "integer", "default": 30, "min": 0, "max": 240 },
        { "key": "lvl", "label": "Channel levels [%]", "kind": "integer", "default": 0, "values": [20, 60, 100], "min": 0, "max": 100 }
      ]
    }
  ]
}"#;

/// Paths owned by the server itself.
const RESERVED_PATHS: &[&str] = &["/login", "/logout", "/static", "/favicon.ico"];

/// Errors raised while reading a schema or building blocks from it.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("failed to read schema file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed schema: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("schema defines no blocks")]
    Empty,

    #[error("block '{namespace}': {reason}")]
    InvalidBlock { namespace: String, reason: String },

    #[error("field '{key}' in block '{namespace}': {reason}")]
    InvalidField {
        namespace: String,
        key: String,
        reason: String,
    },

    #[error("block '{namespace}': {source}")]
    Settings {
        namespace: String,
        #[source]
        source: SettingsError,
    },
}

/// Top-level schema document.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Schema {
    pub blocks: Vec<BlockSchema>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockSchema {
    pub namespace: String,
    pub path: String,
    #[serde(default)]
    pub title: Option<String>,
    pub fields: Vec<FieldSchema>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSchema {
    pub key: String,
    #[serde(default)]
    pub label: Option<String>,
    pub kind: ValueKind,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub step: Option<f32>,
    #[serde(default)]
    pub len: Option<usize>,
    #[serde(default)]
    pub values: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl FieldSchema {
    fn is_array(&self) -> bool {
        self.len.is_some() || self.values.is_some()
    }

    fn has_range(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }

    fn invalid(&self, namespace: &str, reason: impl Into<String>) -> SchemaError {
        SchemaError::InvalidField {
            namespace: namespace.to_owned(),
            key: self.key.clone(),
            reason: reason.into(),
        }
    }

    fn default_value(&self, namespace: &str) -> Result<Value, SchemaError> {
        match &self.default {
            None => Ok(Value::zero(self.kind)),
            Some(raw) => json_value(self.kind, raw)
                .ok_or_else(|| self.invalid(namespace, format!("default is not a {} value", self.kind))),
        }
    }

    fn check_range(&self, namespace: &str) -> Result<(), SchemaError> {
        if !self.has_range() {
            return Ok(());
        }
        if !matches!(self.kind, ValueKind::Float | ValueKind::Integer) {
            return Err(self.invalid(namespace, "min/max only apply to numeric fields"));
        }
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(self.invalid(namespace, format!("min {min} is greater than max {max}")));
            }
        }
        Ok(())
    }

    fn entry(&self, namespace: &str) -> Result<Entry, SchemaError> {
        self.check_range(namespace)?;
        let default = self.default_value(namespace)?;
        let label = self.label.clone().unwrap_or_else(|| self.key.clone());

        if !self.is_array() {
            let mut field = Field::new(self.key.clone(), label, default);
            if let Some(step) = self.step {
                field = field.with_step(step);
            }
            return Ok(Entry::Field(field));
        }

        let len = self.len.or(self.values.as_ref().map(Vec::len)).unwrap_or(0);
        let mut array = ArrayField::new(self.key.clone(), label, default, len);
        if let Some(step) = self.step {
            array = array.with_step(step);
        }
        if let Some(raw) = &self.values {
            let mut values = raw
                .iter()
                .map(|v| {
                    json_value(self.kind, v)
                        .ok_or_else(|| self.invalid(namespace, format!("array value is not a {} value", self.kind)))
                })
                .collect::<Result<Vec<_>, _>>()?;
            if len < values.len() {
                return Err(self.invalid(namespace, "len is shorter than values"));
            }
            values.resize(len, array.default_value().clone());
            array = array
                .with_values(values)
                .map_err(|source| SchemaError::Settings {
                    namespace: namespace.to_owned(),
                    source,
                })?;
        }
        Ok(Entry::Array(array))
    }
}

#[allow(clippy::cast_possible_truncation)]
fn json_value(kind: ValueKind, raw: &serde_json::Value) -> Option<Value> {
    match kind {
        ValueKind::Float => raw.as_f64().map(|v| Value::Float(v as f32)),
        ValueKind::Integer => raw.as_i64().and_then(|v| i32::try_from(v).ok()).map(Value::Integer),
        ValueKind::Boolean => raw.as_bool().map(Value::Boolean),
        ValueKind::Text => raw.as_str().map(|s| Value::Text(s.to_owned())),
    }
}

/// Clamp a numeric value into `[min, max]`; other kinds pass through.
#[allow(clippy::cast_possible_truncation)]
pub fn clamp_value(value: &Value, min: Option<f64>, max: Option<f64>) -> Value {
    match value {
        Value::Float(v) => {
            let mut v = f64::from(*v);
            if let Some(min) = min {
                v = v.max(min);
            }
            if let Some(max) = max {
                v = v.min(max);
            }
            Value::Float(v as f32)
        }
        Value::Integer(v) => {
            let mut v = f64::from(*v);
            if let Some(min) = min {
                v = v.max(min.ceil());
            }
            if let Some(max) = max {
                v = v.min(max.floor());
            }
            // in i32 range: both bounds came from an i32 or moved toward it
            Value::Integer(v as i32)
        }
        other => other.clone(),
    }
}

#[derive(Debug, Clone)]
struct Range {
    key: String,
    min: Option<f64>,
    max: Option<f64>,
}

fn clamp_registry(registry: &mut Registry, ranges: &[Range]) -> bool {
    for range in ranges {
        if let Some(field) = registry.field_mut(&range.key) {
            let clamped = clamp_value(field.value(), range.min, range.max);
            if &clamped != field.value() {
                debug!(key = %range.key, "clamping submitted value");
            }
            if let Err(e) = field.set(clamped) {
                warn!(key = %range.key, error = %e, "failed to clamp field");
            }
        } else if let Some(array) = registry.array_mut(&range.key) {
            for index in 0..array.len() {
                let clamped = clamp_value(&array.get(index), range.min, range.max);
                if let Err(e) = array.set(index, clamped) {
                    warn!(key = %range.key, index, error = %e, "failed to clamp array element");
                }
            }
        }
    }
    true
}

impl Schema {
    /// Parse a schema document.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Parse`] for malformed JSON or unknown fields and
    /// [`SchemaError::Empty`] if no block is defined.
    pub fn from_json(text: &str) -> Result<Self, SchemaError> {
        let schema: Self = serde_json::from_str(text)?;
        if schema.blocks.is_empty() {
            return Err(SchemaError::Empty);
        }
        Ok(schema)
    }

    /// Read and parse a schema file.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Io`] if the file cannot be read, otherwise as
    /// [`from_json`](Self::from_json).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// The built-in demo schema.
    ///
    /// # Errors
    ///
    /// Only if [`DEFAULT_SCHEMA`] itself is malformed.
    pub fn builtin() -> Result<Self, SchemaError> {
        Self::from_json(DEFAULT_SCHEMA)
    }

    /// Build one [`SettingsBlock`] per schema block. Values are not loaded.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] naming the first offending block or field.
    pub fn build_blocks(
        &self,
        storage: &Arc<dyn StorageBackend>,
        gate: &Arc<dyn AuthGate>,
        password: Option<&str>,
    ) -> Result<Vec<SettingsBlock>, SchemaError> {
        let mut namespaces = HashSet::new();
        let mut paths = HashSet::new();
        let mut blocks = Vec::with_capacity(self.blocks.len());

        for block in &self.blocks {
            let invalid = |reason: &str| SchemaError::InvalidBlock {
                namespace: block.namespace.clone(),
                reason: reason.to_owned(),
            };
            if !namespaces.insert(block.namespace.as_str()) {
                return Err(invalid("namespace is used by another block"));
            }
            if !paths.insert(block.path.clone()) || !paths.insert(format!("{}/update", block.path)) {
                return Err(invalid("path is used by another block"));
            }
            if RESERVED_PATHS
                .iter()
                .any(|r| block.path == *r || block.path.starts_with(&format!("{r}/")))
            {
                return Err(invalid("path is reserved by the server"));
            }

            let settings_error = |source| SchemaError::Settings {
                namespace: block.namespace.clone(),
                source,
            };

            let mut builder = SettingsBlock::builder(block.namespace.clone(), block.path.clone())
                .title(block.title.clone().unwrap_or_else(|| block.namespace.clone()))
                .password(password.map(str::to_owned))
                .gate(Arc::clone(gate));

            let mut ranges = Vec::new();
            for field in &block.fields {
                builder = match field.entry(&block.namespace)? {
                    Entry::Field(f) => builder.field(f),
                    Entry::Array(a) => builder.array(a),
                }
                .map_err(settings_error)?;
                if field.has_range() {
                    ranges.push(Range {
                        key: field.key.clone(),
                        min: field.min,
                        max: field.max,
                    });
                }
            }

            if !ranges.is_empty() {
                builder = builder.sanity_check(move |registry: &mut Registry| clamp_registry(registry, &ranges));
            }

            blocks.push(builder.build(Arc::clone(storage)).map_err(settings_error)?);
        }

        Ok(blocks)
    }
}
