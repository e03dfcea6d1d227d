//! Mapping configuration.
//!
//! ```json
//! {
//!   "mappings": {
//!     "facilities": [
//!       {"stream": "location", "properties": {"name": {"type": "record", "key": "name"}}}
//!     ],
//!     "facilities.children": [
//!       {"stream": "location", "properties": {"name": {"type": "record", "key": "name"}},
//!        "exclude": {"type": "record", "key": "deleted"}}
//!     ]
//!   },
//!   "meta": {"source": "crm"}
//! }
//! ```
//!
//! Keys of `mappings` are stream paths: the input stream name followed by the field
//! names leading to a nested collection. The config is built once at startup, with
//! an optional local side-file merged into `meta`, and never changes afterwards.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::transform::dsl::Expression;

/// Default location of the meta side-file (relative to current dir)
pub const DEFAULT_META_FILE: &str = "transform_meta.json";

/// One output stream produced from an input stream path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRule {
    /// Output stream name
    pub stream: String,

    /// Output field path -> expression, applied in order
    #[serde(default)]
    pub properties: IndexMap<String, Option<Expression>>,

    /// Skip the rule for records where this evaluates truthy
    #[serde(default)]
    pub exclude: Option<Expression>,
}

/// A malformed expression found by [`MappingConfig::check`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigProblem {
    /// Input stream path
    pub stream_path: String,
    /// Output stream of the rule
    pub output_stream: String,
    /// Output field, or `exclude`
    pub field: String,
    pub reason: String,
}

impl std::fmt::Display for ConfigProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} -> {}, field '{}': {}",
            self.stream_path, self.output_stream, self.field, self.reason
        )
    }
}

/// Process-wide mapping configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Stream path -> rules
    pub mappings: IndexMap<String, Vec<StreamRule>>,

    /// Free-form values for `config` expressions
    #[serde(default = "empty_object")]
    pub meta: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl MappingConfig {
    /// Load the config file, then merge the meta side-file if there is one.
    ///
    /// The config file must exist and contain `mappings`. The side-file is optional:
    /// if it is missing or unparsable it is ignored.
    pub fn load(config_path: &Path, meta_path: Option<&Path>) -> ConfigResult<Self> {
        let content = fs::read_to_string(config_path).map_err(|source| ConfigError::Io {
            path: config_path.display().to_string(),
            source,
        })?;
        let value: Value = serde_json::from_str(&content)?;
        let config = Self::from_value(value)?;

        info!(
            path = %config_path.display(),
            streams = config.mappings.len(),
            "Loaded mapping config"
        );

        Ok(match meta_path {
            Some(path) => config.with_meta_file(path),
            None => config,
        })
    }

    /// Build from an in-memory JSON value.
    pub fn from_value(value: Value) -> ConfigResult<Self> {
        let obj = value.as_object().ok_or(ConfigError::NotAnObject)?;
        if !obj.contains_key("mappings") {
            return Err(ConfigError::MissingKey("mappings"));
        }

        let mut config: MappingConfig = serde_json::from_value(value)?;
        if !config.meta.is_object() {
            config.meta = empty_object();
        }
        Ok(config)
    }

    /// Merge a side-file into `meta`. Missing or unparsable files are ignored.
    pub fn with_meta_file(self, path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "No meta side-file");
                return self;
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(overrides) => {
                info!(path = %path.display(), "Merging meta side-file");
                self.with_meta_overrides(overrides)
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Ignoring unparsable meta side-file");
                self
            }
        }
    }

    /// Merge top-level keys of `overrides` into `meta`; the overrides win.
    pub fn with_meta_overrides(mut self, overrides: Value) -> Self {
        let Value::Object(entries) = overrides else {
            debug!("Ignoring meta overrides that are not a JSON object");
            return self;
        };

        if let Value::Object(meta) = &mut self.meta {
            meta.extend(entries);
        } else {
            self.meta = Value::Object(entries);
        }
        self
    }

    /// Rules configured for a stream path (empty if none).
    pub fn rules(&self, stream: &str) -> &[StreamRule] {
        self.mappings.get(stream).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Immediate child segments of configured stream paths below `stream`.
    ///
    /// With `a.b`, `a.b.c` and `a.d` configured, `nested_segments("a")` is `["b", "d"]`.
    pub fn nested_segments(&self, stream: &str) -> Vec<&str> {
        let prefix = format!("{}.", stream);
        let segments: IndexSet<&str> = self
            .mappings
            .keys()
            .filter_map(|key| key.strip_prefix(prefix.as_str()))
            .filter_map(|rest| rest.split('.').next())
            .filter(|segment| !segment.is_empty())
            .collect();
        segments.into_iter().collect()
    }

    /// List every malformed expression node. These evaluate to `null` at runtime.
    pub fn check(&self) -> Vec<ConfigProblem> {
        let mut problems = Vec::new();

        for (stream_path, rules) in &self.mappings {
            for rule in rules {
                let fields = rule
                    .properties
                    .iter()
                    .filter_map(|(field, expr)| expr.as_ref().map(|e| (field.as_str(), e)))
                    .chain(rule.exclude.iter().map(|e| ("exclude", e)));

                for (field, expr) in fields {
                    for reason in expr.malformed_reasons() {
                        problems.push(ConfigProblem {
                            stream_path: stream_path.clone(),
                            output_stream: rule.stream.clone(),
                            field: field.to_string(),
                            reason,
                        });
                    }
                }
            }
        }

        problems
    }
}
