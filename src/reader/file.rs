//! TQ-010: Directory-backed reader.
//!
//! Layout of a reader directory:
//!
//! ```text
//! <dir>/reader.yaml                 namespace + profiles
//! <dir>/item_schema.json
//! <dir>/link_schema.json
//! <dir>/data/<profile>/<type>.json  array of JSON objects, `id` is the identifier
//! ```

use super::{select, Item, Properties, Reader};
use crate::core::schema::SchemaSource;
use crate::core::types::Condition;
use crate::error::ReaderError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const MANIFEST_FILE: &str = "reader.yaml";
pub const ITEM_SCHEMA_FILE: &str = "item_schema.json";
pub const LINK_SCHEMA_FILE: &str = "link_schema.json";
pub const DATA_DIR: &str = "data";

/// `reader.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderManifest {
    pub namespace: String,

    #[serde(default)]
    pub profiles: Vec<String>,
}

/// Reader over a directory of JSON record files.
#[derive(Debug, Clone)]
pub struct FileReader {
    root: PathBuf,
    manifest: ReaderManifest,
}

impl FileReader {
    /// Open a reader directory and load its manifest.
    pub fn open(root: &Path) -> Result<Self, ReaderError> {
        let path = root.join(MANIFEST_FILE);
        let content = std::fs::read_to_string(&path).map_err(|source| ReaderError::Io {
            path: path.clone(),
            source,
        })?;
        let manifest: ReaderManifest =
            serde_yaml_ng::from_str(&content).map_err(|e| ReaderError::Data {
                path: path.clone(),
                message: e.to_string(),
            })?;
        if manifest.namespace.is_empty() || manifest.namespace.contains('.') {
            return Err(ReaderError::Data {
                path,
                message: format!("invalid namespace \"{}\"", manifest.namespace),
            });
        }
        debug!(
            namespace = %manifest.namespace,
            profiles = manifest.profiles.len(),
            root = %root.display(),
            "opened reader"
        );
        Ok(Self {
            root: root.to_path_buf(),
            manifest,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the record file for one profile and type.
    pub fn data_path(&self, profile: &str, item_type: &str) -> PathBuf {
        self.root
            .join(DATA_DIR)
            .join(profile)
            .join(format!("{}.json", item_type))
    }

    fn load_records(&self, profile: &str, item_type: &str) -> Result<Vec<Item>, ReaderError> {
        let path = self.data_path(profile, item_type);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path).map_err(|source| ReaderError::Io {
            path: path.clone(),
            source,
        })?;
        let rows: Vec<serde_json::Map<String, serde_json::Value>> =
            serde_json::from_str(&content).map_err(|e| ReaderError::Data {
                path: path.clone(),
                message: e.to_string(),
            })?;

        rows.into_iter()
            .enumerate()
            .map(|(i, row)| {
                let properties: Properties = row
                    .iter()
                    .map(|(k, v)| (k.clone(), json_value_to_string(v)))
                    .collect();
                let identifier = properties.get("id").cloned().ok_or_else(|| {
                    ReaderError::Data {
                        path: path.clone(),
                        message: format!("record {} has no \"id\" field", i),
                    }
                })?;
                Ok(Item {
                    profile: profile.to_string(),
                    identifier,
                    properties,
                })
            })
            .collect()
    }
}

impl Reader for FileReader {
    fn namespace(&self) -> &str {
        &self.manifest.namespace
    }

    fn item_schema(&self) -> SchemaSource {
        SchemaSource::File(self.root.join(ITEM_SCHEMA_FILE))
    }

    fn link_schema(&self) -> SchemaSource {
        SchemaSource::File(self.root.join(LINK_SCHEMA_FILE))
    }

    fn supported_profiles(&self) -> Vec<String> {
        self.manifest.profiles.clone()
    }

    fn get_items(
        &self,
        item_type: &str,
        profiles: &[String],
        attrs: &[String],
        conditions: &[Condition],
    ) -> Result<Vec<Item>, ReaderError> {
        let mut raw = Vec::new();
        let mut failure = None;
        for profile in profiles {
            if !self.manifest.profiles.contains(profile) {
                continue;
            }
            match self.load_records(profile, item_type) {
                Ok(records) => raw.extend(records),
                Err(e) if failure.is_none() => failure = Some(e),
                Err(_) => {}
            }
        }
        let items = select(raw, attrs, conditions);
        match failure {
            None => Ok(items),
            Some(e) if items.is_empty() => Err(e),
            Some(e) => Err(ReaderError::Partial {
                items,
                source: Box::new(e),
            }),
        }
    }
}

/// Convert a JSON value to its attribute string form.
pub fn json_value_to_string(val: &serde_json::Value) -> String {
    match val {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
