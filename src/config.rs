//! Engine configuration, loaded from a JSON file.

use crate::ast::RelationLink;
use crate::error::Error;
use crate::object::{FieldInfo, FieldOption, ObjectSchema};
use crate::retry::RetryPolicy;
use crate::workflow::DEFAULT_UPDATE_TOPIC;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use std::path::Path;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    Missing(String),

    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config file {path}: {message}")]
    Invalid { path: String, message: String },
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}

fn default_topic() -> String {
    DEFAULT_UPDATE_TOPIC.to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default = "default_topic")]
    pub notification_topic: String,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub log_json: bool,
    #[serde(default)]
    pub objects: Vec<ObjectSchema>,
}

impl EngineConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(ConfigError::Missing(path_ref.display().to_string()));
        }

        let content = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_ref.display().to_string(),
            source,
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path_ref.display().to_string(),
            source,
        })?;

        config.retry.validate().map_err(|message| ConfigError::Invalid {
            path: path_ref.display().to_string(),
            message,
        })?;
        Ok(config)
    }

    pub fn object(&self, id: &str) -> Option<&ObjectSchema> {
        self.objects.iter().find(|o| o.id == id)
    }
}

impl Default for EngineConfig {
    /// Built-in settings with a single demo object.
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            notification_topic: default_topic(),
            log_filter: default_log_filter(),
            log_json: false,
            objects: vec![demo_object()],
        }
    }
}

fn demo_field(id: &str, column: &str) -> FieldInfo {
    FieldInfo {
        id: id.to_string(),
        column_name: column.to_string(),
        schema: None,
        table: None,
        multilingual: false,
        relation: None,
        options: Vec::new(),
        default: None,
    }
}

fn demo_object() -> ObjectSchema {
    ObjectSchema {
        id: "todo".to_string(),
        schema: "appbuilder".to_string(),
        table: "AB_Todo".to_string(),
        view: None,
        primary_key: "uuid".to_string(),
        fields: vec![
            FieldInfo {
                multilingual: true,
                ..demo_field("a3f6c0d2-5e8b-4c1a-9f47-1b2c3d4e5f01", "title")
            },
            FieldInfo {
                options: vec![
                    FieldOption {
                        id: "open".to_string(),
                        text: "Open".to_string(),
                    },
                    FieldOption {
                        id: "done".to_string(),
                        text: "Done".to_string(),
                    },
                ],
                default: Some(json!("open")),
                ..demo_field("a3f6c0d2-5e8b-4c1a-9f47-1b2c3d4e5f02", "status")
            },
            demo_field("a3f6c0d2-5e8b-4c1a-9f47-1b2c3d4e5f03", "priority"),
            FieldInfo {
                relation: Some(RelationLink {
                    table: "SITE_USER".to_string(),
                    schema: Some("appbuilder".to_string()),
                    primary_key: "uuid".to_string(),
                }),
                ..demo_field("a3f6c0d2-5e8b-4c1a-9f47-1b2c3d4e5f04", "owner")
            },
        ],
        condition: None,
    }
}
