//! Per-request inputs to a find: query options and the calling user.

use crate::ast::Where;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortField {
    #[serde(alias = "key")]
    pub field: String,
    #[serde(default, alias = "dir")]
    pub direction: SortDirection,
}

fn enabled() -> bool {
    true
}

/// Options recognized by [`ObjectModel::find_all`](crate::model::ObjectModel::find_all).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    #[serde(default, rename = "where")]
    pub condition: Option<Where>,
    #[serde(default)]
    pub sort: Vec<SortField>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub column_names: Option<Vec<String>>,
    #[serde(default = "enabled")]
    pub include_row_number: bool,
    #[serde(default = "enabled")]
    pub include_columns: bool,
    #[serde(default = "enabled")]
    pub rewrite_translations: bool,
    #[serde(default)]
    pub skip_existing_conditions: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            condition: None,
            sort: Vec::new(),
            offset: None,
            limit: None,
            column_names: None,
            include_row_number: true,
            include_columns: true,
            rewrite_translations: true,
            skip_existing_conditions: false,
        }
    }
}

impl QueryOptions {
    pub fn with_where(condition: Where) -> Self {
        Self {
            condition: Some(condition),
            ..Default::default()
        }
    }

    /// Options for the count query paired with this fetch: same predicate,
    /// no paging, no ordering, no row numbers, no reshaping.
    pub fn for_count(&self) -> Self {
        Self {
            condition: self.condition.clone(),
            sort: Vec::new(),
            offset: None,
            limit: None,
            column_names: None,
            include_row_number: false,
            include_columns: false,
            rewrite_translations: false,
            skip_existing_conditions: self.skip_existing_conditions,
        }
    }
}

/// The user a request runs on behalf of.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub language_code: Option<String>,
}

impl UserData {
    pub fn with_language(language_code: impl Into<String>) -> Self {
        Self {
            username: None,
            language_code: Some(language_code.into()),
        }
    }
}
