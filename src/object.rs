//! Object metadata contracts consumed by the compiler and the workflow steps.
//!
//! Object and field definitions are owned by the platform; this layer only
//! needs to resolve field ids to storage locations and a few per-object facts.

use crate::ast::{RelationLink, Where};
use crate::error::{Error, Result};
use crate::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One selectable option of an enumerated (list) field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldOption {
    pub id: String,
    pub text: String,
}

/// Field metadata as defined on an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub id: String,
    pub column_name: String,
    /// Owning schema/table when the field comes from a related object (views).
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub multilingual: bool,
    #[serde(default)]
    pub relation: Option<RelationLink>,
    #[serde(default)]
    pub options: Vec<FieldOption>,
    #[serde(default)]
    pub default: Option<Value>,
}

/// A field with its physical location fully determined.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    pub id: String,
    pub schema: String,
    pub table: String,
    pub column: String,
    pub multilingual: bool,
    pub relation: Option<RelationLink>,
    pub options: Vec<FieldOption>,
}

/// What the query and workflow layers need to know about an object.
pub trait ObjectDefinition: Send + Sync {
    fn id(&self) -> &str;

    fn field_by_id(&self, field_id: &str) -> Option<ResolvedField>;

    fn primary_key(&self) -> &str;

    /// Table that updates are written to.
    fn table_name(&self) -> &str;

    /// Table or view the object is queried from.
    fn source_name(&self) -> &str;

    /// View-backed objects flatten related columns into `table.column` names.
    fn is_view(&self) -> bool;

    /// Condition the object itself is defined with (filtered views).
    fn base_condition(&self) -> Option<&Where>;

    /// Normalize an update payload and fill in defaults.
    fn request_params(&self, values: Row) -> Row;

    fn resolve_field(&self, field_id: &str) -> Result<ResolvedField> {
        self.field_by_id(field_id)
            .ok_or_else(|| Error::unknown_field(self.id(), field_id))
    }
}

fn default_primary_key() -> String {
    "uuid".to_string()
}

/// Object definition loaded from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSchema {
    pub id: String,
    pub schema: String,
    pub table: String,
    #[serde(default)]
    pub view: Option<String>,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default)]
    pub fields: Vec<FieldInfo>,
    #[serde(default, rename = "where")]
    pub condition: Option<Where>,
}

impl ObjectDefinition for ObjectSchema {
    fn id(&self) -> &str {
        &self.id
    }

    fn field_by_id(&self, field_id: &str) -> Option<ResolvedField> {
        self.fields.iter().find(|f| f.id == field_id).map(|f| ResolvedField {
            id: f.id.clone(),
            schema: f.schema.clone().unwrap_or_else(|| self.schema.clone()),
            table: f.table.clone().unwrap_or_else(|| self.table.clone()),
            column: f.column_name.clone(),
            multilingual: f.multilingual,
            relation: f.relation.clone(),
            options: f.options.clone(),
        })
    }

    fn primary_key(&self) -> &str {
        &self.primary_key
    }

    fn table_name(&self) -> &str {
        &self.table
    }

    fn source_name(&self) -> &str {
        self.view.as_deref().unwrap_or(&self.table)
    }

    fn is_view(&self) -> bool {
        self.view.is_some()
    }

    fn base_condition(&self) -> Option<&Where> {
        self.condition.as_ref()
    }

    fn request_params(&self, values: Row) -> Row {
        let mut params = Row::new();
        for (column, value) in values {
            let field = self.fields.iter().find(|f| f.column_name == column);
            if field.is_none() && column != self.primary_key {
                continue;
            }
            let value = match (value, field.and_then(|f| f.default.clone())) {
                (Value::Null, Some(default)) => default,
                (value, _) => value,
            };
            params.insert(column, value);
        }
        params
    }
}
