//! The row update operation: write values onto the current row, then tell
//! the rest of the platform about it.

use crate::error::{Error, Result};
use crate::model::ObjectModel;
use crate::workflow::{ActiveStep, ExecutionContext, QlOperation, StepEnv};
use crate::Row;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One configured assignment: field id and the value to store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateValue {
    #[serde(rename = "fieldId")]
    pub field_id: String,
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowUpdate {
    #[serde(default)]
    pub values: Vec<UpdateValue>,
}

impl RowUpdate {
    pub fn new(values: Vec<UpdateValue>) -> Self {
        Self { values }
    }

    /// Add one `field id = value` assignment.
    pub fn set(mut self, field_id: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.push(UpdateValue {
            field_id: field_id.into(),
            value: value.into(),
        });
        self
    }
}

#[async_trait]
impl QlOperation for RowUpdate {
    fn label(&self) -> &str {
        "row_update"
    }

    /// Writes with retry, then waits for the update notification round trip.
    /// The successor carries the row returned by that round trip.
    async fn perform(&self, current: ActiveStep<'_>, env: &StepEnv<'_>) -> Result<ExecutionContext> {
        let next = current.context.successor(self.label());
        if self.values.is_empty() {
            return Ok(next);
        }

        let object = current.object.as_ref();
        let mut params = Row::new();
        for value in &self.values {
            let field = object.resolve_field(&value.field_id)?;
            params.insert(field.column, value.value.clone());
        }

        let id = current
            .data
            .get(object.primary_key())
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| {
                Error::storage(format!(
                    "current row of `{}` has no `{}` value",
                    object.id(),
                    object.primary_key()
                ))
            })?;

        let params = object.request_params(params);

        let model = ObjectModel::new(object, env.req.storage.as_ref());
        env.req
            .retry(self.label(), || model.update(&id, &params, env.trx))
            .await?;

        tracing::debug!(
            object = object.id(),
            id = %id,
            instance = %env.instance.id,
            "row updated, sending notification"
        );

        let topic = env.req.update_topic.as_str();
        let job = json!({
            "objectID": object.id(),
            "ID": id,
            "values": params,
        });
        match env.req.service_request(topic, job).await? {
            Value::Object(updated) => Ok(next.with_data(updated)),
            other => Err(Error::Notification {
                topic: topic.to_string(),
                message: format!("expected the updated row, got {}", other),
            }),
        }
    }
}
