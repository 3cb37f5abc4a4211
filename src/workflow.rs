//! Process step chains.
//!
//! A chain runs its operations strictly one after another. Each operation
//! receives the context produced by its predecessor and returns a new one;
//! contexts are never modified in place, they only grow a trail of the
//! snapshots that led to them.
//!
//! ```text
//! start ──▶ op[0].perform ──▶ op[1].perform ──▶ … ──▶ final context
//!             │ no object / no row?
//!             └──▶ pass through (same object, no row), logged with the trail
//! ```

use crate::bus::ServiceBus;
use crate::error::{Error, Result};
use crate::object::ObjectDefinition;
use crate::options::UserData;
use crate::retry::RetryPolicy;
use crate::storage::{Storage, TransactionScope};
use crate::Row;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

pub const DEFAULT_UPDATE_TOPIC: &str = "appbuilder.model-update";

/// What a context looked like when a later step was derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextSnapshot {
    pub label: String,
    pub object: Option<String>,
    pub data: Option<Row>,
}

/// State handed from one step to the next.
#[derive(Clone)]
pub struct ExecutionContext {
    pub label: String,
    pub object: Option<Arc<dyn ObjectDefinition>>,
    pub data: Option<Row>,
    /// Predecessors, oldest first.
    pub prev: Vec<ContextSnapshot>,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("label", &self.label)
            .field("object", &self.object.as_ref().map(|o| o.id().to_string()))
            .field("data", &self.data)
            .field("prev", &self.prev)
            .finish()
    }
}

impl ExecutionContext {
    /// Starting context with an empty trail.
    pub fn new(label: impl Into<String>, object: Option<Arc<dyn ObjectDefinition>>, data: Option<Row>) -> Self {
        Self {
            label: label.into(),
            object,
            data,
            prev: Vec::new(),
        }
    }

    fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            label: self.label.clone(),
            object: self.object.as_ref().map(|o| o.id().to_string()),
            data: self.data.clone(),
        }
    }

    /// Context for the next step: same object, no row yet, `self` appended to the trail.
    pub fn successor(&self, label: impl Into<String>) -> Self {
        let mut prev = self.prev.clone();
        prev.push(self.snapshot());
        Self {
            label: label.into(),
            object: self.object.clone(),
            data: None,
            prev,
        }
    }

    /// Attach the row this step produced.
    pub fn with_data(mut self, data: Row) -> Self {
        self.data = Some(data);
        self
    }

    /// One line per context, newest first.
    pub fn traceback(&self) -> Vec<String> {
        std::iter::once(self.snapshot())
            .chain(self.prev.iter().rev().cloned())
            .map(|s| {
                format!(
                    "{} object={} data={}",
                    s.label,
                    s.object.as_deref().unwrap_or("-"),
                    s.data
                        .map(|d| Value::Object(d).to_string())
                        .unwrap_or_else(|| "null".to_string())
                )
            })
            .collect()
    }
}

/// The running process instance a chain belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessInstance {
    pub id: Uuid,
    pub process_id: String,
    pub values: Value,
}

impl ProcessInstance {
    /// Fresh instance id with no stored values.
    pub fn new(process_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            process_id: process_id.into(),
            values: Value::Null,
        }
    }
}

/// Request-scoped services available to steps.
#[derive(Clone)]
pub struct ServiceRequest {
    pub user: UserData,
    pub storage: Arc<dyn Storage>,
    pub bus: Arc<dyn ServiceBus>,
    pub retry_policy: RetryPolicy,
    pub update_topic: String,
}

impl ServiceRequest {
    /// Default retry policy and the platform update topic.
    pub fn new(user: UserData, storage: Arc<dyn Storage>, bus: Arc<dyn ServiceBus>) -> Self {
        Self {
            user,
            storage,
            bus,
            retry_policy: RetryPolicy::default(),
            update_topic: DEFAULT_UPDATE_TOPIC.to_string(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Topic the update notification is published on.
    pub fn with_update_topic(mut self, topic: impl Into<String>) -> Self {
        self.update_topic = topic.into();
        self
    }

    /// Run `operation` under this request's retry policy.
    pub async fn retry<T, F, Fut>(&self, label: &str, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.retry_policy.run(label, operation).await
    }

    /// Round trip over the bus. Every failure surfaces as a notification error.
    pub async fn service_request(&self, topic: &str, payload: Value) -> Result<Value> {
        self.bus.request(topic, payload).await.map_err(|e| match e {
            e @ Error::Notification { .. } => e,
            other => Error::Notification {
                topic: topic.to_string(),
                message: other.to_string(),
            },
        })
    }
}

/// Everything a step may touch besides its input context.
pub struct StepEnv<'a> {
    pub instance: &'a ProcessInstance,
    pub trx: Option<&'a TransactionScope>,
    pub req: &'a ServiceRequest,
}

/// Input of a step whose predecessor produced an object and a row.
pub struct ActiveStep<'a> {
    pub context: &'a ExecutionContext,
    pub object: &'a Arc<dyn ObjectDefinition>,
    pub data: &'a Row,
}

/// One operation of a process step chain.
#[async_trait]
pub trait QlOperation: Send + Sync {
    fn label(&self) -> &str;

    /// Produce the successor context. Only called when there is an object and a row.
    async fn perform(&self, current: ActiveStep<'_>, env: &StepEnv<'_>) -> Result<ExecutionContext>;
}

/// Ordered operations run over one context.
#[derive(Default)]
pub struct OperationChain {
    operations: Vec<Box<dyn QlOperation>>,
}

impl OperationChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step; steps run in insertion order.
    pub fn then(mut self, operation: impl QlOperation + 'static) -> Self {
        self.operations.push(Box::new(operation));
        self
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Run every operation in order. The first failure ends the chain and no
    /// later step sees a context.
    pub async fn run(
        &self,
        start: ExecutionContext,
        instance: &ProcessInstance,
        trx: Option<&TransactionScope>,
        req: &ServiceRequest,
    ) -> Result<ExecutionContext> {
        let env = StepEnv { instance, trx, req };
        let mut context = start;
        for operation in &self.operations {
            context = run_step(operation.as_ref(), context, &env).await?;
        }
        Ok(context)
    }
}

async fn run_step(operation: &dyn QlOperation, context: ExecutionContext, env: &StepEnv<'_>) -> Result<ExecutionContext> {
    let (Some(object), Some(data)) = (context.object.as_ref(), context.data.as_ref()) else {
        report_chain_state(operation.label(), &context);
        return Ok(context.successor(operation.label()));
    };

    let current = ActiveStep {
        context: &context,
        object,
        data,
    };
    operation
        .perform(current, env)
        .await
        .inspect_err(|e| {
            tracing::error!(
                step = operation.label(),
                instance = %env.instance.id,
                error = %e,
                traceback = ?context.traceback(),
                "process step failed"
            );
        })
}

/// A step reached with no object or no row is passed through, not failed.
fn report_chain_state(label: &str, context: &ExecutionContext) {
    let reason = if context.object.is_none() {
        "no object"
    } else {
        "no data"
    };
    let err = Error::ChainState(format!("{} provided to {}", reason, label));
    tracing::warn!(error = %err, traceback = ?context.traceback(), "passing context through");
}
