//! In-memory collaborators and fixtures shared by the unit tests.

use crate::ast::{ColumnExpr, CompiledWhere, Glue, RelationLink, RuleOp, Where};
use crate::bus::ServiceBus;
use crate::error::{Error, Result};
use crate::object::{FieldInfo, FieldOption, ObjectSchema};
use crate::options::SortDirection;
use crate::participant::{RoleRecord, SiteUser, UserDirectory};
use crate::sql_compiler::{CompiledQuery, CompiledUpdate, Projection, COUNT_COLUMN};
use crate::storage::{Storage, TransactionScope};
use crate::Row;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Mutex;
use uuid::Uuid;

pub const F_TITLE: &str = "6f1c2a4e-3b1d-4c59-9a7e-0d2b8e41c001";
pub const F_STATUS: &str = "6f1c2a4e-3b1d-4c59-9a7e-0d2b8e41c002";
pub const F_PRIORITY: &str = "6f1c2a4e-3b1d-4c59-9a7e-0d2b8e41c003";
pub const F_OWNER: &str = "6f1c2a4e-3b1d-4c59-9a7e-0d2b8e41c004";

fn field(id: &str, column: &str) -> FieldInfo {
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

/// Table-backed todo list with one field of each flavor.
pub fn todo_object() -> ObjectSchema {
    ObjectSchema {
        id: "todo".to_string(),
        schema: "appbuilder".to_string(),
        table: "AB_Todo".to_string(),
        view: None,
        primary_key: "uuid".to_string(),
        fields: vec![
            FieldInfo {
                multilingual: true,
                ..field(F_TITLE, "title")
            },
            FieldInfo {
                options: vec![
                    FieldOption {
                        id: "x1".to_string(),
                        text: "Open".to_string(),
                    },
                    FieldOption {
                        id: "x2".to_string(),
                        text: "Done".to_string(),
                    },
                ],
                default: Some(json!("x1")),
                ..field(F_STATUS, "status")
            },
            field(F_PRIORITY, "priority"),
            FieldInfo {
                relation: Some(RelationLink {
                    table: "SITE_USER".to_string(),
                    schema: Some("site".to_string()),
                    primary_key: "uuid".to_string(),
                }),
                ..field(F_OWNER, "owner")
            },
        ],
        condition: None,
    }
}

/// The same list exposed through a view that only shows open items.
pub fn todo_view() -> ObjectSchema {
    ObjectSchema {
        id: "todo_open".to_string(),
        view: Some("AB_Todo_view".to_string()),
        condition: Some(Where::rule(F_STATUS, RuleOp::Equals, "Open")),
        ..todo_object()
    }
}

pub fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("fixture row must be an object, got {other}"),
    }
}

/// Ten todos: `r0`..`r7` open, `r8` and `r9` done.
pub fn todo_rows() -> Vec<Row> {
    (0..10)
        .map(|i| {
            let status = if i < 8 { "x1" } else { "x2" };
            row(json!({
                "uuid": format!("r{i}"),
                "title": format!("Task {i}"),
                "status": status,
                "priority": i % 4 + 1,
                "owner": if i % 3 == 0 { Value::Null } else { json!("u1") },
                "translations": json!([
                    {"language_code": "en", "title": format!("Task {i}")},
                    {"language_code": "fr", "title": format!("Tâche {i}")}
                ])
                .to_string(),
            }))
        })
        .collect()
}

/// Storage that runs compiled query plans over rows kept in memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    transactions: Mutex<Vec<Uuid>>,
    update_calls: AtomicUsize,
    failing_updates: AtomicUsize,
}

impl MemoryStore {
    pub fn with_table(name: &str, rows: Vec<Row>) -> Self {
        let store = Self::default();
        store.tables.lock().unwrap().insert(name.to_string(), rows);
        store
    }

    /// Row of `table` whose `uuid` is `id`.
    pub fn row(&self, table: &str, id: &str) -> Option<Row> {
        let tables = self.tables.lock().unwrap();
        tables
            .get(table)?
            .iter()
            .find(|r| r.get("uuid").and_then(Value::as_str) == Some(id))
            .cloned()
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(AtomicOrdering::SeqCst)
    }

    /// The next `n` updates fail with a transient error.
    pub fn fail_next_updates(&self, n: usize) {
        self.failing_updates.store(n, AtomicOrdering::SeqCst);
    }

    /// Transaction ids seen by every call that received one.
    pub fn transactions_seen(&self) -> Vec<Uuid> {
        self.transactions.lock().unwrap().clone()
    }

    fn record(&self, trx: Option<&TransactionScope>) {
        if let Some(trx) = trx {
            self.transactions.lock().unwrap().push(trx.id);
        }
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn select(&self, query: &CompiledQuery, trx: Option<&TransactionScope>) -> Result<Vec<Row>> {
        self.record(trx);
        let tables = self.tables.lock().unwrap();
        let plan = &query.plan;
        let rows = tables
            .get(&plan.source)
            .ok_or_else(|| Error::storage(format!("Table '{}' doesn't exist", plan.source)))?;

        let mut matched: Vec<Row> = rows
            .iter()
            .filter(|r| plan.condition.as_ref().map_or(true, |c| eval(c, r, &tables)))
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            for spec in &plan.sort {
                let ord = compare(lookup(a, &spec.column).as_ref(), lookup(b, &spec.column).as_ref());
                let ord = match spec.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });

        if plan.projection == Projection::Count {
            let mut counted = Row::new();
            counted.insert(COUNT_COLUMN.to_string(), json!(matched.len()));
            return Ok(vec![counted]);
        }

        let offset = plan.offset.unwrap_or(0) as usize;
        let limit = plan.limit.map_or(usize::MAX, |l| l as usize);
        Ok(matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .enumerate()
            .map(|(i, mut r)| {
                if let Some(seed) = plan.row_number_seed {
                    r.insert("id".to_string(), json!(seed + i as u64 + 1));
                }
                match &plan.projection {
                    Projection::Columns(columns) => columns
                        .iter()
                        .filter_map(|c| r.get(c).map(|v| (c.clone(), v.clone())))
                        .collect(),
                    _ => r,
                }
            })
            .collect())
    }

    async fn update(&self, update: &CompiledUpdate, trx: Option<&TransactionScope>) -> Result<Row> {
        self.record(trx);
        self.update_calls.fetch_add(1, AtomicOrdering::SeqCst);
        if self
            .failing_updates
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::transient("Deadlock found when trying to get lock"));
        }

        let mut tables = self.tables.lock().unwrap();
        let rows = tables
            .get_mut(&update.table)
            .ok_or_else(|| Error::storage(format!("Table '{}' doesn't exist", update.table)))?;
        let target = rows
            .iter_mut()
            .find(|r| r.get(&update.primary_key) == Some(&update.id))
            .ok_or_else(|| Error::storage(format!("no row {} in {}", update.id, update.table)))?;
        for (column, value) in &update.values {
            target.insert(column.clone(), value.clone());
        }
        Ok(target.clone())
    }
}

fn lookup(r: &Row, column: &ColumnExpr) -> Option<Value> {
    match column {
        ColumnExpr::Column { table, column, .. } => r
            .get(column)
            .or_else(|| table.as_ref().and_then(|t| r.get(&format!("{t}.{column}"))))
            .cloned(),
        ColumnExpr::Translation {
            source,
            language_code,
            column,
        } => {
            let records = match r.get(&source.row_key())? {
                Value::String(raw) => serde_json::from_str::<Value>(raw).ok()?,
                other => other.clone(),
            };
            records
                .as_array()?
                .iter()
                .find(|t| t.get("language_code").and_then(Value::as_str) == Some(language_code))?
                .get(column)
                .cloned()
        }
    }
}

fn text(v: &Value) -> String {
    match v {
        Value::String(s) => s.to_lowercase(),
        other => other.to_string(),
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => text(a) == text(b),
    }
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => text(x).cmp(&text(y)),
        },
    }
}

fn eval(condition: &CompiledWhere, r: &Row, tables: &HashMap<String, Vec<Row>>) -> bool {
    match condition {
        CompiledWhere::Group { glue: Glue::And, rules } => rules.iter().all(|c| eval(c, r, tables)),
        CompiledWhere::Group { glue: Glue::Or, rules } => rules.iter().any(|c| eval(c, r, tables)),
        CompiledWhere::NoRelation { column, target } => match r.get(column).filter(|v| !v.is_null()) {
            None => true,
            Some(v) => !tables
                .get(&target.table)
                .is_some_and(|linked| linked.iter().any(|l| l.get(&target.primary_key) == Some(v))),
        },
        CompiledWhere::Rule { column, op, value } => {
            let current = lookup(r, column).filter(|v| !v.is_null());
            let list = || match value {
                Value::Array(items) => items.clone(),
                other => vec![other.clone()],
            };
            match (op, current) {
                (RuleOp::IsNull | RuleOp::HaveNoRelation, v) => v.is_none(),
                (RuleOp::IsNotNull, v) => v.is_some(),
                (RuleOp::IsEmpty, v) => v.map_or(true, |v| v == json!("")),
                (RuleOp::IsNotEmpty, v) => v.is_some_and(|v| v != json!("")),
                (_, None) => false,
                (RuleOp::Equals, Some(v)) => loose_eq(&v, value),
                (RuleOp::NotEqual, Some(v)) => !loose_eq(&v, value),
                (RuleOp::Contains, Some(v)) => text(&v).contains(&text(value)),
                (RuleOp::NotContains, Some(v)) => !text(&v).contains(&text(value)),
                (RuleOp::BeginsWith, Some(v)) => text(&v).starts_with(&text(value)),
                (RuleOp::EndsWith, Some(v)) => text(&v).ends_with(&text(value)),
                (RuleOp::Less, Some(v)) => compare(Some(&v), Some(value)) == Ordering::Less,
                (RuleOp::Greater, Some(v)) => compare(Some(&v), Some(value)) == Ordering::Greater,
                (RuleOp::LessOrEqual, Some(v)) => compare(Some(&v), Some(value)) != Ordering::Greater,
                (RuleOp::GreaterOrEqual, Some(v)) => compare(Some(&v), Some(value)) != Ordering::Less,
                (RuleOp::In, Some(v)) => list().iter().any(|item| loose_eq(&v, item)),
                (RuleOp::NotIn, Some(v)) => !list().iter().any(|item| loose_eq(&v, item)),
            }
        }
    }
}

type Responder = Box<dyn Fn(&str, &Value) -> Result<Value> + Send + Sync>;

/// Bus that records every request and answers with a canned responder.
pub struct MemoryBus {
    responder: Responder,
    requests: Mutex<Vec<(String, Value)>>,
}

impl MemoryBus {
    pub fn responding(responder: impl Fn(&str, &Value) -> Result<Value> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers with the `values` of the request.
    pub fn echo() -> Self {
        Self::responding(|_, payload| Ok(payload.get("values").cloned().unwrap_or(Value::Null)))
    }

    pub fn failing(message: &str) -> Self {
        let message = message.to_string();
        Self::responding(move |topic, _| {
            Err(Error::Notification {
                topic: topic.to_string(),
                message: message.clone(),
            })
        })
    }

    pub fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ServiceBus for MemoryBus {
    async fn request(&self, topic: &str, payload: Value) -> Result<Value> {
        self.requests
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.clone()));
        (self.responder)(topic, &payload)
    }
}

/// Users and roles looked up with `key in [...]` or `key = value` rules.
#[derive(Default)]
pub struct MemoryDirectory {
    users: Vec<SiteUser>,
    roles: Vec<RoleRecord>,
    roles_unavailable: bool,
    lookups: Mutex<Vec<Where>>,
}

impl MemoryDirectory {
    pub fn new(users: Vec<SiteUser>, roles: Vec<RoleRecord>) -> Self {
        Self {
            users,
            roles,
            ..Self::default()
        }
    }

    pub fn with_roles_unavailable(mut self) -> Self {
        self.roles_unavailable = true;
        self
    }

    pub fn lookups(&self) -> Vec<Where> {
        self.lookups.lock().unwrap().clone()
    }
}

fn matches(record: &Value, condition: &Where) -> bool {
    match condition {
        Where::Group(group) => match group.glue {
            Glue::And => group.rules.iter().all(|w| matches(record, w)),
            Glue::Or => group.rules.iter().any(|w| matches(record, w)),
        },
        Where::Rule(rule) => {
            let Some(current) = record.get(&rule.key) else {
                return false;
            };
            match (rule.rule, &rule.value) {
                (RuleOp::In, Value::Array(items)) => items.contains(current),
                (RuleOp::Equals, value) => value == current,
                _ => false,
            }
        }
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn find_users(&self, condition: &Where) -> Result<Vec<SiteUser>> {
        self.lookups.lock().unwrap().push(condition.clone());
        Ok(self
            .users
            .iter()
            .filter(|u| serde_json::to_value(u).is_ok_and(|v| matches(&v, condition)))
            .cloned()
            .collect())
    }

    async fn find_roles(&self, condition: &Where) -> Result<Vec<RoleRecord>> {
        self.lookups.lock().unwrap().push(condition.clone());
        if self.roles_unavailable {
            return Err(Error::storage("role lookup unavailable"));
        }
        Ok(self
            .roles
            .iter()
            .filter(|r| serde_json::to_value(r).is_ok_and(|v| matches(&v, condition)))
            .cloned()
            .collect())
    }
}
