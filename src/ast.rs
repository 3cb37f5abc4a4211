//! Condition trees, as supplied by callers and as produced by the compiler.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A filter condition: either a single rule or a glued group of nodes.
///
/// Serialized the way the platform stores filters:
/// `{"glue": "and", "rules": [{"key": "...", "rule": "equals", "value": "..."}]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Where {
    Group(Group),
    Rule(Rule),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub glue: Glue,
    #[serde(default)]
    pub rules: Vec<Where>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Logical field identifier (a UUID) or an already-resolved column reference.
    pub key: String,
    pub rule: RuleOp,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Glue {
    And,
    Or,
}

/// Comparator applied by a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOp {
    Equals,
    NotEqual,
    Contains,
    NotContains,
    BeginsWith,
    EndsWith,
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
    IsEmpty,
    IsNotEmpty,
    IsNull,
    IsNotNull,
    In,
    NotIn,
    HaveNoRelation,
}

impl Where {
    pub fn rule(key: impl Into<String>, rule: RuleOp, value: impl Into<Value>) -> Self {
        Where::Rule(Rule {
            key: key.into(),
            rule,
            value: value.into(),
        })
    }

    pub fn and(rules: Vec<Where>) -> Self {
        Where::Group(Group {
            glue: Glue::And,
            rules,
        })
    }

    pub fn or(rules: Vec<Where>) -> Self {
        Where::Group(Group {
            glue: Glue::Or,
            rules,
        })
    }

    /// A group without rules places no constraint.
    pub fn is_empty(&self) -> bool {
        matches!(self, Where::Group(g) if g.rules.is_empty())
    }
}

/// Combine an object's intrinsic condition with the caller's.
///
/// Both present → `AND(base, caller)`; only one present → that one alone.
/// The result owns fresh copies, nothing is shared with the inputs.
pub fn merge_conditions(base: Option<&Where>, caller: Option<&Where>) -> Option<Where> {
    let base = base.filter(|w| !w.is_empty());
    let caller = caller.filter(|w| !w.is_empty());

    match (base, caller) {
        (Some(b), Some(c)) => Some(Where::and(vec![b.clone(), c.clone()])),
        (Some(only), None) | (None, Some(only)) => Some(only.clone()),
        (None, None) => None,
    }
}

/// Where a multilingual payload lives on a fetched row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationColumn {
    /// Views flatten related columns, so the payload sits in a single column
    /// literally named `<table>.translations`.
    Flattened(String),
    /// Table-backed objects keep it in `<table>`.`translations`.
    Qualified(String),
}

impl TranslationColumn {
    /// The key under which the payload shows up in a fetched row.
    pub fn row_key(&self) -> String {
        match self {
            TranslationColumn::Flattened(table) => format!("{table}.translations"),
            TranslationColumn::Qualified(_) => "translations".to_string(),
        }
    }
}

/// A physical, queryable expression a compiled rule compares against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnExpr {
    Column {
        schema: Option<String>,
        table: Option<String>,
        column: String,
    },
    /// The value of `column` inside the per-row translations record for `language_code`.
    Translation {
        source: TranslationColumn,
        language_code: String,
        column: String,
    },
}

impl ColumnExpr {
    pub fn column(column: impl Into<String>) -> Self {
        ColumnExpr::Column {
            schema: None,
            table: None,
            column: column.into(),
        }
    }

    /// Parse a dotted physical reference such as `` `db`.`tbl`.`col` ``.
    pub fn from_path(path: &str) -> Self {
        let mut parts: Vec<String> = path
            .split('.')
            .map(|p| p.trim().trim_matches('`').to_string())
            .collect();
        let column = parts.pop().unwrap_or_default();
        let table = parts.pop();
        let schema = parts.pop();
        ColumnExpr::Column {
            schema,
            table,
            column,
        }
    }
}

/// Target of a relation-absence check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationLink {
    pub table: String,
    #[serde(default)]
    pub schema: Option<String>,
    pub primary_key: String,
}

/// A condition tree with every key resolved to a physical expression.
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledWhere {
    Rule {
        column: ColumnExpr,
        op: RuleOp,
        value: Value,
    },
    /// Rows whose relation column points at nothing in the linked object.
    NoRelation {
        column: String,
        target: RelationLink,
    },
    Group {
        glue: Glue,
        rules: Vec<CompiledWhere>,
    },
}
