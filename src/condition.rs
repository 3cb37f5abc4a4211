//! Resolves logical field ids inside a condition tree to physical expressions.

use crate::ast::{ColumnExpr, CompiledWhere, Rule, RuleOp, TranslationColumn, Where};
use crate::error::{Error, Result};
use crate::object::{ObjectDefinition, ResolvedField};
use crate::options::UserData;
use serde_json::Value;
use uuid::Uuid;

/// Rule keys that parse as UUIDs are field ids; anything else is already physical.
pub fn is_field_id(key: &str) -> bool {
    Uuid::parse_str(key).is_ok()
}

/// Compiles condition trees for one object on behalf of one user.
pub struct ConditionCompiler<'a> {
    object: &'a dyn ObjectDefinition,
    user: &'a UserData,
}

impl<'a> ConditionCompiler<'a> {
    pub fn new(object: &'a dyn ObjectDefinition, user: &'a UserData) -> Self {
        Self { object, user }
    }

    /// Compile a tree. Empty groups drop out; `None` means no constraint.
    ///
    /// The input is only read. Failures are reported with the offending
    /// condition before being returned.
    pub fn compile(&self, condition: &Where) -> Result<Option<CompiledWhere>> {
        self.compile_node(condition).inspect_err(|e| {
            tracing::error!(
                error = %e,
                object = self.object.id(),
                condition = %serde_json::to_string(condition).unwrap_or_default(),
                username = self.user.username.as_deref().unwrap_or(""),
                language_code = self.user.language_code.as_deref().unwrap_or(""),
                "error reducing conditions"
            );
        })
    }

    fn compile_node(&self, node: &Where) -> Result<Option<CompiledWhere>> {
        match node {
            Where::Rule(rule) => self.compile_rule(rule).map(Some),
            Where::Group(group) => {
                let mut rules = Vec::with_capacity(group.rules.len());
                for child in &group.rules {
                    if let Some(compiled) = self.compile_node(child)? {
                        rules.push(compiled);
                    }
                }
                if rules.is_empty() {
                    return Ok(None);
                }
                Ok(Some(CompiledWhere::Group {
                    glue: group.glue,
                    rules,
                }))
            }
        }
    }

    fn compile_rule(&self, rule: &Rule) -> Result<CompiledWhere> {
        if !is_field_id(&rule.key) {
            return Ok(CompiledWhere::Rule {
                column: ColumnExpr::from_path(&rule.key),
                op: rule.rule,
                value: rule.value.clone(),
            });
        }

        let field = self.object.resolve_field(&rule.key)?;

        if rule.rule == RuleOp::HaveNoRelation {
            let target = field.relation.clone().ok_or_else(|| {
                Error::ConditionCompile(format!(
                    "field `{}` is not a relation, cannot apply have_no_relation",
                    field.id
                ))
            })?;
            return Ok(CompiledWhere::NoRelation {
                column: field.column,
                target,
            });
        }

        let column = if field.multilingual {
            self.translation_expr(&field)?
        } else {
            ColumnExpr::Column {
                schema: Some(field.schema.clone()),
                table: Some(field.table.clone()),
                column: field.column.clone(),
            }
        };

        let value = if field.options.is_empty() {
            rule.value.clone()
        } else {
            option_value(&field, &rule.value)
        };

        Ok(CompiledWhere::Rule {
            column,
            op: rule.rule,
            value,
        })
    }

    /// Expression reading the user's language out of the translations payload.
    pub fn translation_expr(&self, field: &ResolvedField) -> Result<ColumnExpr> {
        let language_code = self.user.language_code.clone().ok_or_else(|| {
            Error::ConditionCompile(format!(
                "multilingual field `{}` needs the user's language code",
                field.id
            ))
        })?;

        let source = if self.object.is_view() {
            TranslationColumn::Flattened(field.table.clone())
        } else {
            TranslationColumn::Qualified(field.table.clone())
        };

        Ok(ColumnExpr::Translation {
            source,
            language_code,
            column: field.column.clone(),
        })
    }
}

/// List fields are compared by option id; accept the display text too.
/// Unmatched values are left alone.
fn option_value(field: &ResolvedField, value: &Value) -> Value {
    let lookup = |v: &Value| -> Value {
        let Some(text) = v.as_str() else {
            return v.clone();
        };
        field
            .options
            .iter()
            .find(|o| o.id == text || o.text == text)
            .map(|o| Value::String(o.id.clone()))
            .unwrap_or_else(|| v.clone())
    };

    match value {
        Value::Array(items) => Value::Array(items.iter().map(lookup).collect()),
        other => lookup(other),
    }
}
