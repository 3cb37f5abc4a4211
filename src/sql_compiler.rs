//! SQL compiler that turns query options into MySQL queries using sea-query.

use crate::ast::{merge_conditions, ColumnExpr, CompiledWhere, Glue, RuleOp, TranslationColumn};
use crate::condition::ConditionCompiler;
use crate::error::Result;
use crate::object::ObjectDefinition;
use crate::options::{QueryOptions, SortDirection, UserData};
use crate::Row;
use sea_query::{
    Asterisk, Condition, Expr, Func, MysqlQueryBuilder, Order, Query, SelectStatement, SimpleExpr, Value,
};
use serde_json::Value as JsonValue;

/// Column holding the result of a count query.
pub const COUNT_COLUMN: &str = "count";

/// Fixed identifiers used by the generated queries.
#[derive(Debug, Clone, Copy)]
pub enum QueryAlias {
    /// Synthetic row number column
    Id,
    /// Wrapped base query
    Result,
    /// Counter seed subquery
    RowNum,
    /// Aggregate column of count queries
    Count,
    /// Per-row multilingual payload of table-backed objects
    Translations,
}

impl sea_query::Iden for QueryAlias {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        let name = match self {
            QueryAlias::Id => "id",
            QueryAlias::Result => "result",
            QueryAlias::RowNum => "rownum",
            QueryAlias::Count => COUNT_COLUMN,
            QueryAlias::Translations => "translations",
        };
        write!(s, "{}", name).unwrap();
    }
}

/// MySQL JSON helpers, written unquoted as custom functions.
#[derive(Debug, Clone, Copy)]
enum JsonFn {
    Search,
    Extract,
    Unquote,
    Substring,
}

impl sea_query::Iden for JsonFn {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        let name = match self {
            JsonFn::Search => "JSON_SEARCH",
            JsonFn::Extract => "JSON_EXTRACT",
            JsonFn::Unquote => "JSON_UNQUOTE",
            JsonFn::Substring => "SUBSTRING",
        };
        write!(s, "{}", name).unwrap();
    }
}

/// Column, table or schema identifier wrapper
#[derive(Debug, Clone)]
pub struct ColumnName(pub String);

impl sea_query::Iden for ColumnName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(s, "{}", self.0).unwrap();
    }
}

/// What the outermost SELECT returns.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    All,
    Columns(Vec<String>),
    Count,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    pub column: ColumnExpr,
    pub direction: SortDirection,
}

/// Declarative form of a compiled find, for executors that do not speak SQL.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub source: String,
    pub condition: Option<CompiledWhere>,
    pub sort: Vec<SortSpec>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    /// Row numbers start right after this value when present.
    pub row_number_seed: Option<u64>,
    pub projection: Projection,
}

/// Result of compiling a find: the plan plus its MySQL text.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub plan: QueryPlan,
    pub sql: String,
}

/// Result of compiling a single-row update.
#[derive(Debug, Clone)]
pub struct CompiledUpdate {
    pub table: String,
    pub primary_key: String,
    pub id: JsonValue,
    pub values: Row,
    pub sql: String,
}

/// Largest MySQL row count, used to force a sorted derived table to be materialized.
const UNBOUNDED_LIMIT: u64 = u64::MAX;

/// SQL Compiler that converts query options to SQL queries
#[derive(Debug, Clone, Default)]
pub struct SqlCompiler;

impl SqlCompiler {
    /// Create a compiler; it holds no state between calls
    pub fn new() -> Self {
        Self
    }

    /// Compile a find against `object`'s table or view.
    ///
    /// Any failure carries the query text built so far.
    pub fn compile(
        &self,
        object: &dyn ObjectDefinition,
        options: &QueryOptions,
        user: &UserData,
    ) -> Result<CompiledQuery> {
        self.compile_select(object, options, user, false)
    }

    /// Compile the `COUNT(*)` query paired with the find `options` describe.
    pub fn compile_count(
        &self,
        object: &dyn ObjectDefinition,
        options: &QueryOptions,
        user: &UserData,
    ) -> Result<CompiledQuery> {
        self.compile_select(object, &options.for_count(), user, true)
    }

    fn compile_select(
        &self,
        object: &dyn ObjectDefinition,
        options: &QueryOptions,
        user: &UserData,
        count_only: bool,
    ) -> Result<CompiledQuery> {
        let source = object.source_name().to_string();

        let mut select = Query::select();
        select.from(ColumnName(source.clone()));
        select.column(Asterisk);

        // conditions
        let merged = if options.skip_existing_conditions {
            merge_conditions(None, options.condition.as_ref())
        } else {
            merge_conditions(object.base_condition(), options.condition.as_ref())
        };
        let condition = match merged {
            Some(tree) => ConditionCompiler::new(object, user)
                .compile(&tree)
                .map_err(|e| e.with_sql(select.to_string(MysqlQueryBuilder)))?,
            None => None,
        };
        if let Some(compiled) = &condition {
            select.cond_where(self.compile_condition(compiled));
        }

        // sort
        let mut sort = Vec::with_capacity(options.sort.len());
        for sort_field in &options.sort {
            let field = object
                .resolve_field(&sort_field.field)
                .map_err(|e| e.with_sql(select.to_string(MysqlQueryBuilder)))?;
            let column = if field.multilingual {
                ConditionCompiler::new(object, user)
                    .translation_expr(&field)
                    .map_err(|e| e.with_sql(select.to_string(MysqlQueryBuilder)))?
            } else {
                ColumnExpr::Column {
                    schema: Some(field.schema),
                    table: Some(field.table),
                    column: field.column,
                }
            };
            let order = match sort_field.direction {
                SortDirection::Asc => Order::Asc,
                SortDirection::Desc => Order::Desc,
            };
            select.order_by_expr(self.column_expr(&column), order);
            sort.push(SortSpec {
                column,
                direction: sort_field.direction,
            });
        }

        let row_number_seed = (options.include_row_number && !count_only).then(|| options.offset.unwrap_or(0));

        if !count_only {
            match options.limit {
                Some(limit) => {
                    select.limit(limit);
                }
                // MySQL merges an unlimited derived table into the outer
                // query and drops its ORDER BY
                None if row_number_seed.is_some() && (!sort.is_empty() || options.offset.is_some()) => {
                    select.limit(UNBOUNDED_LIMIT);
                }
                None => {}
            }
            if let Some(offset) = options.offset {
                select.offset(offset);
            }
        }

        let projection = if count_only {
            Projection::Count
        } else if let Some(columns) = options.column_names.as_ref().filter(|c| !c.is_empty()) {
            Projection::Columns(columns.iter().map(|c| c.replace('`', "")).collect())
        } else if !options.include_columns {
            Projection::Columns(vec![object.primary_key().to_string()])
        } else {
            Projection::All
        };

        let mut statement = match row_number_seed {
            Some(seed) => self.wrap_row_number(select, seed),
            None => select,
        };
        match &projection {
            Projection::All => {}
            Projection::Columns(columns) => {
                statement.clear_selects();
                statement.columns(columns.iter().map(|c| ColumnName(c.clone())));
            }
            Projection::Count => {
                statement.clear_selects();
                statement.expr_as(Func::count(Expr::col(Asterisk)), QueryAlias::Count);
            }
        }

        let sql = statement.to_string(MysqlQueryBuilder);
        tracing::debug!(object = object.id(), sql = %sql, "compiled find");

        Ok(CompiledQuery {
            plan: QueryPlan {
                source,
                condition,
                sort,
                offset: options.offset.filter(|_| !count_only),
                limit: options.limit.filter(|_| !count_only),
                row_number_seed,
                projection,
            },
            sql,
        })
    }

    /// `SELECT @rownum := @rownum + 1 AS id, result.* FROM (<inner>) AS result, (SELECT @rownum := <seed>) AS rownum`
    fn wrap_row_number(&self, inner: SelectStatement, seed: u64) -> SelectStatement {
        let mut counter = Query::select();
        counter.expr(Expr::cust(format!("@rownum := {}", seed)));

        let mut outer = Query::select();
        outer
            .expr_as(Expr::cust("@rownum := @rownum + 1"), QueryAlias::Id)
            .column((QueryAlias::Result, Asterisk))
            .from_subquery(inner, QueryAlias::Result)
            .from_subquery(counter, QueryAlias::RowNum);
        outer
    }

    /// Compile a single-row update keyed by the object's primary key.
    pub fn compile_update(
        &self,
        object: &dyn ObjectDefinition,
        id: &JsonValue,
        values: &Row,
    ) -> CompiledUpdate {
        let mut statement = Query::update();
        statement
            .table(ColumnName(object.table_name().to_string()))
            .values(
                values
                    .iter()
                    .map(|(column, value)| (ColumnName(column.clone()), self.literal_to_value(value).into())),
            )
            .and_where(Expr::col(ColumnName(object.primary_key().to_string())).eq(self.literal_to_value(id)));
        let sql = statement.to_string(MysqlQueryBuilder);

        CompiledUpdate {
            table: object.table_name().to_string(),
            primary_key: object.primary_key().to_string(),
            id: id.clone(),
            values: values.clone(),
            sql,
        }
    }

    /// Compile a resolved condition tree into a sea-query condition
    pub fn compile_condition(&self, condition: &CompiledWhere) -> Condition {
        match condition {
            CompiledWhere::Group { glue, rules } => {
                let start = match glue {
                    Glue::And => Condition::all(),
                    Glue::Or => Condition::any(),
                };
                rules
                    .iter()
                    .fold(start, |acc, rule| acc.add(self.compile_condition(rule)))
            }
            CompiledWhere::Rule { column, op, value } => {
                Condition::all().add(self.compile_comparison(column, *op, value))
            }
            CompiledWhere::NoRelation { column, target } => {
                let col = Expr::col(ColumnName(column.clone()));
                let mut linked = Query::select();
                linked.column(ColumnName(target.primary_key.clone()));
                match &target.schema {
                    Some(schema) => linked.from((ColumnName(schema.clone()), ColumnName(target.table.clone()))),
                    None => linked.from(ColumnName(target.table.clone())),
                };
                Condition::any()
                    .add(col.clone().is_null())
                    .add(col.not_in_subquery(linked))
            }
        }
    }

    /// Compile a comparison operation
    fn compile_comparison(&self, column: &ColumnExpr, op: RuleOp, value: &JsonValue) -> SimpleExpr {
        let col = Expr::expr(self.column_expr(column));

        match op {
            RuleOp::Equals => col.eq(self.literal_to_value(value)),
            RuleOp::NotEqual => col.ne(self.literal_to_value(value)),
            RuleOp::Contains => col.like(format!("%{}%", literal_text(value))),
            RuleOp::NotContains => col.not_like(format!("%{}%", literal_text(value))),
            RuleOp::BeginsWith => col.like(format!("{}%", literal_text(value))),
            RuleOp::EndsWith => col.like(format!("%{}", literal_text(value))),
            RuleOp::Less => col.lt(self.literal_to_value(value)),
            RuleOp::Greater => col.gt(self.literal_to_value(value)),
            RuleOp::LessOrEqual => col.lte(self.literal_to_value(value)),
            RuleOp::GreaterOrEqual => col.gte(self.literal_to_value(value)),
            RuleOp::IsNull | RuleOp::HaveNoRelation => col.is_null(),
            RuleOp::IsNotNull => col.is_not_null(),
            RuleOp::IsEmpty => col.clone().is_null().or(col.eq("")),
            RuleOp::IsNotEmpty => col.clone().is_not_null().and(col.ne("")),
            RuleOp::In => col.is_in(self.literal_list(value)),
            RuleOp::NotIn => col.is_not_in(self.literal_list(value)),
        }
    }

    /// Expression for a physical column or a translation lookup
    pub fn column_expr(&self, column: &ColumnExpr) -> SimpleExpr {
        match column {
            ColumnExpr::Column {
                schema: Some(schema),
                table: Some(table),
                column,
            } => Expr::col((
                ColumnName(schema.clone()),
                ColumnName(table.clone()),
                ColumnName(column.clone()),
            ))
            .into(),
            ColumnExpr::Column {
                table: Some(table),
                column,
                ..
            } => Expr::col((ColumnName(table.clone()), ColumnName(column.clone()))).into(),
            ColumnExpr::Column { column, .. } => Expr::col(ColumnName(column.clone())).into(),
            ColumnExpr::Translation {
                source,
                language_code,
                column,
            } => translation_lookup(source, language_code, column),
        }
    }

    /// Values of an `IN` list; a scalar becomes a one-element list
    fn literal_list(&self, value: &JsonValue) -> Vec<Value> {
        match value {
            JsonValue::Array(items) => items.iter().map(|v| self.literal_to_value(v)).collect(),
            other => vec![self.literal_to_value(other)],
        }
    }

    /// Convert a JSON literal to a sea-query Value
    fn literal_to_value(&self, literal: &JsonValue) -> Value {
        match literal {
            JsonValue::Null => Value::String(None),
            JsonValue::Bool(b) => Value::Bool(Some(*b)),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::BigInt(Some(i))
                } else if let Some(u) = n.as_u64() {
                    Value::BigUnsigned(Some(u))
                } else {
                    Value::Double(n.as_f64())
                }
            }
            JsonValue::String(s) => Value::String(Some(Box::new(s.clone()))),
            other => Value::String(Some(Box::new(other.to_string()))),
        }
    }
}

fn literal_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

/// Value of `column` for `language_code` inside a row's translations payload:
///
/// `JSON_UNQUOTE(JSON_EXTRACT(JSON_EXTRACT(tr, SUBSTRING(JSON_UNQUOTE(JSON_SEARCH(tr, 'one', lang)), 1, 4)), '$."column"'))`
///
/// `JSON_SEARCH` yields a path like `$[0].language_code`; its first four
/// characters address the matching record.
pub fn translation_lookup(source: &TranslationColumn, language_code: &str, column: &str) -> SimpleExpr {
    let payload: SimpleExpr = match source {
        TranslationColumn::Flattened(table) => Expr::col(ColumnName(format!("{}.translations", table))).into(),
        TranslationColumn::Qualified(table) => {
            Expr::col((ColumnName(table.clone()), QueryAlias::Translations)).into()
        }
    };

    let search = Func::cust(JsonFn::Search).args([
        payload.clone(),
        Expr::val("one").into(),
        Expr::val(language_code).into(),
    ]);
    let record_path = Func::cust(JsonFn::Substring).args([
        Func::cust(JsonFn::Unquote).arg(search).into(),
        Expr::val(1).into(),
        Expr::val(4).into(),
    ]);
    let record = Func::cust(JsonFn::Extract).args([payload, record_path.into()]);
    let value = Func::cust(JsonFn::Extract).args([record.into(), Expr::val(format!("$.\"{}\"", column)).into()]);

    Func::cust(JsonFn::Unquote).arg(value).into()
}
