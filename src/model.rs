//! Data access for one object: find, count and single-row update.

use crate::error::{Error, Result};
use crate::object::ObjectDefinition;
use crate::options::{QueryOptions, UserData};
use crate::reshape::reshape_translations;
use crate::sql_compiler::{SqlCompiler, COUNT_COLUMN};
use crate::storage::{Storage, TransactionScope};
use crate::Row;
use serde_json::Value;

pub struct ObjectModel<'a> {
    object: &'a dyn ObjectDefinition,
    storage: &'a dyn Storage,
    compiler: SqlCompiler,
}

impl<'a> ObjectModel<'a> {
    pub fn new(object: &'a dyn ObjectDefinition, storage: &'a dyn Storage) -> Self {
        Self {
            object,
            storage,
            compiler: SqlCompiler::new(),
        }
    }

    /// Rows of the object's table or view matching `options`.
    pub async fn find_all(
        &self,
        options: &QueryOptions,
        user: &UserData,
        trx: Option<&TransactionScope>,
    ) -> Result<Vec<Row>> {
        let query = self.compiler.compile(self.object, options, user)?;
        tracing::debug!(object = self.object.id(), sql = %query.sql, "ObjectModel::find_all");

        let mut rows = self
            .storage
            .select(&query, trx)
            .await
            .map_err(|e| e.with_sql(query.sql.clone()))?;

        if options.rewrite_translations {
            reshape_translations(&mut rows);
        }
        Ok(rows)
    }

    /// Number of rows the paired `find_all` would match, ignoring paging.
    pub async fn find_count(
        &self,
        options: &QueryOptions,
        user: &UserData,
        trx: Option<&TransactionScope>,
    ) -> Result<u64> {
        let query = self.compiler.compile_count(self.object, options, user)?;
        tracing::debug!(object = self.object.id(), sql = %query.sql, "ObjectModel::find_count");

        let rows = self
            .storage
            .select(&query, trx)
            .await
            .map_err(|e| e.with_sql(query.sql.clone()))?;

        let count = rows
            .first()
            .and_then(|row| row.get(COUNT_COLUMN))
            .and_then(|value| match value {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.parse().ok(),
                _ => None,
            })
            .ok_or_else(|| Error::storage("count query returned no count"))?;
        Ok(count)
    }

    /// Write `values` to the row with primary key `id`.
    pub async fn update(&self, id: &Value, values: &Row, trx: Option<&TransactionScope>) -> Result<Row> {
        let update = self.compiler.compile_update(self.object, id, values);
        tracing::debug!(object = self.object.id(), sql = %update.sql, "ObjectModel::update");

        self.storage
            .update(&update, trx)
            .await
            .map_err(|e| e.with_sql(update.sql.clone()))
    }
}
