//! Post-fetch reshaping of multilingual payloads.
//!
//! Rows fetched from a view may carry one `<source>.translations` column per
//! related object, each a JSON array of `{language_code, ...fields}`. They are
//! folded into one `translations` array with a single record per language,
//! whose fields are renamed `<source>.<field>`.

use crate::Row;
use serde_json::{Map, Value};

const SUFFIX: &str = ".translations";
const LANGUAGE_CODE: &str = "language_code";

pub fn reshape_translations(rows: &mut [Row]) {
    for row in rows.iter_mut() {
        reshape_row(row);
    }
}

fn reshape_row(row: &mut Row) {
    let sources: Vec<String> = row
        .keys()
        .filter(|k| k.ends_with(SUFFIX) && k.len() > SUFFIX.len())
        .cloned()
        .collect();
    if sources.is_empty() {
        return;
    }

    let mut merged: Vec<Value> = match row.remove("translations") {
        Some(Value::Array(existing)) => existing,
        Some(Value::String(raw)) => match serde_json::from_str(&raw) {
            Ok(Value::Array(existing)) => existing,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    for key in sources {
        let Some(payload) = row.remove(&key) else {
            continue;
        };
        let source = &key[..key.len() - SUFFIX.len()];

        let records = match payload {
            Value::Array(records) => records,
            Value::String(raw) => match serde_json::from_str::<Vec<Value>>(&raw) {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(column = %key, error = %e, "skipping unreadable translations payload");
                    continue;
                }
            },
            _ => continue,
        };

        for record in records {
            let Value::Object(fields) = record else {
                continue;
            };
            let Some(language) = fields.get(LANGUAGE_CODE).cloned() else {
                continue;
            };

            let position = merged
                .iter()
                .position(|t| t.get(LANGUAGE_CODE) == Some(&language))
                .unwrap_or_else(|| {
                    let mut fresh = Map::new();
                    fresh.insert(LANGUAGE_CODE.to_string(), language.clone());
                    merged.push(Value::Object(fresh));
                    merged.len() - 1
                });

            if let Value::Object(target) = &mut merged[position] {
                for (field, value) in fields {
                    if field != LANGUAGE_CODE {
                        target.insert(format!("{}.{}", source, field), value);
                    }
                }
            }
        }
    }

    row.insert("translations".to_string(), Value::Array(merged));
}
