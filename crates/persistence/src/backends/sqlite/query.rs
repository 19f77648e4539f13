//! SQL fragments built from filters and sort rules.
//!
//! Column names are validated as identifiers before they reach SQL text;
//! values are always bound as parameters.

use rusqlite::types::Value as SqlValue;
use serde_json::{Map, Value};

use crate::error::{StorageResult, ValidationError};
use crate::types::{validate_column, Filter, FilterValue, SortRule};

/// A SQL fragment and the parameters it binds, in order.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct Fragment {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Quotes a table or index name so reserved words like `order` stay usable.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// The SQL expression addressing `column` of a record row.
///
/// `id` is the primary key; anything else is a field of the JSON document.
pub(crate) fn column_expr(column: &str) -> StorageResult<String> {
    validate_column(column)?;
    if column == "id" {
        Ok("id".to_string())
    } else {
        Ok(format!("json_extract(data, '$.{column}')"))
    }
}

/// Converts a JSON value to the SQL value `json_extract` would yield for it.
pub(crate) fn sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                SqlValue::Real(f)
            } else {
                SqlValue::Text(n.to_string())
            }
        }
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

/// `?, ?, ?` for `n` parameters.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Builds ` WHERE ...` for `filter`, or an empty fragment for an empty filter.
///
/// An empty value set matches nothing. A null inside a value set also
/// matches rows where the column is missing. Raw predicates follow the
/// column constraints, each in parentheses.
pub(crate) fn where_clause(filter: &Filter) -> StorageResult<Fragment> {
    if filter.is_empty() {
        return Ok(Fragment::default());
    }

    let mut terms = Vec::new();
    let mut params = Vec::new();
    for (column, constraint) in filter.iter() {
        let expr = column_expr(column)?;
        let term = match constraint {
            FilterValue::Eq(Value::Null) => format!("{expr} IS NULL"),
            FilterValue::Eq(value) => {
                params.push(sql_value(value));
                format!("{expr} = ?")
            }
            FilterValue::In(values) => {
                let present: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();
                let with_null = present.len() != values.len();

                let mut alternatives = Vec::new();
                if !present.is_empty() {
                    params.extend(present.iter().map(|v| sql_value(v)));
                    alternatives.push(format!("{expr} IN ({})", placeholders(present.len())));
                }
                if with_null {
                    alternatives.push(format!("{expr} IS NULL"));
                }
                match alternatives.len() {
                    0 => "0".to_string(),
                    1 => alternatives.remove(0),
                    _ => format!("({})", alternatives.join(" OR ")),
                }
            }
        };
        terms.push(term);
    }
    for predicate in filter.predicates() {
        predicate.validate()?;
        terms.push(format!("({})", predicate.sql()));
        params.extend(predicate.params().iter().map(sql_value));
    }

    Ok(Fragment {
        sql: format!(" WHERE {}", terms.join(" AND ")),
        params,
    })
}

/// Builds ` ORDER BY ...`, or an empty string for no rules.
pub(crate) fn order_clause(order: &[SortRule]) -> StorageResult<String> {
    if order.is_empty() {
        return Ok(String::new());
    }
    let terms = order
        .iter()
        .map(|rule| column_expr(&rule.column).map(|expr| format!("{expr} {}", rule.direction)))
        .collect::<StorageResult<Vec<_>>>()?;
    Ok(format!(" ORDER BY {}", terms.join(", ")))
}

/// Builds `json_set(data, '$.a', json(?), ...)` for a set of field changes.
pub(crate) fn json_set(changes: &Map<String, Value>) -> StorageResult<Fragment> {
    let mut sql = String::from("json_set(data");
    let mut params = Vec::with_capacity(changes.len());
    for (field, value) in changes {
        validate_column(field)?;
        if field == "id" {
            return Err(ValidationError::InvalidColumn {
                column: field.clone(),
            }
            .into());
        }
        sql.push_str(&format!(", '$.{field}', json(?)"));
        params.push(SqlValue::Text(serde_json::to_string(value)?));
    }
    sql.push(')');
    Ok(Fragment { sql, params })
}

/// Renders a grouped column value as a map key.
pub(crate) fn group_key(value: SqlValue) -> String {
    match value {
        SqlValue::Null => "null".to_string(),
        SqlValue::Integer(i) => i.to_string(),
        SqlValue::Real(f) => f.to_string(),
        SqlValue::Text(s) => s,
        SqlValue::Blob(b) => String::from_utf8_lossy(&b).into_owned(),
    }
}
