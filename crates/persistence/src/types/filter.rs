//! Filter and ordering types shared by every store.
//!
//! A [`Filter`] maps column names to a required value or a value set. Values
//! are JSON values so they can be compared against fields of the stored
//! record document. An empty filter matches every row.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{StorageResult, ValidationError};

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

/// Validates that a column name is a plain identifier.
pub fn validate_column(column: &str) -> StorageResult<()> {
    if IDENTIFIER.is_match(column) {
        Ok(())
    } else {
        Err(ValidationError::InvalidColumn {
            column: column.to_string(),
        }
        .into())
    }
}

/// The constraint placed on one column.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// Column equals the value (`IS NULL` for JSON null).
    Eq(Value),
    /// Column equals any of the values. An empty set matches nothing.
    In(Vec<Value>),
}

impl FilterValue {
    /// Equality constraint on `value`.
    pub fn eq(value: impl Into<Value>) -> Self {
        FilterValue::Eq(value.into())
    }

    /// Set-membership constraint on `values`.
    pub fn any<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        FilterValue::In(values.into_iter().map(Into::into).collect())
    }

    /// Returns the values this constraint accepts.
    pub fn values(&self) -> Vec<&Value> {
        match self {
            FilterValue::Eq(v) => vec![v],
            FilterValue::In(vs) => vs.iter().collect(),
        }
    }
}

/// A raw SQL condition with positional `?` parameters.
///
/// The SQL text is trusted caller input and is spliced into the `WHERE`
/// clause as is; only the parameters are bound. Record fields are addressed
/// as `json_extract(data, '$.field')` and the primary key as `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    sql: String,
    params: Vec<Value>,
}

impl Predicate {
    /// The condition text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The bound parameters, in placeholder order.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Checks that the placeholder count matches the parameter count.
    pub fn validate(&self) -> StorageResult<()> {
        let expected = count_placeholders(&self.sql);
        if self.sql.trim().is_empty() || expected != self.params.len() {
            return Err(ValidationError::InvalidPredicate {
                sql: self.sql.clone(),
                expected,
                given: self.params.len(),
            }
            .into());
        }
        Ok(())
    }
}

/// Counts `?` placeholders outside quoted literals and identifiers.
fn count_placeholders(sql: &str) -> usize {
    let mut quote = None;
    let mut count = 0;
    for c in sql.chars() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (None, '?') => count += 1,
            (Some(open), c) if c == open => quote = None,
            _ => {}
        }
    }
    count
}

/// Column constraints and raw predicates, combined with AND.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: BTreeMap<String, FilterValue>,
    predicates: Vec<Predicate>,
}

impl Filter {
    /// Creates an empty filter that matches every row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equality constraint.
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions
            .insert(column.into(), FilterValue::Eq(value.into()));
        self
    }

    /// Adds a set-membership constraint.
    pub fn any<I, V>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.conditions
            .insert(column.into(), FilterValue::any(values));
        self
    }

    /// Adds a raw SQL condition, e.g.
    /// `.matching("json_extract(data, '$.qty') > ?", [10])`.
    ///
    /// Decorators keep their own constraints next to it: a soft-delete store
    /// still hides flagged rows and a keyword search still narrows `id`.
    pub fn matching<I, V>(mut self, sql: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.predicates.push(Predicate {
            sql: sql.into(),
            params: params.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Returns the raw predicates in the order they were added.
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Returns a copy of this filter with `column` set to `value`, replacing
    /// any existing constraint on that column.
    pub fn with(&self, column: impl Into<String>, value: FilterValue) -> Self {
        let mut derived = self.clone();
        derived.conditions.insert(column.into(), value);
        derived
    }

    /// Returns a copy of this filter with `column` set to `value` only when
    /// the caller has not constrained that column already.
    pub fn with_default(&self, column: &str, value: FilterValue) -> Self {
        if self.conditions.contains_key(column) {
            self.clone()
        } else {
            self.with(column, value)
        }
    }

    /// Returns the constraint on a column, if any.
    pub fn get(&self, column: &str) -> Option<&FilterValue> {
        self.conditions.get(column)
    }

    /// Returns true if the column is constrained.
    pub fn contains(&self, column: &str) -> bool {
        self.conditions.contains_key(column)
    }

    /// Returns true if the filter matches every row.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.predicates.is_empty()
    }

    /// Iterates over the column constraints in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FilterValue)> {
        self.conditions.iter()
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Ascending order.
    #[default]
    Asc,
    /// Descending order.
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ASC"),
            SortDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// One ordering term, e.g. `name asc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortRule {
    /// Column to sort on.
    pub column: String,
    /// Direction.
    pub direction: SortDirection,
}

impl SortRule {
    /// Ascending on `column`.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    /// Descending on `column`.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }

    /// Parses `"column"`, `"column asc"` or `"column desc"`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tessera_persistence::types::{SortDirection, SortRule};
    ///
    /// let rule = SortRule::parse("name desc").unwrap();
    /// assert_eq!(rule.column, "name");
    /// assert_eq!(rule.direction, SortDirection::Desc);
    /// assert!(SortRule::parse("name sideways").is_err());
    /// ```
    pub fn parse(rule: &str) -> StorageResult<Self> {
        let invalid = || ValidationError::InvalidSortRule {
            rule: rule.to_string(),
        };

        let mut parts = rule.split_whitespace();
        let column = parts.next().ok_or_else(invalid)?;
        let direction = match parts.next().map(str::to_ascii_lowercase).as_deref() {
            None | Some("asc") => SortDirection::Asc,
            Some("desc") => SortDirection::Desc,
            Some(_) => return Err(invalid().into()),
        };
        if parts.next().is_some() {
            return Err(invalid().into());
        }
        validate_column(column)?;

        Ok(Self {
            column: column.to_string(),
            direction,
        })
    }

    /// Parses a list of rules, failing on the first invalid one.
    pub fn parse_all<'a>(rules: impl IntoIterator<Item = &'a str>) -> StorageResult<Vec<Self>> {
        rules.into_iter().map(Self::parse).collect()
    }
}
