//! Query specs: selector, sort and pagination, compiled for a backend.
//!
//! A [`QuerySpec`] is what callers build (directly or from a Mango query
//! object). [`QuerySpec::compile`] produces a [`CompiledQuery`] carrying both
//! the rendered SQL filter and the predicate it was rendered from, so the
//! Postgres backend and the in-memory backend answer the same query the same
//! way.

use crate::{
    error::Result,
    json::sort_cmp,
    sql::{self, json_path, quote_ident, SqlFragment, DATA_COLUMN, ID_COLUMN},
    FieldPath, Predicate, Selector, StoredRow,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    /// Parse a direction, ignoring case. Anything but `asc`/`desc` is `None`.
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("asc") {
            Some(Direction::Asc)
        } else if value.eq_ignore_ascii_case("desc") {
            Some(Direction::Desc)
        } else {
            None
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortTerm {
    pub path: FieldPath,
    pub direction: Direction,
}

/// A Mango query object as sent by callers.
///
/// ```json
/// {"selector": {"done": false}, "sort": [{"priority": "desc"}], "skip": 10, "limit": 5}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MangoQuery {
    #[serde(default)]
    pub selector: Value,
    /// Entries are `{field: direction}` objects or bare field names (ascending)
    #[serde(default)]
    pub sort: Vec<Value>,
    #[serde(default)]
    pub skip: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Selector plus sort and pagination.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub selector: Selector,
    pub sort: Vec<SortTerm>,
    pub skip: usize,
    pub limit: Option<usize>,
    /// Sort entries that were ignored (unknown direction, bad field)
    pub dropped_sort: Vec<Value>,
}

impl QuerySpec {
    pub fn new(selector: Selector) -> Self {
        Self {
            selector,
            sort: Vec::new(),
            skip: 0,
            limit: None,
            dropped_sort: Vec::new(),
        }
    }

    /// Every document, in storage order.
    pub fn all() -> Self {
        Self::new(Selector::all())
    }

    /// Parse a bare selector.
    pub fn parse(selector: &Value) -> Result<Self> {
        Ok(Self::new(Selector::parse(selector)?))
    }

    pub fn from_mango(query: &MangoQuery) -> Result<Self> {
        let mut spec = Self::parse(&query.selector)?;
        for entry in &query.sort {
            let (terms, dropped) = sort_terms(entry);
            spec.sort.extend(terms);
            spec.dropped_sort.extend(dropped);
        }
        spec.skip = query.skip.unwrap_or(0);
        spec.limit = query.limit.filter(|limit| *limit > 0);
        Ok(spec)
    }

    pub fn sort_by(mut self, path: FieldPath, direction: Direction) -> Self {
        self.sort.push(SortTerm { path, direction });
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// `0` means no limit.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = (limit > 0).then_some(limit);
        self
    }

    pub fn compile(&self) -> CompiledQuery {
        let predicate = Predicate::lower(&self.selector);
        let filter = sql::render(&predicate);
        CompiledQuery {
            predicate,
            filter,
            sort: self.sort.clone(),
            skip: self.skip,
            limit: self.limit,
        }
    }
}

impl TryFrom<&MangoQuery> for QuerySpec {
    type Error = crate::Error;

    fn try_from(query: &MangoQuery) -> Result<Self> {
        QuerySpec::from_mango(query)
    }
}

/// Valid terms of one sort entry, and the parts of it that were not valid.
/// Within an object entry each `{field: direction}` pair stands on its own.
fn sort_terms(entry: &Value) -> (Vec<SortTerm>, Vec<Value>) {
    match entry {
        Value::String(field) => match FieldPath::parse(field) {
            Ok(path) => (
                vec![SortTerm {
                    path,
                    direction: Direction::Asc,
                }],
                Vec::new(),
            ),
            Err(_) => (Vec::new(), vec![entry.clone()]),
        },
        Value::Object(map) if !map.is_empty() => {
            let mut terms = Vec::new();
            let mut dropped = Vec::new();
            for (field, direction) in map {
                let term = FieldPath::parse(field).ok().zip(
                    direction.as_str().and_then(Direction::parse),
                );
                match term {
                    Some((path, direction)) => terms.push(SortTerm { path, direction }),
                    None => dropped.push(field_selector(field, direction.clone())),
                }
            }
            (terms, dropped)
        }
        _ => (Vec::new(), vec![entry.clone()]),
    }
}

/// Compile a bare selector into a SQL filter and its parameters.
pub fn compile(selector: &Value) -> Result<SqlFragment> {
    Ok(QuerySpec::parse(selector)?.compile().filter)
}

/// A query ready to run: SQL for Postgres, a predicate for everything else.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub predicate: Predicate,
    pub filter: SqlFragment,
    pub sort: Vec<SortTerm>,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl CompiledQuery {
    pub fn params(&self) -> &[sql::Param] {
        &self.filter.params
    }

    /// `ORDER BY` clause with the id tie-break, or empty when unsorted.
    pub fn order_by_clause(&self) -> String {
        if self.sort.is_empty() {
            return String::new();
        }
        let mut terms: Vec<String> = self
            .sort
            .iter()
            .map(|term| {
                format!(
                    "{} {}",
                    json_path(DATA_COLUMN, &term.path),
                    term.direction.as_sql()
                )
            })
            .collect();
        terms.push(format!("{ID_COLUMN} COLLATE \"C\" ASC"));
        format!(" ORDER BY {}", terms.join(", "))
    }

    /// `LIMIT`/`OFFSET` clause; each part only when set.
    pub fn page_clause(&self) -> String {
        let mut clause = String::new();
        if let Some(limit) = self.limit {
            clause.push_str(&format!(" LIMIT {limit}"));
        }
        if self.skip > 0 {
            clause.push_str(&format!(" OFFSET {}", self.skip));
        }
        clause
    }

    pub fn select_statement(&self, table: &str) -> String {
        format!(
            "SELECT {ID_COLUMN}, {DATA_COLUMN} FROM {} WHERE {}{}{}",
            quote_ident(table),
            self.filter.sql,
            self.order_by_clause(),
            self.page_clause()
        )
    }

    /// Count ignores sort and pagination.
    pub fn count_statement(&self, table: &str) -> String {
        format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            quote_ident(table),
            self.filter.sql
        )
    }

    pub fn matches(&self, document: &Value) -> bool {
        self.predicate.evaluate(document)
    }

    /// Ordering of two rows under the sort terms, ties broken by id.
    pub fn compare(&self, a: &StoredRow, b: &StoredRow) -> Ordering {
        self.sort
            .iter()
            .map(|term| {
                let order = sort_cmp(
                    term.path.lookup(a.data.as_value()),
                    term.path.lookup(b.data.as_value()),
                );
                match term.direction {
                    Direction::Asc => order,
                    Direction::Desc => order.reverse(),
                }
            })
            .find(|order| *order != Ordering::Equal)
            .unwrap_or_else(|| a.id.cmp(&b.id))
    }

    pub fn is_sorted(&self) -> bool {
        !self.sort.is_empty()
    }

    /// Apply skip, then limit.
    pub fn paginate<T>(&self, items: Vec<T>) -> Vec<T> {
        let page = items.into_iter().skip(self.skip);
        match self.limit {
            Some(limit) => page.take(limit).collect(),
            None => page.collect(),
        }
    }
}

/// Selector object for a single field, handy when building queries in code.
pub fn field_selector(field: &str, condition: Value) -> Value {
    let mut map = Map::new();
    map.insert(field.to_string(), condition);
    Value::Object(map)
}
