//! Rendering predicates to PostgreSQL.
//!
//! Documents live in a `jsonb` column named [`DATA_COLUMN`]. Operands are never
//! spliced into the statement: each one is pushed onto the parameter list and
//! referenced by its `$n` placeholder, numbered in the order the renderer walks
//! the predicate (left to right, depth first). Field names only ever appear as
//! escaped string literals inside JSON path operators.
//!
//! Every leaf renders to a two-valued expression (`COALESCE(..., FALSE)` or a
//! guarded `CASE`), so `NOT` over a missing field yields `TRUE` exactly like
//! [`Predicate::evaluate`](crate::Predicate::evaluate) does.

use crate::{FieldPath, Predicate};
use serde::Serialize;
use serde_json::Value;

/// Column holding the document.
pub const DATA_COLUMN: &str = "data";
/// Column holding the primary key.
pub const ID_COLUMN: &str = "id";

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Param {
    Text(String),
    Float(f64),
    Json(Value),
}

/// A SQL fragment and the parameters its placeholders refer to.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<Param>,
}

/// Render a predicate over the data column. Placeholders start at `$1`.
pub fn render(predicate: &Predicate) -> SqlFragment {
    let mut writer = SqlWriter::default();
    let sql = writer.predicate(predicate, DATA_COLUMN);
    SqlFragment {
        sql,
        params: writer.params,
    }
}

/// Quote a string literal (`'it''s'`).
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quote an identifier (`"my ""table"""`).
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn path_array(path: &FieldPath) -> String {
    let segments: Vec<String> = path.segments().iter().map(|s| quote_literal(s)).collect();
    format!("ARRAY[{}]::text[]", segments.join(", "))
}

/// A single segment that cannot be mistaken for an array index.
fn simple_key(path: &FieldPath) -> Option<&str> {
    match path.segments() {
        [segment] if segment.parse::<i64>().is_err() => Some(segment),
        _ => None,
    }
}

/// jsonb value at `path` below `root`; SQL `NULL` when absent.
pub fn json_path(root: &str, path: &FieldPath) -> String {
    if path.is_root() {
        return root.to_string();
    }
    match simple_key(path) {
        Some(key) => format!("({root} -> {})", quote_literal(key)),
        None => format!("({root} #> {})", path_array(path)),
    }
}

/// Text form of the value at `path` below `root`; SQL `NULL` when absent or
/// JSON null.
pub fn text_path(root: &str, path: &FieldPath) -> String {
    if path.is_root() {
        return format!("({root} #>> '{{}}')");
    }
    match simple_key(path) {
        Some(key) => format!("({root} ->> {})", quote_literal(key)),
        None => format!("({root} #>> {})", path_array(path)),
    }
}

#[derive(Default)]
struct SqlWriter {
    params: Vec<Param>,
    depth: usize,
}

impl SqlWriter {
    fn bind(&mut self, param: Param) -> String {
        self.params.push(param);
        format!("${}", self.params.len())
    }

    fn join(&mut self, children: &[Predicate], root: &str, op: &str, empty: &str) -> String {
        match children {
            [] => empty.to_string(),
            [only] => self.predicate(only, root),
            many => {
                let parts: Vec<String> = many.iter().map(|c| self.predicate(c, root)).collect();
                format!("({})", parts.join(&format!(" {op} ")))
            }
        }
    }

    fn predicate(&mut self, predicate: &Predicate, root: &str) -> String {
        match predicate {
            Predicate::Const(true) => "TRUE".to_string(),
            Predicate::Const(false) => "FALSE".to_string(),
            Predicate::And(children) => self.join(children, root, "AND", "TRUE"),
            Predicate::Or(children) => self.join(children, root, "OR", "FALSE"),
            Predicate::Not(child) => format!("NOT ({})", self.predicate(child, root)),
            Predicate::TextEq { path, value } => {
                let placeholder = self.bind(Param::Text(value.clone()));
                format!("COALESCE({} = {placeholder}, FALSE)", text_path(root, path))
            }
            Predicate::JsonEq { path, value } => {
                let placeholder = self.bind(Param::Json(value.clone()));
                format!(
                    "COALESCE({} = {placeholder}::jsonb, FALSE)",
                    json_path(root, path)
                )
            }
            Predicate::IsNull { path } => format!("({} IS NULL)", text_path(root, path)),
            Predicate::Compare { path, op, value } => {
                let placeholder = self.bind(Param::Float(*value));
                format!(
                    "(CASE WHEN jsonb_typeof({}) = 'number' THEN {}::float8 {} {placeholder} ELSE FALSE END)",
                    json_path(root, path),
                    text_path(root, path),
                    op.as_sql()
                )
            }
            Predicate::Exists { path } => format!("({} IS NOT NULL)", json_path(root, path)),
            Predicate::TypeIs { path, json_type } => {
                let placeholder = self.bind(Param::Text(json_type.as_str().to_string()));
                format!(
                    "COALESCE(jsonb_typeof({}) = {placeholder}, FALSE)",
                    json_path(root, path)
                )
            }
            Predicate::Contains { path, value } => {
                let placeholder = self.bind(Param::Json(value.clone()));
                format!(
                    "COALESCE({} @> {placeholder}::jsonb, FALSE)",
                    json_path(root, path)
                )
            }
            Predicate::ElemMatch { path, predicate } => {
                let array = json_path(root, path);
                self.depth += 1;
                let alias = format!("e{}", self.depth);
                let inner = self.predicate(predicate, &format!("{alias}.value"));
                self.depth -= 1;
                format!(
                    "EXISTS (SELECT 1 FROM jsonb_array_elements(CASE WHEN jsonb_typeof({array}) = 'array' THEN {array} ELSE '[]'::jsonb END) AS {alias}(value) WHERE {inner})"
                )
            }
        }
    }
}
