//! Dotted field paths into a JSON document.

use crate::{error::Result, Error};
use serde_json::Value;

/// A path from a root value to one of its members, e.g. `address.city`.
///
/// Segments address object keys; on arrays a segment that parses as an
/// integer addresses an element (negative values count from the end), the
/// same way PostgreSQL's `#>` operator walks a `jsonb` value. The empty path
/// addresses the root itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// The path addressing the root value.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a dotted field name.
    pub fn parse(field: &str) -> Result<Self> {
        if field.is_empty() || field.contains('\0') {
            return Err(Error::InvalidFieldPath(field.to_string()));
        }
        let segments: Vec<String> = field.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(Error::InvalidFieldPath(field.to_string()));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Resolve the path against a value. `None` means the path is absent.
    pub fn lookup<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(root, |current, segment| match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => {
                    let index: i64 = segment.parse().ok()?;
                    let index = if index < 0 {
                        items.len() as i64 + index
                    } else {
                        index
                    };
                    usize::try_from(index).ok().and_then(|i| items.get(i))
                }
                _ => None,
            })
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_root() {
            f.write_str("<element>")
        } else {
            f.write_str(&self.segments.join("."))
        }
    }
}
