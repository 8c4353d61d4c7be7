//! Message-to-document helpers shared by the writer and reader nodes.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::store::Document;

/// Underscore fields the store accepts on a document.
pub const RESERVED_FIELDS: [&str; 9] = ["_id", "_rev", "_attachments", "_deleted", "_revisions", "_revs_info", "_conflicts", "_deleted_conflicts", "_local_seq"];

static SEPARATOR_RUNS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[\s/]+").ok());

/// A field renamed by [`sanitize_document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renamed {
    pub from: String,
    pub to: String,
}

impl std::fmt::Display for Renamed {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "Property '{}' renamed to '{}'.", self.from, self.to)
    }
}

/// Database names are lower case, without whitespace or slashes, and may
/// not start with an underscore.
pub fn normalize_database_name(name: &str) -> String {
    let lower = name.to_lowercase();
    let collapsed = match SEPARATOR_RUNS.as_ref() {
        Some(re) => re.replace_all(&lower, "-").into_owned(),
        None => lower,
    };
    collapsed.trim_start_matches('_').to_string()
}

pub fn is_valid_field_name(name: &str) -> bool {
    !name.starts_with('_') || RESERVED_FIELDS.contains(&name)
}

/// Strip the leading underscore of every top-level field the store would
/// reject. A renamed field replaces any field already using the new name.
pub fn sanitize_document(doc: Document) -> (Document, Vec<Renamed>) {
    let mut sanitized = Map::new();
    let mut moved = Vec::new();

    for (key, value) in doc {
        if is_valid_field_name(&key) {
            sanitized.insert(key, value);
        } else {
            moved.push((key, value));
        }
    }

    let renamed = moved
        .into_iter()
        .map(|(key, value)| {
            let to = key[1..].to_string();
            sanitized.insert(to.clone(), value);
            Renamed {
                from: key,
                to,
            }
        })
        .collect();

    (sanitized, renamed)
}

/// Parse textual JSON, leaving any other value (or unparsable text) as is.
pub fn parse_textual(value: Value) -> Value {
    match value {
        Value::String(text) => serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text)),
        other => other,
    }
}

/// The value as a JSON object, parsing it first when textual.
pub fn parse_object(value: Value) -> Option<Document> {
    match parse_textual(value) {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Turn any message body into a document.
///
/// Objects pass through, text holding a JSON object is parsed, anything else
/// is stored as the single field `root`.
pub fn coerce_to_document(
    raw: Value,
    root: &str,
) -> Document {
    match raw {
        Value::Object(map) => map,
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => map,
            _ => wrap(root, Value::String(text)),
        },
        other => wrap(root, other),
    }
}

fn wrap(
    root: &str,
    value: Value,
) -> Document {
    let mut doc = Map::new();
    doc.insert(root.to_string(), value);
    doc
}

/// `null`, `false`, `0` and `""` count as absent.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Scalars rendered without JSON quoting.
pub fn plain_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
