//! Mango selector evaluation for the in-memory store.

use std::cmp::Ordering;

use regex::Regex;
use serde_json::{Map, Value};

/// Whether `doc` satisfies every clause of `selector`.
pub fn matches(
    doc: &Value,
    selector: &Map<String, Value>,
) -> bool {
    selector.iter().all(|(key, condition)| match key.as_str() {
        "$and" => sub_selectors(condition).is_some_and(|subs| subs.iter().all(|s| matches(doc, s))),
        "$or" => sub_selectors(condition).is_some_and(|subs| subs.iter().any(|s| matches(doc, s))),
        "$nor" => sub_selectors(condition).is_some_and(|subs| !subs.iter().any(|s| matches(doc, s))),
        "$not" => condition.as_object().is_some_and(|s| !matches(doc, s)),
        field => evaluate(lookup(doc, field), condition),
    })
}

fn sub_selectors(condition: &Value) -> Option<Vec<&Map<String, Value>>> {
    condition.as_array()?.iter().map(Value::as_object).collect()
}

/// Resolve a dotted field path.
fn lookup<'a>(
    doc: &'a Value,
    path: &str,
) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, key| current.get(key))
}

fn is_operator_map(condition: &Value) -> bool {
    condition.as_object().is_some_and(|m| !m.is_empty() && m.keys().all(|k| k.starts_with('$')))
}

fn evaluate(
    actual: Option<&Value>,
    condition: &Value,
) -> bool {
    if is_operator_map(condition) {
        let Some(operators) = condition.as_object() else {
            return false;
        };
        return operators.iter().all(|(op, expected)| apply(actual, op, expected));
    }

    match (actual, condition) {
        // nested selector: {"address": {"city": "Paris"}}
        (Some(value @ Value::Object(_)), Value::Object(sub)) => matches(value, sub),
        (Some(value), expected) => value == expected,
        (None, _) => false,
    }
}

fn apply(
    actual: Option<&Value>,
    op: &str,
    expected: &Value,
) -> bool {
    match op {
        "$exists" => actual.is_some() == expected.as_bool().unwrap_or(true),
        "$ne" => actual != Some(expected),
        "$nin" => expected.as_array().is_some_and(|list| actual.is_none_or(|v| !list.contains(v))),
        "$not" => !evaluate(actual, expected),
        _ => {
            let Some(value) = actual else {
                return false;
            };
            match op {
                "$eq" => value == expected,
                "$gt" => compare(value, expected) == Some(Ordering::Greater),
                "$gte" => matches!(compare(value, expected), Some(Ordering::Greater | Ordering::Equal)),
                "$lt" => compare(value, expected) == Some(Ordering::Less),
                "$lte" => matches!(compare(value, expected), Some(Ordering::Less | Ordering::Equal)),
                "$in" => expected.as_array().is_some_and(|list| list.contains(value)),
                "$size" => value.as_array().zip(expected.as_u64()).is_some_and(|(arr, n)| arr.len() as u64 == n),
                "$all" => value.as_array().zip(expected.as_array()).is_some_and(|(arr, wanted)| wanted.iter().all(|w| arr.contains(w))),
                "$elemMatch" => value.as_array().is_some_and(|arr| arr.iter().any(|item| evaluate(Some(item), expected))),
                "$regex" => match (value.as_str(), expected.as_str()) {
                    (Some(text), Some(pattern)) => Regex::new(pattern).is_ok_and(|re| re.is_match(text)),
                    _ => false,
                },
                _ => false,
            }
        }
    }
}

fn compare(
    a: &Value,
    b: &Value,
) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
