//! In-memory evaluation of document filters, projections and aggregation pipelines
use serde_json::{Map, Value};
use std::cmp::Ordering;

use crate::store::{StoreError, ID_FIELD};

/// Runs `pipeline`, a JSON array of single-key stage objects, over `docs`.
///
/// Supported stages: `$match`, `$project`, `$sort` (one field), `$skip`, `$limit`.
pub(crate) fn aggregate(mut docs: Vec<Value>, pipeline: &Value) -> Result<Vec<Value>, StoreError> {
    let stages = pipeline
        .as_array()
        .ok_or_else(|| invalid("pipeline must be an array"))?;

    for stage in stages {
        let (op, arg) = single_entry(stage)
            .ok_or_else(|| invalid("each pipeline stage must be an object with one key"))?;

        docs = match op {
            "$match" => {
                let mut kept = Vec::with_capacity(docs.len());
                for doc in docs {
                    if matches(&doc, arg)? {
                        kept.push(doc);
                    }
                }
                kept
            }
            "$project" => docs
                .iter()
                .map(|doc| project(doc, arg))
                .collect::<Result<Vec<_>, _>>()?,
            "$sort" => {
                sort(&mut docs, arg)?;
                docs
            }
            "$skip" => {
                let n = count(op, arg)?;
                docs.into_iter().skip(n).collect()
            }
            "$limit" => {
                docs.truncate(count(op, arg)?);
                docs
            }
            other => return Err(invalid(format!("unsupported stage {}", other))),
        };
    }

    Ok(docs)
}

/// Whether `doc` satisfies `filter`.
pub(crate) fn matches(doc: &Value, filter: &Value) -> Result<bool, StoreError> {
    let filter = filter
        .as_object()
        .ok_or_else(|| invalid("$match takes an object"))?;

    for (key, cond) in filter {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, cond)? {
                    all &= matches(doc, clause)?;
                }
                all
            }
            "$or" => {
                let mut any = false;
                for clause in clauses(key, cond)? {
                    any |= matches(doc, clause)?;
                }
                any
            }
            field => condition(lookup(doc, field), cond)?,
        };
        if !ok {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Applies a projection document.
///
/// `{"a": 1}` keeps `a` (and `_id` unless `"_id": 0`), `{"a": 0}` drops `a`,
/// `{"b": "$a.x"}` copies the value at path `a.x` into `b`.
pub(crate) fn project(doc: &Value, spec: &Value) -> Result<Value, StoreError> {
    let spec = spec
        .as_object()
        .filter(|spec| !spec.is_empty())
        .ok_or_else(|| invalid("$project takes a non-empty object"))?;

    let fields = || spec.iter().filter(|(key, _)| key.as_str() != ID_FIELD);
    let exclusion = fields().any(|(_, v)| !truthy(v));
    let inclusion = fields().any(|(_, v)| truthy(v));
    if exclusion && inclusion {
        return Err(invalid("$project cannot mix inclusion and exclusion"));
    }

    if !inclusion {
        let mut out = doc.clone();
        for (key, v) in spec {
            if !truthy(v) {
                remove_path(&mut out, key);
            }
        }
        return Ok(out);
    }

    let mut out = Value::Object(Map::new());
    if spec.get(ID_FIELD).map_or(true, truthy) {
        if let Some(id) = doc.get(ID_FIELD) {
            set_path(&mut out, ID_FIELD, id.clone());
        }
    }
    for (key, v) in fields() {
        let value = match v {
            Value::String(expr) if expr.starts_with('$') => lookup(doc, &expr[1..]),
            _ => lookup(doc, key),
        };
        if let Some(value) = value {
            set_path(&mut out, key, value.clone());
        }
    }
    Ok(out)
}

fn condition(field: Option<&Value>, cond: &Value) -> Result<bool, StoreError> {
    match cond.as_object() {
        Some(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => {
            for (op, arg) in ops {
                if !operator(field, op, arg)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ => Ok(equals(field, cond)),
    }
}

fn operator(field: Option<&Value>, op: &str, arg: &Value) -> Result<bool, StoreError> {
    let ordering = || field.and_then(|value| compare(value, arg));
    Ok(match op {
        "$eq" => equals(field, arg),
        "$ne" => !equals(field, arg),
        "$gt" => ordering() == Some(Ordering::Greater),
        "$gte" => matches!(ordering(), Some(Ordering::Greater | Ordering::Equal)),
        "$lt" => ordering() == Some(Ordering::Less),
        "$lte" => matches!(ordering(), Some(Ordering::Less | Ordering::Equal)),
        "$in" => clauses(op, arg)?.iter().any(|v| equals(field, v)),
        "$nin" => !clauses(op, arg)?.iter().any(|v| equals(field, v)),
        "$exists" => field.is_some() == truthy(arg),
        other => return Err(invalid(format!("unsupported operator {}", other))),
    })
}

/// Equality, where an array field also matches any of its elements.
fn equals(field: Option<&Value>, expected: &Value) -> bool {
    match field {
        Some(Value::Array(items)) if !expected.is_array() => items.contains(expected),
        Some(value) => value == expected,
        None => expected.is_null(),
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn sort(docs: &mut [Value], spec: &Value) -> Result<(), StoreError> {
    let (field, direction) =
        single_entry(spec).ok_or_else(|| invalid("$sort takes exactly one field"))?;
    let descending = match direction.as_i64() {
        Some(1) => false,
        Some(-1) => true,
        _ => return Err(invalid("$sort direction must be 1 or -1")),
    };

    docs.sort_by(|a, b| {
        // Missing fields sort first.
        let ord = match (lookup(a, field), lookup(b, field)) {
            (Some(a), Some(b)) => compare(a, b).unwrap_or(Ordering::Equal),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });
    Ok(())
}

fn count(op: &str, arg: &Value) -> Result<usize, StoreError> {
    arg.as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| invalid(format!("{} takes a non-negative integer", op)))
}

fn clauses<'a>(op: &str, arg: &'a Value) -> Result<&'a Vec<Value>, StoreError> {
    arg.as_array()
        .ok_or_else(|| invalid(format!("{} takes an array", op)))
}

fn single_entry(value: &Value) -> Option<(&str, &Value)> {
    let map = value.as_object()?;
    if map.len() != 1 {
        return None;
    }
    map.iter().next().map(|(k, v)| (k.as_str(), v))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        _ => true,
    }
}

/// Dotted-path read: `lookup(doc, "address.city")`.
fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, part| current.get(part))
}

fn set_path(doc: &mut Value, path: &str, value: Value) {
    let mut current = doc;
    let mut parts = path.split('.').peekable();
    while let Some(part) = parts.next() {
        let Value::Object(map) = current else {
            return;
        };
        if parts.peek().is_none() {
            map.insert(part.to_string(), value);
            return;
        }
        current = map
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

fn remove_path(doc: &mut Value, path: &str) {
    let (parent, leaf) = match path.rsplit_once('.') {
        Some((parent, leaf)) => (
            parent
                .split('.')
                .try_fold(doc, |current, part| current.get_mut(part)),
            leaf,
        ),
        None => (Some(doc), path),
    };
    if let Some(Value::Object(map)) = parent {
        map.remove(leaf);
    }
}

fn invalid(message: impl Into<String>) -> StoreError {
    StoreError::InvalidQuery(message.into())
}
