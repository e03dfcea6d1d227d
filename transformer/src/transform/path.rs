//! Dot/bracket path access over JSON values.
//!
//! A path is a list of segments separated by `.`. Each segment is one of:
//!
//! | Segment   | Read                  | Write                                   |
//! |-----------|-----------------------|-----------------------------------------|
//! | `name`    | object key            | creates an object if absent             |
//! | `name[]`  | not readable          | appends a new element (never idempotent)|
//! | `name[N]` | element N of an array | pads with `null` up to N, writes at N   |
//!
//! ```text
//! set({}, "foo[].fiz", "baz")  ->  {"foo": [{"fiz": "baz"}]}
//! set({}, "foo[1]", "baz")     ->  {"foo": [null, "baz"]}
//! get({"a": {"b": 4}}, "a.b")  ->  4
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{PathError, PathResult};

static BRACKET_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^\[\]]+)\[([^\[\]]*)\]$").expect("valid segment regex"));

/// One parsed path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Plain object key.
    Key(String),
    /// `name[]`
    Append(String),
    /// `name[N]`
    Index(String, usize),
}

impl Segment {
    fn parse(raw: &str) -> PathResult<Self> {
        if !raw.contains('[') && !raw.contains(']') {
            return Ok(Segment::Key(raw.to_string()));
        }

        let caps = BRACKET_SEGMENT
            .captures(raw)
            .ok_or_else(|| PathError::MalformedSegment {
                segment: raw.to_string(),
            })?;
        let name = caps[1].to_string();
        let index = &caps[2];

        if index.is_empty() {
            return Ok(Segment::Append(name));
        }

        // `usize::from_str` accepts a leading '+'
        if !index.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PathError::InvalidIndex {
                segment: raw.to_string(),
                index: index.to_string(),
            });
        }
        index
            .parse::<usize>()
            .map(|n| Segment::Index(name, n))
            .map_err(|_| PathError::InvalidIndex {
                segment: raw.to_string(),
                index: index.to_string(),
            })
    }
}

/// Split a path into segments.
pub fn parse(path: &str) -> PathResult<Vec<Segment>> {
    if path.is_empty() {
        return Err(PathError::Empty);
    }

    path.split('.')
        .map(|raw| {
            if raw.is_empty() {
                Err(PathError::EmptySegment {
                    path: path.to_string(),
                })
            } else {
                Segment::parse(raw)
            }
        })
        .collect()
}

/// Read a nested value.
///
/// Missing keys, non-object intermediates and out-of-range indices all yield
/// `Ok(None)`. Only a malformed path is an error.
pub fn get<'v>(value: &'v Value, path: &str) -> PathResult<Option<&'v Value>> {
    get_segments(value, &parse(path)?)
}

/// [`get`] over already parsed segments. No segments reads `value` itself.
pub fn get_segments<'v>(value: &'v Value, segments: &[Segment]) -> PathResult<Option<&'v Value>> {
    let mut current = value;

    for segment in segments {
        let next = match segment {
            Segment::Key(key) => current.get(key),
            Segment::Index(key, n) => current.get(key).and_then(|v| v.get(*n)),
            Segment::Append(key) => {
                return Err(PathError::AppendNotReadable {
                    segment: format!("{}[]", key),
                })
            }
        };

        match next {
            Some(v) => current = v,
            None => return Ok(None),
        }
    }

    Ok(Some(current))
}

/// Write `leaf` at `path`, creating intermediate objects and arrays as needed.
///
/// The path is parsed before anything is touched, so an invalid path leaves
/// `value` unchanged. Callers must use the returned value.
pub fn set(mut value: Value, path: &str, leaf: Value) -> PathResult<Value> {
    set_in(&mut value, path, leaf)?;
    Ok(value)
}

/// In-place form of [`set`].
pub fn set_in(target: &mut Value, path: &str, leaf: Value) -> PathResult<()> {
    let segments = parse(path)?;
    set_segments(target, &segments, leaf);
    Ok(())
}

fn set_segments(slot: &mut Value, segments: &[Segment], leaf: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *slot = leaf;
        return;
    };

    let map = object_slot(slot);

    match head {
        Segment::Key(key) => {
            if rest.is_empty() {
                map.insert(key.clone(), leaf);
            } else {
                let child = map
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                set_segments(child, rest, leaf);
            }
        }
        Segment::Append(key) => {
            let items = array_slot(map.entry(key.clone()).or_insert(Value::Null));
            if rest.is_empty() {
                items.push(leaf);
            } else {
                items.push(Value::Object(Map::new()));
                if let Some(last) = items.last_mut() {
                    set_segments(last, rest, leaf);
                }
            }
        }
        Segment::Index(key, n) => {
            let items = array_slot(map.entry(key.clone()).or_insert(Value::Null));
            if items.len() <= *n {
                items.resize(*n + 1, Value::Null);
            }
            set_segments(&mut items[*n], rest, leaf);
        }
    }
}

/// Replace anything that is not an object with an empty one.
fn object_slot(slot: &mut Value) -> &mut Map<String, Value> {
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(map) => map,
        _ => unreachable!("slot was just made an object"),
    }
}

/// Replace anything that is not an array with an empty one.
fn array_slot(slot: &mut Value) -> &mut Vec<Value> {
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    match slot {
        Value::Array(items) => items,
        _ => unreachable!("slot was just made an array"),
    }
}
