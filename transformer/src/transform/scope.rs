//! Lineage scope for nested stream records.
//!
//! A nested record sees its ancestors through four synthetic path heads:
//!
//! | Key       | Resolves to                                   |
//! |-----------|-----------------------------------------------|
//! | `@parent` | the enclosing record, with its own lineage    |
//! | `@root`   | the top-level record of the message           |
//! | `@index`  | position in the source array                  |
//! | `@item`   | the raw array element                         |
//!
//! Ancestors are borrowed, never copied into the child. `@parent` is only
//! materialized when an expression asks for it as a whole value.

use std::borrow::Cow;

use serde_json::{Map, Value};

use crate::error::PathResult;
use crate::transform::path::{self, Segment};

/// The immediate ancestor record
pub const PARENT_KEY: &str = "@parent";
/// The top-level record of the message
pub const ROOT_KEY: &str = "@root";
/// Position in the source array
pub const INDEX_KEY: &str = "@index";
/// The raw array element
pub const ITEM_KEY: &str = "@item";

/// A record together with its borrowed ancestry.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    record: &'a Value,
    root: &'a Value,
    parent: Option<&'a Scope<'a>>,
    item: Option<&'a Value>,
    index: Option<usize>,
}

impl<'a> Scope<'a> {
    /// A top-level record, without lineage.
    pub fn new(record: &'a Value) -> Self {
        Self {
            record,
            root: record,
            parent: None,
            item: None,
            index: None,
        }
    }

    /// Element `index` of an array found in `parent`.
    pub fn element(parent: &'a Scope<'a>, item: &'a Value, index: usize) -> Self {
        Self {
            record: item,
            root: parent.root,
            parent: Some(parent),
            item: Some(item),
            index: Some(index),
        }
    }

    /// A nested object found in `parent`.
    pub fn nested(parent: &'a Scope<'a>, value: &'a Value) -> Self {
        Self {
            record: value,
            root: parent.root,
            parent: Some(parent),
            item: None,
            index: None,
        }
    }

    /// The record itself, without lineage keys.
    pub fn record(&self) -> &'a Value {
        self.record
    }

    /// Read a path, resolving lineage heads through the scope.
    ///
    /// Lineage keys shadow record fields of the same name.
    pub fn get(&self, key: &str) -> PathResult<Option<Cow<'a, Value>>> {
        let segments = path::parse(key)?;
        self.resolve(&segments)
    }

    fn resolve(&self, segments: &[Segment]) -> PathResult<Option<Cow<'a, Value>>> {
        let Some((head, rest)) = segments.split_first() else {
            return Ok(Some(Cow::Owned(self.to_value())));
        };

        let (name, index) = match head {
            Segment::Key(name) => (name.as_str(), None),
            Segment::Index(name, n) => (name.as_str(), Some(*n)),
            Segment::Append(_) => return Ok(path::get_segments(self.record, segments)?.map(Cow::Borrowed)),
        };

        if let Some(parent) = self.parent {
            match name {
                PARENT_KEY if index.is_none() => return parent.resolve(rest),
                ROOT_KEY => return descend(self.root, index, rest),
                _ => {}
            }
        }

        match (name, self.item, self.index) {
            (ITEM_KEY, Some(item), _) => descend(item, index, rest),
            (INDEX_KEY, _, Some(position)) => {
                Ok((index.is_none() && rest.is_empty()).then(|| Cow::Owned(Value::from(position))))
            }
            _ => Ok(path::get_segments(self.record, segments)?.map(Cow::Borrowed)),
        }
    }

    /// Build the record with its lineage keys attached.
    pub fn to_value(&self) -> Value {
        let Some(parent) = self.parent else {
            return self.record.clone();
        };

        let mut map = match self.record {
            Value::Object(fields) => fields.clone(),
            _ => Map::new(),
        };
        if let Some(item) = self.item {
            map.insert(ITEM_KEY.to_string(), item.clone());
        }
        map.insert(PARENT_KEY.to_string(), parent.to_value());
        map.insert(ROOT_KEY.to_string(), self.root.clone());
        if let Some(position) = self.index {
            map.insert(INDEX_KEY.to_string(), Value::from(position));
        }
        Value::Object(map)
    }
}

fn descend<'a>(
    base: &'a Value,
    index: Option<usize>,
    rest: &[Segment],
) -> PathResult<Option<Cow<'a, Value>>> {
    let base = match index {
        Some(n) => match base.get(n) {
            Some(value) => value,
            None => return Ok(None),
        },
        None => base,
    };
    Ok(path::get_segments(base, rest)?.map(Cow::Borrowed))
}
