//! JSON encoding of a document tree.
//!
//! Objects map to JSON objects in declared key order, arrays to arrays,
//! scalars to booleans, numbers, and strings. Integers are written without a
//! fraction and doubles always with one, so the two survive a round trip as
//! distinct kinds. `null` has no counterpart and is rejected on load.

use std::fmt;

use arbor_tree::{Node, NodeTable};
use arbor_types::{validate_key, Handle, Scalar, StoreError, StoreResult};
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::{Map, Number, Value};

use crate::options::JsonOptions;

const FORMAT: &str = "JSON";

/// Serialize the whole tree as pretty-printed JSON.
pub fn encode(table: &NodeTable) -> StoreResult<String> {
    let value = to_value(table, table.root())?;
    let mut text = serde_json::to_string_pretty(&value)
        .map_err(|e| StoreError::Unknown(format!("JSON serialization failed: {e}")))?;
    text.push('\n');
    Ok(text)
}

/// Parse `text` into a fresh tree whose allocations start at `stamp`.
pub fn decode(text: &str, options: &JsonOptions, stamp: u32) -> StoreResult<NodeTable> {
    let Strict(value) = if options.allow_comments {
        serde_json::from_str(&strip_comments(text)?)
    } else {
        serde_json::from_str(text)
    }
    .map_err(|e| parse_error(e.to_string()))?;

    let Value::Object(map) = value else {
        return Err(parse_error("document root must be an object"));
    };

    let mut table = NodeTable::with_stamp(stamp);
    let root = table.root();
    load_object(&mut table, root, map)?;
    Ok(table)
}

/// A JSON value in which no object repeats a key.
///
/// `serde_json::Value` keeps the last of several equal keys; a document
/// with a repeated key is rejected instead.
struct Strict(Value);

impl<'de> Deserialize<'de> for Strict {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(StrictVisitor)
    }
}

struct StrictVisitor;

impl<'de> Visitor<'de> for StrictVisitor {
    type Value = Strict;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a JSON value")
    }

    fn visit_bool<E>(self, value: bool) -> Result<Strict, E>
    where
        E: de::Error,
    {
        Ok(Strict(Value::Bool(value)))
    }

    fn visit_i64<E>(self, value: i64) -> Result<Strict, E>
    where
        E: de::Error,
    {
        Ok(Strict(Value::from(value)))
    }

    fn visit_u64<E>(self, value: u64) -> Result<Strict, E>
    where
        E: de::Error,
    {
        Ok(Strict(Value::from(value)))
    }

    fn visit_f64<E>(self, value: f64) -> Result<Strict, E>
    where
        E: de::Error,
    {
        Number::from_f64(value)
            .map(|n| Strict(Value::Number(n)))
            .ok_or_else(|| E::custom(format_args!("unrepresentable number {value}")))
    }

    fn visit_str<E>(self, value: &str) -> Result<Strict, E>
    where
        E: de::Error,
    {
        Ok(Strict(Value::String(value.to_owned())))
    }

    fn visit_string<E>(self, value: String) -> Result<Strict, E>
    where
        E: de::Error,
    {
        Ok(Strict(Value::String(value)))
    }

    fn visit_unit<E>(self) -> Result<Strict, E>
    where
        E: de::Error,
    {
        Ok(Strict(Value::Null))
    }

    fn visit_none<E>(self) -> Result<Strict, E>
    where
        E: de::Error,
    {
        Ok(Strict(Value::Null))
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Strict, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::new();
        while let Some(Strict(value)) = seq.next_element()? {
            items.push(value);
        }
        Ok(Strict(Value::Array(items)))
    }

    fn visit_map<A>(self, mut access: A) -> Result<Strict, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut map = Map::new();
        while let Some(key) = access.next_key::<String>()? {
            if map.contains_key(&key) {
                return Err(de::Error::custom(format_args!("duplicate key {key:?}")));
            }
            let Strict(value) = access.next_value()?;
            map.insert(key, value);
        }
        Ok(Strict(Value::Object(map)))
    }
}

fn to_value(table: &NodeTable, handle: Handle) -> StoreResult<Value> {
    Ok(match table.get(handle)? {
        Node::Object(children) => {
            let mut map = Map::with_capacity(children.len());
            for (key, child) in children {
                map.insert(key.clone(), to_value(table, *child)?);
            }
            Value::Object(map)
        }
        Node::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| to_value(table, *item))
                .collect::<StoreResult<_>>()?,
        ),
        Node::Scalar(Scalar::Bool(b)) => Value::Bool(*b),
        Node::Scalar(Scalar::Int(i)) => Value::Number((*i).into()),
        Node::Scalar(Scalar::Double(d)) => {
            Value::Number(Number::from_f64(*d).ok_or_else(|| {
                StoreError::InvalidArgument(format!("double {d} has no JSON representation"))
            })?)
        }
        Node::Scalar(Scalar::String(s)) => Value::String(s.clone()),
    })
}

fn load_object(table: &mut NodeTable, parent: Handle, map: Map<String, Value>) -> StoreResult<()> {
    for (key, value) in map {
        validate_key(&key).map_err(|e| parse_error(e.to_string()))?;
        match value {
            Value::Object(children) => {
                let child = table.insert(parent, &key, Node::object())?;
                load_object(table, child, children)?;
            }
            Value::Array(items) => {
                let child = table.insert(parent, &key, Node::array())?;
                load_array(table, child, items)?;
            }
            scalar => {
                table.insert(parent, &key, Node::Scalar(to_scalar(scalar)?))?;
            }
        }
    }
    Ok(())
}

fn load_array(table: &mut NodeTable, parent: Handle, items: Vec<Value>) -> StoreResult<()> {
    for value in items {
        match value {
            Value::Object(children) => {
                let child = table.push(parent, Node::object())?;
                load_object(table, child, children)?;
            }
            Value::Array(nested) => {
                let child = table.push(parent, Node::array())?;
                load_array(table, child, nested)?;
            }
            scalar => {
                table.push(parent, Node::Scalar(to_scalar(scalar)?))?;
            }
        }
    }
    Ok(())
}

fn to_scalar(value: Value) -> StoreResult<Scalar> {
    match value {
        Value::Bool(b) => Ok(Scalar::Bool(b)),
        Value::String(s) => Ok(Scalar::String(s)),
        Value::Number(n) if n.is_f64() => n
            .as_f64()
            .map(Scalar::Double)
            .ok_or_else(|| parse_error(format!("unrepresentable number {n}"))),
        Value::Number(n) => n
            .as_i64()
            .map(Scalar::Int)
            .ok_or_else(|| parse_error(format!("integer {n} does not fit in 64 bits"))),
        Value::Null => Err(parse_error("null values are not supported")),
        Value::Array(_) | Value::Object(_) => Err(parse_error("expected a scalar")),
    }
}

/// Blank out `//` line comments and `/* */` block comments that appear
/// outside string literals. Newlines are kept so parser positions still
/// match the original text.
pub fn strip_comments(text: &str) -> StoreResult<String> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    let mut in_string = false;

    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            out.push(b);
            match b {
                b'\\' if i + 1 < bytes.len() => {
                    out.push(bytes[i + 1]);
                    i += 2;
                    continue;
                }
                b'"' => in_string = false,
                _ => {}
            }
            i += 1;
            continue;
        }

        match (b, bytes.get(i + 1)) {
            (b'"', _) => {
                in_string = true;
                out.push(b);
                i += 1;
            }
            (b'/', Some(b'/')) => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    out.push(b' ');
                    i += 1;
                }
            }
            (b'/', Some(b'*')) => {
                let start = i;
                out.extend_from_slice(b"  ");
                i += 2;
                loop {
                    match (bytes.get(i), bytes.get(i + 1)) {
                        (Some(b'*'), Some(b'/')) => {
                            out.extend_from_slice(b"  ");
                            i += 2;
                            break;
                        }
                        (Some(b'\n'), _) => {
                            out.push(b'\n');
                            i += 1;
                        }
                        (Some(_), _) => {
                            out.push(b' ');
                            i += 1;
                        }
                        (None, _) => {
                            return Err(parse_error(format!(
                                "unterminated block comment at byte {start}"
                            )));
                        }
                    }
                }
            }
            _ => {
                out.push(b);
                i += 1;
            }
        }
    }

    // Comment bytes only ever become ASCII spaces, so this cannot fail.
    String::from_utf8(out).map_err(|e| StoreError::Unknown(e.to_string()))
}

fn parse_error(reason: impl Into<String>) -> StoreError {
    StoreError::Parse {
        format: FORMAT,
        reason: reason.into(),
    }
}
