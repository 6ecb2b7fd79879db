//! TOML encoding of a document tree.
//!
//! The root object is the top-level table. TOML emits a table's plain values
//! before its sub-tables, so with `preserve_order` the declared order holds
//! within each of those two groups; without it keys are written sorted.

use arbor_tree::{Node, NodeTable};
use arbor_types::{validate_key, Handle, Scalar, StoreError, StoreResult};
use toml::{Table, Value};

use crate::options::TomlOptions;

const FORMAT: &str = "TOML";

/// Serialize the whole tree as a TOML document.
pub fn encode(table: &NodeTable, options: &TomlOptions) -> StoreResult<String> {
    let Value::Table(root) = to_value(table, table.root(), options.preserve_order)? else {
        return Err(StoreError::Unknown("root is not an object".into()));
    };
    toml::to_string(&root).map_err(|e| StoreError::Unknown(format!("TOML serialization failed: {e}")))
}

/// Parse `text` into a fresh tree whose allocations start at `stamp`.
pub fn decode(text: &str, options: &TomlOptions, stamp: u32) -> StoreResult<NodeTable> {
    let root: Table = text.parse().map_err(|e: toml::de::Error| parse_error(e.to_string()))?;

    let mut table = NodeTable::with_stamp(stamp);
    let handle = table.root();
    load_table(&mut table, handle, root, options)?;
    Ok(table)
}

fn to_value(table: &NodeTable, handle: Handle, preserve_order: bool) -> StoreResult<Value> {
    Ok(match table.get(handle)? {
        Node::Object(children) => {
            let mut entries: Vec<(&String, &Handle)> = children.iter().collect();
            if !preserve_order {
                entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            }
            let mut out = Table::new();
            for (key, child) in entries {
                out.insert(key.clone(), to_value(table, *child, preserve_order)?);
            }
            Value::Table(out)
        }
        Node::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| to_value(table, *item, preserve_order))
                .collect::<StoreResult<_>>()?,
        ),
        Node::Scalar(Scalar::Bool(b)) => Value::Boolean(*b),
        Node::Scalar(Scalar::Int(i)) => Value::Integer(*i),
        Node::Scalar(Scalar::Double(d)) => Value::Float(*d),
        Node::Scalar(Scalar::String(s)) => Value::String(s.clone()),
    })
}

fn load_table(
    table: &mut NodeTable,
    parent: Handle,
    source: Table,
    options: &TomlOptions,
) -> StoreResult<()> {
    for (key, value) in source {
        validate_key(&key).map_err(|e| parse_error(e.to_string()))?;
        match value {
            Value::Table(children) => {
                let child = table.insert(parent, &key, Node::object())?;
                load_table(table, child, children, options)?;
            }
            Value::Array(items) => {
                let child = table.insert(parent, &key, Node::array())?;
                load_array(table, child, items, options)?;
            }
            scalar => {
                table.insert(parent, &key, Node::Scalar(to_scalar(scalar, options)?))?;
            }
        }
    }
    Ok(())
}

fn load_array(
    table: &mut NodeTable,
    parent: Handle,
    items: Vec<Value>,
    options: &TomlOptions,
) -> StoreResult<()> {
    for value in items {
        match value {
            Value::Table(children) => {
                let child = table.push(parent, Node::object())?;
                load_table(table, child, children, options)?;
            }
            Value::Array(nested) => {
                let child = table.push(parent, Node::array())?;
                load_array(table, child, nested, options)?;
            }
            scalar => {
                table.push(parent, Node::Scalar(to_scalar(scalar, options)?))?;
            }
        }
    }
    Ok(())
}

fn to_scalar(value: Value, options: &TomlOptions) -> StoreResult<Scalar> {
    match value {
        Value::Boolean(b) => Ok(Scalar::Bool(b)),
        Value::Integer(i) => Ok(Scalar::Int(i)),
        Value::Float(f) if f.is_finite() => Ok(Scalar::Double(f)),
        Value::Float(f) => Err(parse_error(format!("non-finite float {f} is not supported"))),
        Value::String(s) => Ok(Scalar::String(s)),
        Value::Datetime(dt) if options.strict_types => {
            Err(parse_error(format!("datetime {dt} is not supported in strict mode")))
        }
        Value::Datetime(dt) => Ok(Scalar::String(dt.to_string())),
        Value::Array(_) | Value::Table(_) => Err(parse_error("expected a scalar")),
    }
}

fn parse_error(reason: impl Into<String>) -> StoreError {
    StoreError::Parse {
        format: FORMAT,
        reason: reason.into(),
    }
}
