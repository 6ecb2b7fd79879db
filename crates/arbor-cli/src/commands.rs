use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use arbor_store::{
    open_store, BackendKind, Handle, NodeKind, Scalar, Store, StoreConfig, Transaction,
};
use arbor_tree::{parse_path, Segment};
use colored::Colorize;
use tracing::debug;

use crate::cli::*;

const DEFAULT_FILE: &str = "arbor.json";

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = resolve_config(&cli)?;
    debug!(backend = %config.backend, path = ?config.path, "resolved store config");
    let store = open_store(&config).with_context(|| match &config.path {
        Some(path) => format!("opening {} store at {}", config.backend, path.display()),
        None => format!("opening {} store", config.backend),
    })?;

    let mut out = io::stdout().lock();
    match &cli.command {
        Command::Init => cmd_init(&store, &config, &mut out),
        Command::Get(args) => cmd_get(&store, args, &mut out),
        Command::Set(args) => cmd_set(&store, args, &mut out),
        Command::Remove(args) => cmd_remove(&store, args, &mut out),
        Command::Dump(args) => cmd_dump(&store, args, &mut out),
    }?;
    store.close()?;
    Ok(())
}

/// Merge `--config`, `--file`, and `--backend`; flags win over the file.
fn resolve_config(cli: &Cli) -> anyhow::Result<StoreConfig> {
    let mut config = match &cli.config {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => {
            let file = cli.file.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_FILE));
            StoreConfig {
                backend: infer_backend(&file),
                path: Some(file),
                ..StoreConfig::default()
            }
        }
    };
    if let Some(file) = &cli.file {
        config.path = Some(file.clone());
    }
    if let Some(backend) = cli.backend {
        config.backend = backend.into();
    }
    Ok(config)
}

fn infer_backend(path: &Path) -> BackendKind {
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => BackendKind::Toml,
        _ => BackendKind::Json,
    }
}

fn cmd_init(store: &Store, config: &StoreConfig, out: &mut impl Write) -> anyhow::Result<()> {
    let mut txn = store.begin_transaction()?;
    txn.commit()?;
    match store.path() {
        Some(path) => writeln!(
            out,
            "{} Initialized {} store at {}",
            "✓".green().bold(),
            config.backend,
            path.display().to_string().bold()
        )?,
        None => writeln!(out, "{} Initialized in-memory store", "✓".green().bold())?,
    }
    Ok(())
}

fn cmd_get(store: &Store, args: &GetArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let txn = store.begin_transaction()?;
    let handle = txn.navigate(txn.root()?, &args.path)?;
    match txn.kind(handle)? {
        NodeKind::Object => {
            let keys = txn.keys(handle)?;
            writeln!(out, "{} with {} keys", "object".cyan(), keys.len())?;
            for key in keys {
                writeln!(out, "  {key}")?;
            }
        }
        NodeKind::Array => {
            writeln!(out, "{} with {} elements", "array".cyan(), txn.len(handle)?)?;
        }
        _ => writeln!(out, "{}", txn.value(handle)?)?,
    }
    Ok(())
}

fn cmd_set(store: &Store, args: &SetArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let segments = parse_path(&args.path)?;
    let Some((last, parents)) = segments.split_last() else {
        bail!("empty path");
    };

    let mut txn = store.begin_transaction()?;
    let parent = resolve_parent(&mut txn, parents, args.parents)?;
    match *last {
        Segment::Key(key) if txn.has(parent, key)? => {
            let handle = txn.child(parent, key)?;
            overwrite(&mut txn, handle, args)?;
        }
        Segment::Key(key) => {
            let kind = args.kind.unwrap_or_else(|| infer_type(&args.value));
            let handle = match parse_scalar(&args.value, kind)? {
                Scalar::Bool(b) => txn.make_bool(parent, key, b),
                Scalar::Int(i) => txn.make_int(parent, key, i),
                Scalar::Double(d) => txn.make_double(parent, key, d),
                Scalar::String(s) => txn.make_string(parent, key, s),
            }?;
            debug!(?handle, key, "created");
        }
        Segment::Index(index) if !txn.has_element(parent, index)? && index == txn.len(parent)? => {
            let kind = args.kind.unwrap_or_else(|| infer_type(&args.value));
            match parse_scalar(&args.value, kind)? {
                Scalar::Bool(b) => txn.push_bool(parent, b),
                Scalar::Int(i) => txn.push_int(parent, i),
                Scalar::Double(d) => txn.push_double(parent, d),
                Scalar::String(s) => txn.push_string(parent, s),
            }?;
        }
        Segment::Index(index) => {
            let handle = txn.element(parent, index)?;
            overwrite(&mut txn, handle, args)?;
        }
    }
    txn.commit()?;

    writeln!(out, "{} {} = {}", "✓".green().bold(), args.path.bold(), args.value)?;
    Ok(())
}

fn cmd_remove(store: &Store, args: &RemoveArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let segments = parse_path(&args.path)?;
    let Some((last, parents)) = segments.split_last() else {
        bail!("empty path");
    };

    let mut txn = store.begin_transaction()?;
    let parent = resolve_parent(&mut txn, parents, false)?;
    match *last {
        Segment::Key(key) => txn.remove(parent, key)?,
        Segment::Index(index) => txn.erase_element(parent, index)?,
    }
    txn.commit()?;

    writeln!(out, "{} removed {}", "✓".green().bold(), args.path.bold())?;
    Ok(())
}

fn cmd_dump(store: &Store, args: &DumpArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let txn = store.begin_transaction()?;
    let root = txn.root()?;
    match &args.path {
        Some(path) => dump_node(&txn, txn.navigate(root, path)?, path, out),
        None => dump_node(&txn, root, "", out),
    }
}

fn dump_node(
    txn: &Transaction<'_>,
    handle: Handle,
    path: &str,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match txn.kind(handle)? {
        NodeKind::Object => {
            let keys = txn.keys(handle)?;
            if keys.is_empty() && !path.is_empty() {
                writeln!(out, "{} = {}", path.bold(), "{}".dimmed())?;
            }
            for key in keys {
                let child = txn.child(handle, &key)?;
                let child_path = if path.is_empty() {
                    key
                } else {
                    format!("{path}.{key}")
                };
                dump_node(txn, child, &child_path, out)?;
            }
        }
        NodeKind::Array => {
            let len = txn.len(handle)?;
            if len == 0 {
                writeln!(out, "{} = {}", path.bold(), "[]".dimmed())?;
            }
            for index in 0..len {
                dump_node(txn, txn.element(handle, index)?, &format!("{path}[{index}]"), out)?;
            }
        }
        kind => {
            let value = match txn.value(handle)? {
                Scalar::String(s) => format!("{s:?}"),
                other => other.to_string(),
            };
            let tag = format!("({kind})");
            writeln!(out, "{} = {} {}", path.bold(), value, tag.as_str().dimmed())?;
        }
    }
    Ok(())
}

/// Walk all but the last segment, optionally creating missing objects.
fn resolve_parent(
    txn: &mut Transaction<'_>,
    segments: &[Segment<'_>],
    create: bool,
) -> anyhow::Result<Handle> {
    let mut current = txn.root()?;
    for segment in segments {
        current = match *segment {
            Segment::Key(key) if create && !txn.has(current, key)? => txn.make_object(current, key)?,
            Segment::Key(key) => txn.child(current, key)?,
            Segment::Index(index) => txn.element(current, index)?,
        };
    }
    Ok(current)
}

fn overwrite(txn: &mut Transaction<'_>, handle: Handle, args: &SetArgs) -> anyhow::Result<()> {
    let existing = txn.kind(handle)?;
    let kind = match args.kind.or_else(|| value_type(existing)) {
        Some(kind) => kind,
        None => bail!("{} is {existing}; only scalars can be set", args.path),
    };
    match parse_scalar(&args.value, kind)? {
        Scalar::Bool(b) => txn.set_bool(handle, b),
        Scalar::Int(i) => txn.set_int(handle, i),
        Scalar::Double(d) => txn.set_double(handle, d),
        Scalar::String(s) => txn.set_string(handle, s),
    }?;
    Ok(())
}

fn value_type(kind: NodeKind) -> Option<ValueType> {
    match kind {
        NodeKind::Bool => Some(ValueType::Bool),
        NodeKind::Int => Some(ValueType::Int),
        NodeKind::Double => Some(ValueType::Double),
        NodeKind::String => Some(ValueType::String),
        NodeKind::Object | NodeKind::Array => None,
    }
}

fn infer_type(raw: &str) -> ValueType {
    if raw == "true" || raw == "false" {
        ValueType::Bool
    } else if raw.parse::<i64>().is_ok() {
        ValueType::Int
    } else if raw.parse::<f64>().is_ok_and(f64::is_finite) {
        ValueType::Double
    } else {
        ValueType::String
    }
}

fn parse_scalar(raw: &str, kind: ValueType) -> anyhow::Result<Scalar> {
    Ok(match kind {
        ValueType::Bool => Scalar::Bool(raw.parse().with_context(|| format!("{raw:?} is not a bool"))?),
        ValueType::Int => Scalar::Int(raw.parse().with_context(|| format!("{raw:?} is not an int"))?),
        ValueType::Double => {
            Scalar::Double(raw.parse().with_context(|| format!("{raw:?} is not a double"))?)
        }
        ValueType::String => Scalar::String(raw.to_string()),
    })
}
