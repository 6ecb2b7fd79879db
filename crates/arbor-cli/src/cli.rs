use std::path::PathBuf;

use arbor_store::BackendKind;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "arbor",
    about = "Arbor: transactional hierarchical document store",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Store configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Storage backend; inferred from the file extension when omitted
    #[arg(short, long, global = true)]
    pub backend: Option<BackendArg>,

    /// Backing file of the store
    #[arg(short, long, global = true)]
    pub file: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum BackendArg {
    Json,
    Toml,
    Memory,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Json => BackendKind::Json,
            BackendArg::Toml => BackendKind::Toml,
            BackendArg::Memory => BackendKind::Memory,
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the backing file with an empty document
    Init,
    /// Print the value at a path
    Get(GetArgs),
    /// Set or create a scalar at a path
    Set(SetArgs),
    /// Remove the key or array element at a path
    Remove(RemoveArgs),
    /// Print every leaf of the document
    Dump(DumpArgs),
}

#[derive(Args)]
pub struct GetArgs {
    pub path: String,
}

#[derive(Args)]
pub struct SetArgs {
    pub path: String,
    pub value: String,
    /// Value type; inferred from the text (or the existing node) when omitted
    #[arg(short = 't', long = "type")]
    pub kind: Option<ValueType>,
    /// Create missing intermediate objects
    #[arg(short, long)]
    pub parents: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ValueType {
    Bool,
    Int,
    Double,
    String,
}

#[derive(Args)]
pub struct RemoveArgs {
    pub path: String,
}

#[derive(Args)]
pub struct DumpArgs {
    /// Start at this path instead of the root
    pub path: Option<String>,
}
