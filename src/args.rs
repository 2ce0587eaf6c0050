use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use ldapfix::FormatKind;
use serde::{Deserialize, Serialize};


pub const DEFAULT_FILTER: &str = "(objectclass=*)";


#[derive(Clone, Debug, Eq, Hash, Ord, Parser, PartialEq, PartialOrd)]
#[command(version, about = "Load and dump LDAP directory fixtures")]
pub struct Opts {
    /// More log output; repeat for trace level. RUST_LOG overrides this.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub mode: Mode,
}


#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Subcommand)]
pub enum Mode {
    /// Apply the change records in a file to an LDAP directory.
    Load(LoadOpts),

    /// Write a directory subtree to a file.
    Dump(DumpOpts),

    /// Replay a file into an in-memory directory and dump it in another format.
    Convert(ConvertOpts),
}


#[derive(Args, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ConnectionOpts {
    #[arg(short = 'H', long)]
    pub ldap_uri: String,

    #[arg(short = 'D', long, group = "auth", required = true)]
    pub bind_dn: Option<String>,

    #[arg(short = 'c', long, group = "auth", required = true)]
    pub credentials_file: Option<PathBuf>,

    /// Connection timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,
}


#[derive(Args, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct LoadOpts {
    #[command(flatten)]
    pub connection: ConnectionOpts,

    /// Input format; guessed from the file extension if omitted.
    #[arg(long, value_enum)]
    pub format: Option<FormatKind>,

    /// Skip records that cannot be parsed or that the directory rejects.
    #[arg(long)]
    pub ignore_errors: bool,

    /// Exit with an error if the load stops early.
    #[arg(long)]
    pub strict: bool,

    pub input: PathBuf,
}


#[derive(Args, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct DumpOpts {
    #[command(flatten)]
    pub connection: ConnectionOpts,

    /// Output format; guessed from the output file extension if omitted.
    #[arg(long, value_enum)]
    pub format: Option<FormatKind>,

    #[arg(short = 'b', long)]
    pub base: String,

    #[arg(short = 'f', long, default_value = DEFAULT_FILTER)]
    pub filter: String,

    /// Output file; standard output if omitted.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    #[arg(long)]
    pub strict: bool,
}


#[derive(Args, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ConvertOpts {
    #[arg(long, value_enum)]
    pub from: Option<FormatKind>,

    #[arg(long, value_enum)]
    pub to: Option<FormatKind>,

    /// Subtree to write; everything if omitted.
    #[arg(short = 'b', long, default_value = "")]
    pub base: String,

    #[arg(short = 'f', long, default_value = DEFAULT_FILTER)]
    pub filter: String,

    #[arg(long)]
    pub ignore_errors: bool,

    pub input: PathBuf,

    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,
}


#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Credentials {
    pub bind_dn: String,
    pub password: String,
}
