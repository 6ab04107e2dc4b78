use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Merge NHS PROMs extracts per condition and generate SQL load scripts",
    long_about = None
)]
pub struct Cli {
    #[command(flatten)]
    pub paths: PathArgs,
    /// Reserved option; accepted and currently ignored
    #[arg(short = 'f', long = "foo", default_value = "bar", global = true)]
    pub foo: String,
    /// Stage to run (defaults to the full pipeline)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Merge raw extracts and write schema, import, and drop scripts
    Run,
    /// Merge raw extracts into one CSV per condition
    Prepare,
    /// Write schema, import, and drop scripts from the processed CSVs
    Sql,
    /// List header groups and how each raw file was classified
    Groups,
    /// Print the active classification rules as YAML
    Rules,
}

#[derive(Debug, Clone, Args)]
pub struct PathArgs {
    /// Directory tree holding the raw PROMs CSV extracts
    #[arg(long = "raw-dir", default_value = "data/raw", global = true)]
    pub raw_dir: PathBuf,
    /// Directory receiving one merged CSV per condition
    #[arg(long = "processed-dir", default_value = "data/processed", global = true)]
    pub processed_dir: PathBuf,
    /// Directory receiving schema.sql, import.sql, and drop.sql
    #[arg(long = "database-dir", default_value = "database", global = true)]
    pub database_dir: PathBuf,
    /// YAML file replacing the built-in condition rules
    #[arg(long, global = true)]
    pub rules: Option<PathBuf>,
    /// Character encoding of the raw files (defaults to utf-8)
    #[arg(long = "input-encoding", global = true)]
    pub input_encoding: Option<String>,
}
