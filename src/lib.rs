pub mod classify;
pub mod cli;
pub mod concat;
pub mod error;
pub mod headers;
pub mod io_utils;
pub mod pipeline;
pub mod rules;
pub mod sql;

use std::{env, sync::OnceLock};

use anyhow::Result;
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands},
    pipeline::PipelineOptions,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("proms_prep", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    execute(&cli)
}

pub fn execute(cli: &Cli) -> Result<()> {
    debug!("Reserved option --foo = {:?}", cli.foo);
    let options = PipelineOptions::from_args(&cli.paths)?;
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => handle_run(&options),
        Commands::Prepare => handle_prepare(&options),
        Commands::Sql => handle_sql(&options),
        Commands::Groups => handle_groups(&options),
        Commands::Rules => handle_rules(&options),
    }
}

fn handle_run(options: &PipelineOptions) -> Result<()> {
    let summary = pipeline::run(options)?;
    let rows: usize = summary.merges.iter().map(|m| m.rows).sum();
    info!(
        "Merged {} condition(s) with {} record(s); SQL scripts in {:?}",
        summary.merges.len(),
        rows,
        options.database_dir
    );
    Ok(())
}

fn handle_prepare(options: &PipelineOptions) -> Result<()> {
    let merges = pipeline::prepare(options)?;
    info!(
        "Wrote {} merged file(s) to {:?}",
        merges.len(),
        options.processed_dir
    );
    Ok(())
}

fn handle_sql(options: &PipelineOptions) -> Result<()> {
    let scripts = pipeline::generate_sql(options)?;
    debug!("SQL scripts: {:?}", scripts);
    Ok(())
}

fn handle_groups(options: &PipelineOptions) -> Result<()> {
    let (index, classification) = pipeline::index_and_classify(options)?;
    print!("{}", pipeline::render_groups(&index, &classification));
    Ok(())
}

fn handle_rules(options: &PipelineOptions) -> Result<()> {
    print!("{}", options.rules.to_yaml()?);
    Ok(())
}
