//! Sequences the stages: index headers, classify, merge, generate SQL.

use std::{
    fmt::Write as _,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use encoding_rs::{Encoding, UTF_8};
use itertools::Itertools;
use log::info;

use crate::{
    classify::{self, Classification},
    cli::PathArgs,
    concat::{self, MergeReport},
    headers::HeaderIndex,
    io_utils,
    rules::ClassificationRules,
    sql::{self, SqlScripts},
};

/// Columns shown per header group in the groups report.
const PREVIEW_COLUMNS: usize = 4;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub database_dir: PathBuf,
    pub rules: ClassificationRules,
    pub encoding: &'static Encoding,
}

impl PipelineOptions {
    pub fn new(raw_dir: &Path, processed_dir: &Path, database_dir: &Path) -> Self {
        Self {
            raw_dir: raw_dir.to_path_buf(),
            processed_dir: processed_dir.to_path_buf(),
            database_dir: database_dir.to_path_buf(),
            rules: ClassificationRules::default(),
            encoding: UTF_8,
        }
    }

    pub fn from_args(args: &PathArgs) -> Result<Self> {
        let rules = ClassificationRules::load_or_default(args.rules.as_deref())?;
        let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
        Ok(Self {
            rules,
            encoding,
            ..Self::new(&args.raw_dir, &args.processed_dir, &args.database_dir)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSummary {
    pub merges: Vec<MergeReport>,
    pub scripts: SqlScripts,
}

pub fn index_and_classify(options: &PipelineOptions) -> Result<(HeaderIndex, Classification)> {
    let index = HeaderIndex::build(&options.raw_dir, options.encoding)?;
    let classification = classify::classify(&index, &options.rules);
    Ok((index, classification))
}

/// Merges the raw extracts into one CSV per condition.
pub fn prepare(options: &PipelineOptions) -> Result<Vec<MergeReport>> {
    info!(
        "Concatenating files from {:?} to {:?}...",
        options.raw_dir, options.processed_dir
    );
    let (_, classification) = index_and_classify(options)?;
    concat::concatenate_all(
        &classification.buckets,
        &options.processed_dir,
        options.encoding,
    )
}

/// Writes SQL scripts for every CSV currently in the processed directory.
pub fn generate_sql(options: &PipelineOptions) -> Result<SqlScripts> {
    let tables = sql::discover_tables(&options.processed_dir)?;
    sql::write_scripts(&tables, &options.database_dir)
}

/// Full run. SQL is generated only for the outputs merged in this run.
pub fn run(options: &PipelineOptions) -> Result<PipelineSummary> {
    let merges = prepare(options)?;
    let outputs = merges
        .iter()
        .map(|report| report.output.clone())
        .collect::<Vec<_>>();
    let tables = sql::tables_from_files(&outputs)?;
    let scripts = sql::write_scripts(&tables, &options.database_dir)
        .with_context(|| format!("Writing SQL scripts to {:?}", options.database_dir))?;
    Ok(PipelineSummary { merges, scripts })
}

pub fn render_groups(index: &HeaderIndex, classification: &Classification) -> String {
    let mut output = String::new();
    for (number, (signature, files)) in index.groups().enumerate() {
        let mut preview = signature.iter().take(PREVIEW_COLUMNS).join(",");
        if signature.len() > PREVIEW_COLUMNS {
            preview.push_str(",...");
        }
        let _ = writeln!(
            output,
            "group {}: {} file(s), {} column(s) [{preview}]",
            number + 1,
            files.len(),
            signature.len()
        );
        for file in files {
            let fate = match classification.condition_of(&file.id) {
                Some(condition) => condition.to_string(),
                None => match classification.drop_reason_of(&file.id) {
                    Some(reason) => format!("dropped ({reason})"),
                    None => "dropped".to_string(),
                },
            };
            let _ = writeln!(output, "  {} -> {fate}", file.id);
        }
    }
    let _ = writeln!(
        output,
        "{} of {} file(s) selected",
        classification.selected_count(),
        index.file_count()
    );
    output
}

#[cfg(test)]
mod tests {
    use crate::headers::SourceFile;

    use super::*;

    #[test]
    fn groups_report_shows_fate_of_each_file() {
        let mut entries = (0..8)
            .map(|i| {
                (
                    SourceFile::new(format!("Hip {i}"), format!("Hip {i}.csv")),
                    vec!["A".to_string(), "B".to_string()],
                )
            })
            .collect::<Vec<_>>();
        entries.push((
            SourceFile::new("Hip odd", "Hip odd.csv"),
            vec!["A", "B", "C", "D", "E"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        ));
        let index = HeaderIndex::from_entries(entries);
        let classification = classify::classify(&index, &ClassificationRules::default());
        let report = render_groups(&index, &classification);

        assert!(report.contains("group 1: 8 file(s), 2 column(s) [A,B]"));
        assert!(report.contains("  Hip 0 -> Hip Replacement"));
        assert!(report.contains("group 2: 1 file(s), 5 column(s) [A,B,C,D,...]"));
        assert!(report.contains("  Hip odd -> dropped (header group of 1 file(s))"));
        assert!(report.ends_with("8 of 9 file(s) selected\n"));
    }
}
