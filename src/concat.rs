//! Merges each condition bucket into a single indexed CSV.
//!
//! A bucket is loaded fully into memory, checked for identical headers and
//! consistent row counts, then written to a `.partial` staging file. The
//! staging file is re-read and only renamed to `{table}.csv` once its line
//! count matches, so an aborted merge never leaves a readable output behind.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use log::info;

use crate::{
    classify::ConditionBucket,
    error::{CountStage, ValidationError},
    io_utils,
};

const STAGING_SUFFIX: &str = ".partial";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub condition: String,
    pub table_name: String,
    pub output: PathBuf,
    pub files: usize,
    pub rows: usize,
}

#[derive(Debug)]
struct LoadedFile {
    id: String,
    lines: Vec<String>,
}

impl LoadedFile {
    fn header(&self) -> Option<&str> {
        self.lines.first().map(String::as_str)
    }

    fn rows(&self) -> &[String] {
        self.lines.get(1..).unwrap_or_default()
    }
}

/// Lower-cases the header and replaces `-` and spaces with `_`. The result
/// always ends in `\n`, whatever terminator the source line had.
pub fn normalize_header_line(line: &str) -> String {
    let (body, _) = io_utils::split_line_terminator(line);
    let normalized = body.replace(['-', ' '], "_").to_lowercase();
    format!("{normalized}\n")
}

pub fn output_path(output_dir: &Path, bucket: &ConditionBucket) -> PathBuf {
    output_dir.join(format!("{}{}", bucket.table_name(), io_utils::CSV_SUFFIX))
}

fn staging_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(STAGING_SUFFIX);
    let mut staged = std::ffi::OsString::from(".");
    staged.push(name);
    output.with_file_name(staged)
}

/// Merges every non-empty bucket, stopping at the first failure.
pub fn concatenate_all(
    buckets: &[ConditionBucket],
    output_dir: &Path,
    encoding: &'static Encoding,
) -> Result<Vec<MergeReport>> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Creating output directory {output_dir:?}"))?;
    let mut reports = Vec::new();
    for bucket in buckets {
        if bucket.is_empty() {
            info!("No files selected for {}; skipping", bucket.condition());
            continue;
        }
        let report = merge_bucket(bucket, output_dir, encoding)
            .with_context(|| format!("Merging {} files", bucket.condition()))?;
        reports.push(report);
    }
    Ok(reports)
}

pub fn merge_bucket(
    bucket: &ConditionBucket,
    output_dir: &Path,
    encoding: &'static Encoding,
) -> Result<MergeReport> {
    info!("Concatenating {} files...", bucket.condition());
    let mut loaded = Vec::with_capacity(bucket.files.len());
    let mut expected_rows = 0usize;
    for file in &bucket.files {
        let lines = io_utils::read_lines(&file.path, encoding)?;
        let records = lines.len().saturating_sub(1);
        info!("\tFound {records} record(s) in {}", file.id);
        expected_rows += records;
        loaded.push(LoadedFile {
            id: file.id.clone(),
            lines,
        });
    }
    info!("\tFound {expected_rows} record(s) in total");

    validate_loaded(bucket, &loaded)?;

    let output = output_path(output_dir, bucket);
    let staging = staging_path(&output);
    if let Err(err) = write_and_verify(bucket, &loaded, &staging, expected_rows) {
        let _ = fs::remove_file(&staging);
        return Err(err);
    }
    fs::rename(&staging, &output)
        .with_context(|| format!("Moving {staging:?} to {output:?}"))?;

    info!(
        "\tSaved {:?} with {expected_rows} record(s)",
        output.file_name().unwrap_or_default()
    );
    Ok(MergeReport {
        condition: bucket.condition().to_string(),
        table_name: bucket.table_name(),
        output,
        files: loaded.len(),
        rows: expected_rows,
    })
}

fn validate_loaded(bucket: &ConditionBucket, loaded: &[LoadedFile]) -> Result<()> {
    let condition = bucket.condition().to_string();
    if loaded.len() != bucket.files.len() {
        return Err(ValidationError::MissingFiles {
            condition,
            expected: bucket.files.len(),
            loaded: loaded.len(),
        }
        .into());
    }
    let Some(first) = loaded.first() else {
        return Ok(());
    };
    let baseline = header_body(first).ok_or_else(|| ValidationError::MissingHeader {
        condition: condition.clone(),
        file: first.id.clone(),
    })?;
    for file in &loaded[1..] {
        let header = header_body(file).ok_or_else(|| ValidationError::MissingHeader {
            condition: condition.clone(),
            file: file.id.clone(),
        })?;
        if header != baseline {
            return Err(ValidationError::HeaderMismatch {
                condition,
                baseline: first.id.clone(),
                file: file.id.clone(),
                column: first_differing_column(baseline, header),
            }
            .into());
        }
    }
    Ok(())
}

/// Header line without its terminator; matches the signature the indexer
/// grouped the file by.
fn header_body(file: &LoadedFile) -> Option<&str> {
    file.header().map(|header| io_utils::split_line_terminator(header).0)
}

/// One-based position of the first column that differs.
fn first_differing_column(left: &str, right: &str) -> usize {
    let mut left_columns = left.split(',');
    let mut right_columns = right.split(',');
    let mut position = 1;
    loop {
        match (left_columns.next(), right_columns.next()) {
            (Some(a), Some(b)) if a == b => position += 1,
            _ => return position,
        }
    }
}

fn write_and_verify(
    bucket: &ConditionBucket,
    loaded: &[LoadedFile],
    staging: &Path,
    expected_rows: usize,
) -> Result<()> {
    let written = write_merged(bucket, loaded, staging)?;
    if written != expected_rows {
        return Err(ValidationError::RowCountMismatch {
            condition: bucket.condition().to_string(),
            stage: CountStage::Written,
            expected: expected_rows,
            actual: written,
        }
        .into());
    }
    let lines = io_utils::count_lines(staging)?;
    if lines != expected_rows + 1 {
        return Err(ValidationError::RowCountMismatch {
            condition: bucket.condition().to_string(),
            stage: CountStage::Reread,
            expected: expected_rows,
            actual: lines.saturating_sub(1),
        }
        .into());
    }
    Ok(())
}

/// Writes the merged file and returns the number of data rows written.
/// Every output line ends in `\n`.
fn write_merged(bucket: &ConditionBucket, loaded: &[LoadedFile], path: &Path) -> Result<usize> {
    let header = loaded
        .first()
        .and_then(LoadedFile::header)
        .map(normalize_header_line)
        .unwrap_or_default();
    let mut writer = io_utils::create_text_writer(path)?;
    write!(writer, "{}_id,{header}", bucket.table_name())
        .with_context(|| format!("Writing header to {path:?}"))?;

    let mut row_id = 0usize;
    for file in loaded {
        for row in file.rows() {
            let (body, _) = io_utils::split_line_terminator(row);
            writeln!(writer, "{row_id},{body}")
                .with_context(|| format!("Writing row {row_id} from '{}'", file.id))?;
            row_id += 1;
        }
    }
    writer
        .flush()
        .with_context(|| format!("Flushing {path:?}"))?;
    Ok(row_id)
}

#[cfg(test)]
mod tests {
    use encoding_rs::UTF_8;
    use tempfile::tempdir;

    use super::*;
    use crate::{headers::SourceFile, rules::ConditionRule};

    fn bucket_with(dir: &Path, files: &[(&str, &str)]) -> ConditionBucket {
        let mut bucket = ConditionBucket::new(ConditionRule::new("Hip Replacement", "Hip", &[8]));
        for (id, contents) in files {
            let path = dir.join(format!("{id}.csv"));
            fs::write(&path, contents).expect("write input");
            bucket.files.push(SourceFile::new(*id, path));
        }
        bucket
    }

    #[test]
    fn normalize_header_only_touches_separators_and_case() {
        assert_eq!(
            normalize_header_line("Provider Code,Pre-Op Q Score\r\n"),
            "provider_code,pre_op_q_score\n"
        );
        assert_eq!(normalize_header_line("A,B"), "a,b\n");
    }

    #[test]
    fn merge_prefixes_rows_with_running_id() {
        let dir = tempdir().expect("temp dir");
        let out = dir.path().join("out");
        let bucket = bucket_with(
            dir.path(),
            &[
                ("Hip 1", "Pre-Op Score,Name X\n1,Alpha Beta\n2,Gamma\n"),
                ("Hip 2", "Pre-Op Score,Name X\n3,Delta\n"),
            ],
        );
        let reports = concatenate_all(std::slice::from_ref(&bucket), &out, UTF_8).expect("merged");
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].rows, 3);
        assert_eq!(reports[0].files, 2);
        assert_eq!(reports[0].output, out.join("hip_replacement.csv"));

        let merged = fs::read_to_string(&reports[0].output).expect("read output");
        assert_eq!(
            merged,
            "hip_replacement_id,pre_op_score,name_x\n0,1,Alpha Beta\n1,2,Gamma\n2,3,Delta\n"
        );
        assert!(!out.join(".hip_replacement.csv.partial").exists());
    }

    #[test]
    fn missing_final_newline_does_not_merge_rows() {
        let dir = tempdir().expect("temp dir");
        let bucket = bucket_with(dir.path(), &[("Hip 1", "A\n1\n2"), ("Hip 2", "A\n3")]);
        let report = merge_bucket(&bucket, dir.path(), UTF_8).expect("merged");
        let merged = fs::read_to_string(&report.output).expect("read");
        assert_eq!(merged, "hip_replacement_id,a\n0,1\n1,2\n2,3\n");
    }

    #[test]
    fn header_mismatch_aborts_before_writing() {
        let dir = tempdir().expect("temp dir");
        let bucket = bucket_with(
            dir.path(),
            &[
                ("Hip 1", "A,B,C\n1,2,3\n"),
                ("Hip 2", "A,B,C\n4,5,6\n"),
                ("Hip 3", "A,b,C\n7,8,9\n"),
            ],
        );
        let err = merge_bucket(&bucket, dir.path(), UTF_8).unwrap_err();
        let validation = err.downcast_ref::<ValidationError>().expect("validation");
        assert_eq!(
            validation,
            &ValidationError::HeaderMismatch {
                condition: "Hip Replacement".into(),
                baseline: "Hip 1".into(),
                file: "Hip 3".into(),
                column: 2,
            }
        );
        assert!(!dir.path().join("hip_replacement.csv").exists());
        assert!(!dir.path().join(".hip_replacement.csv.partial").exists());
    }

    #[test]
    fn crlf_and_lf_members_merge_with_lf_output() {
        let dir = tempdir().expect("temp dir");
        let bucket = bucket_with(
            dir.path(),
            &[("Hip 1", "A,B\r\n1,2\r\n3,4"), ("Hip 2", "A,B\n5,6\n")],
        );
        let report = merge_bucket(&bucket, dir.path(), UTF_8).expect("merged");
        assert_eq!(report.rows, 3);
        assert_eq!(
            fs::read_to_string(&report.output).expect("read"),
            "hip_replacement_id,a,b\n0,1,2\n1,3,4\n2,5,6\n"
        );
    }

    #[test]
    fn crlf_header_with_unterminated_last_row_keeps_one_line_ending() {
        let dir = tempdir().expect("temp dir");
        let bucket = bucket_with(dir.path(), &[("Hip 1", "A\r\n1\r\n2")]);
        let report = merge_bucket(&bucket, dir.path(), UTF_8).expect("merged");
        let merged = fs::read_to_string(&report.output).expect("read");
        assert_eq!(merged, "hip_replacement_id,a\n0,1\n1,2\n");
        assert!(!merged.contains('\r'));
    }

    #[test]
    fn empty_member_file_is_reported() {
        let dir = tempdir().expect("temp dir");
        let bucket = bucket_with(dir.path(), &[("Hip 1", "A\n1\n"), ("Hip 2", "")]);
        let err = merge_bucket(&bucket, dir.path(), UTF_8).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ValidationError>(),
            Some(&ValidationError::MissingHeader {
                condition: "Hip Replacement".into(),
                file: "Hip 2".into(),
            })
        );
    }

    #[test]
    fn empty_buckets_are_skipped() {
        let dir = tempdir().expect("temp dir");
        let bucket = ConditionBucket::new(ConditionRule::new("Groin Hernia", "Groin", &[8]));
        let reports = concatenate_all(&[bucket], dir.path(), UTF_8).expect("merged");
        assert!(reports.is_empty());
        assert!(!dir.path().join("groin_hernia.csv").exists());
    }

    #[test]
    fn header_only_files_produce_header_only_output() {
        let dir = tempdir().expect("temp dir");
        let bucket = bucket_with(dir.path(), &[("Hip 1", "A,B\n"), ("Hip 2", "A,B\n")]);
        let report = merge_bucket(&bucket, dir.path(), UTF_8).expect("merged");
        assert_eq!(report.rows, 0);
        assert_eq!(
            fs::read_to_string(&report.output).expect("read"),
            "hip_replacement_id,a,b\n"
        );
    }

    #[test]
    fn first_differing_column_handles_length_changes() {
        assert_eq!(first_differing_column("a,b", "a,c"), 2);
        assert_eq!(first_differing_column("a,b", "a,b,c"), 3);
        assert_eq!(first_differing_column("a", "b"), 1);
    }
}
