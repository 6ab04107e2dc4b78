//! Plain-text file helpers shared by every pipeline stage.
//!
//! PROMs extracts are treated as simple comma-delimited text, so nothing here
//! parses CSV. Files are decoded with `encoding_rs` and split on `\n` with the
//! terminators kept, which lets row content be copied through unchanged. Lines
//! are split on raw `0x0A` bytes before decoding, so only ASCII-compatible
//! encodings are accepted.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Read},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail};
use encoding_rs::{Encoding, UTF_8};
use walkdir::WalkDir;

pub const CSV_SUFFIX: &str = ".csv";

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    let Some(value) = label else {
        return Ok(UTF_8);
    };
    let encoding = Encoding::for_label(value.trim().as_bytes())
        .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))?;
    if !encoding.is_ascii_compatible() {
        bail!(
            "Encoding '{}' is not supported; input files must use an ASCII-compatible encoding",
            encoding.name()
        );
    }
    Ok(encoding)
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

/// Every regular file under `root` whose name ends in `.csv`, sorted by path.
pub fn list_csv_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(anyhow!("Directory {root:?} does not exist"));
    }
    let mut paths = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.with_context(|| format!("Walking directory {root:?}"))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_csv = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.ends_with(CSV_SUFFIX));
        if is_csv {
            paths.push(entry.into_path());
        }
    }
    paths.sort();
    Ok(paths)
}

/// File name with the `.csv` suffix removed; `None` for a bare `.csv`.
pub fn file_id(path: &Path) -> Option<&str> {
    path.file_name()?
        .to_str()?
        .strip_suffix(CSV_SUFFIX)
        .filter(|id| !id.is_empty())
}

/// Splits a line into its content and its terminator (`\n`, `\r\n` or empty).
pub fn split_line_terminator(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}

pub fn read_first_line(path: &Path, encoding: &'static Encoding) -> Result<Option<String>> {
    let file = File::open(path).with_context(|| format!("Opening input file {path:?}"))?;
    let mut reader = BufReader::new(file);
    let mut bytes = Vec::new();
    let read = reader
        .read_until(b'\n', &mut bytes)
        .with_context(|| format!("Reading header line of {path:?}"))?;
    if read == 0 {
        return Ok(None);
    }
    let line = decode_bytes(&bytes, encoding)
        .with_context(|| format!("Decoding header line of {path:?}"))?;
    Ok(Some(line))
}

/// Reads a whole file as lines, each keeping its terminator.
pub fn read_lines(path: &Path, encoding: &'static Encoding) -> Result<Vec<String>> {
    let mut file = File::open(path).with_context(|| format!("Opening input file {path:?}"))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .with_context(|| format!("Reading input file {path:?}"))?;
    let text = decode_bytes(&bytes, encoding).with_context(|| format!("Decoding {path:?}"))?;
    Ok(text.split_inclusive('\n').map(str::to_owned).collect())
}

pub fn count_lines(path: &Path) -> Result<usize> {
    let file = File::open(path).with_context(|| format!("Reopening {path:?}"))?;
    let mut reader = BufReader::new(file);
    let mut buffer = Vec::new();
    let mut count = 0usize;
    loop {
        buffer.clear();
        let read = reader
            .read_until(b'\n', &mut buffer)
            .with_context(|| format!("Counting lines in {path:?}"))?;
        if read == 0 {
            break;
        }
        count += 1;
    }
    Ok(count)
}

pub fn create_text_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("Creating output file {path:?}"))?;
    Ok(BufWriter::new(file))
}
