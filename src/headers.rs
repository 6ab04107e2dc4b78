//! Header indexing: group raw extracts by their exact first line.

use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use log::{debug, info, warn};

use crate::io_utils;

/// Column names exactly as they appear in a file's first line.
pub type HeaderSignature = Vec<String>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceFile {
    /// File name without the `.csv` suffix.
    pub id: String,
    pub path: PathBuf,
}

impl SourceFile {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }
}

/// Splits a header line on `,`; `None` when the line is blank.
pub fn parse_header(line: &str) -> Option<HeaderSignature> {
    let (body, _) = io_utils::split_line_terminator(line);
    if body.is_empty() {
        return None;
    }
    Some(body.split(',').map(str::to_string).collect())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderIndex {
    groups: BTreeMap<HeaderSignature, Vec<SourceFile>>,
}

impl HeaderIndex {
    pub fn build(root: &Path, encoding: &'static Encoding) -> Result<Self> {
        info!("Indexing headers under {:?}", root);
        let paths = io_utils::list_csv_files(root)
            .with_context(|| format!("Scanning {root:?} for CSV files"))?;
        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(id) = io_utils::file_id(&path).map(str::to_string) else {
                debug!("Skipping {:?}: no file id", path);
                continue;
            };
            let header = match io_utils::read_first_line(&path, encoding)? {
                Some(line) => parse_header(&line),
                None => None,
            };
            match header {
                Some(signature) => entries.push((SourceFile::new(id, path), signature)),
                None => debug!("Skipping {:?}: empty header line", path),
            }
        }
        let index = Self::from_entries(entries);
        info!(
            "Indexed {} file(s) into {} header group(s)",
            index.file_count(),
            index.len()
        );
        Ok(index)
    }

    /// Groups files by signature. When two files share an id, the first one
    /// seen is kept.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (SourceFile, HeaderSignature)>,
    {
        let mut seen: HashMap<String, PathBuf> = HashMap::new();
        let mut groups: BTreeMap<HeaderSignature, Vec<SourceFile>> = BTreeMap::new();
        for (file, signature) in entries {
            if let Some(existing) = seen.get(&file.id) {
                warn!(
                    "Ignoring {:?}: file id '{}' already taken by {:?}",
                    file.path, file.id, existing
                );
                continue;
            }
            seen.insert(file.id.clone(), file.path.clone());
            groups.entry(signature).or_default().push(file);
        }
        for files in groups.values_mut() {
            files.sort();
        }
        Self { groups }
    }

    pub fn groups(&self) -> impl Iterator<Item = (&HeaderSignature, &[SourceFile])> {
        self.groups
            .iter()
            .map(|(signature, files)| (signature, files.as_slice()))
    }

    #[cfg(test)]
    pub fn files_for(&self, signature: &[String]) -> Option<&[SourceFile]> {
        self.groups.get(signature).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn file_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }
}
