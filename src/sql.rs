//! SQL script generation for the processed CSVs.
//!
//! Column types are assigned by position, following the fixed PROMs record
//! layout: the synthetic id first, six identifier/categorical columns, then
//! numeric scores.

use std::{
    fmt::{self, Write as _},
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use encoding_rs::UTF_8;
use itertools::Itertools;
use log::{info, warn};

use crate::{headers::parse_header, io_utils};

/// Last position typed as `TEXT`; everything after it is `REAL`.
pub const LAST_TEXT_POSITION: usize = 6;

pub const SCHEMA_FILE: &str = "schema.sql";
pub const IMPORT_FILE: &str = "import.sql";
pub const DROP_FILE: &str = "drop.sql";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    IntegerPrimaryKey,
    Text,
    Real,
}

impl SqlType {
    pub fn for_position(position: usize) -> Self {
        match position {
            0 => SqlType::IntegerPrimaryKey,
            1..=LAST_TEXT_POSITION => SqlType::Text,
            _ => SqlType::Real,
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::IntegerPrimaryKey => f.write_str("INTEGER PRIMARY KEY"),
            SqlType::Text => f.write_str("TEXT"),
            SqlType::Real => f.write_str("REAL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub position: usize,
    pub name: String,
    pub sql_type: SqlType,
}

/// Lower-cases and replaces spaces with `_`. Applying it twice is a no-op.
pub fn normalize_identifier(name: &str) -> String {
    name.replace(' ', "_").to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub source: PathBuf,
    pub columns: Vec<ColumnSpec>,
}

impl TableSpec {
    pub fn from_header(name: &str, source: &Path, header: &[String]) -> Self {
        let columns = header
            .iter()
            .enumerate()
            .map(|(position, column)| ColumnSpec {
                position,
                name: normalize_identifier(column),
                sql_type: SqlType::for_position(position),
            })
            .collect();
        Self {
            name: name.to_string(),
            source: source.to_path_buf(),
            columns,
        }
    }

    /// Reads the header of a processed CSV; `None` if the header is blank.
    pub fn from_file(path: &Path) -> Result<Option<Self>> {
        let Some(name) = io_utils::file_id(path) else {
            return Ok(None);
        };
        let header = io_utils::read_first_line(path, UTF_8)?
            .as_deref()
            .and_then(parse_header);
        Ok(header.map(|columns| Self::from_header(name, path, &columns)))
    }

    pub fn create_statement(&self) -> String {
        let mut sql = format!("CREATE TABLE {} (\n", self.name);
        let last = self.columns.len().saturating_sub(1);
        for column in &self.columns {
            let separator = if column.position == last { "" } else { "," };
            let _ = writeln!(sql, "\t{} {}{separator}", column.name, column.sql_type);
        }
        sql.push_str(");\n\n");
        sql
    }

    pub fn copy_statement(&self) -> String {
        let path = self
            .source
            .to_string_lossy()
            .replace('\\', "/")
            .replace('\'', "''");
        format!(
            "\\copy {} FROM '{path}' WITH (FORMAT csv, HEADER true);\n",
            self.name
        )
    }
}

/// `DROP TABLE IF EXISTS` for exactly the given tables; `None` when empty.
pub fn drop_statement(tables: &[TableSpec]) -> Option<String> {
    if tables.is_empty() {
        return None;
    }
    Some(format!(
        "DROP TABLE IF EXISTS {};\n",
        tables.iter().map(|t| t.name.as_str()).join(", ")
    ))
}

pub fn tables_from_files(paths: &[PathBuf]) -> Result<Vec<TableSpec>> {
    let mut tables = Vec::with_capacity(paths.len());
    for path in paths {
        match TableSpec::from_file(path)
            .with_context(|| format!("Reading processed header from {path:?}"))?
        {
            Some(table) => tables.push(table),
            None => warn!("Skipping {:?}: empty header line", path),
        }
    }
    Ok(tables)
}

/// Tables for every CSV under the processed directory, sorted by path.
pub fn discover_tables(processed_dir: &Path) -> Result<Vec<TableSpec>> {
    let paths = io_utils::list_csv_files(processed_dir)
        .with_context(|| format!("Scanning {processed_dir:?} for processed CSVs"))?;
    tables_from_files(&paths)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlScripts {
    pub schema: PathBuf,
    pub import: PathBuf,
    pub drop: PathBuf,
}

pub fn render_schema(tables: &[TableSpec]) -> String {
    tables.iter().map(TableSpec::create_statement).collect()
}

pub fn render_import(tables: &[TableSpec]) -> String {
    tables.iter().map(TableSpec::copy_statement).collect()
}

pub fn write_scripts(tables: &[TableSpec], database_dir: &Path) -> Result<SqlScripts> {
    fs::create_dir_all(database_dir)
        .with_context(|| format!("Creating database directory {database_dir:?}"))?;
    let scripts = SqlScripts {
        schema: database_dir.join(SCHEMA_FILE),
        import: database_dir.join(IMPORT_FILE),
        drop: database_dir.join(DROP_FILE),
    };

    write_text(&scripts.schema, &render_schema(tables))?;
    info!(
        "Wrote {} table definition(s) to {:?}",
        tables.len(),
        scripts.schema
    );

    write_text(&scripts.import, &render_import(tables))?;
    info!(
        "Wrote {} import statement(s) to {:?}",
        tables.len(),
        scripts.import
    );

    match drop_statement(tables) {
        Some(statement) => {
            write_text(&scripts.drop, &statement)?;
            info!("Wrote drop statement to {:?}", scripts.drop);
        }
        None => {
            write_text(&scripts.drop, "")?;
            warn!("No tables found; {:?} is empty", scripts.drop);
        }
    }
    Ok(scripts)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    let mut writer = io_utils::create_text_writer(path)?;
    writer
        .write_all(contents.as_bytes())
        .with_context(|| format!("Writing {path:?}"))?;
    writer.flush().with_context(|| format!("Flushing {path:?}"))
}
