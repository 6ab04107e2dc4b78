//! Assigns indexed files to condition buckets.
//!
//! A file is kept when its file id contains a condition keyword and the
//! header group it belongs to has one of that condition's accepted sizes.
//! Everything else is dropped without failing the run.

use std::fmt;

use itertools::Itertools;
use log::{debug, info, warn};

use crate::{
    headers::{HeaderIndex, SourceFile},
    rules::{ClassificationRules, ConditionRule},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionBucket {
    pub rule: ConditionRule,
    pub files: Vec<SourceFile>,
}

impl ConditionBucket {
    pub fn new(rule: ConditionRule) -> Self {
        Self {
            rule,
            files: Vec::new(),
        }
    }

    pub fn condition(&self) -> &str {
        &self.rule.name
    }

    pub fn table_name(&self) -> String {
        self.rule.table_name()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The header group size is not accepted by the matched condition.
    GroupSize { size: usize },
    NoKeyword,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::GroupSize { size } => write!(f, "header group of {size} file(s)"),
            DropReason::NoKeyword => f.write_str("no condition keyword"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedFile {
    pub file: SourceFile,
    pub reason: DropReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// One bucket per rule, in rule order, including empty ones.
    pub buckets: Vec<ConditionBucket>,
    pub dropped: Vec<DroppedFile>,
}

impl Classification {
    #[cfg(test)]
    pub fn bucket(&self, condition: &str) -> Option<&ConditionBucket> {
        self.buckets.iter().find(|b| b.condition() == condition)
    }

    pub fn selected_count(&self) -> usize {
        self.buckets.iter().map(|b| b.files.len()).sum()
    }

    /// Condition name a file was assigned to, if any.
    pub fn condition_of(&self, file_id: &str) -> Option<&str> {
        self.buckets
            .iter()
            .find(|b| b.files.iter().any(|f| f.id == file_id))
            .map(ConditionBucket::condition)
    }

    pub fn drop_reason_of(&self, file_id: &str) -> Option<DropReason> {
        self.dropped
            .iter()
            .find(|d| d.file.id == file_id)
            .map(|d| d.reason)
    }
}

pub fn classify(index: &HeaderIndex, rules: &ClassificationRules) -> Classification {
    let mut buckets = rules
        .conditions
        .iter()
        .cloned()
        .map(ConditionBucket::new)
        .collect::<Vec<_>>();
    let mut dropped = Vec::new();

    for (_, files) in index.groups() {
        let size = files.len();
        for file in files {
            let matches = rules.matching(&file.id);
            let Some(rule) = matches.first() else {
                debug!("Dropping '{}': {}", file.id, DropReason::NoKeyword);
                dropped.push(DroppedFile {
                    file: file.clone(),
                    reason: DropReason::NoKeyword,
                });
                continue;
            };
            if matches.len() > 1 {
                warn!(
                    "'{}' matches {}; assigning to {}",
                    file.id,
                    matches.iter().map(|r| r.name.as_str()).join(", "),
                    rule.name
                );
            }
            if !rule.accepts_group_size(size) {
                let reason = DropReason::GroupSize { size };
                debug!("Dropping '{}': {}", file.id, reason);
                dropped.push(DroppedFile {
                    file: file.clone(),
                    reason,
                });
                continue;
            }
            if let Some(bucket) = buckets.iter_mut().find(|b| b.rule.name == rule.name) {
                bucket.files.push(file.clone());
            }
        }
    }

    for bucket in &mut buckets {
        bucket.files.sort();
        info!(
            "Selected {} file(s) for {}",
            bucket.files.len(),
            bucket.condition()
        );
    }
    dropped.sort_by(|a, b| a.file.cmp(&b.file));

    Classification { buckets, dropped }
}
