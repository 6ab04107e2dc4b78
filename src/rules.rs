//! Classification rules: which header groups and file names belong to which
//! condition.
//!
//! The built-in table covers the four PROMs procedures. Provider extracts for
//! one condition and year come in sets of 8 or 12 files sharing a header, so
//! those are the default accepted group sizes. A YAML file with the same shape
//! can replace the table:
//!
//! ```yaml
//! conditions:
//!   - name: Hip Replacement
//!     keyword: Hip
//!     group_sizes: [8, 12]
//! ```

use std::{collections::HashSet, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, anyhow, ensure};
use serde::{Deserialize, Serialize};

pub const DEFAULT_GROUP_SIZES: [usize; 2] = [8, 12];

const DEFAULT_CONDITIONS: [(&str, &str); 4] = [
    ("Hip Replacement", "Hip"),
    ("Knee Replacement", "Knee"),
    ("Groin Hernia", "Groin"),
    ("Varicose Vein", "Varicose"),
];

fn default_group_sizes() -> Vec<usize> {
    DEFAULT_GROUP_SIZES.to_vec()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConditionRule {
    pub name: String,
    /// Case-sensitive substring looked for in the file id.
    pub keyword: String,
    #[serde(default = "default_group_sizes")]
    pub group_sizes: Vec<usize>,
}

impl ConditionRule {
    pub fn new(name: &str, keyword: &str, group_sizes: &[usize]) -> Self {
        Self {
            name: name.to_string(),
            keyword: keyword.to_string(),
            group_sizes: group_sizes.to_vec(),
        }
    }

    /// `Hip Replacement` -> `hip_replacement`; names the output file and table.
    pub fn table_name(&self) -> String {
        self.name.replace(' ', "_").to_lowercase()
    }

    pub fn matches(&self, file_id: &str) -> bool {
        file_id.contains(self.keyword.as_str())
    }

    pub fn accepts_group_size(&self, size: usize) -> bool {
        self.group_sizes.contains(&size)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassificationRules {
    pub conditions: Vec<ConditionRule>,
}

impl Default for ClassificationRules {
    fn default() -> Self {
        let conditions = DEFAULT_CONDITIONS
            .iter()
            .map(|(name, keyword)| ConditionRule::new(name, keyword, &DEFAULT_GROUP_SIZES))
            .collect();
        Self { conditions }
    }
}

impl ClassificationRules {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening rules file {path:?}"))?;
        let reader = BufReader::new(file);
        let rules: ClassificationRules =
            serde_yaml::from_reader(reader).context("Parsing rules YAML")?;
        rules
            .validate()
            .with_context(|| format!("Validating rules from {path:?}"))?;
        Ok(rules)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing rules to YAML")
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.conditions.is_empty(),
            "At least one condition must be defined"
        );
        let mut tables = HashSet::new();
        for rule in &self.conditions {
            ensure!(
                !rule.name.trim().is_empty(),
                "Condition names cannot be empty"
            );
            ensure!(
                !rule.keyword.is_empty(),
                "Condition '{}' has an empty keyword",
                rule.name
            );
            ensure!(
                !rule.group_sizes.is_empty(),
                "Condition '{}' must list at least one group size",
                rule.name
            );
            ensure!(
                !rule.group_sizes.contains(&0),
                "Condition '{}' lists a group size of 0",
                rule.name
            );
            let table = rule.table_name();
            if !tables.insert(table.clone()) {
                return Err(anyhow!(
                    "Condition '{}' maps to table '{table}' which is already used",
                    rule.name
                ));
            }
        }
        Ok(())
    }

    /// Every rule whose keyword occurs in `file_id`, in table order.
    pub fn matching<'a>(&'a self, file_id: &str) -> Vec<&'a ConditionRule> {
        self.conditions
            .iter()
            .filter(|rule| rule.matches(file_id))
            .collect()
    }
}
