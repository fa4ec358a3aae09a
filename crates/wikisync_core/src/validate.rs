use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::dataset::NAME_COLUMN;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Duplicate {
    pub name: String,
    pub count: usize,
}

impl Duplicate {
    pub fn message(&self) -> String {
        format!("{} is duplicated", self.name)
    }
}

/// Names that appear on more than one row, in first-seen order.
///
/// Works on the raw text because loading a dataset already collapses
/// repeated names.
pub fn find_duplicates(content: &str) -> Vec<Duplicate> {
    let mut order = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for line in content.split('\n').skip(1).filter(|line| !line.is_empty()) {
        let name = line.split('\t').nth(NAME_COLUMN).unwrap_or_default();
        let count = counts.entry(name).or_insert(0);
        if *count == 0 {
            order.push(name);
        }
        *count += 1;
    }

    order
        .into_iter()
        .filter_map(|name| {
            let count = counts[name];
            (count > 1).then(|| Duplicate {
                name: name.to_string(),
                count,
            })
        })
        .collect()
}

pub fn validate_file(path: &Path) -> Result<Vec<Duplicate>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(find_duplicates(&content))
}
