use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Position of `name` in a row; cells follow `Record`'s field order.
pub const NAME_COLUMN: usize = 1;

/// One organization row. Empty cells are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    pub wiki_url: String,
    pub name: String,
    pub full_name: String,
    pub region: String,
    pub tags: String,
    pub school: String,
    pub website: String,
    pub instagram: String,
    pub facebook: String,
    pub linktree: String,
    pub twitter: String,
    pub coalition: String,
    pub current_activity: String,
    pub ceased: String,
    /// Cells past the known columns, written back untouched.
    pub extra: Vec<String>,
}

impl Record {
    pub fn from_line(line: &str) -> Self {
        let mut cells = line.split('\t').map(ToString::to_string);
        let mut next = || cells.next().unwrap_or_default();
        let mut record = Self {
            wiki_url: next(),
            name: next(),
            full_name: next(),
            region: next(),
            tags: next(),
            school: next(),
            website: next(),
            instagram: next(),
            facebook: next(),
            linktree: next(),
            twitter: next(),
            coalition: next(),
            current_activity: next(),
            ceased: next(),
            extra: Vec::new(),
        };
        record.extra = cells.collect();
        record
    }

    pub fn to_line(&self) -> String {
        let mut cells = vec![
            self.wiki_url.as_str(),
            self.name.as_str(),
            self.full_name.as_str(),
            self.region.as_str(),
            self.tags.as_str(),
            self.school.as_str(),
            self.website.as_str(),
            self.instagram.as_str(),
            self.facebook.as_str(),
            self.linktree.as_str(),
            self.twitter.as_str(),
            self.coalition.as_str(),
            self.current_activity.as_str(),
            self.ceased.as_str(),
        ];
        cells.extend(self.extra.iter().map(String::as_str));
        cells.join("\t")
    }

    /// Trimmed, non-empty tag labels.
    pub fn tag_list(&self) -> Vec<&str> {
        self.tags
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .collect()
    }

    /// Website or any social profile.
    pub fn has_online_contact(&self) -> bool {
        [
            &self.website,
            &self.instagram,
            &self.facebook,
            &self.linktree,
            &self.twitter,
        ]
        .iter()
        .any(|value| !value.is_empty())
    }

    /// Online contact or a coalition affiliation; records without either are
    /// not worth a page.
    pub fn has_contact_or_affiliation(&self) -> bool {
        self.has_online_contact() || !self.coalition.is_empty()
    }
}

/// The sheet in memory: rows in file order, keyed by `name`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    header: String,
    records: Vec<Record>,
    index: HashMap<String, usize>,
}

impl Dataset {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            ..Self::default()
        }
    }

    /// Split on `\n`, take the first line as the header and every non-empty
    /// line after it as a record. Blank rows do not survive a rewrite.
    pub fn parse(content: &str) -> Self {
        let mut lines = content.split('\n');
        let mut dataset = Self::new(lines.next().unwrap_or_default());
        for line in lines.filter(|line| !line.is_empty()) {
            dataset.insert(Record::from_line(line));
        }
        dataset
    }

    pub fn render(&self) -> String {
        let mut output = self.header.clone();
        output.push('\n');
        for record in &self.records {
            output.push_str(&record.to_line());
            output.push('\n');
        }
        output
    }

    /// A repeated name replaces the earlier record in its original position.
    pub fn insert(&mut self, record: Record) {
        match self.index.get(&record.name) {
            Some(&position) => self.records[position] = record,
            None => {
                self.index.insert(record.name.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Record> {
        self.index.get(name).map(|&position| &self.records[position])
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Names are the index key; callers must not rename records through this.
    pub fn records_mut(&mut self) -> &mut [Record] {
        &mut self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub fn load_dataset(path: &Path) -> Result<Dataset> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Dataset::parse(&content))
}

/// Rewrite the whole file through a sibling temp file and rename.
pub fn save_dataset(path: &Path, dataset: &Dataset) -> Result<()> {
    let temp_path = temp_sibling(path);
    fs::write(&temp_path, dataset.render())
        .with_context(|| format!("failed to write {}", temp_path.display()))?;
    fs::rename(&temp_path, path).with_context(|| {
        format!(
            "failed to replace {} with {}",
            path.display(),
            temp_path.display()
        )
    })?;
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
