use std::collections::BTreeMap;

use reqwest::Url;
use serde::Serialize;

use crate::dataset::Record;
use crate::error::{SyncError, SyncResult};

pub const LABEL_LANGUAGE: &str = "ko";

pub const PROPERTY_WEBSITE: &str = "P16";
pub const PROPERTY_TWITTER: &str = "P51";
pub const PROPERTY_FACEBOOK: &str = "P52";
pub const PROPERTY_INSTAGRAM: &str = "P53";
pub const PROPERTY_LINKTREE: &str = "P88";

/// `data` payload for `wbeditentity`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EntityData {
    pub claims: Vec<Statement>,
    pub sitelinks: BTreeMap<String, SiteLink>,
    pub labels: BTreeMap<String, Label>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Statement {
    pub mainsnak: Snak,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub rank: &'static str,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Snak {
    pub snaktype: &'static str,
    pub property: String,
    pub datavalue: DataValue,
    pub datatype: &'static str,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DataValue {
    pub value: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SiteLink {
    pub site: String,
    pub title: String,
    pub badges: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Label {
    pub language: String,
    pub value: String,
}

impl Statement {
    pub fn string(property: &str, value: impl Into<String>) -> Self {
        Self {
            mainsnak: Snak {
                snaktype: "value",
                property: property.to_string(),
                datavalue: DataValue {
                    value: value.into(),
                    kind: "string",
                },
                datatype: "string",
            },
            kind: "statement",
            rank: "normal",
        }
    }
}

/// Item linked to `title` on `site`, labelled with the title, carrying one
/// string claim per populated contact field.
pub fn build_entity_data(title: &str, record: &Record, site: &str) -> SyncResult<EntityData> {
    let mut claims = Vec::new();
    if !record.website.is_empty() {
        claims.push(Statement::string(PROPERTY_WEBSITE, record.website.clone()));
    }
    if !record.instagram.is_empty() {
        let handle = path_handle(&parse_url(record, "instagram", &record.instagram)?);
        claims.push(Statement::string(PROPERTY_INSTAGRAM, handle));
    }
    if !record.facebook.is_empty() {
        let url = parse_url(record, "facebook", &record.facebook)?;
        let handle = url
            .query_pairs()
            .find(|(key, _)| key == "id")
            .map(|(_, value)| value.into_owned())
            .unwrap_or_else(|| path_handle(&url));
        claims.push(Statement::string(PROPERTY_FACEBOOK, handle));
    }
    if !record.linktree.is_empty() {
        let handle = path_handle(&parse_url(record, "linktree", &record.linktree)?);
        claims.push(Statement::string(PROPERTY_LINKTREE, handle));
    }
    if !record.twitter.is_empty() {
        let handle = path_handle(&parse_url(record, "twitter", &record.twitter)?);
        claims.push(Statement::string(PROPERTY_TWITTER, handle));
    }

    let mut sitelinks = BTreeMap::new();
    sitelinks.insert(
        site.to_string(),
        SiteLink {
            site: site.to_string(),
            title: title.to_string(),
            badges: Vec::new(),
        },
    );
    let mut labels = BTreeMap::new();
    labels.insert(
        LABEL_LANGUAGE.to_string(),
        Label {
            language: LABEL_LANGUAGE.to_string(),
            value: title.to_string(),
        },
    );

    Ok(EntityData {
        claims,
        sitelinks,
        labels,
    })
}

/// URL path without the leading slash and at most one trailing slash.
pub fn path_handle(url: &Url) -> String {
    let path = url.path().strip_prefix('/').unwrap_or(url.path());
    path.strip_suffix('/').unwrap_or(path).to_string()
}

fn parse_url(record: &Record, field: &'static str, value: &str) -> SyncResult<Url> {
    Url::parse(value).map_err(|_| SyncError::InvalidField {
        name: record.name.clone(),
        field,
        value: value.to_string(),
    })
}
