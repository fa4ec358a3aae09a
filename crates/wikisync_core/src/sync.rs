use reqwest::Url;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::action::{EntityApi, EntityLookup};
use crate::dataset::{Dataset, Record};
use crate::entity::build_entity_data;
use crate::error::{SyncError, SyncResult};
use crate::markup::{CREATE_COMMENT, document_title, page_source};
use crate::rest::{PageApi, PageEdit, PageLookup};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Look pages up again even when the record already has a page reference.
    pub recheck: bool,
    /// Wiki base used to build `?curid=` page references.
    pub wiki_url: String,
    /// Site id used for entity site-links.
    pub site_id: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum PageOutcome {
    /// The record already points at a page, or one was found.
    Resolved(String),
    Created(String),
    /// No page and nothing worth writing one from.
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum EntityOutcome {
    Created(String),
    AlreadyLinked(String),
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct PageRecordResult {
    pub name: String,
    pub title: String,
    pub outcome: PageOutcome,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct SyncReport {
    pub resolved: usize,
    pub created: usize,
    pub skipped: Vec<String>,
    pub errored: Vec<String>,
    pub records: Vec<PageRecordResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityRecordResult {
    pub name: String,
    pub page: PageOutcome,
    pub entity: EntityOutcome,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct EntityReport {
    pub pages_created: usize,
    pub entities_created: usize,
    pub already_linked: usize,
    pub skipped: Vec<String>,
    pub errored: Vec<String>,
    pub records: Vec<EntityRecordResult>,
}

impl SyncReport {
    fn push(&mut self, name: &str, title: String, outcome: PageOutcome) {
        match &outcome {
            PageOutcome::Resolved(_) => self.resolved += 1,
            PageOutcome::Created(_) => self.created += 1,
            PageOutcome::Skipped => self.skipped.push(name.to_string()),
            PageOutcome::Failed(_) => self.errored.push(name.to_string()),
        }
        self.records.push(PageRecordResult {
            name: name.to_string(),
            title,
            outcome,
        });
    }
}

impl EntityReport {
    fn push(&mut self, name: &str, page: PageOutcome, entity: EntityOutcome) {
        if matches!(page, PageOutcome::Created(_)) {
            self.pages_created += 1;
        }
        match &entity {
            EntityOutcome::Created(_) => self.entities_created += 1,
            EntityOutcome::AlreadyLinked(_) => {
                self.already_linked += 1;
                self.skipped.push(name.to_string());
            }
            EntityOutcome::Skipped(_) => self.skipped.push(name.to_string()),
            EntityOutcome::Failed(_) => self.errored.push(name.to_string()),
        }
        self.records.push(EntityRecordResult {
            name: name.to_string(),
            page,
            entity,
        });
    }
}

/// Make sure every record with something to say has a wiki page.
///
/// Records are processed one at a time; a failure is recorded against the
/// record and the pass moves on. The dataset is updated in place with the
/// page references found or created.
pub fn sync_pages<P: PageApi>(
    dataset: &mut Dataset,
    api: &mut P,
    options: &SyncOptions,
) -> SyncReport {
    let mut report = SyncReport::default();
    for record in dataset.records_mut() {
        let title = document_title(record);
        let outcome = sync_record_page(record, &title, api, options, options.recheck);
        report.push(&record.name, title, outcome);
    }
    report
}

/// Re-check every record's page (creating missing ones like `sync_pages`)
/// and attach a structured-data item to pages that do not have one yet.
pub fn link_entities<P: PageApi, E: EntityApi>(
    dataset: &mut Dataset,
    pages: &mut P,
    entities: &mut E,
    options: &SyncOptions,
) -> EntityReport {
    let mut report = EntityReport::default();
    for record in dataset.records_mut() {
        let title = document_title(record);
        let page = sync_record_page(record, &title, pages, options, true);
        let entity = match &page {
            PageOutcome::Skipped => {
                warn!(name = %record.name, "no wiki page; skipping entity");
                EntityOutcome::Skipped("no wiki page".to_string())
            }
            PageOutcome::Failed(reason) => EntityOutcome::Failed(reason.clone()),
            PageOutcome::Resolved(_) | PageOutcome::Created(_) => {
                match link_record_entity(record, entities, &options.site_id) {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        error!(name = %record.name, error = %err, "entity linking failed");
                        EntityOutcome::Failed(err.to_string())
                    }
                }
            }
        };
        report.push(&record.name, page, entity);
    }
    report
}

fn sync_record_page<P: PageApi>(
    record: &mut Record,
    title: &str,
    api: &mut P,
    options: &SyncOptions,
    recheck: bool,
) -> PageOutcome {
    match resolve_or_create(record, title, api, options, recheck) {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(
                name = %record.name,
                title = %title,
                network = err.is_network(),
                error = %err,
                "page sync failed"
            );
            PageOutcome::Failed(err.to_string())
        }
    }
}

fn resolve_or_create<P: PageApi>(
    record: &mut Record,
    title: &str,
    api: &mut P,
    options: &SyncOptions,
    recheck: bool,
) -> SyncResult<PageOutcome> {
    if (record.wiki_url.is_empty() || recheck)
        && let PageLookup::Found(page) = api.lookup(title)?
    {
        record.wiki_url = page_url(&options.wiki_url, page.id);
    }
    if !record.wiki_url.is_empty() {
        info!(name = %record.name, url = %record.wiki_url, "page resolved");
        return Ok(PageOutcome::Resolved(record.wiki_url.clone()));
    }

    if !record.has_contact_or_affiliation() {
        info!(name = %record.name, "nothing to write; skipped");
        return Ok(PageOutcome::Skipped);
    }

    info!(title = %title, "page missing; creating");
    let edit = PageEdit {
        source: page_source(record, title),
        comment: CREATE_COMMENT.to_string(),
    };
    let page = api.create(title, &edit)?;
    record.wiki_url = page_url(&options.wiki_url, page.id);
    info!(name = %record.name, url = %record.wiki_url, "page created");
    Ok(PageOutcome::Created(record.wiki_url.clone()))
}

fn link_record_entity<E: EntityApi>(
    record: &Record,
    entities: &mut E,
    site_id: &str,
) -> SyncResult<EntityOutcome> {
    if !record.has_online_contact() {
        info!(name = %record.name, "no online contact; skipping entity");
        return Ok(EntityOutcome::Skipped("no online contact".to_string()));
    }

    let page_id = page_id_from_url(&record.wiki_url).ok_or_else(|| SyncError::InvalidField {
        name: record.name.clone(),
        field: "wikiUrl",
        value: record.wiki_url.clone(),
    })?;
    let title = entities.page_title(page_id)?;

    if let EntityLookup::Linked(id) = entities.linked_entity(site_id, &title)? {
        info!(name = %record.name, entity = %id, "entity already linked");
        return Ok(EntityOutcome::AlreadyLinked(id));
    }

    info!(name = %record.name, title = %title, "entity missing; creating");
    let data = build_entity_data(&title, record, site_id)?;
    let id = entities.create_entity(&data)?;
    info!(name = %record.name, entity = %id, "entity created");
    Ok(EntityOutcome::Created(id))
}

/// `<wiki>/?curid=<id>`
pub fn page_url(wiki_url: &str, page_id: i64) -> String {
    format!("{}/?curid={page_id}", wiki_url.trim_end_matches('/'))
}

pub fn page_id_from_url(url: &str) -> Option<i64> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == "curid")
        .and_then(|(_, value)| value.parse::<i64>().ok())
}
