use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::ClientSettings;
use crate::entity::EntityData;
use crate::error::{SyncError, SyncResult};
use crate::transport::{HttpTransport, JsonTransport};

/// Key `wbgetentities` uses for a title with no linked item.
pub const MISSING_ENTITY_KEY: &str = "-1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityLookup {
    Missing,
    Linked(String),
}

/// Structured-data operations the entity driver needs.
pub trait EntityApi {
    fn page_title(&mut self, page_id: i64) -> SyncResult<String>;
    fn linked_entity(&mut self, site: &str, title: &str) -> SyncResult<EntityLookup>;
    /// Creates a new item and returns its id. Fetches a CSRF token as needed.
    fn create_entity(&mut self, data: &EntityData) -> SyncResult<String>;
}

/// Client for the legacy `api.php` endpoint.
pub struct ActionClient<T: JsonTransport = HttpTransport> {
    transport: T,
    csrf_token: Option<String>,
}

impl ActionClient<HttpTransport> {
    pub fn from_settings(settings: &ClientSettings) -> SyncResult<Self> {
        Ok(Self::with_transport(HttpTransport::new(
            &settings.api_url,
            settings,
        )?))
    }
}

impl<T: JsonTransport> ActionClient<T> {
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            csrf_token: None,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Post `action` with `format=json` and return the decoded payload as-is.
    /// Success or failure is encoded in the payload shape. Empty values are
    /// sent as empty fields.
    pub fn call(&mut self, action: &str, params: &[(&str, String)]) -> SyncResult<Value> {
        let mut pairs = Vec::with_capacity(params.len() + 3);
        pairs.push(("action", action.to_string()));
        pairs.push(("format", "json".to_string()));
        pairs.push(("formatversion", "2".to_string()));
        pairs.extend(params.iter().map(|(key, value)| (*key, value.clone())));
        debug!(action = action, "action api call");
        self.transport.post_form("", &pairs)
    }

    pub fn csrf_token(&mut self) -> SyncResult<String> {
        if let Some(token) = &self.csrf_token {
            return Ok(token.clone());
        }
        let response = self.call("query", &[("meta", "tokens".to_string())])?;
        check_api_error(&response)?;
        let parsed: TokenQueryResponse = decode(response.clone(), "csrf token query")?;
        let token = parsed
            .query
            .tokens
            .and_then(|tokens| tokens.csrftoken)
            .ok_or_else(|| SyncError::unexpected("csrf token query", response))?;
        self.csrf_token = Some(token.clone());
        Ok(token)
    }
}

impl<T: JsonTransport> EntityApi for ActionClient<T> {
    fn page_title(&mut self, page_id: i64) -> SyncResult<String> {
        let response = self.call("query", &[("pageids", page_id.to_string())])?;
        check_api_error(&response)?;
        let parsed: PageQueryResponse = decode(response.clone(), "page id query")?;
        parsed
            .query
            .pages
            .into_iter()
            .find(|page| page.pageid == Some(page_id) && !page.missing.unwrap_or(false))
            .map(|page| page.title)
            .ok_or_else(|| SyncError::unexpected(format!("page id query for {page_id}"), response))
    }

    fn linked_entity(&mut self, site: &str, title: &str) -> SyncResult<EntityLookup> {
        let response = self.call(
            "wbgetentities",
            &[("sites", site.to_string()), ("titles", title.to_string())],
        )?;
        check_api_error(&response)?;
        let first_key = response
            .get("entities")
            .and_then(Value::as_object)
            .and_then(|entities| entities.keys().next().cloned());
        match first_key {
            Some(key) if key == MISSING_ENTITY_KEY => Ok(EntityLookup::Missing),
            Some(key) => Ok(EntityLookup::Linked(key)),
            None => Err(SyncError::unexpected(
                format!("wbgetentities for {title}"),
                response,
            )),
        }
    }

    fn create_entity(&mut self, data: &EntityData) -> SyncResult<String> {
        let token = self.csrf_token()?;
        let payload = serde_json::to_string(data).map_err(|error| {
            SyncError::unexpected(format!("entity payload ({error})"), Value::Null)
        })?;
        let response = self.call(
            "wbeditentity",
            &[
                ("new", "item".to_string()),
                ("data", payload),
                ("token", token),
            ],
        )?;
        check_api_error(&response)?;
        response
            .get("entity")
            .and_then(|entity| entity.get("id"))
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| SyncError::unexpected("wbeditentity", response))
    }
}

fn check_api_error(payload: &Value) -> SyncResult<()> {
    if let Some(error) = payload.get("error") {
        let code = error
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        let info = error
            .get("info")
            .and_then(Value::as_str)
            .unwrap_or("unknown info");
        return Err(SyncError::Api {
            code: code.to_string(),
            info: info.to_string(),
        });
    }
    Ok(())
}

fn decode<D: for<'de> Deserialize<'de>>(payload: Value, context: &str) -> SyncResult<D> {
    serde_json::from_value(payload.clone())
        .map_err(|error| SyncError::unexpected(format!("{context} ({error})"), payload))
}

#[derive(Debug, Deserialize, Default)]
struct TokenQueryResponse {
    #[serde(default)]
    query: TokenQueryPayload,
}

#[derive(Debug, Deserialize, Default)]
struct TokenQueryPayload {
    tokens: Option<TokenPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct TokenPayload {
    csrftoken: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct PageQueryResponse {
    #[serde(default)]
    query: PageQueryPayload,
}

#[derive(Debug, Deserialize, Default)]
struct PageQueryPayload {
    #[serde(default)]
    pages: Vec<PageQueryItem>,
}

#[derive(Debug, Deserialize)]
struct PageQueryItem {
    pageid: Option<i64>,
    #[serde(default)]
    title: String,
    missing: Option<bool>,
}
