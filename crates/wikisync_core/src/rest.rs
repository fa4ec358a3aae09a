use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::config::ClientSettings;
use crate::error::{SyncError, SyncResult};
use crate::transport::{ApiResponse, HttpTransport, JsonTransport};

/// Redirect hops followed before a lookup is abandoned.
pub const MAX_REDIRECT_HOPS: usize = 10;

/// Characters `encodeURIComponent` leaves alone.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Page object returned by `GET`/`PUT v1/page/{title}`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PageData {
    pub id: i64,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PageEdit {
    pub source: String,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageLookup {
    Found(PageData),
    /// The REST API answered with a non-2xx status (usually 404).
    Missing { status: u16, body: Value },
}

/// The page operations the sync drivers need.
pub trait PageApi {
    fn lookup(&mut self, title: &str) -> SyncResult<PageLookup>;
    fn create(&mut self, title: &str, edit: &PageEdit) -> SyncResult<PageData>;
}

pub struct RestPageClient<T: JsonTransport = HttpTransport> {
    transport: T,
}

impl RestPageClient<HttpTransport> {
    pub fn from_settings(settings: &ClientSettings) -> SyncResult<Self> {
        Ok(Self::with_transport(HttpTransport::new(
            &settings.rest_url,
            settings,
        )?))
    }
}

impl<T: JsonTransport> RestPageClient<T> {
    pub fn with_transport(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetch a page, following `redirect_target` until a non-redirect or
    /// failed response.
    pub fn get(&mut self, title: &str) -> SyncResult<ApiResponse> {
        let mut target = page_endpoint(title);
        for _ in 0..=MAX_REDIRECT_HOPS {
            let response = self.transport.try_request(Method::GET, &target, None)?;
            if !response.ok {
                return Ok(response);
            }
            match response.data.get("redirect_target").and_then(Value::as_str) {
                Some(next) if !next.is_empty() => {
                    info!(from = %target, to = %next, "following redirect");
                    target = next.to_string();
                }
                _ => return Ok(response),
            }
        }
        Err(SyncError::RedirectLimit {
            title: title.to_string(),
            hops: MAX_REDIRECT_HOPS,
        })
    }

    /// Create or overwrite a page with the given wikitext.
    pub fn edit(&mut self, title: &str, edit: &PageEdit) -> SyncResult<PageData> {
        let body = json!({"source": edit.source, "comment": edit.comment});
        let data = self
            .transport
            .request(Method::PUT, &page_endpoint(title), Some(&body))?;
        parse_page(data, "page edit")
    }
}

impl<T: JsonTransport> PageApi for RestPageClient<T> {
    fn lookup(&mut self, title: &str) -> SyncResult<PageLookup> {
        let response = self.get(title)?;
        if !response.ok {
            return Ok(PageLookup::Missing {
                status: response.status,
                body: response.data,
            });
        }
        parse_page(response.data, "page lookup").map(PageLookup::Found)
    }

    fn create(&mut self, title: &str, edit: &PageEdit) -> SyncResult<PageData> {
        self.edit(title, edit)
    }
}

pub fn page_endpoint(title: &str) -> String {
    format!("v1/page/{}", utf8_percent_encode(title, COMPONENT))
}

fn parse_page(data: Value, context: &str) -> SyncResult<PageData> {
    serde_json::from_value::<PageData>(data.clone())
        .map_err(|error| SyncError::unexpected(format!("{context} ({error})"), data))
}
