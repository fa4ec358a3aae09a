use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, Url};
use serde_json::Value;
use tracing::debug;

use crate::config::ClientSettings;
use crate::error::{SyncError, SyncResult};

/// Uniform outcome of an HTTP call: `ok` mirrors a 2xx status and `data` is
/// the decoded body (the error body when `ok` is false).
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub ok: bool,
    pub status: u16,
    pub data: Value,
}

impl ApiResponse {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            status: 200,
            data,
        }
    }

    pub fn failure(status: u16, data: Value) -> Self {
        Self {
            ok: false,
            status,
            data,
        }
    }
}

/// Authenticated JSON transport shared by the REST and action clients.
///
/// Only network-level failures surface as `Err` from `try_request`; a non-2xx
/// response is an ordinary `ApiResponse` with `ok == false`.
pub trait JsonTransport {
    fn try_request(
        &mut self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> SyncResult<ApiResponse>;

    fn post_form(&mut self, endpoint: &str, params: &[(&str, String)]) -> SyncResult<Value>;

    fn request_count(&self) -> usize;

    /// Same as `try_request`, but a non-2xx response becomes
    /// `SyncError::Rejected` carrying the error body.
    fn request(
        &mut self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> SyncResult<Value> {
        let response = self.try_request(method, endpoint, body)?;
        if !response.ok {
            return Err(SyncError::Rejected {
                endpoint: endpoint.to_string(),
                status: response.status,
                body: response.data,
            });
        }
        Ok(response.data)
    }
}

pub struct HttpTransport {
    client: Client,
    base_url: Url,
    bearer: String,
    user_agent: String,
    request_count: usize,
}

impl HttpTransport {
    /// Fails immediately when no access token is configured.
    pub fn new(base_url: &str, settings: &ClientSettings) -> SyncResult<Self> {
        let bearer = settings.require_token()?.to_string();
        let base_url = Url::parse(base_url).map_err(|error| SyncError::InvalidUrl {
            endpoint: base_url.to_string(),
            reason: error.to_string(),
        })?;
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|source| SyncError::Transport {
                endpoint: base_url.to_string(),
                source,
            })?;

        Ok(Self {
            client,
            base_url,
            bearer,
            user_agent: settings.user_agent.clone(),
            request_count: 0,
        })
    }

    fn resolve(&self, endpoint: &str) -> SyncResult<Url> {
        if endpoint.is_empty() {
            return Ok(self.base_url.clone());
        }
        resolve_endpoint(&self.base_url, endpoint)
    }
}

impl JsonTransport for HttpTransport {
    fn try_request(
        &mut self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> SyncResult<ApiResponse> {
        let url = self.resolve(endpoint)?;
        debug!(%method, %url, "wiki request");
        self.request_count += 1;

        let mut builder = self
            .client
            .request(method, url)
            .header(USER_AGENT, self.user_agent.clone())
            .header(AUTHORIZATION, format!("Bearer {}", self.bearer));
        if let Some(body) = body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(body.to_string());
        }
        let response = builder.send().map_err(|source| SyncError::Transport {
            endpoint: endpoint.to_string(),
            source,
        })?;

        let status = response.status();
        let text = response.text().map_err(|source| SyncError::Transport {
            endpoint: endpoint.to_string(),
            source,
        })?;
        let data = match serde_json::from_str::<Value>(&text) {
            Ok(data) => data,
            Err(error) if status.is_success() => {
                return Err(SyncError::Decode {
                    endpoint: endpoint.to_string(),
                    reason: error.to_string(),
                });
            }
            Err(_) => Value::String(text),
        };

        Ok(ApiResponse {
            ok: status.is_success(),
            status: status.as_u16(),
            data,
        })
    }

    fn post_form(&mut self, endpoint: &str, params: &[(&str, String)]) -> SyncResult<Value> {
        let url = self.resolve(endpoint)?;
        debug!(%url, "wiki form post");
        self.request_count += 1;

        let response = self
            .client
            .post(url)
            .header(USER_AGENT, self.user_agent.clone())
            .header(AUTHORIZATION, format!("Bearer {}", self.bearer))
            .form(params)
            .send()
            .map_err(|source| SyncError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        response.json::<Value>().map_err(|error| SyncError::Decode {
            endpoint: endpoint.to_string(),
            reason: error.to_string(),
        })
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

/// Resolve a relative (`v1/page/X`) or absolute-path (`/rest.php/v1/page/X`)
/// endpoint against the client base URL.
pub fn resolve_endpoint(base: &Url, endpoint: &str) -> SyncResult<Url> {
    base.join(endpoint).map_err(|error| SyncError::InvalidUrl {
        endpoint: endpoint.to_string(),
        reason: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;
    use std::time::Duration;

    use super::*;

    fn settings(token: Option<&str>) -> ClientSettings {
        ClientSettings {
            access_token: token.map(ToString::to_string),
            rest_url: "https://wiki.example.org/rest.php/".to_string(),
            api_url: "https://wiki.example.org/w/api.php".to_string(),
            wiki_url: "https://wiki.example.org".to_string(),
            site_id: "examplewiki".to_string(),
            user_agent: "wikisync-test".to_string(),
            timeout: Duration::from_millis(1000),
        }
    }

    #[test]
    fn construction_fails_without_token() {
        let error = HttpTransport::new("https://wiki.example.org/rest.php/", &settings(None))
            .err()
            .expect("must fail");
        assert!(matches!(error, SyncError::MissingToken { .. }));
    }

    #[test]
    fn construction_rejects_invalid_base_url() {
        let error = HttpTransport::new("not a url", &settings(Some("token")))
            .err()
            .expect("must fail");
        assert!(matches!(error, SyncError::InvalidUrl { .. }));
    }

    #[test]
    fn relative_endpoints_resolve_under_base_path() {
        let base = Url::parse("https://wiki.example.org/rest.php/").expect("base");
        let url = resolve_endpoint(&base, "v1/page/Alpha").expect("resolve");
        assert_eq!(url.as_str(), "https://wiki.example.org/rest.php/v1/page/Alpha");
    }

    #[test]
    fn absolute_path_endpoints_resolve_against_origin() {
        let base = Url::parse("https://wiki.example.org/rest.php/").expect("base");
        let url = resolve_endpoint(&base, "/rest.php/v1/page/Beta").expect("resolve");
        assert_eq!(url.as_str(), "https://wiki.example.org/rest.php/v1/page/Beta");
    }

    #[test]
    fn request_turns_failure_into_rejected() {
        struct Failing;

        impl JsonTransport for Failing {
            fn try_request(
                &mut self,
                _method: Method,
                _endpoint: &str,
                _body: Option<&Value>,
            ) -> SyncResult<ApiResponse> {
                Ok(ApiResponse::failure(
                    409,
                    serde_json::json!({"httpReason": "Conflict"}),
                ))
            }

            fn post_form(
                &mut self,
                _endpoint: &str,
                _params: &[(&str, String)],
            ) -> SyncResult<Value> {
                Ok(Value::Null)
            }

            fn request_count(&self) -> usize {
                0
            }
        }

        let error = Failing
            .request(Method::PUT, "v1/page/A", None)
            .expect_err("must fail");
        match error {
            SyncError::Rejected { status, body, .. } => {
                assert_eq!(status, 409);
                assert_eq!(body["httpReason"], "Conflict");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    /// Accept one connection, capture the raw request and answer with the
    /// given status line and body.
    fn spawn_one_shot_http(
        status: &'static str,
        content_type: &'static str,
        body: &'static str,
    ) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let request = read_request(&mut stream);
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).expect("write");
            let _ = stream.flush();
            request
        });
        (format!("http://{addr}/rest.php/"), handle)
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut raw = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let read = stream.read(&mut chunk).expect("read");
            if read == 0 {
                break;
            }
            raw.extend_from_slice(&chunk[..read]);
            let text = String::from_utf8_lossy(&raw);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if raw.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&raw).into_owned()
    }

    fn live_transport(base_url: &str) -> HttpTransport {
        HttpTransport::new(base_url, &settings(Some("secret-token"))).expect("transport")
    }

    #[test]
    fn non_success_status_keeps_json_error_body() {
        let (base, server) =
            spawn_one_shot_http("404 Not Found", "application/json", r#"{"httpCode":404}"#);
        let mut transport = live_transport(&base);

        let response = transport
            .try_request(Method::GET, "v1/page/Missing", None)
            .expect("response");
        assert!(!response.ok);
        assert_eq!(response.status, 404);
        assert_eq!(response.data, serde_json::json!({"httpCode": 404}));
        assert_eq!(transport.request_count(), 1);

        let request = server.join().expect("server");
        let lowered = request.to_ascii_lowercase();
        assert!(request.starts_with("GET /rest.php/v1/page/Missing HTTP/1.1"));
        assert!(lowered.contains("authorization: bearer secret-token"));
        assert!(lowered.contains("user-agent: wikisync-test"));
    }

    #[test]
    fn non_json_error_body_is_kept_as_text() {
        let (base, server) =
            spawn_one_shot_http("500 Internal Server Error", "text/plain", "boom");
        let mut transport = live_transport(&base);

        let response = transport
            .try_request(Method::GET, "v1/page/A", None)
            .expect("response");
        server.join().expect("server");
        assert!(!response.ok);
        assert_eq!(response.status, 500);
        assert_eq!(response.data, Value::String("boom".to_string()));
    }

    #[test]
    fn success_with_non_json_body_is_decode_error() {
        let (base, server) = spawn_one_shot_http("200 OK", "text/html", "<html></html>");
        let mut transport = live_transport(&base);

        let error = transport
            .try_request(Method::GET, "v1/page/A", None)
            .expect_err("must fail");
        server.join().expect("server");
        assert!(matches!(error, SyncError::Decode { .. }));
    }

    #[test]
    fn json_body_is_sent_with_content_type() {
        let (base, server) =
            spawn_one_shot_http("200 OK", "application/json", r#"{"id":7,"title":"A"}"#);
        let mut transport = live_transport(&base);
        let body = serde_json::json!({"source": "text", "comment": "note"});

        let data = transport
            .request(Method::PUT, "v1/page/A", Some(&body))
            .expect("data");
        assert_eq!(data["id"], 7);

        let request = server.join().expect("server");
        assert!(request.starts_with("PUT /rest.php/v1/page/A HTTP/1.1"));
        assert!(
            request
                .to_ascii_lowercase()
                .contains("content-type: application/json")
        );
        let sent = request.split("\r\n\r\n").nth(1).expect("body");
        let sent: Value = serde_json::from_str(sent).expect("json body");
        assert_eq!(sent, body);
    }

    #[test]
    fn post_form_encodes_fields_and_decodes_json() {
        let (base, server) = spawn_one_shot_http(
            "200 OK",
            "application/json",
            r#"{"query":{"tokens":{"csrftoken":"+\\"}}}"#,
        );
        let mut transport = live_transport(&base);

        let data = transport
            .post_form(
                "",
                &[
                    ("action", "query".to_string()),
                    ("token", "abc+\\".to_string()),
                    ("titles", String::new()),
                ],
            )
            .expect("data");
        assert_eq!(data["query"]["tokens"]["csrftoken"], "+\\");
        assert_eq!(transport.request_count(), 1);

        let request = server.join().expect("server");
        let lowered = request.to_ascii_lowercase();
        assert!(request.starts_with("POST /rest.php/ HTTP/1.1"));
        assert!(lowered.contains("content-type: application/x-www-form-urlencoded"));
        assert!(lowered.contains("authorization: bearer secret-token"));
        let sent = request.split("\r\n\r\n").nth(1).expect("body");
        assert_eq!(sent, "action=query&token=abc%2B%5C&titles=");
    }

    #[test]
    fn post_form_with_non_json_body_is_decode_error() {
        let (base, server) = spawn_one_shot_http("200 OK", "text/html", "<html></html>");
        let mut transport = live_transport(&base);

        let error = transport
            .post_form("", &[("action", "query".to_string())])
            .expect_err("must fail");
        server.join().expect("server");
        assert!(matches!(error, SyncError::Decode { .. }));
    }
}
