//! Minimal HTTP/1.1 front end: request parsing, routing and JSON responses.
//!
//! One request is served per connection and every response closes it.

use crate::client::{CounterAction, StoreClient};
use crate::error::GatewayError;
use bytes::BytesMut;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::warn;

/// Upper bound on a request, head and body together (1MB).
pub const MAX_REQUEST_LEN: usize = 1024 * 1024;

const ROUTES: &[&str] = &[
    "/set",
    "/counter",
    "/keys",
    "/hash/set",
    "/hash/get",
    "/hash/all",
    "/hash/del",
    "/cli",
];

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("request exceeds {MAX_REQUEST_LEN} bytes")]
    TooLarge,

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Request {
    /// Parse a request head (everything before the blank line).
    pub fn parse_head(head: &str) -> Result<(Request, usize), HttpError> {
        let mut lines = head.split("\r\n");
        let request_line = lines
            .next()
            .ok_or_else(|| HttpError::Malformed("empty request".into()))?;

        let mut parts = request_line.split_whitespace();
        let (method, target) = match (parts.next(), parts.next(), parts.next()) {
            (Some(m), Some(t), Some(v)) if v.starts_with("HTTP/") => (m, t),
            _ => {
                return Err(HttpError::Malformed(format!(
                    "bad request line: {request_line}"
                )));
            }
        };

        let mut content_length = 0;
        for line in lines {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value
                    .trim()
                    .parse()
                    .map_err(|_| HttpError::Malformed("bad Content-Length".into()))?;
            }
        }

        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, parse_query(query)),
            None => (target, HashMap::new()),
        };

        let request = Request {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            query,
            body: Vec::new(),
        };
        Ok((request, content_length))
    }
}

/// Read one request from `stream`. Returns `None` if the peer closed the
/// connection before sending anything.
pub async fn read_request<R>(stream: &mut R) -> Result<Option<Request>, HttpError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(4096);

    let head_end = loop {
        if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
            break pos;
        }
        if buf.len() > MAX_REQUEST_LEN {
            return Err(HttpError::TooLarge);
        }
        if stream.read_buf(&mut buf).await? == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(HttpError::Malformed("connection closed mid-request".into()));
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let (mut request, content_length) = Request::parse_head(&head)?;

    let body_start = head_end + 4;
    let body_end = match body_start.checked_add(content_length) {
        Some(end) if end <= MAX_REQUEST_LEN => end,
        _ => return Err(HttpError::TooLarge),
    };
    while buf.len() < body_end {
        if stream.read_buf(&mut buf).await? == 0 {
            return Err(HttpError::Malformed("truncated body".into()));
        }
    }

    request.body = buf[body_start..body_end].to_vec();
    Ok(Some(request))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Option<Value>,
}

impl Response {
    pub fn ok(body: Value) -> Self {
        Response {
            status: 200,
            body: Some(body),
        }
    }

    pub fn no_content() -> Self {
        Response {
            status: 204,
            body: None,
        }
    }

    /// Error response with a `{"detail": ...}` body.
    pub fn detail(status: u16, message: impl Into<String>) -> Self {
        Response {
            status,
            body: Some(json!({ "detail": message.into() })),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let body = self
            .body
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default();

        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, reason(self.status));
        if self.body.is_some() {
            head.push_str("Content-Type: application/json\r\n");
        }
        head.push_str(&format!("Content-Length: {}\r\n", body.len()));
        head.push_str("Access-Control-Allow-Origin: *\r\n");
        head.push_str("Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n");
        head.push_str("Access-Control-Allow-Headers: *\r\n");
        head.push_str("Connection: close\r\n\r\n");

        let mut out = head.into_bytes();
        out.extend_from_slice(body.as_bytes());
        out
    }
}

impl From<GatewayError> for Response {
    fn from(err: GatewayError) -> Self {
        if let GatewayError::Transport { .. } = err {
            warn!("{err}");
        }
        Response::detail(err.status_code(), err.to_string())
    }
}

impl From<HttpError> for Response {
    fn from(err: HttpError) -> Self {
        let status = match err {
            HttpError::TooLarge => 413,
            _ => 400,
        };
        Response::detail(status, err.to_string())
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        422 => "Unprocessable Entity",
        503 => "Service Unavailable",
        _ => "Internal Server Error",
    }
}

#[derive(Debug, Deserialize)]
struct SetRequest {
    key: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct CounterRequest {
    key: String,
    action: String,
}

#[derive(Debug, Deserialize)]
struct HashSetRequest {
    key: String,
    field: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct HashDelRequest {
    key: String,
    field: String,
}

#[derive(Debug, Deserialize)]
struct CliRequest {
    cmd: String,
}

/// Route a request to the store client and render the outcome.
pub async fn handle(request: &Request, client: &StoreClient) -> Response {
    if request.method == "OPTIONS" {
        return Response::no_content();
    }
    match dispatch(request, client).await {
        Ok(body) => Response::ok(body),
        Err(response) => response,
    }
}

async fn dispatch(req: &Request, client: &StoreClient) -> Result<Value, Response> {
    match (req.method.as_str(), req.path.as_str()) {
        ("POST", "/set") => {
            let body: SetRequest = json_body(req)?;
            client
                .set_string(token("key", &body.key)?, token("value", &body.value)?)
                .await?;
            Ok(json!({ "success": true }))
        }
        ("GET", path) if path.starts_with("/get/") => match get_key(path) {
            Some(key) => {
                let value = client.get_string(token("key", &key)?).await?;
                Ok(json!({ "value": value }))
            }
            None => Err(Response::detail(404, "Not Found")),
        },
        ("POST", "/counter") => {
            let body: CounterRequest = json_body(req)?;
            let action: CounterAction = body.action.parse()?;
            let value = client
                .update_counter(token("key", &body.key)?, action)
                .await
                .map_err(|err| match err {
                    GatewayError::Store(text) => {
                        GatewayError::Store(format!("Store error: {text}"))
                    }
                    other => other,
                })?;
            Ok(json!({ "value": value }))
        }
        ("GET", "/keys") => {
            let keys = client.list_keys().await?;
            Ok(json!({ "keys": keys }))
        }
        ("POST", "/hash/set") => {
            let body: HashSetRequest = json_body(req)?;
            let created = client
                .set_hash_field(
                    token("key", &body.key)?,
                    token("field", &body.field)?,
                    token("value", &body.value)?,
                )
                .await?;
            Ok(json!({ "created": created }))
        }
        ("GET", "/hash/get") => {
            let key = token("key", query_param(req, "key")?)?;
            let field = token("field", query_param(req, "field")?)?;
            let value = client.get_hash_field(key, field).await?;
            Ok(json!({ "value": value }))
        }
        ("GET", "/hash/all") => {
            let key = token("key", query_param(req, "key")?)?;
            let fields = client.get_all_hash_fields(key).await?;
            Ok(json!({ "fields": fields }))
        }
        ("POST", "/hash/del") => {
            let body: HashDelRequest = json_body(req)?;
            let deleted = client
                .delete_hash_field(token("key", &body.key)?, token("field", &body.field)?)
                .await?;
            Ok(json!({ "deleted": deleted }))
        }
        ("POST", "/cli") => {
            let body: CliRequest = json_body(req)?;
            let resp = client.raw_command(token("cmd", &body.cmd)?).await?;
            Ok(json!({ "resp": resp }))
        }
        (_, path) if ROUTES.contains(&path) || path.starts_with("/get/") => {
            Err(Response::detail(405, "Method Not Allowed"))
        }
        _ => Err(Response::detail(404, "Not Found")),
    }
}

/// Decoded key from a `/get/{key}` path.
fn get_key(path: &str) -> Option<String> {
    path.strip_prefix("/get/")
        .filter(|key| !key.is_empty())
        .map(|key| percent_decode(key, false))
}

/// A request value bound for the store. Line terminators would end the
/// command early and let the rest run as a second command, so they are
/// refused; other whitespace passes through unchanged.
fn token<'a>(name: &str, value: &'a str) -> Result<&'a str, Response> {
    if value.contains(['\r', '\n']) {
        return Err(Response::detail(
            422,
            format!("'{name}' must not contain line breaks"),
        ));
    }
    Ok(value)
}

fn json_body<T: DeserializeOwned>(req: &Request) -> Result<T, Response> {
    serde_json::from_slice(&req.body)
        .map_err(|e| Response::detail(422, format!("invalid request body: {e}")))
}

fn query_param<'a>(req: &'a Request, name: &str) -> Result<&'a str, Response> {
    req.query
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| Response::detail(422, format!("missing query parameter '{name}'")))
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (percent_decode(k, true), percent_decode(v, true)),
            None => (percent_decode(pair, true), String::new()),
        })
        .collect()
}

/// Decode `%XX` escapes; in query strings `+` also means space. Invalid
/// escapes are kept literally.
fn percent_decode(input: &str, plus_as_space: bool) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 3;
                        continue;
                    }
                    _ => out.push(b'%'),
                }
            }
            b'+' if plus_as_space => out.push(b' '),
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
