use std::{cell::Cell, convert::Infallible, process, rc::Rc, time::Duration};

use actix_web::{
    HttpMessage, HttpRequest,
    body::BodySize,
    http::{
        StatusCode,
        header::{self, HeaderMap},
    },
};
use bytes::{Bytes, BytesMut};
use futures_util::stream;
use time::OffsetDateTime;
use url::form_urlencoded;

use crate::locals::{LocalValue, Locals};

/// Per-request timing record.
///
/// Created when the request enters the middleware and finished once the
/// response body has been written.
#[derive(Debug, Clone, Copy)]
pub struct RequestData {
    pid: u32,
    start: OffsetDateTime,
    end: OffsetDateTime,
}

impl RequestData {
    pub(crate) fn start() -> Self {
        let now = OffsetDateTime::now_utc();
        RequestData {
            pid: process::id(),
            start: now,
            end: now,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_times(pid: u32, start: OffsetDateTime, end: OffsetDateTime) -> Self {
        RequestData { pid, start, end }
    }

    pub(crate) fn finish(&mut self) {
        self.end = OffsetDateTime::now_utc();
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn start_time(&self) -> OffsetDateTime {
        self.start
    }

    pub fn end_time(&self) -> OffsetDateTime {
        self.end
    }

    /// Time between start and end, zero if the clock went backwards.
    pub fn latency(&self) -> Duration {
        Duration::try_from(self.end - self.start).unwrap_or_default()
    }
}

/// Request body as seen by the middleware.
///
/// `kept` holds at most the configured body limit. `received` counts every
/// body byte read so far, including the ones the handler reads after the
/// limit was hit.
#[derive(Debug, Clone, Default)]
pub(crate) struct RequestBody {
    kept: Bytes,
    received: Rc<Cell<usize>>,
    multipart: Vec<(String, String)>,
}

impl RequestBody {
    pub(crate) fn new(kept: Bytes, received: usize) -> Self {
        RequestBody {
            kept,
            received: Rc::new(Cell::new(received)),
            multipart: Vec::new(),
        }
    }

    pub(crate) fn kept(&self) -> &Bytes {
        &self.kept
    }

    pub(crate) fn received(&self) -> usize {
        self.received.get()
    }

    pub(crate) fn received_counter(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.received)
    }

    pub(crate) fn set_multipart(&mut self, fields: Vec<(String, String)>) {
        self.multipart = fields;
    }
}

impl From<Bytes> for RequestBody {
    fn from(kept: Bytes) -> Self {
        let len = kept.len();
        RequestBody::new(kept, len)
    }
}

/// Snapshot of one request/response exchange, read by the extractors.
pub struct Transaction {
    request: HttpRequest,
    request_body: RequestBody,
    status: StatusCode,
    response_headers: HeaderMap,
    response_size: BodySize,
    response_body: Option<BytesMut>,
    bytes_sent: usize,
}

impl Transaction {
    pub(crate) fn new(
        request: HttpRequest,
        request_body: RequestBody,
        status: StatusCode,
        response_headers: HeaderMap,
        response_size: BodySize,
        keep_response_body: bool,
    ) -> Self {
        Transaction {
            request,
            request_body,
            status,
            response_headers,
            response_size,
            response_body: keep_response_body.then(BytesMut::new),
            bytes_sent: 0,
        }
    }

    /// Accounts for a chunk of the response body as it is written out.
    pub(crate) fn record_chunk(&mut self, chunk: &[u8]) {
        self.bytes_sent += chunk.len();
        if let Some(body) = &mut self.response_body {
            body.extend_from_slice(chunk);
        }
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// Request body, empty unless a tag asked for it to be buffered.
    pub fn request_body(&self) -> &Bytes {
        self.request_body.kept()
    }

    /// Number of request body bytes read, kept or not.
    pub fn bytes_received(&self) -> usize {
        self.request_body.received()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    /// Body size the response declared before it was written.
    pub fn response_size(&self) -> BodySize {
        self.response_size
    }

    /// Number of response body bytes written.
    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }

    /// Response body, empty unless a tag asked for it to be kept.
    pub fn response_body(&self) -> Bytes {
        self.response_body
            .as_ref()
            .map(|body| Bytes::copy_from_slice(body))
            .unwrap_or_default()
    }

    pub fn request_header(&self, name: &str) -> String {
        header_value(self.request.headers(), name)
    }

    pub fn response_header(&self, name: &str) -> String {
        header_value(&self.response_headers, name)
    }

    /// Request headers as `key=value` pairs joined by `&`.
    pub fn request_headers(&self) -> String {
        join_headers(self.request.headers())
    }

    /// Response headers as `key=value` pairs joined by `&`.
    pub fn response_headers_joined(&self) -> String {
        join_headers(&self.response_headers)
    }

    /// First query parameter named `key`.
    pub fn query(&self, key: &str) -> String {
        lookup_pair(self.request.query_string().as_bytes(), key).unwrap_or_default()
    }

    /// Form value named `key`, looked up in the query string first, then in
    /// a url-encoded request body and last in the text fields of a multipart
    /// body.
    pub fn form_value(&self, key: &str) -> String {
        lookup_pair(self.request.query_string().as_bytes(), key)
            .or_else(|| {
                let urlencoded = self
                    .request
                    .headers()
                    .get(header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));
                if urlencoded {
                    lookup_pair(self.request_body.kept(), key)
                } else {
                    None
                }
            })
            .or_else(|| {
                self.request_body
                    .multipart
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.clone())
            })
            .unwrap_or_default()
    }

    pub fn cookie(&self, name: &str) -> String {
        self.request
            .cookie(name)
            .map(|cookie| cookie.value().to_string())
            .unwrap_or_default()
    }

    pub fn local(&self, key: &str) -> Option<LocalValue> {
        self.request
            .extensions()
            .get::<Locals>()
            .and_then(|locals| locals.get(key).cloned())
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .unwrap_or_default()
}

fn join_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(k, v)| format!("{}={}", k, String::from_utf8_lossy(v.as_bytes())))
        .collect::<Vec<_>>()
        .join("&")
}

/// Text fields of a `multipart/form-data` body. File parts are skipped and
/// reading stops at the first malformed part.
pub(crate) async fn multipart_fields(content_type: &str, body: Bytes) -> Vec<(String, String)> {
    let Ok(boundary) = multer::parse_boundary(content_type) else {
        return Vec::new();
    };

    let mut multipart = multer::Multipart::new(
        stream::once(async move { Ok::<_, Infallible>(body) }),
        boundary,
    );
    let mut fields = Vec::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.file_name().is_some() {
            continue;
        }
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        match field.text().await {
            Ok(value) => fields.push((name, value)),
            Err(err) => {
                log::debug!("Stopped reading multipart form: {}", err);
                break;
            }
        }
    }
    fields
}

fn lookup_pair(input: &[u8], key: &str) -> Option<String> {
    form_urlencoded::parse(input)
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}
