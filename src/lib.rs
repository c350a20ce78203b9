//! Actix-web middleware for tag based structured access logs.
//!
//! A fixed vocabulary of tags (`method`, `status`, `path`, `latency`, ...) is
//! mapped to extractors that read one value off each request/response. The
//! middleware runs the configured extractors once the response body has been
//! written and emits the results as structured fields, through the standard
//! `log` crate by default.
//!
//! # Examples:
//! Example usage with the standard `log` crate and the `structured_logger` crate:
//! ```rust,no_run
//! use actix_web::{web, App, HttpServer};
//! use actix_web_middleware_taglog::TagLogger;
//! use structured_logger::{Builder, async_json::new_writer};
//!
//! #[actix_web::main] // or #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     Builder::new()
//!         .with_target_writer("*", new_writer(tokio::io::stdout()))
//!         .init();
//!
//!     HttpServer::new(|| {
//!         App::new()
//!             .wrap(TagLogger::default())
//!             .route("/", web::get().to(|| async { "Hello world!" }))
//!     })
//!     .bind("127.0.0.1:8080")?
//!     .run()
//!     .await
//! }
//! ```
//!
//! # Configuration
//!
//! ## Tags
//!
//! Tags are configured by name. Simple tags are used as they are, keyed tags
//! select one item of a multi-valued source with `base:key`:
//!
//! ```rust
//! use actix_web_middleware_taglog::{KeyTag, Tag, TagLogger, Tags, attach_key_tag};
//!
//! let logger = TagLogger::new(
//!     Tags::builder()
//!         .with(Tag::Method)                          // method=GET
//!         .with(Tag::Status)                          // status=200
//!         .with(Tag::Latency)                         // latency=1.2ms
//!         .with_key(KeyTag::ReqHeader, "x-tenant")    // reqHeader=acme
//!         .with_key(KeyTag::Locals, "requestId")      // locals=...
//!         .build(),
//! );
//!
//! // Plain strings work as well, unknown names are ignored.
//! let session = attach_key_tag(KeyTag::Cookie, "session");
//! let logger = TagLogger::new(
//!     ["method", "status", session.as_str(), "not-a-tag"]
//!         .into_iter()
//!         .collect(),
//! );
//! ```
//!
//! The field of a keyed tag is named after its base, so `reqHeader:x-tenant`
//! is logged as `reqHeader`. Configuring the same base twice keeps the last key.
//! The key ends at the next `:`, so `reqHeader:x-tenant:extra` reads `x-tenant`.
//!
//! ## Locals
//!
//! Handlers and other middleware attach values to a request with
//! [`LocalsExt::set_local`]; `locals:<key>` logs them.
//!
//! ```rust
//! use actix_web::{HttpRequest, HttpResponse};
//! use actix_web_middleware_taglog::LocalsExt;
//!
//! async fn index(req: HttpRequest) -> HttpResponse {
//!     req.set_local("user", "alice");
//!     HttpResponse::Ok().finish()
//! }
//! ```
//!
//! ## Path Exclusions
//!
//! ```rust
//! use actix_web_middleware_taglog::TagLogger;
//!
//! let logger = TagLogger::default()
//!     .exclude("/health")
//!     .exclude_regex(r"^/assets/.*");
//! ```
//!
//! ## Request Bodies
//!
//! `reqBody`, `reqBodyString`, `bytesReceived` and `form:<key>` make the
//! middleware read the request body before the handler runs. At most
//! [`DEFAULT_BODY_LIMIT`] bytes are kept for the log, see
//! [`TagLogger::body_limit`]; the handler always gets the whole body.
//! `form:<key>` reads the query string, url-encoded bodies and the text fields
//! of `multipart/form-data` bodies.
//!
//! ## Backends
//!
//! Fields go to the `log` facade ([`RustLog`]) unless another [`Backend`] is
//! set. [`TagLogger::output`] writes logfmt lines to any `io::Write`:
//!
//! ```rust
//! use actix_web_middleware_taglog::TagLogger;
//!
//! let logger = TagLogger::default().output(std::io::stderr());
//! ```
//!
//! # Available Tags
//!
//! - `referer`, `ua`, `ips` - `Referer`, `User-Agent` and `X-Forwarded-For` headers
//! - `protocol`, `host`, `ip`, `port` - scheme, host and remote peer
//! - `method`, `path`, `url`, `route`, `queryParams` - request line and route pattern
//! - `status` - response status code
//! - `reqBody`, `reqBodyString`, `bytesReceived` - request body (buffered only when used)
//! - `resBody`, `resBodyString` - response body (kept only when used)
//! - `bytesSent` - response size, `0` when the body size was not declared
//! - `reqHeaders`, `reqHeadersString`, `resHeaders`, `resHeadersString` - all headers as `k=v&k=v`
//! - `pid` - process id
//! - `latency` - time from request start to the end of the response body
//!
//! Keyed: `reqHeader`, `respHeader`, `query`, `form`, `cookie`, `locals`.
//!
//! # Feature Flags
//!
//! - `uuid_v4` (default) - generate UUIDv4 request ids
//! - `uuid_v7` - generate UUIDv7 request ids

mod backend;
mod context;
mod extract;
mod locals;
mod logger;
mod tags;
mod value;

pub use crate::backend::{Backend, Logfmt, MESSAGE, RustLog};
pub use crate::context::{RequestData, Transaction};
pub use crate::extract::{
    Binding, ExtractFn, Extractor, TagMap, keyed_extractor, simple_extractor,
};
pub use crate::locals::{LocalValue, Locals, LocalsExt};
pub use crate::logger::{
    DEFAULT_BODY_LIMIT, RequestId, StreamLog, TagLogger, TagLoggerMiddlewareService,
    TagLoggerResponse, Tags, TagsBuilder,
};
pub use crate::tags::*;
pub use crate::value::TagValue;
