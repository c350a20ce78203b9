use std::{
    borrow::Cow,
    collections::HashSet,
    fmt,
    future::Future,
    io::Write,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
};

use bytes::{Bytes, BytesMut};
use futures_core::ready;
use futures_util::{StreamExt, future::LocalBoxFuture, stream};
use pin_project_lite::pin_project;
use regex::Regex;
use uuid::Uuid;

use actix_http::BoxedPayloadStream;
use actix_service::{Service, Transform};
use actix_utils::future::{Ready, ready};
use actix_web::body::{BodySize, MessageBody};
use actix_web::dev::{Payload, ServiceRequest, ServiceResponse};
use actix_web::error::PayloadError;
use actix_web::http::header::{self, HeaderName};
use actix_web::{Error, HttpMessage, Result};

use crate::backend::{Backend, Logfmt, RustLog};
use crate::context::{RequestBody, RequestData, Transaction, multipart_fields};
use crate::extract::TagMap;
use crate::locals::LocalsExt;
use crate::tags::{KeyTag, TAG_FORM, Tag, attach_key_tag};

/// Default number of request body bytes kept for logging, the same as the
/// default `PayloadConfig` limit.
pub const DEFAULT_BODY_LIMIT: usize = 262_144;

/// Middleware that logs the configured tags of every request.
///
/// The tag map is built once when the middleware is created; every request
/// then runs the active extractors after its response body has been written
/// and hands the fields to the configured [`Backend`].
///
/// # Examples
/// ```rust
/// use actix_web::App;
/// use actix_web_middleware_taglog::{KeyTag, Tag, TagLogger, Tags};
///
/// let app = App::new().wrap(TagLogger::new(
///     Tags::builder()
///         .with(Tag::Method)
///         .with(Tag::Status)
///         .with_key(KeyTag::Locals, "requestId")
///         .build(),
/// ));
/// ```
pub struct TagLogger(Rc<Inner>);

#[derive(Clone)]
struct Inner {
    tags: TagMap,
    exclude: HashSet<String>,
    exclude_regex: Vec<Regex>,
    log_target: Cow<'static, str>,
    level: log::Level,
    request_id: Option<HeaderName>,
    body_limit: usize,
    backend: Rc<dyn Backend>,
}

impl TagLogger {
    /// Create `TagLogger` middleware logging the specified `tags`.
    pub fn new(tags: Tags) -> TagLogger {
        TagLogger(Rc::new(Inner {
            tags: TagMap::new(tags.0),
            exclude: HashSet::new(),
            exclude_regex: Vec::new(),
            log_target: Cow::Borrowed(module_path!()),
            level: log::Level::Info,
            request_id: None,
            body_limit: DEFAULT_BODY_LIMIT,
            backend: Rc::new(RustLog),
        }))
    }

    /// Ignore and do not log access info for specified path.
    pub fn exclude<T: Into<String>>(mut self, path: T) -> Self {
        Rc::make_mut(&mut self.0).exclude.insert(path.into());
        self
    }

    /// Ignore and do not log access info for paths that match regex.
    ///
    /// A pattern that does not compile is reported and skipped.
    pub fn exclude_regex<T: Into<String>>(mut self, path: T) -> Self {
        let path = path.into();
        match Regex::new(&path) {
            Ok(re) => Rc::make_mut(&mut self.0).exclude_regex.push(re),
            Err(err) => log::warn!("Ignoring exclude pattern `{}`: {}", path, err),
        }
        self
    }

    /// Sets the logging target to `target`.
    ///
    /// By default, the log target is `actix_web_middleware_taglog::logger`.
    pub fn log_target(mut self, target: impl Into<Cow<'static, str>>) -> Self {
        Rc::make_mut(&mut self.0).log_target = target.into();
        self
    }

    /// Sets the level access lines are emitted at. Defaults to `Info`.
    pub fn level(mut self, level: log::Level) -> Self {
        Rc::make_mut(&mut self.0).level = level;
        self
    }

    /// Caps how many request body bytes are kept for the body tags.
    ///
    /// Reading stops once the limit is passed; the handler still receives the
    /// whole body. Defaults to [`DEFAULT_BODY_LIMIT`].
    pub fn body_limit(mut self, limit: usize) -> Self {
        Rc::make_mut(&mut self.0).body_limit = limit;
        self
    }

    /// Sends access lines to `backend` instead of the `log` facade.
    pub fn backend<B: Backend + 'static>(mut self, backend: B) -> Self {
        Rc::make_mut(&mut self.0).backend = Rc::new(backend);
        self
    }

    /// Writes access lines as logfmt to `out`.
    pub fn output<W: Write + 'static>(self, out: W) -> Self {
        self.backend(Logfmt::new(out))
    }

    /// Stores a request id in the request locals under `header`.
    ///
    /// The id is taken from the `header` request header when present,
    /// otherwise a new [`RequestId`] is generated and also inserted into the
    /// request extensions. Log it with `locals:<header>`.
    pub fn request_id(mut self, header: &str) -> Self {
        match HeaderName::try_from(header) {
            Ok(name) => Rc::make_mut(&mut self.0).request_id = Some(name),
            Err(err) => log::warn!("Ignoring request id header `{}`: {}", header, err),
        }
        self
    }
}

impl Inner {
    fn is_excluded(&self, path: &str) -> bool {
        self.exclude.contains(path) || self.exclude_regex.iter().any(|r| r.is_match(path))
    }
}

impl Default for TagLogger {
    /// Create `TagLogger` middleware with the [`Tags::default`] set.
    fn default() -> Self {
        TagLogger::new(Tags::default())
    }
}

impl fmt::Debug for TagLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagLogger")
            .field("tags", &self.0.tags)
            .field("exclude", &self.0.exclude)
            .field("exclude_regex", &self.0.exclude_regex)
            .field("log_target", &self.0.log_target)
            .field("level", &self.0.level)
            .field("request_id", &self.0.request_id)
            .field("body_limit", &self.0.body_limit)
            .finish_non_exhaustive()
    }
}

impl<S, B> Transform<S, ServiceRequest> for TagLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<StreamLog<B>>;
    type Error = Error;
    type Transform = TagLoggerMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(TagLoggerMiddlewareService {
            service: Rc::new(service),
            inner: Rc::clone(&self.0),
        }))
    }
}

pin_project! {
    pub struct StreamLog<B> {
        #[pin]
        body: B,
        transaction: Option<(Transaction, RequestData)>,
        inner: Rc<Inner>,
    }

    impl<B> PinnedDrop for StreamLog<B> {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            if let Some((tx, mut data)) = this.transaction.take() {
                data.finish();
                let fields = this.inner.tags.extract(&tx, &data);
                this.inner
                    .backend
                    .emit(this.inner.level, this.inner.log_target.as_ref(), &fields);
            }
        }
    }
}

impl<B: MessageBody> MessageBody for StreamLog<B> {
    type Error = B::Error;

    #[inline]
    fn size(&self) -> BodySize {
        self.body.size()
    }

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Bytes, Self::Error>>> {
        let this = self.project();

        match ready!(this.body.poll_next(cx)) {
            Some(Ok(chunk)) => {
                if let Some((tx, _)) = this.transaction {
                    tx.record_chunk(&chunk);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Some(Err(err)) => Poll::Ready(Some(Err(err))),
            None => Poll::Ready(None),
        }
    }
}

/// Logger middleware service.
pub struct TagLoggerMiddlewareService<S> {
    inner: Rc<Inner>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for TagLoggerMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<StreamLog<B>>;
    type Error = Error;
    type Future = TagLoggerResponse<B>;

    actix_service::forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        if self.inner.is_excluded(req.path()) {
            return TagLoggerResponse {
                fut: Box::pin(async move {
                    Ok::<_, Error>((service.call(req).await?, RequestBody::default()))
                }),
                data: None,
                inner: Rc::clone(&self.inner),
            };
        }

        let data = RequestData::start();

        if let Some(header) = &self.inner.request_id {
            let id = match req.headers().get(header).and_then(|v| v.to_str().ok()) {
                Some(id) => id.to_string(),
                None => {
                    let id = RequestId::new();
                    req.extensions_mut().insert(id);
                    id.to_string()
                }
            };
            req.set_local(header.as_str(), id);
        }

        let buffer_body = self.inner.tags.needs_request_body();
        let parse_form = self.inner.tags.contains(TAG_FORM);
        let limit = self.inner.body_limit;

        TagLoggerResponse {
            fut: Box::pin(async move {
                let body = if buffer_body {
                    buffer_payload(&mut req, limit, parse_form).await?
                } else {
                    RequestBody::default()
                };
                Ok::<_, Error>((service.call(req).await?, body))
            }),
            data: Some(data),
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Reads the request payload up to `limit` bytes and puts an identical one
/// back for the handler.
///
/// Past the limit the bytes already read are replayed ahead of the rest of
/// the original payload, which is counted but not kept.
async fn buffer_payload(
    req: &mut ServiceRequest,
    limit: usize,
    parse_form: bool,
) -> Result<RequestBody, Error> {
    let mut payload = req.take_payload();
    let mut read = BytesMut::new();
    let mut complete = true;
    while let Some(chunk) = payload.next().await {
        read.extend_from_slice(&chunk?);
        if read.len() > limit {
            complete = false;
            break;
        }
    }
    let read = read.freeze();

    let mut body = RequestBody::new(read.slice(..read.len().min(limit)), read.len());
    let head = stream::iter((!read.is_empty()).then(|| Ok::<_, PayloadError>(read)));
    let replay: BoxedPayloadStream = if complete {
        Box::pin(head)
    } else {
        log::debug!("Request body passed {} bytes, logging a prefix", limit);
        let received = body.received_counter();
        Box::pin(head.chain(payload.inspect(move |chunk| {
            if let Ok(chunk) = chunk {
                received.set(received.get() + chunk.len());
            }
        })))
    };
    req.set_payload(Payload::Stream { payload: replay });

    if parse_form {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if let Some(content_type) = content_type {
            let fields = multipart_fields(&content_type, body.kept().clone()).await;
            body.set_multipart(fields);
        }
    }

    Ok(body)
}

pin_project! {
    pub struct TagLoggerResponse<B> {
        #[pin]
        fut: LocalBoxFuture<'static, Result<(ServiceResponse<B>, RequestBody), Error>>,
        data: Option<RequestData>,
        inner: Rc<Inner>,
    }
}

impl<B> Future for TagLoggerResponse<B>
where
    B: MessageBody,
{
    type Output = Result<ServiceResponse<StreamLog<B>>, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        let (res, request_body) = match ready!(this.fut.poll(cx)) {
            Ok(res) => res,
            Err(err) => return Poll::Ready(Err(err)),
        };

        if let Some(error) = res.response().error() {
            log::debug!("Error in response: {:?}", error);
        }

        let inner = Rc::clone(this.inner);
        let transaction = this.data.take().map(|data| {
            let tx = Transaction::new(
                res.request().clone(),
                request_body,
                res.status(),
                res.headers().clone(),
                res.response().body().size(),
                inner.tags.needs_response_body(),
            );
            (tx, data)
        });

        Poll::Ready(Ok(res.map_body(move |_, body| StreamLog {
            body,
            transaction,
            inner,
        })))
    }
}

/// Tag names a [`TagLogger`] is configured with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tags(Vec<String>);

impl Default for Tags {
    fn default() -> Self {
        TagsBuilder::default().build()
    }
}

impl Tags {
    pub fn builder() -> TagsBuilder {
        TagsBuilder::new()
    }

    pub fn new(tags: Vec<String>) -> Self {
        Tags(tags)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<T: Into<String>> FromIterator<T> for Tags {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Tags(iter.into_iter().map(Into::into).collect())
    }
}

pub struct TagsBuilder {
    tags: Vec<String>,
}

impl TagsBuilder {
    pub fn new() -> Self {
        TagsBuilder { tags: Vec::new() }
    }

    pub fn build(self) -> Tags {
        Tags(self.tags)
    }

    pub fn with(mut self, tag: Tag) -> Self {
        self.tags.push(tag.as_str().to_string());
        self
    }

    /// Adds the keyed tag `base:key`.
    pub fn with_key(mut self, base: KeyTag, key: &str) -> Self {
        self.tags.push(attach_key_tag(base, key));
        self
    }

    /// Adds a raw tag name. Names outside the catalogue are ignored later on.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.tags.push(name.into());
        self
    }
}

impl Default for TagsBuilder {
    fn default() -> Self {
        TagsBuilder::new()
            .with(Tag::Method)
            .with(Tag::Status)
            .with(Tag::Path)
            .with(Tag::Ip)
            .with(Tag::Latency)
            .with(Tag::BytesSent)
            .with(Tag::Ua)
            .with(Tag::Referer)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestId(Uuid);

impl RequestId {
    pub(crate) fn new() -> Self {
        #[cfg(not(feature = "uuid_v7"))]
        {
            Self(Uuid::new_v4())
        }
        #[cfg(feature = "uuid_v7")]
        {
            Self(Uuid::now_v7())
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.as_hyphenated(), f)
    }
}
