use std::{fmt, sync::Arc};

use actix_web::body::BodySize;

use crate::context::{RequestData, Transaction};
use crate::locals::LocalValue;
use crate::tags::{KeyTag, SEPARATOR, Tag};
use crate::value::TagValue;

/// Computes the value of one tag for one request.
pub type ExtractFn = fn(&Transaction, &RequestData) -> TagValue;

/// Shared handle to an extractor, simple or bound to a key.
pub type Extractor = Arc<dyn Fn(&Transaction, &RequestData) -> TagValue + Send + Sync>;

/// Fixed extractor of a simple tag.
pub fn simple_extractor(tag: Tag) -> ExtractFn {
    match tag {
        Tag::Referer => |tx, _| tx.request_header("referer").into(),
        Tag::Protocol => |tx, _| tx.request().connection_info().scheme().into(),
        Tag::Port => |tx, _| {
            tx.request()
                .peer_addr()
                .map(|addr| addr.port().to_string())
                .unwrap_or_default()
                .into()
        },
        Tag::Ip => |tx, _| {
            tx.request()
                .peer_addr()
                .map(|addr| addr.ip().to_string())
                .unwrap_or_default()
                .into()
        },
        Tag::Ips => |tx, _| tx.request_header("x-forwarded-for").into(),
        Tag::Host => |tx, _| tx.request().connection_info().host().into(),
        Tag::Path => |tx, _| tx.request().path().into(),
        Tag::Url => |tx, _| {
            let uri = tx.request().uri();
            uri.path_and_query()
                .map_or_else(|| uri.path(), |pq| pq.as_str())
                .into()
        },
        Tag::Ua => |tx, _| tx.request_header("user-agent").into(),
        Tag::ReqBody => |tx, _| tx.request_body().clone().into(),
        Tag::BytesReceived => |tx, _| tx.bytes_received().into(),
        Tag::BytesSent => |tx, _| match tx.response_size() {
            BodySize::Stream => TagValue::Int(0),
            _ => tx.bytes_sent().into(),
        },
        Tag::Route => |tx, _| tx.request().match_pattern().unwrap_or_default().into(),
        Tag::ResBody => |tx, _| tx.response_body().into(),
        Tag::ReqHeaders => |tx, _| TagValue::Bytes(tx.request_headers().into()),
        Tag::QueryStringParams => |tx, _| tx.request().query_string().into(),
        Tag::Status => |tx, _| tx.status().as_u16().into(),
        Tag::Method => |tx, _| tx.request().method().as_str().into(),
        Tag::Pid => |_, data| data.pid().into(),
        Tag::Latency => |_, data| format!("{:?}", data.latency()).into(),
        Tag::ResHeaders => |tx, _| TagValue::Bytes(tx.response_headers_joined().into()),
        Tag::ReqHeadersString => |tx, _| tx.request_headers().into(),
        Tag::ReqBodyString => |tx, _| {
            String::from_utf8_lossy(tx.request_body())
                .into_owned()
                .into()
        },
        Tag::ResHeadersString => |tx, _| tx.response_headers_joined().into(),
        Tag::ResBodyString => |tx, _| {
            String::from_utf8_lossy(&tx.response_body())
                .into_owned()
                .into()
        },
    }
}

/// Extractor of a keyed tag, bound to `key`.
pub fn keyed_extractor(tag: KeyTag, key: &str) -> Extractor {
    let key = key.to_string();
    match tag {
        KeyTag::ReqHeader => {
            Arc::new(move |tx: &Transaction, _: &RequestData| tx.request_header(&key).into())
        }
        KeyTag::ResHeader => {
            Arc::new(move |tx: &Transaction, _: &RequestData| tx.response_header(&key).into())
        }
        KeyTag::Query => Arc::new(move |tx: &Transaction, _: &RequestData| tx.query(&key).into()),
        KeyTag::Form => {
            Arc::new(move |tx: &Transaction, _: &RequestData| tx.form_value(&key).into())
        }
        KeyTag::Cookie => {
            Arc::new(move |tx: &Transaction, _: &RequestData| tx.cookie(&key).into())
        }
        KeyTag::Locals => Arc::new(move |tx: &Transaction, _: &RequestData| {
            LocalValue::stringify(tx.local(&key).as_ref())
        }),
    }
}

/// What a binding in the [`TagMap`] was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Simple(Tag),
    Keyed(KeyTag, String),
}

impl Binding {
    /// Parses a configured tag name, `None` for names outside the catalogue.
    pub fn parse(name: &str) -> Option<Binding> {
        if let Ok(tag) = name.parse::<Tag>() {
            return Some(Binding::Simple(tag));
        }

        let mut parts = name.split(SEPARATOR);
        let base = parts.next()?;
        let key = parts.next()?;
        base.parse::<KeyTag>()
            .ok()
            .map(|tag| Binding::Keyed(tag, key.to_string()))
    }

    /// Name of the log field this binding fills.
    pub fn field_name(&self) -> &'static str {
        match self {
            Binding::Simple(tag) => tag.as_str(),
            Binding::Keyed(tag, _) => tag.as_str(),
        }
    }

    fn extractor(&self) -> Extractor {
        match self {
            Binding::Simple(tag) => Arc::new(simple_extractor(*tag)),
            Binding::Keyed(tag, key) => keyed_extractor(*tag, key),
        }
    }

    fn reads_request_body(&self) -> bool {
        match self {
            Binding::Simple(tag) => tag.reads_request_body(),
            Binding::Keyed(tag, _) => tag.reads_request_body(),
        }
    }

    fn reads_response_body(&self) -> bool {
        match self {
            Binding::Simple(tag) => tag.reads_response_body(),
            Binding::Keyed(..) => false,
        }
    }
}

#[derive(Clone)]
struct Entry {
    binding: Binding,
    extractor: Extractor,
}

/// Active tags of one middleware configuration.
///
/// Built once from the configured tag names and only read afterwards. Field
/// names are unique: a keyed base configured twice keeps the last key, in the
/// position of its first appearance.
#[derive(Clone, Default)]
pub struct TagMap {
    entries: Vec<Entry>,
}

impl TagMap {
    /// Selects the extractors for `tags`. Unknown names are skipped.
    pub fn new<I, T>(tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut map = TagMap::default();
        for name in tags {
            if let Some(binding) = Binding::parse(name.as_ref()) {
                map.bind(binding);
            }
        }
        map
    }

    fn bind(&mut self, binding: Binding) {
        let extractor = binding.extractor();
        let name = binding.field_name();

        match self
            .entries
            .iter_mut()
            .find(|entry| entry.binding.field_name() == name)
        {
            Some(entry) => {
                if entry.binding != binding {
                    log::debug!(
                        "tag `{}` rebound from {:?} to {:?}",
                        name,
                        entry.binding,
                        binding
                    );
                }
                *entry = Entry { binding, extractor };
            }
            None => self.entries.push(Entry { binding, extractor }),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn get(&self, field: &str) -> Option<&Extractor> {
        self.entries
            .iter()
            .find(|entry| entry.binding.field_name() == field)
            .map(|entry| &entry.extractor)
    }

    /// Field names in output order.
    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|entry| entry.binding.field_name())
    }

    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.entries.iter().map(|entry| &entry.binding)
    }

    pub fn needs_request_body(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.binding.reads_request_body())
    }

    pub fn needs_response_body(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.binding.reads_response_body())
    }

    /// Runs every active extractor against one finished request.
    pub fn extract(&self, tx: &Transaction, data: &RequestData) -> Vec<(&'static str, TagValue)> {
        self.entries
            .iter()
            .map(|entry| (entry.binding.field_name(), (entry.extractor)(tx, data)))
            .collect()
    }
}

impl fmt::Debug for TagMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.bindings()).finish()
    }
}
