use std::{collections::HashMap, fmt, rc::Rc};

use actix_web::HttpMessage;
use bytes::Bytes;

use crate::value::TagValue;

/// Value stored under a request local key.
#[derive(Clone)]
pub enum LocalValue {
    Bytes(Bytes),
    Str(String),
    /// Anything else, rendered with its `Display` implementation when logged.
    Other(Rc<dyn fmt::Display>),
}

impl LocalValue {
    pub fn other<T: fmt::Display + 'static>(value: T) -> Self {
        LocalValue::Other(Rc::new(value))
    }

    /// Normalizes an optional local into a log value.
    ///
    /// Bytes and strings pass through as strings, a missing value is null.
    pub fn stringify(value: Option<&LocalValue>) -> TagValue {
        match value {
            Some(LocalValue::Bytes(bytes)) => {
                TagValue::Str(String::from_utf8_lossy(bytes).into_owned())
            }
            Some(LocalValue::Str(s)) => TagValue::Str(s.clone()),
            Some(LocalValue::Other(value)) => TagValue::Str(value.to_string()),
            None => TagValue::Null,
        }
    }
}

impl fmt::Debug for LocalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalValue::Bytes(bytes) => f.debug_tuple("Bytes").field(bytes).finish(),
            LocalValue::Str(s) => f.debug_tuple("Str").field(s).finish(),
            LocalValue::Other(value) => f
                .debug_tuple("Other")
                .field(&format_args!("{value}"))
                .finish(),
        }
    }
}

impl From<&str> for LocalValue {
    fn from(value: &str) -> Self {
        LocalValue::Str(value.to_string())
    }
}

impl From<String> for LocalValue {
    fn from(value: String) -> Self {
        LocalValue::Str(value)
    }
}

impl From<Bytes> for LocalValue {
    fn from(value: Bytes) -> Self {
        LocalValue::Bytes(value)
    }
}

impl From<Vec<u8>> for LocalValue {
    fn from(value: Vec<u8>) -> Self {
        LocalValue::Bytes(Bytes::from(value))
    }
}

impl From<&[u8]> for LocalValue {
    fn from(value: &[u8]) -> Self {
        LocalValue::Bytes(Bytes::copy_from_slice(value))
    }
}

macro_rules! local_from_display {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for LocalValue {
                fn from(value: $ty) -> Self {
                    LocalValue::other(value)
                }
            }
        )*
    };
}

local_from_display!(
    bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
    uuid::Uuid
);

/// String keyed values attached to a single request.
///
/// Stored in the request extensions, so anything holding the request (handlers,
/// other middleware) can set values that `locals:<key>` tags pick up.
#[derive(Debug, Clone, Default)]
pub struct Locals(HashMap<String, LocalValue>);

impl Locals {
    pub fn get(&self, key: &str) -> Option<&LocalValue> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: String, value: LocalValue) -> Option<LocalValue> {
        self.0.insert(key, value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Access to request locals on anything that carries request extensions.
///
/// ```
/// use actix_web::{HttpRequest, HttpResponse};
/// use actix_web_middleware_taglog::LocalsExt;
///
/// async fn handler(req: HttpRequest) -> HttpResponse {
///     req.set_local("user", "alice");
///     HttpResponse::Ok().finish()
/// }
/// ```
pub trait LocalsExt {
    /// Sets `key` to `value`, replacing any previous value.
    fn set_local<K, V>(&self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<LocalValue>;

    fn local(&self, key: &str) -> Option<LocalValue>;
}

impl<T: HttpMessage> LocalsExt for T {
    fn set_local<K, V>(&self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<LocalValue>,
    {
        let mut extensions = self.extensions_mut();
        match extensions.get_mut::<Locals>() {
            Some(locals) => {
                locals.insert(key.into(), value.into());
            }
            None => {
                let mut locals = Locals::default();
                locals.insert(key.into(), value.into());
                extensions.insert(locals);
            }
        }
    }

    fn local(&self, key: &str) -> Option<LocalValue> {
        self.extensions()
            .get::<Locals>()
            .and_then(|locals| locals.get(key).cloned())
    }
}
