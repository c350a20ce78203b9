use std::{fmt, str::FromStr};

/// Separator between a keyed tag base and its key, e.g. `locals:requestId`.
pub const SEPARATOR: char = ':';

/// Request referer header.
pub const TAG_REFERER: &str = "referer";
/// Request scheme.
pub const TAG_PROTOCOL: &str = "protocol";
/// Remote port.
pub const TAG_PORT: &str = "port";
/// Remote IP address.
pub const TAG_IP: &str = "ip";
/// `X-Forwarded-For` chain.
pub const TAG_IPS: &str = "ips";
/// Request host.
pub const TAG_HOST: &str = "host";
/// Request path.
pub const TAG_PATH: &str = "path";
/// Request url as received.
pub const TAG_URL: &str = "url";
/// Request user agent.
pub const TAG_UA: &str = "ua";
/// Request body.
pub const TAG_REQ_BODY: &str = "reqBody";
/// Request body length.
pub const TAG_BYTES_RECEIVED: &str = "bytesReceived";
/// Response body length.
pub const TAG_BYTES_SENT: &str = "bytesSent";
/// Matched route pattern.
pub const TAG_ROUTE: &str = "route";
/// Response body.
pub const TAG_RES_BODY: &str = "resBody";
/// Request headers.
pub const TAG_REQ_HEADERS: &str = "reqHeaders";
/// Request query string.
pub const TAG_QUERY_STRING_PARAMS: &str = "queryParams";
/// Response status.
pub const TAG_STATUS: &str = "status";
/// Request method.
pub const TAG_METHOD: &str = "method";
/// Process id.
pub const TAG_PID: &str = "pid";
/// Request latency.
pub const TAG_LATENCY: &str = "latency";
/// Response headers.
pub const TAG_RES_HEADERS: &str = "resHeaders";
/// Request headers as a string.
pub const TAG_REQ_HEADERS_STRING: &str = "reqHeadersString";
/// Request body as a string.
pub const TAG_REQ_BODY_STRING: &str = "reqBodyString";
/// Response headers as a string.
pub const TAG_RES_HEADERS_STRING: &str = "resHeadersString";
/// Response body as a string.
pub const TAG_RES_BODY_STRING: &str = "resBodyString";

/// One named request header.
pub const TAG_REQ_HEADER: &str = "reqHeader";
/// One named response header.
pub const TAG_RES_HEADER: &str = "respHeader";
/// One named query parameter.
pub const TAG_QUERY: &str = "query";
/// One named form value.
pub const TAG_FORM: &str = "form";
/// One named cookie.
pub const TAG_COOKIE: &str = "cookie";
/// One named request local.
pub const TAG_LOCALS: &str = "locals";

/// Returned when a string does not name a known tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTag(pub String);

impl fmt::Display for UnknownTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown tag `{}`", self.0)
    }
}

impl std::error::Error for UnknownTag {}

/// Tags that take no parameter. The log field carries the tag name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Referer. Example: https://actix.rs
    Referer,
    /// Scheme. Example: https
    Protocol,
    /// Remote port. Example: 53124
    Port,
    /// Remote IP address. Example: 192.168.0.1
    Ip,
    /// Forwarded chain. Example: 203.0.113.7, 10.0.0.1
    Ips,
    /// Host. Example: localhost:8080
    Host,
    /// Request path. Example: /index.html
    Path,
    /// Path and query. Example: /search?q=actix
    Url,
    /// User agent. Example: Mozilla/5.0
    Ua,
    ReqBody,
    BytesReceived,
    /// Zero when the response size was not declared up front.
    BytesSent,
    /// Route pattern. Example: /users/{id}
    Route,
    ResBody,
    ReqHeaders,
    /// Query string. Example: search=actix&page=2
    QueryStringParams,
    /// Status code. Example: 200
    Status,
    /// Method. Example: GET
    Method,
    Pid,
    /// Example: 1.204ms
    Latency,
    ResHeaders,
    ReqHeadersString,
    ReqBodyString,
    ResHeadersString,
    ResBodyString,
}

impl Tag {
    pub const ALL: [Tag; 25] = [
        Tag::Referer,
        Tag::Protocol,
        Tag::Port,
        Tag::Ip,
        Tag::Ips,
        Tag::Host,
        Tag::Path,
        Tag::Url,
        Tag::Ua,
        Tag::ReqBody,
        Tag::BytesReceived,
        Tag::BytesSent,
        Tag::Route,
        Tag::ResBody,
        Tag::ReqHeaders,
        Tag::QueryStringParams,
        Tag::Status,
        Tag::Method,
        Tag::Pid,
        Tag::Latency,
        Tag::ResHeaders,
        Tag::ReqHeadersString,
        Tag::ReqBodyString,
        Tag::ResHeadersString,
        Tag::ResBodyString,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Tag::Referer => TAG_REFERER,
            Tag::Protocol => TAG_PROTOCOL,
            Tag::Port => TAG_PORT,
            Tag::Ip => TAG_IP,
            Tag::Ips => TAG_IPS,
            Tag::Host => TAG_HOST,
            Tag::Path => TAG_PATH,
            Tag::Url => TAG_URL,
            Tag::Ua => TAG_UA,
            Tag::ReqBody => TAG_REQ_BODY,
            Tag::BytesReceived => TAG_BYTES_RECEIVED,
            Tag::BytesSent => TAG_BYTES_SENT,
            Tag::Route => TAG_ROUTE,
            Tag::ResBody => TAG_RES_BODY,
            Tag::ReqHeaders => TAG_REQ_HEADERS,
            Tag::QueryStringParams => TAG_QUERY_STRING_PARAMS,
            Tag::Status => TAG_STATUS,
            Tag::Method => TAG_METHOD,
            Tag::Pid => TAG_PID,
            Tag::Latency => TAG_LATENCY,
            Tag::ResHeaders => TAG_RES_HEADERS,
            Tag::ReqHeadersString => TAG_REQ_HEADERS_STRING,
            Tag::ReqBodyString => TAG_REQ_BODY_STRING,
            Tag::ResHeadersString => TAG_RES_HEADERS_STRING,
            Tag::ResBodyString => TAG_RES_BODY_STRING,
        }
    }

    /// Whether the request body has to be buffered for this tag.
    pub(crate) fn reads_request_body(self) -> bool {
        matches!(
            self,
            Tag::ReqBody | Tag::ReqBodyString | Tag::BytesReceived
        )
    }

    /// Whether the response body has to be kept for this tag.
    pub(crate) fn reads_response_body(self) -> bool {
        matches!(self, Tag::ResBody | Tag::ResBodyString)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tag {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| UnknownTag(s.to_string()))
    }
}

/// Tags that select one item out of a multi-valued source.
///
/// Configured as `base:key`, see [`attach_key_tag`]. The log field carries the
/// base name only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyTag {
    ReqHeader,
    ResHeader,
    Query,
    Form,
    Cookie,
    Locals,
}

impl KeyTag {
    pub const ALL: [KeyTag; 6] = [
        KeyTag::ReqHeader,
        KeyTag::ResHeader,
        KeyTag::Query,
        KeyTag::Form,
        KeyTag::Cookie,
        KeyTag::Locals,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            KeyTag::ReqHeader => TAG_REQ_HEADER,
            KeyTag::ResHeader => TAG_RES_HEADER,
            KeyTag::Query => TAG_QUERY,
            KeyTag::Form => TAG_FORM,
            KeyTag::Cookie => TAG_COOKIE,
            KeyTag::Locals => TAG_LOCALS,
        }
    }

    /// Builds the `base:key` tag name for this base.
    pub fn attach(self, key: &str) -> String {
        attach_key_tag(self, key)
    }

    pub(crate) fn reads_request_body(self) -> bool {
        self == KeyTag::Form
    }
}

impl fmt::Display for KeyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyTag {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| UnknownTag(s.to_string()))
    }
}

/// Forms the name of a keyed tag: `"base:key"`.
///
/// ```
/// use actix_web_middleware_taglog::{KeyTag, attach_key_tag};
///
/// assert_eq!(attach_key_tag(KeyTag::Locals, "requestId"), "locals:requestId");
/// ```
pub fn attach_key_tag(base: KeyTag, key: &str) -> String {
    format!("{}{}{}", base.as_str(), SEPARATOR, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tag_names_round_trip() {
        for tag in Tag::ALL {
            assert_eq!(tag.as_str().parse::<Tag>(), Ok(tag));
            assert_eq!(tag.to_string(), tag.as_str());
        }
        for tag in KeyTag::ALL {
            assert_eq!(tag.as_str().parse::<KeyTag>(), Ok(tag));
        }
    }

    #[test]
    fn test_catalogues_are_disjoint() {
        let simple: HashSet<&str> = Tag::ALL.iter().map(|t| t.as_str()).collect();
        let keyed: HashSet<&str> = KeyTag::ALL.iter().map(|t| t.as_str()).collect();

        assert_eq!(simple.len(), Tag::ALL.len());
        assert_eq!(keyed.len(), KeyTag::ALL.len());
        assert!(simple.is_disjoint(&keyed));
        assert!(simple.iter().all(|name| !name.contains(SEPARATOR)));
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(
            "not-a-tag".parse::<Tag>(),
            Err(UnknownTag("not-a-tag".to_string()))
        );
        assert!("locals:loc".parse::<Tag>().is_err());
        assert!("Method".parse::<Tag>().is_err());
        assert_eq!(
            "nope".parse::<KeyTag>().unwrap_err().to_string(),
            "unknown tag `nope`"
        );
    }

    #[test]
    fn test_attach_key_tag() {
        assert_eq!(
            attach_key_tag(KeyTag::ResHeader, "custom-header"),
            "respHeader:custom-header"
        );
        assert_eq!(KeyTag::Cookie.attach("session"), "cookie:session");
        assert_eq!(KeyTag::Query.attach(""), "query:");
    }
}
