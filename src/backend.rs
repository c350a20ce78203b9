use std::{cell::RefCell, io::Write};

use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::value::TagValue;

/// Message attached to every access log line.
pub const MESSAGE: &str = "access log";

/// Receives the fields of one finished request.
pub trait Backend {
    fn emit(&self, level: log::Level, target: &str, fields: &[(&'static str, TagValue)]);
}

/// Emits through the `log` facade, fields attached as key-values.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustLog;

impl Backend for RustLog {
    fn emit(&self, level: log::Level, target: &str, fields: &[(&'static str, TagValue)]) {
        if level > log::max_level() {
            return;
        }

        let kvs: Vec<(&str, log::kv::Value)> = fields
            .iter()
            .map(|(k, v)| (*k, log::kv::ToValue::to_value(v)))
            .collect();
        let kvs = kvs.as_slice();

        log::logger().log(
            &log::Record::builder()
                .args(format_args!("{MESSAGE}"))
                .level(level)
                .target(target)
                .module_path_static(Some(module_path!()))
                .file_static(Some(file!()))
                .line(Some(line!()))
                .key_values(&kvs)
                .build(),
        );
    }
}

/// Writes one logfmt line per request to an output sink.
///
/// ```text
/// time=2024-05-01T10:00:00Z level=info msg="access log" method=GET status=200 locals=val
/// ```
///
/// Values made only of letters, digits and `-._/@^+` are written bare, anything
/// else is quoted. Write errors are dropped.
pub struct Logfmt<W: Write> {
    out: RefCell<W>,
}

impl<W: Write> Logfmt<W> {
    pub fn new(out: W) -> Self {
        Logfmt {
            out: RefCell::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn render(&self, level: log::Level, fields: &[(&'static str, TagValue)]) -> String {
        let time = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        let mut line = format!(
            "time={} level={} msg={}",
            quote(&time),
            level.as_str().to_lowercase(),
            quote(MESSAGE)
        );

        for (key, value) in fields {
            line.push(' ');
            line.push_str(key);
            line.push('=');
            match value {
                TagValue::Null => line.push_str("null"),
                TagValue::Int(n) => line.push_str(&n.to_string()),
                value => line.push_str(&quote(&value.to_string())),
            }
        }
        line.push('\n');
        line
    }
}

impl<W: Write> Backend for Logfmt<W> {
    fn emit(&self, level: log::Level, _target: &str, fields: &[(&'static str, TagValue)]) {
        let line = self.render(level, fields);
        let mut out = self.out.borrow_mut();
        if let Err(err) = out.write_all(line.as_bytes()).and_then(|()| out.flush()) {
            log::debug!("Failed to write access log: {}", err);
        }
    }
}

fn needs_quoting(text: &str) -> bool {
    text.chars().any(|c| {
        !(c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '/' | '@' | '^' | '+'))
    })
}

fn quote(text: &str) -> String {
    if needs_quoting(text) {
        format!("{text:?}")
    } else {
        text.to_string()
    }
}
