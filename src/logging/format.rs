use std::borrow::Cow;
use std::collections::BTreeMap;

use serde_json::Value;
use tracing::Subscriber;
use tracing_subscriber::fmt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use super::writer::SharedWriter;

/// Output layout of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `<timestamp> <LEVEL> <message> key=value ...`
    Text,
    /// One JSON object per line
    Structured,
}

impl Format {
    /// Parse a format name; anything other than `structured` is text.
    pub fn parse_lenient(name: &str) -> Format {
        match name.trim().to_lowercase().as_str() {
            "structured" => Format::Structured,
            _ => Format::Text,
        }
    }
}

/// Boxed formatting layer for `format`, writing whole lines to `writer`.
pub(crate) fn layer<S>(format: Format, writer: SharedWriter) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    match format {
        Format::Text => fmt::layer::<S>()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(false)
            .boxed(),
        Format::Structured => fmt::layer::<S>()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .with_target(false)
            .with_writer(writer)
            .boxed(),
    }
}

/// Message and optional `fields` value for one event.
///
/// Text lines carry the pairs after the message as `key=value`. Structured
/// lines carry them as a JSON object in the `fields` key.
pub(crate) fn render<'m>(
    format: Format,
    message: &'m str,
    fields: &BTreeMap<String, Value>,
) -> (Cow<'m, str>, Option<String>) {
    match format {
        Format::Text => {
            let message = escape_line_breaks(message);
            if fields.is_empty() {
                return (message, None);
            }
            let mut line = message.into_owned();
            for (key, value) in fields {
                line.push(' ');
                line.push_str(key);
                line.push('=');
                line.push_str(&text_value(value));
            }
            (Cow::Owned(line), None)
        }
        Format::Structured if fields.is_empty() => (Cow::Borrowed(message), None),
        Format::Structured => {
            let object: serde_json::Map<String, Value> = fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            (Cow::Borrowed(message), Some(Value::Object(object).to_string()))
        }
    }
}

// One record, one physical line
fn escape_line_breaks(message: &str) -> Cow<'_, str> {
    if message.contains(|c: char| c == '\n' || c == '\r') {
        Cow::Owned(message.replace('\r', "\\r").replace('\n', "\\n"))
    } else {
        Cow::Borrowed(message)
    }
}

fn text_value(value: &Value) -> String {
    match value {
        Value::String(s) if needs_quoting(s) => format!("{:?}", s),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn needs_quoting(s: &str) -> bool {
    s.is_empty() || s.chars().any(|c| c.is_whitespace() || c == '=' || c == '"')
}
