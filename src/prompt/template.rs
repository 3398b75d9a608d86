//! Prompt templates rendered into role-tagged messages.
//!
//! ```text
//! SYSTEM: You are a librarian.
//! MESSAGES: {history}
//! USER: Recommend a {genre} book. Avoid these:
//! {read:list}
//! ```

use crate::types::Message;
use crate::utils::dedent;
use crate::{Error, ErrorContext, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

static ROLE_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(SYSTEM|USER|ASSISTANT|MESSAGES):[ \t]*").expect("valid role regex")
});

/// Value substituted into a template placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
    Text(String),
    /// Rendered one item per line.
    List(Vec<String>),
    /// Rendered as blocks of lines separated by a blank line.
    Table(Vec<Vec<String>>),
    /// Only valid after a `MESSAGES:` marker.
    Messages(Vec<Message>),
}

impl TemplateValue {
    fn to_json(&self) -> Value {
        match self {
            TemplateValue::Text(s) => Value::String(s.clone()),
            TemplateValue::List(items) => Value::from(items.clone()),
            TemplateValue::Table(rows) => {
                Value::Array(rows.iter().map(|r| Value::from(r.clone())).collect())
            }
            TemplateValue::Messages(msgs) => {
                serde_json::to_value(msgs).unwrap_or(Value::Null)
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            TemplateValue::Text(_) => "text",
            TemplateValue::List(_) => "list",
            TemplateValue::Table(_) => "table",
            TemplateValue::Messages(_) => "messages",
        }
    }
}

macro_rules! text_from {
    ($($t:ty),*) => {
        $(impl From<$t> for TemplateValue {
            fn from(v: $t) -> Self {
                TemplateValue::Text(v.to_string())
            }
        })*
    };
}

text_from!(&str, String, &String, i32, i64, u32, u64, usize, f32, f64, bool);

impl From<Vec<String>> for TemplateValue {
    fn from(v: Vec<String>) -> Self {
        TemplateValue::List(v)
    }
}

impl From<Vec<&str>> for TemplateValue {
    fn from(v: Vec<&str>) -> Self {
        TemplateValue::List(v.into_iter().map(String::from).collect())
    }
}

impl From<Vec<Vec<String>>> for TemplateValue {
    fn from(v: Vec<Vec<String>>) -> Self {
        TemplateValue::Table(v)
    }
}

impl From<Vec<Vec<&str>>> for TemplateValue {
    fn from(v: Vec<Vec<&str>>) -> Self {
        TemplateValue::Table(
            v.into_iter()
                .map(|row| row.into_iter().map(String::from).collect())
                .collect(),
        )
    }
}

impl From<Vec<Message>> for TemplateValue {
    fn from(v: Vec<Message>) -> Self {
        TemplateValue::Messages(v)
    }
}

/// Named template arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateArgs {
    values: BTreeMap<String, TemplateValue>,
}

impl TemplateArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<TemplateValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<TemplateValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&TemplateValue> {
        self.values.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values from `other` win on conflicts.
    pub fn extend(&mut self, other: &TemplateArgs) {
        for (k, v) in &other.values {
            self.values.insert(k.clone(), v.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TemplateValue)> {
        self.values.iter()
    }

    pub fn to_json(&self) -> Map<String, Value> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }
}

/// Build [`TemplateArgs`] from `name => value` pairs.
///
/// ```
/// let args = ai_call::template_args! { "genre" => "fantasy", "count" => 3 };
/// assert!(args.get("genre").is_some());
/// ```
#[macro_export]
macro_rules! template_args {
    () => { $crate::prompt::TemplateArgs::new() };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut args = $crate::prompt::TemplateArgs::new();
        $(args.insert($name, $value);)+
        args
    }};
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    source: String,
}

impl PromptTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render the template into messages.
    ///
    /// Without any role marker the whole template becomes one user message.
    pub fn render(&self, args: &TemplateArgs) -> Result<Vec<Message>> {
        let text = dedent(&self.source);
        let text = text.trim();

        let markers: Vec<_> = ROLE_MARKER.captures_iter(text).collect();
        if markers.is_empty() {
            return Ok(vec![Message::user(format_text(text, args)?)]);
        }

        let mut messages = Vec::new();
        let first_start = markers[0].get(0).map(|m| m.start()).unwrap_or(0);
        let preamble = text[..first_start].trim();
        if !preamble.is_empty() {
            messages.push(Message::user(format_text(preamble, args)?));
        }

        for (i, caps) in markers.iter().enumerate() {
            let (Some(whole), Some(role)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let end = markers
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map(|m| m.start())
                .unwrap_or(text.len());
            let body = dedent(&text[whole.end()..end]);
            let body = body.trim();

            match role.as_str() {
                "MESSAGES" => messages.extend(injected_messages(body, args)?),
                role => {
                    let content = format_text(body, args)?;
                    if content.trim().is_empty() {
                        continue;
                    }
                    messages.push(match role {
                        "SYSTEM" => Message::system(content),
                        "ASSISTANT" => Message::assistant(content),
                        _ => Message::user(content),
                    });
                }
            }
        }
        Ok(messages)
    }
}

fn injected_messages(body: &str, args: &TemplateArgs) -> Result<Vec<Message>> {
    let name = body
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.contains(['{', '}', ':']))
        .ok_or_else(|| {
            Error::template_with_context(
                "MESSAGES marker must be followed by a single placeholder",
                ErrorContext::new()
                    .with_details(body.to_string())
                    .with_source("prompt_template"),
            )
        })?;

    match args.get(name) {
        Some(TemplateValue::Messages(msgs)) => Ok(msgs.clone()),
        Some(other) => Err(Error::template_with_context(
            format!("`{}` must be a message list, got {}", name, other.kind()),
            ErrorContext::new()
                .with_field_path(name.to_string())
                .with_source("prompt_template"),
        )),
        None => Err(missing(name)),
    }
}

fn missing(name: &str) -> Error {
    Error::template_with_context(
        format!("missing template variable `{}`", name),
        ErrorContext::new()
            .with_field_path(name.to_string())
            .with_source("prompt_template"),
    )
}

/// Substitute `{name}`, `{name:list}` and `{name:lists}` placeholders.
/// `{{` and `}}` produce literal braces.
pub fn format_text(template: &str, args: &TemplateArgs) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                out.push('{');
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let rest = &template[i + 1..];
                let close = rest.find('}').ok_or_else(|| {
                    Error::template_with_context(
                        "unclosed `{` in template",
                        ErrorContext::new()
                            .with_details(format!("at byte {}", i))
                            .with_source("prompt_template"),
                    )
                })?;
                let placeholder = &rest[..close];
                out.push_str(&substitute(placeholder, args)?);
                for _ in 0..placeholder.chars().count() + 1 {
                    chars.next();
                }
            }
            '}' => {
                return Err(Error::template_with_context(
                    "single `}` in template; use `}}` for a literal brace",
                    ErrorContext::new()
                        .with_details(format!("at byte {}", i))
                        .with_source("prompt_template"),
                ))
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

fn substitute(placeholder: &str, args: &TemplateArgs) -> Result<String> {
    let (name, spec) = match placeholder.split_once(':') {
        Some((n, s)) => (n.trim(), Some(s.trim())),
        None => (placeholder.trim(), None),
    };
    let value = args.get(name).ok_or_else(|| missing(name))?;

    let wrong_kind = |expected: &str| {
        Error::template_with_context(
            format!("`{}` must be a {}, got {}", name, expected, value.kind()),
            ErrorContext::new()
                .with_field_path(name.to_string())
                .with_source("prompt_template"),
        )
    };

    match (spec, value) {
        (None, TemplateValue::Text(s)) => Ok(s.clone()),
        (None | Some("list"), TemplateValue::List(items)) => Ok(items.join("\n")),
        (Some("list"), TemplateValue::Text(s)) => Ok(s.clone()),
        (None | Some("lists"), TemplateValue::Table(rows)) => Ok(rows
            .iter()
            .map(|row| row.join("\n"))
            .collect::<Vec<_>>()
            .join("\n\n")),
        (Some("list"), _) => Err(wrong_kind("list")),
        (Some("lists"), _) => Err(wrong_kind("list of lists")),
        (None, TemplateValue::Messages(_)) => Err(wrong_kind("text value")),
        (Some(other), _) => Err(Error::template_with_context(
            format!("unknown format spec `{}`", other),
            ErrorContext::new()
                .with_field_path(name.to_string())
                .with_source("prompt_template"),
        )),
    }
}
