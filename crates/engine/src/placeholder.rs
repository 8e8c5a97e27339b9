//! Placeholder tokens in serialized templates, and the rewriter that
//! substitutes them.
//!
//! Recognized tokens:
//!
//! | token                      | value                                     |
//! |----------------------------|-------------------------------------------|
//! | `{{credential:<kind>}}`    | `{id, name}` of the resolved credential   |
//! | `{{credential:storage}}`   | same, for the selected storage backend    |
//! | `{{input:<field>}}`        | the user's field value                    |
//! | `{{webhook_path}}`         | the instance webhook path                 |
//! | `{{user_id}}`              | the deploying user                        |
//! | `{{template_id}}`          | the template being materialized           |
//!
//! A token may stand bare where a JSON value is expected, or sit inside a
//! string literal. Bare tokens become the value's JSON text; tokens inside
//! strings become its escaped string content, credentials contributing their
//! id. Service expressions such as `{{ $json.email }}` are not recognized and
//! pass through untouched.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::resolver::ResolvedCredentials;
use crate::{EngineError, UserInputs};

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{(credential|input|webhook_path|user_id|template_id)(?::([A-Za-z0-9_.\-]+))?\}\}")
        .expect("placeholder pattern is valid")
});

/// Argument of `{{credential:…}}` that refers to the selected storage backend.
pub const STORAGE_TOKEN_ARG: &str = "storage";

/// A recognized placeholder, borrowed from the text it was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    Credential(&'a str),
    Input(&'a str),
    WebhookPath,
    UserId,
    TemplateId,
    /// Recognized name with a missing or unexpected argument.
    Malformed(&'a str),
}

impl<'a> Token<'a> {
    fn from_captures(caps: &Captures<'a>) -> Self {
        let whole = caps.get(0).map_or("", |m| m.as_str());
        let name = caps.get(1).map_or("", |m| m.as_str());
        let arg = caps.get(2).map(|m| m.as_str());

        match (name, arg) {
            ("credential", Some(arg)) => Self::Credential(arg),
            ("input", Some(arg)) => Self::Input(arg),
            ("webhook_path", None) => Self::WebhookPath,
            ("user_id", None) => Self::UserId,
            ("template_id", None) => Self::TemplateId,
            _ => Self::Malformed(whole),
        }
    }
}

/// Supplies the value of each token during rewriting.
pub trait PlaceholderValues {
    fn value(&self, token: Token<'_>) -> Option<Value>;
}

// ---------------------------------------------------------------------------
// Scanning
// ---------------------------------------------------------------------------

/// Walks JSON-ish text tracking whether a byte offset falls inside a string
/// literal. Offsets must be visited in increasing order.
struct StringTracker<'a> {
    bytes: &'a [u8],
    pos: usize,
    in_string: bool,
    escaped: bool,
}

impl<'a> StringTracker<'a> {
    fn new(text: &'a str) -> Self {
        Self { bytes: text.as_bytes(), pos: 0, in_string: false, escaped: false }
    }

    fn in_string_at(&mut self, offset: usize) -> bool {
        while self.pos < offset {
            let b = self.bytes[self.pos];
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                }
            } else if b == b'"' {
                self.in_string = true;
            }
            self.pos += 1;
        }
        self.in_string
    }
}

/// Every recognized token left in `text`, in order of appearance.
pub fn find_tokens(text: &str) -> Vec<String> {
    TOKEN.find_iter(text).map(|m| m.as_str().to_owned()).collect()
}

/// Distinct `{{input:…}}` field names, in order of first appearance.
pub fn input_fields(text: &str) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    for caps in TOKEN.captures_iter(text) {
        if let Token::Input(field) = Token::from_captures(&caps) {
            if !fields.iter().any(|f| f == field) {
                fields.push(field.to_owned());
            }
        }
    }
    fields
}

/// Arguments of every `{{credential:…}}` token, in order of appearance.
pub fn credential_args(text: &str) -> Vec<String> {
    TOKEN
        .captures_iter(text)
        .filter_map(|caps| match Token::from_captures(&caps) {
            Token::Credential(arg) => Some(arg.to_owned()),
            _ => None,
        })
        .collect()
}

/// Wrap bare tokens in quotes so the text parses before anything is resolved.
///
/// Tokens already inside strings are left alone.
pub fn quote_bare_tokens(text: &str) -> String {
    let mut tracker = StringTracker::new(text);
    let mut out = String::with_capacity(text.len() + 16);
    let mut last = 0;

    for m in TOKEN.find_iter(text) {
        out.push_str(&text[last..m.start()]);
        if tracker.in_string_at(m.start()) {
            out.push_str(m.as_str());
        } else {
            out.push('"');
            out.push_str(m.as_str());
            out.push('"');
        }
        last = m.end();
    }
    out.push_str(&text[last..]);
    out
}

// ---------------------------------------------------------------------------
// Rewriting
// ---------------------------------------------------------------------------

/// Substitute every recognized token in `text`.
///
/// # Errors
/// [`EngineError::Consistency`] if a token has no value, or if a recognized
/// token is still present after substitution (a value smuggled one in).
pub fn rewrite(text: &str, values: &impl PlaceholderValues) -> Result<String, EngineError> {
    let mut tracker = StringTracker::new(text);
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for caps in TOKEN.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let token = Token::from_captures(&caps);
        let value = values.value(token).ok_or_else(|| {
            EngineError::Consistency(format!("placeholder {} has no resolved value", whole.as_str()))
        })?;

        out.push_str(&text[last..whole.start()]);
        out.push_str(&render(&value, tracker.in_string_at(whole.start())));
        last = whole.end();
    }
    out.push_str(&text[last..]);

    let leftover = find_tokens(&out);
    if !leftover.is_empty() {
        return Err(EngineError::Consistency(format!(
            "placeholders survived rewriting: {}",
            leftover.join(", ")
        )));
    }

    Ok(out)
}

fn render(value: &Value, in_string: bool) -> String {
    if !in_string {
        return value.to_string();
    }

    let content = match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("id").and_then(Value::as_str) {
            Some(id) => id.to_owned(),
            None => value.to_string(),
        },
        other => other.to_string(),
    };

    // JSON-escape, then drop the surrounding quotes.
    let quoted = Value::String(content).to_string();
    quoted[1..quoted.len() - 1].to_owned()
}

/// Values available to one materialization run.
pub struct RewriteContext<'a> {
    pub resolved: &'a ResolvedCredentials,
    pub inputs: &'a UserInputs,
    pub webhook_path: &'a str,
    pub user_id: &'a str,
    pub template_id: &'a str,
}

impl PlaceholderValues for RewriteContext<'_> {
    fn value(&self, token: Token<'_>) -> Option<Value> {
        match token {
            Token::Credential(arg) => {
                let credential = if arg == STORAGE_TOKEN_ARG {
                    self.resolved.storage_credential()?
                } else {
                    self.resolved.any_scope(arg.parse().ok()?)?
                };
                serde_json::to_value(credential.reference()).ok()
            }
            Token::Input(field) => self.inputs.value(field).cloned(),
            Token::WebhookPath => Some(Value::from(self.webhook_path)),
            Token::UserId => Some(Value::from(self.user_id)),
            Token::TemplateId => Some(Value::from(self.template_id)),
            Token::Malformed(_) => None,
        }
    }
}
