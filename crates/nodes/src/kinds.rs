//! Credential kinds, requirement scopes and the raw fields each kind can be
//! provisioned from.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::CatalogError;

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Who ultimately backs a credential requirement.
///
/// `Admin` requirements fall back to a system-owned shared credential when
/// the deploying user has none; `User` requirements never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Admin,
    User,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::User => write!(f, "user"),
        }
    }
}

// ---------------------------------------------------------------------------
// CredentialKind
// ---------------------------------------------------------------------------

/// The category of external secret a node needs.
///
/// The serialized form is the automation service's credential type key, which
/// is also the key under which a node stores its credential reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CredentialKind {
    #[serde(rename = "smtp")]
    Smtp,
    #[serde(rename = "imap")]
    Imap,
    #[serde(rename = "openAiApi")]
    OpenAiApi,
    #[serde(rename = "gmailOAuth2")]
    GmailOAuth2,
    #[serde(rename = "googleSheetsOAuth2Api")]
    GoogleSheetsOAuth2,
    #[serde(rename = "airtableTokenApi")]
    AirtableToken,
    #[serde(rename = "notionApi")]
    NotionApi,
    #[serde(rename = "postgres")]
    Postgres,
    #[serde(rename = "slackApi")]
    SlackApi,
    #[serde(rename = "telegramApi")]
    TelegramApi,
    #[serde(rename = "httpHeaderAuth")]
    HttpHeaderAuth,
}

/// How a raw input value is coerced into the credential's data document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Port,
    Flag,
}

/// One raw field a provisionable kind is created from.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Suffix of the user input name (`<prefix>_<suffix>`).
    pub suffix: &'static str,
    /// Key inside the credential data document.
    pub data_key: &'static str,
    pub field_type: FieldType,
    /// Used when the field is absent; `None` makes the field mandatory.
    pub default: Option<&'static str>,
}

const fn required(suffix: &'static str, data_key: &'static str) -> FieldSpec {
    FieldSpec { suffix, data_key, field_type: FieldType::Text, default: None }
}

const fn optional(
    suffix: &'static str,
    data_key: &'static str,
    field_type: FieldType,
    default: &'static str,
) -> FieldSpec {
    FieldSpec { suffix, data_key, field_type, default: Some(default) }
}

const SMTP_FIELDS: &[FieldSpec] = &[
    required("user", "user"),
    required("password", "password"),
    required("host", "host"),
    optional("port", "port", FieldType::Port, "465"),
    optional("secure", "secure", FieldType::Flag, "true"),
];

const IMAP_FIELDS: &[FieldSpec] = &[
    required("user", "user"),
    required("password", "password"),
    required("host", "host"),
    optional("port", "port", FieldType::Port, "993"),
    optional("secure", "secure", FieldType::Flag, "true"),
];

const POSTGRES_FIELDS: &[FieldSpec] = &[
    required("host", "host"),
    required("database", "database"),
    required("user", "user"),
    required("password", "password"),
    optional("port", "port", FieldType::Port, "5432"),
    optional("ssl", "ssl", FieldType::Text, "disable"),
];

const API_KEY_FIELDS: &[FieldSpec] = &[required("api_key", "apiKey")];
const ACCESS_TOKEN_FIELDS: &[FieldSpec] = &[required("access_token", "accessToken")];
const HEADER_FIELDS: &[FieldSpec] = &[required("name", "name"), required("value", "value")];

/// Outcome of trying to build a credential data document from raw fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Provisioning {
    /// Every mandatory field was present; ready for `createCredential`.
    Complete(Value),
    /// Input names of the mandatory fields that were absent.
    Missing(Vec<String>),
    /// A field was present but could not be coerced.
    Invalid { field: String, message: String },
    /// The kind is only obtainable through an authorization flow.
    NotProvisionable,
}

impl CredentialKind {
    pub const ALL: [CredentialKind; 11] = [
        Self::Smtp,
        Self::Imap,
        Self::OpenAiApi,
        Self::GmailOAuth2,
        Self::GoogleSheetsOAuth2,
        Self::AirtableToken,
        Self::NotionApi,
        Self::Postgres,
        Self::SlackApi,
        Self::TelegramApi,
        Self::HttpHeaderAuth,
    ];

    /// Credential type key used by the automation service.
    pub fn type_key(self) -> &'static str {
        match self {
            Self::Smtp => "smtp",
            Self::Imap => "imap",
            Self::OpenAiApi => "openAiApi",
            Self::GmailOAuth2 => "gmailOAuth2",
            Self::GoogleSheetsOAuth2 => "googleSheetsOAuth2Api",
            Self::AirtableToken => "airtableTokenApi",
            Self::NotionApi => "notionApi",
            Self::Postgres => "postgres",
            Self::SlackApi => "slackApi",
            Self::TelegramApi => "telegramApi",
            Self::HttpHeaderAuth => "httpHeaderAuth",
        }
    }

    /// Prefix of every user input field that concerns this kind.
    pub fn input_prefix(self) -> &'static str {
        match self {
            Self::Smtp => "smtp",
            Self::Imap => "imap",
            Self::OpenAiApi => "openai",
            Self::GmailOAuth2 => "gmail",
            Self::GoogleSheetsOAuth2 => "google_sheets",
            Self::AirtableToken => "airtable",
            Self::NotionApi => "notion",
            Self::Postgres => "postgres",
            Self::SlackApi => "slack",
            Self::TelegramApi => "telegram",
            Self::HttpHeaderAuth => "http_header",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Smtp => "SMTP account",
            Self::Imap => "IMAP account",
            Self::OpenAiApi => "OpenAI account",
            Self::GmailOAuth2 => "Gmail account",
            Self::GoogleSheetsOAuth2 => "Google Sheets account",
            Self::AirtableToken => "Airtable token",
            Self::NotionApi => "Notion account",
            Self::Postgres => "Postgres account",
            Self::SlackApi => "Slack account",
            Self::TelegramApi => "Telegram bot",
            Self::HttpHeaderAuth => "Header auth",
        }
    }

    /// Raw fields the kind can be created from; empty for OAuth-only kinds.
    pub fn fields(self) -> &'static [FieldSpec] {
        match self {
            Self::Smtp => SMTP_FIELDS,
            Self::Imap => IMAP_FIELDS,
            Self::Postgres => POSTGRES_FIELDS,
            Self::OpenAiApi | Self::NotionApi => API_KEY_FIELDS,
            Self::AirtableToken | Self::SlackApi | Self::TelegramApi => ACCESS_TOKEN_FIELDS,
            Self::HttpHeaderAuth => HEADER_FIELDS,
            Self::GmailOAuth2 | Self::GoogleSheetsOAuth2 => &[],
        }
    }

    pub fn is_provisionable(self) -> bool {
        !self.fields().is_empty()
    }

    /// Input field carrying a direct external credential id.
    pub fn override_field(self) -> String {
        format!("{}_credential_id", self.input_prefix())
    }

    /// Input field carrying the display name for a direct override.
    pub fn override_name_field(self) -> String {
        format!("{}_credential_name", self.input_prefix())
    }

    /// Input field flagging an authorization that has just completed.
    pub fn connected_field(self) -> String {
        format!("{}_connected", self.input_prefix())
    }

    /// Build the credential data document from raw fields.
    ///
    /// `lookup` receives full input names (`smtp_host`) and returns the value
    /// if the caller supplied a non-empty one.
    pub fn provision<F>(self, lookup: F) -> Provisioning
    where
        F: Fn(&str) -> Option<String>,
    {
        let fields = self.fields();
        if fields.is_empty() {
            return Provisioning::NotProvisionable;
        }

        let mut data = Map::new();
        let mut missing = Vec::new();

        for spec in fields {
            let input = format!("{}_{}", self.input_prefix(), spec.suffix);
            let raw = match lookup(&input).or_else(|| spec.default.map(str::to_owned)) {
                Some(raw) => raw,
                None => {
                    missing.push(input);
                    continue;
                }
            };

            let value = match coerce(spec.field_type, &raw) {
                Ok(value) => value,
                Err(message) => return Provisioning::Invalid { field: input, message },
            };
            data.insert(spec.data_key.to_owned(), value);
        }

        if missing.is_empty() {
            Provisioning::Complete(Value::Object(data))
        } else {
            Provisioning::Missing(missing)
        }
    }
}

fn coerce(field_type: FieldType, raw: &str) -> Result<Value, String> {
    match field_type {
        FieldType::Text => Ok(Value::String(raw.to_owned())),
        FieldType::Port => raw
            .trim()
            .parse::<u16>()
            .map(Value::from)
            .map_err(|_| format!("'{raw}' is not a valid port")),
        FieldType::Flag => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Ok(Value::Bool(true)),
            "false" | "no" | "0" | "off" => Ok(Value::Bool(false)),
            _ => Err(format!("'{raw}' is not a boolean")),
        },
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_key())
    }
}

impl FromStr for CredentialKind {
    type Err = CatalogError;

    /// Accepts either the type key (`openAiApi`) or the input prefix (`openai`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.type_key() == s || kind.input_prefix() == s)
            .ok_or_else(|| CatalogError::UnknownCredentialKind(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn inputs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn smtp_is_provisioned_with_defaults() {
        let fields = inputs(&[
            ("smtp_user", "alice"),
            ("smtp_password", "hunter2"),
            ("smtp_host", "mail.example.com"),
        ]);

        let provisioning = CredentialKind::Smtp.provision(|name| fields.get(name).cloned());

        let Provisioning::Complete(data) = provisioning else {
            panic!("expected complete provisioning, got {provisioning:?}");
        };
        assert_eq!(data["host"], "mail.example.com");
        assert_eq!(data["port"], 465);
        assert_eq!(data["secure"], true);
    }

    #[test]
    fn missing_mandatory_fields_are_named_by_input() {
        let fields = inputs(&[("postgres_host", "db.internal")]);

        let provisioning = CredentialKind::Postgres.provision(|name| fields.get(name).cloned());

        assert_eq!(
            provisioning,
            Provisioning::Missing(vec![
                "postgres_database".into(),
                "postgres_user".into(),
                "postgres_password".into(),
            ])
        );
    }

    #[test]
    fn bad_port_is_invalid() {
        let fields = inputs(&[
            ("imap_user", "bob"),
            ("imap_password", "pw"),
            ("imap_host", "imap.example.com"),
            ("imap_port", "ninety"),
        ]);

        let provisioning = CredentialKind::Imap.provision(|name| fields.get(name).cloned());
        assert!(matches!(provisioning, Provisioning::Invalid { field, .. } if field == "imap_port"));
    }

    #[test]
    fn oauth_kinds_are_not_provisionable() {
        assert_eq!(
            CredentialKind::GmailOAuth2.provision(|_| Some("x".into())),
            Provisioning::NotProvisionable
        );
        assert!(!CredentialKind::GoogleSheetsOAuth2.is_provisionable());
    }

    #[test]
    fn kinds_parse_from_type_key_or_prefix() {
        assert_eq!("openAiApi".parse::<CredentialKind>().unwrap(), CredentialKind::OpenAiApi);
        assert_eq!("openai".parse::<CredentialKind>().unwrap(), CredentialKind::OpenAiApi);
        assert!(matches!(
            "fax".parse::<CredentialKind>(),
            Err(CatalogError::UnknownCredentialKind(k)) if k == "fax"
        ));
    }

    #[test]
    fn serde_uses_type_key() {
        let json = serde_json::to_string(&CredentialKind::GoogleSheetsOAuth2).unwrap();
        assert_eq!(json, "\"googleSheetsOAuth2Api\"");
    }
}
