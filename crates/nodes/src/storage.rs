//! `StorageChoice`: the user-selectable backing store of a generic
//! data-store node.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{CatalogError, CredentialKind};

/// Input field that carries the user's storage selection.
pub const STORAGE_SELECTOR_FIELD: &str = "storage_backend";

/// Node type a template uses for "write to whichever store the user picks".
pub const DATA_STORE_NODE_TYPE: &str = "template.dataStore";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageChoice {
    GoogleSheets,
    Airtable,
    Notion,
    Postgres,
}

impl StorageChoice {
    pub const ALL: [StorageChoice; 4] =
        [Self::GoogleSheets, Self::Airtable, Self::Notion, Self::Postgres];

    /// Selector value as typed by the user.
    pub fn value(self) -> &'static str {
        match self {
            Self::GoogleSheets => "google_sheets",
            Self::Airtable => "airtable",
            Self::Notion => "notion",
            Self::Postgres => "postgres",
        }
    }

    pub fn kind(self) -> CredentialKind {
        match self {
            Self::GoogleSheets => CredentialKind::GoogleSheetsOAuth2,
            Self::Airtable => CredentialKind::AirtableToken,
            Self::Notion => CredentialKind::NotionApi,
            Self::Postgres => CredentialKind::Postgres,
        }
    }

    /// Concrete node type the generic data-store node becomes.
    pub fn node_type(self) -> &'static str {
        match self {
            Self::GoogleSheets => "n8n-nodes-base.googleSheets",
            Self::Airtable => "n8n-nodes-base.airtable",
            Self::Notion => "n8n-nodes-base.notion",
            Self::Postgres => "n8n-nodes-base.postgres",
        }
    }

    pub fn type_version(self) -> f64 {
        match self {
            Self::GoogleSheets => 4.5,
            Self::Airtable => 2.1,
            Self::Notion => 2.2,
            Self::Postgres => 2.5,
        }
    }
}

impl fmt::Display for StorageChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}

impl FromStr for StorageChoice {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|choice| choice.value() == wanted)
            .ok_or_else(|| CatalogError::UnknownStorageChoice(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_values_are_forgiving() {
        assert_eq!("Google Sheets".parse::<StorageChoice>().unwrap(), StorageChoice::GoogleSheets);
        assert_eq!("airtable".parse::<StorageChoice>().unwrap(), StorageChoice::Airtable);
        assert!("mysql".parse::<StorageChoice>().is_err());
    }

    #[test]
    fn each_choice_maps_to_its_own_kind() {
        let kinds: Vec<_> = StorageChoice::ALL.iter().map(|c| c.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                CredentialKind::GoogleSheetsOAuth2,
                CredentialKind::AirtableToken,
                CredentialKind::NotionApi,
                CredentialKind::Postgres,
            ]
        );
    }
}
