//! Domain objects carried as remote-call arguments.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A list, table, or profile extension addressed by folder and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractObject {
    pub folder_name: String,
    pub object_name: String,
}

impl InteractObject {
    #[must_use]
    pub fn new(folder_name: impl Into<String>, object_name: impl Into<String>) -> Self {
        Self {
            folder_name: folder_name.into(),
            object_name: object_name.into(),
        }
    }
}

/// Column used to look members up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryColumn {
    Riid,
    EmailAddress,
    CustomerId,
    MobileNumber,
    EmailMd5Hash,
    EmailSha256Hash,
}

impl QueryColumn {
    /// Remote column name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Riid => "RIID",
            Self::EmailAddress => "EMAIL_ADDRESS",
            Self::CustomerId => "CUSTOMER_ID",
            Self::MobileNumber => "MOBILE_NUMBER",
            Self::EmailMd5Hash => "EMAIL_MD5_HASH",
            Self::EmailSha256Hash => "EMAIL_SHA256_HASH",
        }
    }
}

/// Tabular record payload: one header row and any number of value rows.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordData {
    pub field_names: Vec<String>,
    pub records: Vec<Vec<String>>,
}

impl RecordData {
    /// Build from keyed rows. Columns are the union of all keys; missing
    /// cells become empty strings.
    #[must_use]
    pub fn from_rows(rows: &[BTreeMap<String, String>]) -> Self {
        let mut field_names: Vec<String> = rows.iter().flat_map(|r| r.keys().cloned()).collect();
        field_names.sort();
        field_names.dedup();

        let records = rows
            .iter()
            .map(|row| {
                field_names
                    .iter()
                    .map(|name| row.get(name).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();

        Self {
            field_names,
            records,
        }
    }

    /// Single-row payload from `(field, value)` pairs, in the given order.
    #[must_use]
    pub fn single<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let (field_names, row): (Vec<String>, Vec<String>) =
            pairs.into_iter().map(|(k, v)| (k.into(), v.into())).unzip();
        Self {
            field_names,
            records: vec![row],
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// What to do when a merged record matches an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateOnMatch {
    ReplaceAll,
    NoUpdate,
}

/// Permission status given to inserted records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionStatus {
    Optin,
    Optout,
}

/// Merge rule for list merges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMergeRule {
    pub insert_on_no_match: bool,
    pub update_on_match: UpdateOnMatch,
    pub match_column_name1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_column_name2: Option<String>,
    pub match_operator: String,
    pub optin_value: String,
    pub optout_value: String,
    pub html_value: String,
    pub text_value: String,
    pub reject_record_if_channel_empty: Option<String>,
    pub default_permission_status: PermissionStatus,
}

impl Default for ListMergeRule {
    fn default() -> Self {
        Self {
            insert_on_no_match: true,
            update_on_match: UpdateOnMatch::ReplaceAll,
            match_column_name1: "EMAIL_ADDRESS_".to_string(),
            match_column_name2: None,
            match_operator: "NONE".to_string(),
            optin_value: "I".to_string(),
            optout_value: "O".to_string(),
            html_value: "H".to_string(),
            text_value: "T".to_string(),
            reject_record_if_channel_empty: None,
            default_permission_status: PermissionStatus::Optin,
        }
    }
}
