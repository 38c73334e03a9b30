//! Typed remote operations and the request builder.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::object::{InteractObject, ListMergeRule, QueryColumn, RecordData};

/// Remote operations the client knows how to route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    MergeListMembers,
    #[serde(rename = "mergeListMembersRIID")]
    MergeListMembersRiid,
    RetrieveListMembers,
    DeleteListMembers,
    RetrieveProfileExtensionRecords,
    MergeIntoProfileExtension,
}

impl Operation {
    /// Remote method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MergeListMembers => "mergeListMembers",
            Self::MergeListMembersRiid => "mergeListMembersRIID",
            Self::RetrieveListMembers => "retrieveListMembers",
            Self::DeleteListMembers => "deleteListMembers",
            Self::RetrieveProfileExtensionRecords => "retrieveProfileExtensionRecords",
            Self::MergeIntoProfileExtension => "mergeIntoProfileExtension",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named argument of a remote call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteArg {
    pub name: String,
    pub value: Value,
}

/// A fully built remote call: operation plus ordered arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCall {
    pub operation: Operation,
    pub args: Vec<RemoteArg>,
}

impl RemoteCall {
    #[must_use]
    pub const fn new(operation: Operation) -> Self {
        Self {
            operation,
            args: Vec::new(),
        }
    }

    /// Append an argument.
    ///
    /// # Errors
    /// Returns an error if the value cannot be serialized.
    pub fn arg<T: Serialize>(mut self, name: &str, value: &T) -> Result<Self, BuildError> {
        self.args.push(RemoteArg {
            name: name.to_string(),
            value: serde_json::to_value(value)?,
        });
        Ok(self)
    }

    /// Look an argument up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.args.iter().find(|a| a.name == name).map(|a| &a.value)
    }
}

/// Request builder error.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("record data has no rows")]
    EmptyRecords,
    #[error("no lookup ids given")]
    EmptyIds,
    #[error("no fields requested")]
    EmptyFields,
    #[error("argument serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Builds typed remote calls from domain intents.
///
/// Every call leaving the builder names an [`Operation`]; free-form method
/// names never reach the dispatcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestBuilder;

impl RequestBuilder {
    /// Merge records into a list, matching on the rule's columns.
    ///
    /// # Errors
    /// Returns an error if `records` is empty.
    pub fn merge_list_members(
        list: &InteractObject,
        records: &RecordData,
        rule: &ListMergeRule,
    ) -> Result<RemoteCall, BuildError> {
        Self::merge(Operation::MergeListMembers, list, records, rule)
    }

    /// Same as [`Self::merge_list_members`], answering with the RIIDs.
    ///
    /// # Errors
    /// Returns an error if `records` is empty.
    pub fn merge_list_members_riid(
        list: &InteractObject,
        records: &RecordData,
        rule: &ListMergeRule,
    ) -> Result<RemoteCall, BuildError> {
        Self::merge(Operation::MergeListMembersRiid, list, records, rule)
    }

    /// Fetch members of a list by id.
    ///
    /// # Errors
    /// Returns an error if `fields` or `ids` is empty.
    pub fn retrieve_list_members(
        list: &InteractObject,
        query_column: QueryColumn,
        fields: &[String],
        ids: &[String],
    ) -> Result<RemoteCall, BuildError> {
        Self::retrieve(Operation::RetrieveListMembers, list, query_column, fields, ids)
    }

    /// Delete members from a list by id.
    ///
    /// # Errors
    /// Returns an error if `ids` is empty.
    pub fn delete_list_members(
        list: &InteractObject,
        query_column: QueryColumn,
        ids: &[String],
    ) -> Result<RemoteCall, BuildError> {
        if ids.is_empty() {
            return Err(BuildError::EmptyIds);
        }
        RemoteCall::new(Operation::DeleteListMembers)
            .arg("list", list)?
            .arg("queryColumn", &query_column)?
            .arg("idsToDelete", &ids)
    }

    /// Fetch profile extension fields by id.
    ///
    /// # Errors
    /// Returns an error if `fields` or `ids` is empty.
    pub fn retrieve_profile_extension_records(
        extension: &InteractObject,
        query_column: QueryColumn,
        fields: &[String],
        ids: &[String],
    ) -> Result<RemoteCall, BuildError> {
        Self::retrieve(
            Operation::RetrieveProfileExtensionRecords,
            extension,
            query_column,
            fields,
            ids,
        )
    }

    /// Merge records into a profile extension.
    ///
    /// # Errors
    /// Returns an error if `records` is empty.
    pub fn merge_into_profile_extension(
        extension: &InteractObject,
        records: &RecordData,
        match_column: QueryColumn,
        insert_on_no_match: bool,
    ) -> Result<RemoteCall, BuildError> {
        if records.is_empty() {
            return Err(BuildError::EmptyRecords);
        }
        RemoteCall::new(Operation::MergeIntoProfileExtension)
            .arg("profileExtension", extension)?
            .arg("recordData", records)?
            .arg("matchColumn", &match_column)?
            .arg("insertOnNoMatch", &insert_on_no_match)?
            .arg("updateOnMatch", &"REPLACE_ALL")
    }

    fn merge(
        operation: Operation,
        list: &InteractObject,
        records: &RecordData,
        rule: &ListMergeRule,
    ) -> Result<RemoteCall, BuildError> {
        if records.is_empty() {
            return Err(BuildError::EmptyRecords);
        }
        RemoteCall::new(operation)
            .arg("list", list)?
            .arg("recordData", records)?
            .arg("mergeRule", rule)
    }

    fn retrieve(
        operation: Operation,
        target: &InteractObject,
        query_column: QueryColumn,
        fields: &[String],
        ids: &[String],
    ) -> Result<RemoteCall, BuildError> {
        if fields.is_empty() {
            return Err(BuildError::EmptyFields);
        }
        if ids.is_empty() {
            return Err(BuildError::EmptyIds);
        }
        let target_name = match operation {
            Operation::RetrieveProfileExtensionRecords => "profileExtension",
            _ => "list",
        };
        RemoteCall::new(operation)
            .arg(target_name, target)?
            .arg("queryColumn", &query_column)?
            .arg("fieldList", &fields)?
            .arg("idsToRetrieve", &ids)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn list() -> InteractObject {
        InteractObject::new("folder", "newsletter")
    }

    #[test]
    fn test_merge_args_are_ordered() {
        let records = RecordData::single([("EMAIL_ADDRESS_", "a@example.test")]);
        let call =
            RequestBuilder::merge_list_members_riid(&list(), &records, &ListMergeRule::default())
                .unwrap();

        assert_eq!(call.operation, Operation::MergeListMembersRiid);
        let names: Vec<&str> = call.args.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["list", "recordData", "mergeRule"]);
        assert_eq!(
            call.get("list"),
            Some(&json!({"folderName": "folder", "objectName": "newsletter"}))
        );
    }

    #[test]
    fn test_empty_inputs_rejected() {
        let empty = RecordData::default();
        assert!(matches!(
            RequestBuilder::merge_list_members(&list(), &empty, &ListMergeRule::default()),
            Err(BuildError::EmptyRecords)
        ));
        assert!(matches!(
            RequestBuilder::retrieve_list_members(
                &list(),
                QueryColumn::Riid,
                &["RIID_".to_string()],
                &[]
            ),
            Err(BuildError::EmptyIds)
        ));
        assert!(matches!(
            RequestBuilder::retrieve_list_members(&list(), QueryColumn::Riid, &[], &["1".into()]),
            Err(BuildError::EmptyFields)
        ));
    }

    #[test]
    fn test_profile_extension_target_name() {
        let call = RequestBuilder::retrieve_profile_extension_records(
            &InteractObject::new("folder", "pets"),
            QueryColumn::Riid,
            &["MONTHLY_PURCH".to_string()],
            &["42".to_string()],
        )
        .unwrap();
        assert!(call.get("profileExtension").is_some());
        assert_eq!(call.get("queryColumn"), Some(&json!("RIID")));
        assert_eq!(call.operation.to_string(), "retrieveProfileExtensionRecords");
    }
}
