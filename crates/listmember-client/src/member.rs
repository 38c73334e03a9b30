//! Member-level helpers built on the dispatcher.

use listmember_core::{
    BuildError, Envelope, InteractObject, ListMergeRule, QueryColumn, RecordData, RemoteCall,
    RequestBuilder, ResponseInterpreter, Transport, interpreter::default_message,
};

use crate::Client;

/// Code returned when a call needs a RIID the member does not have.
pub const RIID_MISSING: &str = "riid_missing";

/// Code returned when a request could not be built.
pub const INVALID_REQUEST: &str = "invalid_request";

/// A list member, identified by email and optionally by RIID.
pub struct Member<'a, T: Transport, I: ResponseInterpreter> {
    client: &'a Client<T, I>,
    email: String,
    riid: Option<String>,
}

impl<T: Transport, I: ResponseInterpreter> Client<T, I> {
    /// Member handle bound to this client.
    #[must_use]
    pub fn member(&self, email: impl Into<String>, riid: Option<String>) -> Member<'_, T, I> {
        Member {
            client: self,
            email: email.into(),
            riid,
        }
    }
}

impl<T: Transport, I: ResponseInterpreter> Member<'_, T, I> {
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn riid(&self) -> Option<&str> {
        self.riid.as_deref()
    }

    /// Merge the member into `list`, matching on email and inserting when
    /// absent. The result carries the member's RIID.
    pub async fn add_to_list(&self, list: &InteractObject) -> Envelope<I::Output> {
        let records = RecordData::single([("EMAIL_ADDRESS_", self.email.as_str())]);
        let call = RequestBuilder::merge_list_members_riid(list, &records, &ListMergeRule::default());
        self.send(call).await
    }

    /// Fetch `fields` from a profile extension table.
    ///
    /// Needs a RIID; without one the call fails locally with
    /// `riid_missing` and nothing is sent.
    pub async fn retrieve_profile_extension(
        &self,
        extension: &InteractObject,
        fields: &[String],
    ) -> Envelope<I::Output> {
        let Some(riid) = &self.riid else {
            return Envelope::failure(RIID_MISSING, default_message(RIID_MISSING));
        };
        let call = RequestBuilder::retrieve_profile_extension_records(
            extension,
            QueryColumn::Riid,
            fields,
            std::slice::from_ref(riid),
        );
        self.send(call).await
    }

    /// Fetch `fields` for this member from `list`, by RIID when known and by
    /// email otherwise.
    pub async fn retrieve_from_list(
        &self,
        list: &InteractObject,
        fields: &[String],
    ) -> Envelope<I::Output> {
        let (column, id) = self.lookup_key();
        let call = RequestBuilder::retrieve_list_members(list, column, fields, &[id]);
        self.send(call).await
    }

    /// Remove this member from `list`.
    pub async fn remove_from_list(&self, list: &InteractObject) -> Envelope<I::Output> {
        let (column, id) = self.lookup_key();
        let call = RequestBuilder::delete_list_members(list, column, &[id]);
        self.send(call).await
    }

    fn lookup_key(&self) -> (QueryColumn, String) {
        self.riid.as_ref().map_or_else(
            || (QueryColumn::EmailAddress, self.email.clone()),
            |riid| (QueryColumn::Riid, riid.clone()),
        )
    }

    async fn send(&self, call: Result<RemoteCall, BuildError>) -> Envelope<I::Output> {
        match call {
            Ok(call) => self.client.call(&call).await,
            Err(e) => Envelope::failure(INVALID_REQUEST, e.to_string()),
        }
    }
}
