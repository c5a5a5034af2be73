//! Flattened inputs of the persist and delete protocols.

use crate::error::{CoreError, CoreResult};
use crate::record::keys::{Keys, RESERVED_IDS, SEPARATOR};
use crate::types::RecordId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything needed to create or update one record.
///
/// The caller has already flattened the record: every attribute value is a
/// string, indexed fields list every value to index under, and each unique
/// field names the single value that must be unique within the namespace.
///
/// # Example
///
/// ```rust
/// use kvmodel_core::PersistRequest;
///
/// let request = PersistRequest::new("User")
///     .attribute("name", "Alice")
///     .attribute("email", "a@x.com")
///     .index("name", ["Alice"])
///     .unique("email", "a@x.com");
/// assert!(request.id.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistRequest {
    /// Record type name, e.g. `"User"`.
    pub namespace: String,
    /// Existing id; `None` allocates the next id from the namespace sequence.
    #[serde(default)]
    pub id: Option<RecordId>,
    /// Attribute name/value pairs. Empty values are not stored.
    #[serde(default)]
    pub attributes: Vec<(String, String)>,
    /// Field -> values the record is indexed under.
    #[serde(default)]
    pub indices: BTreeMap<String, Vec<String>>,
    /// Field -> value that must be unique within the namespace.
    #[serde(default)]
    pub uniques: BTreeMap<String, String>,
}

impl PersistRequest {
    /// Creates an empty request for `namespace`.
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Targets an existing (or caller-chosen) id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<RecordId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Adds an attribute.
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Adds a boolean attribute: stored as `"true"` when set, omitted
    /// otherwise.
    #[must_use]
    pub fn flag(self, name: impl Into<String>, value: bool) -> Self {
        if value {
            self.attribute(name, "true")
        } else {
            self
        }
    }

    /// Indexes the record under each of `values` for `field`.
    #[must_use]
    pub fn index<I, V>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.indices
            .entry(field.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Requires `value` to be unique for `field` within the namespace.
    #[must_use]
    pub fn unique(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.uniques.insert(field.into(), value.into());
        self
    }

    /// Checks that the request can be mapped onto keys without collisions.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` on an empty or `:`-containing namespace, a
    /// malformed id, an empty attribute name, or an empty or
    /// `:`-containing index/unique field name.
    pub fn validate(&self) -> CoreResult<()> {
        validate_namespace(&self.namespace)?;
        if let Some(id) = &self.id {
            validate_id(id)?;
        }
        if self.attributes.iter().any(|(name, _)| name.is_empty()) {
            return Err(CoreError::invalid_request("attribute name is empty"));
        }
        for field in self.indices.keys().chain(self.uniques.keys()) {
            validate_field(field)?;
        }
        Ok(())
    }

    /// Keys whose concurrent modification should abort a transaction that
    /// persists this record.
    #[must_use]
    pub fn watch_keys(&self) -> Vec<String> {
        let keys = Keys::new(&self.namespace);
        let mut watched: Vec<String> = self.uniques.keys().map(|f| keys.unique(f)).collect();
        if let Some(id) = &self.id {
            watched.push(keys.record(id));
            watched.push(keys.tracked_indices(id));
            watched.push(keys.tracked_uniques(id));
        }
        watched
    }
}

/// Everything needed to delete one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequest {
    /// Record type name.
    pub namespace: String,
    /// Id of the record to delete.
    pub id: RecordId,
    /// Names of keys `{ns}:{id}:{name}` sharing the record's lifecycle
    /// (collections, lists, and the like). Counters are always included.
    #[serde(default)]
    pub ancillary: Vec<String>,
}

impl DeleteRequest {
    /// Creates a request deleting `id` from `namespace`.
    #[must_use]
    pub fn new(namespace: impl Into<String>, id: impl Into<RecordId>) -> Self {
        Self {
            namespace: namespace.into(),
            id: id.into(),
            ancillary: Vec::new(),
        }
    }

    /// Declares an ancillary key to delete along with the record.
    #[must_use]
    pub fn ancillary(mut self, name: impl Into<String>) -> Self {
        self.ancillary.push(name.into());
        self
    }

    /// Checks the request.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` on a malformed namespace or id, or an empty
    /// ancillary name.
    pub fn validate(&self) -> CoreResult<()> {
        validate_namespace(&self.namespace)?;
        validate_id(&self.id)?;
        if self.ancillary.iter().any(String::is_empty) {
            return Err(CoreError::invalid_request("ancillary key name is empty"));
        }
        Ok(())
    }

    /// Keys whose concurrent modification should abort a transaction that
    /// deletes this record.
    #[must_use]
    pub fn watch_keys(&self) -> Vec<String> {
        let keys = Keys::new(&self.namespace);
        vec![
            keys.record(&self.id),
            keys.tracked_indices(&self.id),
            keys.tracked_uniques(&self.id),
        ]
    }
}

pub(crate) fn validate_namespace(namespace: &str) -> CoreResult<()> {
    if namespace.is_empty() {
        return Err(CoreError::invalid_request("namespace is empty"));
    }
    if namespace.contains(SEPARATOR) {
        return Err(CoreError::invalid_request(format!(
            "namespace {namespace:?} contains '{SEPARATOR}'"
        )));
    }
    Ok(())
}

pub(crate) fn validate_id(id: &RecordId) -> CoreResult<()> {
    let raw = id.as_str();
    if raw.is_empty() {
        return Err(CoreError::invalid_request("record id is empty"));
    }
    if raw.contains(SEPARATOR) {
        return Err(CoreError::invalid_request(format!(
            "record id {raw:?} contains '{SEPARATOR}'"
        )));
    }
    if RESERVED_IDS.contains(&raw) {
        return Err(CoreError::invalid_request(format!(
            "record id {raw:?} is reserved"
        )));
    }
    Ok(())
}

pub(crate) fn validate_field(field: &str) -> CoreResult<()> {
    if field.is_empty() {
        return Err(CoreError::invalid_request("field name is empty"));
    }
    if field.contains(SEPARATOR) {
        return Err(CoreError::invalid_request(format!(
            "field {field:?} contains '{SEPARATOR}'"
        )));
    }
    Ok(())
}
