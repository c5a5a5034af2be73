//! Read access over the record key layout.
//!
//! These run against the store directly. Reads spanning more than one key
//! run as one read-only batch so they see a single state. Inside a
//! transaction, call them from a read step so they are re-taken on every
//! attempt.

use crate::error::{CoreError, CoreResult};
use crate::record::keys::Keys;
use crate::record::request::{validate_field, validate_id, validate_namespace};
use crate::types::{Attributes, RecordId};
use kvmodel_store::{KeyspaceExt, Store, Watch};
use std::collections::BTreeSet;

/// Returns true if `id` is a live record of `namespace`.
pub fn exists(store: &dyn Store, namespace: &str, id: &RecordId) -> CoreResult<bool> {
    let mut ks = store;
    Ok(ks.sismember(&Keys::new(namespace).all(), id.as_str())?)
}

/// Loads a record's attributes, or `None` if the record does not exist.
pub fn load(store: &dyn Store, namespace: &str, id: &RecordId) -> CoreResult<Option<Attributes>> {
    let keys = Keys::new(namespace);
    let mut loaded: Option<Attributes> = None;
    store.multi(&Watch::none(), &mut |ks| {
        loaded = if ks.sismember(&keys.all(), id.as_str())? {
            Some(ks.hgetall(&keys.record(id))?.into_iter().collect())
        } else {
            None
        };
        Ok(())
    })?;
    Ok(loaded)
}

/// Returns every live id of `namespace`.
pub fn all_ids(store: &dyn Store, namespace: &str) -> CoreResult<BTreeSet<RecordId>> {
    let mut ks = store;
    Ok(ks
        .smembers(&Keys::new(namespace).all())?
        .into_iter()
        .map(RecordId::from)
        .collect())
}

/// Returns the number of live records in `namespace`.
pub fn count(store: &dyn Store, namespace: &str) -> CoreResult<u64> {
    let mut ks = store;
    let n = ks.scard(&Keys::new(namespace).all())?;
    Ok(u64::try_from(n).unwrap_or(0))
}

/// Returns the ids indexed under (field, value).
pub fn find(
    store: &dyn Store,
    namespace: &str,
    field: &str,
    value: &str,
) -> CoreResult<BTreeSet<RecordId>> {
    find_all(store, namespace, &[(field, value)])
}

/// Returns the ids indexed under every one of the (field, value) filters.
///
/// An empty filter list matches every live record.
pub fn find_all(
    store: &dyn Store,
    namespace: &str,
    filters: &[(&str, &str)],
) -> CoreResult<BTreeSet<RecordId>> {
    validate_namespace(namespace)?;
    if filters.is_empty() {
        return all_ids(store, namespace);
    }
    let keys = Keys::new(namespace);
    let mut index_keys = Vec::with_capacity(filters.len());
    for (field, value) in filters {
        validate_field(field)?;
        index_keys.push(keys.index(field, value));
    }
    let mut ks = store;
    Ok(ks
        .sinter(index_keys)?
        .into_iter()
        .map(RecordId::from)
        .collect())
}

/// Returns the record owning `value` for a unique field.
pub fn with_unique(
    store: &dyn Store,
    namespace: &str,
    field: &str,
    value: &str,
) -> CoreResult<Option<RecordId>> {
    validate_namespace(namespace)?;
    validate_field(field)?;
    let mut ks = store;
    Ok(ks
        .hget(&Keys::new(namespace).unique(field), value)?
        .map(RecordId::from))
}

/// Adds `by` to a named counter of a record, returning the new value.
///
/// Counters live in `{ns}:{id}:counters` and are deleted with the record.
/// The liveness check and the increment run in one batch, so a counter is
/// never created for a record that does not exist.
///
/// # Errors
///
/// Returns `InvalidRequest` for an empty counter name or an id that is not
/// live in `namespace`.
pub fn incr_counter(
    store: &dyn Store,
    namespace: &str,
    id: &RecordId,
    name: &str,
    by: i64,
) -> CoreResult<i64> {
    validate_namespace(namespace)?;
    validate_id(id)?;
    if name.is_empty() {
        return Err(CoreError::invalid_request("counter name is empty"));
    }
    let keys = Keys::new(namespace);
    let mut value = None;
    store.multi(&Watch::none(), &mut |ks| {
        if ks.sismember(&keys.all(), id.as_str())? {
            value = Some(ks.hincr_by(&keys.counters(id), name, by)?);
        }
        Ok(())
    })?;
    value.ok_or_else(|| {
        CoreError::invalid_request(format!("no record {namespace}:{id} to count against"))
    })
}

/// Reads a named counter of a record (0 if never incremented).
pub fn counter(store: &dyn Store, namespace: &str, id: &RecordId, name: &str) -> CoreResult<i64> {
    let mut ks = store;
    match ks.hget(&Keys::new(namespace).counters(id), name)? {
        Some(raw) => raw.parse().map_err(|_| {
            CoreError::Store(kvmodel_store::StoreError::not_an_integer(format!(
                "{}/{name}",
                Keys::new(namespace).counters(id)
            )))
        }),
        None => Ok(0),
    }
}
