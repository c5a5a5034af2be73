//! Membership tracking.
//!
//! Every record carries its own reverse index of the index and unique keys
//! that currently reference it: `{ns}:{id}:_indices` (a set of index keys)
//! and `{ns}:{id}:_uniques` (unique key -> value). Persist and delete clean
//! up through these sets, so neither needs to know which fields a namespace
//! indexes.
//!
//! All helpers run inside an atomic batch.

use crate::error::CoreResult;
use crate::record::keys::Keys;
use crate::types::RecordId;
use kvmodel_store::{Keyspace, KeyspaceExt};
use std::collections::BTreeMap;

/// Removes `id` from every index it is tracked in, then deletes the tracked
/// set.
pub fn clear_indices(ks: &mut dyn Keyspace, keys: &Keys<'_>, id: &RecordId) -> CoreResult<()> {
    let memo = keys.tracked_indices(id);
    for index_key in ks.smembers(&memo)? {
        ks.srem(&index_key, [id.as_str()])?;
    }
    ks.del([memo])?;
    Ok(())
}

/// Adds `id` to the index set of every (field, value) and tracks each key.
pub fn track_indices(
    ks: &mut dyn Keyspace,
    keys: &Keys<'_>,
    id: &RecordId,
    indices: &BTreeMap<String, Vec<String>>,
) -> CoreResult<()> {
    let memo = keys.tracked_indices(id);
    for (field, values) in indices {
        for value in values {
            let index_key = keys.index(field, value);
            ks.sadd(&memo, [index_key.as_str()])?;
            ks.sadd(&index_key, [id.as_str()])?;
        }
    }
    Ok(())
}

/// Releases every unique value tracked for `id`, then deletes the tracked
/// hash.
///
/// A value is only released while `id` still owns it.
pub fn clear_uniques(ks: &mut dyn Keyspace, keys: &Keys<'_>, id: &RecordId) -> CoreResult<()> {
    let memo = keys.tracked_uniques(id);
    for (unique_key, value) in ks.hgetall(&memo)? {
        if ks.hget(&unique_key, &value)?.as_deref() == Some(id.as_str()) {
            ks.hdel(&unique_key, [value])?;
        }
    }
    ks.del([memo])?;
    Ok(())
}

/// Claims each unique (field, value) for `id` and tracks the claim.
pub fn track_uniques(
    ks: &mut dyn Keyspace,
    keys: &Keys<'_>,
    id: &RecordId,
    uniques: &BTreeMap<String, String>,
) -> CoreResult<()> {
    let memo = keys.tracked_uniques(id);
    for (field, value) in uniques {
        let unique_key = keys.unique(field);
        ks.hset(&memo, [(unique_key.as_str(), value.as_str())])?;
        ks.hset(&unique_key, [(value.as_str(), id.as_str())])?;
    }
    Ok(())
}

/// Returns the first unique field whose value is owned by another record.
pub fn find_unique_conflict(
    ks: &mut dyn Keyspace,
    keys: &Keys<'_>,
    id: Option<&RecordId>,
    uniques: &BTreeMap<String, String>,
) -> CoreResult<Option<String>> {
    for (field, value) in uniques {
        if let Some(owner) = ks.hget(&keys.unique(field), value)? {
            if id.map(RecordId::as_str) != Some(owner.as_str()) {
                return Ok(Some(field.clone()));
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvmodel_store::{InMemoryStore, Store, Watch};

    fn run(store: &InMemoryStore, f: impl Fn(&mut dyn Keyspace) -> CoreResult<()>) {
        store
            .multi(&Watch::none(), &mut |ks| {
                f(ks).map_err(|_| kvmodel_store::StoreError::BatchAborted)
            })
            .unwrap();
    }

    fn indices(pairs: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(f, vs)| (f.to_string(), vs.iter().map(|v| v.to_string()).collect()))
            .collect()
    }

    #[test]
    fn track_then_clear_indices_leaves_nothing() {
        let store = InMemoryStore::new();
        let keys = Keys::new("User");
        let id = RecordId::from("1");

        run(&store, |ks| {
            track_indices(ks, &keys, &id, &indices(&[("tag", &["a", "b"])]))
        });
        let mut ks = &store;
        assert!(ks.sismember("User:indices:tag:a", "1").unwrap());
        assert_eq!(
            ks.smembers("User:1:_indices").unwrap(),
            vec!["User:indices:tag:a", "User:indices:tag:b"]
        );

        run(&store, |ks| clear_indices(ks, &keys, &id));
        assert_eq!(store.key_count(), 0);
    }

    #[test]
    fn clear_indices_keeps_other_members() {
        let store = InMemoryStore::new();
        let keys = Keys::new("User");
        let wanted = indices(&[("status", &["done"])]);

        run(&store, |ks| {
            track_indices(ks, &keys, &RecordId::from("1"), &wanted)?;
            track_indices(ks, &keys, &RecordId::from("2"), &wanted)
        });
        run(&store, |ks| clear_indices(ks, &keys, &RecordId::from("1")));

        let mut ks = &store;
        assert_eq!(ks.smembers("User:indices:status:done").unwrap(), vec!["2"]);
    }

    #[test]
    fn track_then_clear_uniques_leaves_nothing() {
        let store = InMemoryStore::new();
        let keys = Keys::new("User");
        let id = RecordId::from("1");
        let uniques = BTreeMap::from([("email".to_string(), "a@x.com".to_string())]);

        run(&store, |ks| track_uniques(ks, &keys, &id, &uniques));
        let mut ks = &store;
        assert_eq!(
            ks.hget("User:uniques:email", "a@x.com").unwrap(),
            Some("1".to_string())
        );
        assert_eq!(
            ks.hget("User:1:_uniques", "User:uniques:email").unwrap(),
            Some("a@x.com".to_string())
        );

        run(&store, |ks| clear_uniques(ks, &keys, &id));
        assert_eq!(store.key_count(), 0);
    }

    #[test]
    fn clear_uniques_does_not_release_foreign_claims() {
        let store = InMemoryStore::new();
        let keys = Keys::new("User");
        let mut ks = &store;
        ks.hset("User:uniques:email", [("a@x.com", "2")]).unwrap();
        ks.hset("User:1:_uniques", [("User:uniques:email", "a@x.com")])
            .unwrap();

        run(&store, |ks| clear_uniques(ks, &keys, &RecordId::from("1")));

        assert_eq!(
            ks.hget("User:uniques:email", "a@x.com").unwrap(),
            Some("2".to_string())
        );
        assert!(!ks.exists("User:1:_uniques").unwrap());
    }

    #[test]
    fn unique_conflict_ignores_own_claim() {
        let store = InMemoryStore::new();
        let keys = Keys::new("User");
        let mut ks = &store;
        ks.hset("User:uniques:email", [("a@x.com", "1")]).unwrap();
        let uniques = BTreeMap::from([("email".to_string(), "a@x.com".to_string())]);
        let own = RecordId::from("1");
        let other = RecordId::from("2");

        assert_eq!(
            find_unique_conflict(&mut ks, &keys, Some(&own), &uniques).unwrap(),
            None
        );
        assert_eq!(
            find_unique_conflict(&mut ks, &keys, Some(&other), &uniques).unwrap(),
            Some("email".to_string())
        );
        assert_eq!(
            find_unique_conflict(&mut ks, &keys, None, &uniques).unwrap(),
            Some("email".to_string())
        );
    }
}
