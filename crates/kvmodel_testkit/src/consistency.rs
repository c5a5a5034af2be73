//! Whole-namespace consistency checks.
//!
//! After any sequence of committed persists and deletes, a namespace's keys
//! must agree with each other: index sets, unique hashes and every record's
//! tracked sets point at each other in both directions, and nothing
//! references an id that is not live.

use kvmodel_store::{InMemoryStore, StoredValue};
use std::collections::{BTreeMap, BTreeSet};

/// A violated cross-key invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inconsistency(pub String);

impl std::fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The keys of one namespace, sorted by role.
#[derive(Debug, Default)]
struct Layout<'a> {
    all: BTreeSet<String>,
    records: BTreeMap<&'a str, &'a StoredValue>,
    indices: BTreeMap<&'a str, &'a BTreeSet<String>>,
    uniques: BTreeMap<&'a str, &'a BTreeMap<String, String>>,
    tracked_indices: BTreeMap<&'a str, &'a BTreeSet<String>>,
    tracked_uniques: BTreeMap<&'a str, &'a BTreeMap<String, String>>,
}

/// Checks every invariant of `namespace` in `store`.
///
/// # Errors
///
/// Returns every inconsistency found.
pub fn check_namespace(store: &InMemoryStore, namespace: &str) -> Result<(), Vec<Inconsistency>> {
    let snapshot = store.snapshot();
    let mut problems = Vec::new();
    let mut fail = |message: String| problems.push(Inconsistency(message));
    let layout = classify(&snapshot, namespace, &mut fail);

    for (key, value) in &layout.records {
        if !matches!(value, StoredValue::Hash(_)) {
            fail(format!("{key} is not a hash"));
        }
    }

    for id in &layout.all {
        let tracked = layout.tracked_indices.get(id.as_str());
        for index_key in tracked.into_iter().flat_map(|set| set.iter()) {
            let holds = layout
                .indices
                .get(index_key.as_str())
                .is_some_and(|members| members.contains(id));
            if !holds {
                fail(format!("{id} tracks {index_key} which does not hold it"));
            }
        }
        let claims = layout.tracked_uniques.get(id.as_str());
        for (unique_key, value) in claims.into_iter().flat_map(|map| map.iter()) {
            let owner = layout
                .uniques
                .get(unique_key.as_str())
                .and_then(|owners| owners.get(value));
            if owner != Some(id) {
                fail(format!("{id} tracks {unique_key}={value} owned by {owner:?}"));
            }
        }
    }

    for (index_key, members) in &layout.indices {
        for id in members.iter() {
            if !layout.all.contains(id) {
                fail(format!("{index_key} holds dead id {id}"));
            }
            let tracked = layout
                .tracked_indices
                .get(id.as_str())
                .is_some_and(|set| set.contains(*index_key));
            if !tracked {
                fail(format!("{index_key} holds {id} which does not track it"));
            }
        }
    }

    for (unique_key, owners) in &layout.uniques {
        for (value, id) in owners.iter() {
            if !layout.all.contains(id) {
                fail(format!("{unique_key}={value} owned by dead id {id}"));
            }
            let tracked = layout
                .tracked_uniques
                .get(id.as_str())
                .and_then(|claims| claims.get(*unique_key));
            if tracked != Some(value) {
                fail(format!("{unique_key}={value} owned by {id} which tracks {tracked:?}"));
            }
        }
    }

    for id in layout
        .records
        .keys()
        .chain(layout.tracked_indices.keys())
        .chain(layout.tracked_uniques.keys())
    {
        if !layout.all.contains(*id) {
            fail(format!("keys left behind for dead id {id}"));
        }
    }

    for (key, value) in &snapshot {
        let empty = match value {
            StoredValue::String(_) => false,
            StoredValue::Hash(hash) => hash.is_empty(),
            StoredValue::Set(set) => set.is_empty(),
        };
        if empty {
            fail(format!("{key} is an empty container"));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems)
    }
}

fn classify<'a>(
    snapshot: &'a BTreeMap<String, StoredValue>,
    namespace: &str,
    fail: &mut impl FnMut(String),
) -> Layout<'a> {
    let prefix = format!("{namespace}:");
    let mut layout = Layout::default();

    for (key, value) in snapshot {
        let Some(rest) = key.strip_prefix(&prefix) else {
            continue;
        };
        match (rest, value) {
            ("id", StoredValue::String(_)) => {}
            ("all", StoredValue::Set(ids)) => layout.all = ids.clone(),
            (rest, StoredValue::Set(members)) if rest.starts_with("indices:") => {
                layout.indices.insert(key.as_str(), members);
            }
            (rest, StoredValue::Hash(owners)) if rest.starts_with("uniques:") => {
                layout.uniques.insert(key.as_str(), owners);
            }
            (rest, value) => match rest.split_once(':') {
                None => {
                    layout.records.insert(rest, value);
                }
                Some((id, "_indices")) => match value {
                    StoredValue::Set(set) => {
                        layout.tracked_indices.insert(id, set);
                    }
                    _ => fail(format!("{key} is not a set")),
                },
                Some((id, "_uniques")) => match value {
                    StoredValue::Hash(map) => {
                        layout.tracked_uniques.insert(id, map);
                    }
                    _ => fail(format!("{key} is not a hash")),
                },
                Some(_) => {}
            },
        }
    }
    layout
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvmodel_store::KeyspaceExt;

    #[test]
    fn consistent_namespace_passes() {
        let store = InMemoryStore::new();
        let mut ks = &store;
        ks.sadd("User:all", ["1"]).unwrap();
        ks.hset("User:1", [("name", "Alice")]).unwrap();
        ks.sadd("User:indices:name:Alice", ["1"]).unwrap();
        ks.sadd("User:1:_indices", ["User:indices:name:Alice"]).unwrap();
        ks.hset("User:uniques:email", [("a@x.com", "1")]).unwrap();
        ks.hset("User:1:_uniques", [("User:uniques:email", "a@x.com")])
            .unwrap();

        assert_eq!(check_namespace(&store, "User"), Ok(()));
    }

    #[test]
    fn stale_index_member_is_reported() {
        let store = InMemoryStore::new();
        let mut ks = &store;
        ks.sadd("User:all", ["1"]).unwrap();
        ks.sadd("User:indices:status:pending", ["1"]).unwrap();

        let problems = check_namespace(&store, "User").unwrap_err();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].0.contains("does not track it"));
    }

    #[test]
    fn orphaned_keys_are_reported() {
        let store = InMemoryStore::new();
        let mut ks = &store;
        ks.hset("User:7", [("name", "ghost")]).unwrap();
        ks.hset("User:uniques:email", [("g@x.com", "7")]).unwrap();

        let problems = check_namespace(&store, "User").unwrap_err();
        assert!(problems.iter().any(|p| p.0.contains("dead id 7")));
        assert!(problems.iter().any(|p| p.0.contains("left behind")));
    }

    #[test]
    fn other_namespaces_are_ignored() {
        let store = InMemoryStore::new();
        let mut ks = &store;
        ks.sadd("Post:indices:tag:a", ["9"]).unwrap();
        assert_eq!(check_namespace(&store, "User"), Ok(()));
    }
}
