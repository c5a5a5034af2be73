//! The delete protocol.

use crate::error::CoreResult;
use crate::record::keys::Keys;
use crate::record::membership;
use crate::record::request::DeleteRequest;
use kvmodel_store::{Keyspace, KeyspaceExt};
use tracing::debug;

/// Removes one record and every key it is known to occupy, inside an atomic
/// batch.
///
/// Index memberships and unique claims are found through the record's
/// tracked sets; counters and the caller-declared ancillary keys are
/// deleted; the id leaves the all-ids set; the attribute hash goes last.
///
/// Deleting a record that does not exist succeeds and changes nothing.
/// Returns whether the record existed.
///
/// # Errors
///
/// Returns `InvalidRequest` for a malformed request or any store error.
pub fn delete(ks: &mut dyn Keyspace, request: &DeleteRequest) -> CoreResult<bool> {
    request.validate()?;
    let keys = Keys::new(&request.namespace);
    let id = &request.id;
    let record_key = keys.record(id);

    let existed = ks.sismember(&keys.all(), id.as_str())? || ks.exists(&record_key)?;

    membership::clear_indices(ks, &keys, id)?;
    membership::clear_uniques(ks, &keys, id)?;

    let mut doomed = vec![keys.counters(id)];
    doomed.extend(request.ancillary.iter().map(|name| keys.ancillary(id, name)));
    ks.del(doomed)?;

    ks.srem(&keys.all(), [id.as_str()])?;
    ks.del([record_key])?;

    debug!(namespace = %request.namespace, id = %id, existed, "record deleted");
    Ok(existed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::persist::persist;
    use crate::record::request::PersistRequest;
    use kvmodel_store::{InMemoryStore, Store, StoreError, Watch};

    fn batch<T>(
        store: &InMemoryStore,
        f: impl Fn(&mut dyn Keyspace) -> CoreResult<T>,
    ) -> T {
        let mut out = None;
        store
            .multi(&Watch::none(), &mut |ks| {
                out = Some(f(ks).map_err(|_| StoreError::BatchAborted)?);
                Ok(())
            })
            .unwrap();
        out.unwrap()
    }

    fn seed(store: &InMemoryStore) {
        batch(store, |ks| {
            persist(
                ks,
                &PersistRequest::new("User")
                    .attribute("name", "Alice")
                    .index("name", ["Alice"])
                    .index("role", ["admin", "staff"])
                    .unique("email", "a@x.com"),
            )
        });
        batch(store, |ks| {
            persist(
                ks,
                &PersistRequest::new("User")
                    .attribute("name", "Bob")
                    .index("role", ["staff"]),
            )
        });
    }

    #[test]
    fn delete_removes_every_trace() {
        let store = InMemoryStore::new();
        seed(&store);
        let mut ks = &store;
        ks.hincr_by("User:1:counters", "visits", 3).unwrap();
        ks.sadd("User:1:posts", ["9"]).unwrap();

        let existed = batch(&store, |ks| {
            delete(ks, &DeleteRequest::new("User", "1").ancillary("posts"))
        });

        assert!(existed);
        assert_eq!(ks.smembers("User:all").unwrap(), vec!["2"]);
        assert!(!ks.exists("User:1").unwrap());
        assert!(!ks.exists("User:1:_indices").unwrap());
        assert!(!ks.exists("User:1:_uniques").unwrap());
        assert!(!ks.exists("User:1:counters").unwrap());
        assert!(!ks.exists("User:1:posts").unwrap());
        assert!(!ks.exists("User:indices:name:Alice").unwrap());
        assert!(!ks.exists("User:indices:role:admin").unwrap());
        assert_eq!(ks.smembers("User:indices:role:staff").unwrap(), vec!["2"]);
        assert!(!ks.exists("User:uniques:email").unwrap());
    }

    #[test]
    fn delete_is_idempotent() {
        let store = InMemoryStore::new();
        seed(&store);

        assert!(batch(&store, |ks| delete(ks, &DeleteRequest::new("User", "1"))));
        let after_first = store.snapshot();

        assert!(!batch(&store, |ks| delete(ks, &DeleteRequest::new("User", "1"))));
        assert_eq!(store.snapshot(), after_first);
    }

    #[test]
    fn delete_of_unknown_id_changes_nothing() {
        let store = InMemoryStore::new();
        seed(&store);
        let before = store.snapshot();

        assert!(!batch(&store, |ks| delete(ks, &DeleteRequest::new("User", "42"))));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn deleted_unique_value_can_be_reused() {
        let store = InMemoryStore::new();
        seed(&store);
        batch(&store, |ks| delete(ks, &DeleteRequest::new("User", "1")));

        let id = batch(&store, |ks| {
            persist(ks, &PersistRequest::new("User").unique("email", "a@x.com"))
        });
        assert_eq!(id, "3");
    }
}
