//! Composing independent concerns into one atomic commit.

use kvmodel_core::{
    CoreError, DeleteRequest, KeyspaceExt, PersistRequest, RecordId, Transaction,
};
use kvmodel_testkit::{check_namespace, scenarios, TestDatabase};
use parking_lot::Mutex;
use std::sync::Arc;

/// Moves `id` from one owner list to another, reading the current owner in
/// the read phase.
fn reassign(namespace: &'static str, id: &'static str, to: &'static str) -> Transaction {
    let owner_key = format!("{namespace}:{id}:owner");
    let mut txn = Transaction::new();
    let read_key = owner_key.clone();
    txn.watch([owner_key.clone()])
        .read(move |store, scratch| {
            let mut ks = store;
            scratch.put("previous", ks.get(&read_key)?)
        })
        .write(move |ks, scratch| {
            if let Some(previous) = scratch.get::<Option<String>>("previous")? {
                ks.srem(&format!("Owner:{previous}:items"), [id])?;
            }
            ks.set(&owner_key, to)?;
            ks.sadd(&format!("Owner:{to}:items"), [id])?;
            Ok(())
        });
    txn
}

#[test]
fn appended_transactions_commit_together() {
    let db = TestDatabase::memory();
    let mut save = Transaction::new();
    let user = save.persist(scenarios::user("ann", "ann@x.com"));
    let mut own = reassign("Item", "9", "ann");
    own.append(&save);

    db.commit(&own).unwrap();

    let mut ks = db.store.as_ref();
    assert_eq!(user.id(), Some(RecordId::from("1")));
    assert_eq!(ks.smembers("Owner:ann:items").unwrap(), vec!["9"]);
    check_namespace(&db.store, "User").unwrap();
}

#[test]
fn a_failing_part_rolls_back_the_whole() {
    let (db, users) = scenarios::populated_database(2);
    let before = db.snapshot();

    let mut txn = reassign("Item", "9", "bob");
    txn.delete(DeleteRequest::new("User", users[0].clone()));
    txn.persist(scenarios::user("eve", "user1@example.com"));

    let err = db.commit(&txn).unwrap_err();

    assert_eq!(err.violated_field(), Some("email"));
    assert_eq!(db.snapshot(), before);
}

#[test]
fn replacing_a_unique_holder_in_one_commit() {
    let (db, users) = scenarios::populated_database(1);

    let mut txn = Transaction::new();
    let removed = txn.delete(DeleteRequest::new("User", users[0].clone()));
    let added = txn.persist(scenarios::user("heir", "user0@example.com"));
    db.commit(&txn).unwrap();

    assert_eq!(removed.existed(), Some(true));
    let heir = added.id().unwrap();
    assert_eq!(heir, "2");
    assert_eq!(
        db.with_unique("User", "email", "user0@example.com").unwrap(),
        Some(heir)
    );
    check_namespace(&db.store, "User").unwrap();
}

#[test]
fn composing_the_same_concern_twice_runs_it_once() {
    let db = TestDatabase::memory();
    let calls = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&calls);
    let mut audit = Transaction::new();
    audit.after(move || {
        *counter.lock() += 1;
        Ok(())
    });

    let mut a = reassign("Item", "1", "ann");
    a.append(&audit);
    let mut b = Transaction::new();
    b.append(&audit);
    let mut combined = Transaction::new();
    combined.append(&a).append(&b).append(&audit);

    db.commit(&combined).unwrap();

    assert_eq!(*calls.lock(), 1);
}

#[test]
fn scratch_misuse_aborts_without_retry() {
    let db = TestDatabase::memory();
    let mut txn = Transaction::new();
    txn.write(|ks, scratch| {
        let value = scratch.get::<String>("never written")?;
        ks.set("k", value)?;
        Ok(())
    });

    let err = db.commit(&txn).unwrap_err();

    assert!(matches!(err, CoreError::Programming { .. }));
    assert_eq!(db.stats().committed, 0);
    assert!(db.snapshot().is_empty());
}

#[test]
fn database_transaction_helper_returns_handles() {
    let db = TestDatabase::memory();
    let (alice, bob) = db
        .transaction(|txn| {
            let alice = txn.persist(PersistRequest::new("User").index("team", ["red"]));
            let bob = txn.persist(PersistRequest::new("User").index("team", ["red"]));
            Ok((alice, bob))
        })
        .unwrap();

    let team = db.find("User", "team", "red").unwrap();
    assert!(team.contains(&alice.id().unwrap()));
    assert!(team.contains(&bob.id().unwrap()));
    assert_eq!(team.len(), 2);
}
