//! In-memory store.

use crate::backend::{Batch, ExecOutcome, Store, Watch};
use crate::command::{Command, Reply};
use crate::error::{StoreError, StoreResult};
use crate::keyspace::Keyspace;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::trace;

/// A value held under one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredValue {
    /// A plain string (also used for integer counters).
    String(String),
    /// A field/value hash.
    Hash(BTreeMap<String, String>),
    /// A set of members.
    Set(BTreeSet<String>),
}

impl StoredValue {
    fn is_empty_container(&self) -> bool {
        match self {
            Self::String(_) => false,
            Self::Hash(h) => h.is_empty(),
            Self::Set(s) => s.is_empty(),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    data: HashMap<String, StoredValue>,
    versions: HashMap<String, u64>,
    clock: u64,
    closed: bool,
}

impl Inner {
    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn bump(&mut self, key: &str) {
        self.clock += 1;
        self.versions.insert(key.to_string(), self.clock);
    }
}

/// An in-memory store with watch/multi semantics.
///
/// Behaves like a single Redis-style server: every write advances the
/// version of the keys it touched, hashes and sets that become empty are
/// removed, and [`Store::multi`] batches run under the exclusive lock so no
/// reader observes a half-applied batch.
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads behind an
/// `Arc`.
///
/// # Example
///
/// ```rust
/// use kvmodel_store::{InMemoryStore, KeyspaceExt};
///
/// let store = InMemoryStore::new();
/// let mut ks = &store;
/// ks.sadd("User:all", ["1"]).unwrap();
/// assert!(ks.sismember("User:all", "1").unwrap());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every key and value.
    ///
    /// Useful for comparing whole-store state in tests.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, StoredValue> {
        self.inner
            .read()
            .data
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Returns the number of live keys.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.inner.read().data.len()
    }

    /// Returns the current version of a key (0 if never written).
    #[must_use]
    pub fn version(&self, key: &str) -> u64 {
        self.inner.read().version(key)
    }

    /// Advances the version of `key` without changing its value, as if
    /// another client had rewritten it.
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the store is closed.
    pub fn touch(&self, key: &str) -> StoreResult<()> {
        let mut inner = self.inner.write();
        inner.ensure_open()?;
        inner.bump(key);
        Ok(())
    }

    /// Removes every key.
    pub fn flush_all(&self) {
        let mut inner = self.inner.write();
        let keys: Vec<String> = inner.data.keys().cloned().collect();
        inner.data.clear();
        for key in keys {
            inner.bump(&key);
        }
    }
}

impl Store for InMemoryStore {
    fn execute(&self, command: Command) -> StoreResult<Reply> {
        if command.is_write() {
            let mut inner = self.inner.write();
            inner.ensure_open()?;
            apply(&mut Direct { inner: &mut *inner }, command)
        } else {
            let inner = self.inner.read();
            inner.ensure_open()?;
            query(&inner.data, &command)
        }
    }

    fn watch(&self, keys: &[String]) -> StoreResult<Watch> {
        let inner = self.inner.read();
        inner.ensure_open()?;
        Ok(Watch::from_versions(
            keys.iter().map(|k| (k.clone(), inner.version(k))).collect(),
        ))
    }

    fn multi(&self, watch: &Watch, batch: &mut Batch<'_>) -> StoreResult<ExecOutcome> {
        let mut inner = self.inner.write();
        inner.ensure_open()?;

        if let Some((key, _)) = watch
            .versions()
            .iter()
            .find(|(key, seen)| inner.version(key) != *seen)
        {
            trace!(key = %key, "watched key changed, discarding batch");
            return Ok(ExecOutcome::Conflict);
        }

        let (mut overlay, touched) = {
            let mut staged = Staged::new(&inner.data);
            batch(&mut staged)?;
            (staged.overlay, staged.touched)
        };

        for key in touched {
            match overlay.remove(&key).flatten() {
                Some(value) => {
                    inner.data.insert(key.clone(), value);
                }
                None => {
                    inner.data.remove(&key);
                }
            }
            inner.bump(&key);
        }
        Ok(ExecOutcome::Committed)
    }

    fn close(&self) -> StoreResult<()> {
        self.inner.write().closed = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.inner.read().closed
    }
}

/// Read access to key slots.
trait Slots {
    fn slot(&self, key: &str) -> Option<&StoredValue>;
}

/// Write access to key slots.
///
/// `put` and `remove` record the modification themselves; changes made
/// through `slot_mut` must be followed by `touch`.
trait SlotsMut: Slots {
    fn slot_mut(&mut self, key: &str) -> Option<&mut StoredValue>;
    fn put(&mut self, key: &str, value: StoredValue);
    fn remove(&mut self, key: &str) -> bool;
    fn touch(&mut self, key: &str);
}

impl Slots for HashMap<String, StoredValue> {
    fn slot(&self, key: &str) -> Option<&StoredValue> {
        self.get(key)
    }
}

/// Commands applied straight to the committed data.
struct Direct<'a> {
    inner: &'a mut Inner,
}

impl Slots for Direct<'_> {
    fn slot(&self, key: &str) -> Option<&StoredValue> {
        self.inner.data.get(key)
    }
}

impl SlotsMut for Direct<'_> {
    fn slot_mut(&mut self, key: &str) -> Option<&mut StoredValue> {
        self.inner.data.get_mut(key)
    }

    fn put(&mut self, key: &str, value: StoredValue) {
        self.inner.data.insert(key.to_string(), value);
        self.inner.bump(key);
    }

    fn remove(&mut self, key: &str) -> bool {
        let removed = self.inner.data.remove(key).is_some();
        if removed {
            self.inner.bump(key);
        }
        removed
    }

    fn touch(&mut self, key: &str) {
        self.inner.bump(key);
    }
}

/// Copy-on-write view used inside a batch. Nothing reaches the committed
/// data until the batch returns successfully.
struct Staged<'a> {
    base: &'a HashMap<String, StoredValue>,
    overlay: HashMap<String, Option<StoredValue>>,
    touched: HashSet<String>,
}

impl<'a> Staged<'a> {
    fn new(base: &'a HashMap<String, StoredValue>) -> Self {
        Self {
            base,
            overlay: HashMap::new(),
            touched: HashSet::new(),
        }
    }
}

impl Slots for Staged<'_> {
    fn slot(&self, key: &str) -> Option<&StoredValue> {
        match self.overlay.get(key) {
            Some(staged) => staged.as_ref(),
            None => self.base.get(key),
        }
    }
}

impl SlotsMut for Staged<'_> {
    fn slot_mut(&mut self, key: &str) -> Option<&mut StoredValue> {
        if !self.overlay.contains_key(key) {
            let current = self.base.get(key).cloned();
            self.overlay.insert(key.to_string(), current);
        }
        self.overlay.get_mut(key).and_then(Option::as_mut)
    }

    fn put(&mut self, key: &str, value: StoredValue) {
        self.overlay.insert(key.to_string(), Some(value));
        self.touched.insert(key.to_string());
    }

    fn remove(&mut self, key: &str) -> bool {
        let existed = self.slot(key).is_some();
        self.overlay.insert(key.to_string(), None);
        if existed {
            self.touched.insert(key.to_string());
        }
        existed
    }

    fn touch(&mut self, key: &str) {
        self.touched.insert(key.to_string());
    }
}

impl Keyspace for Staged<'_> {
    fn execute(&mut self, command: Command) -> StoreResult<Reply> {
        apply(self, command)
    }
}

fn read_string<'s, S: Slots>(slots: &'s S, key: &str) -> StoreResult<Option<&'s String>> {
    match slots.slot(key) {
        None => Ok(None),
        Some(StoredValue::String(s)) => Ok(Some(s)),
        Some(_) => Err(StoreError::wrong_type(key, "string")),
    }
}

fn read_hash<'s, S: Slots>(
    slots: &'s S,
    key: &str,
) -> StoreResult<Option<&'s BTreeMap<String, String>>> {
    match slots.slot(key) {
        None => Ok(None),
        Some(StoredValue::Hash(h)) => Ok(Some(h)),
        Some(_) => Err(StoreError::wrong_type(key, "hash")),
    }
}

fn read_set<'s, S: Slots>(slots: &'s S, key: &str) -> StoreResult<Option<&'s BTreeSet<String>>> {
    match slots.slot(key) {
        None => Ok(None),
        Some(StoredValue::Set(s)) => Ok(Some(s)),
        Some(_) => Err(StoreError::wrong_type(key, "set")),
    }
}

fn parse_integer(key: &str, value: &str) -> StoreResult<i64> {
    value
        .parse::<i64>()
        .map_err(|_| StoreError::not_an_integer(key))
}

fn hash_entry<'s, S: SlotsMut>(
    slots: &'s mut S,
    key: &str,
) -> StoreResult<&'s mut BTreeMap<String, String>> {
    read_hash(slots, key)?;
    if slots.slot(key).is_none() {
        slots.put(key, StoredValue::Hash(BTreeMap::new()));
    }
    match slots.slot_mut(key) {
        Some(StoredValue::Hash(h)) => Ok(h),
        _ => Err(StoreError::wrong_type(key, "hash")),
    }
}

fn set_entry<'s, S: SlotsMut>(slots: &'s mut S, key: &str) -> StoreResult<&'s mut BTreeSet<String>> {
    read_set(slots, key)?;
    if slots.slot(key).is_none() {
        slots.put(key, StoredValue::Set(BTreeSet::new()));
    }
    match slots.slot_mut(key) {
        Some(StoredValue::Set(s)) => Ok(s),
        _ => Err(StoreError::wrong_type(key, "set")),
    }
}

/// Removes `key` if it holds an empty hash or set.
fn drop_if_empty<S: SlotsMut>(slots: &mut S, key: &str) {
    if slots.slot(key).is_some_and(StoredValue::is_empty_container) {
        slots.remove(key);
    }
}

/// Answers a read-only command.
fn query<S: Slots>(slots: &S, command: &Command) -> StoreResult<Reply> {
    let reply = match command {
        Command::Get { key } => read_string(slots, key)?
            .map_or(Reply::Nil, |s| Reply::Bulk(s.clone())),
        Command::Exists { key } => Reply::Integer(i64::from(slots.slot(key).is_some())),
        Command::HGet { key, field } => read_hash(slots, key)?
            .and_then(|h| h.get(field))
            .map_or(Reply::Nil, |v| Reply::Bulk(v.clone())),
        Command::HGetAll { key } => Reply::Pairs(
            read_hash(slots, key)?
                .map(|h| h.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
                .unwrap_or_default(),
        ),
        Command::HKeys { key } => Reply::Array(
            read_hash(slots, key)?
                .map(|h| h.keys().cloned().collect())
                .unwrap_or_default(),
        ),
        Command::SMembers { key } => Reply::Array(
            read_set(slots, key)?
                .map(|s| s.iter().cloned().collect())
                .unwrap_or_default(),
        ),
        Command::SIsMember { key, member } => Reply::Integer(i64::from(
            read_set(slots, key)?.is_some_and(|s| s.contains(member)),
        )),
        Command::SCard { key } => {
            Reply::Integer(read_set(slots, key)?.map_or(0, |s| s.len() as i64))
        }
        Command::SInter { keys } => {
            let mut sets = Vec::with_capacity(keys.len());
            for key in keys {
                sets.push(read_set(slots, key)?);
            }
            let members = match sets.split_first() {
                Some((Some(first), rest)) if rest.iter().all(Option::is_some) => first
                    .iter()
                    .filter(|m| rest.iter().flatten().all(|s| s.contains(*m)))
                    .cloned()
                    .collect(),
                _ => Vec::new(),
            };
            Reply::Array(members)
        }
        write => {
            return Err(StoreError::UnexpectedReply {
                expected: "read command",
                got: write.name(),
            })
        }
    };
    Ok(reply)
}

/// Applies any command, reads included.
fn apply<S: SlotsMut>(slots: &mut S, command: Command) -> StoreResult<Reply> {
    match command {
        Command::Set { key, value } => {
            slots.put(&key, StoredValue::String(value));
            Ok(Reply::Ok)
        }
        Command::Del { keys } => {
            let mut removed = 0;
            for key in &keys {
                if slots.remove(key) {
                    removed += 1;
                }
            }
            Ok(Reply::Integer(removed))
        }
        Command::IncrBy { key, by } => {
            let current = match read_string(slots, &key)? {
                Some(value) => parse_integer(&key, value)?,
                None => 0,
            };
            let next = current
                .checked_add(by)
                .ok_or_else(|| StoreError::not_an_integer(key.as_str()))?;
            slots.put(&key, StoredValue::String(next.to_string()));
            Ok(Reply::Integer(next))
        }
        Command::HSet { key, pairs } => {
            let hash = hash_entry(slots, &key)?;
            let mut added = 0;
            for (field, value) in pairs {
                if hash.insert(field, value).is_none() {
                    added += 1;
                }
            }
            slots.touch(&key);
            drop_if_empty(slots, &key);
            Ok(Reply::Integer(added))
        }
        Command::HDel { key, fields } => {
            if read_hash(slots, &key)?.is_none() {
                return Ok(Reply::Integer(0));
            }
            let hash = hash_entry(slots, &key)?;
            let mut removed = 0;
            for field in &fields {
                if hash.remove(field).is_some() {
                    removed += 1;
                }
            }
            if removed > 0 {
                slots.touch(&key);
                drop_if_empty(slots, &key);
            }
            Ok(Reply::Integer(removed))
        }
        Command::HIncrBy { key, field, by } => {
            let current = match read_hash(slots, &key)?.and_then(|h| h.get(&field)) {
                Some(value) => parse_integer(&format!("{key}/{field}"), value)?,
                None => 0,
            };
            let next = current
                .checked_add(by)
                .ok_or_else(|| StoreError::not_an_integer(format!("{key}/{field}")))?;
            hash_entry(slots, &key)?.insert(field, next.to_string());
            slots.touch(&key);
            Ok(Reply::Integer(next))
        }
        Command::SAdd { key, members } => {
            let set = set_entry(slots, &key)?;
            let mut added = 0;
            for member in members {
                if set.insert(member) {
                    added += 1;
                }
            }
            if added > 0 {
                slots.touch(&key);
            }
            drop_if_empty(slots, &key);
            Ok(Reply::Integer(added))
        }
        Command::SRem { key, members } => {
            if read_set(slots, &key)?.is_none() {
                return Ok(Reply::Integer(0));
            }
            let set = set_entry(slots, &key)?;
            let mut removed = 0;
            for member in &members {
                if set.remove(member) {
                    removed += 1;
                }
            }
            if removed > 0 {
                slots.touch(&key);
                drop_if_empty(slots, &key);
            }
            Ok(Reply::Integer(removed))
        }
        read => query(slots, &read),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyspace::KeyspaceExt;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn memory_new_is_empty() {
        let store = InMemoryStore::new();
        assert_eq!(store.key_count(), 0);
        assert!(store.is_open());
    }

    #[test]
    fn memory_string_and_counter() {
        let store = InMemoryStore::new();
        let mut ks = &store;

        assert_eq!(ks.get("k").unwrap(), None);
        ks.set("k", "v").unwrap();
        assert_eq!(ks.get("k").unwrap(), Some("v".to_string()));

        assert_eq!(ks.incr("User:id").unwrap(), 1);
        assert_eq!(ks.incr("User:id").unwrap(), 2);
        assert_eq!(ks.incr_by("User:id", -5).unwrap(), -3);
    }

    #[test]
    fn memory_incr_on_non_integer_fails() {
        let store = InMemoryStore::new();
        let mut ks = &store;
        ks.set("k", "abc").unwrap();
        assert!(matches!(ks.incr("k"), Err(StoreError::NotAnInteger { .. })));
    }

    #[test]
    fn memory_wrong_type_is_reported() {
        let store = InMemoryStore::new();
        let mut ks = &store;
        ks.sadd("s", ["a"]).unwrap();
        assert!(matches!(
            ks.hget("s", "f"),
            Err(StoreError::WrongType { expected: "hash", .. })
        ));
        assert!(matches!(
            ks.get("s"),
            Err(StoreError::WrongType { expected: "string", .. })
        ));
    }

    #[test]
    fn memory_empty_containers_disappear() {
        let store = InMemoryStore::new();
        let mut ks = &store;

        ks.sadd("s", ["a", "b"]).unwrap();
        ks.srem("s", ["a", "b"]).unwrap();
        assert!(!ks.exists("s").unwrap());

        ks.hset("h", [("f", "v")]).unwrap();
        ks.hdel("h", ["f"]).unwrap();
        assert!(!ks.exists("h").unwrap());
        assert_eq!(store.key_count(), 0);
    }

    #[test]
    fn memory_hash_operations() {
        let store = InMemoryStore::new();
        let mut ks = &store;

        assert_eq!(ks.hset("h", [("b", "2"), ("a", "1")]).unwrap(), 2);
        assert_eq!(ks.hset("h", [("a", "3")]).unwrap(), 0);
        assert_eq!(
            ks.hgetall("h").unwrap(),
            vec![
                ("a".to_string(), "3".to_string()),
                ("b".to_string(), "2".to_string())
            ]
        );
        assert_eq!(ks.hkeys("h").unwrap(), keys(&["a", "b"]));
        assert_eq!(ks.hincr_by("h", "n", 4).unwrap(), 4);
        assert_eq!(ks.hincr_by("h", "n", -1).unwrap(), 3);
        assert!(ks.hincr_by("h", "a", 1).is_ok());
    }

    #[test]
    fn memory_set_intersection() {
        let store = InMemoryStore::new();
        let mut ks = &store;

        ks.sadd("a", ["1", "2", "3"]).unwrap();
        ks.sadd("b", ["2", "3", "4"]).unwrap();
        assert_eq!(ks.sinter(["a", "b"]).unwrap(), keys(&["2", "3"]));
        assert!(ks.sinter(["a", "missing"]).unwrap().is_empty());
        assert_eq!(ks.scard("a").unwrap(), 3);
    }

    #[test]
    fn memory_writes_bump_versions() {
        let store = InMemoryStore::new();
        let mut ks = &store;

        assert_eq!(store.version("s"), 0);
        ks.sadd("s", ["a"]).unwrap();
        let v1 = store.version("s");
        assert!(v1 > 0);

        // No-op removal does not count as a modification.
        ks.srem("s", ["missing"]).unwrap();
        assert_eq!(store.version("s"), v1);

        ks.srem("s", ["a"]).unwrap();
        assert!(store.version("s") > v1);
    }

    #[test]
    fn multi_applies_batch() {
        let store = InMemoryStore::new();
        let watch = store.watch(&keys(&["s"])).unwrap();

        let outcome = store
            .multi(&watch, &mut |ks| {
                ks.sadd("s", ["a"])?;
                ks.set("k", "v")?;
                Ok(())
            })
            .unwrap();

        assert_eq!(outcome, ExecOutcome::Committed);
        let mut ks = &store;
        assert!(ks.sismember("s", "a").unwrap());
        assert_eq!(ks.get("k").unwrap(), Some("v".to_string()));
    }

    #[test]
    fn multi_sees_its_own_writes() {
        let store = InMemoryStore::new();
        store
            .multi(&Watch::none(), &mut |ks| {
                ks.sadd("s", ["a"])?;
                assert_eq!(ks.smembers("s")?, vec!["a".to_string()]);
                ks.del(["s"])?;
                assert!(!ks.exists("s")?);
                Ok(())
            })
            .unwrap();
        assert_eq!(store.key_count(), 0);
    }

    #[test]
    fn multi_conflict_discards_batch() {
        let store = InMemoryStore::new();
        let watch = store.watch(&keys(&["s"])).unwrap();

        let mut ks = &store;
        ks.sadd("s", ["other"]).unwrap();

        let mut ran = false;
        let outcome = store
            .multi(&watch, &mut |ks| {
                ran = true;
                ks.set("k", "v")?;
                Ok(())
            })
            .unwrap();

        assert_eq!(outcome, ExecOutcome::Conflict);
        assert!(!ran);
        assert_eq!(ks.get("k").unwrap(), None);
    }

    #[test]
    fn multi_error_rolls_back() {
        let store = InMemoryStore::new();
        let mut ks = &store;
        ks.set("k", "before").unwrap();
        let before = store.snapshot();

        let result = store.multi(&Watch::none(), &mut |ks| {
            ks.set("k", "after")?;
            ks.sadd("s", ["a"])?;
            Err(StoreError::BatchAborted)
        });

        assert_eq!(result, Err(StoreError::BatchAborted));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn closed_store_rejects_commands() {
        let store = InMemoryStore::new();
        store.close().unwrap();
        assert!(!store.is_open());

        let mut ks = &store;
        assert_eq!(ks.get("k"), Err(StoreError::Closed));
        assert_eq!(store.watch(&[]).unwrap_err(), StoreError::Closed);
        assert_eq!(
            store.multi(&Watch::none(), &mut |_| Ok(())).unwrap_err(),
            StoreError::Closed
        );
    }

    #[test]
    fn flush_all_invalidates_watches() {
        let store = InMemoryStore::new();
        let mut ks = &store;
        ks.set("k", "v").unwrap();
        let watch = store.watch(&keys(&["k"])).unwrap();

        store.flush_all();

        let outcome = store.multi(&watch, &mut |_| Ok(())).unwrap();
        assert_eq!(outcome, ExecOutcome::Conflict);
        assert_eq!(store.key_count(), 0);
    }

    #[test]
    fn touch_changes_version_only() {
        let store = InMemoryStore::new();
        let mut ks = &store;
        ks.set("k", "v").unwrap();
        let before = store.snapshot();
        let watch = store.watch(&keys(&["k", "missing"])).unwrap();

        store.touch("missing").unwrap();

        assert_eq!(store.snapshot(), before);
        assert!(store.version("missing") > 0);
        let outcome = store.multi(&watch, &mut |_| Ok(())).unwrap();
        assert_eq!(outcome, ExecOutcome::Conflict);
    }

    proptest::proptest! {
        #[test]
        fn failed_batch_leaves_no_trace(
            members in proptest::collection::vec("[a-c]{1,2}", 1..8),
            fields in proptest::collection::vec(("[a-c]", "[x-z]"), 1..8),
        ) {
            let store = InMemoryStore::new();
            let mut ks = &store;
            ks.sadd("s", ["seed"]).unwrap();
            ks.set("text", "abc").unwrap();
            let before = store.snapshot();

            let result = store.multi(&Watch::none(), &mut |ks| {
                ks.sadd("s", members.iter().map(String::as_str))?;
                ks.hset("h", fields.iter().map(|(f, v)| (f.as_str(), v.as_str())))?;
                ks.del(["s"])?;
                ks.incr("text")?;
                Ok(())
            });

            proptest::prop_assert!(result.is_err());
            proptest::prop_assert_eq!(store.snapshot(), before);
        }
    }
}
