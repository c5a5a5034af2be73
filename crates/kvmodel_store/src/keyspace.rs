//! Keyspace access: the command sink and its typed helpers.

use crate::backend::Store;
use crate::command::{Command, Reply};
use crate::error::StoreResult;

/// Something commands can be executed against.
///
/// Inside an atomic batch this is the store's staged view; outside a batch a
/// plain `&Store` is a keyspace whose commands commit one at a time.
pub trait Keyspace {
    /// Executes a single command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command is applied to a key of the wrong
    /// type, a counter is not an integer, or the store is unreachable.
    fn execute(&mut self, command: Command) -> StoreResult<Reply>;
}

impl<S: Store + ?Sized> Keyspace for &S {
    fn execute(&mut self, command: Command) -> StoreResult<Reply> {
        Store::execute(*self, command)
    }
}

/// Typed helpers over [`Keyspace::execute`].
pub trait KeyspaceExt: Keyspace {
    /// `GET key`.
    fn get(&mut self, key: &str) -> StoreResult<Option<String>> {
        self.execute(Command::Get { key: key.into() })?
            .into_optional_string()
    }

    /// `SET key value`.
    fn set(&mut self, key: &str, value: &str) -> StoreResult<()> {
        self.execute(Command::Set {
            key: key.into(),
            value: value.into(),
        })?
        .into_ok()
    }

    /// `DEL key...`; returns the number of keys removed.
    fn del<I, K>(&mut self, keys: I) -> StoreResult<i64>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.execute(Command::Del {
            keys: keys.into_iter().map(Into::into).collect(),
        })?
        .into_integer()
    }

    /// `EXISTS key`.
    fn exists(&mut self, key: &str) -> StoreResult<bool> {
        Ok(self.execute(Command::Exists { key: key.into() })?.into_integer()? == 1)
    }

    /// `INCR key`.
    fn incr(&mut self, key: &str) -> StoreResult<i64> {
        self.incr_by(key, 1)
    }

    /// `INCRBY key by`.
    fn incr_by(&mut self, key: &str, by: i64) -> StoreResult<i64> {
        self.execute(Command::IncrBy {
            key: key.into(),
            by,
        })?
        .into_integer()
    }

    /// `HGET key field`.
    fn hget(&mut self, key: &str, field: &str) -> StoreResult<Option<String>> {
        self.execute(Command::HGet {
            key: key.into(),
            field: field.into(),
        })?
        .into_optional_string()
    }

    /// `HSET key field value [field value ...]`.
    fn hset<I, F, V>(&mut self, key: &str, pairs: I) -> StoreResult<i64>
    where
        I: IntoIterator<Item = (F, V)>,
        F: Into<String>,
        V: Into<String>,
    {
        self.execute(Command::HSet {
            key: key.into(),
            pairs: pairs
                .into_iter()
                .map(|(f, v)| (f.into(), v.into()))
                .collect(),
        })?
        .into_integer()
    }

    /// `HDEL key field...`.
    fn hdel<I, F>(&mut self, key: &str, fields: I) -> StoreResult<i64>
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        self.execute(Command::HDel {
            key: key.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        })?
        .into_integer()
    }

    /// `HGETALL key`.
    fn hgetall(&mut self, key: &str) -> StoreResult<Vec<(String, String)>> {
        self.execute(Command::HGetAll { key: key.into() })?
            .into_pairs()
    }

    /// `HKEYS key`.
    fn hkeys(&mut self, key: &str) -> StoreResult<Vec<String>> {
        self.execute(Command::HKeys { key: key.into() })?
            .into_strings()
    }

    /// `HINCRBY key field by`.
    fn hincr_by(&mut self, key: &str, field: &str, by: i64) -> StoreResult<i64> {
        self.execute(Command::HIncrBy {
            key: key.into(),
            field: field.into(),
            by,
        })?
        .into_integer()
    }

    /// `SADD key member...`.
    fn sadd<I, M>(&mut self, key: &str, members: I) -> StoreResult<i64>
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        self.execute(Command::SAdd {
            key: key.into(),
            members: members.into_iter().map(Into::into).collect(),
        })?
        .into_integer()
    }

    /// `SREM key member...`.
    fn srem<I, M>(&mut self, key: &str, members: I) -> StoreResult<i64>
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        self.execute(Command::SRem {
            key: key.into(),
            members: members.into_iter().map(Into::into).collect(),
        })?
        .into_integer()
    }

    /// `SMEMBERS key`.
    fn smembers(&mut self, key: &str) -> StoreResult<Vec<String>> {
        self.execute(Command::SMembers { key: key.into() })?
            .into_strings()
    }

    /// `SISMEMBER key member`.
    fn sismember(&mut self, key: &str, member: &str) -> StoreResult<bool> {
        Ok(self
            .execute(Command::SIsMember {
                key: key.into(),
                member: member.into(),
            })?
            .into_integer()?
            == 1)
    }

    /// `SCARD key`.
    fn scard(&mut self, key: &str) -> StoreResult<i64> {
        self.execute(Command::SCard { key: key.into() })?
            .into_integer()
    }

    /// `SINTER key...`.
    fn sinter<I, K>(&mut self, keys: I) -> StoreResult<Vec<String>>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.execute(Command::SInter {
            keys: keys.into_iter().map(Into::into).collect(),
        })?
        .into_strings()
    }
}

impl<K: Keyspace + ?Sized> KeyspaceExt for K {}
