//! Per-attempt scratch storage shared by read and write steps.

use crate::error::{CoreError, CoreResult};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// Values computed by the read steps of one commit attempt.
///
/// A fresh `Scratch` is created for every attempt and dropped when the
/// attempt ends, so write steps only ever see values read after the most
/// recent watch. Each key is written at most once per attempt.
#[derive(Default)]
pub struct Scratch {
    values: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Scratch {
    /// Creates an empty scratch store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns `Programming` if `key` was already written in this attempt.
    pub fn put<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) -> CoreResult<()> {
        let key = key.into();
        if self.values.contains_key(&key) {
            return Err(CoreError::programming(format!(
                "scratch key {key:?} written twice in one attempt"
            )));
        }
        self.values.insert(key, Box::new(value));
        Ok(())
    }

    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `Programming` if `key` was never written in this attempt or
    /// holds a value of another type.
    pub fn get<T: Any>(&self, key: &str) -> CoreResult<&T> {
        let value = self.values.get(key).ok_or_else(|| {
            CoreError::programming(format!("scratch key {key:?} read but never written"))
        })?;
        value.downcast_ref::<T>().ok_or_else(|| {
            CoreError::programming(format!(
                "scratch key {key:?} holds a value of another type"
            ))
        })
    }

    /// Returns true if `key` was written in this attempt.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Returns the number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if nothing was stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Scratch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.values.keys().map(String::as_str).collect();
        keys.sort_unstable();
        f.debug_struct("Scratch").field("keys", &keys).finish()
    }
}
