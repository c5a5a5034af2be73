//! Property-based test generators using proptest.
//!
//! Values are drawn from small pools so generated operations collide on
//! ids, index values and unique values often enough to exercise cleanup
//! and rejection paths.

use kvmodel_core::{DeleteRequest, PersistRequest, RecordId};
use proptest::prelude::*;

/// Strategy for generating valid namespaces.
pub fn namespace_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-z]{0,8}").expect("Invalid regex")
}

/// Strategy for generating index and unique field names.
pub fn field_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["name", "status", "tag", "email", "slug"]).prop_map(String::from)
}

/// Strategy for generating stored values, separators included.
pub fn value_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c", "x:y", "a@x.com", "http://h"])
        .prop_map(String::from)
}

/// Strategy for generating ids from a pool of `pool` candidates (`"1"` to
/// `pool`).
pub fn record_id_strategy(pool: u32) -> impl Strategy<Value = RecordId> {
    (1..=pool.max(1)).prop_map(|n| RecordId::from(n.to_string()))
}

/// Strategy for generating persist requests in `namespace`.
///
/// Roughly half of the requests name an existing id from the pool.
pub fn persist_request_strategy(
    namespace: String,
    id_pool: u32,
) -> impl Strategy<Value = PersistRequest> {
    (
        prop::option::of(record_id_strategy(id_pool)),
        prop::collection::vec((field_strategy(), value_strategy()), 0..4),
        prop::collection::btree_map(
            field_strategy(),
            prop::collection::vec(value_strategy(), 1..3),
            0..3,
        ),
        prop::collection::btree_map(field_strategy(), value_strategy(), 0..2),
    )
        .prop_map(move |(id, attributes, indices, uniques)| PersistRequest {
            namespace: namespace.clone(),
            id,
            attributes,
            indices,
            uniques,
        })
}

/// An operation against a single namespace.
#[derive(Debug, Clone)]
pub enum RecordOperation {
    /// Create or update a record.
    Persist(PersistRequest),
    /// Delete a record.
    Delete(DeleteRequest),
}

/// Strategy for generating a sequence of record operations in `namespace`.
pub fn operations_strategy(
    namespace: String,
    id_pool: u32,
    max_len: usize,
) -> impl Strategy<Value = Vec<RecordOperation>> {
    let delete_namespace = namespace.clone();
    let operation = prop_oneof![
        3 => persist_request_strategy(namespace, id_pool).prop_map(RecordOperation::Persist),
        1 => record_id_strategy(id_pool).prop_map(move |id| {
            RecordOperation::Delete(DeleteRequest::new(delete_namespace.clone(), id))
        }),
    ];
    prop::collection::vec(operation, 1..=max_len.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_requests_are_valid(
            request in persist_request_strategy("User".to_string(), 5)
        ) {
            prop_assert!(request.validate().is_ok());
        }

        #[test]
        fn generated_namespaces_are_valid(namespace in namespace_strategy()) {
            prop_assert!(PersistRequest::new(namespace).validate().is_ok());
        }
    }
}
