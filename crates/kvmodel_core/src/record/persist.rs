//! The persist protocol.

use crate::error::{CoreError, CoreResult};
use crate::record::keys::Keys;
use crate::record::membership;
use crate::record::request::PersistRequest;
use crate::types::RecordId;
use kvmodel_store::{Keyspace, KeyspaceExt};
use tracing::debug;

/// Creates or updates one record inside an atomic batch.
///
/// Steps, in order:
///
/// 1. Reject with [`CoreError::UniqueIndexViolation`] if another record owns
///    any requested unique value. Nothing has been written at that point.
/// 2. Allocate the next free id from the namespace sequence if none was
///    given, skipping values already used by caller-supplied ids.
/// 3. Replace the attribute hash with the non-empty attributes.
/// 4. Add the id to the namespace's all-ids set.
/// 5. Drop every tracked index membership, then index under the requested values.
/// 6. Same for unique claims.
///
/// Must run inside [`kvmodel_store::Store::multi`] so the steps are
/// indivisible and the batch is discarded on error.
///
/// # Errors
///
/// Returns `InvalidRequest` for a malformed request,
/// `UniqueIndexViolation` naming the first conflicting field, or any store
/// error.
pub fn persist(ks: &mut dyn Keyspace, request: &PersistRequest) -> CoreResult<RecordId> {
    request.validate()?;
    let keys = Keys::new(&request.namespace);

    if let Some(field) =
        membership::find_unique_conflict(ks, &keys, request.id.as_ref(), &request.uniques)?
    {
        debug!(
            namespace = %request.namespace,
            field = %field,
            "persist rejected by unique constraint"
        );
        return Err(CoreError::unique_violation(field));
    }

    let id = match &request.id {
        Some(id) => id.clone(),
        None => allocate_id(ks, &keys)?,
    };

    let record_key = keys.record(&id);
    ks.del([record_key.as_str()])?;
    let stored: Vec<(&str, &str)> = request
        .attributes
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();
    if !stored.is_empty() {
        ks.hset(&record_key, stored)?;
    }

    ks.sadd(&keys.all(), [id.as_str()])?;

    membership::clear_indices(ks, &keys, &id)?;
    membership::track_indices(ks, &keys, &id, &request.indices)?;

    membership::clear_uniques(ks, &keys, &id)?;
    membership::track_uniques(ks, &keys, &id, &request.uniques)?;

    debug!(namespace = %request.namespace, id = %id, "record persisted");
    Ok(id)
}

/// Draws the next sequence value not already taken by a caller-supplied id.
fn allocate_id(ks: &mut dyn Keyspace, keys: &Keys) -> CoreResult<RecordId> {
    let all = keys.all();
    loop {
        let id = RecordId::from(ks.incr(&keys.sequence())?);
        if !ks.sismember(&all, id.as_str())? {
            return Ok(id);
        }
        debug!(id = %id, "sequence value already in use, skipping");
    }
}
