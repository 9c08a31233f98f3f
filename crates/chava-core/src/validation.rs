//! Object validation: evidence chain and obligation accounting.
//!
//! An object is consistent when
//! - its evidence chain recomputes from genesis, and
//! - no record attests an obligation that is still outstanding, and
//! - no `(kind, scope)` is attested twice.

use std::collections::BTreeSet;

use crate::error::IntegrityError;
use crate::object::ChavaObject;

/// Full validation: chain first, then accounting.
pub fn validate_object(object: &ChavaObject) -> Result<(), IntegrityError> {
    object.evidence().verify_chain()?;
    validate_accounting(object)
}

/// Check evidence against the outstanding obligation set, without hashing.
pub fn validate_accounting(object: &ChavaObject) -> Result<(), IntegrityError> {
    let mut seen = BTreeSet::new();
    for record in object.evidence().records() {
        if object.obligations().contains(&record.kind, &record.scope) {
            return Err(IntegrityError::EvidenceForOutstanding {
                kind: record.kind.clone(),
                scope: record.scope.clone(),
            });
        }
        if !seen.insert((record.kind.as_str(), record.scope.as_str())) {
            return Err(IntegrityError::DuplicateEvidence {
                kind: record.kind.clone(),
                scope: record.scope.clone(),
            });
        }
    }
    Ok(())
}
