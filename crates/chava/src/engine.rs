//! The discharge engine: pure transitions over [`ChavaObject`].
//!
//! Every function here takes the key manager as an explicit argument, does
//! no I/O, and returns a new object instead of modifying its input.
//!
//! Discharge proceeds in this order:
//! 1. check the obligation is outstanding
//! 2. open the ciphertext under the key for the current obligations
//! 3. run the verifier on the scoped view
//! 4. on pass, shrink the set, append evidence, and re-seal under the new key
//!
//! A failure at any step leaves the input untouched.

use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde_json::Value;

use chava_core::{
    validate_object, ChavaObject, CoreError, EvidenceLog, ObjectId, Obligation, ObligationSet,
    ScopePath,
};
use chava_crypto::{open_for, seal_for, KeyManager};

use crate::error::{ChavaError, Result};
use crate::registry::{ObligationRegistry, Verdict};

/// Current time in Unix milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Seal `value` into a new object owing `obligations`.
///
/// Every scope must parse as a dotted path or JSON Pointer, and no two
/// obligations of one kind may name the same path in different spellings
/// (`address` and `/address`).
pub fn create(
    keys: &dyn KeyManager,
    id: ObjectId,
    value: &Value,
    obligations: ObligationSet,
) -> Result<ChavaObject> {
    let mut paths = BTreeSet::new();
    for o in &obligations {
        let path = ScopePath::parse(&o.scope)?;
        if !paths.insert((o.kind.as_str(), path.components().to_vec())) {
            return Err(CoreError::DuplicateObligation {
                kind: o.kind.clone(),
                scope: o.scope.clone(),
            }
            .into());
        }
    }
    let evidence = EvidenceLog::new();
    let ciphertext = seal_value(keys, &id, &evidence, &obligations, value)?;
    Ok(ChavaObject::new(id, ciphertext, obligations, evidence))
}

/// Discharge `(kind, scope)` at the current time.
pub fn discharge(
    keys: &dyn KeyManager,
    registry: &ObligationRegistry,
    object: &ChavaObject,
    kind: &str,
    scope: &str,
    verifier_id: &str,
) -> Result<ChavaObject> {
    discharge_at(keys, registry, object, kind, scope, verifier_id, now_millis())
}

/// Discharge `(kind, scope)`, stamping the evidence with `timestamp`.
pub fn discharge_at(
    keys: &dyn KeyManager,
    registry: &ObligationRegistry,
    object: &ChavaObject,
    kind: &str,
    scope: &str,
    verifier_id: &str,
    timestamp: i64,
) -> Result<ChavaObject> {
    if !object.obligations().contains(kind, scope) {
        return Err(ChavaError::ObligationNotFound {
            kind: kind.to_string(),
            scope: scope.to_string(),
        });
    }

    let value = open_value(keys, object)?;

    let verifier = registry.resolve(kind)?;
    let view = ScopePath::parse(scope)?
        .resolve(&value)
        .cloned()
        .unwrap_or(Value::Null);

    let proof = match verifier.verify(&view, scope) {
        Verdict::Pass { proof } => proof,
        Verdict::Fail { reason } => {
            tracing::debug!(object_id = %object.id(), kind, scope, "verifier rejected value");
            return Err(ChavaError::VerificationFailure {
                kind: kind.to_string(),
                scope: scope.to_string(),
                reason,
            });
        }
    };

    let mut obligations = object.obligations().clone();
    obligations.remove(kind, scope);

    let mut evidence = object.evidence().clone();
    evidence.append(kind, scope, verifier_id, timestamp, proof);

    let ciphertext = seal_value(keys, object.id(), &evidence, &obligations, &value)?;
    let next = object.next_version(ciphertext, obligations, evidence);

    tracing::debug!(
        object_id = %next.id(),
        kind,
        scope,
        verifier_id,
        version = next.version(),
        remaining = next.obligations().len(),
        "obligation discharged"
    );
    Ok(next)
}

/// The plaintext value, if nothing is outstanding and the evidence chain
/// is intact.
pub fn unwrap(keys: &dyn KeyManager, object: &ChavaObject) -> Result<Value> {
    if object.is_locked() {
        return Err(ChavaError::ObligationViolation {
            outstanding: object.outstanding(),
        });
    }
    validate_object(object)?;
    open_value(keys, object)
}

/// Extract the sub-value at `path` as an independent object.
///
/// The projection owes exactly the obligations scoped at or below `path`,
/// re-anchored so their scopes are relative to the sub-value. It gets a
/// fresh id and an empty evidence log that points at the source's tip.
pub fn project(keys: &dyn KeyManager, object: &ChavaObject, path: &str) -> Result<ChavaObject> {
    let value = open_value(keys, object)?;
    let target = ScopePath::parse(path)?;
    let sub = target
        .resolve(&value)
        .ok_or_else(|| ChavaError::PathNotFound(path.to_string()))?;

    let mut obligations = ObligationSet::new();
    for o in object.obligations() {
        if let Some(relative) = ScopePath::parse(&o.scope)?.relative_to(&target) {
            let inherited = Obligation::new(o.kind.clone(), relative.to_string())?;
            if !obligations.insert(inherited) {
                return Err(CoreError::DuplicateObligation {
                    kind: o.kind.clone(),
                    scope: o.scope.clone(),
                }
                .into());
            }
        }
    }

    let id = ObjectId::random();
    let evidence = EvidenceLog::derived_from(vec![object.evidence().tip()]);
    let ciphertext = seal_value(keys, &id, &evidence, &obligations, sub)?;

    tracing::debug!(
        source = %object.id(),
        object_id = %id,
        path,
        inherited = obligations.len(),
        "projected object"
    );
    Ok(ChavaObject::new(id, ciphertext, obligations, evidence))
}

/// Conjoin two objects: the value is `[a, b]` and the result owes both
/// obligation sets, re-scoped under `0` and `1`.
pub fn merge(keys: &dyn KeyManager, a: &ChavaObject, b: &ChavaObject) -> Result<ChavaObject> {
    let left = open_value(keys, a)?;
    let right = open_value(keys, b)?;

    let mut obligations = ObligationSet::new();
    for (slot, source) in [("0", a), ("1", b)] {
        for o in source.obligations() {
            let scope = ScopePath::parse(&o.scope)?.prefixed(slot);
            obligations.insert(Obligation::new(o.kind.clone(), scope.to_string())?);
        }
    }

    let id = ObjectId::random();
    let value = Value::Array(vec![left, right]);
    let evidence = EvidenceLog::derived_from(vec![a.evidence().tip(), b.evidence().tip()]);
    let ciphertext = seal_value(keys, &id, &evidence, &obligations, &value)?;

    Ok(ChavaObject::new(id, ciphertext, obligations, evidence))
}

/// The objects with nothing outstanding.
pub fn filter_cleared<'a, I>(objects: I) -> impl Iterator<Item = &'a ChavaObject>
where
    I: IntoIterator<Item = &'a ChavaObject>,
{
    objects.into_iter().filter(|o| o.is_unlocked())
}

fn seal_value(
    keys: &dyn KeyManager,
    id: &ObjectId,
    evidence: &EvidenceLog,
    obligations: &ObligationSet,
    value: &Value,
) -> Result<Bytes> {
    let plaintext = serde_json::to_vec(value).map_err(|e| ChavaError::Encoding(e.to_string()))?;
    Ok(seal_for(keys, id, evidence, obligations, &plaintext)?.into())
}

fn open_value(keys: &dyn KeyManager, object: &ChavaObject) -> Result<Value> {
    let plaintext = open_for(
        keys,
        object.id(),
        object.evidence(),
        object.obligations(),
        object.ciphertext(),
    )?;
    // The serde error would quote the offending input, so it isn't passed on.
    serde_json::from_slice(&plaintext)
        .map_err(|_| ChavaError::Encoding("sealed value is not valid JSON".to_string()))
}
