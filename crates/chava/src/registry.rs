//! The obligation registry: obligation kind to verifier.
//!
//! Populated at startup and read-only afterwards. Registering a kind twice
//! replaces the earlier verifier (last write wins) and logs a warning.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{ChavaError, Result};

/// Outcome of a verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Accepted. `proof` is stored verbatim in the evidence record.
    Pass { proof: Vec<u8> },
    /// Rejected, with a human-readable reason.
    Fail { reason: String },
}

impl Verdict {
    /// Pass with an empty proof.
    pub fn pass() -> Self {
        Verdict::Pass { proof: Vec::new() }
    }

    pub fn pass_with(proof: impl Into<Vec<u8>>) -> Self {
        Verdict::Pass {
            proof: proof.into(),
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Verdict::Fail {
            reason: reason.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass { .. })
    }
}

/// A verification predicate.
///
/// `view` is the sub-value at `scope` (or `null` if the scope doesn't
/// resolve), never the whole value. Implementations must be deterministic
/// for a given `(view, scope)`.
pub trait Verifier: Send + Sync {
    fn verify(&self, view: &Value, scope: &str) -> Verdict;
}

impl<F> Verifier for F
where
    F: Fn(&Value, &str) -> Verdict + Send + Sync,
{
    fn verify(&self, view: &Value, scope: &str) -> Verdict {
        self(view, scope)
    }
}

/// Mapping from obligation kind to verifier.
#[derive(Clone, Default)]
pub struct ObligationRegistry {
    verifiers: BTreeMap<String, Arc<dyn Verifier>>,
}

impl ObligationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `verifier` under `kind`, replacing any earlier one.
    pub fn register(&mut self, kind: impl Into<String>, verifier: impl Verifier + 'static) -> &mut Self {
        let kind = kind.into();
        if self.verifiers.insert(kind.clone(), Arc::new(verifier)).is_some() {
            tracing::warn!(kind = %kind, "verifier re-registered, replacing previous");
        } else {
            tracing::debug!(kind = %kind, "verifier registered");
        }
        self
    }

    /// Builder-style [`ObligationRegistry::register`].
    pub fn with(mut self, kind: impl Into<String>, verifier: impl Verifier + 'static) -> Self {
        self.register(kind, verifier);
        self
    }

    /// The verifier for `kind`.
    pub fn resolve(&self, kind: &str) -> Result<Arc<dyn Verifier>> {
        self.verifiers
            .get(kind)
            .cloned()
            .ok_or_else(|| ChavaError::UnknownObligationKind(kind.to_string()))
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.verifiers.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.verifiers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.verifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verifiers.is_empty()
    }
}

impl fmt::Debug for ObligationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObligationRegistry")
            .field("kinds", &self.verifiers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_unknown_kind() {
        let registry = ObligationRegistry::new();
        assert!(matches!(
            registry.resolve("sql_safe"),
            Err(ChavaError::UnknownObligationKind(k)) if k == "sql_safe"
        ));
    }

    #[test]
    fn test_closure_verifier() {
        let registry = ObligationRegistry::new().with("non_empty", |v: &Value, _: &str| {
            if v.as_str().map_or(false, |s| !s.is_empty()) {
                Verdict::pass()
            } else {
                Verdict::fail("empty")
            }
        });

        let verifier = registry.resolve("non_empty").unwrap();
        assert!(verifier.verify(&json!("x"), "").is_pass());
        assert_eq!(verifier.verify(&json!(""), ""), Verdict::fail("empty"));
    }

    #[test]
    fn test_reregistration_overrides() {
        let mut registry = ObligationRegistry::new();
        registry.register("k", |_: &Value, _: &str| Verdict::fail("old"));
        registry.register("k", |_: &Value, _: &str| Verdict::pass_with(b"new".to_vec()));

        assert_eq!(registry.len(), 1);
        let verdict = registry.resolve("k").unwrap().verify(&Value::Null, "");
        assert_eq!(verdict, Verdict::pass_with(b"new".to_vec()));
    }
}
