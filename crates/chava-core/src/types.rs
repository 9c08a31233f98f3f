//! Strong type definitions for Chava.
//!
//! Identifiers and obligation sets are newtypes so that a raw string can't be
//! passed where a canonical set is expected.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::canonical::fingerprint_bytes;
use crate::crypto::Blake3Hash;
use crate::error::{CoreError, Result};

/// Identifier of a stored object.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Create an id from a caller-chosen name. Empty ids are rejected.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(CoreError::InvalidObjectId(id));
        }
        Ok(Self(id))
    }

    /// Generate a random 128-bit id, hex encoded.
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for ObjectId {
    type Error = CoreError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

/// Random tag distinguishing one lifetime of an id from the next.
///
/// A fresh incarnation is drawn whenever an object is created, projected or
/// merged, and carried unchanged by every later version. Storage compares it
/// alongside the version number, so a copy read before a delete can't be
/// written over an object re-created under the same id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Incarnation([u8; 16]);

impl Incarnation {
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for Incarnation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Incarnation({})", hex::encode(self.0))
    }
}

impl fmt::Display for Incarnation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// A `(kind, scope)` verification requirement.
///
/// Ordering is lexicographic by `(kind, scope)`, which is the canonical order
/// used for fingerprinting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Obligation {
    /// Name of the verification predicate.
    pub kind: String,
    /// Path into the value; `""` is the whole value.
    pub scope: String,
}

impl Obligation {
    /// Create an obligation. The kind must be non-empty.
    pub fn new(kind: impl Into<String>, scope: impl Into<String>) -> Result<Self> {
        let kind = kind.into();
        if kind.is_empty() {
            return Err(CoreError::InvalidKind(kind));
        }
        Ok(Self {
            kind,
            scope: scope.into(),
        })
    }

    /// An obligation over the whole value.
    pub fn whole(kind: impl Into<String>) -> Result<Self> {
        Self::new(kind, "")
    }

    pub fn matches(&self, kind: &str, scope: &str) -> bool {
        self.kind == kind && self.scope == scope
    }
}

impl fmt::Display for Obligation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.scope)
    }
}

/// A set of obligations with no duplicate `(kind, scope)` pairs.
///
/// Iteration order is always canonical, independent of insertion order.
///
/// Deserialization goes through [`ObligationSet::from_pairs`], so duplicate
/// pairs and empty kinds are rejected on the way in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Obligation>", into = "Vec<Obligation>")]
pub struct ObligationSet(BTreeSet<Obligation>);

impl ObligationSet {
    /// The empty ("cleared") set.
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Build a set from `(kind, scope)` pairs, rejecting duplicates and
    /// empty kinds.
    pub fn from_pairs<I, K, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, S)>,
        K: Into<String>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for (kind, scope) in pairs {
            let obligation = Obligation::new(kind, scope)?;
            if !set.0.insert(obligation.clone()) {
                return Err(CoreError::DuplicateObligation {
                    kind: obligation.kind,
                    scope: obligation.scope,
                });
            }
        }
        Ok(set)
    }

    /// Insert an obligation. Returns false if it was already present.
    pub fn insert(&mut self, obligation: Obligation) -> bool {
        self.0.insert(obligation)
    }

    /// Remove `(kind, scope)`. Returns the removed obligation if present.
    pub fn remove(&mut self, kind: &str, scope: &str) -> Option<Obligation> {
        let found = self.get(kind, scope)?.clone();
        self.0.remove(&found);
        Some(found)
    }

    pub fn get(&self, kind: &str, scope: &str) -> Option<&Obligation> {
        self.0.iter().find(|o| o.matches(kind, scope))
    }

    pub fn contains(&self, kind: &str, scope: &str) -> bool {
        self.get(kind, scope).is_some()
    }

    /// Whether any outstanding obligation has the given kind.
    pub fn contains_kind(&self, kind: &str) -> bool {
        self.0.iter().any(|o| o.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Obligation> {
        self.0.iter()
    }

    /// Canonical, order-independent serialization of this set.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint(fingerprint_bytes(self))
    }

    /// The obligations as a sorted list.
    pub fn to_vec(&self) -> Vec<Obligation> {
        self.0.iter().cloned().collect()
    }
}

impl FromIterator<Obligation> for ObligationSet {
    fn from_iter<T: IntoIterator<Item = Obligation>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ObligationSet {
    type Item = Obligation;
    type IntoIter = std::collections::btree_set::IntoIter<Obligation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ObligationSet {
    type Item = &'a Obligation;
    type IntoIter = std::collections::btree_set::Iter<'a, Obligation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl TryFrom<Vec<Obligation>> for ObligationSet {
    type Error = CoreError;

    fn try_from(obligations: Vec<Obligation>) -> Result<Self> {
        Self::from_pairs(obligations.into_iter().map(|o| (o.kind, o.scope)))
    }
}

impl From<ObligationSet> for Vec<Obligation> {
    fn from(set: ObligationSet) -> Self {
        set.0.into_iter().collect()
    }
}

impl fmt::Display for ObligationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, o) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", o)?;
        }
        f.write_str("]")
    }
}

/// Canonical bytes of an obligation set, the input to key derivation.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(Vec<u8>);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Short digest, for logs and diagnostics.
    pub fn digest(&self) -> Blake3Hash {
        Blake3Hash::hash(&self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.digest())
    }
}

impl AsRef<[u8]> for Fingerprint {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
