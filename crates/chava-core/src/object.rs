//! The Chava object: sealed value, outstanding obligations, evidence.
//!
//! A [`ChavaObject`] is immutable. Every transition (discharge, projection)
//! builds a new value; nothing here mutates an existing version. The
//! plaintext never appears in this type: `ciphertext` is an opaque sealed
//! envelope produced under the key derived from `obligations`.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::crypto::Blake3Hash;
use crate::error::{CoreError, Result};
use crate::evidence::{EvidenceLog, EvidenceRecord};
use crate::types::{Incarnation, ObjectId, Obligation, ObligationSet};

/// One version of a Chava object.
///
/// Locked while `obligations` is non-empty, unlocked once it is empty. The
/// state is derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChavaObject {
    id: ObjectId,
    incarnation: Incarnation,
    ciphertext: Bytes,
    obligations: ObligationSet,
    evidence: EvidenceLog,
    version: u64,
    base_version: Option<u64>,
}

impl ChavaObject {
    /// Assemble a brand-new object at version 0, never persisted, under a
    /// fresh incarnation.
    ///
    /// The caller guarantees `ciphertext` was sealed under the key derived
    /// from `obligations`.
    pub fn new(id: ObjectId, ciphertext: Bytes, obligations: ObligationSet, evidence: EvidenceLog) -> Self {
        Self {
            id,
            incarnation: Incarnation::random(),
            ciphertext,
            obligations,
            evidence,
            version: 0,
            base_version: None,
        }
    }

    /// The next version of this object: same id and lineage, version + 1.
    pub fn next_version(
        &self,
        ciphertext: Bytes,
        obligations: ObligationSet,
        evidence: EvidenceLog,
    ) -> Self {
        Self {
            id: self.id.clone(),
            incarnation: self.incarnation,
            ciphertext,
            obligations,
            evidence,
            version: self.version + 1,
            base_version: self.base_version,
        }
    }

    /// Mark this version as the one currently persisted.
    pub fn persisted(mut self) -> Self {
        self.base_version = Some(self.version);
        self
    }

    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    pub fn incarnation(&self) -> Incarnation {
        self.incarnation
    }

    pub fn ciphertext(&self) -> &Bytes {
        &self.ciphertext
    }

    pub fn obligations(&self) -> &ObligationSet {
        &self.obligations
    }

    pub fn evidence(&self) -> &EvidenceLog {
        &self.evidence
    }

    /// This version's number.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The persisted version this one descends from (`None` if the object
    /// has never been stored). Storage compares against it.
    pub fn base_version(&self) -> Option<u64> {
        self.base_version
    }

    pub fn is_locked(&self) -> bool {
        !self.obligations.is_empty()
    }

    pub fn is_unlocked(&self) -> bool {
        self.obligations.is_empty()
    }

    /// Outstanding obligations in canonical order.
    pub fn outstanding(&self) -> Vec<Obligation> {
        self.obligations.to_vec()
    }

    /// Convert to the persisted exchange format.
    pub fn to_record(&self) -> ObjectRecord {
        ObjectRecord {
            id: self.id.clone(),
            incarnation: self.incarnation,
            ciphertext: self.ciphertext.clone(),
            obligations: self.obligations.to_vec(),
            evidence: self.evidence.records().to_vec(),
            parents: self.evidence.parents().to_vec(),
            version: self.version,
        }
    }

    /// Rebuild from the exchange format.
    ///
    /// The result has no `base_version`; the store layer marks objects it
    /// loads with [`ChavaObject::persisted`]. Chain integrity is not checked
    /// here.
    pub fn from_record(record: ObjectRecord) -> Result<Self> {
        let mut obligations = ObligationSet::new();
        for o in record.obligations {
            if o.kind.is_empty() {
                return Err(CoreError::InvalidKind(o.kind));
            }
            if !obligations.insert(o.clone()) {
                return Err(CoreError::DuplicateObligation {
                    kind: o.kind,
                    scope: o.scope,
                });
            }
        }

        Ok(Self {
            id: record.id,
            incarnation: record.incarnation,
            ciphertext: record.ciphertext,
            obligations,
            evidence: EvidenceLog::from_parts(record.evidence, record.parents),
            version: record.version,
            base_version: None,
        })
    }
}

/// Persisted layout of one object version.
///
/// `obligations` is sorted by `(kind, scope)`. The optimistic-concurrency
/// token is the pair `(incarnation, version)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub id: ObjectId,
    pub incarnation: Incarnation,
    pub ciphertext: Bytes,
    pub obligations: Vec<Obligation>,
    pub evidence: Vec<EvidenceRecord>,
    #[serde(default)]
    pub parents: Vec<Blake3Hash>,
    pub version: u64,
}

impl ObjectRecord {
    /// Serialize to CBOR bytes.
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| CoreError::EncodingError(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
    }

    /// Serialize to JSON for exchange with other tools.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| CoreError::EncodingError(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CoreError::DecodingError(e.to_string()))
    }
}
