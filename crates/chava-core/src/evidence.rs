//! Evidence: an append-only, hash-chained log of discharge records.
//!
//! Each record commits to its predecessor through `prev_hash`; the first
//! record commits to [`GENESIS_HASH`]. Records live in a plain vector indexed
//! by position, and the chain is checked by a linear scan.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::canonical::evidence_hash_input;
use crate::crypto::{Blake3Hash, EVIDENCE_DOMAIN};
use crate::error::IntegrityError;
use crate::types::Obligation;

/// `prev_hash` of the first record in every log.
pub const GENESIS_HASH: Blake3Hash = Blake3Hash::ZERO;

/// A record attesting that one obligation was verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    /// Obligation kind that was discharged.
    pub kind: String,

    /// Obligation scope that was discharged.
    pub scope: String,

    /// Who vouched for it.
    pub verifier_id: String,

    /// When (Unix milliseconds).
    pub timestamp: i64,

    /// Hash of the preceding record, or [`GENESIS_HASH`].
    pub prev_hash: Blake3Hash,

    /// Hash over all other fields.
    pub record_hash: Blake3Hash,

    /// Opaque proof produced by the verifier.
    pub proof: Bytes,
}

impl EvidenceRecord {
    /// Build a record chained after `prev_hash`, computing its hash.
    pub fn new(
        prev_hash: Blake3Hash,
        kind: impl Into<String>,
        scope: impl Into<String>,
        verifier_id: impl Into<String>,
        timestamp: i64,
        proof: impl Into<Bytes>,
    ) -> Self {
        let kind = kind.into();
        let scope = scope.into();
        let verifier_id = verifier_id.into();
        let proof = proof.into();
        let record_hash =
            Self::compute_hash(&prev_hash, &kind, &scope, &verifier_id, timestamp, &proof);
        Self {
            kind,
            scope,
            verifier_id,
            timestamp,
            prev_hash,
            record_hash,
            proof,
        }
    }

    /// `H(prev_hash || kind || scope || verifier_id || timestamp || proof)`.
    pub fn compute_hash(
        prev_hash: &Blake3Hash,
        kind: &str,
        scope: &str,
        verifier_id: &str,
        timestamp: i64,
        proof: &[u8],
    ) -> Blake3Hash {
        let input = evidence_hash_input(prev_hash, kind, scope, verifier_id, timestamp, proof);
        Blake3Hash::derive(EVIDENCE_DOMAIN, &input)
    }

    /// Recompute this record's hash from its fields.
    pub fn recompute_hash(&self) -> Blake3Hash {
        Self::compute_hash(
            &self.prev_hash,
            &self.kind,
            &self.scope,
            &self.verifier_id,
            self.timestamp,
            &self.proof,
        )
    }

    /// The obligation this record discharged.
    pub fn obligation(&self) -> Obligation {
        Obligation {
            kind: self.kind.clone(),
            scope: self.scope.clone(),
        }
    }

    pub fn attests(&self, kind: &str, scope: &str) -> bool {
        self.kind == kind && self.scope == scope
    }
}

/// Recompute every hash and link from genesis.
pub fn verify_chain(records: &[EvidenceRecord]) -> Result<(), IntegrityError> {
    let mut expected_prev = GENESIS_HASH;
    for (position, record) in records.iter().enumerate() {
        if record.prev_hash != expected_prev {
            return Err(IntegrityError::BrokenLink { position });
        }
        if record.recompute_hash() != record.record_hash {
            return Err(IntegrityError::HashMismatch { position });
        }
        expected_prev = record.record_hash;
    }
    Ok(())
}

/// The evidence log of one object version.
///
/// There is no API to remove or edit a record. Derived objects (projections,
/// merges) start a fresh log whose `parents` hold the tips of the logs they
/// came from, as a provenance pointer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceLog {
    records: Vec<EvidenceRecord>,
    parents: Vec<Blake3Hash>,
}

impl EvidenceLog {
    /// An empty log with no provenance.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty log derived from other logs.
    pub fn derived_from(parents: Vec<Blake3Hash>) -> Self {
        Self {
            records: Vec::new(),
            parents,
        }
    }

    /// Reassemble a log from persisted parts. The chain is not checked here;
    /// call [`EvidenceLog::verify_chain`].
    pub fn from_parts(records: Vec<EvidenceRecord>, parents: Vec<Blake3Hash>) -> Self {
        Self { records, parents }
    }

    /// Append a record chained to the current tip and return it.
    pub fn append(
        &mut self,
        kind: impl Into<String>,
        scope: impl Into<String>,
        verifier_id: impl Into<String>,
        timestamp: i64,
        proof: impl Into<Bytes>,
    ) -> &EvidenceRecord {
        let record = EvidenceRecord::new(self.tip(), kind, scope, verifier_id, timestamp, proof);
        self.records.push(record);
        &self.records[self.records.len() - 1]
    }

    /// Hash of the last record, or [`GENESIS_HASH`] for an empty log.
    pub fn tip(&self) -> Blake3Hash {
        self.records
            .last()
            .map(|r| r.record_hash)
            .unwrap_or(GENESIS_HASH)
    }

    pub fn records(&self) -> &[EvidenceRecord] {
        &self.records
    }

    pub fn parents(&self) -> &[Blake3Hash] {
        &self.parents
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&EvidenceRecord> {
        self.records.get(position)
    }

    /// The record attesting `(kind, scope)`, if any.
    pub fn find(&self, kind: &str, scope: &str) -> Option<&EvidenceRecord> {
        self.records.iter().find(|r| r.attests(kind, scope))
    }

    /// Records produced by one verifier, with their positions.
    pub fn by_verifier<'a>(
        &'a self,
        verifier_id: &'a str,
    ) -> impl Iterator<Item = (usize, &'a EvidenceRecord)> + 'a {
        self.records
            .iter()
            .enumerate()
            .filter(move |(_, r)| r.verifier_id == verifier_id)
    }

    pub fn verify_chain(&self) -> Result<(), IntegrityError> {
        verify_chain(&self.records)
    }

    pub fn into_parts(self) -> (Vec<EvidenceRecord>, Vec<Blake3Hash>) {
        (self.records, self.parents)
    }
}
