//! Hash chain over audit records
//!
//! Each record hash covers a canonical JSON encoding of every stored field
//! plus the previous record's hash. Both stores compute it here, under their
//! own serialization of inserts, so any store can be checked with
//! `verify_chain`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::record::AuditRecord;
use crate::domain::{BlockchainType, DecisionStatus, SignalSet};

pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Hashed view of a record. Field order is part of the hash.
#[derive(Serialize)]
struct ChainEntry<'a> {
    id: Uuid,
    sequence_number: i64,
    check_id: Uuid,
    fingerprint: &'a str,
    requester_id: &'a str,
    blockchain_type: BlockchainType,
    from_address: &'a str,
    to_address: &'a str,
    amount: String,
    token_id: &'a str,
    status: DecisionStatus,
    risk_score: u8,
    reasoning: &'a [String],
    signals: &'a SignalSet,
    created_at_micros: i64,
    previous_hash: &'a str,
}

impl<'a> ChainEntry<'a> {
    fn new(record: &'a AuditRecord, previous_hash: &'a str) -> Self {
        Self {
            id: record.id,
            sequence_number: record.sequence_number,
            check_id: record.check_id,
            fingerprint: &record.fingerprint,
            requester_id: &record.requester_id,
            blockchain_type: record.blockchain_type,
            from_address: &record.from_address,
            to_address: &record.to_address,
            amount: canonical_amount(record.amount),
            token_id: &record.token_id,
            status: record.status,
            risk_score: record.risk_score,
            reasoning: &record.reasoning,
            signals: &record.signals,
            created_at_micros: canonical_timestamp(record.created_at),
            previous_hash,
        }
    }
}

// Postgres hands NUMERIC back at its stored scale
fn canonical_amount(amount: Decimal) -> String {
    amount.normalize().to_string()
}

// TIMESTAMPTZ keeps microseconds
fn canonical_timestamp(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

/// Hash of one record given its predecessor's hash
pub fn record_hash(record: &AuditRecord, previous_hash: &str) -> Result<String, serde_json::Error> {
    let encoded = serde_json::to_vec(&ChainEntry::new(record, previous_hash))?;
    Ok(sha256_hex(&encoded))
}

/// Result of hash chain verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerificationResult {
    pub is_valid: bool,
    pub entries_checked: u64,
    pub first_invalid_entry: Option<Uuid>,
    pub expected_hash: Option<String>,
    pub actual_hash: Option<String>,
}

/// Verify records given in ascending sequence order, starting at genesis
pub fn verify_chain(records: &[AuditRecord]) -> ChainVerificationResult {
    let mut previous_hash = GENESIS_HASH.to_string();

    for (checked, record) in records.iter().enumerate() {
        if record.previous_hash != previous_hash {
            return invalid(checked, record, previous_hash, record.previous_hash.clone());
        }

        let calculated = match record_hash(record, &previous_hash) {
            Ok(hash) => hash,
            Err(_) => return invalid(checked, record, String::new(), record.record_hash.clone()),
        };
        if calculated != record.record_hash {
            return invalid(checked, record, calculated, record.record_hash.clone());
        }

        previous_hash = record.record_hash.clone();
    }

    ChainVerificationResult {
        is_valid: true,
        entries_checked: records.len() as u64,
        first_invalid_entry: None,
        expected_hash: None,
        actual_hash: None,
    }
}

fn invalid(
    checked: usize,
    record: &AuditRecord,
    expected: String,
    actual: String,
) -> ChainVerificationResult {
    ChainVerificationResult {
        is_valid: false,
        entries_checked: checked as u64 + 1,
        first_invalid_entry: Some(record.id),
        expected_hash: Some(expected),
        actual_hash: Some(actual),
    }
}

/// Calculate SHA-256 hash and return as hex string
fn sha256_hex(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hex::encode(hasher.finalize())
}
