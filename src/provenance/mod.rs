// src/provenance/mod.rs

//! Run ledger: a hash-chained record of what went into a study and what came out.

use crate::StudyResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// File name of the ledger inside the output directory.
pub const LEDGER_FILE: &str = "provenance.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Parameters,
    Geometry,
    Sweep,
}

/// One stage of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub timestamp: DateTime<Utc>,
    pub stage: Stage,
    /// SHA-256 of the stage payload, serialized as JSON.
    pub payload_hash: String,
    pub tool_version: String,
    pub previous_entry_hash: Option<String>,
    pub metadata: serde_json::Value,
}

impl LedgerEntry {
    /// Hash of the whole entry, which the next entry links to.
    pub fn entry_hash(&self) -> StudyResult<String> {
        let serialized = serde_json::to_vec(self)?;
        Ok(sha256_hex(&serialized))
    }
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, Default)]
pub struct RunLedger {
    entries: Vec<LedgerEntry>,
}

impl RunLedger {
    pub fn new() -> Self {
        RunLedger { entries: Vec::new() }
    }

    /// Appends `payload` under `stage`, linked to the previous entry.
    pub fn record<T: Serialize + ?Sized>(
        &mut self,
        stage: Stage,
        payload: &T,
        metadata: serde_json::Value,
    ) -> StudyResult<()> {
        let payload_hash = sha256_hex(&serde_json::to_vec(payload)?);
        let previous_entry_hash = self.entries.last().map(LedgerEntry::entry_hash).transpose()?;
        tracing::debug!(stage = ?stage, hash = %payload_hash, "ledger entry");
        self.entries.push(LedgerEntry {
            timestamp: Utc::now(),
            stage,
            payload_hash,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            previous_entry_hash,
            metadata,
        });
        Ok(())
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Whether every entry links to the hash of the one before it.
    pub fn verify(&self) -> StudyResult<bool> {
        let mut expected: Option<String> = None;
        for entry in &self.entries {
            if entry.previous_entry_hash != expected {
                return Ok(false);
            }
            expected = Some(entry.entry_hash()?);
        }
        Ok(true)
    }

    pub fn to_json(&self) -> StudyResult<String> {
        Ok(serde_json::to_string_pretty(&self.entries)?)
    }

    pub fn from_json(json: &str) -> StudyResult<Self> {
        Ok(RunLedger { entries: serde_json::from_str(json)? })
    }

    /// Writes the ledger as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> StudyResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        tracing::info!(path = %path.display(), entries = self.entries.len(), "wrote run ledger");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> RunLedger {
        let mut ledger = RunLedger::new();
        ledger.record(Stage::Parameters, &[1.0, 2.0], serde_json::json!({"source": "Parameters.yml"})).unwrap();
        ledger.record(Stage::Geometry, "regions", serde_json::json!({"regions": 11})).unwrap();
        ledger.record(Stage::Sweep, &vec![0.5; 3], serde_json::Value::Null).unwrap();
        ledger
    }

    #[test]
    fn test_entries_link_to_previous_hash() {
        let ledger = ledger();
        let entries = ledger.entries();
        assert!(entries[0].previous_entry_hash.is_none());
        assert_eq!(entries[1].previous_entry_hash, Some(entries[0].entry_hash().unwrap()));
        assert_eq!(entries[2].previous_entry_hash, Some(entries[1].entry_hash().unwrap()));
        assert!(ledger.verify().unwrap());
    }

    #[test]
    fn test_payload_hash_is_sha256_of_json() {
        let ledger = ledger();
        assert_eq!(ledger.entries()[1].payload_hash, sha256_hex(b"\"regions\""));
        assert_eq!(ledger.entries()[0].payload_hash.len(), 64);
    }

    #[test]
    fn test_tampering_breaks_verification() {
        let ledger = ledger();
        let mut entries = ledger.entries().to_vec();
        entries[1].metadata = serde_json::json!({"regions": 12});
        let tampered = RunLedger { entries };
        assert!(!tampered.verify().unwrap());
    }

    #[test]
    fn test_json_round_trip_keeps_chain_valid() {
        let ledger = ledger();
        let json = ledger.to_json().unwrap();
        assert!(json.contains("\"stage\": \"geometry\""));

        let restored = RunLedger::from_json(&json).unwrap();
        assert_eq!(restored.entries().len(), 3);
        assert_eq!(restored.entries()[2].stage, Stage::Sweep);
        assert!(restored.verify().unwrap());
    }
}
