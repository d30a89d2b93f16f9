use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

// ============================================================================
// Canonicalization
// ============================================================================

/// Canonical JSON with recursively sorted object keys. Digests must be
/// reproducible across processes and languages, so serialization order can
/// never depend on map iteration order.
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", Value::String(k.clone()), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", parts.join(","))
        }
        other => other.to_string(),
    }
}

/// SHA-256 of the canonical serialization → `"sha256:<64 hex>"`.
pub fn payload_digest(details: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(details).as_bytes());
    format!("sha256:{:x}", hasher.finalize())
}

/// SHA-256 over raw bytes, for uploaded document content.
pub fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{:x}", hasher.finalize())
}

// ============================================================================
// Trail
// ============================================================================

/// One append-only audit record. The digest is computed exactly once, on
/// append; reads never recompute it. Only an explicit integrity check does.
#[derive(Debug, Clone, Serialize)]
pub struct AuditLogEntry {
    pub entry_id: u64,
    pub actor: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub details: Value,
    pub digest: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct AuditTrail {
    entries: Vec<AuditLogEntry>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(
        &mut self,
        actor: &str,
        action: &str,
        resource_type: &str,
        resource_id: &str,
        details: Value,
    ) {
        let digest = payload_digest(&details);
        self.entries.push(AuditLogEntry {
            entry_id: self.entries.len() as u64,
            actor: actor.to_string(),
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            details,
            digest,
            timestamp: Utc::now(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recent entries first, capped at `limit`.
    pub fn recent(&self, limit: usize) -> Vec<AuditLogEntry> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    /// Recompute every digest and compare. Mismatches are reported, never
    /// repaired; a tampered trail is evidence, not a defect to fix up.
    pub fn verify(&self) -> IntegrityReport {
        let mut mismatches = Vec::new();
        for entry in &self.entries {
            let computed = payload_digest(&entry.details);
            if computed != entry.digest {
                mismatches.push(IntegrityMismatch {
                    entry_id: entry.entry_id,
                    action: entry.action.clone(),
                    timestamp: entry.timestamp,
                    expected_digest: entry.digest.clone(),
                    computed_digest: computed,
                });
            }
        }
        let total = self.entries.len();
        let verified = total - mismatches.len();
        IntegrityReport {
            total_entries: total,
            verified_entries: verified,
            mismatches,
            integrity_score: if total == 0 {
                100.0
            } else {
                verified as f64 / total as f64 * 100.0
            },
        }
    }

    /// Out-of-band mutation of a stored entry, bypassing the digest. Exists
    /// so integrity verification can be exercised; nothing in the operation
    /// surface calls this.
    pub fn tamper_details(&mut self, entry_id: u64, details: Value) -> bool {
        match self.entries.iter_mut().find(|e| e.entry_id == entry_id) {
            Some(entry) => {
                entry.details = details;
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrityMismatch {
    pub entry_id: u64,
    pub action: String,
    pub timestamp: DateTime<Utc>,
    pub expected_digest: String,
    pub computed_digest: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub total_entries: usize,
    pub verified_entries: usize,
    pub mismatches: Vec<IntegrityMismatch>,
    pub integrity_score: f64,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_json_sorts_keys_recursively() {
        let value = json!({
            "zeta": 1,
            "alpha": {"nested_z": [1, 2], "nested_a": "x"},
        });
        assert_eq!(
            canonical_json(&value),
            r#"{"alpha":{"nested_a":"x","nested_z":[1,2]},"zeta":1}"#
        );
    }

    #[test]
    fn digest_is_order_independent() {
        let a = json!({"x": 1, "y": 2});
        let b = json!({"y": 2, "x": 1});
        assert_eq!(payload_digest(&a), payload_digest(&b));
        assert!(payload_digest(&a).starts_with("sha256:"));
        assert_eq!(payload_digest(&a).len(), "sha256:".len() + 64);
    }

    #[test]
    fn content_digest_known_vector() {
        // SHA-256 of empty input
        assert_eq!(
            content_digest(b""),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn clean_trail_verifies() {
        let mut trail = AuditTrail::new();
        assert!(trail.is_empty());
        trail.append("system", "run_created", "run", "1", json!({"name": "FY26"}));
        trail.append("auditor", "sample_created", "sample", "4", json!({"amount": 1200}));
        assert_eq!(trail.len(), 2);
        assert!(!trail.is_empty());

        let report = trail.verify();
        assert!(report.is_clean());
        assert_eq!(report.total_entries, 2);
        assert_eq!(report.verified_entries, 2);
        assert_eq!(report.integrity_score, 100.0);
    }

    #[test]
    fn tampering_is_detected_for_exactly_that_entry() {
        let mut trail = AuditTrail::new();
        trail.append("system", "run_created", "run", "1", json!({"name": "FY26"}));
        trail.append("system", "run_finalized", "run", "1", json!({"samples": 12}));

        assert!(trail.tamper_details(1, json!({"samples": 2})));

        let report = trail.verify();
        assert_eq!(report.mismatches.len(), 1);
        assert_eq!(report.mismatches[0].entry_id, 1);
        assert_eq!(report.verified_entries, 1);
        assert!(!report.is_clean());
        assert!(report.integrity_score < 100.0);
    }

    #[test]
    fn recent_returns_newest_first() {
        let mut trail = AuditTrail::new();
        for i in 0..5 {
            trail.append("system", &format!("action_{i}"), "run", "1", json!({"i": i}));
        }
        let recent = trail.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].action, "action_4");
        assert_eq!(recent[1].action, "action_3");
    }
}
