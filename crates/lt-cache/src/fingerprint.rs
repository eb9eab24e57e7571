//! Stable cache identity derived from a parameter assignment.

use serde_json::Value;
use sha2::{Digest, Sha256};

use lt_types::{LatticeResult, ParameterAssignment};

/// Deterministic identity of one parameter assignment. The lowercase hex
/// digest doubles as the artifact file stem under the results directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    hex: String,
}

impl Fingerprint {
    pub fn as_hex(&self) -> &str {
        &self.hex
    }

    /// Rebuild a fingerprint from an artifact file stem found on disk.
    /// Returns `None` for names that are not a SHA-256 hex digest.
    pub fn from_stem(stem: &str) -> Option<Self> {
        if stem.len() == 64 && stem.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            Some(Self {
                hex: stem.to_string(),
            })
        } else {
            None
        }
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.hex)
    }
}

/// Compute the fingerprint of an assignment.
///
/// The assignment is serialized to JSON, canonicalized (object keys sorted
/// recursively), and hashed, so semantically identical assignments built on
/// different code paths always collide to the same identity.
pub fn fingerprint(assignment: &ParameterAssignment) -> LatticeResult<Fingerprint> {
    let serialized = canonical_text(assignment)?;
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    let hash = hasher.finalize();
    let hex = hash
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<String>();
    Ok(Fingerprint { hex })
}

/// Canonical textual form of an assignment: the exact bytes that are hashed,
/// and the exact bytes stored in the `.params` artifact. Comparing this text
/// is how collisions are detected.
pub fn canonical_text(assignment: &ParameterAssignment) -> LatticeResult<String> {
    let value = serde_json::to_value(assignment)?;
    let canonical = canonical_json(&value);
    Ok(serde_json::to_string(&canonical)?)
}

fn canonical_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys = map.keys().cloned().collect::<Vec<_>>();
            keys.sort();
            for key in keys {
                if let Some(val) = map.get(&key) {
                    sorted.insert(key, canonical_json(val));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical_json).collect()),
        other => other.clone(),
    }
}
