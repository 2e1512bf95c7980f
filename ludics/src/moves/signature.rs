//! Move signatures: deterministic fingerprints for duplicate detection.
//!
//! Two moves with the same `(dialogue, target type, target id, kind, key)`
//! are the same dialogical act. Fields are length-prefixed before hashing so
//! that no choice of ids can make two different tuples collide by
//! concatenation (`("a:b", "c")` vs `("a", "b:c")`).

use serde::{Deserialize, Serialize};

use super::types::{MoveKind, TargetType};

/// Domain separator mixed into every signature.
const SIGNATURE_DOMAIN: &[u8] = b"ludics.move.v1";

/// Hex-encoded blake3 fingerprint of a move's identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wrap an already computed fingerprint (e.g. read back from a store).
    pub fn from_hex(hex: &str) -> Self {
        Self(hex.to_string())
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn absorb(hasher: &mut blake3::Hasher, field: &[u8]) {
    hasher.update(&(field.len() as u64).to_le_bytes());
    hasher.update(field);
}

/// Compute the signature of a move.
pub fn signature(
    dialogue_id: &str,
    target_type: TargetType,
    target_id: &str,
    kind: MoveKind,
    key: &str,
) -> Signature {
    let mut hasher = blake3::Hasher::new();
    absorb(&mut hasher, SIGNATURE_DOMAIN);
    absorb(&mut hasher, dialogue_id.as_bytes());
    absorb(&mut hasher, target_type.to_string().as_bytes());
    absorb(&mut hasher, target_id.as_bytes());
    absorb(&mut hasher, kind.as_str().as_bytes());
    absorb(&mut hasher, key.as_bytes());
    Signature(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let a = signature("d1", TargetType::Claim, "c1", MoveKind::Why, "default");
        let b = signature("d1", TargetType::Claim, "c1", MoveKind::Why, "default");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_every_field_matters() {
        let base = signature("d1", TargetType::Claim, "c1", MoveKind::Why, "k");
        assert_ne!(base, signature("d2", TargetType::Claim, "c1", MoveKind::Why, "k"));
        assert_ne!(base, signature("d1", TargetType::Argument, "c1", MoveKind::Why, "k"));
        assert_ne!(base, signature("d1", TargetType::Claim, "c2", MoveKind::Why, "k"));
        assert_ne!(base, signature("d1", TargetType::Claim, "c1", MoveKind::Grounds, "k"));
        assert_ne!(base, signature("d1", TargetType::Claim, "c1", MoveKind::Why, "k2"));
    }

    #[test]
    fn test_no_concatenation_collisions() {
        let a = signature("d:1", TargetType::Claim, "c", MoveKind::Why, "k");
        let b = signature("d", TargetType::Claim, "1:c", MoveKind::Why, "k");
        assert_ne!(a, b);

        let c = signature("d1", TargetType::Claim, "ab", MoveKind::Why, "c");
        let d = signature("d1", TargetType::Claim, "a", MoveKind::Why, "bc");
        assert_ne!(c, d);
    }

    #[test]
    fn test_serde_transparent() {
        let sig = signature("d1", TargetType::Claim, "c1", MoveKind::Close, "@0.1");
        let json = serde_json::to_string(&sig).unwrap();
        assert_eq!(json, format!("\"{}\"", sig));
    }
}
