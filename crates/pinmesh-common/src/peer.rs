//! Peer identity.
//!
//! Every cluster member is identified by a stable [`PeerId`]: the 32-byte
//! public half of an ed25519 keypair. PeerIds are rendered as lowercase hex
//! everywhere they appear in text (wire messages, config files, log lines,
//! map keys).

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::protocol::error::{ClusterError, Result};

/// Stable cryptographic identity of a cluster member.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId([u8; 32]);

impl PeerId {
    /// Wraps raw public key bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        PeerId(bytes)
    }

    /// The peer id derived from a verifying (public) key.
    pub fn from_public_key(key: &VerifyingKey) -> Self {
        PeerId(key.to_bytes())
    }

    /// The peer id owning the given signing key.
    pub fn from_keypair(key: &SigningKey) -> Self {
        Self::from_public_key(&key.verifying_key())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The ed25519 public key this id wraps.
    ///
    /// Fails if the bytes do not decode to a valid curve point, which can
    /// only happen for ids parsed from untrusted input.
    pub fn public_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.0)
            .map_err(|e| ClusterError::Config(format!("invalid peer public key: {}", e)))
    }

    /// Short prefix used in log output.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.short())
    }
}

impl FromStr for PeerId {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| ClusterError::Address(format!("invalid peer id '{}': {}", s, e)))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ClusterError::Address(format!("peer id '{}' is not 32 bytes", s)))?;
        Ok(PeerId(bytes))
    }
}

impl Serialize for PeerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PeerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct PeerIdVisitor;

        impl Visitor<'_> for PeerIdVisitor {
            type Value = PeerId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a hex-encoded 32-byte peer id")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<PeerId, E> {
                v.parse().map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(PeerIdVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    fn fresh_id() -> PeerId {
        let key = SigningKey::generate(&mut OsRng);
        PeerId::from_keypair(&key)
    }

    #[test]
    fn test_peer_id_display_roundtrip() {
        let pid = fresh_id();
        let text = pid.to_string();
        assert_eq!(text.len(), 64);
        let parsed: PeerId = text.parse().unwrap();
        assert_eq!(pid, parsed);
    }

    #[test]
    fn test_peer_id_rejects_bad_input() {
        assert!("not-hex".parse::<PeerId>().is_err());
        assert!("abcd".parse::<PeerId>().is_err()); // too short
    }

    #[test]
    fn test_peer_id_serde_as_string() {
        let pid = fresh_id();
        let json = serde_json::to_string(&pid).unwrap();
        assert_eq!(json, format!("\"{}\"", pid));
        let back: PeerId = serde_json::from_str(&json).unwrap();
        assert_eq!(pid, back);
    }

    #[test]
    fn test_peer_id_as_map_key() {
        use std::collections::HashMap;

        let pid = fresh_id();
        let mut map = HashMap::new();
        map.insert(pid, 42u32);
        let json = serde_json::to_string(&map).unwrap();
        let back: HashMap<PeerId, u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(&pid), Some(&42));
    }

    #[test]
    fn test_peer_id_public_key() {
        let key = SigningKey::generate(&mut OsRng);
        let pid = PeerId::from_keypair(&key);
        let vk = pid.public_key().unwrap();
        assert_eq!(vk, key.verifying_key());
    }
}
