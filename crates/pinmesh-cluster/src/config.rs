//! Cluster peer configuration.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use pinmesh_common::{ClusterError, Multiaddr, PeerId, Result};

fn default_state_sync_seconds() -> u64 {
    60
}

fn default_ready_timeout_secs() -> u64 {
    30
}

/// Configuration of a single cluster peer.
///
/// Loaded from and saved to a JSON file. The identity fields (`id`,
/// `private_key`) are generated once with [`ClusterConfig::generate`] and
/// must stay consistent: [`ClusterConfig::validate`] rejects a config whose
/// id does not match its key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// This peer's id (hex ed25519 public key)
    pub id: PeerId,
    /// Base64 ed25519 signing key
    pub private_key: String,
    /// Listen address for the cluster RPC protocol
    pub cluster_addr: Multiaddr,
    /// Authoritative initial peer list. When non-empty, bootstrap is
    /// skipped entirely.
    #[serde(default)]
    pub cluster_peers: Vec<Multiaddr>,
    /// Fallback entry points, tried in order when `cluster_peers` is empty
    #[serde(default)]
    pub bootstrap: Vec<Multiaddr>,
    /// Durable log location, handed to the consensus builder
    pub consensus_data_folder: PathBuf,
    /// Where the peer roster snapshot is written on shutdown
    pub peer_store_file: PathBuf,
    /// Period of the state reconciler, in seconds
    #[serde(default = "default_state_sync_seconds")]
    pub state_sync_seconds: u64,
    /// Remove ourselves from the consensus peer set before exiting
    #[serde(default)]
    pub leave_on_shutdown: bool,
    /// How long to wait for consensus readiness before giving up
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,
}

impl ClusterConfig {
    /// Creates a configuration with a fresh ed25519 identity.
    ///
    /// `data_dir` is the root under which the consensus log and the peer
    /// roster snapshot are kept.
    pub fn generate(cluster_addr: Multiaddr, data_dir: &Path) -> Self {
        let key = SigningKey::generate(&mut OsRng);
        ClusterConfig {
            id: PeerId::from_keypair(&key),
            private_key: BASE64.encode(key.to_bytes()),
            cluster_addr,
            cluster_peers: Vec::new(),
            bootstrap: Vec::new(),
            consensus_data_folder: data_dir.join("consensus"),
            peer_store_file: data_dir.join("peerstore.json"),
            state_sync_seconds: default_state_sync_seconds(),
            leave_on_shutdown: false,
            ready_timeout_secs: default_ready_timeout_secs(),
        }
    }

    /// Decodes the signing key.
    pub fn keypair(&self) -> Result<SigningKey> {
        let bytes = BASE64
            .decode(&self.private_key)
            .map_err(|e| ClusterError::Config(format!("bad private key: {}", e)))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ClusterError::Config("private key is not 32 bytes".to_string()))?;
        Ok(SigningKey::from_bytes(&bytes))
    }

    /// The peer's public key, base64-encoded for the ID record.
    pub fn public_key_b64(&self) -> Result<String> {
        let key = self.keypair()?;
        Ok(BASE64.encode(key.verifying_key().to_bytes()))
    }

    /// Checks identity consistency and option sanity.
    pub fn validate(&self) -> Result<()> {
        let key = self.keypair()?;
        if PeerId::from_keypair(&key) != self.id {
            return Err(ClusterError::Config(
                "id does not match the configured private key".to_string(),
            ));
        }
        if self.cluster_addr.peer().is_some_and(|pid| pid != self.id) {
            return Err(ClusterError::Config(
                "cluster_addr names a different peer".to_string(),
            ));
        }
        if self.state_sync_seconds == 0 {
            return Err(ClusterError::Config("state_sync_seconds must be > 0".to_string()));
        }
        if self.ready_timeout_secs == 0 {
            return Err(ClusterError::Config("ready_timeout_secs must be > 0".to_string()));
        }
        Ok(())
    }

    /// Reads a configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let config: ClusterConfig = serde_json::from_slice(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Writes this configuration as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}
