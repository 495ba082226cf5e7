use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("peer not registered: {0}")]
    UnknownPeer(String),
    #[error("invalid peer entry: {0}")]
    InvalidEntry(String),
}

/// Service name to base URL, shared by every invoker in the process.
///
/// Readers always see one complete mapping: `register` swaps the whole
/// table at once and never edits it in place.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: RwLock<Arc<HashMap<String, String>>>,
}

impl PeerRegistry {
    pub fn new(peers: HashMap<String, String>) -> Self {
        Self {
            peers: RwLock::new(Arc::new(normalize(peers))),
        }
    }

    pub fn register(&self, peers: HashMap<String, String>) {
        let table = Arc::new(normalize(peers));
        match self.peers.write() {
            Ok(mut guard) => *guard = table,
            Err(poisoned) => *poisoned.into_inner() = table,
        }
    }

    pub fn snapshot(&self) -> Arc<HashMap<String, String>> {
        match self.peers.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn resolve(&self, name: &str) -> Result<String, RegistryError> {
        self.snapshot()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownPeer(name.to_string()))
    }
}

fn normalize(peers: HashMap<String, String>) -> HashMap<String, String> {
    peers
        .into_iter()
        .map(|(name, url)| (name, url.trim_end_matches('/').to_string()))
        .collect()
}

/// Parses `name=url,name=url` as found in `TETHER_PEERS`.
pub fn parse_peers(entries: &str) -> Result<HashMap<String, String>, RegistryError> {
    let mut peers = HashMap::new();
    for entry in entries.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, url) = entry
            .split_once('=')
            .ok_or_else(|| RegistryError::InvalidEntry(entry.to_string()))?;
        let (name, url) = (name.trim(), url.trim());
        if name.is_empty() || url.is_empty() {
            return Err(RegistryError::InvalidEntry(entry.to_string()));
        }
        peers.insert(name.to_string(), url.to_string());
    }
    Ok(peers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_replaces_wholesale() {
        let registry = PeerRegistry::new(parse_peers("brain=http://brain:8000/,mouth=http://mouth").unwrap());
        assert_eq!(registry.resolve("brain").unwrap(), "http://brain:8000");

        let before = registry.snapshot();
        registry.register(parse_peers("mouth=http://mouth:9000").unwrap());
        assert!(matches!(registry.resolve("brain"), Err(RegistryError::UnknownPeer(_))));
        assert_eq!(registry.resolve("mouth").unwrap(), "http://mouth:9000");
        // Earlier snapshots are untouched by the swap.
        assert_eq!(before.len(), 2);
    }

    #[test]
    fn parse_rejects_malformed_entries() {
        assert!(parse_peers("").unwrap().is_empty());
        assert!(matches!(parse_peers("brain"), Err(RegistryError::InvalidEntry(_))));
        assert!(matches!(parse_peers("=http://x"), Err(RegistryError::InvalidEntry(_))));
    }
}
