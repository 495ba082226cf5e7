//! Short-lived shared-secret keys that let services call each other's
//! operations without a user session.
//!
//! A key is `<hex hmac-sha256(secret, ts)>:<ts>` where `ts` is unix
//! seconds; it is accepted while `ts` is within the window of now.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::time::{Clock, SystemClock};

type HmacSha256 = Hmac<Sha256>;

/// Body field carrying the key.
pub const FIELD: &str = "_internal_";

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct InternalKey {
    secret: Vec<u8>,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for InternalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InternalKey")
            .field("secret", &"<redacted>")
            .field("window", &self.window)
            .finish()
    }
}

impl InternalKey {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            window: DEFAULT_WINDOW,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn mac(&self, timestamp: u64) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).ok()?;
        mac.update(timestamp.to_string().as_bytes());
        Some(mac)
    }

    pub fn generate(&self) -> String {
        let timestamp = self.clock.now_secs();
        let digest = self
            .mac(timestamp)
            .map(|mac| hex::encode(mac.finalize().into_bytes()))
            .unwrap_or_default();
        format!("{digest}:{timestamp}")
    }

    pub fn verify(&self, key: &str) -> bool {
        let Some((digest, timestamp)) = key.split_once(':') else {
            return false;
        };
        let Ok(timestamp) = timestamp.parse::<u64>() else {
            return false;
        };
        if self.clock.now_secs().abs_diff(timestamp) > self.window.as_secs() {
            return false;
        }
        let Ok(digest) = hex::decode(digest) else {
            return false;
        };
        self.mac(timestamp)
            .is_some_and(|mac| mac.verify_slice(&digest).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct ManualClock(AtomicU64);

    impl Clock for ManualClock {
        fn now_secs(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn generated_keys_verify_within_window() {
        let clock = Arc::new(ManualClock(AtomicU64::new(10_000)));
        let key = InternalKey::new("salt").with_clock(clock.clone());
        let issued = key.generate();
        assert!(key.verify(&issued));

        clock.0.store(10_005, Ordering::SeqCst);
        assert!(key.verify(&issued));

        clock.0.store(10_006, Ordering::SeqCst);
        assert!(!key.verify(&issued));
    }

    #[test]
    fn wrong_secret_or_garbage_is_rejected() {
        let issued = InternalKey::new("salt").generate();
        assert!(!InternalKey::new("pepper").verify(&issued));
        assert!(!InternalKey::new("salt").verify("nope"));
        assert!(!InternalKey::new("salt").verify("zz:12"));
        assert!(!InternalKey::new("salt").verify(""));
    }

    #[test]
    fn debug_hides_secret() {
        let rendered = format!("{:?}", InternalKey::new("hunter2"));
        assert!(!rendered.contains("hunter2"));
    }
}
