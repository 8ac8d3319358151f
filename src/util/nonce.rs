use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static NONCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Builds an opaque `state` value for an authorization request.
///
/// Hashes the seed with the wall clock, the process id and a process-wide
/// counter, so two logins in the same nanosecond still differ.
pub fn oauth_state_nonce(seed: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let count = NONCE_COUNTER.fetch_add(1, Ordering::Relaxed);

    let input = format!("{}|{}|{}|{}", seed, nanos, std::process::id(), count);
    let hash = Sha256::digest(input.as_bytes());
    let hex = format!("{:x}", hash);
    hex[..32].to_string()
}
