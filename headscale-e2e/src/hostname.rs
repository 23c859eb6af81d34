//! Container hostnames: a fixed prefix plus a random DNS-safe suffix

use rand::Rng;

/// Prefix of every generated hostname
pub const HOSTNAME_PREFIX: &str = "hs";

/// Length of the random suffix
pub const HOSTNAME_HASH_LENGTH: usize = 10;

const DNS_SAFE_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Random lowercase alphanumeric string, usable in DNS labels and container names.
///
/// Collision avoidance only; not suitable for secrets.
pub fn random_dns_safe(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| DNS_SAFE_CHARSET[rng.gen_range(0..DNS_SAFE_CHARSET.len())] as char)
        .collect()
}

/// A fresh hostname such as `hs-k3j9x0q2ab`.
pub fn generate_hostname() -> String {
    format!("{}-{}", HOSTNAME_PREFIX, random_dns_safe(HOSTNAME_HASH_LENGTH))
}
