//! Random key material and request tokens.

use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};

/// Generate a random 16-byte AES-128 key.
///
/// Uses the system's cryptographically secure random number generator.
///
/// # Example
/// ```
/// use megafs::crypto::make_random_key;
/// let key = make_random_key();
/// assert_eq!(key.len(), 16);
/// ```
pub fn make_random_key() -> [u8; 16] {
    let mut key = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

/// Generate `N` random 32-bit words.
pub fn make_random_words<const N: usize>() -> [u32; N] {
    let mut rng = rand::thread_rng();
    let mut words = [0u32; N];
    for w in words.iter_mut() {
        *w = rng.next_u32();
    }
    words
}

/// Random ASCII alphanumeric string, used as the `i` idempotency token.
pub fn rand_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
