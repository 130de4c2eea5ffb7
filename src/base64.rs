//! MEGA-style URL-safe base64 encoding/decoding.
//!
//! MEGA encodes keys, handles and attribute blobs with the URL-safe
//! alphabet and no `=` padding. Decoding is lenient: the standard `+`/`/`
//! alphabet and trailing padding are accepted as well.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

/// Encode bytes to MEGA's URL-safe base64 (no padding).
///
/// # Example
/// ```
/// use megafs::base64::base64url_encode;
/// let encoded = base64url_encode(b"hello");
/// assert_eq!(encoded, "aGVsbG8");
/// ```
pub fn base64url_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decode MEGA's URL-safe base64 to bytes.
///
/// # Example
/// ```
/// use megafs::base64::{base64url_encode, base64url_decode};
/// let original = b"hello world";
/// let encoded = base64url_encode(original);
/// let decoded = base64url_decode(&encoded).unwrap();
/// assert_eq!(decoded, original);
/// ```
pub fn base64url_decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let normalized: String = s
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();

    URL_SAFE_NO_PAD.decode(normalized.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let original = b"Hello, MEGA!";
        let encoded = base64url_encode(original);
        let decoded = base64url_decode(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_url_safe_chars() {
        let data: Vec<u8> = (0..=255).collect();
        let encoded = base64url_encode(&data);
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        assert!(!encoded.contains('='));
    }

    #[test]
    fn test_decode_accepts_standard_alphabet() {
        let data = [0xfbu8, 0xff, 0xbf];
        assert_eq!(base64url_encode(&data), "-_-_");
        assert_eq!(base64url_decode("+/+/").unwrap(), data);
        assert_eq!(base64url_decode("-_-_").unwrap(), data);
    }

    #[test]
    fn test_decode_accepts_padding() {
        assert_eq!(base64url_decode("aGk=").unwrap(), b"hi");
        assert_eq!(base64url_decode("aGk").unwrap(), b"hi");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(base64url_decode("a$b").is_err());
    }
}
