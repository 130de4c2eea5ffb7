//! Cryptographic operations for MEGA protocol.

pub mod aes;
pub mod attr;
pub mod keys;
pub mod random;
pub mod rsa;

pub use aes::*;
pub use attr::*;
pub use keys::*;
pub use random::*;
pub use rsa::*;
