//! Address and credential generation
//!
//! Addresses are a role prefix followed by the first 26 hex characters of a
//! SHA-256 digest over a fresh random 128-bit value. Generation is pure: the
//! account ledger's unique key is what guarantees uniqueness.

use crate::crypto::sha256_hex;
use crate::types::Address;
use uuid::Uuid;

/// Prefix of administrative addresses
pub const ADMIN_PREFIX: &str = "VTA";

/// Prefix of user addresses
pub const USER_PREFIX: &str = "VT";

/// Digest characters kept after the prefix
pub const ADDRESS_DIGEST_LEN: usize = 26;

/// Fresh credentials for a new account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account address
    pub address: Address,
    /// Shared-secret passkey
    pub passkey: String,
    /// Opaque identity token
    pub identity: String,
}

/// Generates addresses, passkeys and identity tokens
#[derive(Debug, Clone)]
pub struct AddressGenerator {
    admin_passkey_seed: String,
}

impl AddressGenerator {
    /// Create a generator whose admin passkey derives from `admin_passkey_seed`
    pub fn new(admin_passkey_seed: impl Into<String>) -> Self {
        Self {
            admin_passkey_seed: admin_passkey_seed.into(),
        }
    }

    /// Generate an address for the given role
    pub fn generate(&self, is_admin: bool) -> Address {
        let prefix = if is_admin { ADMIN_PREFIX } else { USER_PREFIX };
        let seed: [u8; 16] = rand::random();
        let digest = sha256_hex(seed);
        Address::new(format!("{}{}", prefix, &digest[..ADDRESS_DIGEST_LEN]))
    }

    /// Passkey of the bootstrap admin account; publicly derivable
    pub fn admin_passkey(&self) -> String {
        sha256_hex(self.admin_passkey_seed.as_bytes())
    }

    /// Passkey of an ordinary account
    pub fn random_passkey(&self) -> String {
        let seed: [u8; 16] = rand::random();
        sha256_hex(seed)
    }

    /// Fresh identity token
    pub fn identity(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Credentials for the bootstrap admin
    pub fn admin_credentials(&self) -> Credentials {
        Credentials {
            address: self.generate(true),
            passkey: self.admin_passkey(),
            identity: self.identity(),
        }
    }

    /// Credentials for an ordinary account
    pub fn user_credentials(&self) -> Credentials {
        Credentials {
            address: self.generate(false),
            passkey: self.random_passkey(),
            identity: self.identity(),
        }
    }
}

impl Default for AddressGenerator {
    fn default() -> Self {
        Self::new("passkey")
    }
}
