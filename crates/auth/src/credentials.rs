//! Password hashing with Argon2id.
//!
//! Stored hashes are PHC strings, so each one carries its own salt and cost.
//! Verification reads the cost from the stored hash; [`HashingCost`] only
//! affects newly produced hashes.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core},
};
use serde::{Deserialize, Serialize};

use keystone_core::{DomainError, DomainResult};

/// Tunable Argon2 cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashingCost {
    /// Memory in KiB.
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingCost {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl HashingCost {
    /// Cheapest parameters Argon2 accepts. Tests only.
    pub fn minimal() -> Self {
        Self {
            memory_kib: Params::MIN_M_COST.max(8 * Params::MIN_P_COST),
            iterations: Params::MIN_T_COST,
            parallelism: Params::MIN_P_COST,
        }
    }
}

#[derive(Clone)]
pub struct CredentialHasher {
    argon2: Argon2<'static>,
}

impl core::fmt::Debug for CredentialHasher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CredentialHasher").finish_non_exhaustive()
    }
}

impl CredentialHasher {
    pub fn new(cost: HashingCost) -> DomainResult<Self> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|e| DomainError::malformed(format!("invalid hashing cost: {e}")))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash a plaintext password into a PHC string.
    pub fn hash(&self, plaintext: &str) -> DomainResult<String> {
        if plaintext.is_empty() {
            return Err(DomainError::malformed("password cannot be empty"));
        }
        let salt = SaltString::generate(&mut rand_core::OsRng);
        self.argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| DomainError::malformed(format!("password hashing failed: {e}")))
    }

    /// Constant-time check of `plaintext` against a stored hash.
    ///
    /// Unparsable and non-Argon2 hashes (e.g. legacy bcrypt) never match.
    pub fn verify(&self, stored: &str, plaintext: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored) else {
            return false;
        };
        self.argon2
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> CredentialHasher {
        CredentialHasher::new(HashingCost::minimal()).unwrap()
    }

    #[test]
    fn hash_then_verify() {
        let h = hasher();
        let stored = h.hash("right").unwrap();
        assert!(stored.starts_with("$argon2id$"));
        assert!(h.verify(&stored, "right"));
        assert!(!h.verify(&stored, "wrong"));
    }

    #[test]
    fn salts_differ_per_hash() {
        let h = hasher();
        assert_ne!(h.hash("same").unwrap(), h.hash("same").unwrap());
    }

    #[test]
    fn hashes_verify_across_cost_changes() {
        let stored = hasher().hash("pw").unwrap();
        let stronger = CredentialHasher::new(HashingCost::default()).unwrap();
        assert!(stronger.verify(&stored, "pw"));
    }

    #[test]
    fn malformed_and_legacy_hashes_never_match() {
        let h = hasher();
        assert!(!h.verify("", "pw"));
        assert!(!h.verify("not a hash", "pw"));
        assert!(!h.verify(
            "$2a$10$N9qo8uLOickgx2ZMRZoMyeIjZAgcfl7p92ldGxad68LJZdL17lhWy",
            "pw"
        ));
    }

    #[test]
    fn empty_password_is_malformed() {
        assert!(matches!(hasher().hash(""), Err(DomainError::Malformed(_))));
    }

    #[test]
    fn invalid_cost_is_rejected() {
        let cost = HashingCost {
            memory_kib: 1,
            iterations: 0,
            parallelism: 0,
        };
        assert!(CredentialHasher::new(cost).is_err());
    }
}
