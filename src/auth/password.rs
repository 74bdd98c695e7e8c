use bcrypt::{hash, verify, DEFAULT_COST};

use crate::error::AppError;

/// Hash a password with bcrypt. A fresh salt is generated on every call,
/// so hashing the same password twice yields different strings.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    hash(password, DEFAULT_COST)
        .map_err(|e| AppError::InternalError(format!("Password hashing failed: {}", e)))
}

/// Check a submitted password against a stored bcrypt hash. Purely a
/// predicate; comparison is constant-time inside bcrypt.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, AppError> {
    verify(password, stored_hash)
        .map_err(|e| AppError::InternalError(format!("Password verification failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hashed = hash_password("pw123").unwrap();
        assert_ne!(hashed, "pw123");
        assert!(verify_password("pw123", &hashed).unwrap());
        assert!(!verify_password("wrong", &hashed).unwrap());
    }

    #[test]
    fn test_fresh_salt_per_call() {
        let first = hash_password("pw123").unwrap();
        let second = hash_password("pw123").unwrap();
        assert_ne!(first, second);
        assert!(verify_password("pw123", &first).unwrap());
        assert!(verify_password("pw123", &second).unwrap());
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(verify_password("pw123", "not-a-bcrypt-hash").is_err());
    }
}
