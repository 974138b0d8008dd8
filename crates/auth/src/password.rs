//! Password hashing with bcrypt.

use crate::error::AuthResult;

/// Hash a password with the given bcrypt cost.
pub fn hash_password(password: &str, cost: u32) -> AuthResult<String> {
    Ok(bcrypt::hash(password, cost)?)
}

/// Verify a password against a stored bcrypt hash.
///
/// A malformed stored hash is an error; a wrong password is `Ok(false)`.
pub fn verify_password(password: &str, stored_hash: &str) -> AuthResult<bool> {
    Ok(bcrypt::verify(password, stored_hash)?)
}
