//! Credential primitives for Depot: bcrypt password hashing, JWT bearer
//! tokens, and API key minting.

pub mod error;
pub mod keys;
pub mod password;
pub mod token;

pub use error::{AuthError, AuthResult};
pub use keys::generate_api_key;
pub use password::{hash_password, verify_password};
pub use token::{Claims, TokenSigner};
