pub mod tokens;

pub use tokens::{StoredCredential, TokenStore};
