//! Pluggable Providers
//!
//! Spec names password hashing and email delivery only through their abstract
//! contracts; the CORE depends on these traits, never on a concrete backend.

mod email;
mod hashing;

pub use email::{EmailProvider, LoggingEmailProvider};
pub use hashing::{BcryptHashingProvider, HashingProvider};
