//! Core credential types: snapshots, secrets and the error taxonomy.

pub mod error;
pub mod secret;
pub mod snapshot;

pub use error::{Result, SessionError};
pub use secret::SecretString;
pub use snapshot::{CredentialSnapshot, RawCredentials};
