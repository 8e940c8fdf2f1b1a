mod credentials;
pub mod error;
pub mod sigv4;

pub use credentials::{AmbientCredentials, CredentialSource};

pub type Result<T> = std::result::Result<T, error::Error>;
