use aws_credential_types::provider::error::CredentialsError;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("No AWS credentials available from the default provider chain")]
    MissingCredentials,
    #[error("Failed to load AWS credentials")]
    Provider(#[source] CredentialsError),
}
