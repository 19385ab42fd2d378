//! # Authentication
//!
//! Acquiring and maintaining the token used against the secret store.
//!
//! - [`Authenticator`]: a full login, either a static token or AWS IAM
//! - [`AwsStsAsserter`]: signs the STS request the aws auth method verifies
//! - [`DefaultCredentialChain`]: finds the AWS credentials to sign with
//! - [`CredentialManager`]: hands out fresh tokens, renewing or logging in
//!   again before they expire

pub mod authenticator;
pub mod aws_credentials;
pub mod credential;
pub mod iam;

pub use authenticator::{
    authenticator_from_settings, Authenticator, AwsIamAuthenticator, StaticTokenAuthenticator,
};
pub use aws_credentials::{
    AwsCredentials, ContainerCredentials, CredentialProvider, DefaultCredentialChain,
    EnvironmentCredentials, InstanceMetadataCredentials, ProfileCredentials, StaticCredentials,
};
pub use credential::{
    Clock, Credential, CredentialManager, CredentialState, CredentialWindows, SystemClock,
};
pub use iam::{AwsStsAsserter, IamAssertion, IdentityAsserter};
