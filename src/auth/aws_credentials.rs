//! AWS credential sources.
//!
//! The aws auth method signs its identity assertion with AWS credentials.
//! [`DefaultCredentialChain`] looks for them the way the AWS CLI does:
//!
//! 1. `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and `AWS_SESSION_TOKEN`
//! 2. the shared credentials and config files, profile from `AWS_PROFILE`
//! 3. the ECS container credentials endpoint
//! 4. the EC2 instance metadata service (IMDSv2)
//!
//! A source that is not configured is skipped. A source that is configured
//! but unusable stops the chain with an error. Sources are consulted on every
//! login, so rotated credentials are picked up.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::errors::{InventoryError, Result};
use crate::secrets::SecretString;

const CONTAINER_ENDPOINT_HOST: &str = "http://169.254.170.2";
const IMDS_ENDPOINT: &str = "http://169.254.169.254";
const IMDS_TOKEN_PATH: &str = "/latest/api/token";
const IMDS_CREDENTIALS_PATH: &str = "/latest/meta-data/iam/security-credentials/";
const IMDS_TOKEN_HEADER: &str = "X-aws-ec2-metadata-token";
const IMDS_TOKEN_TTL_HEADER: &str = "X-aws-ec2-metadata-token-ttl-seconds";
const IMDS_TOKEN_TTL_SECONDS: &str = "21600";
const DEFAULT_PROFILE: &str = "default";

/// Static AWS credentials
#[derive(Debug, Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: SecretString,
    pub session_token: Option<SecretString>,
}

impl AwsCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: SecretString::new(secret_access_key),
            session_token: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(SecretString::new(token));
        self
    }
}

/// Reads an environment variable; empty values count as unset
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// [`EnvLookup`] over the process environment
pub fn process_env() -> EnvLookup {
    Arc::new(|name: &str| std::env::var(name).ok().filter(|value| !value.is_empty()))
}

/// One place AWS credentials can come from
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Source name for logs and errors
    fn name(&self) -> &'static str;

    /// `Ok(None)` when the source is not configured here
    async fn provide(&self) -> Result<Option<AwsCredentials>>;
}

/// Fixed credentials
pub struct StaticCredentials(AwsCredentials);

impl StaticCredentials {
    pub fn new(credentials: AwsCredentials) -> Self {
        Self(credentials)
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn provide(&self) -> Result<Option<AwsCredentials>> {
        Ok(Some(self.0.clone()))
    }
}

/// `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and optional `AWS_SESSION_TOKEN`
pub struct EnvironmentCredentials {
    env: EnvLookup,
}

impl EnvironmentCredentials {
    pub fn new(env: EnvLookup) -> Self {
        Self { env }
    }
}

#[async_trait]
impl CredentialProvider for EnvironmentCredentials {
    fn name(&self) -> &'static str {
        "environment"
    }

    async fn provide(&self) -> Result<Option<AwsCredentials>> {
        let access_key_id = (self.env)("AWS_ACCESS_KEY_ID");
        let secret_access_key = (self.env)("AWS_SECRET_ACCESS_KEY");

        match (access_key_id, secret_access_key) {
            (Some(access_key_id), Some(secret_access_key)) => {
                let mut credentials = AwsCredentials::new(access_key_id, secret_access_key);
                if let Some(token) = (self.env)("AWS_SESSION_TOKEN") {
                    credentials = credentials.with_session_token(token);
                }
                Ok(Some(credentials))
            }
            (None, None) => Ok(None),
            (Some(_), None) => {
                Err(InventoryError::auth("AWS_ACCESS_KEY_ID is set but AWS_SECRET_ACCESS_KEY is not"))
            }
            (None, Some(_)) => {
                Err(InventoryError::auth("AWS_SECRET_ACCESS_KEY is set but AWS_ACCESS_KEY_ID is not"))
            }
        }
    }
}

/// Static keys of a named profile in the shared credentials or config file.
///
/// Files default to `~/.aws/credentials` and `~/.aws/config`, overridden by
/// `AWS_SHARED_CREDENTIALS_FILE` and `AWS_CONFIG_FILE`. The credentials file
/// wins when both define the profile. Profiles without static keys (assumed
/// roles, SSO, `credential_process`) are skipped.
pub struct ProfileCredentials {
    env: EnvLookup,
}

impl ProfileCredentials {
    pub fn new(env: EnvLookup) -> Self {
        Self { env }
    }

    fn profile(&self) -> String {
        (self.env)("AWS_PROFILE").unwrap_or_else(|| DEFAULT_PROFILE.to_string())
    }

    fn file(&self, override_var: &str, name: &str) -> Option<PathBuf> {
        (self.env)(override_var).map(PathBuf::from).or_else(|| {
            (self.env)("HOME")
                .or_else(|| (self.env)("USERPROFILE"))
                .map(|home| PathBuf::from(home).join(".aws").join(name))
        })
    }
}

#[async_trait]
impl CredentialProvider for ProfileCredentials {
    fn name(&self) -> &'static str {
        "profile"
    }

    async fn provide(&self) -> Result<Option<AwsCredentials>> {
        let profile = self.profile();
        // config file sections other than default carry a "profile " prefix
        let config_section = if profile == DEFAULT_PROFILE {
            profile.clone()
        } else {
            format!("profile {}", profile)
        };

        let files = [
            (self.file("AWS_SHARED_CREDENTIALS_FILE", "credentials"), profile.clone()),
            (self.file("AWS_CONFIG_FILE", "config"), config_section),
        ];

        for (path, section) in files {
            let Some(path) = path else { continue };
            let Some(contents) = read_optional(&path).await? else { continue };

            let sections = parse_profile_file(&contents);
            let Some(keys) = sections.get(&section) else { continue };
            if let Some(credentials) = profile_keys(keys, &profile, &path)? {
                debug!(profile = %profile, file = %path.display(), "Using AWS profile credentials");
                return Ok(Some(credentials));
            }
        }

        Ok(None)
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(InventoryError::auth(format!("Failed to read {}: {}", path.display(), e))),
    }
}

fn profile_keys(
    keys: &HashMap<String, String>,
    profile: &str,
    path: &Path,
) -> Result<Option<AwsCredentials>> {
    let key = |name: &str| keys.get(name).filter(|value| !value.is_empty());

    match (key("aws_access_key_id"), key("aws_secret_access_key")) {
        (Some(access_key_id), Some(secret_access_key)) => {
            let mut credentials = AwsCredentials::new(access_key_id, secret_access_key);
            if let Some(token) = key("aws_session_token") {
                credentials = credentials.with_session_token(token);
            }
            Ok(Some(credentials))
        }
        (None, None) => Ok(None),
        _ => Err(InventoryError::auth(format!(
            "Profile '{}' in {} has an incomplete key pair",
            profile,
            path.display()
        ))),
    }
}

/// Section name to lowercased keys for an AWS shared config or credentials file.
fn parse_profile_file(contents: &str) -> HashMap<String, HashMap<String, String>> {
    let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
    let mut current: Option<String> = None;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            let name = name.split_whitespace().collect::<Vec<_>>().join(" ");
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }

        if let (Some(section), Some((key, value))) = (&current, line.split_once('=')) {
            sections
                .entry(section.clone())
                .or_default()
                .insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }

    sections
}

/// Credentials document served by the container and instance metadata endpoints
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CredentialDocument {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    access_key_id: String,
    #[serde(default)]
    secret_access_key: String,
    #[serde(default)]
    token: Option<String>,
}

impl CredentialDocument {
    fn into_credentials(self, source: &str) -> Result<AwsCredentials> {
        if let Some(code) = self.code.filter(|code| code != "Success") {
            return Err(InventoryError::auth(format!("{} returned code '{}'", source, code)));
        }
        if self.access_key_id.is_empty() || self.secret_access_key.is_empty() {
            return Err(InventoryError::auth(format!("{} returned no key pair", source)));
        }

        let mut credentials = AwsCredentials::new(self.access_key_id, self.secret_access_key);
        if let Some(token) = self.token.filter(|token| !token.is_empty()) {
            credentials = credentials.with_session_token(token);
        }
        Ok(credentials)
    }
}

/// ECS task role credentials.
///
/// Configured by `AWS_CONTAINER_CREDENTIALS_RELATIVE_URI` (against the ECS
/// agent at 169.254.170.2) or `AWS_CONTAINER_CREDENTIALS_FULL_URI`, with an
/// optional `AWS_CONTAINER_AUTHORIZATION_TOKEN`.
pub struct ContainerCredentials {
    env: EnvLookup,
    client: reqwest::Client,
}

impl ContainerCredentials {
    pub fn new(env: EnvLookup) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { env, client }
    }

    fn endpoint(&self) -> Option<String> {
        (self.env)("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI")
            .map(|uri| format!("{}{}", CONTAINER_ENDPOINT_HOST, uri))
            .or_else(|| (self.env)("AWS_CONTAINER_CREDENTIALS_FULL_URI"))
    }
}

#[async_trait]
impl CredentialProvider for ContainerCredentials {
    fn name(&self) -> &'static str {
        "container"
    }

    async fn provide(&self) -> Result<Option<AwsCredentials>> {
        let Some(endpoint) = self.endpoint() else {
            return Ok(None);
        };

        let mut request = self.client.get(&endpoint);
        if let Some(token) = (self.env)("AWS_CONTAINER_AUTHORIZATION_TOKEN") {
            request = request.header(reqwest::header::AUTHORIZATION, token);
        }

        let response = request.send().await.map_err(|e| {
            InventoryError::auth(format!("Container credentials endpoint {} failed: {}", endpoint, e))
        })?;
        if !response.status().is_success() {
            return Err(InventoryError::auth(format!(
                "Container credentials endpoint returned {}",
                response.status()
            )));
        }

        let document: CredentialDocument = response
            .json()
            .await
            .map_err(|e| InventoryError::auth(format!("Invalid container credentials: {}", e)))?;
        document.into_credentials("Container credentials endpoint").map(Some)
    }
}

/// EC2 instance profile credentials over IMDSv2.
///
/// An unreachable metadata service means "not on EC2" and is skipped.
/// `AWS_EC2_METADATA_DISABLED=true` turns the source off and
/// `AWS_EC2_METADATA_SERVICE_ENDPOINT` overrides the endpoint.
pub struct InstanceMetadataCredentials {
    env: EnvLookup,
    client: reqwest::Client,
}

impl InstanceMetadataCredentials {
    pub fn new(env: EnvLookup) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(1))
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { env, client }
    }

    fn endpoint(&self) -> String {
        (self.env)("AWS_EC2_METADATA_SERVICE_ENDPOINT")
            .unwrap_or_else(|| IMDS_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    async fn session_token(&self, endpoint: &str) -> Result<Option<String>> {
        let request = self
            .client
            .put(format!("{}{}", endpoint, IMDS_TOKEN_PATH))
            .header(IMDS_TOKEN_TTL_HEADER, IMDS_TOKEN_TTL_SECONDS);

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                let token = response.text().await.map_err(|e| {
                    InventoryError::auth(format!("Failed to read instance metadata token: {}", e))
                })?;
                Ok(Some(token.trim().to_string()))
            }
            Ok(response) => {
                debug!(status = %response.status(), "Instance metadata token refused");
                Ok(None)
            }
            Err(e) => {
                debug!(error = %e, "Instance metadata service unreachable");
                Ok(None)
            }
        }
    }

    async fn get(&self, url: &str, token: &str) -> Result<reqwest::Response> {
        self.client
            .get(url)
            .header(IMDS_TOKEN_HEADER, token)
            .send()
            .await
            .map_err(|e| InventoryError::auth(format!("Instance metadata request failed: {}", e)))
    }
}

#[async_trait]
impl CredentialProvider for InstanceMetadataCredentials {
    fn name(&self) -> &'static str {
        "instance metadata"
    }

    async fn provide(&self) -> Result<Option<AwsCredentials>> {
        if (self.env)("AWS_EC2_METADATA_DISABLED").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
            return Ok(None);
        }

        let endpoint = self.endpoint();
        let Some(token) = self.session_token(&endpoint).await? else {
            return Ok(None);
        };

        let roles_url = format!("{}{}", endpoint, IMDS_CREDENTIALS_PATH);
        let response = self.get(&roles_url, &token).await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            // no instance profile attached
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(InventoryError::auth(format!(
                "Instance metadata role listing returned {}",
                response.status()
            )));
        }

        let roles = response
            .text()
            .await
            .map_err(|e| InventoryError::auth(format!("Failed to read instance roles: {}", e)))?;
        let Some(role) = roles.lines().map(str::trim).find(|line| !line.is_empty()) else {
            return Ok(None);
        };

        let response = self.get(&format!("{}{}", roles_url, role), &token).await?;
        if !response.status().is_success() {
            return Err(InventoryError::auth(format!(
                "Instance metadata credentials for role '{}' returned {}",
                role,
                response.status()
            )));
        }

        let document: CredentialDocument = response
            .json()
            .await
            .map_err(|e| InventoryError::auth(format!("Invalid instance credentials: {}", e)))?;
        document.into_credentials("Instance metadata").map(Some)
    }
}

/// Tries each provider in order; the first that has credentials wins
pub struct DefaultCredentialChain {
    providers: Vec<Arc<dyn CredentialProvider>>,
}

impl DefaultCredentialChain {
    pub fn new(providers: Vec<Arc<dyn CredentialProvider>>) -> Self {
        Self { providers }
    }

    /// Environment, profile, container and instance metadata, reading
    /// configuration through `env`.
    pub fn from_env(env: EnvLookup) -> Self {
        Self::new(vec![
            Arc::new(EnvironmentCredentials::new(env.clone())),
            Arc::new(ProfileCredentials::new(env.clone())),
            Arc::new(ContainerCredentials::new(env.clone())),
            Arc::new(InstanceMetadataCredentials::new(env)),
        ])
    }

    /// Provider names in the order they are tried
    pub fn sources(&self) -> Vec<&'static str> {
        self.providers.iter().map(|provider| provider.name()).collect()
    }
}

impl Default for DefaultCredentialChain {
    fn default() -> Self {
        Self::from_env(process_env())
    }
}

#[async_trait]
impl CredentialProvider for DefaultCredentialChain {
    fn name(&self) -> &'static str {
        "default credential chain"
    }

    async fn provide(&self) -> Result<Option<AwsCredentials>> {
        for provider in &self.providers {
            match provider.provide().await {
                Ok(Some(credentials)) => {
                    debug!(source = provider.name(), "Resolved AWS credentials");
                    return Ok(Some(credentials));
                }
                Ok(None) => continue,
                Err(InventoryError::Auth { message }) => {
                    return Err(InventoryError::auth(format!(
                        "AWS {} credentials: {}",
                        provider.name(),
                        message
                    )));
                }
                Err(other) => return Err(other),
            }
        }

        debug!(sources = ?self.sources(), "No AWS credentials found");
        Ok(None)
    }
}
