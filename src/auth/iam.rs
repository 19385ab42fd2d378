//! AWS IAM identity assertion.
//!
//! Vault's aws auth method verifies a caller by replaying a signed STS
//! `GetCallerIdentity` request. [`AwsStsAsserter`] builds and signs that
//! request (AWS Signature Version 4) without sending it; Vault does.
//!
//! Credentials come from a [`CredentialProvider`], by default the
//! [`DefaultCredentialChain`], resolved on every assertion.

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::aws_credentials::{
    AwsCredentials, CredentialProvider, DefaultCredentialChain, StaticCredentials,
};
use super::credential::{Clock, SystemClock};
use crate::errors::{InventoryError, Result};
use crate::secrets::IamLoginPayload;

const STS_SERVICE: &str = "sts";
const DEFAULT_STS_REGION: &str = "us-east-1";
const GET_CALLER_IDENTITY_BODY: &str = "Action=GetCallerIdentity&Version=2011-06-15";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

/// Header carrying the Vault server id, when the auth mount is configured with one
pub const VAULT_SERVER_ID_HEADER: &str = "X-Vault-AWS-IAM-Server-ID";

/// A signed HTTP request proving the caller's AWS identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IamAssertion {
    pub method: String,
    pub url: String,
    /// Header name to values, in the shape Vault expects
    pub headers: BTreeMap<String, Vec<String>>,
    pub body: String,
}

impl IamAssertion {
    /// Encode as the body of an `auth/<provider>/login` request.
    pub fn to_login_payload(&self, role: &str) -> Result<IamLoginPayload> {
        let engine = base64::engine::general_purpose::STANDARD;
        let headers = serde_json::to_vec(&self.headers)?;

        Ok(IamLoginPayload {
            iam_http_request_method: self.method.clone(),
            iam_request_url: engine.encode(self.url.as_bytes()),
            iam_request_headers: engine.encode(headers),
            iam_request_body: engine.encode(self.body.as_bytes()),
            role: role.to_string(),
        })
    }
}

/// Produces identity assertions for the aws auth method
#[async_trait]
pub trait IdentityAsserter: Send + Sync {
    async fn assert_identity(&self) -> Result<IamAssertion>;
}

/// Signs STS `GetCallerIdentity` requests
pub struct AwsStsAsserter {
    credentials: Arc<dyn CredentialProvider>,
    region: Option<String>,
    server_id: Option<String>,
    clock: Arc<dyn Clock>,
}

impl AwsStsAsserter {
    /// Asserter resolving credentials through the default chain.
    ///
    /// `region` selects a regional STS endpoint; the global endpoint is used
    /// when it is `None`.
    pub fn new(region: Option<String>, server_id: Option<String>) -> Self {
        Self {
            credentials: Arc::new(DefaultCredentialChain::default()),
            region,
            server_id,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_credentials(self, credentials: AwsCredentials) -> Self {
        self.with_provider(Arc::new(StaticCredentials::new(credentials)))
    }

    pub fn with_provider(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = provider;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn endpoint(&self) -> (String, &str) {
        match self.region.as_deref() {
            Some(region) if !region.is_empty() => {
                (format!("https://sts.{}.amazonaws.com/", region), region)
            }
            _ => ("https://sts.amazonaws.com/".to_string(), DEFAULT_STS_REGION),
        }
    }

    /// Build the signed request for `credentials` at time `now`.
    pub fn sign(&self, credentials: &AwsCredentials, now: DateTime<Utc>) -> Result<IamAssertion> {
        if credentials.access_key_id.is_empty() || credentials.secret_access_key.is_empty() {
            return Err(InventoryError::auth("AWS credentials are incomplete"));
        }

        let (endpoint, region) = self.endpoint();
        let url = url::Url::parse(&endpoint)
            .map_err(|e| InventoryError::auth(format!("Invalid STS endpoint '{}': {}", endpoint, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| InventoryError::auth(format!("STS endpoint '{}' has no host", endpoint)))?
            .to_string();

        let date = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let credential_scope = format!("{}/{}/{}/aws4_request", date, region, STS_SERVICE);

        // lowercase name -> (header name as sent, value); sorted for signing
        let mut headers: BTreeMap<String, (&str, String)> = BTreeMap::new();
        headers.insert("content-type".into(), ("Content-Type", FORM_CONTENT_TYPE.to_string()));
        headers.insert("host".into(), ("Host", host));
        headers.insert("x-amz-date".into(), ("X-Amz-Date", amz_date.clone()));
        if let Some(token) = &credentials.session_token {
            headers.insert(
                "x-amz-security-token".into(),
                ("X-Amz-Security-Token", token.expose_secret().to_string()),
            );
        }
        if let Some(server_id) = self.server_id.as_deref().filter(|id| !id.is_empty()) {
            headers.insert(
                VAULT_SERVER_ID_HEADER.to_lowercase(),
                (VAULT_SERVER_ID_HEADER, server_id.to_string()),
            );
        }

        let canonical_headers: String =
            headers.iter().map(|(name, (_, value))| format!("{}:{}\n", name, value.trim())).collect();
        let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");

        let canonical_request = format!(
            "POST\n{}\n\n{}\n{}\n{}",
            url.path(),
            canonical_headers,
            signed_headers,
            hex_sha256(GET_CALLER_IDENTITY_BODY.as_bytes())
        );

        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signature = calculate_signature(
            credentials.secret_access_key.expose_secret(),
            &date,
            region,
            &string_to_sign,
        )?;

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            credentials.access_key_id, credential_scope, signed_headers, signature
        );

        let mut wire_headers: BTreeMap<String, Vec<String>> = headers
            .into_values()
            .map(|(name, value)| (name.to_string(), vec![value]))
            .collect();
        wire_headers.insert("Authorization".to_string(), vec![authorization]);

        Ok(IamAssertion {
            method: "POST".to_string(),
            url: url.to_string(),
            headers: wire_headers,
            body: GET_CALLER_IDENTITY_BODY.to_string(),
        })
    }
}

#[async_trait]
impl IdentityAsserter for AwsStsAsserter {
    async fn assert_identity(&self) -> Result<IamAssertion> {
        let credentials = self.credentials.provide().await?.ok_or_else(|| {
            InventoryError::auth(format!("No AWS credentials found by the {}", self.credentials.name()))
        })?;

        self.sign(&credentials, self.clock.now())
    }
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| InventoryError::internal(format!("Invalid HMAC key: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn calculate_signature(
    secret_key: &str,
    date: &str,
    region: &str,
    string_to_sign: &str,
) -> Result<String> {
    let k_date = hmac_sha256(format!("AWS4{}", secret_key).as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, STS_SERVICE.as_bytes())?;
    let k_signing = hmac_sha256(&k_service, b"aws4_request")?;
    Ok(hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes())?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn credentials() -> AwsCredentials {
        AwsCredentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY")
    }

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_global_endpoint_assertion() {
        let asserter = AwsStsAsserter::new(None, None);
        let assertion = asserter.sign(&credentials(), fixed_time()).unwrap();

        assert_eq!(assertion.method, "POST");
        assert_eq!(assertion.url, "https://sts.amazonaws.com/");
        assert_eq!(assertion.body, GET_CALLER_IDENTITY_BODY);
        assert_eq!(assertion.headers["Host"], vec!["sts.amazonaws.com".to_string()]);
        assert_eq!(assertion.headers["X-Amz-Date"], vec!["20240115T120000Z".to_string()]);

        let authorization = &assertion.headers["Authorization"][0];
        assert!(authorization.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240115/us-east-1/sts/aws4_request"
        ));
        assert!(authorization.contains("SignedHeaders=content-type;host;x-amz-date,"));
        assert!(!assertion.headers.contains_key("X-Amz-Security-Token"));
    }

    #[test]
    fn test_signature_is_deterministic() {
        let asserter = AwsStsAsserter::new(None, None);
        let first = asserter.sign(&credentials(), fixed_time()).unwrap();
        let second = asserter.sign(&credentials(), fixed_time()).unwrap();
        assert_eq!(first, second);

        let later = asserter.sign(&credentials(), fixed_time() + chrono::Duration::seconds(1)).unwrap();
        assert_ne!(first.headers["Authorization"], later.headers["Authorization"]);
    }

    #[test]
    fn test_regional_endpoint_with_session_and_server_id() {
        let asserter =
            AwsStsAsserter::new(Some("eu-west-1".to_string()), Some("vault.example.com".to_string()));
        let assertion =
            asserter.sign(&credentials().with_session_token("FwoGZXIvYXdz"), fixed_time()).unwrap();

        assert_eq!(assertion.url, "https://sts.eu-west-1.amazonaws.com/");
        assert_eq!(assertion.headers["X-Amz-Security-Token"], vec!["FwoGZXIvYXdz".to_string()]);
        assert_eq!(assertion.headers[VAULT_SERVER_ID_HEADER], vec!["vault.example.com".to_string()]);

        let authorization = &assertion.headers["Authorization"][0];
        assert!(authorization.contains("/20240115/eu-west-1/sts/aws4_request"));
        assert!(authorization.contains(
            "SignedHeaders=content-type;host;x-amz-date;x-amz-security-token;x-vault-aws-iam-server-id,"
        ));
    }

    #[test]
    fn test_incomplete_credentials_rejected() {
        let asserter = AwsStsAsserter::new(None, None);
        let result = asserter.sign(&AwsCredentials::new("", "secret"), fixed_time());
        assert!(matches!(result, Err(InventoryError::Auth { .. })));
    }

    #[test]
    fn test_login_payload_encoding() {
        let asserter = AwsStsAsserter::new(None, None);
        let assertion = asserter.sign(&credentials(), fixed_time()).unwrap();
        let payload = assertion.to_login_payload("inventory-reader").unwrap();
        let engine = base64::engine::general_purpose::STANDARD;

        assert_eq!(payload.iam_http_request_method, "POST");
        assert_eq!(payload.role, "inventory-reader");
        assert_eq!(engine.decode(&payload.iam_request_url).unwrap(), b"https://sts.amazonaws.com/");
        assert_eq!(engine.decode(&payload.iam_request_body).unwrap(), GET_CALLER_IDENTITY_BODY.as_bytes());

        let headers: BTreeMap<String, Vec<String>> =
            serde_json::from_slice(&engine.decode(&payload.iam_request_headers).unwrap()).unwrap();
        assert_eq!(headers, assertion.headers);
    }

    #[tokio::test]
    async fn test_assert_identity_uses_clock() {
        struct FixedClock(DateTime<Utc>);
        impl Clock for FixedClock {
            fn now(&self) -> DateTime<Utc> {
                self.0
            }
        }

        let asserter = AwsStsAsserter::new(None, None)
            .with_credentials(credentials())
            .with_clock(Arc::new(FixedClock(fixed_time())));

        let assertion = asserter.assert_identity().await.unwrap();
        assert_eq!(assertion.headers["X-Amz-Date"], vec!["20240115T120000Z".to_string()]);
    }

    #[tokio::test]
    async fn test_assert_identity_without_credentials() {
        let empty = DefaultCredentialChain::new(Vec::new());
        let asserter = AwsStsAsserter::new(None, None).with_provider(Arc::new(empty));

        let err = asserter.assert_identity().await.unwrap_err();
        assert!(matches!(err, InventoryError::Auth { .. }));
        assert!(err.to_string().contains("No AWS credentials found by the default credential chain"));
    }

    #[test]
    fn test_signature_is_hex_sha256() {
        let signature = calculate_signature("secret", "20240115", "us-east-1", "payload").unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
