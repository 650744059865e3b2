//! POST-policy signing for direct-to-storage uploads.
//!
//! Produces everything a browser needs to multipart-POST a single object
//! straight to an S3-compatible bucket: the upload URL, the exact form
//! fields, and a bounded expiry. Signing is purely local; no request is
//! made to the storage provider.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha1::Sha1;
use tracing::debug;
use url::Url;

type HmacSha1 = Hmac<Sha1>;

const PUBLIC_READ_ACL: &str = "public-read";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("storage credentials are not configured")]
    MissingCredentials,
    #[error("invalid storage endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
    #[error(transparent)]
    Policy(#[from] serde_json::Error),
    #[error("failed to key the policy signer")]
    SigningKey,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Deployment configuration, deserialized from `S3_*` environment
/// variables by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Url,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default = "default_public_read")]
    pub public_read: bool,
}

fn default_public_read() -> bool {
    true
}

/// Form fields the client must submit verbatim, followed by the file
/// content as the final multipart field.
#[derive(Debug, Clone, Serialize)]
pub struct UploadFields {
    pub key: String,
    #[serde(rename = "Content-Type")]
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acl: Option<String>,
    #[serde(rename = "AWSAccessKeyId")]
    pub access_key_id: String,
    pub policy: String,
    pub signature: String,
}

/// Time-limited permission to upload exactly one object. Never persisted;
/// reconstructed on every request.
#[derive(Debug, Clone, Serialize)]
pub struct UploadGrant {
    pub upload_url: Url,
    pub method: &'static str,
    pub fields: UploadFields,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PostPolicySigner {
    upload_url: Url,
    bucket: String,
    access_key_id: String,
    secret_access_key: String,
    public_read: bool,
}

impl PostPolicySigner {
    /// Fails when the deployment carries no credentials; this is a
    /// startup-time error, not something to retry per request.
    pub fn new(config: StorageConfig) -> Result<Self> {
        if config.access_key_id.is_empty() || config.secret_access_key.is_empty() {
            return Err(Error::MissingCredentials);
        }
        let upload_url = Url::parse(&format!(
            "{}/{}",
            config.endpoint.as_str().trim_end_matches('/'),
            config.bucket
        ))?;
        Ok(Self {
            upload_url,
            bucket: config.bucket,
            access_key_id: config.access_key_id,
            secret_access_key: config.secret_access_key,
            public_read: config.public_read,
        })
    }

    /// Issue a grant scoping one upload to `key`, `content_type`, and a
    /// `[0, max_size]` byte range, valid until `now + expires_in`.
    pub fn sign(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
        max_size: u64,
    ) -> Result<UploadGrant> {
        debug!("issuing upload grant for {key} ({content_type})");
        let expires_at = Utc::now() + expires_in;
        let policy = self.policy_document(key, content_type, expires_at, max_size)?;
        let policy = STANDARD.encode(policy);
        let signature = self.signature(&policy)?;

        Ok(UploadGrant {
            upload_url: self.upload_url.clone(),
            method: "POST",
            fields: UploadFields {
                key: key.to_owned(),
                content_type: content_type.to_owned(),
                acl: self.public_read.then(|| PUBLIC_READ_ACL.to_owned()),
                access_key_id: self.access_key_id.clone(),
                policy,
                signature,
            },
            expires_at,
        })
    }

    fn policy_document(
        &self,
        key: &str,
        content_type: &str,
        expires_at: DateTime<Utc>,
        max_size: u64,
    ) -> Result<String> {
        let mut conditions = vec![
            json!({ "bucket": self.bucket }),
            json!({ "key": key }),
            json!({ "Content-Type": content_type }),
            json!(["content-length-range", 0, max_size]),
        ];
        if self.public_read {
            conditions.push(json!({ "acl": PUBLIC_READ_ACL }));
        }
        let document = json!({
            "expiration": expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            "conditions": conditions,
        });
        Ok(serde_json::to_string(&document)?)
    }

    fn signature(&self, encoded_policy: &str) -> Result<String> {
        let mut mac = HmacSha1::new_from_slice(self.secret_access_key.as_bytes())
            .map_err(|_| Error::SigningKey)?;
        mac.update(encoded_policy.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    fn signer(public_read: bool) -> PostPolicySigner {
        PostPolicySigner::new(StorageConfig {
            endpoint: Url::parse("https://storage.example.com").unwrap(),
            bucket: "podcasts".into(),
            access_key_id: "AKIATEST".into(),
            secret_access_key: "sekrit".into(),
            public_read,
        })
        .unwrap()
    }

    fn decode_policy(grant: &UploadGrant) -> Value {
        let raw = STANDARD.decode(&grant.fields.policy).unwrap();
        serde_json::from_slice(&raw).unwrap()
    }

    #[test]
    fn test_grant_echoes_key_and_content_type() {
        let grant = signer(true)
            .sign("audio/ep-1.mp3", "audio/mpeg", Duration::hours(1), 1024)
            .unwrap();
        assert_eq!(grant.method, "POST");
        assert_eq!(grant.upload_url.as_str(), "https://storage.example.com/podcasts");
        assert_eq!(grant.fields.key, "audio/ep-1.mp3");
        assert_eq!(grant.fields.content_type, "audio/mpeg");
        assert_eq!(grant.fields.access_key_id, "AKIATEST");
    }

    #[test]
    fn test_policy_expiration_tracks_the_grant() {
        let expires_in = Duration::minutes(30);
        let before = Utc::now();
        let grant = signer(true)
            .sign("k.mp3", "audio/mpeg", expires_in, 1024)
            .unwrap();
        let policy = decode_policy(&grant);
        let expiration = DateTime::parse_from_rfc3339(policy["expiration"].as_str().unwrap())
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(expiration.timestamp(), grant.expires_at.timestamp());
        assert!(expiration >= before + expires_in - Duration::seconds(5));
        assert!(expiration <= Utc::now() + expires_in + Duration::seconds(5));
    }

    #[test]
    fn test_policy_scopes_bucket_key_type_and_size() {
        let grant = signer(false)
            .sign("k.mp3", "audio/mpeg", Duration::hours(1), 2048)
            .unwrap();
        let policy = decode_policy(&grant);
        let conditions = policy["conditions"].as_array().unwrap();
        assert!(conditions.contains(&json!({ "bucket": "podcasts" })));
        assert!(conditions.contains(&json!({ "key": "k.mp3" })));
        assert!(conditions.contains(&json!({ "Content-Type": "audio/mpeg" })));
        assert!(conditions.contains(&json!(["content-length-range", 0, 2048])));
    }

    #[test]
    fn test_acl_only_present_for_public_deployments() {
        let private = signer(false)
            .sign("k.mp3", "audio/mpeg", Duration::hours(1), 1)
            .unwrap();
        assert!(private.fields.acl.is_none());
        let private_policy = decode_policy(&private);
        assert!(!private_policy["conditions"]
            .as_array()
            .unwrap()
            .iter()
            .any(|c| c.get("acl").is_some()));

        let public = signer(true)
            .sign("k.mp3", "audio/mpeg", Duration::hours(1), 1)
            .unwrap();
        assert_eq!(public.fields.acl.as_deref(), Some("public-read"));
        let public_policy = decode_policy(&public);
        assert!(public_policy["conditions"]
            .as_array()
            .unwrap()
            .contains(&json!({ "acl": "public-read" })));
    }

    #[test]
    fn test_signature_is_hmac_sha1_over_the_encoded_policy() {
        let grant = signer(true)
            .sign("k.mp3", "audio/mpeg", Duration::hours(1), 1)
            .unwrap();
        let mut mac = HmacSha1::new_from_slice(b"sekrit").unwrap();
        mac.update(grant.fields.policy.as_bytes());
        let expected = STANDARD.encode(mac.finalize().into_bytes());
        assert_eq!(grant.fields.signature, expected);
    }

    #[test]
    fn test_blank_credentials_are_rejected_at_construction() {
        let err = PostPolicySigner::new(StorageConfig {
            endpoint: Url::parse("https://storage.example.com").unwrap(),
            bucket: "podcasts".into(),
            access_key_id: String::new(),
            secret_access_key: "sekrit".into(),
            public_read: true,
        })
        .unwrap_err();
        assert!(matches!(err, Error::MissingCredentials));
    }
}
