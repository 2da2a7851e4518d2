//! Signed read URLs for backends without a native presigning mechanism.
//!
//! URL form: `{base_url}/{container}/{key}?expires={unix_secs}&signature={tag}` where
//! `tag = base64url(HMAC-SHA256(secret, "{container}\n{key}\n{expires}"))`.

use crate::traits::{StorageError, StorageResult};
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
    base_url: String,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(secret: impl AsRef<[u8]>, base_url: impl Into<String>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a URL for `container/key` valid for `expires_in` from now.
    pub fn sign(&self, container: &str, key: &str, expires_in: Duration) -> String {
        let expires = unix_now().saturating_add(expires_in.as_secs());
        self.sign_until(container, key, expires)
    }

    /// Build a URL valid until the given unix timestamp (seconds).
    pub fn sign_until(&self, container: &str, key: &str, expires: u64) -> String {
        let tag = self.tag(container, key, expires);
        format!(
            "{}/{}/{}?expires={}&signature={}",
            self.base_url,
            container,
            urlencoding::encode(key),
            expires,
            tag
        )
    }

    /// Verify a URL produced by [`UrlSigner::sign`] and return `(container, key)`.
    pub fn verify(&self, url: &str) -> StorageResult<(String, String)> {
        self.verify_at(url, unix_now())
    }

    pub fn verify_at(&self, url: &str, now: u64) -> StorageResult<(String, String)> {
        let invalid = || StorageError::InvalidSignature("malformed signed URL".to_string());

        let rest = url
            .strip_prefix(self.base_url.as_str())
            .and_then(|r| r.strip_prefix('/'))
            .ok_or_else(invalid)?;
        let (path, query) = rest.split_once('?').ok_or_else(invalid)?;
        let (container, encoded_key) = path.split_once('/').ok_or_else(invalid)?;
        let key = urlencoding::decode(encoded_key)
            .map_err(|_| invalid())?
            .into_owned();

        let mut expires = None;
        let mut signature = None;
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("expires", v)) => expires = v.parse::<u64>().ok(),
                Some(("signature", v)) => signature = Some(v),
                _ => {}
            }
        }
        let expires = expires.ok_or_else(invalid)?;
        let signature = signature.ok_or_else(invalid)?;

        let tag = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| invalid())?;
        let mut mac = self.mac();
        mac.update(signing_payload(container, &key, expires).as_bytes());
        mac.verify_slice(&tag)
            .map_err(|_| StorageError::InvalidSignature("signature mismatch".to_string()))?;

        if now > expires {
            return Err(StorageError::InvalidSignature(
                "signed URL has expired".to_string(),
            ));
        }

        Ok((container.to_string(), key))
    }

    fn tag(&self, container: &str, key: &str, expires: u64) -> String {
        let mut mac = self.mac();
        mac.update(signing_payload(container, key, expires).as_bytes());
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    fn mac(&self) -> Hmac<Sha256> {
        Hmac::<Sha256>::new_from_slice(&self.secret).expect("HMAC accepts any key size")
    }
}

fn signing_payload(container: &str, key: &str, expires: u64) -> String {
    format!("{}\n{}\n{}", container, key, expires)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-that-is-at-least-32-characters";

    #[test]
    fn signed_url_verifies_and_names_object() {
        let signer = UrlSigner::new(SECRET, "memory://objects/");
        let url = signer.sign_until("tenant-id-7-12345", "42.jpg", 1_000);
        assert!(url.starts_with("memory://objects/tenant-id-7-12345/42.jpg?"));

        let (container, key) = signer.verify_at(&url, 999).unwrap();
        assert_eq!(container, "tenant-id-7-12345");
        assert_eq!(key, "42.jpg");
    }

    #[test]
    fn expired_url_rejected() {
        let signer = UrlSigner::new(SECRET, "memory://objects");
        let url = signer.sign_until("c-1", "42.jpg", 1_000);
        assert!(matches!(
            signer.verify_at(&url, 1_001),
            Err(StorageError::InvalidSignature(_))
        ));
    }

    #[test]
    fn url_for_other_object_rejected() {
        let signer = UrlSigner::new(SECRET, "memory://objects");
        let url = signer.sign_until("c-1", "42.jpg", 1_000);
        let forged = url.replace("42.jpg", "43.jpg");
        assert!(signer.verify_at(&forged, 0).is_err());
    }

    #[test]
    fn url_from_other_secret_rejected() {
        let signer = UrlSigner::new(SECRET, "memory://objects");
        let other = UrlSigner::new("another-secret-that-is-32-chars-long!!", "memory://objects");
        let url = other.sign_until("c-1", "42.jpg", 1_000);
        assert!(signer.verify_at(&url, 0).is_err());
    }
}
