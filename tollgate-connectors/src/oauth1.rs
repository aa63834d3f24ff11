//! OAuth 1.0a request signing (HMAC-SHA1).
//!
//! Used for user-context write endpoints whose APIs still require OAuth 1
//! signatures. The signature base string is
//! `METHOD & encode(url) & encode(sorted params)`, the signing key is
//! `encode(consumer_secret) & encode(token_secret)`, and the signature is
//! `base64(HMAC-SHA1(key, base))` per RFC 5849.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rand::RngCore;
use sha1::Sha1;

/// RFC 3986 unreserved characters stay literal; everything else is
/// percent-encoded.
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encodes a string the way OAuth 1.0a requires.
#[must_use]
pub fn oauth_encode(input: &str) -> String {
    utf8_percent_encode(input, OAUTH_ENCODE_SET).to_string()
}

/// The four credentials of an OAuth 1.0a user context.
#[derive(Debug, Clone)]
pub struct OAuth1Credentials {
    /// Application consumer key.
    pub consumer_key: String,
    /// Application consumer secret.
    pub consumer_secret: String,
    /// User access token.
    pub access_token: String,
    /// User access token secret.
    pub access_token_secret: String,
}

/// Signs requests with an OAuth 1.0a `Authorization` header.
#[derive(Debug, Clone)]
pub struct OAuth1Signer {
    credentials: OAuth1Credentials,
}

impl OAuth1Signer {
    /// Creates a signer over the given credentials.
    #[must_use]
    pub const fn new(credentials: OAuth1Credentials) -> Self {
        Self { credentials }
    }

    /// Builds the `Authorization: OAuth ...` header for a request.
    ///
    /// `params` must contain every query and form parameter that will be
    /// sent, since all of them participate in the signature.
    #[must_use]
    pub fn authorization_header(
        &self,
        method: &str,
        url: &str,
        params: &BTreeMap<String, String>,
    ) -> String {
        let nonce = generate_nonce();
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
            .to_string();
        self.authorization_header_at(method, url, params, &nonce, &timestamp)
    }

    /// Deterministic variant with caller-provided nonce and timestamp.
    fn authorization_header_at(
        &self,
        method: &str,
        url: &str,
        params: &BTreeMap<String, String>,
        nonce: &str,
        timestamp: &str,
    ) -> String {
        let mut oauth_params = BTreeMap::new();
        oauth_params.insert("oauth_consumer_key", self.credentials.consumer_key.as_str());
        oauth_params.insert("oauth_nonce", nonce);
        oauth_params.insert("oauth_signature_method", "HMAC-SHA1");
        oauth_params.insert("oauth_timestamp", timestamp);
        oauth_params.insert("oauth_token", self.credentials.access_token.as_str());
        oauth_params.insert("oauth_version", "1.0");

        let mut all_params: BTreeMap<String, String> = params.clone();
        for (k, v) in &oauth_params {
            all_params.insert((*k).to_owned(), (*v).to_owned());
        }

        let base = signature_base_string(method, url, &all_params);
        let signature = self.sign(&base);

        let mut header_params: Vec<(String, String)> = oauth_params
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        header_params.push(("oauth_signature".to_owned(), signature));
        header_params.sort();

        let joined = header_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", oauth_encode(k), oauth_encode(v)))
            .collect::<Vec<_>>()
            .join(", ");
        format!("OAuth {joined}")
    }

    /// HMAC-SHA1 over the base string, base64-encoded.
    fn sign(&self, base: &str) -> String {
        let key = format!(
            "{}&{}",
            oauth_encode(&self.credentials.consumer_secret),
            oauth_encode(&self.credentials.access_token_secret)
        );
        let mut mac = Hmac::<Sha1>::new_from_slice(key.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(base.as_bytes());
        b64.encode(mac.finalize().into_bytes())
    }
}

/// The OAuth 1.0a signature base string:
/// `METHOD & encode(url) & encode(k1=v1&k2=v2...)` with sorted,
/// individually encoded parameters.
fn signature_base_string(method: &str, url: &str, params: &BTreeMap<String, String>) -> String {
    let encoded_params = params
        .iter()
        .map(|(k, v)| format!("{}={}", oauth_encode(k), oauth_encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        oauth_encode(url),
        oauth_encode(&encoded_params)
    )
}

/// 16 random bytes, hex-encoded.
fn generate_nonce() -> String {
    let mut bytes = [0_u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
