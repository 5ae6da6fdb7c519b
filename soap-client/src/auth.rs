//! WS-Security UsernameToken with password digest
//!
//! `Password = Base64(SHA1(nonce ++ created ++ password))` where `nonce` is
//! the raw (decoded) nonce bytes and `created` is the UTC timestamp text
//! exactly as it appears on the wire.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use rand::RngCore;
use sha1::{Digest, Sha1};
use xmltree::Element;

use crate::error::{Result, SoapError};
use crate::xml::{self, XmlWriter};

pub const PASSWORD_DIGEST_TYPE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest";
pub const NONCE_ENCODING_TYPE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";

/// Username and password for a device account
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Compute the Base64 password digest for a raw nonce and timestamp.
pub fn password_digest(nonce: &[u8], created: &str, password: &str) -> String {
    let mut sha = Sha1::new();
    sha.update(nonce);
    sha.update(created.as_bytes());
    sha.update(password.as_bytes());
    BASE64.encode(sha.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsernameToken {
    pub username: String,
    /// Base64 digest
    pub password_digest: String,
    /// Base64 nonce
    pub nonce: String,
    /// UTC timestamp text, `YYYY-MM-DDThh:mm:ssZ`
    pub created: String,
}

impl UsernameToken {
    /// Fresh token with a random 16 byte nonce. `clock_offset` is added to
    /// the local clock so the timestamp matches the device's clock.
    pub fn generate(credentials: &Credentials, clock_offset: ChronoDuration) -> Self {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        let created = Utc::now() + clock_offset;
        Self::with_nonce(credentials, &nonce, created)
    }

    /// Deterministic construction from a known nonce and timestamp.
    pub fn with_nonce(credentials: &Credentials, nonce: &[u8], created: DateTime<Utc>) -> Self {
        let created = created.to_rfc3339_opts(SecondsFormat::Secs, true);
        Self {
            username: credentials.username.clone(),
            password_digest: password_digest(nonce, &created, &credentials.password),
            nonce: BASE64.encode(nonce),
            created,
        }
    }

    /// Recompute the digest from the received nonce and timestamp and compare.
    pub fn verify(&self, password: &str) -> bool {
        let Ok(nonce) = BASE64.decode(self.nonce.as_bytes()) else {
            return false;
        };
        password_digest(&nonce, &self.created, password) == self.password_digest
    }

    /// `wsse:Security` header block
    pub fn to_xml(&self) -> String {
        let mut w = XmlWriter::new();
        w.open_with("wsse:Security", &[("s:mustUnderstand", "1")])
            .open("wsse:UsernameToken")
            .leaf("wsse:Username", &self.username)
            .open_with("wsse:Password", &[("Type", PASSWORD_DIGEST_TYPE)])
            .raw(&xml::escape(&self.password_digest))
            .close("wsse:Password")
            .open_with("wsse:Nonce", &[("EncodingType", NONCE_ENCODING_TYPE)])
            .raw(&xml::escape(&self.nonce))
            .close("wsse:Nonce")
            .leaf("wsu:Created", &self.created)
            .close("wsse:UsernameToken")
            .close("wsse:Security");
        w.finish()
    }

    /// Extract the token from a SOAP `Header` element. Returns `Ok(None)`
    /// when the header carries no `Security` block.
    pub fn from_header(header: &Element) -> Result<Option<Self>> {
        let Some(security) = xml::child(header, "wsse:Security") else {
            return Ok(None);
        };
        let token = xml::child(security, "wsse:UsernameToken")
            .ok_or_else(|| SoapError::MissingElement("Security/UsernameToken".to_string()))?;
        Ok(Some(Self {
            username: xml::require_text(token, "wsse:Username")?,
            password_digest: xml::require_text(token, "wsse:Password")?,
            nonce: xml::child_text(token, "wsse:Nonce").unwrap_or_default(),
            created: xml::child_text(token, "wsu:Created").unwrap_or_default(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn creds() -> Credentials {
        Credentials::new("admin", "secret")
    }

    #[test]
    fn test_digest_matches_known_vector() {
        // SHA1 of nonce ++ created ++ password computed independently
        let mut sha = Sha1::new();
        sha.update(b"0123456789abcdef2024-01-01T00:00:00Zsecret");
        let expected = BASE64.encode(sha.finalize());

        assert_eq!(
            password_digest(b"0123456789abcdef", "2024-01-01T00:00:00Z", "secret"),
            expected
        );
    }

    #[test]
    fn test_with_nonce_formats_created_and_verifies() {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let token = UsernameToken::with_nonce(&creds(), b"0123456789abcdef", created);

        assert_eq!(token.created, "2024-01-01T00:00:00Z");
        assert_eq!(token.nonce, BASE64.encode(b"0123456789abcdef"));
        assert!(token.verify("secret"));
        assert!(!token.verify("wrong"));
    }

    #[test]
    fn test_generated_tokens_use_fresh_nonces() {
        let a = UsernameToken::generate(&creds(), ChronoDuration::zero());
        let b = UsernameToken::generate(&creds(), ChronoDuration::zero());
        assert_ne!(a.nonce, b.nonce);
        assert_eq!(BASE64.decode(&a.nonce).unwrap().len(), 16);
        assert!(a.verify("secret") && b.verify("secret"));
    }

    #[test]
    fn test_clock_offset_shifts_created() {
        let token = UsernameToken::generate(&creds(), ChronoDuration::hours(2));
        let created = crate::time::parse_datetime(&token.created).unwrap();
        let delta = created - Utc::now();
        assert!(delta > ChronoDuration::minutes(119) && delta <= ChronoDuration::hours(2));
    }

    #[test]
    fn test_header_round_trip() {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let token = UsernameToken::with_nonce(&creds(), b"nonce-nonce-1234", created);
        let header = format!(
            r#"<s:Header xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:wsse="{}" xmlns:wsu="{}">{}</s:Header>"#,
            crate::envelope::ns::WSSE,
            crate::envelope::ns::WSU,
            token.to_xml()
        );
        let header = xml::parse_document(&header).unwrap();
        let decoded = UsernameToken::from_header(&header).unwrap().unwrap();
        assert_eq!(decoded, token);
        assert!(decoded.verify("secret"));
    }

    #[test]
    fn test_header_without_security() {
        let header = xml::parse_document("<Header/>").unwrap();
        assert_eq!(UsernameToken::from_header(&header).unwrap(), None);
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let debug = format!("{:?}", creds());
        assert!(debug.contains("admin"));
        assert!(!debug.contains("secret"));
    }
}
