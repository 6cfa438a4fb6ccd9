//! Ed25519 OKP JSON Web Keys.
//!
//! Key sources hold a JWK (`kty = "OKP"`, `crv = "Ed25519"`). Parsing checks
//! that the key really is a usable Ed25519 key before it is accepted: `x`
//! must decode to a curve point, and when `d` is present its derived public
//! key must equal `x`.

use std::fmt;

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use ed25519_dalek::{SigningKey, VerifyingKey, PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH};
use jsonwebtoken::{DecodingKey, EncodingKey};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use super::KeyParseError;

/// PKCS#8 v1 prefix for a bare Ed25519 private key (RFC 8410).
const ED25519_PKCS8_PREFIX: [u8; 16] = [
    0x30, 0x2e, // SEQUENCE, 46 bytes
    0x02, 0x01, 0x00, // INTEGER version 0
    0x30, 0x05, // SEQUENCE, 5 bytes (algorithm identifier)
    0x06, 0x03, 0x2b, 0x65, 0x70, // OID 1.3.101.112 (Ed25519)
    0x04, 0x22, // OCTET STRING, 34 bytes
    0x04, 0x20, // OCTET STRING, 32 bytes (the actual key)
];

/// Wire shape of an OKP JWK. `Debug` is intentionally not derived.
#[derive(Deserialize)]
pub(crate) struct OkpJwk {
    kty: String,
    crv: Option<String>,
    x: Option<String>,
    d: Option<String>,
    kid: Option<String>,
    alg: Option<String>,
    #[serde(rename = "use")]
    key_use: Option<String>,
}

/// JWK Set wrapper used by the trusted key source.
#[derive(Deserialize)]
pub(crate) struct OkpJwks {
    pub(crate) keys: Vec<serde_json::Value>,
}

/// Public half of an Ed25519 key, ready for signature verification.
#[derive(Clone)]
pub struct VerifyingKeyMaterial {
    kid: String,
    decoding_key: DecodingKey,
}

impl VerifyingKeyMaterial {
    /// Key identifier.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    fn from_public_bytes(kid: String, public: &[u8; PUBLIC_KEY_LENGTH]) -> Result<Self, KeyParseError> {
        VerifyingKey::from_bytes(public).map_err(|_| KeyParseError::NotOnCurve)?;
        let x = URL_SAFE_NO_PAD.encode(public);
        let decoding_key =
            DecodingKey::from_ed_components(&x).map_err(|_| KeyParseError::NotOnCurve)?;
        Ok(Self { kid, decoding_key })
    }
}

impl fmt::Debug for VerifyingKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifyingKeyMaterial")
            .field("kid", &self.kid)
            .field("alg", &"EdDSA")
            .finish_non_exhaustive()
    }
}

/// Private Ed25519 key for the issuer. Key bytes never leave this type.
#[derive(Clone)]
pub struct SigningKeyMaterial {
    kid: String,
    encoding_key: EncodingKey,
    public: VerifyingKeyMaterial,
}

impl SigningKeyMaterial {
    /// Key identifier placed in the token header.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Matching public key.
    #[must_use]
    pub fn verifying_key(&self) -> &VerifyingKeyMaterial {
        &self.public
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    /// Builds key material from a 32-byte Ed25519 seed.
    ///
    /// # Errors
    ///
    /// Returns an error if the derived public key is rejected.
    pub fn from_seed(kid: impl Into<String>, seed: &[u8; SECRET_KEY_LENGTH]) -> Result<Self, KeyParseError> {
        let kid = kid.into();
        let signing_key = SigningKey::from_bytes(seed);
        let public_bytes = signing_key.verifying_key().to_bytes();
        let public = VerifyingKeyMaterial::from_public_bytes(kid.clone(), &public_bytes)?;

        let mut pkcs8_der = Zeroizing::new(Vec::with_capacity(48));
        pkcs8_der.extend_from_slice(&ED25519_PKCS8_PREFIX);
        pkcs8_der.extend_from_slice(seed);

        Ok(Self {
            kid,
            encoding_key: EncodingKey::from_ed_der(&pkcs8_der),
            public,
        })
    }
}

impl fmt::Debug for SigningKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyMaterial")
            .field("kid", &self.kid)
            .field("alg", &"EdDSA")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl OkpJwk {
    /// Parses raw JWK JSON text.
    pub(crate) fn from_json(raw: &str) -> Result<Self, KeyParseError> {
        serde_json::from_str(raw.trim()).map_err(|_| KeyParseError::NotJson)
    }

    /// Parses base64-encoded JWK JSON text (standard or URL-safe alphabet).
    pub(crate) fn from_base64(encoded: &str) -> Result<Self, KeyParseError> {
        let bytes = Zeroizing::new(decode_any_base64(encoded.trim())?);
        let text = std::str::from_utf8(&bytes).map_err(|_| KeyParseError::NotJson)?;
        Self::from_json(text)
    }

    fn check_header_fields(&self) -> Result<(), KeyParseError> {
        if self.kty != "OKP" {
            return Err(KeyParseError::UnsupportedKeyType);
        }
        if self.crv.as_deref() != Some("Ed25519") {
            return Err(KeyParseError::UnsupportedCurve);
        }
        if let Some(alg) = self.alg.as_deref() {
            if alg != "EdDSA" {
                return Err(KeyParseError::AlgorithmMismatch);
            }
        }
        if let Some(key_use) = self.key_use.as_deref() {
            if key_use != "sig" {
                return Err(KeyParseError::WrongKeyUse);
            }
        }
        Ok(())
    }

    fn public_bytes(&self) -> Result<[u8; PUBLIC_KEY_LENGTH], KeyParseError> {
        let x = self.x.as_deref().ok_or(KeyParseError::MissingField("x"))?;
        let bytes = decode_any_base64(x)?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyParseError::WrongLength("x"))
    }

    fn kid_or_thumbprint(&self, public: &[u8; PUBLIC_KEY_LENGTH]) -> String {
        match self.kid.as_deref().map(str::trim) {
            Some(kid) if !kid.is_empty() => kid.to_string(),
            _ => thumbprint(public),
        }
    }

    /// Validates and converts into verification material. A private `d` is ignored.
    pub(crate) fn into_verifying(self) -> Result<VerifyingKeyMaterial, KeyParseError> {
        self.check_header_fields()?;
        let public = self.public_bytes()?;
        let kid = self.kid_or_thumbprint(&public);
        VerifyingKeyMaterial::from_public_bytes(kid, &public)
    }

    /// Validates and converts into signing material. Requires `d`.
    pub(crate) fn into_signing(self) -> Result<SigningKeyMaterial, KeyParseError> {
        self.check_header_fields()?;
        let public = self.public_bytes()?;
        let d = self.d.as_deref().ok_or(KeyParseError::MissingField("d"))?;
        let seed_vec = Zeroizing::new(decode_any_base64(d)?);
        let seed: Zeroizing<[u8; SECRET_KEY_LENGTH]> = Zeroizing::new(
            seed_vec
                .as_slice()
                .try_into()
                .map_err(|_| KeyParseError::WrongLength("d"))?,
        );

        let derived = SigningKey::from_bytes(&seed).verifying_key().to_bytes();
        if !bool::from(derived.as_slice().ct_eq(public.as_slice())) {
            return Err(KeyParseError::KeyPairMismatch);
        }

        let kid = self.kid_or_thumbprint(&public);
        SigningKeyMaterial::from_seed(kid, &seed)
    }
}

/// RFC 7638 thumbprint of an Ed25519 public key, used when a JWK has no `kid`.
#[must_use]
pub fn thumbprint(public: &[u8; PUBLIC_KEY_LENGTH]) -> String {
    let canonical = format!(
        r#"{{"crv":"Ed25519","kty":"OKP","x":"{}"}}"#,
        URL_SAFE_NO_PAD.encode(public)
    );
    URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()))
}

fn decode_any_base64(input: &str) -> Result<Vec<u8>, KeyParseError> {
    URL_SAFE_NO_PAD
        .decode(input)
        .or_else(|_| URL_SAFE.decode(input))
        .or_else(|_| STANDARD.decode(input))
        .or_else(|_| STANDARD_NO_PAD.decode(input))
        .map_err(|_| KeyParseError::NotBase64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn private_jwk(kid: Option<&str>) -> (String, SigningKey) {
        let signing_key = SigningKey::generate(&mut OsRng);
        let x = URL_SAFE_NO_PAD.encode(signing_key.verifying_key().to_bytes());
        let d = URL_SAFE_NO_PAD.encode(signing_key.to_bytes());
        let mut value = serde_json::json!({"kty": "OKP", "crv": "Ed25519", "x": x, "d": d});
        if let Some(kid) = kid {
            value["kid"] = serde_json::json!(kid);
        }
        (value.to_string(), signing_key)
    }

    #[test]
    fn test_private_jwk_parses() {
        let (raw, _) = private_jwk(Some("issuer-1"));
        let key = OkpJwk::from_json(&raw).unwrap().into_signing().unwrap();
        assert_eq!(key.kid(), "issuer-1");
        assert_eq!(key.verifying_key().kid(), "issuer-1");
    }

    #[test]
    fn test_base64_wrapped_jwk_parses() {
        let (raw, _) = private_jwk(Some("issuer-2"));
        let encoded = STANDARD.encode(raw.as_bytes());
        let key = OkpJwk::from_base64(&encoded).unwrap().into_signing().unwrap();
        assert_eq!(key.kid(), "issuer-2");
    }

    #[test]
    fn test_missing_kid_uses_thumbprint() {
        let (raw, signing_key) = private_jwk(None);
        let key = OkpJwk::from_json(&raw).unwrap().into_verifying().unwrap();
        assert_eq!(key.kid(), thumbprint(&signing_key.verifying_key().to_bytes()));
    }

    #[test]
    fn test_mismatched_pair_rejected() {
        let (raw, _) = private_jwk(Some("k"));
        let other = SigningKey::generate(&mut OsRng);
        let mut value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        value["x"] = serde_json::json!(URL_SAFE_NO_PAD.encode(other.verifying_key().to_bytes()));
        let result = OkpJwk::from_json(&value.to_string()).unwrap().into_signing();
        assert!(matches!(result, Err(KeyParseError::KeyPairMismatch)));
    }

    #[test]
    fn test_wrong_curve_rejected() {
        let raw = r#"{"kty":"OKP","crv":"X25519","x":"AAAA"}"#;
        let result = OkpJwk::from_json(raw).unwrap().into_verifying();
        assert!(matches!(result, Err(KeyParseError::UnsupportedCurve)));
    }

    #[test]
    fn test_non_eddsa_alg_rejected() {
        let (raw, _) = private_jwk(Some("k"));
        let mut value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        value["alg"] = serde_json::json!("HS256");
        let result = OkpJwk::from_json(&value.to_string()).unwrap().into_verifying();
        assert!(matches!(result, Err(KeyParseError::AlgorithmMismatch)));
    }

    #[test]
    fn test_short_public_key_rejected() {
        let raw = r#"{"kty":"OKP","crv":"Ed25519","x":"AAAA"}"#;
        let result = OkpJwk::from_json(raw).unwrap().into_verifying();
        assert!(matches!(result, Err(KeyParseError::WrongLength("x"))));
    }

    #[test]
    fn test_private_key_needs_d() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let x = URL_SAFE_NO_PAD.encode(signing_key.verifying_key().to_bytes());
        let raw = serde_json::json!({"kty": "OKP", "crv": "Ed25519", "x": x}).to_string();
        let result = OkpJwk::from_json(&raw).unwrap().into_signing();
        assert!(matches!(result, Err(KeyParseError::MissingField("d"))));
    }

    #[test]
    fn test_debug_never_shows_key() {
        let (raw, signing_key) = private_jwk(Some("k"));
        let key = OkpJwk::from_json(&raw).unwrap().into_signing().unwrap();
        let rendered = format!("{key:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains(&URL_SAFE_NO_PAD.encode(signing_key.to_bytes())));
    }
}
