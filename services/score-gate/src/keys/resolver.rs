//! Ordered key-source resolution.
//!
//! A chain is a fixed list of named sources tried in order; the first value
//! that parses into a valid Ed25519 key wins. Resolution is a pure function
//! of a lookup closure (`name -> Option<value>`), so tests drive it with a
//! map instead of the process environment. Having several names per side
//! lets operators rotate keys without downtime: publish the new key under
//! the dedicated name while the shared one still serves.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::jwk::{OkpJwk, OkpJwks, SigningKeyMaterial, VerifyingKeyMaterial};
use super::{KeyParseError, KeyResolutionError, SourceAttempt};

/// Name of the verifier's trusted key set (a JWKS document).
pub const TRUSTED_JWKS_SOURCE: &str = "VERIFIER_TRUSTED_JWKS";

/// How a source value is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEncoding {
    /// JWK JSON, base64-wrapped
    Base64Jwk,
    /// JWK JSON as-is
    RawJwk,
}

/// One named configuration source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySource {
    /// Configuration name
    pub name: &'static str,
    /// Value encoding
    pub encoding: KeyEncoding,
    /// Whether the JWK carries a private `d`
    pub private: bool,
}

impl KeySource {
    const fn new(name: &'static str, encoding: KeyEncoding, private: bool) -> Self {
        Self {
            name,
            encoding,
            private,
        }
    }

    fn decode(&self, value: &str) -> Result<OkpJwk, KeyParseError> {
        match self.encoding {
            KeyEncoding::Base64Jwk => OkpJwk::from_base64(value),
            KeyEncoding::RawJwk => OkpJwk::from_json(value),
        }
    }
}

/// Issuer chain: dedicated key then shared key, base64 before raw.
#[must_use]
pub const fn issuer_sources() -> [KeySource; 4] {
    [
        KeySource::new("ISSUER_SIGNING_JWK_B64", KeyEncoding::Base64Jwk, true),
        KeySource::new("ISSUER_SIGNING_JWK", KeyEncoding::RawJwk, true),
        KeySource::new("SCORE_SIGNING_JWK_B64", KeyEncoding::Base64Jwk, true),
        KeySource::new("SCORE_SIGNING_JWK", KeyEncoding::RawJwk, true),
    ]
}

/// Verifier fallback chain: dedicated public key, shared public key, then
/// the public half of the shared private key.
#[must_use]
pub const fn verifier_sources() -> [KeySource; 6] {
    [
        KeySource::new("VERIFIER_PUBLIC_JWK_B64", KeyEncoding::Base64Jwk, false),
        KeySource::new("VERIFIER_PUBLIC_JWK", KeyEncoding::RawJwk, false),
        KeySource::new("SCORE_PUBLIC_JWK_B64", KeyEncoding::Base64Jwk, false),
        KeySource::new("SCORE_PUBLIC_JWK", KeyEncoding::RawJwk, false),
        KeySource::new("SCORE_SIGNING_JWK_B64", KeyEncoding::Base64Jwk, true),
        KeySource::new("SCORE_SIGNING_JWK", KeyEncoding::RawJwk, true),
    ]
}

/// Reads a source from the process environment.
#[must_use]
pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Tries `sources` in order and returns the first value `parse` accepts.
///
/// # Errors
///
/// Returns every attempt's outcome when no source yields a key.
pub fn resolve_first<T, L, P>(
    sources: &[KeySource],
    lookup: L,
    parse: P,
) -> Result<T, KeyResolutionError>
where
    L: Fn(&str) -> Option<String>,
    P: Fn(&KeySource, OkpJwk) -> Result<T, KeyParseError>,
{
    let mut attempts = Vec::with_capacity(sources.len());

    for source in sources {
        let Some(value) = lookup(source.name).filter(|v| !v.trim().is_empty()) else {
            attempts.push(SourceAttempt {
                source: source.name,
                rejected: None,
            });
            continue;
        };

        match source.decode(&value).and_then(|jwk| parse(source, jwk)) {
            Ok(key) => {
                debug!(source = source.name, "Key source accepted");
                return Ok(key);
            }
            Err(err) => {
                warn!(source = source.name, error = %err, "Key source rejected");
                attempts.push(SourceAttempt {
                    source: source.name,
                    rejected: Some(err),
                });
            }
        }
    }

    Err(KeyResolutionError { attempts })
}

/// Resolves the issuer's signing key.
///
/// # Errors
///
/// Returns an error when no issuer source holds a valid private key.
pub fn resolve_signing_key<L>(lookup: L) -> Result<SigningKeyMaterial, KeyResolutionError>
where
    L: Fn(&str) -> Option<String>,
{
    resolve_first(&issuer_sources(), lookup, |_, jwk| jwk.into_signing())
}

/// Verification keys: a trusted set keyed by `kid` plus one fallback key.
#[derive(Debug, Clone, Default)]
pub struct VerificationKeySet {
    trusted: HashMap<String, VerifyingKeyMaterial>,
    fallback: Option<VerifyingKeyMaterial>,
}

impl VerificationKeySet {
    /// Builds a set from explicit keys; the first becomes the fallback.
    #[must_use]
    pub fn from_keys(keys: impl IntoIterator<Item = VerifyingKeyMaterial>) -> Self {
        let mut set = Self::default();
        for key in keys {
            if set.fallback.is_none() {
                set.fallback = Some(key);
            } else {
                set.trusted.entry(key.kid().to_string()).or_insert(key);
            }
        }
        set
    }

    /// Looks up the key for `kid`: trusted set first, then the fallback key.
    #[must_use]
    pub fn get(&self, kid: &str) -> Option<&VerifyingKeyMaterial> {
        self.trusted
            .get(kid)
            .or_else(|| self.fallback.as_ref().filter(|key| key.kid() == kid))
    }

    /// Number of distinct resolvable keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let fallback_extra = self
            .fallback
            .as_ref()
            .is_some_and(|key| !self.trusted.contains_key(key.kid()));
        self.trusted.len() + usize::from(fallback_extra)
    }

    /// Whether no key resolved at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolves the verifier's key set.
///
/// Invalid entries in the trusted set are skipped individually; the fallback
/// chain is tried independently. Fails only when neither yields a key.
///
/// # Errors
///
/// Returns an error when no verification key resolves from any source.
pub fn resolve_verification_keys<L>(lookup: L) -> Result<VerificationKeySet, KeyResolutionError>
where
    L: Fn(&str) -> Option<String>,
{
    let (trusted, trusted_attempt) = match lookup(TRUSTED_JWKS_SOURCE) {
        Some(raw) if !raw.trim().is_empty() => parse_trusted_set(&raw),
        _ => (
            HashMap::new(),
            SourceAttempt {
                source: TRUSTED_JWKS_SOURCE,
                rejected: None,
            },
        ),
    };

    let fallback = resolve_first(&verifier_sources(), &lookup, |source, jwk| {
        if source.private {
            jwk.into_signing().map(|key| key.verifying_key().clone())
        } else {
            jwk.into_verifying()
        }
    });

    match fallback {
        Ok(key) => Ok(VerificationKeySet {
            trusted,
            fallback: Some(key),
        }),
        Err(_) if !trusted.is_empty() => Ok(VerificationKeySet {
            trusted,
            fallback: None,
        }),
        Err(mut err) => {
            err.attempts.insert(0, trusted_attempt);
            Err(err)
        }
    }
}

fn parse_trusted_set(raw: &str) -> (HashMap<String, VerifyingKeyMaterial>, SourceAttempt) {
    let mut keys = HashMap::new();

    let jwks: OkpJwks = match serde_json::from_str(raw.trim()) {
        Ok(jwks) => jwks,
        Err(_) => {
            warn!(source = TRUSTED_JWKS_SOURCE, "Trusted key set is not a JWKS document");
            return (
                keys,
                SourceAttempt {
                    source: TRUSTED_JWKS_SOURCE,
                    rejected: Some(KeyParseError::NotJson),
                },
            );
        }
    };

    let mut last_error = None;
    for (index, entry) in jwks.keys.into_iter().enumerate() {
        let parsed = serde_json::from_value::<OkpJwk>(entry)
            .map_err(|_| KeyParseError::NotJson)
            .and_then(OkpJwk::into_verifying);
        match parsed {
            Ok(key) => {
                if keys.contains_key(key.kid()) {
                    warn!(kid = %key.kid(), "Duplicate kid in trusted key set, keeping first");
                    continue;
                }
                keys.insert(key.kid().to_string(), key);
            }
            Err(err) => {
                warn!(index, error = %err, "Skipping invalid trusted key");
                last_error = Some(err);
            }
        }
    }

    let rejected = if keys.is_empty() {
        Some(last_error.unwrap_or(KeyParseError::MissingField("keys")))
    } else {
        None
    };

    (
        keys,
        SourceAttempt {
            source: TRUSTED_JWKS_SOURCE,
            rejected,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
    use base64::Engine;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    fn jwk_pair(kid: &str) -> (String, String) {
        let key = SigningKey::generate(&mut OsRng);
        let x = URL_SAFE_NO_PAD.encode(key.verifying_key().to_bytes());
        let d = URL_SAFE_NO_PAD.encode(key.to_bytes());
        let private = serde_json::json!({"kty": "OKP", "crv": "Ed25519", "kid": kid, "x": x, "d": d});
        let public = serde_json::json!({"kty": "OKP", "crv": "Ed25519", "kid": kid, "x": x});
        (private.to_string(), public.to_string())
    }

    fn lookup_from(pairs: Vec<(&'static str, String)>) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<&'static str, String> = pairs.into_iter().collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_first_valid_source_wins() {
        let (dedicated, _) = jwk_pair("dedicated");
        let (shared, _) = jwk_pair("shared");
        let lookup = lookup_from(vec![
            ("ISSUER_SIGNING_JWK", dedicated),
            ("SCORE_SIGNING_JWK_B64", STANDARD.encode(shared)),
        ]);

        let key = resolve_signing_key(lookup).unwrap();
        assert_eq!(key.kid(), "dedicated");
    }

    #[test]
    fn test_invalid_source_falls_through() {
        let (shared, _) = jwk_pair("shared");
        let lookup = lookup_from(vec![
            ("ISSUER_SIGNING_JWK_B64", "%%% not base64 %%%".to_string()),
            ("ISSUER_SIGNING_JWK", "{\"kty\":\"RSA\"}".to_string()),
            ("SCORE_SIGNING_JWK", shared),
        ]);

        let key = resolve_signing_key(lookup).unwrap();
        assert_eq!(key.kid(), "shared");
    }

    #[test]
    fn test_no_source_reports_every_attempt() {
        let lookup = lookup_from(vec![("ISSUER_SIGNING_JWK", "   ".to_string())]);
        let err = resolve_signing_key(lookup).unwrap_err();
        assert_eq!(err.attempts.len(), 4);
        assert!(err.attempts.iter().all(|a| a.rejected.is_none()));
    }

    #[test]
    fn test_public_key_cannot_sign() {
        let (_, public) = jwk_pair("pub-only");
        let lookup = lookup_from(vec![("ISSUER_SIGNING_JWK", public)]);
        let err = resolve_signing_key(lookup).unwrap_err();
        assert!(err
            .attempts
            .iter()
            .any(|a| a.rejected == Some(KeyParseError::MissingField("d"))));
    }

    #[test]
    fn test_error_message_never_contains_value() {
        let (private, _) = jwk_pair("k");
        let mut broken: serde_json::Value = serde_json::from_str(&private).unwrap();
        broken["crv"] = serde_json::json!("P-256");
        let lookup = lookup_from(vec![("ISSUER_SIGNING_JWK", broken.to_string())]);
        let err = resolve_signing_key(lookup).unwrap_err();
        let d = broken["d"].as_str().unwrap();
        assert!(!err.to_string().contains(d));
        assert!(err.to_string().contains("ISSUER_SIGNING_JWK"));
    }

    #[test]
    fn test_verifier_derives_public_from_shared_private() {
        let (private, _) = jwk_pair("shared");
        let lookup = lookup_from(vec![("SCORE_SIGNING_JWK", private)]);
        let set = resolve_verification_keys(lookup).unwrap();
        assert!(set.get("shared").is_some());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_trusted_set_keyed_by_kid() {
        let (_, public_a) = jwk_pair("a");
        let (_, public_b) = jwk_pair("b");
        let jwks = format!(r#"{{"keys":[{public_a},{public_b},{{"kty":"RSA"}}]}}"#);
        let lookup = lookup_from(vec![(TRUSTED_JWKS_SOURCE, jwks)]);
        let set = resolve_verification_keys(lookup).unwrap();
        assert!(set.get("a").is_some());
        assert!(set.get("b").is_some());
        assert!(set.get("c").is_none());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_fallback_key_only_matches_its_kid() {
        let (_, public) = jwk_pair("current");
        let lookup = lookup_from(vec![("VERIFIER_PUBLIC_JWK", public)]);
        let set = resolve_verification_keys(lookup).unwrap();
        assert!(set.get("current").is_some());
        assert!(set.get("retired").is_none());
    }

    #[test]
    fn test_verifier_without_keys_fails() {
        let lookup = lookup_from(vec![(TRUSTED_JWKS_SOURCE, "not json".to_string())]);
        let err = resolve_verification_keys(lookup).unwrap_err();
        assert_eq!(err.attempts[0].source, TRUSTED_JWKS_SOURCE);
        assert_eq!(err.attempts[0].rejected, Some(KeyParseError::NotJson));
        assert_eq!(err.attempts.len(), 7);
    }
}
