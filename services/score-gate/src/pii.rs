//! PII payload handling and privacy-preserving hashes.
//!
//! Raw PII only lives inside [`Redacted`] wrappers; what leaves this module
//! is a one-way hash. Hashes are domain-separated so a national id hash can
//! never collide with a requester hash.

use std::fmt::{self, Write as _};

use rust_common::Redacted;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::GateError;

const PII_HASH_DOMAIN: &str = "pii:v1:";
const REQUESTER_HASH_DOMAIN: &str = "requester:v1:";

/// Request body shared by both endpoints. Every field is optional on the
/// wire so that missing fields become a validation error, not a 422.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PiiPayload {
    /// Borrower's full name
    #[serde(default)]
    pub full_name: Option<Redacted<String>>,
    /// Caller's email address
    #[serde(default)]
    pub email: Option<Redacted<String>>,
    /// Borrower's national id
    #[serde(default)]
    pub national_id: Option<Redacted<String>>,
}

/// A payload that passed validation, with its derived hashes.
#[derive(Debug, Clone)]
pub struct ValidatedPii {
    full_name: Redacted<String>,
    pii_hash: String,
    requester_id: String,
}

impl ValidatedPii {
    /// Hash binding a token to this national id.
    #[must_use]
    pub fn pii_hash(&self) -> &str {
        &self.pii_hash
    }

    /// Hash of the caller's email domain.
    #[must_use]
    pub fn requester_id(&self) -> &str {
        &self.requester_id
    }

    /// Borrower name, still wrapped.
    #[must_use]
    pub fn full_name(&self) -> &Redacted<String> {
        &self.full_name
    }
}

impl PiiPayload {
    /// Builds a payload from plain strings.
    #[must_use]
    pub fn new(full_name: &str, email: &str, national_id: &str) -> Self {
        Self {
            full_name: Some(Redacted::new(full_name.to_string())),
            email: Some(Redacted::new(email.to_string())),
            national_id: Some(Redacted::new(national_id.to_string())),
        }
    }

    /// Checks required fields and derives both hashes.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Validation`] naming the first bad field.
    pub fn validate(&self) -> Result<ValidatedPii, GateError> {
        let full_name = non_blank(self.full_name.as_ref())
            .ok_or_else(|| GateError::validation("full_name is required"))?;
        let email = non_blank(self.email.as_ref())
            .ok_or_else(|| GateError::validation("email is required"))?;
        let national_id = non_blank(self.national_id.as_ref())
            .ok_or_else(|| GateError::validation("national_id is required"))?;

        let domain = email_domain(email)
            .ok_or_else(|| GateError::validation("email must contain a local part and a domain"))?;

        Ok(ValidatedPii {
            full_name: Redacted::new(full_name.to_string()),
            pii_hash: pii_hash(national_id),
            requester_id: requester_id(domain),
        })
    }

    /// Hash of the national id as presented, if one is present at all.
    #[must_use]
    pub fn binding_hash(&self) -> Option<String> {
        non_blank(self.national_id.as_ref()).map(pii_hash)
    }

    /// Borrower name for display, if present.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        non_blank(self.full_name.as_ref())
    }
}

fn non_blank(value: Option<&Redacted<String>>) -> Option<&str> {
    value
        .map(|v| v.expose().trim())
        .filter(|v| !v.is_empty())
}

/// Domain part of an email. `None` when local part or domain is empty.
fn email_domain(email: &str) -> Option<&str> {
    let (local, domain) = email.rsplit_once('@')?;
    if local.trim().is_empty() || domain.trim().is_empty() || domain.contains(char::is_whitespace) {
        return None;
    }
    Some(domain.trim())
}

/// One-way hash of a national id. Separators and spaces are ignored.
#[must_use]
pub fn pii_hash(national_id: &str) -> String {
    let normalized: String = national_id
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '.')
        .collect();
    domain_hash(PII_HASH_DOMAIN, &normalized)
}

/// One-way hash of an email domain. Case-insensitive.
#[must_use]
pub fn requester_id(domain: &str) -> String {
    domain_hash(REQUESTER_HASH_DOMAIN, &domain.trim().to_ascii_lowercase())
}

fn domain_hash(domain: &str, value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(domain.as_bytes());
    hasher.update(value.as_bytes());
    hasher.finalize().iter().fold(String::new(), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

/// Constant-time equality of two hashes.
#[must_use]
pub fn hashes_match(expected: &str, presented: &str) -> bool {
    bool::from(expected.as_bytes().ct_eq(presented.as_bytes()))
}

/// Masks a name for display: first letter of each part, rest starred.
#[must_use]
pub fn mask_name(name: &str) -> String {
    name.split_whitespace()
        .map(|part| {
            let mut chars = part.chars();
            chars.next().map_or_else(String::new, |first| {
                let mut masked = String::with_capacity(part.len());
                masked.push(first);
                masked.extend(chars.map(|_| '*'));
                masked
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

impl fmt::Display for ValidatedPii {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pii:{} requester:{}",
            rust_common::truncate_for_log(&self.pii_hash),
            rust_common::truncate_for_log(&self.requester_id)
        )
    }
}
