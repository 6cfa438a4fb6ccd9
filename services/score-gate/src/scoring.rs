//! Score lookup behind a verified capability.
//!
//! The scoring model itself lives elsewhere; [`ScoreProvider`] is the seam.
//! [`SyntheticScoreProvider`] derives a stable score from the PII hash so the
//! full flow can run without an external dependency.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::GateError;
use crate::pii::mask_name;

const MIN_SCORE: u16 = 300;
const MAX_SCORE: u16 = 850;

/// Input to a score lookup. Identifies the borrower by hash only.
#[derive(Debug, Clone)]
pub struct ScoreRequest {
    /// Hash bound into the verified token
    pub pii_hash: String,
    /// Borrower name for display, if the caller sent one
    pub display_name: Option<String>,
}

/// Borrower as shown in the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Borrower {
    /// Masked name
    pub name: String,
    /// Short reference derived from the PII hash
    pub reference: String,
}

/// Supplementary data returned with the score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Enrichment {
    /// Coarse band for the score
    pub band: &'static str,
    /// Number of open credit lines
    pub open_accounts: u8,
    /// Payment incidents over the last year
    pub recent_incidents: u8,
}

/// Result of a score lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreReport {
    /// Borrower view
    pub borrower: Borrower,
    /// Score in 300..=850
    pub score: u16,
    /// Supplementary data
    pub enrichment: Enrichment,
}

/// Source of scores.
#[async_trait]
pub trait ScoreProvider: Send + Sync {
    /// Looks up the score for an authorized request.
    async fn score(&self, request: &ScoreRequest) -> Result<ScoreReport, GateError>;
}

/// Deterministic provider: the same PII hash always yields the same report.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticScoreProvider;

#[async_trait]
impl ScoreProvider for SyntheticScoreProvider {
    async fn score(&self, request: &ScoreRequest) -> Result<ScoreReport, GateError> {
        let seed = hash_seed(&request.pii_hash)?;
        let span = u64::from(MAX_SCORE - MIN_SCORE) + 1;
        let offset = u16::try_from(seed % span).map_err(|e| GateError::Internal(e.into()))?;
        let score = MIN_SCORE + offset;

        Ok(ScoreReport {
            borrower: Borrower {
                name: request
                    .display_name
                    .as_deref()
                    .map(mask_name)
                    .unwrap_or_default(),
                reference: request.pii_hash.chars().take(8).collect(),
            },
            score,
            enrichment: Enrichment {
                band: band(score),
                open_accounts: ((seed >> 16) % 12) as u8,
                recent_incidents: ((seed >> 24) % 4) as u8,
            },
        })
    }
}

/// Canned report for demo mode. Carries no real data.
#[must_use]
pub fn demo_report() -> ScoreReport {
    ScoreReport {
        borrower: Borrower {
            name: "D*** B*******".to_string(),
            reference: "demo".to_string(),
        },
        score: 720,
        enrichment: Enrichment {
            band: band(720),
            open_accounts: 3,
            recent_incidents: 0,
        },
    }
}

fn hash_seed(pii_hash: &str) -> Result<u64, GateError> {
    let prefix = pii_hash.get(..16).ok_or_else(|| {
        GateError::Internal(anyhow::anyhow!("pii hash shorter than expected"))
    })?;
    u64::from_str_radix(prefix, 16).map_err(|e| GateError::Internal(e.into()))
}

const fn band(score: u16) -> &'static str {
    match score {
        0..=579 => "poor",
        580..=669 => "fair",
        670..=739 => "good",
        740..=799 => "very_good",
        _ => "excellent",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pii::pii_hash;

    fn request(national_id: &str) -> ScoreRequest {
        ScoreRequest {
            pii_hash: pii_hash(national_id),
            display_name: Some("Ana Souza".to_string()),
        }
    }

    #[tokio::test]
    async fn test_score_is_deterministic_and_in_range() {
        let provider = SyntheticScoreProvider;
        let a = provider.score(&request("87654321")).await.unwrap();
        let b = provider.score(&request("87654321")).await.unwrap();
        assert_eq!(a, b);
        assert!((MIN_SCORE..=MAX_SCORE).contains(&a.score));
        assert_eq!(a.borrower.name, "A** S****");
        assert_eq!(a.borrower.reference.len(), 8);
    }

    #[tokio::test]
    async fn test_short_hash_is_internal_error() {
        let provider = SyntheticScoreProvider;
        let err = provider
            .score(&ScoreRequest {
                pii_hash: "abc".into(),
                display_name: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Internal(_)));
    }

    #[test]
    fn test_bands() {
        assert_eq!(band(300), "poor");
        assert_eq!(band(700), "good");
        assert_eq!(band(850), "excellent");
        assert_eq!(demo_report().enrichment.band, "good");
    }
}
