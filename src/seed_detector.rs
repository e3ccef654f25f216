//! Seed-change detection (§4.5). Pure decision logic; the seed crawler is
//! responsible for the actual conditional GET and rate limiting.

use crate::http_client::{ConditionalResult, Fetched, Validator};
use crate::util::sha256_hex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReasonKind {
    CompletedUnchanged,
    NoChangeDetected,
}

pub enum ChangeDecision {
    Skip(SkipReasonKind),
    Recrawl(Fetched),
}

/// Applies steps 2-3 of §4.5 to the result of a conditional GET made against
/// a stored validator that is change-checked (has an ETag and/or Last-Modified).
pub fn decide_from_conditional(result: ConditionalResult, prior: &Validator) -> ChangeDecision {
    match result {
        ConditionalResult::Unchanged => ChangeDecision::Skip(SkipReasonKind::CompletedUnchanged),
        ConditionalResult::Changed(fetched) => {
            if let Some(prior_hash) = &prior.content_sha256 {
                if sha256_hex(&fetched.body) == *prior_hash {
                    return ChangeDecision::Skip(SkipReasonKind::NoChangeDetected);
                }
            }
            ChangeDecision::Recrawl(fetched)
        }
    }
}

/// Applies step 4 of §4.5: no validators were ever stored, so the only
/// signal is a direct body-hash comparison against the plain GET response.
pub fn decide_from_plain(fetched: Fetched, prior: Option<&Validator>) -> ChangeDecision {
    match prior.and_then(|p| p.content_sha256.as_ref()) {
        Some(prior_hash) if sha256_hex(&fetched.body) == *prior_hash => {
            ChangeDecision::Skip(SkipReasonKind::NoChangeDetected)
        }
        _ => ChangeDecision::Recrawl(fetched),
    }
}

/// Builds the validator to store for a seed from the response just crawled (§4.7).
pub fn validator_from(fetched: &Fetched) -> Validator {
    Validator {
        etag: fetched.etag.clone(),
        last_modified: fetched.last_modified.clone(),
        content_sha256: Some(sha256_hex(&fetched.body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetched(body: &[u8]) -> Fetched {
        Fetched {
            status: reqwest::StatusCode::OK,
            final_url: "https://city.example/idx".to_string(),
            content_type: Some("text/html".to_string()),
            etag: None,
            last_modified: None,
            body: body.to_vec(),
        }
    }

    #[test]
    fn unchanged_conditional_result_skips() {
        let prior = Validator::default();
        let decision = decide_from_conditional(ConditionalResult::Unchanged, &prior);
        assert!(matches!(decision, ChangeDecision::Skip(SkipReasonKind::CompletedUnchanged)));
    }

    #[test]
    fn changed_conditional_result_with_matching_hash_skips() {
        let f = fetched(b"same body");
        let prior = Validator {
            content_sha256: Some(sha256_hex(b"same body")),
            ..Default::default()
        };
        let decision = decide_from_conditional(ConditionalResult::Changed(f), &prior);
        assert!(matches!(decision, ChangeDecision::Skip(SkipReasonKind::NoChangeDetected)));
    }

    #[test]
    fn changed_conditional_result_with_new_hash_recrawls() {
        let f = fetched(b"new body");
        let prior = Validator {
            content_sha256: Some(sha256_hex(b"old body")),
            ..Default::default()
        };
        let decision = decide_from_conditional(ConditionalResult::Changed(f), &prior);
        assert!(matches!(decision, ChangeDecision::Recrawl(_)));
    }

    #[test]
    fn plain_comparison_with_no_prior_recrawls() {
        let f = fetched(b"body");
        let decision = decide_from_plain(f, None);
        assert!(matches!(decision, ChangeDecision::Recrawl(_)));
    }

    #[test]
    fn plain_comparison_with_identical_hash_skips() {
        let f = fetched(b"identical");
        let prior = Validator {
            content_sha256: Some(sha256_hex(b"identical")),
            ..Default::default()
        };
        let decision = decide_from_plain(f, Some(&prior));
        assert!(matches!(decision, ChangeDecision::Skip(SkipReasonKind::NoChangeDetected)));
    }
}
