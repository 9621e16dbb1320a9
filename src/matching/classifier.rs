// src/matching/classifier.rs
//
// Maps the surviving candidate list onto one of the three terminal actions
// via fixed threshold bands, evaluated top-down on the best candidate.

use std::cmp::Ordering;

use crate::config::{
    CONFIDENCE_AUTO_MERGE, CONFIDENCE_EXACT, CONFIDENCE_FLAGGED_MERGE, CONFIDENCE_REVIEW,
    MAX_RETAINED_MATCHES,
};
use crate::models::{EntityResolutionResult, MatchCandidate, ResolutionAction};

/// Classify scored candidates into a resolution decision.
///
/// Bands: >= 0.99 exact auto-merge, >= 0.90 auto-merge, >= 0.85 auto-merge
/// flagged for audit, >= 0.70 review, below that keep separate. The top five
/// candidates are retained on the result regardless of action.
pub fn classify(mut candidates: Vec<MatchCandidate>) -> EntityResolutionResult {
    if candidates.is_empty() {
        return EntityResolutionResult::no_candidates();
    }

    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });
    candidates.truncate(MAX_RETAINED_MATCHES);

    let best_confidence = candidates[0].confidence;
    let best_id = candidates[0].property_id.clone();

    let (action, flagged_for_audit) = if best_confidence >= CONFIDENCE_EXACT {
        (ResolutionAction::AutoMerge, false)
    } else if best_confidence >= CONFIDENCE_AUTO_MERGE {
        (ResolutionAction::AutoMerge, false)
    } else if best_confidence >= CONFIDENCE_FLAGGED_MERGE {
        (ResolutionAction::AutoMerge, true)
    } else if best_confidence >= CONFIDENCE_REVIEW {
        (ResolutionAction::Review, false)
    } else {
        (ResolutionAction::KeepSeparate, false)
    };

    let canonical_id = if action == ResolutionAction::AutoMerge {
        Some(best_id)
    } else {
        None
    };

    EntityResolutionResult {
        canonical_id,
        confidence: best_confidence,
        matches: candidates,
        action,
        flagged_for_audit,
    }
}
