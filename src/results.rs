// src/results.rs
//
// Aggregate counters for one import run. Shared across worker tasks behind a
// mutex and reported once at the end of the run.

use log::{info, warn};

use crate::models::{ResolutionAction, ResolvedRecord};

#[derive(Debug, Default, Clone)]
pub struct ImportStats {
    pub processed: usize,
    pub auto_merged: usize,
    pub flagged_merges: usize,
    pub queued_for_review: usize,
    pub kept_separate: usize,
    pub errors: usize,
    confidence_sum: f64,
    quality_sum: f64,
}

impl ImportStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, resolved: &ResolvedRecord) {
        self.processed += 1;
        match resolved.resolution.action {
            ResolutionAction::AutoMerge => {
                self.auto_merged += 1;
                if resolved.resolution.flagged_for_audit {
                    self.flagged_merges += 1;
                }
            }
            ResolutionAction::Review => self.queued_for_review += 1,
            ResolutionAction::KeepSeparate => self.kept_separate += 1,
        }
        self.confidence_sum += resolved.resolution.confidence;
        self.quality_sum += resolved.quality.score;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    pub fn avg_confidence(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.confidence_sum / self.processed as f64
        }
    }

    pub fn avg_quality(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.quality_sum / self.processed as f64
        }
    }

    pub fn report(&self, run_id: &str, elapsed: std::time::Duration) {
        info!("Import run {} finished in {:.2?}", run_id, elapsed);
        info!(
            "  Processed: {} ({} auto-merged, {} flagged, {} queued for review, {} kept separate)",
            self.processed,
            self.auto_merged,
            self.flagged_merges,
            self.queued_for_review,
            self.kept_separate
        );
        info!(
            "  Avg match confidence: {:.4}, avg quality score: {:.3}",
            self.avg_confidence(),
            self.avg_quality()
        );
        if self.errors > 0 {
            warn!("  Errors: {} records failed resolution", self.errors);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        DataQualityScore, EntityResolutionResult, QualityBucket, QualityComponents,
        ResolutionAction,
    };

    fn resolved(action: ResolutionAction, flagged: bool, confidence: f64) -> ResolvedRecord {
        ResolvedRecord {
            canonical_id: "TX-TRAVIS-0000000000".to_string(),
            created_new: action != ResolutionAction::AutoMerge,
            resolution: EntityResolutionResult {
                canonical_id: None,
                confidence,
                matches: Vec::new(),
                action,
                flagged_for_audit: flagged,
            },
            quality: DataQualityScore {
                score: 0.8,
                components: QualityComponents {
                    completeness: 0.8,
                    accuracy: 0.8,
                    consistency: 0.8,
                    timeliness: 0.8,
                    validity: 0.8,
                    uniqueness: 0.8,
                },
                freshness_hours: 1,
                sources: vec!["regrid".to_string()],
                confidence: QualityBucket::Medium,
            },
        }
    }

    #[test]
    fn test_counters_and_averages() {
        let mut stats = ImportStats::new();
        stats.record(&resolved(ResolutionAction::AutoMerge, false, 0.95));
        stats.record(&resolved(ResolutionAction::AutoMerge, true, 0.87));
        stats.record(&resolved(ResolutionAction::Review, false, 0.75));
        stats.record(&resolved(ResolutionAction::KeepSeparate, false, 0.10));
        stats.record_error();

        assert_eq!(stats.processed, 4);
        assert_eq!(stats.auto_merged, 2);
        assert_eq!(stats.flagged_merges, 1);
        assert_eq!(stats.queued_for_review, 1);
        assert_eq!(stats.kept_separate, 1);
        assert_eq!(stats.errors, 1);
        assert!((stats.avg_confidence() - 0.6675).abs() < 1e-9);
        assert!((stats.avg_quality() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_empty_stats_average_is_zero() {
        let stats = ImportStats::new();
        assert_eq!(stats.avg_confidence(), 0.0);
        assert_eq!(stats.avg_quality(), 0.0);
    }
}
