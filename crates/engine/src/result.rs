use serde::Serialize;
use time::OffsetDateTime;

/// Key count of one produced artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArtifactSummary {
    /// 1-based position within the run.
    pub batch_num: usize,
    pub key_count: usize,
}

/// Counts and reconciliation deltas of one engine run.
///
/// Built fresh per run and only logged, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineRunResult {
    #[serde(with = "time::serde::rfc3339")]
    pub started: OffsetDateTime,
    pub total_seconds: f64,
    /// Rows read by the snapshot stage.
    pub input_count: usize,
    /// Rows moved into staging.
    pub filtered_input_count: usize,
    pub stuffing_count: usize,
    /// Staged real keys left out of every artifact for lack of a risk level.
    pub transmission_risk_none_count: usize,
    /// Staged keys embedded in a committed artifact.
    pub output_count: usize,
    pub artifacts: Vec<ArtifactSummary>,
    /// Source keys whose published flag was set.
    pub mark_used_count: usize,
    pub reconcile_output_count: i64,
    pub reconcile_artifact_sum_count: i64,
}

impl EngineRunResult {
    pub fn new(started: OffsetDateTime) -> Self {
        EngineRunResult {
            started,
            total_seconds: 0.0,
            input_count: 0,
            filtered_input_count: 0,
            stuffing_count: 0,
            transmission_risk_none_count: 0,
            output_count: 0,
            artifacts: Vec::new(),
            mark_used_count: 0,
            reconcile_output_count: 0,
            reconcile_artifact_sum_count: 0,
        }
    }

    pub fn artifact_key_sum(&self) -> usize {
        self.artifacts.iter().map(|a| a.key_count).sum()
    }

    /// Fill both reconciliation deltas from the counts.
    ///
    /// Rows rejected by the snapshot filter never reach staging, so output is
    /// balanced against the staged count rather than the rows read.
    pub fn reconcile(&mut self) {
        self.reconcile_output_count = self.filtered_input_count as i64
            + self.stuffing_count as i64
            - self.transmission_risk_none_count as i64
            - self.output_count as i64;
        self.reconcile_artifact_sum_count =
            self.output_count as i64 - self.artifact_key_sum() as i64;
    }

    pub fn is_reconciled(&self) -> bool {
        self.reconcile_output_count == 0 && self.reconcile_artifact_sum_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn reconcile_counts_stuffing_and_excluded_keys() {
        let mut result = EngineRunResult::new(datetime!(2020-10-23 12:00:00 UTC));
        result.input_count = 3;
        result.filtered_input_count = 3;
        result.stuffing_count = 3;
        result.transmission_risk_none_count = 1;
        result.output_count = 5;
        result.artifacts = vec![ArtifactSummary {
            batch_num: 1,
            key_count: 5,
        }];
        result.reconcile();
        assert!(result.is_reconciled());

        result.artifacts[0].key_count = 4;
        result.reconcile();
        assert_eq!(result.reconcile_artifact_sum_count, 1);
        assert!(!result.is_reconciled());
    }

    #[test]
    fn rows_rejected_before_staging_do_not_unbalance_output() {
        let mut result = EngineRunResult::new(datetime!(2020-10-23 12:00:00 UTC));
        result.input_count = 3;
        result.filtered_input_count = 1;
        result.output_count = 1;
        result.artifacts = vec![ArtifactSummary {
            batch_num: 1,
            key_count: 1,
        }];
        result.reconcile();
        assert_eq!(result.reconcile_output_count, 0);
        assert!(result.is_reconciled());
    }
}
