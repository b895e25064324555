//! Audit
//!
//! The per-feature sweep: search each feature in both directions on the training split,
//! keep the more extreme result, replay its indicator on the test split and emit a
//! report row.
use crate::errors::AuditError;
use crate::report::{percent_change, ReportRow, SubgroupCoefficients};
use crate::solver::{AlphaWindow, Direction, SearchOutcome, SplitView, SubgroupSearch};
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// What to do when a single feature's search fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FailurePolicy {
    /// Log the failure and leave the feature out of the report.
    #[default]
    Skip,
    /// Stop the sweep and return the error.
    Abort,
}

/// Pick the winning search among the two directions.
///
/// A valid result beats an invalid one. Otherwise the larger distance from `full_value`
/// wins, ties going to the maximising run.
pub fn select_direction(
    min: SearchOutcome,
    max: SearchOutcome,
    full_value: f64,
) -> (Direction, SearchOutcome) {
    match (min.valid, max.valid) {
        (true, false) => (Direction::Minimize, min),
        (false, true) => (Direction::Maximize, max),
        _ => {
            if (max.value - full_value).abs() >= (min.value - full_value).abs() {
                (Direction::Maximize, max)
            } else {
                (Direction::Minimize, min)
            }
        }
    }
}

/// Audits every feature of a train/test pair under one alpha window.
pub struct Auditor<'a> {
    strategy: &'a dyn SubgroupSearch,
    feature_names: &'a [String],
    sensitive: &'a [usize],
    window: AlphaWindow,
    num_threads: Option<usize>,
    failure_policy: FailurePolicy,
}

impl<'a> Auditor<'a> {
    /// * `strategy` - Subgroup search used for every feature.
    /// * `feature_names` - One name per column of the split matrices.
    /// * `sensitive` - Columns the subgroup indicator may use.
    /// * `window` - Admissible subgroup size.
    pub fn new(
        strategy: &'a dyn SubgroupSearch,
        feature_names: &'a [String],
        sensitive: &'a [usize],
        window: AlphaWindow,
    ) -> Self {
        Auditor {
            strategy,
            feature_names,
            sensitive,
            window,
            num_threads: None,
            failure_policy: FailurePolicy::default(),
        }
    }

    /// Run the sweep on a dedicated pool of this many threads.
    pub fn set_num_threads(mut self, num_threads: Option<usize>) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn set_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// Search one feature in both directions and report the winner.
    pub fn audit_feature(&self, train: &SplitView, test: &SplitView, feature: usize) -> Result<ReportRow, AuditError> {
        let name = self
            .feature_names
            .get(feature)
            .ok_or_else(|| {
                AuditError::DimensionMismatch("feature name".to_string(), self.feature_names.len(), feature)
            })?;

        let full_train = self.strategy.full_value(train, feature)?;
        let min = self
            .strategy
            .search_subgroup(train, feature, self.sensitive, self.window, Direction::Minimize)?;
        let max = self
            .strategy
            .search_subgroup(train, feature, self.sensitive, self.window, Direction::Maximize)?;
        info!(
            "{}: F(D) {:.4}, min {:.4} (size {:.4}), max {:.4} (size {:.4})",
            name, full_train, min.value, min.size, max.value, max.size
        );
        let (direction, best) = select_direction(min, max, full_train);

        let full_test = self.strategy.full_value(test, feature)?;
        let (test_assignments, value_test) = self
            .strategy
            .apply(best.model.as_ref(), test, feature, self.sensitive)?;
        let size_test = if test_assignments.is_empty() {
            0.0
        } else {
            test_assignments.iter().sum::<f64>() / test_assignments.len() as f64
        };

        let sensitive_names: Vec<String> = self
            .sensitive
            .iter()
            .map(|&c| self.feature_names.get(c).cloned().unwrap_or_else(|| c.to_string()))
            .collect();
        let trace = self.strategy.reports_trace();
        let coefficients =
            SubgroupCoefficients::new(&sensitive_names, &best.model.coefficients(), best.model.intercept());

        Ok(ReportRow {
            feature: name.clone(),
            alpha: self.window,
            full_value: full_test,
            subgroup_value: value_test,
            difference: (value_test - full_test).abs(),
            percent_change: if trace { percent_change(value_test, full_test) } else { None },
            coefficients,
            size: size_test,
            direction,
            full_value_train: full_train,
            subgroup_value_train: best.value,
            difference_train: (best.value - full_train).abs(),
            percent_change_train: if trace { percent_change(best.value, full_train) } else { None },
            size_train: best.size,
            valid: best.valid,
            termination: best.termination,
            iterations: best.iterations,
            size_record: best.size_record,
            value_record: best.value_record,
        })
    }

    /// Audit every feature, in column order.
    pub fn audit(&self, train: &SplitView, test: &SplitView) -> Result<Vec<ReportRow>, AuditError> {
        let n_features = train.x.cols;
        if test.x.cols != n_features {
            return Err(AuditError::DimensionMismatch(
                "test split columns".to_string(),
                n_features,
                test.x.cols,
            ));
        }
        info!(
            "Auditing {} features with the {} strategy, alpha window {}.",
            n_features,
            self.strategy.name(),
            self.window
        );

        let results: Vec<Result<ReportRow, AuditError>> = match self.num_threads {
            Some(num_threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .build()
                    .map_err(|e| {
                        AuditError::InvalidParameter(
                            "num_threads".to_string(),
                            "a buildable pool".to_string(),
                            e.to_string(),
                        )
                    })?;
                pool.install(|| {
                    (0..n_features)
                        .into_par_iter()
                        .map(|f| self.audit_feature(train, test, f))
                        .collect()
                })
            }
            None => (0..n_features).map(|f| self.audit_feature(train, test, f)).collect(),
        };

        let mut rows = Vec::with_capacity(n_features);
        for (feature, result) in results.into_iter().enumerate() {
            match result {
                Ok(row) => rows.push(row),
                Err(e) => match self.failure_policy {
                    FailurePolicy::Abort => return Err(e),
                    FailurePolicy::Skip => {
                        warn!("Skipping feature {}: {}", feature, e);
                    }
                },
            }
        }

        if let Some(best) = rows
            .iter()
            .filter(|r| !r.difference.is_nan())
            .max_by(|a, b| a.difference.total_cmp(&b.difference))
        {
            info!(
                "Largest test difference: {} ({:.4}, {}).",
                best.feature, best.difference, best.direction
            );
        }
        Ok(rows)
    }
}
