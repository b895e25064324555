//! Expressivity
//!
//! Per-row, per-feature attribution scores ("expressivity") supplied by an external
//! explainer, e.g. LIME weights for the audited classifier. The solver only ever sees
//! them through the [`ExpressivityProvider`] trait.
use crate::data::Matrix;
use crate::errors::AuditError;
use crate::utils::weighted_sum;
use hashbrown::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Source of signed attribution scores for one split of the data.
pub trait ExpressivityProvider: Send + Sync {
    /// Number of rows scored.
    fn n_rows(&self) -> usize;
    /// Score of `feature` for `row`.
    fn score(&self, row: usize, feature: usize) -> f64;

    /// All scores of one feature, in row order.
    fn feature_scores(&self, feature: usize) -> Vec<f64> {
        (0..self.n_rows()).map(|i| self.score(i, feature)).collect()
    }

    /// Sum of the feature's scores over every row.
    fn total_expressivity(&self, feature: usize) -> f64 {
        (0..self.n_rows()).map(|i| self.score(i, feature)).sum()
    }

    /// Assignment-weighted sum of the feature's scores.
    fn get_total_exp(&self, assignments: &[f64], feature: usize) -> f64 {
        weighted_sum(assignments, &self.feature_scores(feature))
    }
}

/// Dense in-memory table of scores, one row per data record.
#[derive(Debug, Clone)]
pub struct ExpressivityTable {
    scores: Vec<Vec<f64>>,
    n_features: usize,
}

impl ExpressivityTable {
    pub fn new(scores: Vec<Vec<f64>>) -> Result<Self, AuditError> {
        let n_features = scores.first().map(|r| r.len()).unwrap_or(0);
        for row in &scores {
            if row.len() != n_features {
                return Err(AuditError::DimensionMismatch(
                    "expressivity row".to_string(),
                    n_features,
                    row.len(),
                ));
            }
        }
        Ok(ExpressivityTable { scores, n_features })
    }

    /// Build a table by evaluating `f(row, feature)` everywhere.
    pub fn from_fn<F: Fn(usize, usize) -> f64>(rows: usize, features: usize, f: F) -> Self {
        let scores = (0..rows).map(|i| (0..features).map(|j| f(i, j)).collect()).collect();
        ExpressivityTable {
            scores,
            n_features: features,
        }
    }

    /// Parse a cached explainer dump.
    ///
    /// The first line holds a JSON array with one object per row, keyed by the
    /// stringified feature index: `[{"0": 0.12, "1": -0.4}, ...]`. Features missing
    /// from a row's object score 0.
    pub fn from_json_lines<R: BufRead>(reader: R) -> Result<Self, AuditError> {
        let first = reader
            .lines()
            .next()
            .ok_or_else(|| AuditError::UnableToRead("empty expressivity cache".to_string()))?
            .map_err(|e| AuditError::UnableToRead(e.to_string()))?;
        let raw: Vec<HashMap<String, f64>> =
            serde_json::from_str(&first).map_err(|e| AuditError::UnableToRead(e.to_string()))?;

        let mut keyed = Vec::with_capacity(raw.len());
        let mut n_features = 0;
        for row in raw {
            let mut parsed = Vec::with_capacity(row.len());
            for (k, v) in row {
                let j = k.parse::<usize>().map_err(|_| {
                    AuditError::ParseString(k.clone(), "expressivity key".to_string(), "a column index".to_string())
                })?;
                n_features = n_features.max(j + 1);
                parsed.push((j, v));
            }
            keyed.push(parsed);
        }

        let scores = keyed
            .into_iter()
            .map(|parsed| {
                let mut row = vec![0.0; n_features];
                for (j, v) in parsed {
                    row[j] = v;
                }
                row
            })
            .collect();
        Ok(ExpressivityTable { scores, n_features })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AuditError> {
        let file = File::open(path.as_ref()).map_err(|e| AuditError::UnableToRead(e.to_string()))?;
        Self::from_json_lines(BufReader::new(file))
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

impl ExpressivityProvider for ExpressivityTable {
    fn n_rows(&self) -> usize {
        self.scores.len()
    }

    fn score(&self, row: usize, feature: usize) -> f64 {
        self.scores[row].get(feature).copied().unwrap_or(0.0)
    }
}

/// Which portion of the data a provider scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Split::Train => write!(f, "train"),
            Split::Test => write!(f, "test"),
        }
    }
}

/// Builds providers for the audited classifier over a given feature matrix.
pub trait ExpressivityFactory: Send + Sync {
    fn explain(&self, x: &Matrix<f64>, split: Split, seed: u64) -> Result<Box<dyn ExpressivityProvider>, AuditError>;
}

impl<F> ExpressivityFactory for F
where
    F: Fn(&Matrix<f64>, Split, u64) -> Result<Box<dyn ExpressivityProvider>, AuditError> + Send + Sync,
{
    fn explain(&self, x: &Matrix<f64>, split: Split, seed: u64) -> Result<Box<dyn ExpressivityProvider>, AuditError> {
        self(x, split, seed)
    }
}

/// Reads previously computed scores for each split from disk.
#[derive(Debug, Clone)]
pub struct CachedExpressivity {
    pub train: PathBuf,
    pub test: PathBuf,
}

impl CachedExpressivity {
    pub fn new<P: Into<PathBuf>>(train: P, test: P) -> Self {
        CachedExpressivity {
            train: train.into(),
            test: test.into(),
        }
    }
}

impl ExpressivityFactory for CachedExpressivity {
    fn explain(&self, x: &Matrix<f64>, split: Split, _seed: u64) -> Result<Box<dyn ExpressivityProvider>, AuditError> {
        let path = match split {
            Split::Train => &self.train,
            Split::Test => &self.test,
        };
        let table = ExpressivityTable::load(path)?;
        if table.n_rows() != x.rows {
            return Err(AuditError::DimensionMismatch(
                format!("{} expressivity rows", split),
                x.rows,
                table.n_rows(),
            ));
        }
        if table.n_features() > x.cols {
            return Err(AuditError::DimensionMismatch(
                format!("{} expressivity columns", split),
                x.cols,
                table.n_features(),
            ));
        }
        Ok(Box::new(table))
    }
}
