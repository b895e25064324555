//! Report
//!
//! One row per audited (feature, alpha window) pair, and the table that collects them.
use crate::errors::AuditError;
use crate::solver::{AlphaWindow, Direction, JsonIO, Termination};
use crate::utils::fmt_vec_output;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Column headers of the CSV report, in order.
pub const REPORT_COLUMNS: [&str; 19] = [
    "Feature",
    "Alpha",
    "F(D)",
    "max(F(S))",
    "Difference",
    "Percent Change",
    "Subgroup Coefficients",
    "Subgroup Size",
    "Direction",
    "F(D)_train",
    "max(F(S))_train",
    "Difference_train",
    "Percent Change_train",
    "Subgroup Size_train",
    "Valid",
    "Termination",
    "Iterations",
    "Size record",
    "WLS Penalties",
];

/// Subgroup-indicator coefficients labelled by sensitive column name, with the
/// intercept last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SubgroupCoefficients(pub Vec<(String, f64)>);

impl SubgroupCoefficients {
    pub fn new(names: &[String], coefficients: &[f64], intercept: f64) -> Self {
        let mut labelled: Vec<(String, f64)> = names.iter().cloned().zip(coefficients.iter().copied()).collect();
        labelled.push(("Intercept".to_string(), intercept));
        SubgroupCoefficients(labelled)
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }
}

impl fmt::Display for SubgroupCoefficients {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let inner: Vec<String> = self.0.iter().map(|(n, v)| format!("{}: {}", n, v)).collect();
        write!(f, "{{{}}}", inner.join(", "))
    }
}

/// `100 * |value - full| / full`, undefined when `full` is zero.
pub fn percent_change(value: f64, full: f64) -> Option<f64> {
    if full == 0.0 {
        None
    } else {
        Some(100.0 * (value - full).abs() / full)
    }
}

/// Audit result for one feature under one alpha window.
///
/// Unsuffixed statistics are measured on the test split, `_train` ones on the
/// training split the subgroup was searched on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    #[serde(rename = "Feature")]
    pub feature: String,
    #[serde(rename = "Alpha")]
    pub alpha: AlphaWindow,
    #[serde(rename = "F(D)")]
    pub full_value: f64,
    #[serde(rename = "max(F(S))")]
    pub subgroup_value: f64,
    #[serde(rename = "Difference")]
    pub difference: f64,
    #[serde(rename = "Percent Change")]
    pub percent_change: Option<f64>,
    #[serde(rename = "Subgroup Coefficients")]
    pub coefficients: SubgroupCoefficients,
    #[serde(rename = "Subgroup Size")]
    pub size: f64,
    #[serde(rename = "Direction")]
    pub direction: Direction,
    #[serde(rename = "F(D)_train")]
    pub full_value_train: f64,
    #[serde(rename = "max(F(S))_train")]
    pub subgroup_value_train: f64,
    #[serde(rename = "Difference_train")]
    pub difference_train: f64,
    #[serde(rename = "Percent Change_train")]
    pub percent_change_train: Option<f64>,
    #[serde(rename = "Subgroup Size_train")]
    pub size_train: f64,
    #[serde(rename = "Valid")]
    pub valid: bool,
    #[serde(rename = "Termination")]
    pub termination: Termination,
    #[serde(rename = "Iterations")]
    pub iterations: usize,
    #[serde(rename = "Size record")]
    pub size_record: Option<Vec<f64>>,
    #[serde(rename = "WLS Penalties")]
    pub value_record: Option<Vec<f64>>,
}

impl ReportRow {
    /// Flatten into CSV fields, aligned with [`REPORT_COLUMNS`].
    pub fn csv_record(&self) -> Vec<String> {
        let opt = |v: Option<f64>| v.map(|x| x.to_string()).unwrap_or_default();
        let record = |r: &Option<Vec<f64>>| r.as_deref().map(fmt_vec_output).unwrap_or_default();
        vec![
            self.feature.clone(),
            self.alpha.to_string(),
            self.full_value.to_string(),
            self.subgroup_value.to_string(),
            self.difference.to_string(),
            opt(self.percent_change),
            self.coefficients.to_string(),
            self.size.to_string(),
            self.direction.to_string(),
            self.full_value_train.to_string(),
            self.subgroup_value_train.to_string(),
            self.difference_train.to_string(),
            opt(self.percent_change_train),
            self.size_train.to_string(),
            self.valid.to_string(),
            self.termination.to_string(),
            self.iterations.to_string(),
            record(&self.size_record),
            record(&self.value_record),
        ]
    }
}

/// Concatenated report rows, in feature order within each alpha window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub rows: Vec<ReportRow>,
}

impl AuditReport {
    pub fn new(rows: Vec<ReportRow>) -> Self {
        AuditReport { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn extend(&mut self, other: AuditReport) {
        self.rows.extend(other.rows);
    }

    /// Row with the largest test-split difference.
    pub fn most_expressive(&self) -> Option<&ReportRow> {
        self.rows
            .iter()
            .filter(|r| !r.difference.is_nan())
            .max_by(|a, b| a.difference.total_cmp(&b.difference))
    }

    /// Write the report as CSV with a header row.
    ///
    /// * `path` - Destination file; overwritten if it exists.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), AuditError> {
        let mut writer = csv::Writer::from_path(path).map_err(|e| AuditError::UnableToWrite(e.to_string()))?;
        writer
            .write_record(REPORT_COLUMNS)
            .map_err(|e| AuditError::UnableToWrite(e.to_string()))?;
        for row in &self.rows {
            writer
                .write_record(row.csv_record())
                .map_err(|e| AuditError::UnableToWrite(e.to_string()))?;
        }
        writer.flush().map_err(|e| AuditError::UnableToWrite(e.to_string()))
    }
}

impl JsonIO for AuditReport {}
