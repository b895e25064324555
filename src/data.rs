//! Data
//!
//! Containers for the audited data: a borrowed column-major [`Matrix`] view, an owned
//! [`DenseMatrix`] buffer used for feature projections, and the [`Dataset`] /
//! [`LabeledData`] pair the runner splits into train and test portions.
use crate::errors::AuditError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Contiguous Column Major Matrix data container.
///
/// Column-major order keeps each feature contiguous, which is how the
/// regression oracle and the expressivity sums walk the data.
///
/// # Type Parameters
/// * `T` - The numeric type of the data (e.g., `f32`, `f64`).
#[derive(Debug, Clone, Copy)]
pub struct Matrix<'a, T> {
    /// The raw data stored in a single slice.
    pub data: &'a [T],
    /// Number of rows in the matrix.
    pub rows: usize,
    /// Number of columns in the matrix.
    pub cols: usize,
}

impl<'a, T> Matrix<'a, T> {
    /// Create a new Matrix.
    pub fn new(data: &'a [T], rows: usize, cols: usize) -> Self {
        Matrix { data, rows, cols }
    }

    /// Get a single reference to an item in the matrix.
    ///
    /// * `i` - The ith row of the data to get.
    /// * `j` - the jth column of the data to get.
    pub fn get(&self, i: usize, j: usize) -> &T {
        &self.data[j * self.rows + i]
    }

    /// Get an entire column in the matrix.
    ///
    /// * `col` - The index of the column to get.
    pub fn get_col(&self, col: usize) -> &'a [T] {
        let data: &'a [T] = self.data;
        &data[col * self.rows..(col + 1) * self.rows]
    }

    /// Get access to a row of the data, as an iterator.
    pub fn get_row_iter(&self, row: usize) -> std::iter::StepBy<std::iter::Skip<std::slice::Iter<'a, T>>> {
        self.data.iter().skip(row).step_by(self.rows.max(1))
    }
}

impl<'a, T> Matrix<'a, T>
where
    T: Copy,
{
    /// Get a row of the data as a vector.
    pub fn get_row(&self, row: usize) -> Vec<T> {
        self.get_row_iter(row).copied().collect()
    }
}

/// Owned column-major matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix {
    pub data: Vec<f64>,
    pub rows: usize,
    pub cols: usize,
}

impl DenseMatrix {
    /// Wrap a column-major buffer, checking that it holds `rows * cols` values.
    pub fn new(data: Vec<f64>, rows: usize, cols: usize) -> Result<Self, AuditError> {
        if data.len() != rows * cols {
            return Err(AuditError::DimensionMismatch(
                "matrix buffer".to_string(),
                rows * cols,
                data.len(),
            ));
        }
        Ok(DenseMatrix { data, rows, cols })
    }

    /// Build a matrix from a list of equal-length columns.
    pub fn from_columns(columns: Vec<Vec<f64>>) -> Result<Self, AuditError> {
        let rows = columns.first().map(|c| c.len()).unwrap_or(0);
        let cols = columns.len();
        let mut data = Vec::with_capacity(rows * cols);
        for column in columns {
            if column.len() != rows {
                return Err(AuditError::DimensionMismatch("matrix column".to_string(), rows, column.len()));
            }
            data.extend(column);
        }
        Ok(DenseMatrix { data, rows, cols })
    }

    /// Owned copy of a borrowed view.
    pub fn from_view(x: &Matrix<f64>) -> DenseMatrix {
        DenseMatrix {
            data: x.data[..x.rows * x.cols].to_vec(),
            rows: x.rows,
            cols: x.cols,
        }
    }

    /// Borrow the buffer as a [`Matrix`].
    pub fn view(&self) -> Matrix<'_, f64> {
        Matrix::new(&self.data, self.rows, self.cols)
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[j * self.rows + i]
    }

    pub fn col(&self, j: usize) -> &[f64] {
        &self.data[j * self.rows..(j + 1) * self.rows]
    }

    /// Project onto a subset of columns, in the given order.
    ///
    /// * `columns` - Column indices to keep.
    pub fn select_columns(&self, columns: &[usize]) -> Result<DenseMatrix, AuditError> {
        project_columns(&self.view(), columns)
    }

    /// Keep only the given rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> DenseMatrix {
        let mut data = Vec::with_capacity(rows.len() * self.cols);
        for j in 0..self.cols {
            let col = self.col(j);
            data.extend(rows.iter().map(|&i| col[i]));
        }
        DenseMatrix {
            data,
            rows: rows.len(),
            cols: self.cols,
        }
    }

    /// Append a trailing column of ones.
    pub fn with_intercept(&self) -> DenseMatrix {
        let mut data = self.data.clone();
        data.extend(std::iter::repeat(1.0).take(self.rows));
        DenseMatrix {
            data,
            rows: self.rows,
            cols: self.cols + 1,
        }
    }
}

/// Copy the given columns of a view into a new [`DenseMatrix`].
pub fn project_columns(x: &Matrix<f64>, columns: &[usize]) -> Result<DenseMatrix, AuditError> {
    let mut data = Vec::with_capacity(x.rows * columns.len());
    for &c in columns {
        if c >= x.cols {
            return Err(AuditError::InvalidParameter(
                "column index".to_string(),
                format!("an index below {}", x.cols),
                c.to_string(),
            ));
        }
        data.extend_from_slice(x.get_col(c));
    }
    Ok(DenseMatrix {
        data,
        rows: x.rows,
        cols: columns.len(),
    })
}

/// A named table of numeric columns, as loaded from disk.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub data: DenseMatrix,
}

impl Dataset {
    pub fn new(columns: Vec<String>, data: DenseMatrix) -> Result<Self, AuditError> {
        if columns.len() != data.cols {
            return Err(AuditError::DimensionMismatch(
                "dataset column names".to_string(),
                data.cols,
                columns.len(),
            ));
        }
        Ok(Dataset { columns, data })
    }

    /// Load a numeric CSV with a header row. Empty or unparsable cells become NaN.
    ///
    /// * `path` - Path to the CSV file.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self, AuditError> {
        let file = File::open(path.as_ref()).map_err(|e| AuditError::UnableToRead(e.to_string()))?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(BufReader::new(file));

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| AuditError::UnableToRead(e.to_string()))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut data_columns: Vec<Vec<f64>> = vec![Vec::new(); columns.len()];
        for result in reader.records() {
            let record = result.map_err(|e| AuditError::UnableToRead(e.to_string()))?;
            for (i, column) in data_columns.iter_mut().enumerate() {
                let value = record.get(i).unwrap_or("");
                column.push(if value.is_empty() {
                    f64::NAN
                } else {
                    value.trim().parse::<f64>().unwrap_or(f64::NAN)
                });
            }
        }

        Dataset::new(columns, DenseMatrix::from_columns(data_columns)?)
    }

    pub fn rows(&self) -> usize {
        self.data.rows
    }

    pub fn column_index(&self, name: &str) -> Result<usize, AuditError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| AuditError::UnknownColumn(name.to_string()))
    }

    /// Permute one column in place, breaking its relation with every other column.
    pub fn shuffle_column(&mut self, name: &str, seed: u64) -> Result<(), AuditError> {
        let j = self.column_index(name)?;
        let rows = self.data.rows;
        let mut rng = StdRng::seed_from_u64(seed);
        self.data.data[j * rows..(j + 1) * rows].shuffle(&mut rng);
        Ok(())
    }

    /// Separate the target column from the features, keeping feature order.
    pub fn split_target(&self, target: &str) -> Result<LabeledData, AuditError> {
        let t = self.column_index(target)?;
        let feature_idx: Vec<usize> = (0..self.columns.len()).filter(|&j| j != t).collect();
        if feature_idx.is_empty() || self.data.rows == 0 {
            return Err(AuditError::EmptyDataset(format!(
                "{} rows and {} feature columns",
                self.data.rows,
                feature_idx.len()
            )));
        }
        Ok(LabeledData {
            feature_names: feature_idx.iter().map(|&j| self.columns[j].clone()).collect(),
            x: self.data.select_columns(&feature_idx)?,
            y: self.data.col(t).to_vec(),
        })
    }
}

/// Features and target of one split.
#[derive(Debug, Clone)]
pub struct LabeledData {
    pub feature_names: Vec<String>,
    pub x: DenseMatrix,
    pub y: Vec<f64>,
}

impl LabeledData {
    /// Shuffle rows with a seeded generator and hold out `test_fraction` of them.
    ///
    /// The test split gets `ceil(rows * test_fraction)` rows.
    pub fn train_test_split(&self, test_fraction: f64, seed: u64) -> Result<(LabeledData, LabeledData), AuditError> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(AuditError::InvalidParameter(
                "test_fraction".to_string(),
                "a value strictly between 0 and 1".to_string(),
                test_fraction.to_string(),
            ));
        }
        let n = self.x.rows;
        let n_test = (n as f64 * test_fraction).ceil() as usize;
        if n_test == 0 || n_test >= n {
            return Err(AuditError::EmptyDataset(format!(
                "splitting {} rows with test fraction {}",
                n, test_fraction
            )));
        }

        let mut index: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        index.shuffle(&mut rng);
        let (test_idx, train_idx) = index.split_at(n_test);

        Ok((self.take_rows(train_idx), self.take_rows(test_idx)))
    }

    fn take_rows(&self, rows: &[usize]) -> LabeledData {
        LabeledData {
            feature_names: self.feature_names.clone(),
            x: self.x.select_rows(rows),
            y: rows.iter().map(|&i| self.y[i]).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn toy() -> Dataset {
        let data = DenseMatrix::from_columns(vec![
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
            vec![0.0, 1.0, 0.0, 1.0, 0.0],
            vec![10.0, 20.0, 30.0, 40.0, 50.0],
        ])
        .unwrap();
        Dataset::new(vec!["a".into(), "s".into(), "y".into()], data).unwrap()
    }

    #[test]
    fn test_matrix_access() {
        let v = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let m = Matrix::new(&v, 3, 2);
        assert_eq!(*m.get(2, 1), 6.0);
        assert_eq!(m.get_col(1), &[4.0, 5.0, 6.0]);
        assert_eq!(m.get_row(1), vec![2.0, 5.0]);
    }

    #[test]
    fn test_select_and_intercept() {
        let ds = toy();
        let proj = ds.data.select_columns(&[1]).unwrap();
        assert_eq!(proj.cols, 1);
        assert_eq!(proj.col(0), &[0.0, 1.0, 0.0, 1.0, 0.0]);
        let with_one = proj.with_intercept();
        assert_eq!(with_one.col(1), &[1.0; 5]);
        assert!(ds.data.select_columns(&[7]).is_err());
    }

    #[test]
    fn test_split_target_keeps_order() {
        let ds = toy();
        let labeled = ds.split_target("s").unwrap();
        assert_eq!(labeled.feature_names, vec!["a".to_string(), "y".to_string()]);
        assert_eq!(labeled.y, vec![0.0, 1.0, 0.0, 1.0, 0.0]);
        assert!(matches!(ds.split_target("nope"), Err(AuditError::UnknownColumn(_))));
    }

    #[test]
    fn test_train_test_split_is_seeded() {
        let labeled = toy().split_target("y").unwrap();
        let (train_a, test_a) = labeled.train_test_split(0.4, 3).unwrap();
        let (train_b, test_b) = labeled.train_test_split(0.4, 3).unwrap();
        assert_eq!(test_a.x.rows, 2);
        assert_eq!(train_a.x.rows, 3);
        assert_eq!(train_a.y, train_b.y);
        assert_eq!(test_a.x, test_b.x);
        assert!(labeled.train_test_split(1.0, 3).is_err());
    }

    #[test]
    fn test_shuffle_column_is_permutation() {
        let mut ds = toy();
        ds.shuffle_column("y", 11).unwrap();
        let mut y = ds.data.col(2).to_vec();
        y.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(y, vec![10.0, 20.0, 30.0, 40.0, 50.0]);
        assert_eq!(ds.data.col(0), &[1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_from_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.csv");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "a,b,target").unwrap();
        writeln!(f, "1,2,0").unwrap();
        writeln!(f, "3,,1").unwrap();
        drop(f);
        let ds = Dataset::from_csv(&path).unwrap();
        assert_eq!(ds.rows(), 2);
        assert_eq!(ds.columns, vec!["a", "b", "target"]);
        assert!(ds.data.get(1, 1).is_nan());
    }
}
