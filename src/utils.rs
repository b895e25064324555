use crate::errors::AuditError;

/// Create a string of all available items.
pub fn items_to_strings(items: Vec<&str>) -> String {
    let mut s = String::new();
    for i in items {
        s.push_str(i);
        s.push_str(&String::from(", "));
    }
    s
}

/// Format a float vector as `[a, b, c]` at full precision.
pub fn fmt_vec_output(v: &[f64]) -> String {
    let body: Vec<String> = v.iter().map(|x| x.to_string()).collect();
    format!("[{}]", body.join(", "))
}

// Validation
pub fn validate_positive_float_parameter(value: f64, parameter: &str) -> Result<(), AuditError> {
    validate_float_parameter(value, 0.0, f64::INFINITY, parameter)
}

pub fn validate_float_parameter(value: f64, min: f64, max: f64, parameter: &str) -> Result<(), AuditError> {
    if value.is_nan() || value < min || max < value {
        let ex_msg = format!("real value within range {} and {}", min, max);
        Err(AuditError::InvalidParameter(
            parameter.to_string(),
            ex_msg,
            value.to_string(),
        ))
    } else {
        Ok(())
    }
}

pub fn validate_length(what: &str, expected: usize, got: usize) -> Result<(), AuditError> {
    if expected != got {
        Err(AuditError::DimensionMismatch(what.to_string(), expected, got))
    } else {
        Ok(())
    }
}

#[inline]
pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Arithmetic mean; zero for an empty slice.
#[inline]
pub fn mean(v: &[f64]) -> f64 {
    if v.is_empty() {
        0.0
    } else {
        v.iter().sum::<f64>() / v.len() as f64
    }
}

/// Assignment-weighted dot product.
#[inline]
pub fn weighted_sum(weights: &[f64], values: &[f64]) -> f64 {
    weights.iter().zip(values).map(|(w, v)| w * v).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_validate_float_parameter() {
        assert!(validate_float_parameter(0.5, 0.0, 1.0, "alpha").is_ok());
        assert!(validate_float_parameter(1.5, 0.0, 1.0, "alpha").is_err());
        assert!(validate_float_parameter(f64::NAN, 0.0, 1.0, "alpha").is_err());
        assert!(validate_positive_float_parameter(-1.0, "nu").is_err());
    }

    #[test]
    fn test_sigmoid_is_stable() {
        assert_relative_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(-800.0) >= 0.0);
        assert_relative_eq!(sigmoid(800.0), 1.0);
        assert_relative_eq!(sigmoid(2.0) + sigmoid(-2.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_fmt_vec_output() {
        assert_eq!(fmt_vec_output(&[1.0, 0.5]), "[1, 0.5]");
        assert_eq!(fmt_vec_output(&[0.000012345]), "[0.000012345]");
        assert_eq!(fmt_vec_output(&[]), "[]");
    }
}
