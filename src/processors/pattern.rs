//! Sign-pattern window detection over per-step statistics.
//!
//! A pattern such as `"0-0+0"` describes the expected sign of a statistic on
//! consecutive steps (rest, discharge, rest, charge, rest). Every offset whose
//! window satisfies the pattern is reported, overlapping matches included.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::core::table::GroupKey;

/// Errors that can occur while building or applying a sign pattern.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("empty sign pattern")]
    Empty,

    #[error("invalid character '{character}' at position {position} of sign pattern (expected '0', '+' or '-')")]
    InvalidCharacter { character: char, position: usize },

    #[error("window has {actual} values, pattern has {expected} signs")]
    WindowLength { expected: usize, actual: usize },

    #[error("series has {values} values but {keys} keys")]
    KeyMismatch { keys: usize, values: usize },

    #[error("group keys are not a dense integer sequence: {0}")]
    SparseKeys(String),
}

/// Result type for pattern operations.
pub type Result<T> = std::result::Result<T, PatternError>;

/// Expected sign of one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Zero,
    Positive,
    Negative,
}

impl Sign {
    /// Whether `value` has this sign. Missing values never match.
    #[inline]
    pub fn accepts(self, value: Option<f64>) -> bool {
        match (self, value) {
            (_, None) => false,
            (Sign::Zero, Some(v)) => v == 0.0,
            (Sign::Positive, Some(v)) => v > 0.0,
            (Sign::Negative, Some(v)) => v < 0.0,
        }
    }

    fn as_char(self) -> char {
        match self {
            Sign::Zero => '0',
            Sign::Positive => '+',
            Sign::Negative => '-',
        }
    }
}

/// Parsed sign pattern over the alphabet `0`, `+`, `-`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignPattern {
    signs: Vec<Sign>,
}

impl SignPattern {
    /// Number of elements a window must have.
    #[inline]
    pub fn len(&self) -> usize {
        self.signs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.signs.is_empty()
    }

    pub fn signs(&self) -> &[Sign] {
        &self.signs
    }

    /// Check a window of exactly `len()` values.
    pub fn matches(&self, window: &[Option<f64>]) -> Result<bool> {
        if window.len() != self.signs.len() {
            return Err(PatternError::WindowLength {
                expected: self.signs.len(),
                actual: window.len(),
            });
        }
        Ok(self.accepts(window))
    }

    #[inline]
    fn accepts(&self, window: &[Option<f64>]) -> bool {
        self.signs
            .iter()
            .zip(window)
            .all(|(sign, &value)| sign.accepts(value))
    }

    /// Start offsets of every matching window in `values`.
    pub fn match_offsets(&self, values: &[Option<f64>]) -> Vec<usize> {
        if self.signs.len() > values.len() {
            return Vec::new();
        }
        values
            .windows(self.signs.len())
            .enumerate()
            .filter(|(_, window)| self.accepts(window))
            .map(|(offset, _)| offset)
            .collect()
    }
}

impl FromStr for SignPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PatternError::Empty);
        }
        let signs = s
            .chars()
            .enumerate()
            .map(|(position, character)| match character {
                '0' => Ok(Sign::Zero),
                '+' => Ok(Sign::Positive),
                '-' => Ok(Sign::Negative),
                _ => Err(PatternError::InvalidCharacter {
                    character,
                    position,
                }),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { signs })
    }
}

impl fmt::Display for SignPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for sign in &self.signs {
            write!(f, "{}", sign.as_char())?;
        }
        Ok(())
    }
}

/// Find every window of `values` matching `pattern`.
///
/// `keys` labels `values` position-for-position (typically step numbers from
/// a statistics table). Each match is returned as the keys it spans, in
/// order. No match yields an empty list.
pub fn find_windows(keys: &[GroupKey], values: &[Option<f64>], pattern: &SignPattern) -> Result<Vec<Vec<GroupKey>>> {
    if keys.len() != values.len() {
        return Err(PatternError::KeyMismatch {
            keys: keys.len(),
            values: values.len(),
        });
    }

    let windows: Vec<Vec<GroupKey>> = pattern
        .match_offsets(values)
        .into_iter()
        .map(|start| keys[start..start + pattern.len()].to_vec())
        .collect();

    log::debug!(
        "Pattern '{}' matched {} window(s) over {} values",
        pattern,
        windows.len(),
        values.len()
    );

    Ok(windows)
}

/// Like [`find_windows`], but for step-numbered keys: requires the keys to be
/// consecutive ascending integers and returns each window as step numbers.
pub fn find_step_windows(keys: &[GroupKey], values: &[Option<f64>], pattern: &SignPattern) -> Result<Vec<Vec<i64>>> {
    if keys.len() != values.len() {
        return Err(PatternError::KeyMismatch {
            keys: keys.len(),
            values: values.len(),
        });
    }
    let steps = dense_steps(keys)?;

    Ok(pattern
        .match_offsets(values)
        .into_iter()
        .map(|start| {
            let first = steps[start];
            (first..first + pattern.len() as i64).collect()
        })
        .collect())
}

/// Integer values of `keys`, provided they form a run `n, n+1, n+2, ...`.
pub fn dense_steps(keys: &[GroupKey]) -> Result<Vec<i64>> {
    let mut steps = Vec::with_capacity(keys.len());
    for key in keys {
        let Some(step) = key.as_int() else {
            return Err(PatternError::SparseKeys(format!("non-integer key '{}'", key)));
        };
        if let Some(&previous) = steps.last() {
            if step != previous + 1 {
                return Err(PatternError::SparseKeys(format!(
                    "key {} follows {}",
                    step, previous
                )));
            }
        }
        steps.push(step);
    }
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(n: i64) -> Vec<GroupKey> {
        (0..n).map(GroupKey::Int).collect()
    }

    fn series(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn test_single_full_match() {
        let pattern: SignPattern = "0-0+0".parse().unwrap();
        let windows = find_windows(&keys(5), &series(&[0.0, -1.0, 0.0, 1.0, 0.0]), &pattern).unwrap();
        assert_eq!(windows, vec![keys(5)]);
    }

    #[test]
    fn test_no_match_is_empty() {
        let pattern: SignPattern = "0".parse().unwrap();
        let windows = find_windows(&keys(3), &series(&[1.0, 1.0, 1.0]), &pattern).unwrap();
        assert!(windows.is_empty());
    }

    #[test]
    fn test_overlapping_matches_all_reported() {
        let pattern: SignPattern = "00".parse().unwrap();
        let windows = find_windows(&keys(3), &series(&[0.0, 0.0, 0.0]), &pattern).unwrap();
        assert_eq!(
            windows,
            vec![
                vec![GroupKey::Int(0), GroupKey::Int(1)],
                vec![GroupKey::Int(1), GroupKey::Int(2)],
            ]
        );
    }

    #[test]
    fn test_pattern_longer_than_series() {
        let pattern: SignPattern = "0-0+0".parse().unwrap();
        assert!(find_windows(&keys(2), &series(&[0.0, -1.0]), &pattern)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_missing_values_never_match() {
        let pattern: SignPattern = "0".parse().unwrap();
        let values = vec![None, Some(0.0)];
        let windows = find_windows(&keys(2), &values, &pattern).unwrap();
        assert_eq!(windows, vec![vec![GroupKey::Int(1)]]);
    }

    #[test]
    fn test_sparse_keys_are_echoed() {
        let sparse = vec![GroupKey::Int(2), GroupKey::Int(7), GroupKey::Int(9)];
        let pattern: SignPattern = "-+".parse().unwrap();
        let windows = find_windows(&sparse, &series(&[1.0, -0.5, 0.5]), &pattern).unwrap();
        assert_eq!(windows, vec![vec![GroupKey::Int(7), GroupKey::Int(9)]]);

        assert!(matches!(
            find_step_windows(&sparse, &series(&[1.0, -0.5, 0.5]), &pattern),
            Err(PatternError::SparseKeys(_))
        ));
    }

    #[test]
    fn test_step_windows_on_dense_keys() {
        let steps: Vec<GroupKey> = (1..=3).map(GroupKey::Int).collect();
        let pattern: SignPattern = "0-+".parse().unwrap();
        let windows = find_step_windows(&steps, &series(&[0.0, -1.0, 1.0]), &pattern).unwrap();
        assert_eq!(windows, vec![vec![1, 2, 3]]);
    }

    #[test]
    fn test_malformed_pattern() {
        assert!(matches!("".parse::<SignPattern>(), Err(PatternError::Empty)));
        assert!(matches!(
            "0x+".parse::<SignPattern>(),
            Err(PatternError::InvalidCharacter { character: 'x', position: 1 })
        ));
    }

    #[test]
    fn test_window_length_mismatch() {
        let pattern: SignPattern = "0+".parse().unwrap();
        assert!(matches!(
            pattern.matches(&[Some(0.0)]),
            Err(PatternError::WindowLength { expected: 2, actual: 1 })
        ));
        assert!(pattern.matches(&[Some(0.0), Some(3.0)]).unwrap());
    }

    #[test]
    fn test_key_value_mismatch() {
        let pattern: SignPattern = "0".parse().unwrap();
        assert!(find_windows(&keys(1), &series(&[0.0, 0.0]), &pattern).is_err());
    }

    #[test]
    fn test_display_round_trip() {
        let pattern: SignPattern = "0-0+0".parse().unwrap();
        assert_eq!(pattern.to_string(), "0-0+0");
    }
}
