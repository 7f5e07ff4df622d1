//! State-of-health ratios over per-step statistics.

use thiserror::Error;

use crate::core::table::{Column, GroupKey};
use crate::processors::statistics::{StatisticsError, StatisticsTable};

/// Errors that can occur while computing state of health.
#[derive(Debug, Error)]
pub enum HealthError {
    #[error("baseline group '{0}' not found in statistics")]
    MissingBaseline(GroupKey),

    #[error(transparent)]
    Statistics(#[from] StatisticsError),
}

/// Result type for health operations.
pub type Result<T> = std::result::Result<T, HealthError>;

/// Ratio of every group's `column` value to the value at `baseline`.
///
/// The result is aligned with [`StatisticsTable::keys`]. A ratio is missing
/// when either value is missing or the baseline is zero. Typically `column`
/// is a discharge capacity statistic such as `Q_max`.
pub fn state_of_health(stats: &StatisticsTable, column: &str, baseline: &GroupKey) -> Result<Column> {
    let series = stats.series(column)?;
    let position = stats
        .position(baseline)
        .ok_or_else(|| HealthError::MissingBaseline(baseline.clone()))?;

    let reference = series[position].filter(|v| *v != 0.0);
    if reference.is_none() {
        log::warn!(
            "Baseline {} of '{}' is missing or zero; state of health is undefined",
            baseline,
            column
        );
    }

    Ok(Column::Number(
        series
            .iter()
            .map(|value| match (value, reference) {
                (Some(v), Some(r)) => Some(v / r),
                _ => None,
            })
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::table::Table;
    use crate::processors::statistics::{aggregate, GroupMarker, StatMethod, StatisticsSpec};

    fn capacity_stats(capacities: &[Option<f64>]) -> StatisticsTable {
        let table = Table::from_columns([
            (
                "Step",
                Column::Number((1..=capacities.len()).map(|s| Some(s as f64)).collect()),
            ),
            ("Q", Column::Number(capacities.to_vec())),
        ])
        .unwrap();
        let spec = StatisticsSpec::new().with("Q", &[StatMethod::Max]);
        aggregate(&table, GroupMarker::Column("Step"), &spec).unwrap()
    }

    #[test]
    fn test_ratios_against_first_cycle() {
        let stats = capacity_stats(&[Some(2.0), Some(1.9), None, Some(1.6)]);
        let soh = state_of_health(&stats, "Q_max", &GroupKey::Int(1)).unwrap();
        let values = soh.as_numbers().unwrap();

        assert!((values[0].unwrap() - 1.0).abs() < 1e-12);
        assert!((values[1].unwrap() - 0.95).abs() < 1e-12);
        assert_eq!(values[2], None);
        assert!((values[3].unwrap() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_zero_baseline_is_undefined() {
        let stats = capacity_stats(&[Some(0.0), Some(1.0)]);
        let soh = state_of_health(&stats, "Q_max", &GroupKey::Int(1)).unwrap();
        assert_eq!(soh.as_numbers().unwrap(), &[None, None]);
    }

    #[test]
    fn test_missing_baseline() {
        let stats = capacity_stats(&[Some(1.0)]);
        let err = state_of_health(&stats, "Q_max", &GroupKey::Int(9)).unwrap_err();
        assert!(matches!(err, HealthError::MissingBaseline(GroupKey::Int(9))));
    }

    #[test]
    fn test_missing_column() {
        let stats = capacity_stats(&[Some(1.0)]);
        assert!(matches!(
            state_of_health(&stats, "Q_mean", &GroupKey::Int(1)),
            Err(HealthError::Statistics(_))
        ));
    }
}
