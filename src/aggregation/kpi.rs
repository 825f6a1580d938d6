//! Defect-rate KPIs over a labeled batch

use crate::types::prediction::Label;
use crate::types::report::{DistributionEntry, Kpis, NO_CRITICAL_DEFECT};

/// KPI block plus the class distribution it was derived from
#[derive(Debug, Clone, PartialEq)]
pub struct KpiSummary {
    pub kpis: Kpis,
    /// Observed classes, most frequent first
    pub distribution: Vec<DistributionEntry>,
}

/// Pure reduction of per-row labels into summary statistics.
pub struct KpiAggregator;

impl KpiAggregator {
    pub fn summarize(labels: &[Label]) -> KpiSummary {
        let total = labels.len();
        let defect_total = labels.iter().filter(|&&l| l == Label::Defect).count();
        let normal_count = total - defect_total;

        let defect_rate_pct = if total == 0 {
            0.0
        } else {
            round2(defect_total as f64 / total as f64 * 100.0)
        };

        // Stable sort keeps NORMAL ahead of DEFECT on ties.
        let mut distribution: Vec<DistributionEntry> = [
            (Label::Normal, normal_count),
            (Label::Defect, defect_total),
        ]
        .into_iter()
        .filter(|&(_, count)| count > 0)
        .map(|(label, count)| DistributionEntry {
            name: label.as_str().to_string(),
            value: count,
        })
        .collect();
        distribution.sort_by(|a, b| b.value.cmp(&a.value));

        // Second-most-frequent class stands in for the most significant
        // defect category; it is a frequency heuristic, not a severity rank.
        let critical_defect = distribution
            .get(1)
            .map(|entry| entry.name.clone())
            .unwrap_or_else(|| NO_CRITICAL_DEFECT.to_string());

        KpiSummary {
            kpis: Kpis {
                total_inspects: total,
                normal_count,
                defect_total,
                defect_rate_pct,
                critical_defect,
            },
            distribution,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(ids: &[u8]) -> Vec<Label> {
        ids.iter().map(|&id| Label::from_class_id(id).unwrap()).collect()
    }

    #[test]
    fn test_passorfail_scenario() {
        let summary = KpiAggregator::summarize(&labels(&[0, 0, 1, 0]));

        assert_eq!(summary.kpis.total_inspects, 4);
        assert_eq!(summary.kpis.normal_count, 3);
        assert_eq!(summary.kpis.defect_total, 1);
        assert_eq!(summary.kpis.defect_rate_pct, 25.0);
        assert_eq!(summary.kpis.critical_defect, "DEFECT");
        assert_eq!(summary.distribution[0].name, "NORMAL");
        assert_eq!(summary.distribution[0].value, 3);
    }

    #[test]
    fn test_empty_batch() {
        let summary = KpiAggregator::summarize(&[]);

        assert_eq!(summary.kpis.total_inspects, 0);
        assert_eq!(summary.kpis.defect_rate_pct, 0.0);
        assert_eq!(summary.kpis.critical_defect, NO_CRITICAL_DEFECT);
        assert!(summary.distribution.is_empty());
    }

    #[test]
    fn test_single_class_has_no_critical_defect() {
        let summary = KpiAggregator::summarize(&labels(&[1, 1, 1]));

        assert_eq!(summary.kpis.defect_rate_pct, 100.0);
        assert_eq!(summary.distribution.len(), 1);
        assert_eq!(summary.kpis.critical_defect, NO_CRITICAL_DEFECT);
    }

    #[test]
    fn test_distribution_sorted_by_frequency() {
        let summary = KpiAggregator::summarize(&labels(&[1, 1, 0]));

        assert_eq!(summary.distribution[0].name, "DEFECT");
        assert_eq!(summary.distribution[1].name, "NORMAL");
        assert_eq!(summary.kpis.critical_defect, "NORMAL");
    }

    #[test]
    fn test_rate_rounding_and_bounds() {
        let summary = KpiAggregator::summarize(&labels(&[1, 0, 0]));
        assert_eq!(summary.kpis.defect_rate_pct, 33.33);

        for n in 1..20u8 {
            let ids: Vec<u8> = (0..n).map(|i| i % 3 % 2).collect();
            let rate = KpiAggregator::summarize(&labels(&ids)).kpis.defect_rate_pct;
            assert!((0.0..=100.0).contains(&rate));
        }
    }
}
