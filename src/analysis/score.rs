//! 评分校准
//!
//! 由运行统计推导安全/效率/合规/综合四项评分 (0~100) 与管理建议。

use serde::{Deserialize, Serialize};

use super::analyzer::RunStatistics;

/// 绩效评分 (均为0~100)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceScores {
    pub safety: f64,
    pub efficiency: f64,
    pub compliance: f64,
    pub overall: f64,
}

impl PerformanceScores {
    pub fn from_stats(stats: &RunStatistics) -> Self {
        let violation_rate = stats.violation_rate();
        let avg_speed = stats.avg_speed;
        let max_speed = stats.max_speed as f64;

        let safety = (100.0 - violation_rate * 2.0).max(0.0);
        let efficiency = if avg_speed > 0.0 {
            (avg_speed / 80.0 * 100.0).min(100.0)
        } else {
            0.0
        };
        let compliance = if max_speed <= 100.0 {
            100.0
        } else {
            (100.0 - (max_speed - 100.0)).max(0.0)
        };
        let overall = (safety + efficiency + compliance) / 3.0;

        Self {
            safety,
            efficiency,
            compliance,
            overall,
        }
    }

    pub fn safety_label(&self) -> &'static str {
        if self.safety >= 90.0 {
            "Excellent"
        } else if self.safety >= 70.0 {
            "Good"
        } else {
            "Needs Improvement"
        }
    }

    pub fn efficiency_label(&self) -> &'static str {
        if self.efficiency >= 80.0 {
            "Optimal"
        } else if self.efficiency >= 60.0 {
            "Good"
        } else {
            "Low"
        }
    }

    pub fn compliance_label(&self) -> &'static str {
        if self.compliance >= 90.0 {
            "High"
        } else if self.compliance >= 70.0 {
            "Medium"
        } else {
            "Low"
        }
    }

    pub fn overall_label(&self) -> &'static str {
        if self.overall >= 85.0 {
            "Excellent"
        } else if self.overall >= 70.0 {
            "Good"
        } else {
            "Needs Attention"
        }
    }
}

/// 基于统计生成管理建议
pub fn recommendations(stats: &RunStatistics) -> Vec<&'static str> {
    let mut recs = Vec::new();
    if stats.violation_rate() > 20.0 {
        recs.push("Implement stricter speed enforcement measures");
    }
    if stats.max_speed > 120 {
        recs.push("Consider speed calming infrastructure");
    }
    if stats.avg_speed < 40.0 {
        recs.push("Review traffic flow optimization");
    }
    if stats.vehicles_with_violations > 10 {
        recs.push("Enhance driver awareness campaigns");
    }

    if recs.is_empty() {
        recs.push("Current traffic management appears effective");
        recs.push("Continue monitoring and maintenance");
    }
    recs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn stats(vehicles: u32, violations: u32, max_speed: u32, avg_speed: f64) -> RunStatistics {
        RunStatistics {
            analysis_id: "analysis_test".into(),
            total_vehicles_detected: vehicles,
            vehicles_in_zone: vehicles,
            total_unique_violations: violations,
            vehicle_class_distribution: HashMap::new(),
            max_speed,
            avg_speed,
            vehicles_with_violations: violations.min(vehicles),
            processing_duration: 1.0,
        }
    }

    #[test]
    fn test_clean_run_scores() {
        let s = PerformanceScores::from_stats(&stats(100, 0, 80, 72.0));
        assert_eq!(s.safety, 100.0);
        assert_eq!(s.compliance, 100.0);
        assert!((s.efficiency - 90.0).abs() < 1e-9);
        assert_eq!(s.safety_label(), "Excellent");
        assert_eq!(s.compliance_label(), "High");
    }

    #[test]
    fn test_scores_bounded() {
        // 极端违章率也不能让评分越界
        let s = PerformanceScores::from_stats(&stats(10, 500, 250, 300.0));
        for v in [s.safety, s.efficiency, s.compliance, s.overall] {
            assert!((0.0..=100.0).contains(&v), "score out of range: {}", v);
        }
        assert_eq!(s.safety, 0.0);
        assert_eq!(s.compliance, 0.0);
        assert_eq!(s.efficiency, 100.0);
    }

    #[test]
    fn test_zero_avg_speed_means_zero_efficiency() {
        let s = PerformanceScores::from_stats(&stats(10, 0, 0, 0.0));
        assert_eq!(s.efficiency, 0.0);
    }

    #[test]
    fn test_compliance_degrades_past_limit() {
        let s = PerformanceScores::from_stats(&stats(10, 1, 130, 60.0));
        assert_eq!(s.compliance, 70.0);
    }

    #[test]
    fn test_recommendations_triggered() {
        let recs = recommendations(&stats(10, 5, 130, 30.0));
        assert!(recs.contains(&"Implement stricter speed enforcement measures"));
        assert!(recs.contains(&"Consider speed calming infrastructure"));
        assert!(recs.contains(&"Review traffic flow optimization"));
    }

    #[test]
    fn test_recommendations_default() {
        let recs = recommendations(&stats(100, 2, 90, 60.0));
        assert_eq!(
            recs,
            vec![
                "Current traffic management appears effective",
                "Continue monitoring and maintenance"
            ]
        );
    }
}
