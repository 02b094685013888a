//! 文本报告生成

use std::collections::HashMap;

use chrono::Local;

use crate::analysis::{recommendations, PerformanceScores, RunStatistics, Violation};

const RULE_WIDE: &str = "======================================================================";
const RULE: &str = "--------------------------------------------------";

/// 违章里速度超过100/120的条数
pub fn violation_counts(violations: &HashMap<String, Vec<Violation>>) -> (u32, u32) {
    let mut speeding = 0;
    let mut high_severity = 0;
    for v in violations.values().flatten() {
        if v.speed_kmh > 100 {
            speeding += 1;
        }
        if v.speed_kmh > 120 {
            high_severity += 1;
        }
    }
    (speeding, high_severity)
}

/// 详细分析文本报告
pub fn summary_report(
    stats: &RunStatistics,
    violations: &HashMap<String, Vec<Violation>>,
    scores: &PerformanceScores,
) -> String {
    let (speeding, high_severity) = violation_counts(violations);
    let mut out = String::new();

    out.push_str(RULE_WIDE);
    out.push_str(&format!(
        "\n🚗 TRAFFIC ANALYSIS REPORT - {}\n",
        stats.analysis_id
    ));
    out.push_str(RULE_WIDE);
    out.push_str(&format!(
        "\nGenerated on: {}\n\n",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));

    out.push_str("📊 EXECUTIVE SUMMARY\n");
    out.push_str(RULE);
    out.push_str(&format!(
        "\nTotal Vehicles Detected: {}\n\
         Vehicles in Monitoring Zone: {}\n\
         Total Violations Recorded: {}\n\
         Vehicles with Violations: {}\n\
         Maximum Speed Detected: {} km/h\n\
         Average Speed: {:.2} km/h\n\
         Processing Duration: {:.2} seconds\n\n",
        stats.total_vehicles_detected,
        stats.vehicles_in_zone,
        stats.total_unique_violations,
        stats.vehicles_with_violations,
        stats.max_speed,
        stats.avg_speed,
        stats.processing_duration
    ));

    out.push_str("🚦 VEHICLE DISTRIBUTION ANALYSIS\n");
    out.push_str(RULE);
    out.push('\n');
    if stats.vehicle_class_distribution.is_empty() {
        out.push_str("No vehicle distribution data available\n");
    } else {
        let total = stats.total_vehicles_detected.max(1);
        let mut classes: Vec<(&String, &u32)> = stats.vehicle_class_distribution.iter().collect();
        classes.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        for (class, count) in classes {
            let percentage = *count as f64 / total as f64 * 100.0;
            out.push_str(&format!(
                "• {}: {} vehicles ({:.1}%)\n",
                class, count, percentage
            ));
        }
    }
    out.push('\n');

    out.push_str("⚠️ TRAFFIC VIOLATIONS ANALYSIS\n");
    out.push_str(RULE);
    out.push_str(&format!(
        "\nTotal Violations: {}\n\
         Speeding Violations (>100 km/h): {}\n\
         High Severity Violations (>120 km/h): {}\n\
         Vehicles with Multiple Violations: {}\n\n",
        stats.total_unique_violations, speeding, high_severity, stats.vehicles_with_violations
    ));

    out.push_str("📈 PERFORMANCE METRICS\n");
    out.push_str(RULE);
    out.push_str(&format!(
        "\nSafety Score: {:.1}% - {}\n\
         Efficiency Score: {:.1}% - {}\n\
         Compliance Score: {:.1}% - {}\n\
         Overall Score: {:.1}% - {}\n\n",
        scores.safety,
        scores.safety_label(),
        scores.efficiency,
        scores.efficiency_label(),
        scores.compliance,
        scores.compliance_label(),
        scores.overall,
        scores.overall_label()
    ));

    out.push_str("💡 RECOMMENDATIONS\n");
    out.push_str(RULE);
    out.push('\n');
    for rec in recommendations(stats) {
        out.push_str(&format!("• {}\n", rec));
    }

    out.push('\n');
    out.push_str(RULE_WIDE);
    out.push_str("\nGenerated by Traffic Analysis System | Professional Report\n");
    out.push_str(RULE_WIDE);
    out.push('\n');
    out
}

/// 管理层评分卡文本
pub fn scorecard_report(
    scorecard_text: &str,
    stats: &RunStatistics,
    scores: &PerformanceScores,
) -> String {
    let mut out = String::new();
    out.push_str(RULE_WIDE);
    out.push_str("\n🏆 PREMIUM MANAGEMENT SCORECARD 🏆\n");
    out.push_str(RULE_WIDE);
    out.push_str(&format!(
        "\nAnalysis ID: {}\nGenerated: {}\n\n",
        stats.analysis_id,
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));

    out.push_str("EXECUTIVE ANALYSIS\n");
    out.push_str(RULE);
    out.push('\n');
    for line in scorecard_text.lines() {
        if !line.trim().is_empty() {
            out.push_str(line.trim());
            out.push('\n');
        }
    }
    out.push('\n');

    out.push_str("📈 PERFORMANCE METRICS\n");
    out.push_str(RULE);
    out.push_str(&format!(
        "\nSafety Score: {:.1}% - {}\n\
         Efficiency Score: {:.1}% - {}\n\
         Compliance Score: {:.1}% - {}\n\
         Overall Score: {:.1}% - {}\n\n",
        scores.safety,
        scores.safety_label(),
        scores.efficiency,
        scores.efficiency_label(),
        scores.compliance,
        scores.compliance_label(),
        scores.overall,
        scores.overall_label()
    ));

    out.push_str(RULE_WIDE);
    out.push_str("\nGenerated by Traffic Analysis System | Premium Analytics Suite\n");
    out.push_str(RULE_WIDE);
    out.push('\n');
    out
}
