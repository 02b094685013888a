//! HTML报告生成 (单文件自包含, 无脚本)

use std::collections::HashMap;

use chrono::Local;

use crate::analysis::{recommendations, PerformanceScores, RunStatistics, Violation};

use super::text::violation_counts;

fn stat_card(value: &str, label: &str) -> String {
    format!(
        "<div class=\"stat-card\"><div class=\"stat-value\">{}</div><div class=\"stat-label\">{}</div></div>",
        value, label
    )
}

fn score_card(value: f64, label: &str) -> String {
    let class = if value >= 70.0 { "success" } else { "warning" };
    format!(
        "<div class=\"stat-card\"><div class=\"stat-value {}\">{:.1}%</div><div class=\"stat-label\">{}</div></div>",
        class, value, label
    )
}

/// 生成完整HTML报告
pub fn html_report(
    stats: &RunStatistics,
    violations: &HashMap<String, Vec<Violation>>,
    scores: &PerformanceScores,
    scorecard_text: &str,
) -> String {
    let (speeding, high_severity) = violation_counts(violations);

    let mut vehicle_items = String::new();
    let mut classes: Vec<(&String, &u32)> = stats.vehicle_class_distribution.iter().collect();
    classes.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    for (class, count) in classes {
        vehicle_items.push_str(&format!(
            "<div class=\"vehicle-item\"><strong>{}</strong><br>{} vehicles</div>",
            class, count
        ));
    }

    let mut recs = String::new();
    for rec in recommendations(stats) {
        recs.push_str(&format!("<li>{}</li>", rec));
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Traffic Analysis Report - {analysis_id}</title>
<style>
  body {{ font-family: 'Segoe UI', Arial, sans-serif; margin: 0; padding: 20px; background-color: #f5f5f5; color: #333; }}
  .container {{ max-width: 1000px; margin: 0 auto; background: white; padding: 30px; border-radius: 10px; box-shadow: 0 4px 6px rgba(0,0,0,0.1); }}
  .header {{ text-align: center; border-bottom: 3px solid #3498db; padding-bottom: 20px; margin-bottom: 30px; }}
  .header h1 {{ color: #2c3e50; margin: 0; font-size: 2.5em; }}
  .section {{ margin: 30px 0; padding: 20px; background: #f8f9fa; border-radius: 8px; border-left: 4px solid #3498db; }}
  .section h2 {{ color: #2c3e50; margin-top: 0; }}
  .stats-grid {{ display: grid; grid-template-columns: repeat(auto-fit, minmax(200px, 1fr)); gap: 15px; margin: 20px 0; }}
  .stat-card {{ background: white; padding: 20px; border-radius: 8px; text-align: center; box-shadow: 0 2px 4px rgba(0,0,0,0.1); }}
  .stat-value {{ font-size: 2em; font-weight: bold; color: #2c3e50; margin: 10px 0; }}
  .stat-label {{ color: #7f8c8d; font-size: 0.9em; }}
  .vehicle-list {{ display: grid; grid-template-columns: repeat(auto-fit, minmax(150px, 1fr)); gap: 10px; margin: 15px 0; }}
  .vehicle-item {{ background: white; padding: 15px; border-radius: 5px; text-align: center; border-left: 3px solid #3498db; }}
  .recommendations {{ background: #e8f4fc; padding: 20px; border-radius: 8px; margin: 20px 0; }}
  .footer {{ text-align: center; margin-top: 40px; padding-top: 20px; border-top: 1px solid #bdc3c7; color: #7f8c8d; font-size: 0.9em; }}
  .warning {{ color: #e74c3c; font-weight: bold; }}
  .success {{ color: #27ae60; font-weight: bold; }}
</style>
</head>
<body>
<div class="container">
  <div class="header">
    <h1>🚗 Traffic Analysis Report</h1>
    <p><strong>Analysis ID:</strong> {analysis_id}</p>
    <p><strong>Generated:</strong> {generated}</p>
  </div>

  <div class="section">
    <h2>📊 Executive Summary</h2>
    <div class="stats-grid">{summary_cards}</div>
  </div>

  <div class="section">
    <h2>🚦 Vehicle Distribution</h2>
    <div class="vehicle-list">{vehicle_items}</div>
  </div>

  <div class="section">
    <h2>⚠️ Violations Analysis</h2>
    <div class="stats-grid">{violation_cards}</div>
  </div>

  <div class="section">
    <h2>📈 Performance Metrics</h2>
    <div class="stats-grid">{score_cards}</div>
  </div>

  <div class="recommendations">
    <h2>💡 Management Recommendations</h2>
    <ul>{recs}</ul>
  </div>

  <div class="section">
    <h2>🏆 Executive Scorecard</h2>
    <div style="background: white; padding: 20px; border-radius: 8px; margin: 15px 0;">
      <pre style="white-space: pre-wrap; font-family: inherit;">{scorecard}</pre>
    </div>
  </div>

  <div class="footer">
    <p>This report was automatically generated by the Traffic Analysis System</p>
    <p>For detailed analytics and real-time monitoring, access the dashboard system</p>
  </div>
</div>
</body>
</html>
"#,
        analysis_id = stats.analysis_id,
        generated = Local::now().format("%Y-%m-%d %H:%M:%S"),
        summary_cards = [
            stat_card(&stats.total_vehicles_detected.to_string(), "Total Vehicles"),
            stat_card(&stats.total_unique_violations.to_string(), "Total Violations"),
            stat_card(&format!("{} km/h", stats.max_speed), "Max Speed"),
            stat_card(&speeding.to_string(), "Speeding Cases"),
        ]
        .join(""),
        vehicle_items = vehicle_items,
        violation_cards = [
            stat_card(
                &stats.vehicles_with_violations.to_string(),
                "Vehicles with Violations"
            ),
            stat_card(&speeding.to_string(), "Speeding Violations"),
            stat_card(&high_severity.to_string(), "High Severity"),
            stat_card(&format!("{:.1} km/h", stats.avg_speed), "Average Speed"),
        ]
        .join(""),
        score_cards = [
            score_card(scores.safety, "Safety Score"),
            score_card(scores.efficiency, "Efficiency Score"),
            score_card(scores.compliance, "Compliance Score"),
            score_card(scores.overall, "Overall Score"),
        ]
        .join(""),
        recs = recs,
        scorecard = scorecard_text,
    )
}
