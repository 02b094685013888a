/// 分析报告生成
/// Run report generation (text / scorecard / HTML)
pub mod html;
pub mod text;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::analysis::{PerformanceScores, RunStatistics, Violation};

pub use html::html_report;
pub use text::{scorecard_report, summary_report, violation_counts};

/// 一次运行产出的报告文件路径
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub summary_txt: PathBuf,
    pub scorecard_txt: PathBuf,
    pub report_html: PathBuf,
}

/// 生成全部报告并写入输出目录
pub fn write_reports(
    out_dir: impl AsRef<Path>,
    stats: &RunStatistics,
    violations: &HashMap<String, Vec<Violation>>,
    scores: &PerformanceScores,
    scorecard_text: &str,
) -> Result<ReportPaths> {
    let out_dir = out_dir.as_ref();
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("创建报告目录失败: {}", out_dir.display()))?;

    let paths = ReportPaths {
        summary_txt: out_dir.join(format!("traffic_report_{}.txt", stats.analysis_id)),
        scorecard_txt: out_dir.join(format!("premium_scorecard_{}.txt", stats.analysis_id)),
        report_html: out_dir.join(format!("traffic_report_{}.html", stats.analysis_id)),
    };

    std::fs::write(&paths.summary_txt, summary_report(stats, violations, scores))?;
    std::fs::write(
        &paths.scorecard_txt,
        scorecard_report(scorecard_text, stats, scores),
    )?;
    std::fs::write(
        &paths.report_html,
        html_report(stats, violations, scores, scorecard_text),
    )?;

    Ok(paths)
}
