//! 本地JSON全量导出
//!
//! 不依赖云端连接, 每次运行都落盘一份完整结果
//! (统计 + 逐车违章), 供离线分析或补投使用。

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::analysis::{RunStatistics, Violation};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunExport {
    pub statistics: RunStatistics,
    pub violations: HashMap<String, Vec<Violation>>,
}

/// 导出完整运行结果到JSON文件
pub fn export_run(
    path: impl AsRef<Path>,
    statistics: &RunStatistics,
    violations: &HashMap<String, Vec<Violation>>,
) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let export = RunExport {
        statistics: statistics.clone(),
        violations: violations.clone(),
    };
    let json = serde_json::to_string_pretty(&export)?;
    std::fs::write(path, json).with_context(|| format!("本地导出失败: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_export_roundtrip() {
        let stats = RunStatistics {
            analysis_id: "analysis_local".into(),
            total_vehicles_detected: 3,
            vehicles_in_zone: 2,
            total_unique_violations: 1,
            vehicle_class_distribution: HashMap::from([("car".to_string(), 3)]),
            max_speed: 112,
            avg_speed: 112.0,
            vehicles_with_violations: 1,
            processing_duration: 4.2,
        };
        let mut violations = HashMap::new();
        violations.insert(
            "5_car".to_string(),
            vec![Violation {
                track_id: 5,
                class: "car".into(),
                speed_kmh: 112,
                timestamp: Utc::now(),
                violation_number: 1,
            }],
        );

        let path = std::env::temp_dir().join("tcs-rs-test-export/run.json");
        export_run(&path, &stats, &violations).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let back: RunExport = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.statistics.analysis_id, "analysis_local");
        assert_eq!(back.violations["5_car"][0].speed_kmh, 112);
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
