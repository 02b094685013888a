/// 云端/本地存储与可靠投递
/// Cloud/local storage and reliable delivery
///
/// - mongo: MongoDB Atlas 同步客户端 (四个集合)
/// - spool: 至少一次投递的磁盘暂存队列
/// - local: 本地JSON全量导出
pub mod local;
pub mod mongo;
pub mod spool;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::{RiskLevel, RunStatistics, Severity, Violation};
use crate::pipeline::AnalyticsTick;

pub use mongo::MongoStore;
pub use spool::{DeliveryQueue, FlushReport};

// ========== 存储记录类型 ==========

/// 运行统计记录 (traffic_statistics)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsRecord {
    pub analysis_id: String,
    pub timestamp: DateTime<Utc>,
    pub total_vehicles: u32,
    pub vehicles_in_zone: u32,
    pub total_violations: u32,
    pub vehicles_with_violations: u32,
    pub max_speed: u32,
    pub avg_speed: f64,
    pub vehicle_distribution: std::collections::HashMap<String, u32>,
    pub status: String,
}

impl StatisticsRecord {
    pub fn from_stats(stats: &RunStatistics) -> Self {
        Self {
            analysis_id: stats.analysis_id.clone(),
            timestamp: Utc::now(),
            total_vehicles: stats.total_vehicles_detected,
            vehicles_in_zone: stats.vehicles_in_zone,
            total_violations: stats.total_unique_violations,
            vehicles_with_violations: stats.vehicles_with_violations,
            max_speed: stats.max_speed,
            avg_speed: stats.avg_speed,
            vehicle_distribution: stats.vehicle_class_distribution.clone(),
            status: "completed".to_string(),
        }
    }
}

/// 单条违章记录 (vehicle_violations)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub analysis_id: String,
    pub timestamp: DateTime<Utc>,
    pub vehicle_id: u32,
    pub vehicle_type: String,
    pub speed_kmh: u32,
    pub violation_number: u32,
    pub is_speeding: bool,
    pub severity: Severity,
}

impl ViolationRecord {
    pub fn from_violation(analysis_id: &str, violation: &Violation, speed_limit: f32) -> Self {
        Self {
            analysis_id: analysis_id.to_string(),
            timestamp: violation.timestamp,
            vehicle_id: violation.track_id,
            vehicle_type: violation.class.clone(),
            speed_kmh: violation.speed_kmh,
            violation_number: violation.violation_number,
            is_speeding: violation.speed_kmh as f32 > speed_limit,
            severity: violation.severity(),
        }
    }
}

/// 评分卡记录 (premium_scorecards)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorecardRecord {
    pub analysis_id: String,
    pub timestamp: DateTime<Utc>,
    pub scorecard_text: String,
    pub summary: ScorecardSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorecardSummary {
    pub total_vehicles: u32,
    pub total_violations: u32,
    pub max_speed: u32,
    pub risk_level: RiskLevel,
}

impl ScorecardRecord {
    pub fn new(stats: &RunStatistics, scorecard_text: String) -> Self {
        Self {
            analysis_id: stats.analysis_id.clone(),
            timestamp: Utc::now(),
            scorecard_text,
            summary: ScorecardSummary {
                total_vehicles: stats.total_vehicles_detected,
                total_violations: stats.total_unique_violations,
                max_speed: stats.max_speed,
                risk_level: stats.risk_level(),
            },
        }
    }
}

/// 实时分析快照记录 (real_time_analytics)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsRecord {
    pub analysis_id: String,
    pub timestamp: DateTime<Utc>,
    pub frame_number: u64,
    pub vehicles_detected: u32,
    pub violations_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl AnalyticsRecord {
    pub fn from_tick(analysis_id: &str, tick: &AnalyticsTick) -> Self {
        Self {
            analysis_id: analysis_id.to_string(),
            timestamp: Utc::now(),
            frame_number: tick.frame_id,
            vehicles_detected: tick.vehicles_detected,
            violations_count: tick.violations_count,
            status: None,
        }
    }

    pub fn completed(analysis_id: &str, frame_number: u64, vehicles: u32, violations: u32) -> Self {
        Self {
            analysis_id: analysis_id.to_string(),
            timestamp: Utc::now(),
            frame_number,
            vehicles_detected: vehicles,
            violations_count: violations,
            status: Some("completed".to_string()),
        }
    }
}

/// 投递记录 (联合类型, 决定落入哪个集合)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageRecord {
    Statistics(StatisticsRecord),
    Violation(ViolationRecord),
    Scorecard(ScorecardRecord),
    Analytics(AnalyticsRecord),
}

impl StorageRecord {
    pub fn is_violation(&self) -> bool {
        matches!(self, StorageRecord::Violation(_))
    }
}

// ========== 存储端统一接口 ==========

/// 存储落点 (MongoDB/测试内存端等)
pub trait StorageSink: Send {
    fn name(&self) -> &str;

    /// 投递单条记录
    fn deliver(&mut self, record: &StorageRecord) -> Result<()>;

    /// 投递一批记录 (默认逐条; Mongo端对违章批量insert_many)
    fn deliver_batch(&mut self, records: &[StorageRecord]) -> Result<()> {
        for record in records {
            self.deliver(record)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_record_speeding_flag() {
        let v = Violation {
            track_id: 3,
            class: "truck".into(),
            speed_kmh: 115,
            timestamp: Utc::now(),
            violation_number: 1,
        };
        let r = ViolationRecord::from_violation("analysis_x", &v, 100.0);
        assert!(r.is_speeding);
        assert_eq!(r.severity, Severity::Medium);

        let slow = Violation { speed_kmh: 80, ..v };
        let r = ViolationRecord::from_violation("analysis_x", &slow, 100.0);
        assert!(!r.is_speeding);
        assert_eq!(r.severity, Severity::Low);
    }

    #[test]
    fn test_storage_record_tagged_serialization() {
        let record = StorageRecord::Analytics(AnalyticsRecord::completed("analysis_x", 42, 7, 1));
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"kind\":\"analytics\""));
        assert!(json.contains("\"status\":\"completed\""));
        let back: StorageRecord = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, StorageRecord::Analytics(a) if a.frame_number == 42));
    }
}
