//! 交通行为聚合分析
//!
//! 以 `{track_id}_{class}` 为车辆键, 聚合车辆计数/类别分布/违章记录,
//! 违章记录带去抖: 速度变化超过10 km/h或距上次记录超过5秒才再次记录。

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 违章严重程度 (>120 high, >100 medium)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn from_speed(speed_kmh: f32) -> Self {
        if speed_kmh > 120.0 {
            Severity::High
        } else if speed_kmh > 100.0 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

/// 整体风险等级 (按违章总数)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_total_violations(total: u32) -> Self {
        if total > 200 {
            RiskLevel::High
        } else if total > 100 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// 单条违章记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub track_id: u32,
    pub class: String,
    pub speed_kmh: u32,
    pub timestamp: DateTime<Utc>,
    /// 该车辆的第几次违章 (1起计)
    pub violation_number: u32,
}

impl Violation {
    pub fn severity(&self) -> Severity {
        Severity::from_speed(self.speed_kmh as f32)
    }
}

/// 车辆违章状态 (去抖用)
struct VehicleState {
    last_speed: f32,
    last_time: DateTime<Utc>,
    violation_count: u32,
    max_speed: f32,
}

/// 运行统计汇总
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatistics {
    pub analysis_id: String,
    pub total_vehicles_detected: u32,
    pub vehicles_in_zone: u32,
    pub total_unique_violations: u32,
    pub vehicle_class_distribution: HashMap<String, u32>,
    pub max_speed: u32,
    pub avg_speed: f64,
    pub vehicles_with_violations: u32,
    pub processing_duration: f64,
}

impl RunStatistics {
    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::from_total_violations(self.total_unique_violations)
    }

    /// 违章率 (%)
    pub fn violation_rate(&self) -> f64 {
        self.total_unique_violations as f64 / self.total_vehicles_detected.max(1) as f64 * 100.0
    }
}

/// 交通分析聚合器
pub struct TrafficAnalyzer {
    analysis_id: String,
    all_vehicles_seen: HashSet<String>,
    zone_vehicles_seen: HashSet<String>,
    violations: HashMap<String, Vec<Violation>>,
    vehicle_states: HashMap<String, VehicleState>,
    class_distribution: HashMap<String, u32>,
    start_time: DateTime<Utc>,
}

impl TrafficAnalyzer {
    pub fn new(analysis_id: impl Into<String>) -> Self {
        Self {
            analysis_id: analysis_id.into(),
            all_vehicles_seen: HashSet::new(),
            zone_vehicles_seen: HashSet::new(),
            violations: HashMap::new(),
            vehicle_states: HashMap::new(),
            class_distribution: HashMap::new(),
            start_time: Utc::now(),
        }
    }

    pub fn analysis_id(&self) -> &str {
        &self.analysis_id
    }

    fn vehicle_key(track_id: u32, class: &str) -> String {
        format!("{}_{}", track_id, class)
    }

    /// 记录车辆出现 (每个键只计数一次)
    pub fn record_vehicle(&mut self, track_id: u32, class: &str, in_zone: bool) {
        let key = Self::vehicle_key(track_id, class);
        if self.all_vehicles_seen.insert(key.clone()) {
            *self.class_distribution.entry(class.to_string()).or_insert(0) += 1;
        }
        if in_zone {
            self.zone_vehicles_seen.insert(key);
        }
    }

    /// 记录违章观测 (去抖), 新记录时返回该条违章
    ///
    /// 低于5 km/h的观测直接忽略; 首次观测必记;
    /// 其后仅当速度变化>10 km/h或距上次记录>5秒才记录。
    pub fn record_violation(
        &mut self,
        track_id: u32,
        class: &str,
        speed_kmh: f32,
        timestamp: DateTime<Utc>,
    ) -> Option<Violation> {
        if speed_kmh < 5.0 {
            return None;
        }
        let key = Self::vehicle_key(track_id, class);

        match self.vehicle_states.get_mut(&key) {
            None => {
                self.vehicle_states.insert(
                    key.clone(),
                    VehicleState {
                        last_speed: speed_kmh,
                        last_time: timestamp,
                        violation_count: 1,
                        max_speed: speed_kmh,
                    },
                );
                let violation = Violation {
                    track_id,
                    class: class.to_string(),
                    speed_kmh: speed_kmh as u32,
                    timestamp,
                    violation_number: 1,
                };
                self.violations.entry(key).or_default().push(violation.clone());
                Some(violation)
            }
            Some(state) => {
                let time_diff = (timestamp - state.last_time).num_milliseconds() as f64 / 1000.0;
                let speed_diff = (speed_kmh - state.last_speed).abs();

                if speed_diff > 10.0 || time_diff > 5.0 {
                    state.violation_count += 1;
                    state.last_speed = speed_kmh;
                    state.last_time = timestamp;
                    state.max_speed = state.max_speed.max(speed_kmh);

                    let violation = Violation {
                        track_id,
                        class: class.to_string(),
                        speed_kmh: speed_kmh as u32,
                        timestamp,
                        violation_number: state.violation_count,
                    };
                    self.violations.entry(key).or_default().push(violation.clone());
                    Some(violation)
                } else {
                    None
                }
            }
        }
    }

    /// 全部违章记录 (按车辆键)
    pub fn violations(&self) -> &HashMap<String, Vec<Violation>> {
        &self.violations
    }

    pub fn total_violations(&self) -> u32 {
        self.violations.values().map(|v| v.len() as u32).sum()
    }

    pub fn vehicles_seen(&self) -> u32 {
        self.all_vehicles_seen.len() as u32
    }

    /// 汇总运行统计
    pub fn statistics(&self) -> RunStatistics {
        let all_speeds: Vec<u32> = self
            .violations
            .values()
            .flatten()
            .map(|v| v.speed_kmh)
            .collect();

        RunStatistics {
            analysis_id: self.analysis_id.clone(),
            total_vehicles_detected: self.all_vehicles_seen.len() as u32,
            vehicles_in_zone: self.zone_vehicles_seen.len() as u32,
            total_unique_violations: all_speeds.len() as u32,
            vehicle_class_distribution: self.class_distribution.clone(),
            max_speed: all_speeds.iter().copied().max().unwrap_or(0),
            avg_speed: if all_speeds.is_empty() {
                0.0
            } else {
                all_speeds.iter().map(|&s| s as f64).sum::<f64>() / all_speeds.len() as f64
            },
            vehicles_with_violations: self.violations.len() as u32,
            processing_duration: (Utc::now() - self.start_time).num_milliseconds() as f64 / 1000.0,
        }
    }
}
