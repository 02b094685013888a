/// 行为分析与风险评分引擎
/// Behavior analysis and risk-scoring engine
///
/// - speed:    路面坐标速度估计
/// - analyzer: 车辆/违章聚合与运行统计
/// - score:    评分校准与管理建议
pub mod analyzer;
pub mod score;
pub mod speed;

pub use analyzer::{RiskLevel, RunStatistics, Severity, TrafficAnalyzer, Violation};
pub use score::{recommendations, PerformanceScores};
pub use speed::SpeedEstimator;
