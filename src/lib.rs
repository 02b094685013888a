#![allow(clippy::type_complexity)]
pub mod alert; // 超速告警下发
pub mod analysis; // 行为分析与风险评分
pub mod annotate; // 帧标注输出
pub mod config; // 命令行参数与标定配置
pub mod detection; // 车辆检测与多目标追踪
pub mod geometry; // 透视标定几何
pub mod pipeline; // 视频推理流水线
pub mod report; // 分析报告生成
pub mod scorecard; // LLM评分卡
pub mod storage; // 云端/本地存储与可靠投递

pub use crate::config::{Args, Calibration};
pub use crate::detection::{BBox, Detector, VehicleDetector};
pub use crate::geometry::{PerspectiveTransform, PolygonZone};

/// 按置信度降序做NMS, 同类别IOU超阈值的低分框被抑制
pub fn non_max_suppression(xs: &mut Vec<BBox>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| b2.confidence.partial_cmp(&b1.confidence).unwrap());

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            if xs[prev_index].class_id == xs[index].class_id {
                let iou = xs[prev_index].iou(&xs[index]);
                if iou > iou_threshold {
                    drop = true;
                    break;
                }
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

pub fn gen_time_string(delimiter: &str) -> String {
    let offset = chrono::FixedOffset::east_opt(8 * 60 * 60).unwrap(); // Beijing
    let t_now = chrono::Utc::now().with_timezone(&offset);
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S{}%f",
        delimiter, delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}

/// 生成分析批次ID: analysis_YYYYmmdd_HHMMSS
pub fn gen_analysis_id() -> String {
    let offset = chrono::FixedOffset::east_opt(8 * 60 * 60).unwrap();
    let t_now = chrono::Utc::now().with_timezone(&offset);
    format!("analysis_{}", t_now.format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f32, y1: f32, x2: f32, y2: f32, conf: f32, class_id: u32) -> BBox {
        BBox {
            x1,
            y1,
            x2,
            y2,
            confidence: conf,
            class_id,
        }
    }

    #[test]
    fn test_nms_suppresses_overlap() {
        let mut xs = vec![
            det(0.0, 0.0, 10.0, 10.0, 0.9, 2),
            det(1.0, 1.0, 11.0, 11.0, 0.8, 2),
            det(50.0, 50.0, 60.0, 60.0, 0.7, 2),
        ];
        non_max_suppression(&mut xs, 0.45);
        assert_eq!(xs.len(), 2);
        assert_eq!(xs[0].confidence, 0.9);
    }

    #[test]
    fn test_nms_keeps_different_classes() {
        let mut xs = vec![
            det(0.0, 0.0, 10.0, 10.0, 0.9, 2),
            det(1.0, 1.0, 11.0, 11.0, 0.8, 7),
        ];
        non_max_suppression(&mut xs, 0.45);
        assert_eq!(xs.len(), 2);
    }

    #[test]
    fn test_analysis_id_format() {
        let id = gen_analysis_id();
        assert!(id.starts_with("analysis_"));
        assert_eq!(id.len(), "analysis_20250101_120000".len());
    }
}
