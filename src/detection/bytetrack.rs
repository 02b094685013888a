//! ByteTrack 车辆追踪实现
//! ByteTrack: simple and effective multi-object tracking
//!
//! 核心思想:
//! 1. 高低分检测框分开处理
//! 2. 高分框优先匹配 (IOU)
//! 3. 低分框救援丢失的轨迹
//! 4. 纯运动模型, 无需外观特征
//!
//! 在标准ByteTrack之上增加类别门控: 不同车辆类别的框与轨迹不互相匹配。

use super::tracker::{id_to_color, KalmanBoxFilter, TrackPoint, TrackedVehicle};
use super::types::BBox;

/// ByteTrack 内部轨迹
#[derive(Clone)]
struct Track {
    vehicle: TrackedVehicle,
    kalman: KalmanBoxFilter,
}

impl Track {
    fn new(id: u32, bbox: BBox) -> Self {
        // 降低观测噪声(r=0.5), 更信任检测结果, 快速响应移动
        let kalman = KalmanBoxFilter::new(&bbox, 0.1, 0.5);
        let smoothed = kalman.state_bbox();
        let class_id = bbox.class_id;
        let score = bbox.confidence;

        let mut vehicle = TrackedVehicle {
            id,
            bbox: BBox {
                class_id,
                confidence: score,
                ..smoothed
            },
            class_id,
            trajectory: Vec::new(),
            frames_lost: 0,
            color: id_to_color(id),
            total_frames: 1,
            score,
        };
        vehicle.push_trajectory_point();

        Self { vehicle, kalman }
    }

    fn predict(&mut self) {
        self.kalman.predict();
        let class_id = self.vehicle.class_id;
        let score = self.vehicle.score;
        self.vehicle.bbox = BBox {
            class_id,
            confidence: score,
            ..self.kalman.state_bbox()
        };
    }

    fn update(&mut self, bbox: BBox) {
        self.kalman.update(&bbox);
        let class_id = self.vehicle.class_id;
        self.vehicle.bbox = BBox {
            class_id,
            confidence: bbox.confidence,
            ..self.kalman.state_bbox()
        };
        self.vehicle.frames_lost = 0;
        self.vehicle.total_frames += 1;
        self.vehicle.score = bbox.confidence;
        self.vehicle.push_trajectory_point();
    }

    fn mark_lost(&mut self) {
        self.vehicle.frames_lost += 1;
        self.predict();
    }

    fn predicted_bbox(&self) -> BBox {
        self.kalman.predicted_bbox()
    }
}

/// ByteTrack 车辆追踪器
pub struct ByteTracker {
    tracks: Vec<Track>,
    snapshot: Vec<TrackedVehicle>,

    /// 下一个分配的ID
    next_id: u32,

    /// 最大允许丢失帧数
    max_lost_frames: u32,

    /// 高分检测阈值
    high_score_threshold: f32,

    /// 低分检测阈值 (救援用)
    low_score_threshold: f32,

    /// 高分匹配 IOU 阈值
    high_iou_threshold: f32,

    /// 低分匹配 IOU 阈值
    low_iou_threshold: f32,
}

impl ByteTracker {
    pub fn new() -> Self {
        Self {
            tracks: Vec::new(),
            snapshot: Vec::new(),
            next_id: 1,
            max_lost_frames: 30,       // 30帧(约1秒), 车辆遮挡通常短于行人
            high_score_threshold: 0.4, // 高分阈值
            low_score_threshold: 0.1,  // 低分阈值 (救援用)
            high_iou_threshold: 0.3,   // 车辆帧间位移大, 放宽高分匹配
            low_iou_threshold: 0.2,
        }
    }

    /// 更新追踪 (ByteTrack 两轮匹配)
    pub fn update(&mut self, detections: &[BBox]) -> &[TrackedVehicle] {
        // 1. 所有轨迹先预测
        for track in &mut self.tracks {
            track.predict();
        }

        // 2. 分离高低分检测框
        let mut high_dets: Vec<usize> = Vec::new();
        let mut low_dets: Vec<usize> = Vec::new();
        for (idx, det) in detections.iter().enumerate() {
            if det.confidence >= self.high_score_threshold {
                high_dets.push(idx);
            } else if det.confidence >= self.low_score_threshold {
                low_dets.push(idx);
            }
        }

        let mut matched_det = vec![false; detections.len()];
        let mut matched_track = vec![false; self.tracks.len()];

        // 3. 第一轮: 高分检测 + 所有轨迹
        let all_tracks: Vec<usize> = (0..self.tracks.len()).collect();
        for (det_idx, track_idx) in
            self.associate(detections, &high_dets, &all_tracks, self.high_iou_threshold)
        {
            matched_det[det_idx] = true;
            matched_track[track_idx] = true;
            self.tracks[track_idx].update(detections[det_idx].clone());
        }

        // 4. 第二轮: 低分检测 + 未匹配轨迹 (救援)
        let unmatched_tracks: Vec<usize> = (0..self.tracks.len())
            .filter(|&idx| !matched_track[idx])
            .collect();
        for (det_idx, track_idx) in self.associate(
            detections,
            &low_dets,
            &unmatched_tracks,
            self.low_iou_threshold,
        ) {
            matched_det[det_idx] = true;
            matched_track[track_idx] = true;
            self.tracks[track_idx].update(detections[det_idx].clone());
        }

        // 5. 未匹配的高分检测 → 新建轨迹
        for &det_idx in &high_dets {
            if !matched_det[det_idx] {
                self.tracks
                    .push(Track::new(self.next_id, detections[det_idx].clone()));
                self.next_id += 1;
            }
        }

        // 6. 未匹配的轨迹 → 标记丢失
        for (track_idx, &matched) in matched_track.iter().enumerate() {
            if !matched {
                self.tracks[track_idx].mark_lost();
            }
        }

        // 7. 删除丢失太久的轨迹
        let max_lost = self.max_lost_frames;
        self.tracks.retain(|t| t.vehicle.frames_lost <= max_lost);

        self.snapshot = self.tracks.iter().map(|t| t.vehicle.clone()).collect();
        &self.snapshot
    }

    /// IOU 贪心匹配 (同类别门控)
    fn associate(
        &self,
        detections: &[BBox],
        det_indices: &[usize],
        track_indices: &[usize],
        iou_threshold: f32,
    ) -> Vec<(usize, usize)> {
        if det_indices.is_empty() || track_indices.is_empty() {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        for (local_det, &det_idx) in det_indices.iter().enumerate() {
            for (local_track, &track_idx) in track_indices.iter().enumerate() {
                let track = &self.tracks[track_idx];
                if track.vehicle.class_id != detections[det_idx].class_id {
                    continue;
                }
                let iou = detections[det_idx].iou(&track.predicted_bbox());
                if iou >= iou_threshold {
                    candidates.push((1.0 - iou, det_idx, local_det, track_idx, local_track));
                }
            }
        }

        candidates.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

        let mut assignments = Vec::new();
        let mut used_det = vec![false; det_indices.len()];
        let mut used_track = vec![false; track_indices.len()];
        for (_, det_idx, local_det, track_idx, local_track) in candidates {
            if !used_det[local_det] && !used_track[local_track] {
                assignments.push((det_idx, track_idx));
                used_det[local_det] = true;
                used_track[local_track] = true;
            }
        }
        assignments
    }

    /// 清除所有轨迹
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.snapshot.clear();
        self.next_id = 1;
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }
}

impl Default for ByteTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32, conf: f32, class_id: u32) -> BBox {
        BBox {
            x1: x,
            y1: 100.0,
            x2: x + 40.0,
            y2: 130.0,
            confidence: conf,
            class_id,
        }
    }

    #[test]
    fn test_new_track_from_high_score() {
        let mut tracker = ByteTracker::new();
        let tracked = tracker.update(&[det(0.0, 0.9, 2)]);
        assert_eq!(tracked.len(), 1);
        assert_eq!(tracked[0].id, 1);
        assert_eq!(tracked[0].class_id, 2);
    }

    #[test]
    fn test_low_score_never_spawns_track() {
        let mut tracker = ByteTracker::new();
        let tracked = tracker.update(&[det(0.0, 0.2, 2)]);
        assert!(tracked.is_empty());
    }

    #[test]
    fn test_id_stable_across_frames() {
        let mut tracker = ByteTracker::new();
        tracker.update(&[det(0.0, 0.9, 2)]);
        for i in 1..10 {
            let tracked = tracker.update(&[det(5.0 * i as f32, 0.9, 2)]);
            assert_eq!(tracked.len(), 1);
            assert_eq!(tracked[0].id, 1);
            assert_eq!(tracked[0].frames_lost, 0);
        }
    }

    #[test]
    fn test_low_score_rescue() {
        let mut tracker = ByteTracker::new();
        tracker.update(&[det(0.0, 0.9, 2)]);
        // 置信度跌到低分区间, 轨迹应被救援而非丢失
        let tracked = tracker.update(&[det(3.0, 0.2, 2)]);
        assert_eq!(tracked.len(), 1);
        assert_eq!(tracked[0].id, 1);
        assert_eq!(tracked[0].frames_lost, 0);
    }

    #[test]
    fn test_track_dropped_after_max_lost() {
        let mut tracker = ByteTracker::new();
        tracker.update(&[det(0.0, 0.9, 2)]);
        for _ in 0..=30 {
            tracker.update(&[]);
        }
        assert_eq!(tracker.track_count(), 0);
    }

    #[test]
    fn test_class_gating() {
        let mut tracker = ByteTracker::new();
        tracker.update(&[det(0.0, 0.9, 2)]);
        // 同位置但类别不同 → 新轨迹而非匹配
        let tracked = tracker.update(&[det(0.0, 0.9, 7)]);
        assert_eq!(tracked.len(), 2);
        let ids: Vec<u32> = tracked.iter().map(|t| t.id).collect();
        assert!(ids.contains(&1) && ids.contains(&2));
    }

    #[test]
    fn test_reset() {
        let mut tracker = ByteTracker::new();
        tracker.update(&[det(0.0, 0.9, 2)]);
        tracker.reset();
        assert_eq!(tracker.track_count(), 0);
        let tracked = tracker.update(&[det(0.0, 0.9, 2)]);
        assert_eq!(tracked[0].id, 1);
    }
}
