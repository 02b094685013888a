//! 路面坐标速度估计
//!
//! 每条轨迹维护最近1秒的路面Y坐标环形缓冲,
//! 速度 = 窗口首尾位移 / 窗口时长 × 3.6 (km/h)。
//! 样本不足半秒时不给出估计, 避免启动期抖动。

use std::collections::{HashMap, VecDeque};

pub struct SpeedEstimator {
    fps: u32,
    coordinates: HashMap<u32, VecDeque<f32>>,
}

impl SpeedEstimator {
    pub fn new(fps: u32) -> Self {
        Self {
            fps: fps.max(1),
            coordinates: HashMap::new(),
        }
    }

    /// 记录一次路面Y坐标观测, 样本足够时返回当前速度 (km/h)
    pub fn observe(&mut self, track_id: u32, road_y: f32) -> Option<f32> {
        let window = self.fps as usize;
        let buf = self
            .coordinates
            .entry(track_id)
            .or_insert_with(|| VecDeque::with_capacity(window));
        if buf.len() == window {
            buf.pop_front();
        }
        buf.push_back(road_y);

        // 至少半秒的样本才可信
        if (buf.len() as f32) < self.fps as f32 / 2.0 {
            return None;
        }

        let start = *buf.back().unwrap();
        let end = *buf.front().unwrap();
        let distance = (start - end).abs(); // 方向无关
        let time = buf.len() as f32 / self.fps as f32;
        Some(distance / time * 3.6)
    }

    /// 仅保留给定轨迹的缓冲, 其余清除 (轨迹消亡后释放内存)
    pub fn retain(&mut self, live_ids: &[u32]) {
        self.coordinates.retain(|id, _| live_ids.contains(id));
    }

    pub fn tracked_count(&self) -> usize {
        self.coordinates.len()
    }
}
