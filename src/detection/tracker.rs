//! 多目标追踪公共组件
//! Common components for multi-object vehicle tracking

use super::types::BBox;

// ========== 公共数据结构 ==========

/// 轨迹点 (用于绘制轨迹与速度估计锚点)
#[derive(Clone, Debug)]
pub struct TrackPoint {
    pub x: f32,
    pub y: f32,
}

/// 被追踪车辆 (统一的追踪结果)
#[derive(Clone)]
pub struct TrackedVehicle {
    /// 唯一追踪ID
    pub id: u32,

    /// 当前边界框 (滤波平滑后)
    pub bbox: BBox,

    /// 车辆类别 (COCO class id)
    pub class_id: u32,

    /// 历史轨迹 (底边中点)
    pub trajectory: Vec<TrackPoint>,

    /// 连续丢失帧数
    pub frames_lost: u32,

    /// 显示颜色 (每个ID不同颜色)
    pub color: (u8, u8, u8),

    /// 总共被追踪的帧数 (age)
    pub total_frames: u32,

    /// 检测置信度 (用于高低分轨迹判定)
    pub score: f32,
}

impl TrackedVehicle {
    /// 底边中点 (贴地锚点)
    pub fn anchor(&self) -> (f32, f32) {
        self.bbox.bottom_center()
    }

    /// 追加轨迹点, 轨迹长度上限30
    pub fn push_trajectory_point(&mut self) {
        let (x, y) = self.anchor();
        self.trajectory.push(TrackPoint { x, y });
        if self.trajectory.len() > 30 {
            self.trajectory.remove(0);
        }
    }

    pub fn class_name(&self) -> &'static str {
        super::types::class_name(self.class_id)
    }
}

// ========== 卡尔曼滤波器 ==========

/// 简化卡尔曼滤波器 (单个边界框的位置和尺寸平滑)
/// 状态向量: [cx, cy, w, h, vx, vy, vw, vh], 协方差简化为对角阵
#[derive(Clone)]
pub struct KalmanBoxFilter {
    state: [f32; 8],
    p: [f32; 8],

    /// 过程噪声 (运动不确定性)
    q: f32,

    /// 观测噪声 (测量不确定性)
    r: f32,

    /// 速度衰减因子
    velocity_decay: f32,

    /// 静止阈值 (像素/帧), 低于该值时速度被强衰减
    stationary_threshold: f32,

    stationary_count: u32,
}

impl KalmanBoxFilter {
    pub fn new(bbox: &BBox, q: f32, r: f32) -> Self {
        let (cx, cy) = bbox.center();
        Self {
            state: [cx, cy, bbox.width(), bbox.height(), 0.0, 0.0, 0.0, 0.0],
            p: [10.0; 8],
            q,
            r,
            velocity_decay: 0.95,
            stationary_threshold: 2.0,
            stationary_count: 0,
        }
    }

    /// 预测下一帧状态 (匀速模型 + 速度衰减)
    pub fn predict(&mut self) {
        let speed = (self.state[4] * self.state[4] + self.state[5] * self.state[5]).sqrt();
        let is_stationary = speed < self.stationary_threshold;

        if is_stationary {
            self.stationary_count += 1;
            // 连续静止3帧后大幅衰减速度, 抑制等灯车辆的漂移
            let decay = if self.stationary_count > 3 {
                0.7
            } else {
                self.velocity_decay
            };
            for v in &mut self.state[4..8] {
                *v *= decay;
            }
        } else {
            self.stationary_count = 0;
            self.state[4] *= self.velocity_decay;
            self.state[5] *= self.velocity_decay;
            self.state[6] *= 0.98; // 尺寸变化更慢
            self.state[7] *= 0.98;
        }

        self.state[0] += self.state[4];
        self.state[1] += self.state[5];
        self.state[2] += self.state[6];
        self.state[3] += self.state[7];

        let q_factor = if is_stationary { 0.5 } else { 1.0 };
        for p in &mut self.p {
            *p += self.q * q_factor;
        }
    }

    /// 融合观测值 (残差自适应调整观测噪声)
    pub fn update(&mut self, bbox: &BBox) {
        let (cx, cy) = bbox.center();
        let y = [
            cx - self.state[0],
            cy - self.state[1],
            bbox.width() - self.state[2],
            bbox.height() - self.state[3],
        ];

        let residual_norm = (y[0] * y[0] + y[1] * y[1]).sqrt();
        let adaptive_r = if residual_norm < self.stationary_threshold {
            self.r * 0.3 // 小幅移动: 更信任观测
        } else if residual_norm < 10.0 {
            self.r
        } else {
            self.r * 3.0 // 大幅跳变: 更信任预测
        };

        let mut k = [0.0f32; 8];
        for i in 0..4 {
            k[i] = self.p[i] / (self.p[i] + adaptive_r);
            k[i + 4] = self.p[i + 4] / (self.p[i + 4] + adaptive_r * 10.0);
        }

        for i in 0..4 {
            self.state[i] += k[i] * y[i];
        }

        let velocity_gain = if residual_norm < self.stationary_threshold {
            0.3
        } else {
            1.0
        };
        for i in 0..4 {
            self.state[i + 4] += k[i + 4] * y[i] * velocity_gain;
        }

        for i in 0..8 {
            self.p[i] *= 1.0 - k[i];
        }

        if residual_norm >= self.stationary_threshold {
            self.stationary_count = 0;
        }
    }

    /// 当前状态对应的边界框
    pub fn state_bbox(&self) -> BBox {
        self.bbox_from(self.state[0], self.state[1], self.state[2], self.state[3])
    }

    /// 预测一步后的边界框 (用于数据关联)
    pub fn predicted_bbox(&self) -> BBox {
        self.bbox_from(
            self.state[0] + self.state[4],
            self.state[1] + self.state[5],
            self.state[2] + self.state[6],
            self.state[3] + self.state[7],
        )
    }

    fn bbox_from(&self, cx: f32, cy: f32, w: f32, h: f32) -> BBox {
        let w = w.max(1.0);
        let h = h.max(1.0);
        BBox {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
            confidence: 1.0,
            class_id: 0,
        }
    }

    pub fn velocity(&self) -> (f32, f32) {
        (self.state[4], self.state[5])
    }
}

// ========== 工具函数 ==========

/// 根据追踪ID生成稳定颜色 (黄金角度采样)
pub fn id_to_color(id: u32) -> (u8, u8, u8) {
    let hue = (id as f32 * 137.508) % 360.0;
    hsv_to_rgb(hue, 0.8, 0.9)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (u8, u8, u8) {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    (
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    )
}
