use std::sync::Arc;
/// 检测系统数据结构定义
/// Data structures for the vehicle detection system
use serde::{Deserialize, Serialize};

// 构建期生成的COCO类别静态表
include!(concat!(env!("OUT_DIR"), "/coco_tables.rs"));

// ========== 公共常量 ==========

/// YOLOv8推理输入尺寸
pub const INF_SIZE: u32 = 640;

// ========== 数据结构 ==========

/// 检测框 (Detection bounding box)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u32,
}

impl BBox {
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// 中心点
    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// 底边中点 (速度估计的锚点, 近似车辆与路面的接触点)
    pub fn bottom_center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, self.y2)
    }

    pub fn iou(&self, another: &BBox) -> f32 {
        let x1 = self.x1.max(another.x1);
        let y1 = self.y1.max(another.y1);
        let x2 = self.x2.min(another.x2);
        let y2 = self.y2.min(another.y2);

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let intersection = (x2 - x1) * (y2 - y1);
        let union = self.area() + another.area() - intersection;
        if union <= 0.0 {
            return 0.0;
        }
        intersection / union
    }

    /// 是否为车辆类别 (bicycle/car/motorcycle/bus/truck)
    pub fn is_vehicle(&self) -> bool {
        VEHICLE_CLASS_IDS.contains(&self.class_id)
    }

    pub fn class_name(&self) -> &'static str {
        class_name(self.class_id)
    }
}

/// COCO类别ID → 名称
pub fn class_name(class_id: u32) -> &'static str {
    COCO_NAMES.get(&class_id).copied().unwrap_or("unknown")
}

/// 已解码帧 (输入源线程 → 检测线程)
#[derive(Clone)]
pub struct DecodedFrame {
    pub rgb_data: Arc<Vec<u8>>, // 使用Arc共享数据, 避免复制
    pub width: u32,
    pub height: u32,
    pub frame_id: u64, // 帧序号
}

impl DecodedFrame {
    pub fn new(frame_id: u64, width: u32, height: u32, rgb_data: Vec<u8>) -> Self {
        Self {
            rgb_data: Arc::new(rgb_data),
            width,
            height,
            frame_id,
        }
    }
}
