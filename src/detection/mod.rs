/// 车辆检测与多目标追踪
/// Vehicle detection and multi-object tracking
///
/// - types:     检测框/帧等公共数据结构
/// - detector:  Detector trait + YOLOv8 ONNX实现
/// - tracker:   卡尔曼滤波与追踪公共组件
/// - bytetrack: ByteTrack车辆追踪器
pub mod bytetrack;
pub mod detector;
pub mod tracker;
pub mod types;

pub use bytetrack::ByteTracker;
pub use detector::{default_model_dir, ensure_model, Detector, DetectorConfig, VehicleDetector};
pub use tracker::{id_to_color, KalmanBoxFilter, TrackPoint, TrackedVehicle};
pub use types::{class_name, BBox, DecodedFrame, INF_SIZE};
