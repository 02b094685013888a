//! 命令行参数与标定配置
//! CLI arguments and camera calibration configuration

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::geometry::{PerspectiveTransform, PolygonZone};

/// 交通摄像分析参数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "交通摄像分析 - 车辆行为风险评分系统", long_about = None)]
pub struct Args {
    /// 输入源: 帧图片目录 (启用video特性时亦可为视频文件/RTSP地址)
    #[arg(short, long)]
    pub source: String,

    /// ONNX检测模型路径
    #[arg(short, long, default_value = "models/yolov8s.onnx")]
    pub model: String,

    /// 模型缺失时的下载地址
    #[arg(long)]
    pub model_url: Option<String>,

    /// 标定配置JSON文件 (缺省使用内置标定)
    #[arg(short, long)]
    pub calibration: Option<String>,

    /// 检测置信度阈值
    #[arg(long, default_value_t = 0.3)]
    pub confidence_threshold: f32,

    /// NMS IOU阈值
    #[arg(long, default_value_t = 0.7)]
    pub iou_threshold: f32,

    /// MongoDB连接串 (缺省仅本地存储)
    #[arg(long)]
    pub mongodb_uri: Option<String>,

    /// 运行结束后生成LLM评分卡
    #[arg(long, default_value_t = false)]
    pub scorecard: bool,

    /// 超速告警webhook地址
    #[arg(long)]
    pub alert_webhook: Option<String>,

    /// 启用短信告警 (凭据取自TCS_SMS_*环境变量)
    #[arg(long, default_value_t = false)]
    pub sms: bool,

    /// 保存标注帧
    #[arg(long, default_value_t = false)]
    pub annotate: bool,

    /// 标注字体文件 (TTF/OTF, 缺省只画框不写字)
    #[arg(long)]
    pub font: Option<String>,

    /// 输出目录
    #[arg(short, long, default_value = "output")]
    pub output_dir: String,
}

/// 相机标定配置
///
/// source_quad为像素坐标系中的监控梯形区,
/// 映射到 target_width_m × target_height_m 的路面矩形。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calibration {
    pub source_quad: [(f32, f32); 4],
    pub target_width_m: f32,
    pub target_height_m: f32,
    pub speed_limit_kmh: f32,
    pub fps: u32,
}

impl Default for Calibration {
    fn default() -> Self {
        // 缺省标定: 25m x 250m 监控区, 限速100 km/h
        Self {
            source_quad: [
                (1252.0, 787.0),
                (2298.0, 803.0),
                (5039.0, 2159.0),
                (-550.0, 2159.0),
            ],
            target_width_m: 25.0,
            target_height_m: 250.0,
            speed_limit_kmh: 100.0,
            fps: 30,
        }
    }
}

impl Calibration {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("读取标定文件失败: {}", path.display()))?;
        let cal: Calibration =
            serde_json::from_str(&raw).with_context(|| format!("标定文件格式错误: {}", path.display()))?;
        Ok(cal)
    }

    /// 路面目标矩形四角 (宽高各减1, 角点落在最后一格)
    pub fn target_quad(&self) -> [(f32, f32); 4] {
        let w = self.target_width_m - 1.0;
        let h = self.target_height_m - 1.0;
        [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)]
    }

    pub fn perspective(&self) -> Result<PerspectiveTransform> {
        PerspectiveTransform::from_quads(&self.source_quad, &self.target_quad())
    }

    pub fn zone(&self) -> PolygonZone {
        PolygonZone::new(self.source_quad.to_vec())
    }
}
