//! 车辆检测器
//! Vehicle detector: YOLOv8 ONNX inference (ort)

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use fast_image_resize::images::Image;
use fast_image_resize::{PixelType, Resizer};
use ndarray::{Array, Axis, IxDyn};
use once_cell::sync::Lazy;
use ort::{GraphOptimizationLevel, Session};
use regex::Regex;

use super::types::{class_name, BBox, DecodedFrame};
use crate::non_max_suppression;

/// 检测器统一接口 (流水线通过该trait解耦具体推理引擎)
pub trait Detector: Send {
    /// 对单帧执行检测, 返回过滤后的检测框 (原图坐标系)
    fn detect(&mut self, frame: &DecodedFrame) -> Result<Vec<BBox>>;
}

/// 检测器配置
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// ONNX模型路径
    pub model: PathBuf,
    /// 置信度阈值
    pub conf: f32,
    /// NMS IOU阈值
    pub iou: f32,
    /// 推理输入边长 (正方形letterbox)
    pub inf_size: u32,
    /// 仅保留车辆类别
    pub vehicles_only: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model: PathBuf::from("models/yolov8s.onnx"),
            conf: 0.3,
            iou: 0.7,
            inf_size: super::types::INF_SIZE,
            vehicles_only: true,
        }
    }
}

/// YOLOv8 ONNX 检测器
pub struct VehicleDetector {
    session: Session,
    input_name: String,
    output_name: String,
    nc: u32,
    names: Vec<String>,
    config: DetectorConfig,
    resizer: Resizer,
}

// ONNX元数据中的names形如 {0: 'person', 1: 'bicycle', ...}
static NAMES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(\d+):\s*'([^']*)'"#).unwrap());

impl VehicleDetector {
    pub fn new(config: DetectorConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(num_threads())?
            .commit_from_file(&config.model)
            .with_context(|| format!("加载模型失败: {}", config.model.display()))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| anyhow!("模型没有输入节点"))?;
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| anyhow!("模型没有输出节点"))?;

        // 从模型元数据读取类别名, 失败时退回内置COCO表
        let names: Vec<String> = match session.metadata().ok().and_then(|m| m.custom("names").ok().flatten()) {
            Some(raw) => {
                let mut parsed: Vec<(u32, String)> = NAMES_RE
                    .captures_iter(&raw)
                    .filter_map(|c| {
                        let id = c[1].parse::<u32>().ok()?;
                        Some((id, c[2].to_string()))
                    })
                    .collect();
                parsed.sort_by_key(|(id, _)| *id);
                parsed.into_iter().map(|(_, n)| n).collect()
            }
            None => (0..80).map(|id| class_name(id).to_string()).collect(),
        };
        let nc = names.len() as u32;

        println!(
            "✅ 检测模型加载成功: {} (nc={}, conf={}, iou={})",
            config.model.display(),
            nc,
            config.conf,
            config.iou
        );

        Ok(Self {
            session,
            input_name,
            output_name,
            nc,
            names,
            config,
            resizer: Resizer::new(),
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// letterbox预处理: 等比缩放后贴入正方形画布 (NCHW, f32, 0~1)
    fn preprocess(&mut self, frame: &DecodedFrame) -> Result<(Array<f32, IxDyn>, f32)> {
        let size = self.config.inf_size;
        let (w0, h0) = (frame.width as f32, frame.height as f32);
        let ratio = (size as f32 / w0).min(size as f32 / h0);
        let (w_new, h_new) = (
            ((w0 * ratio).round() as u32).clamp(1, size),
            ((h0 * ratio).round() as u32).clamp(1, size),
        );

        let src = Image::from_vec_u8(
            frame.width,
            frame.height,
            frame.rgb_data.as_ref().clone(),
            PixelType::U8x3,
        )?;
        let mut dst = Image::new(w_new, h_new, PixelType::U8x3);
        self.resizer.resize(&src, &mut dst, None)?;

        // 画布底色 144/255 灰
        let mut xs = Array::ones((1, 3, size as usize, size as usize)).into_dyn();
        xs.fill(144.0 / 255.0);
        let buf = dst.buffer();
        for y in 0..h_new as usize {
            for x in 0..w_new as usize {
                let i = (y * w_new as usize + x) * 3;
                xs[[0, 0, y, x]] = buf[i] as f32 / 255.0;
                xs[[0, 1, y, x]] = buf[i + 1] as f32 / 255.0;
                xs[[0, 2, y, x]] = buf[i + 2] as f32 / 255.0;
            }
        }
        Ok((xs, ratio))
    }

    /// 解析YOLOv8输出 [1, 4+nc, anchors] → 原图坐标检测框
    fn postprocess(
        &self,
        preds: &Array<f32, IxDyn>,
        ratio: f32,
        frame_w: f32,
        frame_h: f32,
    ) -> Vec<BBox> {
        const CXYWH_OFFSET: usize = 4;
        let mut boxes = Vec::new();

        for anchor in preds.axis_iter(Axis(0)) {
            for pred in anchor.axis_iter(Axis(1)) {
                let clss = pred
                    .iter()
                    .skip(CXYWH_OFFSET)
                    .take(self.nc as usize)
                    .copied()
                    .enumerate()
                    .reduce(|max, x| if x.1 > max.1 { x } else { max });
                let (id, confidence) = match clss {
                    Some(v) => v,
                    None => continue,
                };
                if confidence < self.config.conf {
                    continue;
                }

                let cx = pred[0] / ratio;
                let cy = pred[1] / ratio;
                let w = pred[2] / ratio;
                let h = pred[3] / ratio;
                let bbox = BBox {
                    x1: (cx - w / 2.0).clamp(0.0, frame_w),
                    y1: (cy - h / 2.0).clamp(0.0, frame_h),
                    x2: (cx + w / 2.0).clamp(0.0, frame_w),
                    y2: (cy + h / 2.0).clamp(0.0, frame_h),
                    confidence,
                    class_id: id as u32,
                };
                if self.config.vehicles_only && !bbox.is_vehicle() {
                    continue;
                }
                boxes.push(bbox);
            }
        }

        non_max_suppression(&mut boxes, self.config.iou);
        boxes
    }
}

impl Detector for VehicleDetector {
    fn detect(&mut self, frame: &DecodedFrame) -> Result<Vec<BBox>> {
        let (xs, ratio) = self.preprocess(frame)?;
        let preds: Array<f32, IxDyn> = {
            let outputs = self
                .session
                .run(ort::inputs![self.input_name.as_str() => xs.view()]?)?;
            let value = &outputs[self.output_name.as_str()];

            // fp32优先, fp16模型降级转换
            match value.try_extract_tensor::<f32>() {
                Ok(t) => t.into_owned(),
                Err(_) => value.try_extract_tensor::<half::f16>()?.mapv(f32::from),
            }
        };

        Ok(self.postprocess(&preds, ratio, frame.width as f32, frame.height as f32))
    }
}

fn num_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(8)
}

/// 模型不存在时从给定URL下载到目标路径
pub fn ensure_model(path: &Path, url: Option<&str>) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    let url = url.ok_or_else(|| {
        anyhow!(
            "模型文件不存在且未提供下载地址: {}",
            path.display()
        )
    })?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    println!("⬇️  下载模型: {} → {}", url, path.display());

    let resp = ureq::get(url).call().context("模型下载请求失败")?;
    let mut reader = resp.into_reader();
    let tmp = path.with_extension("part");
    let mut file = std::fs::File::create(&tmp)?;
    std::io::copy(&mut reader, &mut file)?;
    std::fs::rename(&tmp, path)?;
    println!("✅ 模型下载完成");
    Ok(())
}

/// 默认模型缓存目录: ~/.cache/tcs-rs/models
pub fn default_model_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tcs-rs")
        .join("models")
}
