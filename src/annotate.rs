//! 帧标注输出
//! Annotated frame rendering
//!
//! 画出追踪框/轨迹/速度标签并存为图片序列。
//! 字体文件未配置时只画框与轨迹, 不写文字。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::pipeline::TrackedFrame;

pub struct Annotator {
    out_dir: PathBuf,
    font: Option<FontVec>,
    speed_limit: f32,
}

impl Annotator {
    pub fn new(out_dir: impl Into<PathBuf>, font_path: Option<&Path>, speed_limit: f32) -> Result<Self> {
        let out_dir = out_dir.into();
        std::fs::create_dir_all(&out_dir)
            .with_context(|| format!("创建标注输出目录失败: {}", out_dir.display()))?;

        let font = match font_path {
            Some(path) => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("读取字体失败: {}", path.display()))?;
                Some(FontVec::try_from_vec(bytes).map_err(|_| anyhow!("字体文件无效"))?)
            }
            None => None,
        };

        Ok(Self {
            out_dir,
            font,
            speed_limit,
        })
    }

    /// 渲染标注图像
    pub fn render(&self, tf: &TrackedFrame, speeds: &HashMap<u32, f32>) -> Result<RgbImage> {
        let rgb = tf
            .rgb_data
            .as_ref()
            .ok_or_else(|| anyhow!("帧数据未透传, 无法标注"))?;
        let mut img = RgbImage::from_raw(tf.width, tf.height, rgb.as_ref().clone())
            .ok_or_else(|| anyhow!("帧尺寸与数据长度不符"))?;

        for vehicle in &tf.vehicles {
            let color = Rgb([vehicle.color.0, vehicle.color.1, vehicle.color.2]);
            let b = &vehicle.bbox;
            let x = b.x1.max(0.0) as i32;
            let y = b.y1.max(0.0) as i32;
            let w = b.width().max(1.0) as u32;
            let h = b.height().max(1.0) as u32;
            draw_hollow_rect_mut(&mut img, Rect::at(x, y).of_size(w, h), color);

            // 轨迹点
            for point in &vehicle.trajectory {
                draw_filled_circle_mut(&mut img, (point.x as i32, point.y as i32), 2, color);
            }

            if let Some(font) = &self.font {
                let mut label = format!("#{} {}", vehicle.id, vehicle.class_name());
                if let Some(speed) = speeds.get(&vehicle.id) {
                    label.push_str(&format!(" {} km/h", *speed as u32));
                    if *speed > self.speed_limit {
                        label.push_str(" !!");
                    }
                }
                let ty = (y - 14).max(0);
                draw_text_mut(
                    &mut img,
                    color,
                    x,
                    ty,
                    PxScale::from(14.0),
                    font,
                    &label,
                );
            }
        }

        Ok(img)
    }

    /// 渲染并保存为 frame_XXXXXX.jpg
    pub fn save_annotated(&self, tf: &TrackedFrame, speeds: &HashMap<u32, f32>) -> Result<PathBuf> {
        let img = self.render(tf, speeds)?;
        let path = self.out_dir.join(format!("frame_{:06}.jpg", tf.frame_id));
        img.save(&path)
            .with_context(|| format!("保存标注帧失败: {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::tracker::{id_to_color, TrackPoint, TrackedVehicle};
    use crate::detection::BBox;
    use std::sync::Arc;

    fn tracked_frame(with_data: bool) -> TrackedFrame {
        let vehicle = TrackedVehicle {
            id: 1,
            bbox: BBox {
                x1: 10.0,
                y1: 10.0,
                x2: 30.0,
                y2: 25.0,
                confidence: 0.9,
                class_id: 2,
            },
            class_id: 2,
            trajectory: vec![TrackPoint { x: 20.0, y: 25.0 }],
            frames_lost: 0,
            color: id_to_color(1),
            total_frames: 5,
            score: 0.9,
        };
        TrackedFrame {
            frame_id: 7,
            width: 64,
            height: 48,
            vehicles: vec![vehicle],
            rgb_data: with_data.then(|| Arc::new(vec![0u8; 64 * 48 * 3])),
        }
    }

    #[test]
    fn test_render_draws_box() {
        let dir = std::env::temp_dir().join("tcs-rs-test-annotate-render");
        let annotator = Annotator::new(&dir, None, 100.0).unwrap();
        let img = annotator.render(&tracked_frame(true), &HashMap::new()).unwrap();
        // 框线上的像素不再是全黑
        let p = img.get_pixel(10, 10);
        assert_ne!(p.0, [0, 0, 0]);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_save_annotated_writes_file() {
        let dir = std::env::temp_dir().join("tcs-rs-test-annotate-save");
        std::fs::remove_dir_all(&dir).ok();
        let annotator = Annotator::new(&dir, None, 100.0).unwrap();
        let path = annotator
            .save_annotated(&tracked_frame(true), &HashMap::new())
            .unwrap();
        assert!(path.exists());
        assert!(path.file_name().unwrap().to_string_lossy().contains("000007"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_render_without_frame_data_fails() {
        let dir = std::env::temp_dir().join("tcs-rs-test-annotate-nodata");
        let annotator = Annotator::new(&dir, None, 100.0).unwrap();
        assert!(annotator.render(&tracked_frame(false), &HashMap::new()).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_font_rejected() {
        let dir = std::env::temp_dir().join("tcs-rs-test-annotate-font");
        let missing = Path::new("/no/such/font.ttf");
        assert!(Annotator::new(&dir, Some(missing), 100.0).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }
}
