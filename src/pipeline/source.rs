//! 帧输入源
//! Frame sources for the analysis pipeline
//!
//! 缺省实现为图片序列目录 (按文件名中的数字序号排序);
//! 启用video特性后可用FFmpeg解码视频文件/RTSP流。

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::detection::DecodedFrame;

/// 帧源统一接口
pub trait FrameSource: Send {
    /// 取下一帧, 源耗尽时返回None
    fn next_frame(&mut self) -> Result<Option<DecodedFrame>>;

    /// 源的标称帧率 (未知时None)
    fn fps_hint(&self) -> Option<u32> {
        None
    }
}

/// 图片序列源: 按文件名内最后一段数字排序读取目录中的帧
pub struct ImageSequenceSource {
    files: Vec<PathBuf>,
    cursor: usize,
    next_frame_id: u64,
}

static FRAME_INDEX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)").unwrap());

const IMAGE_EXTS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

impl ImageSequenceSource {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("读取帧目录失败: {}", dir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| IMAGE_EXTS.contains(&e.to_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();

        if files.is_empty() {
            return Err(anyhow!("帧目录为空: {}", dir.display()));
        }

        // 数字序号排序: frame_2 在 frame_10 之前
        files.sort_by_key(|p| (frame_index(p), p.clone()));

        Ok(Self {
            files,
            cursor: 0,
            next_frame_id: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// 提取文件名中最后一段数字作为帧序号
fn frame_index(path: &Path) -> u64 {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    FRAME_INDEX_RE
        .captures_iter(stem)
        .last()
        .and_then(|c| c[1].parse::<u64>().ok())
        .unwrap_or(u64::MAX)
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<DecodedFrame>> {
        let path = match self.files.get(self.cursor) {
            Some(p) => p.clone(),
            None => return Ok(None),
        };
        self.cursor += 1;

        let img = image::open(&path)
            .with_context(|| format!("读取帧失败: {}", path.display()))?
            .to_rgb8();
        let (w, h) = img.dimensions();
        let frame = DecodedFrame::new(self.next_frame_id, w, h, img.into_raw());
        self.next_frame_id += 1;
        Ok(Some(frame))
    }
}

/// FFmpeg视频/RTSP源 (video特性)
#[cfg(feature = "video")]
pub mod video {
    use crossbeam_channel::{bounded, Receiver, Sender};
    use ez_ffmpeg::core::context::null_output::create_null_output;
    use ez_ffmpeg::filter::frame_filter::FrameFilter;
    use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
    use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
    use ez_ffmpeg::{AVMediaType, FfmpegContext, Frame};

    use super::*;

    /// FFmpeg解码过滤器: YUV420P帧 → RGB → 通道
    #[derive(Clone)]
    struct RgbDecodeFilter {
        tx: Sender<DecodedFrame>,
        count: u64,
    }

    impl FrameFilter for RgbDecodeFilter {
        fn media_type(&self) -> AVMediaType {
            AVMediaType::AVMEDIA_TYPE_VIDEO
        }

        fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
            println!("✅ 视频解码启动");
            Ok(())
        }

        fn filter_frame(
            &mut self,
            frame: Frame,
            _ctx: &FrameFilterContext,
        ) -> Result<Option<Frame>, String> {
            unsafe {
                if frame.as_ptr().is_null() {
                    return Ok(Some(frame));
                }

                let w = (*frame.as_ptr()).width as u32;
                let h = (*frame.as_ptr()).height as u32;
                let data_y = (*frame.as_ptr()).data[0];
                let data_u = (*frame.as_ptr()).data[1];
                let data_v = (*frame.as_ptr()).data[2];
                let y_stride = (*frame.as_ptr()).linesize[0] as usize;
                let uv_stride = (*frame.as_ptr()).linesize[1] as usize;

                // YUV420P → RGB (BT.601)
                let mut rgb = vec![0u8; (w * h) as usize * 3];
                for y in 0..h as usize {
                    for x in 0..w as usize {
                        let y_val = *data_y.add(y * y_stride + x) as f32;
                        let u_val = *data_u.add((y / 2) * uv_stride + x / 2) as f32 - 128.0;
                        let v_val = *data_v.add((y / 2) * uv_stride + x / 2) as f32 - 128.0;
                        let i = (y * w as usize + x) * 3;
                        rgb[i] = (y_val + 1.402 * v_val).clamp(0.0, 255.0) as u8;
                        rgb[i + 1] =
                            (y_val - 0.344 * u_val - 0.714 * v_val).clamp(0.0, 255.0) as u8;
                        rgb[i + 2] = (y_val + 1.772 * u_val).clamp(0.0, 255.0) as u8;
                    }
                }

                let decoded = DecodedFrame::new(self.count, w, h, rgb);
                self.count += 1;
                // 解码端不阻塞, 消费不及时直接丢弃 (背压由下游通道统一处理)
                let _ = self.tx.try_send(decoded);
            }
            Ok(Some(frame))
        }
    }

    /// 视频文件/RTSP帧源
    pub struct VideoSource {
        rx: Receiver<DecodedFrame>,
    }

    impl VideoSource {
        pub fn open(url: &str) -> Result<Self> {
            let (tx, rx) = bounded(8);
            let filter = RgbDecodeFilter { tx, count: 0 };

            let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
            let pipe = pipe.filter("decode", Box::new(filter));
            let out = create_null_output().add_frame_pipeline(pipe);

            let ctx = FfmpegContext::builder()
                .input(url)
                .filter_desc("format=yuv420p")
                .output(out)
                .build()
                .map_err(|e| anyhow!("构建FFmpeg上下文失败: {}", e))?;
            let scheduler = ctx.start().map_err(|e| anyhow!("启动解码失败: {}", e))?;

            // 解码在FFmpeg调度器线程内运行, 等待结束的职责留给后台线程
            std::thread::spawn(move || {
                let _ = scheduler.wait();
                println!("✅ 视频解码结束");
            });

            Ok(Self { rx })
        }
    }

    impl FrameSource for VideoSource {
        fn next_frame(&mut self) -> Result<Option<DecodedFrame>> {
            Ok(self.rx.recv().ok())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_frames(dir: &Path, names: &[&str]) {
        std::fs::create_dir_all(dir).unwrap();
        for name in names {
            let img = image::RgbImage::from_pixel(4, 3, image::Rgb([10, 20, 30]));
            img.save(dir.join(name)).unwrap();
        }
    }

    #[test]
    fn test_numeric_ordering() {
        let dir = std::env::temp_dir().join("tcs-rs-test-frames-order");
        std::fs::remove_dir_all(&dir).ok();
        make_frames(&dir, &["frame_10.png", "frame_2.png", "frame_1.png"]);

        let src = ImageSequenceSource::new(&dir).unwrap();
        let names: Vec<String> = src
            .files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["frame_1.png", "frame_2.png", "frame_10.png"]);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_frames_decoded_in_sequence() {
        let dir = std::env::temp_dir().join("tcs-rs-test-frames-decode");
        std::fs::remove_dir_all(&dir).ok();
        make_frames(&dir, &["f1.png", "f2.png"]);

        let mut src = ImageSequenceSource::new(&dir).unwrap();
        let a = src.next_frame().unwrap().unwrap();
        assert_eq!(a.frame_id, 0);
        assert_eq!((a.width, a.height), (4, 3));
        assert_eq!(a.rgb_data.len(), 4 * 3 * 3);
        let b = src.next_frame().unwrap().unwrap();
        assert_eq!(b.frame_id, 1);
        assert!(src.next_frame().unwrap().is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_empty_dir_rejected() {
        let dir = std::env::temp_dir().join("tcs-rs-test-frames-empty");
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        assert!(ImageSequenceSource::new(&dir).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_non_images_ignored() {
        let dir = std::env::temp_dir().join("tcs-rs-test-frames-mixed");
        std::fs::remove_dir_all(&dir).ok();
        make_frames(&dir, &["f1.png"]);
        std::fs::write(dir.join("notes.txt"), "x").unwrap();
        let src = ImageSequenceSource::new(&dir).unwrap();
        assert_eq!(src.len(), 1);
        std::fs::remove_dir_all(&dir).ok();
    }
}
