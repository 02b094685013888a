//! 检测阶段
//! Detection stage: 订阅DecodedFrame → 检测+追踪 → 发送TrackedFrame

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};

use super::stats::{FrameRecord, PipelineStats};
use super::TrackedFrame;
use crate::detection::{ByteTracker, DecodedFrame, Detector};

pub struct DetectStage {
    detector: Box<dyn Detector>,
    tracker: ByteTracker,
    /// 标注模式下向下游透传原始帧数据
    keep_frames: bool,
}

impl DetectStage {
    pub fn new(detector: Box<dyn Detector>, keep_frames: bool) -> Self {
        Self {
            detector,
            tracker: ByteTracker::new(),
            keep_frames,
        }
    }

    pub fn run(
        mut self,
        rx_frames: Receiver<DecodedFrame>,
        tx_tracked: Sender<TrackedFrame>,
        stats: Arc<PipelineStats>,
    ) {
        println!("🔍 检测线程启动");

        while let Ok(frame) = rx_frames.recv() {
            let start = Instant::now();

            let boxes = match self.detector.detect(&frame) {
                Ok(boxes) => boxes,
                Err(e) => {
                    eprintln!("❌ 检测失败 (frame {}): {:#}", frame.frame_id, e);
                    stats.detect_failures.fetch_add(1, Ordering::Relaxed);
                    Vec::new() // 空检测仍推进追踪器, 轨迹正常老化
                }
            };

            let vehicles = self.tracker.update(&boxes).to_vec();
            let detect_ms = start.elapsed().as_secs_f64() * 1000.0;

            stats.frames_processed.fetch_add(1, Ordering::Relaxed);
            stats.record_frame(
                frame.frame_id,
                FrameRecord {
                    vehicles: vehicles.len() as u32,
                    detect_ms,
                },
            );

            let tracked = TrackedFrame {
                frame_id: frame.frame_id,
                width: frame.width,
                height: frame.height,
                vehicles,
                rgb_data: if self.keep_frames {
                    Some(Arc::clone(&frame.rgb_data))
                } else {
                    None
                },
            };
            if tx_tracked.send(tracked).is_err() {
                break; // 下游已关闭
            }
        }

        println!("✅ 检测线程结束 (共处理 {} 帧)", stats.processed());
    }
}
