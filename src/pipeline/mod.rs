/// 视频推理流水线 (Video inference pipeline)
///
/// 三线程架构, 通过有界通道通信:
/// - Source:  帧输入 (独立线程, 满载时丢帧)
/// - Detect:  检测+追踪 (独立线程)
/// - Analyze: 速度估计+违章聚合 (独立线程, 事件发往主线程)
///
/// 背压策略: 只有源→检测通道会丢帧 (try_send), 丢弃计入统计;
/// 已进入检测的帧保证送达聚合端, 事件按帧号非降序产生。
pub mod analyze;
pub mod detect;
pub mod source;
pub mod stats;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, TrySendError};
use serde::{Deserialize, Serialize};

use crate::analysis::{TrafficAnalyzer, Violation};
use crate::detection::{Detector, TrackedVehicle};

pub use analyze::AnalyzeStage;
pub use detect::DetectStage;
pub use source::{FrameSource, ImageSequenceSource};
pub use stats::{FrameRecord, PipelineStats};

// ========== 通道消息类型定义 ==========

/// 已追踪帧 (检测线程 → 分析线程)
#[derive(Clone)]
pub struct TrackedFrame {
    pub frame_id: u64,
    pub width: u32,
    pub height: u32,
    pub vehicles: Vec<TrackedVehicle>,
    /// 标注模式下携带原始帧数据
    pub rgb_data: Option<std::sync::Arc<Vec<u8>>>,
}

/// 周期性分析快照 (每50帧, 供云端real_time_analytics)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsTick {
    pub frame_id: u64,
    pub vehicles_detected: u32,
    pub violations_count: u32,
}

/// 分析事件 (分析线程 → 主线程)
#[derive(Debug, Clone)]
pub enum AnalysisEvent {
    /// 新记录的违章 (speeding: 是否超过限速)
    Violation { violation: Violation, speeding: bool },
    /// 每50帧一条的分析快照
    Tick(AnalyticsTick),
    /// 每100帧一条的进度信息
    Progress {
        frame_id: u64,
        vehicles: u32,
        violations: u32,
    },
}

/// 流水线配置
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 源→检测通道容量 (满载丢帧)
    pub frame_queue: usize,
    /// 检测→分析通道容量
    pub tracked_queue: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_queue: 4,
            tracked_queue: 8,
        }
    }
}

/// 运行中的流水线句柄
pub struct Pipeline {
    /// 分析事件流 (主线程消费)
    pub events: Receiver<AnalysisEvent>,
    /// 共享运行统计
    pub stats: Arc<PipelineStats>,

    source_handle: JoinHandle<()>,
    detect_handle: JoinHandle<()>,
    analyze_handle: JoinHandle<TrafficAnalyzer>,
}

impl Pipeline {
    /// 启动三级流水线
    pub fn spawn(
        mut source: Box<dyn FrameSource>,
        detector: Box<dyn Detector>,
        analyze: AnalyzeStage,
        config: PipelineConfig,
    ) -> Self {
        let stats = Arc::new(PipelineStats::new());
        let (tx_frames, rx_frames) = bounded(config.frame_queue.max(1));
        let (tx_tracked, rx_tracked) = bounded(config.tracked_queue.max(1));
        let (tx_events, rx_events) = unbounded();

        // ========== 源线程: 满载时丢帧 ==========
        let source_stats = Arc::clone(&stats);
        let keep_frames = analyze.wants_frames();
        let source_handle = std::thread::spawn(move || {
            loop {
                let frame = match source.next_frame() {
                    Ok(Some(frame)) => frame,
                    Ok(None) => break,
                    Err(e) => {
                        eprintln!("⚠️  帧读取失败: {:#}", e);
                        continue;
                    }
                };
                source_stats.frames_decoded.fetch_add(1, Ordering::Relaxed);

                match tx_frames.try_send(frame) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        let dropped =
                            source_stats.frames_dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        if dropped % 100 == 1 {
                            println!("⚠️  检测滞后, 已丢弃 {} 帧", dropped);
                        }
                    }
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
            // 通道随线程结束关闭, 下游陆续收尾
        });

        // ========== 检测线程 ==========
        let detect_stats = Arc::clone(&stats);
        let detect_handle = std::thread::spawn(move || {
            DetectStage::new(detector, keep_frames).run(rx_frames, tx_tracked, detect_stats);
        });

        // ========== 分析线程 ==========
        let analyze_handle = std::thread::spawn(move || analyze.run(rx_tracked, tx_events));

        Self {
            events: rx_events,
            stats,
            source_handle,
            detect_handle,
            analyze_handle,
        }
    }

    /// 等待全部线程结束, 返回聚合器
    pub fn join(self) -> Result<TrafficAnalyzer> {
        self.source_handle
            .join()
            .map_err(|_| anyhow!("源线程异常退出"))?;
        self.detect_handle
            .join()
            .map_err(|_| anyhow!("检测线程异常退出"))?;
        self.analyze_handle
            .join()
            .map_err(|_| anyhow!("分析线程异常退出"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SpeedEstimator;
    use crate::detection::{BBox, DecodedFrame};
    use crate::geometry::{PerspectiveTransform, PolygonZone};
    use anyhow::Result;

    /// 合成帧源: 产出N个固定尺寸空帧
    struct SyntheticSource {
        next: u64,
        total: u64,
        delay: Option<std::time::Duration>,
    }

    impl FrameSource for SyntheticSource {
        fn next_frame(&mut self) -> Result<Option<DecodedFrame>> {
            if self.next >= self.total {
                return Ok(None);
            }
            if let Some(d) = self.delay {
                std::thread::sleep(d);
            }
            let frame = DecodedFrame::new(self.next, 100, 100, vec![0u8; 100 * 100 * 3]);
            self.next += 1;
            Ok(Some(frame))
        }
    }

    /// 模拟检测器: 单辆车每帧沿Y前进固定像素
    struct MovingBoxDetector {
        step: f32,
        frame: f32,
        delay: Option<std::time::Duration>,
    }

    impl Detector for MovingBoxDetector {
        fn detect(&mut self, _frame: &DecodedFrame) -> Result<Vec<BBox>> {
            if let Some(d) = self.delay {
                std::thread::sleep(d);
            }
            let y = 5.0 + self.step * self.frame;
            self.frame += 1.0;
            Ok(vec![BBox {
                x1: 40.0,
                y1: y,
                x2: 60.0,
                y2: y + 10.0,
                confidence: 0.9,
                class_id: 2,
            }])
        }
    }

    /// 像素即米的单位标定 (100x100全图为监控区)
    fn unit_stage(fps: u32, speed_limit: f32) -> AnalyzeStage {
        let quad = [(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)];
        let perspective = PerspectiveTransform::from_quads(&quad, &quad).unwrap();
        let zone = PolygonZone::new(quad.to_vec());
        AnalyzeStage::new(
            TrafficAnalyzer::new("analysis_test"),
            SpeedEstimator::new(fps),
            perspective,
            zone,
            speed_limit,
            None,
        )
    }

    #[test]
    fn test_pipeline_end_to_end() {
        // 10fps, 每帧前进1m → 约36 km/h → 违章记录但不超速
        let source = SyntheticSource {
            next: 0,
            total: 30,
            delay: None,
        };
        let detector = MovingBoxDetector {
            step: 1.0,
            frame: 0.0,
            delay: None,
        };
        let pipeline = Pipeline::spawn(
            Box::new(source),
            Box::new(detector),
            unit_stage(10, 100.0),
            PipelineConfig {
                frame_queue: 64, // 足够大, 本测试不丢帧
                tracked_queue: 64,
            },
        );

        let events: Vec<AnalysisEvent> = pipeline.events.iter().collect();
        let analyzer = pipeline.join().unwrap();

        assert_eq!(analyzer.vehicles_seen(), 1);
        assert!(analyzer.total_violations() >= 1);

        let speeding = events.iter().any(|e| matches!(
            e,
            AnalysisEvent::Violation { speeding: true, .. }
        ));
        assert!(!speeding, "36 km/h should not be flagged as speeding");
    }

    #[test]
    fn test_pipeline_flags_speeding() {
        // 每帧前进3.5m @10fps → 约126 km/h → 超速
        let source = SyntheticSource {
            next: 0,
            total: 25,
            delay: None,
        };
        let detector = MovingBoxDetector {
            step: 3.5,
            frame: 0.0,
            delay: None,
        };
        let pipeline = Pipeline::spawn(
            Box::new(source),
            Box::new(detector),
            unit_stage(10, 100.0),
            PipelineConfig {
                frame_queue: 64,
                tracked_queue: 64,
            },
        );

        let events: Vec<AnalysisEvent> = pipeline.events.iter().collect();
        pipeline.join().unwrap();

        assert!(events.iter().any(|e| matches!(
            e,
            AnalysisEvent::Violation { speeding: true, .. }
        )));
    }

    #[test]
    fn test_backpressure_drops_frames() {
        // 源无延迟, 检测每帧2ms, 队列容量2 → 必然丢帧
        let source = SyntheticSource {
            next: 0,
            total: 200,
            delay: None,
        };
        let detector = MovingBoxDetector {
            step: 0.0,
            frame: 0.0,
            delay: Some(std::time::Duration::from_millis(2)),
        };
        let pipeline = Pipeline::spawn(
            Box::new(source),
            Box::new(detector),
            unit_stage(10, 100.0),
            PipelineConfig {
                frame_queue: 2,
                tracked_queue: 2,
            },
        );

        let stats = Arc::clone(&pipeline.stats);
        for _ in pipeline.events.iter() {}
        pipeline.join().unwrap();

        assert_eq!(stats.decoded(), 200);
        assert!(stats.dropped() > 0, "expected dropped frames under backpressure");
        // 守恒: 解码 = 丢弃 + 已处理
        assert_eq!(stats.decoded(), stats.dropped() + stats.processed());
    }

    #[test]
    fn test_events_frame_order() {
        let source = SyntheticSource {
            next: 0,
            total: 250,
            delay: None,
        };
        let detector = MovingBoxDetector {
            step: 0.0,
            frame: 0.0,
            delay: None,
        };
        let pipeline = Pipeline::spawn(
            Box::new(source),
            Box::new(detector),
            unit_stage(10, 100.0),
            PipelineConfig {
                frame_queue: 256,
                tracked_queue: 256,
            },
        );

        let mut last = 0u64;
        for event in pipeline.events.iter() {
            let frame_id = match event {
                AnalysisEvent::Tick(t) => t.frame_id,
                AnalysisEvent::Progress { frame_id, .. } => frame_id,
                AnalysisEvent::Violation { .. } => continue,
            };
            assert!(frame_id >= last, "events out of order: {} < {}", frame_id, last);
            last = frame_id;
        }
        pipeline.join().unwrap();
        assert!(last >= 200, "expected ticks past frame 200, got {}", last);
    }
}
