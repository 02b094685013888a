//! 分析阶段
//! Analysis stage: 速度估计 → 违章聚合 → 事件下发

use std::collections::HashMap;

use chrono::Utc;
use crossbeam_channel::{Receiver, Sender};

use super::{AnalysisEvent, AnalyticsTick, TrackedFrame};
use crate::analysis::{SpeedEstimator, TrafficAnalyzer};
use crate::annotate::Annotator;
use crate::geometry::{PerspectiveTransform, PolygonZone};

/// 周期常量: 每50帧存一条分析快照, 每100帧报一次进度
const TICK_INTERVAL: u64 = 50;
const PROGRESS_INTERVAL: u64 = 100;

pub struct AnalyzeStage {
    analyzer: TrafficAnalyzer,
    speed: SpeedEstimator,
    perspective: PerspectiveTransform,
    zone: PolygonZone,
    speed_limit: f32,
    annotator: Option<Annotator>,
}

impl AnalyzeStage {
    pub fn new(
        analyzer: TrafficAnalyzer,
        speed: SpeedEstimator,
        perspective: PerspectiveTransform,
        zone: PolygonZone,
        speed_limit: f32,
        annotator: Option<Annotator>,
    ) -> Self {
        Self {
            analyzer,
            speed,
            perspective,
            zone,
            speed_limit,
            annotator,
        }
    }

    /// 标注模式需要检测阶段透传帧数据
    pub fn wants_frames(&self) -> bool {
        self.annotator.is_some()
    }

    pub fn run(mut self, rx_tracked: Receiver<TrackedFrame>, tx_events: Sender<AnalysisEvent>) -> TrafficAnalyzer {
        println!("📊 分析线程启动");

        for tf in rx_tracked.iter() {
            let mut speeds: HashMap<u32, f32> = HashMap::new();
            let mut live_ids: Vec<u32> = Vec::with_capacity(tf.vehicles.len());

            for vehicle in &tf.vehicles {
                live_ids.push(vehicle.id);
                let class = vehicle.class_name();
                let (ax, ay) = vehicle.anchor();
                let in_zone = self.zone.contains(ax, ay);
                self.analyzer.record_vehicle(vehicle.id, class, in_zone);
                if !in_zone {
                    continue;
                }

                // 底边中点 → 路面坐标, 仅纵向位移参与测速
                let (_, road_y) = self.perspective.transform_point(ax, ay);
                if let Some(speed_kmh) = self.speed.observe(vehicle.id, road_y) {
                    speeds.insert(vehicle.id, speed_kmh);
                    if let Some(violation) =
                        self.analyzer
                            .record_violation(vehicle.id, class, speed_kmh, Utc::now())
                    {
                        let speeding = speed_kmh > self.speed_limit;
                        let _ = tx_events.send(AnalysisEvent::Violation { violation, speeding });
                    }
                }
            }

            // 消亡轨迹的测速缓冲随之释放
            self.speed.retain(&live_ids);

            if let Some(annotator) = &self.annotator {
                if let Err(e) = annotator.save_annotated(&tf, &speeds) {
                    eprintln!("⚠️  标注帧保存失败 (frame {}): {:#}", tf.frame_id, e);
                }
            }

            if tf.frame_id > 0 && tf.frame_id % TICK_INTERVAL == 0 {
                let _ = tx_events.send(AnalysisEvent::Tick(AnalyticsTick {
                    frame_id: tf.frame_id,
                    vehicles_detected: self.analyzer.vehicles_seen(),
                    violations_count: self.analyzer.total_violations(),
                }));
            }
            if tf.frame_id > 0 && tf.frame_id % PROGRESS_INTERVAL == 0 {
                let _ = tx_events.send(AnalysisEvent::Progress {
                    frame_id: tf.frame_id,
                    vehicles: self.analyzer.vehicles_seen(),
                    violations: self.analyzer.total_violations(),
                });
            }
        }

        println!("✅ 分析线程结束");
        self.analyzer
    }
}
