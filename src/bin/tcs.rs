/// 交通摄像分析 (Traffic Camera Scoring)
///
/// 运行流程:
/// 1. 输入线程: 帧读取 (独立工作线程, 检测滞后时丢帧)
/// 2. 检测线程: 车辆检测与追踪 (独立工作线程)
/// 3. 分析线程: 速度估计与违章聚合 (独立工作线程)
/// 4. 主线程:   事件消费 → 告警/暂存 → 统计/评分卡/报告
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use tcs_rs::alert::{AlertDispatcher, Alerter, ConsoleAlerter, SmsAlerter, WebhookAlerter};
use tcs_rs::analysis::{PerformanceScores, SpeedEstimator, TrafficAnalyzer};
use tcs_rs::annotate::Annotator;
use tcs_rs::detection::{ensure_model, DetectorConfig, VehicleDetector, INF_SIZE};
use tcs_rs::pipeline::{
    AnalysisEvent, AnalyzeStage, FrameSource, ImageSequenceSource, Pipeline, PipelineConfig,
};
use tcs_rs::scorecard::{local_scorecard, ScorecardClient, ScorecardConfig};
use tcs_rs::storage::{
    local::export_run, AnalyticsRecord, DeliveryQueue, MongoStore, ScorecardRecord,
    StatisticsRecord, StorageRecord, ViolationRecord,
};
use tcs_rs::{gen_analysis_id, Args, Calibration};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> Result<()> {
    let args = Args::parse();

    let analysis_id = gen_analysis_id();
    println!("🚀 交通摄像分析系统启动");
    println!("📋 分析批次: {}", analysis_id);

    // ========== 标定 ==========
    let calibration = match &args.calibration {
        Some(path) => Calibration::load(path)?,
        None => {
            println!("⚠️  未指定标定文件, 使用内置标定");
            Calibration::default()
        }
    };
    let perspective = calibration.perspective()?;
    let zone = calibration.zone();
    println!(
        "📐 监控区: {}m x {}m, 限速 {} km/h, {} fps",
        calibration.target_width_m,
        calibration.target_height_m,
        calibration.speed_limit_kmh,
        calibration.fps
    );

    // ========== 检测模型 ==========
    let model_path = resolve_model_path(&args.model);
    ensure_model(&model_path, args.model_url.as_deref())?;
    let detector = VehicleDetector::new(DetectorConfig {
        model: model_path,
        conf: args.confidence_threshold,
        iou: args.iou_threshold,
        inf_size: INF_SIZE,
        vehicles_only: true,
    })?;

    // ========== 输入源 ==========
    let source = build_source(&args.source)?;

    // ========== 输出与存储 ==========
    let out_dir = PathBuf::from(&args.output_dir).join(&analysis_id);
    std::fs::create_dir_all(&out_dir)?;

    // 暂存区跨运行共享, 上次未投递的记录可在本次补投
    let mut queue = DeliveryQueue::open(PathBuf::from(&args.output_dir).join("spool"))?;
    if queue.pending() > 0 {
        println!("📦 暂存区有 {} 条历史记录待投递", queue.pending());
    }

    let mut mongo = match &args.mongodb_uri {
        Some(uri) => match MongoStore::connect(uri) {
            Ok(store) => Some(store),
            Err(e) => {
                eprintln!("⚠️  MongoDB连接失败, 数据保留在暂存区: {:#}", e);
                None
            }
        },
        None => None,
    };

    // ========== 告警通道 ==========
    let mut alerters: Vec<Box<dyn Alerter>> = vec![Box::new(ConsoleAlerter)];
    if let Some(url) = &args.alert_webhook {
        alerters.push(Box::new(WebhookAlerter::new(url.clone())));
    }
    if args.sms {
        match SmsAlerter::from_env() {
            Ok(sms) => alerters.push(Box::new(sms)),
            Err(e) => eprintln!("⚠️  短信告警未启用: {:#}", e),
        }
    }
    let mut dispatcher = AlertDispatcher::new(alerters);
    println!("🔔 告警通道: {} 个", dispatcher.channel_count());

    // ========== 标注输出 ==========
    let annotator = if args.annotate {
        Some(Annotator::new(
            out_dir.join("frames"),
            args.font.as_deref().map(Path::new),
            calibration.speed_limit_kmh,
        )?)
    } else {
        None
    };

    // ========== 流水线 ==========
    let stage = AnalyzeStage::new(
        TrafficAnalyzer::new(&analysis_id),
        SpeedEstimator::new(calibration.fps),
        perspective,
        zone,
        calibration.speed_limit_kmh,
        annotator,
    );
    let pipeline = Pipeline::spawn(source, Box::new(detector), stage, PipelineConfig::default());
    println!("🎯 开始处理...");

    // ========== 事件循环 ==========
    let speed_limit = calibration.speed_limit_kmh;
    for event in pipeline.events.iter() {
        match event {
            AnalysisEvent::Violation {
                violation,
                speeding,
            } => {
                queue.append(StorageRecord::Violation(ViolationRecord::from_violation(
                    &analysis_id,
                    &violation,
                    speed_limit,
                )))?;
                if speeding {
                    dispatcher.dispatch(&violation);
                }
            }
            AnalysisEvent::Tick(tick) => {
                queue.append(StorageRecord::Analytics(AnalyticsRecord::from_tick(
                    &analysis_id,
                    &tick,
                )))?;
            }
            AnalysisEvent::Progress {
                frame_id,
                vehicles,
                violations,
            } => {
                println!(
                    "📊 帧 {}: {} 辆车, {} 条违章",
                    frame_id, vehicles, violations
                );
            }
        }
    }

    let pipeline_stats = Arc::clone(&pipeline.stats);
    let analyzer = pipeline.join()?;
    let stats = analyzer.statistics();

    println!();
    println!("============================================================");
    println!("✅ 处理完成!");
    println!("============================================================");
    println!("📈 最终结果:");
    println!("   • 车辆总数: {}", stats.total_vehicles_detected);
    println!("   • 违章总数: {}", stats.total_unique_violations);
    println!("   • 最高速度: {} km/h", stats.max_speed);
    println!("   • 处理耗时: {:.2} 秒", stats.processing_duration);
    println!(
        "   • 帧统计: 解码 {} / 丢弃 {} ({:.1}%) / 处理 {}, 平均检测 {:.1} ms",
        pipeline_stats.decoded(),
        pipeline_stats.dropped(),
        pipeline_stats.drop_rate(),
        pipeline_stats.processed(),
        pipeline_stats.avg_detect_ms(100)
    );

    // ========== 收尾记录 ==========
    queue.append(StorageRecord::Analytics(AnalyticsRecord::completed(
        &analysis_id,
        pipeline_stats.processed(),
        stats.total_vehicles_detected,
        stats.total_unique_violations,
    )))?;
    queue.append(StorageRecord::Statistics(StatisticsRecord::from_stats(
        &stats,
    )))?;

    // ========== 评分卡 ==========
    let scorecard_text = if args.scorecard {
        let text = ScorecardClient::new(ScorecardConfig::default()).generate(&stats);
        queue.append(StorageRecord::Scorecard(ScorecardRecord::new(
            &stats,
            text.clone(),
        )))?;
        text
    } else {
        local_scorecard(&stats)
    };

    // ========== 云端投递 ==========
    match mongo.as_mut() {
        Some(store) => {
            println!("💾 投递数据到MongoDB Atlas...");
            let report = queue.flush_into(store)?;
            if report.remaining == 0 {
                println!("✅ 全部 {} 条记录已投递", report.delivered);
            } else {
                println!(
                    "⚠️  已投递 {} 条, {} 条滞留暂存区待补投",
                    report.delivered, report.remaining
                );
            }
        }
        None => {
            println!(
                "💾 未连接MongoDB, {} 条记录保留在暂存区",
                queue.pending()
            );
        }
    }

    // ========== 本地导出与报告 ==========
    export_run(
        out_dir.join(format!("traffic_data_{}.json", analysis_id)),
        &stats,
        analyzer.violations(),
    )?;
    let scores = PerformanceScores::from_stats(&stats);
    let paths = tcs_rs::report::write_reports(
        &out_dir,
        &stats,
        analyzer.violations(),
        &scores,
        &scorecard_text,
    )?;
    println!("💾 本地数据与报告已保存:");
    println!("   • {}", paths.summary_txt.display());
    println!("   • {}", paths.scorecard_txt.display());
    println!("   • {}", paths.report_html.display());

    println!();
    println!("🎉 全部任务完成!");
    Ok(())
}

/// 裸文件名且当前目录不存在时, 落到用户模型缓存目录
fn resolve_model_path(model: &str) -> PathBuf {
    let path = PathBuf::from(model);
    if !path.exists() && path.components().count() == 1 {
        return tcs_rs::detection::default_model_dir().join(model);
    }
    path
}

/// 根据source参数构造帧源
fn build_source(source: &str) -> Result<Box<dyn FrameSource>> {
    #[cfg(feature = "video")]
    {
        let is_stream = source.starts_with("rtsp://") || source.starts_with("rtmp://");
        let is_video_file = Path::new(source)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                matches!(
                    e.to_lowercase().as_str(),
                    "mp4" | "avi" | "mkv" | "mov" | "flv" | "ts"
                )
            })
            .unwrap_or(false);
        if is_stream || is_video_file {
            println!("📹 视频源: {}", source);
            return Ok(Box::new(tcs_rs::pipeline::source::video::VideoSource::open(source)?));
        }
    }

    println!("🖼️  帧序列目录: {}", source);
    Ok(Box::new(ImageSequenceSource::new(source)?))
}
