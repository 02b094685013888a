//! 流水线运行统计
//!
//! 计数器为原子变量, 各阶段无锁更新;
//! 逐帧记录写入跳表台账, 消费端按帧号区间读取最近若干帧。

use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_skiplist::SkipMap;

/// 台账保留的最大帧数
const LEDGER_CAP: usize = 256;

/// 单帧处理记录
#[derive(Debug, Clone)]
pub struct FrameRecord {
    pub vehicles: u32,
    pub detect_ms: f64,
}

/// 流水线统计 (各线程共享)
pub struct PipelineStats {
    /// 源端产出帧数
    pub frames_decoded: AtomicU64,
    /// 因背压被丢弃的帧数
    pub frames_dropped: AtomicU64,
    /// 检测阶段消费的帧数
    pub frames_processed: AtomicU64,
    /// 检测失败帧数 (含在frames_processed内)
    pub detect_failures: AtomicU64,

    ledger: SkipMap<u64, FrameRecord>,
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            frames_decoded: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            frames_processed: AtomicU64::new(0),
            detect_failures: AtomicU64::new(0),
            ledger: SkipMap::new(),
        }
    }

    pub fn record_frame(&self, frame_id: u64, record: FrameRecord) {
        self.ledger.insert(frame_id, record);
        while self.ledger.len() > LEDGER_CAP {
            if let Some(entry) = self.ledger.front() {
                entry.remove();
            } else {
                break;
            }
        }
    }

    /// 最近n帧的记录 (帧号升序)
    pub fn recent(&self, n: u64) -> Vec<(u64, FrameRecord)> {
        let back = match self.ledger.back() {
            Some(e) => *e.key(),
            None => return Vec::new(),
        };
        let lo = back.saturating_sub(n.saturating_sub(1));
        self.ledger
            .range((Bound::Included(lo), Bound::Unbounded))
            .map(|e| (*e.key(), e.value().clone()))
            .collect()
    }

    /// 最近n帧的平均检测耗时 (ms)
    pub fn avg_detect_ms(&self, n: u64) -> f64 {
        let recent = self.recent(n);
        if recent.is_empty() {
            return 0.0;
        }
        recent.iter().map(|(_, r)| r.detect_ms).sum::<f64>() / recent.len() as f64
    }

    pub fn decoded(&self) -> u64 {
        self.frames_decoded.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    pub fn processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.detect_failures.load(Ordering::Relaxed)
    }

    /// 丢帧率 (%)
    pub fn drop_rate(&self) -> f64 {
        let decoded = self.decoded();
        if decoded == 0 {
            return 0.0;
        }
        self.dropped() as f64 / decoded as f64 * 100.0
    }
}
