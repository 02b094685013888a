//! 磁盘暂存队列 (至少一次投递)
//!
//! 记录以JSONL追加写入spool文件, 已投递条数持久化在cursor文件。
//! 游标只在落点确认后推进, 崩溃后从游标处重放 —— 允许重复, 不允许丢失。
//! 每条记录带单调递增seq, 下游可按(analysis_id, seq)幂等去重。

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{StorageRecord, StorageSink};

const SPOOL_FILE: &str = "spool.jsonl";
const CURSOR_FILE: &str = "spool.cursor";

/// 违章批量投递的批大小
const VIOLATION_BATCH: usize = 50;

/// 暂存条目
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    seq: u64,
    record: StorageRecord,
}

/// 一次冲刷的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    /// 本次确认投递的记录数
    pub delivered: usize,
    /// 仍滞留在暂存区的记录数
    pub remaining: usize,
}

/// 磁盘暂存队列
pub struct DeliveryQueue {
    dir: PathBuf,
    /// 当前spool文件首行对应的seq (压缩后推进, 保证seq跨压缩单调)
    base_seq: u64,
    /// 当前spool文件内的总行数
    appended: u64,
    /// 当前spool文件内已确认投递的行数
    cursor: u64,
    /// 投递失败时的最大重试次数
    max_retries: u32,
    /// 重试退避基准
    base_backoff: Duration,
}

impl DeliveryQueue {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("创建暂存目录失败: {}", dir.display()))?;

        let appended = count_lines(&dir.join(SPOOL_FILE))?;
        let (cursor, base_seq) = read_cursor(&dir.join(CURSOR_FILE))?;
        let cursor = cursor.min(appended);

        Ok(Self {
            dir,
            base_seq,
            appended,
            cursor,
            max_retries: 3,
            base_backoff: Duration::from_millis(200),
        })
    }

    /// 测试/低延迟场景下调整重试参数
    pub fn with_retry(mut self, max_retries: u32, base_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_backoff = base_backoff;
        self
    }

    /// 追加一条记录, 返回其seq
    pub fn append(&mut self, record: StorageRecord) -> Result<u64> {
        let seq = self.base_seq + self.appended;
        let envelope = Envelope { seq, record };
        let line = serde_json::to_string(&envelope)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(SPOOL_FILE))?;
        writeln!(file, "{}", line)?;
        file.flush()?;

        self.appended += 1;
        Ok(seq)
    }

    /// 未投递记录数
    pub fn pending(&self) -> u64 {
        self.appended - self.cursor
    }

    /// 将待投递记录冲刷到落点
    ///
    /// 违章记录按连续段分批 (≤50), 其余逐条。
    /// 每批投递成功后才持久化游标; 某批重试耗尽则中止,
    /// 剩余记录留在暂存区等待下次冲刷。
    pub fn flush_into(&mut self, sink: &mut dyn StorageSink) -> Result<FlushReport> {
        let pending = self.load_pending()?;
        if pending.is_empty() {
            return Ok(FlushReport {
                delivered: 0,
                remaining: 0,
            });
        }

        let mut delivered = 0usize;
        let mut idx = 0usize;
        while idx < pending.len() {
            // 连续违章记录聚成一批
            let chunk_len = if pending[idx].record.is_violation() {
                pending[idx..]
                    .iter()
                    .take_while(|e| e.record.is_violation())
                    .take(VIOLATION_BATCH)
                    .count()
            } else {
                1
            };
            let chunk: Vec<StorageRecord> = pending[idx..idx + chunk_len]
                .iter()
                .map(|e| e.record.clone())
                .collect();

            if !self.deliver_with_retry(sink, &chunk) {
                eprintln!(
                    "⚠️  投递到 {} 失败, {} 条记录滞留暂存区",
                    sink.name(),
                    pending.len() - idx
                );
                break;
            }

            idx += chunk_len;
            delivered += chunk_len;
            self.cursor += chunk_len as u64;
            self.persist_cursor()?;
        }

        // 全部投递完成后压缩暂存文件
        if self.cursor == self.appended {
            self.compact()?;
        }

        Ok(FlushReport {
            delivered,
            remaining: self.pending() as usize,
        })
    }

    fn deliver_with_retry(&self, sink: &mut dyn StorageSink, chunk: &[StorageRecord]) -> bool {
        for attempt in 0..=self.max_retries {
            let result = if chunk.len() == 1 {
                sink.deliver(&chunk[0])
            } else {
                sink.deliver_batch(chunk)
            };
            match result {
                Ok(()) => return true,
                Err(e) => {
                    if attempt == self.max_retries {
                        eprintln!("❌ 投递失败 (已重试{}次): {:#}", attempt, e);
                        return false;
                    }
                    // 指数退避 + 抖动
                    let backoff = self.base_backoff * 2u32.pow(attempt);
                    let jitter = rand::thread_rng().gen_range(0..=backoff.as_millis() as u64 / 2);
                    std::thread::sleep(backoff + Duration::from_millis(jitter));
                }
            }
        }
        false
    }

    fn load_pending(&self) -> Result<Vec<Envelope>> {
        let path = self.dir.join(SPOOL_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&path)?);
        let mut pending = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if (i as u64) < self.cursor || line.trim().is_empty() {
                continue;
            }
            let envelope: Envelope = serde_json::from_str(&line)
                .with_context(|| format!("暂存记录损坏 (行{})", i + 1))?;
            pending.push(envelope);
        }
        Ok(pending)
    }

    fn persist_cursor(&self) -> Result<()> {
        std::fs::write(
            self.dir.join(CURSOR_FILE),
            format!("{} {}", self.cursor, self.base_seq),
        )?;
        Ok(())
    }

    fn compact(&mut self) -> Result<()> {
        std::fs::write(self.dir.join(SPOOL_FILE), "")?;
        self.base_seq += self.appended;
        self.appended = 0;
        self.cursor = 0;
        self.persist_cursor()?;
        Ok(())
    }
}

fn count_lines(path: &PathBuf) -> Result<u64> {
    if !path.exists() {
        return Ok(0);
    }
    let reader = BufReader::new(File::open(path)?);
    Ok(reader
        .lines()
        .filter_map(|l| l.ok())
        .filter(|l| !l.trim().is_empty())
        .count() as u64)
}

/// cursor文件格式: "{已投递行数} {首行seq}"
fn read_cursor(path: &PathBuf) -> Result<(u64, u64)> {
    if !path.exists() {
        return Ok((0, 0));
    }
    let raw = std::fs::read_to_string(path)?;
    let mut parts = raw.split_whitespace();
    let cursor = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let base_seq = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    Ok((cursor, base_seq))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::AnalyticsRecord;

    /// 内存落点: 记录每次投递的批大小
    struct MemorySink {
        records: Vec<StorageRecord>,
        batch_sizes: Vec<usize>,
    }

    impl MemorySink {
        fn new() -> Self {
            Self {
                records: Vec::new(),
                batch_sizes: Vec::new(),
            }
        }
    }

    impl StorageSink for MemorySink {
        fn name(&self) -> &str {
            "memory"
        }

        fn deliver(&mut self, record: &StorageRecord) -> Result<()> {
            self.batch_sizes.push(1);
            self.records.push(record.clone());
            Ok(())
        }

        fn deliver_batch(&mut self, records: &[StorageRecord]) -> Result<()> {
            self.batch_sizes.push(records.len());
            self.records.extend_from_slice(records);
            Ok(())
        }
    }

    /// 前N次投递失败的落点
    struct FlakySink {
        inner: MemorySink,
        failures_left: u32,
    }

    impl StorageSink for FlakySink {
        fn name(&self) -> &str {
            "flaky"
        }

        fn deliver(&mut self, record: &StorageRecord) -> Result<()> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                anyhow::bail!("transient failure");
            }
            self.inner.deliver(record)
        }

        fn deliver_batch(&mut self, records: &[StorageRecord]) -> Result<()> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                anyhow::bail!("transient failure");
            }
            self.inner.deliver_batch(records)
        }
    }

    fn analytics(n: u64) -> StorageRecord {
        StorageRecord::Analytics(AnalyticsRecord::completed("analysis_spool", n, 1, 0))
    }

    fn violation(n: u32) -> StorageRecord {
        use crate::analysis::Violation;
        StorageRecord::Violation(crate::storage::ViolationRecord::from_violation(
            "analysis_spool",
            &Violation {
                track_id: n,
                class: "car".into(),
                speed_kmh: 110,
                timestamp: chrono::Utc::now(),
                violation_number: 1,
            },
            100.0,
        ))
    }

    fn temp_queue(name: &str) -> DeliveryQueue {
        let dir = std::env::temp_dir().join(format!("tcs-rs-spool-{}", name));
        std::fs::remove_dir_all(&dir).ok();
        DeliveryQueue::open(dir)
            .unwrap()
            .with_retry(2, Duration::from_millis(1))
    }

    #[test]
    fn test_append_and_flush() {
        let mut q = temp_queue("basic");
        q.append(analytics(1)).unwrap();
        q.append(analytics(2)).unwrap();
        assert_eq!(q.pending(), 2);

        let mut sink = MemorySink::new();
        let report = q.flush_into(&mut sink).unwrap();
        assert_eq!(report, FlushReport { delivered: 2, remaining: 0 });
        assert_eq!(sink.records.len(), 2);

        // 再次冲刷不应重复投递
        let report = q.flush_into(&mut sink).unwrap();
        assert_eq!(report.delivered, 0);
        assert_eq!(sink.records.len(), 2);
    }

    #[test]
    fn test_pending_survives_reopen() {
        let dir = std::env::temp_dir().join("tcs-rs-spool-reopen");
        std::fs::remove_dir_all(&dir).ok();
        {
            let mut q = DeliveryQueue::open(&dir).unwrap();
            q.append(analytics(1)).unwrap();
            q.append(analytics(2)).unwrap();
        }
        // 模拟进程重启
        let mut q = DeliveryQueue::open(&dir).unwrap();
        assert_eq!(q.pending(), 2);
        let mut sink = MemorySink::new();
        q.flush_into(&mut sink).unwrap();
        assert_eq!(sink.records.len(), 2);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_transient_failure_retried() {
        let mut q = temp_queue("flaky");
        q.append(analytics(1)).unwrap();
        let mut sink = FlakySink {
            inner: MemorySink::new(),
            failures_left: 1,
        };
        let report = q.flush_into(&mut sink).unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(sink.inner.records.len(), 1);
    }

    #[test]
    fn test_persistent_failure_keeps_records() {
        let mut q = temp_queue("down");
        q.append(analytics(1)).unwrap();
        q.append(analytics(2)).unwrap();
        let mut sink = FlakySink {
            inner: MemorySink::new(),
            failures_left: 100,
        };
        let report = q.flush_into(&mut sink).unwrap();
        assert_eq!(report.delivered, 0);
        assert_eq!(report.remaining, 2);

        // 落点恢复后可全部补投
        let mut ok_sink = MemorySink::new();
        let report = q.flush_into(&mut ok_sink).unwrap();
        assert_eq!(report.delivered, 2);
    }

    #[test]
    fn test_violations_batched_by_50() {
        let mut q = temp_queue("batch");
        for i in 0..120 {
            q.append(violation(i)).unwrap();
        }
        let mut sink = MemorySink::new();
        let report = q.flush_into(&mut sink).unwrap();
        assert_eq!(report.delivered, 120);
        assert_eq!(sink.batch_sizes, vec![50, 50, 20]);
    }

    #[test]
    fn test_mixed_records_keep_order() {
        let mut q = temp_queue("mixed");
        q.append(violation(1)).unwrap();
        q.append(analytics(1)).unwrap();
        q.append(violation(2)).unwrap();
        let mut sink = MemorySink::new();
        q.flush_into(&mut sink).unwrap();
        assert!(sink.records[0].is_violation());
        assert!(!sink.records[1].is_violation());
        assert!(sink.records[2].is_violation());
    }

    #[test]
    fn test_seq_monotonic_across_compaction() {
        let mut q = temp_queue("seq");
        assert_eq!(q.append(analytics(1)).unwrap(), 0);
        assert_eq!(q.append(analytics(2)).unwrap(), 1);
        let mut sink = MemorySink::new();
        q.flush_into(&mut sink).unwrap(); // 清空并压缩
        // 压缩后seq不回绕
        assert_eq!(q.append(analytics(3)).unwrap(), 2);
    }

    #[test]
    fn test_partial_batch_cursor() {
        // 前两条投递成功后落点坏掉, 游标应停在2
        let dir = std::env::temp_dir().join("tcs-rs-spool-partial");
        std::fs::remove_dir_all(&dir).ok();
        {
            let mut q = DeliveryQueue::open(&dir)
                .unwrap()
                .with_retry(0, Duration::from_millis(1));
            q.append(analytics(1)).unwrap();
            q.append(analytics(2)).unwrap();
            q.append(analytics(3)).unwrap();

            // 前2条成功后落点持续失败
            struct ThirdFails {
                ok_left: u32,
            }
            impl StorageSink for ThirdFails {
                fn name(&self) -> &str {
                    "third-fails"
                }
                fn deliver(&mut self, _record: &StorageRecord) -> Result<()> {
                    if self.ok_left > 0 {
                        self.ok_left -= 1;
                        Ok(())
                    } else {
                        anyhow::bail!("down")
                    }
                }
            }
            let mut third = ThirdFails { ok_left: 2 };
            let report = q.flush_into(&mut third).unwrap();
            assert_eq!(report.delivered, 2);
            assert_eq!(report.remaining, 1);
        }
        // 重启后只剩1条待投
        let mut q = DeliveryQueue::open(&dir).unwrap();
        assert_eq!(q.pending(), 1);
        let mut sink = MemorySink::new();
        let report = q.flush_into(&mut sink).unwrap();
        assert_eq!(report.delivered, 1);
        std::fs::remove_dir_all(&dir).ok();
    }
}
