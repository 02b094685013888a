//! MongoDB Atlas 云端存储
//!
//! 数据库 traffic_analysis, 集合 traffic_statistics / vehicle_violations /
//! premium_scorecards / real_time_analytics。
//! 连接时ping验证并补建缺失集合; 服务器选择超时15秒。

use anyhow::{anyhow, Context, Result};
use mongodb::bson::{doc, Document};
use mongodb::sync::{Client, Database};

use super::{StorageRecord, StorageSink};

pub const DATABASE_NAME: &str = "traffic_analysis";

pub const COLLECTION_STATISTICS: &str = "traffic_statistics";
pub const COLLECTION_VIOLATIONS: &str = "vehicle_violations";
pub const COLLECTION_SCORECARDS: &str = "premium_scorecards";
pub const COLLECTION_ANALYTICS: &str = "real_time_analytics";

/// 记录类型 → 集合名
pub fn collection_for(record: &StorageRecord) -> &'static str {
    match record {
        StorageRecord::Statistics(_) => COLLECTION_STATISTICS,
        StorageRecord::Violation(_) => COLLECTION_VIOLATIONS,
        StorageRecord::Scorecard(_) => COLLECTION_SCORECARDS,
        StorageRecord::Analytics(_) => COLLECTION_ANALYTICS,
    }
}

fn to_document(record: &StorageRecord) -> Result<Document> {
    let doc = match record {
        StorageRecord::Statistics(r) => mongodb::bson::to_document(r),
        StorageRecord::Violation(r) => mongodb::bson::to_document(r),
        StorageRecord::Scorecard(r) => mongodb::bson::to_document(r),
        StorageRecord::Analytics(r) => mongodb::bson::to_document(r),
    };
    doc.context("记录BSON序列化失败")
}

pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    /// 连接MongoDB Atlas并验证连通性
    pub fn connect(uri: &str) -> Result<Self> {
        println!("🔗 连接MongoDB Atlas...");

        // 服务器选择超时通过连接串参数传递
        let uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=15000", uri)
        } else {
            format!("{}/?serverSelectionTimeoutMS=15000", uri.trim_end_matches('/'))
        };

        let client = Client::with_uri_str(&uri).context("MongoDB连接串无效")?;
        let db = client.database(DATABASE_NAME);
        db.run_command(doc! {"ping": 1}, None)
            .context("MongoDB Atlas连接失败")?;
        println!("✅ MongoDB Atlas连接成功");

        // 补建缺失集合
        let existing = db
            .list_collection_names(None)
            .context("读取集合列表失败")?;
        for name in [
            COLLECTION_STATISTICS,
            COLLECTION_VIOLATIONS,
            COLLECTION_SCORECARDS,
            COLLECTION_ANALYTICS,
        ] {
            if !existing.iter().any(|c| c == name) {
                println!("📁 创建集合: {}", name);
                db.create_collection(name, None)
                    .with_context(|| format!("创建集合失败: {}", name))?;
            }
        }

        Ok(Self { db })
    }
}

impl StorageSink for MongoStore {
    fn name(&self) -> &str {
        "mongodb"
    }

    fn deliver(&mut self, record: &StorageRecord) -> Result<()> {
        let collection = self.db.collection::<Document>(collection_for(record));
        collection
            .insert_one(to_document(record)?, None)
            .with_context(|| format!("写入{}失败", collection_for(record)))?;
        Ok(())
    }

    /// 违章批量insert_many, 混合批退回逐条
    fn deliver_batch(&mut self, records: &[StorageRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        if records.iter().all(|r| r.is_violation()) {
            let docs: Vec<Document> = records
                .iter()
                .map(to_document)
                .collect::<Result<Vec<_>>>()?;
            let collection = self.db.collection::<Document>(COLLECTION_VIOLATIONS);
            let result = collection
                .insert_many(docs, None)
                .context("违章批量写入失败")?;
            if result.inserted_ids.len() != records.len() {
                return Err(anyhow!(
                    "违章批量写入不完整: {}/{}",
                    result.inserted_ids.len(),
                    records.len()
                ));
            }
            return Ok(());
        }
        for record in records {
            self.deliver(record)?;
        }
        Ok(())
    }
}
