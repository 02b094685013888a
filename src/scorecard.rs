//! LLM评分卡
//! Premium management scorecard via an OpenAI-compatible chat endpoint
//!
//! 远端调用失败 (网络/鉴权/响应格式) 一律降级为本地确定性评分卡,
//! 评分卡生成永远不会让整次分析失败。

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::analysis::RunStatistics;

const DEFAULT_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";
const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

#[derive(Debug, Clone)]
pub struct ScorecardConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for ScorecardConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: std::env::var("TCS_LLM_API_KEY").ok(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.3,
            max_tokens: 1000,
            timeout: Duration::from_secs(30),
        }
    }
}

// ========== 请求/响应 ==========

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

pub struct ScorecardClient {
    config: ScorecardConfig,
}

impl ScorecardClient {
    pub fn new(config: ScorecardConfig) -> Self {
        Self { config }
    }

    /// 生成评分卡: 远端优先, 任意失败降级本地
    pub fn generate(&self, stats: &RunStatistics) -> String {
        match self.generate_remote(stats) {
            Ok(text) => {
                println!("✅ 评分卡生成成功 (LLM)");
                text
            }
            Err(e) => {
                eprintln!("⚠️  LLM评分卡失败, 使用本地评分卡: {:#}", e);
                local_scorecard(stats)
            }
        }
    }

    fn generate_remote(&self, stats: &RunStatistics) -> Result<String> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("未配置API密钥 (TCS_LLM_API_KEY)"))?;

        let prompt = build_prompt(stats);
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = ureq::post(&self.config.endpoint)
            .set("Authorization", &format!("Bearer {}", api_key))
            .set("Content-Type", "application/json")
            .timeout(self.config.timeout)
            .send_json(serde_json::to_value(&request)?)
            .context("评分卡请求失败")?;

        let parsed: ChatResponse = response.into_json().context("评分卡响应格式错误")?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("评分卡响应为空"))
    }
}

/// 构造评分卡提示词
pub fn build_prompt(stats: &RunStatistics) -> String {
    // 类别分布按名称排序, 提示词保持确定性
    let distribution: BTreeMap<&str, u32> = stats
        .vehicle_class_distribution
        .iter()
        .map(|(k, v)| (k.as_str(), *v))
        .collect();
    let distribution: Vec<String> = distribution
        .iter()
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect();

    format!(
        "Create premium management scorecard:\n\
         Vehicles: {}\n\
         Violations: {}\n\
         Max Speed: {} km/h\n\
         Vehicle Types: {{{}}}\n",
        stats.total_vehicles_detected,
        stats.total_unique_violations,
        stats.max_speed,
        distribution.join(", ")
    )
}

/// 本地兜底评分卡
pub fn local_scorecard(stats: &RunStatistics) -> String {
    format!(
        "LOCAL SCORECARD\n\
         Total Vehicles: {}\n\
         Violations: {}\n\
         Max Speed: {} km/h\n\
         Analysis ID: {}\n",
        stats.total_vehicles_detected,
        stats.total_unique_violations,
        stats.max_speed,
        stats.analysis_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn stats() -> RunStatistics {
        RunStatistics {
            analysis_id: "analysis_sc".into(),
            total_vehicles_detected: 12,
            vehicles_in_zone: 9,
            total_unique_violations: 4,
            vehicle_class_distribution: HashMap::from([
                ("truck".to_string(), 2),
                ("car".to_string(), 10),
            ]),
            max_speed: 131,
            avg_speed: 96.5,
            vehicles_with_violations: 3,
            processing_duration: 10.0,
        }
    }

    #[test]
    fn test_prompt_contains_stats() {
        let prompt = build_prompt(&stats());
        assert!(prompt.contains("Vehicles: 12"));
        assert!(prompt.contains("Violations: 4"));
        assert!(prompt.contains("Max Speed: 131 km/h"));
        // 类别按名称排序
        assert!(prompt.contains("{car: 10, truck: 2}"));
    }

    #[test]
    fn test_local_scorecard() {
        let text = local_scorecard(&stats());
        assert!(text.starts_with("LOCAL SCORECARD"));
        assert!(text.contains("Analysis ID: analysis_sc"));
    }

    #[test]
    fn test_generate_without_key_falls_back() {
        let client = ScorecardClient::new(ScorecardConfig {
            api_key: None,
            ..ScorecardConfig::default()
        });
        let text = client.generate(&stats());
        assert!(text.starts_with("LOCAL SCORECARD"));
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"great scorecard"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "great scorecard");
    }
}
