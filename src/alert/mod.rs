/// 超速告警下发
/// Speed alert dispatch
///
/// 告警消息格式: "ALERT! {class} #{id} at {speed} km/h"。
/// 发送失败只记录日志, 不影响分析流程; 每辆车30秒冷却, 防止刷爆网关。
use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::analysis::Violation;

/// 每辆车的告警冷却时长
const ALERT_COOLDOWN: Duration = Duration::from_secs(30);

/// 告警通道统一接口
pub trait Alerter: Send {
    fn name(&self) -> &str;
    fn send(&self, message: &str) -> Result<()>;
}

/// 短信网关告警 (Twilio风格表单POST, Bearer token鉴权)
///
/// 凭据取自环境变量: TCS_SMS_URL / TCS_SMS_TOKEN / TCS_SMS_FROM / TCS_SMS_TO
pub struct SmsAlerter {
    url: String,
    token: String,
    from: String,
    to: String,
}

impl SmsAlerter {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            url: std::env::var("TCS_SMS_URL").context("缺少TCS_SMS_URL")?,
            token: std::env::var("TCS_SMS_TOKEN").context("缺少TCS_SMS_TOKEN")?,
            from: std::env::var("TCS_SMS_FROM").context("缺少TCS_SMS_FROM")?,
            to: std::env::var("TCS_SMS_TO").context("缺少TCS_SMS_TO")?,
        })
    }
}

impl Alerter for SmsAlerter {
    fn name(&self) -> &str {
        "sms"
    }

    fn send(&self, message: &str) -> Result<()> {
        ureq::post(&self.url)
            .set("Authorization", &format!("Bearer {}", self.token))
            .timeout(Duration::from_secs(10))
            .send_form(&[
                ("From", self.from.as_str()),
                ("To", self.to.as_str()),
                ("Body", message),
            ])
            .context("短信发送失败")?;
        Ok(())
    }
}

/// 通用webhook告警 (JSON POST)
pub struct WebhookAlerter {
    url: String,
}

impl WebhookAlerter {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Alerter for WebhookAlerter {
    fn name(&self) -> &str {
        "webhook"
    }

    fn send(&self, message: &str) -> Result<()> {
        ureq::post(&self.url)
            .timeout(Duration::from_secs(10))
            .send_json(serde_json::json!({ "text": message }))
            .context("webhook发送失败")?;
        Ok(())
    }
}

/// 控制台告警 (兜底通道)
pub struct ConsoleAlerter;

impl Alerter for ConsoleAlerter {
    fn name(&self) -> &str {
        "console"
    }

    fn send(&self, message: &str) -> Result<()> {
        println!("🚨 {}", message);
        Ok(())
    }
}

/// 组装告警消息
pub fn alert_message(violation: &Violation) -> String {
    format!(
        "ALERT! {} #{} at {} km/h",
        violation.class, violation.track_id, violation.speed_kmh
    )
}

/// 告警分发器 (多通道 + 每车冷却)
pub struct AlertDispatcher {
    alerters: Vec<Box<dyn Alerter>>,
    last_alert: HashMap<u32, Instant>,
}

impl AlertDispatcher {
    pub fn new(alerters: Vec<Box<dyn Alerter>>) -> Self {
        Self {
            alerters,
            last_alert: HashMap::new(),
        }
    }

    /// 下发一条超速告警 (冷却期内的车辆被跳过)
    pub fn dispatch(&mut self, violation: &Violation) {
        self.dispatch_at(violation, Instant::now())
    }

    fn dispatch_at(&mut self, violation: &Violation, now: Instant) {
        if !self.should_alert(violation.track_id, now) {
            return;
        }
        let message = alert_message(violation);
        for alerter in &self.alerters {
            if let Err(e) = alerter.send(&message) {
                eprintln!("⚠️  {}告警发送失败: {:#}", alerter.name(), e);
            }
        }
    }

    /// 冷却检查, 通过则刷新该车的冷却起点
    fn should_alert(&mut self, vehicle_id: u32, now: Instant) -> bool {
        match self.last_alert.get(&vehicle_id) {
            Some(&last) if now.duration_since(last) < ALERT_COOLDOWN => false,
            _ => {
                self.last_alert.insert(vehicle_id, now);
                true
            }
        }
    }

    pub fn channel_count(&self) -> usize {
        self.alerters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn violation(id: u32) -> Violation {
        Violation {
            track_id: id,
            class: "car".into(),
            speed_kmh: 126,
            timestamp: Utc::now(),
            violation_number: 1,
        }
    }

    #[test]
    fn test_alert_message_format() {
        let msg = alert_message(&violation(42));
        assert_eq!(msg, "ALERT! car #42 at 126 km/h");
    }

    #[test]
    fn test_cooldown_blocks_repeat() {
        let mut d = AlertDispatcher::new(vec![Box::new(ConsoleAlerter)]);
        let t0 = Instant::now();
        assert!(d.should_alert(1, t0));
        assert!(!d.should_alert(1, t0 + Duration::from_secs(10)));
        // 冷却过后放行
        assert!(d.should_alert(1, t0 + Duration::from_secs(31)));
    }

    #[test]
    fn test_cooldown_is_per_vehicle() {
        let mut d = AlertDispatcher::new(vec![Box::new(ConsoleAlerter)]);
        let t0 = Instant::now();
        assert!(d.should_alert(1, t0));
        assert!(d.should_alert(2, t0));
    }

    #[test]
    fn test_sms_from_env_requires_all_vars() {
        // 与其它测试并发安全: 只清掉本测试命名的变量
        std::env::remove_var("TCS_SMS_URL");
        assert!(SmsAlerter::from_env().is_err());
    }
}
