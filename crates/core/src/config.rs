//! Chatbox 配置系统
//!
//! 支持 YAML 配置文件和环境变量 (`CHATBOX_*`)

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ChatboxError, Result};
use crate::spec::{MessageSpec, SpecPayload};

pub const ENV_WRAP_WIDTH: &str = "CHATBOX_WRAP_WIDTH";
pub const ENV_PENDING_BASE_MS: &str = "CHATBOX_PENDING_BASE_MS";
pub const ENV_PENDING_PER_CHAR_MS: &str = "CHATBOX_PENDING_PER_CHAR_MS";
pub const ENV_PENDING_MAX_MS: &str = "CHATBOX_PENDING_MAX_MS";
pub const ENV_REMINDER_DELAY_MS: &str = "CHATBOX_REMINDER_DELAY_MS";

/// Chatbox 主配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatboxConfig {
    /// 显示配置
    #[serde(default)]
    pub display: DisplayConfig,

    /// 投递节奏配置
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// 未读提醒配置
    #[serde(default)]
    pub reminder: ReminderConfig,
}

/// 显示配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// 文本气泡默认换行宽度 (字符)
    #[serde(default = "default_wrap_width")]
    pub wrap_width: usize,
}

fn default_wrap_width() -> usize {
    30
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            wrap_width: default_wrap_width(),
        }
    }
}

/// 投递节奏配置 (typing indicator 停留时间)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// 基础停留时间 (毫秒)
    #[serde(default = "default_pending_base_ms")]
    pub pending_base_ms: u64,

    /// 每字符追加时间 (毫秒)
    #[serde(default = "default_pending_per_char_ms")]
    pub pending_per_char_ms: u64,

    /// 停留时间上限 (毫秒)
    #[serde(default = "default_pending_max_ms")]
    pub pending_max_ms: u64,
}

fn default_pending_base_ms() -> u64 {
    400
}

fn default_pending_per_char_ms() -> u64 {
    25
}

fn default_pending_max_ms() -> u64 {
    2500
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            pending_base_ms: default_pending_base_ms(),
            pending_per_char_ms: default_pending_per_char_ms(),
            pending_max_ms: default_pending_max_ms(),
        }
    }
}

impl DeliveryConfig {
    /// How long the typing indicator stays up before `spec` is revealed.
    pub fn pending_dwell(&self, spec: &MessageSpec) -> Duration {
        let ms = match &spec.payload {
            SpecPayload::Text { text, .. } => {
                let chars = text.chars().count() as u64;
                self.pending_base_ms
                    .saturating_add(self.pending_per_char_ms.saturating_mul(chars))
                    .min(self.pending_max_ms)
            }
            _ => self.pending_base_ms,
        };
        Duration::from_millis(ms)
    }
}

/// 未读提醒配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderConfig {
    /// 首条未读后多久提醒 (毫秒)
    #[serde(default = "default_reminder_delay_ms")]
    pub delay_ms: u64,
}

fn default_reminder_delay_ms() -> u64 {
    1200
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_reminder_delay_ms(),
        }
    }
}

impl ReminderConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl ChatboxConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ChatboxError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&raw)
    }

    /// 环境变量覆盖 (无效值忽略)
    pub fn apply_env_overrides(&mut self) {
        if let Some(width) = env_usize(ENV_WRAP_WIDTH).filter(|w| *w > 0) {
            self.display.wrap_width = width;
        }
        if let Some(ms) = env_u64(ENV_PENDING_BASE_MS) {
            self.delivery.pending_base_ms = ms;
        }
        if let Some(ms) = env_u64(ENV_PENDING_PER_CHAR_MS) {
            self.delivery.pending_per_char_ms = ms;
        }
        if let Some(ms) = env_u64(ENV_PENDING_MAX_MS) {
            self.delivery.pending_max_ms = ms;
        }
        if let Some(ms) = env_u64(ENV_REMINDER_DELAY_MS) {
            self.reminder.delay_ms = ms;
        }
    }

    /// File (if any), then environment.
    pub fn load_with_env(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }
}

pub fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok()?.trim().parse::<usize>().ok()
}

pub fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.trim().parse::<u64>().ok()
}
