use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::HealthCheckResult;

/// 引擎自己发布的交易数据，原样透传，只关心有无
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineReport {
    pub trading_pairs: Option<Value>,
    pub portfolio: Option<Value>,
    pub websocket_connected: Option<bool>,
}

/// 一次请求内计算出的状态快照，不缓存
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub is_running: bool,
    pub pid: Option<i32>,
    pub uptime_secs: u64,
    /// 常驻内存 (MB)
    pub memory_usage: f64,
    /// CPU 使用率 (百分比)
    pub cpu_usage: f32,
    pub last_health_check: Option<HealthCheckResult>,
    pub recent_log_lines: Vec<String>,
    pub engine: EngineReport,
    pub websocket_connected: bool,
    /// 当前窗口内的自动重启次数
    pub restart_count: usize,
    pub halted: bool,
    pub taken_at: DateTime<Utc>,
}

/// GET /api/bot/status 的响应体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotStatus {
    pub is_running: bool,
    pub pid: Option<i32>,
    pub uptime: String,
    pub memory_usage: f64,
    pub cpu_usage: f32,
    pub websocket_connected: bool,
    pub last_update: DateTime<Utc>,
    pub restart_count: usize,
    pub halted: bool,
}

impl From<&StatusSnapshot> for BotStatus {
    fn from(s: &StatusSnapshot) -> Self {
        Self {
            is_running: s.is_running,
            pid: s.pid,
            uptime: format_uptime(s.uptime_secs),
            memory_usage: s.memory_usage,
            cpu_usage: s.cpu_usage,
            websocket_connected: s.websocket_connected,
            last_update: s.taken_at,
            restart_count: s.restart_count,
            halted: s.halted,
        }
    }
}

/// 引擎未发布组合数据时返回的全零组合
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Portfolio {
    pub total_balance: f64,
    pub available_balance: f64,
    pub in_positions: f64,
    pub total_pnl: f64,
    pub daily_pnl: f64,
    pub positions: Vec<Value>,
}

/// 解析后的一行日志
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub source: String,
    pub message: String,
}

/// 秒数格式化为 H:MM:SS
pub fn format_uptime(secs: u64) -> String {
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
