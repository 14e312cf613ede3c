use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::models::{EngineReport, LogEntry, ProcessStats, StatusSnapshot};
use crate::services::health_monitor::{last_result, LedgerStore};
use crate::services::log_manager::{parse_line, tail};
use crate::services::registry::ProcessRegistry;
use crate::services::StatsCollector;

lazy_static! {
    static ref WS_CONNECTED: Regex =
        Regex::new(r"(?i)\bwebsocket\s+(conectado|connected)\b").expect("valid pattern");
    static ref WS_DISCONNECTED: Regex =
        Regex::new(r"(?i)(\berro\s+websocket|\bwebsocket\s+(desconectado|disconnected|error|erro))")
            .expect("valid pattern");
}

/// 引擎自己维护的状态数据源
pub trait EngineDataSource: Send + Sync {
    /// 不可用时返回空报告，不报错
    fn load(&self) -> EngineReport;
}

/// 引擎写出的 JSON 状态文件 (data/engine_status.json)
pub struct EngineStatusFile {
    path: PathBuf,
}

impl EngineStatusFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl EngineDataSource for EngineStatusFile {
    fn load(&self) -> EngineReport {
        let Some(Value::Object(map)) = fs::read_to_string(&self.path)
            .ok()
            .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
        else {
            return EngineReport::default();
        };
        EngineReport {
            trading_pairs: map.get("trading_pairs").cloned(),
            portfolio: map.get("portfolio").cloned(),
            websocket_connected: map.get("websocket_connected").and_then(Value::as_bool),
        }
    }
}

/// 只读状态聚合
///
/// 每次调用都重新读取注册表和日志，不等待任何进行中的 start/stop。
pub struct StatusReporter {
    pub registry: Arc<dyn ProcessRegistry>,
    pub ledger: LedgerStore,
    pub stats: Arc<StatsCollector>,
    pub engine: Arc<dyn EngineDataSource>,
    pub daemon_log: PathBuf,
    pub engine_log: PathBuf,
    pub health_log: PathBuf,
    pub tail_lines: usize,
    /// 重启窗口，计数前先淘汰窗口外的记录
    pub window: Duration,
}

impl StatusReporter {
    pub fn snapshot(&self) -> StatusSnapshot {
        let record = self.registry.read_live();
        let stats = record
            .as_ref()
            .and_then(|r| self.stats.collect_stats(r.pid))
            .unwrap_or_else(ProcessStats::empty);
        let now = Utc::now();
        let uptime_secs = match &record {
            Some(_) if stats.uptime_secs > 0 => stats.uptime_secs,
            Some(r) => r.uptime_secs(now),
            None => 0,
        };

        let engine = self.engine.load();
        let websocket_connected = record.is_some()
            && engine
                .websocket_connected
                .unwrap_or_else(|| self.websocket_from_log());
        let mut ledger = self.ledger.load();
        ledger.evict(now, self.window);

        StatusSnapshot {
            is_running: record.is_some(),
            pid: record.as_ref().map(|r| r.pid),
            uptime_secs,
            memory_usage: stats.memory_mb(),
            cpu_usage: stats.cpu_usage,
            last_health_check: last_result(&self.health_log),
            recent_log_lines: self.recent_log_lines(self.tail_lines),
            engine,
            websocket_connected,
            restart_count: ledger.count(),
            halted: ledger.halted,
            taken_at: now,
        }
    }

    /// 最近的 WebSocket 连接/断开标记，以最新一条为准
    fn websocket_from_log(&self) -> bool {
        tail(&self.engine_log, 50)
            .iter()
            .rev()
            .find_map(|line| {
                if WS_DISCONNECTED.is_match(line) {
                    Some(false)
                } else if WS_CONNECTED.is_match(line) {
                    Some(true)
                } else {
                    None
                }
            })
            .unwrap_or(false)
    }

    /// engine.log 与 daemon.log 合并后按时间排序的最后 `limit` 条记录
    ///
    /// 无法解析的行（引擎的裸 print 输出）不计入。
    pub fn recent_logs(&self, limit: usize) -> Vec<LogEntry> {
        let mut entries: Vec<LogEntry> = tail(&self.engine_log, limit)
            .iter()
            .chain(tail(&self.daemon_log, limit).iter())
            .filter_map(|line| parse_line(line))
            .collect();
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        let skip = entries.len().saturating_sub(limit);
        entries.drain(..skip);
        entries
    }

    /// 快照附带的原始日志行：以引擎输出为主，引擎日志为空时退回守护进程日志
    fn recent_log_lines(&self, limit: usize) -> Vec<String> {
        let engine = tail(&self.engine_log, limit);
        if engine.is_empty() {
            tail(&self.daemon_log, limit)
        } else {
            engine
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HealthAction;
    use crate::services::health_monitor::tests::{kill_and_wait, monitor, policy};
    use crate::services::registry::PidFileRegistry;
    use std::path::Path;

    fn reporter(home: &Path) -> StatusReporter {
        StatusReporter {
            registry: Arc::new(PidFileRegistry::new(home.join("run/bot.pid.json"))),
            ledger: LedgerStore::new(home.join("run/restart_ledger.json")),
            stats: Arc::new(StatsCollector::new()),
            engine: Arc::new(EngineStatusFile::new(home.join("data/engine_status.json"))),
            daemon_log: home.join("logs/daemon.log"),
            engine_log: home.join("logs/engine.log"),
            health_log: home.join("logs/health.log"),
            tail_lines: 5,
            window: Duration::from_secs(3600),
        }
    }

    #[test]
    fn test_snapshot_of_stopped_process() {
        let dir = tempfile::tempdir().unwrap();
        let snap = reporter(dir.path()).snapshot();

        assert!(!snap.is_running);
        assert_eq!(snap.pid, None);
        assert_eq!(snap.uptime_secs, 0);
        assert_eq!(snap.memory_usage, 0.0);
        assert_eq!(snap.cpu_usage, 0.0);
        assert!(!snap.websocket_connected);
        assert!(snap.last_health_check.is_none());
        assert!(snap.recent_log_lines.is_empty());
        assert!(snap.engine.trading_pairs.is_none());
        assert!(snap.engine.portfolio.is_none());
    }

    #[test]
    fn test_engine_data_is_passed_through() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("data")).unwrap();
        fs::write(
            dir.path().join("data/engine_status.json"),
            r#"{"trading_pairs":[{"symbol":"BTC/USDT","pnl":1.5}],"portfolio":{"total_balance":10000.0},"extra":true}"#,
        )
        .unwrap();

        let snap = reporter(dir.path()).snapshot();
        let pairs = snap.engine.trading_pairs.expect("pairs present");
        assert_eq!(pairs[0]["symbol"], "BTC/USDT");
        assert_eq!(snap.engine.portfolio.unwrap()["total_balance"], 10000.0);
    }

    #[test]
    fn test_malformed_engine_data_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("data")).unwrap();
        fs::write(dir.path().join("data/engine_status.json"), "[1, 2").unwrap();

        let report = EngineStatusFile::new(dir.path().join("data/engine_status.json")).load();
        assert!(report.trading_pairs.is_none());
        assert!(report.portfolio.is_none());
        assert!(report.websocket_connected.is_none());
    }

    #[test]
    fn test_websocket_marker_from_engine_log() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("logs")).unwrap();
        let rep = reporter(dir.path());

        fs::write(&rep.engine_log, "WebSocket conectado\nprice tick\n").unwrap();
        assert!(rep.websocket_from_log());

        fs::write(&rep.engine_log, "WebSocket conectado\nWebSocket desconectado\n").unwrap();
        assert!(!rep.websocket_from_log());

        fs::write(&rep.engine_log, "nothing relevant\n").unwrap();
        assert!(!rep.websocket_from_log());
    }

    #[test]
    fn test_recent_logs_skip_unparseable_lines() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("logs")).unwrap();
        let rep = reporter(dir.path());
        fs::write(
            &rep.daemon_log,
            "2025-01-01 00:00:00 - INFO - DAEMON - started\nstray line\n2025-01-01 00:00:05 - ERROR - DAEMON - boom\n",
        )
        .unwrap();

        let logs = rep.recent_logs(10);
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].level, "ERROR");
        assert_eq!(rep.recent_logs(1).len(), 1);
    }

    #[test]
    fn test_recent_logs_merge_engine_output() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("logs")).unwrap();
        let rep = reporter(dir.path());
        fs::write(
            &rep.engine_log,
            "2025-01-01 00:00:01,100 - INFO - WebSocket conectado\n2025-01-01 00:00:07,000 - WARNING - order rejected - BTC/USDT\n",
        )
        .unwrap();
        fs::write(&rep.daemon_log, "2025-01-01 00:00:05 - INFO - DAEMON - check ok\n").unwrap();

        let logs = rep.recent_logs(10);
        let sources: Vec<&str> = logs.iter().map(|e| e.source.as_str()).collect();
        assert_eq!(sources, ["ENGINE", "DAEMON", "ENGINE"]);
        assert_eq!(logs[2].message, "order rejected - BTC/USDT");

        let last = rep.recent_logs(1);
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].level, "WARNING");

        assert_eq!(rep.snapshot().recent_log_lines.len(), 2);
    }

    #[test]
    fn test_restart_count_ignores_entries_outside_window() {
        let dir = tempfile::tempdir().unwrap();
        let rep = reporter(dir.path());
        let now = Utc::now();
        let mut ledger = crate::models::RestartLedger::default();
        ledger.record(now - chrono::Duration::hours(3));
        ledger.record(now - chrono::Duration::minutes(5));
        rep.ledger.save(&ledger).unwrap();

        assert_eq!(rep.snapshot().restart_count, 1);
        // 只在副本上淘汰，磁盘上的账本不变
        assert_eq!(rep.ledger.load().count(), 2);
    }

    #[test]
    fn test_crash_and_recovery_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let mon = monitor(dir.path(), &["sleep", "30"], policy(3));
        let rep = reporter(dir.path());

        let first = mon.supervisor().start().unwrap().record().pid;
        let snap = rep.snapshot();
        assert!(snap.is_running);
        assert_eq!(snap.pid, Some(first));
        assert_eq!(snap.restart_count, 0);

        kill_and_wait(first);
        assert!(!rep.snapshot().is_running);

        let result = mon.check().unwrap();
        assert_eq!(result.action, HealthAction::Restarted);

        let snap = rep.snapshot();
        assert!(snap.is_running);
        let second = snap.pid.expect("restarted pid");
        assert_ne!(second, first);
        assert_eq!(snap.restart_count, 1);
        assert_eq!(
            snap.last_health_check.map(|r| r.action),
            Some(HealthAction::Restarted)
        );

        mon.supervisor().stop().unwrap();
    }
}
