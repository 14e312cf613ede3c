use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, SupervisorError};
use crate::models::{
    HealthAction, HealthCheckResult, ProcessRecord, RestartDecision, RestartLedger, RestartPolicy,
    StartOutcome,
};
use crate::services::log_manager::{self, LogFile};
use crate::services::registry::{write_atomic, ProcessRegistry};
use crate::services::ProcessSupervisor;

/// 重启账本的持久化位置
///
/// 每次健康检查都是独立的短生命周期调用，账本必须落盘才能跨调用计数。
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 缺失或损坏都按空账本处理
    pub fn load(&self) -> RestartLedger {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, ledger: &RestartLedger) -> Result<()> {
        serde_json::to_vec_pretty(ledger)
            .map_err(io::Error::from)
            .and_then(|bytes| write_atomic(&self.path, &bytes))
            .map_err(|source| SupervisorError::RegistryWrite {
                path: self.path.clone(),
                source,
            })
    }
}

/// 周期性存活检查 + 有界自动重启
///
/// 不拥有定时器：`check()` 由外部调度（cron 或 serve 模式的内部定时器）反复调用。
/// 并发调用在生命周期锁上排队，每次重启只记账一次。
pub struct HealthMonitor {
    registry: Arc<dyn ProcessRegistry>,
    supervisor: Arc<ProcessSupervisor>,
    ledger: LedgerStore,
    policy: RestartPolicy,
    auto_restart: bool,
    health_log: PathBuf,
    max_log_lines: usize,
    maintained_logs: Vec<LogFile>,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<dyn ProcessRegistry>,
        supervisor: Arc<ProcessSupervisor>,
        ledger: LedgerStore,
        health_log: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            supervisor,
            ledger,
            policy: RestartPolicy::default(),
            auto_restart: true,
            health_log: health_log.into(),
            max_log_lines: 1000,
            maintained_logs: Vec::new(),
        }
    }

    pub fn with_policy(mut self, policy: RestartPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_auto_restart(mut self, enabled: bool) -> Self {
        self.auto_restart = enabled;
        self
    }

    pub fn with_max_log_lines(mut self, lines: usize) -> Self {
        self.max_log_lines = lines;
        self
    }

    /// 每轮检查后需要按大小轮转的日志
    pub fn with_maintained_logs(mut self, logs: Vec<LogFile>) -> Self {
        self.maintained_logs = logs;
        self
    }

    pub fn supervisor(&self) -> Arc<ProcessSupervisor> {
        self.supervisor.clone()
    }

    pub fn policy(&self) -> &RestartPolicy {
        &self.policy
    }

    pub fn ledger(&self) -> RestartLedger {
        self.ledger.load()
    }

    /// 手动启动时清空账本，解除 halted；调用方应持有生命周期锁
    pub fn clear_ledger(&self) -> Result<()> {
        let mut ledger = self.ledger.load();
        if ledger == RestartLedger::default() {
            return Ok(());
        }
        if ledger.halted {
            info!("🔓 Clearing halted state ({} restarts recorded)", ledger.count());
        }
        ledger.clear();
        self.ledger.save(&ledger)
    }

    pub fn check(&self) -> Result<HealthCheckResult> {
        self.check_at(Utc::now())
    }

    /// 以给定时间执行一次检查
    pub fn check_at(&self, now: DateTime<Utc>) -> Result<HealthCheckResult> {
        let result = self.evaluate(now)?;
        self.append_result(&result)?;
        log_manager::truncate_tail(&self.health_log, self.max_log_lines)?;
        Ok(result)
    }

    /// 整个判断在生命周期锁内完成：账本的读-改-写和随后的 start 不会与
    /// 另一个检查或手动操作交错
    fn evaluate(&self, now: DateTime<Utc>) -> Result<HealthCheckResult> {
        let lock = self.supervisor.lock()?;

        let stale = match self.registry.read() {
            Some(record) if self.registry.is_live(&record) => {
                return Ok(outcome(now, true, HealthAction::None, Some(record.pid), None));
            }
            Some(record) => {
                warn!("💀 StaleRegistry: engine PID {} is no longer alive", record.pid);
                record
            }
            None if self.ledger.load().halted => {
                return Ok(outcome(
                    now,
                    false,
                    HealthAction::Halted,
                    None,
                    Some("halted, manual start required".to_string()),
                ));
            }
            None => {
                // 没有记录：从未启动或被手动停止，不属于崩溃
                return Ok(outcome(
                    now,
                    false,
                    HealthAction::None,
                    None,
                    Some("not started".to_string()),
                ));
            }
        };

        if !self.auto_restart {
            warn!("Auto-restart disabled, leaving engine down");
            self.discard(&stale)?;
            return Ok(outcome(
                now,
                false,
                HealthAction::None,
                Some(stale.pid),
                Some("auto-restart disabled".to_string()),
            ));
        }

        let mut ledger = self.ledger.load();
        ledger.evict(now, self.policy.window);

        match ledger.decide(now, &self.policy) {
            RestartDecision::Exhausted => {
                if !ledger.halted {
                    ledger.halt(now);
                    self.ledger.save(&ledger)?;
                }
                self.discard(&stale)?;
                let err = SupervisorError::CrashLoopHalted {
                    restarts: ledger.count(),
                    window: self.policy.window,
                };
                error!("🚨 {}", err);
                Ok(outcome(now, false, HealthAction::Halted, Some(stale.pid), Some(err.to_string())))
            }
            RestartDecision::BackingOff { until } => {
                // 保留过期记录，退避结束后的下一轮再重启
                info!("⏱️  Engine down, backing off until {}", until);
                Ok(outcome(
                    now,
                    false,
                    HealthAction::None,
                    Some(stale.pid),
                    Some(format!("backing off until {}", until.to_rfc3339())),
                ))
            }
            RestartDecision::Allowed => {
                ledger.record(now);
                self.ledger.save(&ledger)?;
                info!(
                    "🔄 Restarting engine ({}/{} in window)",
                    ledger.count(),
                    self.policy.max_restarts
                );

                match self.supervisor.start_locked(&lock) {
                    Ok(StartOutcome::Started(record)) => Ok(outcome(
                        now,
                        false,
                        HealthAction::Restarted,
                        Some(record.pid),
                        Some(format!("restart #{}", ledger.count())),
                    )),
                    Ok(StartOutcome::AlreadyRunning(record)) => {
                        Ok(outcome(now, true, HealthAction::None, Some(record.pid), None))
                    }
                    Err(e) => {
                        error!("❌ Automatic restart failed: {}", e);
                        ledger.halt(now);
                        self.ledger.save(&ledger)?;
                        Ok(outcome(now, false, HealthAction::Halted, None, Some(e.to_string())))
                    }
                }
            }
        }
    }

    /// 只清除仍然指向这个过期进程的记录，不覆盖别人刚写入的新记录
    fn discard(&self, stale: &ProcessRecord) -> Result<()> {
        if self.registry.read().as_ref() == Some(stale) {
            self.registry.clear()?;
        }
        Ok(())
    }

    fn append_result(&self, result: &HealthCheckResult) -> Result<()> {
        if let Some(dir) = self.health_log.parent() {
            fs::create_dir_all(dir)?;
        }
        let line = serde_json::to_string(result).map_err(io::Error::from)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.health_log)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    /// 一个完整的检查周期：检查 + 日志轮转
    pub fn run_cycle(&self) -> Result<HealthCheckResult> {
        let result = self.check()?;
        for log in &self.maintained_logs {
            if let Err(e) = log_manager::rotate(log) {
                warn!("Failed to rotate {}: {}", log.path.display(), e);
            }
        }
        Ok(result)
    }

    /// serve 模式下的内部定时器
    pub async fn run_periodic(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("🔍 Health monitor running every {:?}", interval);

        loop {
            ticker.tick().await;
            let monitor = self.clone();
            match tokio::task::spawn_blocking(move || monitor.run_cycle()).await {
                Ok(Ok(result)) => {
                    crate::metrics::METRICS.record_check(&result);
                    log::debug!("Health check: alive={} action={:?}", result.alive, result.action);
                }
                Ok(Err(e)) => error!("❌ Health check failed: {}", e),
                Err(e) => error!("❌ Health check task panicked: {}", e),
            }
        }
    }
}

/// health.log 里最后一条结果
pub fn last_result(health_log: &Path) -> Option<HealthCheckResult> {
    log_manager::tail(health_log, 1)
        .first()
        .and_then(|line| serde_json::from_str(line).ok())
}

fn outcome(
    timestamp: DateTime<Utc>,
    alive: bool,
    action: HealthAction,
    pid: Option<i32>,
    detail: Option<String>,
) -> HealthCheckResult {
    HealthCheckResult {
        timestamp,
        alive,
        action,
        pid,
        detail,
    }
}
