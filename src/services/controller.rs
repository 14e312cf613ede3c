use std::sync::Arc;

use crate::error::{Result, SupervisorError};
use crate::models::{StartOutcome, StopOutcome, SupervisorState};
use crate::services::{HealthMonitor, ProcessSupervisor};

/// 操作员入口（CLI 和 POST /api/bot/*）
///
/// 手动 start/restart 视为人工干预，会先清空重启账本解除 halted。
/// 清账和启动在同一次持锁中完成，健康检查不会插在两者之间。
pub struct Controller {
    supervisor: Arc<ProcessSupervisor>,
    monitor: Arc<HealthMonitor>,
}

impl Controller {
    pub fn new(supervisor: Arc<ProcessSupervisor>, monitor: Arc<HealthMonitor>) -> Self {
        Self { supervisor, monitor }
    }

    pub fn start(&self) -> Result<StartOutcome> {
        let lock = self.supervisor.lock()?;
        self.monitor.clear_ledger()?;
        self.supervisor.start_locked(&lock)
    }

    /// 服务管理器（开机自启）走的入口：不清账本，halted 时拒绝启动
    pub fn start_unattended(&self) -> Result<StartOutcome> {
        let lock = self.supervisor.lock()?;
        let ledger = self.monitor.ledger();
        if ledger.halted {
            return Err(SupervisorError::CrashLoopHalted {
                restarts: ledger.count(),
                window: self.monitor.policy().window,
            });
        }
        self.supervisor.start_locked(&lock)
    }

    pub fn stop(&self) -> Result<StopOutcome> {
        self.supervisor.stop()
    }

    pub fn restart(&self) -> Result<StartOutcome> {
        let lock = self.supervisor.lock()?;
        self.monitor.clear_ledger()?;
        self.supervisor.restart_locked(&lock)
    }

    pub fn state(&self) -> SupervisorState {
        self.supervisor.state()
    }
}
