use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 被监督进程的身份记录（PID 文件内容）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    /// 进程 ID，同时也是进程组 ID
    pub pid: i32,
    /// 启动时间
    pub started_at: DateTime<Utc>,
}

impl ProcessRecord {
    pub fn new(pid: i32) -> Self {
        Self {
            pid,
            started_at: Utc::now(),
        }
    }

    /// 按记录计算的运行秒数
    pub fn uptime_secs(&self, now: DateTime<Utc>) -> u64 {
        (now - self.started_at).num_seconds().max(0) as u64
    }
}

/// 监督器状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Stopped,
    Starting,
    Running,
    Stopping,
    /// 本次启动尝试失败（进程在宽限期内退出）
    FailedStart,
}

impl std::fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SupervisorState::Stopped => "STOPPED",
            SupervisorState::Starting => "STARTING",
            SupervisorState::Running => "RUNNING",
            SupervisorState::Stopping => "STOPPING",
            SupervisorState::FailedStart => "FAILED_START",
        };
        f.write_str(s)
    }
}

/// start() 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started(ProcessRecord),
    /// 已有存活进程，未做任何操作
    AlreadyRunning(ProcessRecord),
}

impl StartOutcome {
    pub fn record(&self) -> &ProcessRecord {
        match self {
            StartOutcome::Started(r) | StartOutcome::AlreadyRunning(r) => r,
        }
    }
}

/// stop() 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped { pid: i32, forced: bool },
    /// 没有运行中的进程，未做任何操作
    NotRunning,
}

impl std::fmt::Display for StartOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartOutcome::Started(r) => write!(f, "Engine started (PID {})", r.pid),
            StartOutcome::AlreadyRunning(r) => {
                write!(f, "AlreadyRunning: engine is already running (PID {})", r.pid)
            }
        }
    }
}

impl std::fmt::Display for StopOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopOutcome::Stopped { pid, forced: false } => write!(f, "Engine stopped (PID {})", pid),
            StopOutcome::Stopped { pid, forced: true } => {
                write!(f, "Engine stopped (PID {}, killed after grace period)", pid)
            }
            StopOutcome::NotRunning => write!(f, "NotRunning: engine is not running"),
        }
    }
}
