use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cli::CommandArgs;
use crate::models::RestartPolicy;
use crate::services::{
    BackupManager, Controller, EngineStatusFile, HealthMonitor, LedgerStore, LogFile,
    PidFileRegistry, ProcessRegistry, ProcessSupervisor, StatsCollector, StatusReporter,
    SupervisorSettings,
};

/// health.log 保留的最大行数
pub const HEALTH_LOG_MAX_LINES: usize = 1000;
/// 配置备份保留份数
pub const BACKUP_KEEP: usize = 10;
/// 快照里附带的日志行数
pub const SNAPSHOT_LOG_LINES: usize = 20;

/// 由命令行/环境变量解析出的完整运行配置
///
/// 所有路径都挂在 `home` 下面，所有组件都从这里构造，保证同一主机上的
/// 每次调用看到的是同一个注册表位置。
#[derive(Debug, Clone)]
pub struct Settings {
    pub home: PathBuf,
    pub engine_command: Vec<String>,
    pub config_path: PathBuf,
    pub log_filter: String,
    pub auto_restart: bool,
    pub restart_policy: RestartPolicy,
    pub health_interval: Duration,
    pub restart_delay: Duration,
    pub start_grace: Duration,
    pub stop_timeout: Duration,
    pub log_max_size: u64,
    pub log_backups: usize,
}

impl Settings {
    pub fn from_args(args: &CommandArgs) -> Self {
        let home = args.home.clone();
        Self {
            config_path: resolve(&home, &args.config),
            engine_command: args.engine_cmd.split_whitespace().map(String::from).collect(),
            log_filter: args.log_level.clone(),
            auto_restart: args.auto_restart,
            restart_policy: RestartPolicy {
                max_restarts: args.max_restarts,
                window: Duration::from_secs(args.restart_window),
                backoff_base: Duration::from_secs(args.backoff_base),
            },
            health_interval: Duration::from_secs(args.health_interval),
            restart_delay: Duration::from_secs(args.reconnect_delay),
            start_grace: Duration::from_secs(args.start_grace),
            stop_timeout: Duration::from_secs(args.stop_timeout),
            log_max_size: args.log_max_size,
            log_backups: args.log_backups,
            home,
        }
    }

    pub fn registry_path(&self) -> PathBuf {
        self.home.join("run").join("bot.pid.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.home.join("run").join("supervisor.lock")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.home.join("run").join("restart_ledger.json")
    }

    pub fn daemon_log(&self) -> LogFile {
        self.log_file("daemon.log")
    }

    pub fn engine_log(&self) -> LogFile {
        self.log_file("engine.log")
    }

    pub fn health_log_path(&self) -> PathBuf {
        self.home.join("logs").join("health.log")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.home.join("backups")
    }

    pub fn engine_status_path(&self) -> PathBuf {
        self.home.join("data").join("engine_status.json")
    }

    fn log_file(&self, name: &str) -> LogFile {
        LogFile {
            path: self.home.join("logs").join(name),
            max_size: self.log_max_size,
            retained_backups: self.log_backups,
        }
    }

    pub fn registry(&self) -> Arc<dyn ProcessRegistry> {
        Arc::new(PidFileRegistry::new(self.registry_path()))
    }

    pub fn supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            command: self.engine_command.clone(),
            working_dir: self.home.clone(),
            engine_log: self.engine_log().path,
            config_path: Some(self.config_path.clone()),
            start_grace: self.start_grace,
            stop_timeout: self.stop_timeout,
            restart_delay: self.restart_delay,
            log_relay: self.relay_command(),
            lock_path: self.lock_path(),
            ..SupervisorSettings::default()
        }
    }

    /// 引擎输出中继：重新调用本程序的隐藏子命令 `relay-log`
    ///
    /// 中继是 engine.log 唯一的写入者，轮转由它在写入之间完成。
    /// 找不到自身可执行文件时退回到引擎直接追加写文件。
    pub fn relay_command(&self) -> Option<Vec<String>> {
        let exe = match std::env::current_exe() {
            Ok(exe) => exe,
            Err(e) => {
                log::warn!("Cannot locate own executable, engine log relay disabled: {}", e);
                return None;
            }
        };
        let home = if self.home.is_absolute() {
            self.home.clone()
        } else {
            std::env::current_dir().ok()?.join(&self.home)
        };
        Some(vec![
            exe.display().to_string(),
            "--home".to_string(),
            home.display().to_string(),
            "--log-max-size".to_string(),
            self.log_max_size.to_string(),
            "--log-backups".to_string(),
            self.log_backups.to_string(),
            "relay-log".to_string(),
        ])
    }

    pub fn supervisor(&self) -> Arc<ProcessSupervisor> {
        Arc::new(ProcessSupervisor::new(self.registry(), self.supervisor_settings()))
    }

    pub fn monitor(&self) -> Arc<HealthMonitor> {
        let supervisor = self.supervisor();
        Arc::new(
            HealthMonitor::new(
                supervisor.registry(),
                supervisor,
                LedgerStore::new(self.ledger_path()),
                self.health_log_path(),
            )
            .with_policy(self.restart_policy)
            .with_auto_restart(self.auto_restart)
            .with_max_log_lines(HEALTH_LOG_MAX_LINES)
            .with_maintained_logs(vec![self.engine_log()]),
        )
    }

    pub fn controller(&self) -> Controller {
        let monitor = self.monitor();
        Controller::new(monitor.supervisor(), monitor)
    }

    pub fn reporter(&self, stats: Arc<StatsCollector>) -> StatusReporter {
        StatusReporter {
            registry: self.registry(),
            ledger: LedgerStore::new(self.ledger_path()),
            stats,
            engine: Arc::new(EngineStatusFile::new(self.engine_status_path())),
            daemon_log: self.daemon_log().path,
            engine_log: self.engine_log().path,
            health_log: self.health_log_path(),
            tail_lines: SNAPSHOT_LOG_LINES,
            window: self.restart_policy.window,
        }
    }

    pub fn backup_manager(&self) -> BackupManager {
        BackupManager::new(self.backups_dir(), BACKUP_KEEP)
    }

    /// 需要备份的文件：引擎配置以及 home 下的 .env
    pub fn backup_sources(&self) -> Vec<PathBuf> {
        vec![self.config_path.clone(), self.home.join(".env")]
    }
}

fn resolve(home: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        home.join(path)
    }
}
