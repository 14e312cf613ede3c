use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Bot Supervisor - 交易机器人 7x24 进程守护
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// 工作目录，run/ logs/ backups/ data/ 都在这里
    #[arg(long, env = "BOT_HOME", default_value = ".", global = true)]
    pub home: PathBuf,

    /// 引擎启动命令
    #[arg(long, env = "ENGINE_CMD", default_value = "python3 src/daemon_manager.py start", global = true)]
    pub engine_cmd: String,

    /// 引擎配置文件路径（只检查是否存在）
    #[arg(long, env = "ENGINE_CONFIG", default_value = "config.yaml", global = true)]
    pub config: PathBuf,

    /// 日志级别 (env_logger 过滤语法)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// 是否自动重启
    #[arg(long, env = "AUTO_RESTART", default_value_t = true, action = clap::ArgAction::Set, global = true)]
    pub auto_restart: bool,

    /// 窗口内最大重启次数
    #[arg(long, env = "MAX_RESTARTS", default_value_t = 5, global = true)]
    pub max_restarts: usize,

    /// 重启窗口 (秒)
    #[arg(long, env = "RESTART_WINDOW", default_value_t = 3600, global = true)]
    pub restart_window: u64,

    /// 退避基数 (秒)
    #[arg(long, env = "BACKOFF_BASE", default_value_t = 60, global = true)]
    pub backoff_base: u64,

    /// 健康检查间隔 (秒)
    #[arg(long, env = "HEALTH_CHECK_INTERVAL", default_value_t = 300, global = true)]
    pub health_interval: u64,

    /// restart 中 stop 与 start 之间的等待 (秒)
    #[arg(long, env = "RECONNECT_DELAY", default_value_t = 5, global = true)]
    pub reconnect_delay: u64,

    /// 启动后确认存活的宽限期 (秒)
    #[arg(long, env = "START_GRACE", default_value_t = 3, global = true)]
    pub start_grace: u64,

    /// SIGTERM 之后等待退出的最长时间 (秒)
    #[arg(long, env = "STOP_TIMEOUT", default_value_t = 30, global = true)]
    pub stop_timeout: u64,

    /// 单个日志文件的最大字节数
    #[arg(long, env = "LOG_MAX_SIZE", default_value_t = 10 * 1024 * 1024, global = true)]
    pub log_max_size: u64,

    /// 保留的日志归档数
    #[arg(long, env = "LOG_BACKUPS", default_value_t = 5, global = true)]
    pub log_backups: usize,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 启动交易引擎（同时清除 halted 状态）
    Start {
        /// 保留 halted 状态，halted 时拒绝启动（systemd ExecStart 使用）
        #[arg(long, hide = true)]
        respect_halt: bool,
    },
    /// 停止交易引擎
    Stop,
    /// 重启交易引擎
    Restart,
    /// 显示运行状态
    Status,
    /// 显示某类日志的末尾
    Logs {
        #[arg(value_enum)]
        category: LogCategory,
        /// 行数
        #[arg(short = 'n', long, default_value_t = 50)]
        lines: usize,
    },
    /// 备份配置文件
    Backup,
    /// 执行一次健康检查（供 cron 调用）
    Check,
    /// 注册为 systemd 服务
    InstallService {
        /// unit 文件目录
        #[arg(long, default_value = "/etc/systemd/system")]
        unit_dir: PathBuf,
    },
    /// 移除 systemd 服务
    UninstallService {
        #[arg(long, default_value = "/etc/systemd/system")]
        unit_dir: PathBuf,
    },
    /// 从 stdin 读取引擎输出并写入轮转的 engine.log（由监督器自己拉起）
    #[command(hide = true)]
    RelayLog,
    /// 启动状态 API 和内部健康检查定时器
    Serve {
        /// 监听端口
        #[arg(short, long, env = "PORT", default_value_t = 8000)]
        port: u16,

        /// 监听地址
        #[arg(short = 'a', long, env = "ADDRESS", default_value = "0.0.0.0")]
        address: String,
    },
}

/// 日志类别
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCategory {
    /// 守护进程自身日志
    Daemon,
    /// 引擎 stdout/stderr
    Engine,
    /// 健康检查记录
    System,
}
