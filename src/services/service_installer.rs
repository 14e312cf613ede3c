use log::{info, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::error::{Result, SupervisorError};

pub const UNIT_NAME: &str = "trading-bot.service";

/// 交给主机服务管理器的描述，随时可以重新生成
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub description: String,
    pub start_command: String,
    pub stop_command: String,
    pub working_directory: PathBuf,
    /// 给 ExecStop 留的时间，要大于监督器自己的停止宽限期
    pub stop_timeout: Duration,
}

impl ServiceDescriptor {
    /// 以当前可执行文件为入口，start/stop 都回调到本程序
    ///
    /// 开机拉起用 `start --respect-halt`：halted 时拒绝启动，也不清空重启账本。
    pub fn for_executable(exe: &Path, home: &Path, stop_timeout: Duration) -> Self {
        let base = format!("{} --home {}", quote(exe), quote(home));
        Self {
            description: "Trading bot (supervised)".to_string(),
            start_command: format!("{} start --respect-halt", base),
            stop_command: format!("{} stop", base),
            working_directory: home.to_path_buf(),
            stop_timeout,
        }
    }

    /// 渲染为 systemd unit 文件
    ///
    /// start 命令拉起引擎后就退出，所以用 Type=forking，主 PID 由 systemd 推断。
    /// 崩溃后的重启只由健康检查按重启策略决定，systemd 自身不重启（Restart=no）。
    pub fn render(&self) -> String {
        let home = self.working_directory.display();
        format!(
            "[Unit]\n\
             Description={description}\n\
             After=network-online.target\n\
             Wants=network-online.target\n\
             \n\
             [Service]\n\
             Type=forking\n\
             WorkingDirectory={home}\n\
             EnvironmentFile=-{home}/.env\n\
             ExecStart={start}\n\
             ExecStop={stop}\n\
             Restart=no\n\
             TimeoutStopSec={stop_timeout}\n\
             \n\
             [Install]\n\
             WantedBy=multi-user.target\n",
            description = self.description,
            home = home,
            start = self.start_command,
            stop = self.stop_command,
            stop_timeout = self.stop_timeout.as_secs() + 10,
        )
    }
}

fn quote(path: &Path) -> String {
    let s = path.display().to_string();
    if s.contains(char::is_whitespace) {
        format!("\"{}\"", s)
    } else {
        s
    }
}

/// 主机服务管理器
pub trait ServiceManager {
    fn is_privileged(&self) -> bool;
    fn reload(&self) -> Result<()>;
    fn enable(&self, unit: &str) -> Result<()>;
    fn disable(&self, unit: &str) -> Result<()>;
    fn stop(&self, unit: &str) -> Result<()>;
}

/// 通过 systemctl 操作 systemd
pub struct Systemctl;

impl Systemctl {
    fn run(&self, args: &[&str]) -> Result<()> {
        let command = format!("systemctl {}", args.join(" "));
        let output = Command::new("systemctl").args(args).output().map_err(|e| {
            SupervisorError::ServiceManager {
                command: command.clone(),
                detail: e.to_string(),
            }
        })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(SupervisorError::ServiceManager {
                command,
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl ServiceManager for Systemctl {
    fn is_privileged(&self) -> bool {
        nix::unistd::geteuid().is_root()
    }

    fn reload(&self) -> Result<()> {
        self.run(&["daemon-reload"])
    }

    fn enable(&self, unit: &str) -> Result<()> {
        self.run(&["enable", unit])
    }

    fn disable(&self, unit: &str) -> Result<()> {
        self.run(&["disable", unit])
    }

    fn stop(&self, unit: &str) -> Result<()> {
        self.run(&["stop", unit])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    /// 描述未变化，没有做任何修改
    Unchanged,
}

/// 注册/注销 systemd 服务
pub struct ServiceInstaller<M: ServiceManager> {
    manager: M,
    unit_dir: PathBuf,
    unit_name: String,
}

impl<M: ServiceManager> ServiceInstaller<M> {
    pub fn new(manager: M, unit_dir: impl Into<PathBuf>) -> Self {
        Self {
            manager,
            unit_dir: unit_dir.into(),
            unit_name: UNIT_NAME.to_string(),
        }
    }

    pub fn unit_path(&self) -> PathBuf {
        self.unit_dir.join(&self.unit_name)
    }

    fn require_privilege(&self, action: &str) -> Result<()> {
        if self.manager.is_privileged() {
            Ok(())
        } else {
            Err(SupervisorError::PermissionDenied {
                action: action.to_string(),
            })
        }
    }

    pub fn install(&self, descriptor: &ServiceDescriptor) -> Result<InstallOutcome> {
        self.require_privilege("install-service")?;

        let path = self.unit_path();
        let rendered = descriptor.render();
        let current = match fs::read_to_string(&path) {
            Ok(text) => Some(text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        if current.as_deref() == Some(rendered.as_str()) {
            info!("ℹ️  {} is up to date", path.display());
            return Ok(InstallOutcome::Unchanged);
        }

        fs::create_dir_all(&self.unit_dir)?;
        fs::write(&path, rendered)?;
        self.manager.reload()?;
        self.manager.enable(&self.unit_name)?;
        info!("✅ Installed {}", path.display());
        Ok(InstallOutcome::Installed)
    }

    /// 未安装时返回 false
    pub fn uninstall(&self) -> Result<bool> {
        self.require_privilege("uninstall-service")?;

        let path = self.unit_path();
        if !path.exists() {
            info!("ℹ️  {} is not installed", self.unit_name);
            return Ok(false);
        }

        if let Err(e) = self.manager.stop(&self.unit_name) {
            warn!("⚠️  {}", e);
        }
        if let Err(e) = self.manager.disable(&self.unit_name) {
            warn!("⚠️  {}", e);
        }
        fs::remove_file(&path)?;
        self.manager.reload()?;
        info!("🗑️  Removed {}", path.display());
        Ok(true)
    }
}
