use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// 监督器错误类型
///
/// 每个变体的 Display 都以条件名开头，操作员看到的输出可以直接对照错误分类。
/// `AlreadyRunning` / `NotRunning` 是良性结果，不在这里，见 `StartOutcome` / `StopOutcome`。
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// 子进程在宽限期内退出，或根本无法启动
    #[error("StartFailed: {reason}{}", format_tail(.output))]
    StartFailed { reason: String, output: Vec<String> },

    /// 优雅终止和强制终止都用尽后进程仍然存活，注册表保持不变
    #[error("StopFailed: process {pid} is still alive after SIGKILL, kill it manually{}", format_tail(.output))]
    StopFailed { pid: i32, output: Vec<String> },

    /// 需要 root 权限的操作
    #[error("PermissionDenied: {action} requires root privileges")]
    PermissionDenied { action: String },

    /// 重启预算耗尽，只有手动 start 才能解除
    #[error("CrashLoopHalted: {restarts} restarts within {window:?}, manual start required")]
    CrashLoopHalted { restarts: usize, window: Duration },

    /// 注册表存储位置不可写
    #[error("RegistryWriteError: cannot write {path}: {source}")]
    RegistryWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 主机服务管理器命令失败
    #[error("ServiceManagerError: `{command}` failed: {detail}")]
    ServiceManager { command: String, detail: String },

    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    /// 稳定的 snake_case 标签，用于日志和 metrics
    pub fn as_label(&self) -> &'static str {
        match self {
            SupervisorError::StartFailed { .. } => "start_failed",
            SupervisorError::StopFailed { .. } => "stop_failed",
            SupervisorError::PermissionDenied { .. } => "permission_denied",
            SupervisorError::CrashLoopHalted { .. } => "crash_loop_halted",
            SupervisorError::RegistryWrite { .. } => "registry_write_error",
            SupervisorError::ServiceManager { .. } => "service_manager_error",
            SupervisorError::Io(_) => "io_error",
        }
    }
}

fn format_tail(lines: &[String]) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n--- last log lines ---");
    for line in lines {
        out.push('\n');
        out.push_str(line);
    }
    out
}

pub type Result<T> = std::result::Result<T, SupervisorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_starts_with_condition_name() {
        let err = SupervisorError::StartFailed {
            reason: "exited with status 3".into(),
            output: vec!["boom".into()],
        };
        let text = err.to_string();
        assert!(text.starts_with("StartFailed: exited with status 3"));
        assert!(text.contains("--- last log lines ---\nboom"));
        assert_eq!(err.as_label(), "start_failed");
    }

    #[test]
    fn test_display_without_output_has_no_tail() {
        let err = SupervisorError::StopFailed { pid: 42, output: vec![] };
        assert!(!err.to_string().contains("last log lines"));
    }
}
