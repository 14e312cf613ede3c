use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use sysinfo::{ProcessStatus as SysProcessStatus, ProcessesToUpdate, System};
use tempfile::NamedTempFile;

use crate::error::{Result, SupervisorError};
use crate::models::ProcessRecord;

/// 被监督进程的注册表
///
/// 实现必须保证写入对并发读者是原子的，读取永不失败（缺失或损坏都视为无记录）。
pub trait ProcessRegistry: Send + Sync {
    fn read(&self) -> Option<ProcessRecord>;

    fn write(&self, record: &ProcessRecord) -> Result<()>;

    /// 幂等，记录不存在不是错误
    fn clear(&self) -> Result<()>;

    /// 不发送破坏性信号地探测进程是否存在
    fn is_live(&self, record: &ProcessRecord) -> bool {
        pid_alive(record.pid)
    }

    /// 读取记录，只返回仍然存活的
    fn read_live(&self) -> Option<ProcessRecord> {
        self.read().filter(|r| self.is_live(r))
    }
}

/// 基于 JSON PID 文件的注册表，写入走临时文件 + rename
pub struct PidFileRegistry {
    path: PathBuf,
}

impl PidFileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ProcessRegistry for PidFileRegistry {
    fn read(&self) -> Option<ProcessRecord> {
        let raw = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("Ignoring unreadable registry {}: {}", self.path.display(), e);
                None
            }
        }
    }

    fn write(&self, record: &ProcessRecord) -> Result<()> {
        let body = serde_json::to_vec_pretty(record).map_err(io::Error::from);
        body.and_then(|bytes| write_atomic(&self.path, &bytes))
            .map_err(|source| SupervisorError::RegistryWrite {
                path: self.path.clone(),
                source,
            })
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SupervisorError::RegistryWrite {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// 写临时文件后 rename 到目标位置，读者要么看到旧内容，要么看到完整的新内容
///
/// 临时文件名由 tempfile 随机生成，同一进程内的并发写者互不干扰。
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// 检查 PID 是否对应一个存活进程
///
/// 信号 0 只做权限和存在性检查；已退出但未回收的僵尸进程视为已死亡。
/// PID 复用无法识别。
pub fn pid_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    match kill(Pid::from_raw(pid), None::<Signal>) {
        Ok(()) | Err(Errno::EPERM) => !is_zombie(pid),
        Err(_) => false,
    }
}

fn is_zombie(pid: i32) -> bool {
    let sys_pid = sysinfo::Pid::from_u32(pid as u32);
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);
    matches!(
        sys.process(sys_pid).map(|p| p.status()),
        Some(SysProcessStatus::Zombie)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn test_read_missing_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let registry = PidFileRegistry::new(dir.path().join("run/bot.pid.json"));
        assert!(registry.read().is_none());
    }

    #[test]
    fn test_write_read_clear() {
        let dir = tempfile::tempdir().unwrap();
        let registry = PidFileRegistry::new(dir.path().join("run/bot.pid.json"));
        let record = ProcessRecord::new(std::process::id() as i32);

        registry.write(&record).unwrap();
        assert_eq!(registry.read(), Some(record));

        registry.clear().unwrap();
        assert!(registry.read().is_none());
        // 再次清除也不报错
        registry.clear().unwrap();
    }

    #[test]
    fn test_write_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let registry = PidFileRegistry::new(dir.path().join("bot.pid.json"));
        registry.write(&ProcessRecord::new(1)).unwrap();
        registry.write(&ProcessRecord::new(2)).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["bot.pid.json".to_string()]);
        assert_eq!(registry.read().map(|r| r.pid), Some(2));
    }

    #[test]
    fn test_concurrent_writers_in_one_process() {
        let dir = tempfile::tempdir().unwrap();
        let registry = std::sync::Arc::new(PidFileRegistry::new(dir.path().join("run/bot.pid.json")));
        let barrier = std::sync::Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (1..=8)
            .map(|pid| {
                let (registry, barrier) = (registry.clone(), barrier.clone());
                std::thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..20 {
                        registry.write(&ProcessRecord::new(pid)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let pid = registry.read().expect("a complete record").pid;
        assert!((1..=8).contains(&pid));
        let leftovers = fs::read_dir(dir.path().join("run")).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_corrupt_registry_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot.pid.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(PidFileRegistry::new(&path).read().is_none());
    }

    #[test]
    fn test_write_to_unwritable_location_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("run");
        fs::write(&blocker, "a file, not a directory").unwrap();
        let registry = PidFileRegistry::new(blocker.join("bot.pid.json"));

        let err = registry.write(&ProcessRecord::new(1)).unwrap_err();
        assert_eq!(err.as_label(), "registry_write_error");
    }

    #[test]
    fn test_liveness_check() {
        assert!(pid_alive(std::process::id() as i32));
        assert!(!pid_alive(0));
        assert!(!pid_alive(-5));

        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id() as i32;
        child.wait().unwrap();
        assert!(!pid_alive(pid));
    }

    #[test]
    fn test_unreaped_child_is_not_live() {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id() as i32;
        // 不 wait，让它变成僵尸
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while pid_alive(pid) && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        assert!(!pid_alive(pid));
        child.wait().unwrap();
    }
}
