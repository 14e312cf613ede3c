use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use crate::error::{Result, SupervisorError};

/// 生命周期互斥锁：`run/supervisor.lock` 上的排他 flock
///
/// start/stop/restart 以及一次完整的健康检查都在持锁状态下执行，
/// 不同进程（CLI、cron、serve）和同一进程内的不同线程之间都互斥。
/// 文件句柄关闭时内核自动释放，进程崩溃也不会留下死锁。
/// 状态查询不拿这把锁。
pub struct LifecycleLock {
    _file: File,
}

impl LifecycleLock {
    /// 阻塞直到拿到锁
    pub fn acquire(path: &Path) -> Result<Self> {
        let fail = |source: io::Error| SupervisorError::RegistryWrite {
            path: path.to_path_buf(),
            source,
        };

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(fail)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)
            .map_err(fail)?;
        FileExt::lock_exclusive(&file).map_err(fail)?;

        // 只用于排查，写失败不影响锁本身
        let _ = file.set_len(0);
        let _ = writeln!(file, "{}", std::process::id());
        log::debug!("Acquired lifecycle lock {}", path.display());
        Ok(Self { _file: file })
    }
}
