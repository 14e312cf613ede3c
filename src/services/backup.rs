use chrono::Local;
use log::info;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const PREFIX: &str = "config_";

/// 配置备份：每次生成一个带时间戳的目录，只保留最新的 `keep` 份
pub struct BackupManager {
    dir: PathBuf,
    keep: usize,
}

impl BackupManager {
    pub fn new(dir: impl Into<PathBuf>, keep: usize) -> Self {
        Self {
            dir: dir.into(),
            keep,
        }
    }

    /// 复制存在的文件，一个都不存在时报错
    pub fn backup(&self, sources: &[PathBuf]) -> io::Result<PathBuf> {
        let present: Vec<&PathBuf> = sources.iter().filter(|p| p.is_file()).collect();
        if present.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "no configuration files found to back up",
            ));
        }

        let target = self.next_dir();
        fs::create_dir_all(&target)?;
        for source in present {
            if let Some(name) = source.file_name() {
                fs::copy(source, target.join(name))?;
            }
        }
        info!("💾 Configuration backed up to {}", target.display());

        self.prune()?;
        Ok(target)
    }

    fn next_dir(&self) -> PathBuf {
        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let base = self.dir.join(format!("{}{}", PREFIX, stamp));
        if !base.exists() {
            return base;
        }
        (1..)
            .map(|n| self.dir.join(format!("{}{}-{:03}", PREFIX, stamp, n)))
            .find(|p| !p.exists())
            .unwrap_or(base)
    }

    /// 从旧到新
    pub fn list(&self) -> io::Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut found: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir() && has_prefix(p))
            .collect();
        found.sort();
        Ok(found)
    }

    fn prune(&self) -> io::Result<()> {
        let all = self.list()?;
        let excess = all.len().saturating_sub(self.keep);
        for old in all.into_iter().take(excess) {
            fs::remove_dir_all(&old)?;
            info!("🗑️  Removed old backup {}", old.display());
        }
        Ok(())
    }
}

fn has_prefix(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with(PREFIX))
        .unwrap_or(false)
}
