use chrono::Local;
use lazy_static::lazy_static;
use regex::Regex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, IsTerminal, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use crate::models::LogEntry;
use crate::services::registry::write_atomic;

lazy_static! {
    /// `timestamp - LEVEL - ...`，守护进程行在 `...` 里还有一个大写来源标签
    static ref LOG_LINE: Regex =
        Regex::new(r"^(?P<ts>.+?) - (?P<level>[A-Z]+) - (?P<rest>.*)$")
            .expect("log line pattern is valid");
    static ref SOURCE_TAG: Regex =
        Regex::new(r"^(?P<source>[A-Z][A-Z_]*) - (?P<msg>.*)$").expect("source tag pattern is valid");
}

/// 受管理的日志文件
#[derive(Debug, Clone)]
pub struct LogFile {
    pub path: PathBuf,
    /// 超过这个字节数就轮转
    pub max_size: u64,
    /// 轮转后保留的归档数
    pub retained_backups: usize,
}

/// 文件超过 `max_size` 时改名为归档，返回新归档路径
///
/// 用 rename 而不是复制后截断：仍然持有旧文件句柄的写者会把正在写的内容
/// 落进归档而不是丢掉，`RotatingWriter` 在下一次 flush 时发现文件已被换走并重新打开。
/// 这里不能打日志，daemon.log 的 writer 在 logger 内部调用它。
pub fn rotate(log: &LogFile) -> io::Result<Option<PathBuf>> {
    let size = match fs::metadata(&log.path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    if size <= log.max_size {
        return Ok(None);
    }

    let archive = reserve_archive(&log.path)?;
    if let Err(e) = fs::rename(&log.path, &archive) {
        let _ = fs::remove_file(&archive);
        // 另一个轮转者抢先了
        if e.kind() == io::ErrorKind::NotFound {
            return Ok(None);
        }
        return Err(e);
    }
    open_append(&log.path)?;

    prune_archives(log)?;
    Ok(Some(archive))
}

/// 只保留最新的 `retained_backups` 个归档，从最旧的开始删
pub fn prune_archives(log: &LogFile) -> io::Result<Vec<PathBuf>> {
    let archives = archives(&log.path)?;
    let excess = archives.len().saturating_sub(log.retained_backups);
    let mut removed = Vec::with_capacity(excess);
    for old in archives.into_iter().take(excess) {
        fs::remove_file(&old)?;
        removed.push(old);
    }
    Ok(removed)
}

/// 某个日志文件的全部归档，按时间从旧到新排序
pub fn archives(path: &Path) -> io::Result<Vec<PathBuf>> {
    let (dir, prefix) = match (path.parent(), path.file_name()) {
        (Some(dir), Some(name)) => (dir, format!("{}.", name.to_string_lossy())),
        _ => return Ok(Vec::new()),
    };
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut found: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .and_then(|n| n.strip_prefix(&prefix).map(str::to_owned))
                .map(|suffix| suffix.starts_with(|c: char| c.is_ascii_digit()))
                .unwrap_or(false)
        })
        .collect();
    found.sort();
    Ok(found)
}

/// 以 create_new 占住一个归档名，并发的轮转者不会拿到同一个名字
fn reserve_archive(path: &Path) -> io::Result<PathBuf> {
    let stamp = Local::now().format("%Y%m%d-%H%M%S%.3f").to_string();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "log".to_string());

    for n in 0..1000 {
        let candidate = if n == 0 {
            path.with_file_name(format!("{}.{}", name, stamp))
        } else {
            path.with_file_name(format!("{}.{}-{:03}", name, stamp, n))
        };
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free archive name for {}", path.display()),
    ))
}

/// 只保留最后 `max_lines` 行，用于高频写入的 health.log
pub fn truncate_tail(path: &Path, max_lines: usize) -> io::Result<()> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    let lines: Vec<&str> = content.lines().collect();
    if lines.len() <= max_lines {
        return Ok(());
    }

    let mut kept = lines[lines.len() - max_lines..].join("\n");
    if !kept.is_empty() {
        kept.push('\n');
    }
    write_atomic(path, kept.as_bytes())
}

/// 读取最后 n 行，文件不存在时返回空
pub fn tail(path: &Path, n: usize) -> Vec<String> {
    tail_since(path, 0, n)
}

/// 从字节偏移 `offset` 开始读取，返回其中最后 n 行
pub fn tail_since(path: &Path, offset: u64, n: usize) -> Vec<String> {
    let Ok(mut file) = File::open(path) else {
        return Vec::new();
    };
    let len = file.metadata().map(|m| m.len()).unwrap_or(0);
    // 文件被截断过，偏移失效
    let start = if offset > len { 0 } else { offset };
    if file.seek(SeekFrom::Start(start)).is_err() {
        return Vec::new();
    }

    let mut lines: Vec<String> = BufReader::new(file)
        .lines()
        .map_while(|l| l.ok())
        .collect();
    let skip = lines.len().saturating_sub(n);
    lines.drain(..skip);
    lines
}

/// 引擎日志行没有来源字段时使用的来源
pub const ENGINE_SOURCE: &str = "ENGINE";

/// 解析一行日志
///
/// 守护进程写 `timestamp - LEVEL - SOURCE - message`，引擎写
/// `timestamp - LEVEL - message`；没有大写来源标签的归到 `ENGINE`。
pub fn parse_line(line: &str) -> Option<LogEntry> {
    let caps = LOG_LINE.captures(line.trim_end())?;
    let rest = &caps["rest"];
    let (source, message) = match SOURCE_TAG.captures(rest) {
        Some(tagged) => (tagged["source"].to_string(), tagged["msg"].to_string()),
        None => (ENGINE_SOURCE.to_string(), rest.to_string()),
    };
    Some(LogEntry {
        timestamp: caps["ts"].to_string(),
        level: caps["level"].to_string(),
        source,
        message,
    })
}

/// 单写者的轮转日志：env_logger 的输出目标 (daemon.log)，也是引擎输出中继的落点 (engine.log)
///
/// 调用方对每条记录做一次 write_all + flush，轮转放在 flush 里，
/// 这样正在写的那一行一定已经落盘。别的进程轮转了同一个文件时，
/// 下一次 flush 重新打开活动文件。
pub struct RotatingWriter {
    log: LogFile,
    file: File,
    mirror_stderr: bool,
}

impl RotatingWriter {
    pub fn open(log: LogFile) -> io::Result<Self> {
        let file = open_append(&log.path)?;
        Ok(Self {
            log,
            file,
            mirror_stderr: io::stderr().is_terminal(),
        })
    }

    pub fn mirror_stderr(mut self, enabled: bool) -> Self {
        self.mirror_stderr = enabled;
        self
    }

    /// 活动文件已经不是我们打开的那个（被改名或删除）
    fn detached(&self) -> io::Result<bool> {
        let ours = self.file.metadata()?;
        Ok(match fs::metadata(&self.log.path) {
            Ok(current) => current.ino() != ours.ino() || current.dev() != ours.dev(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => return Err(e),
        })
    }
}

impl Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.file.write(buf)?;
        if self.mirror_stderr {
            let _ = io::stderr().write_all(&buf[..n]);
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.detached()? {
            self.file = open_append(&self.log.path)?;
        }
        if self.file.metadata()?.len() > self.log.max_size {
            rotate(&self.log)?;
            self.file = open_append(&self.log.path)?;
        }
        Ok(())
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// 把一个字节流（引擎的 stdout/stderr 管道）逐行写入 `writer`，直到 EOF
///
/// 引擎不直接持有 engine.log，轮转只发生在这一个写者的 flush 里。
pub fn relay<R: Read>(input: R, writer: &mut RotatingWriter) -> io::Result<u64> {
    let mut reader = BufReader::new(input);
    let mut line = Vec::with_capacity(256);
    let mut total = 0u64;
    loop {
        line.clear();
        let n = match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&line)?;
        writer.flush()?;
        total += n as u64;
    }
    Ok(total)
}

/// 读取整个文件的字节数，不存在为 0
pub fn file_len(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
