use log::{error, info, warn};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{kill, Signal};
use nix::unistd::{pipe2, Pid};
use std::fs::{self, OpenOptions};
use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Result, SupervisorError};
use crate::models::{ProcessRecord, ProcessStats, StartOutcome, StopOutcome, SupervisorState};
use crate::services::lock::LifecycleLock;
use crate::services::log_manager::{file_len, tail, tail_since};
use crate::services::registry::{pid_alive, ProcessRegistry};
use crate::services::StatsCollector;

/// 启动失败时等待中继把剩余输出写完的上限
const RELAY_DRAIN: Duration = Duration::from_secs(2);

/// 监督器的固定参数
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// 程序和参数
    pub command: Vec<String>,
    pub working_dir: PathBuf,
    /// 引擎输出最终写入的文件
    pub engine_log: PathBuf,
    /// 输出中继命令：从 stdin 读取引擎输出并写入 engine.log。
    /// None 时引擎直接以 O_APPEND 写文件
    pub log_relay: Option<Vec<String>>,
    /// 生命周期锁文件
    pub lock_path: PathBuf,
    /// 配置存在性检查，None 表示不检查
    pub config_path: Option<PathBuf>,
    /// 启动后确认存活的宽限期
    pub start_grace: Duration,
    /// SIGTERM 之后的最长等待
    pub stop_timeout: Duration,
    /// 存活轮询间隔
    pub poll_interval: Duration,
    /// SIGKILL 之后的确认等待
    pub kill_confirm: Duration,
    /// restart 中 stop 与 start 之间的等待
    pub restart_delay: Duration,
    /// 失败时附带的日志行数
    pub output_lines: usize,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            working_dir: PathBuf::from("."),
            engine_log: PathBuf::from("logs/engine.log"),
            log_relay: None,
            lock_path: PathBuf::from("run/supervisor.lock"),
            config_path: None,
            start_grace: Duration::from_secs(3),
            stop_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
            kill_confirm: Duration::from_secs(2),
            restart_delay: Duration::from_secs(5),
            output_lines: 20,
        }
    }
}

/// status() 的结果
#[derive(Debug, Clone)]
pub struct ProcessReport {
    pub record: Option<ProcessRecord>,
    pub stats: ProcessStats,
}

/// 终止阶段的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited,
    StillAlive,
}

/// 进程生命周期管理
///
/// 不持有跨调用的状态：每个修改操作都在生命周期锁内重新读取注册表并确认存活，
/// 所以并发的 start 只会有一个真正拉起进程，其余的看到 AlreadyRunning。
pub struct ProcessSupervisor {
    registry: Arc<dyn ProcessRegistry>,
    settings: SupervisorSettings,
    stats: StatsCollector,
    state: Mutex<SupervisorState>,
}

impl ProcessSupervisor {
    pub fn new(registry: Arc<dyn ProcessRegistry>, settings: SupervisorSettings) -> Self {
        Self {
            registry,
            settings,
            stats: StatsCollector::new(),
            state: Mutex::new(SupervisorState::Stopped),
        }
    }

    pub fn registry(&self) -> Arc<dyn ProcessRegistry> {
        self.registry.clone()
    }

    pub fn state(&self) -> SupervisorState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(SupervisorState::Stopped)
    }

    fn transition(&self, to: SupervisorState) {
        if let Ok(mut state) = self.state.lock() {
            if *state != to {
                log::debug!("Supervisor state {} -> {}", *state, to);
                *state = to;
            }
        }
    }

    /// 阻塞获取生命周期锁；需要把多个步骤放进同一临界区的调用方用它
    pub fn lock(&self) -> Result<LifecycleLock> {
        LifecycleLock::acquire(&self.settings.lock_path)
    }

    pub fn start(&self) -> Result<StartOutcome> {
        let lock = self.lock()?;
        self.start_locked(&lock)
    }

    /// 调用方已经持有生命周期锁
    pub fn start_locked(&self, _lock: &LifecycleLock) -> Result<StartOutcome> {
        if let Some(record) = self.registry.read() {
            if self.registry.is_live(&record) {
                info!("ℹ️  Engine already running (PID {})", record.pid);
                self.transition(SupervisorState::Running);
                return Ok(StartOutcome::AlreadyRunning(record));
            }
            warn!(
                "StaleRegistry: PID {} recorded at {} is gone, discarding",
                record.pid, record.started_at
            );
            self.registry.clear()?;
        }

        if let Some(config) = &self.settings.config_path {
            if !config.exists() {
                self.transition(SupervisorState::FailedStart);
                return Err(SupervisorError::StartFailed {
                    reason: format!("config file {} not found", config.display()),
                    output: Vec::new(),
                });
            }
        }

        self.transition(SupervisorState::Starting);

        let log_offset = file_len(&self.settings.engine_log);
        let (mut child, relay) = match self.spawn() {
            Ok(spawned) => spawned,
            Err(e) => {
                self.transition(SupervisorState::FailedStart);
                return Err(SupervisorError::StartFailed {
                    reason: format!("cannot spawn `{}`: {}", self.settings.command.join(" "), e),
                    output: Vec::new(),
                });
            }
        };

        let record = ProcessRecord::new(child.id() as i32);
        info!("🚀 Spawned engine PID {}: {}", record.pid, self.settings.command.join(" "));

        if let Err(e) = self.registry.write(&record) {
            // 无法登记的进程不能留下
            let _ = child.kill();
            let _ = child.wait();
            if let Some(relay) = relay {
                reap_in_background(relay, "Log relay");
            }
            self.transition(SupervisorState::FailedStart);
            return Err(e);
        }

        let early_exit = wait_for_exit(&mut child, self.settings.start_grace, self.settings.poll_interval);
        let failure = match early_exit {
            Some(status) => Some(format!(
                "engine exited within {:?} grace period ({})",
                self.settings.start_grace, status
            )),
            None if !self.registry.is_live(&record) => Some(format!(
                "engine PID {} is not alive after {:?} grace period",
                record.pid, self.settings.start_grace
            )),
            None => None,
        };

        if let Some(reason) = failure {
            self.registry.clear()?;
            self.transition(SupervisorState::FailedStart);
            if let Some(mut relay) = relay {
                // 等中继把引擎最后的输出写进日志
                if wait_for_exit(&mut relay, RELAY_DRAIN, self.settings.poll_interval).is_none() {
                    reap_in_background(relay, "Log relay");
                }
            }
            let output = tail_since(&self.settings.engine_log, log_offset, self.settings.output_lines);
            error!("❌ StartFailed: {}", reason);
            return Err(SupervisorError::StartFailed { reason, output });
        }

        reap_in_background(child, "Engine");
        if let Some(relay) = relay {
            reap_in_background(relay, "Log relay");
        }
        self.transition(SupervisorState::Running);
        info!("✅ Engine running (PID {})", record.pid);
        Ok(StartOutcome::Started(record))
    }

    /// 拉起引擎，配置了中继时同时拉起中继并用管道连接两者
    fn spawn(&self) -> io::Result<(Child, Option<Child>)> {
        let (program, args) = self
            .settings
            .command
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "engine command is empty"))?;

        let (stdout, stderr, relay) = match &self.settings.log_relay {
            Some(relay_command) => {
                // CLOEXEC：管道两端只通过 dup2 出现在各自子进程的标准流上，
                // 否则中继会继承写端，永远等不到 EOF
                let (rx, tx) = pipe2(OFlag::O_CLOEXEC)?;
                let relay = self.spawn_relay(relay_command, rx)?;
                (Stdio::from(tx.try_clone()?), Stdio::from(tx), Some(relay))
            }
            None => {
                if let Some(dir) = self.settings.engine_log.parent() {
                    fs::create_dir_all(dir)?;
                }
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.settings.engine_log)?;
                (Stdio::from(file.try_clone()?), Stdio::from(file), None)
            }
        };

        let engine = Command::new(program)
            .args(args)
            .current_dir(&self.settings.working_dir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            // 独立进程组：不随调用方的终端信号退出，停止时可以整组发送信号
            .process_group(0)
            .spawn();

        match engine {
            Ok(child) => Ok((child, relay)),
            Err(e) => {
                // 写端已随 Command 一起关闭，中继会自己退出
                if let Some(relay) = relay {
                    reap_in_background(relay, "Log relay");
                }
                Err(e)
            }
        }
    }

    fn spawn_relay(&self, command: &[String], input: OwnedFd) -> io::Result<Child> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "log relay command is empty"))?;
        Command::new(program)
            .args(args)
            .current_dir(&self.settings.working_dir)
            .stdin(Stdio::from(input))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            // 不在引擎的进程组里：stop 发给引擎组的信号不会打断中继，它读到 EOF 后自行退出
            .process_group(0)
            .spawn()
    }

    pub fn stop(&self) -> Result<StopOutcome> {
        let lock = self.lock()?;
        self.stop_locked(&lock)
    }

    pub fn stop_locked(&self, _lock: &LifecycleLock) -> Result<StopOutcome> {
        let record = match self.registry.read() {
            Some(record) => record,
            None => {
                info!("ℹ️  Engine is not running");
                self.transition(SupervisorState::Stopped);
                return Ok(StopOutcome::NotRunning);
            }
        };
        if !self.registry.is_live(&record) {
            warn!("StaleRegistry: PID {} is gone, discarding", record.pid);
            self.registry.clear()?;
            self.transition(SupervisorState::Stopped);
            return Ok(StopOutcome::NotRunning);
        }

        self.transition(SupervisorState::Stopping);
        info!("⏹️  Stopping engine PID {} (SIGTERM)", record.pid);

        let mut forced = false;
        if terminate_graceful(record.pid, self.settings.stop_timeout, self.settings.poll_interval)
            == Termination::StillAlive
        {
            warn!(
                "⚠️  PID {} ignored SIGTERM for {:?}, sending SIGKILL",
                record.pid, self.settings.stop_timeout
            );
            forced = true;
            if terminate_forceful(record.pid, self.settings.kill_confirm, self.settings.poll_interval)
                == Termination::StillAlive
            {
                self.transition(SupervisorState::Running);
                let output = tail(&self.settings.engine_log, self.settings.output_lines);
                error!("❌ StopFailed: PID {} survived SIGKILL", record.pid);
                return Err(SupervisorError::StopFailed { pid: record.pid, output });
            }
        }

        self.registry.clear()?;
        self.transition(SupervisorState::Stopped);
        info!("✅ Engine PID {} stopped{}", record.pid, if forced { " (forced)" } else { "" });
        Ok(StopOutcome::Stopped { pid: record.pid, forced })
    }

    /// stop 失败时不会尝试 start
    pub fn restart(&self) -> Result<StartOutcome> {
        let lock = self.lock()?;
        self.restart_locked(&lock)
    }

    pub fn restart_locked(&self, lock: &LifecycleLock) -> Result<StartOutcome> {
        info!("🔄 Restarting engine");
        if let StopOutcome::Stopped { .. } = self.stop_locked(lock)? {
            thread::sleep(self.settings.restart_delay);
        }
        self.start_locked(lock)
    }

    /// 只读，不拿生命周期锁
    pub fn status(&self) -> ProcessReport {
        match self.registry.read_live() {
            Some(record) => {
                let stats = self.stats.collect_sampled(record.pid).unwrap_or_default();
                ProcessReport {
                    record: Some(record),
                    stats,
                }
            }
            None => ProcessReport {
                record: None,
                stats: ProcessStats::empty(),
            },
        }
    }
}

/// 第一阶段：SIGTERM，然后在 `timeout` 内轮询退出
pub fn terminate_graceful(pid: i32, timeout: Duration, poll: Duration) -> Termination {
    if !send_signal(pid, Signal::SIGTERM) {
        return Termination::Exited;
    }
    wait_until_dead(pid, timeout, poll)
}

/// 第二阶段：SIGKILL，然后在 `confirm` 内确认
pub fn terminate_forceful(pid: i32, confirm: Duration, poll: Duration) -> Termination {
    if !send_signal(pid, Signal::SIGKILL) {
        return Termination::Exited;
    }
    wait_until_dead(pid, confirm, poll)
}

/// 先发给进程组，组不存在时退回到单个进程；返回 false 表示进程已不存在
fn send_signal(pid: i32, signal: Signal) -> bool {
    match kill(Pid::from_raw(-pid), signal) {
        Ok(()) => return true,
        Err(Errno::ESRCH) => {}
        Err(e) => warn!("Failed to send {:?} to process group {}: {}", signal, pid, e),
    }
    match kill(Pid::from_raw(pid), signal) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(e) => {
            warn!("Failed to send {:?} to PID {}: {}", signal, pid, e);
            pid_alive(pid)
        }
    }
}

fn wait_until_dead(pid: i32, timeout: Duration, poll: Duration) -> Termination {
    let deadline = Instant::now() + timeout;
    loop {
        if !pid_alive(pid) {
            return Termination::Exited;
        }
        let now = Instant::now();
        if now >= deadline {
            return Termination::StillAlive;
        }
        thread::sleep(poll.min(deadline - now));
    }
}

/// 在宽限期内等待子进程退出，返回退出状态；仍在运行返回 None
fn wait_for_exit(child: &mut Child, grace: Duration, poll: Duration) -> Option<ExitStatus> {
    let deadline = Instant::now() + grace;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) => {}
            Err(e) => {
                warn!("Failed to poll child {}: {}", child.id(), e);
                return None;
            }
        }
        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        thread::sleep(poll.min(deadline - now));
    }
}

/// 后台回收子进程，避免它在本进程存活期间变成僵尸
fn reap_in_background(mut child: Child, label: &'static str) {
    let pid = child.id();
    let spawned = thread::Builder::new()
        .name(format!("reaper-{}", pid))
        .spawn(move || match child.wait() {
            Ok(status) => info!("{} PID {} exited ({})", label, pid, status),
            Err(e) => warn!("Failed to reap {} PID {}: {}", label, pid, e),
        });
    if let Err(e) = spawned {
        warn!("Cannot spawn reaper for PID {}: {}", pid, e);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::services::registry::PidFileRegistry;
    use std::path::Path;

    pub(crate) fn test_settings(home: &Path, command: &[&str]) -> SupervisorSettings {
        SupervisorSettings {
            command: command.iter().map(|s| s.to_string()).collect(),
            working_dir: home.to_path_buf(),
            engine_log: home.join("logs/engine.log"),
            log_relay: None,
            lock_path: home.join("run/supervisor.lock"),
            config_path: None,
            start_grace: Duration::from_millis(300),
            stop_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(50),
            kill_confirm: Duration::from_secs(2),
            restart_delay: Duration::from_millis(50),
            output_lines: 20,
        }
    }

    pub(crate) fn supervisor(home: &Path, command: &[&str]) -> ProcessSupervisor {
        let registry = Arc::new(PidFileRegistry::new(home.join("run/bot.pid.json")));
        ProcessSupervisor::new(registry, test_settings(home, command))
    }

    #[test]
    fn test_start_twice_returns_already_running() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(dir.path(), &["sleep", "30"]);

        let first = sup.start().unwrap();
        let StartOutcome::Started(record) = first else {
            panic!("expected a fresh start, got {:?}", first);
        };
        assert_eq!(sup.state(), SupervisorState::Running);

        let second = sup.start().unwrap();
        assert_eq!(second, StartOutcome::AlreadyRunning(record.clone()));
        assert_eq!(sup.registry().read(), Some(record));

        sup.stop().unwrap();
    }

    #[test]
    fn test_concurrent_starts_spawn_one_engine() {
        let dir = tempfile::tempdir().unwrap();
        let sup = Arc::new(supervisor(dir.path(), &["sleep", "30"]));
        let barrier = Arc::new(std::sync::Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let (sup, barrier) = (sup.clone(), barrier.clone());
                thread::spawn(move || {
                    barrier.wait();
                    sup.start()
                })
            })
            .collect();
        let outcomes: Vec<StartOutcome> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();

        let started: Vec<_> = outcomes
            .iter()
            .filter(|o| matches!(o, StartOutcome::Started(_)))
            .collect();
        assert_eq!(started.len(), 1);
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, StartOutcome::AlreadyRunning(_))));
        // 两个结果指向同一个进程，且注册表里就是它
        assert_eq!(outcomes[0].record().pid, outcomes[1].record().pid);
        assert_eq!(sup.registry().read().map(|r| r.pid), Some(started[0].record().pid));

        sup.stop().unwrap();
    }

    #[test]
    fn test_engine_output_goes_through_relay() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("logs/engine.log");
        fs::create_dir_all(dir.path().join("logs")).unwrap();
        let mut settings = test_settings(dir.path(), &["sh", "-c", "echo ready; exec sleep 30"]);
        settings.log_relay = Some(vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("cat >> '{}'", log.display()),
        ]);
        let registry = Arc::new(PidFileRegistry::new(dir.path().join("run/bot.pid.json")));
        let sup = ProcessSupervisor::new(registry, settings);

        sup.start().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while tail(&log, 5).is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(tail(&log, 5), vec!["ready".to_string()]);

        sup.stop().unwrap();
    }

    #[test]
    fn test_start_failure_output_arrives_through_relay() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("logs/engine.log");
        fs::create_dir_all(dir.path().join("logs")).unwrap();
        let mut settings = test_settings(dir.path(), &["sh", "-c", "echo 'bad api key' >&2; exit 2"]);
        settings.log_relay = Some(vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("cat >> '{}'", log.display()),
        ]);
        let registry = Arc::new(PidFileRegistry::new(dir.path().join("run/bot.pid.json")));
        let sup = ProcessSupervisor::new(registry, settings);

        match sup.start().unwrap_err() {
            SupervisorError::StartFailed { output, .. } => {
                assert_eq!(output, vec!["bad api key".to_string()]);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_stop_when_not_running_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(dir.path(), &["sleep", "30"]);

        assert_eq!(sup.stop().unwrap(), StopOutcome::NotRunning);
        assert!(sup.registry().read().is_none());
        assert!(!dir.path().join("run/bot.pid.json").exists());
    }

    #[test]
    fn test_stop_clears_registry() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(dir.path(), &["sleep", "30"]);
        let pid = sup.start().unwrap().record().pid;

        let outcome = sup.stop().unwrap();
        assert_eq!(outcome, StopOutcome::Stopped { pid, forced: false });
        assert!(sup.registry().read().is_none());
        assert!(!pid_alive(pid));
        assert_eq!(sup.state(), SupervisorState::Stopped);
    }

    #[test]
    fn test_stop_escalates_to_sigkill() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = test_settings(
            dir.path(),
            &["sh", "-c", "trap '' TERM; while true; do sleep 0.1; done"],
        );
        settings.stop_timeout = Duration::from_millis(500);
        let registry = Arc::new(PidFileRegistry::new(dir.path().join("run/bot.pid.json")));
        let sup = ProcessSupervisor::new(registry, settings);

        let pid = sup.start().unwrap().record().pid;
        assert_eq!(sup.stop().unwrap(), StopOutcome::Stopped { pid, forced: true });
        assert!(sup.registry().read().is_none());
    }

    #[test]
    fn test_start_failure_surfaces_output_and_clears_registry() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(dir.path(), &["sh", "-c", "echo 'missing API key'; exit 3"]);

        let err = sup.start().unwrap_err();
        match &err {
            SupervisorError::StartFailed { output, .. } => {
                assert_eq!(output, &vec!["missing API key".to_string()]);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(err.to_string().starts_with("StartFailed"));
        assert!(sup.registry().read().is_none());
        assert_eq!(sup.state(), SupervisorState::FailedStart);
    }

    #[test]
    fn test_start_with_missing_binary_fails() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(dir.path(), &["/nonexistent/engine-binary"]);

        let err = sup.start().unwrap_err();
        assert_eq!(err.as_label(), "start_failed");
        assert!(sup.registry().read().is_none());
    }

    #[test]
    fn test_start_requires_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = test_settings(dir.path(), &["sleep", "30"]);
        settings.config_path = Some(dir.path().join("config.yaml"));
        let registry = Arc::new(PidFileRegistry::new(dir.path().join("run/bot.pid.json")));
        let sup = ProcessSupervisor::new(registry, settings);

        let err = sup.start().unwrap_err();
        assert!(err.to_string().contains("config.yaml"));
        assert!(sup.registry().read().is_none());
    }

    #[test]
    fn test_start_discards_stale_record() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(dir.path(), &["sleep", "30"]);

        let mut dead = Command::new("true").spawn().unwrap();
        let dead_pid = dead.id() as i32;
        dead.wait().unwrap();
        sup.registry().write(&ProcessRecord::new(dead_pid)).unwrap();

        let outcome = sup.start().unwrap();
        assert!(matches!(outcome, StartOutcome::Started(_)));
        assert_ne!(outcome.record().pid, dead_pid);

        sup.stop().unwrap();
    }

    #[test]
    fn test_restart_yields_new_pid() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(dir.path(), &["sleep", "30"]);

        let before = sup.start().unwrap().record().pid;
        let after = sup.restart().unwrap();
        assert!(matches!(after, StartOutcome::Started(_)));
        assert_ne!(after.record().pid, before);
        assert!(!pid_alive(before));

        sup.stop().unwrap();
    }

    #[test]
    fn test_status_reports_stats_only_when_live() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(dir.path(), &["sleep", "30"]);

        let stopped = sup.status();
        assert!(stopped.record.is_none());
        assert_eq!(stopped.stats, ProcessStats::empty());

        let pid = sup.start().unwrap().record().pid;
        let running = sup.status();
        assert_eq!(running.record.map(|r| r.pid), Some(pid));
        assert!(running.stats.memory_bytes > 0);

        sup.stop().unwrap();
    }

    #[test]
    fn test_termination_phases_on_dead_pid() {
        let mut dead = Command::new("true").spawn().unwrap();
        let pid = dead.id() as i32;
        dead.wait().unwrap();

        let poll = Duration::from_millis(10);
        assert_eq!(terminate_graceful(pid, Duration::from_millis(50), poll), Termination::Exited);
        assert_eq!(terminate_forceful(pid, Duration::from_millis(50), poll), Termination::Exited);
    }

    #[test]
    fn test_graceful_phase_times_out_on_ignoring_process() {
        let mut child = Command::new("sh")
            .args(["-c", "trap '' TERM; while true; do sleep 0.1; done"])
            .process_group(0)
            .spawn()
            .unwrap();
        let pid = child.id() as i32;
        // 等 sh 装好 trap
        thread::sleep(Duration::from_millis(200));

        let poll = Duration::from_millis(20);
        assert_eq!(
            terminate_graceful(pid, Duration::from_millis(300), poll),
            Termination::StillAlive
        );

        let reaper = thread::spawn(move || child.wait());
        assert_eq!(terminate_forceful(pid, Duration::from_secs(2), poll), Termination::Exited);
        reaper.join().unwrap().unwrap();
    }
}
