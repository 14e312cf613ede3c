use crate::models::ProcessStats;
use std::sync::Mutex;
use sysinfo::{Pid, ProcessesToUpdate, System, MINIMUM_CPU_UPDATE_INTERVAL};

/// sysinfo 资源采集器
///
/// CPU 使用率是两次刷新之间的差值，所以在 serve 模式下同一个采集器
/// 跨请求复用；一次性的 CLI 调用用 `collect_sampled`。
pub struct StatsCollector {
    system: Mutex<System>,
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        Self {
            system: Mutex::new(system),
        }
    }

    pub fn collect_stats(&self, pid: i32) -> Option<ProcessStats> {
        let mut sys = self.system.lock().ok()?;
        Self::refresh(&mut sys, pid)
    }

    /// 刷新两次，中间隔 sysinfo 要求的最小间隔，得到有效的 CPU 数值
    pub fn collect_sampled(&self, pid: i32) -> Option<ProcessStats> {
        let mut sys = self.system.lock().ok()?;
        Self::refresh(&mut sys, pid)?;
        std::thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL);
        Self::refresh(&mut sys, pid)
    }

    fn refresh(sys: &mut System, pid: i32) -> Option<ProcessStats> {
        if pid <= 0 {
            return None;
        }
        let sysinfo_pid = Pid::from_u32(pid as u32);
        sys.refresh_processes(ProcessesToUpdate::Some(&[sysinfo_pid]), true);

        let process = sys.process(sysinfo_pid)?;
        let total_memory = sys.total_memory();

        Some(ProcessStats {
            cpu_usage: process.cpu_usage(),
            memory_bytes: process.memory(),
            memory_percent: if total_memory > 0 {
                (process.memory() as f32 / total_memory as f32) * 100.0
            } else {
                0.0
            },
            virtual_memory_bytes: process.virtual_memory(),
            uptime_secs: process.run_time(),
        })
    }
}
