use serde::Serialize;

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct ProcessStats {
    /// CPU 使用率 (百分比，可超过 100 表示多核)
    pub cpu_usage: f32,

    /// 常驻内存 (字节)
    pub memory_bytes: u64,

    /// 内存使用率 (百分比，0-100)
    pub memory_percent: f32,

    /// 虚拟内存使用量 (字节)
    pub virtual_memory_bytes: u64,

    /// 进程运行时间 (秒)
    pub uptime_secs: u64,
}

impl ProcessStats {
    /// 创建一个空的统计数据
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn memory_mb(&self) -> f64 {
        self.memory_bytes as f64 / 1024.0 / 1024.0
    }
}
