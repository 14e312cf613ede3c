pub mod backup;
pub mod controller;
pub mod health_monitor;
pub mod lock;
pub mod log_manager;
pub mod registry;
pub mod service_installer;
pub mod stats_collector;
pub mod status_reporter;
pub mod supervisor;

pub use backup::BackupManager;
pub use controller::Controller;
pub use health_monitor::{HealthMonitor, LedgerStore};
pub use lock::LifecycleLock;
pub use log_manager::{LogFile, RotatingWriter};
pub use registry::{PidFileRegistry, ProcessRegistry};
pub use service_installer::{ServiceDescriptor, ServiceInstaller, Systemctl};
pub use stats_collector::StatsCollector;
pub use status_reporter::{EngineStatusFile, StatusReporter};
pub use supervisor::{ProcessSupervisor, SupervisorSettings};
