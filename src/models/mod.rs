pub mod health;
pub mod process;
pub mod stats;
pub mod status;

pub use health::{HealthAction, HealthCheckResult, RestartDecision, RestartLedger, RestartPolicy};
pub use process::{ProcessRecord, StartOutcome, StopOutcome, SupervisorState};
pub use stats::ProcessStats;
pub use status::{BotStatus, EngineReport, LogEntry, Portfolio, StatusSnapshot};
