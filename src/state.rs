use crate::cli::Settings;
use crate::services::{StatsCollector, StatusReporter};
use std::sync::Arc;

pub struct AppStateInner {
    pub settings: Settings,
    /// 跨请求复用，CPU 使用率才有意义
    pub stats_collector: Arc<StatsCollector>,
}

impl AppStateInner {
    pub fn reporter(&self) -> StatusReporter {
        self.settings.reporter(self.stats_collector.clone())
    }
}

pub type AppState = Arc<AppStateInner>;

pub fn new_state(settings: Settings) -> AppState {
    Arc::new(AppStateInner {
        settings,
        stats_collector: Arc::new(StatsCollector::new()),
    })
}
