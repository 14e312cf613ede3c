use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 自动重启策略
#[derive(Debug, Clone, Copy)]
pub struct RestartPolicy {
    /// 窗口内允许的最大重启次数
    pub max_restarts: usize,
    /// 滑动窗口长度
    pub window: Duration,
    /// 退避基数，第 n 次重启后至少等待 base * 2^(n-1)
    pub backoff_base: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            window: Duration::from_secs(3600),
            backoff_base: Duration::from_secs(60),
        }
    }
}

impl RestartPolicy {
    /// 第 `restart_count` 次重启之后的最小等待时间
    pub fn backoff_after(&self, restart_count: usize) -> Duration {
        if restart_count == 0 {
            return Duration::ZERO;
        }
        let exp = (restart_count - 1).min(20) as u32;
        self.backoff_base
            .checked_mul(1u32 << exp)
            .unwrap_or(Duration::MAX)
    }
}

/// 账本对一次重启请求的裁决
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    Allowed,
    /// 仍在退避期内
    BackingOff { until: DateTime<Utc> },
    /// 窗口内重启次数已达上限，或已处于 halted 状态
    Exhausted,
}

/// 重启账本，按时间顺序记录窗口内的重启
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestartLedger {
    #[serde(default)]
    pub entries: Vec<DateTime<Utc>>,
    #[serde(default)]
    pub halted: bool,
    #[serde(default)]
    pub halted_at: Option<DateTime<Utc>>,
}

impl RestartLedger {
    /// 惰性淘汰窗口外的记录；halted 之后不再按时间清理
    pub fn evict(&mut self, now: DateTime<Utc>, window: Duration) {
        if self.halted {
            return;
        }
        let cutoff = now - to_chrono(window);
        self.entries.retain(|ts| *ts > cutoff);
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn decide(&self, now: DateTime<Utc>, policy: &RestartPolicy) -> RestartDecision {
        if self.halted || self.count() >= policy.max_restarts {
            return RestartDecision::Exhausted;
        }
        if let Some(last) = self.entries.last() {
            let until = *last + to_chrono(policy.backoff_after(self.count()));
            if now < until {
                return RestartDecision::BackingOff { until };
            }
        }
        RestartDecision::Allowed
    }

    pub fn record(&mut self, now: DateTime<Utc>) {
        self.entries.push(now);
    }

    pub fn halt(&mut self, now: DateTime<Utc>) {
        self.halted = true;
        self.halted_at = Some(now);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(365 * 100))
}

/// 健康检查采取的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthAction {
    None,
    Restarted,
    Halted,
}

/// 单次健康检查结果，以 JSON 行追加到 health.log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub timestamp: DateTime<Utc>,
    pub alive: bool,
    pub action: HealthAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RestartPolicy {
        RestartPolicy {
            max_restarts: 3,
            window: Duration::from_secs(600),
            backoff_base: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let p = policy();
        assert_eq!(p.backoff_after(0), Duration::ZERO);
        assert_eq!(p.backoff_after(1), Duration::from_secs(10));
        assert_eq!(p.backoff_after(2), Duration::from_secs(20));
        assert_eq!(p.backoff_after(3), Duration::from_secs(40));
    }

    #[test]
    fn test_decide_respects_backoff_and_limit() {
        let p = policy();
        let t0 = Utc::now();
        let mut ledger = RestartLedger::default();
        assert_eq!(ledger.decide(t0, &p), RestartDecision::Allowed);

        ledger.record(t0);
        assert!(matches!(
            ledger.decide(t0 + chrono::Duration::seconds(5), &p),
            RestartDecision::BackingOff { .. }
        ));
        assert_eq!(
            ledger.decide(t0 + chrono::Duration::seconds(10), &p),
            RestartDecision::Allowed
        );

        ledger.record(t0 + chrono::Duration::seconds(10));
        ledger.record(t0 + chrono::Duration::seconds(40));
        assert_eq!(
            ledger.decide(t0 + chrono::Duration::seconds(500), &p),
            RestartDecision::Exhausted
        );
    }

    #[test]
    fn test_evict_drops_old_entries_unless_halted() {
        let p = policy();
        let t0 = Utc::now();
        let mut ledger = RestartLedger::default();
        ledger.record(t0);
        ledger.record(t0 + chrono::Duration::seconds(30));

        let mut copy = ledger.clone();
        copy.evict(t0 + chrono::Duration::seconds(620), p.window);
        assert_eq!(copy.count(), 1);

        ledger.halt(t0 + chrono::Duration::seconds(31));
        ledger.evict(t0 + chrono::Duration::seconds(10_000), p.window);
        assert_eq!(ledger.count(), 2);
        assert_eq!(
            ledger.decide(t0 + chrono::Duration::seconds(10_000), &p),
            RestartDecision::Exhausted
        );
    }

    #[test]
    fn test_health_action_serializes_lowercase() {
        let json = serde_json::to_string(&HealthAction::Restarted).unwrap();
        assert_eq!(json, "\"restarted\"");
    }
}
