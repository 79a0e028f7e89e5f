//! Outbound notifications. The scheduler reports cycle outcomes, sizing
//! rejections and risk events through the [`Notifier`] trait; delivery
//! failures are logged and never interrupt the pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    CycleSummary {
        cycle_at: DateTime<Utc>,
        analyzed: usize,
        executed: usize,
        rejected: usize,
        failures: usize,
    },
    SizingRejected {
        symbol: String,
        reason: String,
        cycle_at: DateTime<Utc>,
    },
    ExecutionFailed {
        symbol: String,
        reason: String,
        cycle_at: DateTime<Utc>,
    },
    RiskOff {
        triggered: bool,
        detail: String,
        at: DateTime<Utc>,
    },
    PositionExited {
        symbol: String,
        reason: String,
        pnl: f64,
        at: DateTime<Utc>,
    },
    RiskReport {
        report: String,
        at: DateTime<Utc>,
    },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), String>;
}

/// Notifier that writes structured log lines instead of calling an
/// external service. Default for paper trading.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), String> {
        match &notification {
            Notification::RiskOff { triggered: true, detail, at } => {
                warn!(%at, %detail, "notification: risk-off triggered");
            }
            Notification::ExecutionFailed { symbol, reason, .. } => {
                warn!(%symbol, %reason, "notification: execution failed");
            }
            _ => {
                let payload =
                    serde_json::to_string(&notification).map_err(|e| e.to_string())?;
                info!(%payload, "notification");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_notifier_accepts_all_variants() {
        let notifier = LogNotifier;
        let now = Utc::now();
        let notifications = vec![
            Notification::CycleSummary {
                cycle_at: now,
                analyzed: 3,
                executed: 1,
                rejected: 1,
                failures: 0,
            },
            Notification::RiskOff {
                triggered: true,
                detail: "BTC-USD volatility 0.25".to_string(),
                at: now,
            },
            Notification::PositionExited {
                symbol: "ETH-USD".to_string(),
                reason: "stop-loss".to_string(),
                pnl: -50.0,
                at: now,
            },
        ];
        for n in notifications {
            assert!(notifier.notify(n).await.is_ok());
        }
    }

    #[test]
    fn test_notification_serializes_with_kind_tag() {
        let n = Notification::SizingRejected {
            symbol: "ETH-USD".to_string(),
            reason: "active position already exists for ETH-USD".to_string(),
            cycle_at: Utc::now(),
        };
        let json = serde_json::to_string(&n).unwrap();
        assert!(json.contains("\"kind\":\"sizing_rejected\""));
    }
}
