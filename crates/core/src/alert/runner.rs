use crate::alert::system::AlertSystem;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Polls `system.tick` every `period` until `shutdown` resolves.
///
/// A late tick runs late; there is no burst catch-up.
pub async fn run_polling<C, F>(system: Arc<AlertSystem>, period: Duration, clock: C, shutdown: F)
where
    C: Fn() -> DateTime<Utc>,
    F: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    tracing::info!(
        period_secs = period.as_secs_f64(),
        morning = %system.schedule().morning,
        evening = %system.schedule().evening,
        "alert polling started"
    );

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("alert polling stopped");
                break;
            }
            _ = ticker.tick() => {
                for o in system.tick(clock()).await {
                    tracing::debug!(id = %o.id, kind = %o.kind, "tick produced alert");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::system::AlertOptions;
    use crate::domain::catalog::Catalog;
    use crate::notify::{LogNotifier, Permission};
    use crate::storage::kv::{KvStore, MemoryKvStore};
    use crate::time::trigger::Schedule;
    use chrono::{FixedOffset, TimeZone};

    #[tokio::test]
    async fn repeated_ticks_on_trigger_minute_fire_once() {
        let store = Arc::new(MemoryKvStore::new());
        let system = Arc::new(AlertSystem::new(
            Catalog::builtin(),
            AlertOptions {
                schedule: Schedule::default(),
                offset: FixedOffset::east_opt(9 * 3600).unwrap(),
                market_days_only: false,
                icon: "/icon-192.png".to_string(),
            },
            store.clone(),
            Arc::new(LogNotifier::new(Permission::Granted)),
        ));

        // 08:55 KST, frozen.
        let frozen = Utc.with_ymd_and_hms(2026, 1, 5, 23, 55, 0).unwrap();
        run_polling(
            system.clone(),
            Duration::from_millis(5),
            move || frozen,
            tokio::time::sleep(Duration::from_millis(60)),
        )
        .await;

        assert_eq!(
            store.get("lastFired:morning").await.unwrap().as_deref(),
            Some("2026-01-06")
        );
        assert_eq!(store.get("lastFired:evening").await.unwrap(), None);
    }
}
