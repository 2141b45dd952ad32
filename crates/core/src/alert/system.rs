use crate::alert::message::body_for;
use crate::alert::select::{pick_recommendations, top_volume, PICK_SIZE, TOP_VOLUME_SIZE};
use crate::config::Settings;
use crate::display::{DisplayPanel, PanelState};
use crate::domain::alert::{AlertKind, AlertOutcome, AlertPayload, Notification};
use crate::domain::catalog::Catalog;
use crate::notify::{NotificationSurface, Permission};
use crate::storage::kv::KvStore;
use crate::storage::{fired, preferences};
use crate::time::kr_market;
use crate::time::trigger::{Schedule, TriggerTime};
use chrono::{DateTime, FixedOffset, NaiveDate, Timelike, Utc};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct AlertOptions {
    pub schedule: Schedule,
    pub offset: FixedOffset,
    pub market_days_only: bool,
    pub icon: String,
}

impl AlertOptions {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self {
            schedule: Schedule {
                morning: settings.morning_at,
                evening: settings.evening_at,
                grace_minutes: settings.grace_minutes,
            },
            offset: settings.utc_offset()?,
            market_days_only: settings.market_days_only,
            icon: settings.notify_icon.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub now: String,
    pub morning: TriggerTime,
    pub evening: TriggerTime,
    pub grace_minutes: u32,
    pub permission: Permission,
    pub morning_last_fired: Option<NaiveDate>,
    pub evening_last_fired: Option<NaiveDate>,
}

/// Matches the clock against the schedule, picks payloads and hands them to the surface and
/// the panel. Shared behind an `Arc` by the polling loop and on-demand callers.
pub struct AlertSystem {
    catalog: Catalog,
    options: AlertOptions,
    store: Arc<dyn KvStore>,
    notifier: Arc<dyn NotificationSurface>,
    panel: DisplayPanel,
    // Serializes ticks within this process; the store's claim covers other processes.
    tick_guard: Mutex<()>,
}

impl AlertSystem {
    pub fn new(
        catalog: Catalog,
        options: AlertOptions,
        store: Arc<dyn KvStore>,
        notifier: Arc<dyn NotificationSurface>,
    ) -> Self {
        let mut rng = rand::rng();
        let panel = DisplayPanel::new(PanelState {
            recommendations: pick_recommendations(catalog.recommendations(), PICK_SIZE, &mut rng),
            top_volume: top_volume(catalog.volume_leaders(), TOP_VOLUME_SIZE),
        });

        tracing::info!(
            morning = %options.schedule.morning,
            evening = %options.schedule.evening,
            notifier = notifier.name(),
            store = store.backend_name(),
            "alert schedule configured"
        );

        Self {
            catalog,
            options,
            store,
            notifier,
            panel,
            tick_guard: Mutex::new(()),
        }
    }

    /// Catalog, store and notifier as configured.
    pub async fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let catalog = Catalog::load(settings.catalog_path.as_deref())?;
        let store = crate::storage::open_store(settings).await?;
        Self::with_store(settings, catalog, store)
    }

    pub fn with_store(
        settings: &Settings,
        catalog: Catalog,
        store: Arc<dyn KvStore>,
    ) -> anyhow::Result<Self> {
        let options = AlertOptions::from_settings(settings)?;
        let notifier = crate::notify::from_settings(settings);
        Ok(Self::new(catalog, options, store, notifier))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn schedule(&self) -> &Schedule {
        &self.options.schedule
    }

    pub fn store(&self) -> &dyn KvStore {
        self.store.as_ref()
    }

    pub fn panel(&self) -> &DisplayPanel {
        &self.panel
    }

    pub fn local_now(&self, now_utc: DateTime<Utc>) -> DateTime<FixedOffset> {
        kr_market::local_now(now_utc, self.options.offset)
    }

    pub fn select_with<R: Rng + ?Sized>(&self, kind: AlertKind, rng: &mut R) -> AlertPayload {
        match kind {
            AlertKind::Morning => AlertPayload::Recommendations(pick_recommendations(
                self.catalog.recommendations(),
                PICK_SIZE,
                rng,
            )),
            AlertKind::Evening => {
                AlertPayload::TopVolume(top_volume(self.catalog.volume_leaders(), TOP_VOLUME_SIZE))
            }
        }
    }

    pub fn select(&self, kind: AlertKind) -> AlertPayload {
        self.select_with(kind, &mut rand::rng())
    }

    /// One polling check. Returns the alerts that fired, at most one per kind per trigger
    /// occurrence. Store failures degrade to firing without dedup rather than skipping.
    pub async fn tick(&self, now_utc: DateTime<Utc>) -> Vec<AlertOutcome> {
        let _g = self.tick_guard.lock().await;

        let now = self.local_now(now_utc);
        tracing::debug!(now = %format!("{}:{:02}", now.hour(), now.minute()), "alert tick");

        let mut out = Vec::new();
        for (kind, occurrence) in self.options.schedule.due(now.naive_local()) {
            if self.options.market_days_only && !kr_market::is_market_day(occurrence) {
                tracing::debug!(kind = %kind, %occurrence, "not a market day; alert skipped");
                continue;
            }

            let enabled = match preferences::is_enabled(self.store.as_ref(), kind).await {
                Ok(enabled) => enabled,
                Err(e) => {
                    tracing::warn!(
                        kind = %kind,
                        error = %format!("{e:#}"),
                        "preference unreadable; treating as enabled"
                    );
                    true
                }
            };
            if !enabled {
                tracing::debug!(kind = %kind, "alert disabled by preference");
                continue;
            }

            // Claim before dispatch: whoever records the occurrence first is the one that fires.
            match fired::claim(self.store.as_ref(), kind, occurrence).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(kind = %kind, %occurrence, "alert already fired");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(
                        kind = %kind,
                        %occurrence,
                        error = %format!("{e:#}"),
                        "fired marker unavailable; firing without dedup"
                    );
                }
            }

            out.push(self.dispatch(kind, now).await);
        }

        out
    }

    /// On-demand alert. Ignores toggles and the fired ledger.
    pub async fn fire(&self, kind: AlertKind, now_utc: DateTime<Utc>) -> AlertOutcome {
        let now = self.local_now(now_utc);
        self.dispatch(kind, now).await
    }

    async fn dispatch(&self, kind: AlertKind, now: DateTime<FixedOffset>) -> AlertOutcome {
        let payload = self.select(kind);
        let message = body_for(&payload);
        let notification = Notification::new(kind, message.clone(), &self.options.icon);

        let delivered = match self.notifier.permission().await {
            Permission::Granted => match self.notifier.show(&notification).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(kind = %kind, error = %e, "notification not shown");
                    false
                }
            },
            Permission::Denied => {
                tracing::info!(kind = %kind, "notification permission denied; panel only");
                false
            }
        };

        self.panel.show(&payload).await;

        let outcome = AlertOutcome {
            id: uuid::Uuid::new_v4(),
            kind,
            fired_at: now,
            message,
            payload,
            delivered,
        };
        tracing::info!(
            id = %outcome.id,
            kind = %kind,
            delivered,
            message = %outcome.message,
            "alert fired"
        );
        outcome
    }

    async fn last_fired(&self, kind: AlertKind) -> Option<NaiveDate> {
        fired::last_fired(self.store.as_ref(), kind)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(kind = %kind, error = %format!("{e:#}"), "fired marker unreadable");
                None
            })
    }

    pub async fn status(&self, now_utc: DateTime<Utc>) -> Status {
        let now = self.local_now(now_utc);
        Status {
            now: format!("{}:{:02}", now.hour(), now.minute()),
            morning: self.options.schedule.morning,
            evening: self.options.schedule.evening,
            grace_minutes: self.options.schedule.grace_minutes,
            permission: self.notifier.permission().await,
            morning_last_fired: self.last_fired(AlertKind::Morning).await,
            evening_last_fired: self.last_fired(AlertKind::Evening).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::VolumeLeader;
    use crate::notify::error::NotifyError;
    use crate::storage::kv::{FileKvStore, MemoryKvStore};
    use chrono::TimeZone;

    struct RecordingNotifier {
        permission: Permission,
        fail: bool,
        shown: Mutex<Vec<Notification>>,
    }

    impl RecordingNotifier {
        fn new(permission: Permission) -> Arc<Self> {
            Arc::new(Self {
                permission,
                fail: false,
                shown: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                permission: Permission::Granted,
                fail: true,
                shown: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl NotificationSurface for RecordingNotifier {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn permission(&self) -> Permission {
            self.permission
        }

        async fn show(&self, notification: &Notification) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::RegistrationFailed("no bus".to_string()));
            }
            self.shown.lock().await.push(notification.clone());
            Ok(())
        }
    }

    fn options() -> AlertOptions {
        AlertOptions {
            schedule: Schedule::default(),
            offset: FixedOffset::east_opt(kr_market::KST_OFFSET_SECS).unwrap(),
            market_days_only: false,
            icon: "/icon-192.png".to_string(),
        }
    }

    fn system_with(
        catalog: Catalog,
        options: AlertOptions,
        notifier: Arc<RecordingNotifier>,
    ) -> (AlertSystem, Arc<MemoryKvStore>) {
        let store = Arc::new(MemoryKvStore::new());
        let system = AlertSystem::new(catalog, options, store.clone(), notifier);
        (system, store)
    }

    // 2026-01-06 (Tuesday) 08:55 KST
    fn morning_utc() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 23, 55, 10).unwrap()
    }

    // 2026-01-06 (Tuesday) 15:30 KST
    fn evening_utc() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 6, 6, 30, 0).unwrap()
    }

    #[tokio::test]
    async fn morning_trigger_fires_once_with_three_picks() {
        let notifier = RecordingNotifier::new(Permission::Granted);
        let (system, _) = system_with(Catalog::builtin(), options(), notifier.clone());

        let out = system.tick(morning_utc()).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, AlertKind::Morning);
        assert!(out[0].delivered);

        let AlertPayload::Recommendations(picks) = &out[0].payload else {
            panic!("expected recommendations payload");
        };
        assert_eq!(picks.len(), 3);
        for p in picks {
            assert!(system.catalog().recommendations().contains(p));
        }

        let shown = notifier.shown.lock().await;
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].title, "🎯 오늘의 AI 추천종목");
        assert!(shown[0].body.starts_with("오늘의 AI 추천: "));
    }

    #[tokio::test]
    async fn non_trigger_minutes_fire_nothing() {
        let notifier = RecordingNotifier::new(Permission::Granted);
        let (system, _) = system_with(Catalog::builtin(), options(), notifier.clone());

        for minutes in [-1i64, 1, 60, 300] {
            let t = morning_utc() + chrono::Duration::minutes(minutes);
            assert!(system.tick(t).await.is_empty(), "offset {minutes}");
        }
        assert!(notifier.shown.lock().await.is_empty());
    }

    #[tokio::test]
    async fn same_minute_twice_fires_once_and_next_day_fires_again() {
        let notifier = RecordingNotifier::new(Permission::Granted);
        let (system, store) = system_with(Catalog::builtin(), options(), notifier.clone());

        assert_eq!(system.tick(morning_utc()).await.len(), 1);
        assert!(system
            .tick(morning_utc() + chrono::Duration::seconds(30))
            .await
            .is_empty());
        assert_eq!(
            store.get("lastFired:morning").await.unwrap().as_deref(),
            Some("2026-01-06")
        );

        let next_day = morning_utc() + chrono::Duration::days(1);
        assert_eq!(system.tick(next_day).await.len(), 1);
        assert_eq!(notifier.shown.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn evening_returns_first_three_in_order() {
        let vol = |name: &str, volume: &str, change_percent: f64| VolumeLeader {
            name: name.to_string(),
            volume: volume.to_string(),
            change_percent,
        };
        let catalog = Catalog::try_new(
            Catalog::builtin().recommendations().to_vec(),
            vec![
                vol("A", "15423", 2.1),
                vol("B", "8934", -1.2),
                vol("C", "7652", 0.8),
            ],
        )
        .unwrap();
        let (system, _) =
            system_with(catalog, options(), RecordingNotifier::new(Permission::Granted));

        let out = system.tick(evening_utc()).await;
        assert_eq!(out.len(), 1);
        let AlertPayload::TopVolume(top) = &out[0].payload else {
            panic!("expected top volume payload");
        };
        let names: Vec<_> = top.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["A", "B", "C"]);
        assert_eq!(top[0], vol("A", "15423", 2.1));
        assert_eq!(out[0].message, "거래대금 1위: A (15423)");
    }

    #[tokio::test]
    async fn disabled_preference_skips_tick_but_not_manual_fire() {
        let notifier = RecordingNotifier::new(Permission::Granted);
        let (system, store) = system_with(Catalog::builtin(), options(), notifier.clone());
        preferences::set_enabled(store.as_ref(), AlertKind::Evening, false)
            .await
            .unwrap();

        assert!(system.tick(evening_utc()).await.is_empty());
        assert_eq!(store.get("lastFired:evening").await.unwrap(), None);

        let manual = system.fire(AlertKind::Evening, evening_utc()).await;
        assert!(manual.delivered);
        assert_eq!(notifier.shown.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn denied_permission_updates_panel_only() {
        let notifier = RecordingNotifier::new(Permission::Denied);
        let (system, _) = system_with(Catalog::builtin(), options(), notifier.clone());

        let out = system.tick(morning_utc()).await;
        assert_eq!(out.len(), 1);
        assert!(!out[0].delivered);
        assert!(notifier.shown.lock().await.is_empty());

        let AlertPayload::Recommendations(picks) = &out[0].payload else {
            panic!("expected recommendations payload");
        };
        assert_eq!(&system.panel().snapshot().await.recommendations, picks);
    }

    #[tokio::test]
    async fn backend_failure_is_reported_not_raised() {
        let (system, _) = system_with(Catalog::builtin(), options(), RecordingNotifier::failing());
        let out = system.tick(evening_utc()).await;
        assert_eq!(out.len(), 1);
        assert!(!out[0].delivered);
    }

    #[tokio::test]
    async fn market_days_only_skips_weekends() {
        let opts = AlertOptions {
            market_days_only: true,
            ..options()
        };
        let (system, _) =
            system_with(Catalog::builtin(), opts, RecordingNotifier::new(Permission::Granted));

        // 2026-01-10 08:55 KST is a Saturday.
        let saturday = Utc.with_ymd_and_hms(2026, 1, 9, 23, 55, 0).unwrap();
        assert!(system.tick(saturday).await.is_empty());
        assert_eq!(system.tick(morning_utc()).await.len(), 1);
    }

    #[tokio::test]
    async fn panel_starts_populated_and_status_reports_local_time() {
        let (system, _) = system_with(
            Catalog::builtin(),
            options(),
            RecordingNotifier::new(Permission::Granted),
        );
        let snap = system.panel().snapshot().await;
        assert_eq!(snap.recommendations.len(), 3);
        assert_eq!(snap.top_volume.len(), 3);

        let status = system.status(morning_utc()).await;
        assert_eq!(status.now, "8:55");
        assert_eq!(status.morning.to_string(), "8:55");
        assert_eq!(status.evening.to_string(), "15:30");
        assert_eq!(status.morning_last_fired, None);

        system.tick(morning_utc()).await;
        let status = system.status(morning_utc()).await;
        assert_eq!(status.morning_last_fired, NaiveDate::from_ymd_opt(2026, 1, 6));
        assert_eq!(status.evening_last_fired, None);
    }

    /// Reads succeed with nothing stored; every write fails.
    struct ReadOnlyStore;

    #[async_trait::async_trait]
    impl KvStore for ReadOnlyStore {
        fn backend_name(&self) -> &'static str {
            "read-only"
        }

        async fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: &str) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }

        async fn claim(&self, _key: &str, _value: &str) -> anyhow::Result<bool> {
            anyhow::bail!("disk full")
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn two_systems_sharing_a_state_file_fire_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let system = |notifier: Arc<RecordingNotifier>| {
            AlertSystem::new(
                Catalog::builtin(),
                options(),
                Arc::new(FileKvStore::new(path.clone())),
                notifier,
            )
        };
        let (n1, n2) = (
            RecordingNotifier::new(Permission::Granted),
            RecordingNotifier::new(Permission::Granted),
        );
        let (a, b) = (system(n1.clone()), system(n2.clone()));

        let (out_a, out_b) = tokio::join!(a.tick(morning_utc()), b.tick(morning_utc()));
        assert_eq!(out_a.len() + out_b.len(), 1);
        assert_eq!(n1.shown.lock().await.len() + n2.shown.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn window_across_midnight_fires_once_under_its_start_date() {
        let opts = AlertOptions {
            schedule: Schedule {
                morning: TriggerTime::new(23, 59).unwrap(),
                grace_minutes: 2,
                ..Schedule::default()
            },
            ..options()
        };
        let (system, store) =
            system_with(Catalog::builtin(), opts, RecordingNotifier::new(Permission::Granted));

        // 23:59:10 and 00:00:10 KST on either side of 2026-01-07.
        let before = Utc.with_ymd_and_hms(2026, 1, 6, 14, 59, 10).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 1, 6, 15, 0, 10).unwrap();
        assert_eq!(system.tick(before).await.len(), 1);
        assert!(system.tick(after).await.is_empty());
        assert_eq!(
            store.get("lastFired:morning").await.unwrap().as_deref(),
            Some("2026-01-06")
        );
    }

    #[tokio::test]
    async fn corrupt_state_file_still_fires() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"morningAlarm": "tr"#).unwrap();
        let notifier = RecordingNotifier::new(Permission::Granted);
        let system = AlertSystem::new(
            Catalog::builtin(),
            options(),
            Arc::new(FileKvStore::new(path)),
            notifier.clone(),
        );

        let out = system.tick(morning_utc()).await;
        assert_eq!(out.len(), 1);
        assert!(out[0].delivered);
        assert_eq!(notifier.shown.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn failed_marker_write_keeps_the_delivered_outcome() {
        let notifier = RecordingNotifier::new(Permission::Granted);
        let system = AlertSystem::new(
            Catalog::builtin(),
            options(),
            Arc::new(ReadOnlyStore),
            notifier.clone(),
        );

        let out = system.tick(evening_utc()).await;
        assert_eq!(out.len(), 1);
        assert!(out[0].delivered);
        assert_eq!(notifier.shown.lock().await.len(), 1);
    }
}
