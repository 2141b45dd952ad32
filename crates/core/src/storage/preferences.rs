use crate::domain::alert::AlertKind;
use crate::storage::kv::KvStore;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertPreference {
    pub morning_enabled: bool,
    pub evening_enabled: bool,
}

impl Default for AlertPreference {
    fn default() -> Self {
        Self {
            morning_enabled: true,
            evening_enabled: true,
        }
    }
}

// Anything but the literal "false" (including a missing key) reads as enabled.
fn parse_flag(raw: Option<&str>) -> bool {
    raw != Some("false")
}

pub async fn is_enabled(store: &dyn KvStore, kind: AlertKind) -> anyhow::Result<bool> {
    let raw = store.get(kind.preference_key()).await?;
    Ok(parse_flag(raw.as_deref()))
}

pub async fn load(store: &dyn KvStore) -> anyhow::Result<AlertPreference> {
    Ok(AlertPreference {
        morning_enabled: is_enabled(store, AlertKind::Morning).await?,
        evening_enabled: is_enabled(store, AlertKind::Evening).await?,
    })
}

pub async fn set_enabled(store: &dyn KvStore, kind: AlertKind, enabled: bool) -> anyhow::Result<()> {
    let value = if enabled { "true" } else { "false" };
    store.set(kind.preference_key(), value).await?;
    tracing::info!(
        kind = %kind,
        enabled,
        backend = store.backend_name(),
        "alert preference updated"
    );
    Ok(())
}
