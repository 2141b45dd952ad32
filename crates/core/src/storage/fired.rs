use crate::domain::alert::AlertKind;
use crate::storage::kv::KvStore;
use chrono::NaiveDate;

// Date-stamped "already fired" markers. An alert kind fires at most once per trigger date.

pub async fn last_fired(store: &dyn KvStore, kind: AlertKind) -> anyhow::Result<Option<NaiveDate>> {
    let Some(raw) = store.get(&kind.fired_key()).await? else {
        return Ok(None);
    };
    match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
        Ok(d) => Ok(Some(d)),
        Err(e) => {
            tracing::warn!(kind = %kind, raw = %raw, error = %e, "ignoring unparseable fired marker");
            Ok(None)
        }
    }
}

/// Records `date` as fired for `kind`. False when some caller already claimed that date.
pub async fn claim(store: &dyn KvStore, kind: AlertKind, date: NaiveDate) -> anyhow::Result<bool> {
    store
        .claim(&kind.fired_key(), &date.format("%Y-%m-%d").to_string())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::kv::MemoryKvStore;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[tokio::test]
    async fn claim_is_per_kind_and_per_date() {
        let store = MemoryKvStore::new();
        assert!(claim(&store, AlertKind::Morning, d(2026, 1, 6)).await.unwrap());
        assert!(!claim(&store, AlertKind::Morning, d(2026, 1, 6)).await.unwrap());
        assert!(claim(&store, AlertKind::Evening, d(2026, 1, 6)).await.unwrap());
        assert!(claim(&store, AlertKind::Morning, d(2026, 1, 7)).await.unwrap());
        assert_eq!(
            last_fired(&store, AlertKind::Morning).await.unwrap(),
            Some(d(2026, 1, 7))
        );
    }

    #[tokio::test]
    async fn garbled_marker_reads_as_never_fired_and_is_claimable() {
        let store = MemoryKvStore::new();
        store.set("lastFired:morning", "yesterday").await.unwrap();
        assert_eq!(last_fired(&store, AlertKind::Morning).await.unwrap(), None);
        assert!(claim(&store, AlertKind::Morning, d(2026, 1, 6)).await.unwrap());
    }
}
