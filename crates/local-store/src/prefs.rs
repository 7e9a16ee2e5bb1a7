use crate::{PreferenceStore, StoreError};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracepanel_runtime_config::PreferenceSettings;
use tracepanel_timeline::ObjectiveFilter;

const GLOBAL_SCOPE: &str = "global";

/// Storage key for the filter of `session_id` (or the global default).
pub fn filter_key(prefix: &str, session_id: Option<&str>) -> String {
    let scope = session_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .unwrap_or(GLOBAL_SCOPE);
    format!("{prefix}:{scope}")
}

#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    filter: ObjectiveFilter,
    due: Instant,
}

/// Active-filter preference with debounced writes.
///
/// Reads never fail: a missing, corrupt or unreadable value yields
/// [`ObjectiveFilter::All`]. Writes are held until the debounce delay has
/// passed since the last change, so only the latest value reaches the store.
#[derive(Debug)]
pub struct FilterPreferences<S> {
    store: S,
    prefix: String,
    debounce: Duration,
    pending: BTreeMap<String, PendingWrite>,
}

impl<S: PreferenceStore> FilterPreferences<S> {
    pub fn new(store: S, settings: &PreferenceSettings) -> Self {
        Self {
            store,
            prefix: settings.key_prefix.clone(),
            debounce: Duration::from_millis(settings.debounce_ms),
            pending: BTreeMap::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn load(&self, session_id: Option<&str>) -> ObjectiveFilter {
        let key = filter_key(&self.prefix, session_id);
        if let Some(pending) = self.pending.get(&key) {
            return pending.filter;
        }
        match self.store.get(&key) {
            Ok(Some(raw)) => ObjectiveFilter::parse(&raw).unwrap_or_else(|| {
                tracing::warn!("Ignoring unknown stored filter {:?} for {}", raw, key);
                ObjectiveFilter::All
            }),
            Ok(None) => ObjectiveFilter::All,
            Err(e) => {
                tracing::warn!("Failed to read filter preference {}: {}", key, e);
                ObjectiveFilter::All
            }
        }
    }

    /// Queue `filter` for `session_id`; the write is due `debounce` after `now`.
    pub fn record(&mut self, session_id: Option<&str>, filter: ObjectiveFilter, now: Instant) {
        let key = filter_key(&self.prefix, session_id);
        self.pending.insert(
            key,
            PendingWrite {
                filter,
                due: now + self.debounce,
            },
        );
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Write every queued value whose delay has elapsed. Returns how many were written.
    pub fn flush_if_due(&mut self, now: Instant) -> Result<usize, StoreError> {
        let due: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, write)| write.due <= now)
            .map(|(key, _)| key.clone())
            .collect();
        self.write_keys(due)
    }

    /// Write everything queued, ignoring the delay.
    pub fn flush(&mut self) -> Result<usize, StoreError> {
        let keys: Vec<String> = self.pending.keys().cloned().collect();
        self.write_keys(keys)
    }

    fn write_keys(&mut self, keys: Vec<String>) -> Result<usize, StoreError> {
        let mut written = 0;
        for key in keys {
            let Some(write) = self.pending.get(&key).copied() else {
                continue;
            };
            self.store.set(&key, write.filter.as_str())?;
            self.pending.remove(&key);
            written += 1;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;

    fn prefs() -> FilterPreferences<MemoryStore> {
        FilterPreferences::new(MemoryStore::new(), &PreferenceSettings::default())
    }

    #[test]
    fn key_is_scoped_by_session_or_global() {
        assert_eq!(filter_key("tracepanel:filter", Some("conv-1")), "tracepanel:filter:conv-1");
        assert_eq!(filter_key("tracepanel:filter", None), "tracepanel:filter:global");
        assert_eq!(filter_key("p", Some("  ")), "p:global");
    }

    #[test]
    fn absent_or_corrupt_values_fall_back_to_all() {
        let mut store = MemoryStore::new();
        store.set("tracepanel:filter:conv-1", "sideways").unwrap();
        let prefs = FilterPreferences::new(store, &PreferenceSettings::default());
        assert_eq!(prefs.load(Some("conv-1")), ObjectiveFilter::All);
        assert_eq!(prefs.load(Some("conv-2")), ObjectiveFilter::All);
    }

    #[test]
    fn only_the_latest_value_is_written_after_the_delay() {
        let mut prefs = prefs();
        let start = Instant::now();

        prefs.record(Some("conv-1"), ObjectiveFilter::Tool, start);
        prefs.record(
            Some("conv-1"),
            ObjectiveFilter::Error,
            start + Duration::from_millis(100),
        );
        assert_eq!(prefs.load(Some("conv-1")), ObjectiveFilter::Error);

        assert_eq!(prefs.flush_if_due(start + Duration::from_millis(450)).unwrap(), 0);
        assert_eq!(prefs.store().get("tracepanel:filter:conv-1").unwrap(), None);

        assert_eq!(prefs.flush_if_due(start + Duration::from_millis(500)).unwrap(), 1);
        assert_eq!(
            prefs.store().get("tracepanel:filter:conv-1").unwrap().as_deref(),
            Some("error")
        );
        assert!(!prefs.has_pending());
    }

    #[test]
    fn flush_writes_immediately() {
        let mut prefs = prefs();
        prefs.record(None, ObjectiveFilter::Thought, Instant::now());
        assert_eq!(prefs.flush().unwrap(), 1);
        assert_eq!(prefs.load(None), ObjectiveFilter::Thought);
    }

    struct BrokenStore;

    impl PreferenceStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Io {
                path: "broken".into(),
                source: std::io::Error::other("disk gone"),
            })
        }
        fn set(&mut self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Io {
                path: "broken".into(),
                source: std::io::Error::other("disk gone"),
            })
        }
        fn remove(&mut self, _key: &str) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[test]
    fn storage_failures_never_escape_reads() {
        let mut prefs = FilterPreferences::new(BrokenStore, &PreferenceSettings::default());
        assert_eq!(prefs.load(Some("conv-1")), ObjectiveFilter::All);

        prefs.record(Some("conv-1"), ObjectiveFilter::Todo, Instant::now());
        assert!(prefs.flush().is_err());
        assert!(prefs.has_pending(), "failed writes stay queued");
    }
}
