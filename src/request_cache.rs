use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone)]
struct Value<T> {
    value: Arc<T>,
    expires: DateTime<Utc>,
}

/// Keyed response cache with a fixed time-to-live. Constructed once at
/// startup and handed to whoever needs it through `AppState`.
#[derive(Debug, Clone)]
pub struct RequestCache<T> {
    map: Arc<RwLock<HashMap<String, Value<T>>>>,
    ttl: Duration,
}

impl<T> RequestCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            map: Arc::default(),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        self.map
            .read()
            .expect("RWLock should never be poisoned")
            .get(key)
            .filter(|v| v.expires >= Utc::now())
            .map(|v| v.value.clone())
    }

    pub fn insert(&self, key: impl Into<String>, value: T) {
        let value = Value {
            value: Arc::new(value),
            expires: Utc::now() + self.ttl,
        };
        self.map
            .write()
            .expect("RWLock should never be poisoned")
            .insert(key.into(), value);
    }

    pub fn invalidate_all(&self) {
        self.map
            .write()
            .expect("RWLock should never be poisoned")
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_returns_inserted_value() {
        let cache = RequestCache::new(Duration::minutes(5));
        cache.insert("feed", vec![1, 2, 3]);
        assert_eq!(cache.get("feed").as_deref(), Some(&vec![1, 2, 3]));
        assert!(cache.get("other").is_none());
    }

    #[test]
    fn test_expired_values_are_not_served() {
        let cache = RequestCache::new(Duration::seconds(-1));
        cache.insert("feed", vec![1]);
        assert!(cache.get("feed").is_none());
    }

    #[test]
    fn test_invalidate_all_clears_every_key() {
        let cache = RequestCache::new(Duration::minutes(5));
        cache.insert("feed", vec![1]);
        cache.invalidate_all();
        assert!(cache.get("feed").is_none());
    }
}
