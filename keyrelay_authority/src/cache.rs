use std::{sync::Arc, time::Duration};

use arc_swap::ArcSwap;
use keyrelay_jose::{
    clock::UnixTime,
    jwa,
    jwk::{KeyId, KeyIdRef, RsaPublicKey},
    Jwks,
};

#[derive(Debug, Default)]
struct CachedKeys {
    fetched_at: Option<UnixTime>,
    keys: Vec<(KeyId, Arc<RsaPublicKey>)>,
}

/// Signing keys from the most recent key set fetch
///
/// Reads take a lock-free snapshot. The whole cache is replaced on every
/// fetch, so every entry shares the age of the fetch that produced it.
#[derive(Debug)]
pub struct KeyCache {
    current: ArcSwap<CachedKeys>,
    max_age: Duration,
    max_entries: usize,
}

impl KeyCache {
    /// An empty cache whose entries expire after `max_age` and which keeps
    /// at most `max_entries` keys
    #[must_use]
    pub fn new(max_age: Duration, max_entries: usize) -> Self {
        Self {
            current: ArcSwap::from_pointee(CachedKeys::default()),
            max_age,
            max_entries,
        }
    }

    /// The key for `kid`, unless it is absent or older than the maximum age
    #[must_use]
    pub fn get(&self, kid: &KeyIdRef, now: UnixTime) -> Option<Arc<RsaPublicKey>> {
        let current = self.current.load();

        let fetched_at = current.fetched_at?;
        if now.saturating_since(fetched_at) >= self.max_age {
            return None;
        }

        current
            .keys
            .iter()
            .find(|(id, _)| id.as_str() == kid.as_str())
            .map(|(_, key)| Arc::clone(key))
    }

    /// Replaces the cached keys with the RS256 signing keys from `jwks`
    ///
    /// Keys without an ID cannot be looked up and are skipped. Returns the
    /// number of keys retained.
    pub fn replace(&self, jwks: &Jwks, now: UnixTime) -> usize {
        let keys: Vec<_> = jwks
            .verifying_keys(jwa::Algorithm::RS256)
            .take(self.max_entries)
            .map(|(kid, jwk)| (kid.to_owned(), Arc::new(jwk.public_key().clone())))
            .collect();

        let retained = keys.len();
        self.current.store(Arc::new(CachedKeys {
            fetched_at: Some(now),
            keys,
        }));

        retained
    }

    /// Marks the cached keys as freshly fetched at `now`
    pub fn touch(&self, now: UnixTime) {
        self.current.rcu(|current| CachedKeys {
            fetched_at: Some(now),
            keys: current.keys.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;
    use keyrelay_jose::test_util;

    use super::*;

    fn kid() -> &'static KeyIdRef {
        KeyIdRef::from_str(test_util::TEST_KEY_ID)
    }

    #[test]
    fn empty_cache_misses() {
        let cache = KeyCache::new(Duration::from_secs(600), 5);
        assert!(cache.get(kid(), UnixTime(0)).is_none());
    }

    #[test]
    fn entries_expire_after_max_age() -> Result<()> {
        let jwks: Jwks = serde_json::from_str(test_util::JWKS)?;
        let cache = KeyCache::new(Duration::from_secs(600), 5);

        assert_eq!(cache.replace(&jwks, UnixTime(1_000)), 1);
        assert!(cache.get(kid(), UnixTime(1_599)).is_some());
        assert!(cache.get(kid(), UnixTime(1_600)).is_none());

        cache.touch(UnixTime(1_600));
        assert!(cache.get(kid(), UnixTime(1_600)).is_some());
        Ok(())
    }

    #[test]
    fn keeps_at_most_max_entries() -> Result<()> {
        let mut published: serde_json::Value = serde_json::from_str(test_util::JWKS)?;
        let template = published["keys"][0].clone();
        let keys: Vec<_> = (0..3)
            .map(|i| {
                let mut key = template.clone();
                key["kid"] = serde_json::json!(format!("key-{i}"));
                key
            })
            .collect();
        published["keys"] = serde_json::Value::Array(keys);
        let jwks: Jwks = serde_json::from_value(published)?;

        let cache = KeyCache::new(Duration::from_secs(600), 2);
        assert_eq!(cache.replace(&jwks, UnixTime(0)), 2);
        assert!(cache.get(KeyIdRef::from_str("key-1"), UnixTime(0)).is_some());
        assert!(cache.get(KeyIdRef::from_str("key-2"), UnixTime(0)).is_none());
        Ok(())
    }

    #[test]
    fn skips_keys_not_meant_for_rs256_signatures() -> Result<()> {
        let mut published: serde_json::Value = serde_json::from_str(test_util::JWKS)?;
        let mut encryption = published["keys"][0].clone();
        encryption["kid"] = serde_json::json!("enc");
        encryption["use"] = serde_json::json!("enc");
        let mut rs512 = published["keys"][0].clone();
        rs512["kid"] = serde_json::json!("rs512");
        rs512["alg"] = serde_json::json!("RS512");
        published["keys"] = serde_json::json!([encryption, rs512]);
        let jwks: Jwks = serde_json::from_value(published)?;

        let cache = KeyCache::new(Duration::from_secs(600), 5);
        assert_eq!(cache.replace(&jwks, UnixTime(0)), 0);
        Ok(())
    }
}
