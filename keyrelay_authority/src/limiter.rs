use std::{fmt, num::NonZeroU32, sync::Arc, time::Duration};

use governor::{
    clock,
    middleware::NoOpMiddleware,
    nanos::Nanos,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use keyrelay_jose::clock::Clock;

/// A shared handle to the clock the limiter measures refills against
pub type SharedClock = Arc<dyn Clock + Send + Sync>;

#[derive(Clone)]
struct Ticks(SharedClock);

impl clock::Clock for Ticks {
    type Instant = Nanos;

    fn now(&self) -> Nanos {
        Nanos::from(Duration::from_secs(self.0.now().0))
    }
}

type Bucket = RateLimiter<NotKeyed, InMemoryState, Ticks, NoOpMiddleware<Nanos>>;

/// Rate limiter for key set fetches
///
/// A bucket of `limit` permits that refills at `limit` permits per minute,
/// one permit every `60 / limit` seconds. A full bucket admits a burst of
/// `limit` fetches. A limit of zero admits nothing.
pub struct FetchLimiter {
    limit: usize,
    bucket: Option<Bucket>,
}

impl fmt::Debug for FetchLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchLimiter")
            .field("per_minute", &self.limit)
            .finish_non_exhaustive()
    }
}

impl FetchLimiter {
    /// A limiter admitting `limit` fetches per minute of `clock` time
    #[must_use]
    pub fn per_minute(limit: usize, clock: SharedClock) -> Self {
        let permits = NonZeroU32::new(u32::try_from(limit).unwrap_or(u32::MAX));
        let bucket = permits
            .map(|permits| RateLimiter::direct_with_clock(Quota::per_minute(permits), Ticks(clock)));

        Self { limit, bucket }
    }

    /// Takes a permit if one is available
    ///
    /// Returns `false` without consuming anything when the bucket is empty.
    pub fn try_acquire(&self) -> bool {
        self.bucket
            .as_ref()
            .is_some_and(|bucket| bucket.check().is_ok())
    }
}
