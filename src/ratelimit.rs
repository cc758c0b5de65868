//! Per-client-IP token buckets. Refill is proportional to elapsed time at
//! the sustained rate, capped at the burst size; one token per query.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Sweep for idle buckets this often.
const EVICTION_INTERVAL: Duration = Duration::from_secs(300);

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    buckets: DashMap<IpAddr, TokenBucket>,
    burst: f64,
    sustain: f64,
}

impl RateLimiter {
    pub fn new(burst: u32, sustain: u32) -> Self {
        RateLimiter {
            buckets: DashMap::new(),
            burst: burst.max(1) as f64,
            sustain: sustain.max(1) as f64,
        }
    }

    /// Refill the client's bucket for the elapsed time and try to take one
    /// token. Denied packets are dropped silently upstream.
    pub fn allow(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut bucket = self.buckets.entry(ip).or_insert_with(|| TokenBucket {
            tokens: self.burst,
            last_refill: now,
        });
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.sustain).min(self.burst);
        bucket.last_refill = now;
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            trace!("rate limited {ip}");
            false
        }
    }

    /// Time a drained bucket takes to fill back to burst; buckets idle
    /// longer than this hold no useful state.
    fn refill_period(&self) -> Duration {
        Duration::from_secs_f64(self.burst / self.sustain)
    }

    /// Drop buckets that have sat idle past their refill period.
    pub fn evict_idle(&self) {
        let cutoff = self.refill_period();
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.last_refill) < cutoff);
        let evicted = before.saturating_sub(self.buckets.len());
        if evicted > 0 {
            debug!("evicted {evicted} idle rate-limit buckets");
        }
    }

    #[cfg(test)]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

/// Background sweep, every five minutes for the life of the process.
pub fn spawn_eviction_task(limiter: Arc<RateLimiter>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(EVICTION_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            limiter.evict_idle();
        }
    })
}
