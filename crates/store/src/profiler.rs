use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProfileBucket {
    FetchComponent,
    UnpackArchive,
    InstallReferences,
}

impl fmt::Display for ProfileBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileBucket::FetchComponent => write!(f, "fetchComponent"),
            ProfileBucket::UnpackArchive => write!(f, "unpackArchive"),
            ProfileBucket::InstallReferences => write!(f, "installReferences"),
        }
    }
}

/// Wall-clock totals per install phase for one batch
#[derive(Debug, Default)]
pub struct Profiler {
    counters: Mutex<BTreeMap<ProfileBucket, Duration>>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `step` and add its duration to `bucket`, whether it succeeds or not
    pub async fn profile<F, T>(&self, bucket: ProfileBucket, step: F) -> T
    where
        F: Future<Output = T>,
    {
        let start = Instant::now();
        let output = step.await;
        self.record(bucket, start.elapsed());
        output
    }

    pub fn record(&self, bucket: ProfileBucket, elapsed: Duration) {
        if let Ok(mut counters) = self.counters.lock() {
            *counters.entry(bucket).or_default() += elapsed;
        }
    }

    pub fn total(&self, bucket: ProfileBucket) -> Duration {
        self.counters
            .lock()
            .map(|counters| counters.get(&bucket).copied().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> BTreeMap<ProfileBucket, Duration> {
        self.counters
            .lock()
            .map(|counters| counters.clone())
            .unwrap_or_default()
    }

    /// Log the accumulated totals
    pub fn report(&self) {
        for (bucket, elapsed) in self.snapshot() {
            info!("{}: {:.3}s", bucket, elapsed.as_secs_f64());
        }
    }
}
