use std::{future, io, sync::Arc, thread};

use tokio::{
    sync::{Semaphore, mpsc, watch},
    task::JoinSet,
};

use crate::{
    Error,
    lookup::{NetworkLookup, RecordForNetwork},
};

mod task;

use self::task::Shared;

/// Keys read ahead of the dispatch loop.
const KEY_BUFFER: usize = 16;

/// Invoked once for every key whose lookup produced at least one record.
///
/// Calls for different keys may run at the same time; callbacks writing to a
/// shared sink have to synchronize it themselves.
pub type Callback = Arc<dyn Fn(&str, &[RecordForNetwork]) + Send + Sync>;

/// Invoked once for every key whose lookup failed, after the failure is logged.
pub type ErrorHook = Arc<dyn Fn(&str, &Error) + Send + Sync>;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LookupStats {
    /// Keys handed to a lookup task.
    pub dispatched: usize,
    /// Keys that produced at least one record.
    pub matched: usize,
    /// Keys whose lookup returned an error.
    pub failed: usize,
    /// Records in the aggregate.
    pub records: usize,
    /// The shutdown signal stopped the engine before the keys ran out.
    pub stopped_early: bool,
}

/// Fans lookup keys out to one task each and collects every matched record.
///
/// The order of the returned records follows task completion and is not
/// stable across runs.
pub struct LookupEngine<L> {
    lookup: Arc<L>,
    limit: Option<Arc<Semaphore>>,
    on_error: Option<ErrorHook>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<L> LookupEngine<L>
where
    L: NetworkLookup + 'static,
{
    pub fn new(lookup: L) -> Self {
        Self {
            lookup: Arc::new(lookup),
            limit: None,
            on_error: None,
            shutdown: None,
        }
    }

    /// Caps the number of lookups in flight. Without a cap every key gets a
    /// task as soon as it is read.
    pub fn max_concurrency(mut self, max: usize) -> Self {
        self.limit = Some(Arc::new(Semaphore::new(max.max(1))));
        self
    }

    pub fn on_error(mut self, hook: ErrorHook) -> Self {
        self.on_error = Some(hook);
        self
    }

    /// Once the receiver reads `true` no further keys are dispatched, even
    /// while the key source is blocked. Lookups already running are left to
    /// finish.
    pub fn shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub async fn run_iter<I>(&self, keys: I, callback: Option<Callback>) -> Vec<RecordForNetwork>
    where
        I: IntoIterator<Item = String>,
        I::IntoIter: Send + 'static,
    {
        self.run_iter_with_stats(keys, callback).await.0
    }

    pub async fn run_networks<S>(
        &self,
        keys: &[S],
        callback: Option<Callback>,
    ) -> Vec<RecordForNetwork>
    where
        S: AsRef<str>,
    {
        let keys: Vec<String> = keys.iter().map(|key| key.as_ref().to_owned()).collect();
        self.run_iter(keys, callback).await
    }

    /// Keys are pulled on a dedicated thread, so a source blocked on I/O
    /// never holds up the runtime or the shutdown signal.
    pub async fn run_iter_with_stats<I>(
        &self,
        keys: I,
        callback: Option<Callback>,
    ) -> (Vec<RecordForNetwork>, LookupStats)
    where
        I: IntoIterator<Item = String>,
        I::IntoIter: Send + 'static,
    {
        let shared = Arc::new(Shared::new(
            self.lookup.clone(),
            callback,
            self.on_error.clone(),
        ));
        let mut tasks = JoinSet::new();
        let mut stats = LookupStats::default();
        let mut shutdown = self.shutdown.clone();

        let mut keys = match spawn_reader(keys.into_iter()) {
            Ok(keys) => keys,
            Err(err) => {
                error!("failed to start reading lookup keys: {}", err);
                stats.stopped_early = true;
                return (Vec::new(), stats);
            }
        };

        loop {
            let key = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => {
                    info!("shutdown requested, no further lookups are started");
                    stats.stopped_early = true;
                    break;
                }
                key = keys.recv() => match key {
                    Some(key) => key,
                    None => break,
                },
            };
            if key.is_empty() {
                continue;
            }

            let permit = match &self.limit {
                Some(limit) => tokio::select! {
                    biased;
                    _ = shutdown_requested(&mut shutdown) => {
                        info!("shutdown requested, no further lookups are started");
                        stats.stopped_early = true;
                        break;
                    }
                    permit = limit.clone().acquire_owned() => match permit {
                        Ok(permit) => Some(permit),
                        Err(err) => {
                            error!("lookup limiter closed: {}", err);
                            stats.stopped_early = true;
                            break;
                        }
                    },
                },
                None => None,
            };

            let shared = shared.clone();
            tasks.spawn_blocking(move || {
                let _permit = permit;
                shared.process(&key);
            });
            stats.dispatched += 1;

            while let Some(joined) = tasks.try_join_next() {
                log_join(joined);
            }
        }
        // the reader thread stops at its next send
        drop(keys);

        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }

        let records = shared.take_records();
        stats.matched = shared.matched();
        stats.failed = shared.failed();
        stats.records = records.len();
        debug!(
            dispatched = stats.dispatched,
            matched = stats.matched,
            failed = stats.failed,
            records = stats.records,
            "lookups finished"
        );
        (records, stats)
    }
}

fn spawn_reader<K>(keys: K) -> io::Result<mpsc::Receiver<String>>
where
    K: Iterator<Item = String> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(KEY_BUFFER);
    thread::Builder::new()
        .name("lookup-keys".into())
        .spawn(move || {
            for key in keys {
                if tx.blocking_send(key).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

/// Resolves once the shutdown flag reads `true`; never without a receiver.
async fn shutdown_requested(shutdown: &mut Option<watch::Receiver<bool>>) {
    if let Some(rx) = shutdown {
        let stopped = rx.wait_for(|stop| *stop).await.is_ok();
        if stopped {
            return;
        }
    }
    future::pending::<()>().await
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(err) = joined {
        error!("lookup task failed: {}", err);
    }
}

/// One-shot form of [`LookupEngine::run_iter`].
pub async fn run_lookups<I, L>(
    keys: I,
    lookup: L,
    callback: Option<Callback>,
) -> Vec<RecordForNetwork>
where
    I: IntoIterator<Item = String>,
    I::IntoIter: Send + 'static,
    L: NetworkLookup + 'static,
{
    LookupEngine::new(lookup).run_iter(keys, callback).await
}
