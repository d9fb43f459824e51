//! The process-wide resource cache.
//!
//! A [`TimedReader`] owns the lazily constructed reader for one named
//! resource and remembers when it was last touched. The [`Manager`] maps
//! resource names to timed readers, authorizes access when an auth sidecar
//! is configured, and runs a sweeper task that drops readers idle past the
//! configured timeout.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{oneshot, RwLock};
use tokio::task::{self, JoinHandle};
use tracing::{debug, info, warn};

use greyhound_core::{Reader, ReaderOpener};

use crate::auth::{Auth, AuthInput};
use crate::config::Configuration;
use crate::error::HttpError;
use crate::pool::BufferPool;
use crate::resource::Resource;

/// A lazily constructed, shareable reader handle for one resource.
pub struct TimedReader {
    name: String,
    paths: Arc<Vec<PathBuf>>,
    opener: Arc<dyn ReaderOpener>,
    touched: Mutex<Instant>,
    slot: RwLock<Option<Arc<dyn Reader>>>,
}

impl TimedReader {
    fn new(name: &str, paths: Arc<Vec<PathBuf>>, opener: Arc<dyn ReaderOpener>) -> TimedReader {
        TimedReader {
            name: name.to_string(),
            paths,
            opener,
            touched: Mutex::new(Instant::now()),
            slot: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn touch(&self) {
        *lock(&self.touched) = Instant::now();
    }

    /// Seconds since the last touch.
    pub fn since(&self) -> u64 {
        lock(&self.touched).elapsed().as_secs()
    }

    /// Whether the reader is currently constructed.
    pub fn exists(&self) -> bool {
        self.slot.try_read().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// The shared reader, constructing it on first use.
    ///
    /// Construction probes each search root in order; the first success
    /// wins. Concurrent callers serialise on the slot's write lock and
    /// share the constructed reader.
    pub async fn get(&self) -> Result<Arc<dyn Reader>, HttpError> {
        if let Some(reader) = self.slot.read().await.as_ref() {
            return Ok(reader.clone());
        }

        let mut slot = self.slot.write().await;
        if let Some(reader) = slot.as_ref() {
            // Another caller finished construction while we waited.
            return Ok(reader.clone());
        }

        info!(name = %self.name, "creating resource");
        for root in self.paths.iter() {
            let target = root.join(&self.name);
            let opener = self.opener.clone();
            let attempt =
                task::spawn_blocking(move || opener.open(&target))
                    .await
                    .map_err(|e| HttpError::Internal(format!("resolver task failed: {e}")))?;
            match attempt {
                Ok(reader) => {
                    debug!(name = %self.name, root = %root.display(), "resolved");
                    *slot = Some(reader.clone());
                    return Ok(reader);
                }
                Err(e) => debug!(name = %self.name, root = %root.display(), error = %e, "resolve failed"),
            }
        }

        warn!(name = %self.name, "resource not found under any configured path");
        Err(HttpError::no_resource(&self.name))
    }

    /// Drop the reader if nothing is borrowing it. Returns true when the
    /// slot is empty afterwards.
    fn try_reset_if_idle(&self) -> bool {
        match self.slot.try_write() {
            Ok(mut slot) => match slot.as_ref() {
                Some(reader) if Arc::strong_count(reader) > 1 => false,
                _ => {
                    *slot = None;
                    true
                }
            },
            // Locked: construction or another reset is in flight.
            Err(_) => false,
        }
    }

    /// Drop the reader once no borrows remain.
    pub async fn reset(&self) -> bool {
        let mut slot = self.slot.write().await;
        match slot.as_ref() {
            Some(reader) if Arc::strong_count(reader) > 1 => false,
            _ => {
                *slot = None;
                true
            }
        }
    }

    #[cfg(test)]
    fn backdate(&self, by: Duration) {
        *lock(&self.touched) = Instant::now() - by;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-wide registry of resources with idle eviction.
pub struct Manager {
    paths: Arc<Vec<PathBuf>>,
    headers: Vec<(String, String)>,
    timeout: Duration,
    opener: Arc<dyn ReaderOpener>,
    pool: Arc<BufferPool>,
    auth: Option<Auth>,
    readers: Mutex<HashMap<String, Arc<TimedReader>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl Manager {
    /// Build the manager and start its sweeper. Must run inside a Tokio
    /// runtime.
    pub fn new(
        config: &Configuration,
        opener: Arc<dyn ReaderOpener>,
        auth: Option<Auth>,
    ) -> Arc<Manager> {
        let mut headers: Vec<(String, String)> = config
            .http
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        headers.push(("Connection".to_string(), "keep-alive".to_string()));
        headers.push(("X-powered-by".to_string(), "Hobu, Inc.".to_string()));
        headers.push((
            "Access-Control-Allow-Headers".to_string(),
            "Content-Type".to_string(),
        ));

        let timeout = Duration::from_secs(config.resource_timeout_seconds());

        let manager = Arc::new(Manager {
            paths: Arc::new(config.search_paths()),
            headers,
            timeout,
            opener,
            pool: BufferPool::new(config.query_buffers),
            auth,
            readers: Mutex::new(HashMap::new()),
            sweeper: Mutex::new(None),
            shutdown: Mutex::new(None),
        });

        let (tx, mut rx) = oneshot::channel::<()>();
        let weak = Arc::downgrade(&manager);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = tokio::time::sleep(timeout) => {
                        let Some(manager) = weak.upgrade() else { break };
                        manager.sweep();
                    }
                    _ = &mut rx => break,
                }
            }
            debug!("sweeper exited");
        });
        *lock(&manager.sweeper) = Some(handle);
        *lock(&manager.shutdown) = Some(tx);

        manager
    }

    /// Authorize, find-or-insert, touch, and wrap the named resource.
    pub async fn get(self: &Arc<Self>, name: &str, input: &AuthInput) -> Result<Resource, HttpError> {
        if let Some(auth) = &self.auth {
            let status = auth.check(name, input).await?;
            if !(200..300).contains(&status) {
                return Err(HttpError::Unauthorized);
            }
        }

        let timed = {
            let mut map = lock(&self.readers);
            map.entry(name.to_string())
                .or_insert_with(|| {
                    Arc::new(TimedReader::new(name, self.paths.clone(), self.opener.clone()))
                })
                .clone()
        };
        timed.touch();

        match timed.get().await {
            Ok(reader) => Ok(Resource::new(self.clone(), name, timed, reader)),
            Err(e) => {
                // A failed resolve must not linger in the cache.
                let mut map = lock(&self.readers);
                if let Some(current) = map.get(name) {
                    if Arc::ptr_eq(current, &timed) && !timed.exists() {
                        map.remove(name);
                    }
                }
                Err(e)
            }
        }
    }

    /// Headers merged into every response.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.timeout.as_secs()
    }

    /// Drop and remove every reader idle past the timeout with no borrows.
    fn sweep(&self) {
        let entries: Vec<(String, Arc<TimedReader>)> = lock(&self.readers)
            .iter()
            .map(|(name, timed)| (name.clone(), timed.clone()))
            .collect();

        for (name, timed) in entries {
            if timed.since() > self.timeout.as_secs() && timed.try_reset_if_idle() {
                let mut map = lock(&self.readers);
                if let Some(current) = map.get(&name) {
                    // Two strong refs: the map's and our snapshot's. More
                    // means an in-flight handler still holds the entry.
                    if Arc::ptr_eq(current, &timed) && Arc::strong_count(&timed) == 2 {
                        map.remove(&name);
                        info!(name = %name, "purging idle resource");
                    }
                }
            }
        }
    }

    /// Signal the sweeper to exit and join it.
    pub async fn shutdown(&self) {
        if let Some(tx) = lock(&self.shutdown).take() {
            let _ = tx.send(());
        }
        let handle = lock(&self.sweeper).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    #[cfg(test)]
    pub(crate) fn sweep_now(&self) {
        self.sweep();
    }

    #[cfg(test)]
    pub(crate) fn backdate(&self, name: &str, by: Duration) {
        if let Some(timed) = lock(&self.readers).get(name) {
            timed.backdate(by);
        }
    }

    #[cfg(test)]
    pub(crate) fn cached(&self, name: &str) -> Option<Arc<TimedReader>> {
        lock(&self.readers).get(name).cloned()
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.sweeper).take() {
            handle.abort();
        }
    }
}
