//! Background writer for disk cache entries.
//!
//! One named thread drains a single-slot mailbox. Submitting while a job is
//! still waiting replaces it: only the most recent decode is worth keeping.
//! A job the worker has already taken is always finished.

use std::io::{BufWriter, Write};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use crate::image_pipeline::cache::file_cache::DiskCache;
use crate::image_pipeline::cache::key::CacheKey;
use crate::image_pipeline::common::error::{CacheError, PipelineError, Result};
use crate::image_pipeline::tiff::{CacheCompression, StandardTiffWriter, TiffWriter};
use crate::image_pipeline::tiles::TiledImage;

const WORKER_NAME: &str = "raw-cache-writer";

pub struct CacheJob {
    pub key: CacheKey,
    pub image: Arc<TiledImage>,
}

#[derive(Default)]
struct Mailbox {
    job: Option<CacheJob>,
    writing: bool,
    shutdown: bool,
}

struct Shared {
    mailbox: Mutex<Mailbox>,
    /// Signalled when a job arrives or shutdown is requested.
    work: Condvar,
    /// Signalled when the worker goes idle.
    idle: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Mailbox> {
        self.mailbox.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct BackgroundCachePersister {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl BackgroundCachePersister {
    /// Starts the worker thread.
    pub fn new(disk: Arc<dyn DiskCache>, compression: CacheCompression) -> Result<Self> {
        Self::with_writer(disk, Arc::new(StandardTiffWriter), compression)
    }

    pub fn with_writer(
        disk: Arc<dyn DiskCache>,
        writer: Arc<dyn TiffWriter>,
        compression: CacheCompression,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            mailbox: Mutex::new(Mailbox::default()),
            work: Condvar::new(),
            idle: Condvar::new(),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || run(worker_shared, disk, writer, compression))
            .map_err(|e| PipelineError::Setup(format!("cannot start {}: {}", WORKER_NAME, e)))?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Queues `image` for writing under `key`, replacing any job that has
    /// not started yet. Never waits for I/O.
    pub fn submit(&self, key: CacheKey, image: Arc<TiledImage>) {
        let mut mailbox = self.shared.lock();
        if let Some(replaced) = mailbox.job.replace(CacheJob { key, image }) {
            debug!(key = %replaced.key, "Dropped pending cache job in favour of a newer one");
        }
        self.shared.work.notify_one();
    }

    /// Key of the job waiting in the mailbox, if any.
    pub fn pending_key(&self) -> Option<CacheKey> {
        self.shared.lock().job.as_ref().map(|job| job.key.clone())
    }

    /// Blocks until the mailbox is empty and nothing is being written.
    pub fn wait_idle(&self) {
        let mut mailbox = self.shared.lock();
        while mailbox.job.is_some() || mailbox.writing {
            mailbox = self
                .shared
                .idle
                .wait(mailbox)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Drop for BackgroundCachePersister {
    fn drop(&mut self) {
        self.shared.lock().shutdown = true;
        self.shared.work.notify_all();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Cache writer thread panicked");
            }
        }
    }
}

fn run(shared: Arc<Shared>, disk: Arc<dyn DiskCache>, writer: Arc<dyn TiffWriter>, compression: CacheCompression) {
    debug!("Cache writer started");
    loop {
        let job = {
            let mut mailbox = shared.lock();
            loop {
                if let Some(job) = mailbox.job.take() {
                    mailbox.writing = true;
                    break job;
                }
                if mailbox.shutdown {
                    debug!("Cache writer stopped");
                    return;
                }
                mailbox = shared.work.wait(mailbox).unwrap_or_else(PoisonError::into_inner);
            }
        };

        let span = tracing::info_span!("persist_cache", key = %job.key);
        let _enter = span.enter();
        match persist(disk.as_ref(), writer.as_ref(), &job, compression) {
            Ok(()) => info!("Cached decoded raster"),
            Err(e) => warn!(error = %e, "Failed to write cache entry"),
        }
        drop(job);

        let mut mailbox = shared.lock();
        mailbox.writing = false;
        if mailbox.job.is_none() {
            shared.idle.notify_all();
        }
    }
}

fn persist(
    disk: &dyn DiskCache,
    writer: &dyn TiffWriter,
    job: &CacheJob,
    compression: CacheCompression,
) -> std::result::Result<(), CacheError> {
    let mut pending = disk.create_file_for(&job.key)?;
    {
        let mut out = BufWriter::new(pending.file_mut());
        writer.write_tiff(&job.image, job.key.as_str(), &mut out, compression)?;
        out.flush()?;
    }
    disk.finalize(pending)
}
