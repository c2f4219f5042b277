//! Parallel trace parse: windows of per-thread shards decoded by a worker
//! pool, merged by one master in shard order.

use super::cancel::CancellationToken;
use super::master::MasterReconstructor;
use crate::heap::{HeapListener, HeapModel, ParsingInfo};
use crate::parser::{Chunk, DecodeContext, Located, SlaveDecoder, SyncLevel, TraceReader};
use crate::staging::{PendingPointerTable, StagingThread};
use crate::symbols::Symbols;
use crate::utils::config::{DEFAULT_MAX_WINDOW_BYTES, JOB_QUEUE_CAPACITY};
use crate::utils::error::TraceError;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, info, warn};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read};
use std::num::NonZeroUsize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

/// Parse settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserConfig {
    /// Number of decoder workers
    pub parallelism: usize,

    /// Payload bytes after which a window is cut
    pub max_window_bytes: usize,

    /// Byte range reported to listeners as "in window"
    pub byte_window: Option<(u64, u64)>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            parallelism: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            max_window_bytes: DEFAULT_MAX_WINDOW_BYTES,
            byte_window: None,
        }
    }
}

/// Counters of one parse
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    pub chunks: u64,
    pub windows: u64,
    pub records: u64,
    pub bytes: u64,
    pub gcs: u64,
    pub threads: usize,
    pub unresolved: usize,
}

/// The reconstructed heap and how it was obtained
pub struct ParseOutcome {
    pub heap: HeapModel,
    pub stats: ParseStats,
    /// The registered listeners, handed back after `close`
    pub listeners: Vec<Box<dyn HeapListener>>,
}

impl std::fmt::Debug for ParseOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParseOutcome")
            .field("heap", &self.heap)
            .field("stats", &self.stats)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Everything one worker produced for one shard
pub struct ShardBatch {
    pub ordinal: u32,
    pub thread: u64,
    pub staging: StagingThread,
    pub records: Vec<Located>,
    /// Address base after the shard's last GC event
    pub base: u64,
    pub saw_gc: bool,
}

/// **Private** - one shard handed to a worker
struct Job {
    window: u64,
    ordinal: u32,
    staging: StagingThread,
    chunks: Vec<Chunk>,
    base: u64,
    anchors: bool,
}

type ShardResult = Result<ShardBatch, (u32, TraceError)>;

/// **Private** - what workers borrow for the whole parse
struct WorkerEnv<'a> {
    symbols: &'a Symbols,
    heap: &'a RwLock<HeapModel>,
    pending: &'a PendingPointerTable,
    cancel: &'a CancellationToken,
}

/// Entry point of a trace parse
pub struct TraceParser {
    symbols: Arc<Symbols>,
    config: ParserConfig,
    cancel: CancellationToken,
    listeners: Vec<Box<dyn HeapListener>>,
}

impl TraceParser {
    pub fn new(symbols: Arc<Symbols>, config: ParserConfig) -> Self {
        Self {
            symbols,
            config,
            cancel: CancellationToken::new(),
            listeners: Vec::new(),
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn HeapListener>) {
        self.listeners.push(listener);
    }

    /// Token that cancels this parse from another thread
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Parse a trace file
    ///
    /// **Public** - opens the file and parses it with its length known
    pub fn parse_file(self, path: impl AsRef<Path>) -> Result<ParseOutcome, TraceError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let length = file.metadata()?.len();
        info!("Parsing trace {} ({} bytes)", path.display(), length);

        self.parse(BufReader::new(file), Some(length))
    }

    /// Parse a trace from any reader
    ///
    /// # Errors
    /// * `TraceError::BadHeader` - not a trace, or an unknown version
    /// * `TraceError::Decode` - the lowest-ordinal failing shard of a window
    /// * `TraceError::Structural` / `Reconciliation` - from the master
    /// * `TraceError::Cancelled` - the token was cancelled
    pub fn parse<R: Read>(self, reader: R, trace_length: Option<u64>) -> Result<ParseOutcome, TraceError> {
        let mut reader = TraceReader::new(reader)?;
        let workers = self.config.parallelism.max(1);

        let mut master = MasterReconstructor::new(self.cancel.clone());
        for listener in self.listeners {
            master.add_listener(listener);
        }

        let heap = RwLock::new(HeapModel::new(Arc::clone(&self.symbols)));
        let pending = PendingPointerTable::new();
        let env = WorkerEnv {
            symbols: &self.symbols,
            heap: &heap,
            pending: &pending,
            cancel: &self.cancel,
        };

        debug!("Starting {} decoder workers", workers);
        let stats = std::thread::scope(|scope| {
            let (job_tx, job_rx) = bounded::<Job>(JOB_QUEUE_CAPACITY);
            let (result_tx, result_rx) = unbounded::<ShardResult>();

            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let env = &env;
                scope.spawn(move || worker_loop(env, job_rx, result_tx));
            }
            drop(result_tx);

            let mut driver = Driver {
                config: &self.config,
                trace_length,
                env: &env,
                master: &mut master,
                jobs: job_tx,
                results: result_rx,
                stagings: BTreeMap::new(),
                window: Vec::new(),
                window_bytes: 0,
                window_id: 0,
                base: 0,
                anchors: reader.header().anchors,
                stats: ParseStats::default(),
            };
            let outcome = driver.run(&mut reader);
            // dropping the driver closes the job queue so workers exit
            drop(driver);
            outcome
        })?;

        let heap = heap.into_inner();
        let stats = ParseStats {
            gcs: master.gc_count(),
            unresolved: heap.diagnostics().len(),
            ..stats
        };
        info!(
            "Parsed {} chunks in {} windows: {} GCs, {} live objects, {} unresolved references",
            stats.chunks,
            stats.windows,
            stats.gcs,
            heap.live_objects(),
            stats.unresolved
        );

        Ok(ParseOutcome {
            heap,
            stats,
            listeners: master.into_listeners(),
        })
    }
}

/// **Private** - decode jobs until the queue closes
fn worker_loop(env: &WorkerEnv<'_>, jobs: Receiver<Job>, results: Sender<ShardResult>) {
    for job in jobs {
        let ordinal = job.ordinal;
        let result = catch_unwind(AssertUnwindSafe(|| decode_job(env, job)))
            .unwrap_or_else(|panic| Err(TraceError::Worker(panic_message(panic.as_ref()))))
            .map_err(|err| (ordinal, err));

        if results.send(result).is_err() {
            break;
        }
    }
}

/// **Private** - decode one shard against the heap as frozen at window start
fn decode_job(env: &WorkerEnv<'_>, job: Job) -> Result<ShardBatch, TraceError> {
    let heap = env.heap.read();
    let ctx = DecodeContext {
        symbols: env.symbols,
        heap: &heap,
        pending: env.pending,
        cancel: env.cancel,
        anchors: job.anchors,
        window: job.window,
        shard: job.ordinal,
    };

    let mut decoder = SlaveDecoder::new(ctx, job.base);
    let mut staging = job.staging;
    let mut records = Vec::new();
    for chunk in &job.chunks {
        decoder.decode_chunk(&mut staging, chunk, &mut records)?;
    }

    Ok(ShardBatch {
        ordinal: job.ordinal,
        thread: staging.id(),
        staging,
        records,
        base: decoder.codec().base(),
        saw_gc: decoder.saw_gc(),
    })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "decoder panicked".to_string()
    }
}

/// **Private** - parse-thread state: windowing, job dispatch, ordered merge
struct Driver<'a, 'env> {
    config: &'a ParserConfig,
    trace_length: Option<u64>,
    env: &'a WorkerEnv<'env>,
    master: &'a mut MasterReconstructor,
    jobs: Sender<Job>,
    results: Receiver<ShardResult>,
    stagings: BTreeMap<u64, StagingThread>,
    window: Vec<Chunk>,
    window_bytes: usize,
    window_id: u64,
    base: u64,
    anchors: bool,
    stats: ParseStats,
}

impl Driver<'_, '_> {
    fn run<R: Read>(&mut self, reader: &mut TraceReader<R>) -> Result<ParseStats, TraceError> {
        while let Some(chunk) = reader.next_chunk()? {
            if self.env.cancel.is_cancelled() {
                return Err(TraceError::Cancelled);
            }

            self.stats.chunks += 1;
            self.stats.bytes += chunk.payload.len() as u64;
            let position = reader.position();

            match chunk.sync {
                SyncLevel::None => {}
                SyncLevel::EnsureOrder => self.run_window(position)?,
                SyncLevel::Full => {
                    self.run_window(position)?;
                    self.flush_all(position)?;
                }
            }

            let full = chunk.sync == SyncLevel::Full;
            self.window_bytes += chunk.payload.len();
            self.window.push(chunk);

            if full || self.window_bytes > self.config.max_window_bytes {
                self.run_window(position)?;
            }
        }

        let position = reader.position();
        self.run_window(position)?;
        self.flush_all(position)?;

        let info = self.parsing_info(position);
        let heap = self.env.heap.read();
        self.master.finish(&heap, self.env.pending, &info);

        self.stats.threads = self.stagings.len();
        Ok(self.stats.clone())
    }

    fn parsing_info(&self, position: u64) -> ParsingInfo {
        ParsingInfo {
            trace_length: self.trace_length,
            position,
            window: self.config.byte_window,
        }
    }

    /// Decode the buffered chunks in parallel and apply them in shard order
    fn run_window(&mut self, position: u64) -> Result<(), TraceError> {
        if self.window.is_empty() {
            return Ok(());
        }

        let window_id = self.window_id;
        self.window_id += 1;
        self.stats.windows += 1;
        self.window_bytes = 0;

        let mut shards: Vec<(u64, Vec<Chunk>)> = Vec::new();
        let mut ordinals: HashMap<u64, usize> = HashMap::new();
        for chunk in self.window.drain(..) {
            let ordinal = *ordinals.entry(chunk.thread).or_insert_with(|| {
                shards.push((chunk.thread, Vec::new()));
                shards.len() - 1
            });
            shards[ordinal].1.push(chunk);
        }
        debug!("Window {}: {} shards", window_id, shards.len());

        let count = shards.len();
        for (ordinal, (thread, chunks)) in shards.into_iter().enumerate() {
            let staging = self
                .stagings
                .remove(&thread)
                .unwrap_or_else(|| StagingThread::new(thread));
            let job = Job {
                window: window_id,
                ordinal: ordinal as u32,
                staging,
                chunks,
                base: self.base,
                anchors: self.anchors,
            };
            self.jobs
                .send(job)
                .map_err(|_| TraceError::Worker("decoder pool is gone".to_string()))?;
        }

        let mut batches: Vec<Option<ShardBatch>> = (0..count).map(|_| None).collect();
        let mut failure: Option<(u32, TraceError)> = None;
        for _ in 0..count {
            let result = self
                .results
                .recv()
                .map_err(|_| TraceError::Worker("decoder pool is gone".to_string()))?;
            match result {
                Ok(batch) => {
                    let ordinal = batch.ordinal as usize;
                    batches[ordinal] = Some(batch);
                }
                Err((ordinal, err)) => {
                    if failure.as_ref().map_or(true, |(lowest, _)| ordinal < *lowest) {
                        failure = Some((ordinal, err));
                    }
                }
            }
        }
        if let Some((ordinal, err)) = failure {
            warn!("Shard {} of window {} failed", ordinal, window_id);
            return Err(err);
        }

        let info = self.parsing_info(position);
        let mut heap = self.env.heap.write();
        for batch in batches.into_iter().flatten() {
            self.stats.records += batch.records.len() as u64;
            for located in batch.records {
                self.master
                    .apply(&mut heap, self.env.pending, batch.thread, located, &info)?;
            }
            if batch.saw_gc {
                self.base = batch.base;
            }
            self.stagings.insert(batch.thread, batch.staging);
        }
        Ok(())
    }

    /// Finish every thread's accumulation and retire its labs
    fn flush_all(&mut self, position: u64) -> Result<(), TraceError> {
        let info = self.parsing_info(position);
        let mut heap = self.env.heap.write();

        for (thread, staging) in self.stagings.iter_mut() {
            for record in staging.flush(self.env.pending)? {
                self.stats.records += 1;
                let located = Located {
                    offset: position,
                    record,
                };
                self.master
                    .apply(&mut heap, self.env.pending, *thread, located, &info)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ParserConfig::default();
        assert!(config.parallelism >= 1);
        assert_eq!(config.max_window_bytes, DEFAULT_MAX_WINDOW_BYTES);
        assert_eq!(config.byte_window, None);
    }

    #[test]
    fn test_panic_message() {
        let panic = catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(panic.as_ref()), "boom");
    }

    #[test]
    fn test_empty_trace() {
        let mut bytes = Vec::new();
        for word in [crate::utils::config::TRACE_MAGIC, crate::utils::config::TRACE_VERSION, 0] {
            bytes.extend_from_slice(&word.to_le_bytes());
        }

        let parser = TraceParser::new(Arc::new(Symbols::default()), ParserConfig::default());
        let outcome = parser.parse(&bytes[..], None).unwrap();

        assert_eq!(outcome.stats.chunks, 0);
        assert_eq!(outcome.heap.live_objects(), 0);
    }
}
