//! Capture sessions and the process-wide capture state.
//!
//! A [`CaptureSession`] owns one output file and appends every finished method context to it.
//! JIT entry points cannot take extra parameters, so the session in effect for a compilation is
//! found through a thread-indexed registry: [`CaptureSession::enter`] makes a session current
//! for the calling thread until the returned guard is dropped.
//!
//! The real JIT and the default session are published once per process through
//! [`std::sync::OnceLock`] and live until the process exits.

use std::{
    fs::{File, OpenOptions},
    io::{self, ErrorKind as IoErrorKind, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, OnceLock,
    },
    thread::{self, ThreadId},
};

use dashmap::DashMap;

use crate::{
    corinfo::JitCompiler,
    methodcontext::MethodContext,
    shim::{CaptureCompiler, CaptureConfig},
    Error, Result,
};

static REAL_JIT: OnceLock<Arc<dyn JitCompiler>> = OnceLock::new();
static GLOBAL_SESSION: OnceLock<Arc<CaptureSession>> = OnceLock::new();
static ACTIVE_SESSIONS: OnceLock<DashMap<ThreadId, Arc<CaptureSession>>> = OnceLock::new();

fn active_sessions() -> &'static DashMap<ThreadId, Arc<CaptureSession>> {
    ACTIVE_SESSIONS.get_or_init(DashMap::new)
}

/// Collects captured method contexts into one `.mc` file.
pub struct CaptureSession {
    config: CaptureConfig,
    output: Mutex<Option<(File, PathBuf)>>,
    committed: AtomicU64,
}

impl CaptureSession {
    /// A session writing below `config.output_dir`. No file is created until the first commit.
    #[must_use]
    pub fn new(config: CaptureConfig) -> Self {
        CaptureSession {
            config,
            output: Mutex::new(None),
            committed: AtomicU64::new(0),
        }
    }

    /// The configuration this session was created with
    #[must_use]
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Number of method contexts written so far
    #[must_use]
    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::Acquire)
    }

    /// Path of the output file, once the first context has been committed.
    ///
    /// # Errors
    /// [`Error::LockError`] if a writer panicked while holding the output.
    pub fn output_path(&self) -> Result<Option<PathBuf>> {
        let output = lock!(self.output);
        Ok(output.as_ref().map(|(_, path)| path.clone()))
    }

    /// Appends `mc` to the session's output file, creating it on first use.
    ///
    /// Each context is written under the session lock, so concurrent commits from several
    /// compiling threads never interleave. A failed write is cut back off the file so later
    /// contexts stay readable.
    ///
    /// # Errors
    /// Serialization or I/O failures. Callers on the capture path log these instead of failing
    /// the compilation.
    pub fn commit(&self, mc: &MethodContext) -> Result<()> {
        let bytes = mc.to_bytes()?;

        let mut output = lock!(self.output);
        if output.is_none() {
            *output = Some(create_unique(&self.config.output_dir)?);
        }
        let Some((file, path)) = output.as_mut() else {
            return Err(Error::Fatal("capture output vanished".to_string()));
        };
        append_record(file, &bytes)?;
        let number = self.committed.fetch_add(1, Ordering::AcqRel) + 1;

        log::debug!(
            "Committed method context #{} ({} bytes) to {}",
            number,
            bytes.len(),
            path.display()
        );
        Ok(())
    }

    /// Makes this session current for the calling thread until the guard is dropped.
    #[must_use]
    pub fn enter(self: &Arc<Self>) -> SessionGuard {
        let thread = thread::current().id();
        let previous = active_sessions().insert(thread, Arc::clone(self));
        SessionGuard { thread, previous }
    }

    /// The session current for the calling thread, if any.
    #[must_use]
    pub fn current() -> Option<Arc<CaptureSession>> {
        active_sessions()
            .get(&thread::current().id())
            .map(|entry| Arc::clone(entry.value()))
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("config", &self.config)
            .field("committed", &self.committed())
            .finish_non_exhaustive()
    }
}

/// Restores the previously current session of a thread when dropped.
pub struct SessionGuard {
    thread: ThreadId,
    previous: Option<Arc<CaptureSession>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(previous) => {
                active_sessions().insert(self.thread, previous);
            }
            None => {
                active_sessions().remove(&self.thread);
            }
        }
    }
}

/// A seekable output that can be cut back to a previous length.
trait RecordSink: Write + Seek {
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

impl RecordSink for File {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Writes one whole record, or nothing.
fn append_record<S: RecordSink>(sink: &mut S, bytes: &[u8]) -> io::Result<()> {
    let start = sink.stream_position()?;
    let Err(error) = sink.write_all(bytes) else {
        return Ok(());
    };

    let rollback = sink
        .truncate_to(start)
        .and_then(|()| sink.seek(SeekFrom::Start(start)).map(|_| ()));
    if let Err(rollback) = rollback {
        log::error!(
            "Could not remove partial record at offset {}: {}",
            start,
            rollback
        );
    }
    Err(error)
}

fn create_unique(dir: &Path) -> Result<(File, PathBuf)> {
    std::fs::create_dir_all(dir)?;
    let pid = std::process::id();
    for attempt in 0_u32.. {
        let path = dir.join(format!("mc_{pid}_{attempt}.mc"));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => {
                log::info!("Capture output file {}", path.display());
                return Ok((file, path));
            }
            Err(error) if error.kind() == IoErrorKind::AlreadyExists => {}
            Err(error) => return Err(Error::FileError(error)),
        }
    }
    Err(Error::Fatal(format!(
        "no free capture file name in {}",
        dir.display()
    )))
}

/// Publishes the real JIT that capture compilers wrap. Can be done once per process.
///
/// # Errors
/// [`Error::InvalidArgument`] if a JIT has already been installed.
pub fn install_real_jit(jit: Arc<dyn JitCompiler>) -> Result<()> {
    REAL_JIT
        .set(jit)
        .map_err(|_| Error::InvalidArgument("a real JIT is already installed".to_string()))
}

/// The process-wide session, configured from the environment on first use.
///
/// # Errors
/// Configuration errors from [`CaptureConfig::from_env`].
pub fn global_session() -> Result<Arc<CaptureSession>> {
    if let Some(session) = GLOBAL_SESSION.get() {
        return Ok(Arc::clone(session));
    }

    let session = Arc::new(CaptureSession::new(CaptureConfig::from_env()?));
    Ok(Arc::clone(GLOBAL_SESSION.get_or_init(|| session)))
}

/// The capturing JIT: the installed real JIT wrapped to record into the session current for
/// the compiling thread, or [`global_session`] when none is entered.
///
/// # Errors
/// [`Error::InvalidArgument`] if no real JIT was installed.
pub fn get_jit() -> Result<Arc<dyn JitCompiler>> {
    let Some(real) = REAL_JIT.get() else {
        return Err(Error::InvalidArgument(
            "no real JIT installed to capture from".to_string(),
        ));
    };
    Ok(Arc::new(CaptureCompiler::ambient(Arc::clone(real))))
}
