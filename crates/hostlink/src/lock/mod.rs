//! Named cross-process locks.
//!
//! A lock is identified by a string name and backed by an advisory file lock
//! (`flock(2)` with `LOCK_EX | LOCK_NB`) on `<lock_dir>/<name>.lock`.
//! Independent processes that derive the same name contend on the same file,
//! which is the whole point: the lock directory is the only shared state.
//!
//! Acquisition polls with a fixed interval plus random jitter until it
//! succeeds or the caller's timeout elapses. Ownership is witnessed by a
//! [`LockGuard`]; dropping the guard closes the descriptor and the kernel
//! releases the lock, which also happens on process death - a crashed holder
//! never wedges its peers.
//!
//! # Invariants
//!
//! - At most one process holds a given name at any instant.
//! - Release is tied to guard drop; there is no path that leaks a held lock.
//! - Lock files are created world-writable so any local user may contend.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

/// Poll interval while waiting for a contended lock.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Maximum random jitter added to each poll (milliseconds).
pub const LOCK_POLL_JITTER_MS: u64 = 50;

/// Permissions for lock files: any local user may contend.
const LOCK_FILE_MODE: u32 = 0o666;

/// Errors from named lock operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock was still held by another process when the timeout elapsed.
    #[error("lock {name} not acquired within {}s", .elapsed.as_secs())]
    Timeout {
        /// Name that could not be acquired.
        name: String,
        /// How long we waited.
        elapsed: Duration,
    },

    /// I/O failure while opening or locking the lock file.
    #[error("lock I/O error: {context}: {source}")]
    Io {
        /// What was being attempted.
        context: String,
        /// Underlying I/O error.
        source: io::Error,
    },
}

impl LockError {
    fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

/// RAII witness of an exclusively held named lock.
///
/// The lock is released when the guard is dropped; the kernel releases the
/// underlying `flock` when the file descriptor closes.
pub struct LockGuard {
    /// Held open for the lifetime of the guard.
    _lock_file: File,
    name: String,
}

impl LockGuard {
    /// Name of the held lock.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Directory of named lock files.
#[derive(Debug, Clone)]
pub struct LockDir {
    root: PathBuf,
}

impl LockDir {
    /// Creates a lock directory handle rooted at `root`.
    ///
    /// The directory must already exist; see [`LockDir::from_default_dir`]
    /// for a variant that creates the conventional location.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates a handle on the host's default lock directory, creating the
    /// directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Io`] if the directory cannot be created.
    pub fn from_default_dir() -> LockResult<Self> {
        let root = crate::paths::default_lock_dir();
        // World-writable so independent local processes can contend.
        crate::paths::ensure_dir(&root, 0o777)
            .map_err(|e| LockError::io(format!("creating lock dir {}", root.display()), e))?;
        Ok(Self::new(root))
    }

    /// Path of the lock file backing `name`.
    #[must_use]
    pub fn lock_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.lock"))
    }

    /// Tries to acquire `name` without blocking.
    ///
    /// Returns `Ok(Some(guard))` on success, `Ok(None)` when another process
    /// holds the lock.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Io`] on unexpected filesystem errors.
    pub fn try_acquire(&self, name: &str) -> LockResult<Option<LockGuard>> {
        let lock_path = self.lock_path(name);

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| LockError::io(format!("opening lock file {}", lock_path.display()), e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(LOCK_FILE_MODE);
            if let Err(e) = fs::set_permissions(&lock_path, perms) {
                warn!(path = %lock_path.display(), err = %e, "failed to set lock file permissions");
            }
        }

        match try_flock_exclusive(&lock_file) {
            Ok(true) => {
                debug!(name, "lock acquired");
                Ok(Some(LockGuard {
                    _lock_file: lock_file,
                    name: name.to_string(),
                }))
            }
            Ok(false) => Ok(None),
            Err(e) => Err(LockError::io(format!("locking {}", lock_path.display()), e)),
        }
    }

    /// Acquires `name`, polling with jitter until success or `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] if the lock is still held elsewhere
    /// when `timeout` elapses; the caller decides whether that is fatal.
    pub fn acquire(&self, name: &str, timeout: Duration) -> LockResult<LockGuard> {
        let start = Instant::now();
        loop {
            if let Some(guard) = self.try_acquire(name)? {
                return Ok(guard);
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(LockError::Timeout {
                    name: name.to_string(),
                    elapsed,
                });
            }
            let jitter_ms = rand::random::<u64>() % (LOCK_POLL_JITTER_MS + 1);
            std::thread::sleep(LOCK_POLL_INTERVAL + Duration::from_millis(jitter_ms));
        }
    }

    /// Checks whether `name` is currently held by another process.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Io`] on unexpected filesystem errors.
    pub fn is_held(&self, name: &str) -> LockResult<bool> {
        let lock_path = self.lock_path(name);
        if !lock_path.exists() {
            return Ok(false);
        }
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| LockError::io(format!("opening lock file {}", lock_path.display()), e))?;
        match try_flock_exclusive(&lock_file) {
            // We acquired it; dropping the file releases it immediately.
            Ok(true) => Ok(false),
            Ok(false) => Ok(true),
            Err(e) => Err(LockError::io(format!("probing {}", lock_path.display()), e)),
        }
    }
}

/// Tries to acquire an exclusive flock on a file (non-blocking).
///
/// Returns `Ok(true)` if the lock was acquired, `Ok(false)` if the file is
/// already locked by another holder.
fn try_flock_exclusive(file: &File) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: flock is a standard POSIX call. fd is a valid descriptor
        // owned by `file`. LOCK_EX | LOCK_NB is a non-blocking exclusive lock.
        #[allow(unsafe_code)]
        let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
        if result == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK)
        {
            return Ok(false);
        }
        Err(err)
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        Ok(true)
    }
}
