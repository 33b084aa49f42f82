//! Default filesystem locations for sockets and lock files.
//!
//! Channels and locks are addressed by explicit paths; these helpers only
//! provide conventional defaults so independent processes agree on an
//! address without extra configuration.

use std::io;
use std::path::{Path, PathBuf};

/// Environment variable overriding the lock directory.
pub const LOCK_DIR_ENV_VAR: &str = "HOSTLINK_LOCK_DIR";

/// Subdirectory used under the runtime directory.
const DEFAULT_SUBDIR: &str = "hostlink";

/// Lock directory when no override is set.
const DEFAULT_LOCK_DIR: &str = "/run/lock/hostlink";

/// Default directory for channel sockets.
///
/// `$XDG_RUNTIME_DIR/hostlink` when `XDG_RUNTIME_DIR` is set, otherwise
/// `/tmp/hostlink`.
#[must_use]
pub fn default_runtime_dir() -> PathBuf {
    std::env::var_os("XDG_RUNTIME_DIR").map_or_else(
        || PathBuf::from("/tmp").join(DEFAULT_SUBDIR),
        |runtime_dir| PathBuf::from(runtime_dir).join(DEFAULT_SUBDIR),
    )
}

/// Conventional socket path for a named channel.
#[must_use]
pub fn channel_path(name: &str) -> PathBuf {
    default_runtime_dir().join(format!("{name}.sock"))
}

/// Directory holding named lock files.
///
/// `$HOSTLINK_LOCK_DIR` when set, otherwise `/run/lock/hostlink`.
#[must_use]
pub fn default_lock_dir() -> PathBuf {
    std::env::var_os(LOCK_DIR_ENV_VAR)
        .map_or_else(|| PathBuf::from(DEFAULT_LOCK_DIR), PathBuf::from)
}

/// Creates `dir` with the given permissions when absent.
///
/// An existing directory keeps its permission bits; a non-directory at the
/// path (including a symlink) is an error.
///
/// # Errors
///
/// Returns an error on filesystem failures or when the path exists but is
/// not a directory.
pub fn ensure_dir(dir: &Path, mode: u32) -> io::Result<()> {
    match std::fs::symlink_metadata(dir) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} exists but is not a directory", dir.display()),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            std::fs::create_dir_all(dir)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(dir, std::fs::Permissions::from_mode(mode))?;
            }
            #[cfg(not(unix))]
            {
                let _ = mode;
            }
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn default_runtime_dir_ends_with_subdir() {
        assert!(default_runtime_dir().ends_with(DEFAULT_SUBDIR));
    }

    #[test]
    fn channel_path_appends_socket_suffix() {
        let path = channel_path("ctrl");
        assert!(path.ends_with("hostlink/ctrl.sock"));
    }

    #[test]
    fn ensure_dir_creates_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("locks");

        ensure_dir(&dir, 0o777).unwrap();
        assert!(dir.is_dir());

        // A second call on the existing directory is a no-op.
        ensure_dir(&dir, 0o700).unwrap();
    }

    #[test]
    fn ensure_dir_rejects_regular_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        let err = ensure_dir(&file, 0o777).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }
}
