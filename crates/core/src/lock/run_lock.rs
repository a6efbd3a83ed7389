//! Create-new marker files with owner PID and RAII release.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use super::error::LockError;

/// Result of a non-blocking lock attempt.
#[derive(Debug)]
pub enum LockAcquisition {
    /// This process now owns the lock.
    Held(RunLockGuard),
    /// Another run owns the lock. The caller must exit without side effects.
    AlreadyHeld {
        path: PathBuf,
        /// PID recorded in the marker, if it could be read.
        owner_pid: Option<u32>,
    },
}

impl LockAcquisition {
    /// Whether the lock was acquired.
    pub fn is_held(&self) -> bool {
        matches!(self, Self::Held(_))
    }
}

/// Directory of named run lock markers.
#[derive(Debug, Clone)]
pub struct RunLock {
    dir: PathBuf,
    stale_detection: bool,
}

impl RunLock {
    /// Creates a lock namespace rooted at `dir` with stale detection enabled.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            stale_detection: true,
        }
    }

    /// Enables or disables reclaiming markers whose owner process is gone.
    pub fn with_stale_detection(mut self, enabled: bool) -> Self {
        self.stale_detection = enabled;
        self
    }

    /// Path of the marker for `name`.
    pub fn marker_path(&self, name: &str) -> Result<PathBuf, LockError> {
        if name.is_empty() || name.contains('/') || name.contains('\\') || name == ".." {
            return Err(LockError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(format!("{}.lock", name)))
    }

    /// Tries to take the lock without waiting.
    ///
    /// The winner keeps an exclusive `flock` on the marker until release, so a
    /// stale marker can only be taken over by one run at a time.
    pub fn acquire(&self, name: &str) -> Result<LockAcquisition, LockError> {
        let path = self.marker_path(name)?;

        match create_marker(&path) {
            Ok(file) => {
                info!(lock = %path.display(), "Run lock acquired");
                return Ok(LockAcquisition::Held(RunLockGuard::new(path, file)));
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(LockError::Create { path, source: e }),
        }

        if self.stale_detection {
            match reclaim_stale(&path) {
                Ok(Some(file)) => {
                    info!(lock = %path.display(), "Run lock acquired");
                    return Ok(LockAcquisition::Held(RunLockGuard::new(path, file)));
                }
                Ok(None) => {}
                // Released while we looked; the next run will take it.
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(LockError::Create { path, source: e }),
            }
        }

        let owner_pid = read_owner_pid(&path);
        info!(
            lock = %path.display(),
            owner_pid = ?owner_pid,
            "Run lock already held by another process"
        );
        Ok(LockAcquisition::AlreadyHeld { path, owner_pid })
    }

    /// Removes the marker for `name`. Releasing an absent lock is a no-op.
    pub fn release(&self, name: &str) -> Result<(), LockError> {
        let path = self.marker_path(name)?;
        remove_marker(&path)
    }
}

/// Ownership of a run lock. The marker is removed on drop.
#[derive(Debug)]
pub struct RunLockGuard {
    path: PathBuf,
    /// Open marker carrying the `flock`. Closed after the marker is removed.
    file: Option<File>,
    released: bool,
}

impl RunLockGuard {
    fn new(path: PathBuf, file: File) -> Self {
        Self {
            path,
            file: Some(file),
            released: false,
        }
    }

    /// Path of the marker this guard owns.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Releases the lock, reporting removal errors instead of logging them.
    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        let result = remove_marker(&self.path);
        self.file.take();
        result
    }
}

impl Drop for RunLockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = remove_marker(&self.path) {
            error!("Failed to release run lock on drop: {}", e);
        }
        self.file.take();
    }
}

fn create_marker(path: &Path) -> io::Result<File> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(path)?;
    if let Err(e) = lock_file(&file, false).and_then(|_| write_owner(&mut file)) {
        // A marker without an owner would never be reclaimed.
        let _ = fs::remove_file(path);
        return Err(e);
    }
    Ok(file)
}

/// Takes over a marker whose recorded owner is dead.
///
/// Returns `None` when another run holds the `flock`, the marker was replaced
/// after we opened it, or its owner is alive or unknown.
fn reclaim_stale(path: &Path) -> io::Result<Option<File>> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    if !lock_file(&file, true)? {
        return Ok(None);
    }
    if !is_same_file(&file, path)? {
        debug!(lock = %path.display(), "Lock marker was replaced during reclaim");
        return Ok(None);
    }

    let mut content = String::new();
    file.read_to_string(&mut content)?;
    let Ok(pid) = content.trim().parse::<u32>() else {
        return Ok(None);
    };
    if is_pid_alive(pid) {
        return Ok(None);
    }

    warn!(
        lock = %path.display(),
        pid,
        "Reclaiming stale run lock left by a dead process"
    );
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    write_owner(&mut file)?;
    Ok(Some(file))
}

fn write_owner(file: &mut File) -> io::Result<()> {
    writeln!(file, "{}", std::process::id())?;
    file.flush()
}

/// Takes an exclusive `flock`. With `nonblocking`, returns `false` instead of
/// waiting when another open file holds it.
#[cfg(unix)]
fn lock_file(file: &File, nonblocking: bool) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;

    let mut operation = libc::LOCK_EX;
    if nonblocking {
        operation |= libc::LOCK_NB;
    }
    // SAFETY: the descriptor is owned by `file` and open for the whole call.
    if unsafe { libc::flock(file.as_raw_fd(), operation) } == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::WouldBlock {
        Ok(false)
    } else {
        Err(err)
    }
}

#[cfg(not(unix))]
fn lock_file(_file: &File, _nonblocking: bool) -> io::Result<bool> {
    Ok(true)
}

/// Whether `path` still names the file behind `file`.
#[cfg(unix)]
fn is_same_file(file: &File, path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let opened = file.metadata()?;
    match fs::metadata(path) {
        Ok(current) => Ok(opened.dev() == current.dev() && opened.ino() == current.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn is_same_file(_file: &File, path: &Path) -> io::Result<bool> {
    Ok(path.exists())
}

fn remove_marker(path: &Path) -> Result<(), LockError> {
    match fs::remove_file(path) {
        Ok(()) => {
            info!(lock = %path.display(), "Run lock released");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!(lock = %path.display(), "Run lock not present, nothing to release");
            Ok(())
        }
        Err(e) => Err(LockError::Release {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Empty or unreadable markers yield `None` and are treated as held.
fn read_owner_pid(path: &Path) -> Option<u32> {
    match fs::read_to_string(path) {
        Ok(content) => content.trim().parse().ok(),
        Err(e) => {
            debug!(lock = %path.display(), "Could not read lock marker: {}", e);
            None
        }
    }
}

/// Check whether a given PID is alive.
///
/// Uses `kill(pid, 0)`, which probes for existence without sending a signal.
/// EPERM means the process exists under another user.
#[cfg(unix)]
fn is_pid_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: signal 0 performs error checking only.
    let result = unsafe { libc::kill(pid, 0) };
    if result == 0 {
        return true;
    }
    io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn is_pid_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn held(acquisition: LockAcquisition) -> RunLockGuard {
        match acquisition {
            LockAcquisition::Held(guard) => guard,
            LockAcquisition::AlreadyHeld { path, .. } => {
                panic!("expected lock to be acquired, {} is held", path.display())
            }
        }
    }

    /// PID of a process that has already exited.
    fn dead_pid() -> u32 {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        pid
    }

    #[test]
    fn test_second_acquire_reports_already_held() {
        let temp = TempDir::new().unwrap();
        let lock = RunLock::new(temp.path());

        let guard = held(lock.acquire("upload").unwrap());
        let second = lock.acquire("upload").unwrap();

        match second {
            LockAcquisition::AlreadyHeld { owner_pid, .. } => {
                assert_eq!(owner_pid, Some(std::process::id()));
            }
            LockAcquisition::Held(_) => panic!("lock acquired twice"),
        }
        drop(guard);
    }

    #[test]
    fn test_acquire_after_release_succeeds() {
        let temp = TempDir::new().unwrap();
        let lock = RunLock::new(temp.path());

        let guard = held(lock.acquire("upload").unwrap());
        guard.release().unwrap();

        assert!(lock.acquire("upload").unwrap().is_held());
    }

    #[test]
    fn test_distinct_names_do_not_contend() {
        let temp = TempDir::new().unwrap();
        let lock = RunLock::new(temp.path());

        let _upload = held(lock.acquire("upload").unwrap());
        assert!(lock.acquire("publish").unwrap().is_held());
    }

    #[test]
    fn test_guard_drop_removes_marker() {
        let temp = TempDir::new().unwrap();
        let lock = RunLock::new(temp.path());
        let marker = lock.marker_path("upload").unwrap();

        {
            let _guard = held(lock.acquire("upload").unwrap());
            assert!(marker.exists());
        }

        assert!(!marker.exists());
    }

    #[test]
    fn test_release_absent_lock_is_noop() {
        let temp = TempDir::new().unwrap();
        let lock = RunLock::new(temp.path());

        assert!(lock.release("never-taken").is_ok());
        assert!(lock.release("never-taken").is_ok());
    }

    #[test]
    fn test_marker_records_owner_pid() {
        let temp = TempDir::new().unwrap();
        let lock = RunLock::new(temp.path());

        let guard = held(lock.acquire("upload").unwrap());
        let content = fs::read_to_string(guard.path()).unwrap();
        assert_eq!(content.trim(), std::process::id().to_string());
    }

    #[test]
    fn test_stale_marker_is_reclaimed() {
        let temp = TempDir::new().unwrap();
        let lock = RunLock::new(temp.path());
        let marker = lock.marker_path("upload").unwrap();
        fs::write(&marker, format!("{}\n", dead_pid())).unwrap();

        let guard = held(lock.acquire("upload").unwrap());
        let content = fs::read_to_string(guard.path()).unwrap();
        assert_eq!(content.trim(), std::process::id().to_string());
    }

    #[test]
    fn test_stale_marker_reclaimed_once() {
        let temp = TempDir::new().unwrap();
        let lock = RunLock::new(temp.path());
        let marker = lock.marker_path("upload").unwrap();
        fs::write(&marker, format!("{}\n", dead_pid())).unwrap();

        // Both runs saw the dead owner; the first one takes the marker over.
        let first = held(lock.acquire("upload").unwrap());

        // The second run's takeover attempt finds the marker locked.
        assert!(reclaim_stale(&marker).unwrap().is_none());
        assert!(!lock.acquire("upload").unwrap().is_held());
        assert_eq!(read_owner_pid(&marker), Some(std::process::id()));
        assert!(marker.exists());

        first.release().unwrap();
        assert!(lock.acquire("upload").unwrap().is_held());
    }

    #[test]
    fn test_marker_with_live_owner_is_not_reclaimed() {
        let temp = TempDir::new().unwrap();
        let lock = RunLock::new(temp.path());
        let marker = lock.marker_path("upload").unwrap();
        // Written by tooling that never takes the flock.
        fs::write(&marker, format!("{}\n", std::process::id())).unwrap();

        assert!(reclaim_stale(&marker).unwrap().is_none());
        assert!(!lock.acquire("upload").unwrap().is_held());
    }

    #[test]
    fn test_replaced_marker_is_detected() {
        let temp = TempDir::new().unwrap();
        let marker = temp.path().join("upload.lock");
        fs::write(&marker, "1\n").unwrap();
        let opened = File::open(&marker).unwrap();

        fs::remove_file(&marker).unwrap();
        assert!(!is_same_file(&opened, &marker).unwrap());

        fs::write(&marker, "2\n").unwrap();
        assert!(!is_same_file(&opened, &marker).unwrap());
        assert!(is_same_file(&File::open(&marker).unwrap(), &marker).unwrap());
    }

    #[test]
    fn test_stale_marker_kept_when_detection_disabled() {
        let temp = TempDir::new().unwrap();
        let lock = RunLock::new(temp.path()).with_stale_detection(false);
        let marker = lock.marker_path("upload").unwrap();
        fs::write(&marker, format!("{}\n", dead_pid())).unwrap();

        assert!(!lock.acquire("upload").unwrap().is_held());
        assert!(marker.exists());
    }

    #[test]
    fn test_empty_marker_is_treated_as_held() {
        let temp = TempDir::new().unwrap();
        let lock = RunLock::new(temp.path());
        let marker = lock.marker_path("upload").unwrap();
        fs::write(&marker, "").unwrap();

        match lock.acquire("upload").unwrap() {
            LockAcquisition::AlreadyHeld { owner_pid, .. } => assert_eq!(owner_pid, None),
            LockAcquisition::Held(_) => panic!("empty marker must not be reclaimed"),
        }
    }

    #[test]
    fn test_invalid_name_rejected() {
        let temp = TempDir::new().unwrap();
        let lock = RunLock::new(temp.path());

        assert!(matches!(
            lock.acquire("../escape"),
            Err(LockError::InvalidName(_))
        ));
        assert!(matches!(lock.acquire(""), Err(LockError::InvalidName(_))));
    }

    #[test]
    fn test_missing_lock_dir_is_create_error() {
        let temp = TempDir::new().unwrap();
        let lock = RunLock::new(temp.path().join("missing"));

        assert!(matches!(
            lock.acquire("upload"),
            Err(LockError::Create { .. })
        ));
    }
}
