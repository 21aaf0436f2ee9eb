//! Process management: title and single-instance lock.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use fs2::FileExt;

use crate::logger::Log;

/// Set the process title, best effort. Uses `prctl(PR_SET_NAME)` on
/// Linux; elsewhere this quietly does nothing.
pub fn set_process_title(title: &str) {
    #[cfg(target_os = "linux")]
    {
        // PR_SET_NAME truncates to 15 bytes + NUL
        let mut name = title.as_bytes().to_vec();
        name.truncate(15);
        name.push(0);
        unsafe {
            libc::prctl(libc::PR_SET_NAME, name.as_ptr() as libc::c_ulong, 0, 0, 0);
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = title;
    }
}

/// Check whether a process with the given PID is currently running.
pub fn is_process_running(pid: u32) -> bool {
    std::path::Path::new(&format!("/proc/{}", pid)).exists()
}

/// An exclusive single-instance lock under `$XDG_RUNTIME_DIR`.
///
/// The lock file records our PID so a stale lock left by a crashed
/// instance can be detected and reclaimed.
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    fn lock_path() -> PathBuf {
        let runtime_dir = std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(runtime_dir).join("blueshift.lock")
    }

    /// Acquire the lock, reclaiming a stale one if its owner is gone.
    pub fn acquire() -> Result<InstanceLock> {
        let path = Self::lock_path();
        match Self::try_acquire(&path)? {
            Some(lock) => Ok(lock),
            None => {
                // Lock held: check whether the recorded owner is alive
                let content = std::fs::read_to_string(&path).unwrap_or_default();
                let owner = content.trim().lines().next().and_then(|line| line.parse::<u32>().ok());
                match owner {
                    Some(pid) if is_process_running(pid) => {
                        Log::log_pipe();
                        Log::log_error(&format!("blueshift is already running (PID: {})", pid));
                        bail!("cannot start, another blueshift instance is running")
                    }
                    _ => {
                        Log::log_warning("Removing stale lock file");
                        let _ = std::fs::remove_file(&path);
                        Self::try_acquire(&path)?.ok_or_else(|| {
                            anyhow::anyhow!("cannot acquire lock file after stale-lock cleanup")
                        })
                    }
                }
            }
        }
    }

    fn try_acquire(path: &PathBuf) -> Result<Option<InstanceLock>> {
        // Open without truncating: truncating before holding the lock
        // would wipe the owner's PID record
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("cannot open lock file {}", path.display()))?;
        if file.try_lock_exclusive().is_err() {
            return Ok(None);
        }
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        file.flush()?;
        Ok(Some(InstanceLock { file, path: path.clone() }))
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}
