//! Process-level helpers: hostname and PID file

use std::ffi::CStr;
use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::{debug, warn};

use fand_error::{FandError, Result};

/// Local hostname, `localhost` if it cannot be read
pub fn local_hostname() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: buf is valid for writes of buf.len() bytes; gethostname writes
    // at most that many bytes.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast::<libc::c_char>(), buf.len()) };
    if rc == 0 {
        // Truncated names may lack the terminator
        buf[buf.len() - 1] = 0;
        if let Ok(name) = CStr::from_bytes_until_nul(&buf) {
            let name = name.to_string_lossy().trim().to_string();
            if !name.is_empty() {
                return name;
            }
        }
    }
    warn!("Cannot read hostname, using localhost");
    "localhost".to_string()
}

fn process_alive(pid: i32) -> bool {
    // SAFETY: signal 0 performs only the existence and permission check.
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    // EPERM: the process exists but belongs to someone else
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Write the current PID, refusing to replace the file of a live process
pub fn write_pid_file(path: &Path) -> Result<()> {
    let own_pid = std::process::id() as i32;
    if let Ok(content) = fs::read_to_string(path) {
        if let Ok(old_pid) = content.trim().parse::<i32>() {
            if old_pid > 0 && old_pid != own_pid && process_alive(old_pid) {
                return Err(FandError::config(format!(
                    "Another instance is running (PID {old_pid})"
                )));
            }
        }
    }

    let mut file = fs::File::create(path)
        .map_err(|e| FandError::config(format!("Cannot write PID file {}: {}", path.display(), e)))?;
    writeln!(file, "{}", own_pid)
        .map_err(|e| FandError::config(format!("Cannot write PID file {}: {}", path.display(), e)))?;
    debug!("PID file written: {}", path.display());
    Ok(())
}

pub fn remove_pid_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!("Failed to remove PID file {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_hostname() {
        assert!(!local_hostname().is_empty());
    }

    #[test]
    fn test_pid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fand.pid");

        write_pid_file(&path).unwrap();
        let pid: u32 = fs::read_to_string(&path).unwrap().trim().parse().unwrap();
        assert_eq!(pid, std::process::id());

        // Rewriting our own PID file is fine
        write_pid_file(&path).unwrap();
        remove_pid_file(&path);
        assert!(!path.exists());
    }

    #[test]
    fn test_stale_pid_file_is_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fand.pid");
        fs::write(&path, "not a pid").unwrap();
        write_pid_file(&path).unwrap();
    }

    #[test]
    fn test_live_pid_file_is_kept() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fand.pid");
        // PID 1 always exists
        fs::write(&path, "1\n").unwrap();
        assert!(matches!(write_pid_file(&path), Err(FandError::Config(_))));
    }
}
