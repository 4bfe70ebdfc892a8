//! Atomic PID file I/O.
//!
//! Format: two-line text file
//! ```text
//! <pid>
//! <endpoint>
//! ```

use std::fs;
use std::io;
use std::path::Path;

use appspawn_core::Endpoint;

/// A running server as recorded on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRecord {
    pub pid: u32,
    pub endpoint: Endpoint,
}

/// Write a PID file atomically using temp file + rename.
pub fn write_pidfile(path: &Path, record: &ServerRecord) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");

    fs::write(&temp, format!("{}\n{}\n", record.pid, record.endpoint))?;
    fs::rename(&temp, path)
}

/// Read a PID file. Malformed content is `InvalidData`.
pub fn read_pidfile(path: &Path) -> io::Result<ServerRecord> {
    let content = fs::read_to_string(path)?;
    parse_pidfile_content(&content)
}

/// Delete a PID file (idempotent - no error if missing).
pub fn delete_pidfile(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn parse_pidfile_content(content: &str) -> io::Result<ServerRecord> {
    let mut lines = content.lines();

    let pid = lines
        .next()
        .and_then(|s| s.trim().parse::<u32>().ok())
        .filter(|pid| *pid > 0 && i32::try_from(*pid).is_ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing or invalid PID"))?;

    let endpoint = lines
        .next()
        .and_then(|s| s.parse::<Endpoint>().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing or invalid endpoint"))?;

    Ok(ServerRecord { pid, endpoint })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_read_delete() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pids").join("abc.pid");
        let record = ServerRecord {
            pid: 98765,
            endpoint: "unix:/tmp/backend.sock".parse().unwrap(),
        };

        write_pidfile(&path, &record).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "98765\nunix:/tmp/backend.sock\n"
        );
        assert_eq!(read_pidfile(&path).unwrap(), record);

        delete_pidfile(&path).unwrap();
        assert!(!path.exists());
        delete_pidfile(&path).unwrap();
    }

    #[test]
    fn corrupt_pidfile_is_invalid_data() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.pid");

        fs::write(&path, "not-a-pid\n").unwrap();
        let err = read_pidfile(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        fs::write(&path, "123\n").unwrap();
        let err = read_pidfile(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn pid_beyond_i32_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("wide.pid");

        // 2^32 - 1 would reach kill(2) as -1: every process we may signal.
        fs::write(&path, "4294967295\nunix:/tmp/backend.sock\n").unwrap();
        let err = read_pidfile(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        fs::write(&path, "2147483648\nunix:/tmp/backend.sock\n").unwrap();
        assert!(read_pidfile(&path).is_err());
    }

    #[test]
    fn missing_pidfile_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = read_pidfile(&tmp.path().join("none.pid")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
