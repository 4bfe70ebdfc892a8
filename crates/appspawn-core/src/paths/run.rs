//! Run directory resolution and naming of per-server files.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::error::PathError;
use crate::settings::Settings;

/// Get the root directory for pid files and sockets.
///
/// Resolution order:
/// 1. `settings.run_dir` (set from `APPSPAWN_RUN_DIR` or a CLI flag)
/// 2. Platform runtime directory (e.g. `$XDG_RUNTIME_DIR/appspawn`)
/// 3. Platform data directory (e.g. `~/.local/share/appspawn`)
///
/// The directory is created if missing.
pub fn run_root(settings: &Settings) -> Result<PathBuf, PathError> {
    let root = match &settings.run_dir {
        Some(dir) => dir.clone(),
        None => dirs::runtime_dir()
            .or_else(dirs::data_local_dir)
            .ok_or(PathError::NoRunDir)?
            .join("appspawn"),
    };
    ensure_dir(&root)?;
    Ok(root)
}

/// Directory holding pid files, created if missing.
pub fn pids_dir(root: &Path) -> Result<PathBuf, PathError> {
    let dir = root.join("pids");
    ensure_dir(&dir)?;
    Ok(dir)
}

/// Directory holding unix socket files, created if missing.
pub fn sockets_dir(root: &Path) -> Result<PathBuf, PathError> {
    let dir = root.join("sockets");
    ensure_dir(&dir)?;
    Ok(dir)
}

/// Stable key naming the backend of an application root.
///
/// Sixteen hex digits of the SHA-256 of the canonical root, so that
/// `./app` and `/srv/app` map to the same pid file.
pub fn server_key(app_root: &Path) -> Result<String, PathError> {
    let canonical = app_root
        .canonicalize()
        .map_err(|e| PathError::Canonicalize {
            path: app_root.to_path_buf(),
            reason: e.to_string(),
        })?;
    let digest = Sha256::digest(canonical.as_os_str().as_encoded_bytes());
    Ok(digest.iter().take(8).map(|b| format!("{b:02x}")).collect())
}

fn ensure_dir(path: &Path) -> Result<(), PathError> {
    if path.exists() {
        if !path.is_dir() {
            return Err(PathError::NotADirectory(path.to_path_buf()));
        }
        return Ok(());
    }
    fs::create_dir_all(path).map_err(|e| PathError::CreateFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_run_dir_is_created() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings {
            run_dir: Some(tmp.path().join("run")),
            ..Settings::with_defaults()
        };
        let root = run_root(&settings).unwrap();
        assert!(root.is_dir());
        assert!(pids_dir(&root).unwrap().ends_with("pids"));
        assert!(sockets_dir(&root).unwrap().is_dir());
    }

    #[test]
    fn file_in_the_way_is_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("pids"), "").unwrap();
        assert!(matches!(
            pids_dir(tmp.path()),
            Err(PathError::NotADirectory(_))
        ));
    }

    #[test]
    fn server_key_is_stable_across_spellings() {
        let tmp = TempDir::new().unwrap();
        let app = tmp.path().join("app");
        fs::create_dir(&app).unwrap();
        let dotted = tmp.path().join("app").join("..").join("app");

        let a = server_key(&app).unwrap();
        let b = server_key(&dotted).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn server_key_requires_existing_root() {
        assert!(server_key(Path::new("/no/such/app/root")).is_err());
    }
}
