/*!
 * Binary Permission Checks
 *
 * A child binary is only launched when both the file and its parent
 * directory are owned by root or the current user and are not writable by
 * group or world. Paths are canonicalised first so a symlinked directory is
 * judged by its target.
 */

use log::debug;
use nix::unistd::geteuid;
use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

/// Group- or world-writable bits
const UNSAFE_MODE_MASK: u32 = 0o022;

/// Canonicalise a binary path for the permission check.
pub fn canonical_path(path: &Path) -> std::io::Result<PathBuf> {
    std::fs::canonicalize(path)
}

/// Verify a binary and its parent directory carry safe permissions.
///
/// `path` should already be canonical; a relative or symlinked path is
/// resolved here as a fallback.
pub fn safe_permissions(path: &Path) -> bool {
    let resolved = match canonical_path(path) {
        Ok(p) => p,
        Err(err) => {
            debug!("Cannot resolve {}: {}", path.display(), err);
            return false;
        }
    };

    let Some(parent) = resolved.parent() else {
        return false;
    };

    let file_meta = match std::fs::metadata(&resolved) {
        Ok(m) => m,
        Err(err) => {
            debug!("Cannot stat {}: {}", resolved.display(), err);
            return false;
        }
    };
    let dir_meta = match std::fs::metadata(parent) {
        Ok(m) => m,
        Err(err) => {
            debug!("Cannot stat {}: {}", parent.display(), err);
            return false;
        }
    };

    file_meta.is_file()
        && dir_meta.is_dir()
        && ownership_is_safe(&file_meta)
        && ownership_is_safe(&dir_meta)
        && mode_is_safe(&file_meta)
        && mode_is_safe(&dir_meta)
}

fn ownership_is_safe(meta: &Metadata) -> bool {
    let uid = meta.uid();
    uid == 0 || uid == geteuid().as_raw()
}

fn mode_is_safe(meta: &Metadata) -> bool {
    meta.mode() & UNSAFE_MODE_MASK == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn scratch_binary(dir_mode: u32, file_mode: u32) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("child-bin");
        fs::write(&file, b"#!/bin/sh\nexit 0\n").expect("write");
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(dir_mode)).expect("chmod dir");
        fs::set_permissions(&file, fs::Permissions::from_mode(file_mode)).expect("chmod file");
        (dir, file)
    }

    #[test]
    fn test_owned_unwritable_binary_is_safe() {
        let (_dir, file) = scratch_binary(0o755, 0o755);
        assert!(safe_permissions(&file));
    }

    #[test]
    fn test_world_writable_binary_is_unsafe() {
        let (_dir, file) = scratch_binary(0o755, 0o757);
        assert!(!safe_permissions(&file));
    }

    #[test]
    fn test_group_writable_binary_is_unsafe() {
        let (_dir, file) = scratch_binary(0o755, 0o775);
        assert!(!safe_permissions(&file));
    }

    #[test]
    fn test_writable_parent_directory_is_unsafe() {
        let (_dir, file) = scratch_binary(0o777, 0o755);
        assert!(!safe_permissions(&file));
    }

    #[test]
    fn test_missing_path_is_unsafe() {
        assert!(!safe_permissions(Path::new("/nonexistent/child-bin")));
    }

    #[test]
    fn test_directory_is_not_a_binary() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o755)).expect("chmod");
        assert!(!safe_permissions(dir.path()));
    }
}
