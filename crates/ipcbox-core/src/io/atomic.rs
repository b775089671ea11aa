//! Atomic filesystem primitives
//!
//! Everything above this module is built from three operations:
//!
//! - **Create-if-absent with a tag**: [`create_tagged`] creates an entry whose
//!   content is an identity string, failing with `AlreadyExists` if the entry
//!   is present. On Unix this is `symlink(tag, path)`, which creates the entry
//!   and its content in one syscall. Elsewhere it is an exclusive
//!   `create_new` followed by a write.
//! - **Atomic remove**: [`remove_entry`].
//! - **Atomic replace**: [`atomic_replace`] writes a sibling temp file, syncs
//!   it, and renames it over the target.

use crate::io::error::IpcError;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Atomically create `path` carrying `tag`, failing if it already exists.
///
/// The raw `io::Error` is returned so callers can map `AlreadyExists` onto
/// the error that fits their primitive (would-block for locks, no-op for
/// subscription links).
pub fn create_tagged(path: &Path, tag: &str) -> io::Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(tag, path)
    }

    #[cfg(not(unix))]
    {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        file.write_all(tag.as_bytes())?;
        file.sync_all()
    }
}

/// Read the tag stored by [`create_tagged`].
pub fn read_tag(path: &Path) -> io::Result<String> {
    #[cfg(unix)]
    {
        let target = fs::read_link(path)?;
        Ok(target.to_string_lossy().into_owned())
    }

    #[cfg(not(unix))]
    {
        Ok(fs::read_to_string(path)?.trim_end().to_string())
    }
}

/// Whether `path` is an entry created by [`create_tagged`].
pub fn is_tagged(path: &Path) -> bool {
    match fs::symlink_metadata(path) {
        #[cfg(unix)]
        Ok(meta) => meta.file_type().is_symlink(),
        #[cfg(not(unix))]
        Ok(meta) => meta.is_file(),
        Err(_) => false,
    }
}

/// Remove a tagged entry.
pub fn remove_entry(path: &Path) -> io::Result<()> {
    fs::remove_file(path)
}

/// Replace the contents of `path` atomically via temp file and rename
///
/// Readers observe either the old or the new contents, never a truncated
/// file, even if the writer dies mid-way.
///
/// # Errors
///
/// Returns `IpcError::Io` if the temp file cannot be written or synced, or
/// the rename fails.
pub fn atomic_replace(path: &Path, contents: &[u8]) -> Result<(), IpcError> {
    let tmp_path = path.with_extension("tmp");

    {
        let mut tmp_file = fs::File::create(&tmp_path).map_err(|e| IpcError::io(&tmp_path, e))?;
        tmp_file
            .write_all(contents)
            .map_err(|e| IpcError::io(&tmp_path, e))?;
        tmp_file.sync_all().map_err(|e| IpcError::io(&tmp_path, e))?;
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        IpcError::io(path, e)
    })
}

/// Append `line` to `path`, adding the line terminator.
///
/// The file is created if missing.
pub fn append_line(path: &Path, line: &str) -> Result<(), IpcError> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| IpcError::io(path, e))?;

    let mut buf = String::with_capacity(line.len() + 1);
    buf.push_str(line);
    buf.push('\n');

    file.write_all(buf.as_bytes())
        .map_err(|e| IpcError::io(path, e))?;
    file.sync_all().map_err(|e| IpcError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_tagged_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let entry = temp_dir.path().join("lock");

        create_tagged(&entry, "4242").unwrap();

        assert!(is_tagged(&entry));
        assert_eq!(read_tag(&entry).unwrap(), "4242");
    }

    #[test]
    fn test_create_tagged_rejects_existing() {
        let temp_dir = TempDir::new().unwrap();
        let entry = temp_dir.path().join("lock");

        create_tagged(&entry, "first").unwrap();
        let err = create_tagged(&entry, "second").unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(read_tag(&entry).unwrap(), "first");
    }

    #[test]
    fn test_tag_may_name_missing_target() {
        let temp_dir = TempDir::new().unwrap();
        let entry = temp_dir.path().join("sub");

        // Tags are identities, not paths; the target never has to exist.
        create_tagged(&entry, "priv/alice/inbox").unwrap();
        assert_eq!(read_tag(&entry).unwrap(), "priv/alice/inbox");
    }

    #[test]
    fn test_remove_entry() {
        let temp_dir = TempDir::new().unwrap();
        let entry = temp_dir.path().join("lock");

        create_tagged(&entry, "1").unwrap();
        remove_entry(&entry).unwrap();

        assert!(!is_tagged(&entry));
        assert_eq!(
            remove_entry(&entry).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[test]
    fn test_is_tagged_plain_directory() {
        let temp_dir = TempDir::new().unwrap();
        assert!(!is_tagged(temp_dir.path()));
        assert!(!is_tagged(&temp_dir.path().join("missing")));
    }

    #[test]
    fn test_atomic_replace_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let data = temp_dir.path().join("data");

        fs::write(&data, b"one\ntwo\n").unwrap();
        atomic_replace(&data, b"two\n").unwrap();

        assert_eq!(fs::read_to_string(&data).unwrap(), "two\n");
        assert!(!data.with_extension("tmp").exists());
    }

    #[test]
    fn test_atomic_replace_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let data = temp_dir.path().join("nope").join("data");

        let result = atomic_replace(&data, b"x");
        assert!(matches!(result, Err(IpcError::Io { .. })));
    }

    #[test]
    fn test_append_line_creates_and_appends() {
        let temp_dir = TempDir::new().unwrap();
        let data = temp_dir.path().join("data");

        append_line(&data, "first").unwrap();
        append_line(&data, "second").unwrap();

        assert_eq!(fs::read_to_string(&data).unwrap(), "first\nsecond\n");
    }
}
