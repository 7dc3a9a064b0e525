//! Document-root resolution and mmap file bodies
//!
//! A resolved file is served through a private read-only mapping rather
//! than being copied into the write buffer; the mapping lives as long as
//! the response is draining and is unmapped on drop. The fd is closed as
//! soon as the mapping exists.

use crate::response::StatusCode;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::ptr;
use std::slice;

/// Resolve a request target against the document root.
///
/// Policy, matching a conventional static server:
/// - query string and fragment are ignored
/// - `/` maps to `/index.html`
/// - any `..` path segment is refused outright
/// - directories and files without the world-readable bit are forbidden
pub fn resolve(root: &Path, target: &str) -> Result<PathBuf, StatusCode> {
    let path = match target.find(|c| c == '?' || c == '#') {
        Some(i) => &target[..i],
        None => target,
    };
    if path.is_empty() || !path.starts_with('/') {
        return Err(StatusCode::BadRequest);
    }
    if path.split('/').any(|seg| seg == "..") {
        return Err(StatusCode::Forbidden);
    }

    let rel = if path == "/" { "index.html" } else { &path[1..] };
    let full = root.join(rel);

    let meta = fs::metadata(&full).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => StatusCode::NotFound,
        io::ErrorKind::PermissionDenied => StatusCode::Forbidden,
        _ => StatusCode::InternalServerError,
    })?;
    if meta.is_dir() {
        return Err(StatusCode::Forbidden);
    }
    if meta.permissions().mode() & 0o004 == 0 {
        return Err(StatusCode::Forbidden);
    }
    Ok(full)
}

/// A private read-only memory mapping of a file.
///
/// Owns the mapping and unmaps it on drop. Empty files get no mapping at
/// all; `as_slice()` is just empty.
pub struct FileMap {
    ptr: *mut libc::c_void,
    len: usize,
}

// Safety: the mapping is owned exclusively by this value; nothing else
// holds the pointer, so moving it between threads is fine.
unsafe impl Send for FileMap {}

impl FileMap {
    /// Map `path` read-only. Failures (open, stat, mmap) surface as
    /// `io::Error`; callers translate them into a 5xx response.
    pub fn open(path: &Path) -> io::Result<FileMap> {
        let file = fs::File::open(path)?;
        let len = file.metadata()?.len() as usize;
        if len == 0 {
            return Ok(FileMap {
                ptr: ptr::null_mut(),
                len: 0,
            });
        }
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ,
                libc::MAP_PRIVATE,
                file.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(FileMap { ptr, len })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        if self.len == 0 {
            return &[];
        }
        // Safety: the mapping covers exactly `len` readable bytes and
        // outlives the borrow.
        unsafe { slice::from_raw_parts(self.ptr as *const u8, self.len) }
    }
}

impl Drop for FileMap {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                libc::munmap(self.ptr, self.len);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, Permissions};

    fn temp_root(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "evhttpd-fs-test-{}-{}",
            tag,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_resolve_plain_file() {
        let root = temp_root("plain");
        fs::write(root.join("page.html"), b"<p>hi</p>").unwrap();
        let path = resolve(&root, "/page.html").unwrap();
        assert_eq!(path, root.join("page.html"));
    }

    #[test]
    fn test_resolve_root_maps_to_index() {
        let root = temp_root("index");
        fs::write(root.join("index.html"), b"home").unwrap();
        let path = resolve(&root, "/").unwrap();
        assert_eq!(path, root.join("index.html"));
    }

    #[test]
    fn test_resolve_strips_query() {
        let root = temp_root("query");
        fs::write(root.join("q.html"), b"q").unwrap();
        assert!(resolve(&root, "/q.html?x=1&y=2").is_ok());
    }

    #[test]
    fn test_resolve_missing_is_not_found() {
        let root = temp_root("missing");
        assert_eq!(resolve(&root, "/nope.html"), Err(StatusCode::NotFound));
    }

    #[test]
    fn test_resolve_traversal_is_forbidden() {
        let root = temp_root("traversal");
        assert_eq!(
            resolve(&root, "/../../etc/passwd"),
            Err(StatusCode::Forbidden)
        );
    }

    #[test]
    fn test_resolve_directory_is_forbidden() {
        let root = temp_root("dir");
        fs::create_dir_all(root.join("sub")).unwrap();
        assert_eq!(resolve(&root, "/sub"), Err(StatusCode::Forbidden));
    }

    #[test]
    fn test_resolve_unreadable_is_forbidden() {
        let root = temp_root("perm");
        let path = root.join("secret.html");
        fs::write(&path, b"s").unwrap();
        fs::set_permissions(&path, Permissions::from_mode(0o600)).unwrap();
        assert_eq!(resolve(&root, "/secret.html"), Err(StatusCode::Forbidden));
    }

    #[test]
    fn test_filemap_contents() {
        let root = temp_root("map");
        let path = root.join("data.bin");
        let payload: Vec<u8> = (0..2048u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &payload).unwrap();
        let map = FileMap::open(&path).unwrap();
        assert_eq!(map.len(), payload.len());
        assert_eq!(map.as_slice(), &payload[..]);
    }

    #[test]
    fn test_filemap_empty_file() {
        let root = temp_root("empty");
        let path = root.join("empty.txt");
        fs::write(&path, b"").unwrap();
        let map = FileMap::open(&path).unwrap();
        assert!(map.is_empty());
        assert_eq!(map.as_slice(), b"");
    }
}
