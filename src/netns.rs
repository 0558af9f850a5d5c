//! Network namespace entry
//!
//! `setns(2)` switches the namespace of the calling thread only. The switch
//! is made on a dedicated thread that is discarded afterwards, so no pooled
//! or runtime thread ever ends up in the wrong namespace and nothing has to
//! be restored. Descriptors opened there keep their namespace after the
//! thread is gone.

use crate::{Error, Result};
use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;
use std::path::Path;
use tracing::debug;

/// Run `f` on a fresh OS thread that has joined the network namespace at
/// `path`, and return its result
pub fn open_in_namespace<T, F>(path: &Path, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let ns_path = path.to_path_buf();
    let ns = File::open(&ns_path).map_err(|source| Error::Namespace {
        path: ns_path.clone(),
        source,
    })?;

    let handle = std::thread::Builder::new()
        .name("netns-enter".to_string())
        .spawn(move || -> Result<T> {
            enter(&ns_path, &ns)?;
            debug!(path = %ns_path.display(), "joined network namespace");
            f()
        })
        .map_err(Error::Io)?;

    handle.join().map_err(|_| Error::Namespace {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::Other, "namespace thread panicked"),
    })?
}

fn enter(path: &Path, ns: &File) -> Result<()> {
    let ret = unsafe { libc::setns(ns.as_raw_fd(), libc::CLONE_NEWNET) };
    if ret < 0 {
        return Err(Error::Namespace {
            path: path.to_path_buf(),
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}
