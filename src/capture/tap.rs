//! TAP device implementation

use super::Device;
use crate::{Error, Result};
use std::ffi::CString;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use tokio::io::unix::AsyncFd;
use tracing::debug;

const TUN_PATH: &[u8] = b"/dev/net/tun\0";

const TUNSETIFF: libc::Ioctl = 0x400454CA;
const IFF_TAP: libc::c_short = 0x0002;
const IFF_NO_PI: libc::c_short = 0x1000;

/// Linux TAP device (no packet-information prefix)
pub struct TapDevice {
    async_fd: AsyncFd<OwnedFd>,
    name: String,
}

impl TapDevice {
    /// Attach to, or create, the TAP interface `ifname`
    ///
    /// Only the descriptor is created here; registering it with the tokio
    /// reactor happens in [`RawTap::register`] so the device can be opened
    /// on a thread that has no runtime.
    pub fn open(ifname: &str) -> Result<RawTap> {
        let fd = unsafe {
            libc::open(
                TUN_PATH.as_ptr() as *const libc::c_char,
                libc::O_RDWR | libc::O_NONBLOCK | libc::O_CLOEXEC,
            )
        };
        if fd < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }

        if let Err(e) = Self::set_tap(fd, ifname) {
            unsafe { libc::close(fd) };
            return Err(e);
        }

        debug!(interface = ifname, fd, "TAP device attached");
        Ok(RawTap {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
            name: ifname.to_string(),
        })
    }

    fn set_tap(fd: RawFd, ifname: &str) -> Result<()> {
        let ifname_c = CString::new(ifname).map_err(|_| Error::InvalidInterfaceName {
            name: ifname.to_string(),
        })?;
        let name_bytes = ifname_c.as_bytes_with_nul();

        let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
        if name_bytes.len() > ifr.ifr_name.len() {
            return Err(Error::InvalidInterfaceName {
                name: ifname.to_string(),
            });
        }
        for (dst, src) in ifr.ifr_name.iter_mut().zip(name_bytes) {
            *dst = *src as libc::c_char;
        }
        ifr.ifr_ifru.ifru_flags = IFF_TAP | IFF_NO_PI;

        let ret = unsafe { libc::ioctl(fd, TUNSETIFF, &mut ifr) };
        if ret < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }

        Ok(())
    }

    /// Interface name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receive a frame (async)
    pub async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        loop {
            let mut guard = self.async_fd.readable().await.map_err(Error::Io)?;

            match guard.try_io(|inner| {
                let fd = inner.get_ref().as_raw_fd();
                let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut _, buf.len()) };
                if n < 0 {
                    Err(std::io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            }) {
                Ok(Ok(len)) => return Ok(len),
                Ok(Err(e)) => return Err(Error::Io(e)),
                Err(_would_block) => continue,
            }
        }
    }

    /// Send a frame (async)
    pub async fn send(&self, frame: &[u8]) -> Result<usize> {
        loop {
            let mut guard = self.async_fd.writable().await.map_err(Error::Io)?;

            match guard.try_io(|inner| {
                let fd = inner.get_ref().as_raw_fd();
                let n = unsafe { libc::write(fd, frame.as_ptr() as *const _, frame.len()) };
                if n < 0 {
                    Err(std::io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            }) {
                Ok(Ok(len)) => return Ok(len),
                Ok(Err(e)) => return Err(Error::Io(e)),
                Err(_would_block) => continue,
            }
        }
    }
}

/// An open TAP descriptor not yet bound to a tokio runtime
#[derive(Debug)]
pub struct RawTap {
    fd: OwnedFd,
    name: String,
}

impl RawTap {
    /// Interface name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register the descriptor with the current tokio reactor
    pub fn register(self) -> Result<TapDevice> {
        // SAFETY: the OwnedFd moves into the AsyncFd, which closes it only
        // on drop, so the registered descriptor stays open and unchanged
        let async_fd =
            unsafe { AsyncFd::register(self.fd) }.map_err(|e| Error::Io(e.into()))?;
        Ok(TapDevice {
            async_fd,
            name: self.name,
        })
    }
}

impl AsRawFd for TapDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.async_fd.get_ref().as_raw_fd()
    }
}

impl Device for TapDevice {
    async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        TapDevice::recv(self, buf).await
    }

    async fn send(&self, frame: &[u8]) -> Result<usize> {
        TapDevice::send(self, frame).await
    }
}
