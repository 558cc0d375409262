use crate::error::{Error, ErrorKind};
use crate::utils::is_open;
use std::os::fd::AsFd;
use std::os::fd::AsRawFd;
use std::os::fd::BorrowedFd;
use std::os::fd::FromRawFd;
use std::os::fd::IntoRawFd;
use std::os::fd::OwnedFd;
use std::os::fd::RawFd;

/// A single owned descriptor. Move-only, closed on drop unless detached.
pub struct Descriptor {
    fd: OwnedFd,
}

impl Descriptor {
    pub fn from_owned_fd(fd: OwnedFd) -> Descriptor {
        return Descriptor { fd: fd };
    }

    /// Take ownership of `raw`, failing with `InvalidDescriptor` if it is
    /// negative or not open. On failure nothing is adopted.
    ///
    /// # Safety
    ///
    /// The caller must own `raw` and must not close or use it afterwards,
    /// the same contract as `OwnedFd::from_raw_fd`.
    pub unsafe fn adopt(raw: RawFd) -> Result<Descriptor, Error> {
        if raw < 0 {
            return Err(Error::new(
                ErrorKind::InvalidDescriptor,
                format!("Refusing to adopt negative descriptor {}", raw),
            ));
        }
        if !is_open(raw) {
            return Err(Error::new(
                ErrorKind::InvalidDescriptor,
                format!(
                    "Refusing to adopt descriptor {}: {}",
                    raw,
                    std::io::Error::last_os_error()
                ),
            ));
        }
        return Ok(Descriptor {
            fd: OwnedFd::from_raw_fd(raw),
        });
    }

    pub fn try_clone(&self) -> Result<Descriptor, Error> {
        return Ok(Descriptor {
            fd: self.fd.try_clone()?,
        });
    }

    /// Give up ownership, the caller becomes responsible for closing the
    /// returned value.
    pub fn detach(self) -> RawFd {
        return self.fd.into_raw_fd();
    }

    pub fn to_owned_fd(self) -> OwnedFd {
        return self.fd;
    }
}

impl AsRawFd for Descriptor {
    fn as_raw_fd(&self) -> RawFd {
        return self.fd.as_raw_fd();
    }
}

impl AsFd for Descriptor {
    fn as_fd(&self) -> BorrowedFd<'_> {
        return self.fd.as_fd();
    }
}

impl From<OwnedFd> for Descriptor {
    fn from(fd: OwnedFd) -> Self {
        return Descriptor::from_owned_fd(fd);
    }
}

impl std::fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Descriptor")
            .field("fd", &self.fd.as_raw_fd())
            .finish()
    }
}
