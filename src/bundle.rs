/*
 * The descriptor bundle handed to a freshly started content service: exactly
 * two owned descriptors, each bound to a fixed key.
 *
 * Serialized form (WireMessage::data), native endian since both ends share
 * a host:
 *  0 -- u32 entry count
 *  per entry:
 *       u32 key length
 *       key bytes, utf-8
 *       u32 slot, index into WireMessage::fds
 */
use crate::constants::{FD_PASSING_SOCKET_KEY, IPC_SOCKET_KEY};
use crate::descriptor::Descriptor;
use crate::error::{Error, ErrorKind};
use crate::utils::{is_open, read_u32_at};
use crate::wire_message::WireMessage;
use log::debug;
use std::os::fd::AsRawFd;
use std::os::fd::FromRawFd;
use std::os::fd::OwnedFd;
use std::os::fd::RawFd;

// More entries than this can't be a bundle and isn't worth allocating for
const MAX_ENTRIES: u32 = 16;

pub struct DescriptorBundle {
    ipc_socket: Descriptor,
    fd_passing_socket: Descriptor,
}

/// Adopt two raw descriptors into a bundle.
///
/// Both values are checked before either is adopted: a negative or closed
/// descriptor fails with `InvalidDescriptor`, the same value twice fails with
/// `DuplicateDescriptor`. On error the caller still owns both.
///
/// # Safety
///
/// The caller must own `ipc_fd` and `fd_passing_fd` and must not close or
/// reuse either once this returns `Ok`.
pub unsafe fn pack(ipc_fd: RawFd, fd_passing_fd: RawFd) -> Result<DescriptorBundle, Error> {
    for fd in [ipc_fd, fd_passing_fd] {
        if !is_open(fd) {
            return Err(Error::new(
                ErrorKind::InvalidDescriptor,
                format!("Descriptor {} is not open in this process", fd),
            ));
        }
    }
    if ipc_fd == fd_passing_fd {
        return Err(Error::new(
            ErrorKind::DuplicateDescriptor,
            format!(
                "Descriptor {} passed as both {} and {}",
                ipc_fd, IPC_SOCKET_KEY, FD_PASSING_SOCKET_KEY
            ),
        ));
    }

    // both checked above, nothing below can fail and drop one of them
    debug!("parcelling {}", ipc_fd);
    let ipc_socket = Descriptor::from_owned_fd(OwnedFd::from_raw_fd(ipc_fd));
    debug!("parcelling {}", fd_passing_fd);
    let fd_passing_socket = Descriptor::from_owned_fd(OwnedFd::from_raw_fd(fd_passing_fd));

    return Ok(DescriptorBundle {
        ipc_socket: ipc_socket,
        fd_passing_socket: fd_passing_socket,
    });
}

impl DescriptorBundle {
    pub fn new(ipc_socket: OwnedFd, fd_passing_socket: OwnedFd) -> DescriptorBundle {
        return DescriptorBundle {
            ipc_socket: Descriptor::from_owned_fd(ipc_socket),
            fd_passing_socket: Descriptor::from_owned_fd(fd_passing_socket),
        };
    }

    pub fn ipc_socket(&self) -> &Descriptor {
        return &self.ipc_socket;
    }

    pub fn fd_passing_socket(&self) -> &Descriptor {
        return &self.fd_passing_socket;
    }

    pub fn get(&self, key: &str) -> Option<&Descriptor> {
        match key {
            IPC_SOCKET_KEY => Some(&self.ipc_socket),
            FD_PASSING_SOCKET_KEY => Some(&self.fd_passing_socket),
            _ => None,
        }
    }

    pub fn entries(&self) -> [(&'static str, RawFd); 2] {
        return [
            (IPC_SOCKET_KEY, self.ipc_socket.as_raw_fd()),
            (FD_PASSING_SOCKET_KEY, self.fd_passing_socket.as_raw_fd()),
        ];
    }

    /// (ipc socket, fd passing socket)
    pub fn into_parts(self) -> (Descriptor, Descriptor) {
        return (self.ipc_socket, self.fd_passing_socket);
    }

    pub fn to_wire(self) -> WireMessage {
        let mut data = vec![];
        let keys = [IPC_SOCKET_KEY, FD_PASSING_SOCKET_KEY];
        data.extend_from_slice(&(keys.len() as u32).to_ne_bytes());
        for (slot, key) in keys.iter().enumerate() {
            data.extend_from_slice(&(key.len() as u32).to_ne_bytes());
            data.extend_from_slice(key.as_bytes());
            data.extend_from_slice(&(slot as u32).to_ne_bytes());
        }

        // slot order matches the key order above
        let fds = vec![
            self.ipc_socket.to_owned_fd(),
            self.fd_passing_socket.to_owned_fd(),
        ];
        return WireMessage {
            data: data,
            fds: fds,
        };
    }

    /// Rebuild a bundle from a received message. Descriptors of a rejected
    /// message are closed when the message is dropped.
    pub fn from_wire(message: WireMessage) -> Result<DescriptorBundle, Error> {
        let entries = decode_entries(&message.data)?;
        if message.fds.len() != 2 {
            return Err(Error::new(
                ErrorKind::MalformedMessage,
                format!("Bundle carries {} descriptors, expected 2", message.fds.len()),
            ));
        }

        let mut slots: Vec<Option<OwnedFd>> = message.fds.into_iter().map(Some).collect();
        let mut ipc_socket: Option<OwnedFd> = None;
        let mut fd_passing_socket: Option<OwnedFd> = None;
        for (key, slot) in entries {
            let target = match key.as_str() {
                IPC_SOCKET_KEY => &mut ipc_socket,
                FD_PASSING_SOCKET_KEY => &mut fd_passing_socket,
                other => {
                    return Err(Error::new(
                        ErrorKind::UnknownKey,
                        format!("Unexpected bundle key {:?}", other),
                    ));
                }
            };
            if target.is_some() {
                return Err(Error::new(
                    ErrorKind::MalformedMessage,
                    format!("Bundle key {} appears twice", key),
                ));
            }
            let fd = match slots.get_mut(slot as usize).and_then(Option::take) {
                Some(fd) => fd,
                None => {
                    return Err(Error::new(
                        ErrorKind::MalformedMessage,
                        format!("Slot {} for {} is out of range or already used", slot, key),
                    ));
                }
            };
            *target = Some(fd);
        }

        let ipc_socket = ipc_socket.ok_or_else(|| missing(IPC_SOCKET_KEY))?;
        let fd_passing_socket = fd_passing_socket.ok_or_else(|| missing(FD_PASSING_SOCKET_KEY))?;
        return Ok(DescriptorBundle::new(ipc_socket, fd_passing_socket));
    }
}

impl std::fmt::Debug for DescriptorBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.entries()).finish()
    }
}

fn missing(key: &str) -> Error {
    return Error::new(ErrorKind::MissingKey, format!("Bundle has no {}", key));
}

fn malformed(what: &str, pos: usize) -> Error {
    return Error::new(
        ErrorKind::MalformedMessage,
        format!("Key table truncated reading {} at byte {}", what, pos),
    );
}

fn decode_entries(data: &[u8]) -> Result<Vec<(String, u32)>, Error> {
    let mut pos = 0;
    let count = read_u32_at(data, pos).ok_or_else(|| malformed("entry count", pos))?;
    pos += 4;
    if count > MAX_ENTRIES {
        return Err(Error::new(
            ErrorKind::MalformedMessage,
            format!("Key table claims {} entries", count),
        ));
    }

    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let key_len = read_u32_at(data, pos).ok_or_else(|| malformed("key length", pos))? as usize;
        pos += 4;
        let key_bytes = data
            .get(pos..pos.saturating_add(key_len))
            .ok_or_else(|| malformed("key", pos))?;
        let key = String::from_utf8(key_bytes.to_vec()).map_err(|err| {
            Error::new(
                ErrorKind::MalformedMessage,
                format!("Bundle key is not utf-8: {}", err),
            )
        })?;
        pos += key_len;
        let slot = read_u32_at(data, pos).ok_or_else(|| malformed("slot", pos))?;
        pos += 4;
        entries.push((key, slot));
    }

    if pos != data.len() {
        return Err(Error::new(
            ErrorKind::MalformedMessage,
            format!("{} trailing bytes after key table", data.len() - pos),
        ));
    }
    return Ok(entries);
}
