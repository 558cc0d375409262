use crate::connection::{ContentServiceClient, ServiceConnection};
use crate::error::Error;
use log::debug;
use std::os::fd::AsRawFd;
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;

/// Both socket pairs a content service needs. The ui ends stay in this
/// process, the service ends get handed off.
pub struct LaunchedChannels {
    pub ui: LaunchedUi,
    pub service_ipc: OwnedFd,
    pub service_fd_passing: OwnedFd,
}

pub struct LaunchedUi {
    pub ipc: UnixStream,
    pub fd_passing: UnixStream,
}

pub fn launch_channels() -> Result<LaunchedChannels, Error> {
    let (ui_ipc, service_ipc) = UnixStream::pair()?;
    let (ui_fd_passing, service_fd_passing) = UnixStream::pair()?;
    debug!(
        "Content sockets: {}:{}",
        ui_ipc.as_raw_fd(),
        service_ipc.as_raw_fd()
    );
    debug!(
        "    Content fd passing sockets: {}:{}",
        ui_fd_passing.as_raw_fd(),
        service_fd_passing.as_raw_fd()
    );

    ui_ipc.set_nonblocking(false)?;
    ui_fd_passing.set_nonblocking(false)?;

    return Ok(LaunchedChannels {
        ui: LaunchedUi {
            ipc: ui_ipc,
            fd_passing: ui_fd_passing,
        },
        service_ipc: OwnedFd::from(service_ipc),
        service_fd_passing: OwnedFd::from(service_fd_passing),
    });
}

impl ContentServiceClient {
    /// Create the channels and bind a connection that owns the service ends.
    pub fn launch(&self) -> Result<(LaunchedUi, ServiceConnection), Error> {
        let channels = launch_channels()?;
        let connection = self.add_client(channels.service_ipc, channels.service_fd_passing);
        debug!("Created content service client {:#x}", connection.id());
        return Ok((channels.ui, connection));
    }
}
