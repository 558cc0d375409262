use crate::bundle::DescriptorBundle;
use crate::config::ServiceConfig;
use crate::constants::HANDOFF_TRANSACTION;
use crate::error::{Error, ErrorKind};
use crate::transport::{recv_reply, send_bundle, ReplyStatus};
use log::{debug, info, warn};
use rand::Rng;
use std::os::fd::AsRawFd;
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex};

/// Host side bookkeeping of bound content services.
pub struct ContentServiceClient {
    config: ServiceConfig,
    connections: Arc<Mutex<Vec<u64>>>,
}

impl ContentServiceClient {
    pub fn new(config: ServiceConfig) -> ContentServiceClient {
        return ContentServiceClient {
            config: config,
            connections: Arc::new(Mutex::new(vec![])),
        };
    }

    pub fn config(&self) -> &ServiceConfig {
        return &self.config;
    }

    /// Bind a new service connection that will hand `ipc_socket` and
    /// `fd_passing_socket` to the service once it connects.
    pub fn add_client(&self, ipc_socket: OwnedFd, fd_passing_socket: OwnedFd) -> ServiceConnection {
        let mut rng = rand::thread_rng();
        let id: u64 = rng.gen();
        debug!(
            "Binding {} connection {:#x} for fds {} and {}",
            self.config.service_name,
            id,
            ipc_socket.as_raw_fd(),
            fd_passing_socket.as_raw_fd()
        );
        lock_connections(&self.connections).push(id);

        return ServiceConnection {
            id: id,
            ipc_socket: Some(ipc_socket),
            fd_passing_socket: Some(fd_passing_socket),
            reply_timeout: self.config.reply_timeout,
            registry: self.connections.clone(),
        };
    }

    pub fn connection_count(&self) -> usize {
        return lock_connections(&self.connections).len();
    }
}

// The registry only holds ids, so a poisoned lock still has usable contents
fn lock_connections(connections: &Mutex<Vec<u64>>) -> std::sync::MutexGuard<'_, Vec<u64>> {
    match connections.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub struct ServiceConnection {
    id: u64,

    // None once handed off
    ipc_socket: Option<OwnedFd>,
    fd_passing_socket: Option<OwnedFd>,

    reply_timeout: Option<std::time::Duration>,
    registry: Arc<Mutex<Vec<u64>>>,
}

impl ServiceConnection {
    pub fn id(&self) -> u64 {
        return self.id;
    }

    pub fn is_handed_off(&self) -> bool {
        return self.ipc_socket.is_none() && self.fd_passing_socket.is_none();
    }

    /// Pack the held descriptors and send them to the service over `stream`.
    /// Only ever succeeds once; afterwards the descriptors belong to the
    /// service (or are closed, if the send failed).
    pub fn on_service_connected(
        &mut self,
        name: &str,
        stream: &UnixStream,
    ) -> Result<ReplyStatus, Error> {
        info!("Service {} connected", name);
        let (ipc_socket, fd_passing_socket) =
            match (self.ipc_socket.take(), self.fd_passing_socket.take()) {
                (Some(ipc), Some(fd_passing)) => (ipc, fd_passing),
                _ => {
                    return Err(Error::new(
                        ErrorKind::AlreadyHandedOff,
                        format!("Connection {:#x} already handed off its descriptors", self.id),
                    ));
                }
            };

        debug!(
            "Sending fds {} and {} to {}",
            ipc_socket.as_raw_fd(),
            fd_passing_socket.as_raw_fd(),
            name
        );
        let bundle = DescriptorBundle::new(ipc_socket, fd_passing_socket);
        send_bundle(stream, HANDOFF_TRANSACTION, bundle)?;

        // the stream belongs to the caller, leave its timeout as we found it
        let previous_timeout = stream.read_timeout()?;
        stream.set_read_timeout(self.reply_timeout)?;
        let reply = recv_reply(stream);
        stream.set_read_timeout(previous_timeout)?;
        let status = reply?;
        if status != ReplyStatus::Ok {
            warn!("Service {} answered handoff with {:?}", name, status);
        }
        return Ok(status);
    }

    pub fn on_service_disconnected(&self, name: &str) {
        info!("Service {} disconnected", name);
    }
}

impl std::fmt::Debug for ServiceConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConnection")
            .field("id", &self.id)
            .field("handed_off", &self.is_handed_off())
            .finish()
    }
}

impl Drop for ServiceConnection {
    fn drop(&mut self) {
        lock_connections(&self.registry).retain(|id| *id != self.id);
        if !self.is_handed_off() {
            debug!("Connection {:#x} dropped before handoff, closing fds", self.id);
        }
    }
}
