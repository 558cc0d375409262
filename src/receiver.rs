use crate::bundle::DescriptorBundle;
use crate::config::ServiceConfig;
use crate::constants::HANDOFF_TRANSACTION;
use crate::error::{Error, ErrorKind};
use crate::transport::{recv_message, send_reply, ReplyStatus};
use log::{debug, error, info, warn};
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::thread::JoinHandle;

/// What a content worker gets once a handoff has been accepted.
#[derive(Debug)]
pub struct ReceivedChannels {
    pub ipc: UnixStream,
    pub fd_passing: UnixStream,

    // "<service name>:<ipc fd>", tells the worker which inherited
    // descriptor carries its control channel
    pub takeover: String,
}

pub fn takeover_string(service_name: &str, ipc: &UnixStream) -> String {
    return format!("{}:{}", service_name, ipc.as_raw_fd());
}

pub type ContentHandler = dyn Fn(ReceivedChannels) -> Result<(), Error> + Send + Sync + 'static;

pub struct ContentThread {
    name: String,
    handle: Option<JoinHandle<Result<(), Error>>>,
}

impl ContentThread {
    pub fn start(
        name: &str,
        handler: Arc<ContentHandler>,
        channels: ReceivedChannels,
    ) -> Result<ContentThread, Error> {
        debug!("Creating content thread {}", name);
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                info!("Running content thread");
                return handler(channels);
            })?;
        return Ok(ContentThread {
            name: name.to_string(),
            handle: Some(handle),
        });
    }

    pub fn name(&self) -> &str {
        return &self.name;
    }

    /// Wait for the worker and return what its handler returned.
    pub fn join(mut self) -> Result<(), Error> {
        return self.join_inner();
    }

    fn join_inner(&mut self) -> Result<(), Error> {
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => return Ok(()),
        };
        match handle.join() {
            Ok(result) => result,
            Err(_) => Err(Error::new(
                ErrorKind::WorkerFailed,
                format!("Content thread {} panicked", self.name),
            )),
        }
    }
}

impl Drop for ContentThread {
    fn drop(&mut self) {
        if let Err(err) = self.join_inner() {
            error!("Content thread {} failed with error: {}", self.name, err);
        }
    }
}

// The original error is what the caller cares about, a failed reply is
// only logged
fn reject(stream: &UnixStream, err: &Error) {
    error!("Rejecting handoff: {}", err);
    if let Err(reply_err) = send_reply(stream, ReplyStatus::Rejected) {
        warn!("Could not send rejection: {}", reply_err);
    }
}

/// Service side of the handoff: accepts the descriptor bundle and starts a
/// content worker on it.
pub struct HandoffReceiver {
    config: ServiceConfig,
    handler: Arc<ContentHandler>,
    threads: Vec<ContentThread>,

    // only goes up, so worker names stay unique across join_all
    next_thread_id: u64,
}

impl HandoffReceiver {
    pub fn new<F>(config: ServiceConfig, handler: F) -> HandoffReceiver
    where
        F: Fn(ReceivedChannels) -> Result<(), Error> + Send + Sync + 'static,
    {
        return HandoffReceiver {
            config: config,
            handler: Arc::new(handler),
            threads: vec![],
            next_thread_id: 0,
        };
    }

    /// Handle one transaction from `stream`. Returns false for transactions
    /// this receiver does not know. Every frame that was read off the socket
    /// gets a reply, so the host never waits on a rejected handoff.
    pub fn on_transact(&mut self, stream: &UnixStream) -> Result<bool, Error> {
        let (code, message) = match recv_message(stream, self.config.max_payload) {
            Ok(received) => received,
            Err(err) => {
                match err.kind() {
                    ErrorKind::MalformedMessage | ErrorKind::ChecksumMismatch => {
                        reject(stream, &err);
                    }
                    _ => {}
                }
                return Err(err);
            }
        };
        debug!("on_transact(), code {}", code);
        if code != HANDOFF_TRANSACTION {
            warn!("Unknown transaction code {}", code);
            send_reply(stream, ReplyStatus::UnknownTransaction)?;
            return Ok(false);
        }

        let bundle = match DescriptorBundle::from_wire(message) {
            Ok(bundle) => bundle,
            Err(err) => {
                reject(stream, &err);
                return Err(err);
            }
        };

        let (ipc, fd_passing) = bundle.into_parts();
        let ipc = UnixStream::from(ipc.to_owned_fd());
        let fd_passing = UnixStream::from(fd_passing.to_owned_fd());
        let takeover = takeover_string(&self.config.service_name, &ipc);
        debug!("Takeover {}", takeover);

        let thread_name = format!("{}-{}", self.config.service_name, self.next_thread_id);
        self.next_thread_id = self.next_thread_id.wrapping_add(1);
        let started = ContentThread::start(
            &thread_name,
            self.handler.clone(),
            ReceivedChannels {
                ipc: ipc,
                fd_passing: fd_passing,
                takeover: takeover,
            },
        );
        let thread = match started {
            Ok(thread) => thread,
            Err(err) => {
                reject(stream, &err);
                return Err(err);
            }
        };
        self.threads.push(thread);

        debug!("Replying with ok");
        send_reply(stream, ReplyStatus::Ok)?;
        return Ok(true);
    }

    pub fn thread_names(&self) -> Vec<&str> {
        return self.threads.iter().map(|thread| thread.name()).collect();
    }

    pub fn thread_count(&self) -> usize {
        return self.threads.len();
    }

    /// Join every content thread started so far, returning the first failure.
    pub fn join_all(&mut self) -> Result<(), Error> {
        let mut first_err = None;
        for thread in self.threads.drain(..) {
            if let Err(err) = thread.join() {
                error!("Content thread failed: {}", err);
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ContentServiceClient;
    use crate::transport::{recv_reply, send_bundle, send_message};
    use crate::utils::compute_crc32;
    use crate::wire_message::{FrameHeader, WireMessage};
    use std::io::{Read, Write};
    use std::os::fd::OwnedFd;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn quick_handler(_channels: ReceivedChannels) -> Result<(), Error> {
        return Ok(());
    }

    // sends a real bundle over host, returns the peers of the handed off ends
    fn send_handoff(host: &UnixStream) -> (UnixStream, UnixStream) {
        let (ipc, ipc_peer) = UnixStream::pair().expect("unix pair");
        let (pass, pass_peer) = UnixStream::pair().expect("unix pair");
        let bundle = DescriptorBundle::new(OwnedFd::from(ipc), OwnedFd::from(pass));
        send_bundle(host, HANDOFF_TRANSACTION, bundle).expect("send bundle");
        return (ipc_peer, pass_peer);
    }

    fn channels() -> (ReceivedChannels, UnixStream, UnixStream) {
        let (ipc, ipc_peer) = UnixStream::pair().expect("unix pair");
        let (pass, pass_peer) = UnixStream::pair().expect("unix pair");
        let takeover = takeover_string("Content", &ipc);
        let channels = ReceivedChannels {
            ipc: ipc,
            fd_passing: pass,
            takeover: takeover,
        };
        return (channels, ipc_peer, pass_peer);
    }

    // echoes one line-less message back over the control channel
    fn echo_handler(channels: ReceivedChannels) -> Result<(), Error> {
        let mut ipc = channels.ipc;
        let mut buf = [0u8; 5];
        ipc.read_exact(&mut buf)?;
        ipc.write_all(&buf)?;
        return Ok(());
    }

    #[test]
    fn full_handoff_reaches_the_worker() {
        init();
        let config = ServiceConfig::default().with_service_name("Content");
        let client = ContentServiceClient::new(config.clone());
        let (mut ui, mut connection) = client.launch().expect("launch");
        let (host, service) = UnixStream::pair().expect("transport pair");

        let seen = Arc::new(Mutex::new(vec![]));
        let seen_in_worker = seen.clone();
        let service_side = std::thread::spawn(move || {
            let mut receiver = HandoffReceiver::new(config, move |channels: ReceivedChannels| {
                seen_in_worker
                    .lock()
                    .unwrap()
                    .push(channels.takeover.clone());
                return echo_handler(channels);
            });
            let accepted = receiver.on_transact(&service).expect("transact");
            assert_eq!(receiver.thread_count(), 1);
            receiver.join_all().expect("worker ok");
            return accepted;
        });

        let status = connection
            .on_service_connected("Content", &host)
            .expect("handoff");
        assert_eq!(status, ReplyStatus::Ok);

        ui.ipc.write_all(b"hello").expect("write");
        let mut buf = [0u8; 5];
        ui.ipc.read_exact(&mut buf).expect("echo");
        assert_eq!(&buf, b"hello");

        assert!(service_side.join().expect("service thread"));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].starts_with("Content:"));
    }

    #[test]
    fn unknown_transaction_is_refused() {
        init();
        let (host, service) = UnixStream::pair().expect("transport pair");
        let mut receiver = HandoffReceiver::new(ServiceConfig::default(), echo_handler);
        let message = WireMessage {
            data: vec![],
            fds: vec![],
        };
        send_message(&host, 42, &message).expect("send");

        assert!(!receiver.on_transact(&service).expect("transact"));
        assert_eq!(recv_reply(&host).expect("reply"), ReplyStatus::UnknownTransaction);
        assert_eq!(receiver.thread_count(), 0);
    }

    #[test]
    fn malformed_bundle_is_rejected() {
        init();
        let (host, service) = UnixStream::pair().expect("transport pair");
        let mut receiver = HandoffReceiver::new(ServiceConfig::default(), echo_handler);
        let message = WireMessage {
            data: vec![0, 0, 0, 0],
            fds: vec![],
        };
        send_message(&host, HANDOFF_TRANSACTION, &message).expect("send");

        let err = receiver.on_transact(&service).expect_err("bad bundle");
        assert_eq!(err.kind(), ErrorKind::MalformedMessage);
        assert_eq!(recv_reply(&host).expect("reply"), ReplyStatus::Rejected);
    }

    #[test]
    fn worker_errors_surface_on_join() {
        init();
        let (ipc, _ipc_peer) = UnixStream::pair().expect("unix pair");
        let (pass, _pass_peer) = UnixStream::pair().expect("unix pair");
        let takeover = takeover_string("Content", &ipc);
        let handler: Arc<ContentHandler> = Arc::new(|_channels: ReceivedChannels| -> Result<(), Error> {
            return Err(Error::new(ErrorKind::Io, format!("boom")));
        });
        let thread = ContentThread::start(
            "failing",
            handler,
            ReceivedChannels {
                ipc: ipc,
                fd_passing: pass,
                takeover: takeover,
            },
        )
        .expect("spawn");
        let err = thread.join().expect_err("handler failed");
        assert_eq!(err.message(), "boom");
    }

    #[test]
    fn frame_errors_get_a_rejection() {
        init();
        let (host, service) = UnixStream::pair().expect("transport pair");
        host.set_read_timeout(Some(Duration::from_secs(5)))
            .expect("timeout");
        let mut receiver = HandoffReceiver::new(ServiceConfig::default(), quick_handler);

        let payload = b"abcd";
        let header = FrameHeader {
            code: HANDOFF_TRANSACTION,
            payload_size: payload.len() as u32,
            payload_crc: compute_crc32(b"dcba"),
            n_fds: 0,
        };
        let mut writer = &host;
        writer.write_all(&header.encode()).expect("header");
        writer.write_all(payload).expect("payload");

        let err = receiver.on_transact(&service).expect_err("bad crc");
        assert_eq!(err.kind(), ErrorKind::ChecksumMismatch);
        assert_eq!(recv_reply(&host).expect("reply"), ReplyStatus::Rejected);

        // the stream is still usable for the next transaction
        let message = WireMessage {
            data: vec![],
            fds: vec![],
        };
        send_message(&host, 42, &message).expect("send");
        assert!(!receiver.on_transact(&service).expect("transact"));
        assert_eq!(recv_reply(&host).expect("reply"), ReplyStatus::UnknownTransaction);
    }

    #[test]
    fn oversized_handoff_is_rejected() {
        init();
        let (host, service) = UnixStream::pair().expect("transport pair");
        host.set_read_timeout(Some(Duration::from_secs(5)))
            .expect("timeout");
        let config = ServiceConfig::default().with_max_payload(8);
        assert_eq!(config.max_payload, 8);
        let mut receiver = HandoffReceiver::new(config, quick_handler);

        let _peers = send_handoff(&host);
        let err = receiver.on_transact(&service).expect_err("table too big");
        assert_eq!(err.kind(), ErrorKind::MalformedMessage);
        assert_eq!(recv_reply(&host).expect("reply"), ReplyStatus::Rejected);
        assert_eq!(receiver.thread_count(), 0);
    }

    #[test]
    fn panicking_worker_reports_failure() {
        init();
        let (channels, _ipc_peer, _pass_peer) = channels();
        let handler: Arc<ContentHandler> =
            Arc::new(|_channels: ReceivedChannels| -> Result<(), Error> {
                panic!("worker blew up");
            });
        let thread = ContentThread::start("panicking", handler, channels).expect("spawn");
        let err = thread.join().expect_err("panic");
        assert_eq!(err.kind(), ErrorKind::WorkerFailed);
    }

    #[test]
    fn dropping_thread_joins_worker() {
        init();
        let (channels, _ipc_peer, _pass_peer) = channels();
        let finished = Arc::new(AtomicBool::new(false));
        let finished_in_worker = finished.clone();
        let handler: Arc<ContentHandler> =
            Arc::new(move |_channels: ReceivedChannels| -> Result<(), Error> {
                std::thread::sleep(Duration::from_millis(50));
                finished_in_worker.store(true, Ordering::SeqCst);
                return Err(Error::new(ErrorKind::Io, format!("logged on drop")));
            });
        let thread = ContentThread::start("slow", handler, channels).expect("spawn");
        drop(thread);
        assert!(finished.load(Ordering::SeqCst));
    }

    #[test]
    fn dropping_receiver_joins_workers() {
        init();
        let (host, service) = UnixStream::pair().expect("transport pair");
        let finished = Arc::new(AtomicBool::new(false));
        let finished_in_worker = finished.clone();
        let mut receiver = HandoffReceiver::new(
            ServiceConfig::default(),
            move |_channels: ReceivedChannels| {
                std::thread::sleep(Duration::from_millis(50));
                finished_in_worker.store(true, Ordering::SeqCst);
                return Ok(());
            },
        );

        let _peers = send_handoff(&host);
        assert!(receiver.on_transact(&service).expect("transact"));
        assert_eq!(recv_reply(&host).expect("reply"), ReplyStatus::Ok);
        drop(receiver);
        assert!(finished.load(Ordering::SeqCst));
    }

    #[test]
    fn thread_names_stay_unique_after_join_all() {
        init();
        let (host, service) = UnixStream::pair().expect("transport pair");
        let config = ServiceConfig::default().with_service_name("Content");
        let mut receiver = HandoffReceiver::new(config, quick_handler);

        let _first = send_handoff(&host);
        assert!(receiver.on_transact(&service).expect("first"));
        assert_eq!(receiver.thread_names(), vec!["Content-0"]);
        receiver.join_all().expect("join");

        let _second = send_handoff(&host);
        assert!(receiver.on_transact(&service).expect("second"));
        assert_eq!(receiver.thread_names(), vec!["Content-1"]);
    }
}
