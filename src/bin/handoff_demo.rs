use fd_handoff::{
    ContentServiceClient, Error, ErrorKind, HandoffReceiver, ReceivedChannels, ServiceCallbacks,
    ServiceConfig, ServiceHost,
};
use log::{error, info};
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

fn echo(channels: ReceivedChannels) -> Result<(), Error> {
    info!("Content worker started, takeover {}", channels.takeover);
    let mut ipc = channels.ipc;
    let mut buf = [0u8; 64];
    loop {
        let n = ipc.read(&mut buf)?;
        if n == 0 {
            return Ok(());
        }
        ipc.write_all(&buf[..n])?;
    }
}

// Runs the receiving end in a thread, standing in for the started process
struct DemoService {
    config: ServiceConfig,
    transport: Option<UnixStream>,
    worker: Option<JoinHandle<Result<(), Error>>>,
}

impl DemoService {
    fn transport(&self) -> Option<&UnixStream> {
        return self.transport.as_ref();
    }
}

impl ServiceCallbacks for DemoService {
    fn on_create(&mut self) -> Result<(), Error> {
        let (host, service) = UnixStream::pair()?;
        let config = self.config.clone();
        let worker = std::thread::spawn(move || -> Result<(), Error> {
            let mut receiver = HandoffReceiver::new(config, echo);
            loop {
                match receiver.on_transact(&service) {
                    Ok(_) => continue,
                    Err(err) if err.kind() == ErrorKind::Disconnected => break,
                    Err(err) => return Err(err),
                }
            }
            return receiver.join_all();
        });
        self.transport = Some(host);
        self.worker = Some(worker);
        return Ok(());
    }

    fn on_destroy(&mut self) {
        // closing our end lets the receiver loop finish
        self.transport = None;
        if let Some(worker) = self.worker.take() {
            match worker.join() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!("Service failed: {}", err),
                Err(_) => error!("Service thread panicked"),
            }
        }
    }
}

fn main() {
    env_logger::init();

    let running = Arc::new(AtomicBool::new(true));
    let handler_running = running.clone();
    ctrlc::set_handler(move || handler_running.store(false, Ordering::SeqCst))
        .expect("Install ctrl-c handler");

    let config = ServiceConfig::default();
    let mut host = ServiceHost::new(
        &config.service_name,
        DemoService {
            config: config.clone(),
            transport: None,
            worker: None,
        },
    );
    host.start().expect("Start content service");

    let client = ContentServiceClient::new(config.clone());
    let (mut ui, mut connection) = client.launch().expect("Create content channels");
    let transport = host.callbacks().transport().expect("Service is running");
    let status = connection
        .on_service_connected(&config.service_name, transport)
        .expect("Hand off descriptors");
    info!("Handoff answered with {:?}", status);

    let message = b"ping";
    let mut reply = [0u8; 4];
    let mut n_round_trips = 0;
    while running.load(Ordering::SeqCst) && n_round_trips < 10 {
        ui.ipc.write_all(message).expect("Write to content worker");
        ui.ipc.read_exact(&mut reply).expect("Read from content worker");
        n_round_trips += 1;
        info!("Round trip {}: {:?}", n_round_trips, reply);
        std::thread::sleep(Duration::from_millis(100));
    }

    connection.on_service_disconnected(&config.service_name);
    drop(ui);
    host.stop().expect("Stop content service");
}
