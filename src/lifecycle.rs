use crate::error::{Error, ErrorKind};
use log::{debug, info};

/// Hooks a supervisor-driven service can react to. All of them default to
/// doing nothing.
pub trait ServiceCallbacks {
    fn on_create(&mut self) -> Result<(), Error> {
        return Ok(());
    }

    // called for every start request, including repeats while running
    fn on_start_command(&mut self, _start_id: u32) -> Result<(), Error> {
        return Ok(());
    }

    fn on_destroy(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Idle,
    Running,
}

pub struct ServiceHost<C: ServiceCallbacks> {
    name: String,
    state: ServiceState,
    callbacks: C,
    next_start_id: u32,
}

impl<C: ServiceCallbacks> ServiceHost<C> {
    pub fn new(name: &str, callbacks: C) -> ServiceHost<C> {
        return ServiceHost {
            name: name.to_string(),
            state: ServiceState::Idle,
            callbacks: callbacks,
            next_start_id: 1,
        };
    }

    /// Create the service if needed and deliver a start command. Returns the
    /// id of that start command.
    pub fn start(&mut self) -> Result<u32, Error> {
        if self.state == ServiceState::Idle {
            info!("{}: Creating Service", self.name);
            self.callbacks.on_create()?;
            self.state = ServiceState::Running;
        }

        let start_id = self.next_start_id;
        // ids start at 1 again after wrapping
        self.next_start_id = self.next_start_id.checked_add(1).unwrap_or(1);
        debug!("{}: start command {}", self.name, start_id);
        self.callbacks.on_start_command(start_id)?;
        return Ok(start_id);
    }

    pub fn stop(&mut self) -> Result<(), Error> {
        if self.state != ServiceState::Running {
            return Err(Error::new(
                ErrorKind::NotRunning,
                format!("{} is not running", self.name),
            ));
        }
        self.callbacks.on_destroy();
        info!("{}: Destroying Service", self.name);
        self.state = ServiceState::Idle;
        return Ok(());
    }

    pub fn state(&self) -> ServiceState {
        return self.state;
    }

    pub fn name(&self) -> &str {
        return &self.name;
    }

    pub fn callbacks(&self) -> &C {
        return &self.callbacks;
    }

    pub fn callbacks_mut(&mut self) -> &mut C {
        return &mut self.callbacks;
    }
}
