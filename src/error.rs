use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    // descriptor is negative or not open in this process
    InvalidDescriptor,
    // both halves of a bundle point at the same raw descriptor
    DuplicateDescriptor,
    MalformedMessage,
    MissingKey,
    UnknownKey,
    ChecksumMismatch,
    // peer closed the transport socket
    Disconnected,
    AlreadyHandedOff,
    NotRunning,
    WorkerFailed,
    Io,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, descr: String) -> Error {
        return Error {
            kind: kind,
            message: descr,
        };
    }

    pub fn kind(&self) -> ErrorKind {
        return self.kind;
    }

    pub fn message(&self) -> &str {
        return &self.message;
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        return Error::new(ErrorKind::Io, format!("{}", err));
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}
