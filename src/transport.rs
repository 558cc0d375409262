use crate::bundle::DescriptorBundle;
use crate::constants::{FRAME_HEADER_SIZE, FRAME_MAGIC, MAX_FDS_PER_MESSAGE, REPLY_SIZE};
use crate::error::{Error, ErrorKind};
use crate::utils::{read_u32_at, write_u32_at};
use crate::wire_message::{FrameHeader, WireMessage};
use log::{debug, info, warn};
use sendfd::{RecvWithFd, SendWithFd};
use std::io::prelude::*;
use std::os::fd::AsRawFd;
use std::os::fd::FromRawFd;
use std::os::fd::OwnedFd;
use std::os::fd::RawFd;
use std::os::unix::net::UnixStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Ok,
    UnknownTransaction,
    Rejected,
}

impl ReplyStatus {
    fn to_wire(self) -> u32 {
        match self {
            ReplyStatus::Ok => 0,
            ReplyStatus::UnknownTransaction => 1,
            ReplyStatus::Rejected => 2,
        }
    }

    fn from_wire(value: u32) -> Result<ReplyStatus, Error> {
        match value {
            0 => Ok(ReplyStatus::Ok),
            1 => Ok(ReplyStatus::UnknownTransaction),
            2 => Ok(ReplyStatus::Rejected),
            other => Err(Error::new(
                ErrorKind::MalformedMessage,
                format!("Unknown reply status {}", other),
            )),
        }
    }
}

/// Send `bundle` as transaction `code`. The bundle is consumed either way:
/// once the kernel has queued the descriptors the receiver holds its own
/// copies, and if sending fails ours are closed here.
pub fn send_bundle(stream: &UnixStream, code: u32, bundle: DescriptorBundle) -> Result<(), Error> {
    let message = bundle.to_wire();
    return send_message(stream, code, &message);
}

pub fn send_message(stream: &UnixStream, code: u32, message: &WireMessage) -> Result<(), Error> {
    let header = FrameHeader::for_message(code, message);
    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + message.data.len());
    frame.extend_from_slice(&header.encode());
    frame.extend_from_slice(&message.data);

    let fds: Vec<RawFd> = message.fds.iter().map(|fd| fd.as_raw_fd()).collect();
    debug!("Sending transaction {} with fds {:?}", code, fds);

    // descriptors ride on whatever the first sendmsg manages to write
    let sent = stream.send_with_fd(&frame, &fds)?;
    if sent == 0 {
        return Err(Error::new(
            ErrorKind::Disconnected,
            format!("Peer closed before transaction {} was sent", code),
        ));
    }
    if sent < frame.len() {
        let mut writer = stream;
        writer.write_all(&frame[sent..])?;
    }
    return Ok(());
}

/// Receive one frame. Descriptors are owned as soon as they arrive, so every
/// error path below closes them.
pub fn recv_message(stream: &UnixStream, max_payload: usize) -> Result<(u32, WireMessage), Error> {
    let mut header_bytes = [0u8; FRAME_HEADER_SIZE];
    let mut raw_fds: [RawFd; MAX_FDS_PER_MESSAGE] = [-1; MAX_FDS_PER_MESSAGE];
    let (n_bytes, n_fds) = stream.recv_with_fd(&mut header_bytes, &mut raw_fds)?;
    let fds: Vec<OwnedFd> = raw_fds[..n_fds]
        .iter()
        .filter(|fd| **fd >= 0)
        .map(|fd| unsafe { OwnedFd::from_raw_fd(*fd) })
        .collect();

    if n_bytes == 0 {
        // zero bytes without error means closed
        return Err(Error::new(
            ErrorKind::Disconnected,
            format!("Peer closed the transport"),
        ));
    }

    let mut reader = stream;
    if n_bytes < FRAME_HEADER_SIZE {
        reader.read_exact(&mut header_bytes[n_bytes..])?;
    }
    let header = FrameHeader::decode(&header_bytes)?;

    // Everything the header announces is consumed before any check can
    // reject the frame, so the next frame starts on a header boundary. A bad
    // magic is the exception: there is no way to find the next header and
    // the connection has to be dropped.
    if header.payload_size as usize > max_payload {
        let mut rest = reader.take(header.payload_size as u64);
        std::io::copy(&mut rest, &mut std::io::sink())?;
        return Err(Error::new(
            ErrorKind::MalformedMessage,
            format!(
                "Payload of {} bytes exceeds limit of {}",
                header.payload_size, max_payload
            ),
        ));
    }

    let mut data = vec![0u8; header.payload_size as usize];
    reader.read_exact(&mut data)?;
    header.check_payload(&data)?;

    if header.n_fds as usize != fds.len() {
        return Err(Error::new(
            ErrorKind::MalformedMessage,
            format!(
                "Header announces {} descriptors but {} arrived",
                header.n_fds,
                fds.len()
            ),
        ));
    }

    info!(
        "Received transaction {} with {} bytes and {} fds",
        header.code,
        data.len(),
        fds.len()
    );
    return Ok((
        header.code,
        WireMessage {
            data: data,
            fds: fds,
        },
    ));
}

pub fn send_reply(stream: &UnixStream, status: ReplyStatus) -> Result<(), Error> {
    let mut reply = [0u8; REPLY_SIZE];
    write_u32_at(&mut reply, 0, FRAME_MAGIC);
    write_u32_at(&mut reply, 4, status.to_wire());
    let mut writer = stream;
    writer.write_all(&reply)?;
    return Ok(());
}

pub fn recv_reply(stream: &UnixStream) -> Result<ReplyStatus, Error> {
    let mut reply = [0u8; REPLY_SIZE];
    let mut reader = stream;
    if let Err(err) = reader.read_exact(&mut reply) {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            return Err(Error::new(
                ErrorKind::Disconnected,
                format!("Peer closed before replying"),
            ));
        }
        return Err(err.into());
    }

    let magic = read_u32_at(&reply, 0).unwrap_or(0);
    if magic != FRAME_MAGIC {
        warn!("Reply with bad magic {:#x}", magic);
        return Err(Error::new(
            ErrorKind::MalformedMessage,
            format!("Bad reply magic {:#x}", magic),
        ));
    }
    return ReplyStatus::from_wire(read_u32_at(&reply, 4).unwrap_or(u32::MAX));
}
