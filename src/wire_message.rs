use crate::constants::{
    FRAME_HEADER_SIZE, FRAME_MAGIC, FRAME_POS_CODE, FRAME_POS_CRC, FRAME_POS_MAGIC,
    FRAME_POS_N_FDS, FRAME_POS_SIZE,
};
use crate::error::{Error, ErrorKind};
use crate::utils::{compute_crc32, read_u32_at, write_u32_at};
use std::os::fd::OwnedFd;

pub struct WireMessage {
    pub data: Vec<u8>,
    // referenced by slot from data
    pub fds: Vec<OwnedFd>,
}

impl std::fmt::Debug for WireMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireMessage")
            .field("data_len", &self.data.len())
            .field("n_fds", &self.fds.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub code: u32,
    pub payload_size: u32,
    pub payload_crc: u32,
    pub n_fds: u32,
}

impl FrameHeader {
    pub fn for_message(code: u32, message: &WireMessage) -> FrameHeader {
        return FrameHeader {
            code: code,
            payload_size: message.data.len() as u32,
            payload_crc: compute_crc32(&message.data),
            n_fds: message.fds.len() as u32,
        };
    }

    pub fn encode(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut out = [0u8; FRAME_HEADER_SIZE];
        write_u32_at(&mut out, FRAME_POS_MAGIC, FRAME_MAGIC);
        write_u32_at(&mut out, FRAME_POS_CODE, self.code);
        write_u32_at(&mut out, FRAME_POS_SIZE, self.payload_size);
        write_u32_at(&mut out, FRAME_POS_CRC, self.payload_crc);
        write_u32_at(&mut out, FRAME_POS_N_FDS, self.n_fds);
        return out;
    }

    pub fn decode(data: &[u8]) -> Result<FrameHeader, Error> {
        if data.len() != FRAME_HEADER_SIZE {
            return Err(Error::new(
                ErrorKind::MalformedMessage,
                format!(
                    "Frame header is {} bytes, expected {}",
                    data.len(),
                    FRAME_HEADER_SIZE
                ),
            ));
        }
        let field = |pos: usize| -> u32 { read_u32_at(data, pos).unwrap_or(0) };
        let magic = field(FRAME_POS_MAGIC);
        if magic != FRAME_MAGIC {
            return Err(Error::new(
                ErrorKind::MalformedMessage,
                format!("Bad frame magic {:#x}", magic),
            ));
        }
        return Ok(FrameHeader {
            code: field(FRAME_POS_CODE),
            payload_size: field(FRAME_POS_SIZE),
            payload_crc: field(FRAME_POS_CRC),
            n_fds: field(FRAME_POS_N_FDS),
        });
    }

    pub fn check_payload(&self, payload: &[u8]) -> Result<(), Error> {
        let crc = compute_crc32(payload);
        if crc != self.payload_crc {
            return Err(Error::new(
                ErrorKind::ChecksumMismatch,
                format!(
                    "Payload crc {:#x} does not match header crc {:#x}",
                    crc, self.payload_crc
                ),
            ));
        }
        return Ok(());
    }
}
