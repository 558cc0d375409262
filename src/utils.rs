use crc::{Crc, CRC_32_CKSUM};
use std::os::fd::RawFd;

pub fn compute_crc32(data: &[u8]) -> u32 {
    let crc = Crc::<u32>::new(&CRC_32_CKSUM);
    let mut digest = crc.digest();
    digest.update(data);
    return digest.finalize();
}

/// Whether `fd` refers to an open descriptor in this process. Does not say
/// anything about who owns it.
pub fn is_open(fd: RawFd) -> bool {
    if fd < 0 {
        return false;
    }
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    return flags != -1;
}

pub fn read_u32_at(data: &[u8], start: usize) -> Option<u32> {
    let end = start.checked_add(4)?;
    let bytes: [u8; 4] = data.get(start..end)?.try_into().ok()?;
    return Some(u32::from_ne_bytes(bytes));
}

pub fn write_u32_at(data: &mut [u8], start: usize, value: u32) {
    let end = start + 4;
    assert!(end <= data.len());
    data[start..end].clone_from_slice(&value.to_ne_bytes());
}
