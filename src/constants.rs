// Keys of the descriptor bundle. These are part of the contract with the
// receiving service and must match exactly on both sides.
pub const IPC_SOCKET_KEY: &str = "IPC_SOCKET";
pub const FD_PASSING_SOCKET_KEY: &str = "FD_PASSING_SOCKET";

// The only transaction the receiving service understands
pub const HANDOFF_TRANSACTION: u32 = 1;

// Frame layout, sent over the transport socket with the descriptors attached
// to the first chunk.
//  0  -- u32 magic
//  4  -- u32 transaction code
//  8  -- u32 payload size
// 12  -- u32 payload crc
// 16  -- u32 descriptor count
// 20  -- end
// Followed by payload size bytes of key table.
pub const FRAME_MAGIC: u32 = 0x4644_484f;
pub const FRAME_HEADER_SIZE: usize = 20;

pub const FRAME_POS_MAGIC: usize = 0;
pub const FRAME_POS_CODE: usize = 4;
pub const FRAME_POS_SIZE: usize = 8;
pub const FRAME_POS_CRC: usize = 12;
pub const FRAME_POS_N_FDS: usize = 16;

// Reply layout
//  0  -- u32 magic
//  4  -- u32 status
//  8  -- end
pub const REPLY_SIZE: usize = 8;

// Upper bounds on what a receiver will accept from a peer
pub const MAX_PAYLOAD_SIZE: usize = 4096;
pub const MAX_FDS_PER_MESSAGE: usize = 8;
