mod bundle;
mod config;
mod connection;
mod constants;
mod descriptor;
mod error;
mod launch;
mod lifecycle;
mod receiver;
mod transport;
mod utils;
mod wire_message;

pub use crate::bundle::{pack, DescriptorBundle};
pub use crate::config::ServiceConfig;
pub use crate::connection::{ContentServiceClient, ServiceConnection};
pub use crate::constants::{FD_PASSING_SOCKET_KEY, HANDOFF_TRANSACTION, IPC_SOCKET_KEY};
pub use crate::descriptor::Descriptor;
pub use crate::error::{Error, ErrorKind};
pub use crate::launch::{launch_channels, LaunchedChannels, LaunchedUi};
pub use crate::lifecycle::{ServiceCallbacks, ServiceHost, ServiceState};
pub use crate::receiver::{
    takeover_string, ContentHandler, ContentThread, HandoffReceiver, ReceivedChannels,
};
pub use crate::transport::{
    recv_message, recv_reply, send_bundle, send_message, send_reply, ReplyStatus,
};
pub use crate::wire_message::{FrameHeader, WireMessage};
