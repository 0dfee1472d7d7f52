//! Named request/response channels between two processes.
//!
//! ipcslot joins two processes through one named shared memory segment and a
//! pair of named signals. The server blocks until a request is written and
//! signaled, answers it in place, and signals back; the client waits for that
//! answer with an optional timeout. One request is in flight at a time.
//!
//! # Crate Structure
//!
//! - [`sys`]: named segments and signals, one implementation per OS family
//! - [`channel`]: the channel, its server loop and its client call sequence
//!
//! # Stale objects
//!
//! On POSIX systems the named objects outlive a process that exits without
//! closing its channel. A later server under the same name then fails with
//! `AlreadyExists` until the leftovers are removed (`ipcslot cleanup <name>`
//! or [`sys::NamedSegment::remove`] / [`sys::NamedSignal::remove`]).

/// Re-export OS object types.
pub mod sys {
    pub use ipcslot_sys::*;
}

/// Re-export channel types.
pub mod channel {
    pub use ipcslot_channel::*;
}

pub use ipcslot_channel::{
    Channel, ChannelConfig, ChannelError, Listener, Request, Requester, ShutdownHandle, Topology,
    DEFAULT_SEGMENT_SIZE,
};
