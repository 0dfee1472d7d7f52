//! Single-slot request/response over a named shared segment.
//!
//! A server creates a [`Channel`] under a name; a client opens it with the
//! same name and size. The client writes a request into the segment and
//! posts the request signal, then blocks on the reply signal. The server's
//! [`Listener`] wakes, runs its callbacks against the request and requires
//! exactly one of them to reply before it waits again.
//!
//! - [`Channel`]: the segment plus its signals, and the raw operations
//! - [`Listener`]: the server loop over a [`CallbackRegistry`]
//! - [`Requester`]: the client call sequence, with an optional timeout
//! - [`ShutdownHandle`]: stops a listener from another thread
//!
//! Only the client side waits with a deadline. A listener blocks until a
//! request or a shutdown wake-up arrives.

pub mod channel;
pub mod error;
pub mod listener;
pub mod names;
pub mod registry;
pub mod requester;

pub use channel::{
    Channel, ChannelConfig, Role, ShutdownHandle, Status, Topology, DEFAULT_SEGMENT_SIZE,
};
pub use error::{ChannelError, Result};
pub use listener::Listener;
pub use names::ChannelNames;
pub use registry::{Callback, CallbackRegistry, Request};
pub use requester::Requester;
