use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ipcslot_sys::{ErrorKind, NamedSegment, NamedSignal, Semaphore, SharedMemory, SysError};
use tracing::{debug, info, warn};

use crate::error::{ChannelError, Result};
use crate::names::ChannelNames;

/// Segment size used when the caller does not pick one (1 MiB).
pub const DEFAULT_SEGMENT_SIZE: usize = 1024 * 1024;

/// Which side of the channel a handle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Created the OS objects; waits for requests and replies.
    Server,
    /// Opened existing OS objects; sends requests and waits for replies.
    Client,
}

/// How many signals carry the request/reply handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Topology {
    /// One signal per direction. Request and reply can never be confused.
    #[default]
    Dual,
    /// One signal for both directions.
    ///
    /// Kept for interop with peers that only know this layout. Which side
    /// acts next is implied by turn order alone, and a side that waits right
    /// after posting takes its own post back. Only the raw [`Channel`]
    /// operations accept it; callers take turns by hand. `Listener` and
    /// `Requester` refuse it with `UnsupportedTopology`.
    Single,
}

/// Parameters both sides of a channel must agree on out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Segment size in bytes; also the largest message either side can send.
    pub size: usize,
    pub topology: Topology,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_SEGMENT_SIZE,
            topology: Topology::Dual,
        }
    }
}

impl ChannelConfig {
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }
}

/// Usability of a channel handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Good,
    /// Closed, or a wait/notify failed. Every further operation is refused.
    Bad,
}

enum Signals {
    Single(Semaphore),
    Dual { client: Semaphore, server: Semaphore },
}

impl Signals {
    /// Posted by the client once a request is in the segment.
    fn request(&self) -> &Semaphore {
        match self {
            Signals::Single(shared) => shared,
            Signals::Dual { client, .. } => client,
        }
    }

    /// Posted by the server once a reply is in the segment.
    fn reply(&self) -> &Semaphore {
        match self {
            Signals::Single(shared) => shared,
            Signals::Dual { server, .. } => server,
        }
    }
}

// Fields drop in declaration order: signals are released before the segment.
struct Resources {
    signals: Signals,
    segment: SharedMemory,
}

/// One endpoint of a named request/response channel.
///
/// A channel is one shared segment plus one or two named signals. Values are
/// only ever handed out fully constructed; a failed `create_server` or
/// `connect_client` has already released whatever it acquired.
pub struct Channel {
    name: String,
    role: Role,
    config: ChannelConfig,
    names: ChannelNames,
    resources: Option<Resources>,
    status: Status,
    last_error: Option<ErrorKind>,
}

impl Channel {
    /// Create the segment and signals for `name`.
    ///
    /// Fails with `SegmentCreateFailed` or `SyncCreateFailed`; the wrapped
    /// `SysError` tells `AlreadyExists` apart from other OS failures.
    pub fn create_server(name: &str, config: ChannelConfig) -> Result<Self> {
        let names = ChannelNames::derive(name);
        let segment = SharedMemory::create(&names.segment, config.size).map_err(|source| {
            ChannelError::SegmentCreateFailed {
                name: name.to_string(),
                source,
            }
        })?;

        let create = |signal: &str| {
            Semaphore::create(signal).map_err(|source| ChannelError::SyncCreateFailed {
                name: name.to_string(),
                source,
            })
        };
        // An early return drops whatever was acquired above, newest first.
        let signals = match config.topology {
            Topology::Single => Signals::Single(create(names.shared_signal.as_str())?),
            Topology::Dual => {
                let client = create(names.client_signal.as_str())?;
                let server = create(names.server_signal.as_str())?;
                Signals::Dual { client, server }
            }
        };

        info!(channel = name, size = config.size, topology = ?config.topology, "channel created");
        Ok(Self::assemble(name, Role::Server, config, names, segment, signals))
    }

    /// Open the segment and signals a server created under `name`.
    ///
    /// `config` must match the server's. Fails with `SegmentOpenFailed` or
    /// `SyncOpenFailed` if any object is missing.
    pub fn connect_client(name: &str, config: ChannelConfig) -> Result<Self> {
        let names = ChannelNames::derive(name);
        let segment = SharedMemory::open(&names.segment, config.size).map_err(|source| {
            ChannelError::SegmentOpenFailed {
                name: name.to_string(),
                source,
            }
        })?;

        let open = |signal: &str| {
            Semaphore::open(signal).map_err(|source| ChannelError::SyncOpenFailed {
                name: name.to_string(),
                source,
            })
        };
        let signals = match config.topology {
            Topology::Single => Signals::Single(open(names.shared_signal.as_str())?),
            Topology::Dual => {
                let client = open(names.client_signal.as_str())?;
                let server = open(names.server_signal.as_str())?;
                Signals::Dual { client, server }
            }
        };

        info!(channel = name, size = config.size, topology = ?config.topology, "channel connected");
        Ok(Self::assemble(name, Role::Client, config, names, segment, signals))
    }

    fn assemble(
        name: &str,
        role: Role,
        config: ChannelConfig,
        names: ChannelNames,
        segment: SharedMemory,
        signals: Signals,
    ) -> Self {
        Self {
            name: name.to_string(),
            role,
            config,
            names,
            resources: Some(Resources { signals, segment }),
            status: Status::Good,
            last_error: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn size(&self) -> usize {
        self.config.size
    }

    pub fn topology(&self) -> Topology {
        self.config.topology
    }

    pub fn names(&self) -> &ChannelNames {
        &self.names
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_good(&self) -> bool {
        self.status == Status::Good
    }

    /// Error kind that made the channel bad, if a failure did.
    pub fn last_error(&self) -> Option<ErrorKind> {
        self.last_error
    }

    /// Copy up to `out.len()` bytes from the start of the segment.
    pub fn read(&self, out: &mut [u8]) -> Result<usize> {
        Ok(self.usable()?.segment.read(out))
    }

    /// Zero the segment and copy `data` to its start. Signals nobody.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let resources = self.usable_mut()?;
        resources.segment.write(data).map_err(|err| match err {
            SysError::TooBig { len, max } => ChannelError::TooBig { len, max },
            other => ChannelError::SegmentOpenFailed {
                name: resources.segment.name().to_string(),
                source: other,
            },
        })
    }

    /// Write a reply and wake the client.
    pub fn respond(&mut self, data: &[u8]) -> Result<()> {
        self.require_role(Role::Server, "respond")?;
        self.write(data)?;
        self.notify_reply()?;
        debug!(channel = %self.name, len = data.len(), "reply sent");
        Ok(())
    }

    /// Reply with no content.
    pub fn acknowledge(&mut self) -> Result<()> {
        self.respond(&[])
    }

    /// Post the request signal.
    pub fn notify_request(&mut self) -> Result<()> {
        self.require_role(Role::Client, "notify_request")?;
        let result = self.usable()?.signals.request().notify();
        result.map_err(|err| self.fail(ChannelError::NotifyFailed, err))
    }

    /// Block until a request arrives.
    pub fn wait_request(&mut self) -> Result<()> {
        self.require_role(Role::Server, "wait_request")?;
        debug!(channel = %self.name, "waiting for request");
        let result = self.usable()?.signals.request().wait(None);
        result.map_err(|err| self.fail(ChannelError::WaitFailed, err))
    }

    /// Post the reply signal.
    pub fn notify_reply(&mut self) -> Result<()> {
        self.require_role(Role::Server, "notify_reply")?;
        let result = self.usable()?.signals.reply().notify();
        result.map_err(|err| self.fail(ChannelError::NotifyFailed, err))
    }

    /// Block until a reply arrives or `timeout` elapses.
    ///
    /// A timeout leaves the channel good; any other failure makes it bad.
    pub fn wait_reply(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.require_role(Role::Client, "wait_reply")?;
        debug!(channel = %self.name, ?timeout, "waiting for reply");
        let result = self.usable()?.signals.reply().wait(timeout);
        match result {
            Ok(()) => Ok(()),
            Err(err) if err.is_timeout() => {
                Err(ChannelError::TimedOut(timeout.unwrap_or(Duration::MAX)))
            }
            Err(err) => Err(self.fail(ChannelError::WaitFailed, err)),
        }
    }

    /// Consume a request post without blocking. Returns whether one was pending.
    pub(crate) fn drain_request(&mut self) -> Result<bool> {
        self.require_role(Role::Server, "drain_request")?;
        let result = self.usable()?.signals.request().wait(Some(Duration::ZERO));
        match result {
            Ok(()) => Ok(true),
            Err(err) if err.is_timeout() => Ok(false),
            Err(err) => Err(self.fail(ChannelError::WaitFailed, err)),
        }
    }

    /// Handle that stops a listener on this channel from another thread.
    pub fn shutdown_handle(&self) -> Result<ShutdownHandle> {
        self.require_role(Role::Server, "shutdown_handle")?;
        let resources = self.usable()?;
        let signal = resources.signals.request().name();
        let wake = Semaphore::open(signal).map_err(|source| ChannelError::SyncOpenFailed {
            name: self.name.clone(),
            source,
        })?;
        Ok(ShutdownHandle {
            stop: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(wake),
        })
    }

    /// Release the signals, then the segment. Later calls do nothing.
    pub fn close(&mut self) {
        self.status = Status::Bad;
        if let Some(resources) = self.resources.take() {
            drop(resources);
            info!(channel = %self.name, role = ?self.role, "channel closed");
        }
    }

    /// The whole segment as a slice.
    ///
    /// Only sound while the peer is blocked waiting for our signal, which is
    /// the case between a received request and the reply to it.
    pub(crate) fn view(&self) -> Result<&[u8]> {
        let resources = self.usable()?;
        // SAFETY: The client writes the segment only before posting the request
        // and reads it only after our reply; in between it is blocked waiting.
        Ok(unsafe { resources.segment.as_slice() })
    }

    pub(crate) fn require_role(&self, expected: Role, operation: &'static str) -> Result<()> {
        if self.role == expected {
            Ok(())
        } else {
            Err(ChannelError::WrongRole {
                expected,
                operation,
            })
        }
    }

    pub(crate) fn require_dual(&self, operation: &'static str) -> Result<()> {
        match self.config.topology {
            Topology::Dual => Ok(()),
            Topology::Single => Err(ChannelError::UnsupportedTopology {
                topology: Topology::Single,
                operation,
            }),
        }
    }

    fn usable(&self) -> Result<&Resources> {
        match (&self.resources, self.status) {
            (Some(resources), Status::Good) => Ok(resources),
            _ => Err(self.not_good()),
        }
    }

    fn usable_mut(&mut self) -> Result<&mut Resources> {
        if self.status != Status::Good {
            return Err(self.not_good());
        }
        let not_good = self.not_good();
        self.resources.as_mut().ok_or(not_good)
    }

    pub(crate) fn not_good(&self) -> ChannelError {
        ChannelError::ChannelNotGood {
            name: self.name.clone(),
            last_error: self.last_error,
        }
    }

    fn fail(&mut self, wrap: fn(SysError) -> ChannelError, err: SysError) -> ChannelError {
        warn!(channel = %self.name, error = %err, "channel marked bad");
        self.status = Status::Bad;
        self.last_error = Some(err.kind());
        wrap(err)
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("config", &self.config)
            .field("status", &self.status)
            .field("last_error", &self.last_error)
            .finish()
    }
}

/// Stops a listener blocked on its channel's request signal.
///
/// Holds its own handle to the request signal, so triggering works from any
/// thread (a Ctrl-C handler, a supervisor) without touching the channel.
#[derive(Clone)]
pub struct ShutdownHandle {
    stop: Arc<AtomicBool>,
    wake: Arc<Semaphore>,
}

impl ShutdownHandle {
    /// Set the stop flag and post the request signal once.
    pub fn trigger(&self) -> Result<()> {
        if self.stop.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!(signal = self.wake.name(), "shutdown requested");
        self.wake.notify().map_err(ChannelError::NotifyFailed)
    }

    pub fn is_triggered(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Flag to pass to `Listener::listen_until`.
    pub fn stop_flag(&self) -> &AtomicBool {
        &self.stop
    }
}

impl fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownHandle")
            .field("signal", &self.wake.name())
            .field("triggered", &self.is_triggered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use super::*;

    fn unique(tag: &str) -> String {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("ch-{tag}-{:x}-{n:x}", std::process::id())
    }

    fn small() -> ChannelConfig {
        ChannelConfig::default().with_size(64)
    }

    #[test]
    fn default_config_is_one_mebibyte_dual() {
        let config = ChannelConfig::default();
        assert_eq!(config.size, 1024 * 1024);
        assert_eq!(config.topology, Topology::Dual);
    }

    #[test]
    fn client_requires_live_server() {
        let err = Channel::connect_client(&unique("missing"), small())
            .expect_err("connect without server should fail");
        assert!(matches!(err, ChannelError::SegmentOpenFailed { .. }));
    }

    #[test]
    fn invalid_name_fails_before_acquiring_anything() {
        let err = Channel::create_server("bad/name", small()).expect_err("name should be rejected");
        assert_eq!(err.kind(), Some(ErrorKind::InvalidName));
    }

    #[test]
    fn zero_size_is_rejected() {
        let err = Channel::create_server(&unique("zero"), small().with_size(0))
            .expect_err("zero size should be rejected");
        assert_eq!(err.kind(), Some(ErrorKind::InvalidSize));
    }

    #[test]
    fn failed_signal_create_releases_segment() {
        let name = unique("partial");
        let names = ChannelNames::derive(&name);
        let squatter = Semaphore::create(&names.server_signal).expect("squatter should create");

        let err = Channel::create_server(&name, small()).expect_err("server signal is taken");
        assert!(matches!(err, ChannelError::SyncCreateFailed { .. }));
        assert_eq!(err.kind(), Some(ErrorKind::AlreadyExists));

        // The segment and client signal from the failed attempt are gone.
        assert!(SharedMemory::open(&names.segment, 64).is_err());
        assert!(Semaphore::open(&names.client_signal).is_err());
        drop(squatter);

        Channel::create_server(&name, small()).expect("retry should succeed");
    }

    #[test]
    fn roles_guard_directional_operations() {
        let name = unique("roles");
        let mut server = Channel::create_server(&name, small()).expect("server should create");
        let mut client = Channel::connect_client(&name, small()).expect("client should connect");

        assert!(matches!(
            server.notify_request(),
            Err(ChannelError::WrongRole {
                expected: Role::Client,
                ..
            })
        ));
        assert!(matches!(
            client.respond(b"x"),
            Err(ChannelError::WrongRole {
                expected: Role::Server,
                ..
            })
        ));
        assert!(client.shutdown_handle().is_err());
    }

    #[test]
    fn close_is_idempotent_and_poisons_the_handle() {
        let name = unique("close");
        let mut server = Channel::create_server(&name, small()).expect("server should create");
        server.close();
        server.close();
        assert_eq!(server.status(), Status::Bad);
        assert!(matches!(
            server.write(b"late"),
            Err(ChannelError::ChannelNotGood { .. })
        ));

        // Closing the creator released the names.
        Channel::create_server(&name, small()).expect("name should be free again");
    }

    #[test]
    fn write_then_read_shares_bytes() {
        let name = unique("rw");
        let mut server = Channel::create_server(&name, small()).expect("server should create");
        let client = Channel::connect_client(&name, small()).expect("client should connect");

        server.write(b"hello").expect("write should fit");
        let mut out = [0xffu8; 8];
        assert_eq!(client.read(&mut out).expect("read should work"), 8);
        assert_eq!(&out, b"hello\0\0\0");
    }

    #[test]
    fn oversized_write_is_refused_and_keeps_channel_good() {
        let name = unique("big");
        let mut server = Channel::create_server(&name, small()).expect("server should create");
        server.write(b"keep").expect("write should fit");

        let err = server.write(&[7u8; 65]).expect_err("65 bytes should not fit");
        assert!(matches!(err, ChannelError::TooBig { len: 65, max: 64 }));
        assert!(server.is_good());

        let mut out = [0u8; 4];
        server.read(&mut out).expect("read should work");
        assert_eq!(&out, b"keep");
    }

    #[test]
    fn timed_out_reply_wait_is_retryable() {
        let name = unique("timeout");
        let _server = Channel::create_server(&name, small()).expect("server should create");
        let mut client = Channel::connect_client(&name, small()).expect("client should connect");

        let err = client
            .wait_reply(Some(Duration::from_millis(20)))
            .expect_err("nobody replies");
        assert!(err.is_retryable());
        assert!(client.is_good());
    }

    #[test]
    fn shutdown_handle_wakes_request_wait() {
        let name = unique("shutdown");
        let mut server = Channel::create_server(&name, small()).expect("server should create");
        let handle = server.shutdown_handle().expect("handle should open");
        let remote = handle.clone();

        let trigger = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.trigger().expect("trigger should notify");
        });
        server.wait_request().expect("wake-up should end the wait");
        assert!(handle.is_triggered());
        trigger.join().expect("trigger thread should finish");

        // A second trigger is a no-op and posts nothing.
        handle.trigger().expect("second trigger should succeed");
    }
}
