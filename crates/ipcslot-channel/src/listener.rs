use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use crate::channel::{Channel, ChannelConfig, Role, ShutdownHandle};
use crate::error::{ChannelError, Result};
use crate::registry::{CallbackRegistry, Request};

/// Server loop: wait for a request, run the callbacks, require a reply.
///
/// Every request must be answered exactly once before the next wait. A
/// dispatch in which no callback called `respond` or `acknowledge` is a bug
/// in the callbacks and panics.
#[derive(Debug)]
pub struct Listener {
    channel: Channel,
    callbacks: CallbackRegistry,
}

impl Listener {
    /// Wrap a server channel.
    ///
    /// Client channels are refused with `WrongRole`, single-signal channels
    /// with `UnsupportedTopology`.
    pub fn new(channel: Channel) -> Result<Self> {
        channel.require_role(Role::Server, "listen")?;
        channel.require_dual("listen")?;
        Ok(Self {
            channel,
            callbacks: CallbackRegistry::new(),
        })
    }

    /// Create a server channel and wrap it.
    pub fn create(name: &str, config: ChannelConfig) -> Result<Self> {
        Self::new(Channel::create_server(name, config)?)
    }

    /// Builder form of [`Listener::register`].
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&mut Request<'_>) + Send + 'static,
    {
        self.register(callback);
        self
    }

    /// Append a callback. Register everything before listening.
    pub fn register<F>(&mut self, callback: F)
    where
        F: FnMut(&mut Request<'_>) + Send + 'static,
    {
        self.callbacks.register(callback);
    }

    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn into_channel(self) -> Channel {
        self.channel
    }

    pub fn shutdown_handle(&self) -> Result<ShutdownHandle> {
        self.channel.shutdown_handle()
    }

    /// Serve requests until a wait or notify fails.
    pub fn listen(&mut self) -> Result<Infallible> {
        self.ensure_callbacks()?;
        info!(channel = %self.channel.name(), "listening");
        loop {
            self.channel.wait_request()?;
            self.dispatch()?;
        }
    }

    /// Serve requests until `stop` is set.
    ///
    /// The flag is checked before every wait and again right after it
    /// returns, so a wake-up posted together with the flag (see
    /// [`ShutdownHandle::trigger`]) ends the loop without being dispatched.
    /// A wake-up still pending on exit is consumed, so listening on the
    /// channel again does not dispatch it. Setting the flag alone does not
    /// interrupt a wait already in progress.
    pub fn listen_until(&mut self, stop: &AtomicBool) -> Result<()> {
        self.ensure_callbacks()?;
        info!(channel = %self.channel.name(), "listening until stopped");
        let mut served = 0u64;
        loop {
            if stop.load(Ordering::SeqCst) {
                break;
            }
            self.channel.wait_request()?;
            if stop.load(Ordering::SeqCst) {
                break;
            }
            self.dispatch()?;
            served += 1;
        }
        if self.channel.drain_request()? {
            debug!(channel = %self.channel.name(), "consumed pending wake-up");
        }
        info!(channel = %self.channel.name(), served, "listener stopped");
        Ok(())
    }

    /// Wait for and answer exactly one request.
    pub fn serve_one(&mut self) -> Result<()> {
        self.ensure_callbacks()?;
        self.channel.wait_request()?;
        self.dispatch()
    }

    fn ensure_callbacks(&self) -> Result<()> {
        if self.callbacks.is_empty() {
            return Err(ChannelError::NoCallbacks);
        }
        Ok(())
    }

    fn dispatch(&mut self) -> Result<()> {
        debug!(channel = %self.channel.name(), callbacks = self.callbacks.len(), "dispatching request");
        let replied = self.callbacks.dispatch(&mut self.channel);
        if replied {
            return Ok(());
        }
        // A reply that failed at the OS level already made the channel bad.
        if !self.channel.is_good() {
            return Err(self.channel.not_good());
        }
        panic!(
            "listener on channel {} dispatched a request but no callback replied",
            self.channel.name()
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    use ipcslot_sys::{NamedSignal, Semaphore};

    use super::*;
    use crate::channel::Topology;
    use crate::requester::Requester;

    fn unique(tag: &str) -> String {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("ls-{tag}-{:x}-{n:x}", std::process::id())
    }

    fn small() -> ChannelConfig {
        ChannelConfig::default().with_size(32)
    }

    #[test]
    fn refuses_client_channels() {
        let name = unique("role");
        let _server = Channel::create_server(&name, small()).expect("server should create");
        let client = Channel::connect_client(&name, small()).expect("client should connect");
        assert!(matches!(
            Listener::new(client),
            Err(ChannelError::WrongRole { .. })
        ));
    }

    #[test]
    fn refuses_single_signal_channels() {
        let single = small().with_topology(Topology::Single);
        let server =
            Channel::create_server(&unique("single"), single).expect("server should create");
        assert!(matches!(
            Listener::new(server),
            Err(ChannelError::UnsupportedTopology {
                topology: Topology::Single,
                ..
            })
        ));
    }

    #[test]
    fn empty_registry_fails_fast() {
        let mut listener = Listener::create(&unique("empty"), small()).expect("should create");
        assert!(matches!(listener.listen(), Err(ChannelError::NoCallbacks)));
        let stop = AtomicBool::new(false);
        assert!(matches!(
            listener.listen_until(&stop),
            Err(ChannelError::NoCallbacks)
        ));
    }

    #[test]
    fn preset_stop_flag_returns_without_waiting() {
        let mut listener = Listener::create(&unique("preset"), small())
            .expect("should create")
            .with_callback(|req| {
                let _ = req.acknowledge();
            });
        let stop = AtomicBool::new(true);
        listener.listen_until(&stop).expect("should stop at once");
    }

    #[test]
    fn serve_one_answers_a_queued_request() {
        let name = unique("one");
        let mut listener = Listener::create(&name, small())
            .expect("should create")
            .with_callback(|req| {
                let upper = req.payload_until_nul().to_ascii_uppercase();
                req.respond(&upper).expect("reply should fit");
            });
        let mut client = Channel::connect_client(&name, small()).expect("client should connect");

        client.write(b"abc").expect("write should fit");
        client.notify_request().expect("notify should work");
        listener.serve_one().expect("request should be served");

        client
            .wait_reply(Some(Duration::from_secs(1)))
            .expect("reply should be signaled");
        let mut out = [0u8; 4];
        client.read(&mut out).expect("read should work");
        assert_eq!(&out, b"ABC\0");
    }

    #[test]
    fn stop_during_dispatch_leaves_no_stale_wake_up() {
        let name = unique("drain");
        let mut listener = Listener::create(&name, small()).expect("should create");
        let handle = listener.shutdown_handle().expect("handle should open");
        let stop = handle.clone();
        listener.register(move |req| {
            req.respond(b"last").expect("reply should fit");
            stop.trigger().expect("trigger should notify");
        });

        let client = std::thread::spawn({
            let name = name.clone();
            move || {
                let mut requester =
                    Requester::connect(&name, small()).expect("client should connect");
                requester.send_request(b"only", Some(Duration::from_secs(5)))
            }
        });

        listener
            .listen_until(handle.stop_flag())
            .expect("listener should stop cleanly");
        client
            .join()
            .expect("client thread should finish")
            .expect("request should be answered");

        let request_signal =
            Semaphore::open(&listener.channel().names().client_signal).expect("signal should open");
        let err = request_signal
            .wait(Some(Duration::from_millis(20)))
            .expect_err("no post should remain");
        assert!(err.is_timeout());
    }

    #[test]
    #[should_panic(expected = "no callback replied")]
    fn missing_reply_is_a_protocol_violation() {
        let name = unique("silent");
        let mut listener = Listener::create(&name, small())
            .expect("should create")
            .with_callback(|_req| {});
        let mut client = Channel::connect_client(&name, small()).expect("client should connect");

        client.write(b"hello").expect("write should fit");
        client.notify_request().expect("notify should work");
        let _ = listener.serve_one();
    }
}
