use tracing::debug;

use crate::channel::Channel;
use crate::error::{ChannelError, Result};

/// Handler invoked once per received request.
pub type Callback = Box<dyn FnMut(&mut Request<'_>) + Send>;

/// A received request, as seen by one callback.
///
/// Borrows the server channel for the duration of a dispatch. Exactly one
/// `respond` or `acknowledge` must happen across all callbacks.
pub struct Request<'a> {
    channel: &'a mut Channel,
    replied: bool,
}

impl<'a> Request<'a> {
    pub(crate) fn new(channel: &'a mut Channel) -> Self {
        Self {
            channel,
            replied: false,
        }
    }

    /// The segment contents.
    ///
    /// This is a live view: once a callback has replied, later callbacks see
    /// the reply bytes here instead of the request.
    pub fn payload(&self) -> &[u8] {
        self.channel.view().unwrap_or(&[])
    }

    /// Bytes up to the first NUL, for peers that send C strings.
    pub fn payload_until_nul(&self) -> &[u8] {
        let payload = self.payload();
        let end = payload
            .iter()
            .position(|&byte| byte == 0)
            .unwrap_or(payload.len());
        &payload[..end]
    }

    /// Write the reply and wake the client.
    pub fn respond(&mut self, data: &[u8]) -> Result<()> {
        if self.replied {
            return Err(ChannelError::AlreadyReplied);
        }
        self.channel.respond(data)?;
        self.replied = true;
        Ok(())
    }

    /// Reply without content.
    pub fn acknowledge(&mut self) -> Result<()> {
        self.respond(&[])
    }

    /// Whether a reply has been sent for this request.
    pub fn replied(&self) -> bool {
        self.replied
    }

    pub fn channel_name(&self) -> &str {
        self.channel.name()
    }
}

/// Ordered list of request handlers.
///
/// Handlers run in registration order; registering the same closure twice
/// runs it twice.
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: Vec<Callback>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, callback: F)
    where
        F: FnMut(&mut Request<'_>) + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn clear(&mut self) {
        self.callbacks.clear();
    }

    /// Run every handler against the request now in `channel`.
    ///
    /// Returns whether one of them replied.
    pub fn dispatch(&mut self, channel: &mut Channel) -> bool {
        let mut request = Request::new(channel);
        for (index, callback) in self.callbacks.iter_mut().enumerate() {
            callback(&mut request);
            debug!(
                channel = request.channel_name(),
                index,
                replied = request.replied(),
                "callback returned"
            );
        }
        request.replied()
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("len", &self.callbacks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::channel::ChannelConfig;

    fn server(tag: &str) -> Channel {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let name = format!("rg-{tag}-{:x}-{n:x}", std::process::id());
        Channel::create_server(&name, ChannelConfig::default().with_size(32))
            .expect("server should create")
    }

    #[test]
    fn handlers_run_in_registration_order_including_duplicates() {
        let mut channel = server("order");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new();

        for id in [1, 2, 1] {
            let seen = Arc::clone(&seen);
            registry.register(move |_req| seen.lock().expect("lock").push(id));
        }
        assert_eq!(registry.len(), 3);

        assert!(!registry.dispatch(&mut channel));
        assert_eq!(*seen.lock().expect("lock"), vec![1, 2, 1]);
    }

    #[test]
    fn dispatch_reports_reply_and_refuses_a_second_one() {
        let mut channel = server("reply");
        channel.write(b"ping").expect("write should fit");

        let outcome = Arc::new(Mutex::new(None));
        let mut registry = CallbackRegistry::new();
        registry.register(|req| {
            assert_eq!(req.payload_until_nul(), b"ping");
            req.respond(b"pong").expect("first reply should succeed");
        });
        {
            let outcome = Arc::clone(&outcome);
            registry.register(move |req| {
                // Live view: the reply is already in the segment.
                assert_eq!(req.payload_until_nul(), b"pong");
                *outcome.lock().expect("lock") = Some(req.acknowledge());
            });
        }

        assert!(registry.dispatch(&mut channel));
        let second = outcome.lock().expect("lock").take().expect("second callback ran");
        assert!(matches!(second, Err(ChannelError::AlreadyReplied)));
    }

    #[test]
    fn clear_empties_registry() {
        let mut registry = CallbackRegistry::new();
        registry.register(|req| {
            let _ = req.acknowledge();
        });
        assert!(!registry.is_empty());
        registry.clear();
        assert!(registry.is_empty());
    }
}
