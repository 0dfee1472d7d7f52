use std::time::Duration;

use tracing::{debug, warn};

use crate::channel::{Channel, ChannelConfig, Role};
use crate::error::{ChannelError, Result};

/// Client side: write a request, wake the server, wait for the reply.
///
/// A channel has a single slot, so requests from one `Requester` are
/// strictly sequential. Several clients sharing one channel name must
/// serialize among themselves.
#[derive(Debug)]
pub struct Requester {
    channel: Channel,
    timed_out: bool,
}

impl Requester {
    /// Open the channel a server created under `name`.
    pub fn connect(name: &str, config: ChannelConfig) -> Result<Self> {
        Self::from_channel(Channel::connect_client(name, config)?)
    }

    /// Wrap an already connected client channel.
    ///
    /// Single-signal channels are refused with `UnsupportedTopology`; the
    /// client would wait on the signal it just posted.
    pub fn from_channel(channel: Channel) -> Result<Self> {
        channel.require_role(Role::Client, "send_request")?;
        channel.require_dual("send_request")?;
        Ok(Self {
            channel,
            timed_out: false,
        })
    }

    /// Send `data` and block until the server replies.
    ///
    /// `None` waits forever. On `TimedOut` the channel stays usable and the
    /// call may simply be repeated; the request is then written and
    /// signaled again. `TooBig` is reported before anything is written.
    pub fn send_request(&mut self, data: &[u8], timeout: Option<Duration>) -> Result<()> {
        if self.timed_out {
            self.discard_late_reply()?;
        }
        self.channel.write(data)?;
        self.channel.notify_request()?;
        debug!(channel = %self.channel.name(), len = data.len(), "request sent");

        match self.channel.wait_reply(timeout) {
            Err(err @ ChannelError::TimedOut(_)) => {
                warn!(channel = %self.channel.name(), ?timeout, "no reply before deadline");
                self.timed_out = true;
                Err(err)
            }
            other => other,
        }
    }

    /// A reply to an abandoned request may still be posted after its
    /// deadline. Consume it so it is not mistaken for the next reply.
    fn discard_late_reply(&mut self) -> Result<()> {
        match self.channel.wait_reply(Some(Duration::ZERO)) {
            Ok(()) => debug!(channel = %self.channel.name(), "discarded late reply"),
            Err(ChannelError::TimedOut(_)) => {}
            Err(err) => return Err(err),
        }
        self.timed_out = false;
        Ok(())
    }

    /// Copy up to `out.len()` bytes of the current reply.
    pub fn read(&self, out: &mut [u8]) -> Result<usize> {
        self.channel.read(out)
    }

    /// The current reply with the zero fill after it removed.
    ///
    /// Replies that legitimately end in zero bytes need their own length
    /// prefix; use [`Requester::read`] for those.
    pub fn reply(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.channel.size()];
        self.channel.read(&mut buf)?;
        let end = buf.iter().rposition(|&byte| byte != 0).map_or(0, |i| i + 1);
        buf.truncate(end);
        Ok(buf)
    }

    /// The current reply up to its first NUL, as UTF-8 (lossy).
    pub fn reply_text(&self) -> Result<String> {
        let buf = self.reply()?;
        let end = buf.iter().position(|&byte| byte == 0).unwrap_or(buf.len());
        Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn close(&mut self) {
        self.channel.close();
    }
}
