/// Suffix of the request-arrival signal, posted by the client.
pub const CLIENT_SIGNAL_SUFFIX: &str = "_cs";
/// Suffix of the reply-arrival signal, posted by the server.
pub const SERVER_SIGNAL_SUFFIX: &str = "_ss";
/// Suffix of the shared signal used in single-signal mode.
pub const SHARED_SIGNAL_SUFFIX: &str = "_sig";

/// OS object names derived from a channel's base name.
///
/// The segment uses the base name directly. Each signal appends its own
/// suffix, so two channels with different base names never share a signal
/// and a signal name never equals a segment name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelNames {
    pub segment: String,
    pub client_signal: String,
    pub server_signal: String,
    pub shared_signal: String,
}

impl ChannelNames {
    pub fn derive(base: &str) -> Self {
        Self {
            segment: base.to_string(),
            client_signal: format!("{base}{CLIENT_SIGNAL_SUFFIX}"),
            server_signal: format!("{base}{SERVER_SIGNAL_SUFFIX}"),
            shared_signal: format!("{base}{SHARED_SIGNAL_SUFFIX}"),
        }
    }

    /// Every signal name any topology may have left behind.
    pub fn all_signals(&self) -> [&str; 3] {
        [
            self.client_signal.as_str(),
            self.server_signal.as_str(),
            self.shared_signal.as_str(),
        ]
    }
}
