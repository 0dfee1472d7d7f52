use std::time::Duration;

use ipcslot_sys::{ErrorKind, SysError};

use crate::channel::{Role, Topology};

/// Errors that can occur in channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The shared segment could not be created.
    #[error("channel {name}: segment create failed: {source}")]
    SegmentCreateFailed { name: String, source: SysError },

    /// A synchronization primitive could not be created.
    #[error("channel {name}: signal create failed: {source}")]
    SyncCreateFailed { name: String, source: SysError },

    /// The shared segment does not exist or could not be mapped.
    #[error("channel {name}: segment open failed: {source}")]
    SegmentOpenFailed { name: String, source: SysError },

    /// A synchronization primitive does not exist or could not be opened.
    #[error("channel {name}: signal open failed: {source}")]
    SyncOpenFailed { name: String, source: SysError },

    /// The channel was closed or a previous fatal error made it unusable.
    #[error("channel {name} is not usable (last error: {last_error:?})")]
    ChannelNotGood {
        name: String,
        last_error: Option<ErrorKind>,
    },

    /// The operation belongs to the other side of the channel.
    #[error("{operation} requires a {expected:?} channel")]
    WrongRole {
        expected: Role,
        operation: &'static str,
    },

    /// The operation cannot run on a channel with this signal layout.
    #[error("{operation} requires a dual-signal channel, not {topology:?}")]
    UnsupportedTopology {
        topology: Topology,
        operation: &'static str,
    },

    /// No reply arrived before the deadline. The channel stays usable.
    #[error("no reply within {0:?}")]
    TimedOut(Duration),

    /// Waiting on a signal failed; the channel is now unusable.
    #[error("wait failed: {0}")]
    WaitFailed(#[source] SysError),

    /// Posting a signal failed; the channel is now unusable.
    #[error("notify failed: {0}")]
    NotifyFailed(#[source] SysError),

    /// Payload larger than the segment. Nothing was written.
    #[error("payload of {len} bytes exceeds segment size of {max} bytes")]
    TooBig { len: usize, max: usize },

    /// `listen` was called with an empty callback registry.
    #[error("no callbacks registered")]
    NoCallbacks,

    /// The request has already been answered in this dispatch.
    #[error("request already answered")]
    AlreadyReplied,
}

impl ChannelError {
    /// The OS-level kind behind this error, if there is one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ChannelError::SegmentCreateFailed { source, .. }
            | ChannelError::SyncCreateFailed { source, .. }
            | ChannelError::SegmentOpenFailed { source, .. }
            | ChannelError::SyncOpenFailed { source, .. }
            | ChannelError::WaitFailed(source)
            | ChannelError::NotifyFailed(source) => Some(source.kind()),
            ChannelError::TimedOut(_) => Some(ErrorKind::TimedOut),
            ChannelError::TooBig { .. } => Some(ErrorKind::TooBig),
            ChannelError::ChannelNotGood { .. }
            | ChannelError::WrongRole { .. }
            | ChannelError::UnsupportedTopology { .. }
            | ChannelError::NoCallbacks
            | ChannelError::AlreadyReplied => None,
        }
    }

    /// Only a timed-out request may be retried on the same channel.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChannelError::TimedOut(_))
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
