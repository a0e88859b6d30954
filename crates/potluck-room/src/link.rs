//! The outbound seam between a room and its members.
//!
//! A [`Link`] is the send/close half of a member's connection, owned by
//! the room through the roster. The room never sees a socket: the
//! server crate implements `Link` over its WebSocket connection, and
//! tests implement it over in-memory channels.

/// A member's outbound endpoint.
pub trait Link: Send + Sync + 'static {
    /// Delivers one message to the member.
    ///
    /// A failure here means the member is unreachable; depending on
    /// phase, the room responds by removing them. It is never retried.
    fn send(
        &self,
        msg: &potluck_protocol::Message,
    ) -> impl std::future::Future<Output = Result<(), LinkError>> + Send;

    /// Closes the endpoint. Implementations must tolerate a second
    /// close (the underlying connection may already be gone); failures
    /// are logged by the implementation, not surfaced.
    fn close(&self) -> impl std::future::Future<Output = ()> + Send;
}

/// A delivery failure on a specific member's link.
///
/// Deliberately just a display string: the room crate reacts to *that*
/// a send failed, never to *why*, and this keeps it independent of any
/// transport crate.
#[derive(Debug, thiserror::Error)]
#[error("link failed: {0}")]
pub struct LinkError(pub String);
