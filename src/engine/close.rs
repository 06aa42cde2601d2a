//! Graceful close, mirroring TCP's FIN/FIN-ACK dance.
//!
//! The transition table is kept as a `const` array indexed by
//! `(state, fin_ack_flag)` rather than a chain of `match` arms on two
//! variables.

use crate::engine::error::ConnError;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Init,
    Established,
    Online,
    FinWait1,
    FinWait2,
    Closing,
    TimeWait,
    CloseWait,
    LastAck,
    Closed,
    Disconnected,
    Error,
    Invalid,
}

/// Outgoing flags a transition demands be sent alongside the state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFlags {
    None,
    SendAck,
}

/// One cell of the `(state, fin_ack) -> (next_state, send_flags)` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Transition {
    from: State,
    fin_ack: bool,
    next: State,
    flags: SendFlags,
}

/// The complete valid-transition table. Any `(state, fin_ack)` pair
/// not listed here is invalid; see [`transition`].
const TRANSITIONS: &[Transition] = &[
    Transition { from: State::Online, fin_ack: false, next: State::CloseWait, flags: SendFlags::SendAck },
    Transition { from: State::FinWait1, fin_ack: false, next: State::Closing, flags: SendFlags::SendAck },
    Transition { from: State::FinWait1, fin_ack: true, next: State::FinWait2, flags: SendFlags::None },
    Transition { from: State::FinWait2, fin_ack: false, next: State::TimeWait, flags: SendFlags::SendAck },
    Transition { from: State::Closing, fin_ack: true, next: State::TimeWait, flags: SendFlags::None },
    Transition { from: State::LastAck, fin_ack: true, next: State::Closed, flags: SendFlags::None },
];

/// Look up the transition for `(state, fin_ack)`. Returns
/// [`ConnError::InvalidTransition`] for any pair not in [`TRANSITIONS`] —
/// the driver must treat that as a programmer error, never silently ignore
/// it: `ONLINE`/`fin_ack=1` is one such invalid cell, since a correct peer
/// never produces a simultaneous FIN while `ONLINE`.
pub fn transition(state: State, fin_ack: bool) -> Result<(State, SendFlags), ConnError> {
    TRANSITIONS
        .iter()
        .find(|t| t.from == state && t.fin_ack == fin_ack)
        .map(|t| (t.next, t.flags))
        .ok_or(ConnError::InvalidTransition)
}

/// Drives the active-close half of the handshake.
///
/// `disconnect()` on an `ONLINE` connection sets `in_close`, and posts a
/// context-bound work item (`pre_disconnect`) so the actual state change
/// happens on the owning execution context's thread. This type models
/// `pre_disconnect`'s effect once that work item runs.
#[derive(Debug, Default)]
pub struct ActiveClose {
    pub in_close: bool,
}

impl ActiveClose {
    /// `disconnect()`: mark the connection as closing. The caller is
    /// responsible for posting the `pre_disconnect` work item to its
    /// execution context; [`ActiveClose::pre_disconnect`] models what runs
    /// there.
    pub fn begin(&mut self) {
        self.in_close = true;
    }

    /// `pre_disconnect`: transition `ONLINE -> FIN_WAIT_1` directly
    /// (bypassing the transition table, since this is the *initiating*
    /// side, not a reaction to an incoming frame) and report that a
    /// `FIN_REQ` must be framed from the one-way pool and sent immediately,
    /// bypassing the ready queue.
    pub fn pre_disconnect(&mut self, state: State) -> Result<State, ConnError> {
        if state != State::Online {
            return Err(ConnError::InvalidTransition);
        }
        Ok(State::FinWait1)
    }
}

/// Models the passive-close half.
pub mod passive {
    use super::*;

    /// On receiving `FIN_REQ` while `ONLINE`: `ONLINE -> CLOSE_WAIT`, and
    /// the caller must send `FIN_ACK`.
    pub fn on_fin_req(state: State) -> Result<State, ConnError> {
        if state != State::Online {
            return Err(ConnError::InvalidTransition);
        }
        Ok(State::CloseWait)
    }

    /// The upper layer's `connection_destroy` call: if in `CLOSE_WAIT`,
    /// send `FIN_REQ` and transition to `LAST_ACK`.
    pub fn on_connection_destroy(state: State) -> Result<State, ConnError> {
        if state != State::CloseWait {
            return Err(ConnError::InvalidTransition);
        }
        Ok(State::LastAck)
    }

    /// On receiving `FIN_ACK` while `LAST_ACK`: transition to `CLOSED` and
    /// the caller must run post-destroy teardown (flush tasks, close the
    /// underlying RDMA connection, drop session membership, notify
    /// teardown).
    pub fn on_fin_ack(state: State) -> Result<State, ConnError> {
        if state != State::LastAck {
            return Err(ConnError::InvalidTransition);
        }
        Ok(State::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn online_fin_ack_one_is_invalid() {
        // This cell must never be reached
        // by a correct peer, and the driver reports it rather than ignoring it.
        assert_eq!(transition(State::Online, true), Err(ConnError::InvalidTransition));
    }

    #[test]
    fn full_active_close_sequence() {
        // ONLINE -> FIN_WAIT_1 (local, via pre_disconnect)
        let mut active = ActiveClose::default();
        active.begin();
        assert!(active.in_close);
        let s = active.pre_disconnect(State::Online).unwrap();
        assert_eq!(s, State::FinWait1);

        // Peer's FIN_ACK arrives while we're in FIN_WAIT_1.
        let (s, flags) = transition(s, true).unwrap();
        assert_eq!(s, State::FinWait2);
        assert_eq!(flags, SendFlags::None);

        // No FIN from peer yet: we see our own retransmission path via
        // fin_ack=0, advancing to TIME_WAIT and sending an ack.
        let (s, flags) = transition(s, false).unwrap();
        assert_eq!(s, State::TimeWait);
        assert_eq!(flags, SendFlags::SendAck);
    }

    #[test]
    fn full_passive_close_sequence() {
        let s = passive::on_fin_req(State::Online).unwrap();
        assert_eq!(s, State::CloseWait);
        let s = passive::on_connection_destroy(s).unwrap();
        assert_eq!(s, State::LastAck);
        let s = passive::on_fin_ack(s).unwrap();
        assert_eq!(s, State::Closed);
    }

    #[test]
    fn fin_wait_1_simultaneous_close() {
        let (s, flags) = transition(State::FinWait1, false).unwrap();
        assert_eq!(s, State::Closing);
        assert_eq!(flags, SendFlags::SendAck);
        let (s, flags) = transition(s, true).unwrap();
        assert_eq!(s, State::TimeWait);
        assert_eq!(flags, SendFlags::None);
    }
}
