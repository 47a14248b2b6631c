//! Per-call phase bookkeeping.
//!
//! `CallState` is the synchronous core of the call state machine. It owns
//! the state of each direction and the terminal status, and decides whether
//! an operation is allowed. It performs no IO; [`Call`](super::Call) wraps
//! it with the channel and the abort signal.

use serde::{Deserialize, Serialize};

use crate::protocol::Status;

/// State of one direction of a call. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Direction {
    Idle,
    Active,
    Closed,
}

impl Direction {
    fn advance(&mut self, to: Direction) {
        if to > *self {
            *self = to;
        }
    }
}

/// Observable phase of a call, derived from both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Open,
    SendActive,
    RecvActive,
    BothActive,
    SendClosed,
    RecvClosed,
    Closed,
}

/// Outcome of asking to receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecvGate {
    /// The receive direction is open.
    Open,
    /// The peer ended the stream normally.
    Ended,
    /// The call ended with an error.
    Failed(Status),
}

#[derive(Debug)]
pub struct CallState {
    send: Direction,
    recv: Direction,
    terminal: Option<Status>,
}

impl Default for CallState {
    fn default() -> Self {
        Self::new()
    }
}

impl CallState {
    pub fn new() -> Self {
        Self {
            send: Direction::Idle,
            recv: Direction::Idle,
            terminal: None,
        }
    }

    pub fn phase(&self) -> Phase {
        use Direction::*;
        match (self.send, self.recv) {
            (Idle, Idle) => Phase::Open,
            (Closed, Closed) => Phase::Closed,
            (Closed, _) => Phase::SendClosed,
            (_, Closed) => Phase::RecvClosed,
            (Active, Active) => Phase::BothActive,
            (Active, Idle) => Phase::SendActive,
            (Idle, Active) => Phase::RecvActive,
        }
    }

    pub fn send_direction(&self) -> Direction {
        self.send
    }

    pub fn recv_direction(&self) -> Direction {
        self.recv
    }

    pub fn terminal(&self) -> Option<&Status> {
        self.terminal.as_ref()
    }

    /// Checks that a message may be sent and marks the send direction active.
    pub fn begin_send(&mut self) -> Result<(), Status> {
        self.ensure_live()?;
        if self.send == Direction::Closed {
            return Err(Status::failed_precondition("send direction is already closed"));
        }
        self.send.advance(Direction::Active);
        Ok(())
    }

    /// Closes the send direction. Allowed exactly once.
    pub fn close_send(&mut self) -> Result<(), Status> {
        self.ensure_live()?;
        if self.send == Direction::Closed {
            return Err(Status::failed_precondition("send direction is already closed"));
        }
        self.send.advance(Direction::Closed);
        Ok(())
    }

    pub fn begin_recv(&mut self) -> RecvGate {
        match &self.terminal {
            Some(status) if status.is_ok() => return RecvGate::Ended,
            Some(status) => return RecvGate::Failed(status.clone()),
            None => {}
        }
        if self.recv == Direction::Closed {
            return RecvGate::Ended;
        }
        self.recv.advance(Direction::Active);
        RecvGate::Open
    }

    pub fn close_recv(&mut self) {
        self.recv.advance(Direction::Closed);
    }

    /// Records the terminal status and closes both directions.
    ///
    /// Returns `false` (and changes nothing) if a terminal status already
    /// exists: a call has at most one.
    pub fn terminate(&mut self, status: Status) -> bool {
        if self.terminal.is_some() {
            return false;
        }
        self.terminal = Some(status);
        self.send.advance(Direction::Closed);
        self.recv.advance(Direction::Closed);
        true
    }

    fn ensure_live(&self) -> Result<(), Status> {
        match &self.terminal {
            None => Ok(()),
            Some(status) if status.is_ok() => {
                Err(Status::failed_precondition("call has already completed"))
            }
            Some(status) => Err(status.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Code;

    #[test]
    fn test_new_call_is_open() {
        let state = CallState::new();
        assert_eq!(state.phase(), Phase::Open);
        assert!(state.terminal().is_none());
    }

    #[test]
    fn test_phase_progression() {
        let mut state = CallState::new();

        state.begin_send().unwrap();
        assert_eq!(state.phase(), Phase::SendActive);

        assert_eq!(state.begin_recv(), RecvGate::Open);
        assert_eq!(state.phase(), Phase::BothActive);

        state.close_send().unwrap();
        assert_eq!(state.phase(), Phase::SendClosed);

        state.close_recv();
        assert_eq!(state.phase(), Phase::Closed);
    }

    #[test]
    fn test_recv_only_phase() {
        let mut state = CallState::new();
        assert_eq!(state.begin_recv(), RecvGate::Open);
        assert_eq!(state.phase(), Phase::RecvActive);
        state.close_recv();
        assert_eq!(state.phase(), Phase::RecvClosed);
    }

    #[test]
    fn test_closed_send_cannot_reopen() {
        let mut state = CallState::new();
        state.close_send().unwrap();

        let err = state.begin_send().unwrap_err();
        assert_eq!(err.code(), Code::FailedPrecondition);
        assert_eq!(state.send_direction(), Direction::Closed);
    }

    #[test]
    fn test_double_close_send_fails_without_side_effects() {
        let mut state = CallState::new();
        state.begin_recv();
        state.close_send().unwrap();
        let phase = state.phase();

        for _ in 0..2 {
            let err = state.close_send().unwrap_err();
            assert_eq!(err.code(), Code::FailedPrecondition);
            assert_eq!(state.phase(), phase);
            assert!(state.terminal().is_none());
        }
    }

    #[test]
    fn test_closed_recv_reports_end() {
        let mut state = CallState::new();
        state.close_recv();
        assert_eq!(state.begin_recv(), RecvGate::Ended);
        assert_eq!(state.recv_direction(), Direction::Closed);
    }

    #[test]
    fn test_at_most_one_terminal_status() {
        let mut state = CallState::new();
        assert!(state.terminate(Status::deadline_exceeded("late")));
        assert!(!state.terminate(Status::ok()));
        assert_eq!(state.terminal().unwrap().code(), Code::DeadlineExceeded);
        assert_eq!(state.phase(), Phase::Closed);
    }

    #[test]
    fn test_operations_after_abort_report_stored_status() {
        let mut state = CallState::new();
        state.terminate(Status::internal("transport failure"));

        assert_eq!(state.begin_send().unwrap_err().code(), Code::Internal);
        assert_eq!(state.close_send().unwrap_err().code(), Code::Internal);
        match state.begin_recv() {
            RecvGate::Failed(status) => assert_eq!(status.code(), Code::Internal),
            other => panic!("unexpected gate: {:?}", other),
        }
    }

    #[test]
    fn test_operations_after_clean_completion() {
        let mut state = CallState::new();
        state.terminate(Status::ok());

        assert_eq!(state.begin_send().unwrap_err().code(), Code::FailedPrecondition);
        assert_eq!(state.begin_recv(), RecvGate::Ended);
    }
}
