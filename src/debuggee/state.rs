//! Debug state machine of a debuggee session.

use crate::debuggee::coroutine::CoroutineInfo;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum DebugState {
    Initial,
    Running,
    StepInto,
    StepOver,
    StepReturn,
    Break,
}

impl DebugState {
    pub fn is_stepping(self) -> bool {
        matches!(
            self,
            DebugState::StepInto | DebugState::StepOver | DebugState::StepReturn
        )
    }
}

/// State a peer or the hook may ask for. `Initial` can't be requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RequestedState {
    Running,
    StepInto,
    StepOver,
    StepReturn,
    Break,
}

impl From<RequestedState> for DebugState {
    fn from(state: RequestedState) -> Self {
        match state {
            RequestedState::Running => DebugState::Running,
            RequestedState::StepInto => DebugState::StepInto,
            RequestedState::StepOver => DebugState::StepOver,
            RequestedState::StepReturn => DebugState::StepReturn,
            RequestedState::Break => DebugState::Break,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RejectReason {
    #[strum(serialize = "session is not started")]
    NotStarted,
    #[strum(serialize = "debuggee is running")]
    NotBroken,
    #[strum(serialize = "debuggee is already stopped")]
    AlreadyBroken,
    #[strum(serialize = "step is in progress")]
    AlreadyStepping,
    #[strum(serialize = "source update is not acknowledged")]
    AwaitingSourceAck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied {
        from: DebugState,
        to: DebugState,
        /// `Some(is_break)` if the peer must get a `ChangedState` notification.
        notify: Option<bool>,
        /// The current coroutine must be remembered as the step reference.
        arm_step: bool,
    },
    Rejected(RejectReason),
}

/// Decide the outcome of a state request. Defined for every pair of states.
pub fn transition(current: DebugState, requested: RequestedState, ack_pending: bool) -> Transition {
    use DebugState as S;
    use RequestedState as R;

    let applied = |notify: Option<bool>, arm_step: bool| Transition::Applied {
        from: current,
        to: requested.into(),
        notify,
        arm_step,
    };

    match (current, requested) {
        (S::Initial, R::StepInto) => applied(None, false),
        (S::Initial, _) => Transition::Rejected(RejectReason::NotStarted),

        (S::Running, R::Break) => applied(Some(true), false),
        (S::Running, _) => Transition::Rejected(RejectReason::NotBroken),

        (S::Break, R::Running) if ack_pending => {
            Transition::Rejected(RejectReason::AwaitingSourceAck)
        }
        (S::Break, R::Running) => applied(Some(false), false),
        (S::Break, R::StepInto | R::StepOver | R::StepReturn) => applied(Some(false), true),
        (S::Break, R::Break) => Transition::Rejected(RejectReason::AlreadyBroken),

        (S::StepInto | S::StepOver | S::StepReturn, R::Break) => applied(Some(true), false),
        (S::StepInto | S::StepOver | S::StepReturn, _) => {
            Transition::Rejected(RejectReason::AlreadyStepping)
        }
    }
}

/// Current state plus the coroutine a step was started from.
#[derive(Debug)]
pub struct StateMachine {
    state: DebugState,
    step_ref: Option<CoroutineInfo>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self {
            state: DebugState::Initial,
            step_ref: None,
        }
    }
}

impl StateMachine {
    pub fn state(&self) -> DebugState {
        self.state
    }

    /// Coroutine and call depth the current step is measured against.
    pub fn step_ref(&self) -> Option<CoroutineInfo> {
        self.step_ref
    }

    /// Start the session, the first executed line stops the debuggee.
    pub fn begin(&mut self) -> Transition {
        self.request(RequestedState::StepInto, false, None)
    }

    pub fn request(
        &mut self,
        requested: RequestedState,
        ack_pending: bool,
        current: Option<CoroutineInfo>,
    ) -> Transition {
        let result = transition(self.state, requested, ack_pending);
        if let Transition::Applied { to, arm_step, .. } = result {
            self.state = to;
            if arm_step {
                self.step_ref = current;
            } else if to == DebugState::Break || to == DebugState::Running {
                self.step_ref = None;
            }
        }
        result
    }
}
