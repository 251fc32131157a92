use super::EngineState;

/// Inputs that move the engine between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Pause,
    Resume,
    /// The countdown hit zero (or the host completed the interval).
    Expire,
    CheckIn,
    End,
}

/// `None` means the action is not valid from `current` and must be ignored.
pub fn next_state(current: EngineState, action: Action) -> Option<EngineState> {
    use EngineState::*;
    match (current, action) {
        (Idle, Action::Start) => Some(Running),
        (Running, Action::Pause) => Some(Paused),
        (Paused, Action::Resume) => Some(Running),
        (Running, Action::Expire) => Some(AwaitingCheckIn),
        (AwaitingCheckIn, Action::CheckIn) => Some(Running),
        (Running | Paused | AwaitingCheckIn, Action::End) => Some(Idle),
        _ => None,
    }
}
