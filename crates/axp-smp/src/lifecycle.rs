/// A core's run state (spec §3 "Lifecycle"). `HaltedForced` is reached
/// via an operator-initiated stop; `HaltedFaulted` via an unrecoverable
/// trap the driver chose not to handle (e.g. a double machine check).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CoreStatus {
    Idle,
    Running,
    Paused,
    Halted,
    HaltedForced,
    HaltedFaulted,
}

impl CoreStatus {
    pub fn is_halted(self) -> bool {
        matches!(self, CoreStatus::Halted | CoreStatus::HaltedForced | CoreStatus::HaltedFaulted)
    }
}
