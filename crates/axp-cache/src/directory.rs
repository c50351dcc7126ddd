use std::collections::HashMap;

use crate::line::LineState;

/// L3's view of a single line: who holds it and in what state. The
/// directory is the single source of truth for coherence; private caches
/// only ever hold a line in a state the directory has granted.
#[derive(Clone, Copy, Default)]
pub struct DirEntry {
    pub state: LineState,
    /// Bit `i` set means core `i` holds a valid copy. Exactly one bit set
    /// when `state == Modified`.
    pub sharers: u64,
}

#[derive(Default)]
pub struct Directory {
    pub entries: HashMap<u64, DirEntry>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }
}
