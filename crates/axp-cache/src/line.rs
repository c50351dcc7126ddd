/// Coherence granularity for every cache level (spec §3/§4.8).
pub const LINE_SIZE: usize = 64;

/// MESI line state. Ordering matters nowhere; this is a plain tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LineState {
    #[default]
    Invalid,
    Shared,
    Exclusive,
    Modified,
}

/// One cache line: physical tag (line-aligned address), MESI state, and
/// the line's bytes. `valid` distinguishes an empty way from a stale one
/// left behind by silent invalidation.
#[derive(Clone, Copy)]
pub struct CacheLine {
    pub tag: u64,
    pub valid: bool,
    pub state: LineState,
    pub data: [u8; LINE_SIZE],
}

impl CacheLine {
    pub fn invalid() -> Self {
        Self {
            tag: 0,
            valid: false,
            state: LineState::Invalid,
            data: [0; LINE_SIZE],
        }
    }

    pub fn new(tag: u64, state: LineState, data: [u8; LINE_SIZE]) -> Self {
        Self {
            tag,
            valid: true,
            state,
            data,
        }
    }
}
