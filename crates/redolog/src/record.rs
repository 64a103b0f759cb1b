/// One parsed physical redo-log record.
///
/// `space_id`/`page_no` are resolved at parse time — either read fresh from
/// the wire or inherited from the parser's `last_page` when `same_page` is
/// set — so callers never need to know about the header's compression
/// trick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedoLogRecord {
    pub same_page: bool,
    pub space_id: u32,
    pub page_no: u32,
    pub body: RedoLogBody,
}

/// Per-type payload. A tagged sum type rather than a flat struct with
/// optional fields, so a WRITE can't accidentally carry a MEMMOVE's
/// `source_off`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedoLogBody {
    FreePage,
    InitPage {
        offset: u16,
    },
    Write {
        offset: u16,
        data: Vec<u8>,
    },
    MemSet {
        offset: u16,
        data_len: u32,
        pattern: Vec<u8>,
    },
    MemMove {
        offset: u16,
        data_len: u32,
        source_off: i32,
    },
    Extended {
        subtype: u8,
    },
    Option,
}

impl RedoLogRecord {
    /// The page offset this record targets, where that's meaningful.
    pub fn offset(&self) -> Option<u16> {
        match &self.body {
            RedoLogBody::FreePage | RedoLogBody::Extended { .. } | RedoLogBody::Option => None,
            RedoLogBody::InitPage { offset }
            | RedoLogBody::Write { offset, .. }
            | RedoLogBody::MemSet { offset, .. }
            | RedoLogBody::MemMove { offset, .. } => Some(*offset),
        }
    }
}
