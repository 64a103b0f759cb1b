use pageserver_common::{Page, PAGE_SIZE};

use crate::record::{RedoLogBody, RedoLogRecord};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    #[error("write out of bounds: offset={offset} len={len} page_len={page_len}")]
    WriteOutOfBounds {
        offset: usize,
        len: usize,
        page_len: usize,
    },
}

/// Execute one decoded record against a page buffer in place.
///
/// Bounds are checked before any byte is written, so a failing record never
/// partially mutates the page.
pub fn apply(page: &mut Page, record: &RedoLogRecord) -> Result<(), ApplyError> {
    match &record.body {
        RedoLogBody::FreePage => {
            page.fill(0);
        }
        RedoLogBody::InitPage { .. } => {
            page.fill(0);
            page[24..26].copy_from_slice(&0u16.to_le_bytes());
        }
        RedoLogBody::Write { offset, data } => {
            let start = *offset as usize;
            let end = start + data.len();
            check_bounds(start, data.len(), end)?;
            page[start..end].copy_from_slice(data);
        }
        RedoLogBody::MemSet {
            offset,
            data_len,
            pattern,
        } => {
            let start = *offset as usize;
            let len = *data_len as usize;
            let end = start + len;
            check_bounds(start, len, end)?;
            if pattern.is_empty() {
                page[start..end].fill(0);
            } else {
                for i in 0..len {
                    page[start + i] = pattern[i % pattern.len()];
                }
            }
        }
        RedoLogBody::MemMove {
            offset,
            data_len,
            source_off,
        } => {
            let dest = *offset as usize;
            let len = *data_len as usize;
            let dest_end = dest + len;
            check_bounds(dest, len, dest_end)?;

            let source = dest as i64 + *source_off as i64;
            if source < 0 {
                return Err(ApplyError::WriteOutOfBounds {
                    offset: dest,
                    len,
                    page_len: PAGE_SIZE,
                });
            }
            let source = source as usize;
            let source_end = source + len;
            check_bounds(source, len, source_end)?;

            // `copy_within` handles overlapping forward/backward ranges
            // correctly (memmove semantics), so overlap needs no special
            // casing here.
            page.copy_within(source..source_end, dest);
        }
        RedoLogBody::Extended { .. } => {
            tracing::debug!("extended redo subtype applied as no-op");
        }
        RedoLogBody::Option => {
            tracing::debug!("option redo record applied as no-op");
        }
    }

    Ok(())
}

fn check_bounds(offset: usize, len: usize, end: usize) -> Result<(), ApplyError> {
    if end > PAGE_SIZE {
        return Err(ApplyError::WriteOutOfBounds {
            offset,
            len,
            page_len: PAGE_SIZE,
        });
    }
    Ok(())
}
