use super::BatchError;
use crate::portal::TileId;

/// Most tiles a single range may expand to
pub const MAX_BATCH_TILES: u64 = 1_000_000;

/// Contiguous run of numeric tile ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    start: u64,
    end: u64,
    inclusive: bool,
    len: u64,
}

impl TileRange {
    /// Rejects `start > end` and ranges over [`MAX_BATCH_TILES`] before anything else happens
    pub fn new(start: u64, end: u64, inclusive: bool) -> Result<Self, BatchError> {
        if start > end {
            return Err(BatchError::InvalidRange { start, end });
        }

        let span = end - start;
        let len = if inclusive { span.checked_add(1) } else { Some(span) };
        let too_large = BatchError::RangeTooLarge {
            start,
            end,
            max: MAX_BATCH_TILES,
        };
        match len {
            Some(len) if len <= MAX_BATCH_TILES => Ok(Self {
                start,
                end,
                inclusive,
                len,
            }),
            _ => Err(too_large),
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn tile_ids(&self) -> Vec<TileId> {
        if self.inclusive {
            (self.start..=self.end).map(TileId::from).collect()
        } else {
            (self.start..self.end).map(TileId::from).collect()
        }
    }
}
