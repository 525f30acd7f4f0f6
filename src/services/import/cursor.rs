//! Client-carried batch cursor arithmetic
//!
//! The worker keeps no import state between requests. Each batch call carries
//! the cursor from the previous response; this module turns those attributes
//! into page offsets and decides when the session is done.

use crate::types::CursorAttributes;

/// Working cursor for one batch call
#[derive(Debug, Clone)]
pub struct ImportCursor {
    pub current_page: i64,
    pub rows_count: Option<i64>,
    pub is_first_batch: bool,
    page_size: i64,
}

impl ImportCursor {
    /// Build a cursor from wire attributes, clamping out-of-range values
    pub fn from_attributes(attrs: &CursorAttributes, page_size: i64) -> Self {
        Self {
            current_page: attrs.current_page.max(1),
            rows_count: attrs.rows_count.filter(|count| *count >= 0),
            is_first_batch: attrs.is_first_batch,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> i64 {
        self.page_size
    }

    /// 0-based row offset of this page
    pub fn offset(&self) -> i64 {
        self.page_size * (self.current_page - 1)
    }

    /// Record the total row count. Computed once per session; later batches
    /// carry it in and this call is a no-op.
    pub fn record_rows_count(&mut self, count: i64) {
        if self.rows_count.is_none() {
            self.rows_count = Some(count);
        }
    }

    /// Whether the session is complete. Evaluated before reading any rows,
    /// so the call after the last working batch becomes the finishing call.
    pub fn is_finished(&self) -> bool {
        match self.rows_count {
            Some(count) => self.offset() >= count,
            None => false,
        }
    }

    /// 1-based inclusive row range of this page, capped at the total
    pub fn row_range(&self) -> (i64, i64) {
        let total = self.rows_count.unwrap_or(0);
        let start = (self.offset() + 1).min(total.max(1));
        let end = (self.offset() + self.page_size).min(total);
        (start, end.max(start - 1))
    }

    /// Move to the next page after a processed batch
    pub fn advance(&mut self) {
        self.current_page += 1;
        self.is_first_batch = false;
    }

    /// Wire attributes to hand back to the client
    pub fn attributes(&self) -> CursorAttributes {
        CursorAttributes {
            current_page: self.current_page,
            rows_count: self.rows_count,
            is_first_batch: self.is_first_batch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(page: i64, rows: Option<i64>, first: bool) -> CursorAttributes {
        CursorAttributes {
            current_page: page,
            rows_count: rows,
            is_first_batch: first,
        }
    }

    #[test]
    fn test_offset_follows_page_and_size() {
        let cursor = ImportCursor::from_attributes(&attrs(1, Some(25), true), 10);
        assert_eq!(cursor.offset(), 0);
        let cursor = ImportCursor::from_attributes(&attrs(3, Some(25), false), 10);
        assert_eq!(cursor.offset(), 20);
    }

    #[test]
    fn test_page_below_one_clamps() {
        let cursor = ImportCursor::from_attributes(&attrs(0, None, true), 10);
        assert_eq!(cursor.current_page, 1);
        let cursor = ImportCursor::from_attributes(&attrs(-5, None, true), 10);
        assert_eq!(cursor.offset(), 0);
    }

    #[test]
    fn test_session_of_25_rows_takes_three_batches_and_a_finishing_call() {
        // 25 rows, page size 10: pages 1..3 do work, page 4 reports finished
        let mut cursor = ImportCursor::from_attributes(&attrs(1, None, true), 10);
        cursor.record_rows_count(25);

        let mut working_batches = 0;
        while !cursor.is_finished() {
            working_batches += 1;
            cursor.advance();
        }
        assert_eq!(working_batches, 3);
        assert_eq!(cursor.current_page, 4);
        assert!(cursor.is_finished());
    }

    #[test]
    fn test_unknown_rows_count_is_never_finished() {
        let cursor = ImportCursor::from_attributes(&attrs(5, None, true), 10);
        assert!(!cursor.is_finished());
    }

    #[test]
    fn test_empty_source_finishes_immediately() {
        let mut cursor = ImportCursor::from_attributes(&attrs(1, None, true), 10);
        cursor.record_rows_count(0);
        assert!(cursor.is_finished());
    }

    #[test]
    fn test_rows_count_is_recorded_once() {
        let mut cursor = ImportCursor::from_attributes(&attrs(2, Some(25), false), 10);
        cursor.record_rows_count(99);
        assert_eq!(cursor.rows_count, Some(25));
    }

    #[test]
    fn test_row_range_caps_at_total() {
        let cursor = ImportCursor::from_attributes(&attrs(3, Some(25), false), 10);
        assert_eq!(cursor.row_range(), (21, 25));
        let cursor = ImportCursor::from_attributes(&attrs(1, Some(25), true), 10);
        assert_eq!(cursor.row_range(), (1, 10));
    }

    #[test]
    fn test_advance_clears_first_batch_flag() {
        let mut cursor = ImportCursor::from_attributes(&attrs(1, Some(25), true), 10);
        cursor.advance();
        assert_eq!(cursor.current_page, 2);
        assert!(!cursor.is_first_batch);

        let wire = cursor.attributes();
        assert_eq!(wire.current_page, 2);
        assert_eq!(wire.rows_count, Some(25));
        assert!(!wire.is_first_batch);
    }
}
