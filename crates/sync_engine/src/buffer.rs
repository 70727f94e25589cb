//! Per-source item buffer with cursor-cached nearest-timestamp lookup.
//!
//! Items are appended at the tail in arrival order. Two independent cursors
//! are kept:
//! - the lookup cursor caches the last nearest-neighbour position, so a tick
//!   that advances slowly through time costs amortized O(1)
//! - the frame-rate cursor remembers the baseline of the last rate estimate
//!
//! All state lives behind one lock so a device thread appending and the tick
//! thread looking up / cleaning never observe a half-moved cursor.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use contracts::{ContractError, DataItem, Result, NANOS_PER_SECOND};
use parking_lot::Mutex;
use tracing::{instrument, trace, warn};

struct BufferInner {
    items: VecDeque<Arc<DataItem>>,
    /// Lookup cursor (index into `items`)
    cursor: usize,
    /// Frame-rate baseline (index into `items`)
    rate_cursor: usize,
    /// Timestamp of the last resolved item, 0 if none
    last_resolved_ns: u64,
    next_frame_id: u64,
    last_appended_ns: Option<u64>,
    out_of_order_count: u64,
    rewind_count: u64,
}

/// Ordered per-source container of `DataItem`
pub struct SourceBuffer {
    inner: Mutex<BufferInner>,
}

impl fmt::Debug for SourceBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SourceBuffer")
            .field("len", &inner.items.len())
            .field("cursor", &inner.cursor)
            .field("rate_cursor", &inner.rate_cursor)
            .field("last_resolved_ns", &inner.last_resolved_ns)
            .finish()
    }
}

impl Default for SourceBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BufferInner {
                items: VecDeque::new(),
                cursor: 0,
                rate_cursor: 0,
                last_resolved_ns: 0,
                next_frame_id: 0,
                last_appended_ns: None,
                out_of_order_count: 0,
                rewind_count: 0,
            }),
        }
    }

    /// Append an item at the tail
    ///
    /// Stamps the next frame id, so frame ids are strictly increasing in
    /// append order even with several producer threads. Items whose
    /// timestamp is earlier than their predecessor are kept (they may still
    /// need saving) but counted as out of order.
    ///
    /// # Errors
    /// `InvalidArgument` if the item carries no acquisition timestamp.
    pub fn append(&self, mut item: DataItem) -> Result<Arc<DataItem>> {
        if item.timestamp_ns() == 0 {
            return Err(ContractError::invalid_argument(
                "item carries no acquisition timestamp",
            ));
        }

        let mut inner = self.inner.lock();

        let timestamp = item.timestamp_ns();
        if let Some(last) = inner.last_appended_ns {
            if timestamp < last {
                inner.out_of_order_count += 1;
                warn!(
                    timestamp_ns = timestamp,
                    previous_ns = last,
                    "item appended out of timestamp order"
                );
            }
        }
        inner.last_appended_ns = Some(timestamp);

        item.set_frame_id(inner.next_frame_id);
        inner.next_frame_id += 1;

        let item = Arc::new(item);
        inner.items.push_back(Arc::clone(&item));

        if inner.items.len() == 1 {
            inner.cursor = 0;
            inner.rate_cursor = 0;
        }

        Ok(item)
    }

    /// Find the item closest to `requested_ns`
    ///
    /// Walks the lookup cursor forward while it is older than the request,
    /// then picks between the cursor and its predecessor: closest wins, ties
    /// favour the later sample. Running off the end pins the cursor to the
    /// last item. A request behind the cursor's predecessor (scrubbing
    /// backwards) repositions the cursor by binary search first.
    ///
    /// Returns `None` and resets the resolved time to 0 if empty.
    #[instrument(level = "trace", name = "source_buffer_nearest_to", skip(self))]
    pub fn nearest_to(&self, requested_ns: u64) -> Option<Arc<DataItem>> {
        let mut inner = self.inner.lock();

        if inner.items.is_empty() {
            inner.last_resolved_ns = 0;
            return None;
        }

        let len = inner.items.len();
        let mut index = inner.cursor.min(len - 1);

        if index > 0 && inner.items[index - 1].timestamp_ns() > requested_ns {
            index = inner
                .items
                .partition_point(|item| item.timestamp_ns() < requested_ns)
                .min(len - 1);
            inner.rewind_count += 1;
            trace!(requested_ns, index, "lookup cursor rewound");
        }

        while index < len && inner.items[index].timestamp_ns() < requested_ns {
            index += 1;
        }

        if index == len {
            index = len - 1;
        } else if index > 0 {
            let after = inner.items[index].timestamp_ns().abs_diff(requested_ns);
            let before = inner.items[index - 1].timestamp_ns().abs_diff(requested_ns);
            if before < after {
                index -= 1;
            }
        }

        inner.cursor = index;
        let item = Arc::clone(&inner.items[index]);
        inner.last_resolved_ns = item.timestamp_ns();
        Some(item)
    }

    /// Estimate the frame rate (Hz) between the frame-rate cursor and the tail
    ///
    /// Returns `None` without touching the cursor when fewer than two items
    /// are buffered, the cursor already is the tail, or the tail is not newer
    /// than the cursor. On success the cursor moves to the tail.
    pub fn estimate_frame_rate(&self) -> Option<f64> {
        let mut inner = self.inner.lock();

        let len = inner.items.len();
        if len < 2 {
            return None;
        }

        let tail = len - 1;
        if inner.rate_cursor >= tail {
            return None;
        }

        let base = &inner.items[inner.rate_cursor];
        let last = &inner.items[tail];
        if last.timestamp_ns() <= base.timestamp_ns() {
            return None;
        }

        let elapsed_ns = (last.timestamp_ns() - base.timestamp_ns()) as f64;
        let frames = (last.frame_id() - base.frame_id()) as f64;
        let rate = NANOS_PER_SECOND as f64 / (elapsed_ns / frames);

        inner.rate_cursor = tail;
        Some(rate)
    }

    /// Remove old items from the head, keeping at least `min_retain`
    ///
    /// Stops at the first item that must be kept: not yet persisted while
    /// required to be, or not strictly older than the last resolved
    /// timestamp. Returns the number of items removed.
    pub fn clean(&self, min_retain: usize) -> usize {
        let mut inner = self.inner.lock();
        let cutoff = inner.last_resolved_ns;
        let mut removed = 0;

        while inner.items.len() > min_retain {
            let Some(front) = inner.items.front() else {
                break;
            };
            if !front.is_disposable() || front.timestamp_ns() >= cutoff {
                break;
            }
            inner.items.pop_front();
            inner.cursor = inner.cursor.saturating_sub(1);
            inner.rate_cursor = inner.rate_cursor.saturating_sub(1);
            removed += 1;
        }

        removed
    }

    /// Drop every item, returns how many were dropped
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let dropped = inner.items.len();
        inner.items.clear();
        inner.cursor = 0;
        inner.rate_cursor = 0;
        inner.last_resolved_ns = 0;
        inner.last_appended_ns = None;
        dropped
    }

    /// Items required to be saved and not yet saved, oldest first
    pub fn pending_save(&self) -> Vec<Arc<DataItem>> {
        let inner = self.inner.lock();
        inner
            .items
            .iter()
            .filter(|item| item.needs_saving())
            .cloned()
            .collect()
    }

    /// Withdraw the save requirement from every unsaved item
    pub fn release_unsaved(&self) -> usize {
        let inner = self.inner.lock();
        let mut released = 0;
        for item in inner.items.iter().filter(|item| item.needs_saving()) {
            item.set_should_be_saved(false);
            released += 1;
        }
        released
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Timestamp of the head item
    pub fn first_timestamp(&self) -> Option<u64> {
        self.inner.lock().items.front().map(|i| i.timestamp_ns())
    }

    /// Timestamp of the tail item
    pub fn last_timestamp(&self) -> Option<u64> {
        self.inner.lock().items.back().map(|i| i.timestamp_ns())
    }

    /// Timestamp of the last resolved item, 0 if none
    pub fn last_resolved_ns(&self) -> u64 {
        self.inner.lock().last_resolved_ns
    }

    /// Current lookup cursor index
    pub fn cursor_position(&self) -> usize {
        self.inner.lock().cursor
    }

    /// Number of backward repositionings of the lookup cursor
    pub fn rewind_count(&self) -> u64 {
        self.inner.lock().rewind_count
    }

    /// Number of items appended with a timestamp earlier than their predecessor
    pub fn out_of_order_count(&self) -> u64 {
        self.inner.lock().out_of_order_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use contracts::Payload;

    fn make_item(timestamp_ns: u64) -> DataItem {
        DataItem::new(timestamp_ns, 1_000, Payload::Raw { data: Bytes::new() })
    }

    fn buffer_with(timestamps: &[u64]) -> SourceBuffer {
        let buffer = SourceBuffer::new();
        for &ts in timestamps {
            buffer.append(make_item(ts)).unwrap();
        }
        buffer
    }

    #[test]
    fn test_append_assigns_frame_ids() {
        let buffer = SourceBuffer::new();
        let a = buffer.append(make_item(10)).unwrap();
        let b = buffer.append(make_item(20)).unwrap();
        assert_eq!(a.frame_id(), 0);
        assert_eq!(b.frame_id(), 1);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_append_rejects_missing_timestamp() {
        let buffer = SourceBuffer::new();
        let err = buffer.append(make_item(0)).unwrap_err();
        assert!(matches!(err, ContractError::InvalidArgument { .. }));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_nearest_empty_buffer() {
        let buffer = SourceBuffer::new();
        assert!(buffer.nearest_to(100).is_none());
        assert_eq!(buffer.last_resolved_ns(), 0);
    }

    #[test]
    fn test_nearest_tie_favours_later() {
        let buffer = buffer_with(&[100, 200, 300]);
        let item = buffer.nearest_to(150).unwrap();
        assert_eq!(item.timestamp_ns(), 200);
        assert_eq!(buffer.cursor_position(), 1);
    }

    #[test]
    fn test_nearest_picks_closest() {
        let buffer = buffer_with(&[100, 200, 300]);
        assert_eq!(buffer.nearest_to(140).unwrap().timestamp_ns(), 100);
        assert_eq!(buffer.nearest_to(160).unwrap().timestamp_ns(), 200);
        assert_eq!(buffer.nearest_to(260).unwrap().timestamp_ns(), 300);
    }

    #[test]
    fn test_nearest_before_head_and_past_tail() {
        let buffer = buffer_with(&[100, 200, 300]);
        assert_eq!(buffer.nearest_to(5).unwrap().timestamp_ns(), 100);
        assert_eq!(buffer.nearest_to(10_000).unwrap().timestamp_ns(), 300);
        assert_eq!(buffer.cursor_position(), 2);
    }

    #[test]
    fn test_nearest_matches_linear_scan() {
        let timestamps: Vec<u64> = (1..=50).map(|i| i * 37 + (i % 7) * 3).collect();
        let buffer = buffer_with(&timestamps);

        for q in (0..2_000).step_by(11) {
            let expected = timestamps
                .iter()
                .enumerate()
                .min_by(|(ia, a), (ib, b)| {
                    a.abs_diff(q)
                        .cmp(&b.abs_diff(q))
                        .then_with(|| ib.cmp(ia))
                })
                .map(|(_, ts)| *ts)
                .unwrap();
            assert_eq!(buffer.nearest_to(q).unwrap().timestamp_ns(), expected, "q={q}");
        }
    }

    #[test]
    fn test_cursor_never_moves_back_for_increasing_requests() {
        let timestamps: Vec<u64> = (1..=100).map(|i| i * 10).collect();
        let buffer = buffer_with(&timestamps);

        let mut last_cursor = 0;
        for q in (0..1_100).step_by(3) {
            buffer.nearest_to(q);
            let cursor = buffer.cursor_position();
            assert!(cursor >= last_cursor);
            last_cursor = cursor;
        }
        assert_eq!(buffer.rewind_count(), 0);
    }

    #[test]
    fn test_scrub_backwards_repositions_cursor() {
        let buffer = buffer_with(&[100, 200, 300, 400, 500]);
        assert_eq!(buffer.nearest_to(480).unwrap().timestamp_ns(), 500);
        assert_eq!(buffer.nearest_to(190).unwrap().timestamp_ns(), 200);
        assert_eq!(buffer.rewind_count(), 1);
        assert_eq!(buffer.nearest_to(90).unwrap().timestamp_ns(), 100);
    }

    #[test]
    fn test_frame_rate_estimate() {
        let buffer = buffer_with(&[1000, 2000, 3000]);
        let rate = buffer.estimate_frame_rate().unwrap();
        assert!((rate - 1_000_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_frame_rate_guards() {
        let buffer = buffer_with(&[1000]);
        assert!(buffer.estimate_frame_rate().is_none());

        buffer.append(make_item(2000)).unwrap();
        assert!(buffer.estimate_frame_rate().is_some());
        // Cursor now equals the tail.
        assert!(buffer.estimate_frame_rate().is_none());

        // Identical timestamp: tail is not newer than the baseline.
        buffer.append(make_item(2000)).unwrap();
        assert!(buffer.estimate_frame_rate().is_none());

        buffer.append(make_item(4000)).unwrap();
        let rate = buffer.estimate_frame_rate().unwrap();
        // 2 frames over 2000ns
        assert!((rate - 1_000_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_clean_respects_min_retain() {
        let buffer = buffer_with(&[100, 200, 300, 400, 500]);
        buffer.nearest_to(10_000);

        let removed = buffer.clean(3);
        assert_eq!(removed, 2);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.first_timestamp(), Some(300));
    }

    #[test]
    fn test_clean_keeps_current_and_newer() {
        let buffer = buffer_with(&[100, 200, 300, 400, 500]);
        buffer.nearest_to(310);

        let removed = buffer.clean(1);
        assert_eq!(removed, 2);
        assert_eq!(buffer.first_timestamp(), Some(300));
        // Cursor still points at the resolved item.
        assert_eq!(buffer.nearest_to(310).unwrap().timestamp_ns(), 300);
    }

    #[test]
    fn test_clean_stops_at_unsaved_item() {
        let buffer = SourceBuffer::new();
        let first = buffer.append(make_item(100)).unwrap();
        let second = buffer.append(make_item(200)).unwrap();
        buffer.append(make_item(300)).unwrap();
        buffer.append(make_item(400)).unwrap();
        first.set_should_be_saved(false);
        second.set_should_be_saved(true);

        buffer.nearest_to(400);
        let removed = buffer.clean(1);
        assert_eq!(removed, 1);
        assert_eq!(buffer.first_timestamp(), Some(200));

        second.mark_saved("200.json");
        assert_eq!(buffer.clean(1), 2);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_clean_without_resolution_removes_nothing() {
        let buffer = buffer_with(&[100, 200, 300]);
        assert_eq!(buffer.clean(0), 0);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_out_of_order_detection() {
        let buffer = buffer_with(&[100, 300, 200]);
        assert_eq!(buffer.out_of_order_count(), 1);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_pending_and_release() {
        let buffer = SourceBuffer::new();
        let a = buffer.append(make_item(100)).unwrap();
        let b = buffer.append(make_item(200)).unwrap();
        a.set_should_be_saved(true);
        b.set_should_be_saved(true);
        b.mark_saved("200.json");

        let pending = buffer.pending_save();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].timestamp_ns(), 100);

        assert_eq!(buffer.release_unsaved(), 1);
        assert!(buffer.pending_save().is_empty());
    }
}
