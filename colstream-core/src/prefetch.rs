//! Background prefetching of range elements

use std::thread;

use crossbeam::channel;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::range::Range;

impl<T: Clone + Send + Sync + 'static> Range<T> {
    /// View of this range whose cursors compute up to `n` elements ahead.
    ///
    /// Every cursor spawns a producer thread that walks a cursor of this range
    /// and hands its items over a channel of capacity `n`. Items, errors and
    /// their order are those of this range. The producer stops once its
    /// cursor is dropped.
    pub fn buffered(&self, n: usize) -> Result<Range<T>> {
        if n == 0 {
            return Err(Error::InvalidArgument("prefetch depth must be at least 1".into()));
        }
        let parent = self.clone();
        Ok(Range::try_from_fn(self.extent(), move || {
            let (sender, receiver) = channel::bounded(n);
            let items = parent.create();
            thread::Builder::new()
                .name("colstream-prefetch".into())
                .spawn(move || {
                    let mut sent = 0usize;
                    for item in items {
                        if sender.send(item).is_err() {
                            trace!(sent, "prefetch cursor dropped");
                            return;
                        }
                        sent += 1;
                    }
                    debug!(sent, "prefetch exhausted");
                })?;
            Ok(receiver.into_iter())
        }))
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::range::{Extent, Range};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    /// Unbounded counter range recording how many items were produced
    fn counted() -> (Range<usize>, Arc<AtomicUsize>) {
        let produced = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&produced);
        let range = Range::from_fn(Extent::Unbounded, move || {
            let counter = Arc::clone(&counter);
            (0..).map(move |i| {
                counter.fetch_add(1, Ordering::SeqCst);
                i
            })
        });
        (range, produced)
    }

    fn wait_for(produced: &AtomicUsize, at_least: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while produced.load(Ordering::SeqCst) < at_least && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_buffered_keeps_elements() {
        let data = Range::from_vec(vec![1, 2, 3, 4, 5]);
        let buffered = data.buffered(2).unwrap();
        assert_eq!(buffered.len(), Some(5));
        assert_eq!(buffered.collect_vec().unwrap(), vec![1, 2, 3, 4, 5]);
        assert_eq!(buffered.collect_vec().unwrap(), vec![1, 2, 3, 4, 5]);
        assert_eq!(buffered.at(-1).unwrap(), 5);
        assert_eq!(buffered.slice(Some(1), Some(3)).unwrap().collect_vec().unwrap(), vec![2, 3]);
    }

    #[test]
    fn test_buffered_reads_ahead_within_depth() {
        let (range, produced) = counted();
        let buffered = range.buffered(3).unwrap();
        let mut cursor = buffered.create();
        assert_eq!(cursor.next().unwrap().unwrap(), 0);

        // one consumed, three queued
        wait_for(&produced, 4);
        assert!(produced.load(Ordering::SeqCst) >= 4);
        thread::sleep(Duration::from_millis(20));
        // plus at most one held by the blocked producer
        assert!(produced.load(Ordering::SeqCst) <= 5);

        assert_eq!(cursor.next().unwrap().unwrap(), 1);
    }

    #[test]
    fn test_dropped_cursor_stops_producer() {
        let (range, produced) = counted();
        let buffered = range.buffered(1).unwrap();
        let first = buffered.create().next().unwrap().unwrap();
        assert_eq!(first, 0);

        thread::sleep(Duration::from_millis(20));
        let settled = produced.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(produced.load(Ordering::SeqCst), settled);
    }

    #[test]
    fn test_buffered_forwards_error_once() {
        let failing: Range<i32> = Range::try_from_fn(Extent::Unknown, || {
            Ok(vec![Ok(1), Err(Error::InvalidArgument("bad record".into())), Ok(3)].into_iter())
        });
        let mut cursor = failing.buffered(4).unwrap().create();
        assert_eq!(cursor.next().unwrap().unwrap(), 1);
        assert!(matches!(cursor.next(), Some(Err(Error::InvalidArgument(_)))));
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_zero_depth_is_rejected() {
        let data = Range::from_vec(vec![1]);
        assert!(matches!(data.buffered(0), Err(Error::InvalidArgument(_))));
    }
}
