//! Concurrent filters backed by a fixed pool of worker threads.
//!
//! [`parallel_map`] applies a transform on N workers and restores input
//! order before anything reaches the output. [`parallel`] runs N copies of
//! an arbitrary filter against one shared input and output, with no order
//! guarantee.

use crate::channel::{CHANNEL_CAPACITY, Input, Output};
use crate::error::Result;
use crate::filter::Filter;
use crate::pipeline::ErrorBox;
use crossbeam_channel::Receiver;
use std::collections::HashMap;
use std::panic;
use std::sync::{Mutex, PoisonError};
use std::thread;

/// Results waiting for every earlier sequence number to be emitted.
#[derive(Default)]
struct Pending {
    next: u64,
    ready: HashMap<u64, String>,
}

impl Pending {
    /// Store one result, then emit every result that is now in order.
    fn publish(&mut self, seq: u64, value: String, output: &Output) -> Result<()> {
        self.ready.insert(seq, value);
        while let Some(value) = self.ready.remove(&self.next) {
            self.next += 1;
            output.send(value)?;
        }
        Ok(())
    }
}

/// Ordered concurrent map. See [`parallel_map`].
pub struct ParallelMap<F> {
    workers: usize,
    f: F,
}

/// Apply `f` to every item on `workers` threads, emitting results in input
/// order.
///
/// A reader thread numbers items as they arrive and feeds a bounded work
/// queue. Results that finish early wait in a pending map until their
/// predecessors are out, so one very slow item makes the map grow without
/// bound. A worker count of 0 is treated as 1.
///
/// ```
/// use linepipe::{numbers, parallel_map, Sequence};
///
/// let out = Sequence::new()
///     .then(numbers(1, 5))
///     .then(parallel_map(3, |s| format!("<{s}>")))
///     .contents()
///     .unwrap();
/// assert_eq!(out, vec!["<1>", "<2>", "<3>", "<4>", "<5>"]);
/// ```
pub fn parallel_map<F>(workers: usize, f: F) -> ParallelMap<F>
where
    F: Fn(String) -> String + Send + Sync,
{
    ParallelMap { workers, f }
}

impl<F> ParallelMap<F>
where
    F: Fn(String) -> String + Send + Sync,
{
    fn work(
        &self,
        queue: Receiver<(u64, String)>,
        pending: &Mutex<Pending>,
        output: &Output,
        errors: &ErrorBox,
    ) {
        for (seq, value) in queue.iter() {
            let result = (self.f)(value);
            let mut pending = pending.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(err) = pending.publish(seq, result, output) {
                errors.record(err);
            }
        }
    }
}

impl<F> Filter for ParallelMap<F>
where
    F: Fn(String) -> String + Send + Sync,
{
    fn run(&self, input: &Input, output: &Output) -> Result<()> {
        let workers = self.workers.max(1);
        tracing::debug!(workers, "parallel map started");

        let (work_tx, work_rx) = crossbeam_channel::bounded::<(u64, String)>(CHANNEL_CAPACITY);
        let pending = Mutex::new(Pending::default());
        let errors = ErrorBox::new();

        thread::scope(|s| {
            let reader = s.spawn(move || {
                for (seq, value) in (0u64..).zip(input) {
                    // Fails only once every worker has gone away.
                    if work_tx.send((seq, value)).is_err() {
                        break;
                    }
                }
            });

            let (pending, errors) = (&pending, &errors);
            let mut handles = vec![reader];
            for _ in 0..workers {
                let queue = work_rx.clone();
                handles.push(s.spawn(move || self.work(queue, pending, output, errors)));
            }
            drop(work_rx);

            let mut panicked = None;
            for handle in handles {
                if let Err(payload) = handle.join() {
                    panicked.get_or_insert(payload);
                }
            }
            if let Some(payload) = panicked {
                panic::resume_unwind(payload);
            }
        });

        errors.into_result()
    }

    fn name(&self) -> &str {
        "parallel_map"
    }
}

/// Unordered fan-out. See [`parallel`].
pub struct Parallel<T> {
    copies: usize,
    filter: T,
}

/// Run `copies` instances of `filter` concurrently, all reading the same
/// input and writing the same output. Each item is seen by exactly one
/// copy; the interleaving of their output is unspecified. A count of 0 is
/// treated as 1.
pub fn parallel<T: Filter>(copies: usize, filter: T) -> Parallel<T> {
    Parallel { copies, filter }
}

impl<T: Filter> Filter for Parallel<T> {
    fn run(&self, input: &Input, output: &Output) -> Result<()> {
        let errors = ErrorBox::new();
        thread::scope(|s| {
            for _ in 0..self.copies.max(1) {
                s.spawn(|| {
                    if let Err(err) = self.filter.run(input, output) {
                        errors.record(err);
                    }
                });
            }
        });
        errors.into_result()
    }

    fn name(&self) -> &str {
        "parallel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel;
    use crate::error::FilterError;
    use crate::filter::filter_fn;
    use crate::pipeline::Sequence;
    use crate::stage::{items, map, numbers};
    use proptest::prelude::*;
    use std::time::Duration;

    #[test]
    fn test_parallel_map_preserves_order() {
        // Later items finish first, so the pending map has to reorder them.
        let out = Sequence::new()
            .then(numbers(1, 200))
            .then(parallel_map(8, |s| {
                let n: u64 = s.parse().unwrap();
                thread::sleep(Duration::from_micros((200 - n) * 20 + (n % 7) * 100));
                s
            }))
            .contents()
            .unwrap();
        let expected: Vec<String> = (1..=200).map(|i| i.to_string()).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_parallel_map_single_worker() {
        let out = Sequence::new()
            .then(items(["a", "b", "c"]))
            .then(parallel_map(1, |s| s.to_uppercase()))
            .contents()
            .unwrap();
        assert_eq!(out, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_parallel_map_zero_workers() {
        let out = Sequence::new()
            .then(numbers(1, 3))
            .then(parallel_map(0, |s| s))
            .contents()
            .unwrap();
        assert_eq!(out, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_parallel_map_empty_input() {
        let out = Sequence::new()
            .then(parallel_map(4, |s| s))
            .contents()
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_parallel_map_more_items_than_queue() {
        let n = (CHANNEL_CAPACITY * 5) as i64;
        let out = Sequence::new()
            .then(numbers(1, n))
            .then(parallel_map(4, |s| s))
            .contents()
            .unwrap();
        assert_eq!(out.len(), n as usize);
        assert_eq!(out.last().map(String::as_str), Some("5000"));
    }

    #[test]
    #[should_panic(expected = "bad item")]
    fn test_parallel_map_reraises_worker_panic() {
        let (tx, input) = channel::bounded(4);
        tx.send("x").unwrap();
        drop(tx);
        let (output, _rx) = channel::bounded(4);
        let _ = parallel_map(2, |_| panic!("bad item")).run(&input, &output);
    }

    #[test]
    fn test_parallel_copies_see_each_item_once() {
        let mut out = Sequence::new()
            .then(numbers(1, 100))
            .then(parallel(4, map(|s| format!("{s}!"))))
            .contents()
            .unwrap();
        out.sort();
        let mut expected: Vec<String> = (1..=100).map(|i| format!("{i}!")).collect();
        expected.sort();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_parallel_reports_copy_error() {
        let result = Sequence::new()
            .then(numbers(1, 10))
            .then(parallel(
                3,
                filter_fn("fail", |_input, _output| Err(FilterError::invalid("copy failed"))),
            ))
            .run();
        assert_eq!(result.unwrap_err().to_string(), "invalid argument: copy failed");
    }

    proptest! {
        #[test]
        fn test_parallel_map_matches_sequential_map(
            input in prop::collection::vec("[a-z]{0,8}", 0..200),
            workers in 1usize..6,
        ) {
            let out = Sequence::new()
                .then(items(input.clone()))
                .then(parallel_map(workers, |s| s.chars().rev().collect()))
                .contents()
                .unwrap();
            let expected: Vec<String> = input.iter().map(|s| s.chars().rev().collect()).collect();
            prop_assert_eq!(out, expected);
        }
    }
}
