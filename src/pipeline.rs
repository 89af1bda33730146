//! The staged pipeline engine.
//!
//! A [`Sequence`] runs each of its filters as a separate stage on its own
//! thread, connecting neighbouring stages with bounded channels. The
//! drivers [`run`], [`for_each`] and [`contents`] feed an empty, closed
//! input to a filter and consume whatever comes out the other end.
//!
//! # Stage lifecycle
//!
//! When a stage's filter returns, the stage:
//! 1. records the error, if any, in the run's [`ErrorBox`];
//! 2. drops its output sender, closing the channel for the next stage;
//! 3. drains whatever is left on its input.
//!
//! Step 3 keeps an upstream producer from blocking forever on a full
//! channel after a downstream stage has stopped reading. There is no
//! cancellation: a failed stage's siblings run until they finish on their
//! own and their output is discarded.
//!
//! # Errors
//!
//! Only the first error recorded during a run is reported. Stages run
//! concurrently, so "first" means first to take the `ErrorBox` lock, which
//! is not necessarily the earliest stage in the pipeline.

use crate::channel::{self, CHANNEL_CAPACITY, Input, Output};
use crate::error::{FilterError, Result};
use crate::filter::{BoxedFilter, Filter};
use std::sync::{Mutex, PoisonError};
use std::thread;

/// Holds the first error reported during one pipeline run.
///
/// Once set the slot is never overwritten; later errors are logged and
/// dropped.
#[derive(Debug, Default)]
pub struct ErrorBox {
    first: Mutex<Option<FilterError>>,
}

impl ErrorBox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `err` unless an earlier error is already held.
    pub fn record(&self, err: FilterError) {
        let mut slot = self.first.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(err);
        } else {
            tracing::debug!(error = %err, "discarding error reported after the first");
        }
    }

    /// Whether an error has been recorded.
    pub fn is_set(&self) -> bool {
        self.first
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Consume the box, yielding the recorded error if there is one.
    pub fn into_result(self) -> Result<()> {
        match self
            .first
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Run one stage to completion: execute the filter, record its error,
/// close its output, then drain its input.
fn run_stage(filter: &dyn Filter, input: Input, output: Output, errors: &ErrorBox) {
    tracing::trace!(stage = filter.name(), "stage started");

    if let Err(err) = filter.run(&input, &output) {
        tracing::debug!(stage = filter.name(), error = %err, "stage failed");
        errors.record(err);
    }
    drop(output);

    let discarded = input.drain();
    if discarded > 0 {
        tracing::trace!(stage = filter.name(), discarded, "drained unread input");
    }
    tracing::trace!(stage = filter.name(), "stage finished");
}

/// An ordered chain of filters that is itself a filter.
///
/// The output of each filter is fed as input to the next.
///
/// ```
/// use linepipe::{grep, numbers, Sequence};
///
/// let out = Sequence::new()
///     .then(numbers(1, 25))
///     .then(grep("3"))
///     .contents()
///     .unwrap();
/// assert_eq!(out, vec!["3", "13", "23"]);
/// ```
#[derive(Default)]
pub struct Sequence {
    stages: Vec<BoxedFilter>,
}

impl Sequence {
    /// An empty sequence, which copies its input to its output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter, builder style.
    pub fn then(mut self, filter: impl Filter + 'static) -> Self {
        self.stages.push(Box::new(filter));
        self
    }

    /// Append an already boxed filter.
    pub fn push(&mut self, filter: BoxedFilter) {
        self.stages.push(filter);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Names of the stages, in order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run the sequence against an empty input and discard the output.
    pub fn run(&self) -> Result<()> {
        for_each(self, |_| {})
    }

    /// Run the sequence against an empty input, calling `f` for every
    /// output item.
    pub fn for_each(&self, f: impl FnMut(String)) -> Result<()> {
        for_each(self, f)
    }

    /// Run the sequence against an empty input and collect the output.
    /// On error no items are returned.
    pub fn contents(&self) -> Result<Vec<String>> {
        let mut items = Vec::new();
        for_each(self, |s| items.push(s))?;
        Ok(items)
    }
}

impl FromIterator<BoxedFilter> for Sequence {
    fn from_iter<I: IntoIterator<Item = BoxedFilter>>(iter: I) -> Self {
        Self {
            stages: iter.into_iter().collect(),
        }
    }
}

impl Filter for Sequence {
    fn run(&self, input: &Input, output: &Output) -> Result<()> {
        let errors = ErrorBox::new();

        thread::scope(|s| {
            let mut upstream = input.clone();
            for stage in &self.stages {
                let (stage_output, next) = channel::bounded(CHANNEL_CAPACITY);
                let stage_input = std::mem::replace(&mut upstream, next);
                let errors = &errors;
                s.spawn(move || run_stage(stage.as_ref(), stage_input, stage_output, errors));
            }

            for item in upstream.iter() {
                if let Err(err) = output.send(item) {
                    errors.record(err);
                    upstream.drain();
                    break;
                }
            }
        });

        errors.into_result()
    }

    fn name(&self) -> &str {
        "sequence"
    }
}

/// Compose filters into a single [`Sequence`].
pub fn sequence(filters: impl IntoIterator<Item = BoxedFilter>) -> Sequence {
    filters.into_iter().collect()
}

/// Run `filter` against an empty input, calling `f` for every item it
/// produces, and return the first error any stage reported.
pub fn for_each(filter: &dyn Filter, mut f: impl FnMut(String)) -> Result<()> {
    let errors = ErrorBox::new();

    thread::scope(|s| {
        let (output, results) = channel::bounded(CHANNEL_CAPACITY);
        let errors = &errors;
        s.spawn(move || run_stage(filter, channel::closed(), output, errors));
        for item in results.iter() {
            f(item);
        }
    });

    errors.into_result()
}

/// Chain `filters`, run them against an empty input and discard the output.
pub fn run(filters: impl IntoIterator<Item = BoxedFilter>) -> Result<()> {
    sequence(filters).run()
}

/// Chain `filters`, run them against an empty input and collect the
/// output. If any stage fails the partial output is discarded and only the
/// error is returned.
pub fn contents(filters: impl IntoIterator<Item = BoxedFilter>) -> Result<Vec<String>> {
    sequence(filters).contents()
}
