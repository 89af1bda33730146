//! The `Filter` trait and the closure adapter used by most built-in filters.

use crate::channel::{Input, Output};
use crate::error::Result;

/// A unit of computation that reads a sequence of items and produces
/// another.
///
/// `run` reads from `input` and writes to `output`. It must not try to
/// close `output`; the engine does that once `run` returns. Any state a
/// filter accumulates (a reservoir, a sort buffer) lives inside a single
/// call to `run`, so one filter value can be run any number of times and
/// from several threads at once.
pub trait Filter: Send + Sync {
    /// Consume `input` and emit to `output`. Returns an error instead of
    /// panicking when something goes wrong.
    fn run(&self, input: &Input, output: &Output) -> Result<()>;

    /// Short name used in log output.
    fn name(&self) -> &str {
        "filter"
    }
}

/// An owned, type-erased filter, as stored by a [`Sequence`](crate::Sequence).
pub type BoxedFilter = Box<dyn Filter>;

/// Adapter that turns a closure into a [`Filter`].
pub struct FilterFn<F> {
    name: &'static str,
    f: F,
}

impl<F> Filter for FilterFn<F>
where
    F: Fn(&Input, &Output) -> Result<()> + Send + Sync,
{
    fn run(&self, input: &Input, output: &Output) -> Result<()> {
        (self.f)(input, output)
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Wrap a closure as a named filter.
///
/// ```
/// use linepipe::{filter_fn, items, Sequence};
///
/// let repeat = |n: usize| {
///     filter_fn("repeat", move |input, output| {
///         for s in input {
///             for _ in 0..n {
///                 output.send(s.clone())?;
///             }
///         }
///         Ok(())
///     })
/// };
///
/// let out = Sequence::new()
///     .then(items(["hello", "world"]))
///     .then(repeat(2))
///     .contents()
///     .unwrap();
/// assert_eq!(out, vec!["hello", "hello", "world", "world"]);
/// ```
pub fn filter_fn<F>(name: &'static str, f: F) -> FilterFn<F>
where
    F: Fn(&Input, &Output) -> Result<()> + Send + Sync,
{
    FilterFn { name, f }
}
