//! # linepipe
//!
//! Unix-pipe style processing of string streams.
//!
//! A [`Filter`] reads items from an input channel and writes items to an
//! output channel. Filters are chained into a [`Sequence`], which runs every
//! filter as its own stage on its own thread, connected by bounded
//! channels, and reports the first error any stage returns.
//!
//! ## Overview
//!
//! - **Engine**: [`Sequence`], [`run`], [`for_each`], [`contents`]
//! - **Concurrency**: [`parallel_map`] keeps input order across a worker
//!   pool; [`parallel`] fans one filter out without ordering
//! - **Sampling**: [`sample`] (uniform reservoir) and [`hash_sample`]
//!   (deterministic)
//! - **Processes**: [`command`] pipes items through a program; [`xargs`]
//!   passes them as batched arguments
//! - **Everything else**: regex, windowing, sorting, file and directory
//!   sources
//!
//! ## Example
//!
//! ```
//! use linepipe::{grep, numbers, sort, Sequence};
//!
//! let out = Sequence::new()
//!     .then(numbers(1, 30))
//!     .then(grep("3"))
//!     .then(sort().num_decreasing(1))
//!     .contents()
//!     .unwrap();
//!
//! assert_eq!(out, vec!["30", "23", "13", "3"]);
//! ```

pub mod channel;
pub mod command;
pub mod dsl;
pub mod error;
pub mod filter;
pub mod find;
pub mod io;
pub mod parallel;
pub mod pipeline;
pub mod sample;
pub mod sort;
pub mod stage;

pub use channel::{CHANNEL_CAPACITY, Input, Output};
pub use command::{Command, DEFAULT_XARGS_BYTES, Xargs, command, xargs};
pub use dsl::{StageSpec, build_pipeline, execute_pipeline, parse_commands};
pub use error::{FilterError, Result};
pub use filter::{BoxedFilter, Filter, FilterFn, filter_fn};
pub use find::{Find, find};
pub use io::{cat, read_lines, write_lines};
pub use parallel::{parallel, parallel_map};
pub use pipeline::{ErrorBox, Sequence, contents, for_each, run, sequence};
pub use sample::{hash_sample, sample, sample_with_seed};
pub use sort::{Sorter, sort};
pub use stage::{
    columns, drop_first, drop_last, first, grep, grep_not, items, keep_if, last, map,
    number_lines, numbers, repeat, reverse, slice, substitute, uniq, uniq_with_count,
};
