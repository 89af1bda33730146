//! Filters that run external programs.
//!
//! Items travel to and from processes one per line: each item is written
//! to stdin followed by a newline, and each line of stdout (newline
//! stripped) becomes an output item. Stderr is inherited.

use crate::channel::{Input, Output};
use crate::error::{FilterError, Result};
use crate::filter::Filter;
use crate::io::each_line;
use std::io::{self, BufReader, BufWriter, Write};
use std::panic;
use std::process::{ChildStdin, ChildStdout, Stdio};
use std::thread;

/// Default byte ceiling for one [`Xargs`] invocation's command line.
pub const DEFAULT_XARGS_BYTES: usize = 4096;

/// Write every input item to the child's stdin. A child that exits without
/// reading everything is not an error.
fn feed(stdin: ChildStdin, input: &Input) -> Result<()> {
    let mut writer = BufWriter::new(stdin);
    let written = input
        .iter()
        .try_for_each(|s| writeln!(writer, "{s}"))
        .and_then(|()| writer.flush());
    match written {
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other.map_err(FilterError::from),
    }
}

/// Emit each line of the child's stdout, replacing invalid UTF-8. Once the
/// output is closed the rest of stdout is still read so the child is not
/// blocked writing.
fn forward(stdout: ChildStdout, output: &Output) -> Result<()> {
    let mut sent = Ok(());
    each_line(BufReader::new(stdout), |line| {
        if sent.is_ok() {
            sent = output.send(line);
        }
        Ok(())
    })?;
    sent
}

/// Spawn `program`, stream `input` (if any) to its stdin and its stdout to
/// `output`, then wait for it to exit.
fn run_process(
    program: &str,
    args: &[String],
    input: Option<&Input>,
    output: &Output,
) -> Result<()> {
    tracing::debug!(program, ?args, "spawning process");

    let mut child = std::process::Command::new(program)
        .args(args)
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|source| FilterError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let streamed = thread::scope(|s| {
        let writer = match (stdin, input) {
            (Some(stdin), Some(input)) => Some(s.spawn(move || feed(stdin, input))),
            _ => None,
        };
        let read = match stdout {
            Some(stdout) => forward(stdout, output),
            None => Ok(()),
        };
        let fed = match writer {
            Some(handle) => handle.join().unwrap_or_else(|payload| panic::resume_unwind(payload)),
            None => Ok(()),
        };
        read.and(fed)
    });

    let status = child.wait()?;
    streamed?;
    if !status.success() {
        return Err(FilterError::CommandFailed {
            program: program.to_string(),
            status,
        });
    }
    tracing::trace!(program, "process finished");
    Ok(())
}

/// Pipe items through one invocation of an external program.
pub struct Command {
    program: String,
    args: Vec<String>,
}

/// Run `program` with `args`, feeding it the input items on stdin and
/// emitting the lines it prints. A spawn failure or a non-zero exit status
/// is the filter's error.
///
/// ```no_run
/// use linepipe::{command, items, Sequence};
///
/// let out = Sequence::new()
///     .then(items(["b", "a"]))
///     .then(command("sort", &[]))
///     .contents()
///     .unwrap();
/// assert_eq!(out, vec!["a", "b"]);
/// ```
pub fn command(program: &str, args: &[&str]) -> Command {
    Command {
        program: program.to_string(),
        args: args.iter().map(|a| a.to_string()).collect(),
    }
}

impl Filter for Command {
    fn run(&self, input: &Input, output: &Output) -> Result<()> {
        run_process(&self.program, &self.args, Some(input), output)
    }

    fn name(&self) -> &str {
        "command"
    }
}

/// Accumulates items into batches that fit one command line.
struct Batcher {
    overhead: usize,
    limit_bytes: usize,
    limit_args: Option<usize>,
    bytes: usize,
    batch: Vec<String>,
}

impl Batcher {
    fn new(overhead: usize, limit_bytes: usize, limit_args: Option<usize>) -> Self {
        Self {
            overhead,
            limit_bytes,
            limit_args,
            bytes: overhead,
            batch: Vec::new(),
        }
    }

    /// Add `item`, returning the batch that has to run first if `item`
    /// does not fit alongside it. An item too large on its own still gets
    /// a batch to itself.
    fn push(&mut self, item: String) -> Option<Vec<String>> {
        let len = item.len() + 1;
        let full = !self.batch.is_empty()
            && (self.bytes + len > self.limit_bytes
                || self.limit_args.is_some_and(|n| self.batch.len() >= n));
        let flushed = full.then(|| {
            self.bytes = self.overhead;
            std::mem::take(&mut self.batch)
        });
        self.bytes += len;
        self.batch.push(item);
        flushed
    }

    /// The final partial batch, if any items are left.
    fn finish(self) -> Option<Vec<String>> {
        (!self.batch.is_empty()).then_some(self.batch)
    }
}

/// Batched invocation of an external program. See [`xargs`].
pub struct Xargs {
    program: String,
    args: Vec<String>,
    limit_args: Option<usize>,
    limit_bytes: usize,
}

/// Run `program` with `args` followed by as many input items as fit,
/// repeating until the input is used up. Invocations get no stdin; their
/// stdout lines are emitted in order.
///
/// A batch is cut when the next item would push the command line past
/// [`limit_bytes`](Xargs::limit_bytes) (each item counts its length plus a
/// separator) or when it already holds [`limit_args`](Xargs::limit_args)
/// items.
pub fn xargs(program: &str, args: &[&str]) -> Xargs {
    Xargs {
        program: program.to_string(),
        args: args.iter().map(|a| a.to_string()).collect(),
        limit_args: None,
        limit_bytes: DEFAULT_XARGS_BYTES,
    }
}

impl Xargs {
    /// Pass at most `n` items to each invocation. 0 is treated as 1.
    pub fn limit_args(mut self, n: usize) -> Self {
        self.limit_args = Some(n.max(1));
        self
    }

    /// Keep each command line under `n` bytes where possible.
    pub fn limit_bytes(mut self, n: usize) -> Self {
        self.limit_bytes = n;
        self
    }

    fn overhead(&self) -> usize {
        self.program.len() + self.args.iter().map(|a| a.len() + 1).sum::<usize>()
    }

    fn invoke(&self, batch: Vec<String>, output: &Output) -> Result<()> {
        tracing::debug!(program = %self.program, items = batch.len(), "flushing xargs batch");
        let mut args = self.args.clone();
        args.extend(batch);
        run_process(&self.program, &args, None, output)
    }
}

impl Filter for Xargs {
    fn run(&self, input: &Input, output: &Output) -> Result<()> {
        let mut batcher = Batcher::new(self.overhead(), self.limit_bytes, self.limit_args);
        for s in input {
            if let Some(batch) = batcher.push(s) {
                self.invoke(batch, output)?;
            }
        }
        if let Some(batch) = batcher.finish() {
            self.invoke(batch, output)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "xargs"
    }
}
