//! Filters that read and write line-oriented files and streams.

use crate::channel::{Input, Output};
use crate::error::{FilterError, Result};
use crate::filter::Filter;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

fn copy_input(input: &Input, output: &Output) -> Result<()> {
    for s in input {
        output.send(s)?;
    }
    Ok(())
}

/// Call `f` with each line of `reader`, without its `\n` or `\r\n`.
/// Bytes that are not valid UTF-8 are replaced with U+FFFD instead of
/// failing the read.
pub(crate) fn each_line(
    mut reader: impl BufRead,
    mut f: impl FnMut(String) -> Result<()>,
) -> Result<()> {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        f(String::from_utf8_lossy(&buf).into_owned())?;
    }
}

fn send_lines(reader: impl BufRead, output: &Output) -> Result<usize> {
    let mut count = 0;
    each_line(reader, |line| {
        output.send(line)?;
        count += 1;
        Ok(())
    })?;
    Ok(count)
}

/// Copies input, then the lines of a list of files. See [`cat`].
pub struct Cat {
    paths: Vec<PathBuf>,
}

/// Pass the input through, then emit every line of each file in `paths`.
/// A file that cannot be opened or read is skipped and the rest are still
/// emitted; the filter then fails with the first such error and its path.
pub fn cat<I, P>(paths: I) -> Cat
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    Cat {
        paths: paths.into_iter().map(Into::into).collect(),
    }
}

fn send_file(path: &Path, output: &Output) -> Result<usize> {
    let with_path = |source| FilterError::File {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(with_path)?;
    send_lines(BufReader::new(file), output).map_err(|err| match err {
        FilterError::Io(source) => with_path(source),
        other => other,
    })
}

impl Filter for Cat {
    fn run(&self, input: &Input, output: &Output) -> Result<()> {
        copy_input(input, output)?;
        let mut failed = None;
        for path in &self.paths {
            match send_file(path, output) {
                Ok(lines) => tracing::trace!(path = %path.display(), lines, "read file"),
                Err(FilterError::ChannelClosed) => return Err(FilterError::ChannelClosed),
                Err(err) => {
                    tracing::debug!(error = %err, "skipping file");
                    failed.get_or_insert(err);
                }
            }
        }
        failed.map_or(Ok(()), Err)
    }

    fn name(&self) -> &str {
        "cat"
    }
}

/// Copies input, then the lines of a reader. See [`read_lines`].
pub struct ReadLines<R> {
    reader: Mutex<Option<R>>,
}

/// Pass the input through, then emit each line of `reader`.
///
/// The reader can only be consumed once: if the filter runs again it just
/// passes its input through.
pub fn read_lines<R: BufRead + Send>(reader: R) -> ReadLines<R> {
    ReadLines {
        reader: Mutex::new(Some(reader)),
    }
}

impl<R: BufRead + Send> Filter for ReadLines<R> {
    fn run(&self, input: &Input, output: &Output) -> Result<()> {
        copy_input(input, output)?;
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(reader) = reader {
            send_lines(reader, output)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "read_lines"
    }
}

/// Writes every item to a writer and passes it on. See [`write_lines`].
pub struct WriteLines<W> {
    writer: Mutex<W>,
}

/// Write each item followed by a newline to `writer`, and also emit it.
///
/// After a write error nothing more is written, but items keep flowing to
/// the output; the filter then fails with that first write error.
///
/// ```
/// use linepipe::{items, write_lines, Sequence};
///
/// let out = Sequence::new()
///     .then(items(["written", "and passed on"]))
///     .then(write_lines(std::io::sink()))
///     .contents()
///     .unwrap();
/// assert_eq!(out.len(), 2);
/// ```
pub fn write_lines<W: Write + Send>(writer: W) -> WriteLines<W> {
    WriteLines {
        writer: Mutex::new(writer),
    }
}

impl<W: Write + Send> Filter for WriteLines<W> {
    fn run(&self, input: &Input, output: &Output) -> Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut written = Ok(());
        for s in input {
            if written.is_ok() {
                written = writeln!(writer, "{s}");
            }
            output.send(s)?;
        }
        written.and_then(|()| writer.flush())?;
        Ok(())
    }

    fn name(&self) -> &str {
        "write_lines"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Sequence;
    use crate::stage::items;
    use std::io::Cursor;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// A writer whose contents stay readable after the filter owns it.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_cat_passes_input_then_files() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, "one\ntwo\n").unwrap();
        std::fs::write(&b, "three").unwrap();

        let out = Sequence::new()
            .then(items(["zero"]))
            .then(cat([&a, &b]))
            .contents()
            .unwrap();
        assert_eq!(out, vec!["zero", "one", "two", "three"]);
    }

    #[test]
    fn test_cat_missing_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.txt");
        let err = Sequence::new().then(cat([&missing])).run().unwrap_err();
        match err {
            FilterError::File { path, .. } => assert_eq!(path, missing),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cat_continues_past_missing_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.txt");
        let present = dir.path().join("present.txt");
        std::fs::write(&present, "still here\n").unwrap();

        let mut seen = Vec::new();
        let err = Sequence::new()
            .then(cat([&missing, &present]))
            .for_each(|s| seen.push(s))
            .unwrap_err();
        assert_eq!(seen, vec!["still here"]);
        match err {
            FilterError::File { path, .. } => assert_eq!(path, missing),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_lines_keep_invalid_utf8() {
        let out = Sequence::new()
            .then(read_lines(Cursor::new(b"ok\r\nbad \xff byte\nlast".to_vec())))
            .contents()
            .unwrap();
        assert_eq!(out, vec!["ok", "bad \u{FFFD} byte", "last"]);
    }

    #[test]
    fn test_read_lines_consumed_once() {
        let filter = read_lines(Cursor::new("x\ny\n"));
        let (first, second) = {
            let seq = Sequence::new().then(items(["in"])).then(filter);
            (seq.contents().unwrap(), seq.contents().unwrap())
        };
        assert_eq!(first, vec!["in", "x", "y"]);
        assert_eq!(second, vec!["in"]);
    }

    #[test]
    fn test_write_lines_tees() {
        let buf = SharedBuf::default();
        let out = Sequence::new()
            .then(items(["hello", "world"]))
            .then(write_lines(buf.clone()))
            .contents()
            .unwrap();
        assert_eq!(out, vec!["hello", "world"]);
        assert_eq!(&*buf.0.lock().unwrap(), b"hello\nworld\n");
    }

    /// Accepts `limit` writes, then fails every one after.
    struct FailingWriter {
        limit: usize,
    }

    impl Write for FailingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.limit == 0 {
                return Err(std::io::Error::other("disk full"));
            }
            self.limit -= 1;
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_lines_keeps_forwarding_after_write_error() {
        let mut seen = Vec::new();
        let err = Sequence::new()
            .then(items(["a", "b", "c"]))
            .then(write_lines(FailingWriter { limit: 1 }))
            .for_each(|s| seen.push(s))
            .unwrap_err();
        assert_eq!(seen, vec!["a", "b", "c"]);
        assert_eq!(err.to_string(), "IO error: disk full");
    }

    #[test]
    fn test_write_lines_to_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");
        let file = File::create(&path).unwrap();
        Sequence::new()
            .then(items(["a", "b"]))
            .then(write_lines(file))
            .run()
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\nb\n");
    }
}
