//! Single-pass filters: sources, per-item transforms and windowing.
//!
//! None of these need more than one thread; stateful ones (`reverse`,
//! `last`, `drop_last`, `uniq`) keep their state inside one run.

use crate::channel::{Input, Output};
use crate::error::{FilterError, Result};
use crate::filter::{Filter, filter_fn};
use crate::sort::column;
use regex::Regex;
use std::collections::VecDeque;

/// Emits a fixed list of items. Input is ignored.
pub struct Items {
    items: Vec<String>,
}

impl Filter for Items {
    fn run(&self, _input: &Input, output: &Output) -> Result<()> {
        for s in &self.items {
            output.send(s.as_str())?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "items"
    }
}

/// Emit `items` in order.
pub fn items<I, S>(items: I) -> Items
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Items {
        items: items.into_iter().map(Into::into).collect(),
    }
}

/// Emit the integers `x..=y`.
pub fn numbers(x: i64, y: i64) -> impl Filter {
    filter_fn("numbers", move |_input, output| {
        for i in x..=y {
            output.send(i.to_string())?;
        }
        Ok(())
    })
}

/// Emit `item` `n` times.
pub fn repeat(item: &str, n: usize) -> impl Filter + use<> {
    let item = item.to_string();
    filter_fn("repeat", move |_input, output| {
        for _ in 0..n {
            output.send(item.as_str())?;
        }
        Ok(())
    })
}

/// Emit `f(x)` for every item `x`.
pub fn map<F>(f: F) -> impl Filter
where
    F: Fn(String) -> String + Send + Sync,
{
    filter_fn("map", move |input, output| {
        for s in input {
            output.send(f(s))?;
        }
        Ok(())
    })
}

/// Emit every item for which `pred` holds.
pub fn keep_if<F>(pred: F) -> impl Filter
where
    F: Fn(&str) -> bool + Send + Sync,
{
    filter_fn("keep_if", move |input, output| {
        for s in input {
            if pred(&s) {
                output.send(s)?;
            }
        }
        Ok(())
    })
}

fn compiled(re: &std::result::Result<Regex, regex::Error>) -> Result<&Regex> {
    re.as_ref().map_err(|e| FilterError::Regex(e.clone()))
}

/// Emit every item matching the regular expression `pattern`.
///
/// An invalid pattern does not panic here; the filter reports the regex
/// error when it runs.
pub fn grep(pattern: &str) -> impl Filter + use<> {
    let re = Regex::new(pattern);
    filter_fn("grep", move |input, output| {
        let re = compiled(&re)?;
        for s in input {
            if re.is_match(&s) {
                output.send(s)?;
            }
        }
        Ok(())
    })
}

/// Emit every item that does not match `pattern`.
pub fn grep_not(pattern: &str) -> impl Filter + use<> {
    let re = Regex::new(pattern);
    filter_fn("grep_not", move |input, output| {
        let re = compiled(&re)?;
        for s in input {
            if !re.is_match(&s) {
                output.send(s)?;
            }
        }
        Ok(())
    })
}

/// Replace every match of `pattern` with `replacement`. The replacement may
/// refer to capture groups as `$1`, `$name`, ...
pub fn substitute(pattern: &str, replacement: &str) -> impl Filter + use<> {
    let re = Regex::new(pattern);
    let replacement = replacement.to_string();
    filter_fn("substitute", move |input, output| {
        let re = compiled(&re)?;
        for s in input {
            output.send(re.replace_all(&s, replacement.as_str()).into_owned())?;
        }
        Ok(())
    })
}

/// Squash runs of adjacent identical items into one.
pub fn uniq() -> impl Filter {
    filter_fn("uniq", |input, output| {
        let mut last: Option<String> = None;
        for s in input {
            if last.as_deref() != Some(s.as_str()) {
                output.send(s.as_str())?;
            }
            last = Some(s);
        }
        Ok(())
    })
}

/// Squash runs of adjacent identical items into `"<count> <item>"`.
pub fn uniq_with_count() -> impl Filter {
    filter_fn("uniq_with_count", |input, output| {
        let mut current: Option<(String, usize)> = None;
        for s in input {
            if let Some((item, count)) = current.as_mut()
                && *item == s
            {
                *count += 1;
                continue;
            }
            if let Some((item, count)) = current.replace((s, 1)) {
                output.send(format!("{count} {item}"))?;
            }
        }
        if let Some((item, count)) = current {
            output.send(format!("{count} {item}"))?;
        }
        Ok(())
    })
}

/// Emit all items in reverse order.
pub fn reverse() -> impl Filter {
    filter_fn("reverse", |input, output| {
        let data: Vec<String> = input.iter().collect();
        for s in data.into_iter().rev() {
            output.send(s)?;
        }
        Ok(())
    })
}

/// Emit the first `n` items.
pub fn first(n: usize) -> impl Filter {
    filter_fn("first", move |input, output| {
        // Whatever is left unread gets drained by the engine.
        for s in input.iter().take(n) {
            output.send(s)?;
        }
        Ok(())
    })
}

/// Emit the last `n` items.
pub fn last(n: usize) -> impl Filter {
    filter_fn("last", move |input, output| {
        let mut buf = VecDeque::new();
        for s in input {
            if n == 0 {
                continue;
            }
            if buf.len() == n {
                buf.pop_front();
            }
            buf.push_back(s);
        }
        for s in buf {
            output.send(s)?;
        }
        Ok(())
    })
}

/// Emit everything except the first `n` items.
pub fn drop_first(n: usize) -> impl Filter {
    filter_fn("drop_first", move |input, output| {
        for s in input.iter().skip(n) {
            output.send(s)?;
        }
        Ok(())
    })
}

/// Emit everything except the last `n` items.
pub fn drop_last(n: usize) -> impl Filter {
    filter_fn("drop_last", move |input, output| {
        let mut buf = VecDeque::new();
        for s in input {
            buf.push_back(s);
            if buf.len() > n
                && let Some(oldest) = buf.pop_front()
            {
                output.send(oldest)?;
            }
        }
        Ok(())
    })
}

/// Prefix each item with its 1-based position, right-aligned to five
/// columns, and a space.
pub fn number_lines() -> impl Filter {
    filter_fn("number_lines", |input, output| {
        for (line, s) in (1u64..).zip(input) {
            output.send(format!("{line:5} {s}"))?;
        }
        Ok(())
    })
}

/// Emit the given whitespace-separated columns of each item, joined by
/// single spaces. Columns are numbered from 1; missing ones are skipped.
pub fn columns(cols: &[usize]) -> impl Filter + use<> {
    let cols = cols.to_vec();
    filter_fn("columns", move |input, output| {
        if let Some(c) = cols.iter().find(|&&c| c == 0) {
            return Err(FilterError::invalid(format!("invalid column number {c}")));
        }
        for s in input {
            let picked: Vec<&str> = cols.iter().filter_map(|&c| column(&s, c)).collect();
            output.send(picked.join(" "))?;
        }
        Ok(())
    })
}

/// Emit bytes `start..end` of each item. Offsets past the end are clamped;
/// a range that splits a character yields the empty string.
pub fn slice(start: usize, end: usize) -> impl Filter {
    filter_fn("slice", move |input, output| {
        for s in input {
            let len = s.len();
            let (from, to) = (start.min(len), end.min(len));
            let part = if from < to { s.get(from..to).unwrap_or("") } else { "" };
            output.send(part)?;
        }
        Ok(())
    })
}
