//! Sorting by a chain of column keys.

use crate::channel::{Input, Output};
use crate::error::Result;
use crate::filter::Filter;
use std::cmp::Ordering;

/// Return the `n`th whitespace-separated column of `s` (1-based), or the
/// whole of `s` when `n` is 0. `None` if `s` has fewer than `n` columns.
pub fn column(s: &str, n: usize) -> Option<&str> {
    match n {
        0 => Some(s),
        n => s.split_whitespace().nth(n - 1),
    }
}

type Comparator = Box<dyn Fn(&str, &str) -> Ordering + Send + Sync>;

/// Items that lack the column sort before items that have it.
fn compare_text(a: &str, b: &str, n: usize) -> Ordering {
    column(a, n).cmp(&column(b, n))
}

/// Missing columns sort first, then numbers in numeric order, then
/// columns that do not parse as numbers.
fn compare_num(a: &str, b: &str, n: usize) -> Ordering {
    match (column(a, n), column(b, n)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => match (x.parse::<f64>(), y.parse::<f64>()) {
            (Ok(x), Ok(y)) => x.total_cmp(&y),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => Ordering::Equal,
        },
    }
}

/// A sort filter built up from column keys.
///
/// Items are ordered by the first key; ties are broken by the next key,
/// and so on. Items equal under every key are ordered lexically.
///
/// ```
/// use linepipe::{items, sort, Sequence};
///
/// let out = Sequence::new()
///     .then(items(["1970 march", "1970 feb", "1950 june", "1980 sep"]))
///     .then(sort().num(1).text(2))
///     .contents()
///     .unwrap();
/// assert_eq!(out, vec!["1950 june", "1970 feb", "1970 march", "1980 sep"]);
/// ```
#[derive(Default)]
pub struct Sorter {
    keys: Vec<Comparator>,
}

/// Start a sort filter. With no keys, items are sorted lexically.
pub fn sort() -> Sorter {
    Sorter::default()
}

impl Sorter {
    fn key(mut self, cmp: impl Fn(&str, &str) -> Ordering + Send + Sync + 'static) -> Self {
        self.keys.push(Box::new(cmp));
        self
    }

    /// Order by column `n` lexically.
    pub fn text(self, n: usize) -> Self {
        self.key(move |a, b| compare_text(a, b, n))
    }

    /// Order by column `n` lexically, largest first.
    pub fn text_decreasing(self, n: usize) -> Self {
        self.key(move |a, b| compare_text(b, a, n))
    }

    /// Order by column `n` numerically.
    pub fn num(self, n: usize) -> Self {
        self.key(move |a, b| compare_num(a, b, n))
    }

    /// Order by column `n` numerically, largest first.
    pub fn num_decreasing(self, n: usize) -> Self {
        self.key(move |a, b| compare_num(b, a, n))
    }

    /// Order by a caller supplied "less than" predicate.
    pub fn by(self, less: impl Fn(&str, &str) -> bool + Send + Sync + 'static) -> Self {
        self.key(move |a, b| {
            if less(a, b) {
                Ordering::Less
            } else if less(b, a) {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        })
    }

    fn compare(&self, a: &str, b: &str) -> Ordering {
        self.keys
            .iter()
            .map(|key| key(a, b))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| a.cmp(b))
    }
}

impl Filter for Sorter {
    fn run(&self, input: &Input, output: &Output) -> Result<()> {
        let mut data: Vec<String> = input.iter().collect();
        data.sort_by(|a, b| self.compare(a, b));
        for s in data {
            output.send(s)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "sort"
    }
}
