//! DSL parser for pipeline files.
//!
//! Pipeline format (CMS Pipelines style):
//! ```text
//! PIPE NUMBERS 1 100
//! | LOCATE /3/
//! | SAMPLE 5 SEED 7
//! | SORT NUM 1
//! | CONSOLE
//! ?
//! ```
//!
//! - `PIPE <stage>` starts the pipeline
//! - `| <stage>` continues to the next stage
//! - `?` on its own line marks the end of the pipeline
//! - Lines starting with `#` are comments
//!
//! The first stage must be a source: CONSOLE, LITERAL, HOLE, NUMBERS, CAT,
//! FIND or EXEC. Whatever the last stage emits is the pipeline's output.
//!
//! Supported stages:
//! - `CONSOLE` - Read the input text (first), or pass items through
//! - `LITERAL text` - Emit `text`, then pass items through
//! - `HOLE` - Discard all input, output nothing
//! - `NUMBERS x y` - Emit the integers x to y
//! - `CAT path...` - Pass items through, then emit the lines of each file
//! - `FIND dir [FILES|DIRS|SYMLINKS]...` - Emit paths under dir
//! - `LOCATE /re/` / `NLOCATE /re/` - Keep items (not) matching a regex
//! - `CHANGE /re/ /replacement/` - Replace regex matches
//! - `UPPER` / `LOWER` - Change case
//! - `UNIQ [COUNT]` - Squash adjacent duplicates, optionally counting them
//! - `REVERSE` - Emit items in reverse order
//! - `TAKE n` / `SKIP n` / `LAST n` / `DROPLAST n` - Windowing
//! - `NUMBER` - Prefix items with their line number
//! - `COLUMNS c...` - Select whitespace-separated columns
//! - `SORT [TEXT n|TEXTDESC n|NUM n|NUMDESC n]...` - Sort by column keys
//! - `SAMPLE n [SEED s]` - Uniform random sample
//! - `HASHSAMPLE n` - Deterministic sample
//! - `EXEC prog args...` - Pipe items through a program
//! - `XARGS [LIMIT n] prog args...` - Run a program with items as arguments
//! - `PARALLEL n UPPER|LOWER` - Change case on n worker threads

use crate::command::{command, xargs};
use crate::error::{FilterError, Result};
use crate::filter::{BoxedFilter, Filter, filter_fn};
use crate::find::find;
use crate::io::cat;
use crate::parallel::parallel_map;
use crate::pipeline::Sequence;
use crate::sample::{hash_sample, sample, sample_with_seed};
use crate::sort::{Sorter, sort};
use crate::stage::{
    columns, drop_first, drop_last, first, grep, grep_not, items, last, map, number_lines,
    numbers, reverse, substitute, uniq, uniq_with_count,
};
use std::str::FromStr;

/// Execute a pipeline defined by DSL text, with `input_text` available to
/// a leading CONSOLE stage one line per item.
///
/// Returns the output items joined by newlines, and how many there were.
pub fn execute_pipeline(input_text: &str, pipeline_text: &str) -> Result<(String, usize)> {
    let pipeline = build_pipeline(input_text, pipeline_text)?;
    let output = pipeline.contents()?;
    Ok((output.join("\n"), output.len()))
}

/// Parse DSL text and assemble the stages into a [`Sequence`] without
/// running it.
pub fn build_pipeline(input_text: &str, pipeline_text: &str) -> Result<Sequence> {
    let commands = parse_commands(pipeline_text)?;

    let Some(first) = commands.first() else {
        return Err(FilterError::invalid("Pipeline is empty"));
    };
    if !first.can_be_first() {
        return Err(FilterError::invalid(format!(
            "{} cannot be the first stage (try CONSOLE, LITERAL, HOLE, NUMBERS, CAT, FIND or EXEC)",
            first.name()
        )));
    }

    let mut pipeline = Sequence::new();
    for (idx, cmd) in commands.iter().enumerate() {
        let stage: BoxedFilter = match cmd {
            StageSpec::Console if idx == 0 => Box::new(items(
                input_text.lines().filter(|line| !line.is_empty()),
            )),
            other => other.to_filter(),
        };
        pipeline.push(stage);
    }
    tracing::debug!(stages = ?pipeline.stage_names(), "built pipeline");
    Ok(pipeline)
}

/// Case conversion applied by UPPER, LOWER and PARALLEL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Case {
    Upper,
    Lower,
}

impl Case {
    fn apply(self, s: String) -> String {
        match self {
            Case::Upper => s.to_uppercase(),
            Case::Lower => s.to_lowercase(),
        }
    }
}

/// Node types accepted by FIND.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindKind {
    Files,
    Dirs,
    Symlinks,
}

/// One key of a SORT stage; the number is the 1-based column (0 = whole item).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Text(usize),
    TextDesc(usize),
    Num(usize),
    NumDesc(usize),
}

/// Parsed pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageSpec {
    /// CONSOLE - Read from input or pass through
    Console,
    /// LITERAL text - prepend a literal item
    Literal { text: String },
    /// HOLE - discard all input
    Hole,
    /// NUMBERS x y
    Numbers { from: i64, to: i64 },
    /// CAT path...
    Cat { paths: Vec<String> },
    /// FIND dir [FILES|DIRS|SYMLINKS]...
    Find { dir: String, kinds: Vec<FindKind> },
    /// LOCATE /re/
    Locate { pattern: String },
    /// NLOCATE /re/
    Nlocate { pattern: String },
    /// CHANGE /re/ /replacement/
    Change { pattern: String, replacement: String },
    /// UPPER or LOWER
    Case(Case),
    /// UNIQ [COUNT]
    Uniq { count: bool },
    /// REVERSE
    Reverse,
    /// TAKE n
    Take { n: usize },
    /// SKIP n
    Skip { n: usize },
    /// LAST n
    Last { n: usize },
    /// DROPLAST n
    DropLast { n: usize },
    /// NUMBER
    Number,
    /// COLUMNS c...
    Columns { cols: Vec<usize> },
    /// SORT [key n]...
    Sort { keys: Vec<SortKey> },
    /// SAMPLE n [SEED s]
    Sample { n: usize, seed: Option<u64> },
    /// HASHSAMPLE n
    HashSample { n: usize },
    /// EXEC prog args...
    Exec { program: String, args: Vec<String> },
    /// XARGS [LIMIT n] prog args...
    Xargs {
        limit: Option<usize>,
        program: String,
        args: Vec<String>,
    },
    /// PARALLEL n UPPER|LOWER
    Parallel { workers: usize, case: Case },
}

impl StageSpec {
    /// Can this stage be the first stage in a pipeline (source)?
    /// Sources generate items without needing upstream input.
    pub fn can_be_first(&self) -> bool {
        matches!(
            self,
            StageSpec::Console
                | StageSpec::Literal { .. }
                | StageSpec::Hole
                | StageSpec::Numbers { .. }
                | StageSpec::Cat { .. }
                | StageSpec::Find { .. }
                | StageSpec::Exec { .. }
        )
    }

    /// Get the stage name for error messages.
    pub fn name(&self) -> &'static str {
        match self {
            StageSpec::Console => "CONSOLE",
            StageSpec::Literal { .. } => "LITERAL",
            StageSpec::Hole => "HOLE",
            StageSpec::Numbers { .. } => "NUMBERS",
            StageSpec::Cat { .. } => "CAT",
            StageSpec::Find { .. } => "FIND",
            StageSpec::Locate { .. } => "LOCATE",
            StageSpec::Nlocate { .. } => "NLOCATE",
            StageSpec::Change { .. } => "CHANGE",
            StageSpec::Case(Case::Upper) => "UPPER",
            StageSpec::Case(Case::Lower) => "LOWER",
            StageSpec::Uniq { .. } => "UNIQ",
            StageSpec::Reverse => "REVERSE",
            StageSpec::Take { .. } => "TAKE",
            StageSpec::Skip { .. } => "SKIP",
            StageSpec::Last { .. } => "LAST",
            StageSpec::DropLast { .. } => "DROPLAST",
            StageSpec::Number => "NUMBER",
            StageSpec::Columns { .. } => "COLUMNS",
            StageSpec::Sort { .. } => "SORT",
            StageSpec::Sample { .. } => "SAMPLE",
            StageSpec::HashSample { .. } => "HASHSAMPLE",
            StageSpec::Exec { .. } => "EXEC",
            StageSpec::Xargs { .. } => "XARGS",
            StageSpec::Parallel { .. } => "PARALLEL",
        }
    }

    /// Build the filter for this stage when it is not reading the input
    /// text.
    pub fn to_filter(&self) -> BoxedFilter {
        match self {
            // An empty sequence copies its input.
            StageSpec::Console => Box::new(Sequence::new()),
            StageSpec::Literal { text } => Box::new(prepend(text)),
            StageSpec::Hole => Box::new(filter_fn("hole", |_input, _output| Ok(()))),
            StageSpec::Numbers { from, to } => Box::new(numbers(*from, *to)),
            StageSpec::Cat { paths } => Box::new(cat(paths)),
            StageSpec::Find { dir, kinds } => {
                let walker = kinds.iter().fold(find(dir), |walker, kind| match kind {
                    FindKind::Files => walker.files(),
                    FindKind::Dirs => walker.dirs(),
                    FindKind::Symlinks => walker.symlinks(),
                });
                Box::new(walker)
            }
            StageSpec::Locate { pattern } => Box::new(grep(pattern)),
            StageSpec::Nlocate { pattern } => Box::new(grep_not(pattern)),
            StageSpec::Change {
                pattern,
                replacement,
            } => Box::new(substitute(pattern, replacement)),
            StageSpec::Case(case) => {
                let case = *case;
                Box::new(map(move |s| case.apply(s)))
            }
            StageSpec::Uniq { count: false } => Box::new(uniq()),
            StageSpec::Uniq { count: true } => Box::new(uniq_with_count()),
            StageSpec::Reverse => Box::new(reverse()),
            StageSpec::Take { n } => Box::new(first(*n)),
            StageSpec::Skip { n } => Box::new(drop_first(*n)),
            StageSpec::Last { n } => Box::new(last(*n)),
            StageSpec::DropLast { n } => Box::new(drop_last(*n)),
            StageSpec::Number => Box::new(number_lines()),
            StageSpec::Columns { cols } => Box::new(columns(cols)),
            StageSpec::Sort { keys } => Box::new(sorter(keys)),
            StageSpec::Sample { n, seed: None } => Box::new(sample(*n)),
            StageSpec::Sample {
                n,
                seed: Some(seed),
            } => Box::new(sample_with_seed(*n, *seed)),
            StageSpec::HashSample { n } => Box::new(hash_sample(*n)),
            StageSpec::Exec { program, args } => Box::new(command(program, &as_strs(args))),
            StageSpec::Xargs {
                limit,
                program,
                args,
            } => {
                let stage = xargs(program, &as_strs(args));
                match limit {
                    Some(n) => Box::new(stage.limit_args(*n)),
                    None => Box::new(stage),
                }
            }
            StageSpec::Parallel { workers, case } => {
                let case = *case;
                Box::new(parallel_map(*workers, move |s| case.apply(s)))
            }
        }
    }
}

fn as_strs(args: &[String]) -> Vec<&str> {
    args.iter().map(String::as_str).collect()
}

fn sorter(keys: &[SortKey]) -> Sorter {
    keys.iter().fold(sort(), |sorter, key| match *key {
        SortKey::Text(n) => sorter.text(n),
        SortKey::TextDesc(n) => sorter.text_decreasing(n),
        SortKey::Num(n) => sorter.num(n),
        SortKey::NumDesc(n) => sorter.num_decreasing(n),
    })
}

/// Emit `text`, then copy the input.
fn prepend(text: &str) -> impl Filter + use<> {
    let text = text.to_string();
    filter_fn("literal", move |input, output| {
        output.send(text.as_str())?;
        for s in input {
            output.send(s)?;
        }
        Ok(())
    })
}

/// Parse DSL text into stages.
pub fn parse_commands(text: &str) -> Result<Vec<StageSpec>> {
    let mut commands = Vec::new();

    for (line_num, line) in text.lines().enumerate() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // "PIPE <stage>" opens the pipeline; a bare PIPE line is skipped.
        let line = strip_keyword(line, "PIPE").unwrap_or(line);

        // Continuation lines: "| <stage>"
        let line = line.strip_prefix('|').map(str::trim).unwrap_or(line);

        // Trailing pipe delimiter and explicit end of pipeline
        let line = line.trim_end_matches('|').trim();
        let line = line.trim_end_matches('?').trim();

        if line.is_empty() {
            continue;
        }

        let cmd = parse_command(line).map_err(|message| FilterError::Parse {
            line: line_num + 1,
            message,
        })?;
        commands.push(cmd);
    }

    Ok(commands)
}

/// If `line` starts with the word `keyword` (any case), return the rest.
fn strip_keyword<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let head = line.get(..keyword.len())?;
    let rest = &line[keyword.len()..];
    if head.eq_ignore_ascii_case(keyword) && (rest.is_empty() || rest.starts_with(char::is_whitespace))
    {
        Some(rest.trim())
    } else {
        None
    }
}

/// Parse a single stage line.
fn parse_command(line: &str) -> std::result::Result<StageSpec, String> {
    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map(|(word, rest)| (word, rest.trim()))
        .unwrap_or((line, ""));
    let args: Vec<&str> = rest.split_whitespace().collect();

    match word.to_ascii_uppercase().as_str() {
        "CONSOLE" => Ok(StageSpec::Console),
        "LITERAL" => parse_literal(rest),
        "HOLE" => Ok(StageSpec::Hole),
        "NUMBERS" => match args.as_slice() {
            [from, to] => Ok(StageSpec::Numbers {
                from: number(from, "NUMBERS")?,
                to: number(to, "NUMBERS")?,
            }),
            _ => Err("NUMBERS requires two numbers".to_string()),
        },
        "CAT" if args.is_empty() => Err("CAT requires at least one file".to_string()),
        "CAT" => Ok(StageSpec::Cat {
            paths: args.iter().map(|a| a.to_string()).collect(),
        }),
        "FIND" => parse_find(&args),
        "LOCATE" => {
            let (pattern, _) = parse_delimited_string(rest)?;
            Ok(StageSpec::Locate { pattern })
        }
        "NLOCATE" => {
            let (pattern, _) = parse_delimited_string(rest)?;
            Ok(StageSpec::Nlocate { pattern })
        }
        "CHANGE" => parse_change(rest),
        "UPPER" => Ok(StageSpec::Case(Case::Upper)),
        "LOWER" => Ok(StageSpec::Case(Case::Lower)),
        "UNIQ" => match args.as_slice() {
            [] => Ok(StageSpec::Uniq { count: false }),
            [opt] if opt.eq_ignore_ascii_case("COUNT") => Ok(StageSpec::Uniq { count: true }),
            _ => Err("UNIQ accepts only COUNT".to_string()),
        },
        "REVERSE" => Ok(StageSpec::Reverse),
        "TAKE" => Ok(StageSpec::Take {
            n: single_number(&args, "TAKE")?,
        }),
        "SKIP" => Ok(StageSpec::Skip {
            n: single_number(&args, "SKIP")?,
        }),
        "LAST" => Ok(StageSpec::Last {
            n: single_number(&args, "LAST")?,
        }),
        "DROPLAST" => Ok(StageSpec::DropLast {
            n: single_number(&args, "DROPLAST")?,
        }),
        "NUMBER" => Ok(StageSpec::Number),
        "COLUMNS" => parse_columns(&args),
        "SORT" => parse_sort(&args),
        "SAMPLE" => parse_sample(&args),
        "HASHSAMPLE" => Ok(StageSpec::HashSample {
            n: single_number(&args, "HASHSAMPLE")?,
        }),
        "EXEC" => match args.split_first() {
            Some((program, args)) => Ok(StageSpec::Exec {
                program: program.to_string(),
                args: args.iter().map(|a| a.to_string()).collect(),
            }),
            None => Err("EXEC requires a program".to_string()),
        },
        "XARGS" => parse_xargs(&args),
        "PARALLEL" => parse_parallel(&args),
        _ => Err(format!("Unknown command: {word}")),
    }
}

fn number<T: FromStr>(word: &str, stage: &str) -> std::result::Result<T, String> {
    word.parse()
        .map_err(|_| format!("{stage}: '{word}' is not a valid number"))
}

fn single_number<T: FromStr>(args: &[&str], stage: &str) -> std::result::Result<T, String> {
    match args {
        [n] => number(n, stage),
        _ => Err(format!("{stage} requires a number")),
    }
}

/// Parse a delimited string using CMS Pipelines convention.
/// The first non-blank character is the delimiter, and the string
/// continues until the next occurrence of that delimiter.
/// Returns (extracted_string, rest_of_input).
fn parse_delimited_string(s: &str) -> std::result::Result<(String, &str), String> {
    let s = s.trim_start();
    let Some(delim) = s.chars().next() else {
        return Err("Expected delimited string".to_string());
    };
    let after_delim = &s[delim.len_utf8()..];

    match after_delim.find(delim) {
        Some(end) => Ok((
            after_delim[..end].to_string(),
            &after_delim[end + delim.len_utf8()..],
        )),
        None => Err(format!("Unclosed delimiter '{delim}'")),
    }
}

/// CMS Pipelines: LITERAL does NOT use delimiters.
/// Everything after "LITERAL " is the literal text.
fn parse_literal(rest: &str) -> std::result::Result<StageSpec, String> {
    if rest.is_empty() {
        return Err("LITERAL requires text".to_string());
    }
    Ok(StageSpec::Literal {
        text: rest.to_string(),
    })
}

/// Both strings use their own leading character as delimiter:
/// `CHANGE /old/ /new/` or `CHANGE "old" "new"`.
fn parse_change(rest: &str) -> std::result::Result<StageSpec, String> {
    if rest.is_empty() {
        return Err("CHANGE requires two delimited strings".to_string());
    }
    let (pattern, after_first) = parse_delimited_string(rest)?;
    let (replacement, _) = parse_delimited_string(after_first)?;
    Ok(StageSpec::Change {
        pattern,
        replacement,
    })
}

fn parse_find(args: &[&str]) -> std::result::Result<StageSpec, String> {
    let Some((dir, kinds)) = args.split_first() else {
        return Err("FIND requires a directory".to_string());
    };
    let kinds = kinds
        .iter()
        .map(|kind| match kind.to_ascii_uppercase().as_str() {
            "FILES" => Ok(FindKind::Files),
            "DIRS" => Ok(FindKind::Dirs),
            "SYMLINKS" => Ok(FindKind::Symlinks),
            _ => Err(format!("FIND: unknown node type '{kind}'")),
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(StageSpec::Find {
        dir: dir.to_string(),
        kinds,
    })
}

fn parse_columns(args: &[&str]) -> std::result::Result<StageSpec, String> {
    if args.is_empty() {
        return Err("COLUMNS requires at least one column".to_string());
    }
    let cols = args
        .iter()
        .map(|c| number(c, "COLUMNS"))
        .collect::<std::result::Result<Vec<usize>, _>>()?;
    if cols.contains(&0) {
        return Err("COLUMNS numbers start at 1".to_string());
    }
    Ok(StageSpec::Columns { cols })
}

/// SORT followed by zero or more `<kind> <column>` pairs.
fn parse_sort(args: &[&str]) -> std::result::Result<StageSpec, String> {
    let mut keys = Vec::new();
    for pair in args.chunks(2) {
        let [kind, col] = pair else {
            return Err(format!("SORT: '{}' requires a column number", pair[0]));
        };
        let col = number(col, "SORT")?;
        let key = match kind.to_ascii_uppercase().as_str() {
            "TEXT" => SortKey::Text(col),
            "TEXTDESC" => SortKey::TextDesc(col),
            "NUM" => SortKey::Num(col),
            "NUMDESC" => SortKey::NumDesc(col),
            _ => return Err(format!("SORT: unknown key type '{kind}'")),
        };
        keys.push(key);
    }
    Ok(StageSpec::Sort { keys })
}

fn parse_sample(args: &[&str]) -> std::result::Result<StageSpec, String> {
    match args {
        [n] => Ok(StageSpec::Sample {
            n: number(n, "SAMPLE")?,
            seed: None,
        }),
        [n, kw, seed] if kw.eq_ignore_ascii_case("SEED") => Ok(StageSpec::Sample {
            n: number(n, "SAMPLE")?,
            seed: Some(number(seed, "SAMPLE")?),
        }),
        _ => Err("SAMPLE requires a count and an optional SEED".to_string()),
    }
}

fn parse_xargs(args: &[&str]) -> std::result::Result<StageSpec, String> {
    let (limit, rest) = match args {
        [kw, n, rest @ ..] if kw.eq_ignore_ascii_case("LIMIT") => {
            (Some(number(n, "XARGS")?), rest)
        }
        _ => (None, args),
    };
    match rest.split_first() {
        Some((program, args)) => Ok(StageSpec::Xargs {
            limit,
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }),
        None => Err("XARGS requires a program".to_string()),
    }
}

fn parse_parallel(args: &[&str]) -> std::result::Result<StageSpec, String> {
    let [workers, stage] = args else {
        return Err("PARALLEL requires a worker count and UPPER or LOWER".to_string());
    };
    let workers: usize = number(workers, "PARALLEL")?;
    if workers == 0 {
        return Err("PARALLEL worker count must be at least 1".to_string());
    }
    let case = match stage.to_ascii_uppercase().as_str() {
        "UPPER" => Case::Upper,
        "LOWER" => Case::Lower,
        _ => return Err(format!("PARALLEL cannot run '{stage}'")),
    };
    Ok(StageSpec::Parallel { workers, case })
}
