//! Directory tree walking.

use crate::channel::{Input, Output};
use crate::error::Result;
use crate::filter::Filter;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

type SkipPredicate = Box<dyn Fn(&Path) -> bool + Send + Sync>;

/// Emits the paths found under a directory. See [`find`].
pub struct Find {
    dir: PathBuf,
    files: bool,
    dirs: bool,
    symlinks: bool,
    skip: Vec<SkipPredicate>,
}

/// Walk `dir` recursively, emitting each path (starting with `dir` itself)
/// in file-name order. With no type restriction every node is emitted.
/// Input is ignored. A root that cannot be read fails the filter.
///
/// ```no_run
/// use linepipe::{find, Sequence};
///
/// let rust_files = Sequence::new()
///     .then(find("src").files())
///     .contents()
///     .unwrap();
/// ```
pub fn find(dir: impl Into<PathBuf>) -> Find {
    Find {
        dir: dir.into(),
        files: false,
        dirs: false,
        symlinks: false,
        skip: Vec::new(),
    }
}

impl Find {
    /// Emit regular files.
    pub fn files(mut self) -> Self {
        self.files = true;
        self
    }

    /// Emit directories.
    pub fn dirs(mut self) -> Self {
        self.dirs = true;
        self
    }

    /// Emit symbolic links. Links are never followed.
    pub fn symlinks(mut self) -> Self {
        self.symlinks = true;
        self
    }

    /// Do not descend into directories for which `pred` holds. The
    /// directory itself is still emitted if its type matches.
    pub fn skip_dir_if(mut self, pred: impl Fn(&Path) -> bool + Send + Sync + 'static) -> Self {
        self.skip.push(Box::new(pred));
        self
    }

    /// Do not descend into `dir`.
    pub fn skip_dir(self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.skip_dir_if(move |path| path == dir)
    }

    fn matches(&self, entry: &DirEntry) -> bool {
        let kind = entry.file_type();
        if !(self.files || self.dirs || self.symlinks) {
            return true;
        }
        (self.files && kind.is_file())
            || (self.dirs && kind.is_dir())
            || (self.symlinks && kind.is_symlink())
    }

    fn skipped(&self, entry: &DirEntry) -> bool {
        entry.file_type().is_dir() && self.skip.iter().any(|pred| pred(entry.path()))
    }
}

impl Filter for Find {
    fn run(&self, _input: &Input, output: &Output) -> Result<()> {
        let mut walk = WalkDir::new(&self.dir).sort_by_file_name().into_iter();
        while let Some(entry) = walk.next() {
            let entry = entry?;
            if self.matches(&entry) {
                output.send(entry.path().to_string_lossy())?;
            }
            if self.skipped(&entry) {
                tracing::trace!(dir = %entry.path().display(), "skipping directory");
                walk.skip_current_dir();
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "find"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FilterError;
    use crate::pipeline::Sequence;
    use std::fs;
    use tempfile::TempDir;

    /// root/
    ///   a.txt
    ///   sub/
    ///     b.txt
    ///     deeper/
    ///       c.txt
    ///   z.txt
    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("sub/deeper")).unwrap();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::write(root.join("z.txt"), "z").unwrap();
        fs::write(root.join("sub/b.txt"), "b").unwrap();
        fs::write(root.join("sub/deeper/c.txt"), "c").unwrap();
        dir
    }

    /// Walk results with the root prefix stripped.
    fn relative(dir: &TempDir, filter: Find) -> Vec<String> {
        let root = dir.path().to_string_lossy().into_owned();
        Sequence::new()
            .then(filter)
            .contents()
            .unwrap()
            .into_iter()
            .map(|p| p.strip_prefix(&root).unwrap_or(&p).to_string())
            .collect()
    }

    #[test]
    fn test_find_everything_in_name_order() {
        let dir = tree();
        let out = relative(&dir, find(dir.path()));
        assert_eq!(
            out,
            vec![
                "",
                "/a.txt",
                "/sub",
                "/sub/b.txt",
                "/sub/deeper",
                "/sub/deeper/c.txt",
                "/z.txt",
            ]
        );
    }

    #[test]
    fn test_find_files() {
        let dir = tree();
        let out = relative(&dir, find(dir.path()).files());
        assert_eq!(out, vec!["/a.txt", "/sub/b.txt", "/sub/deeper/c.txt", "/z.txt"]);
    }

    #[test]
    fn test_find_dirs() {
        let dir = tree();
        let out = relative(&dir, find(dir.path()).dirs());
        assert_eq!(out, vec!["", "/sub", "/sub/deeper"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_find_symlinks() {
        let dir = tree();
        std::os::unix::fs::symlink(dir.path().join("a.txt"), dir.path().join("link")).unwrap();
        let out = relative(&dir, find(dir.path()).symlinks());
        assert_eq!(out, vec!["/link"]);
    }

    #[test]
    fn test_find_skip_dir() {
        let dir = tree();
        let out = relative(&dir, find(dir.path()).skip_dir(dir.path().join("sub")));
        assert_eq!(out, vec!["", "/a.txt", "/sub", "/z.txt"]);
    }

    #[test]
    fn test_find_skip_dir_if() {
        let dir = tree();
        let filter = find(dir.path())
            .files()
            .skip_dir_if(|p| p.file_name().is_some_and(|n| n == "deeper"));
        let out = relative(&dir, filter);
        assert_eq!(out, vec!["/a.txt", "/sub/b.txt", "/z.txt"]);
    }

    #[test]
    fn test_find_missing_root() {
        let dir = TempDir::new().unwrap();
        let result = Sequence::new()
            .then(find(dir.path().join("nope")))
            .run();
        assert!(matches!(result, Err(FilterError::Walk(_))));
    }
}
