pub mod cache;
pub mod config;
pub mod parallel;

pub mod table {
    // Separator line
    fn sep(widths: &[usize]) -> String {
        let mut s = String::from("+");
        for w in widths {
            s.push_str(&"-".repeat(w + 2));
            s.push('+');
        }
        s
    }

    fn line(cells: &[String], widths: &[usize]) -> String {
        let mut s = String::from("|");
        for (cell, &w) in cells.iter().zip(widths) {
            s.push(' ');
            s.push_str(cell);
            s.push_str(&" ".repeat(w.saturating_sub(cell.chars().count())));
            s.push_str(" |");
        }
        s
    }

    /// Render an ASCII table. Short rows are padded with empty cells.
    #[must_use]
    pub fn render(headers: &[&str], rows: &[Vec<String>]) -> String {
        let cols = headers.len();
        let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
        for row in rows {
            for (c, w) in widths.iter_mut().enumerate() {
                *w = (*w).max(row.get(c).map_or(0, |s| s.chars().count()));
            }
        }

        let rule = sep(&widths);
        let header_cells: Vec<String> = headers.iter().map(|s| (*s).to_string()).collect();
        let mut out = vec![rule.clone(), line(&header_cells, &widths), rule.clone()];
        for row in rows {
            let cells: Vec<String> = (0..cols).map(|i| row.get(i).cloned().unwrap_or_default()).collect();
            out.push(line(&cells, &widths));
        }
        out.push(rule);
        out.join("\n")
    }
}

pub mod file_walker {
    use std::path::{Path, PathBuf};

    /// Discover parser fact documents (files ending in `suffix`) under `root`,
    /// honouring `.gitignore`/`.ignore` unless `no_ignore` is set. Sorted.
    #[must_use]
    pub fn fact_files(root: &Path, suffix: &str, no_ignore: bool) -> Vec<PathBuf> {
        let mut walker = ignore::WalkBuilder::new(root);
        walker
            .follow_links(false)
            .hidden(true)
            .git_ignore(!no_ignore)
            .git_global(false)
            .git_exclude(false)
            .ignore(!no_ignore)
            .parents(!no_ignore)
            .require_git(false);
        let mut out: Vec<PathBuf> = walker
            .build()
            .filter_map(|entry| match entry {
                Ok(e) => Some(e),
                Err(err) => {
                    tracing::warn!(error = %err, "Skipping unreadable path");
                    None
                }
            })
            .filter(|e| e.file_type().is_some_and(|t| t.is_file()))
            .filter(|e| e.file_name().to_str().is_some_and(|n| n.ends_with(suffix) && n.len() > suffix.len()))
            .map(ignore::DirEntry::into_path)
            .collect();
        out.sort();
        tracing::debug!(root = %root.display(), files = out.len(), "Discovered fact files");
        out
    }
}

pub mod project_root {
    use std::env;
    use std::path::{Path, PathBuf};

    const MARKERS: &[&str] = &[super::config::CONFIG_FILE_NAME, "pyproject.toml", "setup.py", ".git"];

    /// Walk ancestors of `start` (or the current directory) looking for a
    /// project marker; fall back to the current directory.
    #[must_use]
    pub fn detect(start: Option<&Path>) -> PathBuf {
        let cwd = || env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let mut cur = start.map_or_else(cwd, Path::to_path_buf);
        loop {
            if MARKERS.iter().any(|m| cur.join(m).exists()) {
                return cur;
            }
            match cur.parent() {
                Some(parent) => cur = parent.to_path_buf(),
                None => return cwd(),
            }
        }
    }

    /// `None` or `.` resolve to the detected project root; anything else is used as given.
    #[must_use]
    pub fn effective_path_opt(p: Option<&Path>) -> PathBuf {
        match p {
            None => detect(None),
            Some(path) if path == Path::new(".") => detect(None),
            Some(path) => path.to_path_buf(),
        }
    }
}
