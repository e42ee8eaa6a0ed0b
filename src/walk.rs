use ignore::WalkBuilder;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Path, PathBuf};

/// Directories and binary formats that never hold ingestible text
const NOISE_PATTERNS: &[&str] = &[
    // Noise directories
    "target/", "node_modules/", "venv/", ".venv/", "vendor/",
    "dist/", "build/", "out/", "bin/", "obj/", "coverage/", "__pycache__/", "*.egg-info/",
    ".git/", ".svn/", ".hg/", ".vscode/", ".idea/", ".vs/",

    // Database files
    "*.db", "*.sqlite", "*.sqlite3", "*.wal", "*.shm",

    // Binary extensions
    "*.log", "*.pyc", "*.pyo", "*.pyd", "*.class", "*.jar",
    "*.png", "*.jpg", "*.jpeg", "*.gif", "*.ico", "*.webp", "*.avif", "*.bmp",
    "*.mp4", "*.webm", "*.mp3", "*.wav",
    "*.exe", "*.dll", "*.so", "*.dylib", "*.o", "*.a", "*.lib", "*.bin", "*.pdb",
    "*.pdf", "*.zip", "*.tar", "*.gz", "*.7z", "*.rar", "*.wasm", "*.node",
    "*.woff", "*.woff2", "*.ttf", "*.eot",
];

/// Gitignore-style filter for noise directories and binary files.
///
/// Exclusion of lock and generated files is not done here: those reach the
/// dispatcher and come back as an "excluded" result.
pub struct NoiseFilter {
    root: PathBuf,
    inner: Gitignore,
}

impl NoiseFilter {
    pub fn new(root: &Path, extra_ignores: &[String]) -> Self {
        let mut builder = GitignoreBuilder::new(root);

        for pattern in NOISE_PATTERNS.iter().copied().chain(extra_ignores.iter().map(String::as_str)) {
            if let Err(e) = builder.add_line(None, pattern) {
                tracing::warn!("Ignoring invalid ignore pattern {:?}: {}", pattern, e);
            }
        }

        let inner = builder.build().unwrap_or_else(|e| {
            tracing::warn!("Failed to build noise filter: {}", e);
            Gitignore::empty()
        });
        Self {
            root: root.to_path_buf(),
            inner,
        }
    }

    /// Check a path (absolute under the root, or relative to it)
    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        if relative.has_root() {
            return false;
        }
        self.inner.matched_path_or_any_parents(relative, is_dir).is_ignore()
    }
}

/// Collect every candidate file under `root`, honoring `.gitignore`,
/// `.ignore` and the noise filter. Paths come back sorted.
pub fn collect_files(root: &Path, extra_ignores: &[String]) -> Vec<PathBuf> {
    if root.is_file() {
        return vec![root.to_path_buf()];
    }

    let filter = NoiseFilter::new(root, extra_ignores);
    let mut files: Vec<PathBuf> = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .git_exclude(true)
        .require_git(false)
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .map(|entry| entry.into_path())
        .filter(|path| !filter.is_ignored(path, false))
        .collect();

    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_filter() {
        let root = Path::new("/repo");
        let filter = NoiseFilter::new(root, &["*.snap".to_string()]);
        assert!(filter.is_ignored(Path::new("/repo/node_modules/react/index.js"), false));
        assert!(filter.is_ignored(Path::new("/repo/assets/logo.png"), false));
        assert!(filter.is_ignored(Path::new("/repo/ui/button.snap"), false));
        assert!(!filter.is_ignored(Path::new("/repo/src/app.ts"), false));
    }

    #[test]
    fn test_collect_files_skips_noise() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        std::fs::write(dir.path().join("src/main.go"), "package main\n").unwrap();
        std::fs::write(dir.path().join("README.md"), "# Hi\n").unwrap();
        std::fs::write(dir.path().join("node_modules/pkg/index.js"), "x").unwrap();
        std::fs::write(dir.path().join("logo.png"), [0u8, 1, 2]).unwrap();

        let files = collect_files(dir.path(), &[]);
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["README.md", "src/main.go"]);
    }
}
