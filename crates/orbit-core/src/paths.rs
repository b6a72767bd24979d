use std::path::{Component, Path, PathBuf};

/// Turns caller-supplied path spellings into a canonical absolute form.
///
/// Resolution is lexical: `~` expands to the home directory, relative paths are
/// joined onto the working directory captured at construction, and `.` / `..`
/// components are folded. The filesystem is never consulted, so resolution is
/// deterministic and idempotent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    home: Option<PathBuf>,
    cwd: PathBuf,
}

impl PathResolver {
    #[must_use]
    pub fn new(home: Option<PathBuf>, cwd: PathBuf) -> Self {
        let root = PathBuf::from("/");
        let cwd = if cwd.is_absolute() {
            normalize(&cwd)
        } else {
            normalize(&root.join(cwd))
        };
        Self {
            home: home.map(|h| normalize(&cwd.join(h))),
            cwd,
        }
    }

    /// Resolver bound to the current user's home and the process working directory.
    #[must_use]
    pub fn from_env() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        Self::new(dirs::home_dir(), cwd)
    }

    #[must_use]
    pub fn resolve(&self, raw: &str) -> PathBuf {
        let expanded = match (raw, &self.home) {
            ("~", Some(home)) => home.clone(),
            (s, Some(home)) if s.starts_with("~/") => {
                home.join(s[2..].trim_start_matches('/'))
            }
            _ => PathBuf::from(raw),
        };
        normalize(&self.cwd.join(expanded))
    }

    #[must_use]
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }
}

/// Fold `.` and `..` components. `..` at the root stays at the root.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    if out.as_os_str().is_empty() {
        out.push("/");
    }
    out
}

/// True when `path` is the root directory itself.
#[must_use]
pub fn is_root(path: &Path) -> bool {
    path.parent().is_none() && path.has_root()
}
