//! Per-run caches: Go module resolution and file contents.
//!
//! One `SourceCache` is built per run and passed by reference to every stage
//! that needs it. Both maps sit behind a mutex so rayon workers can share it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{GocovError, Result};

/// Read the module path from the contents of a `go.mod` file.
pub fn parse_module_path(go_mod: &str) -> Option<String> {
    go_mod.lines().find_map(|line| {
        let line = line.split("//").next().unwrap_or("").trim();
        let rest = line.strip_prefix("module")?;
        if !rest.starts_with([' ', '\t']) {
            return None;
        }
        let path = rest.trim().trim_matches('"');
        (!path.is_empty()).then(|| path.to_string())
    })
}

/// Forward slashes, no leading `./`.
pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    path.trim_start_matches("./").to_string()
}

pub struct SourceCache {
    repo_root: PathBuf,
    module_path: String,
    contents: Mutex<HashMap<String, Arc<str>>>,
    resolved: Mutex<HashMap<String, String>>,
}

impl SourceCache {
    /// Read `go.mod` at `repo_root` to learn the module path.
    pub fn open(repo_root: &Path) -> Result<Self> {
        let go_mod = repo_root.join("go.mod");
        let text = std::fs::read_to_string(&go_mod).map_err(|e| GocovError::io(&go_mod, e))?;
        let module_path = parse_module_path(&text).ok_or_else(|| {
            GocovError::Module(format!("no module directive in {}", go_mod.display()))
        })?;
        tracing::debug!(module = %module_path, root = %repo_root.display(), "resolved module");
        Ok(Self::with_module(repo_root, &module_path))
    }

    pub fn with_module(repo_root: &Path, module_path: &str) -> Self {
        Self {
            repo_root: repo_root.to_path_buf(),
            module_path: module_path.trim_end_matches('/').to_string(),
            contents: Mutex::new(HashMap::new()),
            resolved: Mutex::new(HashMap::new()),
        }
    }

    pub fn module_path(&self) -> &str {
        &self.module_path
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Map a profile import path (`<module>/<dir>/<file>.go`) to a path
    /// relative to the repository root.
    pub fn resolve(&self, profile_path: &str) -> Result<String> {
        if let Some(hit) = self.resolved.lock().get(profile_path) {
            return Ok(hit.clone());
        }
        let relative = profile_path
            .strip_prefix(&self.module_path)
            .and_then(|rest| rest.strip_prefix('/'))
            .map(normalize_path)
            .ok_or_else(|| {
                GocovError::Module(format!(
                    "{profile_path} is not inside module {}",
                    self.module_path
                ))
            })?;
        self.resolved
            .lock()
            .insert(profile_path.to_string(), relative.clone());
        Ok(relative)
    }

    /// Contents of a repository-relative file, read at most once per run.
    pub fn read(&self, relative: &str) -> Result<Arc<str>> {
        if let Some(hit) = self.contents.lock().get(relative) {
            return Ok(Arc::clone(hit));
        }
        // Read without holding the lock; a racing reader just reads twice.
        let path = self.repo_root.join(relative);
        let text: Arc<str> = std::fs::read_to_string(&path)
            .map_err(|e| GocovError::io(&path, e))?
            .into();
        self.contents
            .lock()
            .insert(relative.to_string(), Arc::clone(&text));
        Ok(text)
    }
}
