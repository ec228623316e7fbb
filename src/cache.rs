use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::options::CompileOptions;
use crate::validate::WithValidations;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub hash: String,
    pub code: String,
    pub validations: Vec<String>,
}

/// Compiled modules on disk, keyed by a hash of the source and the options it
/// was compiled with.
pub struct IncrementalCache {
    cache_dir: PathBuf,
}

impl IncrementalCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        let cache_dir = cache_dir.into();
        if !cache_dir.exists() {
            if let Err(e) = fs::create_dir_all(&cache_dir) {
                warn!(target: "view_compiler::cache", dir = %cache_dir.display(), error = %e, "cannot create cache dir");
            }
        }
        Self { cache_dir }
    }

    pub fn compute_hash(source: &str, options: &CompileOptions) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        // options change the output as much as the source does
        if let Ok(options) = serde_json::to_string(options) {
            hasher.update(options.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    fn get_cache_path(&self, file_path: &str) -> PathBuf {
        let safe_name = file_path.replace(['/', '\\', ':'], "_");
        self.cache_dir.join(format!("{}.json", safe_name))
    }

    pub fn get(&self, source: &str, options: &CompileOptions) -> Option<WithValidations<String>> {
        let cache_path = self.get_cache_path(&options.file_path);
        let data = fs::read_to_string(&cache_path).ok()?;

        let entry: CacheEntry = match serde_json::from_str(&data) {
            Ok(e) => e,
            Err(e) => {
                warn!(
                    target: "view_compiler::cache",
                    file = %options.file_path,
                    error = %e,
                    "corrupt cache entry, discarding"
                );
                fs::remove_file(cache_path).ok();
                return None;
            }
        };

        if entry.hash == Self::compute_hash(source, options) {
            debug!(target: "view_compiler::cache", file = %options.file_path, "cache hit");
            Some(WithValidations::new(entry.code, entry.validations))
        } else {
            None
        }
    }

    pub fn set(&self, source: &str, options: &CompileOptions, output: &WithValidations<String>) {
        let cache_path = self.get_cache_path(&options.file_path);
        let entry = CacheEntry {
            hash: Self::compute_hash(source, options),
            code: output.val.clone(),
            validations: output.validations.clone(),
        };

        if let Ok(data) = serde_json::to_string(&entry) {
            if let Err(e) = fs::write(&cache_path, data) {
                warn!(target: "view_compiler::cache", file = %options.file_path, error = %e, "cannot write cache entry");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::Target;

    #[test]
    fn entries_are_keyed_by_source_and_options() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IncrementalCache::new(dir.path().join("cache"));
        let options = CompileOptions::for_file("app/counter.view.html", Target::Element);
        let output = WithValidations::with_validation("export {};".to_string(), "a warning");

        cache.set("<div></div>", &options, &output);
        assert_eq!(cache.get("<div></div>", &options), Some(output));
        assert_eq!(cache.get("<span></span>", &options), None);

        let tree = CompileOptions::for_file("app/counter.view.html", Target::Tree);
        assert_eq!(cache.get("<div></div>", &tree), None);
    }

    #[test]
    fn corrupt_entries_are_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IncrementalCache::new(dir.path());
        let options = CompileOptions::for_file("a.view.html", Target::Element);
        let path = cache.get_cache_path(&options.file_path);
        fs::write(&path, "not json").unwrap();

        assert_eq!(cache.get("x", &options), None);
        assert!(!path.exists());
    }
}
