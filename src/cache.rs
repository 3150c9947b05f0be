use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::CompileOptions;
use crate::lowering::LoweredModule;

#[derive(Serialize, Deserialize)]
pub struct CacheEntry {
    pub hash: String,
    pub module: LoweredModule,
}

/// Lowered modules on disk, one JSON file per source file, valid as long as
/// the source and the lowering options hash the same.
pub struct LoweringCache {
    cache_dir: PathBuf,
}

impl LoweringCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Hash of the source plus every option that changes the lowered text.
    pub fn compute_hash(source: &str, options: &CompileOptions) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.update([0]);
        hasher.update(options.member_indent.as_bytes());
        hasher.update([options.validate_tag_names as u8]);
        format!("{:x}", hasher.finalize())
    }

    fn entry_path(&self, file_path: &str) -> PathBuf {
        let safe_name = file_path.replace(['/', '\\', ':'], "_");
        self.cache_dir.join(format!("{}.json", safe_name))
    }

    pub fn get(&self, file_path: &str, hash: &str) -> Option<LoweredModule> {
        let entry_path = self.entry_path(file_path);
        let data = fs::read_to_string(&entry_path).ok()?;

        let entry: CacheEntry = match serde_json::from_str(&data) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(file = %file_path, error = %e, "corrupt cache entry, dropping it");
                fs::remove_file(entry_path).ok();
                return None;
            }
        };

        (entry.hash == hash && entry.module.file_path == file_path).then_some(entry.module)
    }

    pub fn set(&self, hash: &str, module: &LoweredModule) -> io::Result<()> {
        let entry = CacheEntry {
            hash: hash.to_string(),
            module: module.clone(),
        };
        let data = serde_json::to_string(&entry)?;
        fs::write(self.entry_path(&module.file_path), data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(file_path: &str, code: &str) -> LoweredModule {
        LoweredModule {
            file_path: file_path.to_string(),
            code: code.to_string(),
            components: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    #[test]
    fn test_hit_only_for_same_hash() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LoweringCache::new(dir.path().join("cache")).unwrap();
        let options = CompileOptions::default();

        let hash = LoweringCache::compute_hash("class A {}", &options);
        cache.set(&hash, &module("src/a.tsx", "class A {}")).unwrap();

        assert_eq!(cache.get("src/a.tsx", &hash), Some(module("src/a.tsx", "class A {}")));
        let changed = LoweringCache::compute_hash("class A { }", &options);
        assert_eq!(cache.get("src/a.tsx", &changed), None);
        assert_eq!(cache.get("src/b.tsx", &hash), None);
    }

    #[test]
    fn test_options_are_part_of_the_hash() {
        let mut options = CompileOptions::default();
        let before = LoweringCache::compute_hash("x", &options);
        options.member_indent = "    ".to_string();
        assert_ne!(before, LoweringCache::compute_hash("x", &options));
        options.cache = true;
        let with_cache = LoweringCache::compute_hash("x", &options);
        options.cache = false;
        assert_eq!(with_cache, LoweringCache::compute_hash("x", &options));
    }

    #[test]
    fn test_corrupt_entry_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LoweringCache::new(dir.path()).unwrap();
        let path = dir.path().join("src_a.tsx.json");
        fs::write(&path, "{ not json").unwrap();

        assert_eq!(cache.get("src/a.tsx", "whatever"), None);
        assert!(!path.exists());
    }
}
