//! # Project Compile
//!
//! Lowers every component source under a root directory. Files are
//! independent, so they are lowered in parallel; a file that fails to read
//! or parse becomes an error diagnostic and its siblings still compile.

#[cfg(feature = "napi")]
use napi_derive::napi;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::cache::LoweringCache;
use crate::collaborators::{DiagnosticsSink, FileSystem};
use crate::config::CompileOptions;
use crate::diagnostics::{Diagnostic, DIAG_DUPLICATE_TAG};
use crate::error::TransformError;
use crate::lowering::{lower_module, LoweredModule};

#[derive(Debug, Default)]
pub struct ProjectOutput {
    /// Successfully lowered modules, in discovery order.
    pub modules: Vec<LoweredModule>,
    pub failed: usize,
    pub cache_hits: usize,
}

/// Component sources below `root`, relative to it and `/`-separated.
pub fn discover_sources<F: FileSystem>(
    fs: &F,
    root: &Path,
    options: &CompileOptions,
) -> Result<Vec<(PathBuf, String)>, TransformError> {
    let files = fs.walk(root).map_err(|e| TransformError::Read {
        file: root.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(files
        .into_iter()
        .filter(|path| options.accepts(path))
        .map(|path| {
            let relative = fs.relative(root, &path).to_string_lossy().replace('\\', "/");
            (path, relative)
        })
        .collect())
}

pub fn compile_project<F, S>(
    fs: &F,
    root: &Path,
    options: &CompileOptions,
    sink: &mut S,
) -> Result<ProjectOutput, TransformError>
where
    F: FileSystem,
    S: DiagnosticsSink,
{
    let sources = discover_sources(fs, root, options)?;
    let cache = if options.cache {
        match LoweringCache::new(root.join(&options.cache_dir)) {
            Ok(cache) => Some(cache),
            Err(e) => {
                tracing::warn!(error = %e, "lowering cache unavailable, compiling without it");
                None
            }
        }
    } else {
        None
    };

    let results: Vec<(Result<LoweredModule, TransformError>, bool)> = sources
        .par_iter()
        .map(|(path, file_path)| compile_file(fs, path, file_path, options, cache.as_ref()))
        .collect();

    let mut output = ProjectOutput::default();
    for (result, cached) in results {
        match result {
            Ok(module) => {
                output.cache_hits += cached as usize;
                output.modules.push(module);
            }
            Err(err) => {
                tracing::debug!(file = err.file(), %err, "file failed to lower");
                output.failed += 1;
                sink.report(Diagnostic::from(&err));
            }
        }
    }

    flag_cross_file_duplicates(&mut output.modules);
    for module in &output.modules {
        sink.report_all(module.diagnostics.iter().cloned());
    }

    tracing::debug!(
        files = sources.len(),
        failed = output.failed,
        cache_hits = output.cache_hits,
        "project compiled"
    );
    Ok(output)
}

fn compile_file<F: FileSystem>(
    fs: &F,
    path: &Path,
    file_path: &str,
    options: &CompileOptions,
    cache: Option<&LoweringCache>,
) -> (Result<LoweredModule, TransformError>, bool) {
    let source = match fs.read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            let err = TransformError::Read {
                file: file_path.to_string(),
                message: e.to_string(),
            };
            return (Err(err), false);
        }
    };

    let hash = LoweringCache::compute_hash(&source, options);
    if let Some(module) = cache.and_then(|c| c.get(file_path, &hash)) {
        return (Ok(module), true);
    }

    let result = lower_module(&source, file_path, options);
    if let (Some(cache), Ok(module)) = (cache, &result) {
        if let Err(e) = cache.set(&hash, module) {
            tracing::warn!(file = file_path, error = %e, "failed to write cache entry");
        }
    }
    (result, false)
}

/// A tag already declared by an earlier file gets a warning in the later one.
fn flag_cross_file_duplicates(modules: &mut [LoweredModule]) {
    let mut owners: HashMap<String, String> = HashMap::new();
    for module in modules.iter_mut() {
        let mut found = Vec::new();
        for descriptor in &module.components {
            match owners.get(&descriptor.tag) {
                Some(owner) if *owner != module.file_path => found.push(Diagnostic::warning(
                    DIAG_DUPLICATE_TAG,
                    &format!("Tag '{}' is already declared in {}", descriptor.tag, owner),
                    &module.file_path,
                )),
                Some(_) => {}
                None => {
                    owners.insert(descriptor.tag.clone(), module.file_path.clone());
                }
            }
        }
        module.diagnostics.extend(found);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Compile everything under `root`. Returns `{ modules, diagnostics }`.
#[cfg(feature = "napi")]
#[napi]
pub fn compile_project_native(
    root: String,
    options_json: Option<serde_json::Value>,
) -> napi::Result<serde_json::Value> {
    use crate::collaborators::{CollectingSink, StdFileSystem};

    let options: CompileOptions = match options_json {
        Some(json) => serde_json::from_value(json)
            .map_err(|e| napi::Error::from_reason(format!("Invalid options: {}", e)))?,
        None => CompileOptions::default(),
    };
    let mut sink = CollectingSink::default();
    let output = compile_project(&StdFileSystem, Path::new(&root), &options, &mut sink)
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    Ok(serde_json::json!({
        "modules": output.modules,
        "diagnostics": sink.diagnostics,
        "cacheHits": output.cache_hits,
    }))
}
