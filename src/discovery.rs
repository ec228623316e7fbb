//! Discovery and batch compilation
//!
//! Recursively scans a directory for contracts and templates and compiles
//! every one of them. Files are independent, so they compile in parallel;
//! each worker owns its resolver and its contract cache.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::cache::IncrementalCache;
use crate::contract_codegen::compile_contract;
use crate::options::CompileOptions;
use crate::resolver::FsContractResolver;
use crate::validate::{CompilerError, WithValidations};
use crate::compile_template;

pub const TEMPLATE_EXTENSION: &str = ".view.html";

// ═══════════════════════════════════════════════════════════════════════════════
// METADATA TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    Contract,
    Template,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFile {
    pub path: PathBuf,
    pub kind: SourceKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledFile {
    pub path: PathBuf,
    pub kind: SourceKind,
    pub code: Option<String>,
    pub validations: Vec<String>,
    pub error: Option<CompilerError>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// DISCOVERY
// ═══════════════════════════════════════════════════════════════════════════════

/// Every contract and template under `dir`, sorted by path.
pub fn find_sources(dir: &Path, contract_extension: &str) -> Vec<SourceFile> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(target: "view_compiler::discovery", error = %e, "skipping unreadable entry");
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = path.to_string_lossy();
        let kind = if name.ends_with(contract_extension) {
            SourceKind::Contract
        } else if name.ends_with(TEMPLATE_EXTENSION) {
            SourceKind::Template
        } else {
            continue;
        };
        files.push(SourceFile {
            path: path.to_path_buf(),
            kind,
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    files
}

// ═══════════════════════════════════════════════════════════════════════════════
// BATCH COMPILATION
// ═══════════════════════════════════════════════════════════════════════════════

fn compile_source(
    file: &SourceFile,
    source: &str,
    options: &CompileOptions,
    resolver: &FsContractResolver,
) -> Result<WithValidations<String>, CompilerError> {
    match file.kind {
        SourceKind::Contract => compile_contract(source, options, resolver),
        SourceKind::Template => compile_template(source, options, resolver),
    }
}

fn compile_file(
    file: &SourceFile,
    base: &CompileOptions,
    resolver: &FsContractResolver,
    cache: Option<&IncrementalCache>,
) -> CompiledFile {
    let options = CompileOptions {
        file_path: file.path.to_string_lossy().to_string(),
        ..base.clone()
    };
    let mut compiled = CompiledFile {
        path: file.path.clone(),
        kind: file.kind,
        code: None,
        validations: vec![],
        error: None,
    };

    let source = match fs::read_to_string(&file.path) {
        Ok(source) => source,
        Err(e) => {
            compiled.validations.push(format!("cannot read file: {}", e));
            return compiled;
        }
    };

    if let Some(hit) = cache.and_then(|cache| cache.get(&source, &options)) {
        compiled.code = Some(hit.val);
        compiled.validations = hit.validations;
        return compiled;
    }

    match compile_source(file, &source, &options, resolver) {
        Ok(output) => {
            if let Some(cache) = cache {
                cache.set(&source, &options, &output);
            }
            compiled.code = Some(output.val);
            compiled.validations = output.validations;
        }
        Err(e) => {
            warn!(target: "view_compiler::discovery", file = %options.file_path, code = %e.code, "compilation failed");
            compiled.error = Some(e);
        }
    }
    compiled
}

/// Compiles every source under `dir` with `options` (its `file_path` is
/// replaced per file). Results are ordered by path.
pub fn compile_directory(dir: &Path, options: &CompileOptions, cache: Option<&IncrementalCache>) -> Vec<CompiledFile> {
    let sources = find_sources(dir, &options.contract_extension);
    debug!(target: "view_compiler::discovery", dir = %dir.display(), files = sources.len(), "compiling directory");

    sources
        .par_iter()
        .map_init(
            || FsContractResolver::new(&options.contract_extension),
            |resolver, file| compile_file(file, options, resolver, cache),
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUNTER: &str = r#"{"name": "counter", "tags": [
        {"tag": "count", "type": "data", "dataType": "number"},
        {"tag": "add", "type": "interactive", "elementType": "HTMLButtonElement"}
    ]}"#;

    fn write_tree(dir: &Path) {
        fs::create_dir_all(dir.join("widgets")).unwrap();
        fs::write(dir.join("widgets/counter.contract.json"), COUNTER).unwrap();
        fs::write(dir.join("broken.contract.json"), "{").unwrap();
        fs::write(dir.join("readme.md"), "# notes").unwrap();
    }

    #[test]
    fn finds_contracts_and_templates() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path());
        fs::write(dir.path().join("page.view.html"), "<div></div>").unwrap();

        let found = find_sources(dir.path(), ".contract.json");
        let kinds: Vec<SourceKind> = found.iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![SourceKind::Contract, SourceKind::Template, SourceKind::Contract]
        );
        assert!(found[2].path.ends_with("widgets/counter.contract.json"));
    }

    #[test]
    fn compiles_each_file_independently() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path());

        let results = compile_directory(dir.path(), &CompileOptions::default(), None);
        assert_eq!(results.len(), 2);
        assert!(results[0].error.is_some());
        let counter = &results[1];
        assert!(counter.error.is_none());
        assert!(counter.validations.is_empty());
        assert!(counter.code.as_ref().unwrap().contains("count: number;"));
    }

    #[test]
    fn reuses_cached_output() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path());
        let cache = IncrementalCache::new(dir.path().join(".cache"));

        let first = compile_directory(dir.path(), &CompileOptions::default(), Some(&cache));
        let second = compile_directory(dir.path(), &CompileOptions::default(), Some(&cache));
        assert_eq!(first, second);
    }
}
