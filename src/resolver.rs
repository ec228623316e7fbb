//! Contract and module resolution
//!
//! The compiler never touches the filesystem directly. Linked contracts,
//! headless imports and imported TypeScript modules are all reached through a
//! [`ContractResolver`], so the Node binding and the tests can serve sources
//! from memory.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::contract::{contract_view_state, load_linked_contracts, module_specifier, parse_contract, Contract, ResolvedContract};
use crate::ts_types::exported_types;
use crate::types::Type;
use crate::validate::WithValidations;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolveError {
    #[error("cannot resolve [{link}] from [{from}]")]
    Unresolved { from: String, link: String },

    #[error("cannot read [{path}]: {reason}")]
    Io { path: String, reason: String },

    #[error("invalid contract [{path}]: {reason}")]
    InvalidContract { path: String, reason: String },

    #[error("invalid module [{path}]: {reason}")]
    InvalidModule { path: String, reason: String },
}

pub trait ContractResolver {
    /// Absolute (or otherwise canonical) path of `link`, written relative to `from`.
    fn resolve_link(&self, from: &str, link: &str) -> Result<String, ResolveError>;

    /// Parses the contract at a path returned by `resolve_link`.
    fn load_contract(&self, path: &str) -> Result<WithValidations<Contract>, ResolveError>;

    /// Exported types of a module: TypeScript declarations, or the ViewState
    /// of a contract file.
    fn analyze_exported_types(&self, path: &str) -> Result<Vec<(String, Type)>, ResolveError>;
}

/// Loads a contract and everything it links to.
pub fn load_resolved_contract(
    resolver: &dyn ContractResolver,
    path: &str,
) -> Result<WithValidations<ResolvedContract>, ResolveError> {
    let (contract, mut validations) = resolver.load_contract(path)?.into_parts();
    let resolved = load_linked_contracts(contract, path, &module_specifier(path), resolver)
        .collect_into(&mut validations);
    Ok(WithValidations::new(resolved, validations))
}

/// A contract file's single export: `(<Name>ViewState, type)`.
pub fn analyze_contract(
    resolver: &dyn ContractResolver,
    path: &str,
) -> Result<Vec<(String, Type)>, ResolveError> {
    let resolved = load_resolved_contract(resolver, path)?.val;
    Ok(vec![(
        resolved.contract.view_state_name(),
        contract_view_state(&resolved),
    )])
}

fn parse_contract_at(path: &str, text: &str) -> Result<WithValidations<Contract>, ResolveError> {
    parse_contract(text, path).map_err(|e| ResolveError::InvalidContract {
        path: path.to_string(),
        reason: e.message,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILESYSTEM
// ═══════════════════════════════════════════════════════════════════════════════

const MODULE_EXTENSIONS: &[&str] = &[".ts", ".tsx", ".d.ts"];

/// Resolves against the filesystem. Contracts are cached by canonical path for
/// the lifetime of the resolver.
pub struct FsContractResolver {
    contract_extension: String,
    contracts: RefCell<HashMap<PathBuf, WithValidations<Contract>>>,
}

impl FsContractResolver {
    pub fn new(contract_extension: &str) -> Self {
        FsContractResolver {
            contract_extension: contract_extension.to_string(),
            contracts: RefCell::new(HashMap::new()),
        }
    }

    fn candidates(&self, base: &Path) -> Vec<PathBuf> {
        let mut out = vec![base.to_path_buf()];
        let raw = base.to_string_lossy();
        for extension in MODULE_EXTENSIONS.iter().copied().chain([self.contract_extension.as_str()]) {
            out.push(PathBuf::from(format!("{}{}", raw, extension)));
        }
        out
    }

    fn read(path: &str) -> Result<String, ResolveError> {
        fs::read_to_string(path).map_err(|e| ResolveError::Io {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }
}

impl ContractResolver for FsContractResolver {
    fn resolve_link(&self, from: &str, link: &str) -> Result<String, ResolveError> {
        let base = Path::new(from).parent().unwrap_or_else(|| Path::new("")).join(link);
        self.candidates(&base)
            .into_iter()
            .filter(|candidate| candidate.is_file())
            .find_map(|candidate| candidate.canonicalize().ok())
            .map(|found| found.to_string_lossy().to_string())
            .ok_or_else(|| ResolveError::Unresolved {
                from: from.to_string(),
                link: link.to_string(),
            })
    }

    fn load_contract(&self, path: &str) -> Result<WithValidations<Contract>, ResolveError> {
        let key = PathBuf::from(path);
        if let Some(cached) = self.contracts.borrow().get(&key) {
            return Ok(cached.clone());
        }
        let contract = parse_contract_at(path, &Self::read(path)?)?;
        debug!(
            target: "view_compiler::resolver",
            path = %path,
            validations = contract.validations.len(),
            "contract loaded"
        );
        self.contracts.borrow_mut().insert(key, contract.clone());
        Ok(contract)
    }

    fn analyze_exported_types(&self, path: &str) -> Result<Vec<(String, Type)>, ResolveError> {
        if path.ends_with(&self.contract_extension) {
            return analyze_contract(self, path);
        }
        exported_types(&Self::read(path)?, path).map_err(|reason| ResolveError::InvalidModule {
            path: path.to_string(),
            reason,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// IN MEMORY
// ═══════════════════════════════════════════════════════════════════════════════

/// Serves sources from a map of normalized paths. Links resolve textually:
/// `./b.contract.json` from `app/a.contract.json` is `app/b.contract.json`.
#[derive(Debug, Clone)]
pub struct MemoryResolver {
    files: HashMap<String, String>,
    contract_extension: String,
}

fn normalize(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop();
            }
            Component::RootDir => parts.clear(),
            other => parts.push(other.as_os_str().to_string_lossy().to_string()),
        }
    }
    let joined = parts.join("/");
    if path.has_root() {
        format!("/{}", joined)
    } else {
        joined
    }
}

impl Default for MemoryResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryResolver {
    pub fn new() -> Self {
        MemoryResolver {
            files: HashMap::new(),
            contract_extension: ".contract.json".to_string(),
        }
    }

    pub fn with_file(mut self, path: &str, source: &str) -> Self {
        self.insert(path, source);
        self
    }

    pub fn insert(&mut self, path: &str, source: &str) {
        self.files.insert(normalize(Path::new(path)), source.to_string());
    }

    fn read(&self, path: &str) -> Result<&String, ResolveError> {
        self.files.get(path).ok_or_else(|| ResolveError::Io {
            path: path.to_string(),
            reason: "no such file".to_string(),
        })
    }
}

impl ContractResolver for MemoryResolver {
    fn resolve_link(&self, from: &str, link: &str) -> Result<String, ResolveError> {
        let base = normalize(&Path::new(from).parent().unwrap_or_else(|| Path::new("")).join(link));
        let extensions = MODULE_EXTENSIONS.iter().copied().chain([self.contract_extension.as_str()]);
        std::iter::once(base.clone())
            .chain(extensions.map(|extension| format!("{}{}", base, extension)))
            .find(|candidate| self.files.contains_key(candidate))
            .ok_or_else(|| ResolveError::Unresolved {
                from: from.to_string(),
                link: link.to_string(),
            })
    }

    fn load_contract(&self, path: &str) -> Result<WithValidations<Contract>, ResolveError> {
        parse_contract_at(path, self.read(path)?)
    }

    fn analyze_exported_types(&self, path: &str) -> Result<Vec<(String, Type)>, ResolveError> {
        if path.ends_with(&self.contract_extension) {
            return analyze_contract(self, path);
        }
        exported_types(self.read(path)?, path).map_err(|reason| ResolveError::InvalidModule {
            path: path.to_string(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const ITEM: &str = r#"{"name": "item", "tags": [{"tag": "title", "type": "data"}]}"#;

    #[test]
    fn memory_links_resolve_relative_to_the_linking_file() {
        let resolver = MemoryResolver::new()
            .with_file("app/list/list.contract.json", "{}")
            .with_file("app/item.contract.json", ITEM);
        let resolved = resolver
            .resolve_link("app/list/list.contract.json", "../item.contract.json")
            .unwrap();
        assert_eq!(resolved, "app/item.contract.json");
        assert_eq!(
            resolver.resolve_link("app/list/list.contract.json", "./missing"),
            Err(ResolveError::Unresolved {
                from: "app/list/list.contract.json".to_string(),
                link: "./missing".to_string(),
            })
        );
    }

    #[test]
    fn contract_modules_export_their_view_state() {
        let resolver = MemoryResolver::new().with_file("item.contract.json", ITEM);
        let types = resolver.analyze_exported_types("item.contract.json").unwrap();
        assert_eq!(types.len(), 1);
        assert_eq!(types[0].0, "ItemViewState");
        assert!(types[0].1.as_object().unwrap().props.contains_key("title"));
    }

    #[test]
    fn filesystem_links_try_known_extensions() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("item.contract.json"), ITEM).unwrap();
        fs::write(dir.path().join("card.ts"), "export interface Card { title: string }").unwrap();
        let from = dir.path().join("page.view.html");
        let from = from.to_string_lossy();

        let resolver = FsContractResolver::new(".contract.json");
        let contract = resolver.resolve_link(&from, "./item").unwrap();
        assert!(contract.ends_with("item.contract.json"));
        assert_eq!(resolver.load_contract(&contract).unwrap().val.name, "item");

        let module = resolver.resolve_link(&from, "./card").unwrap();
        let types = resolver.analyze_exported_types(&module).unwrap();
        assert_eq!(types[0].0, "Card");
    }

    #[test]
    fn filesystem_contracts_are_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("item.contract.json");
        fs::write(&path, ITEM).unwrap();
        let path = path.to_string_lossy().to_string();

        let resolver = FsContractResolver::new(".contract.json");
        let first = resolver.load_contract(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(resolver.load_contract(&path).unwrap(), first);
    }
}
