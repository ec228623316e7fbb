#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};

use crate::codegen::Target;
use crate::validate::{CompilerError, INV_TEMPLATE_PARSE};

/// Per-compilation settings shared by the library API, the Node binding and
/// the batch compiler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CompileOptions {
    pub file_path: String,
    pub target: Target,
    pub runtime_module: String,
    pub secure_module: String,
    pub tree_module: String,
    pub contract_extension: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            file_path: String::new(),
            target: Target::Element,
            runtime_module: "@view/runtime".to_string(),
            secure_module: "@view/secure".to_string(),
            tree_module: "@view/tree".to_string(),
            contract_extension: ".contract.json".to_string(),
        }
    }
}

impl CompileOptions {
    pub fn for_file(file_path: &str, target: Target) -> Self {
        CompileOptions {
            file_path: file_path.to_string(),
            target,
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, CompilerError> {
        if json.trim().is_empty() {
            return Ok(CompileOptions::default());
        }
        serde_json::from_str(json).map_err(|e| {
            CompilerError::new(
                INV_TEMPLATE_PARSE,
                &format!("Invalid compile options: {}", e),
                "",
            )
        })
    }

    /// `counter.view.html` → `counter`; `counter.contract.json` → `counter`.
    pub fn base_name(&self) -> String {
        let file = self
            .file_path
            .rsplit(|c| c == '/' || c == '\\')
            .next()
            .unwrap_or(&self.file_path);
        file.split('.').next().unwrap_or(file).to_string()
    }
}

/// Options as received from JavaScript.
#[cfg_attr(feature = "napi", napi(object))]
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NativeCompileOptions {
    pub file_path: String,
    pub target: Option<String>,
    pub runtime_module: Option<String>,
    pub secure_module: Option<String>,
    pub tree_module: Option<String>,
}

impl From<NativeCompileOptions> for CompileOptions {
    fn from(native: NativeCompileOptions) -> Self {
        let defaults = CompileOptions::default();
        CompileOptions {
            file_path: native.file_path,
            target: native
                .target
                .as_deref()
                .and_then(Target::parse)
                .unwrap_or_default(),
            runtime_module: native.runtime_module.unwrap_or(defaults.runtime_module),
            secure_module: native.secure_module.unwrap_or(defaults.secure_module),
            tree_module: native.tree_module.unwrap_or(defaults.tree_module),
            contract_extension: defaults.contract_extension,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let options = CompileOptions::from_json(r#"{"filePath": "a/todo.view.html", "target": "tree"}"#).unwrap();
        assert_eq!(options.target, Target::Tree);
        assert_eq!(options.runtime_module, "@view/runtime");
        assert_eq!(options.base_name(), "todo");
    }

    #[test]
    fn invalid_target_is_an_error() {
        assert!(CompileOptions::from_json(r#"{"target": "dom"}"#).is_err());
    }
}
