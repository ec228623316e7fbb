//! # View compiler
//!
//! Compiles two kinds of declarative input into typed TypeScript modules:
//!
//! - **Contracts** (`*.contract.json`) describe a component's typed surface:
//!   data fields, interactive elements, variants, sub-contracts, props and URL
//!   params. They compile to ViewState types, per-phase projections and Refs
//!   interfaces ([`compile_contract`]).
//! - **Templates** (`*.view.html`) bind a view state to markup with `if`,
//!   `forEach`, async and `<recurse>` directives. They compile to the same
//!   types plus a `render` function for one of four targets
//!   ([`compile_template`]).
//!
//! ## Pipeline
//!
//! 1. Parse the template (html5ever) and its view-data block or contract.
//! 2. Resolve imported modules and headless contracts through a
//!    [`ContractResolver`].
//! 3. Build the [`TypeModel`]: recursive references patched, objects indexed.
//! 4. Walk the body once ([`transform_template`]) into a render IR with
//!    compiled bindings, scopes and refs.
//! 5. Merge refs, then hand the IR to the target backend.
//!
//! Problems that leave the output meaningful are validations, returned next to
//! the code. Structural problems abort the module with a [`CompilerError`].

#[cfg(feature = "napi")]
use napi_derive::napi;
use std::collections::{HashMap, HashSet};
use tracing::debug;

mod cache;
mod codegen;
mod contract;
mod contract_codegen;
mod data_block;
mod discovery;
mod expression;
mod expression_compiler;
mod options;
mod parse;
mod phase;
mod refs;
mod resolver;
mod scope;
mod slow_render;
mod static_eval;
mod target_bridge;
mod target_element;
mod target_sandbox;
mod target_tree;
mod transform;
mod ts_types;
mod types;
mod validate;
mod visitor;

#[cfg(test)]
mod contract_tests;
#[cfg(test)]
mod expression_tests;
#[cfg(test)]
mod parse_tests;
#[cfg(test)]
mod phase_tests;
#[cfg(test)]
mod refs_tests;
#[cfg(test)]
mod slow_render_tests;

pub use cache::IncrementalCache;
pub use codegen::Target;
pub use contract::{parse_contract, Contract, ContractTag, ContractTagType};
pub use contract_codegen::compile_contract;
pub use discovery::{compile_directory, find_sources, CompiledFile, SourceFile, SourceKind};
pub use options::{CompileOptions, NativeCompileOptions};
pub use phase::{filter_tags_by_phase, validate_contract_phases, Phase};
pub use resolver::{ContractResolver, FsContractResolver, MemoryResolver, ResolveError};
pub use slow_render::slow_render_transform;
pub use transform::transform_template;
pub use types::{Type, TypeModel};
pub use validate::{CompilerError, Validations, WithValidations};

use codegen::{assemble_module, render_type_declarations, ExternalImports, ModuleParts};
use contract::{contract_refs_at, contract_view_state, module_specifier};
use data_block::data_block_type;
use expression_compiler::compile_import_names;
use parse::{parse_template, render_view_document};
use refs::{duplicate_const_names, optimize_refs, render_refs_interface, RefsTree};
use resolver::load_resolved_contract;
use transform::ComponentImport;
use types::{camel_case, pascal_case, ImportedType, ObjectType};
use validate::{require_data_source, DataSource, ViewTemplate, INV_MISSING_DATA_BLOCK};

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPLATE IMPORTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct TemplateImports {
    components: HashMap<String, ComponentImport>,
    known: HashMap<String, Type>,
    externals: ExternalImports,
}

/// Resolves every `<link rel="import">`. Unresolvable modules and names that a
/// module does not export are validations.
fn resolve_imports(
    template: &ViewTemplate,
    resolver: &dyn ContractResolver,
) -> Result<WithValidations<TemplateImports>, CompilerError> {
    let mut validations = Vec::new();
    let mut imports = TemplateImports::default();

    for link in &template.imports {
        let names = compile_import_names(&link.names, &template.file_path)?;
        let exported = match resolver
            .resolve_link(&template.file_path, &link.module)
            .and_then(|path| resolver.analyze_exported_types(&path))
        {
            Ok(exported) => exported,
            Err(e) => {
                validations.push(format!("import [{}] could not be loaded: {}", link.module, e));
                continue;
            }
        };
        for name in names {
            let Some((_, ty)) = exported.iter().find(|(exported, _)| *exported == name.name) else {
                validations.push(format!("[{}] is not exported by [{}]", name.name, link.module));
                continue;
            };
            match ty {
                Type::Component(_) => {
                    let specifier = match &name.alias {
                        Some(alias) => format!("{} as {}", name.name, alias),
                        None => name.name.clone(),
                    };
                    imports.externals.add(&link.module, &specifier);
                    imports.components.insert(
                        name.local_name().to_string(),
                        ComponentImport {
                            module: link.module.clone(),
                            sandboxed: link.sandbox,
                        },
                    );
                }
                _ => {
                    if name.alias.is_some() {
                        validations.push(format!(
                            "type [{}] cannot be imported under an alias; import it by name",
                            name.name
                        ));
                    }
                    imports.known.insert(
                        name.name.clone(),
                        Type::Imported(ImportedType {
                            name: name.name.clone(),
                            module: Some(link.module.clone()),
                            ty: Box::new(ty.clone()),
                        }),
                    );
                }
            }
        }
    }
    Ok(WithValidations::new(imports, validations))
}

/// Imports every named type reachable from a type declared in `module`.
fn import_named_types(ty: &Type, module: &str, externals: &mut ExternalImports, seen: &mut HashSet<String>) {
    match ty {
        Type::Object(object) => {
            if seen.insert(object.name.clone()) {
                externals.add(module, &object.name);
                for field in object.props.values() {
                    import_named_types(field, module, externals, seen);
                }
            }
        }
        Type::Enum(e) => externals.add(module, &e.name),
        Type::Array(inner) | Type::Promise(inner) => import_named_types(inner, module, externals, seen),
        Type::Imported(imported) => match &imported.module {
            Some(own) => import_named_types(&imported.ty, own, externals, seen),
            None => import_named_types(&imported.ty, module, externals, seen),
        },
        Type::Atomic(_) | Type::Component(_) | Type::Recursive(_) | Type::Unknown => {}
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROOT VIEW STATE
// ═══════════════════════════════════════════════════════════════════════════════

struct Headless {
    key: String,
    module: String,
    view_state: Type,
    refs: RefsTree,
    refs_base: String,
}

fn load_headless(
    template: &ViewTemplate,
    resolver: &dyn ContractResolver,
    validations: &mut Validations,
) -> Vec<Headless> {
    let mut mounted = Vec::new();
    for headless in &template.headless {
        let loaded = resolver
            .resolve_link(&template.file_path, &headless.contract)
            .and_then(|path| load_resolved_contract(resolver, &path));
        let resolved = match loaded {
            Ok(loaded) => loaded.collect_into(validations),
            Err(e) => {
                validations.push(format!(
                    "headless contract [{}] could not be loaded: {}",
                    headless.contract, e
                ));
                continue;
            }
        };
        let module = module_specifier(&headless.contract);
        let key = camel_case(&headless.key);
        mounted.push(Headless {
            refs: contract_refs_at(&resolved, std::slice::from_ref(&key)),
            key,
            view_state: Type::Imported(ImportedType {
                name: resolved.contract.view_state_name(),
                module: Some(module.clone()),
                ty: Box::new(contract_view_state(&resolved)),
            }),
            refs_base: pascal_case(&resolved.contract.name),
            module,
        });
    }
    mounted
}

/// The root view state and the module it is declared in, when it comes from
/// a contract and is imported rather than declared.
fn root_view_state(
    template: &ViewTemplate,
    base: &str,
    known: &HashMap<String, Type>,
    headless: &[Headless],
    resolver: &dyn ContractResolver,
    validations: &mut Validations,
) -> Result<(Type, Option<String>), CompilerError> {
    let root_name = format!("{}ViewState", base);
    let (root, module) = match require_data_source(template)? {
        DataSource::Inline { data } => {
            let root = data_block_type(data, &root_name, known, &template.file_path)?.collect_into(validations);
            (root, None)
        }
        DataSource::Contract { link } => {
            let resolved = resolver
                .resolve_link(&template.file_path, link)
                .and_then(|path| load_resolved_contract(resolver, &path))
                .map_err(|e| {
                    CompilerError::with_details(
                        INV_MISSING_DATA_BLOCK,
                        &format!("View-data contract [{}] could not be loaded: {}", link, e),
                        &template.file_path,
                        None,
                        vec![],
                    )
                })?
                .collect_into(validations);
            (contract_view_state(&resolved), Some(module_specifier(link)))
        }
    };

    if headless.is_empty() {
        return Ok(match module {
            Some(module) => {
                let name = match &root {
                    Type::Object(object) => object.name.clone(),
                    _ => root_name,
                };
                let imported = Type::Imported(ImportedType {
                    name,
                    module: Some(module.clone()),
                    ty: Box::new(root),
                });
                (imported, Some(module))
            }
            None => (root, None),
        });
    }

    // headless mounts extend the root, so it is declared here
    let mut object = match root {
        Type::Object(object) => object,
        _ => ObjectType::new(&root_name),
    };
    for mount in headless {
        object.props.insert(mount.key.clone(), mount.view_state.clone());
    }
    Ok((Type::Object(object), None))
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY POINTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Compiles a template into the module for `options.target`.
pub fn compile_template(
    html: &str,
    options: &CompileOptions,
    resolver: &dyn ContractResolver,
) -> Result<WithValidations<String>, CompilerError> {
    let file = &options.file_path;
    let base = pascal_case(&options.base_name());
    let template = parse_template(html, file)?;

    let (imports, mut validations) = resolve_imports(&template, resolver)?.into_parts();
    let TemplateImports {
        components,
        known,
        mut externals,
    } = imports;
    let headless = load_headless(&template, resolver, &mut validations);
    let (root, root_module) = root_view_state(&template, &base, &known, &headless, resolver, &mut validations)?;

    let model = TypeModel::new(root, file)?;
    let tree = transform_template(&template, &model, &components)?.collect_into(&mut validations);
    let mut refs = optimize_refs(tree.refs.clone()).collect_into(&mut validations);

    let mut seen = HashSet::new();
    if let Some(module) = &root_module {
        import_named_types(model.root(), module, &mut externals, &mut seen);
    }
    for mount in headless {
        import_named_types(&mount.view_state, &mount.module, &mut externals, &mut seen);
        externals.add(&mount.module, &format!("{}Refs", mount.refs_base));
        let child = refs.children.entry(mount.key).or_insert(mount.refs);
        child.imported_refs = Some(mount.refs_base);
        child.imported_module = Some(mount.module);
    }
    validations.extend(duplicate_const_names(&refs));

    let output = match options.target {
        Target::Element => target_element::render(&tree, &refs),
        Target::Bridge => target_bridge::render(&tree, &refs),
        Target::Sandbox => target_sandbox::render(&tree, &refs),
        Target::Tree => target_tree::render(&tree, &refs),
    };
    let mut imports = output.imports;
    let mut declarations = render_type_declarations(&model, &mut externals);
    declarations.push('\n');
    declarations.push_str(&render_refs_interface(
        &refs,
        &format!("{}ElementRefs", base),
        false,
        &mut imports,
    ));

    let parts = ModuleParts {
        base,
        view_state: tree.view_state.clone(),
        declarations,
        manager_lines: output.manager_lines,
        regions: output.regions,
        render_body: output.render_body,
        takes_options: output.takes_options,
    };
    let code = assemble_module(&parts, imports, &externals, options.target, options);

    debug!(
        target: "view_compiler::template",
        file = %file,
        compile_target = %options.target,
        validations = validations.len(),
        "compiled template"
    );
    Ok(WithValidations::new(code, validations))
}

/// Inlines the slow-phase bindings of a contract-based template, returning the
/// rewritten template document.
pub fn pre_render_template(
    html: &str,
    file: &str,
    contract_text: &str,
    slow_view_state: &serde_json::Value,
) -> Result<WithValidations<String>, CompilerError> {
    let template = parse_template(html, file)?;
    let (contract, mut validations) = parse_contract(contract_text, file)?.into_parts();
    let rendered = slow_render_transform(template, &contract, slow_view_state)?.collect_into(&mut validations);
    Ok(WithValidations::new(render_view_document(&rendered), validations))
}

// ═══════════════════════════════════════════════════════════════════════════════
// NODE BINDING
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg_attr(feature = "napi", napi(object))]
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeCompileResult {
    pub code: Option<String>,
    pub validations: Vec<String>,
    pub error: Option<CompilerError>,
}

impl From<Result<WithValidations<String>, CompilerError>> for NativeCompileResult {
    fn from(result: Result<WithValidations<String>, CompilerError>) -> Self {
        match result {
            Ok(output) => NativeCompileResult {
                code: Some(output.val),
                validations: output.validations,
                error: None,
            },
            Err(error) => NativeCompileResult {
                code: None,
                validations: vec![],
                error: Some(error),
            },
        }
    }
}

/// Sources the compiled file links to, keyed by path, served from memory.
#[cfg(any(feature = "napi", test))]
fn memory_resolver(files: Option<HashMap<String, String>>) -> MemoryResolver {
    let mut resolver = MemoryResolver::new();
    for (path, source) in files.unwrap_or_default() {
        resolver.insert(&path, &source);
    }
    resolver
}

#[cfg(feature = "napi")]
#[napi]
pub fn compile_contract_native(
    source: String,
    options: NativeCompileOptions,
    files: Option<HashMap<String, String>>,
) -> NativeCompileResult {
    let resolver = memory_resolver(files);
    compile_contract(&source, &options.into(), &resolver).into()
}

#[cfg(feature = "napi")]
#[napi]
pub fn compile_template_native(
    source: String,
    options: NativeCompileOptions,
    files: Option<HashMap<String, String>>,
) -> NativeCompileResult {
    let resolver = memory_resolver(files);
    compile_template(&source, &options.into(), &resolver).into()
}

#[cfg(feature = "napi")]
#[napi]
pub fn pre_render_template_native(
    source: String,
    file_path: String,
    contract: String,
    slow_view_state: serde_json::Value,
) -> NativeCompileResult {
    pre_render_template(&source, &file_path, &contract, &slow_view_state).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_resolver_normalizes_keys() {
        let mut files = HashMap::new();
        files.insert("./app/item.contract.json".to_string(), "{}".to_string());
        let resolver = memory_resolver(Some(files));
        assert!(resolver.resolve_link("app/page.view.html", "./item.contract.json").is_ok());
    }

    #[test]
    fn native_result_from_error() {
        let error = CompilerError::new("VC001", "no root", "a.view.html");
        let result: NativeCompileResult = Err(error.clone()).into();
        assert_eq!(result.error, Some(error));
        assert!(result.code.is_none());
    }
}
