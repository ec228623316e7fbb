//! Contract compilation
//!
//! A contract compiles to a declarations-only module: the ViewState types,
//! one projection per phase, the Refs interfaces, Props and Params, and a
//! `<Name>Contract` alias tying them together for the host runtime.

use tracing::debug;

use crate::codegen::{object_key, render_type_declarations, ExternalImports, Imports, Target};
use crate::contract::{
    contract_refs, contract_view_state, data_type_to_type, load_linked_contracts, module_specifier, nested_type_name,
    parse_contract, Contract, ContractTag,
};
use crate::options::CompileOptions;
use crate::phase::{filter_tags_by_phase, validate_contract_phases, Phase};
use crate::refs::{optimize_refs, render_refs_interface, RefsTree};
use crate::resolver::ContractResolver;
use crate::types::{pascal_case, Type, TypeModel};
use crate::validate::{CompilerError, WithValidations};

fn phase_type_name(contract: &Contract, phase: Phase) -> String {
    let suffix = match phase {
        Phase::Slow => "Slow",
        Phase::Fast => "Fast",
        Phase::FastInteractive => "Interactive",
    };
    format!("{}{}ViewState", pascal_case(&contract.name), suffix)
}

// ═══════════════════════════════════════════════════════════════════════════════
// PHASE PROJECTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// `Pick<Object, 'a' | 'b'> & {nested: ...}` over an already filtered tag list.
fn projection(tags: &[ContractTag], object_name: &str, depth: usize) -> String {
    let leaves: Vec<String> = tags
        .iter()
        .filter(|tag| tag.tags.is_none())
        .map(|tag| format!("'{}'", tag.field_name()))
        .collect();
    let pad = "    ".repeat(depth + 1);
    let nested: Vec<String> = tags
        .iter()
        .filter_map(|tag| {
            let children = tag.tags.as_ref()?;
            let mut ty = projection(children, &nested_type_name(&tag.tag, object_name), depth + 1);
            if tag.repeated {
                ty = format!("Array<{}>", ty);
            }
            if tag.is_async {
                ty = format!("Promise<{}>", ty);
            }
            Some(format!("{}{}: {};\n", pad, object_key(&tag.field_name()), ty))
        })
        .collect();

    let mut parts = Vec::new();
    if !leaves.is_empty() {
        parts.push(format!("Pick<{}, {}>", object_name, leaves.join(" | ")));
    }
    if !nested.is_empty() {
        parts.push(format!("{{\n{}{}}}", nested.concat(), "    ".repeat(depth)));
    }
    if parts.is_empty() {
        "{}".to_string()
    } else {
        parts.join(" & ")
    }
}

fn render_projections(contract: &Contract) -> String {
    let view_state = contract.view_state_name();
    Phase::ALL
        .iter()
        .map(|phase| {
            let tags = filter_tags_by_phase(&contract.tags, *phase);
            format!(
                "export type {} = {};\n",
                phase_type_name(contract, *phase),
                projection(&tags, &view_state, 0)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROPS & PARAMS
// ═══════════════════════════════════════════════════════════════════════════════

fn render_props(contract: &Contract, model: &TypeModel) -> Option<String> {
    if contract.props.is_empty() {
        return None;
    }
    let name = format!("{}Props", pascal_case(&contract.name));
    let mut enums = String::new();
    let mut body = String::new();
    for prop in &contract.props {
        let ty = data_type_to_type(prop.data_type.as_ref(), &nested_type_name(&prop.name, &name));
        if let Type::Enum(e) = &ty {
            let values: String = e.values.iter().map(|v| format!("    {},\n", v)).collect();
            enums.push_str(&format!("export enum {} {{\n{}}}\n\n", e.name, values));
        }
        let optional = if prop.required { "" } else { "?" };
        body.push_str(&format!(
            "    {}{}: {};\n",
            object_key(&prop.name),
            optional,
            model.ts_type(&ty)
        ));
    }
    Some(format!("{}export interface {} {{\n{}}}\n", enums, name, body))
}

fn render_params(contract: &Contract, imports: &mut Imports) -> Option<String> {
    if contract.params.is_empty() {
        return None;
    }
    imports.insert(Imports::URL_PARAMS);
    let body: String = contract
        .params
        .iter()
        .map(|param| format!("    {}: string;\n", object_key(&param.name)))
        .collect();
    Some(format!(
        "export interface {}Params extends UrlParams {{\n{}}}\n",
        pascal_case(&contract.name),
        body
    ))
}

/// Refs interfaces of linked contracts, imported from their modules.
fn import_linked_refs(tree: &RefsTree, externals: &mut ExternalImports) {
    for child in tree.children.values() {
        match (&child.imported_refs, &child.imported_module) {
            (Some(base), Some(module)) => {
                if !child.repeated {
                    externals.add(module, &format!("{}Refs", base));
                }
                externals.add(module, &format!("{}RepeatedRefs", base));
            }
            _ => import_linked_refs(child, externals),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// Compiles contract text into its declarations module. Links are loaded
/// through `resolver`, relative to `options.file_path`.
pub fn compile_contract(
    text: &str,
    options: &CompileOptions,
    resolver: &dyn ContractResolver,
) -> Result<WithValidations<String>, CompilerError> {
    let file = &options.file_path;
    let (contract, mut validations) = parse_contract(text, file)?.into_parts();
    validations.extend(validate_contract_phases(&contract));

    let resolved =
        load_linked_contracts(contract, file, &module_specifier(file), resolver).collect_into(&mut validations);
    let model = TypeModel::new(contract_view_state(&resolved), file)?;
    let refs = optimize_refs(contract_refs(&resolved)).collect_into(&mut validations);
    let contract = &resolved.contract;
    let base = pascal_case(&contract.name);

    let mut imports = Imports::VIEW_CONTRACT;
    let mut externals = ExternalImports::default();
    import_linked_refs(&refs, &mut externals);

    let mut sections = vec![
        render_type_declarations(&model, &mut externals),
        render_projections(contract),
        render_refs_interface(&refs, &contract.refs_name(), false, &mut imports),
        render_refs_interface(&refs, &format!("{}RepeatedRefs", base), true, &mut imports),
    ];
    let props = render_props(contract, &model);
    let params = render_params(contract, &mut imports);
    let props_type = match &props {
        Some(_) => format!("{}Props", base),
        None => "{}".to_string(),
    };
    let params_type = match &params {
        Some(_) => format!("{}Params", base),
        None => "{}".to_string(),
    };
    sections.extend(props);
    sections.extend(params);
    sections.push(format!(
        "export type {base}Contract = ViewContract<\n    {vs},\n    {slow},\n    {fast},\n    {interactive},\n    {refs},\n    {props},\n    {params}\n>;\n",
        base = base,
        vs = contract.view_state_name(),
        slow = phase_type_name(contract, Phase::Slow),
        fast = phase_type_name(contract, Phase::Fast),
        interactive = phase_type_name(contract, Phase::FastInteractive),
        refs = contract.refs_name(),
        props = props_type,
        params = params_type,
    ));

    let mut out = imports.render(Target::Element, options);
    out.push_str(&externals.render());
    out.push('\n');
    out.push_str(&sections.join("\n"));

    debug!(
        target: "view_compiler::contract",
        contract = %contract.name,
        validations = validations.len(),
        "compiled contract"
    );
    Ok(WithValidations::new(out, validations))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ContractTagType;

    fn tag(name: &str, phase: Option<Phase>) -> ContractTag {
        let mut tag = ContractTag::new(name, &[ContractTagType::Data]);
        tag.phase = phase;
        tag
    }

    #[test]
    fn projection_picks_leaves_and_nests_containers() {
        let mut items = ContractTag::new("items", &[ContractTagType::SubContract]);
        items.repeated = true;
        items.tags = Some(vec![tag("title", None)]);
        let rendered = projection(&[tag("name", None), items], "ShopViewState", 0);
        assert_eq!(
            rendered,
            "Pick<ShopViewState, 'name'> & {\n    items: Array<Pick<ItemsOfShopViewState, 'title'>>;\n}"
        );
    }

    #[test]
    fn empty_projection_is_an_empty_object() {
        assert_eq!(projection(&[], "ShopViewState", 0), "{}");
    }
}
