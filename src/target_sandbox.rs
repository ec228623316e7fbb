//! Sandbox root target: the element markup of the trusted target, rendered
//! under `mainRoot`, with every child component crossing the sandbox boundary
//! through `secureChildComp`.

use crate::codegen::{call, render_head_links, Imports, TargetOutput};
use crate::refs::{render_refs_managers, ManagerKind, RefsTree};
use crate::target_element::ElementWriter;
use crate::transform::RenderTree;

pub fn render(tree: &RenderTree, refs: &RefsTree) -> TargetOutput {
    let mut writer = ElementWriter::new(true);
    let mut manager_lines = render_refs_managers(refs, ManagerKind::SandboxRoot, &mut writer.imports);
    manager_lines.extend(render_head_links(&tree.head_links, &mut writer.imports));
    let regions = tree.regions.iter().map(|region| writer.region(region)).collect();
    let body = writer.node(&tree.root);

    writer.imports.insert(Imports::MAIN_ROOT);
    TargetOutput {
        render_body: call(
            "mainRoot",
            &["viewState".to_string(), "refManager".to_string(), format!("() => {}", body)],
        ),
        imports: writer.imports,
        manager_lines,
        regions,
        takes_options: true,
    }
}
