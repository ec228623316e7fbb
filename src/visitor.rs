use crate::validate::{ElementNode, TemplateNode, TextNode, ViewTemplate};

/// The TemplateVisitor trait is the single traversal mechanism for template bodies.
///
/// Implementers override `visit_*` methods to add behavior and call the
/// matching `walk_*` function to continue into children, unless pruning is
/// intended. `visit_children` receives the whole sibling list so visitors may
/// replace, remove or clone nodes.
pub trait TemplateVisitor {
    fn visit_root(&mut self, root: &mut ViewTemplate) {
        walk_root(self, root);
    }

    fn visit_children(&mut self, children: &mut Vec<TemplateNode>) {
        walk_children(self, children);
    }

    fn visit_node(&mut self, node: &mut TemplateNode) {
        walk_node(self, node);
    }

    fn visit_element(&mut self, element: &mut ElementNode) {
        walk_element(self, element);
    }

    fn visit_text(&mut self, _text: &mut TextNode) {
        // leaf
    }
}

pub fn walk_root<V: TemplateVisitor + ?Sized>(visitor: &mut V, root: &mut ViewTemplate) {
    visitor.visit_children(&mut root.body);
}

pub fn walk_children<V: TemplateVisitor + ?Sized>(visitor: &mut V, children: &mut Vec<TemplateNode>) {
    for node in children {
        visitor.visit_node(node);
    }
}

pub fn walk_node<V: TemplateVisitor + ?Sized>(visitor: &mut V, node: &mut TemplateNode) {
    match node {
        TemplateNode::Element(el) => visitor.visit_element(el),
        TemplateNode::Text(t) => visitor.visit_text(t),
    }
}

pub fn walk_element<V: TemplateVisitor + ?Sized>(visitor: &mut V, element: &mut ElementNode) {
    visitor.visit_children(&mut element.children);
}

/// Collects the `ref` names targeted by `<recurse>` markers.
#[derive(Debug, Default)]
pub struct RecurseTargets {
    pub refs: std::collections::HashSet<String>,
}

impl TemplateVisitor for RecurseTargets {
    fn visit_element(&mut self, element: &mut ElementNode) {
        if element.tag == "recurse" {
            if let Some(target) = element.attr("ref") {
                self.refs.insert(target.to_string());
            }
        }
        walk_element(self, element);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::AttributeIR;

    #[test]
    fn collects_recurse_targets() {
        let mut marker = ElementNode::new("recurse");
        marker.attributes.push(AttributeIR {
            name: "ref".to_string(),
            value: "node".to_string(),
        });
        let mut li = ElementNode::new("li");
        li.children.push(TemplateNode::Element(marker));
        let mut root = vec![TemplateNode::Element(li)];

        let mut targets = RecurseTargets::default();
        targets.visit_children(&mut root);
        assert!(targets.refs.contains("node"));
    }
}
