//! Rendering phases.
//!
//! A field's effective phase is its explicit phase, else the phase inherited
//! from its enclosing sub-contract, else `slow`. Interactive tags are always
//! `fast+interactive`. Only repeated sub-contracts constrain their items: an
//! item field may not become available earlier than its array.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::contract::{Contract, ContractTag, ContractTagType};
use crate::types::camel_case;
use crate::validate::Validations;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Phase {
    #[default]
    Slow,
    Fast,
    FastInteractive,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Slow, Phase::Fast, Phase::FastInteractive];

    pub fn parse(value: &str) -> Option<Phase> {
        match value.trim() {
            "slow" => Some(Phase::Slow),
            "fast" => Some(Phase::Fast),
            "fast+interactive" => Some(Phase::FastInteractive),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Slow => "slow",
            Phase::Fast => "fast",
            Phase::FastInteractive => "fast+interactive",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn effective_phase(tag: &ContractTag, inherited: Phase) -> Phase {
    if tag.has(ContractTagType::Interactive) {
        Phase::FastInteractive
    } else {
        tag.phase.unwrap_or(inherited)
    }
}

fn join(path: &str, tag: &str) -> String {
    if path.is_empty() {
        tag.to_string()
    } else {
        format!("{}.{}", path, tag)
    }
}

/// One validation per explicitly phased tag that is earlier than its nearest
/// enclosing repeated sub-contract.
pub fn validate_contract_phases(contract: &Contract) -> Validations {
    let mut validations = Vec::new();
    validate_tags(&contract.tags, Phase::Slow, None, "", &mut validations);
    validations
}

fn validate_tags(
    tags: &[ContractTag],
    inherited: Phase,
    enclosing_array: Option<(&str, Phase)>,
    path: &str,
    validations: &mut Validations,
) {
    for tag in tags {
        let tag_path = join(path, &tag.tag);
        let phase = effective_phase(tag, inherited);
        if let (Some(_), Some((array_path, array_phase))) = (tag.phase, enclosing_array) {
            if phase < array_phase {
                validations.push(format!(
                    "Tag [{}] has phase {} which is earlier than phase {} of its enclosing repeated sub-contract [{}]",
                    tag_path, phase, array_phase, array_path
                ));
            }
        }
        if let Some(children) = &tag.tags {
            let next_array = if tag.repeated {
                Some((tag_path.as_str(), phase))
            } else {
                enclosing_array
            };
            validate_tags(children, phase, next_array, &tag_path, validations);
        }
    }
}

/// Tags whose effective phase is exactly `phase`. Containers left empty are
/// dropped and interactive-only tags never appear in a projection.
pub fn filter_tags_by_phase(tags: &[ContractTag], phase: Phase) -> Vec<ContractTag> {
    filter_tags(tags, phase, Phase::Slow)
}

fn filter_tags(tags: &[ContractTag], phase: Phase, inherited: Phase) -> Vec<ContractTag> {
    let mut kept = Vec::new();
    for tag in tags {
        let tag_phase = effective_phase(tag, inherited);
        match &tag.tags {
            Some(children) => {
                let children = filter_tags(children, phase, tag_phase);
                if !children.is_empty() {
                    kept.push(ContractTag {
                        tags: Some(children),
                        ..tag.clone()
                    });
                }
            }
            None if tag.is_view_state_leaf() && tag_phase == phase => kept.push(tag.clone()),
            None => {}
        }
    }
    kept
}

/// Dotted (camelCase) path of every view-state leaf with its effective phase.
pub fn phase_map(tags: &[ContractTag]) -> BTreeMap<String, Phase> {
    let mut map = BTreeMap::new();
    collect_phases(tags, Phase::Slow, "", &mut map);
    map
}

fn collect_phases(tags: &[ContractTag], inherited: Phase, path: &str, map: &mut BTreeMap<String, Phase>) {
    for tag in tags {
        let tag_path = join(path, &camel_case(&tag.tag));
        let phase = effective_phase(tag, inherited);
        match &tag.tags {
            Some(children) => {
                map.insert(tag_path.clone(), phase);
                collect_phases(children, phase, &tag_path, map);
            }
            None if tag.is_view_state_leaf() => {
                map.insert(tag_path, phase);
            }
            None => {}
        }
    }
}

/// Dotted paths of every view-state leaf (data, variant and linked tags).
pub fn leaf_paths(tags: &[ContractTag]) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    collect_leaves(tags, "", &mut out);
    out
}

fn collect_leaves(tags: &[ContractTag], path: &str, out: &mut BTreeSet<String>) {
    for tag in tags {
        let tag_path = join(path, &camel_case(&tag.tag));
        match &tag.tags {
            Some(children) => collect_leaves(children, &tag_path, out),
            None if tag.is_view_state_leaf() => {
                out.insert(tag_path);
            }
            None => {}
        }
    }
}
