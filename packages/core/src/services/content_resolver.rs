//! Content Resolver
//!
//! Turns the raw `aux.content` list of a version into renderable sections:
//!
//! 1. `reference` entries are replaced by the type and data of the reusable
//!    element they point at, or dropped when the target is missing
//! 2. file ids are resolved against the file pool, unknown ids are dropped
//! 3. file descriptions and transcriptions are localized per file and field
//!    (full locale, then its two letter prefix, else none)
//! 4. `data.action` is replaced by the result of the named server side action
//! 5. bookkeeping fields (`group`, `refid`) are not emitted
//!
//! Gaps in the data never fail rendering. Steps 1-3 and 5 are the pure
//! [`resolve`] function; step 4 needs I/O and runs in [`apply_actions`].

use crate::actions::{ActionInput, ActionRegistry};
use crate::auth::{capability, AccessContext};
use crate::models::{ContentElement, Element, ElementKind, File, Node, ResolvedFile, Version};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// Which version of a page is rendered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentView {
    /// Effective published version, what visitors see
    #[default]
    Published,
    /// Latest version, what editors see
    Preview,
}

/// Content entry ready for rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedElement {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<ResolvedFile>,
}

/// Elements of one named group in input order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub elements: Vec<ResolvedElement>,
}

/// Fully resolved page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedDocument {
    pub page: Node,
    pub version: Version,
    pub lang: String,
    pub sections: Vec<Section>,

    /// Unique files of the whole page in first-seen order
    pub files: Vec<ResolvedFile>,
}

impl ResolvedDocument {
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }
}

/// Language of a version, empty when unset
pub fn version_lang(version: &Version) -> &str {
    version.lang.as_deref().unwrap_or_default()
}

fn localize_files(ids: &[String], files: &HashMap<String, File>, lang: &str) -> Vec<ResolvedFile> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .filter_map(|id| files.get(id))
        .map(|file| file.localize(lang))
        .collect()
}

/// Resolve one content entry, `None` for dangling references
pub fn resolve_element(
    item: &ContentElement,
    elements: &HashMap<String, Element>,
    files: &HashMap<String, File>,
    lang: &str,
) -> Option<ResolvedElement> {
    let (kind, data, file_ids) = if item.kind == ElementKind::Reference {
        let Some(target) = item.refid.as_ref().and_then(|id| elements.get(id)) else {
            tracing::debug!("Dropping reference {} to missing element {:?}", item.id, item.refid);
            return None;
        };

        let file_ids = if target.files.is_empty() {
            &item.files
        } else {
            &target.files
        };
        (target.kind.clone(), target.data.clone(), file_ids)
    } else {
        (item.kind.clone(), item.data.clone(), &item.files)
    };

    Some(ResolvedElement {
        id: item.id.clone(),
        kind,
        data,
        files: localize_files(file_ids, files, lang),
    })
}

/// Partition resolved content into sections in order of first appearance
pub fn resolve(
    content: &[ContentElement],
    elements: &HashMap<String, Element>,
    files: &HashMap<String, File>,
    lang: &str,
) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();

    for item in content {
        let Some(resolved) = resolve_element(item, elements, files, lang) else {
            continue;
        };

        let group = item.group_or_default();
        match sections.iter_mut().find(|s| s.name == group) {
            Some(section) => section.elements.push(resolved),
            None => sections.push(Section {
                name: group.to_string(),
                elements: vec![resolved],
            }),
        }
    }

    sections
}

/// Unique files of all sections in first-seen order
pub fn collect_files(sections: &[Section]) -> Vec<ResolvedFile> {
    let mut seen = HashSet::new();
    sections
        .iter()
        .flat_map(|s| &s.elements)
        .flat_map(|e| &e.files)
        .filter(|f| seen.insert(f.id.clone()))
        .cloned()
        .collect()
}

/// Run the server side actions named by `data.action`
///
/// Without `page:view` no action runs and the action name is removed, as it
/// is for names that are not registered. Failing actions are logged and
/// render as `null`.
pub async fn apply_actions(
    sections: &mut [Section],
    registry: &ActionRegistry,
    access: &AccessContext,
    page: &Node,
    version: &Version,
    view: ContentView,
) {
    let allowed = access.can(capability::PAGE_VIEW);

    for section in sections.iter_mut() {
        for element in section.elements.iter_mut() {
            let Some(name) = element.data.get("action").and_then(Value::as_str).map(str::to_string)
            else {
                continue;
            };

            let action = registry.get(&name).filter(|_| allowed);
            let Some(action) = action else {
                tracing::debug!("Skipping action '{}' of element {}", name, element.id);
                element.data.remove("action");
                continue;
            };

            let input = ActionInput {
                access,
                page,
                version,
                item: &*element,
                view,
            };
            let result = match action.run(input).await {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!("Action '{}' of element {} failed: {}", name, element.id, e);
                    Value::Null
                }
            };
            element.data.insert("action".to_string(), result);
        }
    }
}
