//! Content Service
//!
//! Renders a page: locate the node by address or id, pick the version for
//! the requested view, load the elements and files attached to it and run
//! the content resolver over `aux.content`.
//!
//! Published rendering uses effective versions throughout (page, elements
//! and files). Preview uses latest versions and requires `page:view`.

use crate::actions::ActionRegistry;
use crate::auth::{capability, AccessContext};
use crate::db::{node_store, version_store, DatabaseService};
use crate::models::{ContentElement, Element, File, Node, NodeId, Version, Versionable};
use crate::services::content_resolver::{
    apply_actions, collect_files, resolve, version_lang, ContentView, ResolvedDocument,
};
use crate::services::error::{CmsError, Result};
use chrono::{DateTime, Utc};
use libsql::Connection;
use std::collections::HashMap;
use std::sync::Arc;

pub(crate) type Pools = (HashMap<String, Element>, HashMap<String, File>);

fn effective_at(view: ContentView, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match view {
        ContentView::Published => Some(now),
        ContentView::Preview => None,
    }
}

/// Elements and files attached to a page version, keyed by id
///
/// Files used by attached elements are part of the file pool too.
pub(crate) async fn load_pools(
    conn: &Connection,
    version: &Version,
    view: ContentView,
    now: DateTime<Utc>,
) -> Result<Pools> {
    let at = effective_at(view, now);

    let element_ids = version_store::attached_elements(conn, version.id).await?;
    let mut file_ids = version_store::attached_files(conn, version.id).await?;

    let mut elements = HashMap::new();
    for element_version in version_store::current_for_many(conn, Versionable::Element, &element_ids, at).await? {
        let files = version_store::attached_files(conn, element_version.id).await?;
        file_ids.extend(files.iter().cloned());
        let element = Element::from_version(&element_version, files);
        elements.insert(element.id.clone(), element);
    }

    file_ids.sort_unstable();
    file_ids.dedup();

    let files = version_store::current_for_many(conn, Versionable::File, &file_ids, at)
        .await?
        .iter()
        .map(File::from_version)
        .map(|file| (file.id.clone(), file))
        .collect();

    Ok((elements, files))
}

#[derive(Clone)]
pub struct ContentService {
    db: Arc<DatabaseService>,
    actions: ActionRegistry,
}

impl ContentService {
    pub fn new(db: Arc<DatabaseService>, actions: ActionRegistry) -> Self {
        Self { db, actions }
    }

    /// Render the page at `(domain, path)`
    pub async fn render_path(
        &self,
        access: &AccessContext,
        domain: &str,
        path: &str,
        view: ContentView,
    ) -> Result<ResolvedDocument> {
        let conn = self.db.connect_with_timeout().await?;
        let id = node_store::find_by_path(&conn, &access.tenant_id, domain, path)
            .await?
            .ok_or_else(|| CmsError::not_found(format!("page '{}{}'", domain, path)))?;
        self.render_node(&conn, access, id, view).await
    }

    pub async fn render(
        &self,
        access: &AccessContext,
        id: NodeId,
        view: ContentView,
    ) -> Result<ResolvedDocument> {
        let conn = self.db.connect_with_timeout().await?;
        self.render_node(&conn, access, id, view).await
    }

    async fn render_node(
        &self,
        conn: &Connection,
        access: &AccessContext,
        id: NodeId,
        view: ContentView,
    ) -> Result<ResolvedDocument> {
        if view == ContentView::Preview {
            access.require(capability::PAGE_VIEW)?;
        }

        let page: Node = node_store::get_node(conn, &access.tenant_id, id)
            .await?
            .filter(|node| !node.is_trashed())
            .ok_or_else(|| CmsError::not_found(format!("page {}", id)))?;

        let now = Utc::now();
        let entity_id = id.to_string();
        let version = match view {
            ContentView::Published => {
                version_store::effective(conn, Versionable::Page, &entity_id, None, now).await?
            }
            ContentView::Preview => version_store::latest(conn, Versionable::Page, &entity_id).await?,
        }
        .ok_or_else(|| CmsError::not_found(format!("page {} has no {:?} version", id, view)))?;

        let (elements, files) = load_pools(conn, &version, view, now).await?;
        let lang = version_lang(&version).to_string();
        let content = ContentElement::list_from_value(version.aux.get("content"));

        let mut sections = resolve(&content, &elements, &files, &lang);
        apply_actions(&mut sections, &self.actions, access, &page, &version, view).await;

        tracing::debug!(
            "Rendered page {} version {} with {} section(s)",
            id,
            version.id,
            sections.len()
        );

        Ok(ResolvedDocument {
            files: collect_files(&sections),
            page,
            version,
            lang,
            sections,
        })
    }
}
