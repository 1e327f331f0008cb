//! Page Service - Mutations
//!
//! Editor facing writes on pages, reusable elements and files. Every write
//! runs in one retryable transaction and appends a version; nothing is
//! edited in place.
//!
//! # Saving a page
//!
//! The input map is split into core fields (`data`) and element lists
//! (`aux`: `meta`, `config`, `content`). Both are merged over the latest
//! version, so a save may carry only the fields that changed. `null` core
//! fields are stored as empty strings. After the new version is written the
//! history is pruned to the configured retention.
//!
//! # Conflicts
//!
//! Creating a page whose `(domain, path)` is taken, or an element or file
//! whose id exists, returns the existing entity instead of failing. Generation
//! agents retry non-idempotently and rely on that.

use crate::auth::{capability, AccessContext};
use crate::db::events::DomainEvent;
use crate::db::{
    entity_store, node_store, transaction, version_store, with_retry, DatabaseService,
};
use crate::hierarchy::Position;
use crate::models::{
    Element, ElementInput, File, FileInput, NewVersion, Node, NodeId, Route, Version, Versionable,
};
use crate::services::config::CmsConfig;
use crate::services::error::{CmsError, Result};
use crate::services::hierarchy_service::{self, HierarchyStore, DOMAIN_EVENT_CHANNEL_CAPACITY};
use crate::services::query_service::PageItem;
use crate::services::version_ledger::{self, VersionLedger};
use crate::utils::{slugify, uid};
use chrono::{DateTime, Utc};
use libsql::Connection;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Input keys stored in `aux` instead of `data`
const AUX_KEYS: [&str; 3] = ["meta", "config", "content"];

/// Split page input into `(data, aux)`
pub fn split_input(input: &Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut data = Map::new();
    let mut aux = Map::new();

    for (key, value) in input {
        if AUX_KEYS.contains(&key.as_str()) {
            aux.insert(key.clone(), value.clone());
        } else {
            data.insert(key.clone(), value.clone());
        }
    }
    (data, aux)
}

/// `update` over `base`, with `null` core fields stored as empty strings
pub fn merge_data(base: &Map<String, Value>, update: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (key, value) in update {
        let value = match value {
            Value::Null => Value::String(String::new()),
            other => other.clone(),
        };
        merged.insert(key.clone(), value);
    }
    merged
}

pub fn merge_aux(base: &Map<String, Value>, update: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    merged.extend(update.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

fn text(map: &Map<String, Value>, key: &str) -> String {
    match map.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn lang_of(data: &Map<String, Value>) -> Option<String> {
    Some(text(data, "lang")).filter(|lang| !lang.is_empty())
}

/// Where a new page goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// After all existing root pages
    Root,
    /// Last child of a page
    Child(NodeId),
    /// Directly before a sibling
    Before(NodeId),
}

impl Placement {
    pub fn new(parent: Option<NodeId>, before: Option<NodeId>) -> Self {
        match (parent, before) {
            (_, Some(sibling)) => Self::Before(sibling),
            (Some(parent), None) => Self::Child(parent),
            (None, None) => Self::Root,
        }
    }
}

#[derive(Clone)]
pub struct PageService {
    db: Arc<DatabaseService>,
    config: CmsConfig,
    hierarchy: HierarchyStore,
    ledger: VersionLedger,
    event_tx: broadcast::Sender<DomainEvent>,
}

impl PageService {
    pub fn new(db: Arc<DatabaseService>, config: CmsConfig) -> Self {
        let (event_tx, _) = broadcast::channel(DOMAIN_EVENT_CHANNEL_CAPACITY);
        let attempts = config.retry_attempts;

        Self {
            hierarchy: HierarchyStore::new(db.clone(), attempts).with_event_sender(event_tx.clone()),
            ledger: VersionLedger::new(db.clone(), attempts).with_event_sender(event_tx.clone()),
            db,
            config,
            event_tx,
        }
    }

    pub fn hierarchy(&self) -> &HierarchyStore {
        &self.hierarchy
    }

    pub fn ledger(&self) -> &VersionLedger {
        &self.ledger
    }

    pub fn config(&self) -> &CmsConfig {
        &self.config
    }

    pub fn subscribe_to_events(&self) -> broadcast::Receiver<DomainEvent> {
        self.event_tx.subscribe()
    }

    fn emit_event(&self, event: DomainEvent) {
        let _ = self.event_tx.send(event);
    }

    fn version_created(&self, tenant: &str, version: &Version) {
        self.emit_event(DomainEvent::VersionCreated {
            tenant_id: tenant.to_string(),
            versionable: version.versionable,
            versionable_id: version.versionable_id.clone(),
            version_id: version.id,
        });
    }

    //
    // PAGES
    //

    /// Create a page with its route and first version
    ///
    /// A missing `path` is derived from the title.
    pub async fn create_page(
        &self,
        access: &AccessContext,
        input: &Map<String, Value>,
        placement: Placement,
    ) -> Result<PageItem> {
        access.require(capability::PAGE_ADD)?;

        let tenant = access.tenant_id.as_str();
        let (data, aux) = split_input(input);
        let mut data = merge_data(&Map::new(), &data);
        if text(&data, "path").is_empty() {
            data.insert("path".to_string(), Value::String(slugify(&text(&data, "title"))));
        }

        let domain = text(&data, "domain");
        let path = text(&data, "path");
        let mut version_input = NewVersion::draft(access.editor())
            .with_data(data.clone())
            .with_aux(aux);
        version_input.lang = lang_of(&data);

        let route = (domain, path);
        let (route, version_input) = (&route, &version_input);
        let created = with_retry("create_page", self.config.retry_attempts, || async move {
            let conn = self.db.connect_with_timeout().await?;
            transaction::begin(&conn).await?;
            let result = create_page_in_tx(&conn, tenant, placement, route, version_input).await;
            transaction::finish(&conn, result).await
        })
        .await;

        let (node, version) = match created {
            Ok(created) => created,
            Err(CmsError::Conflict(context)) => {
                tracing::info!(
                    "Page '{}{}' already exists ({}), returning it",
                    route.0,
                    route.1,
                    context
                );
                return self.page_at(tenant, &route.0, &route.1).await;
            }
            Err(e) => return Err(e),
        };

        self.emit_event(DomainEvent::PageCreated {
            tenant_id: tenant.to_string(),
            page_id: node.id,
        });
        self.version_created(tenant, &version);

        Ok(PageItem {
            node,
            latest: Some(version),
        })
    }

    async fn page_at(&self, tenant: &str, domain: &str, path: &str) -> Result<PageItem> {
        let node = self
            .hierarchy
            .find_by_path(tenant, domain, path)
            .await?
            .ok_or_else(|| CmsError::not_found(format!("page '{}{}'", domain, path)))?;
        let latest = self.ledger.latest(Versionable::Page, &node.id.to_string()).await?;
        Ok(PageItem { node, latest })
    }

    /// Page with its latest version
    pub async fn page(&self, access: &AccessContext, id: NodeId) -> Result<PageItem> {
        access.require(capability::PAGE_VIEW)?;
        let node = self.hierarchy.get(&access.tenant_id, id).await?;
        let latest = self.ledger.latest(Versionable::Page, &id.to_string()).await?;
        Ok(PageItem { node, latest })
    }

    /// Append a version merged over the latest one
    pub async fn save_page(
        &self,
        access: &AccessContext,
        id: NodeId,
        input: &Map<String, Value>,
        elements: &[String],
        files: &[String],
    ) -> Result<PageItem> {
        access.require(capability::PAGE_SAVE)?;

        let tenant = access.tenant_id.as_str();
        let editor = access.editor();
        let (data, aux) = split_input(input);
        let (data, aux, editor) = (&data, &aux, editor.as_str());
        let retain = self.config.versions_retained;

        let (node, version, pruned) = with_retry("save_page", self.config.retry_attempts, || async move {
            let conn = self.db.connect_with_timeout().await?;
            transaction::begin(&conn).await?;
            let result = save_page_in_tx(&conn, tenant, id, editor, data, aux, elements, files, retain).await;
            transaction::finish(&conn, result).await
        })
        .await?;

        self.version_created(tenant, &version);
        if pruned > 0 {
            tracing::debug!("Pruned {} version(s) of page {}", pruned, id);
            self.emit_event(DomainEvent::VersionsPruned {
                versionable: Versionable::Page,
                versionable_id: id.to_string(),
                removed: pruned,
            });
        }

        Ok(PageItem {
            node,
            latest: Some(version),
        })
    }

    pub async fn move_page(
        &self,
        access: &AccessContext,
        id: NodeId,
        parent: Option<NodeId>,
        position: Position,
    ) -> Result<Node> {
        access.require(capability::PAGE_MOVE)?;
        self.hierarchy
            .move_subtree(&access.tenant_id, id, parent, position)
            .await
    }

    pub async fn trash_page(&self, access: &AccessContext, id: NodeId) -> Result<Vec<NodeId>> {
        access.require(capability::PAGE_DROP)?;
        self.hierarchy.trash(&access.tenant_id, id).await
    }

    pub async fn restore_page(&self, access: &AccessContext, id: NodeId) -> Result<Vec<NodeId>> {
        access.require(capability::PAGE_DROP)?;
        self.hierarchy.restore(&access.tenant_id, id).await
    }

    /// Hard delete a page subtree with routes and versions
    pub async fn purge_page(&self, access: &AccessContext, id: NodeId) -> Result<Vec<NodeId>> {
        access.require(capability::PAGE_PURGE)?;
        self.hierarchy.purge(&access.tenant_id, id).await
    }

    /// Publish the latest page version now or at `at`
    pub async fn publish_page(
        &self,
        access: &AccessContext,
        id: NodeId,
        at: Option<DateTime<Utc>>,
    ) -> Result<Version> {
        access.require(capability::PAGE_PUBLISH)?;
        self.hierarchy.get(&access.tenant_id, id).await?;
        self.ledger.publish(Versionable::Page, &id.to_string(), at).await
    }

    /// Promote the tenant's due scheduled versions of every entity kind
    pub async fn publish_due(&self, access: &AccessContext) -> Result<Vec<Version>> {
        access.require(capability::PAGE_PUBLISH)?;
        self.ledger.publish_due(&access.tenant_id, Utc::now()).await
    }

    //
    // ELEMENTS AND FILES
    //

    async fn create_entity(
        &self,
        access: &AccessContext,
        kind: Versionable,
        id: Option<&str>,
        input: NewVersion,
    ) -> Result<Version> {
        let tenant = access.tenant_id.as_str();
        let id = id.map(str::to_string).unwrap_or_else(uid);
        let (entity_id, input) = (id.as_str(), &input);

        let created = with_retry("create_entity", self.config.retry_attempts, || async move {
            let conn = self.db.connect_with_timeout().await?;
            transaction::begin(&conn).await?;
            let result: Result<Version> = async {
                entity_store::insert_entity(&conn, kind, tenant, entity_id, Utc::now()).await?;
                version_ledger::create_in_tx(&conn, tenant, kind, entity_id, input, Utc::now()).await
            }
            .await;
            transaction::finish(&conn, result).await
        })
        .await;

        match created {
            Ok(version) => {
                self.version_created(tenant, &version);
                Ok(version)
            }
            Err(CmsError::Conflict(context)) => {
                let conn = self.db.connect_with_timeout().await?;
                if entity_store::get_entity(&conn, kind, tenant, entity_id).await?.is_none() {
                    tracing::warn!("{} {} is taken by another tenant", kind, entity_id);
                    return Err(CmsError::Conflict(context));
                }

                tracing::info!("{} {} already exists, returning it", kind, entity_id);
                self.ledger
                    .latest(kind, entity_id)
                    .await?
                    .ok_or_else(|| CmsError::not_found(format!("{} {}", kind, entity_id)))
            }
            Err(e) => Err(e),
        }
    }

    /// Publish an element or file the caller's tenant owns
    async fn publish_entity(
        &self,
        access: &AccessContext,
        kind: Versionable,
        id: &str,
        at: Option<DateTime<Utc>>,
    ) -> Result<Version> {
        access.require(capability::PAGE_PUBLISH)?;
        let conn = self.db.connect_with_timeout().await?;
        entity_store::get_entity(&conn, kind, &access.tenant_id, id)
            .await?
            .ok_or_else(|| CmsError::not_found(format!("{} {}", kind, id)))?;
        self.ledger.publish(kind, id, at).await
    }

    async fn save_entity(
        &self,
        access: &AccessContext,
        kind: Versionable,
        id: &str,
        input: NewVersion,
    ) -> Result<Version> {
        let tenant = access.tenant_id.as_str();
        let input = &input;
        let retain = self.config.versions_retained;

        let version = with_retry("save_entity", self.config.retry_attempts, || async move {
            let conn = self.db.connect_with_timeout().await?;
            transaction::begin(&conn).await?;
            let result: Result<Version> = async {
                entity_store::get_entity(&conn, kind, tenant, id)
                    .await?
                    .filter(|row| row.deleted_at.is_none())
                    .ok_or_else(|| CmsError::not_found(format!("{} {}", kind, id)))?;

                let now = Utc::now();
                let version = version_ledger::create_in_tx(&conn, tenant, kind, id, input, now).await?;
                version_ledger::prune_in_tx(&conn, kind, id, retain, now).await?;
                Ok(version)
            }
            .await;
            transaction::finish(&conn, result).await
        })
        .await?;

        self.version_created(tenant, &version);
        Ok(version)
    }

    async fn trash_entity(&self, access: &AccessContext, kind: Versionable, id: &str) -> Result<()> {
        let tenant = access.tenant_id.as_str();
        let conn = self.db.connect_with_timeout().await?;
        let changed = entity_store::set_entity_deleted(&conn, kind, tenant, id, Some(Utc::now())).await?;
        if changed == 0 {
            return Err(CmsError::not_found(format!("{} {}", kind, id)));
        }

        self.emit_event(DomainEvent::EntityTrashed {
            tenant_id: tenant.to_string(),
            versionable: kind,
            id: id.to_string(),
        });
        Ok(())
    }

    fn element_version(access: &AccessContext, input: &ElementInput, files: &[String]) -> NewVersion {
        let mut version = NewVersion::draft(access.editor()).with_data(input.to_version_data());
        version.lang = input.lang.clone();
        version.files = files.to_vec();
        version
    }

    fn file_version(access: &AccessContext, input: &FileInput) -> NewVersion {
        let mut version = NewVersion::draft(access.editor()).with_data(input.to_version_data());
        version.lang = input.lang.clone();
        version
    }

    async fn element_of(&self, version: &Version) -> Result<Element> {
        let conn = self.db.connect_with_timeout().await?;
        let files = version_store::attached_files(&conn, version.id).await?;
        Ok(Element::from_version(version, files))
    }

    /// Create a reusable element, `id` defaults to a fresh uid
    pub async fn create_element(
        &self,
        access: &AccessContext,
        id: Option<&str>,
        input: &ElementInput,
        files: &[String],
    ) -> Result<Element> {
        access.require(capability::ELEMENT_SAVE)?;
        let version = Self::element_version(access, input, files);
        let version = self.create_entity(access, Versionable::Element, id, version).await?;
        self.element_of(&version).await
    }

    pub async fn save_element(
        &self,
        access: &AccessContext,
        id: &str,
        input: &ElementInput,
        files: &[String],
    ) -> Result<Element> {
        access.require(capability::ELEMENT_SAVE)?;
        let version = Self::element_version(access, input, files);
        let version = self.save_entity(access, Versionable::Element, id, version).await?;
        self.element_of(&version).await
    }

    pub async fn trash_element(&self, access: &AccessContext, id: &str) -> Result<()> {
        access.require(capability::ELEMENT_SAVE)?;
        self.trash_entity(access, Versionable::Element, id).await
    }

    pub async fn publish_element(
        &self,
        access: &AccessContext,
        id: &str,
        at: Option<DateTime<Utc>>,
    ) -> Result<Version> {
        self.publish_entity(access, Versionable::Element, id, at).await
    }

    pub async fn create_file(
        &self,
        access: &AccessContext,
        id: Option<&str>,
        input: &FileInput,
    ) -> Result<File> {
        access.require(capability::FILE_SAVE)?;
        let version = Self::file_version(access, input);
        let version = self.create_entity(access, Versionable::File, id, version).await?;
        Ok(File::from_version(&version))
    }

    pub async fn save_file(&self, access: &AccessContext, id: &str, input: &FileInput) -> Result<File> {
        access.require(capability::FILE_SAVE)?;
        let version = Self::file_version(access, input);
        let version = self.save_entity(access, Versionable::File, id, version).await?;
        Ok(File::from_version(&version))
    }

    pub async fn trash_file(&self, access: &AccessContext, id: &str) -> Result<()> {
        access.require(capability::FILE_SAVE)?;
        self.trash_entity(access, Versionable::File, id).await
    }

    pub async fn publish_file(
        &self,
        access: &AccessContext,
        id: &str,
        at: Option<DateTime<Utc>>,
    ) -> Result<Version> {
        self.publish_entity(access, Versionable::File, id, at).await
    }
}

async fn create_page_in_tx(
    conn: &Connection,
    tenant: &str,
    placement: Placement,
    route: &(String, String),
    input: &NewVersion,
) -> Result<(Node, Version)> {
    let now = Utc::now();
    let (parent, position) = match placement {
        Placement::Root => (None, Position::Last),
        Placement::Child(parent) => (Some(parent), Position::Last),
        Placement::Before(sibling) => {
            let sibling_node = node_store::get_node(conn, tenant, sibling)
                .await?
                .ok_or_else(|| CmsError::not_found(format!("page {}", sibling)))?;
            (sibling_node.parent_id, Position::Before(sibling))
        }
    };

    let node = hierarchy_service::insert_in_tx(conn, tenant, parent, position, now).await?;
    node_store::upsert_route(
        conn,
        &Route {
            node_id: node.id,
            tenant_id: tenant.to_string(),
            domain: route.0.clone(),
            path: route.1.clone(),
        },
    )
    .await?;

    let version =
        version_ledger::create_in_tx(conn, tenant, Versionable::Page, &node.id.to_string(), input, now)
            .await?;
    Ok((node, version))
}

#[allow(clippy::too_many_arguments)]
async fn save_page_in_tx(
    conn: &Connection,
    tenant: &str,
    id: NodeId,
    editor: &str,
    data: &Map<String, Value>,
    aux: &Map<String, Value>,
    elements: &[String],
    files: &[String],
    retain: usize,
) -> Result<(Node, Version, u64)> {
    let now = Utc::now();
    let entity_id = id.to_string();

    let node = node_store::get_node(conn, tenant, id)
        .await?
        .ok_or_else(|| CmsError::not_found(format!("page {}", id)))?;
    let latest = version_store::latest(conn, Versionable::Page, &entity_id).await?;

    let (base_data, base_aux) = latest
        .as_ref()
        .map(|v| (v.data.clone(), v.aux.clone()))
        .unwrap_or_default();
    let data = merge_data(&base_data, data);
    let aux = merge_aux(&base_aux, aux);

    let route = Route {
        node_id: id,
        tenant_id: tenant.to_string(),
        domain: text(&data, "domain"),
        path: text(&data, "path"),
    };
    if node_store::get_route(conn, tenant, id).await?.as_ref() != Some(&route) {
        node_store::upsert_route(conn, &route).await?;
    }

    let input = NewVersion {
        lang: lang_of(&data),
        editor: editor.to_string(),
        data,
        aux,
        elements: elements.to_vec(),
        files: files.to_vec(),
        ..Default::default()
    };

    let version = version_ledger::create_in_tx(conn, tenant, Versionable::Page, &entity_id, &input, now).await?;
    let pruned = version_ledger::prune_in_tx(conn, Versionable::Page, &entity_id, retain, now).await?;

    Ok((node, version, pruned))
}
