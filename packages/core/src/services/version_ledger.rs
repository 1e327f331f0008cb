//! Version Ledger
//!
//! Append-only version history of pages, elements and files with the
//! draft / scheduled / published state machine.
//!
//! - `create` always appends, it never touches a prior version
//! - `latest` is the newest non-deleted version (editor preview)
//! - `effective` is the newest published version whose `publish_at` passed
//! - `prune` keeps the N newest versions plus the effective one
//!
//! Concurrent saves produce two versions; the later one becomes latest.

use crate::db::events::DomainEvent;
use crate::db::{entity_store, transaction, version_store, with_retry, DatabaseService};
use crate::models::{NewVersion, Version, Versionable};
use crate::services::error::{CmsError, Result};
use crate::services::hierarchy_service::DOMAIN_EVENT_CHANNEL_CAPACITY;
use chrono::{DateTime, Utc};
use libsql::Connection;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Append a version inside an open transaction
///
/// Element and file ids that do not exist for the tenant are dropped before
/// they are attached.
pub(crate) async fn create_in_tx(
    conn: &Connection,
    tenant: &str,
    kind: Versionable,
    entity_id: &str,
    input: &NewVersion,
    now: DateTime<Utc>,
) -> Result<Version> {
    let mut input = input.clone();
    input.elements = entity_store::existing_ids(conn, Versionable::Element, tenant, &input.elements).await?;
    input.files = entity_store::existing_ids(conn, Versionable::File, tenant, &input.files).await?;

    Ok(version_store::insert_version(conn, tenant, kind, entity_id, &input, now).await?)
}

/// Delete all but the `retain` newest versions, sparing the effective one
pub(crate) async fn prune_in_tx(
    conn: &Connection,
    kind: Versionable,
    entity_id: &str,
    retain: usize,
    now: DateTime<Utc>,
) -> Result<u64> {
    let ids = version_store::version_ids(conn, kind, entity_id).await?;
    if ids.len() <= retain {
        return Ok(0);
    }

    let effective = version_store::effective(conn, kind, entity_id, None, now)
        .await?
        .map(|v| v.id);

    let doomed: Vec<i64> = ids
        .into_iter()
        .skip(retain)
        .filter(|id| Some(*id) != effective)
        .collect();

    Ok(version_store::delete_versions(conn, &doomed).await?)
}

#[derive(Clone)]
pub struct VersionLedger {
    db: Arc<DatabaseService>,
    retry_attempts: usize,
    event_tx: broadcast::Sender<DomainEvent>,
}

impl VersionLedger {
    pub fn new(db: Arc<DatabaseService>, retry_attempts: usize) -> Self {
        let (event_tx, _) = broadcast::channel(DOMAIN_EVENT_CHANNEL_CAPACITY);
        Self {
            db,
            retry_attempts,
            event_tx,
        }
    }

    pub fn with_event_sender(mut self, event_tx: broadcast::Sender<DomainEvent>) -> Self {
        self.event_tx = event_tx;
        self
    }

    pub fn subscribe_to_events(&self) -> broadcast::Receiver<DomainEvent> {
        self.event_tx.subscribe()
    }

    fn emit_event(&self, event: DomainEvent) {
        let _ = self.event_tx.send(event);
    }

    pub async fn create(
        &self,
        tenant: &str,
        kind: Versionable,
        entity_id: &str,
        input: &NewVersion,
    ) -> Result<Version> {
        let version = with_retry("create_version", self.retry_attempts, || async move {
            let conn = self.db.connect_with_timeout().await?;
            transaction::begin(&conn).await?;
            let result = create_in_tx(&conn, tenant, kind, entity_id, input, Utc::now()).await;
            transaction::finish(&conn, result).await
        })
        .await?;

        self.emit_event(DomainEvent::VersionCreated {
            tenant_id: tenant.to_string(),
            versionable: kind,
            versionable_id: entity_id.to_string(),
            version_id: version.id,
        });
        Ok(version)
    }

    pub async fn latest(&self, kind: Versionable, entity_id: &str) -> Result<Option<Version>> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(version_store::latest(&conn, kind, entity_id).await?)
    }

    pub async fn effective(
        &self,
        kind: Versionable,
        entity_id: &str,
        lang: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<Version>> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(version_store::effective(&conn, kind, entity_id, lang, now).await?)
    }

    pub async fn history(&self, kind: Versionable, entity_id: &str, limit: usize) -> Result<Vec<Version>> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(version_store::history(&conn, kind, entity_id, limit).await?)
    }

    /// Publish the latest version now (`at = None`) or schedule it
    pub async fn publish(
        &self,
        kind: Versionable,
        entity_id: &str,
        at: Option<DateTime<Utc>>,
    ) -> Result<Version> {
        let version = with_retry("publish", self.retry_attempts, || async move {
            let conn = self.db.connect_with_timeout().await?;
            transaction::begin(&conn).await?;
            let result: Result<Version> = async {
                let latest = version_store::latest(&conn, kind, entity_id)
                    .await?
                    .ok_or_else(|| CmsError::not_found(format!("{} {} has no version", kind, entity_id)))?;

                version_store::set_publication(&conn, latest.id, at).await?;
                Ok(Version {
                    published: at.is_none(),
                    publish_at: at,
                    ..latest
                })
            }
            .await;
            transaction::finish(&conn, result).await
        })
        .await?;

        match at {
            None => self.emit_event(DomainEvent::VersionPublished {
                versionable: kind,
                versionable_id: entity_id.to_string(),
                version_id: version.id,
            }),
            Some(at) => tracing::info!("Scheduled {} {} for {}", kind, entity_id, at),
        }
        Ok(version)
    }

    /// Promote scheduled versions whose time has come
    pub async fn publish_due(&self, tenant: &str, now: DateTime<Utc>) -> Result<Vec<Version>> {
        let promoted = with_retry("publish_due", self.retry_attempts, || async move {
            let conn = self.db.connect_with_timeout().await?;
            transaction::begin(&conn).await?;
            let result: Result<Vec<Version>> = async {
                let due = version_store::due_versions(&conn, tenant, now).await?;
                for version in &due {
                    version_store::mark_published(&conn, version.id).await?;
                }
                Ok(due
                    .into_iter()
                    .map(|v| Version {
                        published: true,
                        ..v
                    })
                    .collect())
            }
            .await;
            transaction::finish(&conn, result).await
        })
        .await?;

        if !promoted.is_empty() {
            tracing::info!("Published {} scheduled version(s) for {}", promoted.len(), tenant);
        }
        for version in &promoted {
            self.emit_event(DomainEvent::VersionPublished {
                versionable: version.versionable,
                versionable_id: version.versionable_id.clone(),
                version_id: version.id,
            });
        }
        Ok(promoted)
    }

    /// Keep the `retain` newest versions plus the effective one
    pub async fn prune(&self, kind: Versionable, entity_id: &str, retain: usize) -> Result<u64> {
        let retain = retain.max(1);
        let removed = with_retry("prune", self.retry_attempts, || async move {
            let conn = self.db.connect_with_timeout().await?;
            transaction::begin(&conn).await?;
            let result = prune_in_tx(&conn, kind, entity_id, retain, Utc::now()).await;
            transaction::finish(&conn, result).await
        })
        .await?;

        if removed > 0 {
            tracing::debug!("Pruned {} version(s) of {} {}", removed, kind, entity_id);
            self.emit_event(DomainEvent::VersionsPruned {
                versionable: kind,
                versionable_id: entity_id.to_string(),
                removed,
            });
        }
        Ok(removed)
    }
}
