//! Shared helpers for integration tests
#![allow(dead_code)]

use anyhow::Result;
use pagetree_core::db::DatabaseService;
use pagetree_core::{AccessContext, CmsConfig, PageService, QueryService};
use serde_json::{Map, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

pub const TENANT: &str = "demo";

/// Route test logs through `RUST_LOG`
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub async fn create_test_db() -> Result<(Arc<DatabaseService>, TempDir)> {
    init_test_tracing();
    let temp_dir = TempDir::new()?;
    let db = DatabaseService::new(temp_dir.path().join("test.db")).await?;
    Ok((Arc::new(db), temp_dir))
}

pub struct TestServices {
    pub db: Arc<DatabaseService>,
    pub pages: PageService,
    pub queries: QueryService,
    pub _dir: TempDir,
}

pub async fn create_services(config: CmsConfig) -> Result<TestServices> {
    let (db, dir) = create_test_db().await?;
    Ok(TestServices {
        pages: PageService::new(db.clone(), config.clone()),
        queries: QueryService::new(db.clone(), config.page_limits()),
        db,
        _dir: dir,
    })
}

/// Editor holding every capability
pub fn editor() -> AccessContext {
    AccessContext::new(TENANT).with_user("Editor").with_all_grants()
}

/// Visitor without any capability
pub fn visitor() -> AccessContext {
    AccessContext::new(TENANT).with_ip("203.0.113.9")
}

pub fn map(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
