//! Server Side Content Actions
//!
//! A content element may name an action in `data.action`. While the page is
//! resolved the action runs with the page and the element, and its JSON
//! result replaces the action name. Actions are looked up by name in an
//! [`ActionRegistry`] built at startup.

mod blog;

pub use blog::BlogAction;

use crate::auth::AccessContext;
use crate::models::{Node, Version};
use crate::services::content_resolver::{ContentView, ResolvedElement};
use crate::services::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// What an action is invoked with
#[derive(Debug, Clone, Copy)]
pub struct ActionInput<'a> {
    pub access: &'a AccessContext,
    pub page: &'a Node,
    pub version: &'a Version,
    pub item: &'a ResolvedElement,
    pub view: ContentView,
}

#[async_trait]
pub trait ContentAction: Send + Sync {
    async fn run(&self, input: ActionInput<'_>) -> Result<Value>;
}

#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn ContentAction>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, action: Arc<dyn ContentAction>) {
        self.actions.insert(name.into(), action);
    }

    pub fn with(mut self, name: impl Into<String>, action: Arc<dyn ContentAction>) -> Self {
        self.register(name, action);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ContentAction>> {
        self.actions.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
