//! Caller context
//!
//! Authorization decisions are made outside this crate. Services only ask
//! whether a capability was granted and who should be recorded as editor.

use crate::services::error::{CmsError, Result};
use std::collections::HashSet;

/// Capability names checked by the services
pub mod capability {
    pub const PAGE_VIEW: &str = "page:view";
    pub const PAGE_SAVE: &str = "page:save";
    pub const PAGE_ADD: &str = "page:add";
    pub const PAGE_MOVE: &str = "page:move";
    pub const PAGE_DROP: &str = "page:drop";
    pub const PAGE_PUBLISH: &str = "page:publish";
    pub const PAGE_PURGE: &str = "page:purge";
    pub const ELEMENT_SAVE: &str = "element:save";
    pub const FILE_SAVE: &str = "file:save";
    pub const GENERATE: &str = "generate";
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessContext {
    pub tenant_id: String,

    /// Display name of the authenticated user
    pub user: Option<String>,

    /// Client address, recorded when nobody is logged in
    pub ip: Option<String>,

    pub grants: HashSet<String>,
}

impl AccessContext {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            ..Default::default()
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn grant(mut self, capability: impl Into<String>) -> Self {
        self.grants.insert(capability.into());
        self
    }

    /// Context holding every capability the services check
    pub fn with_all_grants(self) -> Self {
        use capability::*;
        [
            PAGE_VIEW,
            PAGE_SAVE,
            PAGE_ADD,
            PAGE_MOVE,
            PAGE_DROP,
            PAGE_PUBLISH,
            PAGE_PURGE,
            ELEMENT_SAVE,
            FILE_SAVE,
            GENERATE,
        ]
        .into_iter()
        .fold(self, |ctx, cap| ctx.grant(cap))
    }

    pub fn can(&self, capability: &str) -> bool {
        self.grants.contains(capability)
    }

    pub fn require(&self, capability: &str) -> Result<()> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(CmsError::permission_denied(capability))
        }
    }

    /// Name recorded on versions: user name, else client address
    pub fn editor(&self) -> String {
        self.user
            .as_deref()
            .filter(|name| !name.is_empty())
            .or(self.ip.as_deref())
            .unwrap_or("unknown")
            .to_string()
    }
}
