//! Version Records
//!
//! Versions are append-only snapshots of a page, element or file. A save
//! never changes an existing version; the only in-place changes are the
//! promotion of a due scheduled version and soft deletion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Kind of entity a version belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Versionable {
    Page,
    Element,
    File,
}

impl Versionable {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Element => "element",
            Self::File => "file",
        }
    }

    /// Backing table of the entity
    pub fn table(&self) -> &'static str {
        match self {
            Self::Page => "nodes",
            Self::Element => "elements",
            Self::File => "files",
        }
    }
}

impl fmt::Display for Versionable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Versionable {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "page" => Ok(Self::Page),
            "element" => Ok(Self::Element),
            "file" => Ok(Self::File),
            other => Err(format!("unknown versionable type '{}'", other)),
        }
    }
}

/// Publication state derived from `published` and `publish_at`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VersionState {
    Draft,
    Scheduled,
    Published,
}

/// Immutable content snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub id: i64,
    pub versionable: Versionable,
    pub versionable_id: String,
    pub lang: Option<String>,

    /// Display name of the author, client address when anonymous
    pub editor: String,

    pub published: bool,
    pub publish_at: Option<DateTime<Utc>>,

    /// Core fields (title, path, domain, theme, status, ...)
    pub data: Map<String, Value>,

    /// Auxiliary element lists (`content`, `meta`, `config`)
    pub aux: Map<String, Value>,

    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Version {
    pub fn state(&self) -> VersionState {
        if self.published {
            VersionState::Published
        } else if self.publish_at.is_some() {
            VersionState::Scheduled
        } else {
            VersionState::Draft
        }
    }

    /// Published and not scheduled for a later time
    pub fn is_effective_at(&self, now: DateTime<Utc>) -> bool {
        self.published && self.publish_at.map_or(true, |at| at <= now)
    }

    /// String field of `data`, empty when missing
    pub fn data_str(&self, key: &str) -> &str {
        self.data.get(key).and_then(Value::as_str).unwrap_or_default()
    }
}

/// Input for appending a version
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVersion {
    pub lang: Option<String>,
    pub editor: String,
    #[serde(default)]
    pub published: bool,
    pub publish_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub aux: Map<String, Value>,

    /// Reusable elements attached to the version
    #[serde(default)]
    pub elements: Vec<String>,

    /// Files attached to the version
    #[serde(default)]
    pub files: Vec<String>,
}

impl NewVersion {
    pub fn draft(editor: impl Into<String>) -> Self {
        Self {
            editor: editor.into(),
            ..Default::default()
        }
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_aux(mut self, aux: Map<String, Value>) -> Self {
        self.aux = aux;
        self
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    pub fn publish_now(mut self) -> Self {
        self.published = true;
        self.publish_at = None;
        self
    }

    /// Schedule publication, the version stays unpublished until promoted
    pub fn schedule(mut self, at: DateTime<Utc>) -> Self {
        self.published = false;
        self.publish_at = Some(at);
        self
    }

    /// State the stored version will start in
    pub fn initial_state(&self) -> VersionState {
        if self.publish_at.is_some() {
            VersionState::Scheduled
        } else if self.published {
            VersionState::Published
        } else {
            VersionState::Draft
        }
    }
}
