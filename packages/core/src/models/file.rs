//! File metadata records

use super::version::Version;
use crate::utils::{localized, LangMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Shared file as seen through one of its versions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    pub id: String,
    pub name: String,

    /// Storage path or absolute URL
    pub path: String,
    pub mime: String,

    /// Alternative text per language
    pub description: LangMap,

    /// Transcription per language
    pub transcription: LangMap,

    pub editor: String,
    pub version_id: i64,
}

impl File {
    pub fn from_version(version: &Version) -> Self {
        let input = FileInput::from_data(&version.data);

        Self {
            id: version.versionable_id.clone(),
            name: input.name,
            path: input.path,
            mime: input.mime,
            description: input.description,
            transcription: input.transcription,
            editor: version.editor.clone(),
            version_id: version.id,
        }
    }

    pub fn is_remote(&self) -> bool {
        self.path.starts_with("http")
    }

    /// Metadata with description and transcription picked for `lang`
    pub fn localize(&self, lang: &str) -> ResolvedFile {
        ResolvedFile {
            id: self.id.clone(),
            name: self.name.clone(),
            path: self.path.clone(),
            mime: self.mime.clone(),
            description: localized(&self.description, lang).map(str::to_string),
            transcription: localized(&self.transcription, lang).map(str::to_string),
        }
    }
}

/// File metadata ready for rendering in one language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedFile {
    pub id: String,
    pub name: String,
    pub path: String,
    pub mime: String,
    pub description: Option<String>,
    pub transcription: Option<String>,
}

/// Input for creating or saving a file record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileInput {
    #[serde(default)]
    pub name: String,
    pub path: String,
    pub mime: String,
    pub lang: Option<String>,
    #[serde(default)]
    pub description: LangMap,
    #[serde(default)]
    pub transcription: LangMap,
}

impl FileInput {
    pub fn to_version_data(&self) -> serde_json::Map<String, Value> {
        let mut data = serde_json::Map::new();
        data.insert("name".to_string(), Value::String(self.name.clone()));
        data.insert("path".to_string(), Value::String(self.path.clone()));
        data.insert("mime".to_string(), Value::String(self.mime.clone()));
        data.insert("description".to_string(), lang_map_value(&self.description));
        data.insert("transcription".to_string(), lang_map_value(&self.transcription));
        data
    }

    fn from_data(data: &serde_json::Map<String, Value>) -> Self {
        let text = |key: &str| {
            data.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Self {
            name: text("name"),
            path: text("path"),
            mime: text("mime"),
            lang: None,
            description: lang_map_from(data.get("description")),
            transcription: lang_map_from(data.get("transcription")),
        }
    }
}

fn lang_map_value(map: &LangMap) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

fn lang_map_from(value: Option<&Value>) -> LangMap {
    value
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}
