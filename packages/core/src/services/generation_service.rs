//! Generation Service
//!
//! Editor facing generation operations on top of the provider set chosen at
//! startup. Providers are never retried here: a failed or timed out call
//! surfaces as `ProviderFailure` and nothing is written.
//!
//! | operation    | capability | timeout |
//! |--------------|------------|---------|
//! | compose      | text       | short   |
//! | imagine      | image      | short   |
//! | refine       | structured | long    |
//! | synthesize   | text+tools | long    |
//! | manage       | text+tools | long    |
//! | transcribe   | audio      | short   |
//! | translate    | translator | short   |

use crate::agent::{run_agent, CmsTools};
use crate::auth::{capability, AccessContext};
use crate::db::{entity_store, version_store, DatabaseService};
use crate::models::{File, Versionable};
use crate::services::error::{CmsError, FieldErrors, Result};
use crate::services::page_service::PageService;
use crate::services::query_service::QueryService;
use crate::utils::uid;
use pagetree_ai::{
    to_webvtt, AiConfig, Attachment, ImageRequest, ImageResponse, MediaKind, MediaSource,
    ProviderError, ProviderSet, StructuredRequest, TextRequest, ToolChoice, TranscriptionRequest,
};
use regex::Regex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

mod prompts {
    pub const COMPOSE: &str = "You write content for web pages. Answer with the requested text only, \
formatted as markdown, without any introduction or closing remarks. Keep the language of the request \
unless another language is asked for.";

    pub const IMAGINE: &str = "Create a photo realistic image without any text or lettering in it.";

    pub const REFINE: &str = "You improve the texts of web page content elements. Keep the element IDs \
and types of existing elements, change only what the request asks for and return every element. \
Headings start with one or more # characters for their level.";

    pub const SYNTHESIZE: &str = "You build web pages for a content management system. Use the \
get-locales and pages tools to find out which languages exist and where pages belong, then create \
the requested page with the create-page tool.";

    pub const MANAGE: &str = "You maintain the page tree of a content management system. Inspect the \
existing pages with the pages tool before you change anything and answer briefly what you did.";
}

const EMPTY_PROMPT: &str = "Prompt must not be empty";

/// Image size the given model renders best
pub fn image_size(model: &str) -> &'static str {
    match model {
        "gpt-image-1" => "1536x1024",
        "dall-e-3" => "1792x1024",
        "dall-e-2" => "1024x1024",
        _ => "auto",
    }
}

fn join_system(parts: &[&str], context: Option<&str>) -> String {
    let mut system = parts.join("\n");
    system.push('\n');
    system.push_str(context.unwrap_or_default());
    system
}

fn require_prompt(prompt: &str) -> Result<()> {
    if prompt.trim().is_empty() {
        return Err(CmsError::validation(EMPTY_PROMPT));
    }
    Ok(())
}

/// Base64 data of the first inline image, used as reference for edits
fn reference_image(attachments: &[Attachment]) -> Option<String> {
    attachments.iter().find_map(|a| match (&a.kind, &a.source) {
        (MediaKind::Image, MediaSource::Base64 { data }) => Some(data.clone()),
        _ => None,
    })
}

/// `[revised prompt or input, images...]`
fn imagine_result(input: &str, response: ImageResponse) -> Vec<String> {
    let revised = response
        .images
        .iter()
        .filter_map(|image| image.revised_prompt.clone())
        .find(|p| !p.is_empty())
        .unwrap_or_else(|| input.to_string());

    let mut result = vec![revised];
    result.extend(
        response
            .images
            .into_iter()
            .filter_map(|image| image.base64.or(image.url))
            .filter(|image| !image.is_empty()),
    );
    result
}

/// Response schema of `refine`, element types limited to `types`
pub fn refine_schema(types: &[String]) -> Value {
    json!({
        "type": "object",
        "description": "The content response",
        "properties": {
            "contents": {
                "type": "array",
                "description": "List of page content elements",
                "items": {
                    "type": "object",
                    "description": "A content element",
                    "properties": {
                        "id": {
                            "type": ["string", "null"],
                            "description": "The ID of the content element"
                        },
                        "type": {
                            "type": "string",
                            "enum": types,
                            "description": "The type of the content element"
                        },
                        "data": {
                            "type": "array",
                            "description": "List of texts for the content element",
                            "items": {
                                "type": "object",
                                "description": "A text of the content element",
                                "properties": {
                                    "name": {
                                        "type": "string",
                                        "enum": ["title", "text"],
                                        "description": "Name of the text element"
                                    },
                                    "value": {
                                        "type": "string",
                                        "description": "Plain title, markdown text or source code text"
                                    }
                                },
                                "required": ["name", "value"]
                            }
                        }
                    },
                    "required": ["id", "type", "data"]
                }
            }
        },
        "required": ["contents"]
    })
}

fn heading_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(#+)(.*)$").unwrap())
}

fn as_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Merge refined texts over the existing content elements
///
/// Elements are matched by id; new elements keep their id or get a fresh
/// one. The element type is the response type, else the existing type, else
/// `text`. For headings a leading run of `#` is stripped and its length is
/// stored as `level`.
pub fn merge_refined(content: &[Value], response: &[Value]) -> Vec<Value> {
    let existing: HashMap<&str, &Value> = content
        .iter()
        .filter_map(|entry| Some((entry.get("id")?.as_str()?, entry)))
        .collect();

    response
        .iter()
        .map(|item| {
            let mut entry = item
                .get("id")
                .and_then(Value::as_str)
                .and_then(|id| existing.get(id))
                .and_then(|entry| entry.as_object().cloned())
                .unwrap_or_default();

            let kind = item
                .get("type")
                .and_then(Value::as_str)
                .or_else(|| entry.get("type").and_then(Value::as_str))
                .unwrap_or("text")
                .to_string();

            let mut data = entry
                .get("data")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();

            let texts = item.get("data").and_then(Value::as_array);
            for text in texts.into_iter().flatten() {
                let name = as_text(text.get("name"));
                if name.is_empty() {
                    continue;
                }
                let value = as_text(text.get("value"));

                match heading_pattern().captures(value.trim_end()).filter(|_| kind == "heading") {
                    Some(caps) => {
                        data.insert(name, json!(caps[2].trim()));
                        data.insert("level".to_string(), json!(caps[1].len().to_string()));
                    }
                    None => {
                        data.insert(name, Value::String(value));
                    }
                }
            }

            if !entry.contains_key("id") {
                let id = item
                    .get("id")
                    .and_then(Value::as_str)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(uid);
                entry.insert("id".to_string(), Value::String(id));
            }
            entry.insert("type".to_string(), Value::String(kind));
            entry.insert("data".to_string(), Value::Object(data));
            Value::Object(entry)
        })
        .collect()
}

#[derive(Clone)]
pub struct GenerationService {
    db: Arc<DatabaseService>,
    providers: ProviderSet,
    ai: AiConfig,
    pages: PageService,
    queries: QueryService,
}

impl GenerationService {
    pub fn new(
        db: Arc<DatabaseService>,
        providers: ProviderSet,
        ai: AiConfig,
        pages: PageService,
        queries: QueryService,
    ) -> Self {
        Self {
            db,
            providers,
            ai,
            pages,
            queries,
        }
    }

    /// Attachments for stored files of the tenant, in the given order
    async fn attachments(&self, tenant: &str, ids: &[String]) -> Result<Vec<Attachment>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.db.connect_with_timeout().await?;
        let ids = entity_store::existing_ids(&conn, Versionable::File, tenant, ids).await?;
        let files: HashMap<String, File> =
            version_store::current_for_many(&conn, Versionable::File, &ids, None)
                .await?
                .iter()
                .map(File::from_version)
                .map(|file| (file.id.clone(), file))
                .collect();

        let disk = self.pages.config().storage_disk.as_str();
        Ok(ids
            .iter()
            .filter_map(|id| files.get(id))
            .map(|file| Attachment::for_file(&file.path, &file.mime, disk))
            .collect())
    }

    /// Freeform text for the prompt
    pub async fn compose(
        &self,
        access: &AccessContext,
        prompt: &str,
        context: Option<&str>,
        files: &[String],
    ) -> Result<String> {
        access.require(capability::GENERATE)?;
        require_prompt(prompt)?;

        let attachments = self.attachments(&access.tenant_id, files).await?;
        let request = TextRequest::new(&self.ai.text.model, prompt)
            .with_system(join_system(&[prompts::COMPOSE], context))
            .with_attachments(attachments)
            .with_max_tokens(self.ai.max_tokens)
            .with_timeout(self.ai.short_timeout());

        let started = Instant::now();
        let response = self.providers.text.generate_text(&request).await?;
        tracing::info!(
            "compose via {} ({}) took {:?}",
            self.providers.text.name(),
            request.model,
            started.elapsed()
        );
        Ok(response.text)
    }

    /// Generated images, preceded by the prompt the provider actually used
    pub async fn imagine(
        &self,
        access: &AccessContext,
        prompt: &str,
        context: Option<&str>,
        files: &[String],
    ) -> Result<Vec<String>> {
        access.require(capability::GENERATE)?;
        require_prompt(prompt)?;

        let attachments = self.attachments(&access.tenant_id, files).await?;
        let full_prompt = [prompts::IMAGINE, context.unwrap_or_default(), prompt]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");

        let model = self.ai.image.model.as_str();
        let request = ImageRequest {
            model: model.to_string(),
            prompt: full_prompt,
            size: Some(image_size(model).to_string()),
            reference_image: reference_image(&attachments),
            timeout: self.ai.short_timeout(),
        };

        let started = Instant::now();
        let response = self.providers.image.generate_image(&request).await?;
        tracing::info!(
            "imagine via {} ({}) returned {} image(s) in {:?}",
            self.providers.image.name(),
            model,
            response.images.len(),
            started.elapsed()
        );
        Ok(imagine_result(prompt, response))
    }

    /// Rewrite the texts of content elements
    ///
    /// `kind` names the content list being refined (`content`, `meta`, ...).
    pub async fn refine(
        &self,
        access: &AccessContext,
        prompt: &str,
        kind: &str,
        content: &[Value],
        context: Option<&str>,
    ) -> Result<Vec<Value>> {
        access.require(capability::GENERATE)?;
        require_prompt(prompt)?;

        let request = StructuredRequest {
            model: self.ai.structured.model.clone(),
            system: Some(join_system(&[prompts::REFINE], context)),
            prompt: format!(
                "{}\n\nContent as JSON:\n{}",
                prompt,
                serde_json::to_string(content)?
            ),
            schema_name: "response".to_string(),
            schema: refine_schema(&self.pages.config().refine_types),
            max_tokens: self.ai.max_tokens,
            timeout: self.ai.long_timeout(),
        };

        let started = Instant::now();
        let response = self.providers.structured.generate_structured(&request).await?;
        tracing::info!(
            "refine of {} via {} ({}) took {:?}",
            kind,
            self.providers.structured.name(),
            request.model,
            started.elapsed()
        );

        if !response.is_object() {
            return Err(CmsError::provider("Invalid content in refine response"));
        }
        let items = response
            .get("contents")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(merge_refined(content, &items))
    }

    async fn run_tools(
        &self,
        access: &AccessContext,
        operation: &str,
        system: String,
        prompt: &str,
        files: &[String],
        max_steps: usize,
    ) -> Result<String> {
        access.require(capability::GENERATE)?;
        require_prompt(prompt)?;

        let attachments = self.attachments(&access.tenant_id, files).await?;
        let request = TextRequest::new(&self.ai.text.model, prompt)
            .with_system(system)
            .with_attachments(attachments)
            .with_tools(Vec::new(), ToolChoice::Any)
            .with_max_tokens(self.ai.max_tokens)
            .with_timeout(self.ai.long_timeout());

        let mut tools = CmsTools::new(self.pages.clone(), self.queries.clone(), access.clone());
        let started = Instant::now();

        match run_agent(self.providers.text.as_ref(), request, &mut tools, max_steps).await {
            Ok(run) => {
                tracing::info!(
                    "{} finished after {} step(s) and {} tool call(s) in {:?}",
                    operation,
                    run.steps,
                    run.trace.lines().len(),
                    started.elapsed()
                );
                Ok(run.trace.render())
            }
            Err(CmsError::Conflict(what)) => {
                tracing::info!("{} stopped, {} already exists", operation, what);
                Ok("Already exists\n".to_string())
            }
            Err(e) => Err(e),
        }
    }

    /// Build pages from the prompt with the page tools
    pub async fn synthesize(
        &self,
        access: &AccessContext,
        prompt: &str,
        context: Option<&str>,
        files: &[String],
    ) -> Result<String> {
        let system = join_system(&[prompts::SYNTHESIZE, prompts::COMPOSE, ""], context);
        let steps = self.pages.config().agent_max_steps_synthesize;
        self.run_tools(access, "synthesize", system, prompt, files, steps)
            .await
    }

    /// Maintain the page tree with the page tools
    pub async fn manage(
        &self,
        access: &AccessContext,
        prompt: &str,
        context: Option<&str>,
        files: &[String],
    ) -> Result<String> {
        let system = join_system(&[prompts::MANAGE, prompts::COMPOSE, ""], context);
        let steps = self.pages.config().agent_max_steps_manage;
        self.run_tools(access, "manage", system, prompt, files, steps)
            .await
    }

    /// WebVTT captions for an audio upload
    pub async fn transcribe(&self, access: &AccessContext, audio: &[u8], mime: &str) -> Result<String> {
        access.require(capability::GENERATE)?;
        if audio.is_empty() {
            return Err(CmsError::validation("No file uploaded"));
        }
        if !mime.starts_with("audio/") {
            return Err(CmsError::validation("Only audio files"));
        }

        let request = TranscriptionRequest {
            model: self.ai.audio.model.clone(),
            audio: audio.to_vec(),
            mime: mime.to_string(),
            timeout: self.ai.short_timeout(),
        };

        let started = Instant::now();
        let transcription = self.providers.audio.transcribe_audio(&request).await?;
        tracing::info!(
            "transcribe via {} ({}) produced {} segment(s) in {:?}",
            self.providers.audio.name(),
            request.model,
            transcription.segments.len(),
            started.elapsed()
        );
        Ok(to_webvtt(&transcription.segments))
    }

    /// Translate texts, preserving their order
    pub async fn translate(
        &self,
        access: &AccessContext,
        texts: &[String],
        to: &str,
        from: Option<&str>,
        context: Option<&str>,
    ) -> Result<Vec<String>> {
        access.require(capability::GENERATE)?;
        if texts.is_empty() {
            return Err(CmsError::validation("Input texts must not be empty"));
        }
        if to.trim().is_empty() {
            return Err(CmsError::validation("Target language must not be empty"));
        }

        let from = from.filter(|lang| !lang.is_empty());
        let started = Instant::now();
        let translated = self
            .providers
            .translator
            .translate(texts, to, from, context)
            .await
            .map_err(|e| match e {
                ProviderError::ConfigError(message) => CmsError::validation(message),
                other => CmsError::from(other),
            })?;

        tracing::info!(
            "Translated {} text(s) to {} in {:?}",
            texts.len(),
            to,
            started.elapsed()
        );
        Ok(translated)
    }

    /// Translate named fields, empty fields stay empty
    ///
    /// Fields the translator returned nothing for are reported per field.
    pub async fn translate_fields(
        &self,
        access: &AccessContext,
        fields: &BTreeMap<String, String>,
        to: &str,
        from: Option<&str>,
        context: Option<&str>,
    ) -> Result<BTreeMap<String, String>> {
        let (names, texts): (Vec<&String>, Vec<String>) = fields
            .iter()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(name, text)| (name, text.clone()))
            .unzip();

        let mut result: BTreeMap<String, String> = fields
            .keys()
            .map(|name| (name.clone(), String::new()))
            .collect();
        if texts.is_empty() {
            return Ok(result);
        }

        let translated = self.translate(access, &texts, to, from, context).await?;

        let mut errors = FieldErrors::new();
        for (i, name) in names.into_iter().enumerate() {
            match translated.get(i) {
                Some(text) => {
                    result.insert(name.clone(), text.clone());
                }
                None => errors.add(name.clone(), "No translation returned"),
            }
        }

        if !errors.is_empty() {
            return Err(CmsError::fields("Translation incomplete", errors));
        }
        Ok(result)
    }
}
