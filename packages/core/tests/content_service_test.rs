//! Content Service Integration Tests
//!
//! Rendering of published and preview versions with element references,
//! shared files, language fallback and the blog action.

mod common;

#[cfg(test)]
mod content_service_tests {
    use super::common::{create_services, editor, map, visitor, TestServices, TENANT};
    use anyhow::Result;
    use pagetree_core::actions::{ActionRegistry, BlogAction};
    use pagetree_core::models::{ContentElement, ElementInput, ElementKind, FileInput, NodeId};
    use pagetree_core::{CmsConfig, CmsError, ContentService, ContentView, Placement};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn content(items: Vec<ContentElement>) -> Value {
        serde_json::to_value(items).unwrap()
    }

    fn renderer(services: &TestServices) -> ContentService {
        let blog = BlogAction::new(services.db.clone(), services.queries.clone());
        ContentService::new(services.db.clone(), ActionRegistry::new().with("blog", Arc::new(blog)))
    }

    async fn published_page(services: &TestServices, title: &str, items: Vec<ContentElement>) -> Result<NodeId> {
        let access = editor();
        let page = services
            .pages
            .create_page(
                &access,
                &map(json!({ "title": title, "lang": "en", "content": content(items) })),
                Placement::Root,
            )
            .await?;
        services.pages.publish_page(&access, page.node.id, None).await?;
        Ok(page.node.id)
    }

    #[tokio::test]
    async fn test_published_and_preview_views_differ() -> Result<()> {
        let services = create_services(CmsConfig::default()).await?;
        let access = editor();
        let id = published_page(
            &services,
            "Home",
            vec![ContentElement::new("t1", ElementKind::Text).with_data("text", "Hello")],
        )
        .await?;

        services
            .pages
            .save_page(
                &access,
                id,
                &map(json!({
                    "content": content(vec![
                        ContentElement::new("t1", ElementKind::Text).with_data("text", "Changed")
                    ])
                })),
                &[],
                &[],
            )
            .await?;

        let content_service = renderer(&services);
        let published = content_service.render(&visitor(), id, ContentView::Published).await?;
        let preview = content_service.render(&access, id, ContentView::Preview).await?;

        let text = |doc: &pagetree_core::ResolvedDocument| {
            doc.section("main").unwrap().elements[0].data["text"].clone()
        };
        assert_eq!(text(&published), "Hello");
        assert_eq!(text(&preview), "Changed");
        assert_eq!(published.lang, "en");
        Ok(())
    }

    #[tokio::test]
    async fn test_preview_requires_page_view() -> Result<()> {
        let services = create_services(CmsConfig::default()).await?;
        let id = published_page(&services, "Home", vec![]).await?;

        let err = renderer(&services)
            .render(&visitor(), id, ContentView::Preview)
            .await
            .unwrap_err();
        assert!(matches!(err, CmsError::PermissionDenied(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_unpublished_and_trashed_pages_are_not_found() -> Result<()> {
        let services = create_services(CmsConfig::default()).await?;
        let access = editor();
        let content_service = renderer(&services);

        let draft = services
            .pages
            .create_page(&access, &map(json!({ "title": "Draft" })), Placement::Root)
            .await?;
        let err = content_service
            .render(&visitor(), draft.node.id, ContentView::Published)
            .await
            .unwrap_err();
        assert!(matches!(err, CmsError::NotFound(_)));

        let live = published_page(&services, "Live", vec![]).await?;
        services.pages.trash_page(&access, live).await?;
        let err = content_service
            .render(&visitor(), live, ContentView::Published)
            .await
            .unwrap_err();
        assert!(matches!(err, CmsError::NotFound(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_render_by_path() -> Result<()> {
        let services = create_services(CmsConfig::default()).await?;
        let id = published_page(&services, "Contact", vec![]).await?;

        let doc = renderer(&services)
            .render_path(&visitor(), "", "contact", ContentView::Published)
            .await?;
        assert_eq!(doc.page.id, id);
        assert_eq!(doc.version.data_str("title"), "Contact");
        Ok(())
    }

    #[tokio::test]
    async fn test_references_follow_element_publication() -> Result<()> {
        let services = create_services(CmsConfig::default()).await?;
        let access = editor();

        services
            .pages
            .create_element(
                &access,
                Some("shared"),
                &ElementInput {
                    kind: ElementKind::Text,
                    name: "Shared".to_string(),
                    lang: Some("en".to_string()),
                    data: map(json!({ "text": "Reusable" })),
                },
                &[],
            )
            .await?;

        let id = published_page(
            &services,
            "Refs",
            vec![
                ContentElement::reference("r1", "shared").with_group("footer"),
                ContentElement::reference("r2", "missing"),
            ],
        )
        .await?;
        services
            .pages
            .save_page(&access, id, &map(json!({})), &["shared".to_string()], &[])
            .await?;
        services.pages.publish_page(&access, id, None).await?;

        let content_service = renderer(&services);

        let doc = content_service.render(&visitor(), id, ContentView::Published).await?;
        assert!(doc.sections.is_empty());

        let doc = content_service.render(&access, id, ContentView::Preview).await?;
        let footer = doc.section("footer").unwrap();
        assert_eq!(footer.elements.len(), 1);
        assert_eq!(footer.elements[0].id, "r1");
        assert_eq!(footer.elements[0].kind, ElementKind::Text);
        assert!(doc.section("main").is_none());

        services.pages.publish_element(&access, "shared", None).await?;
        let doc = content_service.render(&visitor(), id, ContentView::Published).await?;
        assert_eq!(doc.section("footer").unwrap().elements[0].data["text"], "Reusable");
        Ok(())
    }

    #[tokio::test]
    async fn test_files_are_localized_with_prefix_fallback() -> Result<()> {
        let services = create_services(CmsConfig::default()).await?;
        let access = editor();

        let mut input = FileInput {
            name: "Logo".to_string(),
            path: "demo/logo.png".to_string(),
            mime: "image/png".to_string(),
            ..Default::default()
        };
        input.description.insert("en".to_string(), "Company logo".to_string());
        input.description.insert("de".to_string(), "Firmenlogo".to_string());
        services.pages.create_file(&access, Some("logo"), &input).await?;
        services.pages.publish_file(&access, "logo", None).await?;

        let page = services
            .pages
            .create_page(
                &access,
                &map(json!({
                    "title": "Ueber uns",
                    "lang": "de-AT",
                    "content": content(vec![
                        ContentElement::new("img", ElementKind::Image)
                            .with_files(vec!["logo".to_string(), "gone".to_string(), "logo".to_string()])
                    ])
                })),
                Placement::Root,
            )
            .await?;
        services
            .pages
            .save_page(&access, page.node.id, &map(json!({})), &[], &["logo".to_string()])
            .await?;
        services.pages.publish_page(&access, page.node.id, None).await?;

        let doc = renderer(&services)
            .render(&visitor(), page.node.id, ContentView::Published)
            .await?;
        let files = &doc.section("main").unwrap().elements[0].files;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].description.as_deref(), Some("Firmenlogo"));
        assert_eq!(files[0].transcription, None);
        assert_eq!(doc.files.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_rendering_is_idempotent() -> Result<()> {
        let services = create_services(CmsConfig::default()).await?;
        let id = published_page(
            &services,
            "Stable",
            vec![
                ContentElement::new("a", ElementKind::Text).with_data("text", "one"),
                ContentElement::new("b", ElementKind::Text).with_group("aside"),
                ContentElement::new("c", ElementKind::Text).with_data("text", "two"),
            ],
        )
        .await?;

        let content_service = renderer(&services);
        let first = content_service.render(&visitor(), id, ContentView::Published).await?;
        let second = content_service.render(&visitor(), id, ContentView::Published).await?;
        assert_eq!(first, second);

        let names: Vec<_> = first.sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["main", "aside"]);
        let ids: Vec<_> = first.sections[0].elements.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_blog_action_lists_published_children() -> Result<()> {
        let services = create_services(CmsConfig::default()).await?;
        let access = editor();

        let blog = services
            .pages
            .create_page(
                &access,
                &map(json!({
                    "title": "Blog",
                    "lang": "en",
                    "content": content(vec![
                        ContentElement::new("list", ElementKind::Text).with_data("action", "blog"),
                        ContentElement::new("bogus", ElementKind::Text).with_data("action", "nope"),
                    ])
                })),
                Placement::Root,
            )
            .await?;
        services.pages.publish_page(&access, blog.node.id, None).await?;

        for (title, publish) in [("First post", true), ("Second post", true), ("Unpublished", false)] {
            let post = services
                .pages
                .create_page(
                    &access,
                    &map(json!({
                        "title": title,
                        "lang": "en",
                        "status": 1,
                        "content": content(vec![
                            ContentElement::new("art", ElementKind::Article).with_data("text", title),
                            ContentElement::new("txt", ElementKind::Text).with_data("text", "skip"),
                        ])
                    })),
                    Placement::Child(blog.node.id),
                )
                .await?;
            if publish {
                services.pages.publish_page(&access, post.node.id, None).await?;
            }
        }

        let content_service = renderer(&services);
        let doc = content_service
            .render(&editor(), blog.node.id, ContentView::Published)
            .await?;
        let main = doc.section("main").unwrap();

        let listing = &main.elements[0].data["action"];
        assert_eq!(listing["total"], 2);
        let titles: Vec<_> = listing["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["title"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(titles, vec!["Second post", "First post"]);
        assert_eq!(listing["data"][0]["content"].as_array().unwrap().len(), 1);

        assert!(!main.elements[1].data.contains_key("action"));

        let anonymous = content_service
            .render(&visitor(), blog.node.id, ContentView::Published)
            .await?;
        assert!(!anonymous.section("main").unwrap().elements[0].data.contains_key("action"));
        assert_eq!(doc.page.tenant_id, TENANT);
        Ok(())
    }
}
