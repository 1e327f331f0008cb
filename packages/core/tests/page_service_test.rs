//! Page Service Integration Tests
//!
//! Page, element and file mutations through the public service, including
//! permission checks, merge semantics and the events that follow a commit.

mod common;

#[cfg(test)]
mod page_service_tests {
    use super::common::{create_services, editor, map, visitor, TENANT};
    use anyhow::Result;
    use pagetree_core::db::DomainEvent;
    use pagetree_core::hierarchy::Position;
    use pagetree_core::models::{ElementInput, ElementKind, FileInput, VersionState, Versionable};
    use pagetree_core::{capability, AccessContext, CmsConfig, CmsError, Placement};
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_create_page_derives_path_from_title() -> Result<()> {
        let services = create_services(CmsConfig::default()).await?;

        let page = services
            .pages
            .create_page(
                &editor(),
                &map(json!({ "title": "About Us", "lang": "en", "content": [] })),
                Placement::Root,
            )
            .await?;

        assert_eq!(page.field("title"), "About Us");
        assert_eq!(page.field("path"), "about-us");
        assert!(page.node.is_root());

        let latest = page.latest.as_ref().unwrap();
        assert_eq!(latest.editor, "Editor");
        assert_eq!(latest.state(), VersionState::Draft);
        assert_eq!(latest.aux["content"], json!([]));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_page_on_taken_route_returns_existing() -> Result<()> {
        let services = create_services(CmsConfig::default()).await?;
        let input = map(json!({ "title": "Blog", "path": "blog", "domain": "" }));

        let first = services.pages.create_page(&editor(), &input, Placement::Root).await?;
        let second = services.pages.create_page(&editor(), &input, Placement::Root).await?;

        assert_eq!(first.node.id, second.node.id);
        assert_eq!(services.pages.hierarchy().roots(TENANT).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_page_requires_capability() -> Result<()> {
        let services = create_services(CmsConfig::default()).await?;

        let err = services
            .pages
            .create_page(&visitor(), &map(json!({ "title": "Nope" })), Placement::Root)
            .await
            .unwrap_err();
        assert!(matches!(err, CmsError::PermissionDenied(_)));

        let only_view = AccessContext::new(TENANT).grant(capability::PAGE_VIEW);
        let err = services
            .pages
            .create_page(&only_view, &map(json!({ "title": "Nope" })), Placement::Root)
            .await
            .unwrap_err();
        assert!(matches!(err, CmsError::PermissionDenied(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_placement_before_sibling() -> Result<()> {
        let services = create_services(CmsConfig::default()).await?;
        let access = editor();

        let home = services
            .pages
            .create_page(&access, &map(json!({ "title": "Home", "path": "" })), Placement::Root)
            .await?;
        let last = services
            .pages
            .create_page(&access, &map(json!({ "title": "Last" })), Placement::Child(home.node.id))
            .await?;
        let first = services
            .pages
            .create_page(&access, &map(json!({ "title": "First" })), Placement::Before(last.node.id))
            .await?;

        let children = services.pages.hierarchy().children(TENANT, home.node.id).await?;
        let ids: Vec<_> = children.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![first.node.id, last.node.id]);
        assert_eq!(first.node.parent_id, Some(home.node.id));
        Ok(())
    }

    #[tokio::test]
    async fn test_save_page_merges_over_latest() -> Result<()> {
        let services = create_services(CmsConfig::default()).await?;
        let access = editor();

        let page = services
            .pages
            .create_page(
                &access,
                &map(json!({
                    "title": "Team",
                    "theme": "dark",
                    "meta": [{ "id": "m1", "type": "text" }],
                    "content": [{ "id": "c1", "type": "text" }]
                })),
                Placement::Root,
            )
            .await?;

        let saved = services
            .pages
            .save_page(
                &access,
                page.node.id,
                &map(json!({ "title": "Our Team", "theme": null, "content": [] })),
                &[],
                &[],
            )
            .await?;

        let latest = saved.latest.as_ref().unwrap();
        assert_eq!(latest.data_str("title"), "Our Team");
        assert_eq!(latest.data_str("theme"), "");
        assert_eq!(latest.data_str("path"), "team");
        assert_eq!(latest.aux["content"], json!([]));
        assert_eq!(latest.aux["meta"][0]["id"], "m1");

        let history = services
            .pages
            .ledger()
            .history(Versionable::Page, &page.node.id.to_string(), 10)
            .await?;
        assert_eq!(history.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_save_page_moves_route() -> Result<()> {
        let services = create_services(CmsConfig::default()).await?;
        let access = editor();

        let page = services
            .pages
            .create_page(&access, &map(json!({ "title": "News", "path": "news" })), Placement::Root)
            .await?;
        services
            .pages
            .save_page(&access, page.node.id, &map(json!({ "path": "latest-news" })), &[], &[])
            .await?;

        let tree = services.pages.hierarchy();
        assert!(tree.find_by_path(TENANT, "", "news").await?.is_none());
        let found = tree.find_by_path(TENANT, "", "latest-news").await?.unwrap();
        assert_eq!(found.id, page.node.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_save_page_prunes_to_retained_versions() -> Result<()> {
        let config = CmsConfig {
            versions_retained: 2,
            ..Default::default()
        };
        let services = create_services(config).await?;
        let access = editor();

        let page = services
            .pages
            .create_page(&access, &map(json!({ "title": "v0" })), Placement::Root)
            .await?;
        services.pages.publish_page(&access, page.node.id, None).await?;

        for i in 1..=4 {
            services
                .pages
                .save_page(&access, page.node.id, &map(json!({ "title": format!("v{}", i) })), &[], &[])
                .await?;
        }

        let history = services
            .pages
            .ledger()
            .history(Versionable::Page, &page.node.id.to_string(), 10)
            .await?;
        let titles: Vec<_> = history.iter().map(|v| v.data_str("title")).collect();
        assert_eq!(titles, vec!["v4", "v3", "v0"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_save_missing_page_is_not_found() -> Result<()> {
        let services = create_services(CmsConfig::default()).await?;
        let err = services
            .pages
            .save_page(&editor(), 4242, &map(json!({ "title": "Ghost" })), &[], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CmsError::NotFound(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_move_trash_restore_purge() -> Result<()> {
        let services = create_services(CmsConfig::default()).await?;
        let access = editor();
        let tree = services.pages.hierarchy();

        let a = services
            .pages
            .create_page(&access, &map(json!({ "title": "A" })), Placement::Root)
            .await?;
        let b = services
            .pages
            .create_page(&access, &map(json!({ "title": "B" })), Placement::Root)
            .await?;
        let child = services
            .pages
            .create_page(&access, &map(json!({ "title": "Child" })), Placement::Child(a.node.id))
            .await?;

        let moved = services
            .pages
            .move_page(&access, a.node.id, Some(b.node.id), Position::First)
            .await?;
        assert_eq!(moved.parent_id, Some(b.node.id));
        assert_eq!(tree.validate_tree(TENANT).await?, 3);

        let err = services
            .pages
            .move_page(&access, b.node.id, Some(child.node.id), Position::Last)
            .await
            .unwrap_err();
        assert!(matches!(err, CmsError::Validation { .. } | CmsError::StructuralIntegrity { .. }));

        let trashed = services.pages.trash_page(&access, a.node.id).await?;
        assert_eq!(trashed.len(), 2);
        assert!(tree.get(TENANT, child.node.id).await?.is_trashed());

        let restored = services.pages.restore_page(&access, a.node.id).await?;
        assert_eq!(restored.len(), 2);
        assert!(!tree.get(TENANT, child.node.id).await?.is_trashed());

        let purged = services.pages.purge_page(&access, a.node.id).await?;
        assert_eq!(purged.len(), 2);
        assert!(tree.find(TENANT, child.node.id).await?.is_none());
        assert!(services
            .pages
            .ledger()
            .latest(Versionable::Page, &a.node.id.to_string())
            .await?
            .is_none());
        assert_eq!(tree.validate_tree(TENANT).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_purge_requires_purge_capability() -> Result<()> {
        let services = create_services(CmsConfig::default()).await?;
        let page = services
            .pages
            .create_page(&editor(), &map(json!({ "title": "Keep" })), Placement::Root)
            .await?;

        let dropper = AccessContext::new(TENANT).grant(capability::PAGE_DROP);
        services.pages.trash_page(&dropper, page.node.id).await?;
        let err = services.pages.purge_page(&dropper, page.node.id).await.unwrap_err();
        assert!(matches!(err, CmsError::PermissionDenied(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_element_lifecycle() -> Result<()> {
        let services = create_services(CmsConfig::default()).await?;
        let access = editor();

        let input = ElementInput {
            kind: ElementKind::from("footer"),
            name: "Footer".to_string(),
            lang: Some("en".to_string()),
            data: map(json!({ "text": "Contact us" })),
        };
        let element = services.pages.create_element(&access, Some("footer01"), &input, &[]).await?;
        assert_eq!(element.id, "footer01");
        assert_eq!(element.data["text"], "Contact us");

        let again = services.pages.create_element(&access, Some("footer01"), &input, &[]).await?;
        assert_eq!(again.version_id, element.version_id);

        let updated = ElementInput {
            data: map(json!({ "text": "Write to us" })),
            ..input.clone()
        };
        let saved = services.pages.save_element(&access, "footer01", &updated, &[]).await?;
        assert!(saved.version_id > element.version_id);
        assert_eq!(saved.data["text"], "Write to us");

        let published = services.pages.publish_element(&access, "footer01", None).await?;
        assert_eq!(published.state(), VersionState::Published);

        services.pages.trash_element(&access, "footer01").await?;
        let err = services
            .pages
            .save_element(&access, "footer01", &updated, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CmsError::NotFound(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_element_drops_unknown_files() -> Result<()> {
        let services = create_services(CmsConfig::default()).await?;
        let access = editor();

        let file = services
            .pages
            .create_file(
                &access,
                None,
                &FileInput {
                    name: "logo.png".to_string(),
                    path: "tenant/logo.png".to_string(),
                    mime: "image/png".to_string(),
                    ..Default::default()
                },
            )
            .await?;
        assert!(!file.is_remote());

        let element = services
            .pages
            .create_element(
                &access,
                None,
                &ElementInput::default(),
                &[file.id.clone(), "missing".to_string()],
            )
            .await?;
        assert_eq!(element.files, vec![file.id]);
        assert!(!element.id.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_file_save_and_trash() -> Result<()> {
        let services = create_services(CmsConfig::default()).await?;
        let access = editor();

        let mut input = FileInput {
            name: "Intro".to_string(),
            path: "https://cdn.example.com/intro.mp4".to_string(),
            mime: "video/mp4".to_string(),
            ..Default::default()
        };
        let file = services.pages.create_file(&access, Some("intro"), &input).await?;
        assert!(file.is_remote());

        input.description.insert("en".to_string(), "Intro video".to_string());
        let saved = services.pages.save_file(&access, "intro", &input).await?;
        assert_eq!(saved.localize("en").description.as_deref(), Some("Intro video"));

        services.pages.trash_file(&access, "intro").await?;
        let err = services.pages.trash_file(&visitor(), "intro").await.unwrap_err();
        assert!(matches!(err, CmsError::PermissionDenied(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_emits_page_and_version_events() -> Result<()> {
        let services = create_services(CmsConfig::default()).await?;
        let mut rx = services.pages.subscribe_to_events();

        let page = services
            .pages
            .create_page(&editor(), &map(json!({ "title": "Events" })), Placement::Root)
            .await?;

        let first = timeout(Duration::from_secs(1), rx.recv()).await??;
        assert_eq!(
            first,
            DomainEvent::PageCreated {
                tenant_id: TENANT.to_string(),
                page_id: page.node.id,
            }
        );

        let second = timeout(Duration::from_secs(1), rx.recv()).await??;
        match second {
            DomainEvent::VersionCreated {
                versionable,
                versionable_id,
                ..
            } => {
                assert_eq!(versionable, Versionable::Page);
                assert_eq!(versionable_id, page.node.id.to_string());
            }
            other => panic!("unexpected event {:?}", other),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_scheduled_page_published_when_due() -> Result<()> {
        let services = create_services(CmsConfig::default()).await?;
        let access = editor();

        let page = services
            .pages
            .create_page(&access, &map(json!({ "title": "Launch" })), Placement::Root)
            .await?;
        let at = chrono::Utc::now() - chrono::Duration::seconds(1);
        let scheduled = services.pages.publish_page(&access, page.node.id, Some(at)).await?;
        assert_eq!(scheduled.state(), VersionState::Scheduled);

        let promoted = services.pages.publish_due(&access).await?;
        assert_eq!(promoted.len(), 1);
        assert_eq!(promoted[0].id, scheduled.id);
        Ok(())
    }
}
