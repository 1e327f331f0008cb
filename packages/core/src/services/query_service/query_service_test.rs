//! Integration Tests for QueryService
//!
//! These tests run listing requests against a real libsql database and check
//! filter, visibility, sort and paging semantics end to end.

#[cfg(test)]
mod tests {
    use crate::db::{entity_store, DatabaseService};
    use crate::models::{NewVersion, NodeId, Versionable};
    use crate::query::{
        ElementFilter, FileFilter, PageFilter, PageLimits, PublishFilter, QueryRequest, SortSpec,
        Trashed,
    };
    use crate::services::error::CmsError;
    use crate::services::hierarchy_service::HierarchyStore;
    use crate::services::query_service::QueryService;
    use crate::services::version_ledger::VersionLedger;
    use chrono::Utc;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tempfile::TempDir;

    const TENANT: &str = "demo";

    struct Fixture {
        db: Arc<DatabaseService>,
        tree: HierarchyStore,
        ledger: VersionLedger,
        queries: QueryService,
        _dir: TempDir,
    }

    async fn fixture() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(
            DatabaseService::new(temp_dir.path().join("query.db"))
                .await
                .unwrap(),
        );
        Fixture {
            tree: HierarchyStore::new(db.clone(), 3),
            ledger: VersionLedger::new(db.clone(), 3),
            queries: QueryService::new(db.clone(), PageLimits::default()),
            db,
            _dir: temp_dir,
        }
    }

    fn data(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    impl Fixture {
        async fn page(&self, parent: Option<NodeId>, title: &str, publish: bool) -> NodeId {
            let node = match parent {
                Some(parent) => self.tree.append_child(TENANT, parent).await.unwrap(),
                None => self.tree.create_root(TENANT).await.unwrap(),
            };
            let mut input = NewVersion::draft("editor")
                .with_lang("en")
                .with_data(data(json!({ "title": title, "status": 1 })));
            if publish {
                input = input.publish_now();
            }
            self.ledger
                .create(TENANT, Versionable::Page, &node.id.to_string(), &input)
                .await
                .unwrap();
            node.id
        }

        async fn entity(&self, kind: Versionable, id: &str, values: Value) {
            let conn = self.db.connect_with_timeout().await.unwrap();
            entity_store::insert_entity(&conn, kind, TENANT, id, Utc::now())
                .await
                .unwrap();
            self.ledger
                .create(TENANT, kind, id, &NewVersion::draft("editor").with_data(data(values)))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_title_prefix_and_parent() {
        let fx = fixture().await;
        let root = fx.page(None, "Home", true).await;
        let blog = fx.page(Some(root), "Blog", true).await;
        fx.page(Some(root), "About", true).await;
        fx.page(Some(blog), "Blogging tips", false).await;

        let request = QueryRequest::new(PageFilter {
            title: Some("Blog".to_string()),
            ..Default::default()
        });
        let result = fx.queries.pages(TENANT, &request).await.unwrap();
        assert_eq!(result.total, 2);

        let request = QueryRequest::new(PageFilter {
            parent_id: Some(Some(root)),
            ..Default::default()
        });
        let result = fx.queries.pages(TENANT, &request).await.unwrap();
        let titles: Vec<_> = result.items.iter().map(|p| p.field("title")).collect();
        assert_eq!(titles, vec!["Blog", "About"]);

        let request = QueryRequest::new(PageFilter {
            parent_id: Some(None),
            ..Default::default()
        });
        let roots = fx.queries.pages(TENANT, &request).await.unwrap();
        assert_eq!(roots.items.len(), 1);
        assert_eq!(roots.items[0].node.id, root);
    }

    #[tokio::test]
    async fn test_absent_filters_match_everything() {
        let fx = fixture().await;
        let root = fx.page(None, "Home", true).await;
        fx.page(Some(root), "", false).await;

        let result = fx
            .queries
            .pages(TENANT, &QueryRequest::new(PageFilter::default()))
            .await
            .unwrap();
        assert_eq!(result.total, 2);
    }

    #[tokio::test]
    async fn test_trashed_visibility() {
        let fx = fixture().await;
        let root = fx.page(None, "Home", true).await;
        let child = fx.page(Some(root), "Old", true).await;
        fx.tree.trash(TENANT, child).await.unwrap();

        let all = PageFilter::default();
        let without = fx.queries.pages(TENANT, &QueryRequest::new(all.clone())).await.unwrap();
        let with = fx
            .queries
            .pages(TENANT, &QueryRequest::new(all.clone()).trashed(Trashed::With))
            .await
            .unwrap();
        let only = fx
            .queries
            .pages(TENANT, &QueryRequest::new(all).trashed(Trashed::Only))
            .await
            .unwrap();

        assert_eq!((without.total, with.total, only.total), (1, 2, 1));
        assert_eq!(only.items[0].node.id, child);
    }

    #[tokio::test]
    async fn test_publish_states() {
        let fx = fixture().await;
        let root = fx.page(None, "Live", true).await;
        let draft = fx.page(Some(root), "Draft", false).await;
        let scheduled = fx.page(Some(root), "Later", false).await;
        fx.ledger
            .publish(
                Versionable::Page,
                &scheduled.to_string(),
                Some(Utc::now() + chrono::Duration::days(1)),
            )
            .await
            .unwrap();

        let fx = &fx;
        let ids = |publish: PublishFilter| async move {
            let request = QueryRequest::new(PageFilter::default()).publish(publish);
            fx.queries
                .pages(TENANT, &request)
                .await
                .unwrap()
                .items
                .into_iter()
                .map(|p| p.node.id)
                .collect::<Vec<_>>()
        };

        assert_eq!(ids(PublishFilter::Published).await, vec![root]);
        assert_eq!(ids(PublishFilter::Draft).await, vec![draft, scheduled]);
        assert_eq!(ids(PublishFilter::Scheduled).await, vec![scheduled]);
    }

    #[tokio::test]
    async fn test_paging_and_sort() {
        let fx = fixture().await;
        let root = fx.page(None, "Root", true).await;
        for title in ["C", "A", "B"] {
            fx.page(Some(root), title, true).await;
        }

        let request = QueryRequest::new(PageFilter {
            parent_id: Some(Some(root)),
            ..Default::default()
        })
        .sorted_by(SortSpec::asc("title"))
        .page(2, 2);
        let result = fx.queries.pages(TENANT, &request).await.unwrap();

        assert_eq!(result.total, 3);
        assert_eq!(result.last_page(), 2);
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].field("title"), "C");
    }

    #[tokio::test]
    async fn test_unknown_sort_column_is_rejected() {
        let fx = fixture().await;
        let request = QueryRequest::new(PageFilter::default()).sorted_by(SortSpec::asc("secret"));
        let err = fx.queries.pages(TENANT, &request).await.unwrap_err();
        assert!(matches!(err, CmsError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_elements_and_files() {
        let fx = fixture().await;
        fx.entity(
            Versionable::Element,
            "e1",
            json!({ "type": "footer", "name": "Shared footer", "data": { "text": "c" } }),
        )
        .await;
        fx.entity(
            Versionable::Element,
            "e2",
            json!({ "type": "text", "name": "Note", "data": {} }),
        )
        .await;
        fx.entity(
            Versionable::File,
            "f1",
            json!({ "name": "Fox", "path": "cms/fox.jpg", "mime": "image/jpeg" }),
        )
        .await;
        fx.entity(
            Versionable::File,
            "f2",
            json!({ "name": "Manual", "path": "cms/m.pdf", "mime": "application/pdf" }),
        )
        .await;

        let request = QueryRequest::new(ElementFilter {
            kind: Some("footer".to_string()),
            ..Default::default()
        });
        let elements = fx.queries.elements(TENANT, &request).await.unwrap();
        assert_eq!(elements.items.len(), 1);
        assert_eq!(elements.items[0].name, "Shared footer");

        let request = QueryRequest::new(FileFilter {
            mime: Some("image/".to_string()),
            ..Default::default()
        });
        let files = fx.queries.files(TENANT, &request).await.unwrap();
        assert_eq!(files.items.len(), 1);
        assert_eq!(files.items[0].id, "f1");

        let request = QueryRequest::new(FileFilter {
            any: Some("anua".to_string()),
            ..Default::default()
        });
        let files = fx.queries.files(TENANT, &request).await.unwrap();
        assert_eq!(files.items[0].id, "f2");
    }

    #[tokio::test]
    async fn test_other_tenant_is_invisible() {
        let fx = fixture().await;
        fx.page(None, "Home", true).await;

        let result = fx
            .queries
            .pages("other", &QueryRequest::new(PageFilter::default()))
            .await
            .unwrap();
        assert_eq!(result.total, 0);
    }
}
