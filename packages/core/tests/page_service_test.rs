//! Page Service Tests
//!
//! Page creation and slug rules, publishing, subtree deletion with audit
//! entries, copies for translation, the aging pages report, and domain
//! events emitted after commit.

#[cfg(test)]
mod page_service_tests {
    use std::sync::Arc;

    use anyhow::Result;
    use canopy_core::config::CanopyConfig;
    use canopy_core::db::{DatabaseService, DomainEvent};
    use canopy_core::models::{LogAction, NewPage, Page};
    use canopy_core::services::{aging_pages, AgingFilter, PageService, PageServiceError};
    use tempfile::TempDir;
    use tokio::time::{timeout, Duration};

    async fn create_test_service() -> Result<(PageService, TempDir)> {
        let temp_dir = TempDir::new()?;
        let db = Arc::new(DatabaseService::new(temp_dir.path().join("test.db")).await?);
        Ok((PageService::new(db, Arc::new(CanopyConfig::default())), temp_dir))
    }

    async fn create_chain(service: &PageService) -> Result<(Page, Page, Page)> {
        let home = service.add_root(NewPage::new("Home"), None).await?;
        let about = service.add_child(home.id, NewPage::new("About"), None).await?;
        let team = service.add_child(about.id, NewPage::new("Team"), None).await?;
        Ok((home, about, team))
    }

    #[tokio::test]
    async fn test_add_root_and_children() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;

        let home = service.add_root(NewPage::new("Home Page"), Some("admin")).await?;
        assert_eq!(home.slug, "home-page");
        assert_eq!(home.url_path, "home-page/");
        assert_eq!(home.depth, 1);
        assert!(home.is_root());
        assert!(!home.live);
        assert_eq!(home.status_string(), "draft");

        let en = service.locales().get_for_language("en").await?;
        assert_eq!(home.locale_id, en.id);

        let news = service
            .add_child(home.id, NewPage::new("Latest News").with_slug("news"), None)
            .await?;
        assert_eq!(news.url_path, "home-page/news/");
        assert_eq!(news.depth, 2);
        assert_eq!(news.locale_id, home.locale_id);
        assert!(news.is_descendant_of(&home));

        let home = service.get_page(home.id).await?.expect("home exists");
        assert_eq!(home.numchild, 1);

        let history = service.page_history(home.id).await?;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, LogAction::Create);
        assert_eq!(history[0].actor.as_deref(), Some("admin"));

        Ok(())
    }

    #[tokio::test]
    async fn test_slug_rules() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;
        let home = service.add_root(NewPage::new("Home"), None).await?;
        service.add_child(home.id, NewPage::new("About"), None).await?;

        let duplicate = service.add_child(home.id, NewPage::new("About"), None).await;
        assert!(matches!(duplicate, Err(PageServiceError::SlugInUse { .. })));

        let invalid = service
            .add_child(home.id, NewPage::new("Bad").with_slug("bad slug!"), None)
            .await;
        assert!(matches!(invalid, Err(PageServiceError::InvalidSlug(_))));

        let untitled = service.add_child(home.id, NewPage::new("   "), None).await;
        assert!(matches!(untitled, Err(PageServiceError::ValidationFailed(_))));

        // Same slug is fine under a different parent
        let other = service.add_root(NewPage::new("Other"), None).await?;
        let about = service.add_child(other.id, NewPage::new("About"), None).await?;
        assert_eq!(about.url_path, "other/about/");

        let home = service.get_page(home.id).await?.expect("home exists");
        assert_eq!(home.numchild, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_tree_reads() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;
        let (home, about, team) = create_chain(&service).await?;
        let contact = service.add_child(home.id, NewPage::new("Contact"), None).await?;

        let children: Vec<i64> = service.get_children(home.id).await?.iter().map(|p| p.id).collect();
        assert_eq!(children, vec![about.id, contact.id]);

        let descendants: Vec<i64> = service
            .get_descendants(home.id)
            .await?
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(descendants, vec![about.id, team.id, contact.id]);

        assert_eq!(service.get_parent(team.id).await?.map(|p| p.id), Some(about.id));
        assert!(service.get_parent(home.id).await?.is_none());
        assert_eq!(service.get_first_root().await?.map(|p| p.id), Some(home.id));

        let missing = service.get_children(9999).await;
        assert!(matches!(missing, Err(PageServiceError::PageNotFound { id: 9999 })));

        Ok(())
    }

    #[tokio::test]
    async fn test_publish_keeps_first_publication_date() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;
        let home = service.add_root(NewPage::new("Home"), None).await?;

        let first = service.publish_page(home.id, Some("alice")).await?;
        assert!(first.live);
        assert_eq!(first.status_string(), "live");
        let first_published_at = first.first_published_at.expect("first publication recorded");

        let second = service.publish_page(home.id, Some("bob")).await?;
        assert_eq!(second.first_published_at, Some(first_published_at));
        assert!(second.last_published_at >= first.last_published_at);

        let publishes: Vec<_> = service
            .page_history(home.id)
            .await?
            .into_iter()
            .filter(|e| e.action == LogAction::Publish)
            .collect();
        assert_eq!(publishes.len(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_delete_page_logs_every_descendant() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;
        let (home, about, team) = create_chain(&service).await?;

        let mut rx = service.subscribe_to_events();
        service.delete_page(about.id, Some("admin")).await?;

        assert!(service.get_page(about.id).await?.is_none());
        assert!(service.get_page(team.id).await?.is_none());
        let home = service.get_page(home.id).await?.expect("home survives");
        assert_eq!(home.numchild, 0);

        for id in [about.id, team.id] {
            let entry = service
                .page_history(id)
                .await?
                .into_iter()
                .find(|e| e.action == LogAction::Delete)
                .expect("deletion is logged");
            assert!(entry.deleted);
            assert_eq!(entry.actor.as_deref(), Some("admin"));
        }

        let event = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("Event should be emitted within 1 second")
            .expect("Should receive event");
        match event {
            DomainEvent::PageDeleted { id, descendant_ids } => {
                assert_eq!(id, about.id);
                assert_eq!(descendant_ids, vec![team.id]);
            }
            other => panic!("Expected PageDeleted event, got {:?}", other),
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_copy_for_translation_requires_translated_parent() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;
        let (_home, _about, team) = create_chain(&service).await?;
        let fr = service.locales().get_or_create("fr").await?;

        let result = service.copy_for_translation(team.id, fr.id, false, None).await;
        assert!(matches!(
            result,
            Err(PageServiceError::ParentNotTranslated { .. })
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_copy_for_translation_with_parents() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;
        let (home, about, team) = create_chain(&service).await?;
        let fr = service.locales().get_or_create("fr").await?;

        let team_fr = service
            .copy_for_translation(team.id, fr.id, true, Some("translator"))
            .await?;
        assert_eq!(team_fr.locale_id, fr.id);
        assert_eq!(team_fr.translation_key, team.translation_key);
        assert_eq!(team_fr.slug, "team");
        assert_eq!(team_fr.url_path, "home/about-fr/team/");
        assert!(!team_fr.live);

        // The parent's copy sits next to the original under the tree root
        let about_fr = service
            .get_translation(about.id, fr.id)
            .await?
            .expect("parent was copied");
        assert_eq!(about_fr.slug, "about-fr");
        assert_eq!(
            service.get_parent(about_fr.id).await?.map(|p| p.id),
            Some(home.id)
        );

        let history = service.page_history(team_fr.id).await?;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, LogAction::CopyForTranslation);
        assert_eq!(history[0].actor.as_deref(), Some("translator"));

        let again = service.copy_for_translation(team.id, fr.id, true, None).await;
        assert!(matches!(
            again,
            Err(PageServiceError::TranslationExists { .. })
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_copy_for_translation_finds_free_slug() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;
        let (home, about, _team) = create_chain(&service).await?;
        service
            .add_child(home.id, NewPage::new("About FR").with_slug("about-fr"), None)
            .await?;
        let fr = service.locales().get_or_create("fr").await?;

        let copy = service.copy_for_translation(about.id, fr.id, false, None).await?;
        assert_eq!(copy.slug, "about-fr-2");
        assert_eq!(copy.url_path, "home/about-fr-2/");

        Ok(())
    }

    #[tokio::test]
    async fn test_copy_root_for_translation() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;
        let home = service.add_root(NewPage::new("Home"), None).await?;
        let fr = service.locales().get_or_create("fr").await?;

        let copy = service.copy_for_translation(home.id, fr.id, false, None).await?;
        assert!(copy.is_root());
        assert_eq!(copy.url_path, "home-fr/");
        assert_eq!(service.get_roots().await?.len(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_aging_pages_report() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;
        let (home, about, _team) = create_chain(&service).await?;

        let home = service.publish_page(home.id, Some("alice")).await?;
        let about = service.publish_page(about.id, Some("bob")).await?;

        let report = aging_pages(service.db(), AgingFilter::default()).await?;
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].page.id, home.id);
        assert_eq!(report[0].status, "live");
        assert_eq!(report[0].last_published_by.as_deref(), Some("alice"));
        assert_eq!(report[1].page.id, about.id);
        assert_eq!(report[1].last_published_by.as_deref(), Some("bob"));

        let cutoff = home.last_published_at.expect("home was published");
        let filter = AgingFilter {
            last_published_before: Some(cutoff),
            ..AgingFilter::default()
        };
        let report = aging_pages(service.db(), filter).await?;
        let ids: Vec<i64> = report.iter().map(|r| r.page.id).collect();
        assert!(ids.contains(&home.id));
        if about.last_published_at > Some(cutoff) {
            assert!(!ids.contains(&about.id));
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_aging_pages_include_unpublished() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;
        let (home, about, team) = create_chain(&service).await?;

        service.publish_page(home.id, None).await?;
        service.publish_page(about.id, Some("alice")).await?;
        let mut rx = service.subscribe_to_events();
        let about = service.unpublish_page(about.id, Some("bob")).await?;
        let event = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("Event should be emitted within 1 second")
            .expect("Should receive event");
        assert_eq!(event.event_type(), "page:unpublished");
        assert_eq!(event.page_id(), Some(about.id));
        assert!(!about.live);
        assert!(about.first_published_at.is_some());
        assert_eq!(about.status_string(), "unpublished");

        // Never-published pages stay out of the report
        let report = aging_pages(service.db(), AgingFilter::default()).await?;
        let rows: Vec<(i64, &str)> = report.iter().map(|r| (r.page.id, r.status)).collect();
        assert_eq!(rows, vec![(home.id, "live"), (about.id, "unpublished")]);
        assert!(!rows.iter().any(|(id, _)| *id == team.id));
        assert_eq!(report[1].last_published_by.as_deref(), Some("alice"));

        let live_only = AgingFilter {
            live: Some(true),
            ..AgingFilter::default()
        };
        let ids: Vec<i64> = aging_pages(service.db(), live_only)
            .await?
            .iter()
            .map(|r| r.page.id)
            .collect();
        assert_eq!(ids, vec![home.id]);

        let offline_only = AgingFilter {
            live: Some(false),
            ..AgingFilter::default()
        };
        let ids: Vec<i64> = aging_pages(service.db(), offline_only)
            .await?
            .iter()
            .map(|r| r.page.id)
            .collect();
        assert_eq!(ids, vec![about.id]);

        let history = service.page_history(about.id).await?;
        assert_eq!(history.last().map(|e| e.action), Some(LogAction::Unpublish));

        Ok(())
    }

    #[tokio::test]
    async fn test_create_emits_page_created_event() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;
        let mut rx = service.subscribe_to_events();

        let home = service.add_root(NewPage::new("Home"), None).await?;

        let event = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("Event should be emitted within 1 second")
            .expect("Should receive event");
        assert_eq!(event.event_type(), "page:created");
        assert_eq!(event.page_id(), Some(home.id));

        Ok(())
    }

    #[tokio::test]
    async fn test_failed_create_emits_nothing() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;
        let home = service.add_root(NewPage::new("Home"), None).await?;

        let mut rx = service.subscribe_to_events();
        let result = service.add_root(NewPage::new("Home"), None).await;
        assert!(result.is_err());
        assert!(rx.try_recv().is_err());
        assert_eq!(service.get_roots().await?.len(), 1);
        assert_eq!(service.page_history(home.id).await?.len(), 1);

        Ok(())
    }
}
