//! Page Move Tests
//!
//! Covers the move protocol end to end: URL path propagation to descendants,
//! move vs reorder classification in the audit log, signal ordering and the
//! state each signal observes, and rollback when propagation fails.

#[cfg(test)]
mod move_page_tests {
    use std::sync::{Arc, Mutex};

    use anyhow::Result;
    use canopy_core::config::CanopyConfig;
    use canopy_core::db::{DatabaseService, DomainEvent};
    use canopy_core::models::{LogAction, NewPage, Page, Position};
    use canopy_core::services::{PageMoveEvent, PageService};
    use tempfile::TempDir;
    use tokio::time::{timeout, Duration};

    /// Helper to create a service over a fresh database
    async fn create_test_service() -> Result<(PageService, TempDir)> {
        let temp_dir = TempDir::new()?;
        let db = Arc::new(DatabaseService::new(temp_dir.path().join("test.db")).await?);
        let service = PageService::new(db, Arc::new(CanopyConfig::default()));
        Ok((service, temp_dir))
    }

    struct SampleTree {
        home: Page,
        about: Page,
        team: Page,
        products: Page,
    }

    /// home/ (about/ (team/)), products/
    async fn create_sample_tree(service: &PageService) -> Result<SampleTree> {
        let home = service.add_root(NewPage::new("Home"), None).await?;
        let about = service.add_child(home.id, NewPage::new("About"), None).await?;
        let team = service.add_child(about.id, NewPage::new("Team"), None).await?;
        let products = service.add_root(NewPage::new("Products"), None).await?;
        Ok(SampleTree {
            home,
            about,
            team,
            products,
        })
    }

    async fn reload(service: &PageService, page: &Page) -> Result<Page> {
        Ok(service
            .get_page(page.id)
            .await?
            .expect("page should still exist"))
    }

    async fn child_titles(service: &PageService, parent: &Page) -> Result<Vec<String>> {
        Ok(service
            .get_children(parent.id)
            .await?
            .into_iter()
            .map(|p| p.title)
            .collect())
    }

    #[tokio::test]
    async fn test_move_rewrites_url_paths_of_subtree() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;
        let tree = create_sample_tree(&service).await?;
        assert_eq!(tree.about.url_path, "home/about/");
        assert_eq!(tree.team.url_path, "home/about/team/");

        let outcome = service
            .move_page(&tree.about, &tree.products, Position::LastChild, Some("editor"))
            .await?;

        assert_eq!(outcome.page.url_path, "products/about/");
        assert_eq!(outcome.url_path_before, "home/about/");
        assert_eq!(outcome.url_path_after, "products/about/");

        let about = reload(&service, &tree.about).await?;
        let team = reload(&service, &tree.team).await?;
        let products = reload(&service, &tree.products).await?;
        let home = reload(&service, &tree.home).await?;

        assert_eq!(about.url_path, "products/about/");
        assert_eq!(team.url_path, "products/about/team/");
        assert!(about.is_descendant_of(&products));
        assert!(team.is_descendant_of(&about));
        assert_eq!(about.depth, 2);
        assert_eq!(team.depth, 3);
        assert_eq!(products.numchild, 1);
        assert_eq!(home.numchild, 0);

        let parent = service.get_parent(about.id).await?.expect("about has a parent");
        assert_eq!(parent.id, products.id);

        Ok(())
    }

    #[tokio::test]
    async fn test_move_to_new_parent_logs_move() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;
        let tree = create_sample_tree(&service).await?;

        let outcome = service
            .move_page(&tree.about, &tree.products, Position::LastChild, Some("editor"))
            .await?;
        assert_eq!(outcome.action, LogAction::Move);

        let history = service.page_history(tree.about.id).await?;
        let entry = history.last().expect("move should be logged");
        assert_eq!(entry.action, LogAction::Move);
        assert_eq!(entry.actor.as_deref(), Some("editor"));
        assert_eq!(entry.label, "About");

        let data = entry.move_data().expect("move entries carry source and destination");
        assert_eq!(data.source.map(|s| s.id), Some(tree.home.id));
        assert_eq!(data.destination.map(|d| d.id), Some(tree.products.id));

        Ok(())
    }

    #[tokio::test]
    async fn test_reorder_within_parent_logs_reorder() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;
        let home = service.add_root(NewPage::new("Home"), None).await?;
        let a = service.add_child(home.id, NewPage::new("A"), None).await?;
        let _b = service.add_child(home.id, NewPage::new("B"), None).await?;
        let c = service.add_child(home.id, NewPage::new("C"), None).await?;

        let outcome = service.move_page(&c, &a, Position::Before, None).await?;
        assert_eq!(outcome.action, LogAction::Reorder);
        assert_eq!(outcome.page.url_path, "home/c/");
        assert_eq!(child_titles(&service, &home).await?, vec!["C", "A", "B"]);

        let home = reload(&service, &home).await?;
        assert_eq!(home.numchild, 3);

        let history = service.page_history(c.id).await?;
        assert_eq!(history.last().map(|e| e.action), Some(LogAction::Reorder));

        Ok(())
    }

    #[tokio::test]
    async fn test_sibling_positions() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;
        let home = service.add_root(NewPage::new("Home"), None).await?;
        let a = service.add_child(home.id, NewPage::new("A"), None).await?;
        let b = service.add_child(home.id, NewPage::new("B"), None).await?;
        let c = service.add_child(home.id, NewPage::new("C"), None).await?;

        let outcome = service.move_page(&a, &c, Position::After, None).await?;
        assert_eq!(outcome.action, LogAction::Reorder);
        assert_eq!(child_titles(&service, &home).await?, vec!["B", "C", "A"]);

        let outcome = service.move_page(&a, &home, Position::FirstChild, None).await?;
        assert_eq!(outcome.action, LogAction::Reorder);
        assert_eq!(child_titles(&service, &home).await?, vec!["A", "B", "C"]);

        let outcome = service.move_page(&a, &home, Position::LastChild, None).await?;
        assert_eq!(outcome.action, LogAction::Reorder);
        assert_eq!(child_titles(&service, &home).await?, vec!["B", "C", "A"]);

        let outcome = service.move_page(&a, &home, Position::SortedChild, None).await?;
        assert_eq!(outcome.action, LogAction::Reorder);
        assert_eq!(outcome.url_path_before, outcome.url_path_after);
        assert_eq!(outcome.parent_before.as_ref().map(|p| p.id), Some(home.id));
        assert_eq!(child_titles(&service, &home).await?, vec!["A", "B", "C"]);

        let actions: Vec<LogAction> = service
            .page_history(a.id)
            .await?
            .into_iter()
            .map(|e| e.action)
            .filter(|action| *action != LogAction::Create)
            .collect();
        assert_eq!(actions, vec![LogAction::Reorder; 4]);

        // Relative to itself: nothing changes
        service.move_page(&b, &b, Position::After, None).await?;
        assert_eq!(child_titles(&service, &home).await?, vec!["A", "B", "C"]);

        Ok(())
    }

    #[tokio::test]
    async fn test_move_child_before_its_own_parent() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;
        let tree = create_sample_tree(&service).await?;

        // team leaves about and is placed before it, under home
        let outcome = service
            .move_page(&tree.team, &tree.about, Position::Before, None)
            .await?;
        assert_eq!(outcome.action, LogAction::Move);

        let team = reload(&service, &tree.team).await?;
        let about = reload(&service, &tree.about).await?;
        let home = reload(&service, &tree.home).await?;

        assert_eq!(team.url_path, "home/team/");
        assert_eq!(team.depth, 2);
        assert_eq!(about.url_path, "home/about/");
        assert_eq!(about.numchild, 0);
        assert_eq!(home.numchild, 2);
        assert_eq!(child_titles(&service, &home).await?, vec!["Team", "About"]);
        assert!(service.get_children(about.id).await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_move_root_under_another_root() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;
        let tree = create_sample_tree(&service).await?;

        service
            .move_page(&tree.home, &tree.products, Position::FirstChild, None)
            .await?;

        let team = reload(&service, &tree.team).await?;
        assert_eq!(team.url_path, "products/home/about/team/");
        assert_eq!(team.depth, 4);

        let roots = service.get_roots().await?;
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id, tree.products.id);

        Ok(())
    }

    #[tokio::test]
    async fn test_move_into_own_subtree_is_rejected() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;
        let tree = create_sample_tree(&service).await?;

        let err = service
            .move_page(&tree.home, &tree.team, Position::LastChild, None)
            .await
            .expect_err("moving a page below its descendant must fail");
        assert!(err.is_invalid_move(), "unexpected error: {}", err);

        let err = service
            .move_page(&tree.about, &tree.about, Position::FirstChild, None)
            .await
            .expect_err("moving a page below itself must fail");
        assert!(err.is_invalid_move(), "unexpected error: {}", err);

        let team = reload(&service, &tree.team).await?;
        assert_eq!(team.url_path, "home/about/team/");
        assert_eq!(team.path, tree.team.path);

        let history = service.page_history(tree.home.id).await?;
        assert!(history.iter().all(|e| e.action == LogAction::Create));

        Ok(())
    }

    #[tokio::test]
    async fn test_move_rejects_slug_taken_at_destination() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;
        let tree = create_sample_tree(&service).await?;
        service
            .add_child(tree.products.id, NewPage::new("About"), None)
            .await?;

        let result = service
            .move_page(&tree.about, &tree.products, Position::LastChild, None)
            .await;
        assert!(result.is_err());
        assert_eq!(reload(&service, &tree.about).await?.url_path, "home/about/");

        Ok(())
    }

    #[tokio::test]
    async fn test_signals_observe_before_and_after_state() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;
        let tree = create_sample_tree(&service).await?;

        let seen: Arc<Mutex<Vec<(&'static str, PageMoveEvent)>>> = Arc::new(Mutex::new(Vec::new()));
        let pre = Arc::clone(&seen);
        service
            .signals()
            .pre_page_move
            .connect(move |event| pre.lock().unwrap().push(("pre", event.clone())));
        let post = Arc::clone(&seen);
        service
            .signals()
            .post_page_move
            .connect(move |event| post.lock().unwrap().push(("post", event.clone())));

        service
            .move_page(&tree.about, &tree.products, Position::LastChild, None)
            .await?;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);

        let (kind, pre_event) = &seen[0];
        assert_eq!(*kind, "pre");
        assert_eq!(pre_event.page.url_path, "home/about/");
        assert_eq!(pre_event.page.path, tree.about.path);
        assert_eq!(pre_event.url_path_before, "home/about/");
        assert_eq!(pre_event.url_path_after, "products/about/");
        assert_eq!(pre_event.parent_before.as_ref().map(|p| p.id), Some(tree.home.id));
        assert_eq!(pre_event.parent_after.as_ref().map(|p| p.id), Some(tree.products.id));
        assert!(!pre_event.is_reorder());

        let (kind, post_event) = &seen[1];
        assert_eq!(*kind, "post");
        assert_eq!(post_event.page.url_path, "products/about/");
        assert_ne!(post_event.page.path, tree.about.path);
        assert_eq!(post_event.parent_after.as_ref().map(|p| p.numchild), Some(1));

        Ok(())
    }

    #[tokio::test]
    async fn test_failed_propagation_rolls_back_everything() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;
        let tree = create_sample_tree(&service).await?;

        // Abort the statement that rewrites descendant URL paths
        service
            .db()
            .connect()?
            .execute(
                "CREATE TRIGGER fail_descendant_url_update BEFORE UPDATE OF url_path ON pages
                 WHEN NEW.slug = 'team'
                 BEGIN SELECT RAISE(ABORT, 'descendant update rejected'); END",
                (),
            )
            .await?;

        let pre_count = Arc::new(Mutex::new(0));
        let post_count = Arc::new(Mutex::new(0));
        let pre = Arc::clone(&pre_count);
        service
            .signals()
            .pre_page_move
            .connect(move |_| *pre.lock().unwrap() += 1);
        let post = Arc::clone(&post_count);
        service
            .signals()
            .post_page_move
            .connect(move |_| *post.lock().unwrap() += 1);

        let result = service
            .move_page(&tree.about, &tree.products, Position::LastChild, None)
            .await;
        assert!(result.is_err());

        let about = reload(&service, &tree.about).await?;
        let team = reload(&service, &tree.team).await?;
        let home = reload(&service, &tree.home).await?;
        let products = reload(&service, &tree.products).await?;

        assert_eq!(about.path, tree.about.path);
        assert_eq!(about.url_path, "home/about/");
        assert_eq!(team.path, tree.team.path);
        assert_eq!(team.url_path, "home/about/team/");
        assert_eq!(home.numchild, 1);
        assert_eq!(products.numchild, 0);

        assert_eq!(*pre_count.lock().unwrap(), 1);
        assert_eq!(*post_count.lock().unwrap(), 0);

        let history = service.page_history(tree.about.id).await?;
        assert!(history
            .iter()
            .all(|e| e.action != LogAction::Move && e.action != LogAction::Reorder));

        Ok(())
    }

    #[tokio::test]
    async fn test_move_emits_page_moved_event() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;
        let tree = create_sample_tree(&service).await?;

        let mut rx = service.subscribe_to_events();
        service
            .move_page(&tree.about, &tree.products, Position::LastChild, None)
            .await?;

        let event = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("Event should be emitted within 1 second")
            .expect("Should receive event");

        match event {
            DomainEvent::PageMoved {
                page,
                url_path_before,
                url_path_after,
            } => {
                assert_eq!(page.id, tree.about.id);
                assert_eq!(url_path_before, "home/about/");
                assert_eq!(url_path_after, "products/about/");
            }
            other => panic!("Expected PageMoved event, got {:?}", other),
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_new_children_follow_moved_siblings() -> Result<()> {
        let (service, _temp_dir) = create_test_service().await?;
        let tree = create_sample_tree(&service).await?;
        let contact = service
            .add_child(tree.home.id, NewPage::new("Contact"), None)
            .await?;

        service
            .move_page(&tree.about, &tree.products, Position::LastChild, None)
            .await?;
        let careers = service
            .add_child(tree.home.id, NewPage::new("Careers"), None)
            .await?;

        assert_eq!(careers.url_path, "home/careers/");
        assert_eq!(
            child_titles(&service, &tree.home).await?,
            vec!["Contact", "Careers"]
        );
        assert!(careers.path > reload(&service, &contact).await?.path);

        Ok(())
    }
}
