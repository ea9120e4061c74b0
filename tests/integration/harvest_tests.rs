use crate::common::*;
use sumi_harvest::crawler::{consolidate_only, run_harvest};
use sumi_harvest::storage::UnitFileStore;
use sumi_harvest::{RunOptions, Shutdown};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_full_harvest_with_one_failing_item() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path(), 2, false);

    let summary = run_harvest(
        &config,
        Some("hash-1".to_string()),
        extractor(&config),
        RunOptions::default(),
        Shutdown::new(),
    )
    .await
    .expect("harvest should run");

    let report = &summary.report;
    assert!(report.is_complete());
    assert_eq!(report.waves, 2);
    assert_eq!(report.discovered, 4);
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.failed_ids(), vec!["team-3"]);
    assert_eq!(report.records, 5);

    // One unit file per item, the failed one empty
    let units = UnitFileStore::new(layout(&config));
    let files = units.list().unwrap();
    assert_eq!(files.len(), 3);
    let failed_file = layout(&config).unit_file("team-3");
    assert!(units.read(&failed_file).unwrap().is_empty());

    // Every checkpointed id has a unit file
    let completed = load_checkpoint(&config).await;
    assert_eq!(completed.len(), 3);
    assert_eq!(completed.failed_len(), 1);
    for id in ["team-1", "team-2", "team-3"] {
        assert!(completed.contains(id));
        assert!(units.exists(id));
    }

    let records = canonical_records(&config);
    assert_eq!(records.len(), 5);
    assert!(records.iter().all(|r| r.get_str("team") == Some("team-1")));
    assert_eq!(records[0].get_str("name"), Some("Ann"));

    let consolidation = summary.consolidation.expect("consolidation should succeed");
    assert_eq!(consolidation.stats.total, 5);
    assert!(!summary.checkpoint_cleared);
}

#[tokio::test]
async fn test_complete_run_clears_checkpoint() {
    let server = MockServer::start().await;
    mount_index(&server).await;
    for team in 1..=3 {
        mount_roster(&server, team, &["Solo"]).await;
    }
    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path(), 3, true);

    let summary = run_harvest(
        &config,
        None,
        extractor(&config),
        RunOptions::default(),
        Shutdown::new(),
    )
    .await
    .unwrap();

    assert!(summary.checkpoint_cleared);
    assert!(!layout(&config).progress_file().exists());
    assert!(!layout(&config).partial_file().exists());
    // Same name on three teams is three identities
    assert_eq!(canonical_records(&config).len(), 3);
}

#[tokio::test]
async fn test_only_unknown_root_crawls_nothing() {
    let server = MockServer::start().await;
    forbid(&server, "/teams").await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path(), 1, true);

    let options = RunOptions {
        only_roots: vec!["missing".to_string()],
        ..RunOptions::default()
    };
    let summary = run_harvest(&config, None, extractor(&config), options, Shutdown::new())
        .await
        .unwrap();

    assert_eq!(summary.report.discovered, 0);
    assert_eq!(summary.report.waves, 0);
    assert!(canonical_records(&config).is_empty());
    server.verify().await;
}

#[tokio::test]
async fn test_blocked_item_page_fails_unit() {
    let server = MockServer::start().await;
    mount_index(&server).await;
    mount_roster(&server, 1, &["Ann"]).await;
    mount_roster(&server, 2, &["Bo"]).await;
    Mock::given(method("GET"))
        .and(path("/teams/3"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body>Please complete the CAPTCHA to continue</body></html>"),
        )
        .expect(2)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path(), 2, false);

    let summary = run_harvest(&config, None, extractor(&config), RunOptions::default(), Shutdown::new())
        .await
        .unwrap();

    assert_eq!(summary.report.failed_ids(), vec!["team-3"]);
    assert!(summary.report.failed[0].reason.contains("Blocked"));
    let direct = summary
        .health
        .iter()
        .find(|h| h.identity == "direct")
        .expect("direct identity is tracked");
    assert_eq!(direct.detections, 2);
    server.verify().await;
}

#[tokio::test]
async fn test_malformed_canonical_keeps_checkpoint() {
    let server = MockServer::start().await;
    mount_index(&server).await;
    for team in 1..=3 {
        mount_roster(&server, team, &["Solo"]).await;
    }
    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path(), 2, true);
    layout(&config).ensure_dirs().unwrap();
    std::fs::write(layout(&config).canonical_file(), "{\"not\": \"a list\"}").unwrap();

    let summary = run_harvest(&config, None, extractor(&config), RunOptions::default(), Shutdown::new())
        .await
        .unwrap();

    assert!(summary.report.is_complete());
    assert!(summary.consolidation.is_none());
    assert!(summary.consolidation_error.is_some());
    assert!(!summary.checkpoint_cleared);
    assert_eq!(load_checkpoint(&config).await.len(), 3);
}

#[tokio::test]
async fn test_consolidate_only_merges_existing_unit_files() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path(), 2, false);

    run_harvest(&config, None, extractor(&config), RunOptions::default(), Shutdown::new())
        .await
        .unwrap();
    std::fs::remove_file(layout(&config).canonical_file()).unwrap();

    let report = consolidate_only(&config).unwrap();
    assert!(report.written);
    assert_eq!(report.unit_files, 3);
    assert_eq!(canonical_records(&config).len(), 5);

    // Idempotent: a second pass changes nothing
    let again = consolidate_only(&config).unwrap();
    assert!(!again.written);
    assert_eq!(canonical_records(&config).len(), 5);
}
