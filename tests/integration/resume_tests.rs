use crate::common::*;
use sumi_harvest::crawler::run_harvest;
use sumi_harvest::{RunOptions, Shutdown};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Serves a roster and requests shutdown while doing so
struct InterruptingRoster {
    shutdown: Shutdown,
    body: String,
}

impl Respond for InterruptingRoster {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.shutdown.trigger();
        ResponseTemplate::new(200).set_body_string(self.body.clone())
    }
}

#[tokio::test]
async fn test_resume_skips_checkpointed_items() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path(), 2, false);

    run_harvest(&config, None, extractor(&config), RunOptions::default(), Shutdown::new())
        .await
        .unwrap();

    // Second run: only the group index may be fetched again
    server.reset().await;
    mount_index(&server).await;
    for route in ["/teams/1", "/teams/2", "/teams/3"] {
        forbid(&server, route).await;
    }

    let summary = run_harvest(&config, None, extractor(&config), RunOptions::default(), Shutdown::new())
        .await
        .unwrap();

    assert_eq!(summary.report.skipped, 3);
    assert_eq!(summary.report.succeeded, 1);
    assert!(summary.report.failed.is_empty());
    assert_eq!(canonical_records(&config).len(), 5);
    server.verify().await;
}

#[tokio::test]
async fn test_retry_failed_refetches_only_failed_items() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path(), 2, false);

    run_harvest(&config, None, extractor(&config), RunOptions::default(), Shutdown::new())
        .await
        .unwrap();

    server.reset().await;
    mount_index(&server).await;
    forbid(&server, "/teams/1").await;
    forbid(&server, "/teams/2").await;
    mount_roster(&server, 3, &["Fay", "Gus"]).await;

    let options = RunOptions {
        retry_failed: true,
        ..RunOptions::default()
    };
    let summary = run_harvest(&config, None, extractor(&config), options, Shutdown::new())
        .await
        .unwrap();

    assert_eq!(summary.report.skipped, 2);
    assert!(summary.report.failed.is_empty());
    let completed = load_checkpoint(&config).await;
    assert_eq!(completed.len(), 3);
    assert_eq!(completed.failed_len(), 0);
    assert_eq!(canonical_records(&config).len(), 7);
    server.verify().await;
}

#[tokio::test]
async fn test_fresh_run_refetches_everything() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path(), 2, false);

    run_harvest(&config, None, extractor(&config), RunOptions::default(), Shutdown::new())
        .await
        .unwrap();

    server.reset().await;
    mount_index(&server).await;
    for team in 1..=3 {
        Mock::given(method("GET"))
            .and(path(format!("/teams/{}", team)))
            .respond_with(ResponseTemplate::new(200).set_body_string(roster_page(&["Ann"])))
            .expect(1)
            .mount(&server)
            .await;
    }

    let options = RunOptions {
        fresh: true,
        ..RunOptions::default()
    };
    let summary = run_harvest(&config, None, extractor(&config), options, Shutdown::new())
        .await
        .unwrap();

    assert_eq!(summary.report.skipped, 0);
    assert_eq!(summary.report.succeeded, 4);
    let completed = load_checkpoint(&config).await;
    assert_eq!(completed.len(), 3);
    assert_eq!(completed.failed_len(), 0);
    // Ann of team-1 merges with the earlier record; teams 2 and 3 add one each
    assert_eq!(canonical_records(&config).len(), 7);
    server.verify().await;
}

#[tokio::test]
async fn test_interrupted_run_keeps_checkpoint_and_resumes() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path(), 1, true);
    let shutdown = Shutdown::new();

    mount_index(&server).await;
    Mock::given(method("GET"))
        .and(path("/teams/1"))
        .respond_with(InterruptingRoster {
            shutdown: shutdown.clone(),
            body: roster_page(&["Ann", "Bo"]),
        })
        .expect(1)
        .mount(&server)
        .await;
    forbid(&server, "/teams/2").await;
    forbid(&server, "/teams/3").await;

    let summary = run_harvest(&config, None, extractor(&config), RunOptions::default(), shutdown)
        .await
        .unwrap();

    assert!(summary.report.interrupted);
    assert_eq!(summary.report.succeeded, 2);
    assert_eq!(summary.report.cancelled, 2);
    assert!(!summary.checkpoint_cleared);
    let completed = load_checkpoint(&config).await;
    assert!(completed.contains("team-1"));
    assert!(!completed.contains("team-2"));
    // Records finished before the interrupt are already consolidated
    assert_eq!(canonical_records(&config).len(), 2);
    server.verify().await;

    // Resume picks up where it stopped
    server.reset().await;
    mount_index(&server).await;
    forbid(&server, "/teams/1").await;
    mount_roster(&server, 2, &["Cy"]).await;
    mount_roster(&server, 3, &["Di"]).await;

    let resumed = run_harvest(&config, None, extractor(&config), RunOptions::default(), Shutdown::new())
        .await
        .unwrap();

    assert!(resumed.report.is_complete());
    assert_eq!(resumed.report.skipped, 1);
    assert!(resumed.checkpoint_cleared);
    assert_eq!(canonical_records(&config).len(), 4);
    server.verify().await;
}
