use std::path::Path;
use std::sync::Arc;
use sumi_harvest::config::{parse_config, Config};
use sumi_harvest::crawler::{Extractor, SelectorExtractor};
use sumi_harvest::record::Record;
use sumi_harvest::storage::{read_json, CheckpointStore, CompletedSet, TargetLayout};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Configuration for a site rooted at `<base>/teams`, with pacing and
/// backoff shrunk so tests run in milliseconds
pub fn test_config(base: &str, output_dir: &Path, workers: usize, clear_checkpoint: bool) -> Config {
    let toml = format!(
        r#"
[target]
name = "league"
output-dir = "{output}"
canonical = "players"
clear-checkpoint-on-success = {clear}

[crawl]
workers = {workers}
settle-between-units = false

[pacing]
max-rpm = 600000.0
base-rpm = 60000.0
jitter-min-ms = 0
jitter-max-ms = 0

[fetch]
timeout-secs = 5
direct-attempts = 2
backoff-base-ms = 1
backoff-max-ms = 5
min-body-length = 10

[merge]
identity-fields = ["name", "team"]

[[roots]]
id = "teams"
url = "{base}/teams"
kind = "group"

[extract]
group-links = "a.team"
record-selector = "tr.player"
unit-field = "team"

[extract.fields]
name = "td.name"
number = "td.number"
"#,
        output = output_dir.display().to_string().replace('\\', "/"),
        clear = clear_checkpoint,
        workers = workers,
        base = base,
    );
    parse_config(&toml).expect("test config should be valid")
}

pub fn extractor(config: &Config) -> Arc<dyn Extractor> {
    let extract = config.extract.clone().expect("test config has [extract]");
    Arc::new(SelectorExtractor::new(extract).expect("selectors should parse"))
}

pub fn layout(config: &Config) -> TargetLayout {
    TargetLayout::from_config(&config.target)
}

pub async fn load_checkpoint(config: &Config) -> CompletedSet {
    CheckpointStore::new(layout(config), None)
        .load()
        .await
        .expect("checkpoint should load")
}

pub fn canonical_records(config: &Config) -> Vec<Record> {
    read_json(&layout(config).canonical_file()).expect("canonical file should exist")
}

pub fn index_page() -> String {
    let links: String = (1..=3)
        .map(|i| format!(r#"<li><a class="team" data-unit-id="team-{i}" href="/teams/{i}">Team {i}</a></li>"#))
        .collect();
    format!("<html><body><ul>{}</ul></body></html>", links)
}

pub fn roster_page(players: &[&str]) -> String {
    let rows: String = players
        .iter()
        .enumerate()
        .map(|(i, name)| {
            format!(
                r#"<tr class="player"><td class="name">{}</td><td class="number">{}</td></tr>"#,
                name,
                i + 1
            )
        })
        .collect();
    format!(
        r#"<html><body><table><tr class="header"><td>Name</td></tr>{}</table></body></html>"#,
        rows
    )
}

pub async fn mount_index(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/teams"))
        .respond_with(ResponseTemplate::new(200).set_body_string(index_page()))
        .mount(server)
        .await;
}

pub async fn mount_roster(server: &MockServer, team: u32, players: &[&str]) {
    Mock::given(method("GET"))
        .and(path(format!("/teams/{}", team)))
        .respond_with(ResponseTemplate::new(200).set_body_string(roster_page(players)))
        .mount(server)
        .await;
}

/// Mounts the reference site: team 1 has five players, team 2 an empty
/// roster and team 3 is always unavailable
pub async fn mount_site(server: &MockServer) {
    mount_index(server).await;
    mount_roster(server, 1, &["Ann", "Bo", "Cy", "Di", "Ed"]).await;
    mount_roster(server, 2, &[]).await;
    Mock::given(method("GET"))
        .and(path("/teams/3"))
        .respond_with(ResponseTemplate::new(503).set_body_string("service unavailable"))
        .mount(server)
        .await;
}

/// Mounts a route that must not be requested
pub async fn forbid(server: &MockServer, route: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .named(format!("no request to {}", route))
        .mount(server)
        .await;
}
