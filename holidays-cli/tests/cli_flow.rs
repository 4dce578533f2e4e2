use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use mockito::{Matcher, Mock, ServerGuard};
use predicates::prelude::*;
use predicates::str::contains;
use serde_json::Value;

use holidays_core::{settings, CountryCode};
use tempfile::TempDir;

const BODY_US: &str = r#"{"status":200,"holidays":{
    "2017-01-01":[{"name":"New Year's Day","date":"2017-01-01"}],
    "2017-07-04":[{"name":"Independence Day","date":"2017-07-04"}]
}}"#;

fn holidays_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("holidays"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env_remove("HOLIDAYS_API_KEY")
        .env_remove("HOLIDAYS_BASE_URL");
    cmd
}

fn mock_country(server: &mut ServerGuard, country: &str, status: usize, body: &str) -> Mock {
    server
        .mock("GET", "/v1/holidays")
        .match_query(Matcher::UrlEncoded("country".into(), country.into()))
        .with_status(status)
        .with_body(body)
        .create()
}

fn point_at(home: &Path, server: &ServerGuard, countries: &[&str]) {
    let url = format!("{}/v1/holidays", server.url());
    let codes = countries
        .iter()
        .map(|c| CountryCode::new(c).expect("country"))
        .collect();
    settings::update_at(home, |s| {
        s.base_url = url;
        s.api_key = "test-key".into();
        s.year = Some(2017);
        s.set_countries(codes);
    })
    .expect("write settings");
}

fn stdout_json(cmd: &mut Command) -> Value {
    let output = cmd.output().expect("run holidays");
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

#[test]
fn sync_then_query_the_cache() {
    let home = TempDir::new().expect("home");
    let mut server = mockito::Server::new();
    let _us = mock_country(&mut server, "US", 200, BODY_US);
    point_at(home.path(), &server, &["US"]);

    holidays_cmd(home.path())
        .arg("sync")
        .assert()
        .success()
        .stdout(contains("2 holidays cached for 2017"));

    let list = stdout_json(holidays_cmd(home.path()).args(["list", "--json"]));
    let dates: Vec<&str> = list
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|r| r.get("date").and_then(Value::as_str))
        .collect();
    assert_eq!(dates, vec!["2017-01-01", "2017-07-04"]);

    holidays_cmd(home.path())
        .args(["show", "independence day"])
        .assert()
        .success()
        .stdout(contains("2017-07-04"))
        .stdout(contains("United States"));

    holidays_cmd(home.path())
        .args(["today", "--date", "2017-07-04", "--no-notify"])
        .assert()
        .success()
        .stdout(contains("Independence Day celebrated today!"))
        .stdout(contains("New Year").not());

    let status = stdout_json(holidays_cmd(home.path()).args(["status", "--json"]));
    assert_eq!(status["cache"]["state"], "synced");
    assert_eq!(status["cache"]["records"], 2);
    assert_eq!(status["daemon"]["running"], false);
}

#[test]
fn resync_of_identical_data_reports_unchanged() {
    let home = TempDir::new().expect("home");
    let mut server = mockito::Server::new();
    let _us = mock_country(&mut server, "US", 200, BODY_US);
    point_at(home.path(), &server, &["US"]);

    holidays_cmd(home.path()).arg("sync").assert().success();
    let summary = stdout_json(holidays_cmd(home.path()).args(["sync", "--json"]));
    assert_eq!(summary["outcome"], "done");
    assert_eq!(summary["changed"], false);
    assert_eq!(summary["records"], 2);
}

#[test]
fn total_failure_reports_network_problem_and_keeps_cache() {
    let home = TempDir::new().expect("home");
    let mut server = mockito::Server::new();
    let us = mock_country(&mut server, "US", 200, BODY_US);
    point_at(home.path(), &server, &["US"]);
    holidays_cmd(home.path()).arg("sync").assert().success();

    us.remove();
    let _down = mock_country(&mut server, "US", 500, "");

    holidays_cmd(home.path())
        .arg("sync")
        .assert()
        .failure()
        .stderr(contains("Problem with network connection"));

    let list = stdout_json(holidays_cmd(home.path()).args(["list", "--json"]));
    assert_eq!(list.as_array().map(Vec::len), Some(2));
}

#[test]
fn partial_failure_lists_failed_country() {
    let home = TempDir::new().expect("home");
    let mut server = mockito::Server::new();
    let _us = mock_country(&mut server, "US", 200, BODY_US);
    let _de = mock_country(&mut server, "DE", 503, "");
    point_at(home.path(), &server, &["US", "DE"]);

    let summary = stdout_json(holidays_cmd(home.path()).args(["sync", "--json"]));
    assert_eq!(summary["outcome"], "done");
    let countries = summary["countries"].as_array().expect("countries");
    assert_eq!(countries.len(), 2);
    assert_eq!(countries[0]["ok"], true);
    assert_eq!(countries[1]["country"], "DE");
    assert_eq!(countries[1]["ok"], false);
}

#[test]
fn empty_cache_is_reported_as_never_synced() {
    let home = TempDir::new().expect("home");

    holidays_cmd(home.path())
        .arg("list")
        .assert()
        .success()
        .stdout(contains("No holidays cached yet"));

    holidays_cmd(home.path())
        .args(["show", "Christmas"])
        .assert()
        .failure()
        .stderr(contains("no cached holiday named 'Christmas'"));

    let status = stdout_json(holidays_cmd(home.path()).args(["status", "--json"]));
    assert_eq!(status["cache"]["state"], "never_synced");
    assert_eq!(status["cache"]["records"], 0);
}

#[test]
fn config_commands_update_settings_file() {
    let home = TempDir::new().expect("home");

    holidays_cmd(home.path())
        .args(["config", "countries", "de", "us", "DE"])
        .assert()
        .success()
        .stdout(contains("countries: DE, US"));
    holidays_cmd(home.path())
        .args(["config", "notifications", "off"])
        .assert()
        .success();
    holidays_cmd(home.path())
        .args(["config", "year", "2017"])
        .assert()
        .success();
    holidays_cmd(home.path())
        .args(["config", "notify-at", "07:30"])
        .assert()
        .success();
    holidays_cmd(home.path())
        .args(["config", "api-key", "secret-abcd"])
        .assert()
        .success();

    let saved = settings::load_at(home.path()).expect("load");
    let codes: Vec<&str> = saved.countries.iter().map(CountryCode::as_str).collect();
    assert_eq!(codes, vec!["DE", "US"]);
    assert!(!saved.notifications_enabled);
    assert_eq!(saved.year, Some(2017));
    assert_eq!(saved.notify_at, "07:30");
    assert_eq!(saved.api_key, "secret-abcd");

    holidays_cmd(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(contains("abcd"))
        .stdout(contains("secret").not());

    holidays_cmd(home.path())
        .args(["config", "countries"])
        .assert()
        .success()
        .stdout(contains("Germany"))
        .stdout(contains("Japan"));
}

#[test]
fn invalid_config_values_are_rejected() {
    let home = TempDir::new().expect("home");

    holidays_cmd(home.path())
        .args(["config", "notify-at", "25:99"])
        .assert()
        .failure()
        .stderr(contains("notify_at"));
    holidays_cmd(home.path())
        .args(["config", "countries", "U1"])
        .assert()
        .failure();
    holidays_cmd(home.path())
        .args(["config", "year", "0"])
        .assert()
        .failure();

    assert!(!settings::settings_path_at(home.path()).exists());
}
