//! End-to-end CLI tests for the downloader binary.

#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;
use support::storefront::{
    ACCOUNT, FakeRelease, fan_blob, mount_fan_page, mount_release, write_cookies_file,
};

const BIN: &str = "bandcamp-collection-downloader";

/// A command isolated from the user's config file.
fn command(config_home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin(BIN).unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home.path())
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_binary_help_displays_usage() {
    let home = TempDir::new().unwrap();
    command(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Bandcamp collection"))
        .stdout(predicate::str::contains("--audio-format"));
}

#[test]
fn test_binary_version_displays_version() {
    let home = TempDir::new().unwrap();
    command(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(BIN));
}

#[test]
fn test_binary_requires_account() {
    let home = TempDir::new().unwrap();
    command(&home)
        .assert()
        .failure()
        .stderr(predicate::str::contains("ACCOUNT"));
}

#[test]
fn test_binary_rejects_unknown_audio_format() {
    let home = TempDir::new().unwrap();
    command(&home)
        .args([ACCOUNT, "-f", "opus"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown audio format"));
}

#[test]
fn test_binary_missing_cookies_file_is_fatal() {
    let home = TempDir::new().unwrap();
    let missing = home.path().join("nope.json");
    let assert = command(&home)
        .arg(ACCOUNT)
        .arg("-c")
        .arg(&missing)
        .arg("-d")
        .arg(home.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("ERROR:"))
        .stderr(predicate::str::contains("cannot be found"));
    assert_eq!(assert.get_output().status.code(), Some(1));
}

#[test]
fn test_binary_invalid_config_file_is_fatal() {
    let home = TempDir::new().unwrap();
    let dir = home.path().join("bandcamp-collection-downloader");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), "jobs = many\n").unwrap();

    command(&home)
        .arg(ACCOUNT)
        .arg("--debug")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("ERROR:"))
        .stderr(predicate::str::contains("config.toml"))
        .stderr(predicate::str::contains("line 1"));
}

#[tokio::test]
async fn test_binary_dry_run_succeeds_without_writing() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let release = FakeRelease::album("p11", 11, "First");
    mount_fan_page(&server, &fan_blob(&server, &[release.clone()], json!({}))).await;
    mount_release(&server, &release).await;

    let home = TempDir::new().unwrap();
    let cookies = write_cookies_file(home.path());
    let target = TempDir::new().unwrap();

    command(&home)
        .arg(ACCOUNT)
        .arg("-c")
        .arg(&cookies)
        .arg("-d")
        .arg(target.path())
        .args(["-f", "flac", "-n", "-q", "-r", "0"])
        .arg("--storefront-url")
        .arg(server.uri())
        .assert()
        .success();

    assert_eq!(std::fs::read_dir(target.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_binary_partial_success_exit_code_is_two() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let good = FakeRelease::album("p11", 11, "Good");
    let bad = FakeRelease::album("p12", 12, "Bad");
    mount_fan_page(
        &server,
        &fan_blob(&server, &[good.clone(), bad.clone()], json!({})),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/files/release12.zip"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_release(&server, &good).await;
    mount_release(&server, &bad).await;

    let home = TempDir::new().unwrap();
    let cookies = write_cookies_file(home.path());
    let target = TempDir::new().unwrap();

    let assert = command(&home)
        .arg(ACCOUNT)
        .arg("-c")
        .arg(&cookies)
        .arg("-d")
        .arg(target.path())
        .args(["-f", "flac", "-q", "-r", "0", "-j", "1"])
        .arg("--storefront-url")
        .arg(server.uri())
        .assert()
        .failure();
    assert_eq!(assert.get_output().status.code(), Some(2));
    assert!(
        target
            .path()
            .join("The Testers")
            .join("2021 - Good")
            .join("01 - Opening.flac")
            .is_file()
    );
}
