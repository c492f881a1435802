//! Integration tests for flakepin

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn flakepin() -> Command {
        cargo_bin_cmd!("flakepin")
    }

    /// Config with the durable cache off and sources pointed at `base_url`
    fn write_config(dir: &Path, base_url: &str) -> PathBuf {
        let path = dir.join("config.toml");
        let content = format!(
            r#"
[resolver]
channels = ["nixos-unstable"]
system = "x86_64-linux"
call_timeout_ms = 2000
total_budget_ms = 5000

[cache]
durable_enabled = false

[sources]
nixhub_url = "{base_url}"
search_url = "{base_url}/backend"
retry_backoff_ms = 1
"#
        );
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn help_displays() {
        flakepin()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("pin nixpkgs packages"));
    }

    #[test]
    fn resolve_help_displays() {
        flakepin()
            .args(["resolve", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("<NAME> <VERSION>"));
    }

    #[test]
    fn version_displays() {
        flakepin()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("flakepin"));
    }

    #[test]
    fn config_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        flakepin()
            .args(["--config", path.to_str().unwrap(), "config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.toml");
        flakepin()
            .args(["--config", path.to_str().unwrap(), "config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[resolver]"))
            .stdout(predicate::str::contains("nixos-unstable"));
    }

    #[test]
    fn config_init_writes_file_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let arg = path.to_str().unwrap();

        flakepin()
            .args(["--config", arg, "config", "init"])
            .assert()
            .success();
        assert!(path.exists());

        flakepin()
            .args(["--config", arg, "config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--force"));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[resolver]\nchannels = []\n").unwrap();

        flakepin()
            .args(["--config", path.to_str().unwrap(), "config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"))
            .stderr(predicate::str::contains("resolver.channels"));
    }

    #[test]
    fn resolve_rejects_empty_name() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path(), "http://127.0.0.1:9");

        flakepin()
            .args(["--config", config.to_str().unwrap(), "resolve", " ", "1.0"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid resolve request"));
    }

    #[test]
    fn resolve_prints_json() {
        use httpmock::prelude::*;

        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/packages/htop");
            then.status(200).json_body(serde_json::json!({
                "name": "htop",
                "releases": [{
                    "version": "3.2.1",
                    "platforms": [{
                        "system": "x86_64-linux",
                        "attribute_path": "htop",
                        "commit_hash": "0123456789abcdef0123456789abcdef01234567"
                    }]
                }]
            }));
        });

        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path(), &server.base_url());

        flakepin()
            .args([
                "--config",
                config.to_str().unwrap(),
                "resolve",
                "htop",
                "3.2.1",
                "--json",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""attributePath": "htop""#))
            .stdout(predicate::str::contains(
                r#""commitHash": "0123456789abcdef0123456789abcdef01234567""#,
            ))
            .stdout(predicate::str::contains(r#""source": "primary""#));
    }

    #[test]
    fn resolve_not_found_shows_hint() {
        use httpmock::prelude::*;

        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/packages/nosuchpkg");
            then.status(404);
        });

        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path(), &server.base_url());

        flakepin()
            .args([
                "--config",
                config.to_str().unwrap(),
                "resolve",
                "nosuchpkg",
                "1.0",
                "--strategy",
                "primary-only",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Package not found: nosuchpkg@1.0"))
            .stderr(predicate::str::contains("Hint:"));
    }
}
