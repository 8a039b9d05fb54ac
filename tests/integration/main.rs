//! Integration tests for Repocache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// A `file://` repository plus an isolated config and cache directory
    struct Sandbox {
        dir: TempDir,
    }

    impl Sandbox {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            std::fs::create_dir_all(dir.path().join("repo")).unwrap();
            let config = format!(
                "[cache]\ndir = {:?}\n",
                dir.path().join("cache").display().to_string()
            );
            std::fs::write(dir.path().join("config.toml"), config).unwrap();
            Self { dir }
        }

        fn publish(&self, name: &str, content: &str) {
            std::fs::write(self.repo().join(name), content).unwrap();
        }

        fn repo(&self) -> PathBuf {
            self.dir.path().join("repo")
        }

        fn repo_url(&self) -> String {
            format!("file://{}", self.repo().display())
        }

        fn cache(&self) -> PathBuf {
            self.dir.path().join("cache")
        }

        fn cmd(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("repocache");
            cmd.env_remove("REPOCACHE_RESUMABLE")
                .env("CI", "1")
                .arg("--config")
                .arg(self.dir.path().join("config.toml"));
            cmd
        }
    }

    fn cached_files(dir: &Path, extension: &str) -> Vec<PathBuf> {
        match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == extension))
                .collect(),
            Err(_) => vec![],
        }
    }

    #[test]
    fn help_displays() {
        cargo_bin_cmd!("repocache")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("metadata repository cache"));
    }

    #[test]
    fn version_displays() {
        cargo_bin_cmd!("repocache")
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("repocache"));
    }

    #[test]
    fn config_path() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[general]").and(predicate::str::contains("[cache]")));
    }

    #[test]
    fn fetch_caches_xml_index() {
        let sandbox = Sandbox::new();
        sandbox.publish("content.xml", "<repository name='test'/>");

        sandbox
            .cmd()
            .args(["fetch", &sandbox.repo_url()])
            .assert()
            .success()
            .stdout(predicate::str::contains("content"));

        let cached = cached_files(&sandbox.cache(), "xml");
        assert_eq!(cached.len(), 1);
        assert_eq!(
            std::fs::read_to_string(&cached[0]).unwrap(),
            "<repository name='test'/>"
        );
    }

    #[test]
    fn fetch_prefers_jar() {
        let sandbox = Sandbox::new();
        sandbox.publish("content.xml", "xml");
        sandbox.publish("content.jar", "jar");

        sandbox
            .cmd()
            .args(["fetch", &sandbox.repo_url()])
            .assert()
            .success();

        assert_eq!(cached_files(&sandbox.cache(), "jar").len(), 1);
        assert!(cached_files(&sandbox.cache(), "xml").is_empty());
    }

    #[test]
    fn fetch_missing_index_fails() {
        let sandbox = Sandbox::new();

        sandbox
            .cmd()
            .args(["fetch", &sandbox.repo_url()])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Neither"));
    }

    #[test]
    fn fetch_rejects_relative_location() {
        let sandbox = Sandbox::new();

        sandbox
            .cmd()
            .args(["fetch", "not/a/url"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid repository location"));
    }

    #[test]
    fn list_and_evict() {
        let sandbox = Sandbox::new();
        sandbox.publish("content.xml", "content");
        sandbox.publish("artifacts.jar", "artifacts");

        sandbox
            .cmd()
            .args(["fetch", &sandbox.repo_url(), "-p", "content", "-p", "artifacts"])
            .assert()
            .success();

        sandbox
            .cmd()
            .args(["list", "--format", "json"])
            .assert()
            .success()
            .stdout(
                predicate::str::contains("\"format\": \"xml\"")
                    .and(predicate::str::contains("\"format\": \"jar\"")),
            );

        sandbox
            .cmd()
            .args(["evict", &sandbox.repo_url()])
            .assert()
            .success()
            .stdout(predicate::str::contains("Evicted 2 file(s)"));

        sandbox
            .cmd()
            .args(["list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[]"));
    }

    #[test]
    fn list_empty() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached indexes"));
    }
}
