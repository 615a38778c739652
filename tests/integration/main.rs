//! Integration tests for cache-dance

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;

    fn dance() -> Command {
        let mut cmd = cargo_bin_cmd!("cache-dance");
        cmd.env("DANCE_CONFIG", "/nonexistent/cache-dance/config.toml");
        cmd
    }

    #[test]
    fn help_displays() {
        dance()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("persist BuildKit cache mounts"));
    }

    #[test]
    fn version_displays() {
        dance()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("cache-dance"));
    }

    #[test]
    fn config_path() {
        dance()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        dance()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[builder]"))
            .stdout(predicate::str::contains("busybox"));
    }

    #[test]
    fn extract_skipped() {
        dance()
            .args(["extract", "--skip-extraction"])
            .assert()
            .success()
            .stderr(predicate::str::contains("Skipping cache extraction"));
    }

    #[test]
    fn bad_cache_map_rejected() {
        dance()
            .args(["inject", "--cache-map", "{not json"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid cache map"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn relative_target_rejected() {
        dance()
            .args(["extract", "--cache-map", r#"{"cache": "relative/target"}"#])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid cache mount"));
    }

    #[test]
    fn unknown_output_rejected() {
        dance()
            .args(["extract", "--output", "registry"])
            .assert()
            .failure();
    }
}

mod transfer_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// Fake docker: buildx writes a marker into a local export (or fails
    /// when DANCE_FAKE_FAIL is set), anything else succeeds
    const FAKE_DOCKER: &str = r#"#!/bin/sh
[ "$1" = "buildx" ] || exit 0
if [ -n "$DANCE_FAKE_FAIL" ]; then echo "ERROR: failed to solve" >&2; exit 1; fi
while [ $# -gt 0 ]; do
  case "$1" in
    --output) output=$2; shift ;;
  esac
  shift
done
case "$output" in
  type=local,dest=*)
    dest=${output#type=local,dest=}
    mkdir -p "$dest/cache-store"
    echo restored > "$dest/cache-store/marker.txt" ;;
esac
exit 0
"#;

    struct Workspace {
        temp: TempDir,
    }

    impl Workspace {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let script = temp.path().join("docker.sh");
            fs::write(&script, FAKE_DOCKER).unwrap();

            let config = format!(
                "[builder]\ncommand = [\"sh\", \"{}\"]\n\n[transfer]\nscratch_dir = \"{}\"\nprivileged_command = []\n",
                script.display(),
                temp.path().join("scratch").display()
            );
            fs::write(temp.path().join("config.toml"), config).unwrap();
            Self { temp }
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.temp.path().join(rel)
        }

        fn dance(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("cache-dance");
            cmd.env("DANCE_CONFIG", self.path("config.toml"))
                .env_remove("GITHUB_STATE")
                .current_dir(self.temp.path());
            cmd
        }

        fn cache_map(&self, rel: &str, target: &str) -> String {
            format!(r#"{{"{}": "{}"}}"#, self.path(rel).display(), target)
        }
    }

    fn is_empty_dir(path: &Path) -> bool {
        fs::read_dir(path).map(|mut d| d.next().is_none()).unwrap_or(false)
    }

    #[test]
    fn extract_end_to_end() {
        let ws = Workspace::new();
        let dest = ws.path("cache/pkg");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("stale.txt"), "old").unwrap();

        ws.dance()
            .args(["extract", "--cache-map", &ws.cache_map("cache/pkg", "/root/.cache/pkg")])
            .assert()
            .success();

        assert_eq!(
            fs::read_to_string(dest.join("marker.txt")).unwrap(),
            "restored\n"
        );
        assert!(!dest.join("stale.txt").exists());
        assert!(is_empty_dir(&ws.path("scratch")));
    }

    #[test]
    fn extract_batch_end_to_end() {
        let ws = Workspace::new();

        ws.dance()
            .args([
                "extract",
                "--job-model",
                "batch",
                "--cache-map",
                &ws.cache_map("cache/pkg", "/root/.cache/pkg"),
            ])
            .assert()
            .success();

        // The fake exports nothing under the batch staging key
        assert!(is_empty_dir(&ws.path("cache/pkg")));
    }

    #[test]
    fn inject_marks_post_step() {
        let ws = Workspace::new();
        let source = ws.path("cache/pkg");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("data.bin"), "data").unwrap();
        let state = ws.path("github-state");

        ws.dance()
            .env("GITHUB_STATE", &state)
            .args(["inject", "--cache-map", &ws.cache_map("cache/pkg", "/root/.cache/pkg")])
            .assert()
            .success();

        assert!(!source.exists());
        assert_eq!(fs::read_to_string(state).unwrap(), "POST=true\n");
    }

    #[test]
    fn inject_failure_still_marks_post_step() {
        let ws = Workspace::new();
        let source = ws.path("cache/pkg");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("data.bin"), "data").unwrap();
        let state = ws.path("github-state");

        ws.dance()
            .env("GITHUB_STATE", &state)
            .env("DANCE_FAKE_FAIL", "1")
            .args(["inject", "--cache-map", &ws.cache_map("cache/pkg", "/root/.cache/pkg")])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Builder failed"));

        assert_eq!(fs::read_to_string(state).unwrap(), "POST=true\n");
        assert!(source.join("data.bin").exists());
    }

    #[test]
    fn builder_failure_exits_nonzero() {
        let ws = Workspace::new();
        let dest = ws.path("cache/pkg");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("keep.txt"), "keep").unwrap();

        ws.dance()
            .args(["extract", "--cache-map", &ws.cache_map("cache/pkg", "/root/.cache/pkg")])
            .env("DANCE_FAKE_FAIL", "1")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Builder failed"));

        assert!(dest.join("keep.txt").exists());
        assert!(is_empty_dir(&ws.path("scratch")));
    }
}
