//! Fake container CLI for engine tests
//!
//! A generated `sh` script stands in for `docker`. It emulates just enough of
//! `buildx build`, `create`, `cp` and `rm` to move files between a simulated
//! cache store (`<state>/store/<target>`) and the host, reading the copy
//! commands out of the rendered build definition.

use crate::cache::mount::CacheMount;
use crate::cache::relocate::DestinationRemover;
use crate::cache::transfer::TransferContext;
use crate::config::{BuilderConfig, CacheOptions, DefinitionInput, OutputStrategy};
use crate::orchestration::create_driver;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SCRIPT: &str = r##"#!/bin/sh
state='@STATE@'
echo "$*" >> "$state/log"

case "$1" in
  rm)
    # rm -f NAME
    if [ -d "$state/containers/$3" ]; then rm -rf "$state/containers/$3"; exit 0; fi
    echo "Error response from daemon: No such container: $3" >&2
    exit 1 ;;
  image)
    # image rm -f TAG
    if [ -d "$state/images/$4" ]; then rm -rf "$state/images/$4"; exit 0; fi
    echo "Error response from daemon: No such image: $4" >&2
    exit 1 ;;
  create)
    # create --name NAME IMAGE
    [ -d "$state/images/$4" ] || { echo "No such image: $4" >&2; exit 1; }
    cp -R "$state/images/$4" "$state/containers/$3"
    exit 0 ;;
  cp)
    # cp NAME:PATH -
    name=${2%%:*}
    path=${2#*:}
    cd "$state/containers/$name" || exit 1
    exec tar -cf - "${path#/}" ;;
  buildx) ;;
  *)
    echo "unexpected command: $1" >&2
    exit 2 ;;
esac

shift 2
file=
output=
tag=
context=
contexts=
while [ $# -gt 0 ]; do
  case "$1" in
    --builder) shift ;;
    --build-context) contexts="$contexts $2"; shift ;;
    -f) file=$2; shift ;;
    --output) output=$2; shift ;;
    --tag) tag=$2; shift ;;
    --load) ;;
    *) context=$1 ;;
  esac
  shift
done

if [ "$file" = "-" ]; then
  file="$state/stdin-definition"
  cat > "$file"
fi
[ -e "$state/fail" ] && { echo "ERROR: failed to solve" >&2; exit 1; }
[ -f "$context/buildstamp" ] || { echo "buildstamp missing from $context" >&2; exit 3; }

case "$output" in
  type=local,dest=*) root=${output#type=local,dest=} ;;
  *) root="$state/images/$tag" ;;
esac
[ -n "$tag" ] && mkdir -p "$state/images/$tag"

if grep -q '/cache-store' "$file"; then
  mkdir -p "$root"
  sed -n 's#.*(cp -p -R \([^ ]*\)/\. \(/cache-store[^ ]*\)/ || true).*#\1 \2#p' "$file" |
  while read -r target staging; do
    mkdir -p "$root$staging"
    if [ -d "$state/store$target" ]; then cp -R "$state/store$target/." "$root$staging/"; fi
  done
else
  sed -n 's#.*(cp -p -R \(/cache-in[^ ]*\)/\. \([^ ]*\).*#\1 \2#p' "$file" |
  while read -r staging target; do
    src=$context
    case "$staging" in
      /cache-in/*)
        for pair in $contexts; do
          case "$pair" in "src-${staging#/cache-in/}="*) src=${pair#*=} ;; esac
        done ;;
    esac
    mkdir -p "$state/store$target"
    cp -R "$src/." "$state/store$target/"
  done
fi
exit 0
"##;

/// A fake `docker` plus the directories a transfer touches
pub(crate) struct FakeDocker {
    root: TempDir,
}

impl FakeDocker {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        let state = root.path().join("state");
        for dir in ["store", "images", "containers"] {
            fs::create_dir_all(state.join(dir)).unwrap();
        }
        fs::create_dir_all(root.path().join("scratch")).unwrap();
        fs::create_dir_all(root.path().join("host")).unwrap();
        fs::write(
            root.path().join("docker.sh"),
            SCRIPT.replace("@STATE@", &state.display().to_string()),
        )
        .unwrap();
        Self { root }
    }

    fn state(&self) -> PathBuf {
        self.root.path().join("state")
    }

    /// Argv prefix invoking the fake
    pub fn command(&self) -> Vec<String> {
        vec![
            "sh".to_string(),
            self.root.path().join("docker.sh").display().to_string(),
        ]
    }

    pub fn scratch(&self) -> PathBuf {
        self.root.path().join("scratch")
    }

    /// A path under the simulated host filesystem
    pub fn host(&self, rel: &str) -> PathBuf {
        self.root.path().join("host").join(rel)
    }

    /// Contents of the simulated cache mount at `target`
    pub fn stored(&self, target: &str) -> PathBuf {
        self.state().join("store").join(target.trim_start_matches('/'))
    }

    /// Put a file into the simulated cache mount at `target`
    pub fn seed(&self, target: &str, rel: &str, contents: &str) {
        let path = self.stored(target).join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    /// Make every subsequent `buildx build` exit 1
    pub fn fail_builds(&self) {
        fs::write(self.state().join("fail"), "").unwrap();
    }

    pub fn log(&self) -> String {
        fs::read_to_string(self.state().join("log")).unwrap_or_default()
    }

    pub fn images_and_containers_gone(&self) -> bool {
        ["images", "containers"]
            .iter()
            .all(|dir| fs::read_dir(self.state().join(dir)).unwrap().count() == 0)
    }

    pub fn mount(&self, rel: &str, target: &str) -> CacheMount {
        let source = self.host(rel);
        CacheMount::from_options(
            &source.display().to_string(),
            &CacheOptions::Target(target.to_string()),
        )
        .unwrap()
    }

    pub fn builder_config(&self, output: OutputStrategy, input: DefinitionInput) -> BuilderConfig {
        BuilderConfig {
            command: self.command(),
            output,
            definition_input: input,
            ..BuilderConfig::default()
        }
    }

    pub fn context(&self, output: OutputStrategy, input: DefinitionInput) -> TransferContext {
        TransferContext {
            scratch_root: self.scratch(),
            image: "busybox".to_string(),
            driver: create_driver(&self.builder_config(output, input)).unwrap(),
            remover: DestinationRemover::unprivileged(),
            timeout: None,
        }
    }
}

/// Assert that `path` is an existing, empty directory
pub(crate) fn assert_empty_dir(path: &Path) {
    assert!(path.is_dir(), "{} is not a directory", path.display());
    assert_eq!(fs::read_dir(path).unwrap().count(), 0, "{} is not empty", path.display());
}

/// Every file under `root` with its contents, sorted by relative path
pub(crate) fn snapshot_tree(root: &Path) -> Vec<(PathBuf, String)> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let contents = fs::read_to_string(&path).unwrap();
                files.push((path.strip_prefix(root).unwrap().to_path_buf(), contents));
            }
        }
    }
    files.sort();
    files
}
