use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use typack::{BuildConfig, BuildOutput, Bundler};

pub fn fixture_dir(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

/// Copy a fixture into a scratch directory so output never lands in the repo
pub fn scratch_fixture(name: &str) -> TempDir {
    let temp_dir = tempfile::tempdir().unwrap();
    copy_dir(&fixture_dir(name), temp_dir.path());
    temp_dir
}

fn copy_dir(from: &Path, to: &Path) {
    fs::create_dir_all(to).unwrap();
    for entry in fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), target).unwrap();
        }
    }
}

pub async fn bundle(root: &Path, entry: &str, configure: impl FnOnce(&mut BuildConfig)) -> BuildOutput {
    let mut config = BuildConfig::new(root);
    configure(&mut config);
    Bundler::new(config)
        .bundle(&[entry.to_string()])
        .await
        .unwrap_or_else(|e| panic!("{}", e.format_detailed()))
}

pub fn node_available() -> bool {
    Command::new("node")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Load `bundle` with node and print `expression` (`m` is the bundle's exports).
///
/// Returns `None` when node is not installed.
pub fn run_node(bundle: &Path, expression: &str) -> Option<String> {
    if !node_available() {
        eprintln!("node not found, skipping execution of {}", bundle.display());
        return None;
    }

    let script = format!(
        "const m = require({}); Promise.resolve({}).then((v) => console.log(JSON.stringify(v)));",
        serde_json::to_string(&bundle.to_string_lossy()).unwrap(),
        expression
    );
    let output = Command::new("node").arg("-e").arg(script).output().unwrap();
    assert!(
        output.status.success(),
        "node failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

pub fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}
