use crate::common::{bundle, read, run_node, scratch_fixture};
use std::fs;

fn is_hashed_name(name: &str, ext: &str) -> bool {
    name.strip_suffix(&format!(".{}", ext))
        .is_some_and(|stem| !stem.is_empty() && stem.chars().all(|c| c.is_ascii_hexdigit()))
}

#[tokio::test]
async fn test_shared_module_is_inlined_once() {
    let project = scratch_fixture("typescript-dedup");
    let output = bundle(project.path(), "index.ts", |_| {}).await;

    assert_eq!(output.report.total_assets, 4);
    let root = &output.report.bundles[0];
    assert_eq!(root.assets, vec!["index.ts", "left.ts", "shared.ts", "right.ts"]);
    assert!(root.child_bundles.is_empty());

    if let Some(result) = run_node(&project.path().join("dist/index.js"), "m.total()") {
        assert_eq!(result, "23");
    }
}

#[tokio::test]
async fn test_raw_asset_becomes_url_bundle() {
    let project = scratch_fixture("typescript-raw");
    let output = bundle(project.path(), "index.ts", |_| {}).await;

    assert_eq!(output.report.total_assets, 2);
    let root = &output.report.bundles[0];
    assert_eq!(root.assets, vec!["index.ts"]);
    assert_eq!(root.child_bundles.len(), 1);

    let child = &root.child_bundles[0];
    assert_eq!(child.bundle_type, "txt");
    assert_eq!(child.assets, vec!["test.txt"]);
    assert!(is_hashed_name(&child.name, "txt"), "{}", child.name);

    let emitted = project.path().join("dist").join(&child.name);
    assert_eq!(fs::read(&emitted).unwrap(), fs::read(project.path().join("test.txt")).unwrap());

    let code = read(&project.path().join("dist/index.js"));
    assert!(code.contains(&format!("\"/{}\"", child.name)));

    if let Some(result) = run_node(&project.path().join("dist/index.js"), "m.getRaw()") {
        assert_eq!(result, format!("\"/{}\"", child.name));
    }
}

#[tokio::test]
async fn test_public_url_prefixes_raw_paths() {
    let project = scratch_fixture("typescript-raw");
    let output = bundle(project.path(), "index.ts", |config| {
        config.public_url = "/static/".to_string();
    })
    .await;

    let child = &output.report.bundles[0].child_bundles[0];
    let code = read(&project.path().join("dist/index.js"));
    assert!(code.contains(&format!("\"/static/{}\"", child.name)));
}

#[tokio::test]
async fn test_dynamic_import_creates_child_bundle() {
    let project = scratch_fixture("typescript-async");
    let output = bundle(project.path(), "index.ts", |_| {}).await;

    assert_eq!(output.report.total_assets, 2);
    let root = &output.report.bundles[0];
    assert_eq!(root.assets, vec!["index.ts"]);
    assert_eq!(root.child_bundles.len(), 1);

    let child = &root.child_bundles[0];
    assert_eq!(child.bundle_type, "js");
    assert_eq!(child.assets, vec!["lazy.ts"]);
    assert!(child.name.starts_with("lazy.") && child.name.ends_with(".js"));
    assert!(project.path().join("dist").join(&child.name).is_file());

    if let Some(result) = run_node(&project.path().join("dist/index.js"), "m.load()") {
        assert_eq!(result, "42");
    }
}

#[tokio::test]
async fn test_two_entries_two_root_bundles() {
    let project = scratch_fixture("typescript-dedup");
    let output = typack::Bundler::new(typack::BuildConfig::new(project.path()))
        .bundle(&["index.ts".to_string(), "left.ts".to_string()])
        .await
        .unwrap();

    let names: Vec<&str> = output.report.bundles.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["index.js", "left.js"]);
    assert_eq!(output.report.bundles[1].assets, vec!["left.ts", "shared.ts"]);
    assert_eq!(output.report.total_assets, 4);
}
