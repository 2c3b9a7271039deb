use crate::common::{bundle, read, run_node, scratch_fixture};
use typack::utils::{BuildError, BundlerError};
use typack::{BuildConfig, Bundler};

#[tokio::test]
async fn test_typescript_project() {
    let project = scratch_fixture("typescript");
    let output = bundle(project.path(), "index.ts", |_| {}).await;

    assert_eq!(output.report.total_assets, 2);
    assert_eq!(output.report.bundles.len(), 1);
    let root = &output.report.bundles[0];
    assert_eq!(root.name, "index.js");
    assert_eq!(root.bundle_type, "js");
    assert_eq!(root.assets, vec!["index.ts", "local.ts"]);
    assert!(root.child_bundles.is_empty());

    let bundle_path = project.path().join("dist/index.js");
    let code = read(&bundle_path);
    assert!(!code.contains("interface Unused"));
    assert!(!code.contains(": number"));

    if let Some(result) = run_node(&bundle_path, "[typeof m.count, Object.keys(m), m.count()]") {
        assert_eq!(result, r#"["function",["count"],3]"#);
    }
}

#[tokio::test]
async fn test_typescript_require() {
    let project = scratch_fixture("typescript-require");
    let output = bundle(project.path(), "index.ts", |_| {}).await;

    assert_eq!(output.report.total_assets, 2);
    assert_eq!(output.report.bundles[0].assets, vec!["index.ts", "local.ts"]);

    if let Some(result) = run_node(&project.path().join("dist/index.js"), "[typeof m, m()]") {
        assert_eq!(result, r#"["function",3]"#);
    }
}

#[tokio::test]
async fn test_typescript_json() {
    let project = scratch_fixture("typescript-json");
    let output = bundle(project.path(), "index.ts", |_| {}).await;

    assert_eq!(output.report.total_assets, 2);
    assert_eq!(output.report.bundles[0].assets, vec!["index.ts", "local.json"]);

    if let Some(result) = run_node(&project.path().join("dist/index.js"), "m.count()") {
        assert_eq!(result, "3");
    }
}

#[tokio::test]
async fn test_json_proto_key_stays_data() {
    let project = scratch_fixture("typescript-json-proto");
    bundle(project.path(), "index.ts", |_| {}).await;

    let code = read(&project.path().join("dist/index.js"));
    assert!(code.contains("JSON.parse("));
    if let Some(result) = run_node(&project.path().join("dist/index.js"), "[m.keys(), m.plain()]") {
        assert_eq!(result, r#"[["__proto__"],true]"#);
    }
}

#[tokio::test]
async fn test_import_cycle_runs() {
    let project = scratch_fixture("typescript-cycle");
    let output = bundle(project.path(), "index.ts", |_| {}).await;

    assert_eq!(output.report.total_assets, 2);
    assert_eq!(output.report.bundles[0].assets, vec!["index.ts", "b.ts"]);

    if let Some(result) = run_node(&project.path().join("dist/index.js"), "m.both()") {
        assert_eq!(result, "12");
    }
}

#[tokio::test]
async fn test_typescript_env() {
    let project = scratch_fixture("typescript-env");
    bundle(project.path(), "index.ts", |_| {}).await;

    let bundle_path = project.path().join("dist/index.js");
    assert!(!read(&bundle_path).contains("process.env"));
    if let Some(result) = run_node(&bundle_path, "m.env()") {
        assert_eq!(result, r#""development""#);
    }
}

#[tokio::test]
async fn test_typescript_config_removes_comments() {
    let project = scratch_fixture("typescript-config");
    bundle(project.path(), "index.ts", |_| {}).await;

    let code = read(&project.path().join("dist/index.js"));
    assert!(!code.contains("this comment should be removed"));
    assert!(!code.contains("and this one"));
    assert!(code.contains("keep this legal notice"));
}

#[tokio::test]
async fn test_comments_kept_without_project_config() {
    let project = scratch_fixture("typescript");
    bundle(project.path(), "index.ts", |_| {}).await;

    let code = read(&project.path().join("dist/index.js"));
    assert!(code.contains("Sum of the two local values"));
}

#[tokio::test]
async fn test_typescript_jsx() {
    let project = scratch_fixture("typescript-jsx");
    let output = bundle(project.path(), "index.tsx", |_| {}).await;

    assert_eq!(output.report.total_assets, 1);
    let code = read(&project.path().join("dist/index.js"));
    assert!(code.contains("React.createElement(\"div\""));

    if let Some(result) = run_node(&project.path().join("dist/index.js"), "m.render()") {
        assert_eq!(result, r#"{"type":"div","props":{"className":"box"},"children":["hello"]}"#);
    }
}

#[tokio::test]
async fn test_every_error_is_reported() {
    let project = scratch_fixture("typescript-errors");
    let err = Bundler::new(BuildConfig::new(project.path()))
        .bundle(&["index.ts".to_string()])
        .await
        .unwrap_err();

    match &err {
        BundlerError::Build(BuildError::Failed(errors)) => assert_eq!(errors.len(), 2),
        other => panic!("unexpected error: {}", other),
    }
    let detailed = err.format_detailed();
    assert!(detailed.contains("bad.ts"));
    assert!(detailed.contains("./missing"));
    assert!(!project.path().join("dist").exists());
}

#[tokio::test]
async fn test_missing_entry_is_fatal() {
    let project = scratch_fixture("typescript");
    let err = Bundler::new(BuildConfig::new(project.path()))
        .bundle(&["nope.ts".to_string()])
        .await
        .unwrap_err();

    assert!(matches!(err, BundlerError::Build(BuildError::Entry { .. })));
    assert!(!project.path().join("dist").exists());
}

#[tokio::test]
async fn test_output_is_deterministic() {
    let project = scratch_fixture("typescript-dedup");
    let first = bundle(project.path(), "index.ts", |config| config.production = true).await;
    let second = bundle(project.path(), "index.ts", |config| config.production = true).await;

    assert_eq!(first.artifacts.len(), second.artifacts.len());
    for (a, b) in first.artifacts.iter().zip(&second.artifacts) {
        assert_eq!(a.path, b.path);
        assert_eq!(a.contents, b.contents, "{} differs", a.path.display());
    }
}

#[tokio::test]
async fn test_output_is_independent_of_checkout_and_machine() {
    let first_project = scratch_fixture("typescript-dedup");
    let second_project = scratch_fixture("typescript-dedup");

    let first = bundle(first_project.path(), "index.ts", |config| {
        config.production = true;
        config.concurrency = 1;
    })
    .await;
    let second = bundle(second_project.path(), "index.ts", |config| {
        config.production = true;
        config.concurrency = 4;
        config.env.insert("OLDPWD".into(), "/somewhere/else".into());
    })
    .await;

    assert_eq!(first.artifacts.len(), second.artifacts.len());
    for (a, b) in first.artifacts.iter().zip(&second.artifacts) {
        assert_eq!(a.path.file_name(), b.path.file_name());
        assert_eq!(a.contents, b.contents, "{} differs", a.path.display());
    }
}
