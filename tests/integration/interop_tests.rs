use crate::common::{bundle, read, run_node, scratch_fixture};

#[tokio::test]
async fn test_commonjs_default_import_is_wrapped() {
    let project = scratch_fixture("typescript-interop");
    let output = bundle(project.path(), "index.ts", |_| {}).await;

    assert_eq!(output.report.total_assets, 2);
    assert_eq!(output.report.bundles[0].assets, vec!["index.ts", "commonjs-module.js"]);
    assert!(read(&project.path().join("dist/index.js")).contains("__importDefault"));

    if let Some(result) = run_node(&project.path().join("dist/index.js"), "m.count()") {
        assert_eq!(result, r#""bar""#);
    }
}

#[tokio::test]
async fn test_interop_can_be_disabled() {
    let project = scratch_fixture("typescript-interop");
    std::fs::write(
        project.path().join("tsconfig.json"),
        r#"{ "compilerOptions": { "esModuleInterop": false } }"#,
    )
    .unwrap();
    bundle(project.path(), "index.ts", |_| {}).await;

    let code = read(&project.path().join("dist/index.js"));
    assert!(!code.contains("__importDefault(require"));
}

#[tokio::test]
async fn test_esm_default_export_through_interop() {
    let project = tempfile::tempdir().unwrap();
    std::fs::write(
        project.path().join("greet.ts"),
        "export default function greet(name: string): string {\n  return 'hi ' + name;\n}\n",
    )
    .unwrap();
    std::fs::write(
        project.path().join("index.ts"),
        "import greet from './greet';\nimport * as all from './greet';\nexport const value = greet('a') + '/' + all.default('b');\n",
    )
    .unwrap();
    bundle(project.path(), "index.ts", |_| {}).await;

    if let Some(result) = run_node(&project.path().join("dist/index.js"), "m.value") {
        assert_eq!(result, r#""hi a/hi b""#);
    }
}
