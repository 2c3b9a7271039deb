use crate::common::{bundle, read, run_node, scratch_fixture};
use sourcemap::SourceMap;
use std::fs;

#[tokio::test]
async fn test_production_minifies_and_keeps_exports() {
    let project = scratch_fixture("typescript-production");
    let output = bundle(project.path(), "index.ts", |config| config.production = true).await;

    let root = &output.report.bundles[0];
    let child_types: Vec<&str> = root.child_bundles.iter().map(|c| c.bundle_type.as_str()).collect();
    assert_eq!(child_types, vec!["map"]);

    let bundle_path = project.path().join("dist/index.js");
    let code = read(&bundle_path);
    assert!(!code.contains("internalCounterValue"));
    assert!(!code.contains("DEV_ONLY_MARKER"));
    assert!(code.contains("compute"));
    assert!(code.trim_end().ends_with("//# sourceMappingURL=index.js.map"));

    if let Some(result) = run_node(&bundle_path, "[Object.keys(m), m.compute()]") {
        assert_eq!(result, r#"[["compute"],42]"#);
    }
}

#[tokio::test]
async fn test_development_keeps_dev_only_module() {
    let project = scratch_fixture("typescript-production");
    let output = bundle(project.path(), "index.ts", |_| {}).await;

    assert!(output.report.bundles[0].child_bundles.is_empty());
    let code = read(&project.path().join("dist/index.js"));
    assert!(code.contains("DEV_ONLY_MARKER"));
    assert!(code.contains("internalCounterValue"));
    assert!(!project.path().join("dist/index.js.map").exists());
}

#[tokio::test]
async fn test_source_map_points_at_sources() {
    let project = scratch_fixture("typescript-production");
    bundle(project.path(), "index.ts", |config| config.production = true).await;

    let map = SourceMap::from_slice(&fs::read(project.path().join("dist/index.js.map")).unwrap()).unwrap();
    let sources: Vec<&str> = map.sources().collect();
    assert!(sources.contains(&"index.ts"), "{:?}", sources);
    assert!(sources.contains(&"math.ts"), "{:?}", sources);

    let index = sources.iter().position(|s| *s == "index.ts").unwrap();
    let contents = map.get_source_contents(index as u32).unwrap();
    assert!(contents.contains("internalCounterValue"));
    assert!(map.get_token_count() > 0);
}

#[tokio::test]
async fn test_source_maps_without_minify() {
    let project = scratch_fixture("typescript");
    let output = bundle(project.path(), "index.ts", |config| {
        config.source_maps = Some(true);
    })
    .await;

    assert_eq!(output.report.bundles[0].child_bundles[0].name, "index.js.map");
    let code = read(&project.path().join("dist/index.js"));
    assert!(code.contains("Sum of the two local values"));

    let map = SourceMap::from_slice(&fs::read(project.path().join("dist/index.js.map")).unwrap()).unwrap();
    assert!(map.tokens().any(|token| token.get_source() == Some("local.ts")));
    assert!(map.tokens().any(|token| token.get_source() == Some("index.ts")));
}

#[tokio::test]
async fn test_global_name_exposes_exports() {
    let project = scratch_fixture("typescript");
    bundle(project.path(), "index.ts", |config| {
        config.global_name = Some("Counter".to_string());
    })
    .await;

    let code = read(&project.path().join("dist/index.js"));
    assert!(code.contains("\"Counter\""));
}
