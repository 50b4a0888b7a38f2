//! End-to-end tests of the full resolution pipeline

use std::fs;

use pretty_assertions::assert_eq;

use xyml::loader::node_from_str;
use xyml::{resolve_str, Node, ResolveConfig, XymlDocument};

#[test]
fn test_includes_loops_and_references_combine() {
    let dir = tempfile::tempdir().expect("Should create tempdir");
    fs::write(
        dir.path().join("targets.yaml"),
        "targets:\n  - staging\n  - production\n",
    )
    .expect("Should write fragment");
    fs::write(
        dir.path().join("main.yaml"),
        r#"
xyml.include: targets.yaml
binary: deploy-tool
jobs:
  xyml.for: "target:targets"
  run: "{{binary}} --env {{target}}"
"#,
    )
    .expect("Should write main");

    let doc = XymlDocument::load(dir.path().join("main.yaml"), &ResolveConfig::new())
        .expect("Should resolve");
    assert_eq!(
        doc.content().as_mapping().expect("mapping")["jobs"],
        node_from_str(
            "- run: deploy-tool --env staging\n- run: deploy-tool --env production\n"
        )
        .expect("Should parse")
    );
}

#[test]
fn test_env_and_param_namespaces_stay_out_of_output() {
    std::env::set_var("XYML_PIPELINE_TEST_HOME", "/srv/app");
    let yaml = XymlDocument::from_str(
        r#"
root: "{{xyml.env.XYML_PIPELINE_TEST_HOME}}"
level: "{{xyml.param.level}}"
"#,
        &ResolveConfig::new().with_param("level", "debug"),
    )
    .expect("Should resolve")
    .to_yaml()
    .expect("Should serialize");

    assert!(yaml.contains("root: /srv/app"));
    assert!(yaml.contains("level: debug"));
    assert!(!yaml.contains("xyml"));
}

#[test]
fn test_output_contains_no_directive_keys() {
    let dir = tempfile::tempdir().expect("Should create tempdir");
    fs::write(dir.path().join("extra.yaml"), "extra: value\n").expect("Should write fragment");
    fs::write(
        dir.path().join("main.yaml"),
        r#"
xyml.include: extra.yaml
items:
  - a
  - b
doubled:
  xyml.for: "item:items"
  value: "{{item}}{{item}}"
"#,
    )
    .expect("Should write main");

    let yaml = XymlDocument::load(dir.path().join("main.yaml"), &ResolveConfig::new())
        .expect("Should resolve")
        .to_yaml()
        .expect("Should serialize");
    assert!(!yaml.contains("xyml.include"));
    assert!(!yaml.contains("xyml.for"));
    assert!(!yaml.contains("{{"));
}

#[test]
fn test_key_order_survives_the_pipeline() {
    let yaml = resolve_str("zebra: 1\nname: demo\nalpha: \"{{name}}\"\n")
        .expect("Should resolve");
    let zebra = yaml.find("zebra").expect("zebra present");
    let name = yaml.find("name").expect("name present");
    let alpha = yaml.find("alpha").expect("alpha present");
    assert!(zebra < name && name < alpha);
}

#[test]
fn test_soft_mode_keeps_tokens_for_later() {
    let doc = XymlDocument::from_str(
        "known: here\na: \"{{known}}\"\nb: \"{{unknown}}\"\n",
        &ResolveConfig::new().soft(),
    )
    .expect("Should resolve");
    let map = doc.content().as_mapping().expect("mapping");
    assert_eq!(map["a"], Node::from("here"));
    assert_eq!(map["b"], Node::from("{{unknown}}"));
}

#[test]
fn test_save_and_reload_round_trip() {
    let dir = tempfile::tempdir().expect("Should create tempdir");
    let doc = XymlDocument::from_str(
        "name: demo\ngreeting: \"hello {{name}}\"\n",
        &ResolveConfig::new(),
    )
    .expect("Should resolve");
    let out = dir.path().join("resolved.yaml");
    doc.save(&out).expect("Should save");

    let reloaded = XymlDocument::load(&out, &ResolveConfig::new()).expect("Should reload");
    assert_eq!(reloaded.content(), doc.content());
}

#[test]
fn test_input_extension_defaulting() {
    let dir = tempfile::tempdir().expect("Should create tempdir");
    fs::write(dir.path().join("config.xyml"), "key: value\n").expect("Should write file");

    let doc = XymlDocument::load(dir.path().join("config"), &ResolveConfig::new())
        .expect("Should resolve");
    assert_eq!(
        doc.content(),
        &node_from_str("key: value\n").expect("Should parse")
    );
}
