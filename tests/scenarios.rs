use codeweave::adapter::Dispatcher;
use codeweave::policy::{DEFAULT_CONTENT_CEILING, DEFAULT_MAX_DEPTH, DEFAULT_MAX_ITEMS, TRUNCATION_MARKER};
use codeweave::{EntityKind, IngestConfig, IngestPipeline, ParseResult, RelationshipKind};
use std::collections::BTreeSet;
use std::fs;

fn parse(path: &str, content: &str) -> ParseResult {
    Dispatcher::default().parse_code(content, path, None, None)
}

fn edges(result: &ParseResult, kind: RelationshipKind) -> Vec<(String, String)> {
    result
        .relationships_of(kind)
        .map(|r| (r.from_name.clone(), r.to_name.clone()))
        .collect()
}

#[test]
fn test_flat_config_with_one_nested_object() {
    let json = "{\n  \"name\": \"orders\",\n  \"port\": 8080,\n  \"db\": { \"host\": \"pg\", \"user\": \"svc\", \"pool\": 5 }\n}\n";
    let result = parse("config/service.json", json);

    assert!(result.succeeded());
    assert_eq!(result.entities.len(), 2);
    assert_eq!(result.entities[0].kind, EntityKind::File);
    assert_eq!(result.entities[1].name, "db");
    assert_eq!(
        edges(&result, RelationshipKind::Defines),
        vec![("service.json".to_string(), "db".to_string())]
    );

    let yaml = "name: orders\ndb:\n  host: pg\n  user: svc\n  pool: 5\n";
    let result = parse("service.yaml", yaml);

    assert!(result.succeeded());
    assert_eq!(result.entities.len(), 2);
    assert_eq!(result.entities[1].name, "db");
    assert_eq!(result.entities[1].line_number, 2);
    assert_eq!(
        edges(&result, RelationshipKind::Defines),
        vec![("service.yaml".to_string(), "db".to_string())]
    );
}

#[test]
fn test_script_declaration_calls_two_functions() {
    let script = "#!/bin/bash\nset -e\n\ndeploy() {\n  build_app --release\n  push_image \"$TAG\"\n}\n";
    let result = parse("deploy.sh", script);

    let methods: Vec<_> = result.entities_of(EntityKind::Method).collect();
    assert_eq!(methods.len(), 1);
    assert_eq!(methods[0].name, "deploy");
    assert_eq!(methods[0].line_number, 4);
    assert_eq!(
        edges(&result, RelationshipKind::Calls),
        vec![
            ("deploy".to_string(), "build_app".to_string()),
            ("deploy".to_string(), "push_image".to_string())
        ]
    );
}

#[test]
fn test_stylesheet_rules_and_at_rule_lines() {
    let css = "/* site */\nh1 {\n  font-size: 2rem;\n}\n\n.nav a { color: blue; }\n@media print {\n  .nav { display: none; }\n}\n";
    let result = parse("site.css", css);

    let patterns: Vec<_> = result.entities_of(EntityKind::Pattern).collect();
    let lines: Vec<_> = patterns.iter().map(|p| (p.name.as_str(), p.line_number)).collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], ("h1", 2));
    assert_eq!(lines[1], (".nav a", 6));
    assert_eq!(lines[2].1, 7);
}

#[test]
fn test_totality_on_hostile_input() {
    let dir = tempfile::tempdir().unwrap();
    let names = [
        "a.cs", "a.java", "a.ts", "a.go", "a.rs", "a.py", "a.json", "a.yml", "a.css", "a.md", "a.html",
        "a.sh", "a.ps1", "a.sql", "a.toml", "a.ini", ".env", "package.json", "go.mod", "Dockerfile",
        "notes.txt", "unknown.qqq",
    ];
    let inputs: [&[u8]; 5] = [
        b"",
        b"\x00\x01\x02\xff\xfe",
        b"{{{{ [[[ ((( \"unterminated",
        b"}}}} ]]] ))) <<<< >>>> ;;;; @@@@",
        b"\xef\xbb\xbfcaf\xc3\xa9 \xe2\x28 { broken utf-8",
    ];

    let dispatcher = Dispatcher::default();
    for name in names {
        for (i, input) in inputs.iter().enumerate() {
            let path = dir.path().join(format!("{}", i)).join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, input).unwrap();

            let result = dispatcher.parse_file(&path, None, None);
            assert!(
                result.errors.iter().all(|e| !e.trim().is_empty()),
                "{} input {} produced a blank diagnostic",
                name,
                i
            );
            for entity in &result.entities {
                assert!(entity.content.len() <= DEFAULT_CONTENT_CEILING);
                assert!(entity.line_number >= 1);
            }
        }
    }

    let missing = dispatcher.parse_file(&dir.path().join("gone.cs"), None, None);
    assert!(missing.entities.is_empty());
    assert_eq!(missing.errors.len(), 1);
}

#[test]
fn test_totality_on_deeply_nested_input() {
    let depth = 20_000;
    let cases = vec![
        ("deep.js", format!("const x = {}1{};\n", "[".repeat(depth), "]".repeat(depth))),
        ("deep.ts", format!("let y = {}0{};\n", "(".repeat(depth), ")".repeat(depth))),
        ("Deep.java", format!("class D {{ int v = {}1{}; }}\n", "(".repeat(depth), ")".repeat(depth))),
        ("deep.json", format!("{}1{}", "[".repeat(depth), "]".repeat(depth))),
    ];

    // Pipeline workers run on default-sized thread stacks
    let handle = std::thread::spawn(move || {
        let dispatcher = Dispatcher::default();
        cases
            .iter()
            .map(|(path, code)| dispatcher.parse_code(code, path, None, None))
            .collect::<Vec<_>>()
    });
    let results = handle.join().expect("parsing deep input must not abort the thread");

    for result in results {
        assert!(!result.entities.is_empty());
        assert!(!result.errors.is_empty());
        assert!(result.errors.iter().all(|e| !e.trim().is_empty()));
    }
}

#[test]
fn test_depth_bound_for_nested_functions() {
    let mut code = String::new();
    for i in 0..10 {
        code.push_str(&format!("function f{}() {{\n", i));
    }
    code.push_str(&"}\n".repeat(10));
    let result = parse("n.js", &code);

    assert!(result.succeeded(), "{:?}", result.errors);
    assert_eq!(result.entities_of(EntityKind::Method).count(), DEFAULT_MAX_DEPTH);
}

#[test]
fn test_truncation_bound() {
    let body = (0..400).map(|i| format!("  --v{}: {};\n", i, i)).collect::<String>();
    let css = format!(".huge {{\n{}}}\n", body);
    assert!(css.len() > DEFAULT_CONTENT_CEILING);

    let result = parse("huge.css", &css);
    let rule = result.entity(".huge").unwrap();
    assert!(rule.content.len() <= DEFAULT_CONTENT_CEILING);
    assert!(rule.content.ends_with(TRUNCATION_MARKER));
    let file = &result.entities[0];
    assert!(file.content.ends_with(TRUNCATION_MARKER));
    assert_eq!(file.meta("truncated").and_then(|v| v.as_bool()), Some(true));
}

#[test]
fn test_depth_bound() {
    let mut json = "\"leaf\"".to_string();
    for level in (0..10).rev() {
        json = format!("{{\"n{}\": {}, \"x\": 1}}", level, json);
    }
    let result = parse("deep.json", &json);

    let depths: BTreeSet<i64> = result
        .entities_of(EntityKind::Pattern)
        .filter_map(|e| e.meta("depth").and_then(|v| v.as_int()))
        .collect();
    assert!(!depths.is_empty());
    assert!(depths.len() <= DEFAULT_MAX_DEPTH);
    assert!(result.entities_of(EntityKind::Pattern).count() <= DEFAULT_MAX_DEPTH);
}

#[test]
fn test_cardinality_bound() {
    let items = (0..1000).map(|i| format!("{{\"id\": {}}}", i)).collect::<Vec<_>>().join(",");
    let json = format!("{{\"items\": [{}]}}", items);
    let result = parse("big.json", &json);

    let elements = result
        .entities
        .iter()
        .filter(|e| e.name.starts_with("items["))
        .count();
    assert!(elements > 0);
    assert!(elements <= DEFAULT_MAX_ITEMS);

    let yaml = (0..1000).map(|i| format!("- name: n{}\n  id: {}\n", i, i)).collect::<String>();
    let result = parse("big.yaml", &yaml);
    assert!(result.entities.len() <= DEFAULT_MAX_ITEMS + 1);
}

#[test]
fn test_exclusion_is_idempotent() {
    let dispatcher = Dispatcher::default();
    let first = dispatcher.parse_code("lockfile v1", "web/yarn.lock", None, None);
    let second = dispatcher.parse_code("lockfile v1", "web/yarn.lock", None, None);

    assert_eq!(first, second);
    assert!(first.entities.is_empty());
    assert_eq!(first.errors, vec!["excluded: yarn.lock is a generated or lock file".to_string()]);
}

#[test]
fn test_partial_success_keeps_valid_declaration() {
    let source = "public class Good\n{\n    public void Run() { }\n}\n\npublic class Broken\n{\n    public void Oops( { \n}\n";
    let result = parse("Mixed.cs", source);

    assert!(result.entity("Good").is_some());
    assert!(!result.errors.is_empty());
    assert!(result.is_partial());
}

#[test]
fn test_pipeline_over_a_small_repo() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("src")).unwrap();
    fs::create_dir_all(root.join("node_modules/left-pad")).unwrap();
    fs::write(
        root.join("package.json"),
        "{\n  \"name\": \"shop\",\n  \"dependencies\": { \"react\": \"^18.2.0\" }\n}\n",
    )
    .unwrap();
    fs::write(root.join("package-lock.json"), "{}").unwrap();
    fs::write(root.join("src/app.js"), "import React from 'react';\nfunction App() { return render(); }\n").unwrap();
    fs::write(root.join("Dockerfile"), "FROM node:20\nCOPY . .\n").unwrap();
    fs::write(root.join("node_modules/left-pad/index.js"), "module.exports = 1;\n").unwrap();
    fs::write(root.join("logo.bmpx"), "not really").unwrap();

    let config = IngestConfig {
        context: Some("shop".to_string()),
        workers: Some(2),
        ..Default::default()
    };
    let pipeline = IngestPipeline::new(&config);
    let report = pipeline.ingest_dir(root, &[]);

    let names: Vec<_> = report
        .files
        .iter()
        .map(|f| f.path.rsplit(['/', '\\']).next().unwrap_or("").to_string())
        .collect();
    assert_eq!(names, vec!["Dockerfile", "package-lock.json", "package.json", "app.js"]);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.files_with_errors().count(), 1);

    let merged = report.merged();
    assert!(merged.entities.iter().all(|e| e.context == "shop"));
    assert!(
        merged
            .relationships_of(RelationshipKind::DependsOn)
            .any(|r| r.from_name == "shop" && r.to_name == "react")
    );
    assert!(
        merged
            .relationships_of(RelationshipKind::DependsOn)
            .any(|r| r.to_name == "node:20")
    );
}
