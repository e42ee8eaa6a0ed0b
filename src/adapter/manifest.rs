//! Package manifest strategy
//!
//! Reads the dependency declarations of npm, pip, Poetry/PEP 621, Cargo,
//! Go modules and MSBuild projects. Each manifest yields one `Pattern`
//! entity for the package and a `DependsOn` edge per dependency, carrying
//! `version` and `scope` (`runtime`, `dev` or `build`).

use super::framework::{LanguageAdapter, ParseRequest, ParseResult};
use super::heuristic::LineCounter;
use crate::Result;
use crate::entity::{EntityKind, MetaValue, SENTINEL_LINE};
use crate::relationship::RelationshipKind;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static REQUIREMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9][A-Za-z0-9._-]*)(?:\[[^\]]*\])?\s*((?:===|[=<>!~]=|[<>])\s*[^;#\s,]+(?:\s*,\s*(?:===|[=<>!~]=|[<>])\s*[^;#\s,]+)*)?")
        .expect("valid requirement regex")
});

static GO_REQUIRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:require\s+)?([^\s()]+)\s+(v[^\s]+)(\s*//\s*indirect)?").expect("valid go.mod regex")
});

static MSBUILD_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(PackageReference|ProjectReference)\b([^>]*?)(/>|>(.*?)</(?:PackageReference|ProjectReference)>)")
        .expect("valid reference regex")
});

static XML_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\b(Include|Version)\s*=\s*"([^"]*)""#).expect("valid attribute regex"));

static XML_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<Version>\s*([^<]*?)\s*</Version>").expect("valid version regex"));

static MSBUILD_PROPERTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(AssemblyName|TargetFrameworks?|Version|RootNamespace)>\s*([^<]*?)\s*</")
        .expect("valid property regex")
});

/// Manifest formats this strategy understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    PackageJson,
    Requirements,
    PyProject,
    Cargo,
    GoMod,
    MsBuild,
}

impl ManifestKind {
    /// Detect the manifest format from a file name (case-insensitive)
    pub fn detect(file_name: &str) -> Option<Self> {
        let lower = file_name.to_ascii_lowercase();
        match lower.as_str() {
            "package.json" => Some(ManifestKind::PackageJson),
            "pyproject.toml" => Some(ManifestKind::PyProject),
            "cargo.toml" => Some(ManifestKind::Cargo),
            "go.mod" => Some(ManifestKind::GoMod),
            _ if lower.starts_with("requirements") && lower.ends_with(".txt") => Some(ManifestKind::Requirements),
            _ if lower.ends_with(".csproj") || lower.ends_with(".fsproj") || lower.ends_with(".vbproj") => {
                Some(ManifestKind::MsBuild)
            }
            _ => None,
        }
    }

    fn ecosystem(&self) -> &'static str {
        match self {
            ManifestKind::PackageJson => "npm",
            ManifestKind::Requirements | ManifestKind::PyProject => "pypi",
            ManifestKind::Cargo => "cargo",
            ManifestKind::GoMod => "go",
            ManifestKind::MsBuild => "nuget",
        }
    }
}

/// One declared dependency
#[derive(Debug, Clone, PartialEq)]
struct Dependency {
    name: String,
    version: String,
    scope: &'static str,
    line: Option<u32>,
    kind: Option<&'static str>,
}

impl Dependency {
    fn new(name: impl Into<String>, version: impl Into<String>, scope: &'static str) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            scope,
            line: None,
            kind: None,
        }
    }
}

/// Package identity plus its dependencies
#[derive(Debug, Default)]
struct Manifest {
    name: Option<String>,
    version: Option<String>,
    dependencies: Vec<Dependency>,
    includes: Vec<(String, u32)>,
    extra: Vec<(&'static str, MetaValue)>,
}

/// 1-based line of the first line holding `"needle":` or starting `needle =`
fn line_of_key(content: &str, needle: &str) -> Option<u32> {
    let quoted = format!("\"{}\"", needle);
    content
        .lines()
        .position(|line| {
            let body = line.trim_start();
            let json_key = body
                .match_indices(&quoted)
                .any(|(at, _)| body[at + quoted.len()..].trim_start().starts_with(':'));
            json_key || body.strip_prefix(needle).is_some_and(|rest| rest.trim_start().starts_with('='))
        })
        .map(|i| i as u32 + 1)
}

fn json_deps(object: &serde_json::Map<String, serde_json::Value>, key: &str, scope: &'static str, content: &str) -> Vec<Dependency> {
    let Some(deps) = object.get(key).and_then(|v| v.as_object()) else {
        return Vec::new();
    };
    deps.iter()
        .map(|(name, version)| {
            let mut dep = Dependency::new(name.as_str(), version.as_str().unwrap_or(""), scope);
            dep.line = line_of_key(content, name);
            if key == "peerDependencies" {
                dep.kind = Some("peer");
            } else if key == "optionalDependencies" {
                dep.kind = Some("optional");
            }
            dep
        })
        .collect()
}

fn parse_package_json(content: &str) -> std::result::Result<Manifest, serde_json::Error> {
    let root: serde_json::Value = serde_json::from_str(content)?;
    let mut manifest = Manifest::default();
    let Some(object) = root.as_object() else {
        return Ok(manifest);
    };

    manifest.name = object.get("name").and_then(|v| v.as_str()).map(String::from);
    manifest.version = object.get("version").and_then(|v| v.as_str()).map(String::from);
    for (key, scope) in [
        ("dependencies", "runtime"),
        ("peerDependencies", "runtime"),
        ("optionalDependencies", "runtime"),
        ("devDependencies", "dev"),
    ] {
        manifest.dependencies.extend(json_deps(object, key, scope, content));
    }

    if let Some(scripts) = object.get("scripts").and_then(|v| v.as_object()) {
        manifest
            .extra
            .push(("scripts", MetaValue::List(scripts.keys().cloned().collect())));
    }
    let workspaces = match object.get("workspaces") {
        Some(serde_json::Value::Array(items)) => Some(items),
        Some(serde_json::Value::Object(o)) => o.get("packages").and_then(|v| v.as_array()),
        _ => None,
    };
    if let Some(items) = workspaces {
        let members = items.iter().filter_map(|v| v.as_str().map(String::from)).collect();
        manifest.extra.push(("workspaces", MetaValue::List(members)));
    }
    Ok(manifest)
}

/// Split a PEP 508 requirement into name and version spec
fn split_requirement(spec: &str) -> Option<(String, String)> {
    let caps = REQUIREMENT.captures(spec.trim())?;
    let version = caps.get(2).map(|m| m.as_str().replace(' ', "")).unwrap_or_default();
    Some((caps[1].to_string(), version))
}

fn parse_requirements(content: &str, file_name: &str) -> Manifest {
    let lower = file_name.to_ascii_lowercase();
    let scope = if ["dev", "test", "lint", "docs"].iter().any(|tag| lower.contains(tag)) {
        "dev"
    } else {
        "runtime"
    };

    let mut manifest = Manifest::default();
    for (i, line) in content.lines().enumerate() {
        let line_no = i as u32 + 1;
        let body = line.split(" #").next().unwrap_or(line).trim();
        if body.is_empty() || body.starts_with('#') {
            continue;
        }
        if let Some(target) = body
            .strip_prefix("-r ")
            .or_else(|| body.strip_prefix("--requirement "))
            .or_else(|| body.strip_prefix("-c "))
        {
            manifest.includes.push((target.trim().to_string(), line_no));
            continue;
        }
        if body.starts_with('-') || body.contains("://") {
            continue;
        }
        if let Some((name, version)) = split_requirement(body) {
            let mut dep = Dependency::new(name, version, scope);
            dep.line = Some(line_no);
            manifest.dependencies.push(dep);
        }
    }
    manifest
}

fn toml_str(table: &toml::Table, key: &str) -> Option<String> {
    table.get(key).and_then(|v| v.as_str()).map(String::from)
}

fn toml_version(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Table(t) => t
            .get("version")
            .and_then(|v| v.as_str())
            .map(String::from)
            .or_else(|| t.get("path").and_then(|v| v.as_str()).map(|p| format!("path:{}", p)))
            .or_else(|| t.get("git").and_then(|v| v.as_str()).map(|g| format!("git:{}", g)))
            .or_else(|| t.get("workspace").and_then(|v| v.as_bool()).filter(|w| *w).map(|_| "workspace".to_string()))
            .unwrap_or_default(),
        _ => String::new(),
    }
}

fn toml_table_deps(table: Option<&toml::Value>, scope: &'static str, content: &str) -> Vec<Dependency> {
    let Some(deps) = table.and_then(|v| v.as_table()) else {
        return Vec::new();
    };
    deps.iter()
        .map(|(name, value)| {
            let mut dep = Dependency::new(name.as_str(), toml_version(value), scope);
            dep.line = line_of_key(content, name);
            dep
        })
        .collect()
}

fn parse_cargo(content: &str) -> std::result::Result<Manifest, toml::de::Error> {
    let root: toml::Table = content.parse()?;
    let mut manifest = Manifest::default();

    if let Some(package) = root.get("package").and_then(|v| v.as_table()) {
        manifest.name = toml_str(package, "name");
        manifest.version = toml_str(package, "version");
        if let Some(edition) = toml_str(package, "edition") {
            manifest.extra.push(("edition", MetaValue::Text(edition)));
        }
    }

    for (key, scope) in [
        ("dependencies", "runtime"),
        ("dev-dependencies", "dev"),
        ("build-dependencies", "build"),
    ] {
        manifest.dependencies.extend(toml_table_deps(root.get(key), scope, content));
    }

    if let Some(workspace) = root.get("workspace").and_then(|v| v.as_table()) {
        if let Some(members) = workspace.get("members").and_then(|v| v.as_array()) {
            let members = members.iter().filter_map(|m| m.as_str().map(String::from)).collect();
            manifest.extra.push(("workspaceMembers", MetaValue::List(members)));
        }
        manifest
            .dependencies
            .extend(toml_table_deps(workspace.get("dependencies"), "runtime", content));
    }

    if let Some(targets) = root.get("target").and_then(|v| v.as_table()) {
        for target in targets.values().filter_map(|v| v.as_table()) {
            for (key, scope) in [
                ("dependencies", "runtime"),
                ("dev-dependencies", "dev"),
                ("build-dependencies", "build"),
            ] {
                manifest.dependencies.extend(toml_table_deps(target.get(key), scope, content));
            }
        }
    }
    Ok(manifest)
}

fn pep508_deps(items: Option<&toml::Value>, scope: &'static str, content: &str) -> Vec<Dependency> {
    let Some(items) = items.and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|v| v.as_str())
        .filter_map(split_requirement)
        .map(|(name, version)| {
            let mut dep = Dependency::new(name.as_str(), version, scope);
            dep.line = content
                .lines()
                .position(|l| l.contains(&format!("\"{}", name)) || l.contains(&format!("'{}", name)))
                .map(|i| i as u32 + 1);
            dep
        })
        .collect()
}

fn group_scope(group: &str) -> &'static str {
    match group.to_ascii_lowercase().as_str() {
        "dev" | "test" | "tests" | "testing" | "lint" | "docs" | "typing" => "dev",
        _ => "runtime",
    }
}

fn parse_pyproject(content: &str) -> std::result::Result<Manifest, toml::de::Error> {
    let root: toml::Table = content.parse()?;
    let mut manifest = Manifest::default();

    if let Some(project) = root.get("project").and_then(|v| v.as_table()) {
        manifest.name = toml_str(project, "name");
        manifest.version = toml_str(project, "version");
        manifest
            .dependencies
            .extend(pep508_deps(project.get("dependencies"), "runtime", content));
        if let Some(groups) = project.get("optional-dependencies").and_then(|v| v.as_table()) {
            for (group, items) in groups {
                manifest
                    .dependencies
                    .extend(pep508_deps(Some(items), group_scope(group), content));
            }
        }
    }

    let poetry = root
        .get("tool")
        .and_then(|v| v.as_table())
        .and_then(|tool| tool.get("poetry"))
        .and_then(|v| v.as_table());
    if let Some(poetry) = poetry {
        if manifest.name.is_none() {
            manifest.name = toml_str(poetry, "name");
            manifest.version = toml_str(poetry, "version");
        }
        let runtime = toml_table_deps(poetry.get("dependencies"), "runtime", content);
        manifest
            .dependencies
            .extend(runtime.into_iter().filter(|d| d.name != "python"));
        manifest
            .dependencies
            .extend(toml_table_deps(poetry.get("dev-dependencies"), "dev", content));
        if let Some(groups) = poetry.get("group").and_then(|v| v.as_table()) {
            for (group, body) in groups {
                let deps = body.as_table().and_then(|t| t.get("dependencies"));
                manifest
                    .dependencies
                    .extend(toml_table_deps(deps, group_scope(group), content));
            }
        }
    }

    let build = root.get("build-system").and_then(|v| v.as_table());
    manifest
        .dependencies
        .extend(pep508_deps(build.and_then(|b| b.get("requires")), "build", content));
    Ok(manifest)
}

fn parse_go_mod(content: &str) -> Manifest {
    let mut manifest = Manifest::default();
    let mut in_require = false;

    for (i, line) in content.lines().enumerate() {
        let body = line.trim();
        if let Some(module) = body.strip_prefix("module ") {
            manifest.name = Some(module.trim().trim_matches('"').to_string());
            continue;
        }
        if let Some(version) = body.strip_prefix("go ") {
            manifest.extra.push(("goVersion", MetaValue::Text(version.trim().to_string())));
            continue;
        }
        if body.starts_with("require (") || body == "require(" {
            in_require = true;
            continue;
        }
        if in_require && body.starts_with(')') {
            in_require = false;
            continue;
        }
        if !(in_require || body.starts_with("require ")) {
            continue;
        }
        if let Some(caps) = GO_REQUIRE.captures(body) {
            let mut dep = Dependency::new(&caps[1], &caps[2], "runtime");
            dep.line = Some(i as u32 + 1);
            if caps.get(3).is_some() {
                dep.kind = Some("indirect");
            }
            manifest.dependencies.push(dep);
        }
    }
    manifest
}

fn parse_msbuild(content: &str, file_name: &str) -> Manifest {
    let mut manifest = Manifest::default();
    let mut lines = LineCounter::new(content);

    // `<Version>` inside a reference belongs to the reference
    let properties = MSBUILD_REFERENCE.replace_all(content, "");
    for caps in MSBUILD_PROPERTY.captures_iter(&properties) {
        let value = caps[2].to_string();
        match caps[1].to_ascii_lowercase().as_str() {
            "assemblyname" => manifest.name = Some(value),
            "version" => manifest.version = Some(value),
            "targetframework" | "targetframeworks" => {
                manifest.extra.push(("targetFramework", MetaValue::Text(value)))
            }
            _ => {}
        }
    }
    if manifest.name.is_none() {
        manifest.name = Path::new(file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string());
    }

    for caps in MSBUILD_REFERENCE.captures_iter(content) {
        let Some(whole) = caps.get(0) else { continue };
        let mut include = None;
        let mut version = None;
        for attr in XML_ATTR.captures_iter(&caps[2]) {
            match attr[1].to_ascii_lowercase().as_str() {
                "include" => include = Some(attr[2].to_string()),
                _ => version = Some(attr[2].to_string()),
            }
        }
        if version.is_none() {
            version = caps
                .get(4)
                .and_then(|body| XML_VERSION.captures(body.as_str()))
                .map(|v| v[1].to_string());
        }
        let Some(include) = include.filter(|i| !i.is_empty()) else { continue };

        let project = caps[1].eq_ignore_ascii_case("ProjectReference");
        let name = if project {
            let normalized = include.replace('\\', "/");
            Path::new(&normalized)
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or(include)
        } else {
            include
        };
        let mut dep = Dependency::new(name, version.unwrap_or_default(), "runtime");
        dep.line = Some(lines.line_at(whole.start()));
        if project {
            dep.kind = Some("project");
        }
        manifest.dependencies.push(dep);
    }
    manifest
}

pub struct ManifestAdapter;

impl LanguageAdapter for ManifestAdapter {
    fn language_name(&self) -> &str {
        "manifest"
    }

    fn file_extensions(&self) -> &[&str] {
        &["csproj", "fsproj", "vbproj"]
    }

    fn parse_code(&self, content: &str, request: &ParseRequest) -> Result<ParseResult> {
        let file = request.file_name();
        let Some(kind) = ManifestKind::detect(&file) else {
            return Err(crate::Error::Strategy(format!("{} is not a known manifest", file)));
        };

        let parsed = match kind {
            ManifestKind::PackageJson => parse_package_json(content).map_err(|e| e.to_string()),
            ManifestKind::Cargo => parse_cargo(content).map_err(|e| e.to_string()),
            ManifestKind::PyProject => parse_pyproject(content).map_err(|e| e.to_string()),
            ManifestKind::Requirements => Ok(parse_requirements(content, &file)),
            ManifestKind::GoMod => Ok(parse_go_mod(content)),
            ManifestKind::MsBuild => Ok(parse_msbuild(content, &file)),
        };
        let manifest = match parsed {
            Ok(manifest) => manifest,
            Err(e) => return Ok(request.raw_fallback(content, kind.ecosystem(), e)),
        };

        let policy = &request.policy;
        let package = manifest.name.clone().unwrap_or_else(|| file.clone());
        let mut result = ParseResult::new();
        result.add_entity(
            request
                .file_entity(content, kind.ecosystem())
                .with_meta("manifest", true),
        );

        let summary: Vec<String> = manifest
            .dependencies
            .iter()
            .map(|d| {
                if d.version.is_empty() {
                    d.name.clone()
                } else {
                    format!("{} {}", d.name, d.version)
                }
            })
            .collect();
        let mut entity = request
            .entity(EntityKind::Pattern, &package, SENTINEL_LINE, &summary.join("\n"))
            .with_meta("ecosystem", kind.ecosystem())
            .with_meta("dependencyCount", manifest.dependencies.len())
            .with_optional_meta("version", manifest.version.clone());
        for (key, value) in manifest.extra {
            entity = entity.with_meta(key, value);
        }
        result.add_entity(entity);
        result.add_relationship(request.relationship(&file, &package, RelationshipKind::Defines));

        for (target, line) in manifest.includes {
            result.add_relationship(
                request
                    .relationship(&file, target, RelationshipKind::Imports)
                    .at_line(line),
            );
        }

        for (i, dep) in manifest.dependencies.into_iter().enumerate() {
            if !policy.allows_item(i) {
                tracing::debug!("{}: dependency list capped at {}", request.path, policy.max_items);
                break;
            }
            let mut rel = request
                .relationship(&package, &dep.name, RelationshipKind::DependsOn)
                .with_property("version", dep.version)
                .with_property("scope", dep.scope)
                .with_property("ecosystem", kind.ecosystem());
            if let Some(line) = dep.line {
                rel = rel.at_line(line);
            }
            if let Some(kind) = dep.kind {
                rel = rel.with_property("kind", kind);
            }
            result.add_relationship(rel);
        }

        Ok(result)
    }
}
