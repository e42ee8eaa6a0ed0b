//! Dockerfile strategy
//!
//! Every `FROM` opens a build stage. Stages become `Pattern` entities that
//! depend on their base image (or an earlier stage) and on the stages they
//! copy artifacts from.

use super::framework::{LanguageAdapter, ParseRequest, ParseResult};
use super::settings::{MASK, is_secret_key};
use crate::Result;
use crate::entity::EntityKind;
use crate::relationship::RelationshipKind;

pub struct DockerfileAdapter;

impl DockerfileAdapter {
    /// Check the names Docker tooling treats as a Dockerfile
    pub fn matches_name(file_name: &str) -> bool {
        let lower = file_name.to_ascii_lowercase();
        lower == "dockerfile"
            || lower == "containerfile"
            || lower.starts_with("dockerfile.")
            || lower.ends_with(".dockerfile")
    }
}

/// One logical instruction, continuation lines joined
struct Instruction {
    line: usize,
    end: usize,
    keyword: String,
    args: String,
}

fn instructions(lines: &[&str]) -> Vec<Instruction> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let body = lines[i].trim();
        if body.is_empty() || body.starts_with('#') {
            i += 1;
            continue;
        }
        let start = i;
        let mut text = String::new();
        loop {
            let part = lines[i].trim();
            if !part.starts_with('#') {
                let (piece, continues) = match part.strip_suffix('\\') {
                    Some(p) => (p.trim_end(), true),
                    None => (part, false),
                };
                if !text.is_empty() && !piece.is_empty() {
                    text.push(' ');
                }
                text.push_str(piece);
                if !continues {
                    break;
                }
            }
            if i + 1 >= lines.len() {
                break;
            }
            i += 1;
        }
        let (keyword, args) = text.split_once(char::is_whitespace).unwrap_or((&text, ""));
        out.push(Instruction {
            line: start,
            end: i,
            keyword: keyword.to_ascii_uppercase(),
            args: args.trim().to_string(),
        });
        i += 1;
    }
    out
}

/// Split `FROM [--platform=x] image [AS name]`
fn parse_from(args: &str) -> Option<(String, Option<String>)> {
    let words: Vec<&str> = args.split_whitespace().filter(|w| !w.starts_with("--")).collect();
    let image = words.first()?.to_string();
    let alias = match words.get(1) {
        Some(kw) if kw.eq_ignore_ascii_case("as") => words.get(2).map(|s| s.to_string()),
        _ => None,
    };
    Some((image, alias))
}

/// `KEY=value` pairs (or the legacy `KEY value` form) of ENV/ARG/LABEL
fn key_values(args: &str) -> Vec<String> {
    if !args.contains('=') {
        return args
            .split_once(char::is_whitespace)
            .map(|(k, v)| vec![format!("{}={}", k, if is_secret_key(k) { MASK } else { v.trim() })])
            .unwrap_or_else(|| vec![args.to_string()]);
    }
    args.split_whitespace()
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let value = if is_secret_key(key) && !value.is_empty() { MASK } else { value };
            Some(format!("{}={}", key, value.trim_matches('"')))
        })
        .collect()
}

struct Stage {
    name: String,
    base: String,
    start: usize,
    end: usize,
    index: usize,
    exposed: Vec<String>,
    env: Vec<String>,
    copies_from: Vec<(String, usize)>,
    workdir: Option<String>,
    entrypoint: Option<String>,
    user: Option<String>,
    instructions: usize,
}

impl LanguageAdapter for DockerfileAdapter {
    fn language_name(&self) -> &str {
        "dockerfile"
    }

    fn file_extensions(&self) -> &[&str] {
        &["dockerfile", "containerfile"]
    }

    fn parse_code(&self, content: &str, request: &ParseRequest) -> Result<ParseResult> {
        let policy = &request.policy;
        let file = request.file_name();
        let lines: Vec<&str> = content.lines().collect();

        let mut global_args = Vec::new();
        let mut stages: Vec<Stage> = Vec::new();

        for ins in instructions(&lines) {
            if ins.keyword == "FROM" {
                let Some((base, alias)) = parse_from(&ins.args) else { continue };
                let index = stages.len();
                stages.push(Stage {
                    name: alias.unwrap_or_else(|| format!("stage{}", index)),
                    base,
                    start: ins.line,
                    end: ins.end,
                    index,
                    exposed: Vec::new(),
                    env: Vec::new(),
                    copies_from: Vec::new(),
                    workdir: None,
                    entrypoint: None,
                    user: None,
                    instructions: 1,
                });
                continue;
            }

            let Some(stage) = stages.last_mut() else {
                if ins.keyword == "ARG" {
                    global_args.extend(key_values(&ins.args));
                }
                continue;
            };
            stage.end = ins.end;
            stage.instructions += 1;

            match ins.keyword.as_str() {
                "EXPOSE" => stage.exposed.extend(ins.args.split_whitespace().map(String::from)),
                "ENV" => stage.env.extend(key_values(&ins.args)),
                "WORKDIR" => stage.workdir = Some(ins.args.clone()),
                "USER" => stage.user = Some(ins.args.clone()),
                "ENTRYPOINT" | "CMD" => {
                    if ins.keyword == "ENTRYPOINT" || stage.entrypoint.is_none() {
                        stage.entrypoint = Some(ins.args.clone());
                    }
                }
                "COPY" | "ADD" => {
                    let from = ins
                        .args
                        .split_whitespace()
                        .find_map(|w| w.strip_prefix("--from="))
                        .map(String::from);
                    if let Some(from) = from {
                        stage.copies_from.push((from, ins.line));
                    }
                }
                _ => {}
            }
        }

        let mut result = ParseResult::new();
        result.add_entity(
            request
                .file_entity(content, "dockerfile")
                .with_meta("stageCount", stages.len())
                .with_meta("args", global_args),
        );

        let names: Vec<String> = stages.iter().map(|s| s.name.clone()).collect();
        let stage_ref = |reference: &str| -> Option<String> {
            if let Ok(i) = reference.parse::<usize>() {
                return names.get(i).cloned();
            }
            names.iter().find(|n| n.eq_ignore_ascii_case(reference)).cloned()
        };

        for stage in stages {
            if !policy.allows_item(stage.index) {
                break;
            }
            let text = lines[stage.start..=stage.end.min(lines.len() - 1)].join("\n");
            let line = stage.start as u32 + 1;

            let entity = request
                .entity(EntityKind::Pattern, &stage.name, line, &text)
                .with_meta("baseImage", stage.base.as_str())
                .with_meta("stageIndex", stage.index)
                .with_meta("instructionCount", stage.instructions)
                .with_meta("exposedPorts", stage.exposed)
                .with_meta("env", policy.cap(stage.env))
                .with_optional_meta("workdir", stage.workdir)
                .with_optional_meta("entrypoint", stage.entrypoint)
                .with_optional_meta("user", stage.user);
            result.add_entity(entity);
            result.add_relationship(
                request
                    .relationship(&file, &stage.name, RelationshipKind::Defines)
                    .at_line(line),
            );

            let base = match stage_ref(&stage.base).filter(|b| *b != stage.name) {
                Some(earlier) => request
                    .relationship(&stage.name, earlier, RelationshipKind::DependsOn)
                    .with_property("kind", "stage"),
                None => request
                    .relationship(&stage.name, &stage.base, RelationshipKind::DependsOn)
                    .with_property("kind", "image"),
            };
            result.add_relationship(base.at_line(line));

            for (from, at) in stage.copies_from {
                let (target, kind) = match stage_ref(&from) {
                    Some(name) => (name, "copy"),
                    None => (from, "copy-image"),
                };
                result.add_relationship(
                    request
                        .relationship(&stage.name, target, RelationshipKind::DependsOn)
                        .with_property("kind", kind)
                        .at_line(at as u32 + 1),
                );
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::MetaValue;

    const MULTI_STAGE: &str = "ARG NODE_VERSION=20\n\
FROM node:20-alpine AS build\n\
WORKDIR /app\n\
COPY package.json .\n\
RUN npm ci && \\\n    npm run build\n\
\n\
FROM nginx:1.25\n\
COPY --from=build /app/dist /usr/share/nginx/html\n\
ENV API_URL=http://api API_TOKEN=abc\n\
EXPOSE 80 443\n";

    #[test]
    fn test_matches_name() {
        assert!(DockerfileAdapter::matches_name("Dockerfile"));
        assert!(DockerfileAdapter::matches_name("Dockerfile.prod"));
        assert!(DockerfileAdapter::matches_name("api.dockerfile"));
        assert!(DockerfileAdapter::matches_name("Containerfile"));
        assert!(!DockerfileAdapter::matches_name("docker-compose.yml"));
    }

    #[test]
    fn test_stages_and_dependencies() {
        let result = DockerfileAdapter
            .parse_code(MULTI_STAGE, &ParseRequest::new("Dockerfile"))
            .unwrap();

        let stages: Vec<_> = result.entities_of(EntityKind::Pattern).collect();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].name, "build");
        assert_eq!(stages[0].line_number, 2);
        assert_eq!(stages[0].meta("workdir").and_then(|v| v.as_text()), Some("/app"));
        assert!(stages[0].content.contains("npm run build"));
        assert_eq!(stages[1].name, "stage1");
        assert_eq!(stages[1].line_number, 8);
        assert_eq!(
            stages[1].meta("exposedPorts"),
            Some(&MetaValue::List(vec!["80".into(), "443".into()]))
        );
        assert_eq!(
            stages[1].meta("env"),
            Some(&MetaValue::List(vec!["API_URL=http://api".into(), "API_TOKEN=****".into()]))
        );

        let deps: Vec<_> = result
            .relationships_of(RelationshipKind::DependsOn)
            .map(|r| (r.from_name.as_str(), r.to_name.as_str()))
            .collect();
        assert_eq!(
            deps,
            vec![("build", "node:20-alpine"), ("stage1", "nginx:1.25"), ("stage1", "build")]
        );
        assert_eq!(
            result.entities[0].meta("args"),
            Some(&MetaValue::List(vec!["NODE_VERSION=20".into()]))
        );
    }

    #[test]
    fn test_no_from_yields_file_only() {
        let result = DockerfileAdapter
            .parse_code("# nothing here\n", &ParseRequest::new("Dockerfile"))
            .unwrap();
        assert_eq!(result.entities.len(), 1);
        assert!(result.succeeded());
    }
}
