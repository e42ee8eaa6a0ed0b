//! Out-of-process strategy for Python
//!
//! The interpreter's own `ast` module does the parsing. The host writes a
//! request (`{filePath, context}`) to the worker's stdin and reads the
//! structured payload back from stdout. Every failure of the child (spawn,
//! timeout, non-zero exit, empty or malformed output) surfaces as an `Err`,
//! which the dispatcher turns into a single diagnostic.

use super::framework::{LanguageAdapter, ParseRequest, ParseResult};
use crate::config::ExternalConfig;
use crate::entity::{EntityKind, MetaValue};
use crate::relationship::RelationshipKind;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::str::FromStr;
use std::time::{Duration, Instant};

/// The worker program, passed to the interpreter with `-c`
const WORKER_SCRIPT: &str = include_str!("../../scripts/python_ast_worker.py");

/// Poll interval while waiting for the child
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Request sent to the worker
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WorkerRequest<'a> {
    file_path: &'a str,
    /// Name edges originate from; differs from the staged file's name
    file_name: &'a str,
    context: &'a str,
}

/// Response payload. Unknown fields are ignored, missing ones are empty.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerPayload {
    pub code_elements: Vec<WorkerElement>,
    pub relationships: Vec<WorkerRelationship>,
    pub errors: Vec<String>,
    /// First line of the module docstring
    pub module_doc: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerElement {
    #[serde(rename = "type", alias = "kind")]
    pub element_type: String,
    pub name: String,
    pub content: String,
    pub line_number: u32,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerRelationship {
    pub from_name: String,
    pub to_name: String,
    #[serde(rename = "type", alias = "kind")]
    pub relationship_type: String,
    pub properties: serde_json::Map<String, serde_json::Value>,
}

/// Captured output of a finished worker
#[derive(Debug)]
struct WorkerOutput {
    success: bool,
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

/// Python strategy backed by an external interpreter
pub struct ExternalAdapter {
    config: ExternalConfig,
}

impl ExternalAdapter {
    pub fn new(config: ExternalConfig) -> Self {
        Self { config }
    }

    /// Locate the interpreter: configured value first, then `python3`, then `python`
    pub fn interpreter(&self) -> Result<PathBuf> {
        if let Some(configured) = &self.config.python {
            return which::which(configured)
                .map_err(|e| Error::Worker(format!("configured interpreter {} not found: {}", configured, e)));
        }
        ["python3", "python"]
            .iter()
            .find_map(|candidate| which::which(candidate).ok())
            .ok_or_else(|| Error::Worker("no Python interpreter found on PATH".to_string()))
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs.max(1))
    }

    /// Run the worker against a file on disk and map its payload
    fn run_worker(&self, disk_path: &Path, content: &str, request: &ParseRequest) -> Result<ParseResult> {
        request.cancel.check()?;
        let python = self.interpreter()?;
        let disk_path = disk_path.to_string_lossy();
        let file_name = request.file_name();
        let body = serde_json::to_vec(&WorkerRequest {
            file_path: &disk_path,
            file_name: &file_name,
            context: &request.context,
        })?;

        tracing::debug!("Running {} on {}", python.display(), request.path);
        let mut child = Command::new(&python)
            .arg("-c")
            .arg(WORKER_SCRIPT)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Worker(format!("failed to spawn {}: {}", python.display(), e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(&body) {
                kill(&mut child);
                return Err(Error::Worker(format!("failed to write request: {}", e)));
            }
        }

        let output = self.wait(child, request)?;
        if !output.success {
            let code = output.code.map_or("signal".to_string(), |c| c.to_string());
            let stderr = output.stderr.lines().last().unwrap_or("").trim().to_string();
            return Err(Error::Worker(format!("worker exited with status {}: {}", code, stderr)));
        }
        if output.stdout.trim().is_empty() {
            return Err(Error::Worker("worker produced no output".to_string()));
        }

        let payload: WorkerPayload = serde_json::from_str(output.stdout.trim())
            .map_err(|e| Error::Worker(format!("malformed worker payload: {}", e)))?;
        Ok(map_payload(payload, content, request))
    }

    /// Wait for the child with a timeout, honoring cancellation
    fn wait(&self, mut child: Child, request: &ParseRequest) -> Result<WorkerOutput> {
        let stdout_reader = spawn_reader(child.stdout.take());
        let stderr_reader = spawn_reader(child.stderr.take());

        let started = Instant::now();
        let timeout = self.timeout();
        let status = loop {
            match child.try_wait()? {
                Some(status) => break status,
                None if request.cancel.is_cancelled() => {
                    kill(&mut child);
                    return Err(Error::Cancelled);
                }
                None if started.elapsed() >= timeout => {
                    tracing::warn!("Worker for {} timed out after {:?}", request.path, timeout);
                    kill(&mut child);
                    return Err(Error::Timeout(timeout.as_secs()));
                }
                None => std::thread::sleep(POLL_INTERVAL),
            }
        };

        Ok(WorkerOutput {
            success: status.success(),
            code: status.code(),
            stdout: stdout_reader.join().unwrap_or_default(),
            stderr: stderr_reader.join().unwrap_or_default(),
        })
    }
}

/// Drain a child pipe on a separate thread so a full pipe cannot stall the child
fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buffer);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        tracing::debug!("Failed to kill worker: {}", e);
    }
    let _ = child.wait();
}

/// Convert the worker payload into the shared result shape.
///
/// The file entity is always built host-side; worker elements are re-stamped
/// with the request's path and context and truncated by the request policy.
pub fn map_payload(payload: WorkerPayload, content: &str, request: &ParseRequest) -> ParseResult {
    let mut result = ParseResult::new();
    let file = request
        .file_entity(content, "python")
        .with_optional_meta("doc", payload.module_doc);
    result.add_entity(file);

    for element in payload.code_elements {
        if element.name.trim().is_empty() {
            continue;
        }
        let kind = EntityKind::from_str(&element.element_type).unwrap_or_else(|_| {
            tracing::debug!("Unknown element type {:?}, recording as pattern", element.element_type);
            EntityKind::Pattern
        });
        if kind == EntityKind::File {
            continue;
        }
        let mut entity = request.entity(kind, element.name, element.line_number, &element.content);
        for (key, value) in &element.metadata {
            if let Some(value) = MetaValue::from_json(value) {
                entity.metadata.insert(key.clone(), value);
            }
        }
        result.add_entity(entity);
    }

    for rel in payload.relationships {
        let Ok(kind) = RelationshipKind::from_str(&rel.relationship_type) else {
            tracing::debug!("Skipping unknown relationship type {:?}", rel.relationship_type);
            continue;
        };
        let mut relationship = request.relationship(rel.from_name, rel.to_name, kind);
        for (key, value) in &rel.properties {
            if let Some(value) = MetaValue::from_json(value) {
                relationship.properties.insert(key.clone(), value);
            }
        }
        result.add_relationship(relationship);
    }

    for error in payload.errors {
        result.add_error(format!("{}: {}", request.path, error));
    }
    result
}

impl LanguageAdapter for ExternalAdapter {
    fn language_name(&self) -> &str {
        "python"
    }

    fn file_extensions(&self) -> &[&str] {
        &["py", "pyi"]
    }

    /// Stage in-memory content to a transient file; it is removed on drop,
    /// whichever way the worker call ends.
    fn parse_code(&self, content: &str, request: &ParseRequest) -> Result<ParseResult> {
        let mut staged = tempfile::Builder::new()
            .prefix("codeweave-")
            .suffix(".py")
            .tempfile()?;
        staged.write_all(content.as_bytes())?;
        staged.flush()?;
        self.run_worker(staged.path(), content, request)
    }

    /// The file is already on disk, so the worker reads it in place
    fn parse_loaded(&self, content: &str, request: &ParseRequest) -> Result<ParseResult> {
        self.run_worker(Path::new(&request.path), content, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn python_available() -> bool {
        ExternalAdapter::new(ExternalConfig::default()).interpreter().is_ok()
    }

    #[test]
    fn test_payload_tolerates_unknown_and_missing_fields() {
        let json = r#"{
            "codeElements": [
                {"type": "Class", "name": "Order", "lineNumber": 3, "extra": true,
                 "metadata": {"bases": ["Base"], "nested": {"x": 1}}},
                {"type": "Widget", "name": "odd"}
            ],
            "relationships": [
                {"fromName": "Order", "toName": "Base", "type": "Inherits"},
                {"fromName": "a", "toName": "b", "type": "Teleports"}
            ],
            "schemaVersion": 7
        }"#;
        let payload: WorkerPayload = serde_json::from_str(json).unwrap();
        let request = ParseRequest::new("shop/order.py");
        let result = map_payload(payload, "class Order(Base): pass\n", &request);

        assert!(result.succeeded());
        assert_eq!(result.entities.len(), 3);
        assert_eq!(result.entities[0].kind, EntityKind::File);
        let order = result.entity("Order").unwrap();
        assert_eq!(order.line_number, 3);
        assert_eq!(order.file_path, "shop/order.py");
        assert!(order.meta("bases").is_some());
        assert!(order.meta("nested").is_none());
        assert_eq!(result.entity("odd").unwrap().kind, EntityKind::Pattern);
        assert_eq!(result.relationships.len(), 1);
    }

    #[test]
    fn test_empty_payload_object() {
        let payload: WorkerPayload = serde_json::from_str("{}").unwrap();
        let result = map_payload(payload, "", &ParseRequest::new("empty.py"));
        assert_eq!(result.entities.len(), 1);
        assert!(result.relationships.is_empty());
    }

    #[test]
    fn test_missing_interpreter_is_worker_error() {
        let adapter = ExternalAdapter::new(ExternalConfig {
            python: Some("definitely-not-a-python-binary".to_string()),
            ..Default::default()
        });
        let err = adapter
            .parse_code("x = 1\n", &ParseRequest::new("x.py"))
            .unwrap_err();
        assert!(matches!(err, Error::Worker(_)));
    }

    #[test]
    fn test_parse_code_with_interpreter() {
        if !python_available() {
            eprintln!("skipping: no Python interpreter on PATH");
            return;
        }
        let code = r#"import os
from shop.models import Order


class Service(Base):
    """Places orders."""

    @cached
    def place(self, order):
        try:
            self.validate(order)
        except ValueError:
            raise OrderError("bad")
        return os.path.join("a", "b")


def test_place():
    Service().place(Order())
"#;
        let adapter = ExternalAdapter::new(ExternalConfig::default());
        let result = adapter.parse_code(code, &ParseRequest::new("service.py")).unwrap();
        assert!(result.succeeded(), "{:?}", result.errors);

        let class = result.entity("Service").unwrap();
        assert_eq!(class.kind, EntityKind::Class);
        assert_eq!(class.line_number, 5);
        assert_eq!(class.meta("doc").and_then(|v| v.as_text()), Some("Places orders."));
        assert_eq!(result.entity("Service.place").unwrap().kind, EntityKind::Method);
        assert_eq!(result.entity("test_place").unwrap().kind, EntityKind::Test);

        let has = |from: &str, to: &str, kind: RelationshipKind| {
            result
                .relationships
                .iter()
                .any(|r| r.from_name == from && r.to_name == to && r.kind == kind)
        };
        assert!(has("Service", "Base", RelationshipKind::Inherits));
        assert!(has("service.py", "os", RelationshipKind::Imports));
        assert!(has("service.py", "shop.models.Order", RelationshipKind::Imports));
        assert!(has("Service.place", "self.validate", RelationshipKind::Calls));
        assert!(has("Service.place", "ValueError", RelationshipKind::Catches));
        assert!(has("Service.place", "OrderError", RelationshipKind::Throws));
        assert!(has("Service.place", "cached", RelationshipKind::HasAttribute));
    }

    #[test]
    fn test_syntax_error_keeps_file_entity() {
        if !python_available() {
            eprintln!("skipping: no Python interpreter on PATH");
            return;
        }
        let adapter = ExternalAdapter::new(ExternalConfig::default());
        let result = adapter
            .parse_code("def broken(:\n    pass\n", &ParseRequest::new("broken.py"))
            .unwrap();
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("line 1"));
    }

    #[test]
    fn test_cancelled_before_spawn() {
        let request = ParseRequest::new("x.py");
        request.cancel.cancel();
        let adapter = ExternalAdapter::new(ExternalConfig::default());
        assert!(matches!(adapter.parse_code("x = 1", &request), Err(Error::Cancelled)));
    }
}
