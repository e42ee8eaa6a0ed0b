//! Parser dispatch
//!
//! Routes a file to exactly one strategy: canonical manifest, settings and
//! Dockerfile names first, then the file extension. Every strategy call runs
//! inside a panic boundary, and whatever goes wrong comes back as a
//! diagnostic on an otherwise valid [`ParseResult`].

use super::chunker::DocumentChunker;
use super::dockerfile::DockerfileAdapter;
use super::external::ExternalAdapter;
use super::framework::{LanguageAdapter, ParseRequest, ParseResult, file_name_of, read_source};
use super::grammar::all_profiles;
use super::json_config::JsonConfigAdapter;
use super::manifest::{ManifestAdapter, ManifestKind};
use super::markup::{HtmlAdapter, MarkdownAdapter};
use super::script::ScriptAdapter;
use super::settings::{SettingsAdapter, SettingsFlavor};
use super::sql::SqlAdapter;
use super::stylesheet::StylesheetAdapter;
use super::syntax_tree::SyntaxTreeAdapter;
use super::yaml::YamlAdapter;
use crate::cancel::CancellationToken;
use crate::config::IngestConfig;
use crate::exclusion::ExclusionList;
use crate::policy::ChunkingPolicy;
use crate::resolver::finalize;
use crate::{Error, Result};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

/// Selects and runs the strategy for each file
pub struct Dispatcher {
    adapters: Vec<Box<dyn LanguageAdapter>>,
    exclusions: ExclusionList,
    policy: ChunkingPolicy,
    context: Option<String>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        let config = IngestConfig::default();
        Self::new(&config, config.exclusion_list())
    }
}

impl Dispatcher {
    /// Build a dispatcher with every built-in strategy registered
    pub fn new(config: &IngestConfig, exclusions: ExclusionList) -> Self {
        if let Err(e) = config.validate() {
            tracing::warn!("{}; content is still kept within the ceiling", e);
        }
        let mut dispatcher = Self {
            adapters: Vec::new(),
            exclusions,
            policy: config.chunking,
            context: config.context.clone(),
        };

        for profile in all_profiles() {
            dispatcher.register(SyntaxTreeAdapter::new(profile));
        }
        if config.external.enabled {
            dispatcher.register(ExternalAdapter::new(config.external.clone()));
        }
        dispatcher.register(StylesheetAdapter);
        dispatcher.register(MarkdownAdapter);
        dispatcher.register(HtmlAdapter);
        dispatcher.register(JsonConfigAdapter);
        dispatcher.register(YamlAdapter);
        dispatcher.register(SettingsAdapter);
        dispatcher.register(ManifestAdapter);
        dispatcher.register(DockerfileAdapter);
        dispatcher.register(ScriptAdapter);
        dispatcher.register(SqlAdapter);
        dispatcher.register(DocumentChunker::new());
        dispatcher
    }

    /// Register an adapter; extension matches are tried in registration order
    pub fn register(&mut self, adapter: impl LanguageAdapter + 'static) {
        self.adapters.push(Box::new(adapter));
    }

    /// Get all registered adapters
    pub fn adapters(&self) -> &[Box<dyn LanguageAdapter>] {
        &self.adapters
    }

    /// Find the strategy for a file, special file names first
    pub fn find_adapter(&self, path: &Path) -> Option<&dyn LanguageAdapter> {
        let name = path.file_name()?.to_string_lossy();
        if ManifestKind::detect(&name).is_some() {
            return Some(&ManifestAdapter);
        }
        if SettingsFlavor::detect(&name).is_some() {
            return Some(&SettingsAdapter);
        }
        if DockerfileAdapter::matches_name(&name) {
            return Some(&DockerfileAdapter);
        }
        self.adapters.iter().find(|a| a.can_handle(path)).map(|a| a.as_ref())
    }

    /// Check whether a file would reach a strategy (not excluded, not unknown)
    pub fn is_supported(&self, path: &Path) -> bool {
        !self.exclusions.is_excluded(path) && self.find_adapter(path).is_some()
    }

    /// Check whether a file is on the exclusion list
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.exclusions.is_excluded(path)
    }

    /// Parse a file from disk. Never fails: problems become diagnostics.
    pub fn parse_file(
        &self,
        path: &Path,
        context: Option<&str>,
        cancel: Option<&CancellationToken>,
    ) -> ParseResult {
        let shown = path.to_string_lossy().to_string();
        if !path.is_file() {
            tracing::debug!("Missing input {}", shown);
            return ParseResult::from_error(format!("file not found: {}", shown));
        }
        let adapter = match self.route(path, &shown) {
            Ok(adapter) => adapter,
            Err(result) => return result,
        };

        let request = self.request(&shown, context, cancel);
        self.guarded(&request, adapter, || {
            request.cancel.check()?;
            let content = read_source(path)?;
            if content.trim().is_empty() {
                return Ok(file_only(&content, adapter, &request));
            }
            adapter.parse_loaded(&content, &request)
        })
    }

    /// Parse in-memory content that belongs to `path`
    pub fn parse_code(
        &self,
        content: &str,
        path: &str,
        context: Option<&str>,
        cancel: Option<&CancellationToken>,
    ) -> ParseResult {
        let adapter = match self.route(Path::new(path), path) {
            Ok(adapter) => adapter,
            Err(result) => return result,
        };

        let request = self.request(path, context, cancel);
        self.guarded(&request, adapter, || {
            request.cancel.check()?;
            if content.trim().is_empty() {
                return Ok(file_only(content, adapter, &request));
            }
            adapter.parse_code(content, &request)
        })
    }

    /// Exclusion and strategy lookup shared by both entry points
    fn route(&self, path: &Path, shown: &str) -> std::result::Result<&dyn LanguageAdapter, ParseResult> {
        let name = file_name_of(shown);
        if self.exclusions.is_excluded(path) {
            tracing::debug!("Excluded {}", shown);
            return Err(ParseResult::from_error(format!("excluded: {} is a generated or lock file", name)));
        }
        match self.find_adapter(path) {
            Some(adapter) => {
                tracing::debug!("Routing {} to {}", shown, adapter.language_name());
                Ok(adapter)
            }
            None => Err(ParseResult::from_error(format!("unsupported file type: {}", name))),
        }
    }

    fn request(&self, path: &str, context: Option<&str>, cancel: Option<&CancellationToken>) -> ParseRequest {
        ParseRequest::new(path)
            .with_context(context.or(self.context.as_deref()))
            .with_policy(self.policy)
            .with_cancel(cancel)
    }

    /// Run a strategy, converting errors and panics into diagnostics
    fn guarded(
        &self,
        request: &ParseRequest,
        adapter: &dyn LanguageAdapter,
        run: impl FnOnce() -> Result<ParseResult>,
    ) -> ParseResult {
        match panic::catch_unwind(AssertUnwindSafe(run)) {
            Ok(Ok(result)) => {
                if !result.succeeded() {
                    tracing::warn!("{} parsed with {} diagnostic(s)", request.path, result.errors.len());
                }
                finalize(result, &self.policy)
            }
            Ok(Err(Error::Cancelled)) => ParseResult::from_error(format!("parse of {} cancelled", request.path)),
            Ok(Err(e)) => {
                tracing::warn!("{} strategy failed on {}: {}", adapter.language_name(), request.path, e);
                ParseResult::from_error(format!("failed to parse {}: {}", request.path, e))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::warn!("Panic while parsing {}: {}", request.path, message);
                ParseResult::from_error(format!("internal error while parsing {}: {}", request.path, message))
            }
        }
    }
}

/// Whitespace-only input: the file entity and nothing else
fn file_only(content: &str, adapter: &dyn LanguageAdapter, request: &ParseRequest) -> ParseResult {
    let mut result = ParseResult::new();
    result.add_entity(request.file_entity(content, adapter.language_name()));
    result
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;
    use std::fs;

    struct PanickingAdapter;

    impl LanguageAdapter for PanickingAdapter {
        fn language_name(&self) -> &str {
            "boom"
        }
        fn file_extensions(&self) -> &[&str] {
            &["boom"]
        }
        fn parse_code(&self, _content: &str, _request: &ParseRequest) -> Result<ParseResult> {
            panic!("index out of range");
        }
    }

    fn language(dispatcher: &Dispatcher, path: &str) -> Option<String> {
        dispatcher
            .find_adapter(Path::new(path))
            .map(|a| a.language_name().to_string())
    }

    #[test]
    fn test_special_names_win_over_extensions() {
        let dispatcher = Dispatcher::default();
        assert_eq!(language(&dispatcher, "web/package.json").as_deref(), Some("manifest"));
        assert_eq!(language(&dispatcher, "Api/appsettings.Development.json").as_deref(), Some("settings"));
        assert_eq!(language(&dispatcher, "tsconfig.json").as_deref(), Some("json"));
        assert_eq!(language(&dispatcher, "Cargo.toml").as_deref(), Some("manifest"));
        assert_eq!(language(&dispatcher, "config.toml").as_deref(), Some("settings"));
        assert_eq!(language(&dispatcher, ".env.local").as_deref(), Some("settings"));
        assert_eq!(language(&dispatcher, "Dockerfile.prod").as_deref(), Some("dockerfile"));
        assert_eq!(language(&dispatcher, "requirements-dev.txt").as_deref(), Some("manifest"));
    }

    #[test]
    fn test_extension_routing() {
        let dispatcher = Dispatcher::default();
        assert_eq!(language(&dispatcher, "src/Program.cs").as_deref(), Some("csharp"));
        assert_eq!(language(&dispatcher, "app/main.py").as_deref(), Some("python"));
        assert_eq!(language(&dispatcher, "README.MD").as_deref(), Some("markdown"));
        assert_eq!(language(&dispatcher, "deploy.sh").as_deref(), Some("script"));
        assert_eq!(language(&dispatcher, "infra/main.tf").as_deref(), Some("text"));
        assert_eq!(language(&dispatcher, "photo.png"), None);
    }

    #[test]
    fn test_external_strategy_can_be_disabled() {
        let mut config = IngestConfig::default();
        config.external.enabled = false;
        let dispatcher = Dispatcher::new(&config, ExclusionList::default());
        assert!(dispatcher.find_adapter(Path::new("main.py")).is_none());
    }

    #[test]
    fn test_missing_file() {
        let result = Dispatcher::default().parse_file(Path::new("/no/such/file.cs"), None, None);
        assert!(result.entities.is_empty());
        assert_eq!(result.errors, vec!["file not found: /no/such/file.cs".to_string()]);
    }

    #[test]
    fn test_excluded_file_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Package-Lock.json");
        fs::write(&path, "{\"lockfileVersion\": 3}").unwrap();

        let dispatcher = Dispatcher::default();
        let first = dispatcher.parse_file(&path, None, None);
        let second = dispatcher.parse_file(&path, None, None);

        assert_eq!(first, second);
        assert!(first.entities.is_empty());
        assert_eq!(
            first.errors,
            vec!["excluded: Package-Lock.json is a generated or lock file".to_string()]
        );
    }

    #[test]
    fn test_unsupported_type() {
        let result = Dispatcher::default().parse_code("data", "blob.xyz", None, None);
        assert!(result.entities.is_empty());
        assert_eq!(result.errors, vec!["unsupported file type: blob.xyz".to_string()]);
    }

    #[test]
    fn test_binary_content_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, [0x7b, 0x00, 0x01, 0x7d]).unwrap();

        let result = Dispatcher::default().parse_file(&path, None, None);
        assert!(result.entities.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("binary"));
    }

    #[test]
    fn test_empty_file_yields_file_entity_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.css");
        fs::write(&path, "  \n").unwrap();

        let result = Dispatcher::default().parse_file(&path, Some("web"), None);
        assert!(result.succeeded());
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.entities[0].kind, EntityKind::File);
        assert_eq!(result.entities[0].context, "web");
    }

    #[test]
    fn test_panic_becomes_diagnostic() {
        let mut dispatcher = Dispatcher::default();
        dispatcher.register(PanickingAdapter);

        let result = dispatcher.parse_code("anything", "x.boom", None, None);
        assert!(result.entities.is_empty());
        assert_eq!(
            result.errors,
            vec!["internal error while parsing x.boom: index out of range".to_string()]
        );
    }

    #[test]
    fn test_cancelled_before_read() {
        let token = CancellationToken::new();
        token.cancel();
        let result = Dispatcher::default().parse_code("a { color: red }", "a.css", None, Some(&token));
        assert!(result.entities.is_empty());
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_configured_context_is_default() {
        let config = IngestConfig {
            context: Some("billing".to_string()),
            ..Default::default()
        };
        let dispatcher = Dispatcher::new(&config, ExclusionList::default());
        let result = dispatcher.parse_code("a { color: red }", "a.css", None, None);
        assert!(result.entities.iter().all(|e| e.context == "billing"));
        let result = dispatcher.parse_code("a { color: red }", "a.css", Some("web"), None);
        assert!(result.entities.iter().all(|e| e.context == "web"));
    }
}
