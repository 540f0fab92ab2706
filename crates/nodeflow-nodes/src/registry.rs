use std::sync::Arc;

use indexmap::IndexMap;

use nodeflow_core::config::{AppConfig, HttpConfig, VerificationConfig};
use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::event::EventBus;
use nodeflow_core::traits::{HttpTransport, NodeExecutor, RecordLookup};
use nodeflow_core::types::{NodeDefinition, NodePresentation};

use crate::builtin;
use crate::http_call::HttpCaller;
use crate::records::RestRecordLookup;
use crate::transport::ReqwestTransport;
use crate::verify::{RetryPolicy, Verifier};

/// Definition, executor, and presentation of one node type.
#[derive(Clone)]
pub struct RegistryEntry {
    pub definition: NodeDefinition,
    pub executor: Arc<dyn NodeExecutor>,
    pub presentation: NodePresentation,
}

impl std::fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("definition", &self.definition.node_type)
            .field("presentation", &self.presentation)
            .finish()
    }
}

/// Catalog of node types, keyed by type string.
///
/// Filled during bootstrap and then shared read-only behind an `Arc`;
/// entries cannot be removed or replaced.
#[derive(Default)]
pub struct NodeRegistry {
    entries: IndexMap<String, RegistryEntry>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node type.
    pub fn register(
        &mut self,
        node_type: impl Into<String>,
        definition: NodeDefinition,
        executor: impl NodeExecutor,
        presentation: NodePresentation,
    ) -> Result<()> {
        self.register_shared(node_type, definition, Arc::new(executor), presentation)
    }

    /// Register a node type with an executor that is already shared.
    ///
    /// Rejects a key that is taken or that differs from `definition.node_type`.
    pub fn register_shared(
        &mut self,
        node_type: impl Into<String>,
        definition: NodeDefinition,
        executor: Arc<dyn NodeExecutor>,
        presentation: NodePresentation,
    ) -> Result<()> {
        let node_type = node_type.into();
        if node_type != definition.node_type {
            return Err(NodeflowError::NodeTypeMismatch {
                key: node_type,
                definition: definition.node_type,
            });
        }
        if self.entries.contains_key(&node_type) {
            return Err(NodeflowError::DuplicateNodeType(node_type));
        }
        self.entries.insert(
            node_type,
            RegistryEntry {
                definition,
                executor,
                presentation,
            },
        );
        Ok(())
    }

    pub fn lookup(&self, node_type: &str) -> Option<&RegistryEntry> {
        self.entries.get(node_type)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Type keys in registration order.
    pub fn list_types(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    /// All definitions in registration order.
    pub fn definitions(&self) -> Vec<&NodeDefinition> {
        self.entries.values().map(|e| &e.definition).collect()
    }

    /// Definitions grouped by category, categories in first-seen order.
    pub fn group_by_category(&self) -> IndexMap<&str, Vec<&NodeDefinition>> {
        let mut groups: IndexMap<&str, Vec<&NodeDefinition>> = IndexMap::new();
        for entry in self.entries.values() {
            groups
                .entry(entry.definition.category.as_str())
                .or_default()
                .push(&entry.definition);
        }
        groups
    }

    /// Case-insensitive match on type, label, description, or category.
    /// A blank term matches everything.
    pub fn search(&self, term: &str) -> Vec<&NodeDefinition> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return self.definitions();
        }
        self.entries
            .values()
            .map(|e| &e.definition)
            .filter(|d| {
                [&d.node_type, &d.label, &d.description, &d.category]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&term))
            })
            .collect()
    }

    /// Create a registry with all built-in node types registered.
    pub fn with_builtins(deps: &BuiltinDeps) -> Result<Self> {
        let mut registry = Self::new();
        let caller = HttpCaller::new(deps.transport.clone(), deps.http.clone());
        let mut verifier = Verifier::new(
            deps.lookup.clone(),
            RetryPolicy::from_config(&deps.verification),
        );
        if let Some(ref events) = deps.events {
            verifier = verifier.with_events(events.clone());
        }

        // ── Input ───────────────────────────────────────────────
        registry.register(
            builtin::text_input::NODE_TYPE,
            builtin::text_input::definition(),
            builtin::text_input::TextInputExecutor,
            builtin::text_input::presentation(),
        )?;

        // ── Transform ───────────────────────────────────────────
        registry.register(
            builtin::json_parse::NODE_TYPE,
            builtin::json_parse::definition(),
            builtin::json_parse::JsonParseExecutor,
            builtin::json_parse::presentation(),
        )?;

        // ── Network ─────────────────────────────────────────────
        registry.register(
            builtin::http_request::NODE_TYPE,
            builtin::http_request::definition(&deps.http),
            builtin::http_request::HttpRequestExecutor::new(caller.clone()),
            builtin::http_request::presentation(),
        )?;
        registry.register(
            builtin::verified_request::NODE_TYPE,
            builtin::verified_request::definition(&deps.http, &deps.verification),
            builtin::verified_request::VerifiedRequestExecutor::new(caller, verifier),
            builtin::verified_request::presentation(),
        )?;

        // ── Output ──────────────────────────────────────────────
        registry.register(
            builtin::message_format::NODE_TYPE,
            builtin::message_format::definition(),
            builtin::message_format::MessageFormatExecutor,
            builtin::message_format::presentation(),
        )?;

        Ok(registry)
    }
}

/// Collaborators the built-in executors are wired with.
#[derive(Clone)]
pub struct BuiltinDeps {
    pub transport: Arc<dyn HttpTransport>,
    pub lookup: Arc<dyn RecordLookup>,
    pub http: HttpConfig,
    pub verification: VerificationConfig,
    pub events: Option<Arc<EventBus>>,
}

impl BuiltinDeps {
    pub fn new(transport: Arc<dyn HttpTransport>, lookup: Arc<dyn RecordLookup>) -> Self {
        Self {
            transport,
            lookup,
            http: HttpConfig::default(),
            verification: VerificationConfig::default(),
            events: None,
        }
    }

    /// Real reqwest transport and REST record lookup, as configured.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let transport: Arc<dyn HttpTransport> =
            Arc::new(ReqwestTransport::new(&config.http.user_agent)?);
        let lookup = Arc::new(RestRecordLookup::new(transport.clone(), &config.records));
        Ok(Self {
            transport,
            lookup,
            http: config.http.clone(),
            verification: config.verification.clone(),
            events: None,
        })
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }
}
