//! Server-side registry of tools, resources, resource templates, and
//! prompts.
//!
//! Names and URIs are unique within their kind. Disabling a
//! registration hides it from list/read/call operations but preserves
//! its identity for re-enabling. Every mutation schedules a debounced
//! list-changed notification for its kind. Listing takes a
//! point-in-time snapshot under the read lock, so concurrent mutations
//! never produce a torn page.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, Weak};
use tracing::{debug, warn};

use portico_mcp_core::error::{Error, Result};
use portico_mcp_core::pagination::paginate;
use portico_mcp_core::types::{
    Prompt, Resource, ResourceTemplate, TemplateBindings, Tool,
};
use portico_mcp_core::uri::UriTemplate;

use crate::handlers::{PromptHandler, ResourceHandler, ToolHandler};

/// The registry kind a change notification refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Tools,
    Resources,
    Prompts,
}

/// Invoked on every catalog mutation; the server wires this to the
/// engine's debounced list-changed emission.
pub type ChangeNotifier = Arc<dyn Fn(EntityKind) + Send + Sync>;

struct ToolEntry {
    tool: Tool,
    handler: Arc<dyn ToolHandler>,
    enabled: bool,
}

struct ResourceEntry {
    resource: Resource,
    handler: Arc<dyn ResourceHandler>,
    enabled: bool,
}

struct TemplateEntry {
    template: ResourceTemplate,
    compiled: UriTemplate,
    handler: Arc<dyn ResourceHandler>,
    enabled: bool,
}

struct PromptEntry {
    prompt: Prompt,
    handler: Arc<dyn PromptHandler>,
    enabled: bool,
}

#[derive(Default)]
struct Catalog {
    // Registration order matters for template resolution; names are
    // checked for uniqueness on insert.
    tools: Vec<ToolEntry>,
    resources: Vec<ResourceEntry>,
    templates: Vec<TemplateEntry>,
    prompts: Vec<PromptEntry>,
}

/// Per-session resource watchers.
#[derive(Default)]
struct Subscriptions {
    by_session: HashMap<String, HashSet<String>>,
}

pub struct Registry {
    catalog: RwLock<Catalog>,
    subscriptions: RwLock<Subscriptions>,
    notifier: RwLock<Option<ChangeNotifier>>,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            catalog: RwLock::new(Catalog::default()),
            subscriptions: RwLock::new(Subscriptions::default()),
            notifier: RwLock::new(None),
        })
    }

    /// Wire the change notifier. Mutations before this point notify
    /// nobody (typical for registrations made before serving starts).
    pub fn set_notifier(&self, notifier: ChangeNotifier) {
        if let Ok(mut slot) = self.notifier.write() {
            *slot = Some(notifier);
        }
    }

    fn notify_changed(&self, kind: EntityKind) {
        if let Ok(slot) = self.notifier.read() {
            if let Some(notifier) = slot.as_ref() {
                notifier(kind);
            }
        }
    }

    // --- registration ---

    pub fn register_tool(
        self: &Arc<Self>,
        tool: Tool,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<RegistrationHandle> {
        tool.validate()?;
        let name = tool.name.clone();
        {
            let mut catalog = write_lock(&self.catalog)?;
            if catalog.tools.iter().any(|e| e.tool.name == name) {
                return Err(Error::invalid_request(format!(
                    "tool '{name}' already registered"
                )));
            }
            catalog.tools.push(ToolEntry {
                tool,
                handler,
                enabled: true,
            });
        }
        debug!(tool = %name, "tool registered");
        self.notify_changed(EntityKind::Tools);
        Ok(self.handle(EntityKind::Tools, name))
    }

    pub fn register_resource(
        self: &Arc<Self>,
        resource: Resource,
        handler: Arc<dyn ResourceHandler>,
    ) -> Result<RegistrationHandle> {
        let uri = resource.uri.clone();
        if uri.is_empty() {
            return Err(Error::invalid_request("empty resource URI"));
        }
        {
            let mut catalog = write_lock(&self.catalog)?;
            if catalog.resources.iter().any(|e| e.resource.uri == uri) {
                return Err(Error::invalid_request(format!(
                    "resource '{uri}' already registered"
                )));
            }
            catalog.resources.push(ResourceEntry {
                resource,
                handler,
                enabled: true,
            });
        }
        debug!(resource = %uri, "resource registered");
        self.notify_changed(EntityKind::Resources);
        Ok(self.handle(EntityKind::Resources, uri))
    }

    pub fn register_template(
        self: &Arc<Self>,
        template: ResourceTemplate,
        handler: Arc<dyn ResourceHandler>,
    ) -> Result<RegistrationHandle> {
        let pattern = template.uri_template.clone();
        let compiled = UriTemplate::compile(&pattern)?;
        {
            let mut catalog = write_lock(&self.catalog)?;
            if catalog
                .templates
                .iter()
                .any(|e| e.template.uri_template == pattern)
            {
                return Err(Error::invalid_request(format!(
                    "template '{pattern}' already registered"
                )));
            }
            catalog.templates.push(TemplateEntry {
                template,
                compiled,
                handler,
                enabled: true,
            });
        }
        debug!(template = %pattern, "resource template registered");
        self.notify_changed(EntityKind::Resources);
        Ok(self.handle(EntityKind::Resources, pattern))
    }

    pub fn register_prompt(
        self: &Arc<Self>,
        prompt: Prompt,
        handler: Arc<dyn PromptHandler>,
    ) -> Result<RegistrationHandle> {
        let name = prompt.name.clone();
        if name.is_empty() {
            return Err(Error::invalid_request("empty prompt name"));
        }
        {
            let mut catalog = write_lock(&self.catalog)?;
            if catalog.prompts.iter().any(|e| e.prompt.name == name) {
                return Err(Error::invalid_request(format!(
                    "prompt '{name}' already registered"
                )));
            }
            catalog.prompts.push(PromptEntry {
                prompt,
                handler,
                enabled: true,
            });
        }
        debug!(prompt = %name, "prompt registered");
        self.notify_changed(EntityKind::Prompts);
        Ok(self.handle(EntityKind::Prompts, name))
    }

    fn handle(self: &Arc<Self>, kind: EntityKind, key: String) -> RegistrationHandle {
        RegistrationHandle {
            registry: Arc::downgrade(self),
            kind,
            key,
        }
    }

    // --- enable / disable / remove (idempotent) ---

    fn set_enabled(&self, kind: EntityKind, key: &str, enabled: bool) -> bool {
        let Ok(mut catalog) = self.catalog.write() else {
            return false;
        };
        let changed = match kind {
            EntityKind::Tools => catalog
                .tools
                .iter_mut()
                .find(|e| e.tool.name == key)
                .map(|e| {
                    let changed = e.enabled != enabled;
                    e.enabled = enabled;
                    changed
                }),
            EntityKind::Resources => {
                let resource = catalog
                    .resources
                    .iter_mut()
                    .find(|e| e.resource.uri == key)
                    .map(|e| {
                        let changed = e.enabled != enabled;
                        e.enabled = enabled;
                        changed
                    });
                resource.or_else(|| {
                    catalog
                        .templates
                        .iter_mut()
                        .find(|e| e.template.uri_template == key)
                        .map(|e| {
                            let changed = e.enabled != enabled;
                            e.enabled = enabled;
                            changed
                        })
                })
            }
            EntityKind::Prompts => catalog
                .prompts
                .iter_mut()
                .find(|e| e.prompt.name == key)
                .map(|e| {
                    let changed = e.enabled != enabled;
                    e.enabled = enabled;
                    changed
                }),
        };
        drop(catalog);
        match changed {
            Some(true) => {
                self.notify_changed(kind);
                true
            }
            Some(false) => true, // idempotent repeat
            None => false,
        }
    }

    fn remove_entry(&self, kind: EntityKind, key: &str) -> bool {
        let Ok(mut catalog) = self.catalog.write() else {
            return false;
        };
        let removed = match kind {
            EntityKind::Tools => {
                let before = catalog.tools.len();
                catalog.tools.retain(|e| e.tool.name != key);
                catalog.tools.len() != before
            }
            EntityKind::Resources => {
                let before = catalog.resources.len() + catalog.templates.len();
                catalog.resources.retain(|e| e.resource.uri != key);
                catalog.templates.retain(|e| e.template.uri_template != key);
                catalog.resources.len() + catalog.templates.len() != before
            }
            EntityKind::Prompts => {
                let before = catalog.prompts.len();
                catalog.prompts.retain(|e| e.prompt.name != key);
                catalog.prompts.len() != before
            }
        };
        drop(catalog);
        if removed {
            self.notify_changed(kind);
        }
        removed
    }

    // --- list operations (snapshot + opaque-cursor pagination) ---

    pub fn list_tools(
        &self,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<(Vec<Tool>, Option<String>)> {
        let snapshot: Vec<Tool> = read_lock(&self.catalog)?
            .tools
            .iter()
            .filter(|e| e.enabled)
            .map(|e| e.tool.clone())
            .collect();
        paginate(&snapshot, cursor, page_size)
    }

    pub fn list_resources(
        &self,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<(Vec<Resource>, Option<String>)> {
        let snapshot: Vec<Resource> = read_lock(&self.catalog)?
            .resources
            .iter()
            .filter(|e| e.enabled)
            .map(|e| e.resource.clone())
            .collect();
        paginate(&snapshot, cursor, page_size)
    }

    pub fn list_templates(
        &self,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<(Vec<ResourceTemplate>, Option<String>)> {
        let snapshot: Vec<ResourceTemplate> = read_lock(&self.catalog)?
            .templates
            .iter()
            .filter(|e| e.enabled)
            .map(|e| e.template.clone())
            .collect();
        paginate(&snapshot, cursor, page_size)
    }

    pub fn list_prompts(
        &self,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<(Vec<Prompt>, Option<String>)> {
        let snapshot: Vec<Prompt> = read_lock(&self.catalog)?
            .prompts
            .iter()
            .filter(|e| e.enabled)
            .map(|e| e.prompt.clone())
            .collect();
        paginate(&snapshot, cursor, page_size)
    }

    // --- resolution ---

    /// Find an enabled tool by name.
    pub fn resolve_tool(&self, name: &str) -> Result<(Tool, Arc<dyn ToolHandler>)> {
        let catalog = read_lock(&self.catalog)?;
        catalog
            .tools
            .iter()
            .find(|e| e.enabled && e.tool.name == name)
            .map(|e| (e.tool.clone(), e.handler.clone()))
            .ok_or_else(|| Error::invalid_params(format!("unknown tool: {name}")))
    }

    /// Resolve a URI: exact resources first, then templates in
    /// registration order. The first matching template wins.
    pub fn resolve_resource(
        &self,
        uri: &str,
    ) -> Result<(Arc<dyn ResourceHandler>, TemplateBindings)> {
        let catalog = read_lock(&self.catalog)?;
        if let Some(entry) = catalog
            .resources
            .iter()
            .find(|e| e.enabled && e.resource.uri == uri)
        {
            return Ok((entry.handler.clone(), TemplateBindings::new()));
        }
        for entry in catalog.templates.iter().filter(|e| e.enabled) {
            if let Some(bindings) = entry.compiled.extract(uri) {
                return Ok((entry.handler.clone(), bindings));
            }
        }
        Err(Error::invalid_params(format!("unknown resource: {uri}")))
    }

    /// Find an enabled prompt by name.
    pub fn resolve_prompt(&self, name: &str) -> Result<(Prompt, Arc<dyn PromptHandler>)> {
        let catalog = read_lock(&self.catalog)?;
        catalog
            .prompts
            .iter()
            .find(|e| e.enabled && e.prompt.name == name)
            .map(|e| (e.prompt.clone(), e.handler.clone()))
            .ok_or_else(|| Error::invalid_params(format!("unknown prompt: {name}")))
    }

    /// Whether a URI names a known (enabled) resource or matches a
    /// template; used to validate subscriptions.
    pub fn knows_uri(&self, uri: &str) -> bool {
        self.resolve_resource(uri).is_ok()
    }

    // --- subscriptions ---

    /// Add a watcher. Adding the first or a repeated watcher is
    /// idempotent.
    pub fn subscribe(&self, session_id: &str, uri: &str) -> Result<()> {
        let mut subscriptions = write_lock(&self.subscriptions)?;
        subscriptions
            .by_session
            .entry(session_id.to_string())
            .or_default()
            .insert(uri.to_string());
        Ok(())
    }

    /// Remove a watcher. Removing an absent watcher is idempotent.
    pub fn unsubscribe(&self, session_id: &str, uri: &str) -> Result<()> {
        let mut subscriptions = write_lock(&self.subscriptions)?;
        if let Some(uris) = subscriptions.by_session.get_mut(session_id) {
            uris.remove(uri);
            if uris.is_empty() {
                subscriptions.by_session.remove(session_id);
            }
        }
        Ok(())
    }

    /// Sessions currently watching `uri`.
    pub fn subscribers_of(&self, uri: &str) -> Vec<String> {
        match self.subscriptions.read() {
            Ok(subscriptions) => subscriptions
                .by_session
                .iter()
                .filter(|(_, uris)| uris.contains(uri))
                .map(|(session, _)| session.clone())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Snapshot of one session's watched URIs.
    pub fn subscriptions_of(&self, session_id: &str) -> HashSet<String> {
        self.subscriptions
            .read()
            .ok()
            .and_then(|s| s.by_session.get(session_id).cloned())
            .unwrap_or_default()
    }

    /// Forget a session entirely (transport-level session end).
    pub fn drop_session(&self, session_id: &str) {
        if let Ok(mut subscriptions) = self.subscriptions.write() {
            subscriptions.by_session.remove(session_id);
        }
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> Result<std::sync::RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| Error::internal("registry lock poisoned"))
}

fn write_lock<T>(lock: &RwLock<T>) -> Result<std::sync::RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| Error::internal("registry lock poisoned"))
}

/// Handle returned by registration. All operations are idempotent and
/// survive the registry (they become no-ops if it is gone).
#[derive(Clone)]
pub struct RegistrationHandle {
    registry: Weak<Registry>,
    kind: EntityKind,
    key: String,
}

impl RegistrationHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn enable(&self) {
        if let Some(registry) = self.registry.upgrade() {
            if !registry.set_enabled(self.kind, &self.key, true) {
                warn!(key = %self.key, "enable on removed registration ignored");
            }
        }
    }

    pub fn disable(&self) {
        if let Some(registry) = self.registry.upgrade() {
            if !registry.set_enabled(self.kind, &self.key, false) {
                warn!(key = %self.key, "disable on removed registration ignored");
            }
        }
    }

    /// Replace the entity's metadata (same key).
    pub fn update_tool(&self, tool: Tool) -> Result<()> {
        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| Error::internal("registry dropped"))?;
        if tool.name != self.key {
            return Err(Error::invalid_request("update may not rename a tool"));
        }
        tool.validate()?;
        {
            let mut catalog = write_lock(&registry.catalog)?;
            let entry = catalog
                .tools
                .iter_mut()
                .find(|e| e.tool.name == self.key)
                .ok_or_else(|| Error::invalid_request("registration removed"))?;
            entry.tool = tool;
        }
        registry.notify_changed(EntityKind::Tools);
        Ok(())
    }

    pub fn remove(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_entry(self.kind, &self.key);
        }
    }
}
