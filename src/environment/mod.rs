//! # Environment
//!
//! The registry proper: installed providers kept sorted by priority, the
//! lazily built capability graph, the host object model, configuration and
//! the change-notification bus.
//!
//! ## Resolution order
//!
//! Providers are visited highest priority first; equal priorities keep
//! install order. Within a provider, sources are visited in flattened
//! declaration order. The first source that resolves wins and nothing
//! backtracks, so priority and declaration order alone decide the outcome.
//!
//! ## Reentrancy
//!
//! Resolution may construct a backing object whose initializer installs or
//! uninstalls providers or resolves other capabilities. Every traversal walks
//! a snapshot of the provider list and of each group, and no `RefCell` borrow
//! is held across a call into a source, the host or a subscriber.

pub mod global;

use std::cell::{Cell, RefCell};
use std::cmp::Reverse;
use std::fmt;
use std::rc::Rc;

use once_cell::unsync::OnceCell;
use uuid::Uuid;

use crate::config::{MissingCapabilityPolicy, RegistryConfig};
use crate::errors::{RegistryError, Result};
use crate::events::{EventBus, RegistryEvent};
use crate::graph::CapabilityGraph;
use crate::host::{HostObjectModel, StandaloneHost};
use crate::providers::{PriorityMode, Provider};
use crate::sources::Resolvability;
use crate::tags::{contains_all, Tag};
use crate::universe::{facet_as, CapabilityId, Facet, TypeUniverse};

pub use global::{global, init_global, teardown_global};

// ============================================================================
// Diagnostics
// ============================================================================

/// Why a source was or was not chosen for a request.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceOutcome {
    /// This source answers the request.
    Selected,
    /// Would match, but an earlier source already answers.
    Shadowed,
    ProviderDisabled,
    /// Does not produce the requested capability type.
    WrongCapability,
    NotResolvable(Resolvability),
    /// Requested tags the source does not carry.
    MissingTags(Vec<Tag>),
    /// A constructed type that gates or tags itself and has not been built
    /// yet. Only resolving it can tell.
    Undetermined,
}

/// One visited source in [`Environment::explain`].
#[derive(Debug, Clone)]
pub struct ResolutionTrace {
    pub provider: String,
    pub priority: i32,
    pub source: Uuid,
    pub label: String,
    pub outcome: TraceOutcome,
}

// ============================================================================
// Environment
// ============================================================================

struct Installed {
    provider: Rc<Provider>,
    /// Install order, the tie-break at equal priority.
    sequence: u64,
}

struct EnvironmentInner {
    universe: RefCell<TypeUniverse>,
    graph: RefCell<OnceCell<Rc<CapabilityGraph>>>,
    providers: RefCell<Vec<Installed>>,
    install_counter: Cell<u64>,
    host: Rc<dyn HostObjectModel>,
    config: RefCell<RegistryConfig>,
    events: EventBus,
}

/// Shared handle to a registry. Clones refer to the same registry.
#[derive(Clone)]
pub struct Environment {
    inner: Rc<EnvironmentInner>,
}

/// Configures an [`Environment`] before it is built.
#[derive(Default)]
pub struct EnvironmentBuilder {
    universe: TypeUniverse,
    host: Option<Rc<dyn HostObjectModel>>,
    config: RegistryConfig,
}

impl EnvironmentBuilder {
    pub fn universe(mut self, universe: TypeUniverse) -> Self {
        self.universe = universe;
        self
    }

    /// Host object model. Defaults to a running [`StandaloneHost`].
    pub fn host<H: HostObjectModel + 'static>(mut self, host: Rc<H>) -> Self {
        self.host = Some(host as Rc<dyn HostObjectModel>);
        self
    }

    pub fn config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Environment {
        let host = self
            .host
            .unwrap_or_else(|| Rc::new(StandaloneHost::new()) as Rc<dyn HostObjectModel>);
        Environment {
            inner: Rc::new(EnvironmentInner {
                universe: RefCell::new(self.universe),
                graph: RefCell::new(OnceCell::new()),
                providers: RefCell::new(Vec::new()),
                install_counter: Cell::new(0),
                host,
                config: RefCell::new(self.config),
                events: EventBus::new(),
            }),
        }
    }
}

impl Environment {
    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::default()
    }

    /// Environment over `universe` with a standalone host and default config.
    pub fn new(universe: TypeUniverse) -> Self {
        Self::builder().universe(universe).build()
    }

    /// Whether two handles refer to the same registry.
    pub fn ptr_eq(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------------
    // Types and graph
    // ------------------------------------------------------------------------

    /// The capability graph, built from the universe on first access.
    ///
    /// Callers keep the returned snapshot for the whole of an operation, so a
    /// rescan never changes the graph under an in-flight resolution.
    pub fn graph(&self) -> Rc<CapabilityGraph> {
        let cell = self.inner.graph.borrow();
        let graph = cell.get_or_init(|| {
            let universe = self.inner.universe.borrow();
            Rc::new(CapabilityGraph::build(&universe))
        });
        Rc::clone(graph)
    }

    /// Drop the built graph; the next access rebuilds it.
    pub fn rescan_types(&self) {
        *self.inner.graph.borrow_mut() = OnceCell::new();
        log::debug!("Capability graph invalidated");
    }

    /// Register more types, then rescan.
    pub fn register_types(&self, register: impl FnOnce(&mut TypeUniverse)) {
        register(&mut *self.inner.universe.borrow_mut());
        self.rescan_types();
    }

    pub fn host(&self) -> &dyn HostObjectModel {
        self.inner.host.as_ref()
    }

    pub fn config(&self) -> RegistryConfig {
        self.inner.config.borrow().clone()
    }

    pub fn set_config(&self, config: RegistryConfig) {
        *self.inner.config.borrow_mut() = config;
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    // ------------------------------------------------------------------------
    // Provider lifecycle
    // ------------------------------------------------------------------------

    /// Install `provider`. Installing an installed provider is a no-op.
    ///
    /// A `HighestAtInstall` provider is assigned one above the current
    /// maximum, or `0` when nothing is installed.
    pub fn install(&self, provider: Rc<Provider>) -> bool {
        if self.is_installed(&provider) {
            log::debug!("Provider '{}' already installed", provider.name());
            return false;
        }

        if provider.priority_mode() == PriorityMode::HighestAtInstall {
            let highest = self
                .inner
                .providers
                .borrow()
                .iter()
                .map(|installed| installed.provider.priority())
                .max();
            provider.assign_priority(highest.map_or(0, |p| p.saturating_add(1)));
        }

        let sequence = self.inner.install_counter.get();
        self.inner.install_counter.set(sequence + 1);
        {
            let mut providers = self.inner.providers.borrow_mut();
            providers.push(Installed {
                provider: Rc::clone(&provider),
                sequence,
            });
            sort_providers(&mut providers);
        }

        log::info!(
            "Installed provider '{}' with priority {}",
            provider.name(),
            provider.priority()
        );
        self.inner.events.emit(RegistryEvent::ProviderInstalled {
            provider: provider.name().to_string(),
            priority: provider.priority(),
        });
        true
    }

    /// Uninstall `provider`. Uninstalling a provider that is not installed is a no-op.
    pub fn uninstall(&self, provider: &Rc<Provider>) -> bool {
        let removed = {
            let mut providers = self.inner.providers.borrow_mut();
            let before = providers.len();
            providers.retain(|installed| !Rc::ptr_eq(&installed.provider, provider));
            providers.len() < before
        };
        if !removed {
            return false;
        }

        log::info!("Uninstalled provider '{}'", provider.name());
        self.inner.events.emit(RegistryEvent::ProviderUninstalled {
            provider: provider.name().to_string(),
        });
        true
    }

    pub fn is_installed(&self, provider: &Rc<Provider>) -> bool {
        self.inner
            .providers
            .borrow()
            .iter()
            .any(|installed| Rc::ptr_eq(&installed.provider, provider))
    }

    /// Installed providers in resolution order.
    pub fn providers(&self) -> Vec<Rc<Provider>> {
        self.inner
            .providers
            .borrow()
            .iter()
            .map(|installed| Rc::clone(&installed.provider))
            .collect()
    }

    /// Give `provider` a fixed priority and re-sort.
    pub fn set_priority(&self, provider: &Rc<Provider>, priority: i32) {
        provider.set_priority_mode(PriorityMode::Fixed(priority));
        if !self.is_installed(provider) {
            return;
        }
        sort_providers(&mut self.inner.providers.borrow_mut());

        let order = self
            .providers()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        log::debug!("Provider '{}' priority set to {}", provider.name(), priority);
        self.inner
            .events
            .emit(RegistryEvent::PrioritiesChanged { order });
    }

    /// Host hook: the provider's owner became active.
    pub fn on_activate(&self, provider: Rc<Provider>) {
        self.install(provider);
    }

    /// Host hook: the provider's owner became inactive.
    pub fn on_deactivate(&self, provider: &Rc<Provider>) {
        self.uninstall(provider);
    }

    /// Host hook: the provider's owner was destroyed. Its caches go with it.
    pub fn on_destroy(&self, provider: &Rc<Provider>) {
        self.uninstall(provider);
        provider.clear_caches();
    }

    // ------------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------------

    /// First instance of `capability` carrying every tag in `tags`.
    pub fn resolve(&self, capability: &CapabilityId, tags: &[Tag]) -> Option<Facet> {
        for provider in self.providers() {
            if !provider.is_enabled() {
                continue;
            }
            for source in provider.sources(true) {
                // an initializer earlier in this pass may have uninstalled it
                if !self.is_installed(&provider) {
                    break;
                }
                if let Some(facet) = source.resolve(capability, &provider, tags, self) {
                    if self.inner.config.borrow().log_resolutions {
                        log::debug!(
                            "Resolved {} from source '{}' in provider '{}'",
                            capability,
                            source.label(),
                            provider.name()
                        );
                    }
                    return Some(facet);
                }
            }
        }
        None
    }

    /// Typed [`resolve`](Self::resolve). `None` when nothing matches.
    pub fn try_get<C: ?Sized + 'static>(&self, tags: &[Tag]) -> Option<Rc<C>> {
        self.resolve(&CapabilityId::of::<C>(), tags)
            .and_then(|facet| facet_as::<C>(&facet))
    }

    /// Typed resolve applying the configured [`MissingCapabilityPolicy`] on a miss.
    pub fn get<C: ?Sized + 'static>(&self, tags: &[Tag]) -> Result<Option<Rc<C>>> {
        if let Some(found) = self.try_get::<C>(tags) {
            return Ok(Some(found));
        }
        let capability = CapabilityId::of::<C>();
        let policy = self.inner.config.borrow().on_missing;
        match policy {
            MissingCapabilityPolicy::Silent => Ok(None),
            MissingCapabilityPolicy::Warn => {
                log::warn!(
                    "{}",
                    RegistryError::Unresolved {
                        capability: capability.name().to_string(),
                        tags: tags.to_vec(),
                    }
                );
                Ok(None)
            }
            MissingCapabilityPolicy::Error => Err(RegistryError::Unresolved {
                capability: capability.name().to_string(),
                tags: tags.to_vec(),
            }),
        }
    }

    /// Every instance of `C` carrying `tags`, in resolution order.
    ///
    /// Instantiates each matching source.
    pub fn resolve_all<C: ?Sized + 'static>(&self, tags: &[Tag]) -> Vec<Rc<C>> {
        let capability = CapabilityId::of::<C>();
        let mut found = Vec::new();
        for provider in self.providers() {
            if !provider.is_enabled() {
                continue;
            }
            for source in provider.sources(true) {
                if !self.is_installed(&provider) {
                    break;
                }
                if let Some(instance) = source
                    .resolve(&capability, &provider, tags, self)
                    .and_then(|facet| facet_as::<C>(&facet))
                {
                    found.push(instance);
                }
            }
        }
        found
    }

    /// Walk the same order as [`resolve`](Self::resolve) and report, for
    /// every source, why it would or would not be chosen. Instantiates nothing.
    pub fn explain(&self, capability: &CapabilityId, tags: &[Tag]) -> Vec<ResolutionTrace> {
        let graph = self.graph();
        let mut traces = Vec::new();
        let mut selected = false;

        for provider in self.providers() {
            for source in provider.sources(true) {
                let outcome = if !provider.is_enabled() {
                    TraceOutcome::ProviderDisabled
                } else if !source.satisfies(capability, &graph) {
                    TraceOutcome::WrongCapability
                } else {
                    let status = source.resolvability(self);
                    if !status.is_resolvable() {
                        TraceOutcome::NotResolvable(status)
                    } else if source.awaits_instance(self) {
                        TraceOutcome::Undetermined
                    } else {
                        let available = source.available_tags(self);
                        if !contains_all(&available, tags) {
                            let missing = tags
                                .iter()
                                .filter(|tag| !available.contains(tag))
                                .cloned()
                                .collect();
                            TraceOutcome::MissingTags(missing)
                        } else if selected {
                            TraceOutcome::Shadowed
                        } else {
                            selected = true;
                            TraceOutcome::Selected
                        }
                    }
                };
                traces.push(ResolutionTrace {
                    provider: provider.name().to_string(),
                    priority: provider.priority(),
                    source: source.id(),
                    label: source.label(),
                    outcome,
                });
            }
        }
        traces
    }

    // ------------------------------------------------------------------------
    // Caches and teardown
    // ------------------------------------------------------------------------

    /// Start a new resolution epoch: drop every installed source's backing object.
    pub fn clear_caches(&self) {
        for provider in self.providers() {
            provider.clear_caches();
        }
        log::debug!("Cleared all source caches");
        self.inner.events.emit(RegistryEvent::CachesCleared);
    }

    /// Host teardown: clear every cache and uninstall every provider.
    pub fn reset(&self) {
        self.clear_caches();
        for provider in self.providers() {
            self.uninstall(&provider);
        }
    }
}

fn sort_providers(providers: &mut [Installed]) {
    providers.sort_by_key(|installed| (Reverse(installed.provider.priority()), installed.sequence));
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .providers()
            .iter()
            .map(|p| format!("{}({})", p.name(), p.priority()))
            .collect();
        f.debug_struct("Environment")
            .field("providers", &names)
            .field("types", &self.inner.universe.borrow().len())
            .field("config", &self.inner.config.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::{Condition, Toggle};
    use crate::groups::SourceGroup;
    use crate::host::{HostObject, StandaloneHost};
    use crate::sources::{ExtraTypeStatus, Initialize, Origin, OriginKind, Source};
    use crate::tags::TagContributor;
    use std::rc::Weak;

    trait Logger {
        fn label(&self) -> String;
    }

    trait Clock {
        fn now(&self) -> u64;
    }

    #[derive(Clone, Default)]
    struct ConsoleLogger {
        label: String,
    }
    impl Logger for ConsoleLogger {
        fn label(&self) -> String {
            self.label.clone()
        }
    }

    #[derive(Clone, Default)]
    struct FixedClock(u64);
    impl Clock for FixedClock {
        fn now(&self) -> u64 {
            self.0
        }
    }

    struct GatedClock {
        open: Rc<Cell<bool>>,
    }
    impl Clock for GatedClock {
        fn now(&self) -> u64 {
            42
        }
    }
    impl Condition for GatedClock {
        fn can_resolve(&self) -> bool {
            self.open.get()
        }
        fn reason(&self) -> Option<String> {
            Some("gate closed".to_string())
        }
    }

    #[derive(Clone)]
    struct RemoteLogger;
    impl Logger for RemoteLogger {
        fn label(&self) -> String {
            "remote".to_string()
        }
    }
    impl TagContributor for RemoteLogger {
        fn tags(&self) -> Vec<Tag> {
            vec![Tag::text("remote")]
        }
    }

    /// Constructed clock that always blocks itself.
    #[derive(Clone, Default)]
    struct ClosedClock {
        initialized: Rc<Cell<bool>>,
    }
    impl Clock for ClosedClock {
        fn now(&self) -> u64 {
            77
        }
    }
    impl Condition for ClosedClock {
        fn can_resolve(&self) -> bool {
            false
        }
        fn reason(&self) -> Option<String> {
            Some("closed".to_string())
        }
    }
    impl Initialize for ClosedClock {
        fn initialize(&self, _env: &Environment) {
            self.initialized.set(true);
        }
    }

    /// Constructed clock that tags itself.
    #[derive(Clone, Default)]
    struct TaggedClock;
    impl Clock for TaggedClock {
        fn now(&self) -> u64 {
            88
        }
    }
    impl TagContributor for TaggedClock {
        fn tags(&self) -> Vec<Tag> {
            vec![Tag::text("utc")]
        }
    }

    /// Uninstalls its own provider when first selected.
    #[derive(Clone)]
    struct Quitter {
        provider: Weak<Provider>,
    }
    impl Logger for Quitter {
        fn label(&self) -> String {
            "quitter".to_string()
        }
    }
    impl Initialize for Quitter {
        fn initialize(&self, env: &Environment) {
            if let Some(provider) = self.provider.upgrade() {
                env.uninstall(&provider);
            }
        }
    }

    /// Installs another provider when first created.
    #[derive(Clone)]
    struct Bootstrap {
        extra: Rc<Provider>,
    }
    impl Logger for Bootstrap {
        fn label(&self) -> String {
            "bootstrap".to_string()
        }
    }
    impl Initialize for Bootstrap {
        fn initialize(&self, env: &Environment) {
            env.install(Rc::clone(&self.extra));
        }
    }

    /// Resolves its own capability while being initialized.
    #[derive(Clone)]
    struct SelfResolving {
        seen: Rc<Cell<bool>>,
    }
    impl Logger for SelfResolving {
        fn label(&self) -> String {
            "self".to_string()
        }
    }
    impl Initialize for SelfResolving {
        fn initialize(&self, env: &Environment) {
            self.seen.set(env.try_get::<dyn Logger>(&[]).is_some());
        }
    }

    fn register_clock(universe: &mut TypeUniverse) {
        universe.capability::<dyn Clock>();
        universe
            .concrete::<FixedClock>("FixedClock")
            .implements::<dyn Clock>(|c| c as Rc<dyn Clock>)
            .constructor(FixedClock::default)
            .register();
    }

    fn universe() -> TypeUniverse {
        let mut universe = TypeUniverse::new();
        universe.capability::<dyn Logger>();
        register_clock(&mut universe);
        universe
            .concrete::<ConsoleLogger>("ConsoleLogger")
            .implements::<dyn Logger>(|l| l as Rc<dyn Logger>)
            .constructor(ConsoleLogger::default)
            .register();
        universe
            .concrete::<GatedClock>("GatedClock")
            .implements::<dyn Clock>(|c| c as Rc<dyn Clock>)
            .implements::<dyn Condition>(|c| c as Rc<dyn Condition>)
            .register();
        universe
            .concrete::<RemoteLogger>("RemoteLogger")
            .implements::<dyn Logger>(|l| l as Rc<dyn Logger>)
            .implements::<dyn TagContributor>(|l| l as Rc<dyn TagContributor>)
            .register();
        universe
            .concrete::<ClosedClock>("ClosedClock")
            .implements::<dyn Clock>(|c| c as Rc<dyn Clock>)
            .implements::<dyn Condition>(|c| c as Rc<dyn Condition>)
            .implements::<dyn Initialize>(|c| c as Rc<dyn Initialize>)
            .constructor(ClosedClock::default)
            .register();
        universe
            .concrete::<TaggedClock>("TaggedClock")
            .implements::<dyn Clock>(|c| c as Rc<dyn Clock>)
            .implements::<dyn TagContributor>(|c| c as Rc<dyn TagContributor>)
            .constructor(TaggedClock::default)
            .register();
        universe
            .concrete::<Quitter>("Quitter")
            .implements::<dyn Logger>(|l| l as Rc<dyn Logger>)
            .implements::<dyn Initialize>(|l| l as Rc<dyn Initialize>)
            .register();
        universe
            .concrete::<Bootstrap>("Bootstrap")
            .implements::<dyn Logger>(|l| l as Rc<dyn Logger>)
            .implements::<dyn Initialize>(|l| l as Rc<dyn Initialize>)
            .register();
        universe
            .concrete::<SelfResolving>("SelfResolving")
            .implements::<dyn Logger>(|l| l as Rc<dyn Logger>)
            .implements::<dyn Initialize>(|l| l as Rc<dyn Initialize>)
            .register();
        universe
    }

    fn setup() -> (Environment, Rc<StandaloneHost>) {
        let _ = env_logger::builder().is_test(true).try_init();
        let host = Rc::new(StandaloneHost::new());
        let env = Environment::builder()
            .universe(universe())
            .host(Rc::clone(&host))
            .build();
        (env, host)
    }

    fn logger_template(label: &str) -> HostObject {
        HostObject::template(
            label,
            ConsoleLogger {
                label: label.to_string(),
            },
        )
    }

    fn clock_provider(name: &str, priority: Option<i32>, now: u64) -> Rc<Provider> {
        let mut provider = Provider::new(name);
        if let Some(priority) = priority {
            provider = provider.with_priority(priority);
        }
        provider.add_source(Source::from_object(HostObject::live(
            format!("{}-clock", name),
            FixedClock(now),
        )));
        Rc::new(provider)
    }

    fn now(env: &Environment) -> Option<u64> {
        env.try_get::<dyn Clock>(&[]).map(|clock| clock.now())
    }

    // ------------------------------------------------------------------------
    // Caching
    // ------------------------------------------------------------------------

    #[test]
    fn test_clone_source_resolves_same_instance_twice() {
        let (env, host) = setup();
        let provider = Rc::new(Provider::new("logging"));
        let source = provider.add_source(Source::from_object(logger_template("console")));
        env.install(Rc::clone(&provider));

        let first = env.try_get::<dyn Logger>(&[]).unwrap();
        let second = env.try_get::<dyn Logger>(&[]).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(first.label(), "console");
        assert_eq!(host.created_count(), 1);

        let backing = source.backing_object().unwrap();
        assert_eq!(backing.parent(), Some(provider.attachment_scope()));
        assert_eq!(host.attached_to(&provider.attachment_scope()), vec![backing.id()]);
        assert_eq!(source.actual_kind(), Some(OriginKind::CloneTemplate));
    }

    #[test]
    fn test_clear_caches_starts_new_epoch() {
        let (env, host) = setup();
        let provider = Rc::new(Provider::new("logging"));
        provider.add_source(Source::from_object(logger_template("console")));
        env.install(provider);

        let first = env.try_get::<dyn Logger>(&[]).unwrap();
        env.clear_caches();
        let second = env.try_get::<dyn Logger>(&[]).unwrap();
        assert!(!Rc::ptr_eq(&first, &second));
        assert_eq!(host.created_count(), 2);
    }

    #[test]
    fn test_destroyed_backing_object_is_recreated() {
        let (env, host) = setup();
        let provider = Rc::new(Provider::new("logging"));
        let source = provider.add_source(Source::from_object(logger_template("console")));
        env.install(provider);

        env.try_get::<dyn Logger>(&[]).unwrap();
        let first = source.backing_object().unwrap();
        first.destroy();

        assert!(env.try_get::<dyn Logger>(&[]).is_some());
        let second = source.backing_object().unwrap();
        assert!(!first.ptr_eq(&second));
        assert_eq!(host.created_count(), 2);
    }

    #[test]
    fn test_set_origin_drops_cache() {
        let (env, _host) = setup();
        let provider = Rc::new(Provider::new("logging"));
        let source = provider.add_source(Source::from_object(logger_template("console")));
        env.install(provider);

        env.try_get::<dyn Logger>(&[]).unwrap();
        assert!(source.is_instantiated());

        source.set_origin(Origin::Object(logger_template("file")));
        assert!(!source.is_instantiated());
        assert_eq!(env.try_get::<dyn Logger>(&[]).unwrap().label(), "file");
    }

    #[test]
    fn test_preferred_kind_change_drops_cache() {
        let (env, host) = setup();
        let provider = Rc::new(Provider::new("logging"));
        let template = logger_template("console");
        let source = provider.add_source(Source::from_object(template.clone()));
        env.install(provider);

        env.try_get::<dyn Logger>(&[]).unwrap();
        source.set_preferred_kind(Some(OriginKind::ReturnFile));
        assert!(!source.is_instantiated());

        env.try_get::<dyn Logger>(&[]).unwrap();
        assert!(source.backing_object().unwrap().ptr_eq(&template));
        assert_eq!(host.created_count(), 1);
    }

    // ------------------------------------------------------------------------
    // Origin kinds
    // ------------------------------------------------------------------------

    #[test]
    fn test_construct_type_source() {
        let (env, host) = setup();
        let provider = Rc::new(Provider::scene("clocks", "level-1"));
        let source = provider.add_source(Source::from_type::<FixedClock>());
        env.install(Rc::clone(&provider));

        assert_eq!(now(&env), Some(0));
        assert_eq!(host.created_count(), 1);
        let backing = source.backing_object().unwrap();
        assert_eq!(backing.parent().unwrap().scene.as_deref(), Some("level-1"));
    }

    #[test]
    fn test_unknown_type_name_is_error() {
        let (env, _host) = setup();
        let provider = Rc::new(Provider::new("clocks"));
        let source = provider.add_source(Source::from_type_name("Sundial"));
        env.install(provider);

        assert!(matches!(source.resolvability(&env), Resolvability::Error(_)));
        assert!(source.capability_types(&env.graph()).is_empty());
        assert_eq!(now(&env), None);
    }

    #[test]
    fn test_missing_origin_is_error() {
        let (env, _host) = setup();
        let source = Source::new(Origin::Missing);
        assert_eq!(
            source.resolvability(&env),
            Resolvability::Error("missing origin reference".to_string())
        );
        assert_eq!(source.actual_kind(), None);
    }

    #[test]
    fn test_clone_blocked_until_runtime() {
        let host = Rc::new(StandaloneHost::authoring());
        let env = Environment::builder()
            .universe(universe())
            .host(Rc::clone(&host))
            .build();
        let provider = Rc::new(Provider::new("logging"));
        let source = provider.add_source(Source::from_object(logger_template("console")));
        env.install(provider);

        assert!(matches!(source.resolvability(&env), Resolvability::Blocked(_)));
        assert!(env.try_get::<dyn Logger>(&[]).is_none());

        host.set_runtime(true);
        assert!(env.try_get::<dyn Logger>(&[]).is_some());
    }

    #[test]
    fn test_return_file_uses_asset() {
        let (env, host) = setup();
        let file = HostObject::asset("settings", ConsoleLogger::default());
        let provider = Rc::new(Provider::new("files"));
        let source = provider.add_source(Source::from_object(file.clone()).with_kind(OriginKind::ReturnFile));
        env.install(provider);

        assert_eq!(source.resolvability(&env), Resolvability::AlwaysResolved);
        assert!(env.try_get::<dyn Logger>(&[]).is_some());
        assert!(source.backing_object().unwrap().ptr_eq(&file));
        assert_eq!(host.created_count(), 0);
    }

    #[test]
    fn test_live_instance_gone() {
        let (env, _host) = setup();
        let provider = clock_provider("p", None, 9);
        env.install(Rc::clone(&provider));
        assert_eq!(now(&env), Some(9));

        let source = Rc::clone(&provider.sources(true)[0]);
        source.backing_object().unwrap().destroy();
        assert!(matches!(source.resolvability(&env), Resolvability::Error(_)));
        assert_eq!(now(&env), None);
    }

    // ------------------------------------------------------------------------
    // Priority
    // ------------------------------------------------------------------------

    #[test]
    fn test_higher_priority_provider_wins() {
        let (env, _host) = setup();
        let p1 = clock_provider("p1", Some(10), 1);
        let p2 = clock_provider("p2", Some(5), 2);
        env.install(Rc::clone(&p2));
        env.install(Rc::clone(&p1));
        assert_eq!(now(&env), Some(1));
    }

    #[test]
    fn test_last_installed_wins_until_fixed() {
        let (env, _host) = setup();
        let a = clock_provider("a", None, 1);
        let b = clock_provider("b", None, 2);
        env.install(Rc::clone(&a));
        env.install(Rc::clone(&b));
        assert_eq!(a.priority(), 0);
        assert_eq!(b.priority(), 1);
        assert_eq!(now(&env), Some(2));

        env.set_priority(&a, 100);
        assert_eq!(a.priority_mode(), PriorityMode::Fixed(100));
        assert_eq!(now(&env), Some(1));
        let names: Vec<String> = env.providers().iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_equal_priority_keeps_install_order() {
        let (env, _host) = setup();
        let first = clock_provider("first", Some(5), 1);
        let second = clock_provider("second", Some(5), 2);
        env.install(first);
        env.install(second);
        assert_eq!(now(&env), Some(1));
    }

    #[test]
    fn test_declaration_order_within_provider() {
        let (env, _host) = setup();
        let provider = Rc::new(Provider::new("clocks"));
        let nested = Rc::new(SourceGroup::new("nested"));
        nested.add_source(Source::from_object(HostObject::live("n", FixedClock(2))));
        provider.group().add_nested(nested).unwrap();
        provider.add_source(Source::from_object(HostObject::live("late", FixedClock(3))));
        env.install(provider);

        assert_eq!(now(&env), Some(2));
        let all: Vec<u64> = env.resolve_all::<dyn Clock>(&[]).iter().map(|c| c.now()).collect();
        assert_eq!(all, vec![2, 3]);
    }

    #[test]
    fn test_install_and_uninstall_are_idempotent() {
        let (env, _host) = setup();
        let provider = clock_provider("p", None, 1);
        assert!(env.install(Rc::clone(&provider)));
        assert!(!env.install(Rc::clone(&provider)));
        assert_eq!(env.providers().len(), 1);

        assert!(env.uninstall(&provider));
        assert!(!env.uninstall(&provider));
        assert!(env.providers().is_empty());
        assert_eq!(now(&env), None);
    }

    #[test]
    fn test_disabled_provider_and_source_skipped() {
        let (env, _host) = setup();
        let high = clock_provider("high", Some(10), 1);
        let low = clock_provider("low", Some(1), 2);
        env.install(Rc::clone(&high));
        env.install(low);

        high.set_enabled(false);
        assert_eq!(now(&env), Some(2));
        high.set_enabled(true);
        high.sources(true)[0].set_enabled(false);
        assert_eq!(now(&env), Some(2));
    }

    #[test]
    fn test_standalone_group_resolved_once() {
        let (env, _host) = setup();
        let shared = Rc::new(SourceGroup::new("shared"));
        shared.add_source(Source::from_object(HostObject::live("shared", FixedClock(7))));

        let outer = Rc::new(Provider::new("outer"));
        outer.group().add_nested(Rc::clone(&shared)).unwrap();
        env.install(outer);
        env.install(Rc::new(Provider::from_group(shared)));

        assert_eq!(env.resolve_all::<dyn Clock>(&[]).len(), 1);
    }

    // ------------------------------------------------------------------------
    // Tags and conditions
    // ------------------------------------------------------------------------

    #[test]
    fn test_tags_must_be_subset() {
        let (env, _host) = setup();
        let provider = Rc::new(Provider::new("logging"));
        provider.add_source(Source::from_object(logger_template("console")).with_tags(["debug", "verbose"]));
        env.install(provider);

        assert!(env.try_get::<dyn Logger>(&[Tag::text("debug")]).is_some());
        assert!(env
            .try_get::<dyn Logger>(&[Tag::text("verbose"), Tag::text("debug")])
            .is_some());
        assert!(env
            .try_get::<dyn Logger>(&[Tag::text("debug"), Tag::text("release")])
            .is_none());
        assert!(env.try_get::<dyn Logger>(&[Tag::text("Debug")]).is_none());
    }

    #[test]
    fn test_contributed_tags() {
        let (env, _host) = setup();
        let provider = Rc::new(Provider::new("logging"));
        let source = provider.add_source(Source::from_object(HostObject::template("remote", RemoteLogger)));
        env.install(provider);

        assert_eq!(source.available_tags(&env), vec![Tag::text("remote")]);
        let logger = env.try_get::<dyn Logger>(&[Tag::text("remote")]).unwrap();
        assert_eq!(logger.label(), "remote");
    }

    #[test]
    fn test_attached_condition_gates_resolution() {
        let (env, _host) = setup();
        let online = Toggle::new(false, "offline");
        let provider = Rc::new(Provider::new("clocks"));
        let source = provider.add_source(
            Source::from_object(HostObject::live("clock", FixedClock(5)))
                .with_condition(Rc::clone(&online) as Rc<dyn Condition>),
        );
        env.install(provider);

        assert_eq!(source.resolvability(&env), Resolvability::Blocked("offline".to_string()));
        assert_eq!(now(&env), None);

        online.set(true);
        assert_eq!(now(&env), Some(5));
    }

    #[test]
    fn test_condition_discovered_on_object() {
        let (env, _host) = setup();
        let open = Rc::new(Cell::new(false));
        let provider = Rc::new(Provider::new("clocks"));
        provider.add_source(Source::from_object(HostObject::live(
            "gated",
            GatedClock {
                open: Rc::clone(&open),
            },
        )));
        env.install(provider);

        assert_eq!(now(&env), None);
        open.set(true);
        assert_eq!(now(&env), Some(42));
    }

    #[test]
    fn test_constructed_condition_blocks_first_resolve() {
        let (env, host) = setup();
        let provider = Rc::new(Provider::new("clocks"));
        let source = provider.add_source(Source::from_type::<ClosedClock>());
        env.install(provider);

        assert_eq!(now(&env), None);
        assert_eq!(now(&env), None);
        assert_eq!(host.created_count(), 1);
        assert!(source.is_instantiated());
        assert_eq!(source.resolvability(&env), Resolvability::Blocked("closed".to_string()));

        let backing = source.backing_object().unwrap();
        let clock = backing.downcast_ref::<ClosedClock>().unwrap();
        assert!(!clock.initialized.get());
    }

    #[test]
    fn test_constructed_tags_do_not_depend_on_call_history() {
        let (env, host) = setup();
        let provider = Rc::new(Provider::new("clocks"));
        provider.add_source(Source::from_type::<TaggedClock>());
        env.install(provider);

        let utc = [Tag::text("utc")];
        let traces = env.explain(&CapabilityId::of::<dyn Clock>(), &utc);
        assert_eq!(traces[0].outcome, TraceOutcome::Undetermined);
        assert_eq!(host.created_count(), 0);

        let tagged = |env: &Environment| env.try_get::<dyn Clock>(&utc).map(|c| c.now());
        assert_eq!(tagged(&env), Some(88));
        assert_eq!(now(&env), Some(88));
        assert_eq!(tagged(&env), Some(88));
        assert!(env.try_get::<dyn Clock>(&[Tag::text("local")]).is_none());
        assert_eq!(host.created_count(), 1);

        let traces = env.explain(&CapabilityId::of::<dyn Clock>(), &utc);
        assert_eq!(traces[0].outcome, TraceOutcome::Selected);
    }

    #[test]
    fn test_extra_types() {
        let (env, _host) = setup();
        let provider = Rc::new(Provider::new("logging"));
        let source = provider.add_source(
            Source::from_object(logger_template("console"))
                .with_extra_type::<ConsoleLogger>()
                .with_extra_type::<dyn Clock>(),
        );
        env.install(provider);

        let graph = env.graph();
        assert_eq!(
            source.extra_type_report(&graph),
            vec![
                (CapabilityId::of::<ConsoleLogger>(), ExtraTypeStatus::Valid),
                (CapabilityId::of::<dyn Clock>(), ExtraTypeStatus::Dangling),
            ]
        );
        assert!(source.satisfies(&CapabilityId::of::<ConsoleLogger>(), &graph));
        assert!(!source.satisfies(&CapabilityId::of::<dyn Clock>(), &graph));

        let concrete = env.try_get::<ConsoleLogger>(&[]).unwrap();
        let logger = env.try_get::<dyn Logger>(&[]).unwrap();
        assert_eq!(concrete.label, logger.label());
        assert_eq!(now(&env), None);
    }

    // ------------------------------------------------------------------------
    // Reentrancy
    // ------------------------------------------------------------------------

    #[test]
    fn test_initializer_installs_provider() {
        let (env, _host) = setup();
        let extra = clock_provider("extra", None, 3);
        let core = Rc::new(Provider::new("core"));
        core.add_source(Source::from_object(HostObject::template(
            "bootstrap",
            Bootstrap {
                extra: Rc::clone(&extra),
            },
        )));
        env.install(core);

        assert_eq!(now(&env), None);
        assert_eq!(env.try_get::<dyn Logger>(&[]).unwrap().label(), "bootstrap");
        assert!(env.is_installed(&extra));
        assert_eq!(now(&env), Some(3));
    }

    #[test]
    fn test_initializer_resolving_itself_reuses_backing_object() {
        let (env, host) = setup();
        let seen = Rc::new(Cell::new(false));
        let provider = Rc::new(Provider::new("core"));
        provider.add_source(Source::from_object(HostObject::template(
            "self",
            SelfResolving {
                seen: Rc::clone(&seen),
            },
        )));
        env.install(provider);

        assert!(env.try_get::<dyn Logger>(&[]).is_some());
        assert!(seen.get());
        assert_eq!(host.created_count(), 1);
    }

    #[test]
    fn test_provider_uninstalled_mid_pass_stops_its_sources() {
        let (env, _host) = setup();
        let provider = Rc::new(Provider::new("core"));
        provider.add_source(Source::from_object(HostObject::template(
            "quitter",
            Quitter {
                provider: Rc::downgrade(&provider),
            },
        )));
        provider.add_source(Source::from_object(logger_template("console")));
        env.install(Rc::clone(&provider));

        let labels: Vec<String> = env
            .resolve_all::<dyn Logger>(&[])
            .iter()
            .map(|logger| logger.label())
            .collect();
        assert_eq!(labels, vec!["quitter".to_string()]);
        assert!(!env.is_installed(&provider));
    }

    // ------------------------------------------------------------------------
    // Policies, diagnostics, events
    // ------------------------------------------------------------------------

    #[test]
    fn test_missing_capability_policies() {
        let (env, _host) = setup();
        assert!(env.get::<dyn Clock>(&[]).unwrap().is_none());

        env.set_config(RegistryConfig::with_policy(MissingCapabilityPolicy::Silent));
        assert!(env.get::<dyn Clock>(&[]).unwrap().is_none());

        env.set_config(RegistryConfig::with_policy(MissingCapabilityPolicy::Error));
        let Err(err) = env.get::<dyn Clock>(&[Tag::text("utc")]) else {
            panic!("a miss under the error policy must fail");
        };
        assert_eq!(
            err.to_string(),
            "No source can resolve capability Clock with tags [utc]"
        );

        env.install(clock_provider("p", None, 1));
        assert_eq!(env.get::<dyn Clock>(&[]).unwrap().map(|c| c.now()), Some(1));
    }

    #[test]
    fn test_explain_reports_each_source() {
        let (env, host) = setup();
        let high = Rc::new(Provider::new("high").with_priority(10));
        high.add_source(Source::from_object(HostObject::live("release", FixedClock(1))).with_tag("release"));
        let console = high.add_source(Source::from_object(logger_template("console")));
        let low = Rc::new(Provider::new("low").with_priority(5));
        low.add_source(Source::from_object(HostObject::live("a", FixedClock(2))).with_tag("debug"));
        low.add_source(Source::from_object(HostObject::live("b", FixedClock(3))).with_tag("debug"));
        env.install(high);
        env.install(low);

        let outcomes: Vec<TraceOutcome> = env
            .explain(&CapabilityId::of::<dyn Clock>(), &[Tag::text("debug")])
            .into_iter()
            .map(|trace| trace.outcome)
            .collect();
        assert_eq!(
            outcomes,
            vec![
                TraceOutcome::MissingTags(vec![Tag::text("debug")]),
                TraceOutcome::WrongCapability,
                TraceOutcome::Selected,
                TraceOutcome::Shadowed,
            ]
        );
        assert!(!console.is_instantiated());
        assert_eq!(host.created_count(), 0);
    }

    #[test]
    fn test_events_published() {
        let (env, _host) = setup();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        env.events()
            .subscribe("inspector", move |e| sink.borrow_mut().push(e.event.event_type()));

        let provider = Rc::new(Provider::new("logging"));
        provider.add_source(Source::from_object(logger_template("console")));
        env.install(Rc::clone(&provider));
        env.try_get::<dyn Logger>(&[]).unwrap();
        env.try_get::<dyn Logger>(&[]).unwrap();
        env.set_priority(&provider, 3);
        env.clear_caches();
        env.uninstall(&provider);

        assert_eq!(
            *seen.borrow(),
            vec![
                "provider_installed",
                "backing_object_created",
                "priorities_changed",
                "caches_cleared",
                "provider_uninstalled",
            ]
        );
    }

    #[test]
    fn test_register_types_rebuilds_graph() {
        let env = Environment::new(TypeUniverse::new());
        let provider = Rc::new(Provider::new("clocks"));
        provider.add_source(Source::from_type::<FixedClock>());
        env.install(provider);
        assert_eq!(now(&env), None);

        let before = env.graph();
        env.register_types(register_clock);
        assert_eq!(before.type_count(), 0);
        assert_eq!(env.graph().type_count(), 1);
        assert_eq!(now(&env), Some(0));
    }

    #[test]
    fn test_on_destroy_and_reset() {
        let (env, _host) = setup();
        let logging = Rc::new(Provider::new("logging"));
        let source = logging.add_source(Source::from_object(logger_template("console")));
        let clocks = clock_provider("clocks", None, 1);

        env.on_activate(Rc::clone(&logging));
        env.on_activate(Rc::clone(&clocks));
        env.try_get::<dyn Logger>(&[]).unwrap();

        env.on_deactivate(&logging);
        assert!(source.is_instantiated());
        env.on_activate(Rc::clone(&logging));
        env.on_destroy(&logging);
        assert!(!source.is_instantiated());
        assert!(!env.is_installed(&logging));

        env.reset();
        assert!(env.providers().is_empty());
    }
}
