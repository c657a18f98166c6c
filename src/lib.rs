//! # capreg
//!
//! A runtime capability-resolution registry. Callers ask for an abstract
//! capability type (usually `dyn Trait`), optionally filtered by tags, and get
//! back an instance from the highest-priority installed provider that can
//! produce one.
//!
//! - [`universe`]: explicitly registered types and the traits they implement.
//! - [`graph`]: the concrete type ↔ capability type graph, built once.
//! - [`sources`]: one way to obtain an instance (clone a template, return a
//!   file, return a live object, construct a type) with its cached backing object.
//! - [`groups`]: nested, ordered collections of sources.
//! - [`providers`]: prioritized, installable root groups.
//! - [`environment`]: the registry itself, plus the process-wide context.
//! - [`conditions`] and [`tags`]: runtime gating and subset-match filtering.
//! - [`host`]: the object-model operations the registry consumes.
//! - [`events`]: change notification for inspection tooling.
//! - [`config`]: failure policy and authored provider manifests.
//!
//! ```rust
//! use std::rc::Rc;
//! use capreg::{Environment, HostObject, Provider, Source, TypeUniverse};
//!
//! trait Logger {
//!     fn line(&self, text: &str) -> String;
//! }
//!
//! #[derive(Clone)]
//! struct ConsoleLogger;
//! impl Logger for ConsoleLogger {
//!     fn line(&self, text: &str) -> String {
//!         format!("[console] {}", text)
//!     }
//! }
//!
//! let mut universe = TypeUniverse::new();
//! universe.capability::<dyn Logger>();
//! universe
//!     .concrete::<ConsoleLogger>("ConsoleLogger")
//!     .implements::<dyn Logger>(|c| c as Rc<dyn Logger>)
//!     .register();
//!
//! let env = Environment::new(universe);
//! let provider = Rc::new(Provider::new("logging"));
//! provider.add_source(Source::from_object(HostObject::template("console", ConsoleLogger)));
//! env.install(provider);
//!
//! let logger = env.try_get::<dyn Logger>(&[]).unwrap();
//! assert_eq!(logger.line("ready"), "[console] ready");
//! ```

pub mod conditions;
pub mod config;
pub mod environment;
pub mod errors;
pub mod events;
pub mod graph;
pub mod groups;
pub mod host;
pub mod providers;
pub mod sources;
pub mod tags;
pub mod universe;

pub use conditions::{Condition, FnCondition, Toggle};
pub use config::{MissingCapabilityPolicy, ProviderManifest, RegistryConfig};
pub use environment::{Environment, EnvironmentBuilder, ResolutionTrace, TraceOutcome};
pub use errors::{ConfigError, HostError, RegistryError, Result};
pub use events::{EmittedEvent, EventBus, RegistryEvent};
pub use graph::CapabilityGraph;
pub use groups::SourceGroup;
pub use host::{HostObject, HostObjectModel, Scope, StandaloneHost};
pub use providers::{PriorityMode, Provider, ProviderScope};
pub use sources::{Initialize, Origin, OriginKind, Resolvability, Source};
pub use tags::{Tag, TagContributor};
pub use universe::{CapabilityId, TypeKey, TypeUniverse};
