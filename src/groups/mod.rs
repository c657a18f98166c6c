//! # Composite Source Groups
//!
//! A [`SourceGroup`] is a named, ordered list of sources and nested groups.
//! Flattening walks the list in order and splices nested groups in place, so
//! declaration order is preserved across any nesting depth.
//!
//! Two guards keep the structure well-formed:
//!
//! - [`SourceGroup::add_nested`] refuses a group when either group already
//!   reaches the other ([`is_circular`]), before the reference is stored.
//! - A group marked *standalone* is installed as its own provider, so it is
//!   skipped when it appears nested inside another group.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use uuid::Uuid;

use crate::errors::{RegistryError, Result};
use crate::sources::Source;

/// One entry in a group.
#[derive(Clone)]
pub enum GroupEntry {
    Source(Rc<Source>),
    Nested(Rc<SourceGroup>),
}

/// Named ordered collection of sources and nested groups.
pub struct SourceGroup {
    id: Uuid,
    name: String,
    entries: RefCell<Vec<GroupEntry>>,
    standalone: Cell<bool>,
}

impl SourceGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            entries: RefCell::new(Vec::new()),
            standalone: Cell::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this group acts as its own root-level provider.
    pub fn is_standalone(&self) -> bool {
        self.standalone.get()
    }

    pub fn set_standalone(&self, standalone: bool) {
        self.standalone.set(standalone);
    }

    /// Append a source and return the shared handle.
    pub fn add_source(&self, source: Source) -> Rc<Source> {
        let source = Rc::new(source);
        self.push_source(Rc::clone(&source));
        source
    }

    pub fn push_source(&self, source: Rc<Source>) {
        self.entries.borrow_mut().push(GroupEntry::Source(source));
    }

    /// Remove a source. Its cached backing object is dropped with it.
    pub fn remove_source(&self, source: &Rc<Source>) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|entry| !matches!(entry, GroupEntry::Source(s) if Rc::ptr_eq(s, source)));
        let removed = entries.len() < before;
        drop(entries);
        if removed {
            source.clear_cache();
        }
        removed
    }

    /// Nest `group` at the end of this group's entries.
    pub fn add_nested(&self, group: Rc<SourceGroup>) -> Result<()> {
        if group.id == self.id {
            return Err(RegistryError::SelfReference(self.name.clone()));
        }
        if is_circular(self, &group) {
            return Err(RegistryError::CircularGroup {
                parent: self.name.clone(),
                child: group.name.clone(),
            });
        }
        self.entries.borrow_mut().push(GroupEntry::Nested(group));
        Ok(())
    }

    pub fn remove_nested(&self, group: &Rc<SourceGroup>) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|entry| !matches!(entry, GroupEntry::Nested(g) if g.id == group.id));
        entries.len() < before
    }

    /// Snapshot of the direct entries.
    pub fn entries(&self) -> Vec<GroupEntry> {
        self.entries.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Whether `other` is reachable from this group through nesting.
    pub fn contains(&self, other: &SourceGroup) -> bool {
        let mut visited = HashSet::new();
        self.reaches(other.id, &mut visited)
    }

    fn reaches(&self, target: Uuid, visited: &mut HashSet<Uuid>) -> bool {
        if !visited.insert(self.id) {
            return false;
        }
        self.entries().iter().any(|entry| match entry {
            GroupEntry::Nested(group) => group.id == target || group.reaches(target, visited),
            GroupEntry::Source(_) => false,
        })
    }

    /// All sources in declaration order with nested groups spliced in place.
    ///
    /// Standalone nested groups are skipped; each group is visited at most once.
    pub fn flatten(&self, enabled_only: bool) -> Vec<Rc<Source>> {
        let mut sources = Vec::new();
        let mut visited = HashSet::new();
        self.flatten_into(enabled_only, &mut visited, &mut sources);
        sources
    }

    fn flatten_into(&self, enabled_only: bool, visited: &mut HashSet<Uuid>, out: &mut Vec<Rc<Source>>) {
        if !visited.insert(self.id) {
            log::warn!("Group '{}' reached twice while flattening; skipping", self.name);
            return;
        }
        for entry in self.entries() {
            match entry {
                GroupEntry::Source(source) => {
                    if !enabled_only || source.is_enabled() {
                        out.push(source);
                    }
                }
                GroupEntry::Nested(group) => {
                    if group.is_standalone() {
                        continue;
                    }
                    group.flatten_into(enabled_only, visited, out);
                }
            }
        }
    }
}

impl fmt::Debug for SourceGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceGroup")
            .field("name", &self.name)
            .field("entries", &self.len())
            .field("standalone", &self.standalone.get())
            .finish()
    }
}

/// True when `a` and `b` are the same group or either reaches the other.
pub fn is_circular(a: &SourceGroup, b: &SourceGroup) -> bool {
    a.id == b.id || a.contains(b) || b.contains(a)
}
