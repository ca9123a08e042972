//! Single-active behavior registry with temporary overlay and restore

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, error, warn};

use super::{Behavior, Mode, ModeId};
use crate::error::SurfaceError;

/// Change listener: (previously shown id, newly shown id)
pub type Listener<Id> = Box<dyn FnMut(Option<&Id>, &Id) + Send>;

/// Resulting state after a change, used to mirror it onto sibling surfaces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeChange<Id = ModeId> {
    pub active: Option<Id>,
    pub temporary: Option<Id>,
}

/// Registry of behaviors with one active entry
///
/// At most one behavior is active and at most one temporary behavior
/// shadows it. Feedback always reads through [`active_or_temp`].
///
/// [`active_or_temp`]: BehaviorManager::active_or_temp
pub struct BehaviorManager<Id, B: ?Sized> {
    kind: &'static str,
    registry: BTreeMap<Id, Box<B>>,
    active: Option<Id>,
    temporary: Option<Id>,
    previous: Option<Id>,
    listeners: Vec<Listener<Id>>,
    /// `None` when changes are not mirrored anywhere
    journal: Option<Vec<ModeChange<Id>>>,
}

/// Mode registry of one surface
pub type ModeManager = BehaviorManager<ModeId, dyn Mode>;

impl<Id, B> BehaviorManager<Id, B>
where
    Id: Clone + Ord + fmt::Display,
    B: ?Sized + Behavior,
{
    /// `kind` names the behavior family in logs ("mode", "view")
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            registry: BTreeMap::new(),
            active: None,
            temporary: None,
            previous: None,
            listeners: Vec::new(),
            journal: Some(Vec::new()),
        }
    }

    /// Registry whose changes are never mirrored to other surfaces
    pub fn untracked(kind: &'static str) -> Self {
        Self {
            journal: None,
            ..Self::new(kind)
        }
    }

    /// Register a behavior; replaces any behavior with the same id
    pub fn register(&mut self, id: Id, behavior: Box<B>) {
        if self.registry.insert(id.clone(), behavior).is_some() {
            warn!("Replacing registered {} '{}'", self.kind, id);
        }
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.registry.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &Id> {
        self.registry.keys()
    }

    pub fn get(&self, id: &Id) -> Option<&B> {
        self.registry.get(id).map(|b| b.as_ref())
    }

    pub fn get_mut(&mut self, id: &Id) -> Option<&mut B> {
        self.registry.get_mut(id).map(|b| b.as_mut())
    }

    pub fn active(&self) -> Option<&Id> {
        self.active.as_ref()
    }

    pub fn temporary(&self) -> Option<&Id> {
        self.temporary.as_ref()
    }

    pub fn previous(&self) -> Option<&Id> {
        self.previous.as_ref()
    }

    /// Temporary id if any, else the active id
    pub fn active_or_temp(&self) -> Option<&Id> {
        self.temporary.as_ref().or(self.active.as_ref())
    }

    /// Behavior currently shown
    pub fn current(&self) -> Option<&B> {
        let id = self.active_or_temp()?;
        self.get(id)
    }

    pub fn current_mut(&mut self) -> Option<&mut B> {
        let id = self.active_or_temp()?.clone();
        self.get_mut(&id)
    }

    pub fn add_listener<F>(&mut self, listener: F)
    where
        F: FnMut(Option<&Id>, &Id) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Make `id` the active behavior, ending any temporary overlay
    ///
    /// Unknown ids are logged and ignored. Returns false in that case.
    pub fn set_active(&mut self, id: &Id) -> bool {
        if !self.check_registered(id) {
            return false;
        }
        let shown = self.active_or_temp().cloned();

        if let Some(temporary) = self.temporary.take() {
            self.deactivate(&temporary);
        }

        if self.active.as_ref() == Some(id) {
            // Only the overlay ended; the active behavior stays activated
            if shown.as_ref() != Some(id) {
                self.notify(shown.as_ref(), id);
                self.record();
            }
            return true;
        }

        let old = self.active.take();
        if let Some(old) = &old {
            self.deactivate(old);
        }
        self.previous = old;
        self.active = Some(id.clone());
        self.activate(id);
        debug!(
            "Active {}: {} -> {}",
            self.kind,
            shown.as_ref().map_or_else(|| "none".to_string(), |s| s.to_string()),
            id
        );
        self.notify(shown.as_ref(), id);
        self.record();
        true
    }

    /// Shadow the active behavior with `id` until cleared
    pub fn set_temporary(&mut self, id: &Id) -> bool {
        if !self.check_registered(id) {
            return false;
        }
        if self.temporary.as_ref() == Some(id) {
            return true;
        }
        if self.temporary.is_none() && self.active.as_ref() == Some(id) {
            debug!("Temporary {} '{}' is already active", self.kind, id);
            return true;
        }

        let shown = self.active_or_temp().cloned();
        if let Some(temporary) = self.temporary.take() {
            self.deactivate(&temporary);
        }
        self.temporary = Some(id.clone());
        self.activate(id);
        debug!("Temporary {}: {}", self.kind, id);
        self.notify(shown.as_ref(), id);
        self.record();
        true
    }

    /// End the temporary overlay; the active behavior is not re-activated
    ///
    /// Returns false when there was no overlay.
    pub fn clear_temporary(&mut self) -> bool {
        let Some(temporary) = self.temporary.take() else {
            return false;
        };
        self.deactivate(&temporary);
        debug!("Temporary {} '{}' cleared", self.kind, temporary);
        if let Some(active) = self.active.clone() {
            self.notify(Some(&temporary), &active);
        }
        self.record();
        true
    }

    /// End a temporary overlay if present, else return to the previous id
    pub fn restore(&mut self) -> bool {
        if self.temporary.is_some() {
            return self.clear_temporary();
        }
        match self.previous.clone() {
            Some(previous) => self.set_active(&previous),
            None => {
                debug!("No previous {} to restore", self.kind);
                false
            }
        }
    }

    /// Changes made since the last call, oldest first
    pub fn take_journal(&mut self) -> Vec<ModeChange<Id>> {
        self.journal.as_mut().map(std::mem::take).unwrap_or_default()
    }

    /// Bring this registry to the state of a change made elsewhere
    ///
    /// Runs the usual hooks and listeners but records nothing, so mirroring
    /// a change never echoes back.
    pub fn apply(&mut self, change: &ModeChange<Id>) {
        let mark = self.journal.as_ref().map_or(0, Vec::len);
        if let Some(active) = &change.active {
            if self.active.as_ref() != Some(active) {
                // Ends any overlay too; the target overlay is re-applied below
                self.set_active(active);
            }
        }
        match &change.temporary {
            Some(temporary) => {
                self.set_temporary(temporary);
            }
            None => {
                self.clear_temporary();
            }
        }
        if let Some(journal) = &mut self.journal {
            journal.truncate(mark);
        }
    }

    fn check_registered(&self, id: &Id) -> bool {
        if self.registry.contains_key(id) {
            return true;
        }
        let err = match self.kind {
            "view" => SurfaceError::UnknownView(id.to_string()),
            _ => SurfaceError::UnknownMode(id.to_string()),
        };
        error!("{}", err);
        false
    }

    fn activate(&mut self, id: &Id) {
        if let Some(behavior) = self.registry.get_mut(id) {
            behavior.on_activate();
        }
    }

    fn deactivate(&mut self, id: &Id) {
        if let Some(behavior) = self.registry.get_mut(id) {
            behavior.on_deactivate();
        }
    }

    fn notify(&mut self, old: Option<&Id>, new: &Id) {
        for listener in &mut self.listeners {
            listener(old, new);
        }
    }

    fn record(&mut self) {
        if let Some(journal) = &mut self.journal {
            journal.push(ModeChange {
                active: self.active.clone(),
                temporary: self.temporary.clone(),
            });
        }
    }
}
