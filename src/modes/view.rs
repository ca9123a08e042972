//! View registry with per-track preferred views

use std::collections::{HashMap, HashSet};
use std::ops::Deref;

use tracing::debug;

use super::manager::BehaviorManager;
use super::{View, ViewId};

/// View registry of one surface
///
/// Remembers, per track position, which view was last active while that
/// track was selected. Selecting the track again brings that view back,
/// unless an overview view (e.g. a session view spanning all tracks) is
/// showing.
pub struct ViewManager {
    inner: BehaviorManager<ViewId, dyn View>,
    preferred: HashMap<usize, ViewId>,
    overview: HashSet<ViewId>,
    track: Option<usize>,
}

impl Default for ViewManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewManager {
    pub fn new() -> Self {
        Self {
            inner: BehaviorManager::untracked("view"),
            preferred: HashMap::new(),
            overview: HashSet::new(),
            track: None,
        }
    }

    pub fn register(&mut self, id: ViewId, view: Box<dyn View>) {
        self.inner.register(id, view);
    }

    /// Mark a view as an overview; it never becomes a track's preference
    pub fn set_overview(&mut self, id: ViewId) {
        self.overview.insert(id);
    }

    pub fn is_overview(&self, id: &ViewId) -> bool {
        self.overview.contains(id)
    }

    /// Currently selected track position
    pub fn selected_track(&self) -> Option<usize> {
        self.track
    }

    pub fn preferred(&self, position: usize) -> Option<&ViewId> {
        self.preferred.get(&position)
    }

    pub fn set_active(&mut self, id: &ViewId) -> bool {
        if !self.inner.set_active(id) {
            return false;
        }
        if let Some(track) = self.track {
            if !self.overview.contains(id) {
                self.preferred.insert(track, id.clone());
            }
        }
        true
    }

    pub fn restore(&mut self) -> bool {
        let restored = self.inner.restore();
        if restored {
            if let (Some(track), Some(active)) = (self.track, self.inner.active().cloned()) {
                if !self.overview.contains(&active) {
                    self.preferred.insert(track, active);
                }
            }
        }
        restored
    }

    /// Select the track at `position` (combined index across units)
    pub fn select_track(&mut self, position: usize) {
        self.track = Some(position);

        if let Some(active) = self.inner.active() {
            if self.overview.contains(active) {
                debug!("Track {} selected under overview view '{}'", position, active);
                return;
            }
        }

        match self.preferred.get(&position).cloned() {
            Some(view) if self.inner.active() != Some(&view) => {
                debug!("Restoring view '{}' for track {}", view, position);
                self.inner.set_active(&view);
            }
            Some(_) => {}
            None => {
                if let Some(active) = self.inner.active().cloned() {
                    self.preferred.insert(position, active);
                }
            }
        }
    }

    pub fn current_mut(&mut self) -> Option<&mut (dyn View + 'static)> {
        self.inner.current_mut()
    }

    pub fn add_listener<F>(&mut self, listener: F)
    where
        F: FnMut(Option<&ViewId>, &ViewId) + Send + 'static,
    {
        self.inner.add_listener(listener);
    }
}

impl Deref for ViewManager {
    type Target = BehaviorManager<ViewId, dyn View>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::Behavior;

    struct PlainView;

    impl Behavior for PlainView {}
    impl View for PlainView {}

    fn views() -> ViewManager {
        let mut views = ViewManager::new();
        for name in ["clips", "drums", "session"] {
            views.register(ViewId::from(name), Box::new(PlainView));
        }
        views.set_overview(ViewId::from("session"));
        views
    }

    #[test]
    fn test_track_selection_restores_preferred_view() {
        let mut views = views();
        views.set_active(&ViewId::from("clips"));

        views.select_track(0);
        views.set_active(&ViewId::from("drums"));
        views.select_track(1);
        assert_eq!(views.active(), Some(&ViewId::from("drums")));
        views.set_active(&ViewId::from("clips"));

        views.select_track(0);
        assert_eq!(views.active(), Some(&ViewId::from("drums")));
        views.select_track(1);
        assert_eq!(views.active(), Some(&ViewId::from("clips")));
    }

    #[test]
    fn test_overview_suspends_preferences() {
        let mut views = views();
        views.set_active(&ViewId::from("drums"));
        views.select_track(2);

        views.set_active(&ViewId::from("session"));
        assert_eq!(views.preferred(2), Some(&ViewId::from("drums")));

        views.select_track(3);
        assert_eq!(views.active(), Some(&ViewId::from("session")));
        assert_eq!(views.selected_track(), Some(3));
        assert_eq!(views.preferred(3), None);
    }
}
