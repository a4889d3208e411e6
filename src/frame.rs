//! Per-call view over the caller's display slots
//!
//! A [`Frame`] borrows the display list for exactly one `analyze()` call, so
//! nothing in the analyzer can hold on to layers after the call returns.

use crate::layer::{DisplayContent, DisplaySlot};

pub struct Frame<'a> {
    displays: &'a mut [Option<DisplayContent>],
}

impl<'a> Frame<'a> {
    pub fn new(displays: &'a mut [Option<DisplayContent>]) -> Self {
        Self { displays }
    }

    /// Number of slots, active or not
    pub fn len(&self) -> usize {
        self.displays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.displays.is_empty()
    }

    pub fn get(&self, slot: usize) -> Option<&DisplayContent> {
        self.displays.get(slot).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut DisplayContent> {
        self.displays.get_mut(slot).and_then(Option::as_mut)
    }

    pub fn primary(&self) -> Option<&DisplayContent> {
        self.get(DisplaySlot::Primary.index())
    }

    pub fn primary_mut(&mut self) -> Option<&mut DisplayContent> {
        self.get_mut(DisplaySlot::Primary.index())
    }

    /// Active displays with their slot index, primary included
    pub fn active(&self) -> impl Iterator<Item = (usize, &DisplayContent)> + '_ {
        self.displays
            .iter()
            .enumerate()
            .filter_map(|(slot, content)| content.as_ref().map(|c| (slot, c)))
    }

    /// Active non-primary displays in slot order
    pub fn secondaries(&self) -> impl Iterator<Item = (usize, &DisplayContent)> + '_ {
        self.active()
            .filter(|(slot, _)| *slot != DisplaySlot::Primary.index())
    }

    pub fn secondaries_mut(&mut self) -> impl Iterator<Item = (usize, &mut DisplayContent)> + '_ {
        self.displays
            .iter_mut()
            .enumerate()
            .skip(DisplaySlot::Primary.index() + 1)
            .filter_map(|(slot, content)| content.as_mut().map(|c| (slot, c)))
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    pub fn any_geometry_changed(&self) -> bool {
        self.active().any(|(_, content)| content.geometry_changed)
    }

    /// Force downstream composition to recompute plane assignment on
    /// every secondary display
    pub fn mark_secondaries_geometry_changed(&mut self) {
        for (_, content) in self.secondaries_mut() {
            content.geometry_changed = true;
        }
    }
}
