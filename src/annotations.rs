use crate::codec::{LocationId, PopoverPosition, ScreenRect};
use crate::view::{OverlayPrimitive, RenderingView};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

/// A highlight handed to the rendering engine. The engine's overlay layer
/// owns the authoritative list; the session only keeps what it needs to
/// address one for deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub location: LocationId,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Annotation {
    pub fn new(location: LocationId, color: impl Into<String>) -> Self {
        Self {
            location,
            color: color.into(),
            note: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// The selection (or clicked highlight) currently offered in a popover.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionCandidate {
    pub location: LocationId,
    /// Host-space bounding box of the selected text.
    pub rect: ScreenRect,
    pub popover: PopoverPosition,
    pub text: String,
    /// Set when the candidate comes from an existing highlight.
    pub has_annotation: bool,
}

#[derive(Debug, Default)]
pub struct AnnotationState {
    active: Option<SelectionCandidate>,
}

impl AnnotationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&SelectionCandidate> {
        self.active.as_ref()
    }

    /// Makes `candidate` the active one, discarding whatever was shown.
    pub fn show(&mut self, candidate: SelectionCandidate) {
        if let Some(previous) = self.active.replace(candidate) {
            debug!("Replaced selection candidate at {}", previous.location);
        }
    }

    pub fn clear(&mut self) {
        self.active = None;
    }

    /// Adds the active selection as a highlight. Only a fresh selection can
    /// be committed; the candidate is consumed.
    pub fn commit(
        &mut self,
        view: &mut dyn RenderingView,
        color: &str,
        note: Option<String>,
    ) -> Option<Annotation> {
        if self.active.as_ref().is_none_or(|c| c.has_annotation) {
            debug!("Nothing to commit");
            return None;
        }
        let candidate = self.active.take()?;
        let mut annotation = Annotation::new(candidate.location, color);
        annotation.note = note;
        view.add_annotation(&annotation);
        debug!("Committed {} highlight at {}", annotation.color, annotation.location);
        Some(annotation)
    }

    /// Removes the highlight behind the active candidate.
    pub fn delete(&mut self, view: &mut dyn RenderingView) -> Option<LocationId> {
        if !self.active.as_ref().is_some_and(|c| c.has_annotation) {
            debug!("No highlight selected for deletion");
            return None;
        }
        let candidate = self.active.take()?;
        view.delete_annotation(&candidate.location);
        debug!("Deleted highlight at {}", candidate.location);
        Some(candidate.location)
    }

    pub fn draw(view: &mut dyn RenderingView, location: &LocationId, color: String) {
        view.draw_overlay(location, OverlayPrimitive::Highlight { color });
    }
}
