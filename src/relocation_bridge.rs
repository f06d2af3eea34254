use crate::annotations::{AnnotationState, SelectionCandidate};
use crate::book::{TocEntry, flatten_toc};
use crate::codec::{LocationId, ScreenPoint, bounding_rect, resolve_popover_position};
use crate::error::SessionError;
use crate::events::{DocumentEvent, ViewEvent};
use crate::inputs::{intent_for_key, wheel_intent};
use crate::session::PendingSelection;
use crate::view::{DocumentId, PointerKind, SelectionRange};
use log::{debug, warn};
use std::time::Instant;

/// The chapter a location falls in: among entries targeting the location's
/// section (in reading order), the last one positioned at or before it.
///
/// An entry targets the section when its href, fragment stripped, is exactly
/// the section's archive path; both sides are resolved archive-absolute
/// paths. So `ch2.xhtml#a` targets section `ch2.xhtml`, while `ch2.xhtml`
/// does not target `ch2.xhtml.bak`. Entries without a resolved position
/// count as the start of their section.
pub fn resolve_chapter<'a>(
    toc: &'a [TocEntry],
    section_href: &str,
    location: &LocationId,
) -> Option<&'a TocEntry> {
    flatten_toc(toc)
        .into_iter()
        .filter(|entry| entry.resource() == section_href)
        .fold(None, |chapter, entry| {
            let at_or_before = entry
                .location
                .as_ref()
                .is_none_or(|position| position <= location);
            if at_or_before { Some(entry) } else { chapter }
        })
}

impl crate::session::Session {
    /// Applies one engine lifecycle event. Events arrive in layout order and
    /// each one's state change is published before the next is handled.
    pub fn handle_view_event(&mut self, event: ViewEvent, now: Instant) {
        if !self.is_ready() {
            debug!("{}: `{}` ignored", SessionError::NotReady, event.kind().name());
            return;
        }
        match event {
            ViewEvent::Load { doc, index } => self.on_load(doc, index),
            ViewEvent::Relocate {
                location,
                fraction,
                section_fraction,
            } => self.on_relocate(location, fraction, section_fraction),
            ViewEvent::DrawAnnotation { location, color } => {
                self.with_view(|_, view| AnnotationState::draw(view, &location, color));
            }
            ViewEvent::ShowAnnotation {
                location,
                index,
                range,
            } => self.on_show_annotation(location, index, range),
            ViewEvent::TextSelected { doc, index } => {
                self.selection_debounce
                    .schedule(PendingSelection { doc, index }, now);
            }
        }
    }

    /// Same as [`handle_view_event`](Self::handle_view_event) for a JSON
    /// payload. Malformed payloads are logged and dropped.
    pub fn handle_raw_view_event(&mut self, payload: &str, now: Instant) {
        match ViewEvent::from_json(payload) {
            Ok(event) => self.handle_view_event(event, now),
            Err(e) => warn!("Dropping view event: {e}"),
        }
    }

    /// Input from a content document. Only the currently bound document is
    /// heard; anything from a replaced document is stale.
    pub fn handle_document_event(&mut self, doc: DocumentId, event: DocumentEvent, now: Instant) {
        if !self.is_ready() {
            return;
        }
        if !self.listeners.is_current(doc) {
            debug!("Ignoring `{}` from detached {doc}", event.kind().name());
            return;
        }
        match event {
            DocumentEvent::Keydown { key } => self.on_key(&key),
            DocumentEvent::Wheel { delta_x, delta_y } => self.on_wheel(delta_x, delta_y, now),
            DocumentEvent::SelectionChange => {
                if let Some((doc, index)) = self.listeners.current_document() {
                    self.selection_debounce
                        .schedule(PendingSelection { doc, index }, now);
                }
            }
            DocumentEvent::PointerDown(point) => self.forward_pointer(PointerKind::Down, point),
            DocumentEvent::MouseMove(point) => self.forward_pointer(PointerKind::Move, point),
        }
    }

    pub fn handle_raw_document_event(&mut self, doc: DocumentId, payload: &str, now: Instant) {
        match DocumentEvent::from_json(payload) {
            Ok(event) => self.handle_document_event(doc, event, now),
            Err(e) => warn!("Dropping {doc} event: {e}"),
        }
    }

    /// Keyboard and wheel input caught on the host page. Used only while no
    /// content document is bound.
    pub fn handle_host_event(&mut self, event: DocumentEvent, now: Instant) {
        if !self.is_ready() {
            return;
        }
        if self.listeners.current_document().is_some() {
            debug!("Content document is bound; host `{}` ignored", event.kind().name());
            return;
        }
        match event {
            DocumentEvent::Keydown { key } => self.on_key(&key),
            DocumentEvent::Wheel { delta_x, delta_y } => self.on_wheel(delta_x, delta_y, now),
            other => debug!("Host does not handle `{}`", other.kind().name()),
        }
    }

    /// Releases a settled selection, if any. Call from the host's timer tick.
    pub fn poll(&mut self, now: Instant) {
        if let Some(pending) = self.selection_debounce.poll(now) {
            if self.is_ready() {
                self.resolve_selection(pending);
            }
        }
    }

    fn on_load(&mut self, doc: DocumentId, index: usize) {
        let bound = self.with_view(|session, view| {
            session.listeners.bind_document(view, doc, index);
            session.frame = view.frame_geometry(doc);
            view.set_styles(&session.appearance);
        });
        if bound.is_none() {
            warn!("Section {index} loaded without a rendering view");
            return;
        }
        // A selection pending in the previous document can no longer be read.
        self.selection_debounce.cancel();
    }

    fn on_relocate(&mut self, location: LocationId, fraction: Option<f64>, section_fraction: Option<f64>) {
        let Some(book) = self.book.as_ref() else {
            return;
        };
        let progress = book.locations.progress(&location, fraction, section_fraction);
        let chapter = book
            .section_href(location.spine_index())
            .and_then(|href| resolve_chapter(&self.toc, href, &location))
            .cloned();

        debug!(
            "Relocated to {location} ({:?}, chapter {:?})",
            progress,
            chapter.as_ref().map(|c| c.label.as_str())
        );
        if progress.is_some() {
            self.progress = progress;
        }
        self.current_chapter = chapter;
        self.current_location = Some(location);
        self.notify();
    }

    fn on_show_annotation(&mut self, location: LocationId, index: usize, range: Option<SelectionRange>) {
        let frame = self
            .listeners
            .current_document()
            .filter(|(_, bound_index)| *bound_index == index)
            .and(self.frame.clone());
        let Some(viewport) = self.with_view(|_, view| view.viewport()) else {
            return;
        };
        let range = range.unwrap_or_default();
        let candidate = SelectionCandidate {
            location,
            rect: bounding_rect(&range.client_rects, frame.as_ref()).unwrap_or_default(),
            popover: resolve_popover_position(&range.client_rects, frame.as_ref(), viewport),
            text: range.text,
            has_annotation: true,
        };
        self.annotations.show(candidate);
        self.notify();
    }

    fn resolve_selection(&mut self, pending: PendingSelection) {
        if !self.listeners.is_current(pending.doc) {
            debug!("Selection settled in detached {}", pending.doc);
            return;
        }
        let frame = self.frame.clone();
        let resolved = self
            .with_view(|_, view| {
                let range = view.selection(pending.doc).filter(|r| !r.is_empty())?;
                let location = view.get_cfi(pending.index, Some(&range))?;
                Some((range, location, view.viewport()))
            })
            .flatten();

        match resolved {
            Some((range, location, viewport)) => {
                let popover = resolve_popover_position(&range.client_rects, frame.as_ref(), viewport);
                if popover.is_hidden() {
                    debug!("Selection anchor is off screen");
                }
                self.annotations.show(SelectionCandidate {
                    location,
                    rect: bounding_rect(&range.client_rects, frame.as_ref()).unwrap_or_default(),
                    popover,
                    text: range.text,
                    has_annotation: false,
                });
            }
            // Clicking a highlight collapses the selection; its popover stays.
            None if self.annotations.active().is_some_and(|c| c.has_annotation) => return,
            None => self.annotations.clear(),
        }
        self.notify();
    }

    fn on_key(&mut self, key: &str) {
        match intent_for_key(key) {
            Some(intent) => self.navigate(intent),
            None => debug!("Unbound key {key:?}"),
        }
    }

    fn on_wheel(&mut self, delta_x: f64, delta_y: f64, now: Instant) {
        let Some(intent) = wheel_intent(delta_x, delta_y) else {
            return;
        };
        if self.wheel_throttle.try_fire(now) {
            self.navigate(intent);
        } else {
            debug!("Wheel {intent:?} throttled");
        }
    }

    fn forward_pointer(&mut self, kind: PointerKind, point: ScreenPoint) {
        let host_point = self
            .frame
            .as_ref()
            .map_or(point, |frame| frame.project_point(point));
        self.with_view(|_, view| view.dispatch_host_pointer(kind, host_point));
    }
}
