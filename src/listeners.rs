use crate::view::{DocumentId, EventKind, ListenerId, ListenerTarget, RenderingView};
use log::debug;

#[derive(Debug)]
struct BoundDocument {
    doc: DocumentId,
    index: usize,
    listeners: Vec<ListenerId>,
}

/// Every listener the session has registered, by target.
///
/// At most one content document is bound at a time. Binding a new one first
/// removes everything registered on the previous one, so repeated `load`
/// events never stack listeners.
#[derive(Debug, Default)]
pub struct ListenerLedger {
    view: Vec<ListenerId>,
    host: Vec<ListenerId>,
    document: Option<BoundDocument>,
}

impl ListenerLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine lifecycle listeners plus the host keyboard/wheel fallback.
    pub fn bind_view(&mut self, view: &mut dyn RenderingView) {
        if !self.view.is_empty() {
            return;
        }
        self.view = EventKind::VIEW
            .iter()
            .map(|kind| view.add_listener(ListenerTarget::View, *kind))
            .collect();
        self.host = EventKind::HOST
            .iter()
            .map(|kind| view.add_listener(ListenerTarget::Host, *kind))
            .collect();
        debug!(
            "Bound {} view and {} host listeners",
            self.view.len(),
            self.host.len()
        );
    }

    pub fn bind_document(&mut self, view: &mut dyn RenderingView, doc: DocumentId, index: usize) {
        self.detach_document(view);
        let listeners = EventKind::DOCUMENT
            .iter()
            .map(|kind| view.add_listener(ListenerTarget::Document(doc), *kind))
            .collect();
        self.document = Some(BoundDocument {
            doc,
            index,
            listeners,
        });
        debug!("Bound input listeners to {doc} (section {index})");
    }

    pub fn detach_document(&mut self, view: &mut dyn RenderingView) {
        if let Some(bound) = self.document.take() {
            for id in bound.listeners {
                view.remove_listener(id);
            }
            debug!("Detached input listeners from {}", bound.doc);
        }
    }

    /// The content document currently receiving input, with its section index.
    pub fn current_document(&self) -> Option<(DocumentId, usize)> {
        self.document.as_ref().map(|bound| (bound.doc, bound.index))
    }

    pub fn is_current(&self, doc: DocumentId) -> bool {
        self.document.as_ref().is_some_and(|bound| bound.doc == doc)
    }

    /// Removes everything. Returns how many listeners were released.
    pub fn release_all(&mut self, view: &mut dyn RenderingView) -> usize {
        let released = self.len();
        self.detach_document(view);
        for id in self.view.drain(..).chain(self.host.drain(..)) {
            view.remove_listener(id);
        }
        released
    }

    pub fn len(&self) -> usize {
        self.view.len()
            + self.host.len()
            + self.document.as_ref().map_or(0, |bound| bound.listeners.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RecordingView;

    #[test]
    fn test_rebinding_detaches_previous_document() {
        let mut view = RecordingView::new();
        let mut ledger = ListenerLedger::new();

        ledger.bind_view(&mut view);
        ledger.bind_document(&mut view, DocumentId(1), 0);
        ledger.bind_document(&mut view, DocumentId(2), 1);
        ledger.bind_document(&mut view, DocumentId(3), 2);

        assert_eq!(view.listener_count(ListenerTarget::Document(DocumentId(1))), 0);
        assert_eq!(view.listener_count(ListenerTarget::Document(DocumentId(2))), 0);
        assert_eq!(view.listener_count(ListenerTarget::Document(DocumentId(3))), 5);
        assert_eq!(ledger.current_document(), Some((DocumentId(3), 2)));
        assert_eq!(ledger.len(), 12);
    }

    #[test]
    fn test_bind_view_is_idempotent() {
        let mut view = RecordingView::new();
        let mut ledger = ListenerLedger::new();
        ledger.bind_view(&mut view);
        ledger.bind_view(&mut view);
        assert_eq!(view.listener_count(ListenerTarget::View), 5);
        assert_eq!(view.listener_count(ListenerTarget::Host), 2);
    }

    #[test]
    fn test_release_all_is_symmetric() {
        let mut view = RecordingView::new();
        let mut ledger = ListenerLedger::new();
        ledger.bind_view(&mut view);
        ledger.bind_document(&mut view, DocumentId(9), 4);

        assert_eq!(ledger.release_all(&mut view), 12);
        assert_eq!(view.live_listener_count(), 0);
        assert!(ledger.is_empty());
        assert_eq!(ledger.current_document(), None);
        assert_eq!(ledger.release_all(&mut view), 0);
    }
}
