use crate::annotations::Annotation;
use crate::appearance::Appearance;
use crate::book::Book;
use crate::codec::{FrameGeometry, LocationId, ScreenPoint, ScreenRect, Viewport};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// The rendering view is owned by the presentation layer; the session only
/// borrows it between `render` and `close`.
pub type SharedView = Rc<RefCell<dyn RenderingView>>;

/// Identifies one content document attached by the rendering engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Where a listener is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerTarget {
    /// The rendering view element itself (engine lifecycle events).
    View,
    /// A content document inside the rendering frame.
    Document(DocumentId),
    /// The outer host document.
    Host,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Load,
    Relocate,
    DrawAnnotation,
    ShowAnnotation,
    TextSelected,
    Keydown,
    Wheel,
    SelectionChange,
    PointerDown,
    MouseMove,
}

impl EventKind {
    pub const VIEW: [EventKind; 5] = [
        EventKind::Load,
        EventKind::Relocate,
        EventKind::DrawAnnotation,
        EventKind::ShowAnnotation,
        EventKind::TextSelected,
    ];

    pub const DOCUMENT: [EventKind; 5] = [
        EventKind::Keydown,
        EventKind::Wheel,
        EventKind::SelectionChange,
        EventKind::PointerDown,
        EventKind::MouseMove,
    ];

    pub const HOST: [EventKind; 2] = [EventKind::Keydown, EventKind::Wheel];

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Load => "load",
            EventKind::Relocate => "relocate",
            EventKind::DrawAnnotation => "draw-annotation",
            EventKind::ShowAnnotation => "show-annotation",
            EventKind::TextSelected => "text-selected",
            EventKind::Keydown => "keydown",
            EventKind::Wheel => "wheel",
            EventKind::SelectionChange => "selectionchange",
            EventKind::PointerDown => "pointerdown",
            EventKind::MouseMove => "mousemove",
        }
    }
}

/// A live text range inside a content document, in that document's
/// coordinate space.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SelectionRange {
    pub text: String,
    #[serde(default)]
    pub client_rects: Vec<ScreenRect>,
}

impl SelectionRange {
    pub fn new(text: impl Into<String>, client_rects: Vec<ScreenRect>) -> Self {
        Self {
            text: text.into(),
            client_rects,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Overlay styles the engine knows how to draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayPrimitive {
    Highlight { color: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Down,
    Move,
}

/// Explicit navigation target: a section href (optionally with a fragment)
/// or a canonical location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavTarget {
    Href(String),
    Location(LocationId),
}

impl NavTarget {
    pub fn parse(target: &str) -> Self {
        if target.starts_with("epubcfi(") {
            if let Ok(location) = LocationId::parse(target) {
                return NavTarget::Location(location);
            }
        }
        NavTarget::Href(target.to_string())
    }
}

impl From<LocationId> for NavTarget {
    fn from(location: LocationId) -> Self {
        NavTarget::Location(location)
    }
}

/// The paginating renderer as seen by the session.
///
/// Events flow the other way: the host delivers them to
/// [`Session::handle_view_event`](crate::session::Session::handle_view_event)
/// and friends, never from inside these calls.
pub trait RenderingView {
    fn open(&mut self, book: &Book) -> Result<()>;
    fn close(&mut self);

    fn go_left(&mut self);
    fn go_right(&mut self);
    fn go_to(&mut self, target: &NavTarget);

    /// Canonical location of a range in the section at `index`, or of the
    /// section start without a range.
    fn get_cfi(&self, index: usize, range: Option<&SelectionRange>) -> Option<LocationId>;

    fn add_annotation(&mut self, annotation: &Annotation);
    fn delete_annotation(&mut self, location: &LocationId);
    fn draw_overlay(&mut self, location: &LocationId, primitive: OverlayPrimitive);

    /// Applies theme colors and reading style to the content documents.
    fn set_styles(&mut self, appearance: &Appearance);

    fn add_listener(&mut self, target: ListenerTarget, kind: EventKind) -> ListenerId;
    fn remove_listener(&mut self, id: ListenerId);

    /// Host-space placement of the frame that shows `doc`.
    fn frame_geometry(&self, doc: DocumentId) -> Option<FrameGeometry>;
    fn viewport(&self) -> Viewport;
    fn selection(&self, doc: DocumentId) -> Option<SelectionRange>;

    /// Receives pointer input re-projected into host coordinates.
    fn dispatch_host_pointer(&mut self, kind: PointerKind, point: ScreenPoint);
}
