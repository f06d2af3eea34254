use crate::annotations::{Annotation, AnnotationState, SelectionCandidate};
use crate::appearance::Appearance;
use crate::archive::{Archive, BookFile};
use crate::book::{Book, TocEntry};
use crate::codec::{FrameGeometry, LocationId, NavIntent, NavPrimitive, ReadingDirection, primitive_for};
use crate::error::{Result, SessionError};
use crate::inputs::{Debouncer, Throttle};
use crate::listeners::ListenerLedger;
use crate::package_parser::{BookParser, EpubPackageParser};
use crate::settings::Settings;
use crate::view::{DocumentId, NavTarget, RenderingView, SharedView};
use log::{debug, error, info, warn};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Opening,
    Ready,
    Closed,
}

/// Timing and styling knobs the controller needs, usually derived from
/// [`Settings`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub selection_debounce: Duration,
    pub wheel_throttle: Duration,
    pub default_highlight_color: String,
    pub appearance: Appearance,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for SessionConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            selection_debounce: settings.selection_debounce(),
            wheel_throttle: settings.wheel_throttle(),
            default_highlight_color: settings.default_highlight_color.clone(),
            appearance: settings.appearance(),
        }
    }
}

/// Read-only view of the session handed to the presentation layer.
#[derive(Debug, Clone, Copy)]
pub struct SessionSnapshot<'a> {
    pub state: SessionState,
    pub title: Option<&'a str>,
    pub direction: ReadingDirection,
    pub location: Option<&'a LocationId>,
    pub progress: Option<f64>,
    pub toc: &'a [TocEntry],
    pub chapter: Option<&'a TocEntry>,
    pub candidate: Option<&'a SelectionCandidate>,
    pub appearance: &'a Appearance,
}

impl SessionSnapshot<'_> {
    pub fn is_opening(&self) -> bool {
        self.state == SessionState::Opening
    }

    pub fn has_book(&self) -> bool {
        self.title.is_some()
    }

    pub fn chapter_label(&self) -> Option<&str> {
        self.chapter.map(|entry| entry.label.as_str())
    }
}

pub type Observer = Box<dyn FnMut(&SessionSnapshot<'_>)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverId(u64);

/// An accepted `open` whose parse has not run yet.
///
/// The session stays `Opening` until the matching [`ResolvedOpen`] is handed
/// to [`Session::finish_open`]. Every other `open` in between is dropped.
#[must_use = "an accepted open keeps the session in Opening until finished"]
pub struct PendingOpen {
    file: BookFile,
    generation: u64,
}

impl PendingOpen {
    pub fn file_name(&self) -> &str {
        &self.file.name
    }

    pub fn resolve(self, parser: &dyn BookParser) -> ResolvedOpen {
        let name = self.file.name.clone();
        let result = Archive::open(self.file).and_then(|archive| parser.parse(archive));
        ResolvedOpen {
            name,
            generation: self.generation,
            result,
        }
    }
}

impl fmt::Debug for PendingOpen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOpen")
            .field("file", &self.file)
            .field("generation", &self.generation)
            .finish()
    }
}

pub struct ResolvedOpen {
    name: String,
    generation: u64,
    result: Result<Book>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingSelection {
    pub doc: DocumentId,
    pub index: usize,
}

/// The single active reading session.
///
/// Lifecycle: `Idle -> Opening -> Ready -> Closed`, and back to `Opening`
/// from `Idle` or `Closed`. Commands outside `Ready` are silent no-ops.
pub struct Session {
    pub(crate) state: SessionState,
    pub(crate) config: SessionConfig,
    parser: Box<dyn BookParser>,
    pub(crate) book: Option<Book>,
    pub(crate) view: Option<SharedView>,
    view_has_book: bool,
    pub(crate) current_location: Option<LocationId>,
    pub(crate) current_chapter: Option<TocEntry>,
    pub(crate) progress: Option<f64>,
    pub(crate) toc: Vec<TocEntry>,
    /// Frame of the content document currently bound for input.
    pub(crate) frame: Option<FrameGeometry>,
    pub(crate) annotations: AnnotationState,
    pub(crate) listeners: ListenerLedger,
    pub(crate) selection_debounce: Debouncer<PendingSelection>,
    pub(crate) wheel_throttle: Throttle,
    /// Kept across `close`; it is a reader preference, not book state.
    pub(crate) appearance: Appearance,
    open_generation: u64,
    observers: Vec<(ObserverId, Observer)>,
    next_observer_id: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_settings(settings: &Settings) -> Self {
        Self::with_config(SessionConfig::from(settings))
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            state: SessionState::Idle,
            selection_debounce: Debouncer::new(config.selection_debounce),
            wheel_throttle: Throttle::new(config.wheel_throttle),
            appearance: config.appearance.clone(),
            config,
            parser: Box::new(EpubPackageParser::new()),
            book: None,
            view: None,
            view_has_book: false,
            current_location: None,
            current_chapter: None,
            progress: None,
            toc: Vec::new(),
            frame: None,
            annotations: AnnotationState::new(),
            listeners: ListenerLedger::new(),
            open_generation: 0,
            observers: Vec::new(),
            next_observer_id: 0,
        }
    }

    /// Replaces the package parser used by [`Session::open`].
    pub fn with_parser(mut self, parser: impl BookParser + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    pub fn parser(&self) -> &dyn BookParser {
        self.parser.as_ref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_opening(&self) -> bool {
        self.state == SessionState::Opening
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    pub fn book(&self) -> Option<&Book> {
        self.book.as_ref()
    }

    pub fn direction(&self) -> ReadingDirection {
        self.book.as_ref().map(Book::direction).unwrap_or_default()
    }

    pub fn current_location(&self) -> Option<&LocationId> {
        self.current_location.as_ref()
    }

    pub fn current_chapter(&self) -> Option<&TocEntry> {
        self.current_chapter.as_ref()
    }

    pub fn progress(&self) -> Option<f64> {
        self.progress
    }

    pub fn table_of_contents(&self) -> &[TocEntry] {
        &self.toc
    }

    pub fn active_candidate(&self) -> Option<&SelectionCandidate> {
        self.annotations.active()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn snapshot(&self) -> SessionSnapshot<'_> {
        SessionSnapshot {
            state: self.state,
            title: self.book.as_ref().map(|book| book.metadata.display_title()),
            direction: self.direction(),
            location: self.current_location.as_ref(),
            progress: self.progress,
            toc: &self.toc,
            chapter: self.current_chapter.as_ref(),
            candidate: self.annotations.active(),
            appearance: &self.appearance,
        }
    }

    /// Registers an observer called with a fresh snapshot after every state
    /// change, in event order.
    pub fn subscribe(&mut self, observer: impl FnMut(&SessionSnapshot<'_>) + 'static) -> ObserverId {
        self.next_observer_id += 1;
        let id = ObserverId(self.next_observer_id);
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(observer_id, _)| *observer_id != id);
        self.observers.len() != before
    }

    pub(crate) fn notify(&mut self) {
        if self.observers.is_empty() {
            return;
        }
        let mut observers = std::mem::take(&mut self.observers);
        let snapshot = self.snapshot();
        for (_, observer) in observers.iter_mut() {
            observer(&snapshot);
        }
        self.observers = observers;
    }

    /// Runs `f` against the attached view. `None` when no view is attached or
    /// it is already borrowed elsewhere.
    pub(crate) fn with_view<R>(
        &mut self,
        f: impl FnOnce(&mut Self, &mut dyn RenderingView) -> R,
    ) -> Option<R> {
        let handle = self.view.clone()?;
        let Ok(mut view) = handle.try_borrow_mut() else {
            warn!("Rendering view is busy; command dropped");
            return None;
        };
        Some(f(self, &mut *view))
    }

    /// First half of `open`: claims the opening latch.
    ///
    /// Returns `None` when another open is in flight or a book is already
    /// showing. The latch does not queue.
    pub fn begin_open(&mut self, file: BookFile) -> Option<PendingOpen> {
        match self.state {
            SessionState::Opening => {
                debug!("{}: dropped open of {}", SessionError::ConcurrentOpenRejected, file.name);
                return None;
            }
            SessionState::Ready => {
                debug!("A book is already open; dropped open of {}", file.name);
                return None;
            }
            SessionState::Idle | SessionState::Closed => {}
        }

        self.open_generation += 1;
        self.state = SessionState::Opening;
        info!("Opening {}", file.name);
        self.notify();
        Some(PendingOpen {
            file,
            generation: self.open_generation,
        })
    }

    /// Second half of `open`. A failed parse returns the session to `Idle`
    /// with nothing populated and hands the error back.
    pub fn finish_open(&mut self, resolved: ResolvedOpen) -> Result<()> {
        if self.state != SessionState::Opening || resolved.generation != self.open_generation {
            debug!("Discarding stale open of {}", resolved.name);
            return Ok(());
        }

        let book = match resolved.result {
            Ok(book) => book,
            Err(e) => {
                error!("Failed to open {}: {e}", resolved.name);
                self.abort_open();
                return Err(e);
            }
        };

        self.toc = book.toc.clone();
        self.book = Some(book);

        if let Err(e) = self.attach_book_to_view() {
            error!("Failed to attach {} to the rendering view: {e}", resolved.name);
            self.abort_open();
            return Err(e);
        }

        self.state = SessionState::Ready;
        info!(
            "Opened \"{}\" ({} toc entries)",
            self.snapshot().title.unwrap_or_default(),
            self.toc.len()
        );
        self.notify();
        Ok(())
    }

    /// Opens a book, parsing it with the session's parser.
    pub fn open(&mut self, file: BookFile) -> Result<()> {
        let Some(pending) = self.begin_open(file) else {
            return Ok(());
        };
        let resolved = pending.resolve(self.parser.as_ref());
        self.finish_open(resolved)
    }

    fn abort_open(&mut self) {
        if let Some(handle) = self.view.clone() {
            if let Ok(mut view) = handle.try_borrow_mut() {
                self.listeners.release_all(&mut *view);
                if self.view_has_book {
                    view.close();
                }
            }
        }
        self.view_has_book = false;
        self.reset_fields();
        self.state = SessionState::Idle;
        self.notify();
    }

    /// Attaches the rendering view. It may come before or after `open`; the
    /// book is handed to it once both are present.
    pub fn render(&mut self, view: SharedView) -> Result<()> {
        if self.view.as_ref().is_some_and(|current| !std::rc::Rc::ptr_eq(current, &view)) {
            debug!("Switching rendering view");
            self.detach_view();
        }
        self.view = Some(view);
        if self.state == SessionState::Ready {
            self.attach_book_to_view()?;
        }
        Ok(())
    }

    fn attach_book_to_view(&mut self) -> Result<()> {
        if self.view_has_book {
            return Ok(());
        }
        let (Some(handle), Some(book)) = (self.view.clone(), self.book.as_ref()) else {
            return Ok(());
        };
        let mut view = handle.try_borrow_mut().map_err(|_| SessionError::ViewDetached)?;
        view.open(book)?;
        view.set_styles(&self.appearance);
        self.listeners.bind_view(&mut *view);
        self.view_has_book = true;
        debug!("Book attached to rendering view");
        Ok(())
    }

    fn detach_view(&mut self) {
        let Some(handle) = self.view.take() else {
            return;
        };
        match handle.try_borrow_mut() {
            Ok(mut view) => {
                let released = self.listeners.release_all(&mut *view);
                if self.view_has_book {
                    view.close();
                }
                debug!("Released {released} listeners");
            }
            Err(_) => {
                warn!("Rendering view busy while detaching; dropping listener bookkeeping");
                self.listeners = ListenerLedger::new();
            }
        }
        self.view_has_book = false;
    }

    fn reset_fields(&mut self) {
        self.book = None;
        self.current_location = None;
        self.current_chapter = None;
        self.progress = None;
        self.toc.clear();
        self.frame = None;
        self.annotations.clear();
        self.selection_debounce.cancel();
        self.wheel_throttle.reset();
    }

    /// Releases every listener, drops the book and the view, and clears all
    /// state. Safe to call repeatedly or before anything was opened.
    pub fn close(&mut self) {
        let was = self.state;
        // Invalidates any open still being parsed.
        self.open_generation += 1;
        self.detach_view();
        self.reset_fields();

        self.state = match was {
            SessionState::Idle => SessionState::Idle,
            _ => SessionState::Closed,
        };
        if matches!(was, SessionState::Opening | SessionState::Ready) {
            info!("Session closed");
            self.notify();
        }
    }

    pub fn appearance(&self) -> &Appearance {
        &self.appearance
    }

    /// Changes theme and reading style. Accepted in any state: it reaches the
    /// renderer immediately when a book is showing, otherwise on the next
    /// `render`/`open`.
    pub fn set_appearance(&mut self, appearance: Appearance) {
        if appearance == self.appearance {
            return;
        }
        debug!("Appearance -> {} ({:?})", appearance.theme.name(), appearance.style);
        self.appearance = appearance;
        if self.view_has_book {
            let applied = self.with_view(|session, view| view.set_styles(&session.appearance));
            if applied.is_none() {
                debug!("Appearance stored; view unavailable");
            }
        }
        self.notify();
    }

    pub fn go_next(&mut self) {
        self.navigate(NavIntent::Next);
    }

    pub fn go_prev(&mut self) {
        self.navigate(NavIntent::Prev);
    }

    pub(crate) fn navigate(&mut self, intent: NavIntent) {
        if !self.is_ready() {
            debug!("{}: {intent:?} dropped", SessionError::NotReady);
            return;
        }
        let primitive = primitive_for(self.direction(), intent);
        let issued = self.with_view(|_, view| match primitive {
            NavPrimitive::GoLeft => view.go_left(),
            NavPrimitive::GoRight => view.go_right(),
        });
        match issued {
            Some(()) => debug!("{intent:?} -> {primitive:?}"),
            None => debug!("No rendering view; {intent:?} dropped"),
        }
    }

    /// Navigates to a section href (with optional fragment) or a `epubcfi(..)`
    /// location.
    pub fn jump_to(&mut self, target: &str) {
        if !self.is_ready() {
            debug!("{}: jump to {target} dropped", SessionError::NotReady);
            return;
        }
        let target = NavTarget::parse(target);
        debug!("Jumping to {target:?}");
        self.with_view(|_, view| view.go_to(&target));
    }

    pub fn commit_annotation(&mut self, color: &str) -> Option<Annotation> {
        self.commit_annotation_with_note(color, None)
    }

    /// Commits with the configured default color.
    pub fn commit_default_annotation(&mut self) -> Option<Annotation> {
        let color = self.config.default_highlight_color.clone();
        self.commit_annotation_with_note(&color, None)
    }

    pub fn commit_annotation_with_note(&mut self, color: &str, note: Option<String>) -> Option<Annotation> {
        if !self.is_ready() {
            debug!("{}: commit dropped", SessionError::NotReady);
            return None;
        }
        let annotation = self
            .with_view(|session, view| session.annotations.commit(view, color, note))
            .flatten();
        if annotation.is_some() {
            self.notify();
        }
        annotation
    }

    /// Deletes the highlight behind the active candidate.
    pub fn delete_annotation(&mut self) -> Option<LocationId> {
        if !self.is_ready() {
            debug!("{}: delete dropped", SessionError::NotReady);
            return None;
        }
        let deleted = self
            .with_view(|session, view| session.annotations.delete(view))
            .flatten();
        if deleted.is_some() {
            self.notify();
        }
        deleted
    }

    /// Hides the popover without committing anything.
    pub fn dismiss_candidate(&mut self) {
        if self.annotations.active().is_some() {
            self.annotations.clear();
            self.notify();
        }
    }
}
