use std::cell::RefCell;
use std::fs::File;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};
use simplelog::{Config, WriteLogger};

use reading_session::annotations::Annotation;
use reading_session::appearance::Appearance;
use reading_session::codec::{FrameGeometry, LocationId, ReadingDirection, ScreenPoint, Viewport};
use reading_session::panic_handler;
use reading_session::view::{
    DocumentId, EventKind, ListenerId, ListenerTarget, NavTarget, OverlayPrimitive, PointerKind,
    SelectionRange,
};
use reading_session::{Book, BookFile, RenderingView, Session, Settings, TocEntry, ViewEvent};

/// Opens an EPUB in a headless reading session and prints what the session sees
#[derive(Parser, Debug)]
#[command(name = "session-walk")]
#[command(version, about)]
struct Args {
    /// EPUB file to open
    file: PathBuf,

    /// Turn this many pages forward after opening
    #[arg(short, long, default_value_t = 0)]
    next: usize,

    /// Jump to a table-of-contents href or an epubcfi(..) location
    #[arg(short, long)]
    jump: Option<String>,

    /// Where to write the log
    #[arg(long, default_value = "session-walk.log")]
    log_file: PathBuf,

    /// Log level, overriding the settings file
    #[arg(long)]
    log_level: Option<LevelFilter>,
}

/// Stand-in renderer: one page per spine section. Every move is reported
/// back to the host as load + relocate events.
#[derive(Default)]
struct WalkView {
    sections: Vec<String>,
    direction: ReadingDirection,
    index: usize,
    next_listener_id: u64,
    listeners: usize,
    outbox: Vec<ViewEvent>,
}

impl WalkView {
    fn show(&mut self, index: usize) {
        self.index = index.min(self.sections.len().saturating_sub(1));
        self.outbox.push(ViewEvent::Load {
            doc: DocumentId(self.index as u64 + 1),
            index: self.index,
        });
        self.outbox.push(ViewEvent::Relocate {
            location: LocationId::section_start(self.index),
            fraction: None,
            section_fraction: None,
        });
    }

    fn turn(&mut self, forward: bool) {
        let target = if forward {
            self.index + 1
        } else {
            self.index.saturating_sub(1)
        };
        if target < self.sections.len() && target != self.index {
            self.show(target);
        }
    }

    fn drain(&mut self) -> Vec<ViewEvent> {
        std::mem::take(&mut self.outbox)
    }
}

impl RenderingView for WalkView {
    fn open(&mut self, book: &Book) -> reading_session::Result<()> {
        self.sections = book.spine.iter().map(|item| item.href.clone()).collect();
        self.direction = book.direction();
        self.show(0);
        Ok(())
    }

    fn close(&mut self) {
        self.sections.clear();
        self.outbox.clear();
    }

    fn go_left(&mut self) {
        self.turn(self.direction.is_rtl());
    }

    fn go_right(&mut self) {
        self.turn(!self.direction.is_rtl());
    }

    fn go_to(&mut self, target: &NavTarget) {
        let index = match target {
            NavTarget::Location(location) => Some(location.spine_index()),
            NavTarget::Href(href) => {
                let path = href.split('#').next().unwrap_or_default();
                self.sections.iter().position(|section| section == path)
            }
        };
        match index {
            Some(index) if index < self.sections.len() => self.show(index),
            _ => warn!("Cannot navigate to {target:?}"),
        }
    }

    fn get_cfi(&self, index: usize, _range: Option<&SelectionRange>) -> Option<LocationId> {
        Some(LocationId::section_start(index))
    }

    fn add_annotation(&mut self, _annotation: &Annotation) {}

    fn delete_annotation(&mut self, _location: &LocationId) {}

    fn draw_overlay(&mut self, _location: &LocationId, _primitive: OverlayPrimitive) {}

    fn set_styles(&mut self, appearance: &Appearance) {
        debug!(
            "Styles: theme {}, line height {}",
            appearance.theme.name(),
            appearance.style.line_height
        );
    }

    fn add_listener(&mut self, _target: ListenerTarget, _kind: EventKind) -> ListenerId {
        self.next_listener_id += 1;
        self.listeners += 1;
        ListenerId(self.next_listener_id)
    }

    fn remove_listener(&mut self, _id: ListenerId) {
        self.listeners = self.listeners.saturating_sub(1);
    }

    fn frame_geometry(&self, _doc: DocumentId) -> Option<FrameGeometry> {
        Some(FrameGeometry::default())
    }

    fn viewport(&self) -> Viewport {
        Viewport::new(800.0, 600.0)
    }

    fn selection(&self, _doc: DocumentId) -> Option<SelectionRange> {
        None
    }

    fn dispatch_host_pointer(&mut self, _kind: PointerKind, _point: ScreenPoint) {}
}

fn deliver(session: &mut Session, view: &Rc<RefCell<WalkView>>) {
    let events = view.borrow_mut().drain();
    for event in events {
        session.handle_view_event(event, Instant::now());
    }
}

fn print_toc(entries: &[TocEntry], depth: usize) {
    for entry in entries {
        let location = entry
            .location
            .as_ref()
            .map(LocationId::as_str)
            .unwrap_or("-");
        println!("{}{}  ({}) {location}", "  ".repeat(depth + 1), entry.label, entry.href);
        print_toc(&entry.subitems, depth + 1);
    }
}

fn print_position(session: &Session, step: &str) {
    let snapshot = session.snapshot();
    println!(
        "{step:>8}: {}  chapter: {}  progress: {}",
        snapshot.location.map(LocationId::as_str).unwrap_or("-"),
        snapshot.chapter_label().unwrap_or("-"),
        snapshot
            .progress
            .map(|p| format!("{:.1}%", p * 100.0))
            .unwrap_or_else(|| "-".to_string()),
    );
}

fn main() -> Result<()> {
    panic_handler::initialize_panic_handler();
    let args = Args::parse();

    let settings = Settings::load_or_default();
    let level = args.log_level.unwrap_or_else(|| settings.log_level_filter());
    let log_file = File::create(&args.log_file)
        .with_context(|| format!("Failed to create log file {:?}", args.log_file))?;
    WriteLogger::init(level, Config::default(), log_file)?;
    info!("Starting session-walk on {:?}", args.file);

    let file = BookFile::from_path(&args.file)
        .with_context(|| format!("Failed to read {:?}", args.file))?;

    let view = Rc::new(RefCell::new(WalkView::default()));
    let mut session = Session::with_settings(&settings);
    session.render(view.clone())?;
    session
        .open(file)
        .with_context(|| format!("Failed to open {:?}", args.file))?;
    if !session.is_ready() {
        bail!("Session did not become ready");
    }

    if let Some(book) = session.book() {
        let metadata = &book.metadata;
        println!("Title:     {}", metadata.display_title());
        println!("Creator:   {}", metadata.creator.as_deref().unwrap_or("-"));
        println!("Language:  {}", metadata.language.as_deref().unwrap_or("-"));
        println!("Direction: {:?}", metadata.direction);
        println!("Sections:  {}", book.spine.len());
    }
    println!("Theme:     {}", session.appearance().theme.name());
    println!("Contents:");
    print_toc(session.table_of_contents(), 0);
    println!();

    deliver(&mut session, &view);
    print_position(&session, "open");

    for page in 1..=args.next {
        session.go_next();
        deliver(&mut session, &view);
        print_position(&session, &format!("next {page}"));
    }

    if let Some(target) = args.jump.as_deref() {
        session.jump_to(target);
        deliver(&mut session, &view);
        print_position(&session, "jump");
    }

    println!("Listeners: {}", session.listener_count());
    session.close();
    println!("Listeners after close: {}", view.borrow().listeners);

    info!("session-walk finished");
    Ok(())
}
