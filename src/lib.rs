pub mod annotations;
pub mod appearance;
pub mod archive;
pub mod book;
pub mod codec;
pub mod error;
pub mod events;
pub mod inputs;
pub mod listeners;
pub mod package_parser;
pub mod panic_handler;
pub mod relocation_bridge;
pub mod session;
pub mod settings;
pub mod view;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use annotations::{Annotation, SelectionCandidate};
pub use appearance::{Appearance, ReadingStyle, ThemeName};
pub use archive::{Archive, BookFile};
pub use book::{Book, TocEntry};
pub use codec::LocationId;
pub use error::{Result, SessionError};
pub use events::{DocumentEvent, ViewEvent};
pub use session::{Session, SessionConfig, SessionSnapshot, SessionState};
pub use settings::Settings;
pub use view::{RenderingView, SharedView};
