//! Location codec: portable positions, overlay geometry and direction-aware
//! navigation.

pub mod cfi;
pub mod direction;
pub mod geometry;

pub use cfi::{CfiError, LocationId};
pub use direction::{
    NavIntent, NavPrimitive, ReadingDirection, direction_aware_next, direction_aware_prev,
    primitive_for,
};
pub use geometry::{
    FrameGeometry, FrameScale, PopoverDirection, PopoverPosition, ScreenPoint, ScreenRect,
    Viewport, bounding_rect, resolve_popover_position,
};
