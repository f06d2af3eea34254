use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static MATRIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"matrix\((.+)\)").expect("Failed to compile matrix transform regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub const ORIGIN: ScreenPoint = ScreenPoint { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Strictly inside the viewport; points on the edge count as hidden.
    fn is_within(&self, viewport: Viewport) -> bool {
        self.x > 0.0 && self.y > 0.0 && self.x < viewport.width && self.y < viewport.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScreenRect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl ScreenRect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    fn from_edges(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self::new(left, top, right - left, bottom - top)
    }

    fn union(&self, other: &ScreenRect) -> ScreenRect {
        ScreenRect::from_edges(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Host-space placement of the frame that owns a content document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameGeometry {
    /// Frame bounding rectangle in host coordinates.
    pub bounds: ScreenRect,
    /// Computed CSS `transform` of the frame element, e.g. `matrix(0.5, 0, 0, 0.5, 0, 0)`.
    #[serde(default)]
    pub transform: Option<String>,
}

impl FrameGeometry {
    pub fn at(left: f64, top: f64) -> Self {
        Self {
            bounds: ScreenRect::new(left, top, 0.0, 0.0),
            transform: None,
        }
    }

    pub fn with_transform(mut self, transform: impl Into<String>) -> Self {
        self.transform = Some(transform.into());
        self
    }

    pub fn scale(&self) -> FrameScale {
        self.transform
            .as_deref()
            .map(FrameScale::from_css_transform)
            .unwrap_or_default()
    }

    /// Maps a rectangle from content-document coordinates into host coordinates.
    pub fn project(&self, rect: &ScreenRect) -> ScreenRect {
        let FrameScale { sx, sy } = self.scale();
        ScreenRect::from_edges(
            sx * rect.left + self.bounds.left,
            sy * rect.top + self.bounds.top,
            sx * rect.right() + self.bounds.left,
            sy * rect.bottom() + self.bounds.top,
        )
    }

    pub fn project_point(&self, point: ScreenPoint) -> ScreenPoint {
        let FrameScale { sx, sy } = self.scale();
        ScreenPoint::new(
            sx * point.x + self.bounds.left,
            sy * point.y + self.bounds.top,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameScale {
    pub sx: f64,
    pub sy: f64,
}

impl Default for FrameScale {
    fn default() -> Self {
        Self { sx: 1.0, sy: 1.0 }
    }
}

impl FrameScale {
    /// Reads `a` and `d` of a 2D `matrix(a, b, c, d, e, f)`. Anything else,
    /// including `none`, is an identity scale.
    pub fn from_css_transform(transform: &str) -> Self {
        let Some(args) = MATRIX_RE.captures(transform).and_then(|c| c.get(1)) else {
            return Self::default();
        };
        let values: Vec<f64> = args
            .as_str()
            .split(',')
            .map(|v| v.trim().parse::<f64>().unwrap_or(f64::NAN))
            .collect();
        let pick = |i: usize| {
            values
                .get(i)
                .copied()
                .filter(|v| v.is_finite())
                .unwrap_or(1.0)
        };
        Self {
            sx: pick(0),
            sy: pick(3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PopoverDirection {
    Up,
    Down,
}

/// Where a popover anchored to a selection should point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PopoverPosition {
    pub point: ScreenPoint,
    pub direction: Option<PopoverDirection>,
}

impl PopoverPosition {
    pub const HIDDEN: PopoverPosition = PopoverPosition {
        point: ScreenPoint::ORIGIN,
        direction: None,
    };

    pub fn is_hidden(&self) -> bool {
        self.direction.is_none()
    }
}

/// Picks the popover anchor for a selection given its client rects in
/// content-document coordinates.
///
/// The start anchor is the top-center of the first line (popover opens
/// upward), the end anchor the bottom-center of the last line (opens
/// downward). When both are visible the one with more room wins. When
/// neither is, the result is [`PopoverPosition::HIDDEN`].
pub fn resolve_popover_position(
    client_rects: &[ScreenRect],
    frame: Option<&FrameGeometry>,
    viewport: Viewport,
) -> PopoverPosition {
    let (Some(first), Some(last)) = (client_rects.first(), client_rects.last()) else {
        return PopoverPosition::HIDDEN;
    };
    let identity = FrameGeometry::default();
    let frame = frame.unwrap_or(&identity);
    let first = frame.project(first);
    let last = frame.project(last);

    let start = PopoverPosition {
        point: ScreenPoint::new((first.left + first.right()) / 2.0, first.top),
        direction: Some(PopoverDirection::Up),
    };
    let end = PopoverPosition {
        point: ScreenPoint::new((last.left + last.right()) / 2.0, last.bottom()),
        direction: Some(PopoverDirection::Down),
    };

    match (
        start.point.is_within(viewport),
        end.point.is_within(viewport),
    ) {
        (false, false) => PopoverPosition::HIDDEN,
        (false, true) => end,
        (true, false) => start,
        (true, true) => {
            if start.point.y > viewport.height - end.point.y {
                start
            } else {
                end
            }
        }
    }
}

/// Host-space bounding box of all client rects.
pub fn bounding_rect(client_rects: &[ScreenRect], frame: Option<&FrameGeometry>) -> Option<ScreenRect> {
    let identity = FrameGeometry::default();
    let frame = frame.unwrap_or(&identity);
    client_rects
        .iter()
        .map(|rect| frame.project(rect))
        .reduce(|acc, rect| acc.union(&rect))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEWPORT: Viewport = Viewport {
        width: 800.0,
        height: 600.0,
    };

    #[test]
    fn test_scale_parsing() {
        let scale = FrameScale::from_css_transform("matrix(0.5, 0, 0, 0.75, 10, 20)");
        assert_eq!(scale, FrameScale { sx: 0.5, sy: 0.75 });
        assert_eq!(FrameScale::from_css_transform("none"), FrameScale::default());
        assert_eq!(
            FrameScale::from_css_transform("matrix(2, 0)"),
            FrameScale { sx: 2.0, sy: 1.0 }
        );
    }

    #[test]
    fn test_projection_applies_scale_then_offset() {
        let frame = FrameGeometry::at(100.0, 50.0).with_transform("matrix(0.5, 0, 0, 0.5, 0, 0)");
        let projected = frame.project(&ScreenRect::new(200.0, 100.0, 40.0, 20.0));
        assert_eq!(projected, ScreenRect::new(200.0, 100.0, 20.0, 10.0));
    }

    #[test]
    fn test_prefers_end_when_more_room_below() {
        let rects = [
            ScreenRect::new(100.0, 100.0, 200.0, 20.0),
            ScreenRect::new(100.0, 120.0, 100.0, 20.0),
        ];
        let position = resolve_popover_position(&rects, None, VIEWPORT);
        assert_eq!(position.direction, Some(PopoverDirection::Down));
        assert_eq!(position.point, ScreenPoint::new(150.0, 140.0));
    }

    #[test]
    fn test_prefers_start_when_more_room_above() {
        let rects = [
            ScreenRect::new(100.0, 500.0, 200.0, 20.0),
            ScreenRect::new(100.0, 520.0, 100.0, 20.0),
        ];
        let position = resolve_popover_position(&rects, None, VIEWPORT);
        assert_eq!(position.direction, Some(PopoverDirection::Up));
        assert_eq!(position.point, ScreenPoint::new(200.0, 500.0));
    }

    #[test]
    fn test_falls_back_to_visible_anchor() {
        // Selection starts above the viewport.
        let rects = [
            ScreenRect::new(100.0, -40.0, 200.0, 20.0),
            ScreenRect::new(100.0, 10.0, 100.0, 20.0),
        ];
        let position = resolve_popover_position(&rects, None, VIEWPORT);
        assert_eq!(position.direction, Some(PopoverDirection::Down));
    }

    #[test]
    fn test_hidden_when_both_anchors_outside() {
        let rects = [
            ScreenRect::new(900.0, 700.0, 50.0, 20.0),
            ScreenRect::new(-200.0, 900.0, 50.0, 20.0),
        ];
        let position = resolve_popover_position(&rects, None, VIEWPORT);
        assert_eq!(position, PopoverPosition::HIDDEN);
        assert!(position.is_hidden());
        assert_eq!(
            resolve_popover_position(&[], None, VIEWPORT),
            PopoverPosition::HIDDEN
        );
    }

    #[test]
    fn test_scaled_frame_brings_anchor_into_view() {
        // Unscaled, both anchors sit below the viewport.
        let rects = [ScreenRect::new(400.0, 1000.0, 200.0, 40.0)];
        let frame = FrameGeometry::at(0.0, 0.0).with_transform("matrix(0.5, 0, 0, 0.5, 0, 0)");
        assert!(resolve_popover_position(&rects, None, VIEWPORT).is_hidden());

        let position = resolve_popover_position(&rects, Some(&frame), VIEWPORT);
        assert_eq!(position.direction, Some(PopoverDirection::Up));
        assert_eq!(position.point, ScreenPoint::new(250.0, 500.0));
    }

    #[test]
    fn test_bounding_rect_unions_lines() {
        let rects = [
            ScreenRect::new(100.0, 100.0, 200.0, 20.0),
            ScreenRect::new(50.0, 120.0, 100.0, 20.0),
        ];
        let frame = FrameGeometry::at(10.0, 10.0);
        assert_eq!(
            bounding_rect(&rects, Some(&frame)),
            Some(ScreenRect::new(60.0, 110.0, 250.0, 40.0))
        );
        assert_eq!(bounding_rect(&[], None), None);
    }
}
