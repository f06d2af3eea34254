//! Event payloads crossing from the rendering engine into the session.
//!
//! The engine hands over loosely shaped JSON. Everything is validated here;
//! only [`ViewEvent`] and [`DocumentEvent`] travel further.

use crate::codec::{CfiError, LocationId, ScreenPoint};
use crate::view::{DocumentId, EventKind, SelectionRange};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("malformed event payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("`{event}` event is missing `{field}`")]
    MissingField {
        event: &'static str,
        field: &'static str,
    },

    #[error("`{event}` event carries a bad location: {source}")]
    BadLocation {
        event: &'static str,
        #[source]
        source: CfiError,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawLoad {
    #[serde(default)]
    pub doc: Option<u64>,
    #[serde(default)]
    pub index: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRelocate {
    #[serde(default)]
    pub cfi: Option<String>,
    #[serde(default)]
    pub fraction: Option<f64>,
    #[serde(default)]
    pub section_fraction: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDrawAnnotation {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawShowAnnotation {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub range: Option<SelectionRange>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTextSelected {
    #[serde(default)]
    pub doc: Option<u64>,
    #[serde(default)]
    pub index: Option<usize>,
}

/// Engine lifecycle event as it arrives, e.g.
/// `{"type": "relocate", "detail": {"cfi": "epubcfi(/6/4!/4/2)"}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "kebab-case")]
pub enum RawViewEvent {
    Load(RawLoad),
    Relocate(RawRelocate),
    DrawAnnotation(RawDrawAnnotation),
    ShowAnnotation(RawShowAnnotation),
    TextSelected(RawTextSelected),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    Load {
        doc: DocumentId,
        index: usize,
    },
    Relocate {
        location: LocationId,
        fraction: Option<f64>,
        section_fraction: Option<f64>,
    },
    DrawAnnotation {
        location: LocationId,
        color: String,
    },
    ShowAnnotation {
        location: LocationId,
        index: usize,
        range: Option<SelectionRange>,
    },
    TextSelected {
        doc: DocumentId,
        index: usize,
    },
}

impl ViewEvent {
    pub fn from_json(payload: &str) -> Result<Self, EventError> {
        let raw: RawViewEvent = serde_json::from_str(payload)?;
        Self::try_from(raw)
    }

    pub fn kind(&self) -> EventKind {
        match self {
            ViewEvent::Load { .. } => EventKind::Load,
            ViewEvent::Relocate { .. } => EventKind::Relocate,
            ViewEvent::DrawAnnotation { .. } => EventKind::DrawAnnotation,
            ViewEvent::ShowAnnotation { .. } => EventKind::ShowAnnotation,
            ViewEvent::TextSelected { .. } => EventKind::TextSelected,
        }
    }
}

fn required<T>(value: Option<T>, event: &'static str, field: &'static str) -> Result<T, EventError> {
    value.ok_or(EventError::MissingField { event, field })
}

fn location(value: Option<String>, event: &'static str, field: &'static str) -> Result<LocationId, EventError> {
    let raw = required(value, event, field)?;
    LocationId::parse(&raw).map_err(|source| EventError::BadLocation { event, source })
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

impl TryFrom<RawViewEvent> for ViewEvent {
    type Error = EventError;

    fn try_from(raw: RawViewEvent) -> Result<Self, Self::Error> {
        Ok(match raw {
            RawViewEvent::Load(detail) => ViewEvent::Load {
                doc: DocumentId(required(detail.doc, "load", "doc")?),
                index: required(detail.index, "load", "index")?,
            },
            RawViewEvent::Relocate(detail) => ViewEvent::Relocate {
                location: location(detail.cfi, "relocate", "cfi")?,
                fraction: finite(detail.fraction),
                section_fraction: finite(detail.section_fraction),
            },
            RawViewEvent::DrawAnnotation(detail) => ViewEvent::DrawAnnotation {
                location: location(detail.value, "draw-annotation", "value")?,
                color: required(detail.color, "draw-annotation", "color")?,
            },
            RawViewEvent::ShowAnnotation(detail) => ViewEvent::ShowAnnotation {
                location: location(detail.value, "show-annotation", "value")?,
                index: required(detail.index, "show-annotation", "index")?,
                range: detail.range,
            },
            RawViewEvent::TextSelected(detail) => ViewEvent::TextSelected {
                doc: DocumentId(required(detail.doc, "text-selected", "doc")?),
                index: required(detail.index, "text-selected", "index")?,
            },
        })
    }
}

/// Input event from a content document (or the host fallback), e.g.
/// `{"type": "wheel", "deltaY": 120}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RawDocumentEvent {
    Keydown {
        #[serde(default)]
        key: Option<String>,
    },
    Wheel {
        #[serde(rename = "deltaX", default)]
        delta_x: f64,
        #[serde(rename = "deltaY", default)]
        delta_y: f64,
    },
    SelectionChange,
    PointerDown {
        #[serde(rename = "clientX", default)]
        x: Option<f64>,
        #[serde(rename = "clientY", default)]
        y: Option<f64>,
    },
    MouseMove {
        #[serde(rename = "clientX", default)]
        x: Option<f64>,
        #[serde(rename = "clientY", default)]
        y: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocumentEvent {
    Keydown { key: String },
    Wheel { delta_x: f64, delta_y: f64 },
    SelectionChange,
    /// Coordinates are in the content document's space.
    PointerDown(ScreenPoint),
    MouseMove(ScreenPoint),
}

impl DocumentEvent {
    pub fn from_json(payload: &str) -> Result<Self, EventError> {
        let raw: RawDocumentEvent = serde_json::from_str(payload)?;
        Self::try_from(raw)
    }

    pub fn key(key: impl Into<String>) -> Self {
        DocumentEvent::Keydown { key: key.into() }
    }

    pub fn wheel(delta_x: f64, delta_y: f64) -> Self {
        DocumentEvent::Wheel { delta_x, delta_y }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            DocumentEvent::Keydown { .. } => EventKind::Keydown,
            DocumentEvent::Wheel { .. } => EventKind::Wheel,
            DocumentEvent::SelectionChange => EventKind::SelectionChange,
            DocumentEvent::PointerDown(_) => EventKind::PointerDown,
            DocumentEvent::MouseMove(_) => EventKind::MouseMove,
        }
    }
}

fn point(x: Option<f64>, y: Option<f64>, event: &'static str) -> Result<ScreenPoint, EventError> {
    let x = finite(x).ok_or(EventError::MissingField { event, field: "clientX" })?;
    let y = finite(y).ok_or(EventError::MissingField { event, field: "clientY" })?;
    Ok(ScreenPoint::new(x, y))
}

impl TryFrom<RawDocumentEvent> for DocumentEvent {
    type Error = EventError;

    fn try_from(raw: RawDocumentEvent) -> Result<Self, Self::Error> {
        Ok(match raw {
            RawDocumentEvent::Keydown { key } => DocumentEvent::Keydown {
                key: required(key, "keydown", "key")?,
            },
            RawDocumentEvent::Wheel { delta_x, delta_y } => DocumentEvent::Wheel {
                delta_x: if delta_x.is_finite() { delta_x } else { 0.0 },
                delta_y: if delta_y.is_finite() { delta_y } else { 0.0 },
            },
            RawDocumentEvent::SelectionChange => DocumentEvent::SelectionChange,
            RawDocumentEvent::PointerDown { x, y } => DocumentEvent::PointerDown(point(x, y, "pointerdown")?),
            RawDocumentEvent::MouseMove { x, y } => DocumentEvent::MouseMove(point(x, y, "mousemove")?),
        })
    }
}
