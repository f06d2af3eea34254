use serde::{Deserialize, Serialize};

/// Declared page progression of a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingDirection {
    #[default]
    Ltr,
    Rtl,
}

impl ReadingDirection {
    /// Reads an OPF `page-progression-direction` value. Unknown values and
    /// `default` fall back to left-to-right.
    pub fn from_page_progression(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("rtl") => ReadingDirection::Rtl,
            _ => ReadingDirection::Ltr,
        }
    }

    pub fn is_rtl(&self) -> bool {
        *self == ReadingDirection::Rtl
    }
}

/// Logical navigation request, independent of layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavIntent {
    Next,
    Prev,
}

/// The rendering engine's physical page-turn primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavPrimitive {
    GoLeft,
    GoRight,
}

/// The single mapping from logical intent to engine primitive. Buttons,
/// wheel and keyboard all go through here.
pub fn primitive_for(direction: ReadingDirection, intent: NavIntent) -> NavPrimitive {
    match (direction, intent) {
        (ReadingDirection::Ltr, NavIntent::Next) => NavPrimitive::GoRight,
        (ReadingDirection::Ltr, NavIntent::Prev) => NavPrimitive::GoLeft,
        (ReadingDirection::Rtl, NavIntent::Next) => NavPrimitive::GoLeft,
        (ReadingDirection::Rtl, NavIntent::Prev) => NavPrimitive::GoRight,
    }
}

pub fn direction_aware_next(direction: ReadingDirection) -> NavPrimitive {
    primitive_for(direction, NavIntent::Next)
}

pub fn direction_aware_prev(direction: ReadingDirection) -> NavPrimitive {
    primitive_for(direction, NavIntent::Prev)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ltr_mapping_is_unswapped() {
        assert_eq!(direction_aware_next(ReadingDirection::Ltr), NavPrimitive::GoRight);
        assert_eq!(direction_aware_prev(ReadingDirection::Ltr), NavPrimitive::GoLeft);
    }

    #[test]
    fn test_rtl_mapping_is_swapped() {
        assert_eq!(direction_aware_next(ReadingDirection::Rtl), NavPrimitive::GoLeft);
        assert_eq!(direction_aware_prev(ReadingDirection::Rtl), NavPrimitive::GoRight);
    }

    #[test]
    fn test_mapping_independent_of_call_order() {
        let sequence = [NavIntent::Prev, NavIntent::Next, NavIntent::Next, NavIntent::Prev];
        for direction in [ReadingDirection::Ltr, ReadingDirection::Rtl] {
            let forward: Vec<_> = sequence.iter().map(|i| primitive_for(direction, *i)).collect();
            let backward: Vec<_> = sequence
                .iter()
                .rev()
                .map(|i| primitive_for(direction, *i))
                .collect();
            assert_eq!(forward, backward.into_iter().rev().collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_page_progression_parsing() {
        assert_eq!(ReadingDirection::from_page_progression(Some("rtl")), ReadingDirection::Rtl);
        assert_eq!(ReadingDirection::from_page_progression(Some(" RTL ")), ReadingDirection::Rtl);
        assert_eq!(ReadingDirection::from_page_progression(Some("default")), ReadingDirection::Ltr);
        assert_eq!(ReadingDirection::from_page_progression(None), ReadingDirection::Ltr);
    }
}
