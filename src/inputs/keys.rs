use crate::codec::NavIntent;

/// Reading keys understood inside the content document. Keys map to a
/// logical intent; the reading direction is applied later, in one place.
pub fn intent_for_key(key: &str) -> Option<NavIntent> {
    match key {
        "ArrowLeft" | "h" => Some(NavIntent::Prev),
        "ArrowRight" | "l" => Some(NavIntent::Next),
        _ => None,
    }
}

/// Forward when either axis scrolls positive, back when either scrolls
/// negative. A gesture with no movement is ignored.
pub fn wheel_intent(delta_x: f64, delta_y: f64) -> Option<NavIntent> {
    let sign = |v: f64| if v > 0.0 { 1 } else if v < 0.0 { -1 } else { 0 };
    let (sx, sy) = (sign(delta_x), sign(delta_y));
    if sx > 0 || sy > 0 {
        Some(NavIntent::Next)
    } else if sx < 0 || sy < 0 {
        Some(NavIntent::Prev)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_mapping() {
        assert_eq!(intent_for_key("ArrowLeft"), Some(NavIntent::Prev));
        assert_eq!(intent_for_key("h"), Some(NavIntent::Prev));
        assert_eq!(intent_for_key("ArrowRight"), Some(NavIntent::Next));
        assert_eq!(intent_for_key("l"), Some(NavIntent::Next));
        assert_eq!(intent_for_key("H"), None);
        assert_eq!(intent_for_key("ArrowUp"), None);
    }

    #[test]
    fn test_wheel_mapping() {
        assert_eq!(wheel_intent(0.0, 120.0), Some(NavIntent::Next));
        assert_eq!(wheel_intent(0.0, -120.0), Some(NavIntent::Prev));
        assert_eq!(wheel_intent(30.0, 0.0), Some(NavIntent::Next));
        assert_eq!(wheel_intent(-30.0, 0.0), Some(NavIntent::Prev));
        assert_eq!(wheel_intent(0.0, 0.0), None);
        assert_eq!(wheel_intent(0.0, -0.0), None);
    }
}
