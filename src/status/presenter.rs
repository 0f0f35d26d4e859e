//! Payload to display state mapping.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DotColor {
    Red,
    Yellow,
    Green,
}

impl DotColor {
    /// RGB value used when the dot is drawn.
    pub fn rgb(&self) -> (u8, u8, u8) {
        match self {
            DotColor::Red => (255, 59, 48),
            DotColor::Yellow => (255, 204, 0),
            DotColor::Green => (50, 215, 75),
        }
    }
}

/// What the indicator should show. A plain value with no identity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum DisplayState {
    #[default]
    Hidden,
    Dot(DotColor),
    Text(String),
}

/// Maps a decoded payload to its display state.
///
/// Reserved tokens are matched case-insensitively against the whole payload;
/// anything else is shown as text with its original casing. No trimming.
pub fn present(payload: &str) -> DisplayState {
    match payload.to_lowercase().as_str() {
        "red" => DisplayState::Dot(DotColor::Red),
        "yellow" => DisplayState::Dot(DotColor::Yellow),
        "green" => DisplayState::Dot(DotColor::Green),
        "no_color" => DisplayState::Hidden,
        _ => DisplayState::Text(payload.to_string()),
    }
}
