use super::presenter::DisplayState;

const DOT: &str = "●";
const RESET: &str = "\x1b[0m";

/// Terminal rendering of a display state. `Hidden` renders as an empty string.
pub fn render(state: &DisplayState) -> String {
    match state {
        DisplayState::Hidden => String::new(),
        DisplayState::Dot(color) => {
            let (r, g, b) = color.rgb();
            format!("\x1b[38;2;{};{};{}m{}{}", r, g, b, DOT, RESET)
        }
        DisplayState::Text(text) => text.clone(),
    }
}

/// Tracks the currently shown state so repeated updates are not redrawn.
#[derive(Debug, Default)]
pub struct Indicator {
    current: DisplayState,
}

impl Indicator {
    /// Stores `next` and returns its rendering if it differs from what is shown.
    pub fn update(&mut self, next: DisplayState) -> Option<String> {
        if next == self.current {
            return None;
        }
        let rendered = render(&next);
        self.current = next;
        Some(rendered)
    }
}
