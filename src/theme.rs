use ratatui::style::{Color, Modifier, Style};

/// Colors used by the terminal front end
#[derive(Clone, Debug)]
pub struct Theme {
    /// Background color for the document pane
    pub background: Color,

    pub status_bar_fg: Color,
    pub status_bar_bg: Color,

    /// Color for the file name in the status bar
    pub filename_color: Color,

    /// Underline color for annotated text
    pub marker_color: Color,

    /// Background behind the leaves of the annotation whose popup is open
    pub marker_active_bg: Color,

    pub highlight_fg: Color,
    pub highlight_bg: Color,

    pub link_color: Color,

    pub popup_fg: Color,
    pub popup_bg: Color,

    /// Color of the replacement shortcuts in the popup
    pub popup_key_fg: Color,

    pub sidebar_fg: Color,
    pub sidebar_bg: Color,

    /// Sidebar entry of the active annotation
    pub sidebar_active_fg: Color,
    pub sidebar_active_bg: Color,

    /// Dimmed text, e.g. an empty sidebar
    pub muted_fg: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            background: Color::Reset,
            status_bar_fg: Color::White,
            status_bar_bg: Color::Blue,
            filename_color: Color::LightYellow,
            marker_color: Color::Red,
            marker_active_bg: Color::Rgb(80, 30, 30),
            highlight_fg: Color::Black,
            highlight_bg: Color::LightYellow,
            link_color: Color::Blue,
            popup_fg: Color::White,
            popup_bg: Color::Black,
            popup_key_fg: Color::LightYellow,
            sidebar_fg: Color::Gray,
            sidebar_bg: Color::Reset,
            sidebar_active_fg: Color::White,
            sidebar_active_bg: Color::LightBlue,
            muted_fg: Color::DarkGray,
        }
    }
}

impl Theme {
    pub fn status_bar_style(&self) -> Style {
        Style::default()
            .fg(self.status_bar_fg)
            .bg(self.status_bar_bg)
    }

    pub fn filename_style(&self) -> Style {
        Style::default().fg(self.filename_color)
    }

    /// Applied on top of the text style of every annotated leaf
    pub fn marker_style(&self, active: bool) -> Style {
        let style = Style::default()
            .add_modifier(Modifier::UNDERLINED)
            .underline_color(self.marker_color)
            .fg(self.marker_color);
        if active {
            style.bg(self.marker_active_bg)
        } else {
            style
        }
    }

    pub fn highlight_style(&self) -> Style {
        Style::default().fg(self.highlight_fg).bg(self.highlight_bg)
    }

    pub fn link_style(&self) -> Style {
        Style::default().fg(self.link_color)
    }

    pub fn popup_style(&self) -> Style {
        Style::default().fg(self.popup_fg).bg(self.popup_bg)
    }

    pub fn popup_key_style(&self) -> Style {
        Style::default()
            .fg(self.popup_key_fg)
            .bg(self.popup_bg)
            .add_modifier(Modifier::BOLD)
    }

    pub fn sidebar_style(&self) -> Style {
        Style::default().fg(self.sidebar_fg).bg(self.sidebar_bg)
    }

    pub fn sidebar_active_style(&self) -> Style {
        Style::default()
            .fg(self.sidebar_active_fg)
            .bg(self.sidebar_active_bg)
    }

    pub fn muted_style(&self) -> Style {
        Style::default().fg(self.muted_fg)
    }
}
