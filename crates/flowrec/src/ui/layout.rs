//! Screen regions of the viewer.

use ratatui::layout::{Constraint, Layout, Rect};

const HEADER_HEIGHT: u16 = 3;
const FOOTER_HEIGHT: u16 = 3;

/// Below this width captions get too short to read at 30%.
const NARROW_WIDTH: u16 = 100;

/// Where each widget is drawn.
#[derive(Debug, Clone, Copy)]
pub struct AppLayout {
    pub header: Rect,
    /// Numbered step captions.
    pub list_area: Rect,
    /// Everything known about the selected step.
    pub detail_area: Rect,
    pub footer: Rect,
}

impl AppLayout {
    /// Splits `area` into header, step list, detail panel and footer.
    ///
    /// The step list takes 30% of the width, or 40% on terminals
    /// narrower than 100 columns.
    pub fn new(area: Rect) -> Self {
        let [header, body, footer] = Layout::vertical([
            Constraint::Length(HEADER_HEIGHT),
            Constraint::Min(10),
            Constraint::Length(FOOTER_HEIGHT),
        ])
        .areas(area);

        let list_share = list_percentage(area.width);
        let [list_area, detail_area] = Layout::horizontal([
            Constraint::Percentage(list_share),
            Constraint::Percentage(100 - list_share),
        ])
        .areas(body);

        Self {
            header,
            list_area,
            detail_area,
            footer,
        }
    }
}

fn list_percentage(width: u16) -> u16 {
    if width < NARROW_WIDTH {
        40
    } else {
        30
    }
}
