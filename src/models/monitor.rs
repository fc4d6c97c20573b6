// Monitor Model
// One physical display as reported by the OS at enumeration time

use serde::Serialize;

/// A physical display captured during one enumeration pass.
///
/// Indices are 1-based and only meaningful within the pass that produced
/// them. Re-enumeration replaces the whole list, so a selection held by
/// index must be re-validated against the fresh list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Monitor {
    /// 1-based position in enumeration order
    pub index: usize,
    /// Device identifier, e.g. `\\.\DISPLAY1`
    pub device: String,
    /// Virtual-desktop coordinates; right > left, bottom > top
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    /// Effective DPI, present only when the monitor answered the query
    pub dpi_x: Option<u32>,
    pub dpi_y: Option<u32>,
}

impl Monitor {
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// Scale percentage relative to the 96 dpi baseline, rounded.
    pub fn scale_pct(&self) -> Option<u32> {
        self.dpi_x
            .map(|dpi| ((dpi as f64 / 96.0) * 100.0).round() as u32)
    }

    /// One-line description for display pickers and logs.
    pub fn label(&self) -> String {
        let dpi_info = match (self.dpi_x, self.scale_pct()) {
            (Some(dpi), Some(scale)) => format!(" | DPI {dpi} ({scale}%)"),
            _ => String::new(),
        };
        format!(
            "Monitor {} - {}x{} ({}) @ {},{}{}",
            self.index,
            self.width(),
            self.height(),
            self.device,
            self.left,
            self.top,
            dpi_info
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(index: usize, left: i32, top: i32, right: i32, bottom: i32) -> Monitor {
        Monitor {
            index,
            device: format!("\\\\.\\DISPLAY{index}"),
            left,
            top,
            right,
            bottom,
            dpi_x: None,
            dpi_y: None,
        }
    }

    #[test]
    fn test_side_by_side_layout_geometry() {
        let a = monitor(1, 0, 0, 1920, 1080);
        let b = monitor(2, 1920, 0, 3840, 1080);

        assert_eq!(a.width(), 1920);
        assert_eq!(a.height(), 1080);
        assert_eq!(b.width(), 1920);
        assert_eq!(b.height(), 1080);
        assert_eq!(b.left, 1920);
    }

    #[test]
    fn test_scale_pct_rounds_from_dpi() {
        let mut m = monitor(1, 0, 0, 2560, 1440);
        assert_eq!(m.scale_pct(), None);

        m.dpi_x = Some(96);
        assert_eq!(m.scale_pct(), Some(100));

        m.dpi_x = Some(144);
        assert_eq!(m.scale_pct(), Some(150));

        m.dpi_x = Some(120);
        assert_eq!(m.scale_pct(), Some(125));
    }

    #[test]
    fn test_label_with_and_without_dpi() {
        let mut m = monitor(2, -1920, 0, 0, 1200);
        assert_eq!(m.label(), "Monitor 2 - 1920x1200 (\\\\.\\DISPLAY2) @ -1920,0");

        m.dpi_x = Some(144);
        m.dpi_y = Some(144);
        assert_eq!(
            m.label(),
            "Monitor 2 - 1920x1200 (\\\\.\\DISPLAY2) @ -1920,0 | DPI 144 (150%)"
        );
    }
}
