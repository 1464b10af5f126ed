/// One-line now-playing style summary: text on the left, `current/total` on
/// the right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub text: String,
    pub current: String,
    pub total: String,
}

impl Default for StatusLine {
    fn default() -> Self {
        Self {
            text: "tunelib - media library client".to_string(),
            current: "00:00".to_string(),
            total: "00:00".to_string(),
        }
    }
}

impl StatusLine {
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    #[allow(dead_code)]
    pub fn set_current(&mut self, seconds: u64) {
        self.current = format_time(seconds);
    }

    pub fn set_total(&mut self, seconds: u64) {
        self.total = format_time(seconds);
    }

    /// Lay the line out in `width` columns. The text is cut when both parts
    /// do not fit; the time part is always shown whole.
    pub fn render(&self, width: usize) -> String {
        let times = format!("{}/{}", self.current, self.total);
        let times_len = times.chars().count();

        let room = width.saturating_sub(times_len + 1);
        let text: String = self.text.chars().take(room).collect();
        let gap = width.saturating_sub(text.chars().count() + times_len).max(1);

        format!("{text}{}{times}", " ".repeat(gap))
    }
}

pub fn format_time(seconds: u64) -> String {
    let mins = seconds / 60;
    let secs = seconds % 60;
    format!("{mins:02}:{secs:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0), "00:00");
        assert_eq!(format_time(185), "03:05");
        assert_eq!(format_time(6001), "100:01");
    }

    #[test]
    fn test_render_pads_to_width() {
        let mut line = StatusLine::default();
        line.set_text("Band - Alpha");
        line.set_total(185);

        let rendered = line.render(30);
        assert_eq!(rendered.chars().count(), 30);
        assert!(rendered.starts_with("Band - Alpha "));
        assert!(rendered.ends_with("00:00/03:05"));
    }

    #[test]
    fn test_render_truncates_text() {
        let mut line = StatusLine::default();
        line.set_text("A very long title that will not fit");

        let rendered = line.render(20);
        assert_eq!(rendered, "A very l 00:00/00:00");
        assert_eq!(rendered.chars().count(), 20);
    }
}
