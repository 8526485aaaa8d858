use crate::chat::{ChatMessage, ChatRole};

/// How close to the last line counts as "near the bottom". The original
/// pixel threshold maps to rows here.
pub const NEAR_BOTTOM_LINES: u16 = 3;

/// Scroll state for the chat transcript. Decides, from three inputs only
/// (near-bottom, just-sent user message, streaming active), whether the
/// view re-anchors or leaves the reader's position alone.
#[derive(Debug)]
pub struct ChatScroll {
    pub offset: u16,
    total_lines: u16,
    viewport: u16,
    near_bottom: bool,
    force_bottom: bool,
    prev_count: usize,
}

impl ChatScroll {
    pub fn new() -> Self {
        Self {
            offset: 0,
            total_lines: 0,
            viewport: 0,
            near_bottom: true,
            force_bottom: true,
            prev_count: 0,
        }
    }

    /// Called from render with the wrapped line count and visible height.
    pub fn set_extents(&mut self, total_lines: u16, viewport: u16) {
        self.total_lines = total_lines;
        self.viewport = viewport;
        self.offset = self.offset.min(self.max_offset());
    }

    fn max_offset(&self) -> u16 {
        self.total_lines.saturating_sub(self.viewport)
    }

    fn distance_from_bottom(&self) -> u16 {
        self.max_offset().saturating_sub(self.offset)
    }

    pub fn is_near_bottom(&self) -> bool {
        self.near_bottom
    }

    pub fn anchor_to_bottom(&mut self) {
        self.offset = self.max_offset();
        self.near_bottom = true;
    }

    /// Manual scrolling (keys or mouse wheel). Re-evaluates near-bottom so
    /// a reader who scrolls away is left alone during streaming.
    pub fn scroll_up(&mut self, lines: u16) {
        self.offset = self.offset.saturating_sub(lines);
        self.near_bottom = self.distance_from_bottom() <= NEAR_BOTTOM_LINES;
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.offset = (self.offset.saturating_add(lines)).min(self.max_offset());
        self.near_bottom = self.distance_from_bottom() <= NEAR_BOTTOM_LINES;
    }

    /// Track list growth. A newly appended user message always forces an
    /// immediate anchor, regardless of the current position.
    pub fn note_messages(&mut self, messages: &[ChatMessage]) {
        if messages.len() > self.prev_count {
            if let Some(last) = messages.last() {
                if last.role == ChatRole::User {
                    self.force_bottom = true;
                    self.anchor_to_bottom();
                }
            }
            self.prev_count = messages.len();
        }
    }

    /// Fixed-cadence re-anchor while a response streams. Does nothing when
    /// the reader has scrolled away and no scroll was forced.
    pub fn on_tick(&mut self, streaming: bool) {
        if streaming && (self.force_bottom || self.near_bottom) {
            self.anchor_to_bottom();
        }
    }

    /// One-shot anchor when streaming ends or the list changes outside a
    /// stream: scroll once if auto-scroll is active, re-evaluate
    /// near-bottom, clear the forced flag.
    pub fn settle(&mut self) {
        if self.force_bottom || self.near_bottom {
            self.anchor_to_bottom();
        }
        self.near_bottom = self.distance_from_bottom() <= NEAR_BOTTOM_LINES;
        self.force_bottom = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(text: &str) -> ChatMessage {
        ChatMessage {
            role: ChatRole::User,
            text: text.to_string(),
        }
    }

    fn assistant(text: &str) -> ChatMessage {
        ChatMessage {
            role: ChatRole::Assistant,
            text: text.to_string(),
        }
    }

    /// 200 lines of content in a 20-line viewport; reader scrolled to top.
    fn scrolled_away() -> ChatScroll {
        let mut scroll = ChatScroll::new();
        scroll.set_extents(200, 20);
        scroll.anchor_to_bottom();
        scroll.settle();
        scroll.scroll_up(160);
        assert!(!scroll.is_near_bottom());
        scroll
    }

    #[test]
    fn test_new_user_message_forces_scroll_from_anywhere() {
        let mut scroll = scrolled_away();
        let messages = vec![assistant("old"), user("new question")];
        scroll.note_messages(&messages);
        assert_eq!(scroll.offset, 180); // max offset for 200/20
        assert!(scroll.is_near_bottom());
    }

    #[test]
    fn test_streaming_does_not_move_a_reader_who_scrolled_away() {
        let mut scroll = scrolled_away();
        let before = scroll.offset;
        for _ in 0..10 {
            scroll.on_tick(true);
        }
        assert_eq!(scroll.offset, before);
    }

    #[test]
    fn test_streaming_reanchors_when_near_bottom() {
        let mut scroll = ChatScroll::new();
        scroll.set_extents(100, 20);
        scroll.anchor_to_bottom();
        scroll.settle();
        // New content arrives, transcript grows
        scroll.set_extents(120, 20);
        scroll.on_tick(true);
        assert_eq!(scroll.offset, 100);
    }

    #[test]
    fn test_settle_anchors_once_and_clears_forced_flag() {
        let mut scroll = ChatScroll::new();
        scroll.set_extents(100, 20);
        let messages = vec![user("q")];
        scroll.note_messages(&messages);
        scroll.settle();
        assert!(scroll.is_near_bottom());

        // Forced flag is cleared: scrolling away now sticks
        scroll.scroll_up(60);
        let before = scroll.offset;
        scroll.on_tick(true);
        assert_eq!(scroll.offset, before);
    }

    #[test]
    fn test_assistant_append_does_not_force_scroll() {
        let mut scroll = scrolled_away();
        let before = scroll.offset;
        let messages = vec![user("q"), assistant("a")];
        // prev_count starts behind, so this registers as growth
        scroll.note_messages(&messages);
        assert_eq!(scroll.offset, before);
    }

    #[test]
    fn test_near_bottom_within_threshold() {
        let mut scroll = ChatScroll::new();
        scroll.set_extents(100, 20);
        scroll.anchor_to_bottom();
        scroll.scroll_up(NEAR_BOTTOM_LINES);
        assert!(scroll.is_near_bottom());
        scroll.scroll_up(1);
        assert!(!scroll.is_near_bottom());
    }

    #[test]
    fn test_extents_shrink_clamps_offset() {
        let mut scroll = ChatScroll::new();
        scroll.set_extents(200, 20);
        scroll.anchor_to_bottom();
        scroll.set_extents(50, 20);
        assert_eq!(scroll.offset, 30);
    }
}
