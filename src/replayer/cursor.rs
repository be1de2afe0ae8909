//! Playback position and timing bookkeeping.

/// Position, loop state, pending wait and played-tick count of one open file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackCursor {
    /// Byte offset of the next command (stream format only).
    pub offset: usize,
    /// Absolute loop target, if the stream loops.
    pub loop_target: Option<usize>,
    /// Passes left through the loop section; 1 means "stop at the next end command".
    pub loops_remaining: u32,
    /// Chip ticks to render before the next command or frame.
    pub pending_wait: u32,
    samples_played: u64,
    max_ticks: Option<u64>,
}

impl PlaybackCursor {
    /// Cursor with no file and no cap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewind to the first command of a stream.
    ///
    /// A looping stream plays its loop section exactly once more.
    pub fn start_stream(&mut self, data_start: usize, loop_target: Option<usize>) {
        self.offset = data_start;
        self.loop_target = loop_target;
        self.loops_remaining = if loop_target.is_some() { 2 } else { 1 };
        self.restart_timing();
    }

    /// Clear the pending wait and the played-tick count.
    pub fn restart_timing(&mut self) {
        self.pending_wait = 0;
        self.samples_played = 0;
    }

    /// Forget everything except the duration cap.
    pub fn clear(&mut self) {
        *self = Self {
            max_ticks: self.max_ticks,
            ..Self::default()
        };
    }

    /// Account for one rendered chip tick.
    pub fn tick(&mut self) {
        self.pending_wait = self.pending_wait.saturating_sub(1);
        self.samples_played += 1;
    }

    /// Chip ticks rendered since the file or track was started.
    pub fn samples_played(&self) -> u64 {
        self.samples_played
    }

    /// Duration cap in chip ticks.
    pub fn max_ticks(&self) -> Option<u64> {
        self.max_ticks
    }

    /// Set the duration cap in chip ticks; `None` removes it.
    pub fn set_max_ticks(&mut self, max_ticks: Option<u64>) {
        self.max_ticks = max_ticks;
    }

    /// True once the duration cap has been reached.
    pub fn cap_reached(&self) -> bool {
        self.max_ticks
            .is_some_and(|max| self.samples_played >= max)
    }

    /// Handle an end command. Returns the offset to continue from, or `None`
    /// when playback is over.
    pub fn take_loop(&mut self) -> Option<usize> {
        let target = self.loop_target?;
        if self.loops_remaining == 1 {
            return None;
        }
        if self.loops_remaining != 0 {
            self.loops_remaining -= 1;
        }
        self.offset = target;
        Some(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_looping_stream_stops_at_end() {
        let mut cursor = PlaybackCursor::new();
        cursor.start_stream(0x40, None);
        assert_eq!(cursor.loops_remaining, 1);
        assert_eq!(cursor.take_loop(), None);
    }

    #[test]
    fn looping_stream_loops_once() {
        let mut cursor = PlaybackCursor::new();
        cursor.start_stream(0x40, Some(0x50));
        cursor.offset = 0x90;
        assert_eq!(cursor.take_loop(), Some(0x50));
        assert_eq!(cursor.offset, 0x50);
        assert_eq!(cursor.take_loop(), None);
    }

    #[test]
    fn zero_loop_count_loops_forever() {
        let mut cursor = PlaybackCursor::new();
        cursor.start_stream(0x40, Some(0x40));
        cursor.loops_remaining = 0;
        for _ in 0..10 {
            assert_eq!(cursor.take_loop(), Some(0x40));
        }
    }

    #[test]
    fn cap_counts_ticks() {
        let mut cursor = PlaybackCursor::new();
        cursor.set_max_ticks(Some(3));
        cursor.pending_wait = 2;
        cursor.tick();
        cursor.tick();
        assert_eq!(cursor.pending_wait, 0);
        assert!(!cursor.cap_reached());
        cursor.tick();
        assert!(cursor.cap_reached());
        assert_eq!(cursor.pending_wait, 0);

        cursor.clear();
        assert_eq!(cursor.samples_played(), 0);
        assert_eq!(cursor.max_ticks(), Some(3));
    }
}
