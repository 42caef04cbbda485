//! Autotracking frames.
//!
//! While a frame is open, every tag consumed through [`consume_tag`] is
//! recorded in it. Closing the frame combines what was recorded. Frames nest
//! with strict stack discipline; [`TrackingFrame`] pops itself on drop, so a
//! panicking or erroring computation never leaves a frame behind.

use std::cell::RefCell;

use smallvec::SmallVec;

use super::tag::{Tag, combine};

type Recorded = SmallVec<[Tag; 8]>;

thread_local! {
    static FRAMES: RefCell<Vec<Recorded>> = const { RefCell::new(Vec::new()) };
}

/// Guard for one open tracking frame.
#[must_use = "dropping the frame discards what it tracked"]
pub struct TrackingFrame {
    depth: usize,
    finished: bool,
}

impl TrackingFrame {
    pub fn begin() -> Self {
        let depth = FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            frames.push(Recorded::new());
            frames.len()
        });
        Self { depth, finished: false }
    }

    /// Closes the frame and returns the combination of every consumed tag.
    pub fn finish(mut self) -> Tag {
        let recorded = self.pop();
        self.finished = true;
        combine(recorded)
    }

    fn pop(&self) -> Recorded {
        FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            debug_assert_eq!(
                frames.len(),
                self.depth,
                "tracking frames must close in the order they were opened"
            );
            frames.pop().unwrap_or_default()
        })
    }
}

impl Drop for TrackingFrame {
    fn drop(&mut self) {
        if !self.finished {
            self.finished = true;
            let _ = self.pop();
        }
    }
}

/// Records `tag` in the innermost open frame, if any.
pub fn consume_tag(tag: &Tag) {
    if tag.is_constant() {
        return;
    }
    FRAMES.with(|frames| {
        if let Some(top) = frames.borrow_mut().last_mut() {
            top.push(tag.clone());
        }
    });
}

pub fn is_tracking() -> bool {
    FRAMES.with(|frames| !frames.borrow().is_empty())
}

/// Runs `f` in a fresh frame and returns its result with the combined tag of
/// everything it consumed.
pub fn track<T>(f: impl FnOnce() -> T) -> (T, Tag) {
    let frame = TrackingFrame::begin();
    let value = f();
    (value, frame.finish())
}

/// Runs `f` without letting its reads leak into the enclosing frame.
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    let _frame = TrackingFrame::begin();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::{create_tag, validate, value_for_tag};

    #[test]
    fn track_collects_consumed_tags() {
        let a = create_tag();
        let b = create_tag();
        let ((), tag) = track(|| {
            consume_tag(&a.as_tag());
            consume_tag(&b.as_tag());
        });
        let snapshot = value_for_tag(&tag);
        a.dirty();
        assert!(!validate(&tag, snapshot));
    }

    #[test]
    fn nothing_consumed_is_constant() {
        let ((), tag) = track(|| {});
        assert!(tag.is_constant());
    }

    #[test]
    fn nested_frames_record_separately() {
        let outer_tag = create_tag();
        let inner_tag = create_tag();
        let (inner, outer) = track(|| {
            consume_tag(&outer_tag.as_tag());
            let ((), inner) = track(|| consume_tag(&inner_tag.as_tag()));
            inner
        });
        assert!(inner.ptr_eq(&inner_tag.as_tag()));
        assert!(outer.ptr_eq(&outer_tag.as_tag()));
    }

    #[test]
    fn untrack_hides_reads() {
        let hidden = create_tag();
        let ((), tag) = track(|| untrack(|| consume_tag(&hidden.as_tag())));
        assert!(tag.is_constant());
    }

    #[test]
    fn frame_closes_on_early_exit() {
        fn fails() -> Result<(), ()> {
            let _frame = TrackingFrame::begin();
            Err(())
        }
        assert!(!is_tracking());
        assert!(fails().is_err());
        assert!(!is_tracking());
    }

    #[test]
    fn frame_closes_on_panic() {
        let result = std::panic::catch_unwind(|| {
            let ((), _) = track(|| panic!("boom"));
        });
        assert!(result.is_err());
        assert!(!is_tracking());
    }
}
