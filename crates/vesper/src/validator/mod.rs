//! Revision tags and dependency tracking.

mod tag;
mod tracking;

pub use tag::{
    CONSTANT, DirtyableTag, INITIAL, Revision, Tag, TagId, combine, create_tag, current_revision,
    dirty, validate, value_for_tag,
};
pub use tracking::{TrackingFrame, consume_tag, is_tracking, track, untrack};
