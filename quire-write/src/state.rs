//! The lifecycle of indirect objects.
//!
//! Every slot of the cross-reference table is in exactly one [`Lifecycle`]
//! state. All changes of that state go through [`transition`], so that the
//! rules for what may happen to an object once it was written, freed or
//! released live in one place.
//!
//! ```text
//!             load                flush
//!  Unloaded ─────────▶ Loaded ───────────▶ Flushed
//!     ▲                  │ ▲
//!     │      release     │ │ reuse
//!  Released ◀────────────┘ │
//!                          │
//!            free ──────▶ Free
//! ```

use quire_syntax::object::ObjectFlags;

/// The lifecycle state of an indirect object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// The object exists in the source file but hasn't been read yet.
    Unloaded,
    /// The object is held in memory and can be read and modified.
    Loaded,
    /// The object was dropped from memory and will be read again from the
    /// source file on the next access.
    Released,
    /// The object was written to the output. Its content is gone.
    Flushed,
    /// The slot is on the free list.
    Free,
}

/// Something that is done to an indirect object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    /// The content of the object is needed.
    Load,
    /// The content is about to be changed.
    Modify,
    /// The object is written to the output.
    Flush,
    /// The in-memory content should be dropped.
    Release,
    /// The slot should be put on the free list.
    Free,
    /// A free slot is handed out for a new object.
    Reuse,
}

/// The outcome of applying an [`Event`] to an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    /// The object moves to the given state.
    Move(Lifecycle),
    /// Nothing happens, for the given reason.
    Ignore(&'static str),
    /// The event is illegal in the current state.
    Reject,
}

/// Decide what happens when `event` is applied to an object in state `current`
/// with the given flags.
pub(crate) fn transition(current: Lifecycle, flags: ObjectFlags, event: Event) -> Transition {
    use Lifecycle::*;

    match (event, current) {
        (Event::Load, Unloaded | Released) => Transition::Move(Loaded),
        (Event::Load, Loaded) => Transition::Ignore("already loaded"),
        (Event::Load, Free) => Transition::Ignore("object is free"),
        (Event::Load, Flushed) => Transition::Reject,

        (Event::Modify, Loaded) => Transition::Move(Loaded),
        (Event::Modify, Unloaded | Released | Flushed | Free) => Transition::Reject,

        (Event::Flush, Loaded) => Transition::Move(Flushed),
        (Event::Flush, Unloaded | Released) => Transition::Reject,
        (Event::Flush, Flushed) => Transition::Ignore("already flushed"),
        (Event::Flush, Free) => Transition::Ignore("object is free"),

        (Event::Release, Loaded) => {
            if flags.contains(ObjectFlags::FORBID_RELEASE) {
                Transition::Ignore("release is forbidden")
            } else if flags.contains(ObjectFlags::MODIFIED) {
                Transition::Ignore("object is modified")
            } else {
                Transition::Move(Released)
            }
        }
        (Event::Release, Unloaded | Released) => Transition::Ignore("object is not loaded"),
        (Event::Release, Flushed) => Transition::Ignore("object is flushed"),
        (Event::Release, Free) => Transition::Ignore("object is free"),

        (Event::Free, Flushed) => Transition::Ignore("object is already flushed"),
        (Event::Free, Free) => Transition::Ignore("object is already free"),
        (Event::Free, _) if flags.contains(ObjectFlags::MUST_BE_FLUSHED) => {
            Transition::Ignore("object is referenced by a flushed object")
        }
        (Event::Free, Unloaded | Loaded | Released) => Transition::Move(Free),

        (Event::Reuse, Free) => Transition::Move(Loaded),
        (Event::Reuse, _) => Transition::Reject,
    }
}

#[cfg(test)]
mod tests {
    use super::{Event, Lifecycle, Transition, transition};
    use quire_syntax::object::ObjectFlags;

    #[test]
    fn flushed_objects_are_unavailable() {
        let flags = ObjectFlags::empty();

        assert_eq!(
            transition(Lifecycle::Flushed, flags, Event::Load),
            Transition::Reject
        );
        assert_eq!(
            transition(Lifecycle::Flushed, flags, Event::Modify),
            Transition::Reject
        );
        assert!(matches!(
            transition(Lifecycle::Flushed, flags, Event::Flush),
            Transition::Ignore(_)
        ));
    }

    #[test]
    fn release_rules() {
        assert_eq!(
            transition(Lifecycle::Loaded, ObjectFlags::empty(), Event::Release),
            Transition::Move(Lifecycle::Released)
        );
        assert!(matches!(
            transition(Lifecycle::Loaded, ObjectFlags::FORBID_RELEASE, Event::Release),
            Transition::Ignore(_)
        ));
        assert!(matches!(
            transition(Lifecycle::Loaded, ObjectFlags::MODIFIED, Event::Release),
            Transition::Ignore(_)
        ));
        assert_eq!(
            transition(Lifecycle::Released, ObjectFlags::empty(), Event::Load),
            Transition::Move(Lifecycle::Loaded)
        );
    }

    #[test]
    fn free_rules() {
        assert_eq!(
            transition(Lifecycle::Unloaded, ObjectFlags::empty(), Event::Free),
            Transition::Move(Lifecycle::Free)
        );
        assert!(matches!(
            transition(Lifecycle::Loaded, ObjectFlags::MUST_BE_FLUSHED, Event::Free),
            Transition::Ignore(_)
        ));
        assert!(matches!(
            transition(Lifecycle::Flushed, ObjectFlags::empty(), Event::Free),
            Transition::Ignore(_)
        ));
        assert_eq!(
            transition(Lifecycle::Free, ObjectFlags::empty(), Event::Reuse),
            Transition::Move(Lifecycle::Loaded)
        );
        assert_eq!(
            transition(Lifecycle::Loaded, ObjectFlags::empty(), Event::Reuse),
            Transition::Reject
        );
    }
}
