use bitflags::bitflags;

bitflags! {
    /// Orthogonal markers carried by indirect objects and by the containers
    /// that are waiting to become indirect.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ObjectFlags: u16 {
        /// The object has been changed since it was loaded or created.
        const MODIFIED = 1 << 0;
        /// The object may not be released from memory.
        const FORBID_RELEASE = 1 << 1;
        /// A flushed object refers to this one, so it has to be written too.
        const MUST_BE_FLUSHED = 1 << 2;
        /// A direct container that is promoted to an indirect object when its
        /// parent is written.
        const MUST_BE_INDIRECT = 1 << 3;
        /// The object is a detached snapshot that should not be modified.
        const READ_ONLY = 1 << 4;
        /// Strings and stream data of this object are written unencrypted.
        const UNENCRYPTED = 1 << 5;
        /// The object was located in an object stream of the source file.
        const ORIGINAL_OBJECT_STREAM = 1 << 6;
        /// The object is currently being read from the source file.
        const READING = 1 << 7;
    }
}
