//! Event flag words attached to every path in a dispatched batch.

use bitflags::bitflags;

bitflags! {
    /// Per-path change flags using the canonical FSEvents bit values.
    ///
    /// The low byte carries stream-level conditions (scan requests, drop
    /// notices, history markers); bits 8 and up describe the item itself.
    /// Words for the same path are OR-merged when a batch is coalesced.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct EventFlags: u32 {
        /// The receiver must rescan the whole subtree under this path.
        const MUST_SCAN_SUBDIRS = 0x00000001;
        /// Events were dropped before delivery in user space.
        const USER_DROPPED = 0x00000002;
        /// Events were dropped before delivery in the kernel.
        const KERNEL_DROPPED = 0x00000004;
        const EVENT_IDS_WRAPPED = 0x00000008;
        /// Marks the end of historical event replay.
        const HISTORY_DONE = 0x00000010;
        /// A watched root was moved or deleted.
        const ROOT_CHANGED = 0x00000020;
        const MOUNT = 0x00000040;
        const UNMOUNT = 0x00000080;

        const ITEM_CREATED = 0x00000100;
        const ITEM_REMOVED = 0x00000200;
        const ITEM_INODE_META_MOD = 0x00000400;
        const ITEM_RENAMED = 0x00000800;
        const ITEM_MODIFIED = 0x00001000;
        const ITEM_FINDER_INFO_MOD = 0x00002000;
        const ITEM_CHANGE_OWNER = 0x00004000;
        const ITEM_XATTR_MOD = 0x00008000;
        const ITEM_IS_FILE = 0x00010000;
        const ITEM_IS_DIR = 0x00020000;
        const ITEM_IS_SYMLINK = 0x00040000;

        /// Union of every item-level bit. Directory-granularity streams
        /// clear these before dispatch.
        const ITEM_BITS = Self::ITEM_CREATED.bits()
            | Self::ITEM_REMOVED.bits()
            | Self::ITEM_INODE_META_MOD.bits()
            | Self::ITEM_RENAMED.bits()
            | Self::ITEM_MODIFIED.bits()
            | Self::ITEM_FINDER_INFO_MOD.bits()
            | Self::ITEM_CHANGE_OWNER.bits()
            | Self::ITEM_XATTR_MOD.bits()
            | Self::ITEM_IS_FILE.bits()
            | Self::ITEM_IS_DIR.bits()
            | Self::ITEM_IS_SYMLINK.bits();
    }
}

impl EventFlags {
    /// Drop the item-level bits, keeping only stream-level conditions.
    pub fn strip_item_bits(self) -> Self {
        self.difference(Self::ITEM_BITS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_canonical_bit_values() {
        assert_eq!(EventFlags::MUST_SCAN_SUBDIRS.bits(), 0x00000001);
        assert_eq!(EventFlags::ROOT_CHANGED.bits(), 0x00000020);
        assert_eq!(EventFlags::ITEM_CREATED.bits(), 0x00000100);
        assert_eq!(EventFlags::ITEM_RENAMED.bits(), 0x00000800);
        assert_eq!(EventFlags::ITEM_XATTR_MOD.bits(), 0x00008000);
        assert_eq!(EventFlags::ITEM_IS_SYMLINK.bits(), 0x00040000);
        assert_eq!(EventFlags::ITEM_BITS.bits(), 0x0007ff00);
    }

    #[test]
    fn test_strip_item_bits_keeps_stream_conditions() {
        let flags = EventFlags::MUST_SCAN_SUBDIRS
            | EventFlags::ITEM_CREATED
            | EventFlags::ITEM_IS_FILE;
        assert_eq!(flags.strip_item_bits(), EventFlags::MUST_SCAN_SUBDIRS);
    }

    #[test]
    fn test_strip_item_bits_on_pure_item_word_is_empty() {
        let flags = EventFlags::ITEM_MODIFIED | EventFlags::ITEM_IS_FILE;
        assert!(flags.strip_item_bits().is_empty());
    }

    #[test]
    fn test_flags_merge_with_or() {
        let a = EventFlags::ITEM_CREATED | EventFlags::ITEM_IS_FILE;
        let b = EventFlags::ITEM_MODIFIED | EventFlags::ITEM_IS_FILE;
        let merged = a | b;
        assert!(merged.contains(EventFlags::ITEM_CREATED));
        assert!(merged.contains(EventFlags::ITEM_MODIFIED));
        assert_eq!(merged.bits(), 0x00011100);
    }
}
