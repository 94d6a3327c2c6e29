//! Layout of the linker-reserved xHCI DMA window
//!
//! One contiguous, Device-mapped window (`kernel.ld`, `.xhci_dma`) holds
//! every buffer the controller reads over DMA. Fixed offsets, no
//! allocator involved:
//!
//! ```text
//! 0x0000  DCBAA              2 KiB (256 slot entries)
//! 0x0800  command ring       1 KiB (64 TRBs, last one the Link TRB)
//! 0x0C00  event ring         1 KiB (64 TRBs)
//! 0x1000  ERST               64 B  (one segment entry used)
//! 0x1040  scratchpad array   256 B (up to 32 page pointers)
//! ```
//!
//! The window is 4 KiB aligned, so every sub-buffer meets the 64-byte
//! alignment the controller requires.

pub const DCBAA_OFFSET: usize = 0x0000;
pub const DCBAA_ENTRIES: usize = 256;

pub const CMD_RING_OFFSET: usize = 0x0800;
pub const EVENT_RING_OFFSET: usize = 0x0C00;

pub const ERST_OFFSET: usize = 0x1000;
pub const ERST_BYTES: usize = 0x40;

pub const SCRATCHPAD_ARRAY_OFFSET: usize = 0x1040;
/// Fixed bound of the scratchpad pointer array. A controller asking for
/// more is a build-system/layout bug and panics.
pub const MAX_SCRATCHPADS: usize = 32;

/// Total bytes the layout consumes.
pub const LAYOUT_BYTES: usize = SCRATCHPAD_ARRAY_OFFSET + MAX_SCRATCHPADS * 8;

/// The DMA window, located by the linker symbols.
pub struct DmaRegion {
    base: usize,
}

impl DmaRegion {
    /// Locate the window. Panics if the linker reserved less than the
    /// layout needs; that is a build bug, not a runtime condition.
    pub fn locate() -> Self {
        let region = crate::mm::xhci_dma_region();
        let len = region.end - region.start;
        if len < LAYOUT_BYTES {
            panic!(
                "xhci_dma window too small: {:#x} bytes, need {:#x}",
                len, LAYOUT_BYTES
            );
        }
        Self { base: region.start }
    }

    pub fn dcbaa_base(&self) -> usize {
        self.base + DCBAA_OFFSET
    }

    pub fn cmd_ring_base(&self) -> usize {
        self.base + CMD_RING_OFFSET
    }

    pub fn event_ring_base(&self) -> usize {
        self.base + EVENT_RING_OFFSET
    }

    pub fn erst_base(&self) -> usize {
        self.base + ERST_OFFSET
    }

    pub fn scratchpad_array_base(&self) -> usize {
        self.base + SCRATCHPAD_ARRAY_OFFSET
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_fits_reserved_window() {
        // kernel.ld reserves 0x1400 bytes
        assert!(LAYOUT_BYTES <= 0x1400);
    }

    #[test]
    fn test_sub_buffers_do_not_overlap() {
        assert_eq!(DCBAA_OFFSET + DCBAA_ENTRIES * 8, CMD_RING_OFFSET);
        assert_eq!(CMD_RING_OFFSET + 64 * 16, EVENT_RING_OFFSET);
        assert_eq!(EVENT_RING_OFFSET + 64 * 16, ERST_OFFSET);
        assert_eq!(ERST_OFFSET + ERST_BYTES, SCRATCHPAD_ARRAY_OFFSET);
    }

    #[test]
    fn test_controller_alignment_requirements() {
        // DCBAA, command ring, and ERST need 64-byte alignment; the
        // window itself is page aligned, so offsets decide.
        assert_eq!(DCBAA_OFFSET % 64, 0);
        assert_eq!(CMD_RING_OFFSET % 64, 0);
        assert_eq!(EVENT_RING_OFFSET % 16, 0);
        assert_eq!(ERST_OFFSET % 64, 0);
    }
}
