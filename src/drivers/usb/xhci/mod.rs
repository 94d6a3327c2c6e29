//! xHCI host controller initialization
//!
//! Brings the VL805 behind the BCM2711's PCIe window from reset to
//! "running, ports powered" in nine linear steps:
//!
//! 1. Read the capability block (CAPLENGTH sanity-checks the mapping)
//! 2. Halt if running, then host-controller reset
//! 3. DCBAA + scratchpad pages, DCBAAP, CONFIG.MaxSlotsEn
//! 4. Command ring with its Link TRB, CRCR
//! 5. Event ring + ERST, ERSTSZ/ERSTBA/ERDP
//! 6. Interrupter 0: IMAN, IMOD
//! 7. Run (USBCMD.RS) and wait for HCHalted to clear
//! 8. Power every root-hub port, settle 20 ms
//! 9. Scan PORTSC for connected devices
//!
//! Any step failing aborts the sequence with a `DriverError`; the
//! controller is left halted and uninitialized, and the rest of the
//! kernel carries on. The only retries are the bounded status polls
//! inside a step.
//!
//! Every DMA buffer lives in the Device-mapped window ([`dma`]), so no
//! cache maintenance is needed between ring writes and register writes,
//! only the data-synchronization barrier built into `mmio::write64`.
//! Scratchpad pages are ordinary heap (Normal, cached) memory and are
//! cleaned to DRAM before the controller learns their addresses.

pub mod dma;
pub mod registers;
pub mod ring;

use crate::arch::mmio;
use crate::drivers::timeout::Timeout;
use crate::drivers::{DriverError, DriverResult};
use crate::drivers::usb::{PortInfo, PortSpeed};
use crate::mm::phys_addr_for_dma;
use core::alloc::Layout;
use core::ptr;
use dma::DmaRegion;
use registers::*;
use ring::{CommandRing, Dcbaa, EventRing};
use spin::Mutex;

const HALT_TIMEOUT_US: u64 = 200_000;
const RESET_TIMEOUT_US: u64 = 100_000;
const RUN_TIMEOUT_US: u64 = 100_000;
const PORT_POWER_SETTLE_MS: u64 = 20;
const POLL_INTERVAL_US: u64 = 100;

/// What a successful init reports back.
#[derive(Debug, Copy, Clone)]
pub struct InitSummary {
    pub max_slots: u8,
    pub max_ports: u8,
    pub connected_ports: usize,
}

pub struct XhciController {
    op_base: usize,
    rt_base: usize,
    db_base: usize,
    caps: Capabilities,
    dcbaa: Dcbaa,
    cmd_ring: CommandRing,
    event_ring: EventRing,
    initialized: bool,
}

static CONTROLLER: Mutex<Option<XhciController>> = Mutex::new(None);

/// Run the full nine-step bring-up against the controller at `cap_base`.
///
/// Safe to call again on the same controller: the sequence starts with a
/// halt + reset, so a second run reports the same capabilities.
pub fn init(cap_base: usize) -> DriverResult<InitSummary> {
    let mut guard = CONTROLLER.lock();
    *guard = None;

    // Step 1: capabilities
    let caps = read_capabilities(cap_base)?;
    crate::info!(
        "xHCI: version {:x}.{:02x}, {} slots, {} ports, {} interrupters, AC64={}, CSZ={}",
        caps.hci_version >> 8,
        caps.hci_version & 0xFF,
        caps.max_slots,
        caps.max_ports,
        caps.max_interrupters,
        caps.ac64 as u32,
        caps.context_size_64 as u32
    );

    let op_base = cap_base + caps.cap_length as usize;
    let rt_base = cap_base + (caps.rtsoff & !0x1F) as usize;
    let db_base = cap_base + (caps.dboff & !0x3) as usize;

    // Step 2: halt and reset, before any DMA memory is touched
    halt_controller(op_base)?;
    reset_controller(op_base)?;

    let region = DmaRegion::locate();
    let mut hc = XhciController {
        op_base,
        rt_base,
        db_base,
        caps,
        // Ring constructors zero their carves of the DMA window
        dcbaa: unsafe { Dcbaa::init(region.dcbaa_base()) },
        cmd_ring: unsafe { CommandRing::init(region.cmd_ring_base()) },
        event_ring: unsafe { EventRing::init(region.event_ring_base(), region.erst_base()) },
        initialized: false,
    };

    // Step 3: DCBAA, scratchpads, slot count
    hc.setup_dcbaa(&region)?;

    // Step 4: command ring
    hc.setup_command_ring();

    // Step 5: event ring + ERST
    hc.setup_event_ring();

    // Step 6: interrupter 0
    hc.setup_interrupter();

    // Step 7: run
    hc.run()?;

    // Step 8: port power
    hc.power_ports();

    // Step 9: port scan
    let connected_ports = hc.scan_ports();

    // Kick one no-op down the command ring; a healthy controller posts a
    // completion event and keeps running, a sick one raises HSE fast
    hc.post_noop();

    let summary = InitSummary {
        max_slots: hc.caps.max_slots,
        max_ports: hc.caps.max_ports,
        connected_ports,
    };

    hc.initialized = true;
    *guard = Some(hc);

    Ok(summary)
}

/// Whether a controller made it through init.
pub fn is_initialized() -> bool {
    CONTROLLER.lock().as_ref().map_or(false, |hc| hc.initialized)
}

/// Step 1: read and sanity-check the capability block.
fn read_capabilities(cap_base: usize) -> DriverResult<Capabilities> {
    let cap_length = mmio::read8(cap_base + CAPLENGTH);
    if !(0x10..=0x40).contains(&cap_length) {
        // Memory space not enabled, likely a BAR/ATU mismatch
        crate::error!("xHCI: CAPLENGTH {:#x} out of range", cap_length);
        return Err(DriverError::DeviceNotFound);
    }

    let hcsparams1 = mmio::read32(cap_base + HCSPARAMS1);
    let hcsparams2 = mmio::read32(cap_base + HCSPARAMS2);
    let hccparams1 = mmio::read32(cap_base + HCCPARAMS1);

    Ok(Capabilities {
        cap_length,
        hci_version: mmio::read16(cap_base + HCIVERSION),
        max_slots: max_slots(hcsparams1),
        max_interrupters: max_interrupters(hcsparams1),
        max_ports: max_ports(hcsparams1),
        scratchpad_count: scratchpad_count(hcsparams2),
        ac64: hccparams1 & (1 << 0) != 0,
        context_size_64: hccparams1 & (1 << 2) != 0,
        rtsoff: mmio::read32(cap_base + RTSOFF),
        dboff: mmio::read32(cap_base + DBOFF),
    })
}

/// Step 2a: stop the controller if it is running.
fn halt_controller(op_base: usize) -> DriverResult<()> {
    let status = mmio::read32(op_base + USBSTS);
    if status & UsbSts::HC_HALTED.bits() != 0 {
        return Ok(());
    }

    let cmd = mmio::read32(op_base + USBCMD) & !UsbCmd::RUN_STOP.bits();
    mmio::write32(op_base + USBCMD, cmd);

    let timeout = Timeout::new(HALT_TIMEOUT_US);
    loop {
        let status = mmio::read32(op_base + USBSTS);
        if status == u32::MAX {
            return Err(DriverError::DeviceNotFound);
        }
        if status & UsbSts::HC_HALTED.bits() != 0 {
            return Ok(());
        }
        if timeout.is_expired() {
            crate::error!("xHCI: controller refused to halt");
            return Err(timeout.error().into());
        }
        crate::time::sleep_us(POLL_INTERVAL_US);
    }
}

/// Step 2b: host-controller reset; done when HCRST self-clears and
/// controller-not-ready drops.
fn reset_controller(op_base: usize) -> DriverResult<()> {
    let cmd = mmio::read32(op_base + USBCMD) | UsbCmd::HC_RESET.bits();
    mmio::write32(op_base + USBCMD, cmd);

    let timeout = Timeout::new(RESET_TIMEOUT_US);
    loop {
        let cmd = mmio::read32(op_base + USBCMD);
        if cmd == u32::MAX {
            // Device vanished mid-reset
            return Err(DriverError::DeviceNotFound);
        }
        let status = mmio::read32(op_base + USBSTS);
        if cmd & UsbCmd::HC_RESET.bits() == 0 && status & UsbSts::NOT_READY.bits() == 0 {
            return Ok(());
        }
        if timeout.is_expired() {
            crate::error!("xHCI: reset did not complete");
            return Err(timeout.error().into());
        }
        crate::time::sleep_us(POLL_INTERVAL_US);
    }
}

impl XhciController {
    fn op_read(&self, offset: usize) -> u32 {
        mmio::read32(self.op_base + offset)
    }

    fn op_write(&self, offset: usize, value: u32) {
        mmio::write32(self.op_base + offset, value);
    }

    fn op_write64(&self, offset: usize, value: u64) {
        mmio::write64(self.op_base + offset, value);
    }

    fn intr_write(&self, offset: usize, value: u32) {
        mmio::write32(self.rt_base + INTR_REGS_BASE + offset, value);
    }

    fn intr_write64(&self, offset: usize, value: u64) {
        mmio::write64(self.rt_base + INTR_REGS_BASE + offset, value);
    }

    fn port_read(&self, port: u8) -> u32 {
        mmio::read32(self.op_base + PORT_REGS_BASE + port as usize * PORT_REGS_STRIDE)
    }

    fn port_write(&self, port: u8, value: u32) {
        mmio::write32(
            self.op_base + PORT_REGS_BASE + port as usize * PORT_REGS_STRIDE,
            value,
        );
    }

    /// Step 3: publish the DCBAA and scratchpad pages, then the slot
    /// count the controller may use.
    fn setup_dcbaa(&mut self, region: &DmaRegion) -> DriverResult<()> {
        self.setup_scratchpads(region)?;

        self.op_write64(DCBAAP, self.dcbaa.phys_addr());
        self.op_write(CONFIG, self.caps.max_slots as u32);

        crate::debug!("xHCI: DCBAA at {:#x}", self.dcbaa.phys_addr());
        Ok(())
    }

    /// Scratchpad pages come from the Normal (cached) heap and must be
    /// cleaned to DRAM before the controller reads their addresses.
    fn setup_scratchpads(&mut self, region: &DmaRegion) -> DriverResult<()> {
        let count = self.caps.scratchpad_count;
        if count == 0 {
            return Ok(());
        }
        if count > dma::MAX_SCRATCHPADS {
            // Array bound is fixed at build time; a controller wanting
            // more means the layout is wrong for this hardware.
            panic!(
                "xHCI: scratchpad count {} exceeds the array bound {}",
                count,
                dma::MAX_SCRATCHPADS
            );
        }

        let array = region.scratchpad_array_base() as *mut u64;
        let layout = Layout::from_size_align(4096, 4096).unwrap();

        for i in 0..count {
            let page = unsafe { alloc::alloc::alloc_zeroed(layout) };
            if page.is_null() {
                crate::error!("xHCI: scratchpad page {} allocation failed", i);
                return Err(DriverError::OutOfMemory);
            }
            crate::arch::clean_dcache_range(page as usize, 4096);
            unsafe {
                ptr::write_volatile(array.add(i), phys_addr_for_dma(page));
            }
        }
        for i in count..dma::MAX_SCRATCHPADS {
            unsafe {
                ptr::write_volatile(array.add(i), 0);
            }
        }

        self.dcbaa
            .set_scratchpad_array(phys_addr_for_dma(array));

        crate::debug!("xHCI: {} scratchpad pages", count);
        Ok(())
    }

    /// Step 4: hand the command ring to the controller.
    fn setup_command_ring(&mut self) {
        self.op_write64(CRCR, self.cmd_ring.crcr_value());
        crate::debug!("xHCI: command ring at {:#x}", self.cmd_ring.phys_addr());
    }

    /// Step 5: event ring segment table and dequeue pointer for
    /// interrupter 0.
    fn setup_event_ring(&mut self) {
        self.intr_write(ERSTSZ, 1);
        self.intr_write64(ERSTBA, self.event_ring.erst_phys_addr());
        self.intr_write64(ERDP, self.event_ring.erdp_value());
        crate::debug!("xHCI: event ring at {:#x}", self.event_ring.phys_addr());
    }

    /// Step 6: clear any pending interrupt, enable interrupter 0 with
    /// 1 ms moderation.
    fn setup_interrupter(&self) {
        self.intr_write(IMAN, 0x3);
        self.intr_write(IMOD, IMOD_1MS);
        self.intr_write(ERSTSZ, 1);
        mmio::dsb_sy();
        mmio::isb();
    }

    /// Step 7: set run and wait for HCHalted to clear.
    fn run(&self) -> DriverResult<()> {
        let cmd = self.op_read(USBCMD)
            | UsbCmd::RUN_STOP.bits()
            | UsbCmd::INTE.bits()
            | UsbCmd::HSEE.bits();
        self.op_write(USBCMD, cmd);

        let timeout = Timeout::new(RUN_TIMEOUT_US);
        loop {
            let status = self.op_read(USBSTS);
            if status == u32::MAX {
                return Err(DriverError::DeviceNotFound);
            }
            if status & UsbSts::HSE.bits() != 0 {
                // Almost always a bad DMA pointer or alignment
                crate::error!("xHCI: host system error on start");
                return Err(DriverError::HardwareError);
            }
            if status & UsbSts::HC_HALTED.bits() == 0 {
                return Ok(());
            }
            if timeout.is_expired() {
                crate::error!("xHCI: controller did not start");
                return Err(timeout.error().into());
            }
            crate::time::sleep_us(POLL_INTERVAL_US);
        }
    }

    /// Step 8: power every port that is not already powered, then give
    /// the rails time to settle.
    fn power_ports(&self) {
        for port in 0..self.caps.max_ports {
            let portsc = self.port_read(port);
            if portsc & PortSc::PP.bits() != 0 {
                continue;
            }
            // Mask the write-1-to-clear change bits or this write would
            // acknowledge changes we have not seen
            let value = (portsc & !PortSc::CHANGE_BITS.bits()) | PortSc::PP.bits();
            self.port_write(port, value);
        }

        crate::time::sleep_ms(PORT_POWER_SETTLE_MS);
    }

    /// Enqueue a no-op command and ring the host-controller doorbell.
    fn post_noop(&mut self) {
        self.cmd_ring.enqueue(ring::Trb::noop_command());
        mmio::dsb_sy();
        // Doorbell 0 targets the command ring
        mmio::write32(self.db_base, 0);
        crate::debug!(
            "xHCI: no-op posted, command ring enqueue {}",
            self.cmd_ring.enqueue_index()
        );
    }

    /// Step 9: report what is plugged in.
    fn scan_ports(&self) -> usize {
        let mut connected = 0;

        for port in 0..self.caps.max_ports {
            let portsc = self.port_read(port);
            let info = PortInfo {
                port,
                connected: portsc & PortSc::CCS.bits() != 0,
                powered: portsc & PortSc::PP.bits() != 0,
                speed: PortSpeed::from_portsc(portsc_speed(portsc)),
            };
            if info.connected {
                connected += 1;
                crate::info!(
                    "xHCI: port {} connected, {:?}, powered={}",
                    info.port + 1,
                    info.speed,
                    info.powered
                );
            }
        }

        connected
    }
}
