//! Static packet registry for the CAN bus and the telemetry radio.
//!
//! Bus packets are fixed slices of the three telemetry buffers; a telemetry
//! packet carries one whole buffer.
pub mod frame;
pub mod page;

use heapless::FnvIndexMap;

pub use frame::CanFrame;
pub use page::{BmsPage, TelemetryBuffers, PAGE_LEN};

use page::{CUR_BAL_STAT_PAGE_LEN, TEMPERATURE_PAGE_LEN, VOLTAGE_PAGE_LEN};

pub const N_CAN_ID: usize = 8;
pub const N_TELEM_ID: usize = 3;

// FnvIndexMap capacities must be powers of two.
const CAN_MAP_CAPACITY: usize = 8;
const TELEM_MAP_CAPACITY: usize = 4;

const _: () = assert!(N_CAN_ID <= CAN_MAP_CAPACITY);
const _: () = assert!(N_TELEM_ID <= TELEM_MAP_CAPACITY);

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PageId {
    Voltage,
    Temperature,
    CurBalStat,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct CanPacket {
    pub name: &'static str,
    pub id: u16,
    pub len: u8,
    pub page: PageId,
    pub offset: usize,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TelemPacket {
    pub name: &'static str,
    pub id: u8,
    pub len: u8,
    pub page: PageId,
}

const fn can_packet(name: &'static str, id: u16, len: u8, page: PageId, offset: usize) -> CanPacket {
    CanPacket { name, id, len, page, offset }
}

pub const CAN_PACKETS: [CanPacket; N_CAN_ID] = [
    can_packet("CAN_BPS_VOLTAGE1", 0x600, 8, PageId::Voltage, 0),
    can_packet("CAN_BPS_VOLTAGE2", 0x601, 8, PageId::Voltage, 8),
    can_packet("CAN_BPS_VOLTAGE3", 0x602, 8, PageId::Voltage, 16),
    can_packet("CAN_BPS_VOLTAGE4", 0x603, 6, PageId::Voltage, 24),
    can_packet("CAN_BPS_TEMPERATURE1", 0x608, 8, PageId::Temperature, 0),
    can_packet("CAN_BPS_TEMPERATURE2", 0x609, 8, PageId::Temperature, 8),
    can_packet("CAN_BPS_TEMPERATURE3", 0x60A, 8, PageId::Temperature, 16),
    can_packet("CAN_BPS_CUR_BAL_STAT", 0x60B, 8, PageId::CurBalStat, 0),
];

pub const TELEM_PACKETS: [TelemPacket; N_TELEM_ID] = [
    TelemPacket { name: "TELEM_BPS_VOLTAGE", id: 0x0B, len: VOLTAGE_PAGE_LEN as u8, page: PageId::Voltage },
    TelemPacket { name: "TELEM_BPS_TEMPERATURE", id: 0x0D, len: TEMPERATURE_PAGE_LEN as u8, page: PageId::Temperature },
    TelemPacket { name: "TELEM_BPS_CUR_BAL_STAT", id: 0x11, len: CUR_BAL_STAT_PAGE_LEN as u8, page: PageId::CurBalStat },
];

/// Identifier lookup over the static tables, built once at start-up.
pub struct Registry {
    can: FnvIndexMap<u16, CanPacket, CAN_MAP_CAPACITY>,
    telem: FnvIndexMap<u8, TelemPacket, TELEM_MAP_CAPACITY>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        // Capacity is checked against the tables at compile time, so no insert can fail.
        let mut can = FnvIndexMap::new();
        for packet in CAN_PACKETS {
            let inserted = can.insert(packet.id, packet);
            debug_assert!(matches!(inserted, Ok(None)), "duplicate bus id");
        }
        let mut telem = FnvIndexMap::new();
        for packet in TELEM_PACKETS {
            let inserted = telem.insert(packet.id, packet);
            debug_assert!(matches!(inserted, Ok(None)), "duplicate telemetry id");
        }
        Registry { can, telem }
    }

    pub fn can_packet(&self, id: u16) -> Option<&CanPacket> {
        self.can.get(&id)
    }

    pub fn telem_packet(&self, id: u8) -> Option<&TelemPacket> {
        self.telem.get(&id)
    }

    /// Payload of a bus packet within the current buffers.
    pub fn can_payload<'a>(&self, packet: &CanPacket, buffers: &'a TelemetryBuffers) -> &'a [u8] {
        let page = buffers.page(packet.page);
        let end = (packet.offset + packet.len as usize).min(page.len());
        &page[packet.offset.min(end)..end]
    }

    pub fn telem_payload<'a>(&self, packet: &TelemPacket, buffers: &'a TelemetryBuffers) -> &'a [u8] {
        let page = buffers.page(packet.page);
        &page[..(packet.len as usize).min(page.len())]
    }

    /// Every bus packet, in table order, ready for the CAN driver.
    pub fn frames<'a>(&'a self, buffers: &'a TelemetryBuffers) -> impl Iterator<Item = CanFrame> + 'a {
        CAN_PACKETS
            .iter()
            .map(move |packet| CanFrame::new(packet.id, self.can_payload(packet, buffers)))
    }
}
