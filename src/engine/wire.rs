//! On-the-wire framing: the TLV envelope, the fixed transport header, and
//! the per-kind sub-headers.
//!
//! All multi-byte fields are big-endian. The transport header's `ack_sn` and
//! `credits` fields sit at fixed byte offsets so [`TransportHeader::write_sn`]
//! can overwrite them in place without re-serializing the rest of the frame.

use crate::engine::config::{XIO_REQ_HEADER_VERSION, XIO_RSP_HEADER_VERSION};

/// TLV frame kinds. Mirrors `Message::kind` plus the setup handshake
/// messages, which never reach the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    Request = 1,
    OneWayReq = 2,
    Response = 3,
    OneWayRsp = 4,
    FinReq = 5,
    FinRsp = 6,
    HelloReq = 7,
    HelloRsp = 8,
    CreditNop = 9,
    CancelReq = 10,
    CancelRsp = 11,
    SetupReq = 12,
    SetupRsp = 13,
}

impl FrameType {
    /// Decode from the wire byte, or `None` for an unrecognized type.
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => Self::Request,
            2 => Self::OneWayReq,
            3 => Self::Response,
            4 => Self::OneWayRsp,
            5 => Self::FinReq,
            6 => Self::FinRsp,
            7 => Self::HelloReq,
            8 => Self::HelloRsp,
            9 => Self::CreditNop,
            10 => Self::CancelReq,
            11 => Self::CancelRsp,
            12 => Self::SetupReq,
            13 => Self::SetupRsp,
            _ => return None,
        })
    }
}

/// TLV envelope prefixed to every frame: a one-byte type tag and a two-byte
/// big-endian length of everything that follows the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv {
    pub frame_type: FrameType,
    pub length: u16,
}

impl Tlv {
    pub const WIRE_SIZE: usize = 3;

    pub fn write(&self, buf: &mut [u8]) {
        buf[0] = self.frame_type as u8;
        buf[1..3].copy_from_slice(&self.length.to_be_bytes());
    }

    pub fn read(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::WIRE_SIZE {
            return None;
        }
        let frame_type = FrameType::from_u8(buf[0])?;
        let length = u16::from_be_bytes([buf[1], buf[2]]);
        Some(Self { frame_type, length })
    }
}

/// Fixed transport header carried immediately after the TLV envelope on
/// every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransportHeader {
    pub version: u8,
    pub flags: u8,
    pub hdr_len: u16,
    pub sn: u16,
    pub ack_sn: u16,
    pub credits: u16,
    pub task_id: u32,
}

impl TransportHeader {
    /// Wire size of the fixed transport header.
    pub const WIRE_SIZE: usize = 1 + 1 + 2 + 2 + 2 + 2 + 4;

    /// Byte offset of `ack_sn` from the start of the header (fixed so
    /// `write_sn` can overwrite in place).
    const ACK_SN_OFFSET: usize = 4;
    /// Byte offset of `credits` from the start of the header.
    const CREDITS_OFFSET: usize = 6;
    /// Byte offset of `sn` from the start of the header.
    const SN_OFFSET: usize = 2;

    pub fn write(&self, buf: &mut [u8]) {
        buf[0] = self.version;
        buf[1] = self.flags;
        buf[Self::SN_OFFSET..Self::SN_OFFSET + 2].copy_from_slice(&self.sn.to_be_bytes());
        buf[Self::ACK_SN_OFFSET..Self::ACK_SN_OFFSET + 2]
            .copy_from_slice(&self.ack_sn.to_be_bytes());
        buf[Self::CREDITS_OFFSET..Self::CREDITS_OFFSET + 2]
            .copy_from_slice(&self.credits.to_be_bytes());
        buf[10..14].copy_from_slice(&self.task_id.to_be_bytes());
    }

    pub fn read(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::WIRE_SIZE {
            return None;
        }
        Some(Self {
            version: buf[0],
            flags: buf[1],
            sn: u16::from_be_bytes([buf[2], buf[3]]),
            ack_sn: u16::from_be_bytes([buf[4], buf[5]]),
            credits: u16::from_be_bytes([buf[6], buf[7]]),
            hdr_len: 0,
            task_id: u32::from_be_bytes([buf[10], buf[11], buf[12], buf[13]]),
        })
    }

    /// Overwrite `sn`, `ack_sn` and `credits` in an already-serialized frame
    /// buffer without touching any other byte.
    pub fn write_sn(buf: &mut [u8], sn: u16, ack_sn: u16, credits: u16) {
        buf[Self::SN_OFFSET..Self::SN_OFFSET + 2].copy_from_slice(&sn.to_be_bytes());
        buf[Self::ACK_SN_OFFSET..Self::ACK_SN_OFFSET + 2]
            .copy_from_slice(&ack_sn.to_be_bytes());
        buf[Self::CREDITS_OFFSET..Self::CREDITS_OFFSET + 2]
            .copy_from_slice(&credits.to_be_bytes());
    }
}

/// A single scatter/gather descriptor as carried on the wire: 16 bytes,
/// network byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WireSge {
    pub addr: u64,
    pub length: u32,
    pub stag: u32,
}

impl WireSge {
    pub const WIRE_SIZE: usize = 8 + 4 + 4;

    pub fn write(&self, buf: &mut [u8]) {
        buf[0..8].copy_from_slice(&self.addr.to_be_bytes());
        buf[8..12].copy_from_slice(&self.length.to_be_bytes());
        buf[12..16].copy_from_slice(&self.stag.to_be_bytes());
    }

    pub fn read(buf: &[u8]) -> Self {
        Self {
            addr: u64::from_be_bytes(buf[0..8].try_into().unwrap()),
            length: u32::from_be_bytes(buf[8..12].try_into().unwrap()),
            stag: u32::from_be_bytes(buf[12..16].try_into().unwrap()),
        }
    }
}

/// RDMA opcode carried in a request header, selecting the transfer mode
/// chosen for the request's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReqOpcode {
    Send = 0,
    RdmaRead = 1,
}

/// Request sub-header. Followed on the wire by three arrays of
/// [`WireSge`]: recv, read, write, in that order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReqHeader {
    pub version: u8,
    pub opcode: ReqOpcode,
    pub ulp_hdr_len: u16,
    pub ulp_pad_len: u16,
    pub ulp_imm_len: u32,
    pub recv_sge: Vec<WireSge>,
    pub read_sge: Vec<WireSge>,
    pub write_sge: Vec<WireSge>,
}

impl ReqHeader {
    /// Fixed portion of the request header, before the variable SGE arrays.
    pub const FIXED_SIZE: usize = 1 + 1 + 1 + 1 + 1 + 2 + 2 + 4;

    pub fn wire_len(&self) -> usize {
        Self::FIXED_SIZE
            + WireSge::WIRE_SIZE * (self.recv_sge.len() + self.read_sge.len() + self.write_sge.len())
    }

    pub fn write(&self, buf: &mut [u8]) {
        buf[0] = self.version;
        buf[1] = self.opcode as u8;
        buf[2] = self.recv_sge.len() as u8;
        buf[3] = self.read_sge.len() as u8;
        buf[4] = self.write_sge.len() as u8;
        buf[5..7].copy_from_slice(&self.ulp_hdr_len.to_be_bytes());
        buf[7..9].copy_from_slice(&self.ulp_pad_len.to_be_bytes());
        buf[9..13].copy_from_slice(&self.ulp_imm_len.to_be_bytes());
        let mut off = Self::FIXED_SIZE;
        for sge in &self.recv_sge {
            sge.write(&mut buf[off..off + WireSge::WIRE_SIZE]);
            off += WireSge::WIRE_SIZE;
        }
        for sge in &self.read_sge {
            sge.write(&mut buf[off..off + WireSge::WIRE_SIZE]);
            off += WireSge::WIRE_SIZE;
        }
        for sge in &self.write_sge {
            sge.write(&mut buf[off..off + WireSge::WIRE_SIZE]);
            off += WireSge::WIRE_SIZE;
        }
    }

    pub fn read(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::FIXED_SIZE {
            return None;
        }
        let version = buf[0];
        let opcode = match buf[1] {
            0 => ReqOpcode::Send,
            1 => ReqOpcode::RdmaRead,
            _ => return None,
        };
        let recv_num_sge = buf[2] as usize;
        let read_num_sge = buf[3] as usize;
        let write_num_sge = buf[4] as usize;
        let ulp_hdr_len = u16::from_be_bytes([buf[5], buf[6]]);
        let ulp_pad_len = u16::from_be_bytes([buf[7], buf[8]]);
        let ulp_imm_len = u32::from_be_bytes([buf[9], buf[10], buf[11], buf[12]]);

        let mut off = Self::FIXED_SIZE;
        let mut read_array = |count: usize, buf: &[u8], off: &mut usize| -> Option<Vec<WireSge>> {
            let mut v = Vec::with_capacity(count);
            for _ in 0..count {
                let end = *off + WireSge::WIRE_SIZE;
                if end > buf.len() {
                    return None;
                }
                v.push(WireSge::read(&buf[*off..end]));
                *off = end;
            }
            Some(v)
        };
        let recv_sge = read_array(recv_num_sge, buf, &mut off)?;
        let read_sge = read_array(read_num_sge, buf, &mut off)?;
        let write_sge = read_array(write_num_sge, buf, &mut off)?;

        Some(Self {
            version,
            opcode,
            ulp_hdr_len,
            ulp_pad_len,
            ulp_imm_len,
            recv_sge,
            read_sge,
            write_sge,
        })
    }

    pub fn new_default(opcode: ReqOpcode) -> Self {
        Self {
            version: XIO_REQ_HEADER_VERSION,
            opcode,
            ulp_hdr_len: 0,
            ulp_pad_len: 0,
            ulp_imm_len: 0,
            recv_sge: Vec::new(),
            read_sge: Vec::new(),
            write_sge: Vec::new(),
        }
    }
}

/// Response status, mirroring the message-level error taxonomy that can
/// ride a response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RspStatus {
    Ok = 0,
    MsgInvalid = 1,
    NotFound = 2,
}

/// Response sub-header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RspHeader {
    pub version: u8,
    pub status: RspStatus,
    pub ulp_hdr_len: u16,
    pub ulp_pad_len: u16,
    pub ulp_imm_len: u32,
}

impl RspHeader {
    pub const WIRE_SIZE: usize = 1 + 1 + 2 + 2 + 4;

    pub fn write(&self, buf: &mut [u8]) {
        buf[0] = self.version;
        buf[1] = self.status as u8;
        buf[2..4].copy_from_slice(&self.ulp_hdr_len.to_be_bytes());
        buf[4..6].copy_from_slice(&self.ulp_pad_len.to_be_bytes());
        buf[6..10].copy_from_slice(&self.ulp_imm_len.to_be_bytes());
    }

    pub fn read(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::WIRE_SIZE {
            return None;
        }
        let status = match buf[1] {
            0 => RspStatus::Ok,
            1 => RspStatus::MsgInvalid,
            2 => RspStatus::NotFound,
            _ => return None,
        };
        Some(Self {
            version: buf[0],
            status,
            ulp_hdr_len: u16::from_be_bytes([buf[2], buf[3]]),
            ulp_pad_len: u16::from_be_bytes([buf[4], buf[5]]),
            ulp_imm_len: u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]),
        })
    }

    pub fn new_default() -> Self {
        Self {
            version: XIO_RSP_HEADER_VERSION,
            status: RspStatus::Ok,
            ulp_hdr_len: 0,
            ulp_pad_len: 0,
            ulp_imm_len: 0,
        }
    }
}

/// NOP sub-header: carries credit piggybacking when there is no application
/// message to ride alongside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NopHeader {
    pub sn: u16,
    pub ack_sn: u16,
    pub credits: u16,
    pub opcode: u8,
    pub flags: u8,
}

impl NopHeader {
    pub const WIRE_SIZE: usize = 2 + 2 + 2 + 1 + 1;

    pub fn write(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.sn.to_be_bytes());
        buf[2..4].copy_from_slice(&self.ack_sn.to_be_bytes());
        buf[4..6].copy_from_slice(&self.credits.to_be_bytes());
        buf[6] = self.opcode;
        buf[7] = self.flags;
    }

    pub fn read(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::WIRE_SIZE {
            return None;
        }
        Some(Self {
            sn: u16::from_be_bytes([buf[0], buf[1]]),
            ack_sn: u16::from_be_bytes([buf[2], buf[3]]),
            credits: u16::from_be_bytes([buf[4], buf[5]]),
            opcode: buf[6],
            flags: buf[7],
        })
    }
}

/// Setup handshake sub-header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetupHeader {
    pub buffer_sz: u32,
    pub sq_depth: u32,
    pub rq_depth: u32,
    pub credits: u16,
}

impl SetupHeader {
    pub const WIRE_SIZE: usize = 4 + 4 + 4 + 2;

    pub fn write(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.buffer_sz.to_be_bytes());
        buf[4..8].copy_from_slice(&self.sq_depth.to_be_bytes());
        buf[8..12].copy_from_slice(&self.rq_depth.to_be_bytes());
        buf[12..14].copy_from_slice(&self.credits.to_be_bytes());
    }

    pub fn read(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::WIRE_SIZE {
            return None;
        }
        Some(Self {
            buffer_sz: u32::from_be_bytes(buf[0..4].try_into().unwrap()),
            sq_depth: u32::from_be_bytes(buf[4..8].try_into().unwrap()),
            rq_depth: u32::from_be_bytes(buf[8..12].try_into().unwrap()),
            credits: u16::from_be_bytes([buf[12], buf[13]]),
        })
    }
}

/// Cancel sub-header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelHeader {
    pub sn: u16,
    pub result: u16,
    pub ulp_msg: Vec<u8>,
}

impl CancelHeader {
    pub const FIXED_SIZE: usize = 2 + 2 + 2;

    pub fn wire_len(&self) -> usize {
        Self::FIXED_SIZE + self.ulp_msg.len()
    }

    pub fn write(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.sn.to_be_bytes());
        buf[2..4].copy_from_slice(&self.result.to_be_bytes());
        buf[4..6].copy_from_slice(&(self.ulp_msg.len() as u16).to_be_bytes());
        buf[6..6 + self.ulp_msg.len()].copy_from_slice(&self.ulp_msg);
    }

    pub fn read(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::FIXED_SIZE {
            return None;
        }
        let sn = u16::from_be_bytes([buf[0], buf[1]]);
        let result = u16::from_be_bytes([buf[2], buf[3]]);
        let msg_sz = u16::from_be_bytes([buf[4], buf[5]]) as usize;
        let end = 6 + msg_sz;
        if end > buf.len() {
            return None;
        }
        Some(Self {
            sn,
            result,
            ulp_msg: buf[6..end].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_header_round_trip() {
        let h = TransportHeader {
            version: 1,
            flags: 0b0000_0010,
            hdr_len: 0,
            sn: 0xBEEF,
            ack_sn: 0x1234,
            credits: 7,
            task_id: 0xDEAD_BEEF,
        };
        let mut buf = [0u8; TransportHeader::WIRE_SIZE];
        h.write(&mut buf);
        let got = TransportHeader::read(&buf).unwrap();
        assert_eq!(got.version, h.version);
        assert_eq!(got.flags, h.flags);
        assert_eq!(got.sn, h.sn);
        assert_eq!(got.ack_sn, h.ack_sn);
        assert_eq!(got.credits, h.credits);
        assert_eq!(got.task_id, h.task_id);
    }

    #[test]
    fn write_sn_overwrites_in_place_only() {
        let h = TransportHeader {
            version: 3,
            flags: 0xAB,
            hdr_len: 0,
            sn: 1,
            ack_sn: 2,
            credits: 3,
            task_id: 99,
        };
        let mut buf = [0u8; TransportHeader::WIRE_SIZE];
        h.write(&mut buf);
        TransportHeader::write_sn(&mut buf, 10, 20, 30);
        let got = TransportHeader::read(&buf).unwrap();
        assert_eq!(got.sn, 10);
        assert_eq!(got.ack_sn, 20);
        assert_eq!(got.credits, 30);
        // Untouched fields survive the in-place overwrite.
        assert_eq!(got.version, 3);
        assert_eq!(got.task_id, 99);
    }

    #[test]
    fn wire_sge_round_trip_network_order() {
        let sge = WireSge {
            addr: 0x0102_0304_0506_0708,
            length: 0x1122_3344,
            stag: 0x5566_7788,
        };
        let mut buf = [0u8; WireSge::WIRE_SIZE];
        sge.write(&mut buf);
        assert_eq!(&buf[0..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(WireSge::read(&buf), sge);
    }

    #[test]
    fn req_header_round_trip_with_sge_arrays() {
        let h = ReqHeader {
            version: XIO_REQ_HEADER_VERSION,
            opcode: ReqOpcode::RdmaRead,
            ulp_hdr_len: 12,
            ulp_pad_len: 0,
            ulp_imm_len: 1 << 20,
            recv_sge: vec![WireSge { addr: 1, length: 2, stag: 3 }],
            read_sge: vec![WireSge { addr: 4, length: 5, stag: 6 }],
            write_sge: vec![],
        };
        let mut buf = vec![0u8; h.wire_len()];
        h.write(&mut buf);
        let got = ReqHeader::read(&buf).unwrap();
        assert_eq!(got, h);
    }

    #[test]
    fn rsp_header_round_trip() {
        let h = RspHeader {
            version: XIO_RSP_HEADER_VERSION,
            status: RspStatus::NotFound,
            ulp_hdr_len: 4,
            ulp_pad_len: 2,
            ulp_imm_len: 0,
        };
        let mut buf = [0u8; RspHeader::WIRE_SIZE];
        h.write(&mut buf);
        assert_eq!(RspHeader::read(&buf).unwrap(), h);
    }

    #[test]
    fn setup_header_negotiation_is_elementwise_min() {
        use crate::engine::config::Tunables;
        let client = Tunables { max_send_buf_sz: 8192, sq_depth: 64, rq_depth: 32 };
        let server = Tunables { max_send_buf_sz: 4096, sq_depth: 128, rq_depth: 64 };
        let negotiated = Tunables::negotiate(&client, &server);
        assert_eq!(negotiated.max_send_buf_sz, 4096);
        assert_eq!(negotiated.sq_depth, 64);
        assert_eq!(negotiated.rq_depth, 32);
    }

    #[test]
    fn cancel_header_round_trip() {
        let h = CancelHeader { sn: 42, result: 0, ulp_msg: b"hello".to_vec() };
        let mut buf = vec![0u8; h.wire_len()];
        h.write(&mut buf);
        assert_eq!(CancelHeader::read(&buf).unwrap(), h);
    }
}
