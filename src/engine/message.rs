//! The application-visible message envelope.

use std::collections::VecDeque;

use crate::engine::wire::FrameType;

/// Discriminant for [`Message::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Request,
    OneWayReq,
    Response,
    OneWayRsp,
    FinReq,
    FinRsp,
    HelloReq,
    HelloRsp,
    CreditNop,
    CancelReq,
    CancelRsp,
}

impl MessageKind {
    pub fn is_application(self) -> bool {
        matches!(
            self,
            MessageKind::Request
                | MessageKind::OneWayReq
                | MessageKind::Response
                | MessageKind::OneWayRsp
        )
    }

    pub fn is_request(self) -> bool {
        matches!(self, MessageKind::Request | MessageKind::OneWayReq)
    }

    pub fn is_response(self) -> bool {
        matches!(self, MessageKind::Response | MessageKind::OneWayRsp)
    }

    pub fn frame_type(self) -> FrameType {
        match self {
            MessageKind::Request => FrameType::Request,
            MessageKind::OneWayReq => FrameType::OneWayReq,
            MessageKind::Response => FrameType::Response,
            MessageKind::OneWayRsp => FrameType::OneWayRsp,
            MessageKind::FinReq => FrameType::FinReq,
            MessageKind::FinRsp => FrameType::FinRsp,
            MessageKind::HelloReq => FrameType::HelloReq,
            MessageKind::HelloRsp => FrameType::HelloRsp,
            MessageKind::CreditNop => FrameType::CreditNop,
            MessageKind::CancelReq => FrameType::CancelReq,
            MessageKind::CancelRsp => FrameType::CancelRsp,
        }
    }
}

bitflags::bitflags! {
    /// Per-message flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MsgFlags: u8 {
        /// Caller asked to be notified with a receipt once the request is
        /// delivered, ahead of the full response.
        const RECEIPT_REQUESTED = 0b0000_0001;
        /// Caller asked the response to be transferred via RDMA_WRITE even
        /// when it would otherwise fit inline (small zero copy).
        const SMALL_ZERO_COPY = 0b0000_0010;
        /// This response is a pure receipt acknowledgement (FIRST without
        /// LAST, per `xio_connection_send`).
        const FIRST = 0b0000_0100;
        const LAST = 0b0000_1000;
    }
}

/// One element of a message's header or data iovec. `mr` carries the
/// registered-memory descriptor the peer would need to steer an RDMA_READ or
/// RDMA_WRITE at this element (its address plus the `stag`/`rkey` that is
/// meaningful only to the `Verbs` collaborator); present only when the
/// element must be exposed for RDMA rather than ride inline.
#[derive(Debug, Clone)]
pub struct IovElement {
    pub bytes: Vec<u8>,
    pub mr: Option<MrDescriptor>,
}

/// A registered-memory descriptor for one iovec element: enough for the peer
/// to address it over RDMA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MrDescriptor {
    pub addr: u64,
    pub stag: u32,
}

impl IovElement {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, mr: None }
    }

    pub fn with_mr(bytes: Vec<u8>, addr: u64, stag: u32) -> Self {
        Self { bytes, mr: Some(MrDescriptor { addr, stag }) }
    }

    /// This element's wire scatter/gather descriptor, if it carries one.
    pub fn wire_sge(&self) -> Option<crate::engine::wire::WireSge> {
        self.mr.map(|mr| crate::engine::wire::WireSge {
            addr: mr.addr,
            length: self.bytes.len() as u32,
            stag: mr.stag,
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// The application-visible message envelope.
#[derive(Debug, Clone)]
pub struct Message {
    pub kind: MessageKind,
    pub header: Vec<IovElement>,
    pub data: Vec<IovElement>,
    pub sn: u32,
    pub flags: MsgFlags,
    /// Sequence number of the request this response answers, if any.
    pub request_sn: Option<u32>,
    /// Enqueue timestamp, in whatever monotonic unit the caller stamps it.
    pub timestamp: u64,
}

impl Message {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            header: Vec::new(),
            data: Vec::new(),
            sn: 0,
            flags: MsgFlags::empty(),
            request_sn: None,
            timestamp: 0,
        }
    }

    pub fn total_header_len(&self) -> usize {
        self.header.iter().map(IovElement::len).sum()
    }

    pub fn total_data_len(&self) -> usize {
        self.data.iter().map(IovElement::len).sum()
    }

    pub fn wants_small_zero_copy(&self) -> bool {
        self.flags.contains(MsgFlags::SMALL_ZERO_COPY)
    }

    pub fn is_receipt_only(&self) -> bool {
        self.flags.contains(MsgFlags::FIRST) && !self.flags.contains(MsgFlags::LAST)
    }
}

/// FIFO queue of messages, the basic unit the connection scheduler moves
/// messages through.
pub type MsgQueue = VecDeque<Message>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_only_requires_first_without_last() {
        let mut m = Message::new(MessageKind::Response);
        m.flags = MsgFlags::FIRST;
        assert!(m.is_receipt_only());
        m.flags |= MsgFlags::LAST;
        assert!(!m.is_receipt_only());
    }

    #[test]
    fn iov_len_sums_elements() {
        let mut m = Message::new(MessageKind::Request);
        m.data.push(IovElement::new(vec![0; 10]));
        m.data.push(IovElement::new(vec![0; 22]));
        assert_eq!(m.total_data_len(), 32);
    }
}
