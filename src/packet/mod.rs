use pnet::packet::{
    icmp::{echo_reply::EchoReplyPacket, IcmpPacket, IcmpType, IcmpTypes},
    Packet,
};
use std::convert::TryFrom;
use std::io;

use request::RequestPacket;

mod request;

/// Build a ready-to-send echo request
///
/// The returned buffer holds a complete ICMPv4 echo request message with header, random payload of
/// `size` bytes and a valid checksum.
///
/// # Errors
///
/// Only fails if the packet buffer cannot be laid out, which does not happen for buffers that
/// include the header.
pub fn echo_request(id: u16, sequence: u16, size: usize) -> Result<Vec<u8>, io::Error> {
    let mut packet = RequestPacket::new(size)?;
    packet.set_header_and_payload(id, sequence);
    packet.set_checksum();
    Ok(packet.packet().to_vec())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("datagram of {0} bytes is too short for an ICMP echo message")]
    Truncated(usize),

    #[error("ICMP type {0} is not an echo reply")]
    NotEchoReply(u8),
}

/// A ping after receipt
///
/// The echo reply does not own the entire packet, but only retains the key information needed to
/// identify it and to determine whether it belongs to this ping run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoReply {
    id: u16,
    seq: u16,
    size: usize,
}

impl EchoReply {
    /// Get the identifier of the packet
    pub fn get_id(&self) -> u16 {
        self.id
    }

    /// Get the sequence number of the packet
    pub fn get_sequence(&self) -> u16 {
        self.seq
    }

    /// Get the length of the packet's payload
    pub fn get_size(&self) -> usize {
        self.size
    }
}

impl TryFrom<&[u8]> for EchoReply {
    type Error = ParseError;

    /// Parse a raw ICMPv4 message into an `EchoReply`
    ///
    /// The buffer is expected to start at the ICMP header, the IPv4 header has already been
    /// stripped by the transport.
    fn try_from(buf: &[u8]) -> Result<Self, Self::Error> {
        let icmp = IcmpPacket::new(buf).ok_or(ParseError::Truncated(buf.len()))?;
        let ty: IcmpType = icmp.get_icmp_type();
        if ty != IcmpTypes::EchoReply {
            return Err(ParseError::NotEchoReply(ty.0));
        }

        let reply = EchoReplyPacket::new(buf).ok_or(ParseError::Truncated(buf.len()))?;
        Ok(Self {
            id: reply.get_identifier(),
            seq: reply.get_sequence_number(),
            size: reply.payload().len(),
        })
    }
}
