use pnet::packet::{
    icmp::{echo_request::MutableEchoRequestPacket, IcmpCode, IcmpTypes},
    Packet,
};
use pnet::packet::util::checksum;
use rand::Rng;
use std::io;

/// Size of the ICMP echo header: type, code, checksum, identifier and sequence number
const HEADER_SIZE: usize = 8;

/// A ping packet before send-out
///
/// Low-level abstraction for outgoing ICMPv4 echo request messages. The packet owns its buffer,
/// which holds the 8 byte header followed by the payload.
#[derive(Debug)]
pub(crate) struct RequestPacket(MutableEchoRequestPacket<'static>);

impl RequestPacket {
    /// Create new echo request packet
    ///
    /// The underlying buffer is sufficient for the size of the payload plus the header and the
    /// type- and code fields are set before returning the finished packet.
    ///
    /// # Errors
    ///
    /// The function could theoretically return an error, if the provided buffer were smaller than
    /// the minimum required size. As the function automatically adds extra space for the header,
    /// this should never occur.
    pub fn new(size: usize) -> Result<Self, io::Error> {
        let mut pkg = MutableEchoRequestPacket::owned(vec![0; size + HEADER_SIZE])
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "icmp packet"))?;
        pkg.set_icmp_type(IcmpTypes::EchoRequest);
        pkg.set_icmp_code(IcmpCode::new(0));
        Ok(Self(pkg))
    }

    /// Populate the header fields and fill the payload
    ///
    /// The identifier separates the traffic of this run from other ICMP users on the host, the
    /// sequence number associates a request with its reply. The payload is random.
    pub fn set_header_and_payload(&mut self, id: u16, sequence: u16) {
        self.0.set_identifier(id);
        self.0.set_sequence_number(sequence);

        let mut payload = vec![0u8; self.0.payload().len()];
        rand::thread_rng().fill(&mut payload[..]);
        self.0.set_payload(&payload);
    }

    /// Set the checksum field of the packet
    ///
    /// The checksum is the 16-bit one's complement of the one's complement sum of the packet,
    /// computed with the checksum field itself (word 1) skipped.
    pub fn set_checksum(&mut self) {
        let sum = checksum(self.0.packet(), 1);
        self.0.set_checksum(sum);
    }
}

impl Packet for RequestPacket {
    fn packet(&self) -> &[u8] {
        self.0.packet()
    }

    fn payload(&self) -> &[u8] {
        self.0.payload()
    }
}
