use pnet::packet::icmp::IcmpPacket;
use pnet::packet::Packet;
use pnet::transport::{TransportReceiver, TransportSender};
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Mutex;
use std::time::Duration;

/// Write side of an ICMPv4 socket
///
/// Sends may happen from several threads at once. Each call must put the whole message on the wire
/// or fail, messages of concurrent calls never interleave.
pub trait EchoSender: Send + Sync {
    fn send_to(&self, packet: &[u8], dest: Ipv4Addr) -> io::Result<()>;
}

/// Read side of an ICMPv4 socket
///
/// Yields raw ICMP messages, starting at the ICMP header, together with their source address.
/// Returns `Ok(None)` if nothing arrived within `timeout`.
pub trait EchoReceiver: Send {
    fn next_with_timeout(&mut self, timeout: Duration) -> io::Result<Option<(Vec<u8>, IpAddr)>>;
}

/// Write side of a raw ICMPv4 socket provided by pnet
///
/// The pnet [`TransportSender`](tx) needs exclusive access for sending, so it is guarded by a
/// mutex that is held for the duration of a single `send_to` only.
///
/// [tx]: https://docs.rs/pnet/0.35/pnet/transport/struct.TransportSender.html
pub struct IcmpSender(Mutex<TransportSender>);

/// Read side of a raw ICMPv4 socket provided by pnet
pub struct IcmpReceiver(TransportReceiver);

/// Open a raw ICMPv4 socket
///
/// The channel has a receive buffer of 4 KB. Both halves share the same socket, which is closed
/// once both of them have been dropped.
///
/// # Errors
///
/// Opening a raw socket requires elevated privileges (root or `CAP_NET_RAW`). A missing privilege
/// is reported as `PermissionDenied` with a hint, any other error of the underlying
/// [`transport_channel`](tc) is propagated unchanged.
///
/// [tc]: https://docs.rs/pnet/0.35/pnet/transport/fn.transport_channel.html
pub fn open_icmp_channel() -> io::Result<(IcmpSender, IcmpReceiver)> {
    use pnet::packet::ip::IpNextHeaderProtocols::Icmp;
    use pnet::transport::{self, TransportChannelType::Layer4, TransportProtocol::Ipv4};

    trace!("Opening transport channel to transmit network packets");

    match transport::transport_channel(4096, Layer4(Ipv4(Icmp))) {
        Ok((tx, rx)) => Ok((IcmpSender(Mutex::new(tx)), IcmpReceiver(rx))),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!(
                "{} - raw ICMP sockets require root privileges or the CAP_NET_RAW capability",
                e
            ),
        )),
        Err(e) => Err(e),
    }
}

impl EchoSender for IcmpSender {
    fn send_to(&self, packet: &[u8], dest: Ipv4Addr) -> io::Result<()> {
        let len = packet.len();
        let packet = IcmpPacket::new(packet)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "icmp packet too short"))?;

        let sent = self
            .0
            .lock()
            .expect("transport mutex poisoned")
            .send_to(packet, IpAddr::V4(dest))?;
        if sent < len {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "partial icmp write"));
        }
        Ok(())
    }
}

impl EchoReceiver for IcmpReceiver {
    fn next_with_timeout(&mut self, timeout: Duration) -> io::Result<Option<(Vec<u8>, IpAddr)>> {
        use pnet::transport::icmp_packet_iter;

        let mut incoming = icmp_packet_iter(&mut self.0);
        Ok(incoming
            .next_with_timeout(timeout)?
            .map(|(packet, addr)| (packet.packet().to_vec(), addr)))
    }
}
