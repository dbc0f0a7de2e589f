//! UDP-multicast stand-in for the periodic-advertising channel.
//!
//! Beacon payloads ride verbatim in datagrams on a multicast group. The
//! channel is one-way: the central opens a transmit socket, audio nodes a
//! receive socket. Nothing here is part of the engine; on real hardware the
//! radio delivers the same payload bytes.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

use socket2::{Domain, Type};
use structopt::StructOpt;
use thiserror::Error;

// expedited forwarding - IP header field indicating that switches should
// prioritise our packets for minimal delay
const IPTOS_DSCP_EF: u32 = 0xb8;

#[derive(Debug, Error)]
pub enum ListenError {
    #[error("creating socket: {0}")]
    Socket(io::Error),
    #[error("setting SO_REUSEADDR: {0}")]
    SetReuseAddr(io::Error),
    #[error("binding {0}: {1}")]
    Bind(SocketAddrV4, io::Error),
    #[error("joining multicast group {0}: {1}")]
    JoinMulticastGroup(Ipv4Addr, io::Error),
}

#[derive(StructOpt, Debug, Clone)]
pub struct SocketOpt {
    /// Multicast group address including port, eg. 224.100.100.100:1530
    #[structopt(long, name = "addr", env = "CHORD_MULTICAST")]
    pub multicast: SocketAddrV4,
}

/// Central side: sends beacon payloads to the group.
pub struct BeaconTx {
    socket: UdpSocket,
    group: SocketAddrV4,
}

impl BeaconTx {
    pub fn open(opt: SocketOpt) -> Result<BeaconTx, ListenError> {
        // bound to 0.0.0.0:0, aka. OS picks a port
        let bind = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
        let socket = open_socket(*opt.multicast.ip(), bind)?;

        Ok(BeaconTx {
            socket: socket.into(),
            group: opt.multicast,
        })
    }

    pub fn send(&self, payload: &[u8]) -> io::Result<()> {
        self.socket.send_to(payload, self.group)?;
        Ok(())
    }
}

/// Audio-node side: receives beacon payloads from the group.
pub struct BeaconRx {
    socket: UdpSocket,
}

impl BeaconRx {
    pub fn open(opt: SocketOpt) -> Result<BeaconRx, ListenError> {
        let group = *opt.multicast.ip();
        let bind = SocketAddrV4::new(group, opt.multicast.port());
        let socket = open_socket(group, bind)?;

        Ok(BeaconRx {
            socket: socket.into(),
        })
    }

    /// Block until the next datagram arrives. Returns the payload length.
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let (nbytes, _addr) = self.socket.recv_from(buf)?;
        Ok(nbytes)
    }
}

fn open_socket(group: Ipv4Addr, bind: SocketAddrV4) -> Result<socket2::Socket, ListenError> {
    let socket = socket2::Socket::new(Domain::IPV4, Type::DGRAM, None).map_err(ListenError::Socket)?;

    socket.set_reuse_address(true).map_err(ListenError::SetReuseAddr)?;

    if let Err(e) = socket.set_tos(IPTOS_DSCP_EF) {
        log::warn!("failed to set IPTOS_DSCP_EF: {e:?}");
    }

    socket.bind(&bind.into()).map_err(|e| ListenError::Bind(bind, e))?;

    socket
        .join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)
        .map_err(|e| ListenError::JoinMulticastGroup(group, e))?;

    // so a node and a central on the same host can talk
    let _ = socket.set_multicast_loop_v4(true);

    Ok(socket)
}
