//! Request/response exchange over a `NETLINK_ROUTE` socket

use netlink_packet_core::{
    NetlinkHeader, NetlinkMessage, NetlinkPayload, NLM_F_ACK, NLM_F_CREATE, NLM_F_EXCL,
    NLM_F_REQUEST,
};
use netlink_packet_route::RtnlMessage;
use netlink_sys::{protocols::NETLINK_ROUTE, Socket, SocketAddr};
use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::trace;

const RECV_BUFFER_SIZE: usize = 32768;

/// How a request expects the kernel to answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Create something that must not exist yet, wait for the ack
    Create,
    /// Delete something, wait for the ack
    Delete,
    /// Query, wait for the first reply message
    Query,
}

impl RequestKind {
    fn flags(self) -> u16 {
        match self {
            Self::Create => NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL,
            Self::Delete => NLM_F_REQUEST | NLM_F_ACK,
            Self::Query => NLM_F_REQUEST,
        }
    }
}

/// A bound rtnetlink socket
///
/// Requests are serialized through a mutex; each one is a blocking
/// send followed by receives until the matching answer arrives.
pub struct RouteSocket {
    socket: Mutex<Socket>,
    seq: AtomicU32,
}

impl RouteSocket {
    /// Open and bind a `NETLINK_ROUTE` socket
    pub fn open() -> io::Result<Self> {
        let mut socket = Socket::new(NETLINK_ROUTE)?;
        socket.bind_auto()?;
        socket.connect(&SocketAddr::new(0, 0))?;

        Ok(Self {
            socket: Mutex::new(socket),
            seq: AtomicU32::new(1),
        })
    }

    /// Send one request and wait for its answer
    ///
    /// Returns the reply message for [`RequestKind::Query`] and `None` for
    /// acknowledged requests. A kernel error becomes an `io::Error` carrying
    /// the errno.
    pub fn request(&self, message: RtnlMessage, kind: RequestKind) -> io::Result<Option<RtnlMessage>> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);

        let mut header = NetlinkHeader::default();
        header.flags = kind.flags();
        header.sequence_number = seq;

        let mut packet = NetlinkMessage::new(header, NetlinkPayload::InnerMessage(message));
        packet.finalize();
        let mut buf = vec![0u8; packet.buffer_len()];
        packet.serialize(&mut buf[..]);

        let socket = self
            .socket
            .lock()
            .map_err(|_| io::Error::other("netlink socket lock poisoned"))?;

        trace!(seq, len = buf.len(), "Sending netlink request");
        socket.send(&buf, 0)?;

        let mut recv_buf = vec![0u8; RECV_BUFFER_SIZE];
        loop {
            let size = socket.recv(&mut &mut recv_buf[..], 0)?;
            if size == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "netlink socket closed",
                ));
            }

            if let Some(answer) = find_answer(&recv_buf[..size], seq, kind)? {
                return answer;
            }
        }
    }
}

type Answer = io::Result<Option<RtnlMessage>>;

/// Scan one datagram for the answer to request `seq`
///
/// Returns `Ok(None)` when the datagram holds nothing for us.
fn find_answer(mut data: &[u8], seq: u32, kind: RequestKind) -> io::Result<Option<Answer>> {
    while !data.is_empty() {
        let message = NetlinkMessage::<RtnlMessage>::deserialize(data)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

        let length = message.header.length as usize;
        if length == 0 || length > data.len() {
            break;
        }
        data = &data[align(length).min(data.len())..];

        if message.header.sequence_number != seq {
            continue;
        }

        match message.payload {
            NetlinkPayload::Error(err) => {
                return Ok(Some(match err.code {
                    Some(code) => Err(io::Error::from_raw_os_error(-code.get())),
                    None => Ok(None),
                }));
            }
            NetlinkPayload::InnerMessage(inner) if kind == RequestKind::Query => {
                return Ok(Some(Ok(Some(inner))));
            }
            NetlinkPayload::Done(_) => {
                return Ok(Some(Ok(None)));
            }
            _ => {}
        }
    }
    Ok(None)
}

fn align(length: usize) -> usize {
    (length + 3) & !3
}
