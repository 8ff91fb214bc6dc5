//! UDP multicast metadata sink.

use std::net::UdpSocket;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use super::MetadataPackage;
use crate::queue::BoundedQueue;

const SINGLE_HEADER_LEN: usize = 8;
const CHUNK_HEADER_LEN: usize = 24;

/// Build the datagram(s) for one metadata event. Payloads that fit in a
/// single datagram get the short `type+code` header; oversize payloads are
/// split into `ssnc`/`chnk`-tagged fragments, each carrying its index and
/// the total fragment count. `chunk_total` is always `ceil(len /
/// slice_size)`, never truncated.
pub fn build_datagrams(
    type_tag: [u8; 4],
    code_tag: [u8; 4],
    data: &[u8],
    max_msg_len: usize,
) -> Vec<Vec<u8>> {
    if data.len() <= max_msg_len.saturating_sub(SINGLE_HEADER_LEN) {
        let mut datagram = Vec::with_capacity(SINGLE_HEADER_LEN + data.len());
        datagram.extend_from_slice(&type_tag);
        datagram.extend_from_slice(&code_tag);
        datagram.extend_from_slice(data);
        return vec![datagram];
    }

    let slice_size = max_msg_len.saturating_sub(CHUNK_HEADER_LEN).max(1);
    let chunk_total = data.len().div_ceil(slice_size) as u32;
    let mut datagrams = Vec::with_capacity(chunk_total as usize);
    for (ix, slice) in data.chunks(slice_size).enumerate() {
        let mut datagram = Vec::with_capacity(CHUNK_HEADER_LEN + slice.len());
        datagram.extend_from_slice(b"ssnc");
        datagram.extend_from_slice(b"chnk");
        datagram.extend_from_slice(&(ix as u32).to_be_bytes());
        datagram.extend_from_slice(&chunk_total.to_be_bytes());
        datagram.extend_from_slice(&type_tag);
        datagram.extend_from_slice(&code_tag);
        datagram.extend_from_slice(slice);
        datagrams.push(datagram);
    }
    datagrams
}

pub fn run(
    addr: String,
    port: u16,
    max_msg_len: usize,
    queue: Arc<BoundedQueue<MetadataPackage>>,
    stop: Arc<AtomicBool>,
) {
    let socket = match UdpSocket::bind("0.0.0.0:0") {
        Ok(socket) => socket,
        Err(err) => {
            tracing::error!(%err, "failed to bind multicast metadata socket");
            return;
        }
    };
    let target = format!("{addr}:{port}");

    while let Some(package) = queue.dequeue(&stop) {
        for datagram in build_datagrams(package.type_tag, package.code_tag, package.bytes(), max_msg_len) {
            if let Err(err) = socket.send_to(&datagram, &target) {
                tracing::warn!(%err, "multicast metadata send failed");
            }
        }
    }
}
