//! DMAP big-endian TLV codec.
//!
//! A DMAP stream is a flat sequence of `[4-byte tag][4-byte big-endian
//! length][length bytes]` records (see GLOSSARY).

use crate::error::{Result, RtspError};

/// One decoded `[tag, length, payload]` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmapRecord {
    pub tag: [u8; 4],
    pub payload: Vec<u8>,
}

impl DmapRecord {
    pub fn tag_str(&self) -> String {
        String::from_utf8_lossy(&self.tag).into_owned()
    }
}

/// Encode one record.
pub fn encode_record(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + payload.len());
    out.extend_from_slice(tag);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Parse a flat sequence of records with no leading container header.
pub fn parse_records(mut body: &[u8]) -> Result<Vec<DmapRecord>> {
    let mut records = Vec::new();
    while !body.is_empty() {
        if body.len() < 8 {
            return Err(RtspError::InvalidParameters(
                "truncated DMAP record header".to_string(),
            ));
        }
        let mut tag = [0u8; 4];
        tag.copy_from_slice(&body[0..4]);
        let len = u32::from_be_bytes(body[4..8].try_into().unwrap()) as usize;
        if body.len() < 8 + len {
            return Err(RtspError::InvalidParameters(
                "truncated DMAP record payload".to_string(),
            ));
        }
        let payload = body[8..8 + len].to_vec();
        records.push(DmapRecord { tag, payload });
        body = &body[8 + len..];
    }
    Ok(records)
}

/// Parse a SET_PARAMETER `application/x-dmap-tagged` body, which opens with
/// an 8-byte container header before the per-field records begin.
pub fn parse_dmap_body(body: &[u8]) -> Result<Vec<DmapRecord>> {
    if body.len() < 8 {
        return Err(RtspError::InvalidParameters(
            "dmap body shorter than its container header".to_string(),
        ));
    }
    parse_records(&body[8..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_parse_round_trips_over_tag_bytes_pairs() {
        let fields: Vec<([u8; 4], Vec<u8>)> = vec![
            (*b"asal", b"Album".to_vec()),
            (*b"asar", b"Artist".to_vec()),
            (*b"minm", Vec::new()),
        ];
        let mut body = Vec::new();
        for (tag, payload) in &fields {
            body.extend_from_slice(&encode_record(tag, payload));
        }

        let records = parse_records(&body).unwrap();
        assert_eq!(records.len(), fields.len());
        for (record, (tag, payload)) in records.iter().zip(fields.iter()) {
            assert_eq!(&record.tag, tag);
            assert_eq!(&record.payload, payload);
        }
    }

    #[test]
    fn parse_dmap_body_skips_eight_byte_container_header() {
        let mut body = vec![0x08, 0, 0, 0, 0, 0, 0, 0];
        body.extend_from_slice(&encode_record(b"asal", b"Album"));

        let records = parse_dmap_body(&body).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tag_str(), "asal");
        assert_eq!(records[0].payload, b"Album");
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let mut body = vec![0u8; 8];
        body[4..8].copy_from_slice(&10u32.to_be_bytes());
        body.extend_from_slice(b"short");
        assert!(parse_records(&body).is_err());
    }
}
