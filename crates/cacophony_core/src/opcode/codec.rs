/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Framing of the gzip-compressed opcode stream.
//!
//! Each frame is a 4-byte ordinal, a 4-byte payload length and the payload.
//! Running out of input before a full frame header is the normal end of the
//! log. Running out inside a payload is [`OpcodeError::Truncated`].

use super::{Opcode, OpcodeError, OpcodeSerializer, OpcodeType};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, Read, Write};

const FRAME_HEADER_BYTES: usize = 8;
const MAX_PAYLOAD_BYTES: usize = 16 * 1024 * 1024;

pub struct OpcodeWriter<W: Write> {
    out: GzEncoder<W>,
    scratch: OpcodeSerializer,
    written: usize,
}

impl<W: Write> OpcodeWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            out: GzEncoder::new(inner, Compression::default()),
            scratch: OpcodeSerializer::new(),
            written: 0,
        }
    }

    pub fn write_opcode(&mut self, opcode: &Opcode) -> Result<(), OpcodeError> {
        self.scratch.clear();
        opcode.encode(&mut self.scratch);
        let payload = self.scratch.as_bytes();
        let len = u32::try_from(payload.len())
            .map_err(|_| OpcodeError::Malformed(format!("{:?} payload too large", opcode.kind())))?;
        self.out.write_all(&opcode.kind().ordinal().to_be_bytes())?;
        self.out.write_all(&len.to_be_bytes())?;
        self.out.write_all(payload)?;
        self.written += 1;
        Ok(())
    }

    /// Number of opcodes written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flushes the compressed trailer and hands back the inner writer.
    pub fn finish(self) -> Result<W, OpcodeError> {
        Ok(self.out.finish()?)
    }
}

pub struct OpcodeReader<R: Read> {
    input: GzDecoder<R>,
    done: bool,
}

impl<R: Read> OpcodeReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            input: GzDecoder::new(inner),
            done: false,
        }
    }

    fn read_frame(&mut self) -> Result<Option<Opcode>, OpcodeError> {
        let mut header = [0u8; FRAME_HEADER_BYTES];
        if read_up_to(&mut self.input, &mut header)? < FRAME_HEADER_BYTES {
            return Ok(None);
        }
        let ordinal = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
        let kind = OpcodeType::from_ordinal(ordinal).ok_or(OpcodeError::UnknownOrdinal(ordinal))?;
        if len > MAX_PAYLOAD_BYTES {
            return Err(OpcodeError::Malformed(format!(
                "{kind:?} frame claims {len} payload bytes"
            )));
        }
        let mut payload = vec![0u8; len];
        let found = read_up_to(&mut self.input, &mut payload)?;
        if found < len {
            return Err(OpcodeError::Truncated { expected: len, found });
        }
        Opcode::decode(kind, &payload).map(Some)
    }
}

impl<R: Read> Iterator for OpcodeReader<R> {
    type Item = Result<Opcode, OpcodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_frame() {
            Ok(Some(opcode)) => Some(Ok(opcode)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Fills as much of `buf` as the input allows; returns the count read.
fn read_up_to(input: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

pub fn encode_all<'a>(opcodes: impl IntoIterator<Item = &'a Opcode>) -> Result<Vec<u8>, OpcodeError> {
    let mut writer = OpcodeWriter::new(Vec::new());
    for opcode in opcodes {
        writer.write_opcode(opcode)?;
    }
    writer.finish()
}

pub fn decode_all(bytes: &[u8]) -> Result<Vec<Opcode>, OpcodeError> {
    OpcodeReader::new(bytes).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cacophony_protocol::{Cid, PublicKey};

    fn cid(s: &str) -> Cid {
        Cid::parse(s).unwrap()
    }

    fn key(s: &str) -> PublicKey {
        PublicKey::parse(s).unwrap()
    }

    /// Every current kind, with optional CIDs both present and absent.
    fn sample() -> Vec<Opcode> {
        vec![
            Opcode::DefineChannel {
                key_name: "home".into(),
                public_key: key("z5Home"),
                root: cid("QmRoot"),
            },
            Opcode::SetPrefsInt { key: "VideoEdgePixelMax".into(), value: 720 },
            Opcode::SetPrefsLong { key: "FolloweeRefreshMillis".into(), value: 1 },
            Opcode::SetFolloweeState {
                followee: key("z5Resuming"),
                root: cid("QmFolloweeRoot"),
                next_backward_record: Some(cid("QmResume")),
                last_poll_millis: 10,
                last_success_millis: -1,
            },
            Opcode::SetFolloweeState {
                followee: key("z5Caught"),
                root: cid("QmOtherRoot"),
                next_backward_record: None,
                last_poll_millis: i64::MAX,
                last_success_millis: 0,
            },
            Opcode::AddFolloweeElement {
                followee: key("z5Resuming"),
                element: cid("QmElem"),
                image: Some(cid("QmImg")),
                leaf: None,
                combined_size_bytes: 0,
            },
            Opcode::AddFolloweeElement {
                followee: key("z5Resuming"),
                element: cid("QmElem2"),
                image: None,
                leaf: Some(cid("QmLeaf")),
                combined_size_bytes: u64::MAX,
            },
            Opcode::SkipFolloweeRecord {
                followee: key("z5Resuming"),
                record: cid("QmSkipped"),
                permanent: true,
            },
            Opcode::SkipFolloweeRecord {
                followee: key("z5Resuming"),
                record: cid("QmLater"),
                permanent: false,
            },
            Opcode::ExplicitUserInfo {
                public_key: key("z5User"),
                last_fetch_attempt_millis: 50,
                last_fetch_success_millis: 40,
                index: cid("QmIdx"),
                recommendations: cid("QmRecs"),
                records: cid("QmRecords"),
                description: cid("QmDesc"),
                picture: None,
                combined_size_bytes: 77,
            },
            Opcode::ExplicitUserInfo {
                public_key: key("z5Pictured"),
                last_fetch_attempt_millis: 1,
                last_fetch_success_millis: 1,
                index: cid("QmIdx2"),
                recommendations: cid("QmRecs2"),
                records: cid("QmRecords2"),
                description: cid("QmDesc2"),
                picture: Some(cid("QmPic")),
                combined_size_bytes: 78,
            },
            Opcode::ExplicitStreamRecord {
                record: cid("QmRec"),
                has_data_to_cache: true,
                thumbnail: None,
                video: Some(cid("QmVid")),
                audio: None,
                combined_size_bytes: 1234,
            },
            Opcode::ExplicitStreamRecord {
                record: cid("QmBare"),
                has_data_to_cache: false,
                thumbnail: Some(cid("QmThumb")),
                video: None,
                audio: Some(cid("QmAudio")),
                combined_size_bytes: 5,
            },
            Opcode::FavouriteStreamRecord {
                record: cid("QmFav"),
                thumbnail: Some(cid("QmFavThumb")),
                video: None,
                audio: None,
                combined_size_bytes: 9,
            },
        ]
    }

    /// Compresses hand-built frames, bypassing the writer.
    fn gzip(raw: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(raw).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn decoded_stream_matches_and_reencodes_identically() {
        let bytes = encode_all(&sample()).unwrap();
        let decoded = decode_all(&bytes).unwrap();
        assert_eq!(decoded, sample());
        assert_eq!(encode_all(&decoded).unwrap(), bytes);
    }

    #[test]
    fn sample_covers_every_current_kind() {
        let kinds: Vec<OpcodeType> = sample().iter().map(Opcode::kind).collect();
        for kind in OpcodeType::ALL.iter().filter(|k| !k.is_write_deprecated()) {
            assert!(kinds.contains(kind), "{kind:?} missing from the round trip");
        }
    }

    #[test]
    fn partial_header_at_end_is_normal_termination() {
        let opcode = Opcode::SetPrefsInt { key: "VideoEdgePixelMax".into(), value: 720 };
        let mut payload = OpcodeSerializer::new();
        opcode.encode(&mut payload);
        let mut raw = Vec::new();
        raw.extend_from_slice(&OpcodeType::SetPrefsInt.ordinal().to_be_bytes());
        raw.extend_from_slice(&(payload.as_bytes().len() as u32).to_be_bytes());
        raw.extend_from_slice(payload.as_bytes());
        raw.extend_from_slice(&[0, 0, 0]);
        assert_eq!(decode_all(&gzip(&raw)).unwrap(), vec![opcode]);
    }

    #[test]
    fn payload_cut_short_is_truncated() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&OpcodeType::SetPrefsInt.ordinal().to_be_bytes());
        raw.extend_from_slice(&20u32.to_be_bytes());
        raw.extend_from_slice(&[0; 5]);
        let err = decode_all(&gzip(&raw)).unwrap_err();
        assert!(matches!(err, OpcodeError::Truncated { expected: 20, found: 5 }));
    }

    #[test]
    fn reserved_ordinal_is_rejected() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&0u32.to_be_bytes());
        raw.extend_from_slice(&0u32.to_be_bytes());
        let err = decode_all(&gzip(&raw)).unwrap_err();
        assert!(matches!(err, OpcodeError::UnknownOrdinal(0)));
    }

    #[test]
    fn writer_counts_frames() {
        let mut writer = OpcodeWriter::new(Vec::new());
        for opcode in sample() {
            writer.write_opcode(&opcode).unwrap();
        }
        assert_eq!(writer.written(), sample().len());
    }
}
