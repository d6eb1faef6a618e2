//! Command and response framing.
//!
//! # Command Format
//!
//! ```text
//! [tag: u16][size: u32][code: u32][handles...][auth area][parameters...]
//! ```
//!
//! The authorization area is present only under the `SESSIONS` tag:
//! a `u32` byte count followed by one `TPMS_AUTH_COMMAND` per session.
//!
//! # Response Format
//!
//! ```text
//! [tag: u16][size: u32][rc: u32][handles...][param size: u32][parameters...][auth responses...]
//! ```
//!
//! The parameter size field and trailing auth responses are present only
//! under the `SESSIONS` tag. A failed command returns the bare 10-byte
//! header with a non-zero response code.
//!
//! In both directions `size` counts every byte of the buffer, header
//! included, and all integers are big-endian.

use bytes::BufMut;

use crate::commands::{Command, HandleSlot, Response};
use crate::error::{ProtocolError, Result};
use crate::handle::Handle;
use crate::marshal::{Marshal, Reader};
use crate::rc::ResponseCode;
use crate::types::{AuthCommand, AuthResponse, Authorization};

/// Header size: 2 (tag) + 4 (size) + 4 (code) = 10 bytes.
pub const HEADER_SIZE: usize = 10;

/// Default upper bound for a single command or response buffer.
pub const MAX_FRAME_SIZE: usize = 4096;

/// Structure tag carried in every header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum SessionTag {
    /// No authorization area.
    NoSessions = 0x8001,
    /// Authorization area present.
    Sessions = 0x8002,
}

impl SessionTag {
    /// Parse a tag, accepting only the two session tags.
    pub fn from_u16(value: u16) -> Result<Self> {
        match value {
            0x8001 => Ok(SessionTag::NoSessions),
            0x8002 => Ok(SessionTag::Sessions),
            other => Err(ProtocolError::InvalidTag(other)),
        }
    }

    #[inline]
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Parsed 10-byte header, shared by commands and responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub tag: SessionTag,
    /// Total buffer length, header included.
    pub size: u32,
    /// Command code or response code.
    pub code: u32,
}

impl Header {
    /// Parse the header at the start of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        let tag = SessionTag::from_u16(reader.u16()?)?;
        let size = reader.u32()?;
        let code = reader.u32()?;
        if (size as usize) < HEADER_SIZE {
            return Err(ProtocolError::SizeMismatch {
                declared: size as usize,
                actual: HEADER_SIZE,
            });
        }
        Ok(Self { tag, size, code })
    }

    /// Parse the header if enough bytes have arrived.
    ///
    /// Returns `None` while fewer than [`HEADER_SIZE`] bytes are buffered.
    pub fn try_parse(data: &[u8]) -> Result<Option<Self>> {
        if data.len() < HEADER_SIZE {
            return Ok(None);
        }
        Self::parse(data).map(Some)
    }
}

/// A decoded command together with the number of sessions it carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCommand<C> {
    pub command: C,
    /// Sessions in the authorization area; the response echoes one ack per session.
    pub sessions: usize,
}

/// What a response buffer decoded to: the typed response, or the module's error.
pub type Outcome<R> = std::result::Result<R, ResponseCode>;

/// Encoder and decoder for command and response buffers.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    /// Create a codec with the default frame limit.
    pub fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Create a codec with a custom frame limit.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// The largest buffer this codec will produce or accept.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    fn check_size(&self, size: usize) -> Result<()> {
        if size > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        Ok(())
    }

    /// Encode a command buffer.
    ///
    /// The tag is `SESSIONS` exactly when the command has handles needing
    /// authorization; each such handle contributes one password session.
    pub fn encode_command<C: Command>(&self, command: &C) -> Result<Vec<u8>> {
        let slots = command.handle_area();
        debug_assert_eq!(slots.len(), C::HANDLES);

        let tag = if C::AUTH_HANDLES > 0 {
            SessionTag::Sessions
        } else {
            SessionTag::NoSessions
        };

        let mut buf = Vec::with_capacity(64);
        buf.put_u16(tag.as_u16());
        buf.put_u32(0); // backpatched
        buf.put_u32(C::CODE.as_u32());

        for slot in &slots {
            slot.handle.marshal(&mut buf);
        }

        if tag == SessionTag::Sessions {
            let start = buf.len();
            buf.put_u32(0); // backpatched
            for slot in slots.iter().take(C::AUTH_HANDLES) {
                let auth = slot.auth.clone().unwrap_or_default();
                auth.to_command().marshal(&mut buf);
            }
            let len = (buf.len() - start - 4) as u32;
            buf[start..start + 4].copy_from_slice(&len.to_be_bytes());
        }

        command.marshal_parameters(&mut buf);

        self.check_size(buf.len())?;
        let size = buf.len() as u32;
        buf[2..6].copy_from_slice(&size.to_be_bytes());
        Ok(buf)
    }

    /// Decode a command buffer whose header code is `C::CODE`.
    pub fn decode_command<C: Command>(&self, data: &[u8]) -> Result<DecodedCommand<C>> {
        self.check_size(data.len())?;
        let header = Header::parse(data)?;
        if header.size as usize != data.len() {
            return Err(ProtocolError::SizeMismatch {
                declared: header.size as usize,
                actual: data.len(),
            });
        }
        if header.code != C::CODE.as_u32() {
            return Err(ProtocolError::InvalidValue {
                field: "command code",
                value: header.code,
            });
        }

        let mut reader = Reader::new(&data[HEADER_SIZE..]);
        let mut slots = Vec::with_capacity(C::HANDLES);
        for _ in 0..C::HANDLES {
            slots.push(HandleSlot::plain(reader.read::<Handle>()?));
        }

        let mut sessions = Vec::new();
        if header.tag == SessionTag::Sessions {
            let auth_size = reader.u32()? as usize;
            let mut area = Reader::new(reader.bytes(auth_size)?);
            while !area.is_empty() {
                sessions.push(area.read::<AuthCommand>()?);
            }
        }
        if sessions.len() < C::AUTH_HANDLES {
            return Err(ProtocolError::AuthorizationMissing {
                expected: C::AUTH_HANDLES,
                found: sessions.len(),
            });
        }
        for (slot, session) in slots.iter_mut().zip(&sessions).take(C::AUTH_HANDLES) {
            if session.session != Handle::PASSWORD {
                return Err(ProtocolError::InvalidValue {
                    field: "session handle",
                    value: session.session.0,
                });
            }
            slot.auth = Some(Authorization::from_command(session));
        }

        let command = C::unmarshal(&slots, &mut reader)?;
        if !reader.is_empty() {
            return Err(ProtocolError::TrailingBytes {
                context: C::CODE.name(),
                count: reader.remaining(),
            });
        }
        Ok(DecodedCommand {
            command,
            sessions: sessions.len(),
        })
    }

    /// Encode a successful response, acknowledging `sessions` password sessions.
    pub fn encode_response<R: Response>(&self, response: &R, sessions: usize) -> Result<Vec<u8>> {
        let tag = if sessions > 0 {
            SessionTag::Sessions
        } else {
            SessionTag::NoSessions
        };

        let mut buf = Vec::with_capacity(64);
        buf.put_u16(tag.as_u16());
        buf.put_u32(0); // backpatched
        buf.put_u32(ResponseCode::SUCCESS.0);

        for handle in response.handle_area() {
            handle.marshal(&mut buf);
        }

        if tag == SessionTag::Sessions {
            let start = buf.len();
            buf.put_u32(0); // backpatched
            response.marshal_parameters(&mut buf);
            let len = (buf.len() - start - 4) as u32;
            buf[start..start + 4].copy_from_slice(&len.to_be_bytes());
            for _ in 0..sessions {
                AuthResponse::password().marshal(&mut buf);
            }
        } else {
            response.marshal_parameters(&mut buf);
        }

        self.check_size(buf.len())?;
        let size = buf.len() as u32;
        buf[2..6].copy_from_slice(&size.to_be_bytes());
        Ok(buf)
    }

    /// Encode the 10-byte response for a failed command.
    pub fn encode_error(code: ResponseCode) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        buf.put_u16(SessionTag::NoSessions.as_u16());
        buf.put_u32(HEADER_SIZE as u32);
        buf.put_u32(code.0);
        buf
    }

    /// Decode the response to command `C`.
    ///
    /// A non-zero response code is returned as `Ok(Err(code))` without
    /// looking past the header. On success the parameter area must be
    /// consumed exactly; a malformed body is an error, never a partial value.
    pub fn decode_response<C: Command>(&self, data: &[u8]) -> Result<Outcome<C::Response>> {
        self.check_size(data.len())?;
        let header = Header::parse(data)?;
        if header.size as usize != data.len() {
            return Err(ProtocolError::SizeMismatch {
                declared: header.size as usize,
                actual: data.len(),
            });
        }
        let code = ResponseCode(header.code);
        if !code.is_success() {
            return Ok(Err(code));
        }

        let mut reader = Reader::new(&data[HEADER_SIZE..]);
        let handles_needed = <C::Response as Response>::HANDLES;
        let mut handles = Vec::with_capacity(handles_needed);
        for _ in 0..handles_needed {
            handles.push(reader.read::<Handle>()?);
        }

        let params = match header.tag {
            SessionTag::Sessions => {
                let param_size = reader.u32()? as usize;
                let params = reader.bytes(param_size)?;
                while !reader.is_empty() {
                    reader.read::<AuthResponse>()?;
                }
                params
            }
            SessionTag::NoSessions => reader.rest(),
        };

        let mut params = Reader::new(params);
        let response = <C::Response as Response>::unmarshal(&handles, &mut params)?;
        if !params.is_empty() {
            return Err(ProtocolError::TrailingBytes {
                context: C::CODE.name(),
                count: params.remaining(),
            });
        }
        Ok(Ok(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::AlgorithmId;
    use crate::buffers::{Auth, Digest, MaxBuffer, Name};
    use crate::commands::{
        ContextSave, FlushContext, GetRandom, GetRandomResponse, HashSequenceStart,
        HashSequenceStartResponse, Load, LoadResponse, SequenceUpdate, SequenceUpdateResponse,
    };
    use crate::handle::Hierarchy;
    use crate::types::{
        AuthHandle, ObjectAttributes, PublicArea, PublicDetails, SymDefObject,
    };

    fn symcipher_public() -> PublicArea {
        PublicArea {
            name_alg: AlgorithmId::Sha256,
            attributes: ObjectAttributes::from_bits(
                ObjectAttributes::DECRYPT | ObjectAttributes::SIGN,
            ),
            auth_policy: Digest::empty(),
            details: PublicDetails::SymCipher {
                symmetric: SymDefObject::cipher(AlgorithmId::Grasshopper, 256, AlgorithmId::Ctr),
                unique: Digest::empty(),
            },
        }
    }

    #[test]
    fn test_session_tag_parse() {
        assert_eq!(SessionTag::from_u16(0x8001).unwrap(), SessionTag::NoSessions);
        assert_eq!(SessionTag::from_u16(0x8002).unwrap(), SessionTag::Sessions);
        assert_eq!(
            SessionTag::from_u16(0x00C4).unwrap_err(),
            ProtocolError::InvalidTag(0x00C4)
        );
    }

    #[test]
    fn test_get_random_exact_bytes() {
        let codec = FrameCodec::new();
        let bytes = codec
            .encode_command(&GetRandom {
                bytes_requested: 16,
            })
            .unwrap();
        assert_eq!(
            bytes,
            vec![0x80, 0x01, 0, 0, 0, 12, 0, 0, 0x01, 0x7B, 0x00, 0x10]
        );
    }

    #[test]
    fn test_flush_context_handle_is_a_parameter() {
        let codec = FrameCodec::new();
        let bytes = codec
            .encode_command(&FlushContext {
                flush_handle: Handle(0x8000_0001),
            })
            .unwrap();
        assert_eq!(
            bytes,
            vec![0x80, 0x01, 0, 0, 0, 14, 0, 0, 0x01, 0x65, 0x80, 0, 0, 1]
        );
    }

    #[test]
    fn test_authorized_command_layout() {
        let codec = FrameCodec::new();
        let command = SequenceUpdate {
            sequence: AuthHandle::from_wire(Handle(0x8000_0000), Authorization::Empty),
            buffer: MaxBuffer::new(b"abc".to_vec()).unwrap(),
        };
        let bytes = codec.encode_command(&command).unwrap();
        #[rustfmt::skip]
        let expected = vec![
            0x80, 0x02,                   // SESSIONS
            0x00, 0x00, 0x00, 0x20,       // size 32
            0x00, 0x00, 0x01, 0x5C,       // SequenceUpdate
            0x80, 0x00, 0x00, 0x00,       // sequence handle
            0x00, 0x00, 0x00, 0x09,       // auth area size
            0x40, 0x00, 0x00, 0x09,       // TPM_RS_PW
            0x00, 0x00,                   // nonce
            0x01,                         // continueSession
            0x00, 0x00,                   // empty password
            0x00, 0x03, b'a', b'b', b'c', // buffer
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_command_roundtrip_through_decoder() {
        let codec = FrameCodec::new();
        let command = Load {
            parent: AuthHandle::from_wire(
                Handle(0x8000_0000),
                Authorization::Password(Auth::new(b"parent".to_vec()).unwrap()),
            ),
            in_private: crate::buffers::Private::new(vec![9; 80]).unwrap(),
            in_public: symcipher_public(),
        };
        let bytes = codec.encode_command(&command).unwrap();
        let decoded = codec.decode_command::<Load>(&bytes).unwrap();
        assert_eq!(decoded.sessions, 1);
        assert_eq!(decoded.command, command);
    }

    #[test]
    fn test_decode_command_requires_authorization() {
        let codec = FrameCodec::new();
        // SequenceUpdate with a NO_SESSIONS tag and no auth area
        let mut bytes = vec![0x80, 0x01, 0, 0, 0, 16, 0, 0, 0x01, 0x5C];
        bytes.extend_from_slice(&[0x80, 0, 0, 0, 0x00, 0x00]);
        let err = codec.decode_command::<SequenceUpdate>(&bytes).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::AuthorizationMissing {
                expected: 1,
                found: 0
            }
        );
    }

    #[test]
    fn test_decode_command_trailing_bytes() {
        let codec = FrameCodec::new();
        let mut bytes = codec
            .encode_command(&ContextSave {
                save_handle: Handle(0x8000_0000),
            })
            .unwrap();
        bytes.push(0xFF);
        bytes[5] += 1;
        assert!(matches!(
            codec.decode_command::<ContextSave>(&bytes),
            Err(ProtocolError::TrailingBytes { count: 1, .. })
        ));
    }

    #[test]
    fn test_response_with_handle_and_sessions() {
        let codec = FrameCodec::new();
        let response = LoadResponse {
            object_handle: Handle(0x8000_0003),
            name: Name::new(vec![0x00, 0x0B, 1, 2, 3]).unwrap(),
        };
        let bytes = codec.encode_response(&response, 1).unwrap();
        assert_eq!(&bytes[..2], &[0x80, 0x02]);
        assert_eq!(&bytes[10..14], &[0x80, 0, 0, 3]);
        assert_eq!(&bytes[14..18], &[0, 0, 0, 7]);
        let decoded = codec.decode_response::<Load>(&bytes).unwrap().unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_response_without_sessions() {
        let codec = FrameCodec::new();
        let response = HashSequenceStartResponse {
            sequence_handle: Handle(0x8000_0000),
        };
        let bytes = codec.encode_response(&response, 0).unwrap();
        assert_eq!(bytes, vec![0x80, 0x01, 0, 0, 0, 14, 0, 0, 0, 0, 0x80, 0, 0, 0]);
        let decoded = codec
            .decode_response::<HashSequenceStart>(&bytes)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_error_response_surfaces_code() {
        let codec = FrameCodec::new();
        let bytes = FrameCodec::encode_error(ResponseCode::HANDLE.with_parameter(1));
        assert_eq!(bytes, vec![0x80, 0x01, 0, 0, 0, 10, 0, 0, 0x01, 0xCB]);
        let outcome = codec.decode_response::<FlushContext>(&bytes).unwrap();
        assert_eq!(outcome.unwrap_err(), ResponseCode(0x1CB));
    }

    #[test]
    fn test_size_mismatch() {
        let codec = FrameCodec::new();
        let mut bytes = codec
            .encode_response(
                &GetRandomResponse {
                    random_bytes: Digest::new(vec![1, 2]).unwrap(),
                },
                0,
            )
            .unwrap();
        bytes.pop();
        assert_eq!(
            codec.decode_response::<GetRandom>(&bytes).unwrap_err(),
            ProtocolError::SizeMismatch {
                declared: 14,
                actual: 13
            }
        );
    }

    #[test]
    fn test_malformed_body_is_not_partial_success() {
        let codec = FrameCodec::new();
        // Digest declares 8 bytes but only 2 follow
        let bytes = vec![0x80, 0x01, 0, 0, 0, 14, 0, 0, 0, 0, 0x00, 0x08, 1, 2];
        assert!(matches!(
            codec.decode_response::<GetRandom>(&bytes),
            Err(ProtocolError::MalformedLength { .. })
        ));
    }

    #[test]
    fn test_response_trailing_parameters() {
        let codec = FrameCodec::new();
        let bytes = vec![0x80, 0x01, 0, 0, 0, 11, 0, 0, 0, 0, 0xEE];
        assert!(matches!(
            codec.decode_response::<SequenceUpdate>(&bytes),
            Err(ProtocolError::TrailingBytes {
                context: "SequenceUpdate",
                count: 1
            })
        ));
        let ok = codec.encode_response(&SequenceUpdateResponse, 1).unwrap();
        assert!(codec.decode_response::<SequenceUpdate>(&ok).unwrap().is_ok());
    }

    #[test]
    fn test_frame_too_large() {
        let codec = FrameCodec::with_max_frame_size(12);
        let bytes = FrameCodec::encode_error(ResponseCode::FAILURE);
        assert!(codec.decode_response::<GetRandom>(&bytes).is_ok());

        let big = vec![0x80, 0x01, 0, 0, 0, 13, 0, 0, 0, 0, 0, 1, 0];
        assert_eq!(
            codec.decode_response::<GetRandom>(&big).unwrap_err(),
            ProtocolError::FrameTooLarge { size: 13, max: 12 }
        );
    }

    #[test]
    fn test_try_parse_header() {
        assert_eq!(Header::try_parse(&[0x80, 0x01, 0]).unwrap(), None);
        let header = Header::try_parse(&[0x80, 0x02, 0, 0, 0, 20, 0, 0, 1, 0x5D])
            .unwrap()
            .unwrap();
        assert_eq!(header.tag, SessionTag::Sessions);
        assert_eq!(header.size, 20);
        assert_eq!(header.code, 0x15D);
        assert!(Header::try_parse(&[0x00, 0xC4, 0, 0, 0, 10, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_hierarchy_in_hash_command() {
        let codec = FrameCodec::new();
        let cmd = crate::commands::Hash {
            data: MaxBuffer::new(vec![0; 4]).unwrap(),
            hash_alg: AlgorithmId::Gost3411_256,
            hierarchy: Hierarchy::Owner,
        };
        let bytes = codec.encode_command(&cmd).unwrap();
        assert_eq!(&bytes[bytes.len() - 6..], &[0x00, 0x90, 0x40, 0, 0, 1]);
        let decoded = codec
            .decode_command::<crate::commands::Hash>(&bytes)
            .unwrap();
        assert_eq!(decoded.command, cmd);
        assert_eq!(decoded.sessions, 0);
    }
}
