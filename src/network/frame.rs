use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::AppError::Incomplete;
use crate::{AppError, AppResult};

/// Wire header size: 4-byte big-endian type tag + 4-byte big-endian payload length.
pub const HEADER_SIZE: usize = 8;

/// One complete wire frame: a message type tag plus its payload bytes.
///
/// The payload length on the wire counts payload bytes only; a frame occupies
/// `HEADER_SIZE + payload.len()` bytes on the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub type_tag: i32,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(type_tag: i32, payload: Bytes) -> Frame {
        Frame { type_tag, payload }
    }

    /// Total number of bytes this frame occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    pub fn check(buffer: &mut BytesMut, max_frame_size: usize) -> AppResult<()> {
        if buffer.remaining() < HEADER_SIZE {
            return Err(Incomplete);
        }
        let bytes_slice = buffer.get(4..8).unwrap();
        let payload_size = i32::from_be_bytes(bytes_slice.try_into().unwrap());
        if payload_size < 0 {
            return Err(AppError::MalformedFrame(format!(
                "frame payload length {} less than 0",
                payload_size
            )));
        }
        let frame_size = HEADER_SIZE + payload_size as usize;
        if frame_size > max_frame_size {
            return Err(AppError::FrameTooLarge(format!(
                "frame of length {} exceeds limit {}",
                frame_size, max_frame_size
            )));
        }
        if buffer.remaining() < frame_size {
            buffer.reserve(frame_size);
            return Err(Incomplete);
        }
        Ok(())
    }

    /// Tries to parse one complete frame off the front of `buffer`.
    ///
    /// Returns `Ok(None)` when the buffer holds less than one full frame; the
    /// partial bytes stay in the buffer untouched for the next read. Negative
    /// or oversize declared lengths are fatal framing errors.
    pub fn parse(buffer: &mut BytesMut, max_frame_size: usize) -> AppResult<Option<Frame>> {
        match Frame::check(buffer, max_frame_size) {
            Ok(_) => {
                let type_tag = buffer.get_i32();
                let payload_size = buffer.get_i32() as usize;
                let payload = buffer.split_to(payload_size).freeze();
                Ok(Some(Frame { type_tag, payload }))
            }
            Err(AppError::Incomplete) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Appends the encoded frame to `out`.
    pub fn encode(&self, out: &mut BytesMut) -> AppResult<()> {
        encode_into(self.type_tag, &self.payload, out)
    }
}

/// Encodes a header plus payload without constructing a `Frame`.
pub fn encode_into(type_tag: i32, payload: &[u8], out: &mut BytesMut) -> AppResult<()> {
    if payload.len() > i32::MAX as usize {
        return Err(AppError::FrameTooLarge(format!(
            "payload of length {} cannot be framed",
            payload.len()
        )));
    }
    out.reserve(HEADER_SIZE + payload.len());
    out.put_i32(type_tag);
    out.put_i32(payload.len() as i32);
    out.put_slice(payload);
    Ok(())
}

/// Incremental stream decoder owning the per-connection receive buffer.
///
/// Successive socket reads append into the buffer; `try_next` pulls complete
/// frames off the front and leaves at most one partial tail behind. The same
/// decoder serves the TCP read loop and the datagram path.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_frame_size: usize,
}

impl FrameDecoder {
    pub fn new(read_buffer_size: usize, max_frame_size: usize) -> FrameDecoder {
        FrameDecoder {
            buffer: BytesMut::with_capacity(read_buffer_size),
            max_frame_size,
        }
    }

    /// Appends raw bytes without parsing.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Direct access for `read_buf`-style socket reads.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Number of buffered bytes not yet consumed by a complete frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn try_next(&mut self) -> AppResult<Option<Frame>> {
        Frame::parse(&mut self.buffer, self.max_frame_size)
    }

    /// Appends `data` and drains every complete frame it unlocks, in order.
    pub fn drain(&mut self, data: &[u8]) -> AppResult<Vec<Frame>> {
        self.extend(data);
        let mut frames = Vec::new();
        while let Some(frame) = self.try_next()? {
            frames.push(frame);
        }
        Ok(frames)
    }
}
