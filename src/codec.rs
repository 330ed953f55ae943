use bytes::{Bytes, BytesMut};
use compression_codecs::{EncodeV2, gzip::GzipEncoder};
use compression_core::Level;
use compression_core::util::{PartialBuffer, WriteBuffer};
use std::io;

const OUTPUT_BUFFER_SIZE: usize = 8 * 1024; // 8KB output buffer

/// The `Content-Encoding` value written for compressed responses.
pub const GZIP: &str = "gzip";

/// An incremental gzip encoder.
///
/// Input is fed with [`encode`](Gzip::encode), which returns whatever compressed
/// bytes the encoder was ready to emit (possibly none). [`finish`](Gzip::finish)
/// writes the remaining deflate data and the gzip footer.
pub(crate) struct Gzip {
    encoder: GzipEncoder,
    output_buffer: Vec<u8>,
}

impl Gzip {
    pub(crate) fn new() -> Self {
        Self {
            encoder: GzipEncoder::new(Level::Default.into()),
            output_buffer: vec![0u8; OUTPUT_BUFFER_SIZE],
        }
    }

    /// Compresses a whole buffer into a complete gzip member.
    pub(crate) fn compress(input: &[u8]) -> io::Result<Bytes> {
        let mut gzip = Gzip::new();
        let mut out = BytesMut::new();
        out.extend_from_slice(&gzip.encode(input)?);
        out.extend_from_slice(&gzip.finish()?);
        Ok(out.freeze())
    }

    /// Feeds `input` to the encoder and returns the compressed bytes produced so far.
    pub(crate) fn encode(&mut self, input: &[u8]) -> io::Result<Bytes> {
        // The deflate stream rejects empty input once the header is out.
        if input.is_empty() {
            return Ok(Bytes::new());
        }

        let mut input_buf = PartialBuffer::new(input);
        let mut all_output = BytesMut::new();

        // Keep encoding until all input is consumed
        loop {
            let mut output = WriteBuffer::new_initialized(self.output_buffer.as_mut_slice());

            self.encoder
                .encode(&mut input_buf, &mut output)
                .map_err(io::Error::other)?;

            let written = output.written_len();
            if written > 0 {
                all_output.extend_from_slice(&self.output_buffer[..written]);
            }

            if input_buf.written_len() >= input.len() {
                break;
            }

            if written == 0 && input_buf.written_len() == 0 {
                break;
            }
        }

        Ok(all_output.freeze())
    }

    /// Finalizes the gzip stream, returning the trailing compressed bytes and footer.
    pub(crate) fn finish(&mut self) -> io::Result<Bytes> {
        let mut all_output = BytesMut::new();

        loop {
            let mut output = WriteBuffer::new_initialized(self.output_buffer.as_mut_slice());
            let done = self.encoder.finish(&mut output).map_err(io::Error::other)?;

            let written = output.written_len();
            if written > 0 {
                all_output.extend_from_slice(&self.output_buffer[..written]);
            }
            if done {
                break;
            }
        }

        Ok(all_output.freeze())
    }
}
