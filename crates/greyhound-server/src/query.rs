//! One in-progress `/read` query.
//!
//! Wraps a [`PointQuery`] and produces successive bounded chunks of the
//! response body, optionally piping the point stream through a zlib
//! compressor. Once the source drains (and the compressor, if any, has been
//! finished) the 4-byte little-endian point count is appended and the query
//! becomes terminal.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use greyhound_core::PointQuery;

use crate::error::HttpError;

pub struct ReadQuery {
    source: Box<dyn PointQuery>,
    compressor: Option<ZlibEncoder<Vec<u8>>>,
    scratch: Vec<u8>,
    done: bool,
}

impl ReadQuery {
    pub fn new(source: Box<dyn PointQuery>, compress: bool) -> ReadQuery {
        ReadQuery {
            source,
            compressor: compress
                .then(|| ZlibEncoder::new(Vec::new(), Compression::default())),
            scratch: Vec::new(),
            done: false,
        }
    }

    /// Append up to one chunk of output to `buf`.
    ///
    /// Must not be called again once [`done`](ReadQuery::done) is true.
    pub fn read(&mut self, buf: &mut Vec<u8>) -> Result<(), HttpError> {
        if self.done {
            return Err(HttpError::Internal("read called after done".to_string()));
        }

        let drained = match self.compressor.as_mut() {
            None => self.source.read_some(buf)?,
            Some(encoder) => {
                self.scratch.clear();
                let drained = self.source.read_some(&mut self.scratch)?;
                encoder
                    .write_all(&self.scratch)
                    .map_err(|e| HttpError::Internal(format!("compression failed: {e}")))?;

                if drained {
                    let encoder = self
                        .compressor
                        .take()
                        .unwrap_or_else(|| ZlibEncoder::new(Vec::new(), Compression::default()));
                    let out = encoder
                        .finish()
                        .map_err(|e| HttpError::Internal(format!("compression failed: {e}")))?;
                    buf.extend_from_slice(&out);
                } else {
                    // Drain whatever the encoder has emitted so far.
                    let inner = encoder.get_mut();
                    buf.extend_from_slice(inner);
                    inner.clear();
                }
                drained
            }
        };

        if drained {
            let points = self.source.num_points() as u32;
            buf.extend_from_slice(&points.to_le_bytes());
            self.done = true;
        }
        Ok(())
    }

    /// True after `read` has produced the terminal chunk.
    pub fn done(&self) -> bool {
        self.done
    }

    /// Points emitted so far; the total once done.
    pub fn num_points(&self) -> u64 {
        self.source.num_points()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::ZlibDecoder;
    use greyhound_core::QueryError;
    use std::io::Read;

    /// Emits `total` bytes of rolling data in fixed batches.
    struct Counter {
        total: usize,
        emitted: usize,
        batch: usize,
    }

    impl PointQuery for Counter {
        fn read_some(&mut self, buf: &mut Vec<u8>) -> Result<bool, QueryError> {
            let n = self.batch.min(self.total - self.emitted);
            buf.extend((0..n).map(|i| (self.emitted + i) as u8));
            self.emitted += n;
            Ok(self.emitted == self.total)
        }

        fn num_points(&self) -> u64 {
            self.emitted as u64
        }
    }

    fn counter(total: usize, batch: usize) -> Box<Counter> {
        Box::new(Counter { total, emitted: 0, batch })
    }

    fn drain(query: &mut ReadQuery) -> Vec<u8> {
        let mut out = Vec::new();
        while !query.done() {
            query.read(&mut out).unwrap();
        }
        out
    }

    #[test]
    fn test_trailer_carries_point_count() {
        let mut query = ReadQuery::new(counter(100, 40), false);
        let body = drain(&mut query);

        assert_eq!(body.len(), 104);
        let trailer = u32::from_le_bytes(body[100..].try_into().unwrap());
        assert_eq!(trailer, 100);
        assert_eq!(query.num_points(), 100);
    }

    #[test]
    fn test_read_after_done_is_an_error() {
        let mut query = ReadQuery::new(counter(10, 10), false);
        let mut buf = Vec::new();
        query.read(&mut buf).unwrap();
        assert!(query.done());
        assert!(matches!(
            query.read(&mut buf),
            Err(HttpError::Internal(_))
        ));
    }

    #[test]
    fn test_empty_source_still_gets_trailer() {
        let mut query = ReadQuery::new(counter(0, 16), false);
        let body = drain(&mut query);
        assert_eq!(body, 0u32.to_le_bytes());
    }

    #[test]
    fn test_compressed_stream_round_trips() {
        let mut plain = ReadQuery::new(counter(5000, 512), false);
        let expected = drain(&mut plain);

        let mut compressed = ReadQuery::new(counter(5000, 512), true);
        let body = drain(&mut compressed);

        // The count trails the compressed stream uncompressed.
        let (stream, trailer) = body.split_at(body.len() - 4);
        assert_eq!(u32::from_le_bytes(trailer.try_into().unwrap()), 5000);

        let mut decoded = Vec::new();
        ZlibDecoder::new(stream).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, expected[..expected.len() - 4]);
    }

    #[test]
    fn test_compression_emits_incrementally() {
        // Large incompressible-ish batches force intermediate emission.
        let mut query = ReadQuery::new(counter(200_000, 64 * 1024), true);
        let mut sizes = Vec::new();
        let mut body = Vec::new();
        while !query.done() {
            let before = body.len();
            query.read(&mut body).unwrap();
            sizes.push(body.len() - before);
        }
        assert!(sizes.len() > 1);
        assert!(body.len() > 4);
    }
}
