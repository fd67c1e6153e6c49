//! Read-ahead cursor over a seekable byte source.
//!
//! The cursor keeps a fixed-size window of unread bytes. `fill` slides the
//! unread residue to the start of the window before pulling more from the
//! source, so callers can peek a few bytes ahead of the current marker
//! without caring where the window boundary falls. Reads larger than the
//! window are served from the buffer first and then straight from the
//! source.

use crate::constants::CURSOR_BUFFER_SIZE;
use crate::error::{MetadataError, Result};
use crate::jpeg_marker_code::{JPEG_MARKER_START_BYTE, JpegMarkerCode};
use std::io::{ErrorKind, Read, Seek, SeekFrom};

/// How a scan for the next marker ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The cursor sits on a marker tag byte.
    Marker,
    /// The source ran out; an EOI tag was synthesized in its place.
    ImplicitEndOfImage,
}

pub struct ByteCursor<R> {
    source: R,
    buffer: Box<[u8]>,
    position: usize,
    available: usize,
    // Position of the underlying source, i.e. just past the last buffered byte.
    source_position: u64,
}

impl<R: Read + Seek> ByteCursor<R> {
    pub fn new(mut source: R) -> Result<Self> {
        let source_position = source.stream_position()?;
        Ok(Self {
            source,
            buffer: vec![0u8; CURSOR_BUFFER_SIZE].into_boxed_slice(),
            position: 0,
            available: 0,
            source_position,
        })
    }

    /// Logical stream position of the next unread byte.
    pub fn stream_position(&self) -> u64 {
        self.source_position - self.available as u64
    }

    pub fn available(&self) -> usize {
        self.available
    }

    /// Guarantees at least `min_bytes` buffered bytes, or fills the window
    /// as far as the source allows when `min_bytes` is zero.
    pub fn fill(&mut self, min_bytes: usize) -> Result<()> {
        debug_assert!(min_bytes <= self.buffer.len());
        let wanted = if min_bytes == 0 {
            self.buffer.len()
        } else {
            min_bytes.min(self.buffer.len())
        };
        if self.available >= wanted {
            return Ok(());
        }

        if self.position != 0 {
            self.buffer
                .copy_within(self.position..self.position + self.available, 0);
            self.position = 0;
        }

        while self.available < wanted {
            match self.source.read(&mut self.buffer[self.available..]) {
                Ok(0) => break,
                Ok(count) => {
                    self.available += count;
                    self.source_position += count as u64;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        tracing::trace!(
            available = self.available,
            position = self.stream_position(),
            "cursor refilled"
        );

        if min_bytes != 0 && self.available < wanted {
            return Err(MetadataError::truncated());
        }
        Ok(())
    }

    /// Returns up to `count` buffered bytes without consuming them. Fewer are
    /// returned only when the source ends first.
    pub fn peek_up_to(&mut self, count: usize) -> Result<&[u8]> {
        if self.available < count {
            self.fill(0)?;
        }
        let count = count.min(self.available);
        Ok(&self.buffer[self.position..self.position + count])
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.fill(1)?;
        let value = self.buffer[self.position];
        self.position += 1;
        self.available -= 1;
        Ok(value)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.fill(2)?;
        let value = u16::from_be_bytes([
            self.buffer[self.position],
            self.buffer[self.position + 1],
        ]);
        self.position += 2;
        self.available -= 2;
        Ok(value)
    }

    /// Fills `destination` completely, from the buffer first and then from
    /// the source.
    pub fn read_into(&mut self, destination: &mut [u8]) -> Result<()> {
        let from_buffer = destination.len().min(self.available);
        destination[..from_buffer]
            .copy_from_slice(&self.buffer[self.position..self.position + from_buffer]);
        self.position += from_buffer;
        self.available -= from_buffer;

        let rest = &mut destination[from_buffer..];
        if !rest.is_empty() {
            self.source.read_exact(rest).map_err(|e| match e.kind() {
                ErrorKind::UnexpectedEof => MetadataError::truncated(),
                _ => e.into(),
            })?;
            self.source_position += rest.len() as u64;
        }
        Ok(())
    }

    pub fn read_exact(&mut self, count: usize) -> Result<Vec<u8>> {
        let mut data = vec![0u8; count];
        self.read_into(&mut data)?;
        Ok(data)
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        let from_buffer = count.min(self.available);
        self.position += from_buffer;
        self.available -= from_buffer;

        let rest = (count - from_buffer) as u64;
        if rest > 0 {
            let skipped = std::io::copy(&mut (&mut self.source).take(rest), &mut std::io::sink())?;
            self.source_position += skipped;
            if skipped < rest {
                return Err(MetadataError::truncated());
            }
        }
        Ok(())
    }

    /// Advances past entropy-coded data to the next 0xFF, then past any
    /// 0xFF fill bytes, leaving the cursor on the marker tag byte.
    pub fn scan_to_marker_prefix(&mut self) -> Result<ScanOutcome> {
        let mut found_prefix = false;
        loop {
            while !found_prefix && self.available > 0 {
                let byte = self.buffer[self.position];
                self.position += 1;
                self.available -= 1;
                found_prefix = byte == JPEG_MARKER_START_BYTE;
            }

            self.fill(0)?;

            if found_prefix {
                while self.available > 0 && self.buffer[self.position] == JPEG_MARKER_START_BYTE {
                    self.position += 1;
                    self.available -= 1;
                }
                if self.available > 0 {
                    return Ok(ScanOutcome::Marker);
                }
                // Only fill bytes were buffered; pull more before deciding.
                self.fill(0)?;
                if self.available > 0 {
                    continue;
                }
            }

            if self.available == 0 {
                self.buffer[0] = JpegMarkerCode::EndOfImage.into();
                self.position = 0;
                self.available = 1;
                return Ok(ScanOutcome::ImplicitEndOfImage);
            }
        }
    }

    /// Repositions the source at the cursor's logical position and drops the
    /// read-ahead, so the next reader of the source starts where parsing
    /// stopped.
    pub fn push_back_unconsumed(&mut self) -> Result<()> {
        let logical = self.stream_position();
        self.source.seek(SeekFrom::Start(logical))?;
        self.source_position = logical;
        self.position = 0;
        self.available = 0;
        Ok(())
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.source
    }

    pub fn into_inner(self) -> R {
        self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_reads_across_window_boundary() {
        let data: Vec<u8> = (0..(CURSOR_BUFFER_SIZE * 2 + 17)).map(|i| i as u8).collect();
        let mut cursor = ByteCursor::new(Cursor::new(data.clone())).unwrap();
        cursor.fill(3).unwrap();
        assert_eq!(cursor.read_u8().unwrap(), 0);
        let chunk = cursor.read_exact(CURSOR_BUFFER_SIZE + 100).unwrap();
        assert_eq!(&chunk[..], &data[1..CURSOR_BUFFER_SIZE + 101]);
        assert_eq!(cursor.stream_position(), CURSOR_BUFFER_SIZE as u64 + 101);
        cursor.skip(CURSOR_BUFFER_SIZE - 101).unwrap();
        assert_eq!(cursor.read_u16().unwrap(), u16::from_be_bytes([data[10000], data[10001]]));
    }

    #[test]
    fn test_short_read_is_truncation() {
        let mut cursor = ByteCursor::new(Cursor::new(vec![1u8, 2, 3])).unwrap();
        let err = cursor.read_exact(4).unwrap_err();
        assert!(err.is_format_error());
        let mut cursor = ByteCursor::new(Cursor::new(vec![1u8])).unwrap();
        assert!(cursor.read_u16().unwrap_err().is_format_error());
        let mut cursor = ByteCursor::new(Cursor::new(vec![1u8, 2])).unwrap();
        assert!(cursor.skip(3).unwrap_err().is_format_error());
    }

    #[test]
    fn test_scan_skips_data_and_fill_bytes() {
        let mut cursor =
            ByteCursor::new(Cursor::new(vec![0x12, 0x34, 0xFF, 0xFF, 0xFF, 0xD9])).unwrap();
        assert_eq!(cursor.scan_to_marker_prefix().unwrap(), ScanOutcome::Marker);
        assert_eq!(cursor.read_u8().unwrap(), 0xD9);
    }

    #[test]
    fn test_scan_synthesizes_end_of_image() {
        let mut cursor = ByteCursor::new(Cursor::new(vec![0x12, 0x34, 0x56])).unwrap();
        assert_eq!(
            cursor.scan_to_marker_prefix().unwrap(),
            ScanOutcome::ImplicitEndOfImage
        );
        assert_eq!(cursor.read_u8().unwrap(), 0xD9);

        let mut cursor = ByteCursor::new(Cursor::new(vec![0x12, 0xFF, 0xFF])).unwrap();
        assert_eq!(
            cursor.scan_to_marker_prefix().unwrap(),
            ScanOutcome::ImplicitEndOfImage
        );
    }

    #[test]
    fn test_push_back_repositions_source() {
        let mut cursor = ByteCursor::new(Cursor::new(vec![9u8, 8, 7, 6, 5])).unwrap();
        cursor.fill(0).unwrap();
        cursor.skip(2).unwrap();
        cursor.push_back_unconsumed().unwrap();
        let mut source = cursor.into_inner();
        let mut rest = Vec::new();
        source.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, vec![7, 6, 5]);
    }
}
