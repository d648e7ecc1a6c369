//! Inbound line framing.
//!
//! Wraps `LinesCodec` so that an over-long or non-UTF-8 line becomes an item
//! instead of a stream error. `FramedRead` stops after the first decoder
//! error, and one bad line must not end the session.

use std::io;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

/// One inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundLine {
    Line(String),
    /// The line was dropped; the payload says why.
    Undecodable(String),
}

#[derive(Debug)]
pub struct InboundCodec {
    inner: LinesCodec,
}

impl InboundCodec {
    #[must_use]
    pub fn new(max_line_length: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_line_length),
        }
    }
}

fn classify(decoded: Result<Option<String>, LinesCodecError>) -> Result<Option<InboundLine>, io::Error> {
    match decoded {
        Ok(line) => Ok(line.map(InboundLine::Line)),
        Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(InboundLine::Undecodable(
            "line exceeds the maximum length".to_string(),
        ))),
        Err(LinesCodecError::Io(e)) if e.kind() == io::ErrorKind::InvalidData => Ok(Some(
            InboundLine::Undecodable(format!("line is not valid UTF-8: {e}")),
        )),
        Err(LinesCodecError::Io(e)) => Err(e),
    }
}

impl Decoder for InboundCodec {
    type Item = InboundLine;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        classify(self.inner.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        classify(self.inner.decode_eof(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(codec: &mut InboundCodec, buf: &mut BytesMut) -> Vec<InboundLine> {
        let mut out = Vec::new();
        while let Some(item) = codec.decode(buf).unwrap() {
            out.push(item);
        }
        while let Some(item) = codec.decode_eof(buf).unwrap() {
            out.push(item);
        }
        out
    }

    #[test]
    fn splits_lines_and_strips_carriage_returns() {
        let mut codec = InboundCodec::new(1024);
        let mut buf = BytesMut::from("{\"a\":1}\r\n{\"b\":2}\ntrailing");
        assert_eq!(
            drain(&mut codec, &mut buf),
            vec![
                InboundLine::Line("{\"a\":1}".into()),
                InboundLine::Line("{\"b\":2}".into()),
                InboundLine::Line("trailing".into()),
            ]
        );
    }

    #[test]
    fn over_long_line_is_reported_and_skipped() {
        let mut codec = InboundCodec::new(8);
        let mut buf = BytesMut::from("0123456789abcdef\nshort\n");
        let items = drain(&mut codec, &mut buf);
        assert!(matches!(items[0], InboundLine::Undecodable(_)));
        assert_eq!(items[1], InboundLine::Line("short".into()));
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn invalid_utf8_is_reported_and_skipped() {
        let mut codec = InboundCodec::new(1024);
        let mut buf = BytesMut::from(&b"\xff\xfe\nok\n"[..]);
        let items = drain(&mut codec, &mut buf);
        assert!(matches!(&items[0], InboundLine::Undecodable(reason) if reason.contains("UTF-8")));
        assert_eq!(items[1], InboundLine::Line("ok".into()));
    }
}
