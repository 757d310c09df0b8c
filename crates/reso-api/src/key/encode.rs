//! Percent-encoding for rendered keys.

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};

use crate::error::{ResourceError, ResourceResult};

/// Characters escaped inside path segments.
const SEGMENT: &AsciiSet = &CONTROLS.add(b'%').add(b'?').add(b'#');

/// Characters escaped inside qualifier names and values.
const QUALIFIER: &AsciiSet = &SEGMENT.add(b'&').add(b'=').add(b'/');

pub(crate) fn segment(text: &str) -> impl std::fmt::Display + '_ {
    utf8_percent_encode(text, SEGMENT)
}

pub(crate) fn qualifier(text: &str) -> impl std::fmt::Display + '_ {
    utf8_percent_encode(text, QUALIFIER)
}

/// Decode percent escapes. Invalid escapes are kept literally.
pub(crate) fn decode(text: &str) -> ResourceResult<String> {
    percent_decode_str(text)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| ResourceError::malformed(text, format!("invalid UTF-8 after decoding: {e}")))
}
