//! Character encodings for text fields.

use crate::definition::EncodingName;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Ascii,
    Utf8,
    Latin1,
}

impl From<EncodingName> for TextEncoding {
    fn from(name: EncodingName) -> Self {
        match name {
            EncodingName::Ascii => TextEncoding::Ascii,
            EncodingName::Utf8 => TextEncoding::Utf8,
            EncodingName::Latin1 => TextEncoding::Latin1,
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TextEncoding::Ascii => "ascii",
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Latin1 => "iso-8859-1",
        })
    }
}

impl TextEncoding {
    /// Decode `bytes`; on failure returns the offset of the first bad byte.
    pub fn decode(self, bytes: &[u8]) -> Result<String, usize> {
        match self {
            TextEncoding::Ascii => match bytes.iter().position(|b| !b.is_ascii()) {
                Some(offset) => Err(offset),
                None => Ok(bytes.iter().map(|b| char::from(*b)).collect()),
            },
            TextEncoding::Utf8 => std::str::from_utf8(bytes)
                .map(str::to_string)
                .map_err(|err| err.valid_up_to()),
            TextEncoding::Latin1 => Ok(bytes.iter().map(|b| char::from(*b)).collect()),
        }
    }

    /// Encode `text`; on failure returns the first unrepresentable char.
    pub fn encode(self, text: &str) -> Result<Vec<u8>, char> {
        match self {
            TextEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
            TextEncoding::Ascii => text
                .chars()
                .map(|c| if c.is_ascii() { Ok(c as u8) } else { Err(c) })
                .collect(),
            TextEncoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).map_err(|_| c))
                .collect(),
        }
    }
}
