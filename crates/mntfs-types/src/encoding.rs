//! Text encodings for `read_file` and `write_text`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::FsError;

/// A text encoding.
///
/// Names parse case-insensitively; `utf-8`, `latin1`, `binary` and friends
/// are accepted as aliases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Utf8,
    Ascii,
    Latin1,
    Utf16le,
    Hex,
}

impl Encoding {
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf8",
            Encoding::Ascii => "ascii",
            Encoding::Latin1 => "latin1",
            Encoding::Utf16le => "utf16le",
            Encoding::Hex => "hex",
        }
    }

    /// Decode bytes into text. Invalid sequences become U+FFFD.
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Encoding::Ascii => bytes.iter().map(|b| char::from(b & 0x7f)).collect(),
            Encoding::Latin1 => bytes.iter().copied().map(char::from).collect(),
            Encoding::Utf16le => {
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                String::from_utf16_lossy(&units)
            }
            Encoding::Hex => bytes.iter().map(|b| format!("{b:02x}")).collect(),
        }
    }

    /// Encode text into bytes.
    ///
    /// Single-byte encodings keep the low byte of each code point. Hex
    /// input stops at the first invalid pair.
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            Encoding::Utf8 => text.as_bytes().to_vec(),
            Encoding::Ascii | Encoding::Latin1 => {
                text.chars().map(|c| (u32::from(c) & 0xff) as u8).collect()
            }
            Encoding::Utf16le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
            Encoding::Hex => {
                let digits = text.as_bytes();
                digits
                    .chunks_exact(2)
                    .map_while(|pair| {
                        std::str::from_utf8(pair)
                            .ok()
                            .and_then(|s| u8::from_str_radix(s, 16).ok())
                    })
                    .collect()
            }
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Encoding {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(Encoding::Utf8),
            "ascii" => Ok(Encoding::Ascii),
            "latin1" | "binary" | "iso-8859-1" | "iso8859-1" => Ok(Encoding::Latin1),
            "utf16le" | "utf-16le" | "ucs2" | "ucs-2" => Ok(Encoding::Utf16le),
            "hex" => Ok(Encoding::Hex),
            other => Err(FsError::invalid(format!("unknown encoding: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;
    use rstest::rstest;

    #[rstest]
    #[case("UTF-8", Encoding::Utf8)]
    #[case("utf8", Encoding::Utf8)]
    #[case("binary", Encoding::Latin1)]
    #[case("ucs2", Encoding::Utf16le)]
    #[case("Hex", Encoding::Hex)]
    fn parses_aliases(#[case] name: &str, #[case] expected: Encoding) {
        assert_eq!(name.parse::<Encoding>().unwrap(), expected);
    }

    #[test]
    fn unknown_encoding_is_einval() {
        let err = "ebcdic".parse::<Encoding>().unwrap_err();
        assert!(err.is(ErrorCode::InvalidArgument));
    }

    #[test]
    fn utf8_is_lossy_on_bad_bytes() {
        assert_eq!(Encoding::Utf8.decode(b"hi\xff"), "hi\u{fffd}");
    }

    #[test]
    fn hex_decodes_and_encodes() {
        assert_eq!(Encoding::Hex.decode(b"\x00\xab"), "00ab");
        assert_eq!(Encoding::Hex.encode("00abzz"), vec![0x00, 0xab]);
    }

    #[test]
    fn utf16le_round_trip() {
        let bytes = Encoding::Utf16le.encode("héllo");
        assert_eq!(bytes.len(), 10);
        assert_eq!(Encoding::Utf16le.decode(&bytes), "héllo");
    }

    #[test]
    fn latin1_keeps_high_bytes() {
        assert_eq!(Encoding::Latin1.decode(&[0xe9]), "é");
        assert_eq!(Encoding::Latin1.encode("é"), vec![0xe9]);
        assert_eq!(Encoding::Ascii.decode(&[0xe9]), "i");
    }
}
