use std::fmt;

use encoding_rs::{EUC_KR, UTF_8};
use tracing::debug;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Text encodings seen in Korean public-data CSV exports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceEncoding {
    Utf8,
    /// KS X 1001 only: two-byte sequences with both bytes in `0xA1..=0xFE`.
    EucKr,
    /// Microsoft's superset of EUC-KR, covering all 11172 modern Hangul syllables.
    Cp949,
}

impl SourceEncoding {
    /// The order in which a file is tried; the first clean decode wins.
    pub const FALLBACK_ORDER: [SourceEncoding; 3] = [
        SourceEncoding::Utf8,
        SourceEncoding::EucKr,
        SourceEncoding::Cp949,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SourceEncoding::Utf8 => "utf-8",
            SourceEncoding::EucKr => "euc-kr",
            SourceEncoding::Cp949 => "cp949",
        }
    }

    /// Decodes the whole buffer, or returns `None` on the first malformed sequence.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        let text = match self {
            SourceEncoding::Utf8 => {
                let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
                UTF_8.decode_without_bom_handling_and_without_replacement(bytes)?
            }
            SourceEncoding::EucKr => {
                if !is_strict_euc_kr(bytes) {
                    return None;
                }
                EUC_KR.decode_without_bom_handling_and_without_replacement(bytes)?
            }
            // encoding_rs' EUC_KR is the WHATWG definition, which is windows-949.
            SourceEncoding::Cp949 => {
                EUC_KR.decode_without_bom_handling_and_without_replacement(bytes)?
            }
        };

        Some(text.into_owned())
    }
}

impl fmt::Display for SourceEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Tries every encoding of [`SourceEncoding::FALLBACK_ORDER`] in turn.
pub fn decode_with_fallback(bytes: &[u8]) -> Option<(String, SourceEncoding)> {
    SourceEncoding::FALLBACK_ORDER.into_iter().find_map(|encoding| {
        let decoded = encoding.decode(bytes);
        if decoded.is_none() {
            debug!(encoding = encoding.label(), "decode failed, trying next encoding");
        }
        decoded.map(|text| (text, encoding))
    })
}

fn is_strict_euc_kr(bytes: &[u8]) -> bool {
    const ROW: std::ops::RangeInclusive<u8> = 0xA1..=0xFE;

    let mut iter = bytes.iter();
    while let Some(&lead) = iter.next() {
        if lead < 0x80 {
            continue;
        }
        match iter.next() {
            Some(trail) if ROW.contains(&lead) && ROW.contains(trail) => {}
            _ => return false,
        }
    }

    true
}
