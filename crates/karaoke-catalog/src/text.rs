//! Decodificación de texto de los catálogos antiguos (tailandés de 8 bits).

/// TIS-620: ASCII + bloque tailandés en 0xA1..=0xDA y 0xDF..=0xFB.
fn tis620(b: u8) -> Option<char> {
    match b {
        0x00..=0x7F => Some(b as char),
        0xA1..=0xDA | 0xDF..=0xFB => char::from_u32(b as u32 + 0x0D60),
        _ => None,
    }
}

/// Windows-874: TIS-620 más la puntuación de la zona 0x80..=0xA0.
fn cp874(b: u8) -> Option<char> {
    let extra = match b {
        0x80 => '\u{20AC}',
        0x85 => '\u{2026}',
        0x91 => '\u{2018}',
        0x92 => '\u{2019}',
        0x93 => '\u{201C}',
        0x94 => '\u{201D}',
        0x95 => '\u{2022}',
        0x96 => '\u{2013}',
        0x97 => '\u{2014}',
        0xA0 => '\u{00A0}',
        _ => return tis620(b),
    };
    Some(extra)
}

fn decode_with(bytes: &[u8], table: fn(u8) -> Option<char>) -> Option<String> {
    bytes.iter().map(|&b| table(b)).collect()
}

/// Decodifica un campo probando TIS-620, CP874, UTF-8 y por último Latin-1,
/// que nunca falla. El resultado va sin espacios ni NULs de relleno.
pub fn decode_field(bytes: &[u8]) -> String {
    let text = decode_with(bytes, tis620)
        .or_else(|| decode_with(bytes, cp874))
        .or_else(|| std::str::from_utf8(bytes).ok().map(str::to_owned))
        .unwrap_or_else(|| bytes.iter().map(|&b| b as char).collect());

    text.trim_matches(|c: char| c.is_whitespace() || c == '\0')
        .to_string()
}
