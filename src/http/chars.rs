//! Byte classes used by the line tokenizer

const METHOD: u8 = 0b01;
const URI: u8 = 0b10;

// token = 1*tchar
// tchar = "!" / "#" / "$" / "%" / "&" / "'" / "*" / "+" / "-" / "." /
//         "^" / "_" / "`" / "|" / "~" / DIGIT / ALPHA
const fn is_tchar(b: u8) -> bool {
    matches!(
        b,
        b'!' | b'#'
            | b'$'
            | b'%'
            | b'&'
            | b'\''
            | b'*'
            | b'+'
            | b'-'
            | b'.'
            | b'^'
            | b'_'
            | b'`'
            | b'|'
            | b'~'
            | b'0'..=b'9'
            | b'a'..=b'z'
            | b'A'..=b'Z'
    )
}

// Printable ASCII minus SP, `"`, `<`, `>`, `\`, `^`, `` ` ``, `{`, `|`, `}`.
const fn is_uri_char(b: u8) -> bool {
    matches!(
        b,
        b'!' | b'#'..=b';' | b'=' | b'?'..=b'[' | b']' | b'_' | b'a'..=b'z' | b'~'
    )
}

const fn build_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;

    while i < 256 {
        let b = i as u8;
        if is_tchar(b) {
            table[i] |= METHOD;
        }
        if is_uri_char(b) {
            table[i] |= URI;
        }
        i += 1;
    }

    table
}

static TABLE: [u8; 256] = build_table();

/// Byte allowed in a method token.
#[inline(always)]
pub fn is_method_byte(b: u8) -> bool {
    TABLE[b as usize] & METHOD != 0
}

/// Byte allowed in a request-target.
#[inline(always)]
pub fn is_uri_byte(b: u8) -> bool {
    TABLE[b as usize] & URI != 0
}

/// Three ASCII digits, as in a status code.
#[inline(always)]
pub fn is_status_code(bytes: &[u8]) -> bool {
    matches!(bytes, [b'0'..=b'9', b'0'..=b'9', b'0'..=b'9'])
}
