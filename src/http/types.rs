//! Core HTTP protocol types and utilities

use std::fmt;

#[inline(always)]
pub(crate) fn slice_to_usize(bytes: &[u8]) -> Option<usize> {
    if bytes.is_empty() {
        return None;
    }

    let mut result: usize = 0;

    for &byte in bytes {
        if !byte.is_ascii_digit() {
            return None;
        }

        result = result
            .checked_mul(10)?
            .checked_add((byte - b'0') as usize)?;
    }

    Some(result)
}

#[inline(always)]
pub(crate) fn hex_to_usize(bytes: &[u8]) -> Option<usize> {
    if bytes.is_empty() {
        return None;
    }

    let mut result: usize = 0;

    for &byte in bytes {
        let digit = match byte {
            b'0'..=b'9' => byte - b'0',
            b'a'..=b'f' => byte - b'a' + 10,
            b'A'..=b'F' => byte - b'A' + 10,
            _ => return None,
        };

        result = result.checked_mul(16)?.checked_add(digit as usize)?;
    }

    Some(result)
}

// METHOD

/// HTTP request methods
///
/// Known methods map to dedicated variants, any other valid token is kept
/// as [`Method::Custom`].
///
/// # References
///
/// - [RFC 9110, Section 9](https://datatracker.ietf.org/doc/html/rfc9110#section-9)
/// - [RFC 5789](https://datatracker.ietf.org/doc/html/rfc5789) (PATCH method)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// OPTIONS method - describe the communication options for the target resource
    Options,
    /// HEAD method - same as GET but without response body
    Head,
    /// GET method - transfer a current representation of the target resource
    Get,
    /// POST method - perform resource-specific processing on the request payload
    Post,
    /// PUT method - replace all current representations of the target resource
    Put,
    /// DELETE method - remove all current representations of the target resource
    Delete,
    /// PATCH method - apply partial modifications to a resource
    Patch,
    /// Extension method, the token exactly as received (e.g. `PROPFIND`)
    Custom(Box<str>),
}

impl Method {
    /// Maps an exact, case-sensitive token to a method.
    pub fn from_token(token: &str) -> Self {
        match token {
            "OPTIONS" => Method::Options,
            "HEAD" => Method::Head,
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "PATCH" => Method::Patch,
            _ => Method::Custom(token.into()),
        }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        match self {
            Method::Options => "OPTIONS",
            Method::Head => "HEAD",
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Custom(token) => token,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// VERSION

/// HTTP protocol version
///
/// `HTTP/2` is only ever detected in order to reject it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Version {
    /// HTTP/1.0 - [RFC 1945](https://tools.ietf.org/html/rfc1945)
    Http10,

    /// HTTP/1.1 - [RFC 9112](https://tools.ietf.org/html/rfc9112)
    Http11,
}

impl Version {
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_from_token() {
        #[rustfmt::skip]
        let cases = [
            ("OPTIONS", Method::Options),
            ("HEAD",    Method::Head),
            ("GET",     Method::Get),
            ("POST",    Method::Post),
            ("PUT",     Method::Put),
            ("DELETE",  Method::Delete),
            ("PATCH",   Method::Patch),
            ("get",     Method::Custom("get".into())),
            ("PROPFIND", Method::Custom("PROPFIND".into())),
        ];

        for (token, expected) in cases {
            let method = Method::from_token(token);
            assert_eq!(method, expected);
            assert_eq!(method.to_string(), token);
        }
    }

    #[test]
    fn decimal() {
        #[rustfmt::skip]
        let cases: [(&[u8], Option<usize>); 6] = [
            (b"0",     Some(0)),
            (b"17",    Some(17)),
            (b"00042", Some(42)),
            (b"",      None),
            (b"-1",    None),
            (b"99999999999999999999999", None),
        ];

        for (value, expected) in cases {
            assert_eq!(slice_to_usize(value), expected);
        }
    }

    #[test]
    fn hexadecimal() {
        #[rustfmt::skip]
        let cases: [(&[u8], Option<usize>); 8] = [
            (b"0",  Some(0)),
            (b"00", Some(0)),
            (b"a",  Some(10)),
            (b"A",  Some(10)),
            (b"Ff", Some(255)),
            (b"1X", None),
            (b"",   None),
            (b"fffffffffffffffffffffffff", None),
        ];

        for (value, expected) in cases {
            assert_eq!(hex_to_usize(value), expected);
        }
    }

    #[test]
    fn version_display() {
        assert_eq!(Version::Http10.to_string(), "HTTP/1.0");
        assert_eq!(Version::Http11.to_string(), "HTTP/1.1");
    }
}
