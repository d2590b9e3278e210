use std::fmt;

/// Maximum declared bulk string length accepted from the store (512MB).
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Maximum declared array length accepted from the store.
const MAX_ARRAY_LEN: i64 = 1024 * 1024;

/// A reply decoded from the store's wire format.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// +OK\r\n
    Status(String),
    /// -ERR message\r\n
    Error(String),
    /// :1000\r\n
    Integer(i64),
    /// $6\r\nfoobar\r\n  or  $-1\r\n (null)
    BulkString(Option<String>),
    /// *2\r\n...  or  *-1\r\n (null)
    Array(Option<Vec<Reply>>),
    /// Anything that does not decode; holds the raw buffer for diagnostics.
    Unrecognized(String),
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    pub fn error(s: impl Into<String>) -> Self {
        Reply::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        Reply::Integer(n)
    }

    pub fn bulk_string(s: impl Into<String>) -> Self {
        Reply::BulkString(Some(s.into()))
    }

    pub fn null_bulk_string() -> Self {
        Reply::BulkString(None)
    }

    pub fn array(items: Vec<Reply>) -> Self {
        Reply::Array(Some(items))
    }

    /// Serialize this reply to wire bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_to(&mut buf);
        buf
    }

    /// Write wire bytes into the given buffer.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        match self {
            Reply::Status(s) => {
                buf.push(b'+');
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            Reply::Error(s) => {
                buf.push(b'-');
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            Reply::Integer(n) => {
                buf.push(b':');
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            Reply::BulkString(None) => {
                buf.extend_from_slice(b"$-1\r\n");
            }
            Reply::BulkString(Some(data)) => {
                buf.push(b'$');
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                buf.extend_from_slice(data.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            Reply::Array(None) => {
                buf.extend_from_slice(b"*-1\r\n");
            }
            Reply::Array(Some(items)) => {
                buf.push(b'*');
                buf.extend_from_slice(items.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                for item in items {
                    item.write_to(buf);
                }
            }
            Reply::Unrecognized(raw) => {
                buf.extend_from_slice(raw.as_bytes());
            }
        }
    }

    /// The wire lines of an array's elements, without the leading count line.
    ///
    /// For an array of bulk strings this is `$len`, payload, `$len`, payload...
    /// Any other reply has no element lines.
    pub fn element_lines(&self) -> Vec<String> {
        let items = match self {
            Reply::Array(Some(items)) => items,
            _ => return Vec::new(),
        };

        let mut buf = Vec::new();
        for item in items {
            item.write_to(&mut buf);
        }
        let text = String::from_utf8_lossy(&buf);
        let mut lines: Vec<String> = text.split("\r\n").map(str::to_string).collect();
        // The final terminator leaves an empty tail.
        if lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        lines
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status(s) => write!(f, "{s}"),
            Reply::Error(s) => write!(f, "(error) {s}"),
            Reply::Integer(n) => write!(f, "(integer) {n}"),
            Reply::BulkString(None) | Reply::Array(None) => write!(f, "(nil)"),
            Reply::BulkString(Some(s)) => write!(f, "\"{s}\""),
            Reply::Array(Some(items)) => {
                if items.is_empty() {
                    return write!(f, "(empty array)");
                }
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {item}", i + 1)?;
                }
                Ok(())
            }
            Reply::Unrecognized(raw) => write!(f, "{}", raw.trim_end()),
        }
    }
}

/// Render a command name and its arguments as a single request line.
///
/// Tokens are joined with single spaces and terminated with `\r\n`. Nothing is
/// escaped, so a token with embedded whitespace reaches the store as several
/// tokens.
pub fn encode<S: AsRef<str>>(command: &str, args: &[S]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(command.len() + 2);
    buf.extend_from_slice(command.as_bytes());
    for arg in args {
        buf.push(b' ');
        buf.extend_from_slice(arg.as_ref().as_bytes());
    }
    buf.extend_from_slice(b"\r\n");
    buf
}

/// Render a raw, user-supplied command line.
pub fn encode_raw(line: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(line.len() + 2);
    buf.extend_from_slice(line.as_bytes());
    buf.extend_from_slice(b"\r\n");
    buf
}

/// Decode a reply buffer.
///
/// Never fails: malformed, truncated or untagged input yields
/// `Reply::Unrecognized` carrying the raw buffer. Bytes after the first
/// complete reply are ignored.
pub fn decode(buf: &[u8]) -> Reply {
    match ReplyParser::parse(buf) {
        Ok(Some((reply, _))) => reply,
        Ok(None) | Err(_) => Reply::Unrecognized(String::from_utf8_lossy(buf).into_owned()),
    }
}

/// Whether `buf` holds a whole reply, so reading more would not change what
/// `decode` returns.
///
/// A buffer that is already malformed counts as complete. Untagged replies
/// are complete once they contain a terminated line.
pub fn is_complete(buf: &[u8]) -> bool {
    if buf.is_empty() {
        return false;
    }
    if !is_tag(buf[0]) {
        return find_crlf(buf).is_some();
    }
    match ReplyParser::parse(buf) {
        Ok(Some(_)) => true,
        Ok(None) => false,
        Err(_) => true,
    }
}

fn is_tag(b: u8) -> bool {
    matches!(b, b'+' | b'-' | b':' | b'$' | b'*')
}

/// Incremental reply parser over a borrowed buffer.
///
/// Returns `Ok(Some((reply, consumed)))` when a complete reply is present,
/// `Ok(None)` when more data is needed and `Err` when the bytes can never
/// form a valid reply.
pub struct ReplyParser;

impl ReplyParser {
    pub fn parse(buf: &[u8]) -> Result<Option<(Reply, usize)>, RespError> {
        if buf.is_empty() {
            return Ok(None);
        }

        match buf[0] {
            b'+' => Self::parse_line(buf).map(|r| r.map(|(s, n)| (Reply::Status(s), n))),
            b'-' => Self::parse_line(buf).map(|r| r.map(|(s, n)| (Reply::Error(s), n))),
            b':' => Self::parse_integer(buf),
            b'$' => Self::parse_bulk_string(buf),
            b'*' => Self::parse_array(buf),
            other => Err(RespError::InvalidByte(other)),
        }
    }

    fn parse_line(buf: &[u8]) -> Result<Option<(String, usize)>, RespError> {
        match find_crlf_from(buf, 1) {
            Some(end) => {
                let s = String::from_utf8_lossy(&buf[1..end]).to_string();
                Ok(Some((s, end + 2)))
            }
            None => Ok(None),
        }
    }

    fn parse_integer(buf: &[u8]) -> Result<Option<(Reply, usize)>, RespError> {
        let end = match find_crlf_from(buf, 1) {
            Some(pos) => pos,
            None => return Ok(None),
        };
        let n = parse_decimal(&buf[1..end], "integer")?;
        Ok(Some((Reply::Integer(n), end + 2)))
    }

    fn parse_bulk_string(buf: &[u8]) -> Result<Option<(Reply, usize)>, RespError> {
        let crlf = match find_crlf_from(buf, 1) {
            Some(pos) => pos,
            None => return Ok(None),
        };

        let len = parse_decimal(&buf[1..crlf], "bulk length")?;

        if len == -1 {
            return Ok(Some((Reply::BulkString(None), crlf + 2)));
        }

        if !(0..=MAX_BULK_LEN).contains(&len) {
            return Err(RespError::InvalidData(format!("invalid bulk length: {len}")));
        }

        let len = len as usize;
        let total_needed = crlf + 2 + len + 2; // header + data + trailing \r\n

        if buf.len() < total_needed {
            return Ok(None);
        }

        if &buf[crlf + 2 + len..total_needed] != b"\r\n" {
            return Err(RespError::InvalidData(
                "missing trailing CRLF after bulk string".into(),
            ));
        }

        let data = String::from_utf8_lossy(&buf[crlf + 2..crlf + 2 + len]).into_owned();
        Ok(Some((Reply::BulkString(Some(data)), total_needed)))
    }

    fn parse_array(buf: &[u8]) -> Result<Option<(Reply, usize)>, RespError> {
        let crlf = match find_crlf_from(buf, 1) {
            Some(pos) => pos,
            None => return Ok(None),
        };

        let len = parse_decimal(&buf[1..crlf], "array length")?;

        if len == -1 {
            return Ok(Some((Reply::Array(None), crlf + 2)));
        }

        if !(0..=MAX_ARRAY_LEN).contains(&len) {
            return Err(RespError::InvalidData(format!("invalid array length: {len}")));
        }

        let mut pos = crlf + 2;
        let mut items = Vec::with_capacity(len as usize);
        for _ in 0..len {
            match Self::parse(&buf[pos..])? {
                Some((item, used)) => {
                    items.push(item);
                    pos += used;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((Reply::Array(Some(items)), pos)))
    }
}

fn parse_decimal(digits: &[u8], what: &str) -> Result<i64, RespError> {
    let s = std::str::from_utf8(digits)
        .map_err(|_| RespError::InvalidData(format!("invalid {what} encoding")))?;
    s.parse()
        .map_err(|_| RespError::InvalidData(format!("invalid {what}: {s}")))
}

/// Find \r\n starting from position 0.
fn find_crlf(buf: &[u8]) -> Option<usize> {
    find_crlf_from(buf, 0)
}

/// Find \r\n starting from the given position.
fn find_crlf_from(buf: &[u8], start: usize) -> Option<usize> {
    if buf.len() < start + 2 {
        return None;
    }
    (start..buf.len() - 1).find(|&i| buf[i] == b'\r' && buf[i + 1] == b'\n')
}

#[derive(Debug, thiserror::Error)]
pub enum RespError {
    #[error("unexpected reply tag '{}'", *.0 as char)]
    InvalidByte(u8),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}
