use thiserror::Error;

pub const MAX_ARGS: usize = 32 << 20;

/// Keys returned by one `scan` command unless the client asks otherwise
pub const SCAN_DEFAULT_COUNT: usize = 10;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    /// Should try to read more after this
    #[error("not enough bytes (want: {want}, got: {got})")]
    NotEnoughBytes { want: usize, got: usize },

    /// Should close connection after this
    #[error("protocol error (likely exceeding MAX_ARGS)")]
    ProtocolError,
}

pub mod request {
    use crate::storage::Keyspace;

    pub const RES_NX: i32 = 1;
    pub const RES_OK: i32 = 0;
    pub const RES_ERR: i32 = -1;

    /// Response frame: total length (header included), status, payload
    pub fn serialize(status_code: i32, data: &[u8], buf: &mut Vec<u8>) {
        let len = 8 + data.len();
        buf.reserve(len);

        buf.extend_from_slice(&(len as u32).to_be_bytes());
        buf.extend_from_slice(&status_code.to_be_bytes());
        buf.extend_from_slice(data);
    }

    /// Response whose payload is a string array, framed like a request
    pub fn serialize_array<S: AsRef<str>>(status_code: i32, items: &[S], buf: &mut Vec<u8>) {
        let mut data = Vec::new();
        super::encode_request(items, &mut data);
        serialize(status_code, &data, buf);
    }

    pub fn handle_and_encode_request(cmd: &[String], ks: &mut Keyspace, buf: &mut Vec<u8>) {
        match cmd.len() {
            2 if cmd[0] == "get" => match ks.get(&cmd[1]) {
                Some(v) => serialize(RES_OK, v.as_bytes(), buf),
                None => serialize(RES_NX, &[], buf),
            },
            2 if cmd[0] == "del" => match ks.del(&cmd[1]) {
                Some(v) => serialize(RES_OK, v.as_bytes(), buf),
                None => serialize(RES_NX, &[], buf),
            },
            3 if cmd[0] == "set" => {
                ks.set(&cmd[1], &cmd[2]);
                serialize(RES_OK, cmd[2].as_bytes(), buf)
            }
            1 if cmd[0] == "dbsize" => serialize(RES_OK, ks.len().to_string().as_bytes(), buf),
            1 if cmd[0] == "stats" => serialize(RES_OK, ks.stats().as_bytes(), buf),
            1 if cmd[0] == "randomkey" => match ks.random_key() {
                Some(k) => serialize(RES_OK, k.as_bytes(), buf),
                None => serialize(RES_NX, &[], buf),
            },
            2 | 3 if cmd[0] == "scan" => {
                let cursor = cmd[1].parse::<u64>();
                let count = match cmd.get(2) {
                    Some(c) => c.parse::<usize>(),
                    None => Ok(super::SCAN_DEFAULT_COUNT),
                };
                match (cursor, count) {
                    (Ok(cursor), Ok(count)) => {
                        let (next, keys) = ks.scan(cursor, count);
                        let mut items = Vec::with_capacity(keys.len() + 1);
                        items.push(next.to_string());
                        items.extend(keys);
                        serialize_array(RES_OK, &items, buf)
                    }
                    _ => serialize(RES_ERR, b"invalid cursor or count", buf),
                }
            }
            _ => serialize(RES_ERR, b"unknown command", buf),
        }
    }
}

/// Encodes `args` as a request frame: argument count, then each argument
/// prefixed by its length
pub fn encode_request<S: AsRef<str>>(args: &[S], buf: &mut Vec<u8>) {
    buf.extend_from_slice(&(args.len() as u32).to_be_bytes());
    for arg in args {
        let arg = arg.as_ref().as_bytes();
        buf.extend_from_slice(&(arg.len() as u32).to_be_bytes());
        buf.extend_from_slice(arg);
    }
}

pub fn parse_request(src: &[u8]) -> Result<(Vec<String>, usize), ParseError> {
    let mut cursor = 0;
    let num_str = get_u32(src, cursor)? as usize;
    if num_str > MAX_ARGS {
        return Err(ParseError::ProtocolError);
    }
    cursor += 4;

    let mut dst = Vec::with_capacity(num_str.min(64));

    for _ in 0..num_str {
        let len = get_u32(src, cursor)? as usize;

        if len > MAX_ARGS {
            return Err(ParseError::ProtocolError);
        }
        cursor += 4;

        let s = get_str(src, cursor, cursor + len)?;
        dst.push(s.into());

        cursor += len;
    }

    Ok((dst, cursor))
}

/// Splits one response frame off `src`: status, payload and the bytes consumed
pub fn parse_response(src: &[u8]) -> Result<(i32, &[u8], usize), ParseError> {
    let len = get_u32(src, 0)? as usize;
    if !(8..=MAX_ARGS).contains(&len) {
        return Err(ParseError::ProtocolError);
    }
    if src.len() < len {
        return Err(ParseError::NotEnoughBytes {
            want: len,
            got: src.len(),
        });
    }
    let status = get_u32(src, 4)? as i32;
    Ok((status, &src[8..len], len))
}

fn get_str(src: &[u8], start: usize, end: usize) -> Result<&str, ParseError> {
    if src.len() < start {
        // want read
        Err(ParseError::NotEnoughBytes {
            want: start,
            got: src.len(),
        })
    } else if src.len() < end {
        Err(ParseError::NotEnoughBytes {
            want: end,
            got: src.len(),
        })
    } else {
        std::str::from_utf8(&src[start..end]).map_err(|_| ParseError::ProtocolError)
    }
}

fn get_u32(src: &[u8], start: usize) -> Result<u32, ParseError> {
    if src.len() < start + 4 {
        Err(ParseError::NotEnoughBytes {
            want: start + 4,
            got: src.len(),
        })
    } else {
        Ok(to_u32(&src[start..start + 4]))
    }
}

fn to_u32(n: &[u8]) -> u32 {
    u32::from_be_bytes([n[0], n[1], n[2], n[3]])
}
