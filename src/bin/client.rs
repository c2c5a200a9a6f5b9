use std::{
    io::{self, BufRead, Read, Write},
    net::{SocketAddr, TcpStream},
};

use keyspace::protocol::{self, ParseError, request::RES_OK};

fn main() -> io::Result<()> {
    let addr: SocketAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8080".into())
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let mut sock = TcpStream::connect(addr)?;
    let stdin = io::stdin();
    let mut line = String::new();
    let mut incoming = Vec::new();
    let mut rbuf = vec![0; 64 * 1024];

    loop {
        print!("[you] ");
        io::stdout().flush()?;

        line.clear();
        let nread = stdin
            .lock()
            .read_line(&mut line)
            .inspect_err(|e| eprintln!("error on stdin read {e}"))?;
        if nread == 0 {
            eprintln!("stdin: EOF");
            return Ok(());
        }
        let args: Vec<&str> = line.split_whitespace().collect();
        if args.is_empty() {
            continue;
        }

        let mut req = Vec::new();
        protocol::encode_request(&args, &mut req);
        sock.write_all(&req)
            .inspect_err(|e| eprintln!("error on socket write {e}"))?;

        let (status, payload) = loop {
            match protocol::parse_response(&incoming) {
                Ok((status, payload, used)) => {
                    let payload = payload.to_vec();
                    incoming.drain(..used);
                    break (status, payload);
                }
                Err(ParseError::NotEnoughBytes { .. }) => {
                    let n = sock.read(&mut rbuf)?;
                    if n == 0 {
                        eprintln!("sock read: EOF");
                        return Ok(());
                    }
                    incoming.extend_from_slice(&rbuf[..n]);
                }
                Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e)),
            }
        };

        print_response(args[0], status, &payload);
    }
}

fn print_response(cmd: &str, status: i32, payload: &[u8]) {
    if status != RES_OK {
        println!("[srv] ({status}) {}", String::from_utf8_lossy(payload));
        return;
    }
    if cmd == "scan" {
        if let Ok((items, _)) = protocol::parse_request(payload) {
            if let Some((cursor, keys)) = items.split_first() {
                println!("[srv] next cursor {cursor}");
                for (i, key) in keys.iter().enumerate() {
                    println!("  {}) {key}", i + 1);
                }
                return;
            }
        }
    }
    println!("[srv] {}", String::from_utf8_lossy(payload));
}
