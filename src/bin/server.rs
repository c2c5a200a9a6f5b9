use std::time::Instant;

use keyspace::{
    SERVER, ServerError, config::ServerConfig, connection::ConnectionManager, storage::Keyspace,
    util,
};
use log::{info, trace};
use mio::{Events, Interest, Poll, net::TcpListener};

fn main() -> Result<(), ServerError> {
    env_logger::builder().init();

    let config = ServerConfig::load_from_env()?;
    info!("starting with {config:?}");

    // before the first key is hashed
    dict::set_hash_seed(rand::random());

    let mut keyspace = Keyspace::new(config.rehash_budget);
    let mut poll = Poll::new()?;
    let mut events = Events::with_capacity(128);
    let mut listener = TcpListener::bind(config.addr)?;
    trace!("Listener: {:#?}", listener);

    poll.registry()
        .register(&mut listener, SERVER, Interest::READABLE)?;

    let mut connections = ConnectionManager::new();
    let period = config.cron_period();
    let mut next_cron = Instant::now() + period;

    loop {
        let timeout = next_cron.saturating_duration_since(Instant::now());
        if let Err(e) = poll.poll(&mut events, Some(timeout)) {
            if util::interrupted(&e) {
                continue;
            }
            return Err(e.into());
        }

        for event in events.iter() {
            match event.token() {
                SERVER => while connections.handle_accept(&listener, &poll)? {},
                token => {
                    let Some(conn) = connections.get_connection_mut(&token) else {
                        trace!(target: "new_token", "spurious wake for token {}", token.0);
                        continue;
                    };

                    if event.is_readable() && conn.want_read() {
                        let _ = conn.on_read(&mut keyspace).inspect_err(|e| {
                            trace!(target: "on_read", "error during read: {e}");
                        });
                    }

                    if event.is_writable() && conn.want_write() {
                        let _ = conn.on_write().inspect_err(|e| {
                            trace!(target: "on_write", "error during write: {e}");
                        });
                    }

                    if conn.want_close() {
                        connections.handle_close(&poll, token)?;
                    }
                }
            }
        }

        if Instant::now() >= next_cron {
            keyspace.cron();
            next_cron = Instant::now() + period;
        }
    }
}
