//! Loopback tests for the reactor.
//!
//! The server is driven one iteration at a time from the test thread with
//! `Server::run_once`, against plain blocking `std::net::TcpStream` clients.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use line_reactor::config::ConfigError;
use line_reactor::{Config, Control, Event, Handler, ReactorError, Server};

/// How long any single wait in these tests may take
const DEADLINE: Duration = Duration::from_secs(5);

// ============================================================================
// Test Helpers
// ============================================================================

/// Owned record of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Seen {
    Timer,
    Connect(usize),
    /// id, data, whether the client was still connected
    Data(usize, Vec<u8>, bool),
    End(usize, bool),
    Error(usize),
    /// id, buffered byte count, buffer contents at the time of the overflow
    Overflow(usize, usize, Vec<u8>),
    Timeout(usize),
}

/// Records every event; optionally drops clients that send `bye`.
#[derive(Default)]
struct Recorder {
    seen: Vec<Seen>,
    drop_on_bye: bool,
    stop_on_stop: bool,
}

impl Recorder {
    /// Events other than clock ticks, which may fire at any time.
    fn client_events(&self) -> Vec<Seen> {
        self.seen
            .iter()
            .filter(|s| **s != Seen::Timer)
            .cloned()
            .collect()
    }

    fn count(&self, pred: impl Fn(&Seen) -> bool) -> usize {
        self.seen.iter().filter(|s| pred(s)).count()
    }
}

impl Handler for Recorder {
    fn handle(&mut self, event: Event<'_>, ctl: &mut Control) {
        let seen = match event {
            Event::TimerExpired => Seen::Timer,
            Event::ClientConnect(c) => Seen::Connect(c.id().get()),
            Event::ClientData(c, data) => {
                if self.drop_on_bye && data == b"bye" {
                    // Asking twice must be harmless
                    ctl.drop_client(c.id());
                    ctl.drop_client(c.id());
                }
                if self.stop_on_stop && data == b"stop" {
                    ctl.stop();
                }
                Seen::Data(c.id().get(), data.to_vec(), c.is_connected())
            }
            Event::ClientEnd(c) => Seen::End(c.id().get(), c.is_connected()),
            Event::ClientError(c) => Seen::Error(c.id().get()),
            Event::ClientOverflow(c, data) => {
                Seen::Overflow(c.id().get(), c.used(), data.to_vec())
            }
            Event::ClientTimeout(c) => Seen::Timeout(c.id().get()),
        };
        self.seen.push(seen);
    }
}

fn test_config(max_clients: usize, buffer_size: usize) -> Config {
    Config {
        listen: "127.0.0.1:0".to_string(),
        max_clients,
        buffer_size,
        poll_interval: Duration::from_millis(20),
        ..Config::default()
    }
}

fn connect(server: &Server) -> TcpStream {
    let stream = TcpStream::connect(server.local_addr()).expect("connect");
    stream.set_read_timeout(Some(DEADLINE)).unwrap();
    stream
}

/// Run the loop until `done` holds for the recorder.
fn pump_until(server: &mut Server, rec: &mut Recorder, done: impl Fn(&Recorder) -> bool) {
    let start = Instant::now();
    while !done(rec) {
        assert!(
            start.elapsed() < DEADLINE,
            "condition not reached, saw {:?}",
            rec.seen
        );
        server.run_once(rec).expect("run_once");
    }
}

/// Run a fixed number of iterations.
fn pump(server: &mut Server, rec: &mut Recorder, iterations: usize) {
    for _ in 0..iterations {
        server.run_once(rec).expect("run_once");
    }
}

/// Connect `n` clients and wait for all of their connect events.
fn connect_many(server: &mut Server, rec: &mut Recorder, n: usize) -> Vec<TcpStream> {
    let clients: Vec<_> = (0..n).map(|_| connect(server)).collect();
    pump_until(server, rec, |r| {
        r.count(|s| matches!(s, Seen::Connect(_))) == n
    });
    clients
}

fn assert_closed(client: &mut TcpStream) {
    let mut buf = [0u8; 16];
    match client.read(&mut buf) {
        Ok(0) => {}
        Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => {}
        other => panic!("expected closed connection, got {:?}", other),
    }
}

// ============================================================================
// Client table
// ============================================================================

#[test]
fn test_bind_rejects_bad_address() {
    let config = Config {
        listen: "localhost:nope".to_string(),
        ..Config::default()
    };
    assert!(matches!(
        Server::bind(&config),
        Err(ReactorError::Config(ConfigError::Invalid(_)))
    ));
}

#[test]
fn test_distinct_ids() {
    let mut server = Server::bind(&test_config(4, 64)).unwrap();
    let mut rec = Recorder::default();

    let _clients = connect_many(&mut server, &mut rec, 4);

    let mut ids: Vec<usize> = rec
        .client_events()
        .iter()
        .filter_map(|s| match s {
            Seen::Connect(id) => Some(*id),
            _ => None,
        })
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert_eq!(server.connected(), 4);
}

#[test]
fn test_table_full_rejects_silently() {
    let mut server = Server::bind(&test_config(2, 64)).unwrap();
    let mut rec = Recorder::default();

    let mut clients = connect_many(&mut server, &mut rec, 2);

    let mut extra = connect(&server);
    pump(&mut server, &mut rec, 10);
    assert_closed(&mut extra);

    assert_eq!(rec.count(|s| matches!(s, Seen::Connect(_))), 2);
    assert_eq!(server.connected(), 2);

    // Earlier clients keep working
    clients[1].write_all(b"still here\n").unwrap();
    pump_until(&mut server, &mut rec, |r| {
        r.count(|s| matches!(s, Seen::Data(..))) == 1
    });
    assert!(rec
        .client_events()
        .contains(&Seen::Data(2, b"still here".to_vec(), true)));
}

#[test]
fn test_slot_reuse_keeps_buffer() {
    let mut server = Server::bind(&test_config(4, 64)).unwrap();
    let mut rec = Recorder::default();

    let first = connect_many(&mut server, &mut rec, 1);
    assert_eq!(server.table().buffers().allocated(), 1);

    drop(first);
    pump_until(&mut server, &mut rec, |r| r.client_events().contains(&Seen::Error(1)));
    assert_eq!(server.connected(), 0);

    let _second = connect(&server);
    pump_until(&mut server, &mut rec, |r| {
        r.count(|s| matches!(s, Seen::Connect(_))) == 2
    });

    // Lowest free slot again, same id, no new allocation
    assert_eq!(
        rec.client_events(),
        vec![Seen::Connect(1), Seen::Error(1), Seen::Connect(1)]
    );
    assert_eq!(server.table().buffers().allocated(), 1);
}

// ============================================================================
// Framing
// ============================================================================

#[test]
fn test_line_feed_message() {
    let mut server = Server::bind(&test_config(4, 64)).unwrap();
    let mut rec = Recorder::default();
    let mut clients = connect_many(&mut server, &mut rec, 1);

    clients[0].write_all(b"hello\n").unwrap();
    pump_until(&mut server, &mut rec, |r| {
        r.count(|s| matches!(s, Seen::Data(..))) == 1
    });

    assert_eq!(
        rec.client_events(),
        vec![Seen::Connect(1), Seen::Data(1, b"hello".to_vec(), true)]
    );
    assert_eq!(server.table().slot(0).used(), 0);
    assert_eq!(server.table().slot(0).terminator(), Some(5));
}

#[test]
fn test_carriage_return_message() {
    let mut server = Server::bind(&test_config(4, 64)).unwrap();
    let mut rec = Recorder::default();
    let mut clients = connect_many(&mut server, &mut rec, 1);

    clients[0].write_all(b"path\r").unwrap();
    pump_until(&mut server, &mut rec, |r| {
        r.count(|s| matches!(s, Seen::Data(..))) == 1
    });

    assert!(rec
        .client_events()
        .contains(&Seen::Data(1, b"path".to_vec(), true)));
    assert_eq!(server.table().slot(0).used(), 0);
}

#[test]
fn test_partial_message_waits() {
    let mut server = Server::bind(&test_config(4, 64)).unwrap();
    let mut rec = Recorder::default();
    let mut clients = connect_many(&mut server, &mut rec, 1);

    clients[0].write_all(b"hel").unwrap();
    let start = Instant::now();
    while server.table().slot(0).used() < 3 {
        assert!(start.elapsed() < DEADLINE, "partial message never buffered");
        server.run_once(&mut rec).unwrap();
    }
    pump(&mut server, &mut rec, 5);
    assert_eq!(rec.count(|s| matches!(s, Seen::Data(..))), 0);
    assert_eq!(server.table().slot(0).used(), 3);

    clients[0].write_all(b"lo\n").unwrap();
    pump_until(&mut server, &mut rec, |r| {
        r.count(|s| matches!(s, Seen::Data(..))) == 1
    });
    assert!(rec
        .client_events()
        .contains(&Seen::Data(1, b"hello".to_vec(), true)));
}

#[test]
fn test_overflow_clears_and_keeps_client() {
    let mut server = Server::bind(&test_config(4, 8)).unwrap();
    let mut rec = Recorder::default();
    let mut clients = connect_many(&mut server, &mut rec, 1);

    clients[0].write_all(b"abcdefgh").unwrap();
    pump_until(&mut server, &mut rec, |r| {
        r.count(|s| matches!(s, Seen::Overflow(..))) == 1
    });
    // The handler sees the bytes about to be discarded
    assert!(rec
        .client_events()
        .contains(&Seen::Overflow(1, 8, b"abcdefgh".to_vec())));
    assert_eq!(server.table().slot(0).used(), 0);
    assert!(server.table().slot(0).is_connected());

    clients[0].write_all(b"ok\n").unwrap();
    pump_until(&mut server, &mut rec, |r| {
        r.count(|s| matches!(s, Seen::Data(..))) == 1
    });
    assert!(rec
        .client_events()
        .contains(&Seen::Data(1, b"ok".to_vec(), true)));
}

#[test]
fn test_end_of_transmission_only() {
    let mut server = Server::bind(&test_config(4, 64)).unwrap();
    let mut rec = Recorder::default();
    let mut clients = connect_many(&mut server, &mut rec, 1);

    clients[0].write_all(&[0x04]).unwrap();
    pump_until(&mut server, &mut rec, |r| {
        r.count(|s| matches!(s, Seen::End(..))) == 1
    });

    // Closed before the event fired, and no data event
    assert_eq!(
        rec.client_events(),
        vec![Seen::Connect(1), Seen::End(1, false)]
    );
    assert_closed(&mut clients[0]);
    assert_eq!(server.connected(), 0);
}

#[test]
fn test_data_then_end_of_transmission() {
    let mut server = Server::bind(&test_config(4, 64)).unwrap();
    let mut rec = Recorder::default();
    let mut clients = connect_many(&mut server, &mut rec, 1);

    clients[0].write_all(b"hi\x04").unwrap();
    pump_until(&mut server, &mut rec, |r| {
        r.count(|s| matches!(s, Seen::End(..))) == 1
    });

    assert_eq!(
        rec.client_events(),
        vec![
            Seen::Connect(1),
            Seen::Data(1, b"hi".to_vec(), false),
            Seen::End(1, false),
        ]
    );
    assert_closed(&mut clients[0]);
}

#[test]
fn test_peer_close_is_error() {
    let mut server = Server::bind(&test_config(4, 64)).unwrap();
    let mut rec = Recorder::default();
    let clients = connect_many(&mut server, &mut rec, 1);

    drop(clients);
    pump_until(&mut server, &mut rec, |r| {
        r.count(|s| matches!(s, Seen::Error(_))) == 1
    });
    assert_eq!(rec.client_events(), vec![Seen::Connect(1), Seen::Error(1)]);
    assert!(!server.table().slot(0).is_connected());
}

// ============================================================================
// Handler requests
// ============================================================================

#[test]
fn test_handler_drop_is_idempotent() {
    let mut server = Server::bind(&test_config(4, 64)).unwrap();
    let mut rec = Recorder {
        drop_on_bye: true,
        ..Default::default()
    };
    let mut clients = connect_many(&mut server, &mut rec, 1);

    clients[0].write_all(b"bye\n").unwrap();
    pump_until(&mut server, &mut rec, |r| {
        r.count(|s| matches!(s, Seen::Data(..))) == 1
    });
    assert_eq!(server.connected(), 0);
    assert_closed(&mut clients[0]);

    // The closed socket produces nothing further
    pump(&mut server, &mut rec, 5);
    assert_eq!(
        rec.client_events(),
        vec![Seen::Connect(1), Seen::Data(1, b"bye".to_vec(), true)]
    );
}

#[test]
fn test_handler_stop_ends_run() {
    let mut server = Server::bind(&test_config(4, 64)).unwrap();
    let mut rec = Recorder {
        stop_on_stop: true,
        ..Default::default()
    };
    let mut clients = connect_many(&mut server, &mut rec, 2);

    clients[0].write_all(b"stop\n").unwrap();
    server.run(&mut rec).unwrap();

    // Shutdown dropped every client
    assert_eq!(server.connected(), 0);
    assert_eq!(server.table().buffers().allocated(), 0);
    assert_closed(&mut clients[1]);
}

// ============================================================================
// Timeout clock
// ============================================================================

#[test]
fn test_timer_fires_without_clients() {
    let config = Config {
        tick_interval: Duration::from_secs(1),
        ..test_config(4, 64)
    };
    let mut server = Server::bind(&config).unwrap();
    let mut rec = Recorder::default();

    pump_until(&mut server, &mut rec, |r| r.seen.contains(&Seen::Timer));
    assert!(rec.client_events().is_empty());
}

#[test]
fn test_idle_client_times_out() {
    let config = Config {
        tick_interval: Duration::from_secs(1),
        idle_limit: 0,
        ..test_config(4, 64)
    };
    let mut server = Server::bind(&config).unwrap();
    let mut rec = Recorder::default();
    let mut clients = connect_many(&mut server, &mut rec, 1);

    pump_until(&mut server, &mut rec, |r| {
        r.count(|s| matches!(s, Seen::Timeout(_))) == 1
    });

    // Timeout is reported before the tick that caused it
    let timeout_at = rec.seen.iter().position(|s| *s == Seen::Timeout(1)).unwrap();
    assert_eq!(rec.seen.get(timeout_at + 1), Some(&Seen::Timer));
    assert_eq!(server.connected(), 0);
    assert_closed(&mut clients[0]);
}
