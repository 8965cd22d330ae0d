use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::channel::{OrderedReceiver, SequencedReceiver};

/// A payload that cleared a channel's ordering rules, still carrying its
/// routing so the hosting peer can relay it onward
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routed {
    pub source: u32,
    pub dest: i32,
    pub payload: Vec<u8>,
}

/// Per-remote-peer connection state: send sequences, reliable frames in
/// flight, receive-side ordering, and activity timestamps. One instance per
/// remote address, on both the hosting and the connecting side.
pub struct RemoteConnection {
    pub addr: SocketAddr,
    send_seqs: HashMap<u8, u16>,
    in_flight: HashMap<(u8, u16), InFlight>,
    ordered: HashMap<u8, OrderedReceiver<Routed>>,
    sequenced: HashMap<u8, SequencedReceiver>,
    last_recv: Instant,
    last_send: Instant,
}

struct InFlight {
    datagram: Vec<u8>,
    last_sent: Instant,
}

impl RemoteConnection {
    pub fn new(addr: SocketAddr, now: Instant) -> Self {
        Self {
            addr,
            send_seqs: HashMap::new(),
            in_flight: HashMap::new(),
            ordered: HashMap::new(),
            sequenced: HashMap::new(),
            last_recv: now,
            last_send: now,
        }
    }

    /// Allocate the next send sequence on a channel
    pub fn next_seq(&mut self, channel: u8) -> u16 {
        let seq = self.send_seqs.entry(channel).or_insert(0);
        let current = *seq;
        *seq = seq.wrapping_add(1);
        current
    }

    /// Retain an already-sent reliable datagram for retransmission until
    /// its ack arrives
    pub fn track_reliable(&mut self, channel: u8, seq: u16, datagram: Vec<u8>, now: Instant) {
        self.in_flight.insert(
            (channel, seq),
            InFlight {
                datagram,
                last_sent: now,
            },
        );
    }

    pub fn ack(&mut self, channel: u8, seq: u16) {
        self.in_flight.remove(&(channel, seq));
    }

    pub fn has_in_flight(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Datagrams whose resend interval has elapsed; each is stamped as
    /// sent again before being returned
    pub fn due_resends(&mut self, now: Instant, interval: Duration) -> Vec<Vec<u8>> {
        let mut due = Vec::new();
        for in_flight in self.in_flight.values_mut() {
            if now.duration_since(in_flight.last_sent) >= interval {
                in_flight.last_sent = now;
                due.push(in_flight.datagram.clone());
            }
        }
        due
    }

    /// Run a reliable channel's ordering; returns the contiguous run of
    /// payloads this arrival released
    pub fn receive_ordered(&mut self, channel: u8, seq: u16, routed: Routed) -> Vec<Routed> {
        self.ordered
            .entry(channel)
            .or_default()
            .receive(seq, routed)
    }

    /// Whether a sequenced-unreliable arrival is newer than everything
    /// already delivered on its channel
    pub fn accept_sequenced(&mut self, channel: u8, seq: u16) -> bool {
        self.sequenced.entry(channel).or_default().accept(seq)
    }

    pub fn note_received(&mut self, now: Instant) {
        self.last_recv = now;
    }

    pub fn note_sent(&mut self, now: Instant) {
        self.last_send = now;
    }

    pub fn silent_for(&self, now: Instant) -> Duration {
        now.duration_since(self.last_recv)
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.duration_since(self.last_send)
    }
}
