use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::protocol::sequence_greater_than;

/// Fixed-point denominator of `AckWindow::packet_loss`.
pub const PACKET_LOSS_SCALE: u32 = 1 << 16;
pub const DEFAULT_ROUND_TRIP_TIME_MS: u32 = 500;

const PACKET_LOSS_INTERVAL: Duration = Duration::from_secs(10);
const ACK_RANGE: u32 = 32;

#[derive(Debug, Clone, Copy)]
struct InFlight {
    sequence: u32,
    sent_at: Instant,
}

/// Datagrams we sent that the remote has not acknowledged yet.
///
/// Feeds the smoothed round-trip time and the packet-loss estimate. A
/// datagram counts as lost once it falls out of the remote's ack bitfield.
#[derive(Debug)]
pub(crate) struct AckWindow {
    in_flight: VecDeque<InFlight>,
    capacity: usize,
    round_trip_time: f32,
    round_trip_variance: f32,
    acked: u32,
    lost: u32,
    packet_loss: u32,
    interval_start: Instant,
}

impl AckWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            in_flight: VecDeque::with_capacity(capacity),
            capacity,
            round_trip_time: DEFAULT_ROUND_TRIP_TIME_MS as f32,
            round_trip_variance: 0.0,
            acked: 0,
            lost: 0,
            packet_loss: 0,
            interval_start: Instant::now(),
        }
    }

    pub fn on_sent(&mut self, sequence: u32) {
        if self.in_flight.len() >= self.capacity {
            self.in_flight.pop_front();
            self.lost += 1;
        }

        self.in_flight.push_back(InFlight {
            sequence,
            sent_at: Instant::now(),
        });
    }

    pub fn on_ack(&mut self, ack: u32, ack_bitfield: u32) {
        let now = Instant::now();
        let mut samples = Vec::new();
        let mut lost = 0;

        self.in_flight.retain(|pending| {
            let acked = if pending.sequence == ack {
                true
            } else if sequence_greater_than(ack, pending.sequence) {
                let diff = ack.wrapping_sub(pending.sequence);
                if diff <= ACK_RANGE {
                    ack_bitfield & (1 << (diff - 1)) != 0
                } else {
                    lost += 1;
                    return false;
                }
            } else {
                false
            };

            if acked {
                samples.push(now.duration_since(pending.sent_at));
            }
            !acked
        });

        self.lost += lost;
        self.acked += samples.len() as u32;
        for sample in samples {
            self.update_round_trip(sample);
        }

        self.roll_interval(now);
    }

    fn update_round_trip(&mut self, sample: Duration) {
        const ALPHA: f32 = 0.125;
        const BETA: f32 = 0.25;

        let rtt = sample.as_secs_f32() * 1000.0;
        let diff = (rtt - self.round_trip_time).abs();
        self.round_trip_variance = (1.0 - BETA) * self.round_trip_variance + BETA * diff;
        self.round_trip_time = (1.0 - ALPHA) * self.round_trip_time + ALPHA * rtt;
    }

    fn roll_interval(&mut self, now: Instant) {
        if now.duration_since(self.interval_start) < PACKET_LOSS_INTERVAL {
            return;
        }

        let total = self.acked + self.lost;
        if total > 0 {
            let sample = (self.lost as u64 * PACKET_LOSS_SCALE as u64 / total as u64) as u32;
            self.packet_loss = ((self.packet_loss as u64 * 7 + sample as u64) / 8) as u32;
        }

        self.acked = 0;
        self.lost = 0;
        self.interval_start = now;
    }

    pub fn round_trip_time(&self) -> u32 {
        self.round_trip_time.round() as u32
    }

    pub fn round_trip_variance(&self) -> u32 {
        self.round_trip_variance.round() as u32
    }

    /// Mean loss in units of `PACKET_LOSS_SCALE`.
    pub fn packet_loss(&self) -> u32 {
        self.packet_loss
    }
}

/// Sequences received from the remote, for duplicate rejection and the
/// ack bitfield piggybacked on every outgoing datagram.
#[derive(Debug)]
pub(crate) struct ReceiveWindow {
    latest: Option<u32>,
    bitfield: u32,
    recent: VecDeque<u32>,
    max_recent: usize,
}

impl Default for ReceiveWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiveWindow {
    pub fn new() -> Self {
        Self {
            latest: None,
            bitfield: 0,
            recent: VecDeque::with_capacity(128),
            max_recent: 128,
        }
    }

    /// Returns false for a duplicate.
    pub fn record(&mut self, sequence: u32) -> bool {
        if self.latest == Some(sequence) || self.recent.contains(&sequence) {
            return false;
        }
        if self.recent.len() >= self.max_recent {
            self.recent.pop_front();
        }
        self.recent.push_back(sequence);

        let Some(latest) = self.latest else {
            self.latest = Some(sequence);
            self.bitfield = 0;
            return true;
        };

        if sequence_greater_than(sequence, latest) {
            let diff = sequence.wrapping_sub(latest);
            self.bitfield = if diff < ACK_RANGE {
                (self.bitfield << diff) | (1 << (diff - 1))
            } else if diff == ACK_RANGE {
                1 << (ACK_RANGE - 1)
            } else {
                0
            };
            self.latest = Some(sequence);
        } else {
            let diff = latest.wrapping_sub(sequence);
            if diff > 0 && diff <= ACK_RANGE {
                self.bitfield |= 1 << (diff - 1);
            }
        }

        true
    }

    /// `(ack, ack_bitfield)` for the next outgoing header. Bit `n` covers
    /// `ack - n - 1`.
    pub fn ack_data(&self) -> (u32, u32) {
        match self.latest {
            Some(latest) => (latest, self.bitfield),
            // Acks sequence 0 only if bit 0 would claim it, which it never does.
            None => (u32::MAX, 0),
        }
    }
}
