//! Paddle-shift interlock.
//!
//! A paddle pull engages the matching shift relay. The relay stays engaged
//! until the hall sensor confirms the mechanical shift completed; only then
//! are the relays released and the displayed gear allowed to move. The two
//! relays are never engaged together.
//!
//! ```text
//!            UpPaddle                   DownPaddle
//!   UpEngaged <------- Idle -------------> DownEngaged
//!       |               ^  ^                   |
//!       +-- UpConfirm --+  +--- DownConfirm ---+
//!          (advance)              (retreat)
//! ```
//!
//! There is no timeout. A pull the hall sensor never confirms leaves its
//! relay engaged until the next matching confirmation.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use atomic_enum::atomic_enum;

use crate::hal::{EdgeInput, EdgeLine, ParallelOut};

/// Up-shift actuator bit on the relay port
pub const UP_RELAY: u8 = 1 << 4;
/// Down-shift actuator bit on the relay port
pub const DOWN_RELAY: u8 = 1 << 5;

#[atomic_enum]
#[derive(PartialEq, Eq)]
pub enum RelayState {
    Idle,
    UpEngaged,
    DownEngaged,
}

/// Change to the displayed gear requested by a confirmed shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GearSignal {
    Advance,
    Retreat,
}

/// Shift relay outputs on a parallel port.
#[derive(Debug, Clone)]
pub struct RelayBank<P> {
    port: P,
}

impl<P: ParallelOut> RelayBank<P> {
    /// Take the port with both relays released.
    pub fn new(mut port: P) -> Self {
        port.clear_bits(UP_RELAY | DOWN_RELAY);
        Self { port }
    }

    /// Drive the outputs for `state`.
    ///
    /// The opposite relay is released before the requested one is engaged,
    /// so both are never on at once, not even between the two writes.
    pub fn apply(&mut self, state: RelayState) {
        match state {
            RelayState::Idle => self.port.clear_bits(UP_RELAY | DOWN_RELAY),
            RelayState::UpEngaged => {
                self.port.clear_bits(DOWN_RELAY);
                self.port.set_bits(UP_RELAY);
            }
            RelayState::DownEngaged => {
                self.port.clear_bits(UP_RELAY);
                self.port.set_bits(DOWN_RELAY);
            }
        }
    }

    pub fn port(&self) -> &P {
        &self.port
    }
}

/// Interlock state shared between the edge interrupt and the main loop.
///
/// The interrupt side owns the relay state and raises gear signals; the
/// main loop only reads the state and takes the signals.
pub struct ShiftInterlock {
    state: AtomicRelayState,
    advance: AtomicBool,
    retreat: AtomicBool,
    ignored: AtomicU32,
}

impl ShiftInterlock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AtomicRelayState::new(RelayState::Idle),
            advance: AtomicBool::new(false),
            retreat: AtomicBool::new(false),
            ignored: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn state(&self) -> RelayState {
        self.state.load(Ordering::Acquire)
    }

    /// Edges ignored so far (paddle during a shift, mismatched confirmation).
    #[must_use]
    pub fn ignored_edges(&self) -> u32 {
        self.ignored.load(Ordering::Acquire)
    }

    /// Service every pending edge line. Interrupt context.
    ///
    /// Lines are handled in priority order and each is acknowledged on its
    /// own after it is applied, so an edge that arrives meanwhile on another
    /// line stays pending for the next interrupt.
    pub fn on_edges<E: EdgeInput, P: ParallelOut>(&self, input: &mut E, relays: &mut RelayBank<P>) {
        for line in input.pending() {
            self.on_edge(line, relays);
            input.acknowledge(line);
        }
    }

    /// Apply a single edge.
    pub fn on_edge<P: ParallelOut>(&self, line: EdgeLine, relays: &mut RelayBank<P>) {
        let current = self.state();
        let next = match (current, line) {
            (RelayState::Idle, EdgeLine::UpPaddle) => RelayState::UpEngaged,
            (RelayState::Idle, EdgeLine::DownPaddle) => RelayState::DownEngaged,
            (RelayState::Idle | RelayState::UpEngaged, EdgeLine::UpConfirm) => {
                self.advance.store(true, Ordering::Release);
                RelayState::Idle
            }
            (RelayState::Idle | RelayState::DownEngaged, EdgeLine::DownConfirm) => {
                self.retreat.store(true, Ordering::Release);
                RelayState::Idle
            }
            // A shift is in progress: neither paddle nor the opposite
            // confirmation may touch the relays.
            (
                RelayState::UpEngaged | RelayState::DownEngaged,
                EdgeLine::UpPaddle | EdgeLine::DownPaddle,
            )
            | (RelayState::DownEngaged, EdgeLine::UpConfirm)
            | (RelayState::UpEngaged, EdgeLine::DownConfirm) => {
                self.ignored.fetch_add(1, Ordering::AcqRel);
                return;
            }
        };
        relays.apply(next);
        self.state.store(next, Ordering::Release);
    }

    /// Take one pending gear signal. Main-loop context.
    ///
    /// Advance is checked before retreat; the other stays raised for the
    /// next call.
    pub fn take_signal(&self) -> Option<GearSignal> {
        if self.advance.swap(false, Ordering::AcqRel) {
            Some(GearSignal::Advance)
        } else if self.retreat.swap(false, Ordering::AcqRel) {
            Some(GearSignal::Retreat)
        } else {
            None
        }
    }
}

impl Default for ShiftInterlock {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for ShiftInterlock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ShiftInterlock")
            .field("state", &self.state())
            .field("advance", &self.advance.load(Ordering::Relaxed))
            .field("retreat", &self.retreat.load(Ordering::Relaxed))
            .field("ignored", &self.ignored_edges())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::EdgeLatch;
    use crate::mock::MockPort;

    const ALL_LINES: [EdgeLine; 4] = [
        EdgeLine::UpPaddle,
        EdgeLine::DownPaddle,
        EdgeLine::UpConfirm,
        EdgeLine::DownConfirm,
    ];

    fn relays() -> RelayBank<MockPort> {
        RelayBank::new(MockPort::default())
    }

    fn relay_bits(relays: &RelayBank<MockPort>) -> u8 {
        relays.port().value() & (UP_RELAY | DOWN_RELAY)
    }

    #[test]
    fn test_up_paddle_engages_up_relay() {
        let interlock = ShiftInterlock::new();
        let mut relays = relays();

        interlock.on_edge(EdgeLine::UpPaddle, &mut relays);
        assert_eq!(interlock.state(), RelayState::UpEngaged);
        assert_eq!(relay_bits(&relays), UP_RELAY);
        // A paddle alone never moves the gear
        assert_eq!(interlock.take_signal(), None);
    }

    #[test]
    fn test_down_paddle_engages_down_relay() {
        let interlock = ShiftInterlock::new();
        let mut relays = relays();

        interlock.on_edge(EdgeLine::DownPaddle, &mut relays);
        assert_eq!(interlock.state(), RelayState::DownEngaged);
        assert_eq!(relay_bits(&relays), DOWN_RELAY);
        assert_eq!(interlock.take_signal(), None);
    }

    #[test]
    fn test_matching_confirmation_releases_and_signals() {
        let interlock = ShiftInterlock::new();
        let mut relays = relays();

        interlock.on_edge(EdgeLine::UpPaddle, &mut relays);
        interlock.on_edge(EdgeLine::UpConfirm, &mut relays);
        assert_eq!(interlock.state(), RelayState::Idle);
        assert_eq!(relay_bits(&relays), 0);
        assert_eq!(interlock.take_signal(), Some(GearSignal::Advance));
        assert_eq!(interlock.take_signal(), None);

        interlock.on_edge(EdgeLine::DownPaddle, &mut relays);
        interlock.on_edge(EdgeLine::DownConfirm, &mut relays);
        assert_eq!(interlock.state(), RelayState::Idle);
        assert_eq!(interlock.take_signal(), Some(GearSignal::Retreat));
    }

    #[test]
    fn test_engaged_states_only_leave_on_matching_confirmation() {
        for (paddle, confirm, engaged) in [
            (EdgeLine::UpPaddle, EdgeLine::UpConfirm, RelayState::UpEngaged),
            (EdgeLine::DownPaddle, EdgeLine::DownConfirm, RelayState::DownEngaged),
        ] {
            for line in ALL_LINES {
                let interlock = ShiftInterlock::new();
                let mut relays = relays();
                interlock.on_edge(paddle, &mut relays);
                interlock.on_edge(line, &mut relays);

                if line == confirm {
                    assert_eq!(interlock.state(), RelayState::Idle);
                } else {
                    assert_eq!(interlock.state(), engaged, "{line:?} left {engaged:?}");
                    assert_eq!(interlock.take_signal(), None);
                    assert_eq!(interlock.ignored_edges(), 1);
                }
            }
        }
    }

    #[test]
    fn test_relays_never_both_engaged() {
        // Every sequence of four edges, checking the port after each write
        let interlock = ShiftInterlock::new();
        let mut relays = relays();
        for a in ALL_LINES {
            for b in ALL_LINES {
                for c in ALL_LINES {
                    for d in ALL_LINES {
                        for line in [a, b, c, d] {
                            interlock.on_edge(line, &mut relays);
                            assert!(relays
                                .port()
                                .writes()
                                .iter()
                                .all(|w| w & (UP_RELAY | DOWN_RELAY) != UP_RELAY | DOWN_RELAY));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_unconfirmed_pull_stays_engaged() {
        let interlock = ShiftInterlock::new();
        let mut relays = relays();
        interlock.on_edge(EdgeLine::UpPaddle, &mut relays);

        // Nothing ever releases the relay without a hall edge
        for _ in 0..1_000 {
            interlock.on_edge(EdgeLine::UpPaddle, &mut relays);
        }
        assert_eq!(interlock.state(), RelayState::UpEngaged);
        assert_eq!(relay_bits(&relays), UP_RELAY);
    }

    #[test]
    fn test_edges_acknowledged_individually() {
        let interlock = ShiftInterlock::new();
        let mut relays = relays();
        let latch = EdgeLatch::new();
        latch.raise(EdgeLine::UpPaddle);
        latch.raise(EdgeLine::UpConfirm);

        let mut input = &latch;
        interlock.on_edges(&mut input, &mut relays);

        // Paddle engaged, confirmation then released: both serviced
        assert_eq!(interlock.state(), RelayState::Idle);
        assert_eq!(interlock.take_signal(), Some(GearSignal::Advance));
        assert!(input.pending().is_empty());

        // A line raised after the snapshot is left for the next pass
        latch.raise(EdgeLine::DownPaddle);
        assert_eq!(input.pending().len(), 1);
    }
}
