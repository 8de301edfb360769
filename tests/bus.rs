#![allow(missing_docs)]
//! Host-level tests for the register-level PWM driver, using a scripted bus.

mod common;

use common::{BusSpy, NoopDelay};
use servo_deck::bus::{PwmBus, PwmConfig};
use servo_deck::{Channel, ChannelMask, Error, CHANNEL_COUNT};

const MODE1: u8 = 0x00;
const PRESCALE: u8 = 0xFE;
// Channel n occupies ON_L/ON_H/OFF_L/OFF_H at 0x06 + 4n.
const CH0_ON_L: u8 = 0x06;
const CH0_OFF_L: u8 = 0x08;
const CH4_ON_L: u8 = 0x16;
const CH4_OFF_L: u8 = 0x18;

fn channel(index: u8) -> Channel {
    Channel::new(index).unwrap()
}

fn mask(indices: &[u8]) -> ChannelMask {
    indices.iter().map(|&index| channel(index)).collect()
}

fn new_bus(spy: &BusSpy) -> PwmBus<BusSpy, NoopDelay> {
    PwmBus::new(spy.clone(), NoopDelay, &PwmConfig::default()).unwrap()
}

#[test]
fn configure_writes_sleep_prescale_wake_in_order() {
    let spy = BusSpy::new();
    let _bus = new_bus(&spy);

    // 50 Hz, nominal clock: round(25e6 / 4096 / 50) - 1 = 121.
    assert_eq!(
        spy.writes(),
        vec![(MODE1, 0x10), (PRESCALE, 121), (MODE1, 0x00)]
    );
}

#[test]
fn configure_preserves_mode_bits_and_masks_restart() {
    let spy = BusSpy::new();
    // Restart (0x80) must not be written back; other bits survive.
    spy.set_reg(MODE1, 0xA1);
    let _bus = new_bus(&spy);

    assert_eq!(
        spy.writes(),
        vec![(MODE1, 0x31), (PRESCALE, 121), (MODE1, 0x21)]
    );
}

#[test]
fn configure_applies_clock_correction() {
    let spy = BusSpy::new();
    let mut bus = new_bus(&spy);
    spy.clear_writes();

    // round(25e6 / 0.92 / 4096 / 50) - 1 = 132.
    bus.configure(50.0, 0.92).unwrap();
    assert_eq!(spy.writes()[1], (PRESCALE, 132));
}

#[test]
fn configure_clamps_prescale_to_legal_range() {
    let spy = BusSpy::new();
    let mut bus = new_bus(&spy);

    spy.clear_writes();
    bus.configure(24_000.0, 1.0).unwrap();
    assert_eq!(spy.writes()[1], (PRESCALE, 0x03));

    spy.clear_writes();
    bus.configure(0.5, 1.0).unwrap();
    assert_eq!(spy.writes()[1], (PRESCALE, 0xFF));
}

#[test]
fn ticks_conversion_rounds_at_the_frame_rate() {
    let spy = BusSpy::new();
    let bus = new_bus(&spy);

    // 50 Hz -> 20_000 µs period -> 0.2048 ticks per µs.
    assert_eq!(bus.ticks_for_pulse(1500.0).unwrap(), 307);
    assert_eq!(bus.ticks_for_pulse(1000.0).unwrap(), 205);
    assert_eq!(bus.ticks_for_pulse(2000.0).unwrap(), 410);
    assert_eq!(bus.ticks_for_pulse(0.0).unwrap(), 0);
}

#[test]
fn ticks_conversion_rejects_out_of_range_pulses() {
    let spy = BusSpy::new();
    let bus = new_bus(&spy);

    assert_eq!(bus.ticks_for_pulse(-1.0), Err(Error::OutOfRange));
    assert_eq!(bus.ticks_for_pulse(25_000.0), Err(Error::OutOfRange));
    assert_eq!(bus.ticks_for_pulse(f64::NAN), Err(Error::OutOfRange));
    // 4095 ticks is the last representable value: 4095 / 0.2048 µs.
    assert_eq!(bus.ticks_for_pulse(19_995.0).unwrap(), 4095);
}

#[test]
fn write_channel_ticks_writes_four_registers_little_endian() {
    let spy = BusSpy::new();
    let mut bus = new_bus(&spy);
    spy.clear_writes();

    // 307 = 0x0133.
    bus.write_channel_ticks(channel(0), 307).unwrap();
    assert_eq!(
        spy.writes(),
        vec![
            (CH0_ON_L, 0),
            (CH0_ON_L + 1, 0),
            (CH0_OFF_L, 0x33),
            (CH0_OFF_L + 1, 0x01),
        ]
    );
}

#[test]
fn write_channel_ticks_rejects_overflowing_ticks() {
    let spy = BusSpy::new();
    let mut bus = new_bus(&spy);
    spy.clear_writes();

    assert_eq!(
        bus.write_channel_ticks(channel(0), 4096),
        Err(Error::OutOfRange)
    );
    assert_eq!(spy.write_count(), 0);
}

#[test]
fn batched_write_skips_unchanged_channels() {
    let spy = BusSpy::new();
    let mut bus = new_bus(&spy);
    spy.clear_writes();

    let mut ticks = [0u16; CHANNEL_COUNT];
    ticks[0] = 307;
    ticks[4] = 307;
    let active = mask(&[0, 4]);

    // First call: ON pair + OFF pair for each channel.
    let report = bus.write_channels_batched(&ticks, active).unwrap();
    assert_eq!(report.written, active);
    assert!(report.skipped.is_empty());
    assert!(report.all_ok());
    assert_eq!(spy.write_count(), 8);

    // Identical command: zero transactions.
    spy.clear_writes();
    let report = bus.write_channels_batched(&ticks, active).unwrap();
    assert_eq!(spy.write_count(), 0);
    assert_eq!(report.skipped, active);
    assert!(report.written.is_empty());
}

#[test]
fn batched_write_touches_only_the_off_pair_after_first_write() {
    let spy = BusSpy::new();
    let mut bus = new_bus(&spy);

    let mut ticks = [0u16; CHANNEL_COUNT];
    ticks[4] = 307;
    let active = mask(&[4]);
    bus.write_channels_batched(&ticks, active).unwrap();

    spy.clear_writes();
    ticks[4] = 308;
    bus.write_channels_batched(&ticks, active).unwrap();
    assert_eq!(
        spy.writes(),
        vec![(CH4_OFF_L, 0x34), (CH4_OFF_L + 1, 0x01)]
    );
}

#[test]
fn batched_write_pre_validates_before_any_traffic() {
    let spy = BusSpy::new();
    let mut bus = new_bus(&spy);
    spy.clear_writes();

    let mut ticks = [0u16; CHANNEL_COUNT];
    ticks[0] = 307;
    ticks[4] = 9999; // caller bug
    assert_eq!(
        bus.write_channels_batched(&ticks, mask(&[0, 4])),
        Err(Error::OutOfRange)
    );
    assert_eq!(spy.write_count(), 0);
}

#[test]
fn batched_write_retries_a_failing_channel_once() {
    let spy = BusSpy::new();
    let mut bus = new_bus(&spy);
    spy.clear_writes();

    // First OFF_L write on channel 0 fails; the retry succeeds.
    spy.fail_writes_to(CH0_OFF_L, 1);

    let mut ticks = [0u16; CHANNEL_COUNT];
    ticks[0] = 307;
    let report = bus.write_channels_batched(&ticks, mask(&[0])).unwrap();

    assert!(report.all_ok());
    assert!(report.written.contains(channel(0)));
    assert_eq!(spy.reg(CH0_OFF_L), 0x33);
    assert_eq!(spy.reg(CH0_OFF_L + 1), 0x01);
}

#[test]
fn batched_write_reports_a_channel_that_fails_twice_and_continues() {
    let spy = BusSpy::new();
    let mut bus = new_bus(&spy);
    spy.clear_writes();

    spy.fail_writes_to(CH0_OFF_L, u32::MAX); // channel 0 stuck for good

    let mut ticks = [0u16; CHANNEL_COUNT];
    ticks[0] = 307;
    ticks[4] = 307;
    let report = bus.write_channels_batched(&ticks, mask(&[0, 4])).unwrap();

    // Channel 0 failed; channel 4 still moved.
    assert_eq!(report.failed, mask(&[0]));
    assert_eq!(report.written, mask(&[4]));
    assert_eq!(spy.reg(CH4_OFF_L), 0x33);
    assert_eq!(spy.reg(CH4_ON_L), 0x00);
}

#[test]
fn failed_channel_is_not_deduplicated_on_the_next_batch() {
    let spy = BusSpy::new();
    let mut bus = new_bus(&spy);

    spy.fail_writes_to(CH0_OFF_L, 2); // batch attempt + retry both fail

    let mut ticks = [0u16; CHANNEL_COUNT];
    ticks[0] = 307;
    let active = mask(&[0]);
    let report = bus.write_channels_batched(&ticks, active).unwrap();
    assert_eq!(report.failed, active);

    // Same command again: the channel must be re-attempted, ON pair and all.
    spy.clear_writes();
    let report = bus.write_channels_batched(&ticks, active).unwrap();
    assert!(report.all_ok());
    assert_eq!(report.written, active);
    assert_eq!(
        spy.writes(),
        vec![
            (CH0_ON_L, 0),
            (CH0_ON_L + 1, 0),
            (CH0_OFF_L, 0x33),
            (CH0_OFF_L + 1, 0x01),
        ]
    );
}

#[test]
fn single_write_failure_clears_dedup_state() {
    let spy = BusSpy::new();
    let mut bus = new_bus(&spy);

    bus.write_channel_ticks(channel(0), 307).unwrap();

    spy.fail_writes_to(CH0_OFF_L + 1, 1);
    assert_eq!(bus.write_channel_ticks(channel(0), 400), Err(Error::Bus));

    // The interrupted write must not look deduplicable afterwards.
    spy.clear_writes();
    let mut ticks = [0u16; CHANNEL_COUNT];
    ticks[0] = 400;
    let report = bus.write_channels_batched(&ticks, mask(&[0])).unwrap();
    assert_eq!(report.written, mask(&[0]));
    assert_eq!(spy.reg(CH0_OFF_L), (400 & 0xFF) as u8);
    assert_eq!(spy.reg(CH0_OFF_L + 1), 0x01);
}

#[test]
fn reconfigure_resets_dedup_state() {
    let spy = BusSpy::new();
    let mut bus = new_bus(&spy);

    let mut ticks = [0u16; CHANNEL_COUNT];
    ticks[0] = 307;
    let active = mask(&[0]);
    bus.write_channels_batched(&ticks, active).unwrap();

    bus.configure(50.0, 1.0).unwrap();
    spy.clear_writes();

    // Post-reconfigure, the same command replays the full sequence.
    let report = bus.write_channels_batched(&ticks, active).unwrap();
    assert_eq!(report.written, active);
    assert_eq!(spy.write_count(), 4);
}

#[test]
fn channels_are_written_in_ascending_order() {
    let spy = BusSpy::new();
    let mut bus = new_bus(&spy);
    spy.clear_writes();

    let mut ticks = [0u16; CHANNEL_COUNT];
    ticks[2] = 300;
    ticks[9] = 310;
    ticks[15] = 320;
    bus.write_channels_batched(&ticks, mask(&[15, 2, 9])).unwrap();

    let first_registers: Vec<u8> = spy.writes().iter().map(|&(reg, _)| reg).collect();
    // ON_L registers appear in channel order: 2, 9, 15.
    let on_l_positions: Vec<u8> = first_registers
        .iter()
        .copied()
        .filter(|reg| (reg - 0x06) % 4 == 0)
        .collect();
    assert_eq!(on_l_positions, vec![0x06 + 8, 0x06 + 36, 0x06 + 60]);
}
