//! Device Driver Tests
//!
//! Tests for the device lifecycle state machine against a recording transport.
//! Run with: cargo test --target x86_64-unknown-linux-gnu --no-default-features --features std --test driver_tests

use amp_link_firmware::config::DriverConfig;
use amp_link_firmware::error::{DeviceError, HostError, TransferStatus};
use amp_link_firmware::link::AmpLink;
use amp_link_firmware::protocol::Packet;
use amp_link_firmware::types::{ControlAction, ControlCommand, DecodedState, Preset, Volume};
use amp_link_firmware::usb::driver::{DeviceDriver, DriverState};
use amp_link_firmware::usb::host::{HostEvent, InCompletion, OutCompletion, UsbHost};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;

// ============================================================================
// Recording Transport
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
enum Call {
    Open(u8),
    Claim(u8),
    Release(u8),
    Close(u8),
    Out(u8, Packet),
    In(u8),
}

#[derive(Debug)]
struct MockDevice(u8);

#[derive(Default)]
struct MockHost {
    calls: Vec<Call>,
    fail_open: bool,
    fail_claim: bool,
    fail_out: bool,
    fail_in: bool,
}

impl MockHost {
    fn outs(&self) -> Vec<Packet> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Out(_, p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    fn polls(&self) -> usize {
        self.calls.iter().filter(|c| matches!(c, Call::In(_))).count()
    }
}

impl UsbHost for MockHost {
    type Device = MockDevice;

    async fn wait_event(&mut self) -> HostEvent {
        std::future::pending().await
    }

    fn open(&mut self, address: u8) -> Result<MockDevice, HostError> {
        self.calls.push(Call::Open(address));
        if self.fail_open {
            Err(HostError::OpenFailed)
        } else {
            Ok(MockDevice(address))
        }
    }

    fn claim_interface(&mut self, _device: &MockDevice, interface: u8) -> Result<(), HostError> {
        self.calls.push(Call::Claim(interface));
        if self.fail_claim {
            Err(HostError::ClaimFailed)
        } else {
            Ok(())
        }
    }

    fn release_interface(&mut self, _device: &MockDevice, interface: u8) -> Result<(), HostError> {
        self.calls.push(Call::Release(interface));
        Ok(())
    }

    fn close(&mut self, device: MockDevice) -> Result<(), HostError> {
        self.calls.push(Call::Close(device.0));
        Ok(())
    }

    fn submit_out(&mut self, _device: &MockDevice, endpoint: u8, packet: &Packet) -> Result<(), HostError> {
        if self.fail_out {
            return Err(HostError::SubmitFailed);
        }
        self.calls.push(Call::Out(endpoint, *packet));
        Ok(())
    }

    fn submit_in(&mut self, _device: &MockDevice, endpoint: u8, _tag: u32) -> Result<(), HostError> {
        if self.fail_in {
            return Err(HostError::Busy);
        }
        self.calls.push(Call::In(endpoint));
        Ok(())
    }
}

type Driver<'a> = DeviceDriver<'a, NoopRawMutex, MockHost>;

fn driver(link: &AmpLink<NoopRawMutex>) -> Driver<'_> {
    DeviceDriver::new(MockHost::default(), link, DriverConfig::default())
}

fn connected(link: &AmpLink<NoopRawMutex>) -> Driver<'_> {
    let mut driver = driver(link);
    driver.handle_event(HostEvent::Attached { address: 5 });
    driver.service();
    driver.host_mut().calls.clear();
    driver
}

/// Status packet: preset 1, -20.00 dB
fn status_packet() -> Packet {
    let mut bytes = [0_u8; 64];
    bytes[0] = 0x05;
    bytes[2] = 1;
    let [lo, hi] = (-2000_i16).to_le_bytes();
    bytes[3] = lo;
    bytes[4] = hi;
    bytes[12] = 0x01;
    Packet::from_bytes(bytes)
}

fn filter_name_packet(name: &str) -> Packet {
    let mut bytes = [0_u8; 64];
    bytes[0] = 0x03;
    bytes[2..2 + name.len()].copy_from_slice(name.as_bytes());
    Packet::from_bytes(bytes)
}

/// Tag of the polls of the first connection on a fresh link
const FIRST_CONNECTION: u32 = 1;

fn inbound(packet: &Packet) -> HostEvent {
    HostEvent::InComplete(InCompletion::completed(FIRST_CONNECTION, packet.as_bytes()))
}

fn volume_bytes(packet: &Packet) -> i16 {
    i16::from_le_bytes([packet.get(3), packet.get(4)])
}

// ============================================================================
// Transition Table Tests
// ============================================================================

#[test]
fn transition_table() {
    assert!(DriverState::Idle.can_transition_to(DriverState::Opening { address: 1 }));
    assert!(DriverState::Opening { address: 1 }.can_transition_to(DriverState::RequestingInitialState));
    assert!(DriverState::Opening { address: 1 }.can_transition_to(DriverState::Idle));
    assert!(DriverState::RequestingInitialState.can_transition_to(DriverState::RequestingFilterName));
    assert!(DriverState::RequestingFilterName.can_transition_to(DriverState::SteadyState));
    assert!(DriverState::SteadyState.can_transition_to(DriverState::Closing));
    assert!(DriverState::Closing.can_transition_to(DriverState::Idle));

    assert!(!DriverState::Idle.can_transition_to(DriverState::SteadyState));
    assert!(!DriverState::Idle.can_transition_to(DriverState::Closing));
    assert!(!DriverState::SteadyState.can_transition_to(DriverState::Idle));
    assert!(!DriverState::RequestingInitialState.can_transition_to(DriverState::SteadyState));
}

#[test]
fn open_states() {
    assert!(!DriverState::Idle.is_open());
    assert!(!DriverState::Opening { address: 1 }.is_open());
    assert!(DriverState::SteadyState.is_open());
    assert!(!DriverState::Closing.is_open());
}

// ============================================================================
// Open Sequence Tests
// ============================================================================

#[test]
fn attach_moves_to_opening() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = driver(&link);
    driver.handle_event(HostEvent::Attached { address: 5 });
    assert_eq!(driver.state(), DriverState::Opening { address: 5 });
    assert!(driver.host_mut().calls.is_empty());
}

#[test]
fn open_sequence_requests_state_then_name_then_polls() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = driver(&link);
    driver.handle_event(HostEvent::Attached { address: 5 });
    driver.service();

    assert_eq!(driver.state(), DriverState::SteadyState);
    assert_eq!(driver.address(), Some(5));
    assert!(link.is_device_connected());
    assert_eq!(link.connection_epoch(), 1);

    let calls = &driver.host_mut().calls;
    assert_eq!(calls[0], Call::Open(5));
    assert_eq!(calls[1], Call::Claim(0));
    match (&calls[2], &calls[3]) {
        (Call::Out(0x01, state_req), Call::Out(0x01, name_req)) => {
            assert_eq!((state_req.get(0), state_req.get(1)), (0x06, 0x02));
            assert_eq!((name_req.get(0), name_req.get(1)), (0x03, 0x08));
        }
        other => panic!("unexpected calls {other:?}"),
    }
    assert_eq!(calls[4], Call::In(0x81));
    assert_eq!(calls.len(), 5);
}

#[test]
fn open_failure_returns_to_idle() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = driver(&link);
    driver.host_mut().fail_open = true;
    driver.handle_event(HostEvent::Attached { address: 5 });
    driver.service();

    assert_eq!(driver.state(), DriverState::Idle);
    assert!(!link.is_device_connected());
    assert_eq!(driver.host_mut().calls, vec![Call::Open(5)]);
}

#[test]
fn claim_failure_closes_and_returns_to_idle() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = driver(&link);
    driver.host_mut().fail_claim = true;
    driver.handle_event(HostEvent::Attached { address: 5 });
    driver.service();

    assert_eq!(driver.state(), DriverState::Idle);
    assert!(!link.is_device_connected());
    assert_eq!(
        driver.host_mut().calls,
        vec![Call::Open(5), Call::Claim(0), Call::Close(5)]
    );
}

#[test]
fn failed_open_is_not_retried() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = driver(&link);
    driver.host_mut().fail_open = true;
    driver.handle_event(HostEvent::Attached { address: 5 });
    driver.service();
    driver.service();
    driver.service();
    assert_eq!(driver.host_mut().calls.len(), 1);
}

#[test]
fn failed_requests_still_reach_steady_state() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = driver(&link);
    driver.host_mut().fail_out = true;
    driver.handle_event(HostEvent::Attached { address: 5 });
    driver.service();
    assert_eq!(driver.state(), DriverState::SteadyState);
    assert_eq!(driver.host_mut().polls(), 1);
}

#[test]
fn attach_while_connected_is_ignored() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = connected(&link);
    driver.handle_event(HostEvent::Attached { address: 9 });
    driver.service();
    assert_eq!(driver.state(), DriverState::SteadyState);
    assert_eq!(driver.address(), Some(5));
    assert!(!driver.host_mut().calls.contains(&Call::Open(9)));
}

// ============================================================================
// Polling Tests
// ============================================================================

#[test]
fn single_poll_in_flight() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = connected(&link);
    assert!(driver.poll_in_flight());
    driver.service();
    driver.service();
    assert_eq!(driver.host_mut().polls(), 0);
}

#[test]
fn completion_releases_poll_permit() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = connected(&link);
    driver.handle_event(inbound(&status_packet()));
    assert!(!driver.poll_in_flight());
    driver.service();
    assert_eq!(driver.host_mut().polls(), 1);
    assert!(driver.poll_in_flight());
}

#[test]
fn failed_poll_keeps_connection() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = connected(&link);
    driver.handle_event(HostEvent::InComplete(InCompletion::failed(FIRST_CONNECTION, TransferStatus::Stall)));
    assert!(!driver.poll_in_flight());
    assert_eq!(driver.state(), DriverState::SteadyState);
    assert!(link.is_device_connected());
    driver.service();
    assert_eq!(driver.host_mut().polls(), 1);
}

#[test]
fn rejected_poll_submit_releases_permit() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = connected(&link);
    driver.handle_event(inbound(&status_packet()));
    driver.host_mut().fail_in = true;
    driver.service();
    assert!(!driver.poll_in_flight());
}

// ============================================================================
// Inbound Routing Tests
// ============================================================================

#[test]
fn status_updates_cache_and_signals() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = connected(&link);
    assert!(!link.state_changed_pending());

    driver.handle_event(inbound(&status_packet()));

    let state = link.get_state();
    assert_eq!(state.preset, Some(Preset::One));
    assert_eq!(state.volume, Volume::from_centi_db(-2000));
    assert!(link.state_changed_pending());
}

#[test]
fn identical_status_does_not_signal() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = connected(&link);
    driver.handle_event(inbound(&status_packet()));
    embassy_futures::block_on(link.wait_state_changed());

    driver.handle_event(inbound(&status_packet()));
    assert!(!link.state_changed_pending());
}

#[test]
fn filter_name_is_stored() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = connected(&link);
    driver.handle_event(inbound(&filter_name_packet("Nearfield")));
    assert_eq!(link.get_filter_name().as_str(), "Nearfield");
    assert!(link.state_changed_pending());
}

#[test]
fn unknown_packet_is_discarded() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = connected(&link);
    let mut packet = status_packet();
    packet.set(0, 0x42);
    driver.handle_event(inbound(&packet));
    assert_eq!(link.get_state(), DecodedState::default());
    assert!(!link.state_changed_pending());
}

#[test]
fn zero_length_completion_is_ignored() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = connected(&link);
    driver.handle_event(HostEvent::InComplete(InCompletion::completed(FIRST_CONNECTION, &[])));
    assert_eq!(link.get_state(), DecodedState::default());
    assert!(!driver.poll_in_flight());
}

#[test]
fn out_completion_is_observational() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = connected(&link);
    driver.handle_event(HostEvent::OutComplete(OutCompletion {
        status: TransferStatus::Error,
        len: 0,
    }));
    assert_eq!(driver.state(), DriverState::SteadyState);
    assert!(driver.host_mut().calls.is_empty());
}

// ============================================================================
// Command Execution Tests
// ============================================================================

#[test]
fn preset_then_volume_carries_base_forward() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = connected(&link);
    driver.handle_event(inbound(&status_packet()));

    link.try_enqueue_command(ControlCommand::set_preset(Preset::Two)).unwrap();
    link.try_enqueue_command(ControlCommand::new(ControlAction::SetVolume, -10)).unwrap();
    driver.service();
    driver.service();

    let outs = driver.host_mut().outs();
    assert_eq!(outs.len(), 2);

    assert_eq!(outs[0].get(2), 2);
    assert_eq!(volume_bytes(&outs[0]), -300);

    assert_eq!(outs[1].get(2), 2);
    assert_eq!(volume_bytes(&outs[1]), -1000);
    assert_eq!(outs[1].get(12), 0x01);
    assert!(link.queue().is_empty());
}

#[test]
fn one_command_per_service() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = connected(&link);
    link.try_enqueue_command(ControlCommand::new(ControlAction::SetMute, 1)).unwrap();
    link.try_enqueue_command(ControlCommand::new(ControlAction::SetMute, 0)).unwrap();
    driver.service();
    assert_eq!(driver.host_mut().outs().len(), 1);
    assert_eq!(link.queue().len(), 1);
}

#[test]
fn status_replaces_write_base() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = connected(&link);
    link.try_enqueue_command(ControlCommand::set_preset(Preset::Three)).unwrap();
    driver.service();

    // Device reports preset 1 after the write
    driver.handle_event(inbound(&status_packet()));
    link.try_enqueue_command(ControlCommand::new(ControlAction::SetMute, 1)).unwrap();
    driver.service();

    let outs = driver.host_mut().outs();
    assert_eq!(outs[1].get(2), 1);
    assert_eq!(outs[1].get(6) & 0x80, 0x80);
}

#[test]
fn outbound_forced_zero_bytes() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = connected(&link);
    let mut status = status_packet();
    status.set(1, 0x77);
    status.set(5, 0x77);
    status.set(23, 0x77);
    status.set(26, 0x77);
    status.set(40, 0x77);
    driver.handle_event(inbound(&status));

    link.try_enqueue_command(ControlCommand::new(ControlAction::SetMute, 1)).unwrap();
    driver.service();

    let out = driver.host_mut().outs()[0];
    for index in [1, 5, 23, 26, 40] {
        assert_eq!(out.get(index), 0, "byte {index}");
    }
}

#[test]
fn rejected_submit_drops_command() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = connected(&link);
    link.try_enqueue_command(ControlCommand::new(ControlAction::SetMute, 1)).unwrap();
    driver.host_mut().fail_out = true;
    driver.service();
    assert!(link.queue().is_empty());
    assert!(driver.host_mut().outs().is_empty());
}

#[test]
fn send_without_device_fails() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = driver(&link);
    assert_eq!(driver.send_packet(&Packet::zeroed()), Err(DeviceError::NotConnected));
}

#[test]
fn commands_wait_while_idle() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = driver(&link);
    link.try_enqueue_command(ControlCommand::set_preset(Preset::One)).unwrap();
    driver.service();
    assert!(driver.host_mut().calls.is_empty());
    assert_eq!(link.queue().len(), 1);
}

// ============================================================================
// Detach Tests
// ============================================================================

#[test]
fn detach_closes_and_resets() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = connected(&link);
    driver.handle_event(inbound(&status_packet()));
    driver.handle_event(inbound(&filter_name_packet("Flat")));
    embassy_futures::block_on(link.wait_state_changed());
    link.try_enqueue_command(ControlCommand::set_preset(Preset::Three)).unwrap();

    driver.handle_event(HostEvent::Detached);

    assert_eq!(driver.state(), DriverState::Idle);
    assert_eq!(driver.address(), None);
    assert!(!link.is_device_connected());
    assert!(link.queue().is_empty());
    assert!(link.state_changed_pending());

    let state = link.get_state();
    assert_eq!(state.preset, None);
    assert_eq!(state.volume, Volume::default());
    assert!(!state.is_muted);
    assert!(link.get_filter_name().is_empty());

    assert_eq!(driver.host_mut().calls, vec![Call::Release(0), Call::Close(5)]);
}

#[test]
fn command_before_disconnect_not_replayed() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = connected(&link);
    link.try_enqueue_command(ControlCommand::set_preset(Preset::Three)).unwrap();
    driver.handle_event(HostEvent::Detached);

    driver.handle_event(HostEvent::Attached { address: 6 });
    driver.service();

    // Only the two open-sequence requests
    let outs = driver.host_mut().outs();
    assert_eq!(outs.len(), 2);
    assert_eq!(outs[0].get(0), 0x06);
    assert_eq!(outs[1].get(0), 0x03);
    assert_eq!(link.connection_epoch(), 2);
}

#[test]
fn late_inbound_after_detach_is_dropped() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = connected(&link);
    driver.handle_event(HostEvent::Detached);
    driver.handle_event(inbound(&status_packet()));
    assert_eq!(link.get_state(), DecodedState::default());
}

#[test]
fn detach_before_open() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = driver(&link);
    driver.handle_event(HostEvent::Attached { address: 5 });
    driver.handle_event(HostEvent::Detached);
    driver.service();
    assert_eq!(driver.state(), DriverState::Idle);
    assert!(driver.host_mut().calls.is_empty());
}

#[test]
fn detach_while_idle_is_ignored() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = driver(&link);
    driver.handle_event(HostEvent::Detached);
    assert_eq!(driver.state(), DriverState::Idle);
    assert!(!link.state_changed_pending());
}

#[test]
fn reattach_resets_poll_permit() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = connected(&link);
    assert!(driver.poll_in_flight());
    driver.handle_event(HostEvent::Detached);
    assert!(!driver.poll_in_flight());

    driver.handle_event(HostEvent::Attached { address: 5 });
    driver.service();
    assert_eq!(driver.host_mut().polls(), 1);
}

#[test]
fn late_completion_after_reattach_keeps_permit() {
    let link = AmpLink::<NoopRawMutex>::new();
    let mut driver = connected(&link);
    driver.handle_event(HostEvent::Detached);
    driver.handle_event(HostEvent::Attached { address: 5 });
    driver.service();
    driver.host_mut().calls.clear();
    assert!(driver.poll_in_flight());

    // Cancelled poll of the first connection
    driver.handle_event(HostEvent::InComplete(InCompletion::failed(
        FIRST_CONNECTION,
        TransferStatus::Cancelled,
    )));
    assert!(driver.poll_in_flight());
    driver.service();
    assert_eq!(driver.host_mut().polls(), 0);

    driver.handle_event(HostEvent::InComplete(InCompletion::completed(
        FIRST_CONNECTION + 1,
        status_packet().as_bytes(),
    )));
    assert!(!driver.poll_in_flight());
    assert_eq!(link.get_state().preset, Some(Preset::One));
}
