//! Device Lifecycle
//!
//! Owns the amplifier connection: open and claim on attach, request the
//! initial state and the filter name, then execute queued commands while
//! keeping exactly one status poll in flight. A detach tears everything
//! down and discards pending commands.
//!
//! Status polls are tagged with the connection epoch; a completion carrying
//! another epoch belongs to an earlier device and is ignored.
//!
//! ```text
//!  Idle ──attach──▶ Opening ──▶ RequestingInitialState ──▶ RequestingFilterName
//!   ▲                  │                                          │
//!   │            open/claim fail                                  ▼
//!   ├──────────────────┘                                      SteadyState
//!   │                                                             │
//!   └─────────────────────── Closing ◀──────────detach────────────┘
//! ```
//!
//! [`DeviceDriver::handle_event`] and [`DeviceDriver::service`] are the
//! synchronous steps; [`DeviceDriver::run`] drives them from the transport.

use embassy_futures::select::{select, select3, Either, Either3};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Timer;

use crate::config::DriverConfig;
use crate::error::DeviceError;
use crate::link::AmpLink;
use crate::protocol::{self, Packet, PacketKind};
use crate::types::Command;
use crate::usb::host::{HostEvent, InCompletion, OutCompletion, UsbHost};

/// Lifecycle phase
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DriverState {
    /// No device
    #[default]
    Idle,
    /// Device attached, not yet opened
    Opening {
        /// Bus address
        address: u8,
    },
    /// Initial state request pending
    RequestingInitialState,
    /// Filter name request pending
    RequestingFilterName,
    /// Executing commands and polling status
    SteadyState,
    /// Tearing down the connection
    Closing,
}

impl DriverState {
    /// Check whether `next` is a legal successor
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Opening { .. })
                | (Self::Opening { .. }, Self::RequestingInitialState | Self::Idle)
                | (Self::RequestingInitialState, Self::RequestingFilterName)
                | (Self::RequestingFilterName, Self::SteadyState)
                | (Self::Closing, Self::Idle)
        ) || (matches!(next, Self::Closing) && !matches!(self, Self::Idle | Self::Closing))
    }

    /// Check whether a device handle is held in this phase
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(
            self,
            Self::RequestingInitialState | Self::RequestingFilterName | Self::SteadyState
        )
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for DriverState {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Idle => defmt::write!(f, "IDLE"),
            Self::Opening { address } => defmt::write!(f, "OPENING({=u8})", address),
            Self::RequestingInitialState => defmt::write!(f, "REQ_STATE"),
            Self::RequestingFilterName => defmt::write!(f, "REQ_NAME"),
            Self::SteadyState => defmt::write!(f, "STEADY"),
            Self::Closing => defmt::write!(f, "CLOSING"),
        }
    }
}

/// Single-slot guard for the inbound status poll
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollPermit {
    in_flight: bool,
}

impl PollPermit {
    /// Take the permit, returns false if a poll is already outstanding
    pub fn try_acquire(&mut self) -> bool {
        if self.in_flight {
            false
        } else {
            self.in_flight = true;
            true
        }
    }

    /// Give the permit back
    pub fn release(&mut self) {
        self.in_flight = false;
    }

    /// Check for an outstanding poll
    #[must_use]
    pub const fn in_flight(&self) -> bool {
        self.in_flight
    }
}

struct Connection<D> {
    address: u8,
    device: D,
    /// Connection epoch, used as the IN transfer tag
    epoch: u32,
}

/// Amplifier device driver
pub struct DeviceDriver<'a, M: RawMutex, H: UsbHost> {
    host: H,
    link: &'a AmpLink<M>,
    config: DriverConfig,
    state: DriverState,
    connection: Option<Connection<H::Device>>,
    poll: PollPermit,
    /// Last command packet sent, base for the next one until a status arrives
    pending_base: Option<Packet>,
}

impl<'a, M: RawMutex, H: UsbHost> DeviceDriver<'a, M, H> {
    /// Create a driver in `Idle`
    pub fn new(host: H, link: &'a AmpLink<M>, config: DriverConfig) -> Self {
        Self {
            host,
            link,
            config,
            state: DriverState::Idle,
            connection: None,
            poll: PollPermit::default(),
            pending_base: None,
        }
    }

    /// Get the lifecycle phase
    #[must_use]
    pub const fn state(&self) -> DriverState {
        self.state
    }

    /// Get the address of the open device
    #[must_use]
    pub fn address(&self) -> Option<u8> {
        self.connection.as_ref().map(|c| c.address)
    }

    /// Check for an outstanding status poll
    #[must_use]
    pub const fn poll_in_flight(&self) -> bool {
        self.poll.in_flight()
    }

    /// Get the transport mutably
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    fn transition(&mut self, next: DriverState) {
        if !self.state.can_transition_to(next) {
            warn!("unexpected transition {:?} -> {:?}", self.state, next);
        }
        debug!("{:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Apply a transport event
    pub fn handle_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::Attached { address } => self.on_attached(address),
            HostEvent::Detached => self.on_detached(),
            HostEvent::InComplete(completion) => self.on_in_complete(&completion),
            HostEvent::OutComplete(completion) => self.on_out_complete(completion),
        }
    }

    fn on_attached(&mut self, address: u8) {
        if self.state == DriverState::Idle {
            info!("device attached at {}", address);
            self.transition(DriverState::Opening { address });
        } else {
            warn!("attach at {} ignored in {:?}", address, self.state);
        }
    }

    fn on_detached(&mut self) {
        match self.state {
            DriverState::Idle | DriverState::Closing => {}
            DriverState::Opening { .. } => {
                info!("device gone before open");
                self.transition(DriverState::Idle);
            }
            _ => {
                self.transition(DriverState::Closing);
                self.close();
            }
        }
    }

    fn on_in_complete(&mut self, completion: &InCompletion) {
        let Some(connection) = self.connection.as_ref() else {
            debug!("inbound data without device dropped");
            return;
        };
        if completion.tag != connection.epoch {
            debug!("stale completion from connection {} dropped", completion.tag);
            return;
        }
        self.poll.release();

        if !completion.status.is_ok() {
            warn!("status poll failed: {:?}", completion.status);
            return;
        }
        if completion.len == 0 {
            return;
        }

        let packet = &completion.packet;
        trace!("in {:?}", packet);
        match protocol::classify(packet) {
            PacketKind::Status => {
                self.pending_base = None;
                self.link.ingest_status(packet);
            }
            PacketKind::FilterName => {
                self.link.ingest_filter_name(packet);
            }
            PacketKind::Unknown(kind) => {
                warn!("unknown packet type {}", kind);
            }
        }
    }

    fn on_out_complete(&mut self, completion: OutCompletion) {
        if completion.status.is_ok() {
            trace!("out acknowledged, {} bytes", completion.len);
        } else {
            warn!("command write failed: {:?}", completion.status);
        }
    }

    /// Advance the lifecycle after events have been applied
    ///
    /// Runs the open sequence through to `SteadyState`, executes at most one
    /// queued command and keeps a status poll outstanding.
    pub fn service(&mut self) {
        loop {
            match self.state {
                DriverState::Opening { address } => self.open(address),
                DriverState::RequestingInitialState => {
                    if let Err(e) = self.send_packet(&protocol::encode_request_initial_state()) {
                        error!("initial state request failed: {:?}", e);
                    }
                    self.transition(DriverState::RequestingFilterName);
                }
                DriverState::RequestingFilterName => {
                    if let Err(e) = self.send_packet(&protocol::encode_request_filter_name()) {
                        error!("filter name request failed: {:?}", e);
                    }
                    self.transition(DriverState::SteadyState);
                }
                DriverState::SteadyState => {
                    if let Some(command) = self.link.queue().try_dequeue() {
                        self.execute(command);
                    }
                    self.ensure_poll();
                    return;
                }
                DriverState::Idle | DriverState::Closing => return,
            }
        }
    }

    fn open(&mut self, address: u8) {
        let device = match self.host.open(address) {
            Ok(device) => device,
            Err(e) => {
                error!("open {} failed: {:?}", address, e);
                self.transition(DriverState::Idle);
                return;
            }
        };

        if let Err(e) = self.host.claim_interface(&device, self.config.interface) {
            error!("claim interface {} failed: {:?}", self.config.interface, e);
            if let Err(e) = self.host.close(device) {
                warn!("close failed: {:?}", e);
            }
            self.transition(DriverState::Idle);
            return;
        }

        info!("device {} open", address);
        let epoch = self.link.mark_connected();
        self.connection = Some(Connection {
            address,
            device,
            epoch,
        });
        self.poll = PollPermit::default();
        self.pending_base = None;
        self.transition(DriverState::RequestingInitialState);
    }

    fn close(&mut self) {
        if let Some(Connection { address, device, .. }) = self.connection.take() {
            if let Err(e) = self.host.release_interface(&device, self.config.interface) {
                warn!("release interface failed: {:?}", e);
            }
            if let Err(e) = self.host.close(device) {
                warn!("close failed: {:?}", e);
            }
            info!("device {} closed", address);
        }
        self.poll = PollPermit::default();
        self.pending_base = None;
        self.link.mark_disconnected();
        self.transition(DriverState::Idle);
    }

    fn ensure_poll(&mut self) {
        let Some(connection) = self.connection.as_ref() else {
            return;
        };
        if !self.poll.try_acquire() {
            return;
        }
        if let Err(e) = self
            .host
            .submit_in(&connection.device, self.config.in_endpoint, connection.epoch)
        {
            warn!("status poll submit failed: {:?}", e);
            self.poll.release();
        }
    }

    /// Render a command against the current base and send it
    ///
    /// A command that cannot be sent is logged and dropped.
    pub fn execute(&mut self, command: Command) {
        let base = self
            .pending_base
            .unwrap_or_else(|| self.link.cache().snapshot_for_write());
        let packet = protocol::encode_command(&base, command, self.config.preset_volume_reset);

        match self.send_packet(&packet) {
            Ok(()) => {
                info!("executed {:?}", command);
                self.pending_base = Some(packet);
            }
            Err(e) => error!("dropped {:?}: {:?}", command, e),
        }
    }

    /// Submit a packet to the OUT endpoint
    ///
    /// # Errors
    ///
    /// `DeviceError::NotConnected` without an open device, `DeviceError::Host`
    /// when the transport rejects the write.
    pub fn send_packet(&mut self, packet: &Packet) -> Result<(), DeviceError> {
        let Some(connection) = self.connection.as_ref() else {
            error!("send without device");
            return Err(DeviceError::NotConnected);
        };
        trace!("out {:?}", packet);
        self.host
            .submit_out(&connection.device, self.config.out_endpoint, packet)?;
        Ok(())
    }

    /// Drive the lifecycle forever
    ///
    /// Waits for a transport event, a queued command (in `SteadyState`) or the
    /// event timeout, whichever comes first, then services the state.
    pub async fn run(&mut self) -> ! {
        let link = self.link;
        loop {
            let timeout = Timer::after(self.config.event_timeout);

            if self.state == DriverState::SteadyState {
                match select3(self.host.wait_event(), link.queue().dequeue(), timeout).await {
                    Either3::First(event) => self.handle_event(event),
                    Either3::Second(command) => self.execute(command),
                    Either3::Third(()) => {}
                }
            } else if let Either::First(event) = select(self.host.wait_event(), timeout).await {
                self.handle_event(event);
            }

            self.service();
        }
    }
}
