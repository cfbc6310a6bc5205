//! Power Management
//!
//! Trigger-driven amplifier power sequencing:
//! - `sequencer`: pure decision core (no-trigger delay, power-on cooldown)
//! - `task`: shell applying the decisions to the relay and the command queue

pub mod sequencer;
pub mod task;

pub use sequencer::{SequencerAction, TriggerSequencer};
pub use task::PowerSequencer;
