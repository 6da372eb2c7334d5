//! Server-side frame orchestration.

pub mod balancer;
pub mod cluster;
pub mod config;
pub mod frame;
pub mod frustum;
pub mod update;

use thiserror::Error;

use crate::compound::CompoundId;
use crate::model::{Observer, View};
use crate::object::MasterCell;
use crate::server::cluster::ChannelId;

pub use config::Config;

/// A view replicated to clients, with optional head tracking.
pub struct ViewSlot {
    pub cell: MasterCell<View>,
    pub observer: Option<Observer>,
}

/// Fatal configuration problems, detected at load.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} references unknown channel {1:?}")]
    UnknownChannel(CompoundId, ChannelId),
    #[error("cycle detected in the parents of {0}")]
    CompoundCycle(CompoundId),
    #[error("{0} has an invalid pixel decomposition")]
    InvalidPixel(CompoundId),
    #[error("{0} has a zero frame period")]
    InvalidPeriod(CompoundId),
    #[error("configuration has no compounds")]
    EmptyTree,
    #[error("output frame {0:?} has no owning channel")]
    FrameWithoutChannel(CompoundId),
}

/// Per-frame failures. Invariant violations abort the frame; the
/// orchestrator never unwinds across packet emission.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("perspective eye lies on the wall plane for {0}")]
    EyeOnWall(CompoundId),
    #[error("{0} entered emission without a destination channel")]
    MissingChannel(CompoundId),
}
