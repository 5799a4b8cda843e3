pub mod codec;
pub mod commands;
pub mod control;
pub mod degraded;
pub mod error;
pub mod firewall;
pub mod login;
pub mod reports;
pub mod sentence;

#[cfg(test)]
pub(crate) mod testing;

pub use codec::SentenceCodec;
pub use control::{ControlSettings, ProvisionOutcome, RouterControl};
pub use degraded::{Clock, RouterOp, SyntheticProfile, SystemClock};
pub use error::{ControlError, ControlResult};
pub use firewall::{BlockedApp, FirewallPolicy};
pub use sentence::{Record, Reply, Sentence};
