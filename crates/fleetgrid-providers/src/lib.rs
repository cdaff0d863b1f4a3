//! fleetgrid-providers — cloud adapters for the scaling engines.
//!
//! Each adapter declares the client calls it needs as a trait together with
//! the request and response shapes, and implements
//! [`fleetgrid_autoscale::Provider`] on top of it. Transports are supplied
//! by the embedding application; [`SimulatedCloud`] implements every client
//! in memory for tests and `fleetd run --simulate`.
//!
//! | Provider | Inventory | Blocking |
//! |---|---|---|
//! | Runpod | lowest-price quote per bundle size 1..=8 | no |
//! | Vast | offer search, one unit per offer | yes |
//! | EC2 | configured single-GPU instance type | no |

pub mod ec2;
pub mod factory;
pub mod runpod;
pub mod simulated;
pub mod vast;

pub use ec2::{Ec2Client, Ec2Provider};
pub use factory::{ConfigurationError, ProviderClients, build_engines};
pub use runpod::{RunpodClient, RunpodProvider};
pub use simulated::{SimInstance, SimulatedCloud};
pub use vast::{VastClient, VastProvider};
