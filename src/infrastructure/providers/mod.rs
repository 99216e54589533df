//! Concrete delivery providers and channel routing

mod aws;
mod registry;

pub use aws::{AwsProvider, AwsProviderConfig};
pub use registry::ProviderRegistry;
