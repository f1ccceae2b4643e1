//! Gateway Fallback
//!
//! Read path over public IPFS gateways, used when content must be retrieved
//! without the private cluster.

mod resolver;

pub use resolver::{GatewayResolver, ResolverConfig};
