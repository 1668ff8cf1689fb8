//! Tower middleware for the request gateway
//!
//! [`GatewayLayer`] wraps any `http::Request` service with the admission
//! and identity gates of [`Gateway`](crate::pipeline::Gateway).
//!
//! ```rust,ignore
//! use tower::ServiceBuilder;
//! use chopper_gateway::tower::GatewayLayer;
//!
//! let service = ServiceBuilder::new()
//!     .layer(
//!         GatewayLayer::new(gateway)
//!             .public_path("/register")
//!             .public_path("/login"),
//!     )
//!     .service(app);
//! ```
//!
//! Every path goes through the admission gate. Paths registered as public
//! skip the identity gate; everything else requires `Authorization: Bearer`.

pub mod key;
mod layer;
mod service;

use std::collections::HashSet;

pub use key::{ClientKeyExtractor, IpKeyExtractor};
pub use layer::GatewayLayer;
pub use service::GatewayService;

use crate::pipeline::RouteAccess;

/// Which paths skip the identity gate
#[derive(Debug, Clone)]
pub struct GatewayLayerConfig {
    /// Exact paths that are public
    pub public_paths: HashSet<String>,
    /// Access applied to any other path
    pub default_access: RouteAccess,
}

impl Default for GatewayLayerConfig {
    fn default() -> Self {
        Self {
            public_paths: HashSet::new(),
            default_access: RouteAccess::Protected,
        }
    }
}

impl GatewayLayerConfig {
    /// Every path public unless told otherwise; admission still applies
    pub fn all_public() -> Self {
        Self {
            public_paths: HashSet::new(),
            default_access: RouteAccess::Public,
        }
    }

    /// Mark one exact path as public
    #[must_use]
    pub fn public_path(mut self, path: impl Into<String>) -> Self {
        self.public_paths.insert(path.into());
        self
    }

    /// Access level for a request path
    pub fn access_for(&self, path: &str) -> RouteAccess {
        if self.public_paths.contains(path) {
            RouteAccess::Public
        } else {
            self.default_access
        }
    }
}
