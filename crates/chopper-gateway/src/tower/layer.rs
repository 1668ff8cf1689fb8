//! Tower Layer for the request gateway

use std::sync::Arc;

use tower::Layer;

use super::GatewayLayerConfig;
use super::key::{ClientKeyExtractor, IpKeyExtractor};
use super::service::GatewayService;
use crate::pipeline::Gateway;

/// Tower Layer that puts a [`Gateway`] in front of a service
///
/// # Example
///
/// ```rust,ignore
/// use tower::ServiceBuilder;
/// use chopper_gateway::tower::GatewayLayer;
///
/// let service = ServiceBuilder::new()
///     .layer(GatewayLayer::new(gateway).public_path("/login"))
///     .service(my_inner_service);
/// ```
#[derive(Debug, Clone)]
pub struct GatewayLayer<K = IpKeyExtractor> {
    gateway: Gateway,
    key_extractor: Arc<K>,
    config: GatewayLayerConfig,
}

impl GatewayLayer<IpKeyExtractor> {
    /// Layer keyed by client IP from proxy headers, every path protected
    pub fn new(gateway: Gateway) -> Self {
        Self::with_key_extractor(gateway, IpKeyExtractor)
    }
}

impl<K: ClientKeyExtractor> GatewayLayer<K> {
    /// Layer with a custom client key strategy
    pub fn with_key_extractor(gateway: Gateway, key_extractor: K) -> Self {
        Self {
            gateway,
            key_extractor: Arc::new(key_extractor),
            config: GatewayLayerConfig::default(),
        }
    }

    /// Replace the route configuration
    #[must_use]
    pub fn config(mut self, config: GatewayLayerConfig) -> Self {
        self.config = config;
        self
    }

    /// Skip the identity gate for this exact path
    #[must_use]
    pub fn public_path(mut self, path: impl Into<String>) -> Self {
        self.config = self.config.public_path(path);
        self
    }
}

impl<S, K: ClientKeyExtractor> Layer<S> for GatewayLayer<K> {
    type Service = GatewayService<S, K>;

    fn layer(&self, inner: S) -> Self::Service {
        GatewayService::new(
            inner,
            self.gateway.clone(),
            Arc::clone(&self.key_extractor),
            self.config.clone(),
        )
    }
}
