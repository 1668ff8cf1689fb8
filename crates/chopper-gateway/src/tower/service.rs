//! Tower Service for the request gateway

use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use http::header::AUTHORIZATION;
use tower::Service;

use super::GatewayLayerConfig;
use super::key::{ClientKeyExtractor, IpKeyExtractor};
use crate::pipeline::Gateway;

/// Tower Service that runs [`Gateway::admit`] before the inner service
///
/// Admitted requests on protected paths get the caller's
/// [`Identity`](crate::authority::Identity) inserted into their extensions.
/// Rejected requests are answered directly with
/// [`Rejection::to_response`](crate::pipeline::Rejection::to_response) and
/// the inner service is never called.
#[derive(Debug, Clone)]
pub struct GatewayService<S, K = IpKeyExtractor> {
    inner: S,
    gateway: Gateway,
    key_extractor: Arc<K>,
    config: GatewayLayerConfig,
}

impl<S, K> GatewayService<S, K> {
    /// Create a new gateway service
    pub fn new(
        inner: S,
        gateway: Gateway,
        key_extractor: Arc<K>,
        config: GatewayLayerConfig,
    ) -> Self {
        Self {
            inner,
            gateway,
            key_extractor,
            config,
        }
    }

    /// Get a reference to the inner service
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Get a mutable reference to the inner service
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }
}

impl<S, K, B, ResBody> Service<http::Request<B>> for GatewayService<S, K>
where
    S: Service<http::Request<B>, Response = http::Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    K: ClientKeyExtractor,
    B: Send + 'static,
    ResBody: From<String> + Send + 'static,
{
    type Response = http::Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<B>) -> Self::Future {
        let client_key = self.key_extractor.client_key(&req);
        let access = self.config.access_for(req.uri().path());

        let admission =
            match self
                .gateway
                .admit(&client_key, access, req.headers().get(AUTHORIZATION))
            {
                Ok(admission) => admission,
                Err(rejection) => {
                    let response: http::Response<ResBody> = rejection.to_response();
                    return Box::pin(async move { Ok(response) });
                }
            };

        if let Some(identity) = admission.into_identity() {
            req.extensions_mut().insert(identity);
        }

        // The clone that was driven to readiness handles this request
        let inner = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, inner);
        Box::pin(async move { inner.call(req).await })
    }
}
