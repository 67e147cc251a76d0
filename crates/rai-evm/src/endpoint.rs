//! A per-chain pool of HTTP-RPC endpoints with round-robin failover and a
//! one-time chain-id gate (§4.3).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use alloy_provider::{Provider, ProviderBuilder, RootProvider};
use alloy_transport_http::Http;
use url::Url;

use crate::error::EvmError;

/// Number of consecutive probe failures after which an endpoint is marked
/// permanently bad (§4.3).
const MAX_PROBE_FAILURES: u32 = 10;

struct Endpoint {
    url: Url,
    provider: RootProvider,
    ok: AtomicBool,
    failures: AtomicU32,
}

/// Round-robin pool over a chain's configured endpoints.
///
/// On first use each endpoint is probed with `eth_chainId`; a wrong chain id
/// is a fatal configuration error (the caller should abort the process). A
/// transient probe failure increments a counter and, past
/// [`MAX_PROBE_FAILURES`], marks the endpoint permanently bad. Every
/// subsequent call advances to the next endpoint marked `ok` on any RPC
/// error, so failures self-heal via rotation without ever retrying a bad
/// endpoint.
pub struct EndpointPool {
    endpoints: Vec<Endpoint>,
    cursor: AtomicUsize,
    expected_chain_id: u64,
}

impl EndpointPool {
    pub fn new(urls: Vec<Url>, expected_chain_id: u64) -> Self {
        let endpoints = urls
            .into_iter()
            .map(|url| {
                let transport = Http::new(url.clone());
                let provider = ProviderBuilder::new().on_client(
                    alloy_rpc_client::RpcClient::new(transport, false),
                );
                Endpoint {
                    url,
                    provider,
                    ok: AtomicBool::new(true),
                    failures: AtomicU32::new(0),
                }
            })
            .collect();
        Self {
            endpoints,
            cursor: AtomicUsize::new(0),
            expected_chain_id,
        }
    }

    /// Probes every endpoint's `eth_chainId`. A mismatch is fatal; a
    /// transport failure marks the endpoint bad without aborting (another
    /// endpoint may still answer correctly).
    pub async fn gate_chain_ids(&self) -> Result<(), EvmError> {
        for (i, ep) in self.endpoints.iter().enumerate() {
            match ep.provider.get_chain_id().await {
                Ok(got) if got == self.expected_chain_id => {}
                Ok(got) => {
                    return Err(EvmError::ChainIdMismatch {
                        expected: self.expected_chain_id,
                        got,
                    });
                }
                Err(e) => {
                    tracing::warn!(endpoint = %ep.url, error = %e, "chain id probe failed");
                    self.mark_failure(i);
                }
            }
        }
        Ok(())
    }

    fn mark_failure(&self, i: usize) {
        let ep = &self.endpoints[i];
        let failures = ep.failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= MAX_PROBE_FAILURES {
            ep.ok.store(false, Ordering::SeqCst);
        }
    }

    /// Returns the current endpoint's provider, or rotates to the next `ok`
    /// one and returns that. Errors if every endpoint is marked bad.
    fn current(&self) -> Result<(usize, &RootProvider), EvmError> {
        let n = self.endpoints.len();
        if n == 0 {
            return Err(EvmError::AllEndpointsBad);
        }
        let start = self.cursor.load(Ordering::SeqCst) % n;
        for offset in 0..n {
            let i = (start + offset) % n;
            if self.endpoints[i].ok.load(Ordering::SeqCst) {
                return Ok((i, &self.endpoints[i].provider));
            }
        }
        Err(EvmError::AllEndpointsBad)
    }

    /// Advances the round-robin cursor past the endpoint at `i`, as happens
    /// on any RPC error (§4.3).
    fn advance_past(&self, i: usize) {
        let n = self.endpoints.len();
        self.cursor.store((i + 1) % n.max(1), Ordering::SeqCst);
    }

    /// Runs `f` against the current endpoint; on error, advances the
    /// round-robin cursor before propagating.
    pub async fn call<T, F, Fut>(&self, f: F) -> Result<T, EvmError>
    where
        F: FnOnce(RootProvider) -> Fut,
        Fut: std::future::Future<Output = Result<T, EvmError>>,
    {
        let (i, provider) = self.current()?;
        let provider = provider.clone();
        match f(provider).await {
            Ok(v) => Ok(v),
            Err(e) => {
                self.advance_past(i);
                Err(e)
            }
        }
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    pub fn ok_count(&self) -> usize {
        self.endpoints
            .iter()
            .filter(|e| e.ok.load(Ordering::SeqCst))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(n: usize) -> EndpointPool {
        let urls = (0..n)
            .map(|i| Url::parse(&format!("http://endpoint-{i}.invalid")).unwrap())
            .collect();
        EndpointPool::new(urls, 97)
    }

    #[test]
    fn endpoint_marked_bad_only_after_ten_probe_failures() {
        let p = pool(3);
        for _ in 0..9 {
            p.mark_failure(0);
        }
        assert_eq!(p.ok_count(), 3);
        p.mark_failure(0);
        assert_eq!(p.ok_count(), 2);
    }

    /// §8 scenario 1: endpoint 1 errors on `blockNumber`; the round-robin
    /// cursor must advance to endpoint 2 and subsequent calls land there.
    fn endpoint_name(p: &EndpointPool, i: usize) -> &str {
        p.endpoints[i].url.host_str().unwrap()
    }

    #[test]
    fn advance_past_rotates_cursor_to_next_endpoint() {
        let p = pool(3);
        let (i, _) = p.current().unwrap();
        assert_eq!(i, 0);
        p.advance_past(0);
        let (i, _) = p.current().unwrap();
        assert_eq!(i, 1);
        assert_eq!(endpoint_name(&p, i), "endpoint-1.invalid");
    }

    #[test]
    fn rotation_skips_endpoints_marked_bad() {
        let p = pool(3);
        for _ in 0..10 {
            p.mark_failure(1);
        }
        p.advance_past(0);
        let (i, _) = p.current().unwrap();
        assert_eq!(i, 2, "endpoint 1 is bad, rotation must land on endpoint 2");
    }

    #[test]
    fn all_endpoints_bad_is_an_error() {
        let p = pool(2);
        for ep in 0..2 {
            for _ in 0..10 {
                p.mark_failure(ep);
            }
        }
        assert!(p.current().is_err());
    }

    #[test]
    fn empty_pool_is_an_error() {
        let p = pool(0);
        assert!(p.current().is_err());
    }
}
