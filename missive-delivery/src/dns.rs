//! DNS resolution for address validation.
//!
//! Provides the three lookups the validator chains together: MX records for a
//! domain, A/AAAA records for a host, and PTR records for an address. MX
//! results are cached per domain using the record TTL with configurable
//! bounds.
//!
//! # Caching Strategy
//!
//! - **DNS TTL by default**: Uses the minimum TTL of the returned MX records
//! - **Bounded TTLs**: Applies min and max bounds to prevent extremes
//! - **Optional override**: `cache_ttl_secs` overrides the DNS TTL for all entries
//! - **Lock-free**: `DashMap` provides concurrent access without mutex contention
//!
//! Host and PTR lookups are not cached; they are only reached for domains
//! that are not yet in the MX cache, or whose earlier validation failed.

use std::{
    net::IpAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;
use hickory_resolver::{
    ResolveError, TokioResolver,
    config::{ResolverConfig, ResolverOpts},
    name_server::TokioConnectionProvider,
};
use missive_common::tracing::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during DNS resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnsError {
    /// The name exists but has no records of the requested type.
    #[error("No {record} records found for {name}")]
    NoRecords { name: String, record: &'static str },

    /// Domain does not exist (NXDOMAIN).
    #[error("Domain does not exist: {0}")]
    DomainNotFound(String),

    /// DNS query failed due to network or resolver issues.
    #[error("DNS lookup of {name} failed: {reason}")]
    LookupFailed { name: String, reason: String },

    /// The resolver could not be constructed.
    #[error("DNS resolver initialization failed: {0}")]
    Init(String),
}

impl DnsError {
    fn from_resolve(name: &str, record: &'static str, err: &ResolveError) -> Self {
        if err.is_nx_domain() {
            Self::DomainNotFound(name.to_string())
        } else if err.is_no_records_found() {
            Self::NoRecords {
                name: name.to_string(),
                record,
            }
        } else {
            Self::LookupFailed {
                name: name.to_string(),
                reason: err.to_string(),
            }
        }
    }

    /// Returns `true` if a later lookup of the same name might succeed.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::LookupFailed { .. })
    }
}

/// Configuration for DNS resolver.
#[derive(Debug, Clone, Deserialize)]
pub struct DnsConfig {
    /// DNS query timeout in seconds (default: 5)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Cache TTL override in seconds (optional)
    /// If set, overrides the DNS record's TTL for all cached entries
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,

    /// Minimum cache TTL in seconds (default: 60)
    #[serde(default = "default_min_cache_ttl_secs")]
    pub min_cache_ttl_secs: u64,

    /// Maximum cache TTL in seconds (default: 3600)
    #[serde(default = "default_max_cache_ttl_secs")]
    pub max_cache_ttl_secs: u64,
}

const fn default_timeout_secs() -> u64 {
    5
}

const fn default_min_cache_ttl_secs() -> u64 {
    60
}

const fn default_max_cache_ttl_secs() -> u64 {
    3600
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            cache_ttl_secs: None,
            min_cache_ttl_secs: default_min_cache_ttl_secs(),
            max_cache_ttl_secs: default_max_cache_ttl_secs(),
        }
    }
}

/// A mail exchange host named by an MX record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailServer {
    /// The exchange hostname, as returned by DNS.
    pub host: String,
    /// MX preference (lower value = higher priority).
    pub priority: u16,
}

impl MailServer {
    #[must_use]
    pub fn new(host: impl Into<String>, priority: u16) -> Self {
        Self {
            host: host.into(),
            priority,
        }
    }
}

/// The lookups needed to validate a mail domain.
///
/// Implemented over hickory by [`DnsResolver`]; tests substitute a fixed
/// in-memory zone.
#[async_trait]
pub trait Resolver: Send + Sync + std::fmt::Debug {
    /// MX hosts for `domain`, in the order DNS returned them.
    async fn mail_servers(&self, domain: &str) -> Result<Arc<Vec<MailServer>>, DnsError>;

    /// A and AAAA records for `host`.
    async fn lookup_ip(&self, host: &str) -> Result<Vec<IpAddr>, DnsError>;

    /// PTR hostnames for `ip`.
    async fn reverse_lookup(&self, ip: IpAddr) -> Result<Vec<String>, DnsError>;
}

#[derive(Debug, Clone)]
struct CachedResult {
    servers: Arc<Vec<MailServer>>,
    expires_at: Instant,
}

/// Hickory-backed resolver with a concurrent MX cache.
#[derive(Debug)]
pub struct DnsResolver {
    resolver: TokioResolver,
    cache: DashMap<String, CachedResult>,
    config: DnsConfig,
}

impl DnsResolver {
    /// Creates a resolver from the system DNS configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the system DNS configuration cannot be loaded.
    pub fn with_dns_config(dns_config: DnsConfig) -> Result<Self, DnsError> {
        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(dns_config.timeout_secs);

        let resolver = TokioResolver::builder(TokioConnectionProvider::default())
            .map_err(|e| DnsError::Init(e.to_string()))?
            .with_options(opts)
            .build();

        Ok(Self {
            resolver,
            cache: DashMap::new(),
            config: dns_config,
        })
    }

    /// Creates a resolver against explicit name servers.
    #[must_use]
    pub fn with_resolver_config(
        resolver_config: ResolverConfig,
        opts: ResolverOpts,
        dns_config: DnsConfig,
    ) -> Self {
        let resolver =
            TokioResolver::builder_with_config(resolver_config, TokioConnectionProvider::default())
                .with_options(opts)
                .build();

        Self {
            resolver,
            cache: DashMap::new(),
            config: dns_config,
        }
    }

    fn cache_ttl(&self, dns_ttl: u32) -> Duration {
        let secs = self.config.cache_ttl_secs.unwrap_or_else(|| {
            u64::from(dns_ttl).clamp(
                self.config.min_cache_ttl_secs,
                self.config.max_cache_ttl_secs,
            )
        });
        Duration::from_secs(secs)
    }

    async fn mail_servers_uncached(
        &self,
        domain: &str,
    ) -> Result<(Vec<MailServer>, u32), DnsError> {
        let mx_lookup = self.resolver.mx_lookup(domain).await.map_err(|err| {
            warn!("MX lookup failed for {domain}: {err}");
            DnsError::from_resolve(domain, "MX", &err)
        })?;

        let min_ttl = mx_lookup
            .as_lookup()
            .records()
            .iter()
            .map(hickory_resolver::proto::rr::Record::ttl)
            .min()
            .unwrap_or(300);

        let servers: Vec<MailServer> = mx_lookup
            .iter()
            .map(|mx| {
                let host = mx.exchange().to_utf8();
                let priority = mx.preference();
                debug!("Found MX record: {host} (priority: {priority})");
                MailServer::new(host, priority)
            })
            .collect();

        if servers.is_empty() {
            return Err(DnsError::NoRecords {
                name: domain.to_string(),
                record: "MX",
            });
        }

        Ok((servers, min_ttl))
    }
}

#[async_trait]
impl Resolver for DnsResolver {
    async fn mail_servers(&self, domain: &str) -> Result<Arc<Vec<MailServer>>, DnsError> {
        if let Some(cached) = self.cache.get(domain) {
            if cached.expires_at > Instant::now() {
                debug!("Cache hit for {domain}, {} server(s)", cached.servers.len());
                return Ok(Arc::clone(&cached.servers));
            }
            debug!("Cache entry expired for {domain}");
        }

        let (servers, dns_ttl) = self.mail_servers_uncached(domain).await?;
        let servers = Arc::new(servers);
        let ttl = self.cache_ttl(dns_ttl);

        self.cache.insert(
            domain.to_string(),
            CachedResult {
                servers: Arc::clone(&servers),
                expires_at: Instant::now() + ttl,
            },
        );

        debug!(
            "Cached MX result for {domain}, DNS TTL: {dns_ttl}s, cache TTL: {}s",
            ttl.as_secs()
        );
        Ok(servers)
    }

    async fn lookup_ip(&self, host: &str) -> Result<Vec<IpAddr>, DnsError> {
        let lookup = self
            .resolver
            .lookup_ip(host)
            .await
            .map_err(|err| DnsError::from_resolve(host, "A/AAAA", &err))?;

        Ok(lookup.iter().collect())
    }

    async fn reverse_lookup(&self, ip: IpAddr) -> Result<Vec<String>, DnsError> {
        let name = ip.to_string();
        let lookup = self
            .resolver
            .reverse_lookup(ip)
            .await
            .map_err(|err| DnsError::from_resolve(&name, "PTR", &err))?;

        Ok(lookup.iter().map(|ptr| ptr.0.to_utf8()).collect())
    }
}
