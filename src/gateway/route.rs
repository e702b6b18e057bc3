//! Gateway routes: a path prefix bound to a logical service.

use crate::config::{RetryConfig, RouteConfig, ValidationError};
use crate::gateway::partition::{PartitionKeyError, PartitionRule};
use crate::proxy::ProxyRequestContext;
use crate::resilience::RetryOptions;
use crate::resolver::ServiceIdentity;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("route '{0}': path prefix must start with '/'")]
    InvalidPrefix(String),

    #[error("route '{0}': only one partition key resolver may be set")]
    ConflictingPartitionRules(String),

    #[error("route '{0}': service name must not be empty")]
    EmptyServiceName(String),

    #[error("route '{0}': retry options must be set, including the 5xx retry policy")]
    MissingRetryPolicy(String),

    #[error("route '{route}': {source}")]
    Retry {
        route: String,
        source: ValidationError,
    },
}

/// One entry of the gateway table.
#[derive(Debug, Clone)]
pub struct GatewayRoute {
    prefix: String,
    service_name: String,
    listener: Option<String>,
    partition: PartitionRule,
    retry: RetryOptions,
}

impl GatewayRoute {
    pub fn builder(prefix: impl Into<String>, service_name: impl Into<String>) -> GatewayRouteBuilder {
        GatewayRouteBuilder {
            prefix: prefix.into(),
            service_name: service_name.into(),
            listener: None,
            named: None,
            int64: None,
            retry: None,
        }
    }

    /// Compile a configured route. Retry fields the route leaves unset come
    /// from `global`.
    pub fn from_config(config: &RouteConfig, global: &RetryConfig) -> Result<Self, RouteError> {
        let merged = config.retries.as_ref().map(|retries| retries.merged_over(global));
        let retry = RetryOptions::from_config(merged.as_ref().unwrap_or(global), None).map_err(
            |source| RouteError::Retry {
                route: config.path_match.clone(),
                source,
            },
        )?;

        let mut builder = Self::builder(&config.path_match, &config.service_name).retry_options(retry);
        if let Some(listener) = &config.listener_name {
            builder = builder.listener(listener);
        }
        builder.named = config.named_partition.clone().map(PartitionRule::named_from);
        builder.int64 = config.int64_partition.clone().map(PartitionRule::int64_from);
        builder.build()
    }

    /// Normalized prefix, without trailing slash. The root route is `""`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn listener(&self) -> Option<&str> {
        self.listener.as_deref()
    }

    pub fn retry_options(&self) -> &RetryOptions {
        &self.retry
    }

    /// Length of the inbound path portion matched by this route, if it matches.
    ///
    /// Matching is segment-aware and ASCII case-insensitive: `/api` matches
    /// `/api` and `/API/x` but not `/apix`.
    pub fn match_len(&self, path: &str) -> Option<usize> {
        let len = self.prefix.len();
        let head = path.get(..len)?;
        if !head.eq_ignore_ascii_case(&self.prefix) {
            return None;
        }
        match path.as_bytes().get(len) {
            None | Some(b'/') => Some(len),
            Some(_) => None,
        }
    }

    pub fn identity(&self, ctx: &ProxyRequestContext) -> Result<ServiceIdentity, PartitionKeyError> {
        Ok(ServiceIdentity::new(self.service_name.clone(), self.partition.key(ctx)?))
    }
}

/// Programmatic route construction.
pub struct GatewayRouteBuilder {
    prefix: String,
    service_name: String,
    listener: Option<String>,
    named: Option<PartitionRule>,
    int64: Option<PartitionRule>,
    retry: Option<RetryOptions>,
}

impl GatewayRouteBuilder {
    pub fn listener(mut self, listener: impl Into<String>) -> Self {
        self.listener = Some(listener.into());
        self
    }

    pub fn named_partition<K>(mut self, key: K) -> Self
    where
        K: Fn(&ProxyRequestContext) -> Option<String> + Send + Sync + 'static,
    {
        self.named = Some(PartitionRule::named(key));
        self
    }

    pub fn int64_partition<K>(mut self, key: K) -> Self
    where
        K: Fn(&ProxyRequestContext) -> Option<i64> + Send + Sync + 'static,
    {
        self.int64 = Some(PartitionRule::int64(key));
        self
    }

    pub fn retry_options(mut self, retry: RetryOptions) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Retry options are required: whether 5xx responses are retried has no default.
    pub fn build(self) -> Result<GatewayRoute, RouteError> {
        if !self.prefix.starts_with('/') {
            return Err(RouteError::InvalidPrefix(self.prefix));
        }
        if self.service_name.trim().is_empty() {
            return Err(RouteError::EmptyServiceName(self.prefix));
        }
        let Some(retry) = self.retry else {
            return Err(RouteError::MissingRetryPolicy(self.prefix));
        };
        let partition = match (self.named, self.int64) {
            (Some(_), Some(_)) => return Err(RouteError::ConflictingPartitionRules(self.prefix)),
            (Some(rule), None) | (None, Some(rule)) => rule,
            (None, None) => PartitionRule::None,
        };

        Ok(GatewayRoute {
            prefix: self.prefix.trim_end_matches('/').to_string(),
            service_name: self.service_name,
            listener: self.listener,
            partition,
            retry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PartitionSource, RetryOverride};
    use crate::resilience::FailureKind;
    use std::time::Duration;

    fn route(prefix: &str) -> GatewayRoute {
        GatewayRoute::builder(prefix, "fabric:/App/Svc")
            .retry_options(RetryOptions::new(true))
            .build()
            .unwrap()
    }

    #[test]
    fn prefix_matching_is_segment_aware() {
        let api = route("/api/");
        assert_eq!(api.prefix(), "/api");
        assert_eq!(api.match_len("/api"), Some(4));
        assert_eq!(api.match_len("/api/items"), Some(4));
        assert_eq!(api.match_len("/API/items"), Some(4));
        assert_eq!(api.match_len("/apix"), None);
        assert_eq!(api.match_len("/ap"), None);
        assert_eq!(api.match_len("/other/api"), None);
    }

    #[test]
    fn root_route_matches_everything() {
        let root = route("/");
        assert_eq!(root.prefix(), "");
        assert_eq!(root.match_len("/"), Some(0));
        assert_eq!(root.match_len("/anything/at/all"), Some(0));
    }

    #[test]
    fn both_partition_rules_is_a_setup_error() {
        let err = GatewayRoute::builder("/orders", "fabric:/Shop/Orders")
            .named_partition(|_| Some("a".into()))
            .int64_partition(|_| Some(1))
            .retry_options(RetryOptions::new(false))
            .build()
            .unwrap_err();
        assert_eq!(err, RouteError::ConflictingPartitionRules("/orders".into()));
    }

    #[test]
    fn builder_rejects_bad_input() {
        assert!(matches!(
            GatewayRoute::builder("orders", "svc").build(),
            Err(RouteError::InvalidPrefix(_))
        ));
        assert!(matches!(
            GatewayRoute::builder("/orders", " ").build(),
            Err(RouteError::EmptyServiceName(_))
        ));
    }

    #[test]
    fn builder_requires_retry_policy() {
        let err = GatewayRoute::builder("/orders", "fabric:/Shop/Orders")
            .build()
            .unwrap_err();
        assert_eq!(err, RouteError::MissingRetryPolicy("/orders".into()));

        let route = GatewayRoute::builder("/orders", "fabric:/Shop/Orders")
            .retry_options(RetryOptions::new(false))
            .build()
            .unwrap();
        assert!(!route.retry_options().retry_status_errors);
    }

    #[test]
    fn config_route_inherits_global_status_policy() {
        let mut config = RouteConfig::new("/orders", "fabric:/Shop/Orders");
        config.listener_name = Some("api".into());
        config.named_partition = Some(PartitionSource::Header("x-tenant".into()));
        config.retries = Some(RetryOverride {
            max_retry_count: Some(1),
            ..RetryOverride::default()
        });
        let global = RetryConfig {
            retry_status_errors: Some(false),
            ..RetryConfig::default()
        };

        let route = GatewayRoute::from_config(&config, &global).unwrap();
        assert_eq!(route.listener(), Some("api"));
        assert_eq!(route.retry_options().max_retry_count, 1);
        assert!(!route.retry_options().retry_status_errors);
    }

    #[test]
    fn config_route_override_keeps_global_tuning() {
        let mut config = RouteConfig::new("/orders", "fabric:/Shop/Orders");
        config.retries = Some(RetryOverride {
            do_not_retry: Some(vec![FailureKind::Timeout]),
            ..RetryOverride::default()
        });
        let global = RetryConfig {
            max_retry_count: 2,
            max_retry_backoff_ms: 40,
            retry_status_errors: Some(true),
            ..RetryConfig::default()
        };

        let options = GatewayRoute::from_config(&config, &global).unwrap().retry_options().clone();
        assert_eq!(options.max_retry_count, 2);
        assert_eq!(options.max_retry_backoff, Duration::from_millis(40));
        assert!(options.retry_status_errors);
        assert!(!options.is_retryable(FailureKind::Timeout));
    }

    #[test]
    fn config_route_without_status_policy_fails() {
        let config = RouteConfig::new("/orders", "fabric:/Shop/Orders");
        let err = GatewayRoute::from_config(&config, &RetryConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            RouteError::Retry {
                source: ValidationError::MissingStatusRetryPolicy,
                ..
            }
        ));
    }
}
