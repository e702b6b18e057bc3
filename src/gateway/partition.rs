//! Partition key derivation.

use std::fmt;
use std::sync::Arc;

use crate::config::PartitionSource;
use crate::proxy::ProxyRequestContext;
use crate::resolver::PartitionKey;

pub type NamedKeyFn = Arc<dyn Fn(&ProxyRequestContext) -> Option<String> + Send + Sync>;
pub type Int64KeyFn = Arc<dyn Fn(&ProxyRequestContext) -> Option<i64> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PartitionKeyError {
    #[error("cannot derive a {kind} partition key from the request")]
    Missing { kind: &'static str },
}

/// How a route turns a request into a partition key.
#[derive(Clone, Default)]
pub enum PartitionRule {
    /// Singleton service.
    #[default]
    None,
    Named(NamedKeyFn),
    Int64(Int64KeyFn),
}

impl PartitionRule {
    pub fn named<K>(key: K) -> Self
    where
        K: Fn(&ProxyRequestContext) -> Option<String> + Send + Sync + 'static,
    {
        PartitionRule::Named(Arc::new(key))
    }

    pub fn int64<K>(key: K) -> Self
    where
        K: Fn(&ProxyRequestContext) -> Option<i64> + Send + Sync + 'static,
    {
        PartitionRule::Int64(Arc::new(key))
    }

    /// Named rule reading the key from a declarative source.
    pub fn named_from(source: PartitionSource) -> Self {
        Self::named(move |ctx| read_source(&source, ctx))
    }

    /// Int64 rule reading the key from a declarative source.
    ///
    /// A value that does not parse as a signed 64-bit integer counts as missing.
    pub fn int64_from(source: PartitionSource) -> Self {
        Self::int64(move |ctx| read_source(&source, ctx)?.trim().parse().ok())
    }

    pub fn key(&self, ctx: &ProxyRequestContext) -> Result<PartitionKey, PartitionKeyError> {
        match self {
            PartitionRule::None => Ok(PartitionKey::None),
            PartitionRule::Named(key) => key(ctx)
                .map(PartitionKey::Named)
                .ok_or(PartitionKeyError::Missing { kind: "named" }),
            PartitionRule::Int64(key) => key(ctx)
                .map(PartitionKey::Int64)
                .ok_or(PartitionKeyError::Missing { kind: "int64" }),
        }
    }
}

impl fmt::Debug for PartitionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionRule::None => f.write_str("None"),
            PartitionRule::Named(_) => f.write_str("Named(..)"),
            PartitionRule::Int64(_) => f.write_str("Int64(..)"),
        }
    }
}

fn read_source(source: &PartitionSource, ctx: &ProxyRequestContext) -> Option<String> {
    let value = match source {
        PartitionSource::Header(name) => ctx
            .headers()
            .get(name.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        PartitionSource::Query(name) => ctx.query().and_then(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
        }),
        PartitionSource::PathSegment(index) => ctx
            .path()
            .split('/')
            .filter(|segment| !segment.is_empty())
            .nth(*index)
            .map(str::to_string),
        PartitionSource::Constant(value) => Some(value.clone()),
    };
    value.filter(|v| !v.is_empty())
}
