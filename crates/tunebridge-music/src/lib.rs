pub mod converter;
pub mod events;
pub mod parsers;
pub mod platform;
pub mod pool;
pub mod resolver;

#[cfg(test)]
mod testing;

pub use converter::{Conversion, ConversionOutcome, Converter, Freshness};
pub use events::{
    BroadcastNotifier, EventDispatcher, FanoutNotifier, LogNotifier, Notifier, NotifierEvent,
    NotifyError, WebhookNotifier,
};
pub use platform::{
    Catalog, CatalogPlatform, PlatformRegistry, PlatformService, canonical_platform, display_name,
};
pub use pool::{MatchOutcome, MatchingPool, PoolConfig, TrackJob};
pub use resolver::{LinkResolver, UrlLinkResolver};
