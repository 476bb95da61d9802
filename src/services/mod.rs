pub mod analytics;
pub mod cache;
pub mod chain;
pub mod conversion;
pub mod deeplink;
pub mod payments;
pub mod poller;
pub mod rate_feed;
pub mod signer;
pub mod verifier;

pub use analytics::Analytics;
pub use cache::CacheService;
pub use chain::{ChainService, InMemoryLedger, TransactionSource};
pub use deeplink::{DeeplinkCodec, DeeplinkIntent};
pub use payments::PaymentService;
pub use poller::{PaymentPoller, PollOutcome};
pub use rate_feed::{HttpRateFeed, RateFeed, RateService, StaticRateFeed};
pub use signer::RequestSigner;
pub use verifier::PaymentVerifier;
