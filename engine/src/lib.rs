pub mod broadcaster;
pub mod evaluator;
pub mod events;
pub mod locks;
pub mod poller;
pub mod registry;

pub use broadcaster::{Broadcaster, DeliveryReport, DEFAULT_QUEUE_CAPACITY};
pub use evaluator::{AlertEvaluator, EvaluationReport};
pub use events::{ClientMessage, PriceQuote, ServerEvent};
pub use locks::KeyedLocks;
pub use poller::{Poller, PollerConfig, TickReport};
pub use registry::{ConnectionId, Subscription, SubscriptionRegistry};
