pub mod audit;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod domain;
pub mod gate;
pub mod moderation;
pub mod planner;
pub mod session;

pub use cache::BoundedCache;
pub use classifier::PatternClassifier;
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, RoutingConfig};
pub use domain::intent::{
    CategoryScores, ClassificationMethod, Intent, IntentMetadata, IntentResult, SupportType,
    TimePreference,
};
pub use domain::message::{ChannelId, Message, MessageId, UserId};
pub use domain::response::{HandlerKind, HandlerResponse, OutboundResponse, SlotOption};
pub use domain::session::{
    ConversationSession, MessagePlatform, SenderRole, SessionEntry, SessionId, SessionState,
};
pub use gate::{EscalationGate, GateDecision};
pub use moderation::{ModerationFilter, ModerationResult};
pub use planner::{ExecutionPlan, ExecutionPlanner};
pub use session::{InMemorySessionStore, SessionStore, SessionStoreError};
