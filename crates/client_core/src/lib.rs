pub mod gateway;
pub mod grouping;
pub mod history;
pub mod process;
pub mod reply;
pub mod resolve;
pub mod roster;
pub mod timeline;

pub use gateway::{
    ConnectionState, GatewayConfig, GatewaySession, GatewaySocket, GatewayTransport, Subscription,
    TungsteniteTransport,
};
pub use grouping::should_group;
pub use history::{ConversationFeed, FeedError, HistoryClient, RestHistoryClient};
pub use process::{process_messages, ProcessedMessage};
pub use reply::{resolve_reply, ReplyPreview};
pub use resolve::{resolve_identity, ConversationContext, ResolvedIdentity, ServerSnapshot};
pub use roster::{build_roster, RosterSection};
pub use timeline::{MessageWindow, PAGE_SIZE};
