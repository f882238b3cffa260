pub mod bridge;
pub mod error;
pub mod events;
pub mod formatter;
pub mod llm_client;
pub mod recipe;
pub mod registry;
pub mod search;
pub mod session;
pub mod timer;
pub mod tools;
pub mod tracker;

pub use bridge::{
    BridgeCommand, BridgeEvent, BridgePeer, BridgeSender, RealtimeBridge, RealtimeProvider,
    SessionSetup,
};
pub use error::{BridgeErrorKind, SessionError};
pub use events::{ClientInput, ControlEvent, SessionOutput};
pub use recipe::{RecipeDocument, RecipeParseError};
pub use session::{
    CloseReason, ConnectionState, SessionConfig, SessionHandle, SessionOutcome, VoiceSession,
};
