pub mod audio;
pub mod conversation;
pub mod error;
pub mod http;
pub mod realtime;

// Re-export commonly used types for convenience
pub use audio::{AudioCapture, FileCapture};
pub use conversation::{ConversationLog, Message, Role};
pub use error::{GatewayError, GatewayResult};
pub use self::http::{ChatClient, ChatOptions, ChatReply};
pub use realtime::{
    CloseDiagnosis, ConnectionState, RealtimeClient, RealtimeEvent, RealtimeEvents, SessionOptions,
};
