mod session;
mod store;

pub use session::{SessionFlags, VERIFICATION_IDLE_TIMEOUT_MINUTES};
pub use store::LocalStore;

/// Storage key holding the user's Gemini API key.
pub const API_KEY: &str = "api_key";
