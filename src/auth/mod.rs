//! Authentication primitives: token types, the token store seam, and the
//! re-authentication state signal.

mod signal;
mod store;
mod tokens;

pub use signal::{AuthStateSignal, Subscription};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use tokens::{AccessToken, RefreshToken, TokenPair};
