//! Access tokens and the code-for-token exchange.

mod exchange;
mod tokens;

pub use exchange::{Exchanger, CROSS_ORIGIN_REJECTED};
pub use tokens::{Token, TokenResponse};
