pub mod pool;
pub mod session;

pub use pool::create_pool;
pub use session::{begin_as, set_request_claims, SessionIdentity};
