//! flow-policies: sticky-session continuation rules.
//!
//! Both policies are constructed with a compiled filter and mutate flows
//! in place; neither owns a reference back to the dispatcher.

pub mod domain_match;
pub mod sticky_auth;
pub mod sticky_cookie;

pub use sticky_auth::StickyAuthState;
pub use sticky_cookie::StickyCookieState;
