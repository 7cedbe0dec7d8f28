// Tier-based access control: policy, quotas and the paywall decision.
// Everything here except the handlers is pure.

pub mod handlers;
pub mod paywall;
pub mod policy;
pub mod quota;

pub use quota::{Quota, QuotaConfig, QuotaKind};
