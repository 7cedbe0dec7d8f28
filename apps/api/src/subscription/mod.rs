// Tier changes. Payment is mocked: a non-empty payment reference is accepted
// as proof of payment and the tier flips immediately.

pub mod handlers;
