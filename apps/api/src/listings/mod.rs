pub mod handlers;
pub mod repository;
pub mod validation;

pub use repository::{ListingRepository, PgListingRepository};
