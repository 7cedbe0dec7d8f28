pub mod listing;
pub mod patch;
pub mod profile;
