pub mod handlers;
pub mod repository;
pub mod sync;

pub use repository::{PgProfileRepository, ProfileRepository, RepoError};
pub use sync::ProfileSynchronizer;
