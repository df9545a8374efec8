//! Repositories: the stores behind the submission, product, user and report
//! services.

pub mod moderation;
pub mod product;
pub mod report;
pub mod submission;
pub mod user;

pub use moderation::ModerationRepository;
pub use product::{ProductFilter, ProductRepository};
pub use report::ReportRepository;
pub use submission::SubmissionRepository;
pub use user::UserRepository;
