//! Database entities.

pub mod idea;
pub mod product;
pub mod report;
pub mod submission;
pub mod user;

pub use idea::Entity as Idea;
pub use product::Entity as Product;
pub use report::Entity as Report;
pub use submission::Entity as Submission;
pub use user::Entity as User;
