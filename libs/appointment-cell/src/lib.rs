pub mod handlers;
pub mod router;
pub mod models;
pub mod policy;
pub mod services;

pub use models::*;
pub use policy::PolicyRules;
pub use services::*;
