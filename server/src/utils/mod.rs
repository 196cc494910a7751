pub mod error;
pub mod ids;
pub mod money;
pub mod response;
pub mod retry;

pub use error::{AppError, AppResult};
