//! Database models, one file per table family, re-exported at `crate::db::models`.

pub mod discount;
pub mod email_log;
pub mod notification;
pub mod order;
pub mod property;
pub mod user;

pub use self::discount::*;
pub use self::email_log::*;
pub use self::notification::*;
pub use self::order::*;
pub use self::property::*;
pub use self::user::*;
