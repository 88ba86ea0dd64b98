pub mod discount;
pub mod email_log;
pub mod notification;
pub mod order;
pub mod property;
pub mod user;

pub use discount::DiscountRepository;
pub use email_log::EmailLogRepository;
pub use notification::NotificationRepository;
pub use order::OrderRepository;
pub use property::PropertyRepository;
pub use user::UserRepository;
