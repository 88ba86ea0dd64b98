pub mod activation;
pub mod checkout;
pub mod discounts;
pub mod dispatch;
pub mod init;
pub mod payments;
pub mod pricing;
pub mod schedule;
pub mod scheduler;
