pub mod audit_log;
pub mod notify;
pub mod trophy_award;

pub use audit_log::AuditLogObserver;
pub use notify::NotificationObserver;
pub use trophy_award::TrophyObserver;
