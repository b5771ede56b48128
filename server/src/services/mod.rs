pub mod lifecycle;
pub mod notifications;

pub use lifecycle::RegistrationEngine;
pub use notifications::NotificationGenerator;
