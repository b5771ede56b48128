pub mod event;
pub mod notification;
pub mod organizer;
pub mod participant;
pub mod registration;

pub use event::*;
pub use notification::*;
pub use organizer::*;
pub use participant::*;
pub use registration::*;

use crate::utils::error::AppError;

pub(crate) fn validate_name_and_email(name: &str, email: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::ValidationError("Name is required".to_string()));
    }
    let email = email.trim();
    let valid_email = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    };
    if !valid_email {
        return Err(AppError::ValidationError(format!(
            "'{}' is not a valid email address",
            email
        )));
    }
    Ok(())
}
