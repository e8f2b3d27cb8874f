pub mod mailer;
pub mod templates;

pub use mailer::{MailError, Mailer};
pub use templates::Templates;
