mod dispatcher;
pub mod mailer;
mod templates;

pub use dispatcher::Dispatcher;
pub use templates::{MailContext, Template};
