/// Emails the service knows how to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    EmailVerification,
    PasswordReset,
}

/// Values substituted into a template.
#[derive(Debug, Clone)]
pub struct MailContext {
    pub email: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub fn render(template: Template, ctx: &MailContext, public_url: &str, to: &str) -> OutgoingEmail {
    let (subject, body) = match template {
        Template::EmailVerification => (
            "Verify your account".to_string(),
            format!(
                "Hello {email},\n\n\
                 Please confirm this address by opening the link below:\n\n\
                 {public_url}/verify-email/{token}\n\n\
                 If you did not create an account you can ignore this message.\n",
                email = ctx.email,
                token = ctx.token,
            ),
        ),
        Template::PasswordReset => (
            "Reset your password".to_string(),
            format!(
                "Hello {email},\n\n\
                 Someone asked to reset the password for this account.\n\
                 Use the link below to choose a new one:\n\n\
                 {public_url}/password-reset/{token}\n\n\
                 If it wasn't you, no action is needed.\n",
                email = ctx.email,
                token = ctx.token,
            ),
        ),
    };
    OutgoingEmail {
        to: to.to_string(),
        subject,
        body,
    }
}
