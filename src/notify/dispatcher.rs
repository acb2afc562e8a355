use std::sync::Arc;

use tokio::sync::{
    mpsc::{self, error::TrySendError},
    Semaphore,
};
use tracing::{debug, error, info, warn};

use super::{
    mailer::Mailer,
    templates::{render, MailContext, OutgoingEmail, Template},
};

/// Fire-and-forget email sender.
///
/// `send` renders and enqueues without waiting; a background task drains the
/// queue and runs at most `workers` deliveries at a time. Delivery failures
/// and queue overflow are logged and otherwise dropped.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<OutgoingEmail>,
    public_url: Arc<str>,
}

impl Dispatcher {
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        mailer: Arc<dyn Mailer>,
        workers: usize,
        capacity: usize,
        public_url: &str,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(run(rx, mailer, workers.max(1)));
        Self {
            tx,
            public_url: Arc::from(public_url),
        }
    }

    pub fn send(&self, template: Template, ctx: MailContext, recipient: &str) {
        let email = render(template, &ctx, &self.public_url, recipient);
        match self.tx.try_send(email) {
            Ok(()) => debug!(to = %recipient, ?template, "email queued"),
            Err(TrySendError::Full(email)) => {
                warn!(to = %email.to, ?template, "mail queue full; email dropped")
            }
            Err(TrySendError::Closed(email)) => {
                error!(to = %email.to, ?template, "mail dispatcher stopped; email dropped")
            }
        }
    }
}

async fn run(mut rx: mpsc::Receiver<OutgoingEmail>, mailer: Arc<dyn Mailer>, workers: usize) {
    let permits = Arc::new(Semaphore::new(workers));
    info!(workers, "mail dispatcher started");
    while let Some(email) = rx.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let mailer = mailer.clone();
        tokio::spawn(async move {
            let _permit = permit;
            match mailer.deliver(&email).await {
                Ok(()) => info!(to = %email.to, subject = %email.subject, "email delivered"),
                Err(e) => warn!(to = %email.to, error = %e, "email delivery failed"),
            }
        });
    }
    debug!("mail dispatcher stopped");
}
