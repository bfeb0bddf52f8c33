//! Best-effort incident reporting.
//!
//! When a delivery fails terminally the incident is logged at `error` level
//! first, then recorded on the remote: either as a new failure ticket or as
//! a comment on a configured item. Nothing in this module returns an error;
//! a notification that cannot be delivered is logged and dropped.

use std::error::Error;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::remote::{CommentFormat, NewItem, RemoteEffect, RemoteInterpreter, RemoteResponse};
use crate::types::{DeliveryId, WorkItemId};
use crate::webhooks::SourceEvent;

use super::report::BatchReport;

/// Everything known about a failed delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incident {
    pub event_kind: String,
    pub delivery_id: DeliveryId,
    pub repository: Option<String>,
    pub git_ref: Option<String>,
    pub actor: String,
    /// The error and each of its sources, outermost first.
    pub error_chain: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

impl Incident {
    pub fn new(event: &SourceEvent, delivery_id: &DeliveryId, err: &(dyn Error + 'static)) -> Self {
        Self {
            error_chain: error_chain(err),
            ..Self::from_event(event, delivery_id)
        }
    }

    /// An incident for a batch that completed with failed sub-operations.
    pub fn partial(event: &SourceEvent, delivery_id: &DeliveryId, report: &BatchReport) -> Self {
        let mut error_chain = vec![format!(
            "{} of {} operations failed",
            report.failures.len(),
            report.failures.len() + report.succeeded()
        )];
        error_chain.extend(report.failures.iter().map(ToString::to_string));
        Self {
            error_chain,
            ..Self::from_event(event, delivery_id)
        }
    }

    fn from_event(event: &SourceEvent, delivery_id: &DeliveryId) -> Self {
        let meta = event.meta();
        Self {
            event_kind: event.kind().to_string(),
            delivery_id: delivery_id.clone(),
            repository: meta.repository.as_ref().map(|r| r.to_string()),
            git_ref: event.git_ref().map(str::to_string),
            actor: meta.actor.clone(),
            error_chain: Vec::new(),
            occurred_at: Utc::now(),
        }
    }

    /// One-line summary, used as the log message and alert comment.
    pub fn summary(&self) -> String {
        format!(
            "Sync of {} event {} failed: {}",
            self.event_kind,
            self.delivery_id,
            self.error_chain.first().map(String::as_str).unwrap_or("unknown error")
        )
    }
}

fn error_chain(err: &(dyn Error + 'static)) -> Vec<String> {
    let mut chain = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push(cause.to_string());
        source = cause.source();
    }
    chain
}

/// What the notifier managed to record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// No remote was available; the incident is in the log only.
    LoggedOnly,
    /// A comment was added to the configured failure item.
    Commented(WorkItemId),
    /// A new failure ticket was created.
    TicketCreated(WorkItemId),
    /// The remote rejected the notification; the incident is in the log only.
    Failed,
}

/// Ticket title, e.g. `GitHub Sync Failure - 2024-03-01 12:00`.
pub fn ticket_name(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{prefix} Sync Failure - {}", at.format("%Y-%m-%d %H:%M"))
}

/// Wiki-formatted ticket description.
pub fn ticket_description(config: &Config, incident: &Incident) -> String {
    let mut lines = vec![
        "__Automated sync failure report__".to_string(),
        String::new(),
        format!("* Event: {}", incident.event_kind),
        format!("* Delivery: {}", incident.delivery_id),
        format!(
            "* Repository: {}",
            incident.repository.as_deref().unwrap_or("(none)")
        ),
        format!("* Ref: {}", incident.git_ref.as_deref().unwrap_or("(none)")),
        format!("* Actor: {}", incident.actor),
        format!("* Instance: {}", config.remote_url),
        format!("* Project: {}", config.project_id),
        format!("* Time: {}", incident.occurred_at.to_rfc3339()),
        String::new(),
        "__Error__".to_string(),
    ];
    lines.extend(
        incident
            .error_chain
            .iter()
            .enumerate()
            .map(|(depth, cause)| format!("{} {cause}", "#".repeat(depth + 1))),
    );
    lines.join("\n")
}

/// Records `incident`. Never fails.
///
/// `remote` is `None` when the failure happened before a run context could
/// be established; the incident is then only logged.
pub async fn notify<R: RemoteInterpreter>(
    remote: Option<&R>,
    config: &Config,
    incident: &Incident,
) -> NotifyOutcome {
    error!(
        delivery_id = %incident.delivery_id,
        event = %incident.event_kind,
        repository = incident.repository.as_deref().unwrap_or("-"),
        git_ref = incident.git_ref.as_deref().unwrap_or("-"),
        actor = %incident.actor,
        error = %incident.error_chain.join(": "),
        "Sync failed"
    );

    let Some(remote) = remote else {
        return NotifyOutcome::LoggedOnly;
    };

    match config.failure_item_id {
        Some(item) => comment_on_existing(remote, config, incident, item).await,
        None => create_ticket(remote, config, incident).await,
    }
}

async fn comment_on_existing<R: RemoteInterpreter>(
    remote: &R,
    config: &Config,
    incident: &Incident,
    item: WorkItemId,
) -> NotifyOutcome {
    let effect = RemoteEffect::PostComment {
        item,
        body: ticket_description(config, incident),
        format: CommentFormat::Wiki,
    };
    match remote.interpret(effect).await {
        Ok(_) => {
            info!(%item, "Recorded failure on existing item");
            NotifyOutcome::Commented(item)
        }
        Err(e) => {
            warn!(%item, error = %e, "Could not record failure on existing item");
            NotifyOutcome::Failed
        }
    }
}

async fn create_ticket<R: RemoteInterpreter>(
    remote: &R,
    config: &Config,
    incident: &Incident,
) -> NotifyOutcome {
    let request = NewItem {
        name: ticket_name(&config.mirror_name_prefix, incident.occurred_at),
        description: ticket_description(config, incident),
        priority: "High".to_string(),
        status: "New".to_string(),
    };
    let item = match remote.interpret(RemoteEffect::CreateItem(request)).await {
        Ok(RemoteResponse::ItemCreated(item)) => item,
        Ok(other) => {
            warn!(response = ?other, "Unexpected response creating failure ticket");
            return NotifyOutcome::Failed;
        }
        Err(e) => {
            warn!(error = %e, "Could not create failure ticket");
            return NotifyOutcome::Failed;
        }
    };
    info!(%item, "Created failure ticket");

    let alert = RemoteEffect::PostComment {
        item,
        body: incident.summary(),
        format: CommentFormat::PlainText,
    };
    if let Err(e) = remote.interpret(alert).await {
        warn!(%item, error = %e, "Could not add alert comment to failure ticket");
    }
    NotifyOutcome::TicketCreated(item)
}
