//! SOS signals: incident, volunteer task and delayed escalation.

use chrono::Utc;
use tracing::{info, warn};

use super::{with_entry, CrowdRepository, AVAILABLE_VOLUNTEER};
use crate::models::*;

fn emergency_message(sos_type: SosType, source_id: &str) -> String {
    match sos_type {
        SosType::Panic => format!(
            "🚨 URGENT: Panic emergency reported by visitor {} - Immediate response required!",
            source_id
        ),
        SosType::Medical => format!(
            "🏥 MEDICAL: Health emergency reported by visitor {} - Medical team needed!",
            source_id
        ),
        SosType::Security => format!(
            "🔒 SECURITY: Safety threat reported by visitor {} - Security response required!",
            source_id
        ),
    }
}

fn task_title(sos_type: SosType) -> &'static str {
    match sos_type {
        SosType::Panic => "🚨 URGENT: Panic Emergency Response",
        SosType::Medical => "🏥 Medical Emergency Response",
        SosType::Security => "🔒 Security Threat Response",
    }
}

impl CrowdRepository {
    /// Raise an SOS from `source_id` at the given position.
    ///
    /// Appends one incident and one pending volunteer task, records the
    /// alert and schedules the escalation check for the task.
    pub fn log_sos(&self, sos_type: SosType, source_id: &str, source_role: UserRole, lat: f64, lng: f64) -> SosAlert {
        let ts = self.ids.next();
        let alert_id = format!("sos-{}", ts);
        let task_id = format!("task-{}", ts);
        let message = emergency_message(sos_type, source_id);

        self.push_incident(Incident::new(alert_id.clone(), message.clone(), sos_type.severity()));

        let location = TaskLocation::Coordinates { lat, lng };
        let priority = match sos_type {
            SosType::Panic => TaskPriority::Critical,
            _ => TaskPriority::High,
        };
        let mut task = TaskItem::new(
            task_id.clone(),
            task_title(sos_type),
            AVAILABLE_VOLUNTEER,
            location.clone(),
            TaskStatus::Pending,
            priority,
        );
        task.emergency_type = Some(sos_type);
        task.visitor_location = Some(location.to_string());
        task.message = Some(message);
        self.push_task(task);

        let alert = SosAlert {
            id: alert_id,
            sos_type,
            user_id: source_id.to_string(),
            user_role: source_role,
            lat,
            lng,
            timestamp: Utc::now(),
            status: SosStatus::Active,
            task_id: Some(task_id.clone()),
        };
        let recorded = alert.clone();
        self.sos_alerts.update(move |list| with_entry(list, recorded));

        let repo = self.clone();
        let source = source_id.to_string();
        let check_task = task_id.clone();
        self.scheduler
            .schedule(task_id, self.config.escalation_delay(), async move {
                repo.escalate_if_unanswered(&check_task, sos_type, &source, ts);
            });

        info!(
            alert = %alert.id,
            sos_type = sos_type.name(),
            source = source_id,
            role = source_role.name(),
            "SOS logged"
        );
        alert
    }

    /// Raise an SOS described by an alert from a device.
    pub fn send_sos(&self, alert: &SosAlert) -> SosAlert {
        self.log_sos(alert.sos_type, &alert.user_id, alert.user_role, alert.lat, alert.lng)
    }

    /// A volunteer picks up the alert: its task moves to InProgress.
    ///
    /// Returns false if the alert is unknown.
    pub fn respond_to_sos(&self, alert_id: &str, volunteer_id: &str) -> bool {
        let Some(alert) = self.find_sos(alert_id) else {
            warn!(alert = alert_id, "Cannot respond to unknown SOS");
            return false;
        };
        if let Some(task_id) = alert.task_id.as_deref() {
            self.accept_task(task_id);
        }
        self.set_sos_status(alert_id, SosStatus::Responded);
        info!(alert = alert_id, volunteer = volunteer_id, "SOS responded");
        true
    }

    /// Escalate an alert by hand.
    pub fn escalate_sos(&self, alert_id: &str) {
        self.push_incident(Incident::new(
            format!("esc-{}", alert_id),
            format!("Escalation requested for SOS {}", alert_id),
            Severity::Red,
        ));
        if self.find_sos(alert_id).is_some() {
            self.set_sos_status(alert_id, SosStatus::Escalated);
        }
        warn!(alert = alert_id, "SOS escalated manually");
    }

    /// Alerts that are not resolved yet.
    pub fn active_sos(&self) -> Vec<SosAlert> {
        self.sos_alerts.with(|list| {
            list.iter()
                .filter(|a| a.status != SosStatus::Resolved)
                .cloned()
                .collect()
        })
    }

    fn escalate_if_unanswered(&self, task_id: &str, sos_type: SosType, source_id: &str, ts: i64) {
        if self.task_status(task_id) != Some(TaskStatus::Pending) {
            return;
        }
        self.push_incident(Incident::new(
            format!("esc-{}", ts),
            format!(
                "Escalation: No response yet to {} SOS from {}. Supervisors notified.",
                sos_type, source_id
            ),
            Severity::Red,
        ));
        self.set_sos_status_for_task(task_id, SosStatus::Escalated);
        warn!(task = task_id, sos_type = sos_type.name(), source = source_id, "SOS escalated");
    }

    fn find_sos(&self, alert_id: &str) -> Option<SosAlert> {
        self.sos_alerts
            .with(|list| list.iter().find(|a| a.id == alert_id).cloned())
    }

    fn set_sos_status(&self, alert_id: &str, status: SosStatus) {
        self.sos_alerts.update(|list| {
            list.iter()
                .map(|a| if a.id == alert_id { SosAlert { status, ..a.clone() } } else { a.clone() })
                .collect()
        });
    }

    pub(crate) fn set_sos_status_for_task(&self, task_id: &str, status: SosStatus) {
        let alert_id = self.sos_alerts.with(|list| {
            list.iter()
                .find(|a| a.task_id.as_deref() == Some(task_id))
                .map(|a| a.id.clone())
        });
        if let Some(alert_id) = alert_id {
            self.set_sos_status(&alert_id, status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn escalations(repo: &CrowdRepository) -> usize {
        repo.incidents()
            .get()
            .iter()
            .filter(|i| i.message.starts_with("Escalation: No response"))
            .count()
    }

    #[tokio::test]
    async fn test_log_sos_adds_incident_and_task() {
        let repo = CrowdRepository::default();
        let incidents_before = repo.incidents().get().len();
        let tasks_before = repo.tasks().get().len();

        let alert = repo.log_sos(SosType::Medical, "visitor7", UserRole::Visitor, 25.4358123, 81.8463);

        let incidents = repo.incidents().get();
        let tasks = repo.tasks().get();
        assert_eq!(incidents.len(), incidents_before + 1);
        assert_eq!(tasks.len(), tasks_before + 1);

        let incident = incidents.last().unwrap();
        assert_eq!(incident.id, alert.id);
        assert_eq!(incident.severity, Severity::Yellow);

        let task = tasks.last().unwrap();
        assert_eq!(Some(task.id.as_str()), alert.task_id.as_deref());
        assert_eq!(task.emergency_type, Some(SosType::Medical));
        assert_eq!(task.priority, TaskPriority::High);
        assert_eq!(task.location.to_string(), "25.43581, 81.84630");
        assert_eq!(task.visitor_location.as_deref(), Some("25.43581, 81.84630"));
        assert_eq!(task.message.as_deref(), Some(incident.message.as_str()));
    }

    #[tokio::test]
    async fn test_panic_is_critical_and_red() {
        let repo = CrowdRepository::default();
        let alert = repo.log_sos(SosType::Panic, "v1", UserRole::Visitor, 0.0, 0.0);
        let task = repo.tasks().get().into_iter().last().unwrap();
        assert_eq!(task.priority, TaskPriority::Critical);
        assert_eq!(task.priority.to_string(), "CRITICAL");
        assert_eq!(repo.incidents().get().last().unwrap().severity, Severity::Red);
        assert_eq!(alert.status, SosStatus::Active);
    }

    #[tokio::test]
    async fn test_rapid_sos_get_distinct_ids() {
        let repo = CrowdRepository::default();
        let a = repo.log_sos(SosType::Security, "v1", UserRole::Visitor, 0.0, 0.0);
        let b = repo.log_sos(SosType::Security, "v1", UserRole::Visitor, 0.0, 0.0);
        assert_ne!(a.id, b.id);
        assert_eq!(repo.active_sos().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_sos_escalates_once() {
        let repo = CrowdRepository::default();
        let alert = repo.log_sos(SosType::Panic, "visitor2", UserRole::Visitor, 20.59, 78.96);

        tokio::time::sleep(Duration::from_secs(19)).await;
        assert_eq!(escalations(&repo), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(escalations(&repo), 1);
        let escalation = repo.incidents().get().into_iter().last().unwrap();
        assert_eq!(escalation.severity, Severity::Red);
        assert!(escalation.message.contains("Panic SOS from visitor2"));
        assert_eq!(repo.sos_alerts().get()[0].status, SosStatus::Escalated);
        assert_eq!(alert.id.trim_start_matches("sos-"), escalation.id.trim_start_matches("esc-"));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(escalations(&repo), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_accepted_sos_does_not_escalate() {
        let repo = CrowdRepository::default();
        let alert = repo.log_sos(SosType::Security, "visitor4", UserRole::Visitor, 0.0, 0.0);
        let task_id = alert.task_id.clone().unwrap();
        assert!(repo.scheduler().is_pending(&task_id));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(repo.accept_task(&task_id));
        assert!(!repo.scheduler().is_pending(&task_id));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(escalations(&repo), 0);
        assert_eq!(repo.sos_alerts().get()[0].status, SosStatus::Responded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_respond_and_complete() {
        let repo = CrowdRepository::default();
        let alert = repo.log_sos(SosType::Medical, "visitor5", UserRole::Visitor, 0.0, 0.0);

        assert!(repo.respond_to_sos(&alert.id, "volunteer1"));
        assert!(!repo.respond_to_sos("sos-0", "volunteer1"));
        let task_id = alert.task_id.unwrap();
        assert_eq!(repo.task_status(&task_id), Some(TaskStatus::InProgress));

        assert!(repo.complete_task(&task_id));
        assert!(repo.active_sos().is_empty());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(escalations(&repo), 0);
    }

    #[tokio::test]
    async fn test_manual_escalation() {
        let repo = CrowdRepository::default();
        let alert = repo.log_sos(SosType::Panic, "visitor1", UserRole::Visitor, 0.0, 0.0);
        repo.escalate_sos(&alert.id);

        let incident = repo.incidents().get().into_iter().last().unwrap();
        assert_eq!(incident.id, format!("esc-{}", alert.id));
        assert_eq!(incident.severity, Severity::Red);
        assert_eq!(repo.sos_alerts().get()[0].status, SosStatus::Escalated);
    }

    #[tokio::test]
    async fn test_send_sos_forwards_alert() {
        let repo = CrowdRepository::default();
        let request = SosAlert {
            id: String::new(),
            sos_type: SosType::Security,
            user_id: "volunteer1".to_string(),
            user_role: UserRole::Volunteer,
            lat: 20.5939,
            lng: 78.9631,
            timestamp: Utc::now(),
            status: SosStatus::Active,
            task_id: None,
        };
        let logged = repo.send_sos(&request);
        assert!(logged.id.starts_with("sos-"));
        assert_eq!(logged.user_role, UserRole::Volunteer);
        assert!(logged.task_id.is_some());
    }
}
