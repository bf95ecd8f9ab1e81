//! Priority reservations for pregnant and elderly visitors.

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{local_time_label, with_entry, CrowdRepository, AVAILABLE_VOLUNTEER};
use crate::models::*;

/// Fallback location named in visitor notifications when a reservation has
/// no zone.
const DEFAULT_BATHING_GHAT: &str = "Triveni Bandh Prayag";

/// Proofs uploaded for a reservation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityDocs {
    pub user_id: String,
    pub id_proof: Option<String>,
    pub doctor_certificate: Option<String>,
}

/// Minutes from now until the slot for a zone at the given risk.
///
/// Busier zones get later slots; an unknown zone gets a middle offset.
pub fn slot_offset_minutes(zone_risk: Option<f32>) -> i64 {
    match zone_risk {
        None => 10,
        Some(risk) if risk > 0.7 => 30,
        Some(risk) if risk > 0.4 => 15,
        Some(_) => 5,
    }
}

fn reminder_key(reservation_id: &str) -> String {
    format!("rem-{}", reservation_id)
}

impl CrowdRepository {
    /// Book a slot for `reservation` based on the current risk of its zone.
    ///
    /// Stores the reservation as Active and raises an assistance task for
    /// volunteers. Returns the stored reservation.
    pub fn make_reservation(&self, reservation: Reservation) -> Reservation {
        let risk = self.zone_risks.with(|zones| {
            zones
                .iter()
                .find(|z| z.zone_id == reservation.zone)
                .map(|z| z.risk)
        });
        let offset = slot_offset_minutes(risk);
        let slot_at = Utc::now() + ChronoDuration::minutes(offset);

        let booked = Reservation {
            slot: local_time_label(slot_at.timestamp_millis()),
            slot_at: Some(slot_at),
            status: ReservationStatus::Active,
            ..reservation
        };
        let stored = booked.clone();
        self.reservations.update(move |list| with_entry(list, stored));

        self.push_task(TaskItem::new(
            format!("assist-{}", booked.id),
            format!("Assist reservation {}", booked.id),
            AVAILABLE_VOLUNTEER,
            TaskLocation::place(booked.zone.clone()),
            TaskStatus::Pending,
            TaskPriority::High,
        ));

        info!(
            reservation = %booked.id,
            user = %booked.user_id,
            zone = %booked.zone,
            offset_minutes = offset,
            slot = %booked.slot,
            "Reservation booked"
        );
        booked
    }

    /// Volunteer verification of a reservation.
    ///
    /// Returns false, changing nothing, for unknown ids. Otherwise marks the
    /// reservation Completed, flags the visitor as assisted and posts a log
    /// incident plus a notification addressed to the visitor.
    pub fn verify_reservation(&self, reservation_id: &str, verifier_id: &str) -> bool {
        let Some(reservation) = self.find_reservation(reservation_id) else {
            warn!(reservation = reservation_id, "Cannot verify unknown reservation");
            return false;
        };

        self.set_reservation_status(reservation_id, ReservationStatus::Completed);
        self.push_incident(Incident::new(
            format!("ver-{}", reservation_id),
            format!("Reservation {} verified by {}", reservation_id, verifier_id),
            Severity::Green,
        ));

        let user_id = reservation.user_id.clone();
        self.active_visitors.update(|list| {
            list.iter()
                .map(|v| {
                    if v.id == user_id {
                        ActiveVisitor {
                            needs_assist: true,
                            assisted: true,
                            ..v.clone()
                        }
                    } else {
                        v.clone()
                    }
                })
                .collect()
        });

        let place = if reservation.zone.trim().is_empty() {
            DEFAULT_BATHING_GHAT
        } else {
            reservation.zone.as_str()
        };
        self.push_incident(Incident::targeted(
            format!("user-notif-{}-{}", reservation.id, user_id),
            user_id.clone(),
            format!(
                "Your reservation {} at {} for {} has been accepted by {}.",
                reservation.id, place, reservation.slot, verifier_id
            ),
            Severity::Green,
        ));

        info!(reservation = reservation_id, verifier = verifier_id, "Reservation verified");
        true
    }

    /// Post a reminder incident `minutes_before` the slot.
    ///
    /// The delay is scaled down for the demo (see
    /// [`SimulationConfig::reminder_delay`](crate::simulation::SimulationConfig::reminder_delay)).
    /// Scheduling again replaces the pending reminder. Returns false for
    /// unknown reservations.
    pub fn schedule_reminder(&self, reservation_id: &str, minutes_before: u32) -> bool {
        if self.find_reservation(reservation_id).is_none() {
            debug!(reservation = reservation_id, "No reservation to remind about");
            return false;
        }

        let repo = self.clone();
        let id = reservation_id.to_string();
        let delay = self.config.reminder_delay(minutes_before);
        self.scheduler.schedule(reminder_key(reservation_id), delay, async move {
            repo.post_reminder(&id);
        });
        debug!(reservation = reservation_id, delay_ms = delay.as_millis() as u64, "Reminder scheduled");
        true
    }

    fn post_reminder(&self, reservation_id: &str) {
        match self.find_reservation(reservation_id) {
            Some(reservation) if reservation.status != ReservationStatus::Cancelled => {
                self.push_incident(Incident::new(
                    reminder_key(reservation_id),
                    format!(
                        "Reminder: Reservation {} at {} - arrive soon.",
                        reservation_id, reservation.slot
                    ),
                    Severity::Green,
                ));
                info!(reservation = reservation_id, "Reservation reminder posted");
            }
            _ => debug!(reservation = reservation_id, "Reminder dropped"),
        }
    }

    /// Store eligibility proofs for a reservation. Always accepted.
    pub fn upload_eligibility_documents(
        &self,
        user_id: &str,
        reservation_id: &str,
        id_proof: Option<String>,
        doctor_certificate: Option<String>,
    ) {
        self.eligibility_docs.insert(
            reservation_id.to_string(),
            EligibilityDocs {
                user_id: user_id.to_string(),
                id_proof,
                doctor_certificate,
            },
        );
        self.push_incident(Incident::new(
            format!("doc-{}", reservation_id),
            format!("Eligibility docs uploaded for {}", reservation_id),
            Severity::Green,
        ));
        info!(reservation = reservation_id, user = user_id, "Eligibility documents stored");
    }

    pub fn eligibility_documents(&self, reservation_id: &str) -> Option<EligibilityDocs> {
        self.eligibility_docs
            .get(reservation_id)
            .map(|entry| entry.value().clone())
    }

    /// Active -> Cancelled, dropping any pending reminder.
    ///
    /// Returns false if the reservation is unknown or no longer active.
    pub fn cancel_reservation(&self, reservation_id: &str) -> bool {
        let active = self
            .find_reservation(reservation_id)
            .map(|r| r.status == ReservationStatus::Active)
            .unwrap_or(false);
        if !active {
            return false;
        }

        self.set_reservation_status(reservation_id, ReservationStatus::Cancelled);
        self.scheduler.cancel(&reminder_key(reservation_id));
        info!(reservation = reservation_id, "Reservation cancelled");
        true
    }

    pub fn get_reservations(&self, user_id: &str) -> Vec<Reservation> {
        self.reservations
            .with(|list| list.iter().filter(|r| r.user_id == user_id).cloned().collect())
    }

    fn find_reservation(&self, reservation_id: &str) -> Option<Reservation> {
        self.reservations
            .with(|list| list.iter().find(|r| r.id == reservation_id).cloned())
    }

    fn set_reservation_status(&self, reservation_id: &str, status: ReservationStatus) {
        self.reservations.update(|list| {
            list.iter()
                .map(|r| if r.id == reservation_id { Reservation { status, ..r.clone() } } else { r.clone() })
                .collect()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn started_repo() -> CrowdRepository {
        let repo = CrowdRepository::default();
        repo.zone_risks().set(super::super::seed::zone_risks());
        repo
    }

    #[test]
    fn test_slot_offsets() {
        assert_eq!(slot_offset_minutes(None), 10);
        assert_eq!(slot_offset_minutes(Some(0.71)), 30);
        assert_eq!(slot_offset_minutes(Some(0.7)), 15);
        assert_eq!(slot_offset_minutes(Some(0.41)), 15);
        assert_eq!(slot_offset_minutes(Some(0.4)), 5);
        assert_eq!(slot_offset_minutes(Some(0.0)), 5);
    }

    #[test]
    fn test_busy_zone_gets_late_slot_and_assist_task() {
        let repo = started_repo();
        let before = Utc::now();
        let booked = repo.make_reservation(Reservation::request("r1", "visitor1", ReservationType::Elderly, "bC"));

        let slot_at = booked.slot_at.unwrap();
        assert!(slot_at >= before + ChronoDuration::minutes(30));
        assert!(!booked.slot.is_empty());
        assert_eq!(booked.status, ReservationStatus::Active);

        let task = repo.tasks().get().into_iter().find(|t| t.id == "assist-r1").unwrap();
        assert_eq!(task.priority, TaskPriority::High);
        assert_eq!(task.assignee, AVAILABLE_VOLUNTEER);
        assert_eq!(task.location, TaskLocation::place("bC"));
    }

    #[test]
    fn test_verify_unknown_changes_nothing() {
        let repo = started_repo();
        let incidents = repo.incidents().get();
        assert!(!repo.verify_reservation("missing", "volunteer1"));
        assert_eq!(repo.incidents().get(), incidents);
    }

    #[test]
    fn test_verify_marks_completed_and_notifies_visitor() {
        let repo = started_repo();
        repo.active_visitors().set(super::super::seed::active_visitors(0));
        repo.make_reservation(Reservation::request("r2", "visitor2", ReservationType::Pregnant, "zB"));

        assert!(repo.verify_reservation("r2", "volunteer1"));
        assert_eq!(repo.get_reservations("visitor2")[0].status, ReservationStatus::Completed);

        let visitor = repo
            .active_visitors()
            .get()
            .into_iter()
            .find(|v| v.id == "visitor2")
            .unwrap();
        assert!(visitor.needs_assist && visitor.assisted);

        let incidents = repo.incidents().get();
        assert!(incidents.iter().any(|i| i.id == "ver-r2"));
        let note = incidents.iter().find(|i| i.id == "user-notif-r2-visitor2").unwrap();
        assert!(note.message.starts_with("[to:visitor2] Your reservation r2 at zB"));
        assert!(note.is_for("visitor2"));

        // Verifying again replaces the notifications instead of duplicating them
        let count = incidents.len();
        assert!(repo.verify_reservation("r2", "volunteer1"));
        assert_eq!(repo.incidents().get().len(), count);
    }

    #[test]
    fn test_blank_zone_names_default_ghat() {
        let repo = started_repo();
        repo.make_reservation(Reservation::request("r3", "visitor3", ReservationType::Elderly, ""));
        repo.verify_reservation("r3", "volunteer2");
        let note = repo
            .incidents()
            .get()
            .into_iter()
            .find(|i| i.id == "user-notif-r3-visitor3")
            .unwrap();
        assert!(note.message.contains(DEFAULT_BATHING_GHAT));
    }

    #[test]
    fn test_eligibility_documents_stored() {
        let repo = started_repo();
        repo.upload_eligibility_documents("visitor1", "r4", Some("aadhaar.jpg".to_string()), None);
        let docs = repo.eligibility_documents("r4").unwrap();
        assert_eq!(docs.id_proof.as_deref(), Some("aadhaar.jpg"));
        assert!(docs.doctor_certificate.is_none());
        assert!(repo.incidents().get().iter().any(|i| i.id == "doc-r4"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reminder_respects_floor() {
        let repo = started_repo();
        repo.make_reservation(Reservation::request("r5", "visitor1", ReservationType::Elderly, "zA"));
        assert!(repo.schedule_reminder("r5", 2));
        assert!(!repo.schedule_reminder("missing", 2));

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert!(!repo.incidents().get().iter().any(|i| i.id == "rem-r5"));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(repo.incidents().get().iter().any(|i| i.id == "rem-r5"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_reminder() {
        let repo = started_repo();
        repo.make_reservation(Reservation::request("r6", "visitor1", ReservationType::Pregnant, "zB"));
        assert!(repo.schedule_reminder("r6", 10));
        assert!(repo.cancel_reservation("r6"));
        assert!(!repo.cancel_reservation("r6"));

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert!(!repo.incidents().get().iter().any(|i| i.id == "rem-r6"));
        assert_eq!(repo.get_reservations("visitor1")[0].status, ReservationStatus::Cancelled);
    }
}
