//! Simulated live-state repository.
//!
//! Holds one [`StateStream`] per collection, runs the periodic simulation
//! and implements every user action. Actions only touch in-memory state and
//! the delayed-task registry; remote replication lives in [`crate::mirror`].

mod reservation;
mod seed;
mod sos;

pub use reservation::{slot_offset_minutes, EligibilityDocs};

use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

use crate::models::*;
use crate::scheduler::TaskScheduler;
use crate::simulation::{self, SimulationConfig};
use crate::stream::StateStream;

/// Volunteer pool new tasks are assigned to.
pub const AVAILABLE_VOLUNTEER: &str = "Available Volunteer";

/// Records addressed by a unique id within their collection.
pub trait Identified {
    fn id(&self) -> &str;
}

macro_rules! identified {
    ($($ty:ty),* $(,)?) => {
        $(impl Identified for $ty {
            fn id(&self) -> &str {
                &self.id
            }
        })*
    };
}

identified!(TaskItem, Incident, ActiveVisitor, LostPersonReport, Reservation, Donation, Event, SosAlert, Playbook);

/// Copy of `list` with any entry sharing `item`'s id removed and `item`
/// appended.
pub fn with_entry<T: Identified + Clone>(list: &[T], item: T) -> Vec<T> {
    let mut next: Vec<T> = list.iter().filter(|e| e.id() != item.id()).cloned().collect();
    next.push(item);
    next
}

/// Millisecond timestamps that never repeat within the process.
#[derive(Debug, Default)]
pub struct IdClock {
    last: AtomicI64,
}

impl IdClock {
    /// Current Unix millis, bumped past the last value handed out.
    pub fn next(&self) -> i64 {
        let now = now_millis();
        let mut last = self.last.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match self.last.compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }
}

/// In-memory crowd state and the actions operating on it.
///
/// Cloning yields another handle onto the same state.
#[derive(Clone)]
pub struct CrowdRepository {
    /// Timing configuration
    config: Arc<SimulationConfig>,
    /// Set once the simulation loop has been started
    started: Arc<AtomicBool>,
    /// Source of timestamp-derived ids
    ids: Arc<IdClock>,
    /// Pending escalation checks and reminders
    scheduler: TaskScheduler,
    /// Uploaded eligibility documents by reservation id
    eligibility_docs: Arc<DashMap<String, EligibilityDocs>>,

    zone_risks: StateStream<Vec<ZoneRisk>>,
    heat: StateStream<Vec<HeatCell>>,
    playbooks: StateStream<Vec<Playbook>>,
    tasks: StateStream<Vec<TaskItem>>,
    incidents: StateStream<Vec<Incident>>,
    kpis: StateStream<Vec<Kpi>>,
    active_visitors: StateStream<Vec<ActiveVisitor>>,
    weather: StateStream<WeatherData>,
    lost_person_reports: StateStream<Vec<LostPersonReport>>,
    donations: StateStream<Vec<Donation>>,
    reservations: StateStream<Vec<Reservation>>,
    events: StateStream<Vec<Event>>,
    sos_alerts: StateStream<Vec<SosAlert>>,
    session: StateStream<Option<Session>>,
}

impl CrowdRepository {
    /// Create a repository holding the demo baseline.
    ///
    /// Zones, heat grid and visitors stay empty until [`start`](Self::start).
    pub fn new(config: SimulationConfig) -> Self {
        let now = now_millis();
        Self {
            config: Arc::new(config),
            started: Arc::new(AtomicBool::new(false)),
            ids: Arc::new(IdClock::default()),
            scheduler: TaskScheduler::new(),
            eligibility_docs: Arc::new(DashMap::new()),
            zone_risks: StateStream::default(),
            heat: StateStream::default(),
            playbooks: StateStream::new(seed::playbooks()),
            tasks: StateStream::new(seed::tasks()),
            incidents: StateStream::new(seed::incidents()),
            kpis: StateStream::new(seed::kpis()),
            active_visitors: StateStream::default(),
            weather: StateStream::default(),
            lost_person_reports: StateStream::new(seed::lost_person_reports(now)),
            donations: StateStream::default(),
            reservations: StateStream::default(),
            events: StateStream::new(seed::events(now)),
            sos_alerts: StateStream::default(),
            session: StateStream::default(),
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    pub fn zone_risks(&self) -> &StateStream<Vec<ZoneRisk>> {
        &self.zone_risks
    }

    pub fn heat(&self) -> &StateStream<Vec<HeatCell>> {
        &self.heat
    }

    pub fn playbooks(&self) -> &StateStream<Vec<Playbook>> {
        &self.playbooks
    }

    pub fn tasks(&self) -> &StateStream<Vec<TaskItem>> {
        &self.tasks
    }

    pub fn incidents(&self) -> &StateStream<Vec<Incident>> {
        &self.incidents
    }

    pub fn kpis(&self) -> &StateStream<Vec<Kpi>> {
        &self.kpis
    }

    pub fn active_visitors(&self) -> &StateStream<Vec<ActiveVisitor>> {
        &self.active_visitors
    }

    pub fn weather(&self) -> &StateStream<WeatherData> {
        &self.weather
    }

    pub fn lost_person_reports(&self) -> &StateStream<Vec<LostPersonReport>> {
        &self.lost_person_reports
    }

    pub fn donations(&self) -> &StateStream<Vec<Donation>> {
        &self.donations
    }

    pub fn reservations(&self) -> &StateStream<Vec<Reservation>> {
        &self.reservations
    }

    pub fn event_stream(&self) -> &StateStream<Vec<Event>> {
        &self.events
    }

    pub fn sos_alerts(&self) -> &StateStream<Vec<SosAlert>> {
        &self.sos_alerts
    }

    pub fn session(&self) -> &StateStream<Option<Session>> {
        &self.session
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Simulation
    // ------------------------------------------------------------------

    /// Seed the live baseline and spawn the simulation loop.
    ///
    /// Only the first call has an effect; later calls return `None`. The
    /// loop runs until the runtime shuts down or the handle is aborted.
    pub fn start(&self) -> Option<JoinHandle<()>> {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Simulation already running");
            return None;
        }

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        self.zone_risks.set(seed::zone_risks());
        self.heat.set(simulation::generate_heat(&mut rng));
        self.active_visitors.set(seed::active_visitors(now_millis()));

        let period = self.config.tick_interval();
        info!(
            tick_interval_ms = self.config.tick_interval_ms,
            seeded = self.config.seed.is_some(),
            "Starting simulation"
        );

        let repo = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            let mut ticks: u64 = 0;
            loop {
                ticker.tick().await;
                repo.tick(&mut rng);
                ticks += 1;
                debug!(ticks, "Simulation tick");
            }
        }))
    }

    /// Advance every simulated stream by one step.
    pub fn tick<R: Rng + ?Sized>(&self, rng: &mut R) {
        self.zone_risks.update(|zones| simulation::drift_zone_risks(zones, rng));
        self.heat.set(simulation::generate_heat(rng));
        self.playbooks.update(|playbooks| simulation::nudge_playbook_etas(playbooks, rng));
        self.tasks.update(|tasks| simulation::nudge_task_distances(tasks, rng));
        self.incidents.update(|incidents| simulation::rotate_incidents(incidents, rng));
        self.kpis.update(|kpis| simulation::wiggle_kpis(kpis, rng));
        self.active_visitors.update(|visitors| simulation::walk_visitors(visitors, rng));
        self.weather.update(|weather| simulation::evolve_weather(weather, rng));
    }

    /// Overlay observed conditions on the simulated weather.
    ///
    /// Humidity and rainfall keep their simulated values until the next
    /// tick.
    pub fn observe_weather(&self, temperature: f64, weather_type: WeatherType) {
        self.weather.update(|current| WeatherData {
            temperature,
            weather_type,
            alerts: WeatherAlert::for_weather(weather_type),
            ..current.clone()
        });
        info!(temperature, weather_type = ?weather_type, "Observed weather applied");
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    pub fn login(&self, role: UserRole, user_id: &str) {
        info!(role = role.name(), user_id, "User logged in");
        self.session.set(Some(Session {
            role,
            user_id: user_id.to_string(),
        }));
    }

    pub fn logout(&self) {
        if let Some(session) = self.session.get() {
            info!(user_id = %session.user_id, "User logged out");
        }
        self.session.set(None);
    }

    // ------------------------------------------------------------------
    // Playbooks and tasks
    // ------------------------------------------------------------------

    /// Mark a playbook active. Returns false for unknown ids.
    pub fn activate_playbook(&self, id: &str) -> bool {
        let known = self.playbooks.with(|list| list.iter().any(|p| p.id == id));
        if known {
            self.playbooks.update(|list| {
                list.iter()
                    .map(|p| if p.id == id { Playbook { is_active: true, ..p.clone() } } else { p.clone() })
                    .collect()
            });
            info!(playbook = id, "Playbook activated");
        }
        known
    }

    /// Dry-run a playbook. Only logged.
    pub fn simulate_playbook(&self, id: &str) {
        match self.playbooks.with(|list| list.iter().find(|p| p.id == id).cloned()) {
            Some(playbook) => info!(
                playbook = id,
                title = %playbook.title,
                eta_minutes = playbook.eta_minutes,
                "Simulating playbook"
            ),
            None => warn!(playbook = id, "Cannot simulate unknown playbook"),
        }
    }

    /// Pending -> InProgress.
    pub fn accept_task(&self, id: &str) -> bool {
        self.advance_task(id, TaskStatus::InProgress)
    }

    /// Pending or InProgress -> Completed.
    pub fn complete_task(&self, id: &str) -> bool {
        self.advance_task(id, TaskStatus::Completed)
    }

    /// Move a task forward. Backward or unknown transitions are ignored.
    fn advance_task(&self, id: &str, next: TaskStatus) -> bool {
        let current = self
            .tasks
            .with(|list| list.iter().find(|t| t.id == id).map(|t| t.status));
        let Some(current) = current else {
            warn!(task = id, "Unknown task");
            return false;
        };
        if !current.can_advance_to(next) {
            debug!(task = id, ?current, ?next, "Ignoring non-forward task transition");
            return false;
        }

        self.tasks.update(|list| {
            list.iter()
                .map(|t| if t.id == id { TaskItem { status: next, ..t.clone() } } else { t.clone() })
                .collect()
        });
        info!(task = id, status = ?next, "Task advanced");

        // A task that left Pending no longer needs its escalation check
        if self.scheduler.cancel(id) {
            debug!(task = id, "Escalation check cancelled");
        }
        let sos_status = match next {
            TaskStatus::Completed => SosStatus::Resolved,
            _ => SosStatus::Responded,
        };
        self.set_sos_status_for_task(id, sos_status);
        true
    }

    // ------------------------------------------------------------------
    // Visitors
    // ------------------------------------------------------------------

    pub fn check_in_visitor(&self, visitor_id: &str, role: UserRole, lat: f64, lng: f64, zone: &str) {
        let visitor = ActiveVisitor::new(visitor_id, role, lat, lng, zone, now_millis());
        self.active_visitors.update(move |list| with_entry(list, visitor));
        info!(visitor = visitor_id, zone, "Visitor checked in");
    }

    pub fn check_out_visitor(&self, visitor_id: &str) {
        self.active_visitors
            .update(|list| list.iter().filter(|v| v.id != visitor_id).cloned().collect());
        info!(visitor = visitor_id, "Visitor checked out");
    }

    /// Returns false when the visitor is not checked in.
    pub fn update_visitor_location(&self, visitor_id: &str, lat: f64, lng: f64) -> bool {
        let known = self.active_visitors.with(|list| list.iter().any(|v| v.id == visitor_id));
        if known {
            self.active_visitors.update(|list| {
                list.iter()
                    .map(|v| if v.id == visitor_id { ActiveVisitor { lat, lng, ..v.clone() } } else { v.clone() })
                    .collect()
            });
        }
        known
    }

    /// Checked-in visitors per zone.
    pub fn visitor_counts(&self) -> BTreeMap<String, usize> {
        self.active_visitors.with(|list| {
            let mut counts = BTreeMap::new();
            for visitor in list {
                *counts.entry(visitor.zone.clone()).or_insert(0) += 1;
            }
            counts
        })
    }

    // ------------------------------------------------------------------
    // Lost and found
    // ------------------------------------------------------------------

    pub fn add_lost_person_report(&self, report: LostPersonReport) {
        info!(report = %report.id, name = %report.name, "Lost-person report added");
        self.lost_person_reports.update(move |list| with_entry(list, report));
    }

    /// Active -> Resolved. Returns false if the report is unknown or
    /// already resolved.
    pub fn resolve_lost_person_report(&self, report_id: &str) -> bool {
        let active = self.lost_person_reports.with(|list| {
            list.iter()
                .any(|r| r.id == report_id && r.status == ReportStatus::Active)
        });
        if active {
            self.lost_person_reports.update(|list| {
                list.iter()
                    .map(|r| {
                        if r.id == report_id {
                            LostPersonReport {
                                status: ReportStatus::Resolved,
                                ..r.clone()
                            }
                        } else {
                            r.clone()
                        }
                    })
                    .collect()
            });
            info!(report = report_id, "Lost-person report resolved");
        }
        active
    }

    pub fn lost_people(&self) -> Vec<LostPersonReport> {
        self.lost_person_reports.get()
    }

    /// Record a lost item and raise a volunteer task for it.
    pub fn report_lost_item(&self, item: &LostItemReport) {
        self.push_incident(Incident::new(
            format!("lostitem-{}", item.id),
            format!("Lost item: {} - {}", item.title, item.location),
            Severity::Green,
        ));

        let mut task = TaskItem::new(
            format!("lostitem-{}", self.ids.next()),
            format!("🔎 Lost Item: {}", item.title),
            AVAILABLE_VOLUNTEER,
            TaskLocation::place(item.location.clone()),
            TaskStatus::Pending,
            TaskPriority::Medium,
        );
        task.visitor_location = Some(item.location.clone());
        task.message = Some(item.description.clone());
        self.push_task(task);
        info!(item = %item.id, "Lost item reported");
    }

    // ------------------------------------------------------------------
    // Donations
    // ------------------------------------------------------------------

    pub fn make_donation(&self, donation: Donation) {
        info!(donation = %donation.id, amount = donation.amount, category = %donation.category, "Donation recorded");
        self.donations.update(move |list| with_entry(list, donation));
    }

    pub fn get_donations(&self, user_id: &str) -> Vec<Donation> {
        self.donations
            .with(|list| list.iter().filter(|d| d.user_id == user_id).cloned().collect())
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Add an event and announce it in the incident feed.
    pub fn add_event(&self, event: Event) {
        self.push_incident(Incident::new(
            format!("ev-notif-{}", event.id),
            format!(
                "Event posted: {} at {}, starts at {}",
                event.name,
                event.location,
                local_time_label(event.start_time)
            ),
            Severity::Green,
        ));
        info!(event = %event.id, name = %event.name, "Event added");
        self.events.update(move |list| with_entry(list, event));
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.get()
    }

    /// Remind `user_id` about an event after the event-reminder delay.
    ///
    /// Returns false for unknown events.
    pub fn set_event_reminder(&self, event_id: &str, user_id: &str) -> bool {
        let Some(event) = self.events.with(|list| list.iter().find(|e| e.id == event_id).cloned()) else {
            warn!(event = event_id, "Cannot set reminder for unknown event");
            return false;
        };

        let incident_id = format!("rem-{}-{}", event_id, self.ids.next());
        let incident = Incident::targeted(
            incident_id.clone(),
            user_id,
            format!(
                "Reminder: {} is starting at {} at {}",
                event.name,
                local_time_label(event.start_time),
                event.location
            ),
            Severity::Green,
        );

        let repo = self.clone();
        self.scheduler
            .schedule(incident_id, self.config.event_reminder_delay(), async move {
                repo.push_incident(incident);
            });
        debug!(event = event_id, user_id, "Event reminder scheduled");
        true
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    /// Append an incident, replacing any entry with the same id.
    pub(crate) fn push_incident(&self, incident: Incident) {
        self.incidents.update(move |list| with_entry(list, incident));
    }

    pub(crate) fn push_task(&self, task: TaskItem) {
        self.tasks.update(move |list| with_entry(list, task));
    }

    pub(crate) fn task_status(&self, task_id: &str) -> Option<TaskStatus> {
        self.tasks
            .with(|list| list.iter().find(|t| t.id == task_id).map(|t| t.status))
    }
}

impl Default for CrowdRepository {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

/// `hh:mm AM/PM` in the local timezone.
pub fn local_time_label(millis: i64) -> String {
    match chrono::DateTime::from_timestamp_millis(millis) {
        Some(at) => at.with_timezone(&chrono::Local).format("%I:%M %p").to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn repo() -> CrowdRepository {
        CrowdRepository::new(SimulationConfig {
            seed: Some(11),
            ..SimulationConfig::default()
        })
    }

    #[test]
    fn test_seeded_baseline() {
        let repo = repo();
        assert_eq!(repo.playbooks().get().len(), 3);
        assert_eq!(repo.playbooks().get()[0].display_steps(), "VMS A3, 10 volunteers, rope lane. ETA 8 min");
        assert_eq!(repo.tasks().get().len(), 3);
        assert_eq!(repo.incidents().get().len(), 3);
        assert_eq!(repo.kpis().get()[1].display_value(), "1m 32s");
        assert_eq!(repo.lost_people().len(), 2);
        assert_eq!(repo.events().len(), 3);
        assert!(repo.zone_risks().get().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent_and_ticks() {
        let repo = repo();
        let handle = repo.start().expect("first start spawns the loop");
        assert!(repo.start().is_none());
        assert!(repo.is_started());

        assert_eq!(repo.zone_risks().get().len(), 3);
        assert_eq!(repo.heat().get().len(), 50);
        assert_eq!(repo.active_visitors().get().len(), 6);

        let mut heat = repo.heat().subscribe();
        tokio::time::sleep(Duration::from_secs(16)).await;
        assert!(heat.try_next().is_some());
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_with_zero_tick_interval_keeps_running() {
        let repo = CrowdRepository::new(SimulationConfig {
            tick_interval_ms: 0,
            seed: Some(3),
            ..SimulationConfig::default()
        });
        let handle = repo.start().expect("first start spawns the loop");

        let mut heat = repo.heat().subscribe();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(heat.try_next().is_some());
        assert!(!handle.is_finished());
        handle.abort();
    }

    #[test]
    fn test_tick_keeps_invariants() {
        let repo = repo();
        repo.zone_risks().set(seed::zone_risks());
        repo.active_visitors().set(seed::active_visitors(0));
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            repo.tick(&mut rng);
            for zone in repo.zone_risks().get() {
                assert!((0.0..=1.0).contains(&zone.risk));
            }
            let heat = repo.heat().get();
            assert_eq!(heat.len(), 50);
            assert!(heat.iter().all(|c| (0.0..=1.0).contains(&c.intensity)));
            assert_eq!(repo.incidents().get().len(), 3);
        }
    }

    #[test]
    fn test_observed_extreme_heat_raises_alert() {
        let repo = repo();
        repo.observe_weather(43.5, WeatherType::ExtremeHeat);
        let weather = repo.weather().get();
        assert_eq!(weather.temperature, 43.5);
        assert_eq!(weather.alerts.len(), 1);
        assert_eq!(weather.alerts[0].level, AlertLevel::Warning);
        assert_eq!(weather.humidity, WeatherData::default().humidity);
    }

    #[test]
    fn test_login_logout() {
        let repo = repo();
        repo.login(UserRole::Volunteer, "vol-9");
        assert_eq!(repo.session().get().map(|s| s.user_id), Some("vol-9".to_string()));
        repo.logout();
        assert!(repo.session().get().is_none());
    }

    #[test]
    fn test_task_transitions_only_move_forward() {
        let repo = repo();
        assert!(repo.accept_task("t1"));
        assert!(!repo.accept_task("t1"));
        assert!(repo.complete_task("t1"));
        assert!(!repo.accept_task("t1"));
        assert!(!repo.complete_task("t3"));
        assert!(!repo.accept_task("nope"));
        assert_eq!(repo.task_status("t1"), Some(TaskStatus::Completed));
    }

    #[test]
    fn test_activate_playbook() {
        let repo = repo();
        assert!(repo.activate_playbook("pb2"));
        assert!(!repo.activate_playbook("pb9"));
        let active: Vec<String> = repo
            .playbooks()
            .get()
            .into_iter()
            .filter(|p| p.is_active)
            .map(|p| p.id)
            .collect();
        assert_eq!(active, vec!["pb2"]);
    }

    #[test]
    fn test_visitor_check_in_is_unique_and_counted() {
        let repo = repo();
        repo.check_in_visitor("v1", UserRole::Visitor, 20.595, 78.965, "Zone A");
        repo.check_in_visitor("v1", UserRole::Visitor, 20.596, 78.966, "Zone B");
        repo.check_in_visitor("v2", UserRole::Volunteer, 20.595, 78.965, "Zone B");
        assert_eq!(repo.active_visitors().get().len(), 2);
        assert_eq!(repo.visitor_counts().get("Zone B"), Some(&2));

        assert!(repo.update_visitor_location("v2", 20.591, 78.961));
        assert!(!repo.update_visitor_location("ghost", 0.0, 0.0));
        repo.check_out_visitor("v1");
        assert_eq!(repo.visitor_counts().get("Zone B"), Some(&1));
    }

    #[test]
    fn test_lost_item_creates_incident_and_task() {
        let repo = repo();
        repo.report_lost_item(&LostItemReport {
            id: "li1".to_string(),
            reporter_id: "visitor1".to_string(),
            title: "Black backpack".to_string(),
            description: "Has a water bottle".to_string(),
            location: "Gate 3".to_string(),
            status: ReportStatus::Active,
            timestamp: 0,
        });
        let incidents = repo.incidents().get();
        assert!(incidents.iter().any(|i| i.id == "lostitem-li1" && i.severity == Severity::Green));
        let task = repo
            .tasks()
            .get()
            .into_iter()
            .find(|t| t.id.starts_with("lostitem-"))
            .unwrap();
        assert_eq!(task.priority, TaskPriority::Medium);
        assert_eq!(task.location, TaskLocation::place("Gate 3"));
    }

    #[test]
    fn test_resolve_lost_person_report() {
        let repo = repo();
        assert!(repo.resolve_lost_person_report("1"));
        assert!(!repo.resolve_lost_person_report("1"));
        assert!(!repo.resolve_lost_person_report("404"));
    }

    #[test]
    fn test_donations_filtered_by_user() {
        let repo = repo();
        for (id, user) in [("d1", "a"), ("d2", "b"), ("d3", "a")] {
            repo.make_donation(Donation {
                id: id.to_string(),
                user_id: user.to_string(),
                amount: 101.0,
                method: "UPI".to_string(),
                category: "Annadanam".to_string(),
                to: "Seva Trust".to_string(),
                receipt_url: None,
                timestamp: 0,
                verified: false,
            });
        }
        assert_eq!(repo.get_donations("a").len(), 2);
        assert!(repo.get_donations("c").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_reminder_fires_for_user() {
        let repo = repo();
        repo.add_event(Event {
            id: "e9".to_string(),
            name: "Night Bhajan".to_string(),
            location: "Sector 2".to_string(),
            ..Event::default()
        });
        assert!(repo.incidents().get().iter().any(|i| i.id == "ev-notif-e9"));

        assert!(repo.set_event_reminder("e9", "visitor3"));
        assert!(!repo.set_event_reminder("missing", "visitor3"));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(!repo.incidents().get().iter().any(|i| i.id.starts_with("rem-e9-")));
        tokio::time::sleep(Duration::from_secs(2)).await;
        let reminder = repo
            .incidents()
            .get()
            .into_iter()
            .find(|i| i.id.starts_with("rem-e9-"))
            .unwrap();
        assert!(reminder.is_for("visitor3"));
    }

    #[test]
    fn test_id_clock_never_repeats() {
        let clock = IdClock::default();
        let mut last = 0;
        for _ in 0..1_000 {
            let next = clock.next();
            assert!(next > last);
            last = next;
        }
    }
}
