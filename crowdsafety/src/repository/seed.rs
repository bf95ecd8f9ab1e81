//! Demo baseline shown before the first simulation tick.

use crate::models::*;

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 60 * MINUTE_MS;

pub fn playbooks() -> Vec<Playbook> {
    vec![
        Playbook::new("pb1", "Divert via Gate C", "VMS A3, 10 volunteers, rope lane", 8),
        Playbook::new("pb2", "Soft Metering at Entry E", "Throttle inflow to 60% for 10 min", 5),
        Playbook::new("pb3", "Clear Emergency Corridor", "Hold counterflow, create 3m lane", 3),
    ]
}

pub fn tasks() -> Vec<TaskItem> {
    vec![
        TaskItem::new(
            "t1",
            "Open Gate C",
            "Team 12",
            TaskLocation::Distance { meters: 200 },
            TaskStatus::Pending,
            TaskPriority::High,
        ),
        TaskItem::new(
            "t2",
            "Create one-way lane",
            "Team 5",
            TaskLocation::place("Bridge C"),
            TaskStatus::InProgress,
            TaskPriority::Medium,
        ),
        TaskItem::new(
            "t3",
            "Report blockage type",
            "Volunteer",
            TaskLocation::place("Zone A"),
            TaskStatus::Completed,
            TaskPriority::Low,
        ),
    ]
}

pub fn incidents() -> Vec<Incident> {
    vec![
        Incident::new("i1", "Yellow risk predicted in Zone B in 7 min", Severity::Yellow),
        Incident::new("i2", "VMS A3 offline - ticket created", Severity::Green),
        Incident::new("i3", "Reverse flow detected near Bridge C", Severity::Red),
    ]
}

pub fn kpis() -> Vec<Kpi> {
    vec![
        Kpi::new(KpiKind::PredictionAccuracy, 88),
        Kpi::new(KpiKind::AlertToAction, 92),
        Kpi::new(KpiKind::NearMissReduction, 62),
    ]
}

pub fn lost_person_reports(now: i64) -> Vec<LostPersonReport> {
    let report = |id: &str, reporter: &str, name: &str, age: u32, gender: &str, clothing: &str, place: &str| {
        LostPersonReport {
            id: id.to_string(),
            reporter_id: reporter.to_string(),
            name: name.to_string(),
            age,
            gender: gender.to_string(),
            clothing_description: clothing.to_string(),
            last_known_location: place.to_string(),
            photo_url: String::new(),
            status: ReportStatus::Active,
            timestamp: now,
        }
    };
    vec![
        report("1", "user1", "Ramesh Kumar", 70, "Male", "Blue shirt, white pants", "Sangam Zone"),
        report("2", "user2", "Sita Devi", 65, "Female", "Red saree", "Hanuman Garhi"),
    ]
}

pub fn events(now: i64) -> Vec<Event> {
    let event = |id: &str, name: &str, description: &str, start_h: i64, end_min: i64, location: &str| Event {
        id: id.to_string(),
        name: name.to_string(),
        description: Some(description.to_string()),
        start_time: now + start_h * HOUR_MS,
        end_time: now + end_min * MINUTE_MS,
        location: location.to_string(),
        is_priority: false,
    };
    vec![
        event("e1", "Morning Aarti", "Blessings at Sangam Ghat", 1, 90, "Sangam Ghat"),
        event("e2", "Cultural Dance", "Folk performances", 2, 150, "Cultural Arena"),
        event("e3", "Evening Aarti", "Ceremony at sunset", 5, 330, "Sangam Ghat"),
    ]
}

pub fn zone_risks() -> Vec<ZoneRisk> {
    vec![
        ZoneRisk::new("zA", "Zone A", 0.72, 3),
        ZoneRisk::new("zB", "Zone B", 0.35, 7),
        ZoneRisk::new("bC", "Bridge C", 0.88, 2),
    ]
}

pub fn active_visitors(now: i64) -> Vec<ActiveVisitor> {
    let visitor = |id: &str, role: UserRole, lat: f64, lng: f64, zone: &str, secs_ago: i64| {
        ActiveVisitor::new(id, role, lat, lng, zone, now - secs_ago * 1_000)
    };
    vec![
        visitor("visitor1", UserRole::Visitor, 20.5937, 78.9629, "Zone A", 300),
        visitor("visitor2", UserRole::Visitor, 20.5938, 78.9630, "Zone B", 180),
        visitor("visitor3", UserRole::Visitor, 20.5936, 78.9628, "Zone C", 120),
        visitor("volunteer1", UserRole::Volunteer, 20.5939, 78.9631, "Zone D", 600),
        visitor("visitor4", UserRole::Visitor, 20.5935, 78.9627, "Zone A", 90),
        visitor("visitor5", UserRole::Visitor, 20.5940, 78.9632, "Zone B", 240),
    ]
}
