//! Domain records for the live crowd state.
//!
//! Every record is a plain value. Collections are updated by replacing
//! entries (filter-out-old + append-new, or map-replace), never by mutating
//! an entry another observer may be holding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current risk estimate for a monitored zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneRisk {
    pub zone_id: String,
    pub display_name: String,
    /// Risk in `[0, 1]`
    pub risk: f32,
    pub minutes_to_critical: u32,
}

impl ZoneRisk {
    pub fn new(
        zone_id: impl Into<String>,
        display_name: impl Into<String>,
        risk: f32,
        minutes_to_critical: u32,
    ) -> Self {
        Self {
            zone_id: zone_id.into(),
            display_name: display_name.into(),
            risk: risk.clamp(0.0, 1.0),
            minutes_to_critical,
        }
    }
}

/// One cell of the density heat grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeatCell {
    pub x: u8,
    pub y: u8,
    pub intensity: f32,
}

/// A crowd-control playbook.
///
/// The ETA is kept as a number; [`Playbook::display_steps`] renders the
/// text operators see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playbook {
    pub id: String,
    pub title: String,
    pub steps: String,
    pub eta_minutes: u32,
    #[serde(default)]
    pub is_active: bool,
}

impl Playbook {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        steps: impl Into<String>,
        eta_minutes: u32,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            steps: steps.into(),
            eta_minutes,
            is_active: false,
        }
    }

    pub fn display_steps(&self) -> String {
        format!("{}. ETA {} min", self.steps, self.eta_minutes)
    }
}

/// Lifecycle of a volunteer task. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    /// Whether moving from `self` to `next` is a forward step.
    pub fn can_advance_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::InProgress)
                | (TaskStatus::Pending, TaskStatus::Completed)
                | (TaskStatus::InProgress, TaskStatus::Completed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskPriority::Low => "Low",
            TaskPriority::Medium => "Medium",
            TaskPriority::High => "High",
            TaskPriority::Critical => "CRITICAL",
        };
        f.write_str(label)
    }
}

/// Where a task has to be carried out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskLocation {
    /// Walking distance from the volunteer, in meters
    Distance { meters: u32 },
    /// Exact position reported by a device
    Coordinates { lat: f64, lng: f64 },
    /// Named place such as a zone or a bridge
    Place { name: String },
}

impl TaskLocation {
    pub fn place(name: impl Into<String>) -> Self {
        TaskLocation::Place { name: name.into() }
    }
}

impl fmt::Display for TaskLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskLocation::Distance { meters } => write!(f, "{}m", meters),
            TaskLocation::Coordinates { lat, lng } => write!(f, "{:.5}, {:.5}", lat, lng),
            TaskLocation::Place { name } => f.write_str(name),
        }
    }
}

/// Actionable item for volunteers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskItem {
    pub id: String,
    pub title: String,
    pub assignee: String,
    pub location: TaskLocation,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    #[serde(default)]
    pub emergency_type: Option<SosType>,
    #[serde(default)]
    pub visitor_location: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl TaskItem {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        assignee: impl Into<String>,
        location: TaskLocation,
        status: TaskStatus,
        priority: TaskPriority,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            assignee: assignee.into(),
            location,
            status,
            priority,
            emergency_type: None,
            visitor_location: None,
            message: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Red,
    Yellow,
    Green,
}

/// Entry in the incident feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub message: String,
    pub severity: Severity,
    /// User this incident is addressed to, if any.
    ///
    /// Mirrors the `[to:<user>]` message prefix. Anyone reading the feed can
    /// still see the message.
    #[serde(default)]
    pub recipient: Option<String>,
}

impl Incident {
    pub fn new(id: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
            severity,
            recipient: None,
        }
    }

    /// Build an incident addressed to a single user.
    pub fn targeted(
        id: impl Into<String>,
        recipient: impl Into<String>,
        message: impl AsRef<str>,
        severity: Severity,
    ) -> Self {
        let recipient = recipient.into();
        Self {
            id: id.into(),
            message: format!("[to:{}] {}", recipient, message.as_ref()),
            severity,
            recipient: Some(recipient),
        }
    }

    /// Recipient parsed from a `[to:<user>]` prefix.
    pub fn addressed_to(&self) -> Option<&str> {
        if let Some(recipient) = self.recipient.as_deref() {
            return Some(recipient);
        }
        let rest = self.message.strip_prefix("[to:")?;
        let end = rest.find(']')?;
        Some(&rest[..end])
    }

    /// Whether `user_id` should be notified about this incident.
    pub fn is_for(&self, user_id: &str) -> bool {
        self.addressed_to() == Some(user_id)
    }
}

/// Key performance indicators shown on the control-room dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KpiKind {
    PredictionAccuracy,
    AlertToAction,
    NearMissReduction,
}

impl KpiKind {
    pub fn label(self) -> &'static str {
        match self {
            KpiKind::PredictionAccuracy => "Predictions Accuracy",
            KpiKind::AlertToAction => "Avg alert->action",
            KpiKind::NearMissReduction => "Near misses reduced",
        }
    }

    /// Inclusive bounds the simulated value stays within.
    pub fn bounds(self) -> (i32, i32) {
        match self {
            KpiKind::PredictionAccuracy => (80, 95),
            KpiKind::AlertToAction => (60, 150),
            KpiKind::NearMissReduction => (40, 75),
        }
    }
}

/// A KPI value. Percent kinds hold a percentage, `AlertToAction` holds seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kpi {
    pub kind: KpiKind,
    pub value: i32,
}

impl Kpi {
    pub fn new(kind: KpiKind, value: i32) -> Self {
        Self { kind, value }
    }

    pub fn label(&self) -> &'static str {
        self.kind.label()
    }

    pub fn display_value(&self) -> String {
        match self.kind {
            KpiKind::AlertToAction => format!("{}m {}s", self.value / 60, self.value % 60),
            _ => format!("{}%", self.value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SosType {
    Panic,
    Medical,
    Security,
}

impl SosType {
    pub fn severity(self) -> Severity {
        match self {
            SosType::Panic => Severity::Red,
            SosType::Medical => Severity::Yellow,
            SosType::Security => Severity::Red,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SosType::Panic => "Panic",
            SosType::Medical => "Medical",
            SosType::Security => "Security",
        }
    }
}

impl fmt::Display for SosType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserRole {
    Visitor,
    Volunteer,
}

impl UserRole {
    pub fn name(self) -> &'static str {
        match self {
            UserRole::Visitor => "Visitor",
            UserRole::Volunteer => "Volunteer",
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Visitor" => Ok(UserRole::Visitor),
            "Volunteer" => Ok(UserRole::Volunteer),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SosStatus {
    Active,
    Responded,
    Escalated,
    Resolved,
}

/// An emergency signal raised from a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SosAlert {
    pub id: String,
    #[serde(rename = "type")]
    pub sos_type: SosType,
    pub user_id: String,
    pub user_role: UserRole,
    pub lat: f64,
    pub lng: f64,
    pub timestamp: DateTime<Utc>,
    pub status: SosStatus,
    /// Volunteer task raised for this signal
    #[serde(default)]
    pub task_id: Option<String>,
}

/// Someone currently checked in on site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveVisitor {
    pub id: String,
    pub role: UserRole,
    pub lat: f64,
    pub lng: f64,
    pub zone: String,
    /// Unix millis
    pub check_in_time: i64,
    #[serde(default)]
    pub display_name: String,
    #[serde(default = "default_true")]
    pub is_online: bool,
    #[serde(default)]
    pub needs_assist: bool,
    #[serde(default)]
    pub assisted: bool,
}

fn default_true() -> bool {
    true
}

impl ActiveVisitor {
    pub fn new(
        id: impl Into<String>,
        role: UserRole,
        lat: f64,
        lng: f64,
        zone: impl Into<String>,
        check_in_time: i64,
    ) -> Self {
        Self {
            id: id.into(),
            role,
            lat,
            lng,
            zone: zone.into(),
            check_in_time,
            display_name: String::new(),
            is_online: true,
            needs_assist: false,
            assisted: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeatherType {
    Sunny,
    Cloudy,
    Rain,
    Storm,
    ExtremeHeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertLevel {
    Advisory,
    Watch,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherAlert {
    pub title: String,
    pub message: String,
    pub level: AlertLevel,
}

impl WeatherAlert {
    fn new(title: &str, message: &str, level: AlertLevel) -> Self {
        Self {
            title: title.to_string(),
            message: message.to_string(),
            level,
        }
    }

    /// Alerts shown for a given weather category.
    pub fn for_weather(weather_type: WeatherType) -> Vec<WeatherAlert> {
        match weather_type {
            WeatherType::Sunny => Vec::new(),
            WeatherType::Cloudy => vec![WeatherAlert::new(
                "Cloudy Skies",
                "Expect overcast conditions for the next few hours.",
                AlertLevel::Advisory,
            )],
            WeatherType::Rain => vec![WeatherAlert::new(
                "Rain Expected",
                "Rain expected in 20 minutes near Sangam Zone.",
                AlertLevel::Watch,
            )],
            WeatherType::Storm => vec![WeatherAlert::new(
                "Storm Warning",
                "Thunderstorm approaching. Seek shelter immediately.",
                AlertLevel::Warning,
            )],
            WeatherType::ExtremeHeat => vec![WeatherAlert::new(
                "Extreme Heat",
                "High temperatures expected. Stay hydrated.",
                AlertLevel::Warning,
            )],
        }
    }
}

/// Site weather conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherData {
    /// Celsius
    pub temperature: f64,
    /// Percent
    pub humidity: f64,
    /// Millimeters
    pub rainfall: f64,
    pub weather_type: WeatherType,
    pub alerts: Vec<WeatherAlert>,
}

impl Default for WeatherData {
    fn default() -> Self {
        Self {
            temperature: 25.0,
            humidity: 60.0,
            rainfall: 0.0,
            weather_type: WeatherType::Sunny,
            alerts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReportStatus {
    #[default]
    Active,
    Resolved,
}

/// A missing person reported by a visitor or volunteer.
///
/// Documents written by older clients may omit fields; those decode to
/// their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LostPersonReport {
    /// Assigned by the remote store; empty until the report has been posted
    #[serde(skip_serializing)]
    pub id: String,
    pub reporter_id: String,
    pub name: String,
    #[serde(deserialize_with = "de_whole_number")]
    pub age: u32,
    pub gender: String,
    pub clothing_description: String,
    pub last_known_location: String,
    pub photo_url: String,
    pub status: ReportStatus,
    /// Unix millis
    #[serde(deserialize_with = "de_whole_number")]
    pub timestamp: i64,
}

/// A lost or found object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LostItemReport {
    pub id: String,
    pub reporter_id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    #[serde(default)]
    pub status: ReportStatus,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationType {
    Pregnant,
    Elderly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReservationStatus {
    #[default]
    Active,
    Completed,
    Cancelled,
}

/// Priority bathing/entry slot for pregnant or elderly visitors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub reservation_type: ReservationType,
    /// Local time label, e.g. `04:35 PM`
    #[serde(default)]
    pub slot: String,
    #[serde(default)]
    pub slot_at: Option<DateTime<Utc>>,
    pub zone: String,
    #[serde(default)]
    pub status: ReservationStatus,
}

impl Reservation {
    /// A reservation request; the slot is assigned by the repository.
    pub fn request(
        id: impl Into<String>,
        user_id: impl Into<String>,
        reservation_type: ReservationType,
        zone: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            reservation_type,
            slot: String::new(),
            slot_at: None,
            zone: zone.into(),
            status: ReservationStatus::Active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Donation {
    pub id: String,
    pub user_id: String,
    pub amount: f64,
    pub method: String,
    pub category: String,
    pub to: String,
    #[serde(default)]
    pub receipt_url: Option<String>,
    pub timestamp: i64,
    #[serde(default)]
    pub verified: bool,
}

/// A scheduled ceremony or programme.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Event {
    #[serde(skip_serializing)]
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Unix millis
    #[serde(deserialize_with = "de_whole_number")]
    pub start_time: i64,
    #[serde(deserialize_with = "de_whole_number")]
    pub end_time: i64,
    pub location: String,
    pub is_priority: bool,
}

/// The signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub role: UserRole,
    pub user_id: String,
}

/// Current time as Unix millis.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// A JSON number as a whole value. Floats are truncated.
pub fn whole_number(value: &serde_json::Value) -> Option<i64> {
    value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
}

fn de_whole_number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: TryFrom<i64>,
{
    use serde::de::Error;
    let value = serde_json::Value::deserialize(deserializer)?;
    let number = whole_number(&value).ok_or_else(|| D::Error::custom(format!("expected a number, got {value}")))?;
    T::try_from(number).map_err(|_| D::Error::custom(format!("{number} is out of range")))
}
