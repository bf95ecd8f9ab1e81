//! Live-state simulation.
//!
//! One tick perturbs every simulated stream. Each step is a pure function of
//! the current value and an RNG so ticks can be replayed from a seed.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::*;

/// Heat grid width (x in `0..10`).
pub const HEAT_GRID_WIDTH: u8 = 10;
/// Heat grid height (y in `0..5`).
pub const HEAT_GRID_HEIGHT: u8 = 5;

/// Bounding box visitor positions are kept inside.
pub const VISITOR_LAT_RANGE: (f64, f64) = (20.5900, 20.6000);
pub const VISITOR_LNG_RANGE: (f64, f64) = (78.9600, 78.9700);

const RISK_STEP: f32 = 0.07;
const VISITOR_STEP_DEG: f64 = 0.0005;
const ETA_DELTAS: [i32; 3] = [-1, 0, 1];
const ETA_RANGE: (u32, u32) = (2, 10);
const DISTANCE_DELTAS: [i32; 5] = [-10, -5, 0, 5, 10];
const MIN_DISTANCE_M: u32 = 50;
const PERCENT_DELTAS: [i32; 7] = [-3, -2, -1, 0, 1, 2, 3];
const SECONDS_DELTAS: [i32; 5] = [-10, -5, 0, 5, 10];
const TEMPERATURE_RANGE: (f64, f64) = (15.0, 45.0);
const HUMIDITY_RANGE: (f64, f64) = (30.0, 90.0);

/// Timing knobs for the simulated repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Interval between simulation ticks
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Delay before an unanswered SOS is escalated
    #[serde(default = "default_escalation_delay")]
    pub escalation_delay_ms: u64,

    /// Shortest delay a reservation reminder may be scheduled with
    #[serde(default = "default_reminder_floor")]
    pub reminder_floor_ms: u64,

    /// Milliseconds of delay per "minute before" requested for a reminder
    #[serde(default = "default_reminder_ms_per_minute")]
    pub reminder_ms_per_minute: u64,

    /// Delay before an event reminder is posted
    #[serde(default = "default_event_reminder_delay")]
    pub event_reminder_delay_ms: u64,

    /// Fixed RNG seed; entropy-seeded when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_tick_interval() -> u64 { 15_000 }
fn default_escalation_delay() -> u64 { 20_000 }
fn default_reminder_floor() -> u64 { 5_000 }
// Demo scale: one second per requested minute
fn default_reminder_ms_per_minute() -> u64 { 1_000 }
fn default_event_reminder_delay() -> u64 { 5_000 }

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            escalation_delay_ms: default_escalation_delay(),
            reminder_floor_ms: default_reminder_floor(),
            reminder_ms_per_minute: default_reminder_ms_per_minute(),
            event_reminder_delay_ms: default_event_reminder_delay(),
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Interval between ticks, never shorter than one millisecond.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn escalation_delay(&self) -> Duration {
        Duration::from_millis(self.escalation_delay_ms)
    }

    pub fn event_reminder_delay(&self) -> Duration {
        Duration::from_millis(self.event_reminder_delay_ms)
    }

    /// Delay for a reminder requested `minutes_before` the slot.
    pub fn reminder_delay(&self, minutes_before: u32) -> Duration {
        let scaled = u64::from(minutes_before).saturating_mul(self.reminder_ms_per_minute);
        Duration::from_millis(scaled.max(self.reminder_floor_ms))
    }
}

/// `minutes_to_critical` for a given risk level.
pub fn minutes_to_critical(risk: f32) -> u32 {
    ((1.0 - risk) * 10.0).round().max(0.0) as u32
}

/// Random-walk each zone's risk and recompute its time to critical.
pub fn drift_zone_risks<R: Rng + ?Sized>(zones: &[ZoneRisk], rng: &mut R) -> Vec<ZoneRisk> {
    zones
        .iter()
        .map(|zone| {
            let risk = (zone.risk + rng.gen_range(-RISK_STEP..=RISK_STEP)).clamp(0.0, 1.0);
            ZoneRisk {
                risk,
                minutes_to_critical: minutes_to_critical(risk),
                ..zone.clone()
            }
        })
        .collect()
}

/// A fresh, uncorrelated heat grid.
pub fn generate_heat<R: Rng + ?Sized>(rng: &mut R) -> Vec<HeatCell> {
    let mut cells = Vec::with_capacity(usize::from(HEAT_GRID_WIDTH) * usize::from(HEAT_GRID_HEIGHT));
    for x in 0..HEAT_GRID_WIDTH {
        for y in 0..HEAT_GRID_HEIGHT {
            cells.push(HeatCell {
                x,
                y,
                intensity: rng.gen_range(0.0..=1.0),
            });
        }
    }
    cells
}

/// Shift every playbook ETA by at most one minute, within `[2, 10]`.
pub fn nudge_playbook_etas<R: Rng + ?Sized>(playbooks: &[Playbook], rng: &mut R) -> Vec<Playbook> {
    playbooks
        .iter()
        .map(|playbook| {
            let delta = *ETA_DELTAS.choose(rng).unwrap_or(&0);
            let eta = (playbook.eta_minutes as i32 + delta).clamp(ETA_RANGE.0 as i32, ETA_RANGE.1 as i32);
            Playbook {
                eta_minutes: eta as u32,
                ..playbook.clone()
            }
        })
        .collect()
}

/// Jitter task distances; tasks at a place or coordinates are untouched.
pub fn nudge_task_distances<R: Rng + ?Sized>(tasks: &[TaskItem], rng: &mut R) -> Vec<TaskItem> {
    tasks
        .iter()
        .map(|task| match task.location {
            TaskLocation::Distance { meters } => {
                let delta = *DISTANCE_DELTAS.choose(rng).unwrap_or(&0);
                let meters = (meters as i64 + delta as i64).max(MIN_DISTANCE_M as i64) as u32;
                TaskItem {
                    location: TaskLocation::Distance { meters },
                    ..task.clone()
                }
            }
            _ => task.clone(),
        })
        .collect()
}

/// Move the head of the feed to the back, one time in three.
pub fn rotate_incidents<R: Rng + ?Sized>(incidents: &[Incident], rng: &mut R) -> Vec<Incident> {
    let mut rotated = incidents.to_vec();
    if rng.gen_range(0..3) == 0 && !rotated.is_empty() {
        rotated.rotate_left(1);
    }
    rotated
}

/// Perturb KPI values within each kind's bounds.
pub fn wiggle_kpis<R: Rng + ?Sized>(kpis: &[Kpi], rng: &mut R) -> Vec<Kpi> {
    kpis.iter()
        .map(|kpi| {
            let deltas: &[i32] = match kpi.kind {
                KpiKind::AlertToAction => &SECONDS_DELTAS,
                _ => &PERCENT_DELTAS,
            };
            let delta = *deltas.choose(rng).unwrap_or(&0);
            let (min, max) = kpi.kind.bounds();
            Kpi::new(kpi.kind, (kpi.value + delta).clamp(min, max))
        })
        .collect()
}

/// Nudge visitor positions, keeping them inside the site bounding box.
pub fn walk_visitors<R: Rng + ?Sized>(visitors: &[ActiveVisitor], rng: &mut R) -> Vec<ActiveVisitor> {
    visitors
        .iter()
        .map(|visitor| {
            let lat = visitor.lat + rng.gen_range(-VISITOR_STEP_DEG..=VISITOR_STEP_DEG);
            let lng = visitor.lng + rng.gen_range(-VISITOR_STEP_DEG..=VISITOR_STEP_DEG);
            ActiveVisitor {
                lat: lat.clamp(VISITOR_LAT_RANGE.0, VISITOR_LAT_RANGE.1),
                lng: lng.clamp(VISITOR_LNG_RANGE.0, VISITOR_LNG_RANGE.1),
                ..visitor.clone()
            }
        })
        .collect()
}

/// Sample the weather category from ten equally likely buckets.
///
/// Buckets 0-5 are sunny, 6-7 cloudy, 8 rain and 9 storm. Extreme heat is
/// never sampled; it only comes from observed conditions.
pub fn sample_weather_type<R: Rng + ?Sized>(rng: &mut R) -> (WeatherType, f64) {
    match rng.gen_range(0..10) {
        0..=5 => (WeatherType::Sunny, 0.0),
        6..=7 => (WeatherType::Cloudy, 0.0),
        8 => (WeatherType::Rain, rng.gen_range(0.5..5.0)),
        _ => (WeatherType::Storm, rng.gen_range(5.0..15.0)),
    }
}

/// Random-walk temperature and humidity and resample the category.
pub fn evolve_weather<R: Rng + ?Sized>(current: &WeatherData, rng: &mut R) -> WeatherData {
    let temperature = (current.temperature + rng.gen_range(-0.5..0.5))
        .clamp(TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1);
    let humidity = (current.humidity + rng.gen_range(-2.0..2.0))
        .clamp(HUMIDITY_RANGE.0, HUMIDITY_RANGE.1);
    let (weather_type, rainfall) = sample_weather_type(rng);

    WeatherData {
        temperature,
        humidity,
        rainfall,
        weather_type,
        alerts: WeatherAlert::for_weather(weather_type),
    }
}
