//! # Feature: Rule Engine
//!
//! Pure generation of scheduled reminders from domain events. Appointment
//! rules fire at fixed lead times before the appointment start; the daily
//! exercise rule fires at a configured local time-of-day for the next seven
//! days. No side effects: persistence of the generated reminders is the
//! caller's job, which keeps generation deterministic under test.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::template::render;
use crate::domain::{Appointment, Patient, Prescription, Therapist};
use crate::features::queue::ScheduledReminder;
use crate::features::settings::{ReminderSettings, SmartPolicy};

/// Number of days of exercise reminders generated per run
const EXERCISE_HORIZON_DAYS: u64 = 7;

/// Fallback exercise time-of-day when no custom time is configured
fn default_exercise_time() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap()
}

/// A category of reminder with its own per-patient settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReminderRule {
    #[serde(rename = "appointment_24h")]
    Appointment24h,
    #[serde(rename = "appointment_2h")]
    Appointment2h,
    #[serde(rename = "exercise_daily")]
    ExerciseDaily,
}

impl ReminderRule {
    pub const ALL: [ReminderRule; 3] = [
        ReminderRule::Appointment24h,
        ReminderRule::Appointment2h,
        ReminderRule::ExerciseDaily,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderRule::Appointment24h => "appointment_24h",
            ReminderRule::Appointment2h => "appointment_2h",
            ReminderRule::ExerciseDaily => "exercise_daily",
        }
    }

    /// Offset before the event at which the rule fires; None for
    /// time-of-day rules.
    pub fn lead_time(&self) -> Option<chrono::Duration> {
        match self {
            ReminderRule::Appointment24h => Some(chrono::Duration::hours(24)),
            ReminderRule::Appointment2h => Some(chrono::Duration::hours(2)),
            ReminderRule::ExerciseDaily => None,
        }
    }
}

impl std::fmt::Display for ReminderRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generate lead-time reminders for one appointment.
///
/// Each enabled appointment rule contributes one reminder at
/// `starts_at - lead_time`, but only if that moment is still strictly in
/// the future: no past-dated sends.
pub fn appointment_reminders(
    appointment: &Appointment,
    patient: &Patient,
    therapist: &Therapist,
    settings: &ReminderSettings,
    now: DateTime<Utc>,
) -> Vec<ScheduledReminder> {
    let mut reminders = Vec::new();

    for rule in [ReminderRule::Appointment24h, ReminderRule::Appointment2h] {
        let enabled = settings.rule_settings(rule).map(|t| t.enabled).unwrap_or(true);
        if !enabled {
            continue;
        }

        let lead = rule.lead_time().expect("appointment rules have lead times");
        let due = appointment.starts_at - lead;
        if due <= now {
            debug!(
                "Skipping {rule} for appointment {}: due time {due} already passed",
                appointment.id
            );
            continue;
        }

        let (title, body) = appointment_message(rule, appointment, patient, therapist, settings);
        reminders.push(ScheduledReminder::new(
            rule,
            &patient.id,
            &appointment.tenant_id,
            due,
            title,
            body,
            settings.channels_for_rule(rule),
        ));
    }

    reminders
}

/// Generate exercise reminders for the next seven days.
///
/// Emits nothing when the patient has no active prescriptions. Days
/// excluded by the smart policy (weekends, configured holidays) are
/// skipped. Due times are the configured local time-of-day in the
/// patient's timezone.
pub fn daily_exercise_reminders(
    patient: &Patient,
    prescriptions: &[Prescription],
    settings: &ReminderSettings,
    now: DateTime<Utc>,
) -> Vec<ScheduledReminder> {
    let active_count = prescriptions.iter().filter(|p| p.active).count();
    if active_count == 0 {
        return Vec::new();
    }

    let rule = ReminderRule::ExerciseDaily;
    let type_settings = settings.rule_settings(rule);
    if !type_settings.map(|t| t.enabled).unwrap_or(true) {
        return Vec::new();
    }
    let time_of_day = type_settings
        .and_then(|t| t.custom_time)
        .unwrap_or_else(default_exercise_time);

    let tz = settings.tz();
    let local_today = now.with_timezone(&tz).date_naive();
    let (title, body) = exercise_message(patient, active_count, settings);

    let mut reminders = Vec::new();
    for offset in 1..=EXERCISE_HORIZON_DAYS {
        let Some(date) = local_today.checked_add_days(Days::new(offset)) else {
            continue;
        };
        if !day_allowed(&settings.smart, date) {
            continue;
        }
        // earliest() picks the first valid instant across DST gaps
        let Some(local_due) = tz.from_local_datetime(&date.and_time(time_of_day)).earliest()
        else {
            continue;
        };
        let due = local_due.with_timezone(&Utc);
        if due <= now {
            continue;
        }

        reminders.push(ScheduledReminder::new(
            rule,
            &patient.id,
            &patient.tenant_id,
            due,
            title.clone(),
            body.clone(),
            settings.channels_for_rule(rule),
        ));
    }

    reminders
}

/// Whether the smart policy allows reminders on a calendar day
pub fn day_allowed(smart: &SmartPolicy, date: NaiveDate) -> bool {
    if smart.skip_weekends && matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }
    if smart.skip_holidays && smart.holidays.contains(&date) {
        return false;
    }
    true
}

fn appointment_message(
    rule: ReminderRule,
    appointment: &Appointment,
    patient: &Patient,
    therapist: &Therapist,
    settings: &ReminderSettings,
) -> (String, String) {
    let local_start = appointment.starts_at.with_timezone(&settings.tz());
    let mut values = HashMap::new();
    values.insert("patientName", patient.name.clone());
    values.insert("therapistName", therapist.name.clone());
    values.insert(
        "appointmentTime",
        local_start.format("%Y-%m-%d %H:%M").to_string(),
    );
    values.insert(
        "location",
        appointment
            .location
            .clone()
            .unwrap_or_else(|| default_location(&settings.language)),
    );

    let (title, body) = appointment_templates(rule, &settings.language);
    (render(title, &values), render(body, &values))
}

fn exercise_message(
    patient: &Patient,
    active_count: usize,
    settings: &ReminderSettings,
) -> (String, String) {
    let mut values = HashMap::new();
    values.insert("patientName", patient.name.clone());
    values.insert("exerciseCount", active_count.to_string());

    let (title, body) = exercise_templates(&settings.language);
    (render(title, &values), render(body, &values))
}

/// Unknown languages fall back to English
fn appointment_templates(rule: ReminderRule, language: &str) -> (&'static str, &'static str) {
    match (language, rule) {
        ("pt", ReminderRule::Appointment24h) => (
            "Lembrete de consulta",
            "Olá {patientName}, você tem uma consulta com {therapistName} amanhã às {appointmentTime}, em {location}.",
        ),
        ("pt", _) => (
            "Lembrete de consulta",
            "Olá {patientName}, sua consulta com {therapistName} é hoje às {appointmentTime}, em {location}.",
        ),
        (_, ReminderRule::Appointment24h) => (
            "Appointment reminder",
            "Hi {patientName}, you have an appointment with {therapistName} tomorrow at {appointmentTime}, at {location}.",
        ),
        _ => (
            "Appointment reminder",
            "Hi {patientName}, your appointment with {therapistName} is today at {appointmentTime}, at {location}.",
        ),
    }
}

fn exercise_templates(language: &str) -> (&'static str, &'static str) {
    match language {
        "pt" => (
            "Lembrete de exercícios",
            "Hora dos exercícios, {patientName}! Você tem {exerciseCount} plano(s) de exercício para hoje.",
        ),
        _ => (
            "Exercise reminder",
            "Time for your exercises, {patientName}! You have {exerciseCount} exercise plan(s) for today.",
        ),
    }
}

fn default_location(language: &str) -> String {
    match language {
        "pt" => "nossa clínica".to_string(),
        _ => "the clinic".to_string(),
    }
}
