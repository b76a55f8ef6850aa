//! Notification copy.
//!
//! Titles and bodies are picked deterministically from small template sets,
//! keyed on the streak length so consecutive days read differently.

use super::{DangerLevel, Milestone};

const REMINDER_BODIES: [&str; 3] = [
    "Now is usually a good time for {habit}.",
    "{habit} is waiting. A few minutes keeps the rhythm going.",
    "Your usual window for {habit} is open.",
];

const STREAK_REMINDER_BODIES: [&str; 3] = [
    "Keep your {streak}-day {habit} streak alive today.",
    "Day {next} of {habit} is within reach.",
    "{streak} days of {habit} so far. Make it {next}.",
];

fn pick<'a>(templates: &'a [&'a str], seed: u32) -> &'a str {
    templates[seed as usize % templates.len()]
}

fn fill(template: &str, habit: &str, streak: u32) -> String {
    template
        .replace("{habit}", habit)
        .replace("{streak}", &streak.to_string())
        .replace("{next}", &(streak + 1).to_string())
}

pub fn reminder(habit: &str, streak: u32) -> (String, String) {
    let body = if streak == 0 {
        fill(pick(&REMINDER_BODIES, streak), habit, streak)
    } else {
        fill(pick(&STREAK_REMINDER_BODIES, streak), habit, streak)
    };
    (format!("Time for {habit}"), body)
}

pub fn danger(habit: &str, streak: u32, level: DangerLevel) -> (String, String) {
    let title = match level {
        DangerLevel::Critical => format!("Last call: {habit}"),
        DangerLevel::High => format!("{habit} streak at risk"),
        DangerLevel::Moderate | DangerLevel::Safe => format!("Don't forget {habit}"),
    };
    let body = match level {
        DangerLevel::Critical => {
            format!("Less than an hour left to keep your {streak}-day streak.")
        }
        DangerLevel::High => format!("The evening is here and your {streak}-day streak is still open."),
        DangerLevel::Moderate | DangerLevel::Safe => {
            format!("Your {streak}-day streak needs today's check-in.")
        }
    };
    (title, body)
}

pub fn milestone(habit: &str, milestone: Milestone) -> (String, String) {
    let days = milestone.days();
    (
        format!("{}: {habit}", milestone.title()),
        format!("{days} days in a row. {}", milestone.cheer()),
    )
}
