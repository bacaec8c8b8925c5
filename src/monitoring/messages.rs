use chrono::{DateTime, Utc};

use crate::models::enums::EnvironmentAlertKind;

/// Alert wording, kept in one place so every surface reads the same.
pub struct MessageTemplates;

impl MessageTemplates {
    pub fn environment_title(kind: EnvironmentAlertKind) -> &'static str {
        match kind {
            EnvironmentAlertKind::HighHumidity => "environment: high humidity",
            EnvironmentAlertKind::HighTemperature => "environment: high temperature",
            EnvironmentAlertKind::Motion => "environment: motion detected",
        }
    }

    pub fn high_humidity(value: f64, limit: f64) -> String {
        format!("Too humid ({value:.0}% > {limit:.0}%). Risk of medication spoilage.")
    }

    pub fn high_temperature(value: f64, limit: f64) -> String {
        format!("High temperature ({value:.1}°C > {limit:.1}°C). Keep the box in a cooler place.")
    }

    pub fn motion() -> String {
        "Motion detected. The box was opened recently.".to_string()
    }

    pub fn missed_dose_title() -> &'static str {
        "adherence: missed dose"
    }

    pub fn missed_dose(
        subject: &str,
        medicine: Option<&str>,
        scheduled: Option<DateTime<Utc>>,
    ) -> String {
        let medicine = medicine.unwrap_or("a scheduled medicine");
        match scheduled {
            Some(at) => format!(
                "{subject} missed {medicine} scheduled for {}.",
                at.format("%Y-%m-%d %H:%M UTC")
            ),
            None => format!("{subject} missed {medicine}."),
        }
    }
}
